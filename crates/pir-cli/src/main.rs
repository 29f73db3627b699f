//! `pir`: operator tool for a PIR project kept in SQLite.
//!
//! # Usage
//!
//! ```
//! pir --email admin@example.com --password secret sign-up --role admin
//! PIR_EMAIL=admin@example.com PIR_PASSWORD=secret pir pir create --title ... --tag food
//! pir pir submit <id> --question q1 --question q2
//! pir watch pir <id>
//! ```
//!
//! Project settings come from `pir.toml` (or `--config`) overlaid with
//! `FIREBASE_*` environment variables (`FIREBASE_API_KEY`,
//! `FIREBASE_PROJECT_ID`, ...).

mod commands;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use pir_core::{
  client::PirClient,
  config::ProjectConfig,
  entity::{AnswerStatus, PirStatus, UserRole},
  lifecycle::Transition,
};
use pir_store_sqlite::SqliteStore;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pir", author, version, about = "Product Information Request data tool")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "pir.toml")]
  config: PathBuf,

  /// Directory holding the project database; overrides `data_dir`.
  #[arg(long, env = "PIR_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Account to act as, or to create with `sign-up`.
  #[arg(long, env = "PIR_EMAIL", global = true)]
  email: Option<String>,

  #[arg(long, env = "PIR_PASSWORD", global = true, hide_env_values = true)]
  password: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Create an account with a profile document, and sign it in.
  SignUp {
    #[arg(long, value_enum, default_value = "customer")]
    role:         RoleArg,
    #[arg(long)]
    display_name: Option<String>,
  },
  /// Sign in and print the identity and profile.
  Whoami,
  /// Product Information Requests.
  #[command(subcommand)]
  Pir(PirCommand),
  /// Answers to a PIR's questions.
  #[command(subcommand)]
  Answer(AnswerCommand),
  /// Print live snapshots until interrupted.
  #[command(subcommand)]
  Watch(WatchCommand),
}

#[derive(Subcommand, Debug)]
enum PirCommand {
  List {
    #[arg(long, value_enum)]
    status: Option<PirStatusArg>,
  },
  Get {
    id: String,
  },
  Create {
    #[arg(long)]
    title:       String,
    #[arg(long, default_value = "")]
    description: String,
    /// Repeat for several tags; at least one is required.
    #[arg(long = "tag", required = true)]
    tags:        Vec<String>,
    #[arg(long)]
    product:     String,
    #[arg(long)]
    company:     String,
  },
  /// requested → submitted, fixing the question set.
  Submit {
    id:        String,
    #[arg(long = "question")]
    questions: Vec<String>,
  },
  /// submitted → reviewed.
  Review { id: String },
  /// reviewed → accepted.
  Accept { id: String },
}

#[derive(Subcommand, Debug)]
enum AnswerCommand {
  Get {
    pir_id:      String,
    question_id: String,
  },
  List {
    pir_id: String,
  },
  /// Append an entry to the answer's history, creating the answer if needed.
  Record {
    pir_id:      String,
    question_id: String,
    #[arg(long)]
    text:        String,
    #[arg(long, value_enum, default_value = "draft")]
    status:      AnswerStatusArg,
    #[arg(long)]
    comment:     Option<String>,
  },
}

#[derive(Subcommand, Debug)]
enum WatchCommand {
  /// One PIR document.
  Pir { id: String },
  /// Every answer of one PIR.
  Answers { pir_id: String },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RoleArg {
  Customer,
  Vendor,
  Reviewer,
  Admin,
}

impl From<RoleArg> for UserRole {
  fn from(role: RoleArg) -> Self {
    match role {
      RoleArg::Customer => Self::Customer,
      RoleArg::Vendor => Self::Vendor,
      RoleArg::Reviewer => Self::Reviewer,
      RoleArg::Admin => Self::Admin,
    }
  }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PirStatusArg {
  Requested,
  Submitted,
  Reviewed,
  Accepted,
}

impl From<PirStatusArg> for PirStatus {
  fn from(status: PirStatusArg) -> Self {
    match status {
      PirStatusArg::Requested => Self::Requested,
      PirStatusArg::Submitted => Self::Submitted,
      PirStatusArg::Reviewed => Self::Reviewed,
      PirStatusArg::Accepted => Self::Accepted,
    }
  }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum AnswerStatusArg {
  Draft,
  Submitted,
  Accepted,
  RevisionRequested,
}

impl From<AnswerStatusArg> for AnswerStatus {
  fn from(status: AnswerStatusArg) -> Self {
    match status {
      AnswerStatusArg::Draft => Self::Draft,
      AnswerStatusArg::Submitted => Self::Submitted,
      AnswerStatusArg::Accepted => Self::Accepted,
      AnswerStatusArg::RevisionRequested => Self::RevisionRequested,
    }
  }
}

// ─── Settings ────────────────────────────────────────────────────────────────

/// Shape of the merged file + environment configuration.
#[derive(Deserialize, Debug)]
struct Settings {
  #[serde(flatten)]
  project:  ProjectConfig,
  #[serde(default = "default_data_dir")]
  data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf { PathBuf::from(".") }

fn load_settings(path: PathBuf) -> anyhow::Result<Settings> {
  read_settings(config::File::from(path).required(false))
}

/// Merge `file` with the `FIREBASE_*` environment. `config` folds key case,
/// so camelCase file keys reach [`ProjectConfig`] lowercased.
fn read_settings<S>(file: S) -> anyhow::Result<Settings>
where
  S: config::Source + Send + Sync + 'static,
{
  config::Config::builder()
    .add_source(file)
    .add_source(config::Environment::with_prefix("FIREBASE"))
    .build()
    .context("failed to read configuration")?
    .try_deserialize()
    .context("failed to deserialise project settings")
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = load_settings(cli.config)?;
  let data_dir = cli.data_dir.unwrap_or(settings.data_dir);

  let store = SqliteStore::connect(&settings.project, &data_dir)
    .await
    .with_context(|| format!("failed to open project store in {}", data_dir.display()))?;
  let client = PirClient::new(store);
  let session = commands::Session { client, email: cli.email, password: cli.password };

  match cli.command {
    Command::SignUp { role, display_name } => {
      session.sign_up(role.into(), display_name).await
    }
    Command::Whoami => session.whoami().await,
    Command::Pir(cmd) => match cmd {
      PirCommand::List { status } => session.list_pirs(status.map(Into::into)).await,
      PirCommand::Get { id } => session.get_pir(&id).await,
      PirCommand::Create { title, description, tags, product, company } => {
        session
          .create_pir(&title, &description, tags, &product, &company)
          .await
      }
      PirCommand::Submit { id, questions } => {
        session
          .transition(&id, Transition::Submit { question_ids: questions })
          .await
      }
      PirCommand::Review { id } => session.transition(&id, Transition::Review).await,
      PirCommand::Accept { id } => session.transition(&id, Transition::Accept).await,
    },
    Command::Answer(cmd) => match cmd {
      AnswerCommand::Get { pir_id, question_id } => {
        session.get_answer(&pir_id, &question_id).await
      }
      AnswerCommand::List { pir_id } => session.list_answers(&pir_id).await,
      AnswerCommand::Record { pir_id, question_id, text, status, comment } => {
        session
          .record_answer(&pir_id, &question_id, text, status.into(), comment)
          .await
      }
    },
    Command::Watch(cmd) => match cmd {
      WatchCommand::Pir { id } => session.watch_pir(&id).await,
      WatchCommand::Answers { pir_id } => session.watch_answers(&pir_id).await,
    },
  }
}

#[cfg(test)]
mod tests {
  use config::{File, FileFormat};

  use super::*;

  fn toml(text: &str) -> File<config::FileSourceString, FileFormat> {
    File::from_str(text, FileFormat::Toml)
  }

  #[test]
  fn camel_case_file_keys_are_read() {
    let settings = read_settings(toml(
      r#"
        apiKey = "k"
        projectId = "demo"
        data_dir = "/var/lib/pir"
      "#,
    ))
    .unwrap();
    assert_eq!(settings.project.get("apiKey"), Some("k"));
    assert_eq!(settings.project.get("projectId"), Some("demo"));
    assert_eq!(settings.data_dir, PathBuf::from("/var/lib/pir"));
  }

  #[test]
  fn snake_case_file_keys_are_read() {
    let settings = read_settings(toml(
      r#"
        api_key = "k"
        project_id = "demo"
      "#,
    ))
    .unwrap();
    assert_eq!(settings.project.get("apiKey"), Some("k"));
    assert_eq!(settings.project.get("projectId"), Some("demo"));
    assert_eq!(settings.data_dir, PathBuf::from("."));
  }
}
