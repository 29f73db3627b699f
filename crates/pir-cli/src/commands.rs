//! Command implementations. Results are printed to stdout as pretty JSON in
//! application form; logs go to stderr.

use anyhow::{Context as _, bail};
use pir_core::{
  auth::{AuthProvider, AuthUser},
  client::PirClient,
  entity::{
    Answer, AnswerStatus, Audit, HistoryEntry, Pir, PirStatus, Record, UserProfile, UserRole,
  },
  lifecycle::Transition,
  store::{Direction, Query},
  timestamp::Timestamp,
};
use pir_store_sqlite::SqliteStore;
use serde::Serialize;
use serde_json::json;
use tracing::info;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// The opened project plus the credentials given on the command line.
pub struct Session {
  pub client:   PirClient<SqliteStore>,
  pub email:    Option<String>,
  pub password: Option<String>,
}

impl Session {
  fn credentials(&self) -> anyhow::Result<(&str, &str)> {
    match (self.email.as_deref(), self.password.as_deref()) {
      (Some(email), Some(password)) => Ok((email, password)),
      _ => bail!("--email and --password (or PIR_EMAIL and PIR_PASSWORD) are required"),
    }
  }

  async fn sign_in(&self) -> anyhow::Result<AuthUser> {
    let (email, password) = self.credentials()?;
    self
      .client
      .auth()
      .sign_in(email, password)
      .await
      .with_context(|| format!("sign-in as {email} failed"))
  }

  // ─── Accounts ──────────────────────────────────────────────────────────────

  pub async fn sign_up(
    &self,
    role: UserRole,
    display_name: Option<String>,
  ) -> anyhow::Result<()> {
    let (email, password) = self.credentials()?;
    let auth = self.client.auth();
    let user = auth
      .sign_up(email, password)
      .await
      .with_context(|| format!("creating the account for {email} failed"))?;

    // From here on the account exists; failures name the step left undone.
    let user = auth.set_role_claim(&user.uid, role).await.with_context(|| {
      format!("account {} was created, but setting its role claim failed", user.uid)
    })?;

    let profile = UserProfile { email: user.email.clone(), display_name, role };
    self
      .client
      .users()
      .set(&Record::new(user.uid.clone(), profile))
      .await
      .with_context(|| {
        format!("account {} was created, but writing its profile failed", user.uid)
      })?;

    info!(uid = %user.uid, role = role.as_str(), "account ready");
    print_json(&user)
  }

  pub async fn whoami(&self) -> anyhow::Result<()> {
    let user = self.sign_in().await?;
    let profile = self.client.current_profile().await?;
    print_json(&json!({ "auth": user, "profile": profile }))
  }

  // ─── PIRs ──────────────────────────────────────────────────────────────────

  pub async fn list_pirs(&self, status: Option<PirStatus>) -> anyhow::Result<()> {
    let pirs = self.client.pirs();
    let found = match status {
      Some(status) => pirs.by_status(status).await?,
      None => {
        pirs
          .query(&Query::new().order_by("createdAt", Direction::Desc))
          .await?
      }
    };
    print_json(&found)
  }

  pub async fn get_pir(&self, id: &str) -> anyhow::Result<()> {
    print_json(&self.client.pirs().fetch(id).await?)
  }

  pub async fn create_pir(
    &self,
    title: &str,
    description: &str,
    tags: Vec<String>,
    product: &str,
    company: &str,
  ) -> anyhow::Result<()> {
    let user = self.sign_in().await?;
    let pir = Pir::new(
      title,
      description,
      tags,
      product,
      company,
      Audit::new(user.uid, Timestamp::now().to_string()),
    );

    let created = self.client.pirs().add(pir).await?;
    info!(id = %created.id, "PIR created");
    print_json(&created)
  }

  pub async fn transition(&self, id: &str, transition: Transition) -> anyhow::Result<()> {
    let user = self.sign_in().await?;
    let to = transition.target();
    let updated = self
      .client
      .pirs()
      .apply(id, transition)
      .await
      .with_context(|| format!("cannot move PIR {id} to {}", to.as_str()))?;
    info!(id, by = %user.uid, status = to.as_str(), "PIR advanced");
    print_json(&updated)
  }

  // ─── Answers ───────────────────────────────────────────────────────────────

  pub async fn get_answer(&self, pir_id: &str, question_id: &str) -> anyhow::Result<()> {
    match self.client.answers().get_for(pir_id, question_id).await? {
      Some(answer) => print_json(&answer),
      None => bail!("no answer to {question_id} in PIR {pir_id}"),
    }
  }

  pub async fn list_answers(&self, pir_id: &str) -> anyhow::Result<()> {
    print_json(&self.client.answers().for_pir(pir_id).await?)
  }

  pub async fn record_answer(
    &self,
    pir_id: &str,
    question_id: &str,
    text: String,
    status: AnswerStatus,
    comment: Option<String>,
  ) -> anyhow::Result<()> {
    let user = self.sign_in().await?;
    let answers = self.client.answers();
    let now = Timestamp::now().to_string();

    if answers.get_for(pir_id, question_id).await?.is_none() {
      let audit = Audit::new(user.uid.clone(), now.clone());
      answers
        .save(Answer::unanswered(pir_id, question_id, audit))
        .await?;
    }

    let entry = HistoryEntry {
      timestamp: now,
      user_id: user.uid,
      answer_text: text,
      status,
      comment,
    };
    answers.append_history(pir_id, question_id, &entry).await?;

    let answer = answers
      .get_for(pir_id, question_id)
      .await?
      .context("answer vanished after writing it")?;
    print_json(&answer)
  }

  // ─── Live views ────────────────────────────────────────────────────────────

  pub async fn watch_pir(&self, id: &str) -> anyhow::Result<()> {
    let mut watch = self.client.pirs().watch(id).await?;
    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => break,
        next = watch.next() => match next {
          Some(snapshot) => print_json(&snapshot?)?,
          None => break,
        },
      }
    }
    watch.unsubscribe();
    Ok(())
  }

  pub async fn watch_answers(&self, pir_id: &str) -> anyhow::Result<()> {
    let query = Query::new().where_eq("pirId", pir_id);
    let mut watch = self.client.answers().watch_query(query).await?;
    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => break,
        next = watch.next() => match next {
          Some(snapshot) => print_json(&snapshot?)?,
          None => break,
        },
      }
    }
    watch.unsubscribe();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn session(email: &str) -> Session {
    let store = SqliteStore::open_in_memory().await.unwrap();
    Session {
      client:   PirClient::new(store),
      email:    Some(email.to_owned()),
      password: Some("hunter22".to_owned()),
    }
  }

  #[tokio::test]
  async fn sign_up_writes_profile_with_role() {
    let s = session("vendor@example.com").await;
    s.sign_up(UserRole::Vendor, Some("Acme".into())).await.unwrap();

    let profile = s.client.current_profile().await.unwrap().unwrap();
    assert_eq!(profile.data.role, UserRole::Vendor);
    assert_eq!(profile.data.display_name.as_deref(), Some("Acme"));
    assert_eq!(profile.data.email, "vendor@example.com");
  }

  #[tokio::test]
  async fn failed_sign_up_names_the_step() {
    let s = session("vendor@example.com").await;
    s.sign_up(UserRole::Vendor, None).await.unwrap();

    let err = s.sign_up(UserRole::Vendor, None).await.unwrap_err();
    assert_eq!(
      err.to_string(),
      "creating the account for vendor@example.com failed"
    );
  }
}
