//! Project configuration for connecting to the document platform.

use serde::{Deserialize, Serialize};

/// The six values identifying a project on the document platform.
///
/// Nothing is validated here: a backend that needs a value and finds it
/// missing fails at connection time. Keys are accepted in `snake_case`
/// (as produced by environment sources), `camelCase`, or all lowercase
/// (camelCase keys after the `config` crate has folded their case).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
  #[serde(default, alias = "apiKey", alias = "apikey")]
  pub api_key:             Option<String>,
  #[serde(default, alias = "authDomain", alias = "authdomain")]
  pub auth_domain:         Option<String>,
  #[serde(default, alias = "projectId", alias = "projectid")]
  pub project_id:          Option<String>,
  #[serde(default, alias = "storageBucket", alias = "storagebucket")]
  pub storage_bucket:      Option<String>,
  #[serde(default, alias = "messagingSenderId", alias = "messagingsenderid")]
  pub messaging_sender_id: Option<String>,
  #[serde(default, alias = "appId", alias = "appid")]
  pub app_id:              Option<String>,
}

impl ProjectConfig {
  /// Look up a value by its camelCase name, treating empty strings as
  /// absent.
  pub fn get(&self, key: &str) -> Option<&str> {
    let value = match key {
      "apiKey" => &self.api_key,
      "authDomain" => &self.auth_domain,
      "projectId" => &self.project_id,
      "storageBucket" => &self.storage_bucket,
      "messagingSenderId" => &self.messaging_sender_id,
      "appId" => &self.app_id,
      _ => return None,
    };
    value.as_deref().filter(|v| !v.is_empty())
  }
}
