//! Runtime configuration: a TOML file overlaid by `SWHIT_*` environment
//! variables.
//!
//! Nested keys use a double underscore, e.g. `SWHIT_IDENTITY__BOT_TOKEN` or
//! `SWHIT_CREDIT__REFERRER_BONUS`.

use std::{collections::HashSet, path::{Path, PathBuf}};

use anyhow::{Context as _, bail};
use serde::{Deserialize, Serialize};
use swhit_core::{config::CreditPolicy, identity::IdentityConfig, task::Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  #[default]
  Development,
  Production,
}

/// Runtime server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:        String,
  #[serde(default = "default_port")]
  pub port:        u16,
  #[serde(default = "default_store_path")]
  pub store_path:  PathBuf,
  /// Base URL of the mini-app; share links point here.
  #[serde(default = "default_public_url")]
  pub public_url:  String,
  #[serde(default)]
  pub environment: Environment,
  #[serde(default)]
  pub identity:    IdentityConfig,
  #[serde(default)]
  pub credit:      CreditPolicy,
  /// Task catalog, upserted on every start.
  #[serde(default)]
  pub tasks:       Vec<Task>,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/swhit/swhit.sqlite") }

fn default_public_url() -> String { "http://localhost:8080".to_owned() }

impl ServerConfig {
  /// Read `path` (optional) and the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let builder = config::Config::builder()
      .add_source(config::File::from(path).required(false));
    Self::from_builder(builder)
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> anyhow::Result<Self> {
    builder
      .add_source(
        config::Environment::with_prefix("SWHIT")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  /// Reject combinations that are unsafe or would make credits meaningless.
  pub fn validate(&self) -> anyhow::Result<()> {
    if self.environment == Environment::Production {
      if self.identity.bot_token.as_deref().is_none_or(str::is_empty) {
        bail!("identity.bot_token is required in production");
      }
      if self.identity.dev_fallback {
        bail!("identity.dev_fallback must be off in production");
      }
    }
    if self.credit.referrer_bonus == 0 || self.credit.referee_bonus == 0 {
      bail!("credit.referrer_bonus and credit.referee_bonus must be positive");
    }
    if self.public_url.trim().is_empty() {
      bail!("public_url must not be empty");
    }

    let mut seen = HashSet::new();
    for task in &self.tasks {
      if task.reward == 0 {
        bail!("task {:?} must have a positive reward", task.task_id);
      }
      if !seen.insert(task.task_id.as_str()) {
        bail!("task {:?} is declared twice", task.task_id);
      }
    }
    Ok(())
  }

  /// A copy that is safe to print.
  pub fn redacted(&self) -> Self {
    let mut copy = self.clone();
    if copy.identity.bot_token.is_some() {
      copy.identity.bot_token = Some("<redacted>".to_owned());
    }
    copy
  }
}
