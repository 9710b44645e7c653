//! Task catalog entries.

use serde::{Deserialize, Serialize};

/// Which tab of the task board a task belongs to.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskKind {
  Limited,
  InGame,
  Partners,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
  pub task_id: String,
  pub name:    String,
  /// Points credited on completion.
  pub reward:  u64,
  pub kind:    TaskKind,
  /// External page the user is sent to before claiming.
  #[serde(default)]
  pub link:    Option<String>,
  #[serde(default = "default_active")]
  pub active:  bool,
}

fn default_active() -> bool { true }

/// A task as seen by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
  #[serde(flatten)]
  pub task:      Task,
  pub completed: bool,
}
