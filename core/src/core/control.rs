// overture/src/core/control.rs

//! Signals for controlling pipeline flow and the outcome of a session run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Signal from a step hook indicating whether the session should continue or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineControl {
  /// Proceed to the next step.
  Continue,
  /// Halt the session at the next step boundary. Recorded as a cancellation.
  Stop,
}

/// Outcome of a session run.
///
/// Displays as `completed`, `failed-at:<step>` or `cancelled-at:<step>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
  /// Every step ran (in this or an earlier invocation).
  Completed,
  /// `step` failed; nothing after it ran. `cause` is the underlying error message.
  Failed { step: String, cause: String },
  /// The session was stopped before `step` started.
  Cancelled { step: String },
}

impl ExecutionStatus {
  pub fn is_completed(&self) -> bool {
    matches!(self, ExecutionStatus::Completed)
  }

  pub fn failed_step(&self) -> Option<&str> {
    match self {
      ExecutionStatus::Failed { step, .. } => Some(step),
      _ => None,
    }
  }

  pub fn cause(&self) -> Option<&str> {
    match self {
      ExecutionStatus::Failed { cause, .. } => Some(cause),
      _ => None,
    }
  }
}

impl fmt::Display for ExecutionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExecutionStatus::Completed => f.write_str("completed"),
      ExecutionStatus::Failed { step, .. } => write!(f, "failed-at:{}", step),
      ExecutionStatus::Cancelled { step } => write!(f, "cancelled-at:{}", step),
    }
  }
}
