// overture/src/checkpoint/mod.rs

//! Durable, append-only snapshots of a session's `WorkflowState`.
//!
//! The driver saves one checkpoint after every step that completes. The last
//! checkpoint of a session is the state a resumed run starts from.

pub mod file;
pub mod memory;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;

use crate::core::state::WorkflowState;
use crate::error::{OvertureError, OvertureResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted snapshot: the full state right after `step_name` completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
  pub session_id: String,
  /// Execution index of the step within its pipeline.
  pub step_index: usize,
  pub step_name: String,
  pub timestamp: DateTime<Utc>,
  pub state: WorkflowState,
}

impl Checkpoint {
  pub fn new(session_id: impl Into<String>, step_index: usize, step_name: impl Into<String>, state: WorkflowState) -> Self {
    Self {
      session_id: session_id.into(),
      step_index,
      step_name: step_name.into(),
      timestamp: Utc::now(),
      state,
    }
  }
}

/// Storage for checkpoints, partitioned by session identifier.
///
/// Implementations must keep sessions isolated from each other. Within one
/// session only sequential writes from a single driver are supported.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
  /// Appends a snapshot. Step indices within a session must strictly increase.
  async fn save(&self, checkpoint: Checkpoint) -> OvertureResult<()>;

  /// The latest snapshot of `session_id`, if any step has completed.
  async fn load(&self, session_id: &str) -> OvertureResult<Option<Checkpoint>>;

  /// Every snapshot of `session_id`, ordered by step index.
  async fn history(&self, session_id: &str) -> OvertureResult<Vec<Checkpoint>>;
}

pub const MAX_SESSION_ID_LEN: usize = 128;

/// Session ids become file and directory names, so they are restricted to
/// 1-128 characters of `[A-Za-z0-9_.-]`, excluding `.` and `..`.
pub fn is_valid_session_id(session_id: &str) -> bool {
  !session_id.is_empty()
    && session_id.len() <= MAX_SESSION_ID_LEN
    && session_id != "."
    && session_id != ".."
    && session_id
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Rejects a checkpoint that would break the per-session step order.
pub(crate) fn check_append_order(last: Option<&Checkpoint>, next: &Checkpoint) -> OvertureResult<()> {
  match last {
    Some(prev) if prev.step_index >= next.step_index => Err(OvertureError::checkpoint(
      &next.session_id,
      format!(
        "step '{}' (index {}) would be appended after step '{}' (index {})",
        next.step_name, next.step_index, prev.step_name, prev.step_index
      ),
    )),
    _ => Ok(()),
  }
}
