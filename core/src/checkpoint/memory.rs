// overture/src/checkpoint/memory.rs

use super::{check_append_order, Checkpoint, CheckpointStore};
use crate::error::OvertureResult;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, Level};

type SessionLog = Arc<Mutex<Vec<Checkpoint>>>;

/// Process-local checkpoint store.
///
/// The outer map lock is only held long enough to find a session's log;
/// writes to different sessions never contend on it.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
  sessions: RwLock<HashMap<String, SessionLog>>,
}

impl InMemoryCheckpointStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn session_ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
    ids.sort();
    ids
  }

  fn existing_log(&self, session_id: &str) -> Option<SessionLog> {
    self.sessions.read().get(session_id).cloned()
  }

  fn log_for_write(&self, session_id: &str) -> SessionLog {
    if let Some(log) = self.existing_log(session_id) {
      return log;
    }
    self
      .sessions
      .write()
      .entry(session_id.to_string())
      .or_default()
      .clone()
  }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
  async fn save(&self, checkpoint: Checkpoint) -> OvertureResult<()> {
    let log = self.log_for_write(&checkpoint.session_id);
    let mut entries = log.lock();
    check_append_order(entries.last(), &checkpoint)?;
    event!(
      Level::TRACE,
      session_id = %checkpoint.session_id,
      step_name = %checkpoint.step_name,
      "Checkpoint stored in memory."
    );
    entries.push(checkpoint);
    Ok(())
  }

  async fn load(&self, session_id: &str) -> OvertureResult<Option<Checkpoint>> {
    Ok(self.existing_log(session_id).and_then(|log| log.lock().last().cloned()))
  }

  async fn history(&self, session_id: &str) -> OvertureResult<Vec<Checkpoint>> {
    Ok(
      self
        .existing_log(session_id)
        .map(|log| log.lock().clone())
        .unwrap_or_default(),
    )
  }
}
