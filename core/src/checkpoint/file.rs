// overture/src/checkpoint/file.rs

//! JSON Lines checkpoint store: one `<session_id>.jsonl` file per session,
//! one checkpoint record per line.

use super::{check_append_order, is_valid_session_id, Checkpoint, CheckpointStore, MAX_SESSION_ID_LEN};
use crate::error::{OvertureError, OvertureResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{event, instrument, Level};

pub struct FileCheckpointStore {
  root: PathBuf,
  // Per-session async locks, present only while some call holds a lease.
  locks: Mutex<LockMap>,
}

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// A session's lock entry. The entry leaves the map when the last lease drops.
struct SessionLease<'a> {
  locks: &'a Mutex<LockMap>,
  session_id: &'a str,
  lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for SessionLease<'_> {
  fn drop(&mut self) {
    let mut locks = self.locks.lock();
    // The map and this lease are the only owners left.
    if Arc::strong_count(&self.lock) == 2 {
      locks.remove(self.session_id);
    }
  }
}

impl FileCheckpointStore {
  /// Opens (creating if needed) a store rooted at `root`.
  pub async fn open(root: impl Into<PathBuf>) -> OvertureResult<Self> {
    let root = root.into();
    tokio::fs::create_dir_all(&root).await.map_err(|e| {
      OvertureError::Configuration(format!("cannot create checkpoint directory {}: {}", root.display(), e))
    })?;
    event!(Level::DEBUG, root = %root.display(), "File checkpoint store opened.");
    Ok(Self {
      root,
      locks: Mutex::new(HashMap::new()),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Path of the log file for `session_id`, after validating the id.
  pub fn session_path(&self, session_id: &str) -> OvertureResult<PathBuf> {
    validate_session_id(session_id)?;
    Ok(self.root.join(format!("{}.jsonl", session_id)))
  }

  fn lease<'a>(&'a self, session_id: &'a str) -> SessionLease<'a> {
    let lock = self.locks.lock().entry(session_id.to_string()).or_default().clone();
    SessionLease {
      locks: &self.locks,
      session_id,
      lock,
    }
  }

  async fn read_log(&self, session_id: &str, path: &Path) -> OvertureResult<ParsedLog> {
    let content = match tokio::fs::read_to_string(path).await {
      Ok(content) => content,
      Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
      Err(e) => return Err(OvertureError::checkpoint(session_id, format!("read failed: {}", e))),
    };
    parse_log(session_id, &content)
  }
}

fn validate_session_id(session_id: &str) -> OvertureResult<()> {
  if is_valid_session_id(session_id) {
    Ok(())
  } else {
    Err(OvertureError::checkpoint(
      session_id,
      format!("session ids must be 1-{} characters of [A-Za-z0-9_.-]", MAX_SESSION_ID_LEN),
    ))
  }
}

struct ParsedLog {
  entries: Vec<Checkpoint>,
  /// Byte length of the fully written records; anything past it is a torn write.
  valid_len: usize,
  total_len: usize,
}

fn parse_log(session_id: &str, content: &str) -> OvertureResult<ParsedLog> {
  let mut entries = Vec::new();
  let mut valid_len = 0;
  for (line_no, line) in content.split_inclusive('\n').enumerate() {
    if !line.ends_with('\n') {
      event!(
        Level::WARN,
        session_id,
        bytes = line.len(),
        "Ignoring unterminated trailing checkpoint record."
      );
      break;
    }
    valid_len += line.len();
    let record = line.trim();
    if record.is_empty() {
      continue;
    }
    let checkpoint: Checkpoint = serde_json::from_str(record).map_err(|e| {
      OvertureError::checkpoint(session_id, format!("corrupt record on line {}: {}", line_no + 1, e))
    })?;
    entries.push(checkpoint);
  }
  Ok(ParsedLog {
    entries,
    valid_len,
    total_len: content.len(),
  })
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
  #[instrument(
    name = "FileCheckpointStore::save",
    skip_all,
    fields(session_id = %checkpoint.session_id, step_name = %checkpoint.step_name),
    err(Display)
  )]
  async fn save(&self, checkpoint: Checkpoint) -> OvertureResult<()> {
    let session_id = checkpoint.session_id.clone();
    let path = self.session_path(&session_id)?;
    let lease = self.lease(&session_id);
    let _guard = lease.lock.lock().await;

    let log = self.read_log(&session_id, &path).await?;
    check_append_order(log.entries.last(), &checkpoint)?;

    let mut line = serde_json::to_string(&checkpoint)
      .map_err(|e| OvertureError::checkpoint(&session_id, format!("serialize failed: {}", e)))?;
    line.push('\n');

    let io_err = |e: std::io::Error| OvertureError::checkpoint(&session_id, format!("write failed: {}", e));
    let mut file = tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(&path)
      .await
      .map_err(io_err)?;
    if log.valid_len < log.total_len {
      event!(Level::WARN, "Truncating torn checkpoint record before append.");
      file.set_len(log.valid_len as u64).await.map_err(io_err)?;
    }
    file.write_all(line.as_bytes()).await.map_err(io_err)?;
    file.sync_data().await.map_err(io_err)?;
    event!(Level::TRACE, path = %path.display(), "Checkpoint appended.");
    Ok(())
  }

  async fn load(&self, session_id: &str) -> OvertureResult<Option<Checkpoint>> {
    Ok(self.history(session_id).await?.pop())
  }

  async fn history(&self, session_id: &str) -> OvertureResult<Vec<Checkpoint>> {
    let path = self.session_path(session_id)?;
    let lease = self.lease(session_id);
    let _guard = lease.lock.lock().await;
    Ok(self.read_log(session_id, &path).await?.entries)
  }
}
