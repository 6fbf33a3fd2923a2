// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use overture::{
  Field, GenerationError, OvertureError, OvertureResult, Pipeline, RetryPolicy, StepDef, StepInput, TextGenerator,
  WorkflowState,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;
use tracing::Level;

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

pub const BRIEF: &str = "happy piano piece in C major";
pub const STYLE: &str = "Romantic era";

pub fn seed() -> WorkflowState {
  WorkflowState::seeded(BRIEF, STYLE)
}

/// A score description the realizer accepts, wrapped the way models tend to reply.
pub const VALID_SCORE_REPLY: &str = r#"```json
{
  "title": "Happy Romance in C",
  "tempo_bpm": 108,
  "time_signature": [4, 4],
  "instrument": "piano",
  "tracks": [
    { "name": "melody", "notes": [
      { "pitch": "E4", "duration": 1.0, "velocity": 90 },
      { "pitch": "G4", "duration": 1.0 },
      { "pitch": "C5", "duration": 2.0 },
      { "pitch": "rest", "duration": 1.0 },
      { "pitch": "B4", "duration": 0.5 },
      { "pitch": "C5", "duration": 2.5 }
    ] },
    { "name": "harmony", "instrument": "string ensemble", "notes": [
      { "pitch": ["C3", "E3", "G3"], "duration": 4.0 },
      { "pitch": ["G2", "B2", "D3"], "duration": 4.0 }
    ] }
  ]
}
```"#;

/// What one scripted generator call does.
#[derive(Debug, Clone)]
pub enum Reply {
  Text(String),
  Fail(GenerationError),
  /// Never answers; only a timeout gets past it.
  Hang,
}

impl Reply {
  pub fn text(s: impl Into<String>) -> Self {
    Reply::Text(s.into())
  }

  pub fn unavailable(msg: &str) -> Self {
    Reply::Fail(GenerationError::Unavailable(msg.to_string()))
  }

  pub fn service_error(msg: &str) -> Self {
    Reply::Fail(GenerationError::Service(msg.to_string()))
  }
}

/// Replays a fixed queue of replies and records every prompt it receives.
#[derive(Default)]
pub struct ScriptedGenerator {
  replies: Mutex<VecDeque<Reply>>,
  prompts: Mutex<Vec<String>>,
  calls: AtomicUsize,
}

impl ScriptedGenerator {
  pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
    Arc::new(Self {
      replies: Mutex::new(replies.into_iter().collect()),
      ..Default::default()
    })
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn prompts(&self) -> Vec<String> {
    self.prompts.lock().clone()
  }

  pub fn remaining(&self) -> usize {
    self.replies.lock().len()
  }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
  async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.prompts.lock().push(prompt.to_string());
    let reply = self.replies.lock().pop_front();
    match reply {
      Some(Reply::Text(text)) => Ok(text),
      Some(Reply::Fail(err)) => Err(err),
      Some(Reply::Hang) => std::future::pending().await,
      None => Err(GenerationError::Service("script exhausted".to_string())),
    }
  }
}

/// The four generative replies of a successful composition session.
pub fn happy_replies() -> Vec<Reply> {
  vec![
    Reply::text("E4 G4 C5 B4 C5, quarter notes"),
    Reply::text("C major | G major | C major"),
    Reply::text("108 BPM, 4/4, gentle waltz-like lilt"),
    Reply::text(VALID_SCORE_REPLY),
  ]
}

/// Fast retry policy for tests.
pub fn quick_retry(max_retries: u32) -> RetryPolicy {
  RetryPolicy {
    max_retries,
    initial_backoff: Duration::from_millis(1),
    max_backoff: Duration::from_millis(4),
    multiplier: 2.0,
  }
}

// --- Simple deterministic steps over the seed field `input_brief` ---

/// Counts invocations per step name.
#[derive(Default)]
pub struct CallLog {
  calls: Mutex<Vec<String>>,
}

impl CallLog {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn record(&self, step_name: &str) {
    self.calls.lock().push(step_name.to_string());
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().clone()
  }
}

/// A step that appends `suffix` to each of its inputs, joined by `+`.
pub fn append_step(name: &'static str, inputs: &[Field], output: Field, suffix: &'static str, log: Arc<CallLog>) -> StepDef {
  StepDef::from_fn(name, inputs, output, move |input: StepInput| {
    let log = Arc::clone(&log);
    async move {
      log.record(input.step_name());
      let joined: Vec<String> = input.fields().map(|(_, v)| format!("{}{}", v, suffix)).collect();
      Ok::<String, OvertureError>(joined.join("+"))
    }
  })
}

/// A step that always fails with `ServiceError`.
pub fn failing_step(name: &'static str, inputs: &[Field], output: Field, log: Arc<CallLog>) -> StepDef {
  StepDef::from_fn(name, inputs, output, move |input: StepInput| {
    let log = Arc::clone(&log);
    async move {
      log.record(input.step_name());
      Err::<String, OvertureError>(OvertureError::ServiceError {
        message: format!("{} exploded", input.step_name()),
      })
    }
  })
}

/// `input_brief -> melody -> harmony -> rhythm` with deterministic transforms.
pub fn linear_pipeline(log: &Arc<CallLog>) -> OvertureResult<Pipeline> {
  Pipeline::builder("linear")
    .seed(Field::InputBrief)
    .step(append_step("one", &[Field::InputBrief], Field::Melody, "/1", Arc::clone(log)))
    .step(append_step("two", &[Field::Melody], Field::Harmony, "/2", Arc::clone(log)))
    .step(append_step("three", &[Field::Harmony], Field::Rhythm, "/3", Arc::clone(log)))
    .build()
}
