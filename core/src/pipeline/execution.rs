// overture/src/pipeline/execution.rs

//! The execution driver: walks a `Pipeline` for one session, merging each
//! step's output into the accumulator and checkpointing after every step.

use crate::checkpoint::{is_valid_session_id, Checkpoint, CheckpointStore, MAX_SESSION_ID_LEN};
use crate::core::context_data::ContextData;
use crate::core::control::{ExecutionStatus, PipelineControl};
use crate::core::state::{Field, StepInput, WorkflowState};
use crate::error::{OvertureError, OvertureResult};
use crate::pipeline::definition::Pipeline;
use crate::pipeline::hooks::Hook;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{event, info_span, instrument, Instrument, Level};

/// Final state of a session invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
  pub session_id: String,
  pub state: WorkflowState,
  pub status: ExecutionStatus,
  /// Steps that ran during this invocation, in order. Excludes steps restored from checkpoints.
  pub executed_steps: Vec<String>,
}

impl ExecutionResult {
  pub fn is_completed(&self) -> bool {
    self.status.is_completed()
  }

  pub fn output_path(&self) -> Option<&str> {
    self.state.get(Field::OutputPath)
  }
}

/// Per-session state machine. Indices refer to `Pipeline::steps`.
#[derive(Debug)]
enum StepPhase {
  Pending(usize),
  Running(usize),
  Completed,
  Failed { index: usize, cause: String },
  Cancelled(usize),
}

enum HookOutcome {
  Continue,
  Stop,
  Failed(String),
}

/// Runs sessions of one pipeline against one checkpoint store.
///
/// An `Executor` is `Send + Sync`; share it behind an `Arc` to run many
/// sessions concurrently. Sessions never share state.
pub struct Executor {
  pipeline: Arc<Pipeline>,
  store: Arc<dyn CheckpointStore>,
  shutdown: CancellationToken,
}

impl Executor {
  pub fn new(pipeline: Pipeline, store: Arc<dyn CheckpointStore>) -> Self {
    Self {
      pipeline: Arc::new(pipeline),
      store,
      shutdown: CancellationToken::new(),
    }
  }

  pub fn pipeline(&self) -> &Pipeline {
    &self.pipeline
  }

  pub fn store(&self) -> &Arc<dyn CheckpointStore> {
    &self.store
  }

  /// Token whose cancellation stops every session of this executor at its next step boundary.
  pub fn shutdown_token(&self) -> CancellationToken {
    self.shutdown.clone()
  }

  /// Starts a session from `seed`, or continues it if `session_id` already has checkpoints.
  pub async fn execute(&self, seed: WorkflowState, session_id: &str) -> OvertureResult<ExecutionResult> {
    self.execute_with_cancel(seed, session_id, self.shutdown.child_token()).await
  }

  /// Like [`Executor::execute`], with a caller-owned cancellation token.
  ///
  /// The token is consulted after each step completes and before the next one
  /// starts; a step that is already running is never interrupted.
  #[instrument(
    name = "Executor::execute",
    skip_all,
    fields(pipeline = %self.pipeline.name(), session_id = %session_id),
    err(Display)
  )]
  pub async fn execute_with_cancel(
    &self,
    seed: WorkflowState,
    session_id: &str,
    cancel: CancellationToken,
  ) -> OvertureResult<ExecutionResult> {
    validate_session_id(session_id)?;
    self.validate_seed(&seed)?;

    if let Some(checkpoint) = self.store.load(session_id).await? {
      if !seed_matches(&seed, &checkpoint.state, self.pipeline.seed_fields()) {
        event!(
          Level::WARN,
          "Seed differs from the checkpointed session; continuing from the checkpoint."
        );
      }
      return self.continue_from(checkpoint, cancel).await;
    }

    event!(Level::INFO, "Starting new session.");
    self.drive(session_id, seed, 0, cancel).await
  }

  /// Resumes `session_id` from its latest checkpoint.
  pub async fn resume(&self, session_id: &str) -> OvertureResult<ExecutionResult> {
    self.resume_with_cancel(session_id, self.shutdown.child_token()).await
  }

  #[instrument(
    name = "Executor::resume",
    skip_all,
    fields(pipeline = %self.pipeline.name(), session_id = %session_id),
    err(Display)
  )]
  pub async fn resume_with_cancel(&self, session_id: &str, cancel: CancellationToken) -> OvertureResult<ExecutionResult> {
    validate_session_id(session_id)?;
    let checkpoint = self
      .store
      .load(session_id)
      .await?
      .ok_or_else(|| OvertureError::SessionNotFound {
        session_id: session_id.to_string(),
      })?;
    self.continue_from(checkpoint, cancel).await
  }

  async fn continue_from(&self, checkpoint: Checkpoint, cancel: CancellationToken) -> OvertureResult<ExecutionResult> {
    let last_index = self.pipeline.position(&checkpoint.step_name).ok_or_else(|| {
      OvertureError::validation(format!(
        "checkpoint of session '{}' refers to step '{}' which is not in pipeline '{}'",
        checkpoint.session_id,
        checkpoint.step_name,
        self.pipeline.name()
      ))
    })?;
    event!(
      Level::INFO,
      last_step = %checkpoint.step_name,
      "Resuming session after last checkpointed step."
    );
    self
      .drive(&checkpoint.session_id, checkpoint.state, last_index + 1, cancel)
      .await
  }

  fn validate_seed(&self, seed: &WorkflowState) -> OvertureResult<()> {
    let missing: Vec<&str> = self
      .pipeline
      .seed_fields()
      .iter()
      .filter(|f| !seed.is_set(**f))
      .map(|f| f.name())
      .collect();
    if !missing.is_empty() {
      return Err(OvertureError::InvalidInput {
        message: format!("missing seed field(s): {}", missing.join(", ")),
      });
    }
    let produced: Vec<&str> = self
      .pipeline
      .steps()
      .iter()
      .filter(|s| seed.is_set(s.output))
      .map(|s| s.output.name())
      .collect();
    if !produced.is_empty() {
      return Err(OvertureError::InvalidInput {
        message: format!("seed sets field(s) produced by steps: {}", produced.join(", ")),
      });
    }
    Ok(())
  }

  async fn drive(
    &self,
    session_id: &str,
    state: WorkflowState,
    start_index: usize,
    cancel: CancellationToken,
  ) -> OvertureResult<ExecutionResult> {
    let steps = self.pipeline.steps();
    let ctx_data = ContextData::new(state);
    let mut executed_steps = Vec::new();

    let mut phase = if start_index < steps.len() {
      StepPhase::Pending(start_index)
    } else {
      StepPhase::Completed
    };

    let status = loop {
      phase = match phase {
        StepPhase::Pending(index) => {
          let step_name = steps[index].name.as_str();
          if cancel.is_cancelled() {
            StepPhase::Cancelled(index)
          } else {
            match run_hooks(step_name, self.pipeline.before_hooks(step_name), &ctx_data).await {
              HookOutcome::Continue => StepPhase::Running(index),
              HookOutcome::Stop => StepPhase::Cancelled(index),
              HookOutcome::Failed(cause) => StepPhase::Failed { index, cause },
            }
          }
        }

        StepPhase::Running(index) => {
          let step = &steps[index];
          let span = info_span!("pipeline_step", step_name = %step.name, step_index = index);
          event!(parent: &span, Level::DEBUG, "Running step.");

          let input = {
            let guard = ctx_data.read();
            StepInput::from_state(session_id, &step.name, &step.inputs, &guard)
          }; // guard dropped before the transform is awaited

          let outcome = match input {
            Ok(input) => step.transform.run(input).instrument(span.clone()).await,
            Err(e) => Err(e),
          };

          match outcome {
            Ok(value) => {
              let snapshot = ctx_data.update(|state| {
                state.set(step.output, value);
                state.clone()
              });
              self
                .store
                .save(Checkpoint::new(session_id, index, step.name.clone(), snapshot))
                .instrument(span.clone())
                .await?;
              executed_steps.push(step.name.clone());
              event!(parent: &span, Level::INFO, output_field = %step.output, "Step completed and checkpointed.");

              let next = if index + 1 < steps.len() {
                StepPhase::Pending(index + 1)
              } else {
                StepPhase::Completed
              };
              match run_hooks(&step.name, self.pipeline.after_hooks(&step.name), &ctx_data).await {
                HookOutcome::Continue => next,
                HookOutcome::Stop => match next {
                  StepPhase::Pending(next_index) => StepPhase::Cancelled(next_index),
                  other => other,
                },
                // Step `index` is already checkpointed; the failure belongs to the next boundary.
                HookOutcome::Failed(cause) => match next {
                  StepPhase::Pending(next_index) => StepPhase::Failed {
                    index: next_index,
                    cause,
                  },
                  other => {
                    event!(parent: &span, Level::WARN, error = %cause, "After-hook of the final step failed; session is complete.");
                    other
                  }
                },
              }
            }
            Err(e) => {
              event!(parent: &span, Level::ERROR, error = %e, "Step failed.");
              StepPhase::Failed {
                index,
                cause: e.to_string(),
              }
            }
          }
        }

        StepPhase::Completed => break ExecutionStatus::Completed,
        StepPhase::Failed { index, cause } => {
          break ExecutionStatus::Failed {
            step: steps[index].name.clone(),
            cause,
          }
        }
        StepPhase::Cancelled(index) => {
          event!(Level::INFO, next_step = %steps[index].name, "Session cancelled at step boundary.");
          break ExecutionStatus::Cancelled {
            step: steps[index].name.clone(),
          };
        }
      };
    };

    event!(Level::INFO, status = %status, executed = executed_steps.len(), "Session finished.");
    Ok(ExecutionResult {
      session_id: session_id.to_string(),
      state: ctx_data.snapshot(),
      status,
      executed_steps,
    })
  }
}

async fn run_hooks(step_name: &str, hooks: &[Hook], ctx_data: &ContextData<WorkflowState>) -> HookOutcome {
  for (hook_idx, hook) in hooks.iter().enumerate() {
    match hook(ctx_data.clone()).await {
      Ok(PipelineControl::Continue) => {}
      Ok(PipelineControl::Stop) => {
        event!(Level::INFO, hook_index = hook_idx, "Session stopped by a hook.");
        return HookOutcome::Stop;
      }
      Err(e) => {
        event!(Level::ERROR, hook_index = hook_idx, error = %e, "Hook failed.");
        let err = OvertureError::HookError {
          step_name: step_name.to_string(),
          source: e,
        };
        return HookOutcome::Failed(err.to_string());
      }
    }
  }
  HookOutcome::Continue
}

fn validate_session_id(session_id: &str) -> OvertureResult<()> {
  if !is_valid_session_id(session_id) {
    return Err(OvertureError::InvalidInput {
      message: format!(
        "session id '{}' must be 1-{} characters of [A-Za-z0-9_.-]",
        session_id, MAX_SESSION_ID_LEN
      ),
    });
  }
  Ok(())
}

fn seed_matches(seed: &WorkflowState, checkpointed: &WorkflowState, seed_fields: &[Field]) -> bool {
  seed_fields.iter().all(|f| seed.get(*f) == checkpointed.get(*f))
}
