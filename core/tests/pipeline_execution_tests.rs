// tests/pipeline_execution_tests.rs
mod common; // Reference the common module

use common::*;
use overture::{
  CheckpointStore, ExecutionStatus, Executor, Field, InMemoryCheckpointStore, OvertureError, Pipeline, PipelineControl,
  WorkflowState,
};
use serial_test::serial;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn brief_seed(brief: &str) -> WorkflowState {
  WorkflowState::new().with(Field::InputBrief, brief)
}

#[tokio::test]
#[serial]
async fn test_session_runs_steps_in_order_and_checkpoints_each() {
  setup_tracing();
  let log = CallLog::new();
  let store = Arc::new(InMemoryCheckpointStore::new());
  let executor = Executor::new(linear_pipeline(&log).unwrap(), store.clone());

  let result = executor.execute(brief_seed("b"), "s1").await.unwrap();

  assert_eq!(result.status, ExecutionStatus::Completed);
  assert_eq!(result.executed_steps, vec!["one", "two", "three"]);
  assert_eq!(log.calls(), vec!["one", "two", "three"]);
  assert_eq!(result.state.get(Field::Melody), Some("b/1"));
  assert_eq!(result.state.get(Field::Harmony), Some("b/1/2"));
  assert_eq!(result.state.get(Field::Rhythm), Some("b/1/2/3"));

  let history = store.history("s1").await.unwrap();
  let names: Vec<&str> = history.iter().map(|c| c.step_name.as_str()).collect();
  assert_eq!(names, vec!["one", "two", "three"]);
  assert_eq!(history.iter().map(|c| c.step_index).collect::<Vec<_>>(), vec![0, 1, 2]);
  // Each checkpoint holds the state right after its step.
  assert!(history[0].state.is_set(Field::Melody));
  assert!(!history[0].state.is_set(Field::Harmony));
  assert_eq!(history[2].state, result.state);
}

#[tokio::test]
#[serial]
async fn test_missing_seed_field_is_invalid_input_and_runs_nothing() {
  setup_tracing();
  let log = CallLog::new();
  let store = Arc::new(InMemoryCheckpointStore::new());
  let executor = Executor::new(linear_pipeline(&log).unwrap(), store.clone());

  let result = executor.execute(WorkflowState::new(), "s1").await;
  match result {
    Err(OvertureError::InvalidInput { message }) => assert!(message.contains("input_brief")),
    other => panic!("Expected InvalidInput, got {:?}", other),
  }
  assert!(log.calls().is_empty());
  assert!(store.session_ids().is_empty());
}

#[tokio::test]
#[serial]
async fn test_seed_cannot_preset_step_outputs() {
  setup_tracing();
  let log = CallLog::new();
  let executor = Executor::new(linear_pipeline(&log).unwrap(), Arc::new(InMemoryCheckpointStore::new()));

  let seed = brief_seed("b").with(Field::Harmony, "already there");
  assert!(matches!(
    executor.execute(seed, "s1").await,
    Err(OvertureError::InvalidInput { .. })
  ));
  assert!(log.calls().is_empty());
}

#[tokio::test]
#[serial]
async fn test_invalid_session_ids_are_rejected() {
  setup_tracing();
  let log = CallLog::new();
  let executor = Executor::new(linear_pipeline(&log).unwrap(), Arc::new(InMemoryCheckpointStore::new()));
  for bad in ["", "../escape", "a/b"] {
    assert!(
      matches!(executor.execute(brief_seed("b"), bad).await, Err(OvertureError::InvalidInput { .. })),
      "accepted session id {:?}",
      bad
    );
  }
  assert!(log.calls().is_empty());
}

#[tokio::test]
#[serial]
async fn test_failure_halts_session_with_checkpoints_through_previous_step() {
  setup_tracing();
  let log = CallLog::new();
  let store = Arc::new(InMemoryCheckpointStore::new());
  let pipeline = Pipeline::builder("failing")
    .seed(Field::InputBrief)
    .step(append_step("one", &[Field::InputBrief], Field::Melody, "/1", Arc::clone(&log)))
    .step(failing_step("two", &[Field::Melody], Field::Harmony, Arc::clone(&log)))
    .step(append_step("three", &[Field::Harmony], Field::Rhythm, "/3", Arc::clone(&log)))
    .build()
    .unwrap();
  let executor = Executor::new(pipeline, store.clone());

  let result = executor.execute(brief_seed("b"), "s1").await.unwrap();

  assert_eq!(result.status.to_string(), "failed-at:two");
  assert!(result.status.cause().unwrap().contains("two exploded"));
  assert_eq!(log.calls(), vec!["one", "two"]);
  assert_eq!(result.executed_steps, vec!["one"]);
  assert!(result.state.is_set(Field::Melody));
  assert!(!result.state.is_set(Field::Harmony));

  let history = store.history("s1").await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].step_name, "one");
}

#[tokio::test]
#[serial]
async fn test_resume_runs_only_the_remaining_steps() {
  setup_tracing();
  let store = Arc::new(InMemoryCheckpointStore::new());

  let first_log = CallLog::new();
  let broken = Pipeline::builder("linear")
    .seed(Field::InputBrief)
    .step(append_step("one", &[Field::InputBrief], Field::Melody, "/1", Arc::clone(&first_log)))
    .step(failing_step("two", &[Field::Melody], Field::Harmony, Arc::clone(&first_log)))
    .step(append_step("three", &[Field::Harmony], Field::Rhythm, "/3", Arc::clone(&first_log)))
    .build()
    .unwrap();
  let failed = Executor::new(broken, store.clone())
    .execute(brief_seed("b"), "s1")
    .await
    .unwrap();
  assert_eq!(failed.status.failed_step(), Some("two"));

  // The cause is fixed; a fresh executor over the same store picks up after "one".
  let second_log = CallLog::new();
  let fixed = Executor::new(linear_pipeline(&second_log).unwrap(), store.clone());
  let resumed = fixed.resume("s1").await.unwrap();

  assert!(resumed.is_completed());
  assert_eq!(second_log.calls(), vec!["two", "three"]);
  assert_eq!(resumed.executed_steps, vec!["two", "three"]);
  assert_eq!(resumed.state.get(Field::Rhythm), Some("b/1/2/3"));
  assert_eq!(store.history("s1").await.unwrap().len(), 3);
}

#[tokio::test]
#[serial]
async fn test_execute_on_finished_session_reruns_nothing() {
  setup_tracing();
  let log = CallLog::new();
  let executor = Executor::new(linear_pipeline(&log).unwrap(), Arc::new(InMemoryCheckpointStore::new()));

  let first = executor.execute(brief_seed("b"), "s1").await.unwrap();
  let second = executor.execute(brief_seed("b"), "s1").await.unwrap();

  assert!(second.is_completed());
  assert!(second.executed_steps.is_empty());
  assert_eq!(second.state, first.state);
  assert_eq!(log.calls().len(), 3);
}

#[tokio::test]
#[serial]
async fn test_resume_of_unknown_session_is_not_found() {
  setup_tracing();
  let log = CallLog::new();
  let executor = Executor::new(linear_pipeline(&log).unwrap(), Arc::new(InMemoryCheckpointStore::new()));
  match executor.resume("nobody").await {
    Err(OvertureError::SessionNotFound { session_id }) => assert_eq!(session_id, "nobody"),
    other => panic!("Expected SessionNotFound, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn test_cancellation_takes_effect_at_the_next_step_boundary() {
  setup_tracing();
  let log = CallLog::new();
  let store = Arc::new(InMemoryCheckpointStore::new());
  let mut pipeline = linear_pipeline(&log).unwrap();

  let token = CancellationToken::new();
  let hook_token = token.clone();
  pipeline
    .after_step("one", move |_ctx| {
      let token = hook_token.clone();
      async move {
        token.cancel();
        Ok::<_, anyhow::Error>(PipelineControl::Continue)
      }
    })
    .unwrap();
  let executor = Executor::new(pipeline, store.clone());

  let result = executor.execute_with_cancel(brief_seed("b"), "s1", token).await.unwrap();

  assert_eq!(result.status, ExecutionStatus::Cancelled { step: "two".to_string() });
  assert_eq!(result.status.to_string(), "cancelled-at:two");
  assert_eq!(log.calls(), vec!["one"]);
  assert_eq!(store.history("s1").await.unwrap().len(), 1);

  // A fresh token lets the session finish.
  let resumed = executor.resume_with_cancel("s1", CancellationToken::new()).await.unwrap();
  assert!(resumed.is_completed());
  assert_eq!(log.calls(), vec!["one", "two", "three"]);
}

#[tokio::test]
#[serial]
async fn test_shutdown_token_cancels_before_the_first_step() {
  setup_tracing();
  let log = CallLog::new();
  let store = Arc::new(InMemoryCheckpointStore::new());
  let executor = Executor::new(linear_pipeline(&log).unwrap(), store.clone());
  executor.shutdown_token().cancel();

  let result = executor.execute(brief_seed("b"), "s1").await.unwrap();

  assert_eq!(result.status.to_string(), "cancelled-at:one");
  assert!(log.calls().is_empty());
  assert!(store.load("s1").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_before_hook_stop_and_hook_failure() {
  setup_tracing();
  let log = CallLog::new();
  let mut pipeline = linear_pipeline(&log).unwrap();
  pipeline
    .before_step("three", |ctx| async move {
      let stop = ctx.read().get(Field::Harmony) == Some("b/1/2");
      Ok::<_, anyhow::Error>(if stop { PipelineControl::Stop } else { PipelineControl::Continue })
    })
    .unwrap();
  let executor = Executor::new(pipeline, Arc::new(InMemoryCheckpointStore::new()));

  let stopped = executor.execute(brief_seed("b"), "stop").await.unwrap();
  assert_eq!(stopped.status.to_string(), "cancelled-at:three");
  assert_eq!(log.calls(), vec!["one", "two"]);

  let log = CallLog::new();
  let mut pipeline = linear_pipeline(&log).unwrap();
  pipeline
    .after_step("two", |_ctx| async { Err::<PipelineControl, _>(anyhow::anyhow!("audit sink offline")) })
    .unwrap();
  let store = Arc::new(InMemoryCheckpointStore::new());
  let executor = Executor::new(pipeline, store.clone());

  // "two" is already checkpointed when its after-hook fails, so the failure lands on "three".
  let failed = executor.execute(brief_seed("b"), "hook-fail").await.unwrap();
  assert_eq!(failed.status.to_string(), "failed-at:three");
  let cause = failed.status.cause().unwrap();
  assert!(cause.contains("Hook for step 'two' failed"), "cause: {}", cause);
  assert!(cause.contains("audit sink offline"));
  assert_eq!(log.calls(), vec!["one", "two"]);
  let history = store.history("hook-fail").await.unwrap();
  let names: Vec<&str> = history.iter().map(|c| c.step_name.as_str()).collect();
  assert_eq!(names, vec!["one", "two"]);

  // Resuming re-runs exactly the step the failure was reported at.
  let resumed = Executor::new(linear_pipeline(&log).unwrap(), store.clone())
    .resume("hook-fail")
    .await
    .unwrap();
  assert!(resumed.is_completed());
  assert_eq!(resumed.executed_steps, vec!["three"]);
}

#[tokio::test]
#[serial]
async fn test_after_hook_failure_on_final_step_keeps_session_completed() {
  setup_tracing();
  let log = CallLog::new();
  let mut pipeline = linear_pipeline(&log).unwrap();
  pipeline
    .after_step("three", |_ctx| async { Err::<PipelineControl, _>(anyhow::anyhow!("audit sink offline")) })
    .unwrap();
  let store = Arc::new(InMemoryCheckpointStore::new());
  let executor = Executor::new(pipeline, store.clone());

  let result = executor.execute(brief_seed("b"), "hook-last").await.unwrap();
  assert_eq!(result.status, ExecutionStatus::Completed);
  assert_eq!(result.executed_steps, vec!["one", "two", "three"]);
  assert_eq!(store.history("hook-last").await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_sessions_do_not_interfere() {
  setup_tracing();
  let log = CallLog::new();
  let store = Arc::new(InMemoryCheckpointStore::new());
  let executor = Arc::new(Executor::new(linear_pipeline(&log).unwrap(), store.clone()));

  let mut handles = Vec::new();
  for i in 0..8 {
    let executor = Arc::clone(&executor);
    handles.push(tokio::spawn(async move {
      executor
        .execute(brief_seed(&format!("brief{}", i)), &format!("session-{}", i))
        .await
    }));
  }

  for (i, handle) in handles.into_iter().enumerate() {
    let result = handle.await.unwrap().unwrap();
    assert!(result.is_completed());
    assert_eq!(result.session_id, format!("session-{}", i));
    assert_eq!(result.state.get(Field::Rhythm), Some(format!("brief{}/1/2/3", i).as_str()));
    let history = store.history(&result.session_id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|c| c.session_id == result.session_id));
  }
  assert_eq!(log.calls().len(), 24);
  assert_eq!(store.session_ids().len(), 8);
}
