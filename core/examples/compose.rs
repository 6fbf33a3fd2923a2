// overture/examples/compose.rs
//
// Runs the standard composition pipeline against the configured service.
//
//   OVERTURE_API_KEY=... cargo run --example compose -- "happy piano piece in C major" "Romantic era" [session-id]
//
// Running again with the same session id resumes after the last completed step.

use overture::{
  composition_pipeline, ExecutionStatus, Executor, FileCheckpointStore, HttpTextGenerator, OvertureConfig,
  OvertureError, WorkflowState,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), OvertureError> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let mut args = std::env::args().skip(1);
  let brief = args
    .next()
    .unwrap_or_else(|| "happy piano piece in C major".to_string());
  let style = args.next().unwrap_or_else(|| "Romantic era".to_string());
  let session_id = args
    .next()
    .unwrap_or_else(|| format!("session-{}", chrono::Utc::now().format("%Y%m%d%H%M%S")));

  let config = OvertureConfig::from_env()?;
  let generator = Arc::new(HttpTextGenerator::new(config.generator.clone())?);
  let pipeline = composition_pipeline(generator, &config.generator, &config.output_dir)?;
  let store = Arc::new(FileCheckpointStore::open(&config.checkpoint_dir).await?);
  let executor = Executor::new(pipeline, store);

  info!(%session_id, %brief, %style, "--- Composing ---");
  let result = executor
    .execute(WorkflowState::seeded(brief, style), &session_id)
    .await?;

  match &result.status {
    ExecutionStatus::Completed => {
      info!(path = result.output_path().unwrap_or("<none>"), "Composition written.");
    }
    ExecutionStatus::Failed { step, cause } => {
      error!(%step, %cause, "Session failed. Fix the cause and rerun with session id '{}' to resume.", session_id);
    }
    ExecutionStatus::Cancelled { step } => {
      info!(%step, "Session cancelled before step.");
    }
  }
  info!(status = %result.status, executed = ?result.executed_steps, "--- Done ---");
  Ok(())
}
