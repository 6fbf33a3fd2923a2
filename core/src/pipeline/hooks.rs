// overture/src/pipeline/hooks.rs

//! Registration of `before` and `after` hooks around pipeline steps.
//!
//! Hooks observe a session's live state through `ContextData<WorkflowState>`
//! and can stop the session at a step boundary by returning
//! `PipelineControl::Stop`. They cannot write to the state.

use crate::core::context_data::ContextData;
use crate::core::control::PipelineControl;
use crate::core::state::WorkflowState;
use crate::error::OvertureResult;
use crate::pipeline::definition::Pipeline;
use std::future::Future;
use std::pin::Pin;

/// Type alias for a step hook.
///
/// A hook is an async function that receives a clone of the session's
/// `ContextData<WorkflowState>` handle. Read guards must be dropped before any
/// `.await` inside the hook.
pub type Hook = Box<
  dyn Fn(ContextData<WorkflowState>) -> Pin<Box<dyn Future<Output = anyhow::Result<PipelineControl>> + Send>>
    + Send
    + Sync,
>;

impl Pipeline {
  /// Registers a hook that runs after the cancellation check and before `step_name` starts.
  pub fn before_step<F>(
    &mut self,
    step_name: &str,
    hook_fn: impl Fn(ContextData<WorkflowState>) -> F + Send + Sync + 'static,
  ) -> OvertureResult<&mut Self>
  where
    F: Future<Output = anyhow::Result<PipelineControl>> + Send + 'static,
  {
    self.ensure_step_exists(step_name)?;
    let hook: Hook = Box::new(move |ctx_data| Box::pin(hook_fn(ctx_data)));
    self.before.entry(step_name.to_string()).or_default().push(hook);
    Ok(self)
  }

  /// Registers a hook that runs once `step_name` has been merged and checkpointed.
  pub fn after_step<F>(
    &mut self,
    step_name: &str,
    hook_fn: impl Fn(ContextData<WorkflowState>) -> F + Send + Sync + 'static,
  ) -> OvertureResult<&mut Self>
  where
    F: Future<Output = anyhow::Result<PipelineControl>> + Send + 'static,
  {
    self.ensure_step_exists(step_name)?;
    let hook: Hook = Box::new(move |ctx_data| Box::pin(hook_fn(ctx_data)));
    self.after.entry(step_name.to_string()).or_default().push(hook);
    Ok(self)
  }

  pub(crate) fn before_hooks(&self, step_name: &str) -> &[Hook] {
    self.before.get(step_name).map(Vec::as_slice).unwrap_or(&[])
  }

  pub(crate) fn after_hooks(&self, step_name: &str) -> &[Hook] {
    self.after.get(step_name).map(Vec::as_slice).unwrap_or(&[])
  }
}
