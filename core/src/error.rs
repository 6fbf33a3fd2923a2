// overture/src/error.rs
use crate::generative::client::GenerationError;
use crate::realize::RealizationError;
use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OvertureError {
  /// The caller's seed state or session identifier cannot start a session.
  /// Raised before any step (and therefore any service call) runs.
  #[error("Invalid input: {message}")]
  InvalidInput { message: String },

  #[error("Step '{step_name}' requires field '{field}' which is not set")]
  MissingDependency { step_name: String, field: String },

  /// Transient failure talking to the generative service (network, auth, timeout).
  #[error("Generative service unavailable: {message}")]
  ServiceUnavailable { message: String },

  /// Non-transient generative service failure, including exhausted retries.
  #[error("Generative service error: {message}")]
  ServiceError { message: String },

  #[error("Realization failed: {source}")]
  Realization {
    #[from]
    source: RealizationError,
  },

  #[error("Pipeline validation failed: {message}")]
  Validation { message: String },

  #[error("Invalid prompt template: {message}")]
  Template { message: String },

  #[error("Checkpoint store error for session '{session_id}': {message}")]
  Checkpoint { session_id: String, message: String },

  #[error("No checkpoint found for session '{session_id}'")]
  SessionNotFound { session_id: String },

  #[error("Configuration error: {0}")]
  Configuration(String),

  #[error("Hook for step '{step_name}' failed. Source: {source}")]
  HookError {
    step_name: String,
    #[source]
    source: AnyhowError,
  },
}

impl OvertureError {
  pub(crate) fn checkpoint(session_id: &str, message: impl Into<String>) -> Self {
    OvertureError::Checkpoint {
      session_id: session_id.to_string(),
      message: message.into(),
    }
  }

  pub(crate) fn validation(message: impl Into<String>) -> Self {
    OvertureError::Validation { message: message.into() }
  }

  /// True for failures that a later `resume` could get past without changing the pipeline.
  pub fn is_transient(&self) -> bool {
    matches!(self, OvertureError::ServiceUnavailable { .. })
  }
}

impl From<GenerationError> for OvertureError {
  fn from(err: GenerationError) -> Self {
    match err {
      GenerationError::Unavailable(message) => OvertureError::ServiceUnavailable { message },
      GenerationError::Service(message) => OvertureError::ServiceError { message },
    }
  }
}

pub type OvertureResult<T, E = OvertureError> = std::result::Result<T, E>;
