pub mod context_data;
pub mod control;
pub mod state;
pub mod step;

// Re-export key types for easier access from other modules (and lib.rs)
pub use context_data::ContextData;
pub use control::{ExecutionStatus, PipelineControl};
pub use state::{Field, StepInput, WorkflowState};
pub use step::{FnTransform, StepDef, StepTransform};
