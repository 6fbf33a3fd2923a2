// overture/src/pipeline/mod.rs

//! Defines the `Pipeline` struct, its construction and validation, step hooks,
//! and the `Executor` that runs sessions.

pub mod definition;
pub mod execution;
pub mod hooks;

pub use definition::{Pipeline, PipelineBuilder};
pub use execution::{ExecutionResult, Executor};
