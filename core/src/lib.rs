// src/lib.rs

//! Overture: a staged, checkpointed workflow engine for generative music composition.
//!
//! A session carries a typed `WorkflowState` through a fixed sequence of steps:
//!  - Four generative steps (melody, harmony, rhythm, style adaptation), each a
//!    prompt template sent to an external text generation service with a
//!    per-call timeout and bounded retry.
//!  - An artifact realizer that validates the model-authored score description
//!    against a strict schema and writes a Standard MIDI File.
//!
//! Every completed step is checkpointed, so an interrupted or failed session
//! can be resumed without re-running the steps that already succeeded.

pub mod checkpoint;
pub mod composition;
pub mod config;
pub mod core;
pub mod error;
pub mod generative;
pub mod pipeline;
pub mod realize;

// --- Re-exports for the Public API ---

pub use crate::core::context_data::ContextData;
pub use crate::core::control::{ExecutionStatus, PipelineControl};
pub use crate::core::state::{Field, StepInput, WorkflowState};
pub use crate::core::step::{StepDef, StepTransform};

pub use crate::pipeline::definition::{Pipeline, PipelineBuilder};
pub use crate::pipeline::execution::{ExecutionResult, Executor};

pub use crate::checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};

pub use crate::generative::client::{GenerationError, GeneratorConfig, HttpTextGenerator, RetryPolicy, TextGenerator};
pub use crate::generative::step::GenerativeStep;
pub use crate::generative::template::PromptTemplate;

pub use crate::realize::{ArtifactRealizer, MidiRenderer, RealizationError, ScoreRenderer};

pub use crate::composition::composition_pipeline;
pub use crate::config::OvertureConfig;
pub use crate::error::{OvertureError, OvertureResult};
