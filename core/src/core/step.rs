// overture/src/core/step.rs

//! Defines a single step of a pipeline and the transform it runs.

use crate::core::state::{Field, StepInput};
use crate::error::OvertureResult;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// The work a step performs: declared inputs in, the text for its output field out.
#[async_trait]
pub trait StepTransform: Send + Sync {
  async fn run(&self, input: StepInput) -> OvertureResult<String>;
}

/// Adapts an async closure into a `StepTransform`.
pub struct FnTransform<F>(F);

#[async_trait]
impl<F, Fut> StepTransform for FnTransform<F>
where
  F: Fn(StepInput) -> Fut + Send + Sync,
  Fut: Future<Output = OvertureResult<String>> + Send + 'static,
{
  async fn run(&self, input: StepInput) -> OvertureResult<String> {
    (self.0)(input).await
  }
}

/// Definition of a pipeline step: unique name, the fields it reads, the one
/// field it writes, and its transform.
#[derive(Clone)]
pub struct StepDef {
  pub name: String,
  pub inputs: Vec<Field>,
  pub output: Field,
  pub transform: Arc<dyn StepTransform>,
}

impl StepDef {
  pub fn new(
    name: impl Into<String>,
    inputs: &[Field],
    output: Field,
    transform: impl StepTransform + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      inputs: inputs.to_vec(),
      output,
      transform: Arc::new(transform),
    }
  }

  /// Builds a step from an async closure.
  pub fn from_fn<F, Fut>(name: impl Into<String>, inputs: &[Field], output: Field, f: F) -> Self
  where
    F: Fn(StepInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = OvertureResult<String>> + Send + 'static,
  {
    Self::new(name, inputs, output, FnTransform(f))
  }
}

// The transform is a trait object, so Debug only reports its presence.
impl std::fmt::Debug for StepDef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDef")
      .field("name", &self.name)
      .field("inputs", &self.inputs)
      .field("output", &self.output)
      .finish_non_exhaustive()
  }
}
