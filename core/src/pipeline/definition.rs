// overture/src/pipeline/definition.rs

//! Contains the `Pipeline` struct, its builder, and the static validation that
//! runs before any session can execute.

use crate::core::state::Field;
use crate::core::step::StepDef;
use crate::error::{OvertureError, OvertureResult};
use crate::pipeline::hooks::Hook;
use std::collections::{HashMap, HashSet};
use tracing::{event, Level};

/// A validated pipeline: steps in execution order plus the seed fields the
/// caller must supply.
///
/// Built only through [`PipelineBuilder::build`], so every `Pipeline` in
/// existence has unique step names, disjoint output fields, and inputs that
/// are all produced by a seed or an earlier step.
pub struct Pipeline {
  pub(crate) name: String,
  pub(crate) seed_fields: Vec<Field>,
  /// Steps in topological (execution) order.
  pub(crate) steps: Vec<StepDef>,

  pub(crate) before: HashMap<String, Vec<Hook>>,
  pub(crate) after: HashMap<String, Vec<Hook>>,
}

impl Pipeline {
  pub fn builder(name: impl Into<String>) -> PipelineBuilder {
    PipelineBuilder::new(name)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn seed_fields(&self) -> &[Field] {
    &self.seed_fields
  }

  pub fn steps(&self) -> &[StepDef] {
    &self.steps
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  pub fn entry_step(&self) -> &str {
    // build() rejects empty pipelines.
    &self.steps[0].name
  }

  pub fn terminal_step(&self) -> &str {
    &self.steps[self.steps.len() - 1].name
  }

  /// Execution index of `step_name`, if it belongs to this pipeline.
  pub fn position(&self, step_name: &str) -> Option<usize> {
    self.steps.iter().position(|s| s.name == step_name)
  }

  /// Every field a completed session will hold.
  pub fn declared_fields(&self) -> Vec<Field> {
    let mut fields = self.seed_fields.clone();
    fields.extend(self.steps.iter().map(|s| s.output));
    fields
  }

  pub(crate) fn ensure_step_exists(&self, step_name: &str) -> OvertureResult<()> {
    if self.position(step_name).is_none() {
      return Err(OvertureError::validation(format!(
        "step '{}' not found in pipeline '{}'",
        step_name, self.name
      )));
    }
    Ok(())
  }
}

impl std::fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pipeline")
      .field("name", &self.name)
      .field("seed_fields", &self.seed_fields)
      .field("steps", &self.steps)
      .finish_non_exhaustive()
  }
}

/// Collects seed fields and steps, then validates them into a `Pipeline`.
pub struct PipelineBuilder {
  name: String,
  seed_fields: Vec<Field>,
  steps: Vec<StepDef>,
}

impl PipelineBuilder {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      seed_fields: Vec::new(),
      steps: Vec::new(),
    }
  }

  /// Declares a field the caller must provide when starting a session.
  pub fn seed(mut self, field: Field) -> Self {
    if !self.seed_fields.contains(&field) {
      self.seed_fields.push(field);
    }
    self
  }

  pub fn seeds(self, fields: &[Field]) -> Self {
    fields.iter().fold(self, |b, f| b.seed(*f))
  }

  pub fn step(mut self, step: StepDef) -> Self {
    self.steps.push(step);
    self
  }

  /// Validates the definition and fixes the execution order.
  ///
  /// Steps are ordered topologically by their field dependencies; among steps
  /// that are ready at the same time, declaration order wins. A plain linear
  /// declaration therefore runs exactly as written.
  pub fn build(self) -> OvertureResult<Pipeline> {
    let PipelineBuilder { name, seed_fields, steps } = self;

    if steps.is_empty() {
      return Err(OvertureError::validation(format!("pipeline '{}' has no steps", name)));
    }

    let mut names = HashSet::new();
    for step in &steps {
      if step.name.trim().is_empty() {
        return Err(OvertureError::validation("step names must not be empty"));
      }
      if !names.insert(step.name.as_str()) {
        return Err(OvertureError::validation(format!("duplicate step name '{}'", step.name)));
      }
    }

    let mut producers: HashMap<Field, &str> = HashMap::new();
    for step in &steps {
      if seed_fields.contains(&step.output) {
        return Err(OvertureError::validation(format!(
          "step '{}' writes seed field '{}'",
          step.name, step.output
        )));
      }
      if let Some(other) = producers.insert(step.output, step.name.as_str()) {
        return Err(OvertureError::validation(format!(
          "steps '{}' and '{}' both write field '{}'",
          other, step.name, step.output
        )));
      }
    }

    for step in &steps {
      for input in &step.inputs {
        if !seed_fields.contains(input) && !producers.contains_key(input) {
          return Err(OvertureError::validation(format!(
            "input field '{}' of step '{}' is never produced by a seed or an earlier step",
            input, step.name
          )));
        }
      }
    }

    let ordered = topological_order(&seed_fields, steps)?;
    event!(
      Level::DEBUG,
      pipeline = %name,
      steps = ?ordered.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
      "Pipeline validated."
    );

    Ok(Pipeline {
      name,
      seed_fields,
      steps: ordered,
      before: HashMap::new(),
      after: HashMap::new(),
    })
  }
}

fn topological_order(seed_fields: &[Field], steps: Vec<StepDef>) -> OvertureResult<Vec<StepDef>> {
  let mut available: HashSet<Field> = seed_fields.iter().copied().collect();
  let mut pending: Vec<Option<StepDef>> = steps.into_iter().map(Some).collect();
  let mut ordered = Vec::with_capacity(pending.len());

  while ordered.len() < pending.len() {
    let ready = pending.iter().position(|slot| {
      slot
        .as_ref()
        .is_some_and(|s| s.inputs.iter().all(|f| available.contains(f)))
    });
    match ready {
      Some(idx) => {
        if let Some(step) = pending[idx].take() {
          available.insert(step.output);
          ordered.push(step);
        }
      }
      None => {
        let stuck: Vec<&str> = pending.iter().flatten().map(|s| s.name.as_str()).collect();
        return Err(OvertureError::validation(format!(
          "dependency cycle between steps {:?}",
          stuck
        )));
      }
    }
  }
  Ok(ordered)
}
