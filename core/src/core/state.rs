// overture/src/core/state.rs

//! The workflow accumulator: a statically declared record with one slot per
//! pipeline field, and the `StepInput` view a step receives.
//!
//! Fields are filled monotonically. Only the driver writes to a `WorkflowState`
//! once a session has started, and only into the output field of the step that
//! just finished.

use crate::error::{OvertureError, OvertureResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Names of every field a `WorkflowState` can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
  InputBrief,
  Style,
  Melody,
  Harmony,
  Rhythm,
  Composition,
  OutputPath,
}

impl Field {
  pub const ALL: [Field; 7] = [
    Field::InputBrief,
    Field::Style,
    Field::Melody,
    Field::Harmony,
    Field::Rhythm,
    Field::Composition,
    Field::OutputPath,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Field::InputBrief => "input_brief",
      Field::Style => "style",
      Field::Melody => "melody",
      Field::Harmony => "harmony",
      Field::Rhythm => "rhythm",
      Field::Composition => "composition",
      Field::OutputPath => "output_path",
    }
  }

  pub fn from_name(name: &str) -> Option<Field> {
    Field::ALL.iter().copied().find(|f| f.name() == name)
  }
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Field {
  type Err = OvertureError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Field::from_name(s).ok_or_else(|| OvertureError::InvalidInput {
      message: format!("unknown workflow field '{}'", s),
    })
  }
}

/// Shared record threaded through every step of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub input_brief: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub style: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub melody: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub harmony: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rhythm: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub composition: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_path: Option<String>,
}

impl WorkflowState {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed state for the standard composition pipeline.
  pub fn seeded(input_brief: impl Into<String>, style: impl Into<String>) -> Self {
    Self::new()
      .with(Field::InputBrief, input_brief)
      .with(Field::Style, style)
  }

  /// Builder-style setter for seed fields.
  pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
    *self.slot_mut(field) = Some(value.into());
    self
  }

  pub fn get(&self, field: Field) -> Option<&str> {
    self.slot(field).as_deref()
  }

  pub fn is_set(&self, field: Field) -> bool {
    self.slot(field).is_some()
  }

  /// Fields currently holding a value, in declaration order.
  pub fn set_fields(&self) -> Vec<Field> {
    Field::ALL.iter().copied().filter(|f| self.is_set(*f)).collect()
  }

  pub(crate) fn set(&mut self, field: Field, value: String) {
    *self.slot_mut(field) = Some(value);
  }

  fn slot(&self, field: Field) -> &Option<String> {
    match field {
      Field::InputBrief => &self.input_brief,
      Field::Style => &self.style,
      Field::Melody => &self.melody,
      Field::Harmony => &self.harmony,
      Field::Rhythm => &self.rhythm,
      Field::Composition => &self.composition,
      Field::OutputPath => &self.output_path,
    }
  }

  fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
    match field {
      Field::InputBrief => &mut self.input_brief,
      Field::Style => &mut self.style,
      Field::Melody => &mut self.melody,
      Field::Harmony => &mut self.harmony,
      Field::Rhythm => &mut self.rhythm,
      Field::Composition => &mut self.composition,
      Field::OutputPath => &mut self.output_path,
    }
  }
}

/// Read-only view of the fields a step declared as inputs.
///
/// A transform can only see what its `StepDef` asked for; asking for anything
/// else yields `MissingDependency`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInput {
  session_id: String,
  step_name: String,
  values: BTreeMap<Field, String>,
}

impl StepInput {
  /// Copies the declared `inputs` out of `state`.
  pub fn from_state(
    session_id: &str,
    step_name: &str,
    inputs: &[Field],
    state: &WorkflowState,
  ) -> OvertureResult<Self> {
    let mut values = BTreeMap::new();
    for field in inputs {
      let value = state.get(*field).ok_or_else(|| OvertureError::MissingDependency {
        step_name: step_name.to_string(),
        field: field.name().to_string(),
      })?;
      values.insert(*field, value.to_string());
    }
    Ok(Self {
      session_id: session_id.to_string(),
      step_name: step_name.to_string(),
      values,
    })
  }

  pub fn get(&self, field: Field) -> OvertureResult<&str> {
    self
      .values
      .get(&field)
      .map(String::as_str)
      .ok_or_else(|| OvertureError::MissingDependency {
        step_name: self.step_name.clone(),
        field: field.name().to_string(),
      })
  }

  pub fn session_id(&self) -> &str {
    &self.session_id
  }

  pub fn step_name(&self) -> &str {
    &self.step_name
  }

  pub fn fields(&self) -> impl Iterator<Item = (Field, &str)> {
    self.values.iter().map(|(f, v)| (*f, v.as_str()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn field_names_round_trip() {
    for field in Field::ALL {
      assert_eq!(Field::from_name(field.name()), Some(field));
    }
    assert_eq!("melody".parse::<Field>().unwrap(), Field::Melody);
    assert!("tempo".parse::<Field>().is_err());
  }

  #[test]
  fn seeded_state_only_sets_seed_fields() {
    let state = WorkflowState::seeded("happy piano piece in C major", "Romantic era");
    assert_eq!(state.set_fields(), vec![Field::InputBrief, Field::Style]);
    assert_eq!(state.get(Field::Style), Some("Romantic era"));
    assert!(!state.is_set(Field::Melody));
  }

  #[test]
  fn checkpoint_json_omits_unset_fields() {
    let state = WorkflowState::seeded("brief", "Baroque");
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json, serde_json::json!({"input_brief": "brief", "style": "Baroque"}));
    let back: WorkflowState = serde_json::from_value(json).unwrap();
    assert_eq!(back, state);
  }

  #[test]
  fn step_input_requires_declared_fields() {
    let state = WorkflowState::seeded("brief", "Jazz");
    let err = StepInput::from_state("s1", "harmony_creator", &[Field::Melody], &state).unwrap_err();
    match err {
      OvertureError::MissingDependency { step_name, field } => {
        assert_eq!(step_name, "harmony_creator");
        assert_eq!(field, "melody");
      }
      other => panic!("expected MissingDependency, got {:?}", other),
    }
  }

  #[test]
  fn step_input_hides_undeclared_fields() {
    let state = WorkflowState::seeded("brief", "Jazz");
    let input = StepInput::from_state("s1", "melody_generator", &[Field::InputBrief], &state).unwrap();
    assert_eq!(input.get(Field::InputBrief).unwrap(), "brief");
    assert!(input.get(Field::Style).is_err());
    assert_eq!(input.session_id(), "s1");
  }
}
