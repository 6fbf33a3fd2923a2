// overture/src/realize/mod.rs

//! The artifact realizer: the terminal step that turns model-authored
//! composition text into a MIDI file on disk.
//!
//! The composition is treated as data, never as instructions. It must contain
//! a JSON [`ScoreDescription`]; that description is validated against a strict
//! schema and rendered by trusted code. All of this runs on a blocking task so
//! that any failure, a panic included, comes back as a `RealizationError`
//! instead of unwinding through the driver.

pub mod midi;
pub mod score;

pub use score::{Score, ScoreDescription};

use crate::checkpoint::is_valid_session_id;
use crate::core::state::{Field, StepInput};
use crate::core::step::{StepDef, StepTransform};
use crate::error::OvertureResult;
use crate::generative::step::clean_output;
use async_trait::async_trait;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{event, instrument, Level};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RealizationError {
  #[error("composition could not be parsed: {0}")]
  Parse(String),
  #[error("score description is invalid: {0}")]
  Schema(String),
  #[error("rendering failed: {0}")]
  Render(String),
  #[error("realization aborted: {0}")]
  Aborted(String),
}

/// Turns a validated score into a file at `path`.
pub trait ScoreRenderer: Send + Sync + 'static {
  fn render(&self, score: &Score, path: &Path) -> Result<(), RealizationError>;
}

/// Standard MIDI File renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MidiRenderer;

impl ScoreRenderer for MidiRenderer {
  fn render(&self, score: &Score, path: &Path) -> Result<(), RealizationError> {
    midi::write_midi(score, path).map_err(|e| RealizationError::Render(format!("{}: {}", path.display(), e)))
  }
}

#[derive(Clone)]
pub struct ArtifactRealizer {
  output_dir: PathBuf,
  renderer: Arc<dyn ScoreRenderer>,
}

impl ArtifactRealizer {
  pub fn new(output_dir: impl Into<PathBuf>) -> Self {
    Self {
      output_dir: output_dir.into(),
      renderer: Arc::new(MidiRenderer),
    }
  }

  pub fn with_renderer(mut self, renderer: impl ScoreRenderer) -> Self {
    self.renderer = Arc::new(renderer);
    self
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  /// Wraps the realizer as the step reading `composition` and writing `output_path`.
  pub fn into_step_def(self, name: impl Into<String>) -> StepDef {
    StepDef::new(name, &[Field::Composition], Field::OutputPath, self)
  }

  /// Writes the composition for `session_id` and returns the file path.
  ///
  /// Files land in `<output_dir>/<session_id>/` so concurrent sessions never
  /// overwrite each other.
  #[instrument(name = "ArtifactRealizer::realize", skip(self, composition), err(Display))]
  pub async fn realize(&self, session_id: &str, composition: &str) -> Result<PathBuf, RealizationError> {
    if !is_valid_session_id(session_id) {
      return Err(RealizationError::Render(format!(
        "session id '{}' cannot name an output directory",
        session_id
      )));
    }
    let dir = self.output_dir.join(session_id);
    let renderer = Arc::clone(&self.renderer);
    let text = composition.to_string();

    let task = tokio::task::spawn_blocking(move || realize_blocking(&dir, renderer.as_ref(), &text));
    match task.await {
      Ok(result) => result,
      Err(join_err) if join_err.is_panic() => {
        let message = panic_message(join_err.into_panic());
        event!(Level::ERROR, panic = %message, "Realization panicked.");
        Err(RealizationError::Aborted(format!("panic while realizing: {}", message)))
      }
      Err(join_err) => Err(RealizationError::Aborted(join_err.to_string())),
    }
  }
}

fn realize_blocking(dir: &Path, renderer: &dyn ScoreRenderer, text: &str) -> Result<PathBuf, RealizationError> {
  let json = extract_json(text)
    .ok_or_else(|| RealizationError::Parse("composition does not contain a JSON score description".to_string()))?;
  let score = ScoreDescription::from_json(json)?.validate()?;

  std::fs::create_dir_all(dir).map_err(|e| RealizationError::Render(format!("{}: {}", dir.display(), e)))?;
  let path = dir.join(&score.output_filename);
  renderer.render(&score, &path)?;

  let written = std::fs::metadata(&path)
    .map(|m| m.len())
    .map_err(|e| RealizationError::Render(format!("{}: {}", path.display(), e)))?;
  if written == 0 {
    return Err(RealizationError::Render(format!("{} is empty after rendering", path.display())));
  }
  event!(
    Level::INFO,
    path = %path.display(),
    bytes = written,
    tracks = score.tracks.len(),
    "Composition realized."
  );
  Ok(path)
}

/// The outermost `{...}` span of the (fence-stripped) text.
fn extract_json(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  if end <= start {
    return None;
  }
  Some(&text[start..=end])
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

#[async_trait]
impl StepTransform for ArtifactRealizer {
  async fn run(&self, input: StepInput) -> OvertureResult<String> {
    let composition = clean_output(input.get(Field::Composition)?);
    let path = self.realize(input.session_id(), &composition).await?;
    Ok(path.display().to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_outermost_object() {
    assert_eq!(extract_json("Here you go: {\"a\": {\"b\": 1}} enjoy"), Some("{\"a\": {\"b\": 1}}"));
    assert_eq!(extract_json("no json"), None);
    assert_eq!(extract_json("} backwards {"), None);
  }

  #[test]
  fn panic_payloads_are_readable() {
    assert_eq!(panic_message(Box::new("boom")), "boom");
    assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
    assert_eq!(panic_message(Box::new(7u8)), "non-string panic payload");
  }
}
