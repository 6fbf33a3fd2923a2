// overture/src/composition.rs

//! The standard composition pipeline: four generative steps followed by the
//! artifact realizer.

use crate::core::state::Field;
use crate::error::OvertureResult;
use crate::generative::client::{GeneratorConfig, TextGenerator};
use crate::generative::step::GenerativeStep;
use crate::generative::template::PromptTemplate;
use crate::pipeline::definition::Pipeline;
use crate::realize::ArtifactRealizer;
use std::path::PathBuf;
use std::sync::Arc;

pub const PIPELINE_NAME: &str = "composition";

pub const MELODY_STEP: &str = "melody_generator";
pub const HARMONY_STEP: &str = "harmony_creator";
pub const RHYTHM_STEP: &str = "rhythm_analyzer";
pub const STYLE_STEP: &str = "style_adapter";
pub const REALIZE_STEP: &str = "midi_converter";

pub const MELODY_PROMPT: &str = "Write a melody for the following request: {input_brief}.\n\
Give the notes in scientific pitch notation (for example C4 E4 G4) with a duration in beats for each note.";

pub const HARMONY_PROMPT: &str = "Request: {input_brief}\n\
Melody:\n{melody}\n\n\
Write a chord progression that harmonizes this melody. Name each chord and the beats it lasts.";

pub const RHYTHM_PROMPT: &str = "Request: {input_brief}\n\
Melody:\n{melody}\n\
Harmony:\n{harmony}\n\n\
Describe a rhythmic feel for this piece: tempo in BPM, time signature, and the rhythmic pattern of the melody and accompaniment.";

pub const STYLE_PROMPT: &str = "Adapt the following material to the style: {style}.\n\n\
Melody:\n{melody}\n\
Harmony:\n{harmony}\n\
Rhythm:\n{rhythm}\n\n\
Reply with a single JSON object and nothing else, using exactly this shape:\n\
{{\"title\": \"...\", \"tempo_bpm\": 100, \"time_signature\": [4, 4], \"instrument\": \"piano\", \
\"tracks\": [{{\"name\": \"melody\", \"notes\": [{{\"pitch\": \"C4\", \"duration\": 1.0, \"velocity\": 80}}]}}, \
{{\"name\": \"harmony\", \"notes\": [{{\"pitch\": [\"C3\", \"E3\", \"G3\"], \"duration\": 4.0}}]}}]}}\n\
Pitches are note names like C4, F#3, Bb2, MIDI numbers, a list of them for a chord, or \"rest\". \
Durations are in beats. Use at most 15 tracks.";

/// Builds the standard pipeline, seeded by `input_brief` and `style`.
///
/// Every generative step shares `generator` and takes its timeout and retry
/// policy from `config`. Realized files land under `output_dir`.
pub fn composition_pipeline(
  generator: Arc<dyn TextGenerator>,
  config: &GeneratorConfig,
  output_dir: impl Into<PathBuf>,
) -> OvertureResult<Pipeline> {
  composition_pipeline_with(generator, config, ArtifactRealizer::new(output_dir))
}

/// Same as [`composition_pipeline`], with a caller-supplied realizer.
pub fn composition_pipeline_with(
  generator: Arc<dyn TextGenerator>,
  config: &GeneratorConfig,
  realizer: ArtifactRealizer,
) -> OvertureResult<Pipeline> {
  let generative = |prompt: &str| -> OvertureResult<GenerativeStep> {
    Ok(GenerativeStep::from_config(
      PromptTemplate::parse(prompt)?,
      Arc::clone(&generator),
      config,
    ))
  };

  Pipeline::builder(PIPELINE_NAME)
    .seeds(&[Field::InputBrief, Field::Style])
    .step(generative(MELODY_PROMPT)?.into_step_def(MELODY_STEP, Field::Melody))
    .step(generative(HARMONY_PROMPT)?.into_step_def(HARMONY_STEP, Field::Harmony))
    .step(generative(RHYTHM_PROMPT)?.into_step_def(RHYTHM_STEP, Field::Rhythm))
    .step(generative(STYLE_PROMPT)?.into_step_def(STYLE_STEP, Field::Composition))
    .step(realizer.into_step_def(REALIZE_STEP))
    .build()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prompts_read_the_expected_fields() {
    let fields = |p: &str| PromptTemplate::parse(p).unwrap().fields().to_vec();
    assert_eq!(fields(MELODY_PROMPT), vec![Field::InputBrief]);
    assert_eq!(fields(HARMONY_PROMPT), vec![Field::InputBrief, Field::Melody]);
    assert_eq!(fields(RHYTHM_PROMPT), vec![Field::InputBrief, Field::Melody, Field::Harmony]);
    assert_eq!(
      fields(STYLE_PROMPT),
      vec![Field::Style, Field::Melody, Field::Harmony, Field::Rhythm]
    );
  }

  #[test]
  fn style_prompt_shows_a_literal_json_example() {
    let template = PromptTemplate::parse(STYLE_PROMPT).unwrap();
    assert!(template.source().contains("{{\"title\""));
  }
}
