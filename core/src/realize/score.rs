// overture/src/realize/score.rs

//! The declarative score description the composition step must produce, and
//! its validation into a render-ready `Score`.
//!
//! Deserialization is strict: unknown keys are rejected, and every numeric
//! range is checked before anything touches the filesystem.

use crate::realize::RealizationError;
use serde::{Deserialize, Serialize};

pub const MIN_TEMPO_BPM: u16 = 30;
pub const MAX_TEMPO_BPM: u16 = 300;
/// Channel 10 (index 9) is reserved for percussion, leaving fifteen melodic channels.
pub const MAX_TRACKS: usize = 15;
pub const MAX_NOTES_PER_TRACK: usize = 4096;
pub const MAX_DURATION_BEATS: f64 = 16.0;
pub const DEFAULT_VELOCITY: u8 = 80;
/// Durations are quantized to this many steps per beat (sixteenth notes in 4/4).
pub const STEPS_PER_BEAT: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreDescription {
  pub title: String,
  pub tempo_bpm: u16,
  #[serde(default)]
  pub time_signature: Option<[u8; 2]>,
  #[serde(default)]
  pub instrument: Option<InstrumentSpec>,
  #[serde(default)]
  pub output_filename: Option<String>,
  pub tracks: Vec<TrackSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackSpec {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub instrument: Option<InstrumentSpec>,
  pub notes: Vec<NoteSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteSpec {
  pub pitch: PitchSpec,
  /// Length in beats.
  pub duration: f64,
  #[serde(default)]
  pub velocity: Option<i64>,
}

/// `"C4"`, `60`, `"rest"`, or a chord such as `["C4", "E4", "G4"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PitchSpec {
  Number(i64),
  Name(String),
  Chord(Vec<PitchSpec>),
}

/// General MIDI program number or a common instrument name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstrumentSpec {
  Program(i64),
  Name(String),
}

/// A validated score, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
  pub title: String,
  pub tempo_bpm: u16,
  /// (numerator, denominator)
  pub time_signature: (u8, u8),
  pub output_filename: String,
  pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
  pub name: String,
  pub program: u8,
  pub events: Vec<ScoreEvent>,
}

/// Notes sounding together for `steps` quantization steps. No pitches means a rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEvent {
  pub pitches: Vec<u8>,
  pub steps: u32,
  pub velocity: u8,
}

impl ScoreEvent {
  pub fn is_rest(&self) -> bool {
    self.pitches.is_empty()
  }
}

impl ScoreDescription {
  pub fn from_json(text: &str) -> Result<Self, RealizationError> {
    serde_json::from_str(text).map_err(|e| RealizationError::Parse(format!("score description: {}", e)))
  }

  pub fn validate(self) -> Result<Score, RealizationError> {
    let title = self.title.trim().to_string();
    if title.is_empty() {
      return Err(schema("title must not be empty"));
    }
    if !(MIN_TEMPO_BPM..=MAX_TEMPO_BPM).contains(&self.tempo_bpm) {
      return Err(schema(format!(
        "tempo_bpm {} outside {}..={}",
        self.tempo_bpm, MIN_TEMPO_BPM, MAX_TEMPO_BPM
      )));
    }
    let time_signature = match self.time_signature {
      None => (4, 4),
      Some([num, den]) => {
        if !(1..=32).contains(&num) || !matches!(den, 1 | 2 | 4 | 8 | 16 | 32) {
          return Err(schema(format!("invalid time signature {}/{}", num, den)));
        }
        (num, den)
      }
    };
    if self.tracks.is_empty() || self.tracks.len() > MAX_TRACKS {
      return Err(schema(format!("expected 1..={} tracks, got {}", MAX_TRACKS, self.tracks.len())));
    }

    let default_program = match &self.instrument {
      Some(spec) => resolve_instrument(spec)?,
      None => 0,
    };

    let tracks = self
      .tracks
      .into_iter()
      .enumerate()
      .map(|(idx, track)| validate_track(idx, track, default_program))
      .collect::<Result<Vec<_>, _>>()?;

    let output_filename = match self.output_filename {
      Some(name) => sanitize_filename(&name)?,
      None => format!("{}.mid", slugify(&title)),
    };

    Ok(Score {
      title,
      tempo_bpm: self.tempo_bpm,
      time_signature,
      output_filename,
      tracks,
    })
  }
}

fn validate_track(idx: usize, track: TrackSpec, default_program: u8) -> Result<Track, RealizationError> {
  let name = track
    .name
    .map(|n| n.trim().to_string())
    .filter(|n| !n.is_empty())
    .unwrap_or_else(|| format!("Track {}", idx + 1));
  if track.notes.is_empty() || track.notes.len() > MAX_NOTES_PER_TRACK {
    return Err(schema(format!(
      "track '{}' must have 1..={} notes, got {}",
      name,
      MAX_NOTES_PER_TRACK,
      track.notes.len()
    )));
  }
  let program = match &track.instrument {
    Some(spec) => resolve_instrument(spec)?,
    None => default_program,
  };
  let events = track
    .notes
    .iter()
    .enumerate()
    .map(|(note_idx, note)| {
      validate_note(note).map_err(|e| schema(format!("track '{}', note {}: {}", name, note_idx + 1, e)))
    })
    .collect::<Result<Vec<_>, _>>()?;
  Ok(Track { name, program, events })
}

fn validate_note(note: &NoteSpec) -> Result<ScoreEvent, String> {
  let pitches = resolve_pitch(&note.pitch, true)?;
  if !note.duration.is_finite() || note.duration <= 0.0 || note.duration > MAX_DURATION_BEATS {
    return Err(format!("duration {} outside (0, {}] beats", note.duration, MAX_DURATION_BEATS));
  }
  let steps = (note.duration * STEPS_PER_BEAT as f64).round() as u32;
  if steps == 0 {
    return Err(format!("duration {} is shorter than one sixteenth", note.duration));
  }
  let velocity = match note.velocity {
    None => DEFAULT_VELOCITY,
    Some(v) if (1..=127).contains(&v) => v as u8,
    Some(v) => return Err(format!("velocity {} outside 1..=127", v)),
  };
  Ok(ScoreEvent { pitches, steps, velocity })
}

fn resolve_pitch(spec: &PitchSpec, allow_chord: bool) -> Result<Vec<u8>, String> {
  match spec {
    PitchSpec::Number(n) if (0..=127).contains(n) => Ok(vec![*n as u8]),
    PitchSpec::Number(n) => Err(format!("MIDI pitch {} outside 0..=127", n)),
    PitchSpec::Name(name) => Ok(parse_pitch(name)?.into_iter().collect()),
    PitchSpec::Chord(_) if !allow_chord => Err("chords cannot be nested".to_string()),
    PitchSpec::Chord(items) => {
      if items.is_empty() {
        return Err("chord must contain at least one pitch".to_string());
      }
      let mut pitches = Vec::with_capacity(items.len());
      for item in items {
        for p in resolve_pitch(item, false)? {
          if !pitches.contains(&p) {
            pitches.push(p);
          }
        }
      }
      if pitches.is_empty() {
        return Err("chord contains only rests".to_string());
      }
      Ok(pitches)
    }
  }
}

/// Parses scientific pitch notation (`C4` = 60, `F#3`, `Bb5`, `C-1` = 0).
/// `rest` or `r` yields `None`.
pub fn parse_pitch(name: &str) -> Result<Option<u8>, String> {
  let trimmed = name.trim();
  if trimmed.eq_ignore_ascii_case("rest") || trimmed.eq_ignore_ascii_case("r") {
    return Ok(None);
  }
  let mut chars = trimmed.chars();
  let letter = chars.next().ok_or_else(|| "empty pitch".to_string())?;
  let pitch_class: i32 = match letter.to_ascii_uppercase() {
    'C' => 0,
    'D' => 2,
    'E' => 4,
    'F' => 5,
    'G' => 7,
    'A' => 9,
    'B' => 11,
    _ => return Err(format!("invalid pitch '{}'", trimmed)),
  };
  let rest = chars.as_str();
  let accidental_len = rest.chars().take_while(|c| *c == '#' || *c == 'b').count();
  if accidental_len > 2 {
    return Err(format!("invalid pitch '{}'", trimmed));
  }
  let (accidentals, octave) = rest.split_at(accidental_len);
  let shift: i32 = accidentals.chars().map(|c| if c == '#' { 1 } else { -1 }).sum();
  let octave: i32 = octave
    .parse()
    .map_err(|_| format!("invalid pitch '{}': missing or bad octave", trimmed))?;
  let midi = (octave + 1) * 12 + pitch_class + shift;
  if !(0..=127).contains(&midi) {
    return Err(format!("pitch '{}' outside the MIDI range", trimmed));
  }
  Ok(Some(midi as u8))
}

fn resolve_instrument(spec: &InstrumentSpec) -> Result<u8, RealizationError> {
  match spec {
    InstrumentSpec::Program(p) if (0..=127).contains(p) => Ok(*p as u8),
    InstrumentSpec::Program(p) => Err(schema(format!("instrument program {} outside 0..=127", p))),
    InstrumentSpec::Name(name) => {
      let key = name.trim().to_ascii_lowercase();
      GM_INSTRUMENTS
        .iter()
        .find(|(n, _)| *n == key)
        .map(|(_, p)| *p)
        .ok_or_else(|| schema(format!("unknown instrument '{}'", name)))
    }
  }
}

const GM_INSTRUMENTS: &[(&str, u8)] = &[
  ("piano", 0),
  ("acoustic grand piano", 0),
  ("grand piano", 0),
  ("bright piano", 1),
  ("electric piano", 4),
  ("harpsichord", 6),
  ("celesta", 8),
  ("glockenspiel", 9),
  ("music box", 10),
  ("vibraphone", 11),
  ("marimba", 12),
  ("xylophone", 13),
  ("organ", 19),
  ("church organ", 19),
  ("accordion", 21),
  ("harmonica", 22),
  ("guitar", 24),
  ("nylon guitar", 24),
  ("acoustic guitar", 25),
  ("electric guitar", 27),
  ("bass", 32),
  ("acoustic bass", 32),
  ("electric bass", 33),
  ("violin", 40),
  ("viola", 41),
  ("cello", 42),
  ("contrabass", 43),
  ("double bass", 43),
  ("harp", 46),
  ("timpani", 47),
  ("strings", 48),
  ("string ensemble", 48),
  ("choir", 52),
  ("voice", 53),
  ("trumpet", 56),
  ("trombone", 57),
  ("tuba", 58),
  ("french horn", 60),
  ("horn", 60),
  ("brass", 61),
  ("soprano sax", 64),
  ("alto sax", 65),
  ("saxophone", 65),
  ("tenor sax", 66),
  ("oboe", 68),
  ("english horn", 69),
  ("bassoon", 70),
  ("clarinet", 71),
  ("piccolo", 72),
  ("flute", 73),
  ("recorder", 74),
  ("pan flute", 75),
  ("sitar", 104),
  ("banjo", 105),
  ("koto", 107),
  ("bagpipe", 109),
];

/// Accepts a bare file name, adding `.mid` when there is no extension.
fn sanitize_filename(name: &str) -> Result<String, RealizationError> {
  let name = name.trim();
  let bad = name.is_empty()
    || name.starts_with('.')
    || name.contains("..")
    || name.chars().any(|c| c == '/' || c == '\\' || c.is_control() || c == ':');
  if bad {
    return Err(schema(format!("output_filename '{}' must be a bare file name", name)));
  }
  let lower = name.to_ascii_lowercase();
  if lower.ends_with(".mid") || lower.ends_with(".midi") {
    return Ok(name.to_string());
  }
  if let Some((_, ext)) = name.rsplit_once('.') {
    return Err(schema(format!("output_filename extension '.{}' is not a MIDI extension", ext)));
  }
  Ok(format!("{}.mid", name))
}

fn slugify(title: &str) -> String {
  let mut slug = String::new();
  for c in title.chars() {
    if c.is_ascii_alphanumeric() {
      slug.push(c.to_ascii_lowercase());
    } else if !slug.ends_with('-') && !slug.is_empty() {
      slug.push('-');
    }
  }
  let slug = slug.trim_end_matches('-');
  if slug.is_empty() {
    "composition".to_string()
  } else {
    slug.chars().take(64).collect()
  }
}

fn schema(message: impl Into<String>) -> RealizationError {
  RealizationError::Schema(message.into())
}
