// overture/src/realize/midi.rs

//! Standard MIDI File output for validated scores.
//!
//! Format 1: track 0 carries title, tempo and time signature; each score track
//! gets its own MIDI track and channel, skipping channel 10 (percussion).

use crate::realize::score::{Score, Track, STEPS_PER_BEAT};
use midly::{
  num::{u15, u24, u28, u4, u7},
  Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};
use std::path::Path;

/// Ticks per quarter note in MIDI output.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Ticks per quantization step (a sixteenth note).
const TICKS_PER_STEP: u32 = TICKS_PER_QUARTER as u32 / STEPS_PER_BEAT;

const PERCUSSION_CHANNEL: u8 = 9;

/// Renders `score` and writes it to `path`.
pub fn write_midi(score: &Score, path: &Path) -> std::io::Result<()> {
  std::fs::write(path, render_midi(score)?)
}

/// Renders `score` to SMF bytes.
pub fn render_midi(score: &Score) -> std::io::Result<Vec<u8>> {
  let smf = score_to_smf(score);
  let mut buf = Vec::new();
  smf.write_std(&mut buf)?;
  Ok(buf)
}

fn score_to_smf(score: &Score) -> Smf<'_> {
  let mut smf = Smf::new(Header::new(
    Format::Parallel,
    Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
  ));

  // Track 0: conductor track
  let (num, den) = score.time_signature;
  let tempo_microseconds = 60_000_000 / score.tempo_bpm as u32;
  smf.tracks.push(vec![
    meta(MetaMessage::TrackName(score.title.as_bytes())),
    meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
    meta(MetaMessage::TimeSignature(num, den.trailing_zeros() as u8, 24, 8)),
    meta(MetaMessage::EndOfTrack),
  ]);

  for (idx, track) in score.tracks.iter().enumerate() {
    smf.tracks.push(track_events(track, channel_for(idx)));
  }
  smf
}

fn channel_for(track_idx: usize) -> u8 {
  // Validation caps tracks at fifteen, so this stays within 0..=15.
  let ch = track_idx as u8;
  if ch >= PERCUSSION_CHANNEL {
    ch + 1
  } else {
    ch
  }
}

fn meta(message: MetaMessage<'_>) -> TrackEvent<'_> {
  TrackEvent {
    delta: u28::new(0),
    kind: TrackEventKind::Meta(message),
  }
}

fn track_events(track: &Track, channel: u8) -> Vec<TrackEvent<'_>> {
  let channel = u4::new(channel);
  let mut events = vec![
    meta(MetaMessage::TrackName(track.name.as_bytes())),
    TrackEvent {
      delta: u28::new(0),
      kind: TrackEventKind::Midi {
        channel,
        message: MidiMessage::ProgramChange {
          program: u7::new(track.program),
        },
      },
    },
  ];

  // Ticks elapsed since the last emitted event; rests only grow this.
  let mut pending_delta: u32 = 0;
  for event in &track.events {
    let length = event.steps * TICKS_PER_STEP;
    if event.is_rest() {
      pending_delta += length;
      continue;
    }
    for (i, pitch) in event.pitches.iter().enumerate() {
      events.push(TrackEvent {
        delta: u28::new(if i == 0 { pending_delta } else { 0 }),
        kind: TrackEventKind::Midi {
          channel,
          message: MidiMessage::NoteOn {
            key: u7::new(*pitch),
            vel: u7::new(event.velocity),
          },
        },
      });
    }
    for (i, pitch) in event.pitches.iter().enumerate() {
      events.push(TrackEvent {
        delta: u28::new(if i == 0 { length } else { 0 }),
        kind: TrackEventKind::Midi {
          channel,
          message: MidiMessage::NoteOff {
            key: u7::new(*pitch),
            vel: u7::new(0),
          },
        },
      });
    }
    pending_delta = 0;
  }

  events.push(TrackEvent {
    delta: u28::new(pending_delta),
    kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
  });
  events
}
