//! Standard MIDI File read/write for note sequences.
//!
//! Uses the `midly` crate. Output is SMF format 1: a tempo track pinned at
//! 120 BPM plus one track per instrument part. At 480 ticks per quarter and
//! 120 BPM one second is exactly 960 ticks, so the codec's millisecond grid
//! survives the container round trip.
//!
//! Reading walks every track, collecting tempo changes into a tempo map
//! first so note ticks convert to seconds under the tempo in force at each
//! point. NoteOn with velocity 0 counts as NoteOff, per the MIDI spec.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use midly::num::{u15, u24, u28, u4, u7};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
};

use crate::note::{InstrumentPart, Note, NoteSequence};
use crate::{Error, Result};

/// Ticks per quarter note in output files.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Output tempo: 120 BPM, in microseconds per quarter note (the SMF default).
const TEMPO_US_PER_QUARTER: u32 = 500_000;

/// MIDI channel reserved for percussion.
const DRUM_CHANNEL: u8 = 9;

/// Melodic channel assignment order, skipping the percussion channel.
const MELODIC_CHANNELS: [u8; 15] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15];

fn ticks_per_second() -> f64 {
    TICKS_PER_QUARTER as f64 * 1_000_000.0 / TEMPO_US_PER_QUARTER as f64
}

/// Write a note sequence as a Standard MIDI File.
pub fn write_file(sequence: &NoteSequence, path: &Path) -> Result<()> {
    let smf = to_smf(sequence);
    smf.save(path)?;
    Ok(())
}

/// Read a Standard MIDI File into a note sequence.
///
/// Tracks without notes (e.g. tempo-only tracks) produce no part.
pub fn read_file(path: &Path) -> Result<NoteSequence> {
    let bytes = fs::read(path)?;
    from_bytes(&bytes)
}

/// Parse SMF bytes into a note sequence.
pub fn from_bytes(bytes: &[u8]) -> Result<NoteSequence> {
    let smf = Smf::parse(bytes)?;
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int() as f64,
        Timing::Timecode(..) => {
            return Err(Error::Midi("SMPTE timecode timing is not supported".into()))
        }
    };

    let tempo_map = TempoMap::collect(&smf, ticks_per_quarter);
    let mut sequence = NoteSequence::default();
    for track in &smf.tracks {
        if let Some(part) = read_track(track, &tempo_map) {
            sequence.parts.push(part);
        }
    }
    Ok(sequence)
}

fn to_smf(sequence: &NoteSequence) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let mut tempo_track: Track<'static> = Vec::new();
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(TEMPO_US_PER_QUARTER))),
    });
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(tempo_track);

    for (index, part) in sequence.parts.iter().enumerate() {
        smf.tracks.push(part_track(part, index));
    }
    smf
}

fn part_track(part: &InstrumentPart, index: usize) -> Track<'static> {
    let channel = if part.is_drum {
        u4::new(DRUM_CHANNEL)
    } else {
        u4::new(MELODIC_CHANNELS[index % MELODIC_CHANNELS.len()])
    };

    let mut track: Track<'static> = Vec::new();
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(part.program.min(127)),
            },
        },
    });

    // (tick, is_off, key, velocity); offs sort before ons at the same tick
    // so a retrigger of the same key is not cancelled.
    let mut events: Vec<(u32, bool, u8, u8)> = Vec::with_capacity(part.notes.len() * 2);
    for note in &part.notes {
        let key = clamp_data_byte(note.pitch);
        let velocity = clamp_data_byte(note.velocity);
        events.push((seconds_to_ticks(note.start), false, key, velocity));
        events.push((seconds_to_ticks(note.end), true, key, 0));
    }
    events.sort_by_key(|&(tick, is_off, key, _)| (tick, u8::from(!is_off), key));

    let mut last_tick = 0u32;
    for (tick, is_off, key, velocity) in events {
        let delta = (tick - last_tick).min(0x0FFF_FFFF);
        let message = if is_off {
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            }
        } else {
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(velocity),
            }
        };
        track.push(TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi { channel, message },
        });
        last_tick = tick;
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

fn seconds_to_ticks(seconds: f64) -> u32 {
    let ticks = seconds * ticks_per_second();
    if ticks <= 0.0 {
        0
    } else if ticks >= u32::MAX as f64 {
        u32::MAX
    } else {
        ticks.round() as u32
    }
}

fn clamp_data_byte(value: i32) -> u8 {
    value.clamp(0, 127) as u8
}

/// Tempo changes across all tracks, ascending by absolute tick.
struct TempoMap {
    changes: Vec<(u32, u32)>,
    ticks_per_quarter: f64,
}

impl TempoMap {
    fn collect(smf: &Smf, ticks_per_quarter: f64) -> Self {
        let mut changes: Vec<(u32, u32)> = Vec::new();
        for track in &smf.tracks {
            let mut tick = 0u32;
            for event in track {
                tick = tick.saturating_add(event.delta.as_int());
                if let TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) = event.kind {
                    changes.push((tick, us_per_quarter.as_int()));
                }
            }
        }
        changes.sort_by_key(|&(tick, _)| tick);
        Self {
            changes,
            ticks_per_quarter,
        }
    }

    /// Seconds elapsed at an absolute tick, walking the tempo changes in
    /// force before it. The SMF default of 120 BPM applies until the first
    /// change.
    fn seconds_at(&self, tick: u32) -> f64 {
        let mut seconds = 0.0;
        let mut cursor = 0u32;
        let mut us_per_quarter = TEMPO_US_PER_QUARTER;
        for &(change_tick, change_us) in &self.changes {
            if change_tick >= tick {
                break;
            }
            seconds += self.span_seconds(change_tick - cursor, us_per_quarter);
            cursor = change_tick;
            us_per_quarter = change_us;
        }
        seconds + self.span_seconds(tick - cursor, us_per_quarter)
    }

    fn span_seconds(&self, ticks: u32, us_per_quarter: u32) -> f64 {
        ticks as f64 / self.ticks_per_quarter * us_per_quarter as f64 / 1_000_000.0
    }
}

fn read_track(track: &Track, tempo_map: &TempoMap) -> Option<InstrumentPart> {
    let mut part = InstrumentPart::melodic(0);
    // (channel, key) -> (start tick, velocity)
    let mut open: HashMap<(u8, u8), (u32, u8)> = HashMap::new();
    let mut tick = 0u32;

    for event in track {
        tick = tick.saturating_add(event.delta.as_int());
        let TrackEventKind::Midi { channel, message } = event.kind else {
            continue;
        };
        match message {
            MidiMessage::ProgramChange { program } => part.program = program.as_int(),
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                if channel.as_int() == DRUM_CHANNEL {
                    part.is_drum = true;
                }
                // A retrigger closes the previous note at this tick.
                if let Some((start_tick, velocity)) =
                    open.insert((channel.as_int(), key.as_int()), (tick, vel.as_int()))
                {
                    part.notes
                        .push(make_note(key.as_int(), start_tick, tick, velocity, tempo_map));
                }
            }
            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                if let Some((start_tick, velocity)) =
                    open.remove(&(channel.as_int(), key.as_int()))
                {
                    part.notes
                        .push(make_note(key.as_int(), start_tick, tick, velocity, tempo_map));
                }
            }
            _ => {}
        }
    }

    // Unterminated notes are dropped.
    if part.notes.is_empty() {
        return None;
    }
    part.notes
        .sort_by(|a, b| a.start.total_cmp(&b.start).then(a.pitch.cmp(&b.pitch)));
    Some(part)
}

fn make_note(key: u8, start_tick: u32, end_tick: u32, velocity: u8, tempo_map: &TempoMap) -> Note {
    Note::new(
        key as i32,
        tempo_map.seconds_at(start_tick),
        tempo_map.seconds_at(end_tick),
        velocity as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_round_trip() {
        let mut part = InstrumentPart::melodic(0);
        part.notes.push(Note::new(60, 0.0, 0.5, 90));
        part.notes.push(Note::new(62, 0.25, 1.0, 100));
        let sequence = NoteSequence::from_part(part);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.midi");
        write_file(&sequence, &path).unwrap();

        let loaded = read_file(&path).unwrap();
        assert_eq!(loaded.parts.len(), 1);
        let notes = &loaded.parts[0].notes;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].pitch, 60);
        assert_eq!(notes[0].velocity, 90);
        assert!((notes[0].start - 0.0).abs() < 1e-9);
        assert!((notes[0].end - 0.5).abs() < 1e-9);
        assert_eq!(notes[1].pitch, 62);
        assert!((notes[1].start - 0.25).abs() < 1e-9);
        assert!((notes[1].end - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_write_clamps_out_of_range_bytes() {
        let mut part = InstrumentPart::melodic(0);
        part.notes.push(Note::new(200, 0.0, 0.1, -5));
        let sequence = NoteSequence::from_part(part);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clamp.midi");
        write_file(&sequence, &path).unwrap();

        let loaded = read_file(&path).unwrap();
        assert_eq!(loaded.parts[0].notes[0].pitch, 127);
        assert_eq!(loaded.parts[0].notes[0].velocity, 0);
    }

    #[test]
    fn test_empty_sequence_reads_back_with_no_parts() {
        let sequence = NoteSequence::from_part(InstrumentPart::melodic(0));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.midi");
        write_file(&sequence, &path).unwrap();

        let loaded = read_file(&path).unwrap();
        assert_eq!(loaded.note_count(), 0);
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(from_bytes(b"not a midi file").is_err());
    }

    #[test]
    fn test_tempo_map_walks_changes() {
        // 480 ticks at 120 BPM, then half-time from tick 480.
        let map = TempoMap {
            changes: vec![(480, 1_000_000)],
            ticks_per_quarter: 480.0,
        };
        assert!((map.seconds_at(0) - 0.0).abs() < 1e-12);
        assert!((map.seconds_at(480) - 0.5).abs() < 1e-12);
        assert!((map.seconds_at(960) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_note_on_velocity_zero_ends_note() {
        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(480)),
        ));
        let track: Track = vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::NoteOn {
                        key: u7::new(64),
                        vel: u7::new(70),
                    },
                },
            },
            TrackEvent {
                delta: u28::new(480),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::NoteOn {
                        key: u7::new(64),
                        vel: u7::new(0),
                    },
                },
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ];
        smf.tracks.push(track);

        let mut bytes = Vec::new();
        smf.write(&mut bytes).unwrap();
        let loaded = from_bytes(&bytes).unwrap();
        assert_eq!(loaded.note_count(), 1);
        let note = &loaded.parts[0].notes[0];
        assert_eq!(note.pitch, 64);
        assert_eq!(note.velocity, 70);
        assert!((note.end - 0.5).abs() < 1e-9);
    }
}
