//! In-memory note model.
//!
//! Note times are stored in **seconds**; the text codec's wire format uses
//! integer milliseconds. [`Note::start_ms`] and [`Note::end_ms`] truncate
//! toward zero, matching the forward milliseconds→seconds conversion in
//! [`crate::codec::decode`], so integer millisecond values round-trip
//! exactly (verified for representative values in the codec tests).

/// One timed musical event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    /// MIDI pitch, semantically 0–127. Not enforced at decode time.
    pub pitch: i32,
    /// Key velocity, semantically 0–127.
    pub velocity: i32,
    /// Onset, seconds from the start of the sequence.
    pub start: f64,
    /// Release, seconds from the start of the sequence. Not required to
    /// exceed `start`.
    pub end: f64,
}

impl Note {
    /// Velocity used when the wire format omits the fourth field.
    pub const DEFAULT_VELOCITY: i32 = 100;

    pub fn new(pitch: i32, start: f64, end: f64, velocity: i32) -> Self {
        Self {
            pitch,
            velocity,
            start,
            end,
        }
    }

    /// Onset in whole milliseconds, truncated toward zero.
    pub fn start_ms(&self) -> i64 {
        (self.start * 1000.0) as i64
    }

    /// Release in whole milliseconds, truncated toward zero.
    pub fn end_ms(&self) -> i64 {
        (self.end * 1000.0) as i64
    }
}

/// An ordered group of notes under one instrument identity.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentPart {
    /// General MIDI program number.
    pub program: u8,
    /// True when the part plays on the percussion channel.
    pub is_drum: bool,
    pub notes: Vec<Note>,
}

impl InstrumentPart {
    /// An empty melodic (non-percussion) part with the given program.
    pub fn melodic(program: u8) -> Self {
        Self {
            program,
            is_drum: false,
            notes: Vec::new(),
        }
    }
}

/// An ordered group of instrument parts; the unit read from or written to a
/// MIDI file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteSequence {
    pub parts: Vec<InstrumentPart>,
}

impl NoteSequence {
    pub fn from_part(part: InstrumentPart) -> Self {
        Self { parts: vec![part] }
    }

    /// All notes across all parts, in part order.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.parts.iter().flat_map(|part| part.notes.iter())
    }

    pub fn note_count(&self) -> usize {
        self.parts.iter().map(|part| part.notes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_conversion_truncates_toward_zero() {
        let note = Note::new(60, 0.0015, 1.2349, 100);
        assert_eq!(note.start_ms(), 1);
        assert_eq!(note.end_ms(), 1234);
    }

    #[test]
    fn test_sequence_note_count_spans_parts() {
        let mut first = InstrumentPart::melodic(0);
        first.notes.push(Note::new(60, 0.0, 0.5, 100));
        let mut second = InstrumentPart::melodic(24);
        second.notes.push(Note::new(64, 0.5, 1.0, 90));
        second.notes.push(Note::new(67, 1.0, 1.5, 90));

        let sequence = NoteSequence {
            parts: vec![first, second],
        };
        assert_eq!(sequence.note_count(), 3);
        assert_eq!(sequence.notes().count(), 3);
        assert_eq!(sequence.notes().next().unwrap().pitch, 60);
    }
}
