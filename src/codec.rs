//! Flat-text note codec.
//!
//! The wire format shared with the completion service: one note per line,
//! four whitespace-separated integer fields in fixed order
//!
//! ```text
//! pitch start_ms end_ms velocity
//! ```
//!
//! each zero-padded to a minimum width of three digits (wider values are not
//! truncated). No header, footer, or instrument delimiter: the encoding
//! flattens every note into a single undifferentiated stream.
//!
//! Decoding is deliberately forgiving: the completion service may return
//! prose, partial lines, or nothing at all. No line ever aborts a decode;
//! malformed lines are logged and skipped, and zero valid lines is a valid
//! (empty) result, not an error.
//!
//! # Rounding
//!
//! Decoded times are held in the seconds domain (`ms / 1000.0`) and
//! truncated toward zero on re-encode. For integer millisecond inputs the
//! divide-then-multiply round trip is exact (see the tests); beyond that the
//! format only promises 1 ms resolution.

use std::fmt::Write as _;

use crate::note::{InstrumentPart, Note};

/// Encode notes as flat text, one line per note, in input order.
pub fn encode<'a>(notes: impl IntoIterator<Item = &'a Note>) -> String {
    let mut text = String::new();
    for note in notes {
        // Writing to a String cannot fail.
        let _ = writeln!(
            text,
            "{:03} {:03} {:03} {:03}",
            note.pitch,
            note.start_ms(),
            note.end_ms(),
            note.velocity
        );
    }
    text
}

/// Decode flat text into a single melodic program-0 part.
///
/// Lines with fewer than three fields, or with non-integer fields, are
/// skipped with a warning. A missing fourth field defaults the velocity to
/// [`Note::DEFAULT_VELOCITY`].
pub fn decode(text: &str) -> InstrumentPart {
    let mut part = InstrumentPart::melodic(0);
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 3 {
            tracing::warn!(line, "skipping note line with fewer than 3 fields");
            continue;
        }
        match parse_note(&fields) {
            Some(note) => part.notes.push(note),
            None => tracing::warn!(line, "skipping note line with non-integer fields"),
        }
    }
    part
}

fn parse_note(fields: &[&str]) -> Option<Note> {
    let pitch: i32 = fields[0].parse().ok()?;
    let start_ms: i64 = fields[1].parse().ok()?;
    let end_ms: i64 = fields[2].parse().ok()?;
    let velocity: i32 = match fields.get(3) {
        Some(field) => field.parse().ok()?,
        None => Note::DEFAULT_VELOCITY,
    };
    Some(Note::new(
        pitch,
        start_ms as f64 / 1000.0,
        end_ms as f64 / 1000.0,
        velocity,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_zero_pads_to_three_digits() {
        let notes = vec![Note::new(60, 0.0, 0.5, 90)];
        assert_eq!(encode(&notes), "060 000 500 090\n");
    }

    #[test]
    fn test_encode_does_not_truncate_wide_values() {
        let notes = vec![Note::new(127, 123.456, 1000.0, 100)];
        assert_eq!(encode(&notes), "127 123456 1000000 100\n");
    }

    #[test]
    fn test_round_trip_representative_millisecond_values() {
        for ms in [0i64, 1, 999, 1000, 123456] {
            let text = format!("060 {ms} {ms} 100\n");
            let part = decode(&text);
            assert_eq!(part.notes.len(), 1, "ms={ms}");
            assert_eq!(part.notes[0].start_ms(), ms, "ms={ms}");
            assert_eq!(part.notes[0].end_ms(), ms, "ms={ms}");
            assert_eq!(encode(&part.notes), format!("060 {ms:03} {ms:03} 100\n"));
        }
    }

    #[test]
    fn test_decode_skips_malformed_lines_preserving_order() {
        let text = "060 000 500 090\n\
                    not a note line at all\n\
                    62 500\n\
                    064 500 750\n\
                    065 750 1000 xx\n\
                    067 1000 1250 80\n";
        let part = decode(text);
        let pitches: Vec<i32> = part.notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 64, 67]);
    }

    #[test]
    fn test_decode_three_fields_defaults_velocity() {
        let part = decode("072 100 200\n");
        assert_eq!(part.notes.len(), 1);
        assert_eq!(part.notes[0].velocity, Note::DEFAULT_VELOCITY);
    }

    #[test]
    fn test_decode_yields_single_melodic_part() {
        let part = decode("060 0 100\n061 100 200\n");
        assert_eq!(part.program, 0);
        assert!(!part.is_drum);
        assert_eq!(part.notes.len(), 2);
    }

    #[test]
    fn test_empty_both_directions() {
        assert_eq!(decode("").notes.len(), 0);
        let none: Vec<Note> = Vec::new();
        assert_eq!(encode(&none), "");
    }

    #[test]
    fn test_fully_malformed_input_is_valid_empty_result() {
        let part = decode("this is only prose\nand more prose here\n");
        assert!(part.notes.is_empty());
    }
}
