//! Reference-corpus selection.
//!
//! The corpus is a read-only directory of `.mid` files whose names begin
//! with the style they exemplify (`jazz_1.mid`, `rock_2.mid`, ...).
//! Selection is a case-insensitive prefix match of the file name against the
//! requested keywords.

use std::fs;
use std::path::{Path, PathBuf};

use crate::Result;

/// Filename suffix (lowercase) of corpus note-sequence files.
const NOTE_SEQUENCE_SUFFIX: &str = ".mid";

/// List corpus files whose name starts with one of the style keywords.
///
/// Case-insensitive on both sides. Results follow directory listing order,
/// which is implementation-defined. No match returns an empty list, which is
/// not an error; listing failures propagate.
pub fn select(corpus_dir: &Path, keywords: &[String]) -> Result<Vec<PathBuf>> {
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let mut selected = Vec::new();
    for entry in fs::read_dir(corpus_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let name = name.to_lowercase();
        if !name.ends_with(NOTE_SEQUENCE_SUFFIX) {
            continue;
        }
        if lowered.iter().any(|keyword| name.starts_with(keyword.as_str())) {
            selected.push(entry.path());
        }
    }
    tracing::debug!(count = selected.len(), "corpus entries selected");
    Ok(selected)
}

/// Split a raw style-list field into keywords on commas and whitespace.
pub fn split_style_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in ["jazz_1.mid", "rock_2.mid", "Jazz_solo.mid", "blues.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_select_prefix_match_is_case_insensitive() {
        let dir = fixture_dir();
        let selected = select(dir.path(), &["jazz".to_string()]).unwrap();
        let mut names: Vec<String> = selected
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Jazz_solo.mid", "jazz_1.mid"]);
    }

    #[test]
    fn test_select_extension_filter_excludes_non_midi() {
        let dir = fixture_dir();
        let selected = select(dir.path(), &["blues".to_string()]).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn test_select_no_match_is_empty_not_error() {
        let dir = fixture_dir();
        let selected = select(dir.path(), &["polka".to_string()]).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn test_select_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(select(&missing, &["jazz".to_string()]).is_err());
    }

    #[test]
    fn test_split_style_list() {
        assert_eq!(
            split_style_list("jazz, rock  blues,"),
            vec!["jazz", "rock", "blues"]
        );
        assert!(split_style_list("").is_empty());
    }
}
