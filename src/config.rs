//! Runtime configuration.
//!
//! Defaults match the original deployment (a `mids/` corpus next to the
//! process). Binaries layer overrides on top: JSON config file, then
//! environment variables, then command-line flags.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Environment variable overriding the corpus directory.
pub const ENV_CORPUS_DIR: &str = "MIDIGEN_CORPUS_DIR";

/// Environment variable overriding the completion command line.
pub const ENV_GENERATE_CMD: &str = "MIDIGEN_GENERATE_CMD";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the read-only reference `.mid` corpus.
    pub corpus_dir: PathBuf,

    /// Directory under which per-request scratch directories are created.
    /// `None` = the system temp directory.
    pub scratch_dir: Option<PathBuf>,

    /// Command line for the external completion service. The prompt is
    /// written to its stdin and the completion read from its stdout.
    pub generate_command: String,

    /// Upper bound on accepted upload bodies, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("mids"),
            scratch_dir: None,
            generate_command: String::new(),
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Absent fields take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Apply environment-variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = env::var(ENV_CORPUS_DIR) {
            self.corpus_dir = PathBuf::from(dir);
        }
        if let Ok(cmd) = env::var(ENV_GENERATE_CMD) {
            self.generate_command = cmd;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.corpus_dir, PathBuf::from("mids"));
        assert!(config.scratch_dir.is_none());
        assert!(config.generate_command.is_empty());
        assert_eq!(config.max_upload_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_from_file_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"corpus_dir": "/srv/corpus", "generate_command": "llm --max-tokens 1000"}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.corpus_dir, PathBuf::from("/srv/corpus"));
        assert_eq!(config.generate_command, "llm --max-tokens 1000");
        // Unspecified fields fall back to defaults.
        assert_eq!(config.max_upload_bytes, Config::default().max_upload_bytes);
    }

    #[test]
    fn test_from_file_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
