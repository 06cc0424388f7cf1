//! External generative text service.
//!
//! The pipeline reaches the completion service through the [`Completion`]
//! trait so tests can inject deterministic stand-ins. The production
//! backend, [`CommandCompletion`], pipes the prompt to a configured external
//! command on stdin and reads the completion from stdout; whatever text
//! comes back is treated as authoritative and handed to the codec without
//! semantic validation.

use std::io::Write as _;
use std::process::{Command, Stdio};

use crate::{Error, Result};

/// A text-completion capability.
pub trait Completion: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Build the generation prompt from the estimated tempo and the encoded
/// reference notes, asking for a same-line-count continuation.
pub fn build_prompt(bpm: f64, reference: &str) -> String {
    format!(
        "Generate new MIDI data with a BPM of {bpm} using the following data as a template:\n\n{reference}\n\nPlease provide the new MIDI data with the same number of lines."
    )
}

/// Completion backend that spawns an external command per request.
#[derive(Debug, Clone)]
pub struct CommandCompletion {
    program: String,
    args: Vec<String>,
}

impl CommandCompletion {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a full command line, e.g. `"llm-complete --max-tokens 1000"`.
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_owned);
        let program = parts
            .next()
            .ok_or_else(|| Error::Completion("empty completion command".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl Completion for CommandCompletion {
    fn complete(&self, prompt: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Completion(format!("failed to spawn '{}': {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Completion("child stdin unavailable".into()))?;
        stdin
            .write_all(prompt.as_bytes())
            .map_err(|e| Error::Completion(format!("failed to write prompt: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Completion(format!("failed to wait for '{}': {e}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Completion(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
