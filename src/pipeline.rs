//! End-to-end generation pipeline.
//!
//! Orchestrates one upload, strictly sequentially:
//!
//! 1. Decode the uploaded WAV and keep a durable copy in a scoped directory
//! 2. Estimate tempo (never fatal, degrades to a sentinel)
//! 3. Select reference corpus entries by style keyword
//! 4. Flatten and encode every reference note into the prompt text
//! 5. Call the completion service (failure degrades to an empty completion)
//! 6. Decode the returned text into a single-part note sequence
//! 7. Write the MIDI file, verify it exists, read it back for the response
//!
//! Both scratch files, the WAV copy and the output MIDI, live in a
//! per-request temp directory that is removed on every exit path, so
//! concurrent requests never share paths and nothing leaks.

use std::fs;
use std::path::{Path, PathBuf};

use crate::completion::{build_prompt, Completion};
use crate::config::Config;
use crate::note::NoteSequence;
use crate::tempo::TempoEstimate;
use crate::{audio, codec, corpus, midi, tempo};
use crate::{Error, Result};

/// Extension of the persisted output file.
pub const OUTPUT_EXTENSION: &str = "midi";

/// One upload to process.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Client-supplied file name; only its stem is used.
    pub file_name: String,
    /// Raw WAV payload.
    pub audio: Vec<u8>,
    /// Style keywords for corpus selection.
    pub styles: Vec<String>,
}

/// A successfully generated MIDI file plus pipeline diagnostics.
#[derive(Debug)]
pub struct GeneratedMidi {
    /// Download name: `<upload stem>.midi`.
    pub file_name: String,
    /// The persisted file's bytes.
    pub data: Vec<u8>,
    /// Tempo estimation outcome (sentinel 0 when degraded).
    pub tempo: TempoEstimate,
    /// True when the completion service failed and an empty completion was
    /// substituted. Indistinguishable on the wire from an empty completion,
    /// but kept apart here and in the logs.
    pub completion_degraded: bool,
    /// Notes decoded from the completion.
    pub note_count: usize,
}

/// The generation orchestrator.
pub struct Pipeline {
    config: Config,
    completion: Box<dyn Completion>,
}

impl Pipeline {
    pub fn new(config: Config, completion: Box<dyn Completion>) -> Self {
        Self { config, completion }
    }

    /// Run the full pipeline for one upload.
    pub fn run(&self, request: &UploadRequest) -> Result<GeneratedMidi> {
        if request.audio.is_empty() {
            return Err(Error::InvalidRequest("empty audio payload".into()));
        }

        let workdir = self.scratch_dir()?;

        let decoded = audio::decode_wav(&request.audio)?;
        let wav_path = workdir.path().join("input.wav");
        audio::write_wav(&wav_path, &decoded.samples, decoded.sample_rate, decoded.channels)?;

        let tempo = tempo::estimate(&decoded.to_mono(), decoded.sample_rate);
        tracing::info!(bpm = tempo.bpm(), "tempo estimated");

        let entries = corpus::select(&self.config.corpus_dir, &request.styles)?;
        tracing::info!(count = entries.len(), "corpus entries selected");

        let reference = encode_reference(&entries);

        let prompt = build_prompt(tempo.bpm(), &reference);
        let (completion_text, completion_degraded) = match self.completion.complete(&prompt) {
            Ok(text) => (text, false),
            Err(error) => {
                tracing::error!(%error, "completion failed, substituting empty text");
                (String::new(), true)
            }
        };

        let part = codec::decode(&completion_text);
        let note_count = part.notes.len();
        let sequence = NoteSequence::from_part(part);

        let file_name = format!("{}.{OUTPUT_EXTENSION}", upload_stem(&request.file_name));
        let output_path = workdir.path().join(&file_name);
        midi::write_file(&sequence, &output_path)?;
        if !output_path.exists() {
            return Err(Error::MissingOutput(output_path));
        }
        let data = fs::read(&output_path)?;

        tracing::info!(file = %file_name, notes = note_count, "generated");

        Ok(GeneratedMidi {
            file_name,
            data,
            tempo,
            completion_degraded,
            note_count,
        })
        // `workdir` drops here, removing the WAV copy and the output file.
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("midigen-");
        match &self.config.scratch_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Ok(builder.tempdir_in(dir)?)
            }
            None => Ok(builder.tempdir()?),
        }
    }
}

/// Flatten every note of every readable corpus entry, in selection order,
/// into the codec's text form: instruments and files concatenated without
/// delimiters. Unreadable entries are logged and skipped.
fn encode_reference(entries: &[PathBuf]) -> String {
    let mut text = String::new();
    for path in entries {
        match midi::read_file(path) {
            Ok(sequence) => text.push_str(&codec::encode(sequence.notes())),
            Err(error) => {
                tracing::error!(path = %path.display(), %error, "skipping unreadable corpus entry");
            }
        }
    }
    text
}

fn upload_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("upload")
        .to_string()
}
