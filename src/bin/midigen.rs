//! midigen CLI: one-shot style-conditioned MIDI generation.
//!
//! Reads a WAV recording, runs the full generation pipeline against the
//! local corpus and the configured completion command, and writes the
//! resulting MIDI file. Prints a one-line JSON summary to stdout on success:
//!
//! ```json
//! {"path":"take1.midi","bpm":117.1875,"notes":42,"degraded":false}
//! ```
//!
//! Exit code 0 on success, non-zero on error.

use std::path::PathBuf;

use clap::Parser;
use midigen::completion::CommandCompletion;
use midigen::config::Config;
use midigen::corpus::split_style_list;
use midigen::pipeline::{Pipeline, UploadRequest};

#[derive(Parser, Debug)]
#[command(
    name = "midigen",
    about = "Style-conditioned MIDI generation from a WAV recording"
)]
struct Args {
    /// Input WAV recording.
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Style keywords matched against corpus file names, comma- or
    /// space-separated.
    #[arg(long, short = 's', default_value = "")]
    styles: String,

    /// Directory holding the reference `.mid` corpus.
    #[arg(long)]
    corpus_dir: Option<PathBuf>,

    /// Completion command line; the prompt is piped to its stdin.
    /// Falls back to $MIDIGEN_GENERATE_CMD.
    #[arg(long)]
    generate_cmd: Option<String>,

    /// Output MIDI path. Defaults to the input name with a .midi extension.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::default().with_env_overrides();
    if let Some(dir) = args.corpus_dir {
        config.corpus_dir = dir;
    }
    if let Some(cmd) = args.generate_cmd {
        config.generate_command = cmd;
    }
    if config.generate_command.is_empty() {
        anyhow::bail!("no completion command: pass --generate-cmd or set MIDIGEN_GENERATE_CMD");
    }

    let completion = CommandCompletion::from_command_line(&config.generate_command)?;
    let audio = std::fs::read(&args.input)?;
    let file_name = args
        .input
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.wav")
        .to_string();

    let request = UploadRequest {
        file_name,
        audio,
        styles: split_style_list(&args.styles),
    };
    let pipeline = Pipeline::new(config, Box::new(completion));
    let generated = pipeline.run(&request)?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(&generated.file_name));
    std::fs::write(&output, &generated.data)?;

    println!(
        "{}",
        serde_json::json!({
            "path": output,
            "bpm": generated.tempo.bpm(),
            "notes": generated.note_count,
            "degraded": generated.completion_degraded,
        })
    );
    Ok(())
}
