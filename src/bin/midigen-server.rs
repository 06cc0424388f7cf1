//! midigen upload daemon: HTTP, multipart/form-data in, MIDI attachment out.
//!
//! # Endpoint
//!
//! `POST /upload`, multipart body with:
//! - `file`: the WAV recording (required)
//! - `styleList`: style keywords, comma- or whitespace-separated
//!
//! **Success** (200): body is the generated `.midi` file,
//! `Content-Type: audio/x-midi`,
//! `Content-Disposition: attachment; filename="<basename>.midi"`.
//!
//! **Failure**: JSON `{"error": "..."}`. 405 for non-POST, 400 for a
//! missing or invalid upload, 404 when the output file is unexpectedly
//! absent after the write stage, 500 for anything else.
//!
//! # Example (shell)
//!
//! ```sh
//! curl -o out.midi \
//!   -F file=@take1.wav -F styleList=jazz \
//!   http://127.0.0.1:8642/upload
//! ```

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use midigen::completion::CommandCompletion;
use midigen::config::Config;
use midigen::corpus::split_style_list;
use midigen::pipeline::{GeneratedMidi, Pipeline, UploadRequest};
use midigen::Error;
use tiny_http::{Header, Method, Request, Response, Server};

#[derive(Parser, Debug)]
#[command(
    name = "midigen-server",
    about = "midigen upload daemon: WAV in, style-conditioned MIDI out"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8642")]
    listen: String,

    /// JSON config file; the flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the reference `.mid` corpus.
    #[arg(long)]
    corpus_dir: Option<PathBuf>,

    /// Completion command line; the prompt is piped to its stdin.
    /// Falls back to $MIDIGEN_GENERATE_CMD.
    #[arg(long)]
    generate_cmd: Option<String>,
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

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_env_overrides();
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
    let server = Server::http(&args.listen)
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {e}", args.listen))?;
    tracing::info!(
        listen = %args.listen,
        corpus = %config.corpus_dir.display(),
        "listening"
    );

    let max_upload_bytes = config.max_upload_bytes;
    let pipeline = Arc::new(Pipeline::new(config, Box::new(completion)));

    for request in server.incoming_requests() {
        let pipeline = Arc::clone(&pipeline);
        std::thread::spawn(move || handle_request(request, &pipeline, max_upload_bytes));
    }
    Ok(())
}

fn handle_request(mut request: Request, pipeline: &Pipeline, max_upload_bytes: usize) {
    let method = request.method().clone();
    let url = request.url().to_owned();

    let response = match route(&mut request, pipeline, max_upload_bytes) {
        Ok(generated) => {
            tracing::info!(%method, url = %url, notes = generated.note_count, "ok");
            midi_response(&generated)
        }
        Err((status, message)) => {
            tracing::warn!(%method, url = %url, status, error = %message, "request failed");
            json_error(status, &message)
        }
    };

    if let Err(error) = request.respond(response) {
        tracing::warn!(%error, "failed to send response");
    }
}

fn route(
    request: &mut Request,
    pipeline: &Pipeline,
    max_upload_bytes: usize,
) -> Result<GeneratedMidi, (u16, String)> {
    if *request.method() != Method::Post {
        return Err((405, "only POST method is allowed".to_string()));
    }
    if request.url() != "/upload" {
        return Err((404, format!("no such endpoint: {}", request.url())));
    }
    let upload = read_upload(request, max_upload_bytes).map_err(|message| (400, message))?;
    pipeline
        .run(&upload)
        .map_err(|error| (http_status(&error), error.to_string()))
}

fn http_status(error: &Error) -> u16 {
    match error {
        Error::InvalidRequest(_) => 400,
        Error::MissingOutput(_) => 404,
        _ => 500,
    }
}

fn read_upload(request: &mut Request, max_upload_bytes: usize) -> Result<UploadRequest, String> {
    let boundary = multipart_boundary(request)
        .ok_or_else(|| "expected multipart/form-data with a boundary".to_string())?;

    if let Some(length) = request.body_length() {
        if length > max_upload_bytes {
            return Err(format!("upload too large: {length} bytes"));
        }
    }
    let mut body = Vec::new();
    request
        .as_reader()
        .take(max_upload_bytes as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| format!("failed to read request body: {e}"))?;
    if body.len() > max_upload_bytes {
        return Err("upload too large".to_string());
    }

    let parts = parse_multipart(&body, &boundary);
    let file = parts
        .iter()
        .find(|part| part.name == "file")
        .ok_or_else(|| "missing file field".to_string())?;
    let styles = parts
        .iter()
        .find(|part| part.name == "styleList")
        .map(|part| String::from_utf8_lossy(&part.data).to_string())
        .unwrap_or_default();

    Ok(UploadRequest {
        file_name: file
            .filename
            .clone()
            .unwrap_or_else(|| "upload.wav".to_string()),
        audio: file.data.clone(),
        styles: split_style_list(&styles),
    })
}

fn multipart_boundary(request: &Request) -> Option<String> {
    let content_type = request
        .headers()
        .iter()
        .find(|header| header.field.equiv("Content-Type"))?
        .value
        .as_str()
        .to_string();
    if !content_type
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        return None;
    }
    content_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("boundary="))
        .next()
        .map(|boundary| boundary.trim_matches('"').to_string())
}

struct MultipartPart {
    name: String,
    filename: Option<String>,
    data: Vec<u8>,
}

/// Minimal multipart/form-data parser, enough for one file field and one
/// text field. Parts without a Content-Disposition name are dropped.
fn parse_multipart(body: &[u8], boundary: &str) -> Vec<MultipartPart> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();

    // The first section is the preamble before the first delimiter.
    for section in split_bytes(body, delimiter.as_bytes()).into_iter().skip(1) {
        if section.starts_with(b"--") {
            break; // closing delimiter
        }
        let Some(section) = section.strip_prefix(b"\r\n") else {
            continue;
        };
        let Some(split_at) = find_bytes(section, b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&section[..split_at]);
        let mut data = &section[split_at + 4..];
        data = data.strip_suffix(b"\r\n").unwrap_or(data);

        let Some(disposition) = headers
            .lines()
            .find(|line| line.to_ascii_lowercase().starts_with("content-disposition:"))
        else {
            continue;
        };
        let Some(name) = header_param(disposition, "name") else {
            continue;
        };
        parts.push(MultipartPart {
            name,
            filename: header_param(disposition, "filename"),
            data: data.to_vec(),
        });
    }
    parts
}

fn header_param(header: &str, key: &str) -> Option<String> {
    let marker = format!("{key}=\"");
    let start = header.find(&marker)? + marker.len();
    let end = header[start..].find('"')? + start;
    Some(header[start..end].to_string())
}

fn split_bytes<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut sections = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            sections.push(&haystack[start..i]);
            i += needle.len();
            start = i;
        } else {
            i += 1;
        }
    }
    sections.push(&haystack[start..]);
    sections
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn midi_response(generated: &GeneratedMidi) -> Response<std::io::Cursor<Vec<u8>>> {
    let content_type =
        Header::from_bytes(&b"Content-Type"[..], &b"audio/x-midi"[..]).expect("static header");
    let disposition = Header::from_bytes(
        &b"Content-Disposition"[..],
        format!("attachment; filename=\"{}\"", generated.file_name).as_bytes(),
    )
    .expect("static header");
    Response::from_data(generated.data.clone())
        .with_header(content_type)
        .with_header(disposition)
}

fn json_error(status: u16, message: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    let content_type = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("static header");
    let body = serde_json::json!({ "error": message }).to_string();
    Response::from_data(body.into_bytes())
        .with_header(content_type)
        .with_status_code(status)
}
