//! Style-conditioned MIDI generation from an audio recording.
//!
//! Accepts a WAV recording, estimates its tempo, selects reference MIDI
//! files whose names match requested style keywords, asks an external
//! text-completion service for a new note sequence "in the style" of the
//! references at that tempo, and materializes the result as a standard MIDI
//! file.
//!
//! ## Pipeline
//!
//! ```text
//! WAV upload → tempo estimate ───────────┐
//!                                        ├→ prompt → completion service
//! style keywords → corpus → encode ──────┘               ↓
//!                                               decode note text
//!                                                        ↓
//!                                                 .midi response
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: the flat-text note format shared with the completion
//!   service (the crate's core contract)
//! - [`pipeline`]: the end-to-end orchestrator
//! - [`corpus`]: style-keyword selection of reference files
//! - [`tempo`]: onset-based BPM estimation with a degrading adapter
//! - [`midi`]: Standard MIDI File read/write
//! - [`completion`]: the injected generative-text capability
//! - [`audio`]: WAV decode/encode
//!
//! Upstream failures (tempo estimation, the completion call, unreadable
//! corpus entries) degrade output quality instead of denying service;
//! everything else surfaces as an [`Error`] at the boundary.

pub mod audio;
pub mod codec;
pub mod completion;
pub mod config;
pub mod corpus;
pub mod midi;
pub mod note;
pub mod pipeline;
pub mod tempo;

mod error;

pub use error::{Error, Result};
