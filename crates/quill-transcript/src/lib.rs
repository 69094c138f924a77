//! Conversation extraction: store rows in, rendered transcript out.

pub mod pipeline;
pub mod render;

pub use pipeline::{DecodeFailure, Options, Transcript, build_transcript, decode_row, render_row};
