//! Per-row decode pipeline.
//!
//! Plain text wins when it is non-empty and not just attachment placeholders.
//! Otherwise the archived body is decoded; a failure stays with its row and
//! never stops the rest of the conversation.

use std::fmt;

use quill_archive::{ArchiveError, DecodedText, OBJECT_REPLACEMENT, inspect_body};
use quill_db::{MessageRow, Store, StoreError};
use quill_types::models::{Body, TranscriptLine};
use quill_types::time;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Why one row could not be decoded.
#[derive(Debug, Clone)]
pub struct DecodeFailure {
    pub rowid: i64,
    pub error: ArchiveError,
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {} ({} stage)", self.rowid, self.error, self.error.stage())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Report a structural summary for every row that takes the archive path.
    pub diagnostics: bool,
}

/// An extracted conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub identifier: String,
    pub messages: Vec<TranscriptLine>,
    pub undecodable: usize,
}

/// Plain text counts when something other than placeholders is left in it.
fn usable_text(text: &str) -> bool {
    text.chars().any(|c| c != OBJECT_REPLACEMENT)
}

/// Decode the text of one row.
pub fn decode_row(row: &MessageRow) -> Result<DecodedText, DecodeFailure> {
    if let Some(text) = row.text.as_deref().filter(|t| usable_text(t)) {
        return Ok(DecodedText::Text(text.to_string()));
    }
    match row.attributed_body.as_deref() {
        Some(body) if !body.is_empty() => {
            quill_archive::decode_body(body).map_err(|error| DecodeFailure {
                rowid: row.rowid,
                error,
            })
        }
        _ => Ok(DecodedText::from_raw(row.text.as_deref().unwrap_or_default())),
    }
}

/// Turn one row into a transcript line. Failures become a placeholder body.
pub fn render_row(row: &MessageRow, options: &Options) -> TranscriptLine {
    if options.diagnostics {
        report_structure(row);
    }

    let body = match decode_row(row) {
        Ok(DecodedText::Text(text)) => Body::Text(text),
        Ok(DecodedText::NonText) => {
            debug!("row {} has no text", row.rowid);
            Body::NonText
        }
        Err(failure) => {
            warn!("undecodable message body, {}", failure);
            Body::Undecodable
        }
    };

    TranscriptLine {
        rowid: row.rowid,
        sent_at: time::from_apple(row.date),
        sender: row.sender(),
        body,
    }
}

/// Log the decode stages of a row that takes the archive path.
fn report_structure(row: &MessageRow) {
    if row.text.as_deref().is_some_and(usable_text) {
        return;
    }
    if let Some(body) = row.attributed_body.as_deref().filter(|b| !b.is_empty()) {
        info!(rowid = row.rowid, "{}", inspect_body(body));
    }
}

/// Extract and decode the conversation with this exact identifier.
pub fn build_transcript(
    store: &Store,
    identifier: &str,
    options: &Options,
) -> Result<Transcript, StoreError> {
    let rows = store.extract_messages(identifier)?;
    let messages: Vec<TranscriptLine> = rows.iter().map(|row| render_row(row, options)).collect();
    let undecodable = messages
        .iter()
        .filter(|line| line.body == Body::Undecodable)
        .count();

    info!(
        "Found {} messages in chat {} ({} undecodable)",
        messages.len(),
        identifier,
        undecodable
    );
    Ok(Transcript {
        identifier: identifier.to_string(),
        messages,
        undecodable,
    })
}
