use std::fmt::Write as _;

use quill_types::models::{ChatSummary, TranscriptLine};
use quill_types::time::{self, Zone};
use serde::Serialize;

use crate::pipeline::Transcript;

/// Shown in place of a timestamp the store left unset.
const NO_TIME: &str = "????-??-?? ??:??:??";

/// `[YYYY-MM-DD HH:MM:SS] Sender: text`
pub fn line(message: &TranscriptLine, zone: Zone) -> String {
    let at = message
        .sent_at
        .as_ref()
        .map(|at| time::format(at, zone))
        .unwrap_or_else(|| NO_TIME.to_string());
    format!("[{}] {}: {}", at, message.sender, message.body)
}

pub fn transcript(transcript: &Transcript, zone: Zone) -> String {
    let mut out = String::new();
    for message in &transcript.messages {
        out.push_str(&line(message, zone));
        out.push('\n');
    }
    out
}

/// Identifier, label and count columns, padded to the widest entry.
pub fn chat_table(chats: &[ChatSummary]) -> String {
    const HEADERS: [&str; 3] = ["IDENTIFIER", "LABEL", "MESSAGES"];

    let id_width = chats
        .iter()
        .map(|c| c.identifier.chars().count())
        .chain([HEADERS[0].len()])
        .max()
        .unwrap_or_default();
    let label_width = chats
        .iter()
        .map(|c| c.label.chars().count())
        .chain([HEADERS[1].len()])
        .max()
        .unwrap_or_default();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<label_width$}  {}",
        HEADERS[0], HEADERS[1], HEADERS[2]
    );
    for chat in chats {
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<label_width$}  {}",
            chat.identifier, chat.label, chat.message_count
        );
    }
    out
}

#[derive(Serialize)]
struct JsonLine<'a> {
    #[serde(flatten)]
    message: &'a TranscriptLine,
    time: Option<String>,
}

#[derive(Serialize)]
struct JsonTranscript<'a> {
    identifier: &'a str,
    undecodable: usize,
    messages: Vec<JsonLine<'a>>,
}

/// The transcript as JSON, each message carrying its display time as well
/// as the raw UTC instant.
pub fn transcript_json(transcript: &Transcript, zone: Zone) -> serde_json::Result<String> {
    let doc = JsonTranscript {
        identifier: &transcript.identifier,
        undecodable: transcript.undecodable,
        messages: transcript
            .messages
            .iter()
            .map(|message| JsonLine {
                message,
                time: message.sent_at.as_ref().map(|at| time::format(at, zone)),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&doc)
}

pub fn chats_json(chats: &[ChatSummary]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(chats)
}
