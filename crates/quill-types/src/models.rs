use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder rendered for bodies that failed to decode.
pub const UNDECODABLE: &str = "[undecodable content]";

/// Placeholder rendered for bodies that carry no text.
pub const NON_TEXT: &str = "[non-text content]";

/// One conversation, as listed by `quill list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub identifier: String,
    pub label: String,
    pub message_count: u64,
}

/// Who wrote a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "handle", rename_all = "snake_case")]
pub enum Sender {
    /// The owner of the store.
    Me,
    Handle(String),
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::Me => write!(f, "Me"),
            Sender::Handle(handle) => write!(f, "{}", handle),
        }
    }
}

/// The rendered body of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Body {
    Text(String),
    NonText,
    Undecodable,
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Text(text) => write!(f, "{}", text),
            Body::NonText => write!(f, "{}", NON_TEXT),
            Body::Undecodable => write!(f, "{}", UNDECODABLE),
        }
    }
}

/// One line of an extracted conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub rowid: i64,
    pub sent_at: Option<DateTime<Utc>>,
    pub sender: Sender,
    pub body: Body,
}
