//! Quill archive decoding.
//!
//! Turns the `attributedBody` blob of a message row into plain text:
//! - `plist`: binary property list container → typed tree
//! - `keyed`: keyed-archive envelope and object graph resolution
//! - `extract`: text runs out of the resolved graph
//! - `streamtyped`: legacy typed-stream bodies
//! - `inspect`: per-stage structural summary for diagnostics

pub mod error;
pub mod extract;
pub mod inspect;
pub mod keyed;
pub mod plist;
pub mod streamtyped;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

use std::fmt;

use serde::Serialize;

pub use error::{ArchiveError, Result, Stage};
pub use extract::{DecodedText, OBJECT_REPLACEMENT, extract_text};
pub use inspect::{Inspection, inspect_body};
pub use keyed::{KeyedArchive, Object};
pub use plist::Plist;

/// Body encodings told apart by their leading marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyFormat {
    BinaryPlist,
    TypedStream,
    Unknown,
}

impl BodyFormat {
    pub fn detect(data: &[u8]) -> Self {
        if plist::is_bplist(data) {
            BodyFormat::BinaryPlist
        } else if streamtyped::is_typed_stream(data) {
            BodyFormat::TypedStream
        } else {
            BodyFormat::Unknown
        }
    }
}

impl fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyFormat::BinaryPlist => write!(f, "bplist"),
            BodyFormat::TypedStream => write!(f, "streamtyped"),
            BodyFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// Decode an archived message body to text.
///
/// Errors are always local to this body; callers map them to a placeholder.
pub fn decode_body(data: &[u8]) -> Result<DecodedText> {
    match BodyFormat::detect(data) {
        BodyFormat::BinaryPlist => {
            let tree = plist::parse(data)?;
            if let Plist::String(s) = &tree {
                return Ok(DecodedText::from_raw(s));
            }
            let archive = KeyedArchive::from_plist(tree)?;
            let root = archive.resolve_root()?;
            Ok(extract_text(&root))
        }
        BodyFormat::TypedStream => Ok(DecodedText::from_raw(&streamtyped::read_string(data)?)),
        BodyFormat::Unknown => Err(ArchiveError::MalformedContainer(
            "no recognized format marker".to_string(),
        )),
    }
}
