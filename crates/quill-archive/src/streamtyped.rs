//! Reader for legacy typed-stream bodies.
//!
//! Older stores archive the attributed string with the NeXT typed-stream
//! encoder instead of a keyed archive:
//!
//! ```text
//! 04 0B "streamtyped" 81 E8 03        header, version, system version
//! 84 01 40 84 84 84 12 "NSAttributedString" 00 ...   class chain
//! 84 84 08 "NSString" 01 94 84 01 2B  string object, type '+' (bytes)
//! LEN BYTES...                         length-prefixed UTF-8 text
//! ```
//!
//! Only the text is needed, so the reader finds the first `NSString` class
//! record and decodes the byte string that follows its `+` type tag.

use crate::error::{ArchiveError, Result};

pub const MARKER: &[u8] = b"streamtyped";

const STRING_CLASS: &[u8] = b"NSString";

/// Bytes searched after the class name for the `+` type tag.
const TAG_WINDOW: usize = 16;

/// Type-tag sequence introducing a byte string value.
const BYTES_TAG: [u8; 3] = [0x84, 0x01, b'+'];

/// Typed-stream integer prefixes.
const INT16: u8 = 0x81;
const INT32: u8 = 0x82;

pub fn is_typed_stream(data: &[u8]) -> bool {
    data.get(2..2 + MARKER.len()) == Some(MARKER)
}

/// Read the text of the first `NSString` in a typed-stream body.
pub fn read_string(data: &[u8]) -> Result<String> {
    if !is_typed_stream(data) {
        return Err(ArchiveError::malformed("missing streamtyped marker"));
    }

    let class_at = find(data, STRING_CLASS, 0)
        .ok_or_else(|| ArchiveError::malformed("no NSString record in typed stream"))?;
    let after_class = class_at + STRING_CLASS.len();
    let window_end = (after_class + TAG_WINDOW).min(data.len());
    let tag_at = find(&data[..window_end], &BYTES_TAG, after_class).ok_or_else(|| {
        ArchiveError::malformed(format!("no byte-string tag after NSString at {class_at}"))
    })?;

    let mut pos = tag_at + BYTES_TAG.len();
    let len = read_length(data, &mut pos)?;
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            ArchiveError::malformed(format!(
                "string of {len} bytes at offset {pos} reads past end of buffer"
            ))
        })?;

    String::from_utf8(data[pos..end].to_vec())
        .map_err(|_| ArchiveError::malformed(format!("invalid UTF-8 string at offset {pos}")))
}

fn read_length(data: &[u8], pos: &mut usize) -> Result<usize> {
    let head = take(data, pos, 1)?[0];
    match head {
        INT16 => {
            let b = take(data, pos, 2)?;
            Ok(u16::from_le_bytes([b[0], b[1]]) as usize)
        }
        INT32 => {
            let b = take(data, pos, 4)?;
            Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
        }
        0x00..=0x7F => Ok(head as usize),
        _ => Err(ArchiveError::malformed(format!(
            "unexpected length tag 0x{head:02x} at offset {}",
            *pos - 1
        ))),
    }
}

fn take<'a>(data: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    let start = *pos;
    let bytes = data
        .get(start..start + n)
        .ok_or_else(|| ArchiveError::malformed(format!("length at offset {start} truncated")))?;
    *pos += n;
    Ok(bytes)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::typed_stream;

    #[test]
    fn reads_short_string() {
        assert_eq!(read_string(&typed_stream("hi")).unwrap(), "hi");
    }

    #[test]
    fn reads_long_and_multibyte_strings() {
        let long = "a".repeat(300);
        assert_eq!(read_string(&typed_stream(&long)).unwrap(), long);
        assert_eq!(read_string(&typed_stream("café ☕")).unwrap(), "café ☕");
    }

    #[test]
    fn truncation_is_malformed() {
        let body = typed_stream("hello there");
        let text_end = body.len() - 9;
        for cut in 0..text_end {
            assert!(
                matches!(read_string(&body[..cut]), Err(ArchiveError::MalformedContainer(_))),
                "prefix of {cut} bytes decoded"
            );
        }
    }

    #[test]
    fn rejects_other_formats() {
        assert!(!is_typed_stream(b"bplist00"));
        assert!(read_string(b"bplist00....").is_err());
    }
}
