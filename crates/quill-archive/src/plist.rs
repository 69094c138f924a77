//! Binary property list (`bplist00`) decoder.
//!
//! ```text
//! [0..8]          Magic "bplist00"
//! [8..T]          Object table, each object led by a marker byte
//! [T..len-32]     Offset table: one big-endian offset per object
//! [len-32..len]   Trailer
//!                   [6]       offset int size (1..=8)
//!                   [7]       object ref size (1..=8)
//!                   [8..16]   object count (u64 BE)
//!                   [16..24]  top object index (u64 BE)
//!                   [24..32]  offset table offset T (u64 BE)
//! ```
//!
//! Marker byte: high nibble is the type, low nibble the size. A size nibble of
//! 0xF means the real length follows as an integer object.
//!
//! ```text
//! 0000 0000   null          0101 nnnn   ASCII string, n bytes
//! 0000 1000   false         0110 nnnn   UTF-16BE string, n code units
//! 0000 1001   true          1000 nnnn   UID, n+1 bytes
//! 0001 nnnn   int, 2^n B    1010 nnnn   array, n refs
//! 0010 nnnn   real, 2^n B   1100 nnnn   set, n refs
//! 0011 0011   date, f64     1101 nnnn   dict, n key refs then n value refs
//! 0100 nnnn   data, n bytes
//! ```

use crate::error::{ArchiveError, Result};

/// Format marker every binary plist starts with.
pub const MAGIC: &[u8; 8] = b"bplist00";

/// Header size in bytes.
pub const HEADER_SIZE: usize = 8;

/// Trailer size in bytes.
pub const TRAILER_SIZE: usize = 32;

/// Deepest container nesting accepted before giving up.
pub const MAX_DEPTH: usize = 256;

/// Upper bound on expanded nodes. Shared sub-objects are copied into the
/// tree, so a small file could otherwise expand exponentially.
const MAX_NODES: usize = 1 << 20;

/// A decoded plist value.
#[derive(Debug, Clone, PartialEq)]
pub enum Plist {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Seconds since 2001-01-01T00:00:00Z.
    Date(f64),
    Data(Vec<u8>),
    String(String),
    /// Object placeholder: an index into a keyed archive's `$objects`.
    Uid(u64),
    Array(Vec<Plist>),
    Dictionary(Vec<(String, Plist)>),
}

impl Plist {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Plist::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uid(&self) -> Option<u64> {
        match self {
            Plist::Uid(uid) => Some(*uid),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Plist]> {
        match self {
            Plist::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&[(String, Plist)]> {
        match self {
            Plist::Dictionary(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a dictionary entry. First match wins; returns None for
    /// non-dictionaries.
    pub fn get(&self, key: &str) -> Option<&Plist> {
        self.as_dictionary()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Plist::Null => "null",
            Plist::Boolean(_) => "boolean",
            Plist::Integer(_) => "integer",
            Plist::Real(_) => "real",
            Plist::Date(_) => "date",
            Plist::Data(_) => "data",
            Plist::String(_) => "string",
            Plist::Uid(_) => "uid",
            Plist::Array(_) => "array",
            Plist::Dictionary(_) => "dictionary",
        }
    }

    /// Flatten into a token stream that keeps container boundaries.
    pub fn tokens(&self) -> Tokens<'_> {
        Tokens {
            stack: Vec::new(),
            pending: Some(self),
        }
    }
}

/// One step of a depth-first walk over a [`Plist`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'a> {
    ArrayStart(usize),
    DictionaryStart(usize),
    Key(&'a str),
    Scalar(&'a Plist),
    End,
}

pub struct Tokens<'a> {
    stack: Vec<Frame<'a>>,
    pending: Option<&'a Plist>,
}

enum Frame<'a> {
    Array(std::slice::Iter<'a, Plist>),
    Dictionary(std::slice::Iter<'a, (String, Plist)>, Option<&'a Plist>),
}

enum Step<'a> {
    Key(&'a str),
    Value(&'a Plist),
}

impl<'a> Tokens<'a> {
    fn open(&mut self, value: &'a Plist) -> Token<'a> {
        match value {
            Plist::Array(items) => {
                self.stack.push(Frame::Array(items.iter()));
                Token::ArrayStart(items.len())
            }
            Plist::Dictionary(entries) => {
                self.stack.push(Frame::Dictionary(entries.iter(), None));
                Token::DictionaryStart(entries.len())
            }
            scalar => Token::Scalar(scalar),
        }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if let Some(value) = self.pending.take() {
            return Some(self.open(value));
        }

        let step = match self.stack.last_mut()? {
            Frame::Array(items) => items.next().map(Step::Value),
            Frame::Dictionary(entries, value) => match value.take() {
                Some(v) => Some(Step::Value(v)),
                None => entries.next().map(|(k, v)| {
                    *value = Some(v);
                    Step::Key(k.as_str())
                }),
            },
        };

        match step {
            Some(Step::Value(v)) => Some(self.open(v)),
            Some(Step::Key(k)) => Some(Token::Key(k)),
            None => {
                self.stack.pop();
                Some(Token::End)
            }
        }
    }
}

/// Returns true if `data` carries the binary plist marker.
pub fn is_bplist(data: &[u8]) -> bool {
    data.len() >= 6 && &data[..6] == b"bplist"
}

/// Parse a binary plist into a tree rooted at its top object.
pub fn parse(data: &[u8]) -> Result<Plist> {
    let parser = Parser::new(data)?;
    let mut on_path = vec![false; parser.offsets.len()];
    let mut budget = MAX_NODES;
    parser.object(parser.top, 0, &mut on_path, &mut budget)
}

struct Parser<'a> {
    data: &'a [u8],
    /// End of the readable object area (start of the trailer).
    limit: usize,
    offsets: Vec<usize>,
    ref_size: usize,
    top: usize,
}

impl<'a> Parser<'a> {
    fn new(data: &'a [u8]) -> Result<Self> {
        if !is_bplist(data) || data.len() < HEADER_SIZE {
            return Err(ArchiveError::malformed("missing bplist marker"));
        }
        if &data[..HEADER_SIZE] != MAGIC {
            return Err(ArchiveError::malformed(format!(
                "unsupported bplist version {:?}",
                String::from_utf8_lossy(&data[6..HEADER_SIZE])
            )));
        }
        if data.len() < HEADER_SIZE + TRAILER_SIZE {
            return Err(ArchiveError::malformed(format!(
                "buffer of {} bytes too short for trailer",
                data.len()
            )));
        }

        let limit = data.len() - TRAILER_SIZE;
        let trailer = &data[limit..];
        let offset_size = trailer[6] as usize;
        let ref_size = trailer[7] as usize;
        if !(1..=8).contains(&offset_size) || !(1..=8).contains(&ref_size) {
            return Err(ArchiveError::malformed(format!(
                "bad trailer sizes: offset={offset_size} ref={ref_size}"
            )));
        }

        let count = to_usize(be_uint(&trailer[8..16]), "object count")?;
        let top = to_usize(be_uint(&trailer[16..24]), "top object")?;
        let table_start = to_usize(be_uint(&trailer[24..32]), "offset table offset")?;
        if count == 0 {
            return Err(ArchiveError::malformed("empty object table"));
        }
        if top >= count {
            return Err(ArchiveError::malformed(format!(
                "top object {top} outside table of {count}"
            )));
        }

        let table_end = count
            .checked_mul(offset_size)
            .and_then(|len| len.checked_add(table_start))
            .ok_or_else(|| ArchiveError::malformed("offset table size overflows"))?;
        if table_start < HEADER_SIZE || table_end > limit {
            return Err(ArchiveError::malformed(format!(
                "offset table {table_start}..{table_end} outside buffer of {}",
                data.len()
            )));
        }

        let offsets = data[table_start..table_end]
            .chunks_exact(offset_size)
            .enumerate()
            .map(|(i, raw)| {
                let offset = be_uint(raw);
                if offset < HEADER_SIZE as u64 || offset >= limit as u64 {
                    return Err(ArchiveError::malformed(format!(
                        "object {i} offset {offset} outside object area"
                    )));
                }
                Ok(offset as usize)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            data,
            limit,
            offsets,
            ref_size,
            top,
        })
    }

    fn object(
        &self,
        index: usize,
        depth: usize,
        on_path: &mut [bool],
        budget: &mut usize,
    ) -> Result<Plist> {
        if depth > MAX_DEPTH {
            return Err(ArchiveError::NestingTooDeep(MAX_DEPTH));
        }
        *budget = budget
            .checked_sub(1)
            .ok_or_else(|| ArchiveError::malformed("object tree expands past node limit"))?;

        let offset = self.offsets[index];
        let marker = self.byte(offset)?;
        let info = marker & 0x0F;

        let value = match marker >> 4 {
            0x0 => match info {
                0x0 | 0xF => Plist::Null,
                0x8 => Plist::Boolean(false),
                0x9 => Plist::Boolean(true),
                _ => return Err(unknown_marker(marker, offset)),
            },
            0x1 => Plist::Integer(self.integer(offset + 1, info)?),
            0x2 => Plist::Real(self.real(offset + 1, info)?),
            0x3 if info == 0x3 => Plist::Date(self.real(offset + 1, 3)?),
            0x4 => {
                let (len, start) = self.length(offset, info)?;
                Plist::Data(self.slice(start, len)?.to_vec())
            }
            0x5 => {
                let (len, start) = self.length(offset, info)?;
                Plist::String(String::from_utf8_lossy(self.slice(start, len)?).into_owned())
            }
            0x6 => {
                let (len, start) = self.length(offset, info)?;
                let byte_len = len
                    .checked_mul(2)
                    .ok_or_else(|| ArchiveError::malformed("UTF-16 length overflows"))?;
                let units: Vec<u16> = self
                    .slice(start, byte_len)?
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                let s = String::from_utf16(&units).map_err(|_| {
                    ArchiveError::malformed(format!("invalid UTF-16 string at offset {offset}"))
                })?;
                Plist::String(s)
            }
            0x8 => {
                let width = info as usize + 1;
                if width > 8 {
                    return Err(ArchiveError::malformed(format!(
                        "UID of {width} bytes at offset {offset}"
                    )));
                }
                Plist::Uid(be_uint(self.slice(offset + 1, width)?))
            }
            0xA | 0xC => {
                let (len, start) = self.length(offset, info)?;
                let refs = self.refs(start, len)?;
                let items = self.nested(index, on_path, |this, on_path| {
                    refs.iter()
                        .map(|&child| this.object(child, depth + 1, on_path, budget))
                        .collect::<Result<Vec<_>>>()
                })?;
                Plist::Array(items)
            }
            0xD => {
                let (len, start) = self.length(offset, info)?;
                let total = len
                    .checked_mul(2)
                    .ok_or_else(|| ArchiveError::malformed("dictionary size overflows"))?;
                let refs = self.refs(start, total)?;
                let (keys, values) = refs.split_at(len);
                let entries = self.nested(index, on_path, |this, on_path| {
                    keys.iter()
                        .zip(values)
                        .map(|(&k, &v)| {
                            let key = match this.object(k, depth + 1, on_path, budget)? {
                                Plist::String(key) => key,
                                other => {
                                    return Err(ArchiveError::malformed(format!(
                                        "dictionary key is a {}, not a string",
                                        other.kind()
                                    )));
                                }
                            };
                            Ok((key, this.object(v, depth + 1, on_path, budget)?))
                        })
                        .collect::<Result<Vec<_>>>()
                })?;
                Plist::Dictionary(entries)
            }
            _ => return Err(unknown_marker(marker, offset)),
        };

        Ok(value)
    }

    /// Run `f` with `index` marked as an open container. A container reached
    /// again while still open never terminates.
    fn nested<T>(
        &self,
        index: usize,
        on_path: &mut [bool],
        f: impl FnOnce(&Self, &mut [bool]) -> Result<T>,
    ) -> Result<T> {
        if on_path[index] {
            return Err(ArchiveError::malformed(format!(
                "container {index} is nested inside itself"
            )));
        }
        on_path[index] = true;
        let result = f(self, on_path);
        on_path[index] = false;
        result
    }

    /// Decode the length of a variable-size object. Returns (length, payload start).
    fn length(&self, offset: usize, info: u8) -> Result<(usize, usize)> {
        if info != 0xF {
            return Ok((info as usize, offset + 1));
        }
        let marker = self.byte(offset + 1)?;
        if marker >> 4 != 0x1 {
            return Err(ArchiveError::malformed(format!(
                "length at offset {offset} is not an integer (marker 0x{marker:02x})"
            )));
        }
        let size = marker & 0x0F;
        let len = self.integer(offset + 2, size)?;
        let len = usize::try_from(len)
            .map_err(|_| ArchiveError::malformed(format!("negative length at offset {offset}")))?;
        Ok((len, offset + 2 + (1usize << size)))
    }

    fn integer(&self, pos: usize, size: u8) -> Result<i64> {
        if size > 4 {
            return Err(ArchiveError::malformed(format!(
                "integer of 2^{size} bytes at offset {pos}"
            )));
        }
        let bytes = self.slice(pos, 1usize << size)?;
        match size {
            0..=2 => Ok(be_uint(bytes) as i64),
            3 => Ok(i64::from_be_bytes(fixed(bytes))),
            _ => {
                let wide = i128::from_be_bytes(fixed(bytes));
                i64::try_from(wide)
                    .map_err(|_| ArchiveError::malformed(format!("integer out of range at {pos}")))
            }
        }
    }

    fn real(&self, pos: usize, size: u8) -> Result<f64> {
        match size {
            2 => Ok(f32::from_be_bytes(fixed(self.slice(pos, 4)?)) as f64),
            3 => Ok(f64::from_be_bytes(fixed(self.slice(pos, 8)?))),
            _ => Err(ArchiveError::malformed(format!(
                "real of 2^{size} bytes at offset {pos}"
            ))),
        }
    }

    fn refs(&self, start: usize, count: usize) -> Result<Vec<usize>> {
        let len = count
            .checked_mul(self.ref_size)
            .ok_or_else(|| ArchiveError::malformed("reference list size overflows"))?;
        self.slice(start, len)?
            .chunks_exact(self.ref_size)
            .map(|raw| {
                let index = be_uint(raw);
                if index >= self.offsets.len() as u64 {
                    return Err(ArchiveError::malformed(format!(
                        "object reference {index} outside table of {}",
                        self.offsets.len()
                    )));
                }
                Ok(index as usize)
            })
            .collect()
    }

    fn byte(&self, pos: usize) -> Result<u8> {
        if pos >= self.limit {
            return Err(ArchiveError::malformed(format!(
                "read at offset {pos} past end of object area"
            )));
        }
        Ok(self.data[pos])
    }

    fn slice(&self, start: usize, len: usize) -> Result<&'a [u8]> {
        match start.checked_add(len) {
            Some(end) if end <= self.limit => Ok(&self.data[start..end]),
            _ => Err(ArchiveError::malformed(format!(
                "length {len} at offset {start} reads past end of buffer"
            ))),
        }
    }
}

fn unknown_marker(marker: u8, offset: usize) -> ArchiveError {
    ArchiveError::malformed(format!("unknown marker 0x{marker:02x} at offset {offset}"))
}

fn to_usize(value: u64, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| ArchiveError::malformed(format!("{what} {value} too large")))
}

/// Big-endian unsigned integer of up to 8 bytes.
fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Copy a slice whose length the caller already checked into an array.
fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
