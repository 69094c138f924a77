//! Writers for building fixtures: a binary plist encoder and a keyed-archive
//! builder that lays out `$objects` the way the system archiver does.

use crate::plist::{MAGIC, Plist};

/// Encode a plist tree as `bplist00`. Every node gets its own object; nothing
/// is deduplicated.
pub fn encode(root: &Plist) -> Vec<u8> {
    let mut table = Table::default();
    table.flatten(root);

    let count = table.entries.len();
    let ref_size = width_for(count as u64);

    let mut buf = MAGIC.to_vec();
    let mut offsets = Vec::with_capacity(count);
    for entry in &table.entries {
        offsets.push(buf.len() as u64);
        match entry {
            Entry::Scalar(value) => write_scalar(&mut buf, value),
            Entry::Array(refs) => {
                write_marker(&mut buf, 0xA, refs.len());
                write_refs(&mut buf, refs, ref_size);
            }
            Entry::Dictionary(keys, values) => {
                write_marker(&mut buf, 0xD, keys.len());
                write_refs(&mut buf, keys, ref_size);
                write_refs(&mut buf, values, ref_size);
            }
        }
    }

    let table_offset = buf.len() as u64;
    let offset_size = width_for(table_offset);
    for offset in offsets {
        write_uint(&mut buf, offset, offset_size);
    }

    buf.extend_from_slice(&[0u8; 6]);
    buf.push(offset_size as u8);
    buf.push(ref_size as u8);
    buf.extend_from_slice(&(count as u64).to_be_bytes());
    buf.extend_from_slice(&0u64.to_be_bytes());
    buf.extend_from_slice(&table_offset.to_be_bytes());
    buf
}

#[derive(Default)]
struct Table {
    entries: Vec<Entry>,
}

enum Entry {
    Scalar(Plist),
    Array(Vec<usize>),
    Dictionary(Vec<usize>, Vec<usize>),
}

impl Table {
    fn flatten(&mut self, value: &Plist) -> usize {
        let index = self.entries.len();
        self.entries.push(Entry::Scalar(Plist::Null));
        let entry = match value {
            Plist::Array(items) => Entry::Array(items.iter().map(|v| self.flatten(v)).collect()),
            Plist::Dictionary(pairs) => {
                let keys = pairs
                    .iter()
                    .map(|(k, _)| self.flatten(&Plist::String(k.clone())))
                    .collect();
                let values = pairs.iter().map(|(_, v)| self.flatten(v)).collect();
                Entry::Dictionary(keys, values)
            }
            scalar => Entry::Scalar(scalar.clone()),
        };
        self.entries[index] = entry;
        index
    }
}

fn width_for(max: u64) -> usize {
    match max {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFFFF_FFFF => 4,
        _ => 8,
    }
}

fn write_uint(buf: &mut Vec<u8>, value: u64, width: usize) {
    buf.extend_from_slice(&value.to_be_bytes()[8 - width..]);
}

fn write_marker(buf: &mut Vec<u8>, kind: u8, len: usize) {
    if len < 0xF {
        buf.push((kind << 4) | len as u8);
    } else {
        buf.push((kind << 4) | 0xF);
        write_integer(buf, len as i64);
    }
}

fn write_integer(buf: &mut Vec<u8>, value: i64) {
    match value {
        0..=0xFF => {
            buf.push(0x10);
            buf.push(value as u8);
        }
        0x100..=0xFFFF => {
            buf.push(0x11);
            buf.extend_from_slice(&(value as u16).to_be_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf.push(0x12);
            buf.extend_from_slice(&(value as u32).to_be_bytes());
        }
        _ => {
            buf.push(0x13);
            buf.extend_from_slice(&value.to_be_bytes());
        }
    }
}

fn write_refs(buf: &mut Vec<u8>, refs: &[usize], width: usize) {
    for &r in refs {
        write_uint(buf, r as u64, width);
    }
}

fn write_scalar(buf: &mut Vec<u8>, value: &Plist) {
    match value {
        Plist::Null => buf.push(0x00),
        Plist::Boolean(false) => buf.push(0x08),
        Plist::Boolean(true) => buf.push(0x09),
        Plist::Integer(i) => write_integer(buf, *i),
        Plist::Real(r) => {
            buf.push(0x23);
            buf.extend_from_slice(&r.to_be_bytes());
        }
        Plist::Date(d) => {
            buf.push(0x33);
            buf.extend_from_slice(&d.to_be_bytes());
        }
        Plist::Data(bytes) => {
            write_marker(buf, 0x4, bytes.len());
            buf.extend_from_slice(bytes);
        }
        Plist::String(s) if s.is_ascii() => {
            write_marker(buf, 0x5, s.len());
            buf.extend_from_slice(s.as_bytes());
        }
        Plist::String(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            write_marker(buf, 0x6, units.len());
            for unit in units {
                buf.extend_from_slice(&unit.to_be_bytes());
            }
        }
        Plist::Uid(uid) => {
            let width = width_for(*uid);
            buf.push(0x80 | (width as u8 - 1));
            write_uint(buf, *uid, width);
        }
        Plist::Array(_) | Plist::Dictionary(_) => unreachable!("containers are flattened"),
    }
}

/// Builds the `$objects` table of a keyed archive. Index 0 is always `$null`.
pub struct KeyedArchiveBuilder {
    objects: Vec<Plist>,
}

impl Default for KeyedArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyedArchiveBuilder {
    pub fn new() -> Self {
        Self {
            objects: vec![Plist::String("$null".into())],
        }
    }

    /// Append an object and return its UID.
    pub fn push(&mut self, object: Plist) -> u64 {
        self.objects.push(object);
        (self.objects.len() - 1) as u64
    }

    /// Replace the object at `uid`, for graphs that point back at themselves.
    pub fn set(&mut self, uid: u64, object: Plist) {
        self.objects[uid as usize] = object;
    }

    /// Append a class dictionary. `hierarchy` lists the class first, then its
    /// superclasses.
    pub fn class(&mut self, hierarchy: &[&str]) -> u64 {
        self.push(Plist::Dictionary(vec![
            ("$classname".into(), Plist::String(hierarchy[0].into())),
            (
                "$classes".into(),
                Plist::Array(hierarchy.iter().map(|c| Plist::String((*c).into())).collect()),
            ),
        ]))
    }

    /// Append an instance of `class` with the given fields.
    pub fn instance(&mut self, class: u64, fields: Vec<(&str, Plist)>) -> u64 {
        let mut entries: Vec<(String, Plist)> =
            fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        entries.push(("$class".into(), Plist::Uid(class)));
        self.push(Plist::Dictionary(entries))
    }

    pub fn string(&mut self, s: &str) -> u64 {
        self.push(Plist::String(s.into()))
    }

    /// The archive as a plist tree, with `root` as `$top.root`.
    pub fn into_plist(self, root: u64) -> Plist {
        Plist::Dictionary(vec![
            ("$version".into(), Plist::Integer(100_000)),
            ("$archiver".into(), Plist::String("NSKeyedArchiver".into())),
            (
                "$top".into(),
                Plist::Dictionary(vec![("root".into(), Plist::Uid(root))]),
            ),
            ("$objects".into(), Plist::Array(self.objects)),
        ])
    }

    pub fn finish(self, root: u64) -> Vec<u8> {
        encode(&self.into_plist(root))
    }
}

/// An `NSAttributedString` archive holding `text` under one attribute run.
pub fn attributed_string(text: &str) -> Vec<u8> {
    let mut archive = KeyedArchiveBuilder::new();
    let string = archive.string(text);
    let dict_class = archive.class(&["NSDictionary", "NSObject"]);
    let key = archive.string("__kIMMessagePartAttributeName");
    let value = archive.push(Plist::Integer(0));
    let attributes = archive.instance(
        dict_class,
        vec![
            ("NS.keys", Plist::Array(vec![Plist::Uid(key)])),
            ("NS.objects", Plist::Array(vec![Plist::Uid(value)])),
        ],
    );
    let class = archive.class(&["NSAttributedString", "NSObject"]);
    let root = archive.instance(
        class,
        vec![
            ("NSString", Plist::Uid(string)),
            ("NSAttributes", Plist::Uid(attributes)),
        ],
    );
    archive.finish(root)
}

/// A legacy typed-stream body carrying `text` as its `NSString`.
pub fn typed_stream(text: &str) -> Vec<u8> {
    let mut buf = vec![0x04, 0x0B];
    buf.extend_from_slice(b"streamtyped");
    buf.extend_from_slice(&[0x81, 0xE8, 0x03, 0x84, 0x01, 0x40, 0x84, 0x84, 0x84, 0x12]);
    buf.extend_from_slice(b"NSAttributedString");
    buf.extend_from_slice(&[0x00, 0x84, 0x84, 0x08]);
    buf.extend_from_slice(b"NSObject");
    buf.extend_from_slice(&[0x00, 0x85, 0x92, 0x84, 0x84, 0x84, 0x08]);
    buf.extend_from_slice(b"NSString");
    buf.extend_from_slice(&[0x01, 0x94, 0x84, 0x01, 0x2B]);
    let len = text.len();
    if len < 0x80 {
        buf.push(len as u8);
    } else if len <= 0xFFFF {
        buf.push(0x81);
        buf.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        buf.push(0x82);
        buf.extend_from_slice(&(len as u32).to_le_bytes());
    }
    buf.extend_from_slice(text.as_bytes());
    buf.extend_from_slice(&[0x86, 0x84, 0x02, 0x69, 0x49, 0x01, 0x01, 0x92, 0x86]);
    buf
}
