//! Keyed-archive object graph.
//!
//! A keyed archive is a plist dictionary:
//!
//! ```text
//! $archiver   "NSKeyedArchiver"
//! $version    100000
//! $top        { "root": UID }
//! $objects    [ "$null", obj1, obj2, ... ]
//! ```
//!
//! Objects in `$objects` reference each other by UID (index into the table).
//! Instances are dictionaries carrying a `$class` UID that points at a class
//! dictionary (`$classname`, `$classes`). Sub-objects are shared and may point
//! back at an ancestor, so resolution goes through a per-index slot table:
//! each slot is resolved at most once, and a slot reached again while still
//! in progress resolves to [`Object::Cycle`].

use std::rc::Rc;

use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::plist::Plist;

/// The only archiver this resolver understands.
pub const ARCHIVER: &str = "NSKeyedArchiver";

/// Deepest object graph resolved before giving up.
pub const MAX_DEPTH: usize = 256;

/// Class metadata shared by every instance of the class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassRef {
    pub name: String,
    /// The class followed by its superclasses, as archived.
    pub hierarchy: Vec<String>,
    pub hints: Vec<String>,
}

impl ClassRef {
    pub fn is_a(&self, class: &str) -> bool {
        self.name == class || self.hierarchy.iter().any(|c| c == class)
    }
}

/// An archived instance whose class was not folded into a plain value.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub class: Option<Rc<ClassRef>>,
    pub fields: Vec<(String, Rc<Object>)>,
}

impl Instance {
    pub fn get(&self, key: &str) -> Option<&Rc<Object>> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class.as_ref().map(|c| c.name.as_str())
    }

    pub fn is_a(&self, class: &str) -> bool {
        self.class.as_ref().is_some_and(|c| c.is_a(class))
    }

    /// Attribute runs of an attributed string.
    ///
    /// Multi-run strings store `NSAttributes` as an array and `NSAttributeInfo`
    /// as LEB128 pairs of (run length, index into that array). A single-run
    /// string stores one attribute dictionary covering the whole text.
    pub fn attribute_runs(&self) -> Result<Vec<AttributeRun>> {
        let Some(attributes) = self.get("NSAttributes") else {
            return Ok(Vec::new());
        };

        match (self.get("NSAttributeInfo").map(|o| o.as_ref()), attributes.as_ref()) {
            (Some(Object::Data(info)), Object::Array(table)) => {
                let mut runs = Vec::new();
                let mut cursor = info.as_slice();
                while !cursor.is_empty() {
                    let length = read_leb128(&mut cursor)?;
                    let index = read_leb128(&mut cursor)?;
                    let attributes = usize::try_from(index)
                        .ok()
                        .and_then(|i| table.get(i))
                        .cloned()
                        .ok_or_else(|| {
                            ArchiveError::invalid(format!(
                                "attribute run points at entry {index} of {}",
                                table.len()
                            ))
                        })?;
                    runs.push(AttributeRun { length, attributes });
                }
                Ok(runs)
            }
            (_, _) => {
                let length = match self.get("NSString").map(|o| o.as_ref()) {
                    Some(Object::String(s)) => s.encode_utf16().count() as u64,
                    _ => 0,
                };
                Ok(vec![AttributeRun {
                    length,
                    attributes: Rc::clone(attributes),
                }])
            }
        }
    }
}

/// A span of an attributed string sharing one attribute set. `length` is in
/// UTF-16 code units.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRun {
    pub length: u64,
    pub attributes: Rc<Object>,
}

/// A resolved archive object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Date(f64),
    Data(Vec<u8>),
    String(String),
    Class(Rc<ClassRef>),
    Instance(Instance),
    Array(Vec<Rc<Object>>),
    Dictionary(Vec<(Rc<Object>, Rc<Object>)>),
    /// An object reached again while it was still being resolved.
    Cycle(u64),
}

impl Object {
    pub fn kind(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::Boolean(_) => "boolean",
            Object::Integer(_) => "integer",
            Object::Real(_) => "real",
            Object::Date(_) => "date",
            Object::Data(_) => "data",
            Object::String(_) => "string",
            Object::Class(_) => "class",
            Object::Instance(_) => "instance",
            Object::Array(_) => "array",
            Object::Dictionary(_) => "dictionary",
            Object::Cycle(_) => "cycle",
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Object::Instance(instance) => Some(instance),
            _ => None,
        }
    }
}

/// A validated keyed archive, ready to resolve.
#[derive(Debug)]
pub struct KeyedArchive {
    archiver: String,
    version: Option<i64>,
    root: u64,
    objects: Vec<Plist>,
}

impl KeyedArchive {
    /// Validate the archive envelope and take ownership of its object table.
    pub fn from_plist(plist: Plist) -> Result<Self> {
        let entries = match plist {
            Plist::Dictionary(entries) => entries,
            other => {
                return Err(ArchiveError::invalid(format!(
                    "top level is a {}, not a dictionary",
                    other.kind()
                )));
            }
        };

        let mut archiver = None;
        let mut version = None;
        let mut top = None;
        let mut objects = None;
        for (key, value) in entries {
            match (key.as_str(), value) {
                ("$archiver", Plist::String(s)) => archiver = Some(s),
                ("$version", Plist::Integer(v)) => version = Some(v),
                ("$top", top_value @ Plist::Dictionary(_)) => top = Some(top_value),
                ("$objects", Plist::Array(items)) => objects = Some(items),
                ("$archiver" | "$top" | "$objects", other) => {
                    return Err(ArchiveError::invalid(format!(
                        "{key} is a {}",
                        other.kind()
                    )));
                }
                _ => {}
            }
        }

        let archiver = archiver.ok_or_else(|| ArchiveError::invalid("missing $archiver"))?;
        if archiver != ARCHIVER {
            debug!(archiver = %archiver, "unfamiliar archiver, resolving anyway");
        }
        let objects = objects.ok_or_else(|| ArchiveError::invalid("missing $objects"))?;
        let top = top.ok_or_else(|| ArchiveError::invalid("missing $top"))?;
        let root = root_uid(&top)?;

        Ok(Self {
            archiver,
            version,
            root,
            objects,
        })
    }

    pub fn archiver(&self) -> &str {
        &self.archiver
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn root_uid(&self) -> u64 {
        self.root
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.objects)
    }

    pub fn resolve_root(&self) -> Result<Rc<Object>> {
        self.resolver().resolve(self.root)
    }
}

/// `$top.root`, or the only UID in `$top` when the key differs.
fn root_uid(top: &Plist) -> Result<u64> {
    if let Some(uid) = top.get("root").and_then(Plist::as_uid) {
        return Ok(uid);
    }
    let uids: Vec<u64> = top
        .as_dictionary()
        .unwrap_or_default()
        .iter()
        .filter_map(|(_, v)| v.as_uid())
        .collect();
    match uids.as_slice() {
        [uid] => Ok(*uid),
        [] => Err(ArchiveError::invalid("$top has no root reference")),
        _ => Err(ArchiveError::invalid("$top has several references and no root")),
    }
}

enum Slot {
    Pending,
    InProgress,
    /// `height` is how many levels the object spans below the point it is
    /// attached at.
    Done { object: Rc<Object>, height: usize },
}

/// Resolves UIDs against one archive's object table, memoizing every index.
///
/// Every container entered counts towards one depth limit, whether it was
/// reached through a UID or nested inline. A memoized object carries its
/// height, so reusing it deeper in the graph is held to the same limit.
pub struct Resolver<'a> {
    objects: &'a [Plist],
    slots: Vec<Slot>,
    depth: usize,
    /// Deepest level reached in the object currently being built.
    reached: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(objects: &'a [Plist]) -> Self {
        Self {
            objects,
            slots: objects.iter().map(|_| Slot::Pending).collect(),
            depth: 0,
            reached: 0,
        }
    }

    pub fn resolve(&mut self, uid: u64) -> Result<Rc<Object>> {
        let index = usize::try_from(uid)
            .ok()
            .filter(|&i| i < self.objects.len())
            .ok_or(ArchiveError::UnresolvedReference {
                index: uid,
                len: self.objects.len(),
            })?;

        match &self.slots[index] {
            Slot::Done { object, height } => {
                let (object, height) = (Rc::clone(object), *height);
                self.reach(self.depth + height)?;
                return Ok(object);
            }
            Slot::InProgress => return Ok(Rc::new(Object::Cycle(uid))),
            Slot::Pending => {}
        }

        self.slots[index] = Slot::InProgress;
        let start = self.depth;
        let outer = std::mem::replace(&mut self.reached, start);
        let built = self.descend(|r| r.build(index));
        let height = self.reached - start;
        self.reached = self.reached.max(outer);

        match built {
            Ok(object) => {
                let object = Rc::new(object);
                self.slots[index] = Slot::Done {
                    object: Rc::clone(&object),
                    height,
                };
                Ok(object)
            }
            Err(e) => {
                self.slots[index] = Slot::Pending;
                Err(e)
            }
        }
    }

    /// Run `f` one level deeper.
    fn descend<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.reach(self.depth + 1)?;
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn reach(&mut self, level: usize) -> Result<()> {
        if level > MAX_DEPTH {
            return Err(ArchiveError::GraphTooDeep(MAX_DEPTH));
        }
        self.reached = self.reached.max(level);
        Ok(())
    }

    fn build(&mut self, index: usize) -> Result<Object> {
        let objects = self.objects;
        let raw = &objects[index];

        match raw {
            Plist::String(s) if index == 0 && s == "$null" => Ok(Object::Null),
            Plist::Dictionary(_) if raw.get("$classname").is_some() => {
                Ok(Object::Class(Rc::new(class_ref(raw)?)))
            }
            Plist::Dictionary(entries) => self.dictionary(entries),
            Plist::Uid(uid) => Ok(self.resolve(*uid)?.as_ref().clone()),
            Plist::Array(items) => Ok(Object::Array(self.values(items)?)),
            scalar => Ok(primitive(scalar)),
        }
    }

    /// Resolve a value stored inside an object: UIDs are followed, everything
    /// else is taken inline.
    fn value(&mut self, raw: &Plist) -> Result<Rc<Object>> {
        match raw {
            Plist::Uid(uid) => self.resolve(*uid),
            Plist::Array(items) => {
                self.descend(|r| Ok(Rc::new(Object::Array(r.values(items)?))))
            }
            Plist::Dictionary(entries) => self.descend(|r| Ok(Rc::new(r.dictionary(entries)?))),
            scalar => Ok(Rc::new(primitive(scalar))),
        }
    }

    fn values(&mut self, items: &[Plist]) -> Result<Vec<Rc<Object>>> {
        items.iter().map(|item| self.value(item)).collect()
    }

    /// An instance if the dictionary names a `$class`, otherwise a plain
    /// string-keyed dictionary.
    fn dictionary(&mut self, entries: &[(String, Plist)]) -> Result<Object> {
        if !entries.iter().any(|(k, _)| k == "$class") {
            let pairs = entries
                .iter()
                .map(|(k, v)| -> Result<(Rc<Object>, Rc<Object>)> {
                    Ok((Rc::new(Object::String(k.clone())), self.value(v)?))
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Object::Dictionary(pairs));
        }

        let mut class = None;
        let mut fields = Vec::with_capacity(entries.len());
        for (key, raw) in entries {
            if key == "$class" {
                let uid = raw
                    .as_uid()
                    .ok_or_else(|| ArchiveError::invalid(format!("$class is a {}", raw.kind())))?;
                match self.resolve(uid)?.as_ref() {
                    Object::Class(c) => class = Some(Rc::clone(c)),
                    other => {
                        return Err(ArchiveError::invalid(format!(
                            "$class points at a {}",
                            other.kind()
                        )));
                    }
                }
            } else {
                fields.push((key.clone(), self.value(raw)?));
            }
        }

        fold(Instance { class, fields })
    }
}

fn class_ref(raw: &Plist) -> Result<ClassRef> {
    let name = raw
        .get("$classname")
        .and_then(Plist::as_str)
        .ok_or_else(|| ArchiveError::invalid("$classname is not a string"))?
        .to_string();
    let strings = |key: &str| -> Vec<String> {
        raw.get(key)
            .and_then(Plist::as_array)
            .unwrap_or_default()
            .iter()
            .filter_map(|c| c.as_str().map(str::to_string))
            .collect()
    };
    Ok(ClassRef {
        name,
        hierarchy: strings("$classes"),
        hints: strings("$classhints"),
    })
}

fn primitive(raw: &Plist) -> Object {
    match raw {
        Plist::Null => Object::Null,
        Plist::Boolean(b) => Object::Boolean(*b),
        Plist::Integer(i) => Object::Integer(*i),
        Plist::Real(r) => Object::Real(*r),
        Plist::Date(d) => Object::Date(*d),
        Plist::Data(bytes) => Object::Data(bytes.clone()),
        Plist::String(s) => Object::String(s.clone()),
        Plist::Uid(uid) => Object::Integer(*uid as i64),
        Plist::Array(_) | Plist::Dictionary(_) => Object::Null,
    }
}

/// Fold Foundation value classes into plain objects: strings, collections and
/// data. Anything else stays an [`Instance`].
fn fold(instance: Instance) -> Result<Object> {
    let field = |key: &str| instance.get(key).map(|o| o.as_ref());

    if instance.is_a("NSString") {
        match (field("NS.string"), field("NS.bytes")) {
            (Some(Object::String(s)), _) => return Ok(Object::String(s.clone())),
            (_, Some(Object::Data(bytes))) => {
                return Ok(Object::String(String::from_utf8_lossy(bytes).into_owned()));
            }
            _ => {}
        }
    }

    if ["NSArray", "NSSet", "NSOrderedSet"].iter().any(|c| instance.is_a(c)) {
        if let Some(Object::Array(items)) = field("NS.objects") {
            return Ok(Object::Array(items.clone()));
        }
    }

    if instance.is_a("NSDictionary") {
        if let (Some(Object::Array(keys)), Some(Object::Array(values))) =
            (field("NS.keys"), field("NS.objects"))
        {
            if keys.len() != values.len() {
                return Err(ArchiveError::invalid(format!(
                    "dictionary with {} keys and {} values",
                    keys.len(),
                    values.len()
                )));
            }
            let pairs = keys.iter().cloned().zip(values.iter().cloned()).collect();
            return Ok(Object::Dictionary(pairs));
        }
    }

    if instance.is_a("NSData") {
        if let Some(Object::Data(bytes)) = field("NS.data").or_else(|| field("NS.bytes")) {
            return Ok(Object::Data(bytes.clone()));
        }
    }

    Ok(Object::Instance(instance))
}

fn read_leb128(cursor: &mut &[u8]) -> Result<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let (&byte, rest) = cursor
            .split_first()
            .ok_or_else(|| ArchiveError::invalid("truncated attribute run table"))?;
        *cursor = rest;
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ArchiveError::invalid("attribute run length overflows"))
}
