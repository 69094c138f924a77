//! Plain-text extraction from a resolved archive graph.

use serde::Serialize;

use crate::keyed::{self, Instance, Object};

/// Object replacement character: marks where an attachment sits in the text.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Objects visited before the walk gives up on a pathological graph.
const MAX_VISITS: usize = 1 << 16;

/// Classes that only ever decorate text.
const ANNOTATION_CLASSES: &[&str] = &[
    "NSColor",
    "NSDate",
    "NSFont",
    "NSNumber",
    "NSParagraphStyle",
    "NSShadow",
    "NSTextAttachment",
    "NSTextTab",
    "NSURL",
    "NSUUID",
    "NSValue",
];

/// Field names that appear on attribute and run bookkeeping objects.
const ANNOTATION_FIELDS: &[&str] = &[
    "NS.base",
    "NS.length",
    "NS.location",
    "NS.relative",
    "NS.rangeval.length",
    "NS.rangeval.location",
    "NSAttributeInfo",
    "NSAttributes",
    "NSColorSpace",
    "NSName",
    "NSRGB",
    "NSSize",
];

/// The text of one message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DecodedText {
    /// Plain text, possibly empty.
    Text(String),
    /// The body holds no text at all (an attachment, or an unknown shape).
    NonText,
}

impl DecodedText {
    /// Apply the attachment-placeholder rule: a body made only of
    /// replacement characters is non-text, otherwise they are dropped.
    pub fn from_raw(raw: &str) -> Self {
        if raw.contains(OBJECT_REPLACEMENT)
            && raw.chars().all(|c| c == OBJECT_REPLACEMENT || c.is_whitespace())
        {
            return DecodedText::NonText;
        }
        DecodedText::Text(raw.chars().filter(|&c| c != OBJECT_REPLACEMENT).collect())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedText::Text(s) => Some(s),
            DecodedText::NonText => None,
        }
    }
}

/// Extract the plain text of a resolved root object.
pub fn extract_text(root: &Object) -> DecodedText {
    let mut walker = Walker { visits: 0, depth: 0 };
    match walker.visit(root) {
        Piece::Text(text) => DecodedText::from_raw(&text),
        Piece::Annotation => DecodedText::Text(String::new()),
        Piece::Unknown => DecodedText::NonText,
    }
}

/// What one object contributes to the text.
enum Piece {
    Text(String),
    /// Recognized, carries no characters.
    Annotation,
    Unknown,
}

struct Walker {
    visits: usize,
    depth: usize,
}

impl Walker {
    fn visit(&mut self, object: &Object) -> Piece {
        self.visits += 1;
        if self.visits > MAX_VISITS || self.depth >= keyed::MAX_DEPTH {
            return Piece::Unknown;
        }

        self.depth += 1;
        let piece = self.contribution(object);
        self.depth -= 1;
        piece
    }

    fn contribution(&mut self, object: &Object) -> Piece {
        match object {
            Object::String(s) => Piece::Text(s.clone()),
            Object::Instance(instance) => self.instance(instance),
            Object::Array(items) => self.sequence(items.iter().map(|item| item.as_ref())),
            Object::Dictionary(_)
            | Object::Null
            | Object::Boolean(_)
            | Object::Integer(_)
            | Object::Real(_)
            | Object::Date(_) => Piece::Annotation,
            Object::Data(_) | Object::Class(_) | Object::Cycle(_) => Piece::Unknown,
        }
    }

    /// Concatenate text runs in order. Decorations and unknown members add
    /// nothing.
    fn sequence<'o>(&mut self, items: impl Iterator<Item = &'o Object>) -> Piece {
        let mut text: Option<String> = None;
        let mut annotated = false;
        let mut empty = true;
        for item in items {
            empty = false;
            match self.visit(item) {
                Piece::Text(run) => text.get_or_insert_with(String::new).push_str(&run),
                Piece::Annotation => annotated = true,
                Piece::Unknown => {}
            }
        }
        match text {
            Some(text) => Piece::Text(text),
            None if annotated || empty => Piece::Annotation,
            None => Piece::Unknown,
        }
    }

    fn instance(&mut self, instance: &Instance) -> Piece {
        if let Some(string) = instance.get("NSString") {
            return match self.visit(string) {
                Piece::Text(text) => Piece::Text(text),
                _ => Piece::Unknown,
            };
        }
        // Text-run containers that are not folded collections
        if let Some(runs) = instance.get("NS.objects").or_else(|| instance.get("NSRuns")) {
            return self.visit(runs);
        }
        if let Some(Object::String(s)) = instance.get("NS.string").map(|o| o.as_ref()) {
            return Piece::Text(s.clone());
        }

        let class_is_annotation = instance.class.as_ref().is_some_and(|class| {
            class.name.contains("AttributedString")
                || ANNOTATION_CLASSES.iter().any(|c| class.is_a(c))
        });
        let fields_are_annotation = !instance.fields.is_empty()
            && instance
                .fields
                .iter()
                .all(|(key, _)| ANNOTATION_FIELDS.contains(&key.as_str()));

        if class_is_annotation || fields_are_annotation {
            Piece::Annotation
        } else {
            Piece::Unknown
        }
    }
}
