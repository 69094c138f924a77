//! Structural summary of one archived body, for diagnostics.

use std::fmt;

use serde::Serialize;

use crate::error::Stage;
use crate::extract::{self, DecodedText};
use crate::keyed::{KeyedArchive, Object};
use crate::plist::{self, Plist, Token};
use crate::{BodyFormat, streamtyped};

/// Leading bytes shown in hex.
const HEAD_BYTES: usize = 16;

#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub format: BodyFormat,
    pub byte_len: usize,
    pub head_hex: String,
    /// First stage that failed, if any. A body that decodes to non-text
    /// reports `extract`.
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    pub container: Option<ContainerSummary>,
    pub archive: Option<ArchiveSummary>,
    pub decoded: Option<DecodedText>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub root_kind: &'static str,
    pub containers: usize,
    pub scalars: usize,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub archiver: String,
    pub version: Option<i64>,
    pub objects: usize,
    pub root_uid: u64,
    pub root_kind: Option<&'static str>,
    pub root_class: Option<String>,
    pub root_fields: Vec<String>,
    pub attribute_runs: Option<usize>,
}

/// Run every decode stage on `data`, recording how far it got.
pub fn inspect_body(data: &[u8]) -> Inspection {
    let format = BodyFormat::detect(data);
    let mut inspection = Inspection {
        format,
        byte_len: data.len(),
        head_hex: hex::encode(&data[..data.len().min(HEAD_BYTES)]),
        failed_stage: None,
        error: None,
        container: None,
        archive: None,
        decoded: None,
    };

    match format {
        BodyFormat::BinaryPlist => inspect_plist(data, &mut inspection),
        BodyFormat::TypedStream => match streamtyped::read_string(data) {
            Ok(text) => inspection.finish(DecodedText::from_raw(&text)),
            Err(e) => inspection.fail(e.stage(), e),
        },
        BodyFormat::Unknown => inspection.fail(Stage::Container, "no recognized format marker"),
    }
    inspection
}

fn inspect_plist(data: &[u8], inspection: &mut Inspection) {
    let tree = match plist::parse(data) {
        Ok(tree) => tree,
        Err(e) => return inspection.fail(e.stage(), e),
    };
    inspection.container = Some(summarize_container(&tree));

    if let Plist::String(s) = &tree {
        return inspection.finish(DecodedText::from_raw(s));
    }

    let archive = match KeyedArchive::from_plist(tree) {
        Ok(archive) => archive,
        Err(e) => return inspection.fail(e.stage(), e),
    };
    let mut summary = ArchiveSummary {
        archiver: archive.archiver().to_string(),
        version: archive.version(),
        objects: archive.object_count(),
        root_uid: archive.root_uid(),
        root_kind: None,
        root_class: None,
        root_fields: Vec::new(),
        attribute_runs: None,
    };

    let root = archive.resolve_root();
    if let Ok(root) = &root {
        summary.root_kind = Some(root.kind());
        if let Object::Instance(instance) = root.as_ref() {
            summary.root_class = instance.class_name().map(str::to_string);
            summary.root_fields = instance.fields.iter().map(|(k, _)| k.clone()).collect();
            summary.attribute_runs = instance.attribute_runs().ok().map(|runs| runs.len());
        }
    }
    inspection.archive = Some(summary);

    match root {
        Ok(root) => inspection.finish(extract::extract_text(&root)),
        Err(e) => inspection.fail(e.stage(), e),
    }
}

fn summarize_container(tree: &Plist) -> ContainerSummary {
    let mut summary = ContainerSummary {
        root_kind: tree.kind(),
        containers: 0,
        scalars: 0,
        max_depth: 0,
    };
    let mut depth = 0usize;
    for token in tree.tokens() {
        match token {
            Token::ArrayStart(_) | Token::DictionaryStart(_) => {
                summary.containers += 1;
                depth += 1;
                summary.max_depth = summary.max_depth.max(depth);
            }
            Token::End => depth = depth.saturating_sub(1),
            Token::Scalar(_) => summary.scalars += 1,
            Token::Key(_) => {}
        }
    }
    summary
}

impl Inspection {
    fn fail(&mut self, stage: Stage, error: impl fmt::Display) {
        self.failed_stage = Some(stage);
        self.error = Some(error.to_string());
    }

    fn finish(&mut self, decoded: DecodedText) {
        if decoded == DecodedText::NonText {
            self.failed_stage = Some(Stage::Extract);
            self.error = Some("no text in a recognized shape".to_string());
        }
        self.decoded = Some(decoded);
    }
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "format={} bytes={} head={}", self.format, self.byte_len, self.head_hex)?;
        if let Some(c) = &self.container {
            write!(
                f,
                " | container root={} containers={} scalars={} depth={}",
                c.root_kind, c.containers, c.scalars, c.max_depth
            )?;
        }
        if let Some(a) = &self.archive {
            write!(
                f,
                " | archive objects={} root_uid={} root={} class={}",
                a.objects,
                a.root_uid,
                a.root_kind.unwrap_or("-"),
                a.root_class.as_deref().unwrap_or("-"),
            )?;
            if !a.root_fields.is_empty() {
                write!(f, " fields=[{}]", a.root_fields.join(","))?;
            }
            if let Some(runs) = a.attribute_runs {
                write!(f, " runs={runs}")?;
            }
        }
        match (&self.failed_stage, &self.error) {
            (Some(stage), Some(error)) => write!(f, " | failed at {stage}: {error}"),
            _ => write!(f, " | ok"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{KeyedArchiveBuilder, attributed_string, typed_stream};

    #[test]
    fn summarizes_good_archive() {
        let inspection = inspect_body(&attributed_string("hello"));
        assert_eq!(inspection.format, BodyFormat::BinaryPlist);
        assert!(inspection.failed_stage.is_none());
        assert_eq!(inspection.decoded, Some(DecodedText::Text("hello".into())));

        let archive = inspection.archive.as_ref().unwrap();
        assert_eq!(archive.archiver, "NSKeyedArchiver");
        assert_eq!(archive.root_class.as_deref(), Some("NSAttributedString"));
        assert_eq!(archive.attribute_runs, Some(1));
        assert!(inspection.container.as_ref().unwrap().max_depth >= 2);
        assert!(inspection.to_string().ends_with("| ok"));
    }

    #[test]
    fn reports_container_stage() {
        let mut body = attributed_string("hello");
        body.truncate(body.len() - 3);
        let inspection = inspect_body(&body);
        assert_eq!(inspection.failed_stage, Some(Stage::Container));
        assert!(inspection.container.is_none());
        assert!(inspection.to_string().contains("failed at container"));
    }

    #[test]
    fn deep_graph_fails_at_archive_stage() {
        // Three objects of 120 nested arrays, each pointing at the next.
        let mut archive = KeyedArchiveBuilder::new();
        let mut next = archive.string("deep");
        for _ in 0..3 {
            let wrapped = (0..120).fold(Plist::Uid(next), |acc, _| Plist::Array(vec![acc]));
            next = archive.push(wrapped);
        }
        let inspection = inspect_body(&archive.finish(next));
        assert_eq!(inspection.failed_stage, Some(Stage::Archive));
        assert!(inspection.to_string().contains("failed at archive"));
    }

    #[test]
    fn reports_unknown_format() {
        let inspection = inspect_body(b"\x00\x01\x02");
        assert_eq!(inspection.format, BodyFormat::Unknown);
        assert_eq!(inspection.failed_stage, Some(Stage::Container));
        assert_eq!(inspection.head_hex, "000102");
    }

    #[test]
    fn typed_stream_body() {
        let inspection = inspect_body(&typed_stream("old style"));
        assert_eq!(inspection.format, BodyFormat::TypedStream);
        assert_eq!(inspection.decoded, Some(DecodedText::Text("old style".into())));
    }
}
