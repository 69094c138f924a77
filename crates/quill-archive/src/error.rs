use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    /// The binary container is structurally broken: bad marker, truncated
    /// length or offset, inconsistent trailer, or a container nested in itself.
    #[error("malformed container: {0}")]
    MalformedContainer(String),
    /// A UID points outside the `$objects` table.
    #[error("unresolved reference: index {index} outside object table of {len}")]
    UnresolvedReference { index: u64, len: usize },
    /// The container parsed but is not a usable keyed archive.
    #[error("invalid archive: {0}")]
    InvalidArchive(String),
    /// Containers nested in the binary container beyond the parser's limit.
    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),
    /// The resolved object graph goes deeper than the resolver follows.
    #[error("object graph deeper than {0} levels")]
    GraphTooDeep(usize),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ArchiveError::MalformedContainer(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ArchiveError::InvalidArchive(msg.into())
    }

    /// The decode stage that raised this error.
    pub fn stage(&self) -> Stage {
        match self {
            ArchiveError::MalformedContainer(_) | ArchiveError::NestingTooDeep(_) => {
                Stage::Container
            }
            ArchiveError::UnresolvedReference { .. }
            | ArchiveError::InvalidArchive(_)
            | ArchiveError::GraphTooDeep(_) => Stage::Archive,
        }
    }
}

/// Decode stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Container,
    Archive,
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Container => write!(f, "container"),
            Stage::Archive => write!(f, "archive"),
            Stage::Extract => write!(f, "extract"),
        }
    }
}
