use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no message store at {}", .0.display())]
    NotFound(PathBuf),

    #[error(
        "access to {} was denied. Grant your terminal Full Disk Access in \
         System Settings > Privacy & Security > Full Disk Access, then retry.",
        .0.display()
    )]
    AccessDenied(PathBuf),

    #[error("not a usable message store: {0}")]
    Schema(String),

    #[error("no conversation with identifier '{0}'")]
    NoSuchConversation(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
