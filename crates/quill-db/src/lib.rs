//! Read-only access to a Messages store (`chat.db`).

pub mod classify;
pub mod error;
pub mod models;
pub mod queries;
pub mod schema;

use std::io;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, ErrorCode, OpenFlags};
use tracing::info;

pub use classify::RowKind;
pub use error::{Result, StoreError};
pub use models::MessageRow;
pub use schema::Schema;

/// An open store. The connection closes when this drops.
pub struct Store {
    conn: Connection,
    schema: Schema,
    path: PathBuf,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        check_access(path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn =
            Connection::open_with_flags(path, flags).map_err(|e| map_open_error(path, e))?;
        conn.execute_batch("PRAGMA query_only = ON;")
            .map_err(|e| map_open_error(path, e))?;

        let schema = Schema::detect(&conn).map_err(|e| match e {
            StoreError::Sqlite(inner) => map_open_error(path, inner),
            other => other,
        })?;

        info!("Message store opened at {} (read-only)", path.display());
        Ok(Self {
            conn,
            schema,
            path: path.to_path_buf(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Tell a missing store from one the OS will not let us read before SQLite
/// folds both into "unable to open".
fn check_access(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => StoreError::AccessDenied(path.to_path_buf()),
        _ => StoreError::Schema(format!("cannot stat {}: {}", path.display(), e)),
    })?;
    if metadata.is_dir() {
        return Err(StoreError::Schema(format!("{} is a directory", path.display())));
    }

    // Privacy protection on macOS allows stat but refuses open.
    match std::fs::File::open(path) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            Err(StoreError::AccessDenied(path.to_path_buf()))
        }
        _ => Ok(()),
    }
}

fn map_open_error(path: &Path, e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::PermissionDenied | ErrorCode::AuthorizationForStatementDenied) => {
            StoreError::AccessDenied(path.to_path_buf())
        }
        Some(ErrorCode::CannotOpen) if path.exists() => StoreError::AccessDenied(path.to_path_buf()),
        Some(ErrorCode::CannotOpen) => StoreError::NotFound(path.to_path_buf()),
        Some(ErrorCode::NotADatabase) => {
            StoreError::Schema(format!("{} is not an SQLite database", path.display()))
        }
        _ => StoreError::Sqlite(e),
    }
}
