use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Message columns read when present; absent ones select as NULL.
pub const OPTIONAL_MESSAGE_COLUMNS: &[&str] = &[
    "attributedBody",
    "handle_id",
    "is_from_me",
    "item_type",
    "associated_message_type",
    "group_action_type",
    "is_system_message",
];

const REQUIRED: &[(&str, &[&str])] = &[
    ("message", &["text", "date"]),
    ("chat", &["chat_identifier"]),
    ("chat_message_join", &["chat_id", "message_id"]),
];

/// Which parts of the store layout this database has.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    message: Vec<String>,
    pub has_handle_table: bool,
    pub has_display_name: bool,
}

impl Schema {
    pub fn detect(conn: &Connection) -> Result<Self> {
        for (table, columns) in REQUIRED {
            let present = table_columns(conn, table)?;
            if present.is_empty() {
                return Err(StoreError::Schema(format!("missing table '{table}'")));
            }
            if let Some(missing) = columns.iter().find(|c| !contains(&present, c)) {
                return Err(StoreError::Schema(format!(
                    "table '{table}' has no column '{missing}'"
                )));
            }
        }

        let handle = table_columns(conn, "handle")?;
        let schema = Self {
            message: table_columns(conn, "message")?,
            has_handle_table: contains(&handle, "id"),
            has_display_name: contains(&table_columns(conn, "chat")?, "display_name"),
        };

        let missing: Vec<&str> = OPTIONAL_MESSAGE_COLUMNS
            .iter()
            .copied()
            .filter(|c| !schema.has_message_column(c))
            .collect();
        if !missing.is_empty() {
            debug!("message columns absent, reading as NULL: {}", missing.join(", "));
        }
        if !schema.has_handle_table {
            debug!("no handle table, senders fall back to the conversation identifier");
        }
        Ok(schema)
    }

    pub fn has_message_column(&self, column: &str) -> bool {
        contains(&self.message, column)
    }

    /// `m.<column>` when the column exists, `NULL` otherwise.
    pub fn message_column(&self, column: &str) -> String {
        if self.has_message_column(column) {
            format!("m.{column}")
        } else {
            "NULL".to_string()
        }
    }

    /// The sender handle expression and the join it needs.
    pub fn handle_source(&self) -> (&'static str, &'static str) {
        if self.has_handle_table && self.has_message_column("handle_id") {
            ("h.id", "LEFT JOIN handle h ON h.ROWID = m.handle_id")
        } else {
            ("NULL", "")
        }
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn contains(columns: &[String], name: &str) -> bool {
    columns.iter().any(|c| c.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(ddl: &str) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(ddl).unwrap();
        conn
    }

    const MINIMAL: &str = "
        CREATE TABLE message (ROWID INTEGER PRIMARY KEY, text TEXT, date INTEGER);
        CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, chat_identifier TEXT);
        CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);
    ";

    #[test]
    fn minimal_layout_reads_optional_columns_as_null() {
        let schema = Schema::detect(&conn(MINIMAL)).unwrap();
        assert!(!schema.has_handle_table);
        assert!(!schema.has_display_name);
        assert_eq!(schema.message_column("attributedBody"), "NULL");
        assert_eq!(schema.message_column("text"), "m.text");
        assert_eq!(schema.handle_source(), ("NULL", ""));
    }

    #[test]
    fn full_layout_joins_handles() {
        let ddl = format!(
            "{MINIMAL}
            CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT);
            ALTER TABLE message ADD COLUMN handle_id INTEGER;
            ALTER TABLE message ADD COLUMN attributedBody BLOB;
            ALTER TABLE chat ADD COLUMN display_name TEXT;"
        );
        let schema = Schema::detect(&conn(&ddl)).unwrap();
        assert!(schema.has_display_name);
        assert_eq!(schema.message_column("attributedBody"), "m.attributedBody");
        assert_eq!(schema.handle_source().0, "h.id");
    }

    #[test]
    fn missing_table_is_schema_error() {
        let err = Schema::detect(&conn("CREATE TABLE message (text TEXT, date INTEGER);"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Schema(msg) if msg.contains("'chat'")));
    }

    #[test]
    fn missing_required_column_is_schema_error() {
        let ddl = MINIMAL.replace("chat_identifier TEXT", "guid TEXT");
        let err = Schema::detect(&conn(&ddl)).unwrap_err();
        assert!(matches!(err, StoreError::Schema(msg) if msg.contains("chat_identifier")));
    }
}
