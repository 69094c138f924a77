use quill_types::models::ChatSummary;
use rusqlite::Row;
use rusqlite::types::ValueRef;
use tracing::debug;

use crate::Store;
use crate::classify::RowKind;
use crate::error::{Result, StoreError};
use crate::models::MessageRow;

impl Store {
    // -- Chats --

    /// Every conversation with at least one message, busiest first, ties
    /// broken by identifier. Rows sharing an identifier are one conversation,
    /// labelled by the earliest of them with a non-empty display name.
    pub fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        let label = if self.schema().has_display_name {
            "(SELECT TRIM(n.display_name) FROM chat n
              WHERE n.chat_identifier = c.chat_identifier
                AND NULLIF(TRIM(n.display_name), '') IS NOT NULL
              ORDER BY n.ROWID LIMIT 1)"
        } else {
            "NULL"
        };
        let sql = format!(
            "SELECT c.chat_identifier, {label}, COUNT(DISTINCT m.ROWID) AS message_count
             FROM chat c
             JOIN chat_message_join cmj ON cmj.chat_id = c.ROWID
             JOIN message m ON m.ROWID = cmj.message_id
             WHERE c.chat_identifier IS NOT NULL
             GROUP BY c.chat_identifier
             ORDER BY message_count DESC, c.chat_identifier ASC"
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let chats = stmt
            .query_map([], |row| {
                let identifier: String = row.get(0)?;
                let label: Option<String> = row.get(1)?;
                Ok(ChatSummary {
                    label: label.unwrap_or_else(|| identifier.clone()),
                    identifier,
                    message_count: row.get::<_, i64>(2)?.max(0) as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("{} chats listed", chats.len());
        Ok(chats)
    }

    // -- Messages --

    /// Text messages of the conversation whose identifier matches exactly,
    /// oldest first. Administrative rows are dropped here.
    pub fn extract_messages(&self, identifier: &str) -> Result<Vec<MessageRow>> {
        let chats: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat WHERE chat_identifier = ?1",
            [identifier],
            |row| row.get(0),
        )?;
        if chats == 0 {
            return Err(StoreError::NoSuchConversation(identifier.to_string()));
        }

        let schema = self.schema();
        let (handle, handle_join) = schema.handle_source();
        let sql = format!(
            "SELECT DISTINCT m.ROWID, m.date, m.text, {body}, {handle}, {from_me},
                    {item_type}, {amt}, {gat}, {system}, c.chat_identifier
             FROM message m
             JOIN chat_message_join cmj ON cmj.message_id = m.ROWID
             JOIN chat c ON c.ROWID = cmj.chat_id
             {handle_join}
             WHERE c.chat_identifier = ?1
             ORDER BY m.date ASC, m.ROWID ASC",
            body = schema.message_column("attributedBody"),
            from_me = schema.message_column("is_from_me"),
            item_type = schema.message_column("item_type"),
            amt = schema.message_column("associated_message_type"),
            gat = schema.message_column("group_action_type"),
            system = schema.message_column("is_system_message"),
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map([identifier], read_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total = rows.len();
        let mut kept = Vec::with_capacity(total);
        for row in rows {
            let kind = row.kind();
            if kind.is_text_message() {
                kept.push(row);
            } else {
                log_skipped(row.rowid, kind);
            }
        }

        debug!(
            "{}: {} rows, {} text messages",
            identifier,
            total,
            kept.len()
        );
        Ok(kept)
    }
}

fn read_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        rowid: row.get(0)?,
        date: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
        text: text_or_blob(row, 2)?.map(|b| String::from_utf8_lossy(&b).into_owned()),
        attributed_body: text_or_blob(row, 3)?,
        handle: row.get(4)?,
        is_from_me: row.get(5)?,
        item_type: row.get(6)?,
        associated_message_type: row.get(7)?,
        group_action_type: row.get(8)?,
        is_system_message: row.get(9)?,
        chat_identifier: row.get(10)?,
    })
}

/// Column bytes whether SQLite stored them as TEXT or BLOB.
fn text_or_blob(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Vec<u8>>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Blob(b) | ValueRef::Text(b) => Some(b.to_vec()),
        _ => None,
    })
}

fn log_skipped(rowid: i64, kind: RowKind) {
    debug!("row {} skipped: {}", rowid, kind);
}
