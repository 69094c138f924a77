use std::path::PathBuf;

use quill_archive::testutil::{attributed_string, typed_stream};
use quill_db::Store;
use quill_transcript::{Options, build_transcript, render};
use quill_types::time::Zone;
use rusqlite::{Connection, params};

/// Seconds since 2001-01-01 for 2024-05-01 12:00:00 UTC.
const MAY_FIRST_NOON: i64 = 736_257_600;

struct Fixture {
    path: PathBuf,
    conn: Connection,
    chat: i64,
    alice: i64,
}

impl Fixture {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("quill-transcript-{}.db", uuid::Uuid::new_v4()));
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE handle (ROWID INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT NOT NULL);
             CREATE TABLE chat (ROWID INTEGER PRIMARY KEY AUTOINCREMENT, chat_identifier TEXT);
             CREATE TABLE message (
                 ROWID INTEGER PRIMARY KEY AUTOINCREMENT,
                 text TEXT,
                 attributedBody BLOB,
                 handle_id INTEGER DEFAULT 0,
                 date INTEGER,
                 is_from_me INTEGER DEFAULT 0,
                 item_type INTEGER DEFAULT 0,
                 associated_message_type INTEGER DEFAULT 0
             );
             CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);
             INSERT INTO handle (id) VALUES ('Alice');
             INSERT INTO chat (chat_identifier) VALUES ('Alice');",
        )
        .unwrap();
        Self {
            path,
            conn,
            chat: 1,
            alice: 1,
        }
    }

    fn add(&self, offset: i64, text: Option<&str>, body: Option<Vec<u8>>, from_me: bool, amt: i64) {
        let handle = if from_me { 0 } else { self.alice };
        // Modern stores keep nanoseconds.
        let date = (MAY_FIRST_NOON + offset) * 1_000_000_000;
        self.conn
            .execute(
                "INSERT INTO message (text, attributedBody, handle_id, date, is_from_me, associated_message_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![text, body, handle, date, from_me as i64, amt],
            )
            .unwrap();
        let message = self.conn.last_insert_rowid();
        self.conn
            .execute(
                "INSERT INTO chat_message_join (chat_id, message_id) VALUES (?1, ?2)",
                [self.chat, message],
            )
            .unwrap();
    }

    fn render(&self) -> Vec<String> {
        let store = Store::open(&self.path).unwrap();
        let transcript = build_transcript(&store, "Alice", &Options::default()).unwrap();
        render::transcript(&transcript, Zone::Utc)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[test]
fn plain_text_row() {
    let db = Fixture::new();
    db.add(0, Some("hi"), None, false, 0);
    assert_eq!(db.render(), vec!["[2024-05-01 12:00:00] Alice: hi"]);
}

#[test]
fn archived_row_decodes() {
    let db = Fixture::new();
    db.add(0, None, Some(attributed_string("hello there")), true, 0);
    assert_eq!(db.render(), vec!["[2024-05-01 12:00:00] Me: hello there"]);
}

#[test]
fn reaction_row_is_excluded() {
    let db = Fixture::new();
    db.add(0, Some("hi"), None, false, 0);
    db.add(5, Some("Loved \u{201c}hi\u{201d}"), None, true, 2000);
    db.add(10, Some("bye"), None, true, 0);
    assert_eq!(
        db.render(),
        vec![
            "[2024-05-01 12:00:00] Alice: hi",
            "[2024-05-01 12:00:10] Me: bye",
        ]
    );
}

#[test]
fn corrupted_archive_does_not_stop_later_rows() {
    let db = Fixture::new();
    let mut corrupted = attributed_string("lost");
    corrupted.truncate(corrupted.len() - 10);
    db.add(0, None, Some(corrupted), false, 0);
    db.add(1, None, Some(b"not an archive at all".to_vec()), false, 0);
    db.add(2, None, Some(typed_stream("still here")), false, 0);
    db.add(3, Some("\u{FFFC}"), Some(attributed_string("\u{FFFC}")), true, 0);

    assert_eq!(
        db.render(),
        vec![
            "[2024-05-01 12:00:00] Alice: [undecodable content]",
            "[2024-05-01 12:00:01] Alice: [undecodable content]",
            "[2024-05-01 12:00:02] Alice: still here",
            "[2024-05-01 12:00:03] Me: [non-text content]",
        ]
    );
}

#[test]
fn diagnostics_do_not_change_output() {
    let db = Fixture::new();
    let mut corrupted = attributed_string("lost");
    corrupted.truncate(20);
    db.add(0, None, Some(corrupted), false, 0);
    db.add(1, None, Some(attributed_string("kept")), false, 0);

    let store = Store::open(&db.path).unwrap();
    let quiet = build_transcript(&store, "Alice", &Options::default()).unwrap();
    let verbose = build_transcript(&store, "Alice", &Options { diagnostics: true }).unwrap();
    assert_eq!(
        render::transcript(&quiet, Zone::Utc),
        render::transcript(&verbose, Zone::Utc)
    );
    assert_eq!(verbose.undecodable, 1);
}
