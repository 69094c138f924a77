use std::path::PathBuf;
use std::process::{Command, Output};

use quill_archive::plist::Plist;
use quill_archive::testutil::{KeyedArchiveBuilder, attributed_string, encode};
use rusqlite::{Connection, params};

/// Throwaway directory holding a small store, removed on drop.
struct Workspace {
    dir: PathBuf,
    db: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("quill-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let db = dir.join("chat.db");

        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT NOT NULL);
             CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, chat_identifier TEXT, display_name TEXT);
             CREATE TABLE message (
                 ROWID INTEGER PRIMARY KEY,
                 text TEXT,
                 attributedBody BLOB,
                 handle_id INTEGER,
                 date INTEGER,
                 is_from_me INTEGER,
                 associated_message_type INTEGER DEFAULT 0
             );
             CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);
             INSERT INTO handle VALUES (1, 'Alice'), (2, '+15550009999');
             INSERT INTO chat VALUES (1, 'Alice', NULL), (2, '+15550009999', 'Bob');",
        )
        .unwrap();

        let rows: [(i64, i64, Option<&str>, Option<Vec<u8>>, i64, i64, i64); 5] = [
            (1, 1, Some("hi"), None, 1, 0, 0),
            (2, 1, None, Some(attributed_string("hello there")), 0, 1, 0),
            (3, 1, Some("Laughed at \u{201c}hi\u{201d}"), None, 1, 0, 2003),
            (4, 1, None, Some(b"\x00garbage".to_vec()), 1, 0, 0),
            (5, 2, Some("yo"), None, 2, 0, 0),
        ];
        for (id, chat, text, body, handle, from_me, amt) in rows {
            conn.execute(
                "INSERT INTO message VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, text, body, handle, id * 60, from_me, amt],
            )
            .unwrap();
            conn.execute("INSERT INTO chat_message_join VALUES (?1, ?2)", [chat, id])
                .unwrap();
        }

        Self { dir, db }
    }

    fn quill(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_quill"))
            .args(args)
            .current_dir(&self.dir)
            .env("HOME", &self.dir)
            .env("RUST_LOG", "off")
            .env_remove("QUILL_DB_PATH")
            .env_remove("QUILL_TIMEZONE")
            .output()
            .unwrap()
    }

    fn db(&self) -> &str {
        self.db.to_str().unwrap()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn help_flag() {
    let ws = Workspace::new();
    let output = ws.quill(&["--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    assert!(help.contains("list"));
    assert!(help.contains("extract"));
}

#[test]
fn list_prints_table() {
    let ws = Workspace::new();
    let output = ws.quill(&["list", ws.db()]);
    assert!(output.status.success());

    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("IDENTIFIER"));
    assert!(lines[1].starts_with("Alice"));
    assert!(lines[1].ends_with(" 4"));
    assert!(lines[2].contains("Bob"));
}

#[test]
fn extract_prints_transcript() {
    let ws = Workspace::new();
    let output = ws.quill(&["extract", "Alice", ws.db(), "--utc"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        "[2001-01-01 00:01:00] Alice: hi\n\
         [2001-01-01 00:02:00] Me: hello there\n\
         [2001-01-01 00:04:00] Alice: [undecodable content]\n"
    );
}

#[test]
fn extract_json() {
    let ws = Workspace::new();
    let output = ws.quill(&["extract", "Alice", ws.db(), "--utc", "--json"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["identifier"], "Alice");
    assert_eq!(value["undecodable"], 1);
    assert_eq!(value["messages"].as_array().unwrap().len(), 3);
    assert_eq!(value["messages"][1]["sender"]["kind"], "me");
    assert_eq!(value["messages"][2]["body"]["kind"], "undecodable");
}

#[test]
fn verbose_keeps_stdout_identical() {
    let ws = Workspace::new();
    let quiet = ws.quill(&["extract", "Alice", ws.db(), "--utc"]);
    let verbose = ws.quill(&["extract", "Alice", ws.db(), "--utc", "--verbose"]);
    assert!(verbose.status.success());
    assert_eq!(quiet.stdout, verbose.stdout);
}

/// An attributed string archived under a different archiver name.
fn foreign_archive(text: &str) -> Vec<u8> {
    let mut archive = KeyedArchiveBuilder::new();
    let string = archive.string(text);
    let class = archive.class(&["NSAttributedString", "NSObject"]);
    let root = archive.instance(class, vec![("NSString", Plist::Uid(string))]);
    let Plist::Dictionary(mut entries) = archive.into_plist(root) else {
        unreachable!("keyed archives are dictionaries");
    };
    for (key, value) in &mut entries {
        if key == "$archiver" {
            *value = Plist::String("IMArchiver".into());
        }
    }
    encode(&Plist::Dictionary(entries))
}

#[test]
fn verbose_logs_archive_details() {
    let ws = Workspace::new();
    let conn = Connection::open(&ws.db).unwrap();
    conn.execute(
        "INSERT INTO message VALUES (6, NULL, ?1, 2, 360, 0, 0)",
        params![foreign_archive("from elsewhere")],
    )
    .unwrap();
    conn.execute("INSERT INTO chat_message_join VALUES (2, 6)", [])
        .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_quill"))
        .args(["extract", "+15550009999", ws.db(), "--utc", "--verbose"])
        .current_dir(&ws.dir)
        .env("HOME", &ws.dir)
        .env_remove("RUST_LOG")
        .env_remove("QUILL_DB_PATH")
        .env_remove("QUILL_TIMEZONE")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).ends_with("+15550009999: from elsewhere\n"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unfamiliar archiver"));
}

#[test]
fn store_path_from_env() {
    let ws = Workspace::new();
    let output = Command::new(env!("CARGO_BIN_EXE_quill"))
        .args(["extract", "+15550009999"])
        .current_dir(&ws.dir)
        .env("QUILL_DB_PATH", ws.db())
        .env("QUILL_TIMEZONE", "utc")
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout(&output), "[2001-01-01 00:05:00] +15550009999: yo\n");
}

#[test]
fn exit_codes() {
    let ws = Workspace::new();

    let missing = ws.dir.join("nope.db");
    let output = ws.quill(&["list", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no message store"));

    let output = ws.quill(&["extract", "nobody", ws.db()]);
    assert_eq!(output.status.code(), Some(4));
    assert!(output.stdout.is_empty());

    // Default path under an empty HOME does not exist.
    let output = ws.quill(&["list"]);
    assert_eq!(output.status.code(), Some(2));
}
