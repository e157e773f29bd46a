#![allow(dead_code)]

use std::path::{Path, PathBuf};

use intake_sqlite::Frame;
use rusqlite::{params, Connection};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const TABLE: &str = "temp";
pub const TABLE_NOPK: &str = "temp_nopk";
pub const ROWS: i64 = 100;

const LETTERS: [&str; 4] = ["a", "b", "c", "d"];

/// A temporary database with a keyed and an unkeyed table.
pub struct TempDb {
    dir: TempDir,
    path: PathBuf,
}

impl TempDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE temp (
                pk BIGINT PRIMARY KEY,
                a REAL NOT NULL,
                b BIGINT NOT NULL,
                c TEXT NOT NULL);
             CREATE TABLE temp_nopk (
                d REAL NOT NULL,
                e BIGINT NOT NULL,
                f TEXT NOT NULL);
             CREATE VIEW temp_small AS SELECT * FROM temp WHERE pk < 10;",
        )
        .unwrap();
        for i in 0..ROWS {
            let (real, int, text) = row(i);
            conn.execute(
                "INSERT INTO temp VALUES (?1, ?2, ?3, ?4)",
                params![i, real, int, text],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO temp_nopk VALUES (?1, ?2, ?3)",
                params![real, int, text],
            )
            .unwrap();
        }
        TempDb { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn urlpath(&self) -> &str {
        self.path.to_str().unwrap()
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

fn row(i: i64) -> (f64, i64, &'static str) {
    (i as f64 / 4.0, (i * 37) % 100, LETTERS[(i % 4) as usize])
}

fn rows(range: std::ops::Range<i64>) -> Vec<Vec<Value>> {
    range
        .map(|i| {
            let (real, int, text) = row(i);
            vec![json!(real), json!(int), json!(text)]
        })
        .collect()
}

/// Contents of `temp` indexed by `pk`, for pk in `range`.
pub fn expected_pk(range: std::ops::Range<i64>) -> Frame {
    Frame {
        index_name: Some("pk".into()),
        index: range.clone().map(|i| json!(i)).collect(),
        columns: vec!["a".into(), "b".into(), "c".into()],
        rows: rows(range),
    }
}

/// Contents of `temp_nopk`.
pub fn expected_nopk() -> Frame {
    Frame {
        columns: vec!["d".into(), "e".into(), "f".into()],
        rows: rows(0..ROWS),
        ..Frame::default()
    }
}
