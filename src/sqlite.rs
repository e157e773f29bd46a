use rusqlite::{
    types::{Value, ValueRef},
    Connection, OpenFlags, Row,
};
use serde_json as json;
use tracing::debug;

use crate::{
    frame::Frame,
    resolve::SqliteUrl,
    util::{quote_identifier, row_values, value_to_json},
    Error,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaEntry {
    pub kind: String,
    pub name: String,
    pub tbl_name: String,
    pub column_names: Vec<String>,
    /// Primary key columns, in key order.
    pub primary_key: Vec<String>,
    pub sql: Option<String>,
}

impl SchemaEntry {
    /// Whether this entry is SQLite's own bookkeeping, e.g. `sqlite_sequence`.
    pub fn is_internal(&self) -> bool {
        self.name.starts_with("sqlite_")
    }
}

#[derive(Debug)]
pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(url: &SqliteUrl) -> rusqlite::Result<Self> {
        let conn = Connection::open_with_flags(url.path(), OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Db { conn })
    }

    pub fn transaction(&mut self) -> Result<Transaction, rusqlite::Error> {
        Ok(Transaction {
            tx: self.conn.transaction()?,
        })
    }
}

pub struct Transaction<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

impl<'conn> Transaction<'conn> {
    pub fn read_schema(&self) -> rusqlite::Result<Vec<SchemaEntry>> {
        let mut sqlite_master = self
            .tx
            .prepare("SELECT type, name, tbl_name, sql FROM sqlite_master ORDER BY rowid")?;
        let schema_iter = sqlite_master.query_map([], |row| self.read_schema_entry(row))?;
        let entries = schema_iter.collect::<Result<_, _>>()?;
        Ok(entries)
    }

    fn read_schema_entry(&self, row: &Row) -> rusqlite::Result<SchemaEntry> {
        let name: String = row.get(1)?;
        let mut tbl_info = self
            .tx
            .prepare(&format!("PRAGMA table_info({})", quote_identifier(&name)))?;
        let columns = tbl_info
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut key: Vec<_> = columns.iter().filter(|(_, pk)| *pk > 0).collect();
        key.sort_by_key(|(_, pk)| *pk);
        Ok(SchemaEntry {
            kind: row.get(0)?,
            name,
            tbl_name: row.get(2)?,
            primary_key: key.into_iter().map(|(name, _)| name.clone()).collect(),
            column_names: columns.into_iter().map(|(name, _)| name).collect(),
            sql: row.get(3)?,
        })
    }

    /// User tables, and views when `views` is set, in schema order.
    pub fn tables(&self, views: bool) -> rusqlite::Result<Vec<SchemaEntry>> {
        Ok(self
            .read_schema()?
            .into_iter()
            .filter(|entry| entry.kind == "table" || (views && entry.kind == "view"))
            .filter(|entry| !entry.is_internal())
            .collect())
    }

    pub fn table_names(&self, views: bool) -> rusqlite::Result<Vec<String>> {
        Ok(self
            .tables(views)?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    pub fn query(&self, sql: &str) -> Result<Frame, Error> {
        debug!(sql, "query");
        let mut stmt = self.tx.prepare(sql)?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut frame = Frame::new(columns);
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            frame.rows.push(row_values(row, &frame.columns)?);
        }
        Ok(frame)
    }

    /// Column names `sql` would produce, without running it.
    pub fn columns(&self, sql: &str) -> rusqlite::Result<Vec<String>> {
        let stmt = self.tx.prepare(sql)?;
        Ok(stmt.column_names().into_iter().map(String::from).collect())
    }

    pub fn read_table(&self, name: &str) -> Result<Frame, Error> {
        self.query(&format!("SELECT * FROM {}", quote_identifier(name)))
    }

    /// Smallest and largest value of `column` in `table`; both null when the
    /// table is empty.
    pub fn bounds(&self, table: &str, column: &str) -> Result<(json::Value, json::Value), Error> {
        let sql = format!(
            "SELECT MIN({col}), MAX({col}) FROM {table}",
            col = quote_identifier(column),
            table = quote_identifier(table)
        );
        let (min, max) = self.tx.query_row(&sql, [], |row| {
            Ok((Value::from(row.get_ref(0)?), Value::from(row.get_ref(1)?)))
        })?;
        Ok((
            value_to_json(ValueRef::from(&min), column)?,
            value_to_json(ValueRef::from(&max), column)?,
        ))
    }
}
