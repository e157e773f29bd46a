use std::io;

use crate::{frame::Frame, sqlite::SchemaEntry, util::write_json_line};

/// Destination for a dump of a database's schema and table contents.
pub trait Sink {
    fn write_schema_entry(&mut self, entry: &SchemaEntry) -> io::Result<()>;
    fn write_table(&mut self, name: &str, frame: &Frame) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes every row as a JSON object on its own line; schema entries are
/// skipped.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: io::Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: io::Write> Sink for JsonLinesSink<W> {
    fn write_schema_entry(&mut self, _entry: &SchemaEntry) -> io::Result<()> {
        Ok(())
    }

    fn write_table(&mut self, _name: &str, frame: &Frame) -> io::Result<()> {
        for record in frame.records() {
            write_json_line(&mut self.writer, &record)?;
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
