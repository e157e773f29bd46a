use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{frame::Frame, sink::Sink, sqlite::SchemaEntry, util::write_json_line};

/// Dumps a database below a directory: `schema/<kind>/<name>.sql` for each
/// schema entry and `data/table/<name>.json` (JSON lines) for each table.
#[derive(Debug)]
pub struct DirSink {
    path: PathBuf,
}

impl DirSink {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;
        Ok(DirSink {
            path: path.to_owned(),
        })
    }

    fn open_file(&self, path: impl AsRef<Path>) -> io::Result<File> {
        let path = self.path.join(path);
        if let Some(base) = path.parent() {
            fs::create_dir_all(base)?;
        }
        File::create(path)
    }
}

impl Sink for DirSink {
    fn write_schema_entry(&mut self, entry: &SchemaEntry) -> io::Result<()> {
        if let Some(sql) = &entry.sql {
            let mut file = self.open_file(format!("schema/{}/{}.sql", entry.kind, entry.name))?;
            file.write_all(sql.as_bytes())?;
        }
        Ok(())
    }

    fn write_table(&mut self, name: &str, frame: &Frame) -> io::Result<()> {
        let mut file = BufWriter::new(self.open_file(format!("data/table/{}.json", name))?);
        for record in frame.records() {
            write_json_line(&mut file, &record)?;
        }
        file.flush()
    }
}
