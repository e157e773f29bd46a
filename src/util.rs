use std::io;

use rusqlite::types::ValueRef;
use serde_json as json;

use crate::Error;

/// Quote `name` for use as an SQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn value_to_json(value: ValueRef, column: &str) -> Result<json::Value, Error> {
    use rusqlite::types::ValueRef::*;
    match value {
        Null => Ok(json::Value::Null),
        Integer(n) => Ok(json::Value::from(n)),
        Real(n) => Ok(json::Value::from(n)),
        Text(bytes) => {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(json::Value::String(text))
        }
        Blob(_) => Err(Error::UnsupportedBlob {
            column: column.to_owned(),
        }),
    }
}

pub fn row_values(row: &rusqlite::Row, columns: &[String]) -> Result<Vec<json::Value>, Error> {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| value_to_json(row.get_ref(i)?, column))
        .collect()
}

pub fn write_json_line(mut sink: impl io::Write, value: &impl serde::Serialize) -> io::Result<()> {
    json::to_writer(&mut sink, value)?;
    sink.write_all(b"\n")?;
    Ok(())
}
