use serde::Serialize;
use serde_json as json;

use crate::{source::Metadata, Error};

/// Rows read from a database, held in memory.
///
/// When an index column is set, its values live in `index` (one per row) and
/// the column is not part of `columns`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    pub index_name: Option<String>,
    pub index: Vec<json::Value>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<json::Value>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Frame {
            columns,
            ..Frame::default()
        }
    }

    /// Number of rows and number of (non-index) columns.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&json::Value>> {
        if self.index_name.as_deref() == Some(name) {
            return Some(self.index.iter().collect());
        }
        let i = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[i]).collect())
    }

    /// Move column `name` into the index.
    pub fn set_index(mut self, name: &str) -> Result<Self, Error> {
        let i = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::NoSuchColumn(name.to_owned()))?;
        self.index_name = Some(self.columns.remove(i));
        self.index = self.rows.iter_mut().map(|row| row.remove(i)).collect();
        Ok(self)
    }

    /// Stack frames with the same columns on top of each other.
    pub fn concat(frames: impl IntoIterator<Item = Frame>) -> Frame {
        let mut frames = frames.into_iter();
        let mut result = match frames.next() {
            Some(frame) => frame,
            None => return Frame::default(),
        };
        for frame in frames {
            result.index.extend(frame.index);
            result.rows.extend(frame.rows);
        }
        result
    }

    /// Rows as JSON objects, index first.
    pub fn records(&self) -> impl Iterator<Item = json::Map<String, json::Value>> + '_ {
        self.rows.iter().enumerate().map(move |(i, row)| {
            let mut record = json::Map::new();
            if let (Some(name), Some(value)) = (&self.index_name, self.index.get(i)) {
                record.insert(name.clone(), value.clone());
            }
            for (column, value) in self.columns.iter().zip(row) {
                record.insert(column.clone(), value.clone());
            }
            record
        })
    }
}

/// What a source knows about its data without reading all of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    /// Row count, when known, and column count.
    pub shape: (Option<usize>, usize),
    pub columns: Vec<String>,
    pub npartitions: usize,
    pub extra_metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> Frame {
        Frame {
            columns: vec!["pk".into(), "name".into()],
            rows: vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]],
            ..Frame::default()
        }
    }

    #[test]
    fn set_index_moves_column() {
        let frame = sample().set_index("pk").unwrap();
        assert_eq!(frame.index_name.as_deref(), Some("pk"));
        assert_eq!(frame.index, vec![json!(1), json!(2)]);
        assert_eq!(frame.columns, vec!["name".to_owned()]);
        assert_eq!(frame.shape(), (2, 1));
        assert_eq!(frame.column("pk").unwrap(), vec![&json!(1), &json!(2)]);
    }

    #[test]
    fn set_index_unknown_column() {
        assert!(matches!(
            sample().set_index("nope"),
            Err(Error::NoSuchColumn(name)) if name == "nope"
        ));
    }

    #[test]
    fn concat_keeps_order() {
        let frame = Frame::concat(vec![sample(), sample()]);
        assert_eq!(frame.shape(), (4, 2));
        assert_eq!(frame.rows[2], vec![json!(1), json!("a")]);
        assert_eq!(Frame::concat(Vec::new()), Frame::default());
    }

    #[test]
    fn records_include_index() {
        let frame = sample().set_index("pk").unwrap();
        let records: Vec<_> = frame.records().collect();
        assert_eq!(json::Value::Object(records[1].clone()), json!({"pk": 2, "name": "b"}));
    }
}
