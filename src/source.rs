//! SQL-backed data sources.
//!
//! Each source is built from a [`SqliteUrl`] plus its own parameters and
//! stays lazy until discovered or read. [`DataSource::to_partitioned`] hands
//! out the partitioned computation: one query per partition, run on demand.

use serde::{Deserialize, Serialize};
use serde_json as json;
use tracing::debug;

use crate::{
    frame::{Frame, Schema},
    resolve::SqliteUrl,
    sqlite::Db,
    util::quote_identifier,
    Error, Result,
};

pub type Metadata = json::Map<String, json::Value>;

/// Options for reading query results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlOptions {
    /// Column to use as the index of the resulting frame.
    pub index_col: Option<String>,
    /// Number of partitions to split an automatically partitioned table into.
    pub npartitions: Option<usize>,
}

/// Tabular data that can be discovered, read whole, or read by partition.
pub trait DataSource {
    fn metadata(&self) -> &Metadata;

    fn discover(&mut self) -> Result<Schema>;

    fn to_partitioned(&mut self) -> Result<PartitionedFrame>;

    fn npartitions(&mut self) -> Result<usize> {
        Ok(self.discover()?.npartitions)
    }

    fn read_partition(&mut self, index: usize) -> Result<Frame> {
        self.to_partitioned()?.partition(index)
    }

    fn read(&mut self) -> Result<Frame> {
        self.to_partitioned()?.compute()
    }
}

/// A lazily evaluated, partitioned frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedFrame {
    url: SqliteUrl,
    queries: Vec<String>,
    index_col: Option<String>,
}

impl PartitionedFrame {
    pub fn new(url: SqliteUrl, queries: Vec<String>, index_col: Option<String>) -> Self {
        PartitionedFrame {
            url,
            queries,
            index_col,
        }
    }

    pub fn npartitions(&self) -> usize {
        self.queries.len()
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn partition(&self, index: usize) -> Result<Frame> {
        let query = self
            .queries
            .get(index)
            .ok_or(Error::PartitionOutOfRange {
                index,
                npartitions: self.queries.len(),
            })?;
        let mut frames = self.run(std::slice::from_ref(query))?;
        Ok(frames.pop().unwrap_or_default())
    }

    /// Run every partition and concatenate the results.
    pub fn compute(&self) -> Result<Frame> {
        Ok(Frame::concat(self.run(&self.queries)?))
    }

    fn run(&self, queries: &[String]) -> Result<Vec<Frame>> {
        let mut db = Db::open(&self.url)?;
        let tx = db.transaction()?;
        let mut frames = Vec::with_capacity(queries.len());
        for query in queries {
            let frame = tx.query(query)?;
            frames.push(match &self.index_col {
                Some(index) => frame.set_index(index)?,
                None => frame,
            });
        }
        Ok(frames)
    }
}

fn columns_of(url: &SqliteUrl, sql: &str, index_col: Option<&str>) -> Result<Vec<String>> {
    let mut db = Db::open(url)?;
    let tx = db.transaction()?;
    let mut columns = tx.columns(sql)?;
    if let Some(index) = index_col {
        let i = columns
            .iter()
            .position(|c| c == index)
            .ok_or_else(|| Error::NoSuchColumn(index.to_owned()))?;
        columns.remove(i);
    }
    Ok(columns)
}

/// The full result of one query, read as a single partition.
///
/// An expression without whitespace is taken to be a table name.
#[derive(Debug, Clone)]
pub struct SqlSource {
    url: SqliteUrl,
    sql_expr: String,
    sql_options: SqlOptions,
    metadata: Metadata,
    frame: Option<Frame>,
}

impl SqlSource {
    pub fn new(
        url: SqliteUrl,
        sql_expr: impl Into<String>,
        sql_options: SqlOptions,
        metadata: Metadata,
    ) -> Self {
        SqlSource {
            url,
            sql_expr: sql_expr.into(),
            sql_options,
            metadata,
            frame: None,
        }
    }

    pub fn url(&self) -> &SqliteUrl {
        &self.url
    }

    pub fn sql_expr(&self) -> &str {
        &self.sql_expr
    }

    pub fn sql_options(&self) -> &SqlOptions {
        &self.sql_options
    }

    fn query(&self) -> String {
        let expr = self.sql_expr.trim();
        if expr.contains(char::is_whitespace) {
            expr.to_owned()
        } else {
            format!("SELECT * FROM {}", quote_identifier(expr))
        }
    }

    fn load(&mut self) -> Result<&Frame> {
        let frame = match self.frame.take() {
            Some(frame) => frame,
            None => self.to_partitioned()?.partition(0)?,
        };
        Ok(&*self.frame.insert(frame))
    }
}

impl DataSource for SqlSource {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn discover(&mut self) -> Result<Schema> {
        let frame = self.load()?;
        Ok(Schema {
            shape: (Some(frame.len()), frame.columns.len()),
            columns: frame.columns.clone(),
            npartitions: 1,
            extra_metadata: Metadata::new(),
        })
    }

    fn to_partitioned(&mut self) -> Result<PartitionedFrame> {
        Ok(PartitionedFrame::new(
            self.url.clone(),
            vec![self.query()],
            self.sql_options.index_col.clone(),
        ))
    }

    fn npartitions(&mut self) -> Result<usize> {
        Ok(1)
    }

    fn read_partition(&mut self, index: usize) -> Result<Frame> {
        if index != 0 {
            return Err(Error::PartitionOutOfRange {
                index,
                npartitions: 1,
            });
        }
        self.read()
    }

    fn read(&mut self) -> Result<Frame> {
        Ok(self.load()?.clone())
    }
}

/// A table split into ranges of a numeric index column.
#[derive(Debug, Clone)]
pub struct SqlSourceAutoPartition {
    url: SqliteUrl,
    table: String,
    index: String,
    sql_options: SqlOptions,
    metadata: Metadata,
    partitions: Option<PartitionedFrame>,
}

impl SqlSourceAutoPartition {
    pub fn new(
        url: SqliteUrl,
        table: impl Into<String>,
        index: impl Into<String>,
        sql_options: SqlOptions,
        metadata: Metadata,
    ) -> Self {
        SqlSourceAutoPartition {
            url,
            table: table.into(),
            index: index.into(),
            sql_options,
            metadata,
            partitions: None,
        }
    }

    pub fn url(&self) -> &SqliteUrl {
        &self.url
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn plan(&mut self) -> Result<&PartitionedFrame> {
        let partitions = match self.partitions.take() {
            Some(partitions) => partitions,
            None => {
                let requested = self.sql_options.npartitions.unwrap_or(1).max(1);
                let (min, max) = if requested > 1 {
                    let mut db = Db::open(&self.url)?;
                    let tx = db.transaction()?;
                    tx.bounds(&self.table, &self.index)?
                } else {
                    (json::Value::Null, json::Value::Null)
                };
                let queries = range_queries(&self.table, &self.index, &min, &max, requested)?;
                debug!(table = %self.table, npartitions = queries.len(), "planned partitions");
                PartitionedFrame::new(self.url.clone(), queries, Some(self.index.clone()))
            }
        };
        Ok(&*self.partitions.insert(partitions))
    }
}

impl DataSource for SqlSourceAutoPartition {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn discover(&mut self) -> Result<Schema> {
        let npartitions = self.plan()?.npartitions();
        let sql = format!("SELECT * FROM {}", quote_identifier(&self.table));
        let columns = columns_of(&self.url, &sql, Some(&self.index))?;
        Ok(Schema {
            shape: (None, columns.len()),
            columns,
            npartitions,
            extra_metadata: Metadata::new(),
        })
    }

    fn to_partitioned(&mut self) -> Result<PartitionedFrame> {
        Ok(self.plan()?.clone())
    }
}

/// Split `table` into `npartitions` ranges of `index` between `min` and
/// `max`. Each range is `lower <= index < upper`, the last one closed. Rows
/// with a null index go to the first range.
fn range_queries(
    table: &str,
    index: &str,
    min: &json::Value,
    max: &json::Value,
    npartitions: usize,
) -> Result<Vec<String>> {
    let select = format!("SELECT * FROM {}", quote_identifier(table));
    let column = quote_identifier(index);
    if npartitions <= 1 || min.is_null() || max.is_null() {
        return Ok(vec![format!("{} ORDER BY {}", select, column)]);
    }

    let bounds: Vec<String> = match (min.as_i64(), max.as_i64()) {
        (Some(lo), Some(hi)) => {
            let (lo, hi, n) = (i128::from(lo), i128::from(hi), npartitions as i128);
            let mut bounds: Vec<i128> = (0..=n).map(|k| lo + (hi - lo) * k / n).collect();
            bounds.dedup();
            bounds.iter().map(ToString::to_string).collect()
        }
        _ => match (min.as_f64(), max.as_f64()) {
            (Some(lo), Some(hi)) => {
                let n = npartitions as f64;
                let mut bounds: Vec<f64> = (0..npartitions)
                    .map(|k| lo + (hi - lo) * (k as f64) / n)
                    .collect();
                // Rounding may leave the last step short of the maximum.
                bounds.push(hi);
                bounds.dedup();
                bounds.iter().map(|b| format!("{:?}", b)).collect()
            }
            _ => {
                return Err(Error::Partitioning(format!(
                    "index column {} of table {} is not numeric",
                    index, table
                )))
            }
        },
    };

    // Nulls sort first, so they belong to the first partition.
    if bounds.len() < 2 {
        return Ok(vec![format!(
            "{} WHERE {} IS NULL OR {} = {} ORDER BY {}",
            select, column, column, bounds[0], column
        )]);
    }
    let last = bounds.len() - 2;
    Ok(bounds
        .windows(2)
        .enumerate()
        .map(|(k, pair)| {
            let upper = if k == last { "<=" } else { "<" };
            let range = format!(
                "{} >= {} AND {} {} {}",
                column, pair[0], column, upper, pair[1]
            );
            let predicate = if k == 0 {
                format!("{} IS NULL OR ({})", column, range)
            } else {
                range
            };
            format!("{} WHERE {} ORDER BY {}", select, predicate, column)
        })
        .collect())
}

/// A query split by explicit where-clauses, one partition per clause.
#[derive(Debug, Clone)]
pub struct SqlSourceManualPartition {
    url: SqliteUrl,
    sql_expr: String,
    where_values: Vec<json::Value>,
    where_template: Option<String>,
    sql_options: SqlOptions,
    metadata: Metadata,
}

impl SqlSourceManualPartition {
    pub fn new(
        url: SqliteUrl,
        sql_expr: impl Into<String>,
        where_values: Vec<json::Value>,
        where_template: Option<String>,
        sql_options: SqlOptions,
        metadata: Metadata,
    ) -> Self {
        SqlSourceManualPartition {
            url,
            sql_expr: sql_expr.into(),
            where_values,
            where_template,
            sql_options,
            metadata,
        }
    }

    pub fn url(&self) -> &SqliteUrl {
        &self.url
    }

    pub fn sql_expr(&self) -> &str {
        &self.sql_expr
    }
}

impl DataSource for SqlSourceManualPartition {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn discover(&mut self) -> Result<Schema> {
        let npartitions = self.where_values.len();
        let columns = columns_of(
            &self.url,
            &self.sql_expr,
            self.sql_options.index_col.as_deref(),
        )?;
        Ok(Schema {
            shape: (None, columns.len()),
            columns,
            npartitions,
            extra_metadata: Metadata::new(),
        })
    }

    fn to_partitioned(&mut self) -> Result<PartitionedFrame> {
        let queries = where_clauses(&self.where_values, self.where_template.as_deref())?
            .into_iter()
            .map(|clause| format!("{} {}", self.sql_expr, clause))
            .collect();
        Ok(PartitionedFrame::new(
            self.url.clone(),
            queries,
            self.sql_options.index_col.clone(),
        ))
    }

    fn npartitions(&mut self) -> Result<usize> {
        Ok(self.where_values.len())
    }
}

fn where_clauses(values: &[json::Value], template: Option<&str>) -> Result<Vec<String>> {
    values
        .iter()
        .map(|value| match (template, value) {
            (None, json::Value::String(clause)) => Ok(clause.clone()),
            (None, other) => Err(Error::Partitioning(format!(
                "where value {} is not a clause and no where_template was given",
                other
            ))),
            (Some(template), json::Value::Array(args)) => fill_template(template, args),
            (Some(template), arg) => fill_template(template, std::slice::from_ref(arg)),
        })
        .collect()
}

fn fill_template(template: &str, args: &[json::Value]) -> Result<String> {
    let pieces: Vec<&str> = template.split("{}").collect();
    if pieces.len() - 1 != args.len() {
        return Err(Error::Partitioning(format!(
            "where_template {:?} takes {} values, got {}",
            template,
            pieces.len() - 1,
            args.len()
        )));
    }
    let mut clause = pieces[0].to_owned();
    for (arg, piece) in args.iter().zip(&pieces[1..]) {
        match arg {
            json::Value::String(s) => clause.push_str(s),
            other => clause.push_str(&other.to_string()),
        }
        clause.push_str(piece);
    }
    Ok(clause)
}
