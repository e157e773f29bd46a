//! A catalog with one entry per table found in a database.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    resolve::SqliteUrl,
    source::{Metadata, SqlOptions, SqlSource},
    sqlite::Db,
    util::quote_identifier,
    Error, Result,
};

/// Catalog-level settings that are not about the database itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogOptions {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    name: String,
    description: String,
    url: SqliteUrl,
    sql_expr: String,
    sql_options: SqlOptions,
}

impl CatalogEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn sql_expr(&self) -> &str {
        &self.sql_expr
    }

    pub fn sql_options(&self) -> &SqlOptions {
        &self.sql_options
    }

    /// A fresh source reading this entry's table.
    pub fn source(&self) -> SqlSource {
        SqlSource::new(
            self.url.clone(),
            self.sql_expr.clone(),
            self.sql_options.clone(),
            Metadata::new(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct SqlCatalog {
    url: SqliteUrl,
    views: bool,
    sql_options: SqlOptions,
    options: CatalogOptions,
    entries: Vec<CatalogEntry>,
}

impl SqlCatalog {
    /// Open the database and create an entry for each of its tables, and
    /// for its views if `views` is set.
    pub fn new(
        url: SqliteUrl,
        views: bool,
        sql_options: SqlOptions,
        options: CatalogOptions,
    ) -> Result<Self> {
        let mut catalog = SqlCatalog {
            url,
            views,
            sql_options,
            options,
            entries: Vec::new(),
        };
        catalog.reload()?;
        Ok(catalog)
    }

    /// Re-read the table list from the database.
    ///
    /// A table with a single-column primary key is indexed by that column
    /// unless `index_col` was given explicitly.
    pub fn reload(&mut self) -> Result<()> {
        let mut db = Db::open(&self.url)?;
        let tx = db.transaction()?;
        let tables = tx.tables(self.views)?;
        debug!(url = %self.url, tables = tables.len(), "loaded catalog");
        self.entries = tables
            .into_iter()
            .map(|table| {
                let mut sql_options = self.sql_options.clone();
                if let (true, [key]) = (
                    sql_options.index_col.is_none(),
                    table.primary_key.as_slice(),
                ) {
                    sql_options.index_col = Some(key.clone());
                }
                CatalogEntry {
                    description: format!("SQL table {} from {}", table.name, self.url),
                    url: self.url.clone(),
                    sql_expr: format!("SELECT * FROM {}", quote_identifier(&table.name)),
                    sql_options,
                    name: table.name,
                }
            })
            .collect();
        Ok(())
    }

    pub fn url(&self) -> &SqliteUrl {
        &self.url
    }

    pub fn name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.options.description.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.options.metadata
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn source(&self, name: &str) -> Result<SqlSource> {
        self.get(name)
            .map(CatalogEntry::source)
            .ok_or_else(|| Error::NoSuchEntry(name.to_owned()))
    }
}

impl<'a> IntoIterator for &'a SqlCatalog {
    type Item = &'a CatalogEntry;
    type IntoIter = std::slice::Iter<'a, CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
