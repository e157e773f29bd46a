//! The drivers this crate provides.
//!
//! Every driver takes a path or URL instead of a connection string. It
//! resolves the reference with a [`Resolver`] and hands the resulting
//! [`SqliteUrl`] together with its remaining arguments to the matching SQL
//! source or catalog, which does the actual work.

use std::{fmt, ops::Deref, str::FromStr};

use serde::Deserialize;
use serde_json as json;

use crate::{
    catalog::{CatalogOptions, SqlCatalog},
    fetch::OpenOptions,
    frame::{Frame, Schema},
    resolve::{default_resolver, Resolver, SqliteUrl},
    source::{
        DataSource, Metadata, PartitionedFrame, SqlOptions, SqlSource, SqlSourceAutoPartition,
        SqlSourceManualPartition,
    },
    Error, Result,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    Sqlite,
    SqliteAuto,
    SqliteManual,
    SqliteCat,
}

impl Driver {
    pub const ALL: [Driver; 4] = [
        Driver::Sqlite,
        Driver::SqliteAuto,
        Driver::SqliteManual,
        Driver::SqliteCat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Driver::Sqlite => "sqlite",
            Driver::SqliteAuto => "sqlite_auto",
            Driver::SqliteManual => "sqlite_manual",
            Driver::SqliteCat => "sqlite_cat",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Driver::ALL.iter().copied().find(|d| d.name() == name)
    }

    pub fn version(self) -> &'static str {
        VERSION
    }

    pub fn container(self) -> &'static str {
        match self {
            Driver::SqliteCat => "catalog",
            _ => "dataframe",
        }
    }

    pub fn partition_access(self) -> bool {
        self != Driver::SqliteCat
    }

    /// Instantiate the driver from a JSON object of arguments.
    pub fn open(self, args: json::Value) -> Result<Opened> {
        self.open_with(default_resolver(), args)
    }

    pub fn open_with(self, resolver: &Resolver, args: json::Value) -> Result<Opened> {
        Ok(match self {
            Driver::Sqlite => Opened::Source(Box::new(SqliteSource::with_resolver(
                resolver,
                json::from_value(args)?,
            )?)),
            Driver::SqliteAuto => Opened::Source(Box::new(
                SqliteSourceAutoPartition::with_resolver(resolver, json::from_value(args)?)?,
            )),
            Driver::SqliteManual => Opened::Source(Box::new(
                SqliteSourceManualPartition::with_resolver(resolver, json::from_value(args)?)?,
            )),
            Driver::SqliteCat => Opened::Catalog(SqliteCatalog::with_resolver(
                resolver,
                json::from_value(args)?,
            )?),
        })
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Driver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Driver::from_name(s).ok_or_else(|| Error::UnknownDriver(s.to_owned()))
    }
}

/// What a driver produces.
pub enum Opened {
    Source(Box<dyn DataSource>),
    Catalog(SqliteCatalog),
}

impl fmt::Debug for Opened {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Opened::Source(_) => f.write_str("Opened::Source(..)"),
            Opened::Catalog(catalog) => f.debug_tuple("Opened::Catalog").field(catalog).finish(),
        }
    }
}

/// Instantiate the driver called `name`, e.g. `"sqlite_cat"`.
pub fn open_driver(name: &str, args: json::Value) -> Result<Opened> {
    name.parse::<Driver>()?.open(args)
}

macro_rules! delegate_data_source {
    ($adapter:ty) => {
        impl DataSource for $adapter {
            fn metadata(&self) -> &Metadata {
                self.inner.metadata()
            }

            fn discover(&mut self) -> Result<Schema> {
                self.inner.discover()
            }

            fn to_partitioned(&mut self) -> Result<PartitionedFrame> {
                self.inner.to_partitioned()
            }

            fn npartitions(&mut self) -> Result<usize> {
                self.inner.npartitions()
            }

            fn read_partition(&mut self, index: usize) -> Result<Frame> {
                self.inner.read_partition(index)
            }

            fn read(&mut self) -> Result<Frame> {
                self.inner.read()
            }
        }
    };
}

#[derive(Debug, Clone, Deserialize)]
pub struct SqliteSourceArgs {
    pub urlpath: String,
    pub sql_expr: String,
    #[serde(default, alias = "sql_kwargs")]
    pub sql_options: SqlOptions,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, alias = "open_kwargs")]
    pub open_options: OpenOptions,
}

impl SqliteSourceArgs {
    pub fn new(urlpath: impl Into<String>, sql_expr: impl Into<String>) -> Self {
        SqliteSourceArgs {
            urlpath: urlpath.into(),
            sql_expr: sql_expr.into(),
            sql_options: SqlOptions::default(),
            metadata: Metadata::new(),
            open_options: OpenOptions::new(),
        }
    }
}

/// Full results of one query against a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    inner: SqlSource,
}

impl SqliteSource {
    pub const DRIVER: Driver = Driver::Sqlite;

    pub fn new(args: SqliteSourceArgs) -> Result<Self> {
        Self::with_resolver(default_resolver(), args)
    }

    pub fn open(urlpath: &str, sql_expr: &str) -> Result<Self> {
        Self::new(SqliteSourceArgs::new(urlpath, sql_expr))
    }

    pub fn with_resolver(resolver: &Resolver, args: SqliteSourceArgs) -> Result<Self> {
        let url = resolver.resolve(&args.urlpath, &args.open_options)?;
        Ok(SqliteSource {
            inner: SqlSource::new(url, args.sql_expr, args.sql_options, args.metadata),
        })
    }

    pub fn url(&self) -> &SqliteUrl {
        self.inner.url()
    }

    pub fn into_inner(self) -> SqlSource {
        self.inner
    }
}

delegate_data_source!(SqliteSource);

#[derive(Debug, Clone, Deserialize)]
pub struct SqliteSourceAutoPartitionArgs {
    pub urlpath: String,
    pub table: String,
    pub index: String,
    #[serde(default, alias = "sql_kwargs")]
    pub sql_options: SqlOptions,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, alias = "open_kwargs")]
    pub open_options: OpenOptions,
}

impl SqliteSourceAutoPartitionArgs {
    pub fn new(
        urlpath: impl Into<String>,
        table: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        SqliteSourceAutoPartitionArgs {
            urlpath: urlpath.into(),
            table: table.into(),
            index: index.into(),
            sql_options: SqlOptions::default(),
            metadata: Metadata::new(),
            open_options: OpenOptions::new(),
        }
    }
}

/// A SQLite table read in ranges of its index column.
#[derive(Debug, Clone)]
pub struct SqliteSourceAutoPartition {
    inner: SqlSourceAutoPartition,
}

impl SqliteSourceAutoPartition {
    pub const DRIVER: Driver = Driver::SqliteAuto;

    pub fn new(args: SqliteSourceAutoPartitionArgs) -> Result<Self> {
        Self::with_resolver(default_resolver(), args)
    }

    pub fn with_resolver(resolver: &Resolver, args: SqliteSourceAutoPartitionArgs) -> Result<Self> {
        let url = resolver.resolve(&args.urlpath, &args.open_options)?;
        Ok(SqliteSourceAutoPartition {
            inner: SqlSourceAutoPartition::new(
                url,
                args.table,
                args.index,
                args.sql_options,
                args.metadata,
            ),
        })
    }

    pub fn url(&self) -> &SqliteUrl {
        self.inner.url()
    }

    pub fn into_inner(self) -> SqlSourceAutoPartition {
        self.inner
    }
}

delegate_data_source!(SqliteSourceAutoPartition);

#[derive(Debug, Clone, Deserialize)]
pub struct SqliteSourceManualPartitionArgs {
    pub urlpath: String,
    pub sql_expr: String,
    pub where_values: Vec<json::Value>,
    #[serde(default)]
    pub where_template: Option<String>,
    #[serde(default, alias = "sql_kwargs")]
    pub sql_options: SqlOptions,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, alias = "open_kwargs")]
    pub open_options: OpenOptions,
}

impl SqliteSourceManualPartitionArgs {
    pub fn new(
        urlpath: impl Into<String>,
        sql_expr: impl Into<String>,
        where_values: Vec<json::Value>,
    ) -> Self {
        SqliteSourceManualPartitionArgs {
            urlpath: urlpath.into(),
            sql_expr: sql_expr.into(),
            where_values,
            where_template: None,
            sql_options: SqlOptions::default(),
            metadata: Metadata::new(),
            open_options: OpenOptions::new(),
        }
    }
}

/// A SQLite query read in explicitly given partitions.
#[derive(Debug, Clone)]
pub struct SqliteSourceManualPartition {
    inner: SqlSourceManualPartition,
}

impl SqliteSourceManualPartition {
    pub const DRIVER: Driver = Driver::SqliteManual;

    pub fn new(args: SqliteSourceManualPartitionArgs) -> Result<Self> {
        Self::with_resolver(default_resolver(), args)
    }

    pub fn with_resolver(
        resolver: &Resolver,
        args: SqliteSourceManualPartitionArgs,
    ) -> Result<Self> {
        let url = resolver.resolve(&args.urlpath, &args.open_options)?;
        Ok(SqliteSourceManualPartition {
            inner: SqlSourceManualPartition::new(
                url,
                args.sql_expr,
                args.where_values,
                args.where_template,
                args.sql_options,
                args.metadata,
            ),
        })
    }

    pub fn url(&self) -> &SqliteUrl {
        self.inner.url()
    }

    pub fn into_inner(self) -> SqlSourceManualPartition {
        self.inner
    }
}

delegate_data_source!(SqliteSourceManualPartition);

#[derive(Debug, Clone, Deserialize)]
pub struct SqliteCatalogArgs {
    pub urlpath: String,
    #[serde(default)]
    pub views: bool,
    #[serde(default, alias = "sql_kwargs")]
    pub sql_options: SqlOptions,
    #[serde(default, alias = "open_kwargs")]
    pub open_options: OpenOptions,
    #[serde(flatten)]
    pub options: CatalogOptions,
}

impl SqliteCatalogArgs {
    pub fn new(urlpath: impl Into<String>) -> Self {
        SqliteCatalogArgs {
            urlpath: urlpath.into(),
            views: false,
            sql_options: SqlOptions::default(),
            open_options: OpenOptions::new(),
            options: CatalogOptions::default(),
        }
    }
}

/// Every table of a SQLite database as a catalog entry.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    inner: SqlCatalog,
}

impl SqliteCatalog {
    pub const DRIVER: Driver = Driver::SqliteCat;

    pub fn new(args: SqliteCatalogArgs) -> Result<Self> {
        Self::with_resolver(default_resolver(), args)
    }

    pub fn open(urlpath: &str) -> Result<Self> {
        Self::new(SqliteCatalogArgs::new(urlpath))
    }

    pub fn with_resolver(resolver: &Resolver, args: SqliteCatalogArgs) -> Result<Self> {
        let url = resolver.resolve(&args.urlpath, &args.open_options)?;
        Ok(SqliteCatalog {
            inner: SqlCatalog::new(url, args.views, args.sql_options, args.options)?,
        })
    }

    pub fn into_inner(self) -> SqlCatalog {
        self.inner
    }
}

impl Deref for SqliteCatalog {
    type Target = SqlCatalog;

    fn deref(&self) -> &SqlCatalog {
        &self.inner
    }
}
