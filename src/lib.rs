//! Open SQLite databases referenced by local path or remote URL.
//!
//! A reference such as `/data/pudl.db` or
//! `https://example.com/global-power-plants.db` is first turned into a
//! canonical `sqlite:///<absolute-path>` connection string by the
//! [`Resolver`], downloading and caching remote databases as needed. The
//! drivers in [`driver`] wrap the SQL sources and catalog in [`source`] and
//! [`catalog`] around that connection string.

use std::io;

pub mod cache;
pub mod catalog;
pub mod dir;
pub mod driver;
pub mod fetch;
pub mod frame;
pub mod resolve;
pub mod sink;
pub mod source;
pub mod sqlite;

mod util;

pub use catalog::{CatalogEntry, CatalogOptions, SqlCatalog};
pub use dir::DirSink;
pub use driver::{
    open_driver, Driver, Opened, SqliteCatalog, SqliteCatalogArgs, SqliteSource,
    SqliteSourceArgs, SqliteSourceAutoPartition, SqliteSourceAutoPartitionArgs,
    SqliteSourceManualPartition, SqliteSourceManualPartitionArgs,
};
pub use fetch::{FetchError, OpenOptions, Protocol, Registry};
pub use frame::{Frame, Schema};
pub use resolve::{
    default_resolver, urlpath_to_sqliteurl, InvalidReference, Resolver, SqliteUrl, SQLITE_SUFFIXES,
};
pub use sink::{JsonLinesSink, Sink};
pub use source::{
    DataSource, Metadata, PartitionedFrame, SqlOptions, SqlSource, SqlSourceAutoPartition,
    SqlSourceManualPartition,
};
pub use sqlite::{Db, SchemaEntry};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    InvalidReference(#[from] InvalidReference),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("invalid SQLite connection string {0:?}: expected sqlite:///<path>")]
    InvalidConnectionString(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("blobs not yet supported (column {column})")]
    UnsupportedBlob { column: String },

    #[error("partition {index} out of range, source has {npartitions}")]
    PartitionOutOfRange { index: usize, npartitions: usize },

    #[error("cannot partition: {0}")]
    Partitioning(String),

    #[error("no column named {0:?} to use as index")]
    NoSuchColumn(String),

    #[error("no catalog entry named {0:?}")]
    NoSuchEntry(String),

    #[error("unknown driver {0:?}")]
    UnknownDriver(String),

    #[error("invalid driver arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),
}
