//! Turning a path or URL into a SQLite connection string.

use std::{
    convert::TryFrom,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{
    fetch::{OpenOptions, Registry},
    Error,
};

/// File suffixes accepted as SQLite databases.
pub const SQLITE_SUFFIXES: &[&str] = &[".db", ".sqlite"];

const SQLITE_URL_PREFIX: &str = "sqlite:///";

#[derive(Debug, thiserror::Error)]
pub enum InvalidReference {
    #[error("expected a SQLite file ending in one of {suffixes:?} but got: {name}")]
    UnrecognizedSuffix {
        name: String,
        suffixes: &'static [&'static str],
    },

    #[error("unsupported protocol {protocol:?} in {urlpath}, expected one of {known:?}")]
    UnsupportedProtocol {
        urlpath: String,
        protocol: String,
        known: Vec<&'static str>,
    },

    #[error("not an existing SQLite file: {path:?}")]
    NotAFile { path: PathBuf },

    #[error("SQLite file path is not valid UTF-8: {path:?}")]
    NotUnicode { path: PathBuf },
}

/// A `sqlite:///<absolute-path>` connection string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SqliteUrl(String);

impl SqliteUrl {
    fn from_local(path: &Path) -> Result<Self, InvalidReference> {
        let path = path.to_str().ok_or_else(|| InvalidReference::NotUnicode {
            path: path.to_owned(),
        })?;
        Ok(SqliteUrl(format!("{}{}", SQLITE_URL_PREFIX, path)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem path of the database.
    pub fn path(&self) -> &Path {
        Path::new(&self.0[SQLITE_URL_PREFIX.len()..])
    }
}

impl fmt::Display for SqliteUrl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SqliteUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.strip_prefix(SQLITE_URL_PREFIX) {
            Some(path) if !path.is_empty() => Ok(SqliteUrl(s.to_owned())),
            _ => Err(Error::InvalidConnectionString(s.to_owned())),
        }
    }
}

impl TryFrom<String> for SqliteUrl {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        s.parse()
    }
}

impl From<SqliteUrl> for String {
    fn from(url: SqliteUrl) -> String {
        url.0
    }
}

enum Reference<'a> {
    Local(&'a Path),
    Remote(Url),
}

impl<'a> Reference<'a> {
    fn parse(urlpath: &'a str) -> Self {
        match Url::parse(urlpath) {
            // Single-letter schemes are drive letters, not protocols.
            Ok(url) if url.scheme().len() > 1 => Reference::Remote(url),
            _ => Reference::Local(Path::new(urlpath)),
        }
    }

    fn path(&self) -> &Path {
        match self {
            Reference::Local(path) => *path,
            Reference::Remote(url) => Path::new(url.path()),
        }
    }
}

fn check_suffix(path: &Path) -> Result<(), InvalidReference> {
    let suffix = path.extension().and_then(|ext| ext.to_str());
    let recognized = suffix.map_or(false, |suffix| {
        SQLITE_SUFFIXES
            .iter()
            .any(|allowed| allowed.strip_prefix('.') == Some(suffix))
    });
    if recognized {
        Ok(())
    } else {
        Err(InvalidReference::UnrecognizedSuffix {
            name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            suffixes: SQLITE_SUFFIXES,
        })
    }
}

/// Validates references and makes their databases locally available.
#[derive(Debug, Default)]
pub struct Resolver {
    registry: Registry,
}

impl Resolver {
    pub fn new(registry: Registry) -> Self {
        Resolver { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Resolve `urlpath` to a connection string for a local file.
    ///
    /// The suffix is checked before anything touches the filesystem or
    /// network. Local paths must name an existing regular file and are
    /// canonicalized in place. URLs must use a registered protocol and are
    /// fetched through the cache, with `options` passed along untouched.
    pub fn resolve(&self, urlpath: &str, options: &OpenOptions) -> crate::Result<SqliteUrl> {
        let reference = Reference::parse(urlpath);
        check_suffix(reference.path())?;
        let local = match reference {
            Reference::Local(path) => {
                if !path.is_file() {
                    return Err(InvalidReference::NotAFile {
                        path: path.to_owned(),
                    }
                    .into());
                }
                fs::canonicalize(path)?
            }
            Reference::Remote(url) => {
                if !self.registry.is_known(url.scheme()) {
                    return Err(InvalidReference::UnsupportedProtocol {
                        urlpath: urlpath.to_owned(),
                        protocol: url.scheme().to_owned(),
                        known: self.registry.known_protocols(),
                    }
                    .into());
                }
                self.registry.open_local(&url, options)?
            }
        };
        let sqlite_url = SqliteUrl::from_local(&local)?;
        debug!(%urlpath, %sqlite_url, "resolved");
        Ok(sqlite_url)
    }
}

static DEFAULT_RESOLVER: Lazy<Resolver> = Lazy::new(Resolver::default);

/// The resolver with the default protocols (`file`, `http`, `https`).
pub fn default_resolver() -> &'static Resolver {
    &DEFAULT_RESOLVER
}

pub fn urlpath_to_sqliteurl(urlpath: &str, options: &OpenOptions) -> crate::Result<SqliteUrl> {
    default_resolver().resolve(urlpath, options)
}
