//! On-disk cache for fetched databases.
//!
//! Entries are keyed by a hash of the full URL, so the same reference always
//! maps to the same file and is fetched only once. Content is written to a
//! temporary file in the cache directory and renamed into place; a path
//! handed out by the cache always names a complete download.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::{debug, info};
use url::Url;

use crate::fetch::{FetchError, OpenOptions, Protocol};

const CACHE_DIR_NAME: &str = "intake-sqlite";

/// Default location of the cache when `cache_storage` is not given.
pub fn default_storage() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_DIR_NAME)
}

#[derive(Debug, Clone)]
pub struct SimpleCache {
    storage: PathBuf,
}

impl SimpleCache {
    pub fn new(storage: impl Into<PathBuf>) -> Self {
        SimpleCache {
            storage: storage.into(),
        }
    }

    pub fn from_options(options: &OpenOptions) -> Result<Self, FetchError> {
        Ok(SimpleCache::new(
            options.cache_storage()?.unwrap_or_else(default_storage),
        ))
    }

    pub fn storage(&self) -> &Path {
        &self.storage
    }

    /// File name under which `url` is cached.
    pub fn key(url: &Url) -> String {
        let hash = blake3::hash(url.as_str().as_bytes());
        match Path::new(url.path()).extension().and_then(|ext| ext.to_str()) {
            Some(ext) => format!("{}.{}", hash.to_hex(), ext),
            None => hash.to_hex().to_string(),
        }
    }

    pub fn open_local(
        &self,
        protocol: &dyn Protocol,
        url: &Url,
        options: &OpenOptions,
    ) -> Result<PathBuf, FetchError> {
        let cache_error = |source| FetchError::Cache {
            path: self.storage.clone(),
            source,
        };
        fs::create_dir_all(&self.storage).map_err(cache_error)?;
        let storage = fs::canonicalize(&self.storage).map_err(cache_error)?;
        let path = storage.join(Self::key(url));
        if path.is_file() {
            debug!(%url, path = %path.display(), "cache hit");
            return Ok(path);
        }

        info!(%url, path = %path.display(), "fetching into cache");
        let mut tmp = tempfile::NamedTempFile::new_in(&storage).map_err(cache_error)?;
        let bytes = protocol.fetch(url, options, tmp.as_file_mut())?;
        tmp.as_file_mut().flush().map_err(cache_error)?;
        tmp.as_file().sync_all().map_err(cache_error)?;
        tmp.persist(&path).map_err(|e| cache_error(e.error))?;
        debug!(%url, bytes, "cached");
        Ok(path)
    }
}
