//! Retrieval of remote databases.
//!
//! A [`Registry`] holds the [`Protocol`]s that can fetch a URL's content. The
//! resolver only asks it two things: which protocol names are known, and to
//! materialize a URL as a local file through the [`SimpleCache`].

use std::{
    fmt,
    fs::File,
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json as json;
use url::Url;

use crate::cache::SimpleCache;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("no protocol registered for scheme {0:?}")]
    UnknownProtocol(String),

    #[error("option {key:?} must be {expected}")]
    InvalidOption { key: String, expected: &'static str },

    #[error("request for {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("{0} does not name a local file")]
    NotALocalPath(String),

    #[error("cannot read {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("cache error in {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Options forwarded to the retrieval subsystem.
///
/// The resolver never looks inside; only protocols and the cache interpret
/// keys. Recognized keys are `cache_storage` (cache directory), `headers`
/// (object of HTTP header strings) and `timeout` (seconds).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpenOptions(json::Map<String, json::Value>);

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cache_storage(&self) -> Result<Option<PathBuf>, FetchError> {
        match self.get("cache_storage") {
            None | Some(json::Value::Null) => Ok(None),
            Some(json::Value::String(dir)) => Ok(Some(PathBuf::from(dir))),
            Some(_) => Err(invalid_option("cache_storage", "a directory path string")),
        }
    }

    pub fn headers(&self) -> Result<Vec<(String, String)>, FetchError> {
        match self.get("headers") {
            None | Some(json::Value::Null) => Ok(Vec::new()),
            Some(json::Value::Object(map)) => map
                .iter()
                .map(|(name, value)| match value {
                    json::Value::String(value) => Ok((name.clone(), value.clone())),
                    _ => Err(invalid_option("headers", "an object of strings")),
                })
                .collect(),
            Some(_) => Err(invalid_option("headers", "an object of strings")),
        }
    }

    pub fn timeout(&self) -> Result<Option<Duration>, FetchError> {
        match self.get("timeout") {
            None | Some(json::Value::Null) => Ok(None),
            Some(json::Value::Number(n)) => match n.as_f64() {
                Some(secs) if secs.is_finite() && secs >= 0.0 => {
                    Ok(Some(Duration::from_secs_f64(secs)))
                }
                _ => Err(invalid_option("timeout", "a non-negative number of seconds")),
            },
            Some(_) => Err(invalid_option("timeout", "a non-negative number of seconds")),
        }
    }
}

impl From<json::Map<String, json::Value>> for OpenOptions {
    fn from(map: json::Map<String, json::Value>) -> Self {
        OpenOptions(map)
    }
}

fn invalid_option(key: &str, expected: &'static str) -> FetchError {
    FetchError::InvalidOption {
        key: key.to_owned(),
        expected,
    }
}

/// A way of reading the bytes behind a URL.
pub trait Protocol: Send + Sync {
    /// URL schemes handled by this protocol.
    fn names(&self) -> &[&'static str];

    /// Copy the content of `url` into `dest`, returning the number of bytes
    /// written.
    fn fetch(
        &self,
        url: &Url,
        options: &OpenOptions,
        dest: &mut dyn Write,
    ) -> Result<u64, FetchError>;
}

#[derive(Debug, Default)]
pub struct HttpProtocol;

impl Protocol for HttpProtocol {
    fn names(&self) -> &[&'static str] {
        &["http", "https"]
    }

    fn fetch(
        &self,
        url: &Url,
        options: &OpenOptions,
        dest: &mut dyn Write,
    ) -> Result<u64, FetchError> {
        let http_error = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = options.timeout()? {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(http_error)?;
        let mut request = client.get(url.as_str());
        for (name, value) in options.headers()? {
            request = request.header(name, value);
        }
        let mut response = request.send().map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.copy_to(dest).map_err(http_error)
    }
}

#[derive(Debug, Default)]
pub struct FileProtocol;

impl Protocol for FileProtocol {
    fn names(&self) -> &[&'static str] {
        &["file"]
    }

    fn fetch(
        &self,
        url: &Url,
        _options: &OpenOptions,
        dest: &mut dyn Write,
    ) -> Result<u64, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|()| FetchError::NotALocalPath(url.to_string()))?;
        let read_error = |source| FetchError::Read {
            url: url.to_string(),
            source,
        };
        let mut file = File::open(path).map_err(read_error)?;
        io::copy(&mut file, dest).map_err(read_error)
    }
}

/// The set of protocols remote references may use.
pub struct Registry {
    protocols: Vec<Box<dyn Protocol>>,
}

impl Registry {
    /// A registry without any protocols; every URL is rejected.
    pub fn empty() -> Self {
        Registry {
            protocols: Vec::new(),
        }
    }

    /// Register a protocol. Later registrations take precedence for scheme
    /// names claimed by several protocols.
    pub fn with(mut self, protocol: impl Protocol + 'static) -> Self {
        self.protocols.insert(0, Box::new(protocol));
        self
    }

    pub fn known_protocols(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .protocols
            .iter()
            .flat_map(|p| p.names().iter().copied())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn is_known(&self, scheme: &str) -> bool {
        self.get(scheme).is_some()
    }

    pub fn get(&self, scheme: &str) -> Option<&dyn Protocol> {
        self.protocols
            .iter()
            .find(|p| p.names().iter().any(|name| name.eq_ignore_ascii_case(scheme)))
            .map(|p| p.as_ref())
    }

    /// Make the content of `url` available as a local file, fetching it only
    /// when the cache has no copy yet. Returns an absolute path.
    pub fn open_local(&self, url: &Url, options: &OpenOptions) -> Result<PathBuf, FetchError> {
        let protocol = self
            .get(url.scheme())
            .ok_or_else(|| FetchError::UnknownProtocol(url.scheme().to_owned()))?;
        SimpleCache::from_options(options)?.open_local(protocol, url, options)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::empty().with(FileProtocol).with(HttpProtocol)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Registry")
            .field("protocols", &self.known_protocols())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Read,
        net::{SocketAddr, TcpListener},
        thread,
    };

    use super::*;

    /// Answer a single HTTP request with `response`, returning the request.
    fn serve_once(response: &'static [u8]) -> (SocketAddr, thread::JoinHandle<String>) {
        // Local requests must not be sent to a proxy from the environment.
        std::env::set_var("NO_PROXY", "127.0.0.1");
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response).unwrap();
            String::from_utf8(request).unwrap()
        });
        (addr, handle)
    }

    #[test]
    fn http_download_lands_in_cache() {
        let (addr, server) = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\nConnection: close\r\n\r\nremote-db",
        );
        let cache = tempfile::tempdir().unwrap();
        let options = OpenOptions::new()
            .with("cache_storage", cache.path().to_str().unwrap())
            .with("headers", json::json!({"X-Token": "abc"}))
            .with("timeout", 10);
        let url = Url::parse(&format!("http://{}/plants.db", addr)).unwrap();

        let path = Registry::default().open_local(&url, &options).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"remote-db");
        assert!(path.starts_with(std::fs::canonicalize(cache.path()).unwrap()));

        let request = server.join().unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /plants.db http/1.1"));
        assert!(request.contains("x-token: abc"));
    }

    #[test]
    fn http_error_status_is_reported_and_not_cached() {
        let (addr, server) = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let cache = tempfile::tempdir().unwrap();
        let options = OpenOptions::new().with("cache_storage", cache.path().to_str().unwrap());
        let url = Url::parse(&format!("http://{}/missing.db", addr)).unwrap();

        let err = Registry::default().open_local(&url, &options).unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        server.join().unwrap();
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
    }

    #[test]
    fn http_timeout_is_applied() {
        std::env::set_var("NO_PROXY", "127.0.0.1");
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept the connection but never answer.
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(5));
            drop(stream);
        });
        let options = OpenOptions::new().with("timeout", 0.2);
        let url = Url::parse(&format!("http://{}/slow.db", addr)).unwrap();

        let mut out = Vec::new();
        let err = HttpProtocol.fetch(&url, &options, &mut out).unwrap_err();
        assert!(matches!(err, FetchError::Http { .. }));
    }

    #[test]
    fn default_registry_knows_http_and_file() {
        let registry = Registry::default();
        assert_eq!(registry.known_protocols(), vec!["file", "http", "https"]);
        assert!(registry.is_known("HTTPS"));
        assert!(!registry.is_known("s3"));
        assert!(!registry.is_known("wtftp"));
    }

    #[test]
    fn empty_registry_rejects_everything() {
        let registry = Registry::empty();
        assert!(registry.known_protocols().is_empty());
        let url = Url::parse("https://example.com/data.db").unwrap();
        let err = registry.open_local(&url, &OpenOptions::new()).unwrap_err();
        assert!(matches!(err, FetchError::UnknownProtocol(scheme) if scheme == "https"));
    }

    #[test]
    fn option_accessors() {
        let options = OpenOptions::new()
            .with("cache_storage", "/tmp/cache")
            .with("timeout", 2.5)
            .with("headers", json::json!({"Authorization": "Bearer x"}));
        assert_eq!(
            options.cache_storage().unwrap(),
            Some(PathBuf::from("/tmp/cache"))
        );
        assert_eq!(options.timeout().unwrap(), Some(Duration::from_millis(2500)));
        assert_eq!(
            options.headers().unwrap(),
            vec![("Authorization".to_owned(), "Bearer x".to_owned())]
        );
    }

    #[test]
    fn option_with_wrong_type_is_rejected() {
        let options = OpenOptions::new().with("timeout", "soon");
        assert!(matches!(
            options.timeout(),
            Err(FetchError::InvalidOption { key, .. }) if key == "timeout"
        ));
        let options = OpenOptions::new().with("headers", json::json!({"X-Count": 1}));
        assert!(options.headers().is_err());
        let options = OpenOptions::new().with("cache_storage", 7);
        assert!(options.cache_storage().is_err());
    }

    #[test]
    fn file_protocol_copies_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.db");
        std::fs::write(&path, b"payload").unwrap();
        let url = Url::from_file_path(&path).unwrap();
        let mut out = Vec::new();
        let n = FileProtocol
            .fetch(&url, &OpenOptions::new(), &mut out)
            .unwrap();
        assert_eq!(n, 7);
        assert_eq!(out, b"payload");
    }
}
