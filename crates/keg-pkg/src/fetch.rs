//! Fetching source archives.
//!
//! Archives are fetched over HTTP(S) or read from `file://` URLs and local
//! paths. Downloads are cached by content hash; a cached archive is only
//! handed out again if it still hashes to the expected value.

use crate::config::Config;
use crate::integrity::ContentHash;
use crate::manifest::PackageDescriptor;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Errors that can occur while fetching an archive.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Archive bytes plus where they came from.
#[derive(Debug)]
pub struct FetchedArchive {
    pub data: Vec<u8>,
    pub from_cache: bool,
}

/// Blocking archive fetcher with a content-addressed cache.
pub struct Fetcher {
    config: Config,
    http_client: reqwest::blocking::Client,
    use_cache: bool,
}

impl Fetcher {
    /// Create a fetcher for the given configuration.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        // No client-side timeout: the host decides how long an install may take.
        let http_client = reqwest::blocking::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(None::<std::time::Duration>)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            config: config.clone(),
            http_client,
            use_cache: true,
        })
    }

    /// Enable or disable the download cache.
    #[must_use]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Fetch the descriptor's source archive.
    ///
    /// The bytes are *not* guaranteed to match the content hash; verifying
    /// them is the caller's job. Only matching downloads are cached.
    pub fn fetch(&self, descriptor: &PackageDescriptor) -> Result<FetchedArchive, FetchError> {
        let expected = descriptor.content_hash();
        let cache_path = self.config.cached_archive_path(&expected.to_hex());

        if self.use_cache {
            if let Some(data) = Self::read_cached(&cache_path, expected)? {
                tracing::info!(path = %cache_path.display(), "using cached archive");
                return Ok(FetchedArchive {
                    data,
                    from_cache: true,
                });
            }
        }

        let url = descriptor.source_url();
        tracing::info!(%url, "fetching archive");
        let data = self.fetch_url(url)?;

        if self.use_cache && ContentHash::compute(&data) == *expected {
            self.store_cached(&cache_path, &data)?;
        }

        Ok(FetchedArchive {
            data,
            from_cache: false,
        })
    }

    /// Fetch `url` without consulting the cache.
    pub fn fetch_url(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        match url.scheme() {
            "http" | "https" => self.download(url),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| FetchError::UnsupportedScheme(url.to_string()))?;
                read_local(&path)
            }
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }

    fn download(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http_client
            .get(url.as_str())
            .header("Accept", "application/octet-stream")
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Network(e.to_string()))
    }

    fn read_cached(path: &Path, expected: &ContentHash) -> Result<Option<Vec<u8>>, FetchError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(FetchError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if ContentHash::compute(&data) == *expected {
            return Ok(Some(data));
        }

        tracing::warn!(path = %path.display(), "discarding corrupt cached archive");
        fs::remove_file(path).map_err(|source| FetchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(None)
    }

    fn store_cached(&self, path: &Path, data: &[u8]) -> Result<(), FetchError> {
        let io_err = |source| FetchError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(&self.config.cache_dir).map_err(io_err)?;
        fs::write(path, data).map_err(io_err)?;
        tracing::debug!(path = %path.display(), "cached archive");
        Ok(())
    }
}

/// Read an archive from a local path.
pub fn read_local(path: &Path) -> Result<Vec<u8>, FetchError> {
    fs::read(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })
}
