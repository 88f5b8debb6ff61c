//! # Configuration
//!
//! The server and CLI read a single JSON document. Every section is
//! optional and falls back to its defaults:
//!
//! ```json
//! {
//!   "server":  { "host": "127.0.0.1", "port": 9292, "scheme": "http", "public_url": null },
//!   "storage": { "data_dir": "./data", "gems_dir": "gems", "specifications_dir": "specifications" },
//!   "limits":  { "max_gem_size_mb": 100 },
//!   "remote":  { "timeout_secs": 30, "user_agent": "gemhouse/0.3.0" }
//! }
//! ```
//!
//! ```rust,no_run
//! # use gemhouse::config::Config;
//! // Load from file with fallback to defaults
//! let config = Config::load_or_default("gemhouse.json")?;
//!
//! // Load from file (fails if file doesn't exist)
//! let config = Config::load("gemhouse.json")?;
//! # Ok::<(), gemhouse::error::RepositoryError>(())
//! ```

use crate::error::{RepositoryError, RepositoryResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listening address and the URL clients use to reach the server
    pub server: ServerConfig,
    /// Where the local backend keeps gem blobs and specification records
    pub storage: StorageConfig,
    /// Upload limits
    pub limits: LimitsConfig,
    /// HTTP client settings for the remote backend
    pub remote: RemoteConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host/IP address to bind to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
    /// URL scheme ("http" or "https")
    pub scheme: String,
    /// Externally visible base URL, when the server sits behind a proxy
    pub public_url: Option<Url>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9292,
            scheme: "http".to_string(),
            public_url: None,
        }
    }
}

/// Directory layout of the local backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Repository root
    pub data_dir: PathBuf,
    /// Gem blob directory, relative to `data_dir`
    pub gems_dir: String,
    /// Specification record directory, relative to `data_dir`
    pub specifications_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            gems_dir: "gems".to_string(),
            specifications_dir: "specifications".to_string(),
        }
    }
}

impl StorageConfig {
    /// Default layout rooted at `data_dir`.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn gems_path(&self) -> PathBuf {
        self.data_dir.join(&self.gems_dir)
    }

    pub fn specifications_path(&self) -> PathBuf {
        self.data_dir.join(&self.specifications_dir)
    }
}

/// Upload limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum gem size in megabytes
    pub max_gem_size_mb: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_gem_size_mb: 100,
        }
    }
}

/// HTTP client settings for [`RemoteRepository`](crate::remote::RemoteRepository).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Connect and per-read timeout in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("gemhouse/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not parse as a configuration
    /// document.
    pub fn load<P: AsRef<Path>>(path: P) -> RepositoryResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| RepositoryError::Config(format!("{}: {e}", path.display())))
    }

    /// Load configuration from file, or the defaults if the file doesn't exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> RepositoryResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Maximum accepted gem size in bytes.
    pub fn max_gem_size_bytes(&self) -> u64 {
        self.limits.max_gem_size_mb.saturating_mul(1024 * 1024)
    }

    /// URL clients use to reach the server: `public_url` if set, otherwise
    /// built from scheme, host and port.
    pub fn server_url(&self) -> RepositoryResult<Url> {
        if let Some(url) = &self.server.public_url {
            return Ok(url.clone());
        }
        let raw = format!(
            "{}://{}:{}/",
            self.server.scheme, self.server.host, self.server.port
        );
        Url::parse(&raw).map_err(|e| RepositoryError::Config(format!("server url '{raw}': {e}")))
    }
}
