//! Store configuration with environment variable and file-based loading.
//!
//! Environment variables:
//! - `BLOBSTORE_DIR`: Directory holding the `.data`/`.meta` files
//! - `BLOBSTORE_MAX_FILE_SIZE`: Largest item accepted, in bytes
//! - `BLOBSTORE_MAX_BODY_SIZE`: Largest chunk body accepted, in bytes
//! - `BLOBSTORE_UPLOAD_LOCKED`: Set to "true" to lock new uploads until an admin unlocks them
//! - `BLOBSTORE_READONLY`: Set to "true" for read-only mode
//!
//! Default directory: `<platform data dir>/blobstore`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_ALLOWED_FILE_SIZE: u64 = 5 * 1000 * 1000 * 1000;

/// 1 MiB, less a safety margin for request framing.
pub const DEFAULT_MAX_BODY_SIZE: u64 = 1024 * 1024 - 8192;

/// Configuration for the item store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding every item's data and metadata file.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Largest item size accepted, checked against both advertised and on-disk sizes.
    #[serde(default = "default_max_allowed_file_size")]
    pub max_allowed_file_size: u64,

    /// Largest chunk body accepted. Clients size their chunks from this.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,

    /// New uploads start locked.
    #[serde(default)]
    pub upload_locked: bool,

    /// Read-only mode - prevents any writes.
    #[serde(default)]
    pub read_only: bool,
}

fn default_max_allowed_file_size() -> u64 {
    DEFAULT_MAX_ALLOWED_FILE_SIZE
}

fn default_max_body_size() -> u64 {
    DEFAULT_MAX_BODY_SIZE
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            max_allowed_file_size: DEFAULT_MAX_ALLOWED_FILE_SIZE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            upload_locked: false,
            read_only: false,
        }
    }
}

fn default_storage_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.data_dir().join("blobstore"))
        .unwrap_or_else(|| PathBuf::from(".blobstore"))
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(false)
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} must be a byte count, got {v:?}")),
        Err(_) => Ok(None),
    }
}

impl StoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let storage_dir = env::var("BLOBSTORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_storage_dir());

        Ok(Self {
            storage_dir,
            max_allowed_file_size: env_u64("BLOBSTORE_MAX_FILE_SIZE")?
                .unwrap_or(DEFAULT_MAX_ALLOWED_FILE_SIZE),
            max_body_size: env_u64("BLOBSTORE_MAX_BODY_SIZE")?.unwrap_or(DEFAULT_MAX_BODY_SIZE),
            upload_locked: env_flag("BLOBSTORE_UPLOAD_LOCKED"),
            read_only: env_flag("BLOBSTORE_READONLY"),
        })
    }

    /// Load configuration from a TOML file, falling back to environment.
    ///
    /// The file should contain a `[storage]` section:
    /// ```toml
    /// [storage]
    /// storage_dir = "/srv/blobstore"
    /// max_allowed_file_size = 5000000000
    /// upload_locked = false
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let table: toml::Table = contents
            .parse()
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;

        if let Some(section) = table.get("storage") {
            let config: StoreConfig = section
                .clone()
                .try_into()
                .context("failed to parse [storage] section")?;
            Ok(config)
        } else {
            Self::from_env()
        }
    }

    /// Create a config with a specific storage directory.
    pub fn with_storage_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: path.into(),
            ..Self::default()
        }
    }

    /// Create a read-only config with a specific storage directory.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: path.into(),
            read_only: true,
            ..Self::default()
        }
    }

    /// Limits advertised to upload clients.
    pub fn limits(&self) -> Limits {
        Limits {
            max_body_size: self.max_body_size,
            max_allowed_file_size: self.max_allowed_file_size,
        }
    }
}

/// Size limits a client needs to plan a chunked upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(rename = "MAX_BODY_SIZE")]
    pub max_body_size: u64,
    #[serde(rename = "MAX_ALLOWED_FILE_SIZE")]
    pub max_allowed_file_size: u64,
}
