//! FileStore: items as `<name>.data` / `<name>.meta` file pairs in one directory.
//!
//! Layout:
//! ```text
//! {storage_dir}/
//! ├── Xy3kPq9a.data   # raw bytes
//! ├── Xy3kPq9a.meta   # JSON metadata
//! ├── 7hGtRw2c.data
//! └── 7hGtRw2c.meta
//! ```
//!
//! A name counts as stored only while both files exist. Metadata is replaced with a
//! temp-file-and-rename on every write; data is written in place.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::meta::Meta;
use crate::name::ItemName;
use crate::record::{write_meta, AccessMode, Data, Record};
use crate::{StoreError, StoreResult};

const DATA_SUFFIX: &str = ".data";
const META_SUFFIX: &str = ".meta";

/// Storage backends hand out [`Record`]s by item name.
///
/// Records are released when closed or dropped; see [`Record`].
pub trait Storage: Send + Sync {
    /// Create an empty record. Fails with `AlreadyExists` rather than overwrite.
    fn create(&self, name: &ItemName, declared_size: u64) -> StoreResult<Record>;

    /// Open an existing record for reading.
    fn open(&self, name: &ItemName) -> StoreResult<Record>;

    /// Open an existing record for reading and writing.
    fn openwrite(&self, name: &ItemName) -> StoreResult<Record>;

    /// Remove both halves of a record.
    ///
    /// If only one half exists it is removed and `PartialRemove` is still returned.
    fn remove(&self, name: &ItemName) -> StoreResult<()>;

    /// Names with both a data and a metadata file, sorted.
    fn names(&self) -> StoreResult<Vec<ItemName>>;

    /// Cheap existence probe; does not read metadata.
    fn contains(&self, name: &str) -> bool;
}

/// Filesystem-based item storage.
#[derive(Debug, Clone)]
pub struct FileStore {
    config: StoreConfig,
}

impl FileStore {
    /// Create a FileStore with the given configuration.
    ///
    /// Creates the storage directory if needed and checks that it is writable
    /// (unless in read-only mode).
    pub fn new(config: StoreConfig) -> Result<Self> {
        if !config.read_only {
            fs::create_dir_all(&config.storage_dir).with_context(|| {
                format!(
                    "failed to create storage directory {}",
                    config.storage_dir.display()
                )
            })?;

            let probe = config.storage_dir.join(format!(".probe.{}", Uuid::new_v4()));
            fs::write(&probe, b"").with_context(|| {
                format!(
                    "could not write file in storage directory {}",
                    config.storage_dir.display()
                )
            })?;
            fs::remove_file(&probe).context("failed to remove probe file")?;
        }

        Ok(Self { config })
    }

    /// Create a FileStore at a specific path.
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(StoreConfig::with_storage_dir(path))
    }

    /// Create a read-only FileStore at a specific path.
    pub fn read_only_at(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(StoreConfig::read_only(path))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of the data file for a name (whether or not it exists).
    pub fn data_path(&self, name: &ItemName) -> PathBuf {
        self.config
            .storage_dir
            .join(format!("{}{}", name, DATA_SUFFIX))
    }

    fn meta_path(&self, name: &ItemName) -> PathBuf {
        self.config
            .storage_dir
            .join(format!("{}{}", name, META_SUFFIX))
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn open_mode(&self, name: &ItemName, mode: AccessMode) -> StoreResult<Record> {
        if mode == AccessMode::Write {
            self.ensure_writable()?;
        }

        let data_path = self.data_path(name);
        let meta_path = self.meta_path(name);

        let file = OpenOptions::new()
            .read(true)
            .write(mode == AccessMode::Write)
            .open(&data_path)
            .map_err(|e| not_found_or(e, name))?;
        let bytes = fs::read(&meta_path).map_err(|e| not_found_or(e, name))?;

        let loaded = Meta::decode(&bytes).map_err(|e| StoreError::CorruptMeta {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        Ok(Record::new(
            name.clone(),
            mode,
            Data::new(file, mode == AccessMode::Write),
            loaded.meta,
            loaded.missing,
            data_path,
            meta_path,
        ))
    }
}

fn not_found_or(e: io::Error, name: &ItemName) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(name.to_string())
    } else {
        StoreError::Io(e)
    }
}

/// Outcome of removing one half of a record.
enum Removal {
    Removed,
    Missing,
    Failed(io::Error),
}

fn remove_file(path: &Path) -> Removal {
    match fs::remove_file(path) {
        Ok(()) => Removal::Removed,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Removal::Missing,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Could not delete file");
            Removal::Failed(e)
        }
    }
}

impl Storage for FileStore {
    #[tracing::instrument(skip(self), fields(item.name = %name))]
    fn create(&self, name: &ItemName, declared_size: u64) -> StoreResult<Record> {
        self.ensure_writable()?;

        let data_path = self.data_path(name);
        let meta_path = self.meta_path(name);
        if meta_path.exists() {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&data_path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(name.to_string()),
                _ => StoreError::Io(e),
            })?;

        // Written right away so the name is taken even before the first flush.
        let meta = Meta::default();
        if let Err(e) = write_meta(&meta_path, &meta) {
            let _ = fs::remove_file(&data_path);
            return Err(e);
        }

        tracing::debug!("Record created");
        Ok(Record::new(
            name.clone(),
            AccessMode::Write,
            Data::new(file, true),
            meta,
            Vec::new(),
            data_path,
            meta_path,
        ))
    }

    fn open(&self, name: &ItemName) -> StoreResult<Record> {
        self.open_mode(name, AccessMode::Read)
    }

    fn openwrite(&self, name: &ItemName) -> StoreResult<Record> {
        self.open_mode(name, AccessMode::Write)
    }

    #[tracing::instrument(skip(self), fields(item.name = %name))]
    fn remove(&self, name: &ItemName) -> StoreResult<()> {
        self.ensure_writable()?;

        let data = remove_file(&self.data_path(name));
        let meta = remove_file(&self.meta_path(name));

        match (data, meta) {
            (Removal::Removed, Removal::Removed) => {
                tracing::info!("Item removed");
                Ok(())
            }
            (Removal::Missing, Removal::Missing) => Err(StoreError::NotFound(name.to_string())),
            (Removal::Failed(e), _) | (_, Removal::Failed(e)) => Err(StoreError::Io(e)),
            (Removal::Removed, Removal::Missing) => {
                tracing::warn!("Removed data of a record without metadata");
                Err(StoreError::PartialRemove {
                    name: name.to_string(),
                    missing: "meta",
                })
            }
            (Removal::Missing, Removal::Removed) => {
                tracing::warn!("Removed metadata of a record without data");
                Err(StoreError::PartialRemove {
                    name: name.to_string(),
                    missing: "data",
                })
            }
        }
    }

    fn names(&self) -> StoreResult<Vec<ItemName>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.config.storage_dir)? {
            let file_name = entry?.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(stem) = file_name.strip_suffix(META_SUFFIX) else {
                continue;
            };
            let Ok(name) = ItemName::parse(stem) else {
                continue;
            };
            if self.data_path(&name).exists() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn contains(&self, name: &str) -> bool {
        match ItemName::parse(name) {
            Ok(name) => self.meta_path(&name).exists() || self.data_path(&name).exists(),
            Err(_) => false,
        }
    }
}
