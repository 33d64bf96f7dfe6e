//! Open records: a data file plus in-memory metadata, released together.
//!
//! Metadata is read once when the record is opened and written back in full when a
//! writable record is released with changes. Release happens in [`Record::close`], or in
//! `Drop` on every other exit path.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::meta::{Meta, MetaKey};
use crate::name::ItemName;
use crate::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Byte-addressable item content.
#[derive(Debug)]
pub struct Data {
    file: File,
    writable: bool,
}

impl Data {
    pub(crate) fn new(file: File, writable: bool) -> Self {
        Self { file, writable }
    }

    pub fn size(&self) -> StoreResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Read up to `length` bytes starting at `offset`. Short only at end of data.
    pub fn read(&self, length: usize, offset: u64) -> StoreResult<Vec<u8>> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(length);
        file.take(length as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn write(&self, bytes: &[u8], offset: u64) -> StoreResult<()> {
        if !self.writable {
            return Err(StoreError::NotWritable);
        }
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }
}

/// An open item.
#[derive(Debug)]
pub struct Record {
    name: ItemName,
    mode: AccessMode,
    data: Data,
    meta: Meta,
    loaded: Meta,
    missing: Vec<MetaKey>,
    force_write: bool,
    data_path: PathBuf,
    meta_path: PathBuf,
    released: bool,
}

impl Record {
    pub(crate) fn new(
        name: ItemName,
        mode: AccessMode,
        data: Data,
        meta: Meta,
        missing: Vec<MetaKey>,
        data_path: PathBuf,
        meta_path: PathBuf,
    ) -> Self {
        Self {
            name,
            mode,
            data,
            loaded: meta.clone(),
            meta,
            missing,
            force_write: false,
            data_path,
            meta_path,
            released: false,
        }
    }

    pub fn name(&self) -> &ItemName {
        &self.name
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Mutable metadata; only available on records opened for writing.
    pub fn meta_mut(&mut self) -> StoreResult<&mut Meta> {
        match self.mode {
            AccessMode::Write => Ok(&mut self.meta),
            AccessMode::Read => Err(StoreError::NotWritable),
        }
    }

    /// Typed keys the stored metadata did not carry when the record was opened.
    pub fn missing_keys(&self) -> &[MetaKey] {
        &self.missing
    }

    /// Force the metadata to be written on release even if no field changed.
    pub fn mark_dirty(&mut self) {
        self.force_write = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.force_write || self.meta != self.loaded
    }

    /// Write pending metadata changes now.
    pub fn flush(&mut self) -> StoreResult<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        if self.mode == AccessMode::Read {
            return Err(StoreError::NotWritable);
        }
        // Removed underneath us: writing the meta file back would leave half a record.
        if !self.data_path.exists() {
            return Err(StoreError::NotFound(self.name.to_string()));
        }

        write_meta(&self.meta_path, &self.meta)?;
        self.loaded = self.meta.clone();
        self.force_write = false;
        self.missing.clear();
        Ok(())
    }

    /// Release the record, writing metadata back if it changed.
    pub fn close(mut self) -> StoreResult<()> {
        self.released = true;
        self.flush()
    }
}

impl Drop for Record {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.flush() {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(item.name = %self.name, "Record removed while open, metadata dropped");
            }
            Err(e) => {
                tracing::error!(item.name = %self.name, error = %e, "Failed to write metadata on release");
            }
        }
    }
}

/// Replace the metadata file in one step: write a sibling temp file, then rename it over.
pub(crate) fn write_meta(path: &Path, meta: &Meta) -> StoreResult<()> {
    let bytes = meta.encode()?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp.{}", file_name, Uuid::new_v4()));

    let result = (|| -> io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.flush()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}
