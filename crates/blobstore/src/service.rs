//! Item operations: the permission-checked entry points a front end calls.
//!
//! Every read path runs the lazy expiry check, so an expired item disappears on the
//! first touch after its max-life stamp.

use std::io::{self, Read};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::{Limits, StoreConfig};
use crate::error::{ItemError, ItemResult};
use crate::expiry::{ExpiryPolicy, Lifetime};
use crate::hashtask::BackgroundHasher;
use crate::meta::{Meta, MetaKey};
use crate::name::{ItemName, NameAllocator};
use crate::permission::{Capability, Permissions};
use crate::range::DownloadRange;
use crate::record::Record;
use crate::store::{FileStore, Storage};
use crate::upload::{filter_filename, filter_type, ChunkRequest, UploadOutcome, Uploader};
use crate::{StoreError, StoreResult};

/// Read size when streaming a download.
pub const STREAM_WINDOW: usize = 16 * 1024;

const INCOMPLETE: &str = "Upload incomplete. Try again later.";

/// An item name with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemInfo {
    pub name: ItemName,
    pub meta: Meta,
}

impl ItemInfo {
    /// Metadata without internal-only keys, for API responses.
    pub fn public_meta(&self) -> serde_json::Map<String, serde_json::Value> {
        self.meta.public()
    }
}

/// How a download is presented to a browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Attachment,
    Inline,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Inline => "inline",
        }
    }
}

/// The content store with its upload, read and admin operations.
pub struct BlobService {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    names: NameAllocator,
    hasher: BackgroundHasher,
    config: StoreConfig,
}

impl BlobService {
    pub fn new(storage: Arc<dyn Storage>, config: StoreConfig) -> Self {
        Self {
            hasher: BackgroundHasher::new(Arc::clone(&storage)),
            storage,
            clock: Arc::new(SystemClock),
            names: NameAllocator::new(),
            config,
        }
    }

    /// Open a filesystem store described by `config`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let store = FileStore::new(config.clone())?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_names(mut self, names: NameAllocator) -> Self {
        self.names = names;
        self
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Limits clients need to size their chunks.
    pub fn limits(&self) -> Limits {
        self.config.limits()
    }

    fn uploader(&self) -> Uploader<'_> {
        Uploader::new(
            self.storage.as_ref(),
            self.clock.as_ref(),
            &self.names,
            &self.hasher,
            &self.config,
        )
    }

    fn expiry(&self) -> ExpiryPolicy<'_> {
        ExpiryPolicy::new(self.storage.as_ref(), self.clock.as_ref())
    }

    fn require(perms: &dyn Permissions, capability: Capability) -> ItemResult<()> {
        if perms.may(capability) {
            Ok(())
        } else {
            Err(ItemError::Forbidden)
        }
    }

    /// Refuse incomplete and locked items unless the caller is an admin.
    fn check_access(perms: &dyn Permissions, record: &Record) -> ItemResult<()> {
        if !record.meta().complete && !perms.may(Capability::Admin) {
            return Err(ItemError::Conflict(INCOMPLETE.to_string()));
        }
        if record.meta().locked && !perms.may(Capability::Admin) {
            return Err(ItemError::Forbidden);
        }
        Ok(())
    }

    /// Accept one chunk of a chunked upload.
    pub fn upload_chunk(
        &self,
        perms: &dyn Permissions,
        request: &ChunkRequest,
        body: &[u8],
    ) -> ItemResult<UploadOutcome> {
        Self::require(perms, Capability::Create)?;
        self.uploader().chunk(request, body)
    }

    /// Delete an upload that has not completed yet.
    pub fn abort(&self, perms: &dyn Permissions, token: &str) -> ItemResult<ItemName> {
        Self::require(perms, Capability::Create)?;
        self.uploader().abort(token)
    }

    /// Store a complete item from a reader in one pass.
    pub fn create_item(
        &self,
        perms: &dyn Permissions,
        reader: &mut dyn Read,
        size: u64,
        filename: Option<&str>,
        content_type: Option<&str>,
        lifetime: Lifetime,
    ) -> ItemResult<ItemName> {
        Self::require(perms, Capability::Create)?;
        self.uploader()
            .create_item(reader, size, filename, content_type, lifetime)
    }

    /// Metadata of a complete item.
    pub fn detail(&self, perms: &dyn Permissions, name: &str) -> ItemResult<ItemInfo> {
        Self::require(perms, Capability::Read)?;
        let name = ItemName::parse(name)?;
        let record = self.storage.open(&name)?;
        if !record.meta().complete {
            return Err(ItemError::Conflict(INCOMPLETE.to_string()));
        }
        Self::check_access(perms, &record)?;
        if self.expiry().delete_if_lifetime_over(&record) {
            return Err(ItemError::NotFound);
        }
        Ok(ItemInfo {
            name,
            meta: record.meta().clone(),
        })
    }

    /// Start streaming an item, optionally limited by a `Range` header.
    #[tracing::instrument(skip(self, perms))]
    pub fn download(
        &self,
        perms: &dyn Permissions,
        name: &str,
        range: Option<&str>,
        disposition: Disposition,
    ) -> ItemResult<Download> {
        Self::require(perms, Capability::Read)?;
        let name = ItemName::parse(name)?;
        let record = self.storage.open(&name)?;
        if !record.meta().complete {
            return Err(ItemError::Conflict(INCOMPLETE.to_string()));
        }
        Self::check_access(perms, &record)?;
        if self.expiry().delete_if_lifetime_over(&record) {
            return Err(ItemError::NotFound);
        }

        let total = record.data().size()?;
        let (start, limit, content_range) = match range {
            None => (0, total, None),
            Some(header) => {
                let (start, limit) = DownloadRange::parse(header)?
                    .resolve(total)
                    .ok_or(ItemError::RangeNotSatisfiable)?;
                let content_range = format!("bytes {}-{}/{}", start, limit - 1, total);
                (start, limit, Some(content_range))
            }
        };

        let meta = record.meta();
        let content_type = if disposition == Disposition::Inline
            && meta.content_type.starts_with("text/")
        {
            "text/plain".to_string()
        } else {
            meta.content_type.clone()
        };
        let content_disposition =
            format!("{}; filename=\"{}\"", disposition.as_str(), meta.filename);

        Ok(Download {
            record,
            storage: Arc::clone(&self.storage),
            clock: Arc::clone(&self.clock),
            offset: start,
            start,
            limit,
            content_range,
            content_type,
            content_disposition,
            finished: false,
        })
    }

    /// Every readable item, newest upload first.
    ///
    /// Records with blank or unreadable metadata are skipped, as are expired ones.
    pub fn list(&self, perms: &dyn Permissions) -> ItemResult<Vec<ItemInfo>> {
        Self::require(perms, Capability::List)?;
        let expiry = self.expiry();
        let mut items = Vec::new();

        for name in self.storage.names()? {
            let record = match self.storage.open(&name) {
                Ok(record) => record,
                Err(e) if e.is_not_found() => continue,
                Err(StoreError::CorruptMeta { message, .. }) => {
                    tracing::warn!(item.name = %name, error = %message, "Skipping item with corrupt metadata");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if record.missing_keys().len() == MetaKey::ALL.len() {
                continue;
            }
            if expiry.delete_if_lifetime_over(&record) {
                continue;
            }
            items.push(ItemInfo {
                name,
                meta: record.meta().clone(),
            });
        }

        items.sort_by(|a, b| b.meta.timestamp_upload.cmp(&a.meta.timestamp_upload));
        Ok(items)
    }

    /// Remove an item.
    #[tracing::instrument(skip(self, perms))]
    pub fn delete(&self, perms: &dyn Permissions, name: &str) -> ItemResult<()> {
        Self::require(perms, Capability::Delete)?;
        let name = ItemName::parse(name)?;
        let record = self.storage.open(&name)?;
        Self::check_access(perms, &record)?;
        drop(record);

        self.storage.remove(&name)?;
        Ok(())
    }

    /// Change an item's filename and/or content type. Empty values are left alone.
    #[tracing::instrument(skip(self, perms))]
    pub fn modify(
        &self,
        perms: &dyn Permissions,
        name: &str,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> ItemResult<ItemInfo> {
        Self::require(perms, Capability::Create)?;
        let name = ItemName::parse(name)?;
        let mut record = self.storage.openwrite(&name)?;
        Self::check_access(perms, &record)?;
        if self.expiry().delete_if_lifetime_over(&record) {
            return Err(ItemError::NotFound);
        }

        let meta = record.meta_mut()?;
        let filename = filename.filter(|f| !f.trim().is_empty());
        let content_type = content_type.filter(|t| !t.trim().is_empty());
        if filename.is_some() {
            meta.filename = filter_filename(filename, &name, content_type, &meta.content_type);
        }
        if content_type.is_some() {
            meta.content_type = filter_type(content_type, &meta.content_type, None);
        }
        let meta = meta.clone();
        record.close()?;
        Ok(ItemInfo { name, meta })
    }

    /// Lock or unlock an item. Setting the current value again is a conflict.
    #[tracing::instrument(skip(self, perms))]
    pub fn set_locked(&self, perms: &dyn Permissions, name: &str, locked: bool) -> ItemResult<()> {
        Self::require(perms, Capability::Admin)?;
        let name = ItemName::parse(name)?;
        let mut record = self.storage.openwrite(&name)?;
        if record.meta().locked == locked {
            return Err(ItemError::Conflict(format!("locked already is {}", locked)));
        }
        if !record.meta().complete {
            return Err(ItemError::Conflict(INCOMPLETE.to_string()));
        }
        record.meta_mut()?.locked = locked;
        record.close()?;
        tracing::info!(item.name = %name, item.locked = locked, "Lock changed");
        Ok(())
    }
}

/// A download in progress.
///
/// The item is held open for reading only. Reading it to the end stamps
/// `timestamp-download` through a separate short write, so metadata changed while the
/// download streams is kept.
pub struct Download {
    record: Record,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    offset: u64,
    start: u64,
    limit: u64,
    content_range: Option<String>,
    content_type: String,
    content_disposition: String,
    finished: bool,
}

impl Download {
    /// `Content-Range` value; only present when a range was requested.
    pub fn content_range(&self) -> Option<&str> {
        self.content_range.as_deref()
    }

    pub fn content_length(&self) -> u64 {
        self.limit - self.start
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn content_disposition(&self) -> &str {
        &self.content_disposition
    }

    pub fn meta(&self) -> &Meta {
        self.record.meta()
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let name = self.record.name();
        match stamp_download(self.storage.as_ref(), name, self.clock.now()) {
            Ok(()) => {}
            // A read-only store still serves downloads, it just cannot stamp them.
            Err(StoreError::ReadOnly) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(item.name = %name, "Item removed during download, not stamped");
            }
            Err(e) => {
                tracing::warn!(item.name = %name, error = %e, "Failed to stamp download time");
            }
        }
    }
}

fn stamp_download(storage: &dyn Storage, name: &ItemName, now: i64) -> StoreResult<()> {
    let mut record = storage.openwrite(name)?;
    record.meta_mut()?.timestamp_download = now;
    record.close()
}

impl Read for Download {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.limit {
            self.finish();
            return Ok(0);
        }
        let want = (self.limit - self.offset)
            .min(STREAM_WINDOW as u64)
            .min(buf.len() as u64) as usize;
        let chunk = self
            .record
            .data()
            .read(want, self.offset)
            .map_err(io::Error::other)?;
        if chunk.is_empty() {
            // Data shorter than it was at open time; end the stream here.
            self.limit = self.offset;
            self.finish();
            return Ok(0);
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        self.offset += chunk.len() as u64;
        Ok(chunk.len())
    }
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("name", self.record.name())
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::hash::ContentHash;
    use crate::hashtask::recompute_hash;
    use crate::permission::{AllowAll, PermissionSet};
    use tempfile::TempDir;

    fn service(dir: &TempDir, clock: Arc<ManualClock>) -> anyhow::Result<BlobService> {
        let config = StoreConfig::with_storage_dir(dir.path());
        Ok(BlobService::open(config)?
            .with_clock(clock)
            .with_names(NameAllocator::seeded(42)))
    }

    fn upload(svc: &BlobService, bytes: &[u8], request: ChunkRequest) -> anyhow::Result<ItemName> {
        let len = bytes.len() as u64;
        let mut req = ChunkRequest::range(0, len - 1, len);
        req.filename = request.filename;
        req.content_type = request.content_type;
        req.maxlife_value = request.maxlife_value;
        req.maxlife_unit = request.maxlife_unit;
        Ok(svc.upload_chunk(&AllowAll, &req, bytes)?.name().clone())
    }

    fn user() -> PermissionSet {
        PermissionSet::parse("read,list,create,delete").unwrap()
    }

    #[test]
    fn test_download_full_and_stamps() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let clock = Arc::new(ManualClock::at(100));
        let svc = service(&dir, clock.clone())?;
        let name = upload(&svc, b"hello world", ChunkRequest::default().with_filename("h.txt"))?;

        clock.set(200);
        let mut dl = svc.download(&user(), name.as_str(), None, Disposition::Attachment)?;
        assert_eq!(dl.content_length(), 11);
        assert_eq!(dl.content_range(), None);
        assert_eq!(dl.content_type(), "text/plain");
        assert_eq!(dl.content_disposition(), "attachment; filename=\"h.txt\"");
        let mut body = Vec::new();
        dl.read_to_end(&mut body)?;
        drop(dl);
        assert_eq!(body, b"hello world");

        let info = svc.detail(&user(), name.as_str())?;
        assert_eq!(info.meta.timestamp_download, 200);
        Ok(())
    }

    #[test]
    fn test_download_keeps_hash_stored_while_streaming() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let clock = Arc::new(ManualClock::at(100));
        let svc = service(&dir, clock.clone())?;
        let name = upload(&svc, b"late hash", ChunkRequest::default())?;
        let mut record = svc.storage().openwrite(&name)?;
        record.meta_mut()?.hash = String::new();
        record.close()?;

        let mut dl = svc.download(&user(), name.as_str(), None, Disposition::Attachment)?;
        let hash = recompute_hash(svc.storage(), &name)?;
        clock.set(300);
        let mut body = Vec::new();
        dl.read_to_end(&mut body)?;
        drop(dl);

        let info = svc.detail(&user(), name.as_str())?;
        assert_eq!(hash, ContentHash::from_data(b"late hash"));
        assert_eq!(info.meta.hash, hash.as_str());
        assert_eq!(info.meta.timestamp_download, 300);
        Ok(())
    }

    #[test]
    fn test_download_keeps_lock_set_while_streaming() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let clock = Arc::new(ManualClock::at(100));
        let svc = service(&dir, clock.clone())?;
        let name = upload(&svc, b"secret", ChunkRequest::default())?;

        let mut dl = svc.download(&user(), name.as_str(), None, Disposition::Attachment)?;
        svc.set_locked(&AllowAll, name.as_str(), true)?;
        clock.set(400);
        let mut body = Vec::new();
        dl.read_to_end(&mut body)?;
        drop(dl);

        assert!(matches!(svc.detail(&user(), name.as_str()), Err(ItemError::Forbidden)));
        let info = svc.detail(&AllowAll, name.as_str())?;
        assert!(info.meta.locked);
        assert_eq!(info.meta.timestamp_download, 400);
        Ok(())
    }

    #[test]
    fn test_download_from_read_only_store() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let name = upload(
            &service(&dir, Arc::new(ManualClock::at(100)))?,
            b"frozen",
            ChunkRequest::default(),
        )?;

        let store = FileStore::read_only_at(dir.path())?;
        let svc = BlobService::new(Arc::new(store), StoreConfig::with_storage_dir(dir.path()))
            .with_clock(Arc::new(ManualClock::at(500)));
        let mut dl = svc.download(&user(), name.as_str(), None, Disposition::Attachment)?;
        let mut body = Vec::new();
        dl.read_to_end(&mut body)?;
        drop(dl);

        assert_eq!(body, b"frozen");
        assert_eq!(svc.detail(&user(), name.as_str())?.meta.timestamp_download, 0);
        Ok(())
    }

    #[test]
    fn test_download_range() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let svc = service(&dir, Arc::new(ManualClock::at(100)))?;
        let name = upload(&svc, b"0123456789", ChunkRequest::default())?;

        let mut dl = svc.download(&user(), name.as_str(), Some("bytes=2-5"), Disposition::Attachment)?;
        assert_eq!(dl.content_range(), Some("bytes 2-5/10"));
        assert_eq!(dl.content_length(), 4);
        let mut body = String::new();
        dl.read_to_string(&mut body)?;
        assert_eq!(body, "2345");

        let dl = svc.download(&user(), name.as_str(), Some("bytes=7-"), Disposition::Attachment)?;
        assert_eq!(dl.content_range(), Some("bytes 7-9/10"));

        let err = svc
            .download(&user(), name.as_str(), Some("bytes=10-"), Disposition::Attachment)
            .unwrap_err();
        assert_eq!(err.status(), 416);
        let err = svc
            .download(&user(), name.as_str(), Some("bytes=-3"), Disposition::Attachment)
            .unwrap_err();
        assert_eq!(err.status(), 400);
        Ok(())
    }

    #[test]
    fn test_inline_text_is_plain() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let svc = service(&dir, Arc::new(ManualClock::at(100)))?;
        let name = upload(
            &svc,
            b"<script>",
            ChunkRequest::default().with_content_type("text/html"),
        )?;

        let dl = svc.download(&user(), name.as_str(), None, Disposition::Inline)?;
        assert_eq!(dl.content_type(), "text/plain");
        assert!(dl.content_disposition().starts_with("inline;"));
        let dl = svc.download(&user(), name.as_str(), None, Disposition::Attachment)?;
        assert_eq!(dl.content_type(), "text/html");
        Ok(())
    }

    #[test]
    fn test_permissions_enforced() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let svc = service(&dir, Arc::new(ManualClock::at(100)))?;
        let name = upload(&svc, b"abc", ChunkRequest::default())?;
        let nobody = PermissionSet::none();

        assert!(matches!(svc.detail(&nobody, name.as_str()), Err(ItemError::Forbidden)));
        assert!(matches!(svc.list(&nobody), Err(ItemError::Forbidden)));
        assert!(matches!(svc.delete(&nobody, name.as_str()), Err(ItemError::Forbidden)));
        assert!(matches!(
            svc.set_locked(&user(), name.as_str(), true),
            Err(ItemError::Forbidden)
        ));
        assert!(matches!(
            svc.upload_chunk(&nobody, &ChunkRequest::range(0, 0, 1), b"x"),
            Err(ItemError::Forbidden)
        ));
        let modify_only = PermissionSet::parse("read,modify").unwrap();
        assert!(matches!(
            svc.modify(&modify_only, name.as_str(), Some("x.txt"), None),
            Err(ItemError::Forbidden)
        ));
        Ok(())
    }

    #[test]
    fn test_locked_items_need_admin() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let svc = service(&dir, Arc::new(ManualClock::at(100)))?;
        let name = upload(&svc, b"abc", ChunkRequest::default())?;

        svc.set_locked(&AllowAll, name.as_str(), true)?;
        assert!(matches!(
            svc.set_locked(&AllowAll, name.as_str(), true),
            Err(ItemError::Conflict(_))
        ));
        assert!(matches!(svc.detail(&user(), name.as_str()), Err(ItemError::Forbidden)));
        assert!(matches!(svc.delete(&user(), name.as_str()), Err(ItemError::Forbidden)));
        assert!(svc.detail(&AllowAll, name.as_str())?.meta.locked);

        svc.set_locked(&AllowAll, name.as_str(), false)?;
        svc.delete(&user(), name.as_str())?;
        assert!(matches!(svc.detail(&user(), name.as_str()), Err(ItemError::NotFound)));
        Ok(())
    }

    #[test]
    fn test_incomplete_items() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let svc = service(&dir, Arc::new(ManualClock::at(100)))?;
        let partial = svc.upload_chunk(&AllowAll, &ChunkRequest::range(0, 1, 4), b"ab")?;
        let name = partial.name().as_str();

        assert!(matches!(svc.detail(&AllowAll, name), Err(ItemError::Conflict(_))));
        assert!(matches!(
            svc.download(&AllowAll, name, None, Disposition::Attachment),
            Err(ItemError::Conflict(_))
        ));
        assert!(matches!(svc.delete(&user(), name), Err(ItemError::Conflict(_))));
        assert!(matches!(
            svc.set_locked(&AllowAll, name, true),
            Err(ItemError::Conflict(_))
        ));
        svc.delete(&AllowAll, name)?;
        assert!(!svc.storage().contains(name));
        Ok(())
    }

    #[test]
    fn test_list_newest_first_and_expiry() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let clock = Arc::new(ManualClock::at(1000));
        let svc = service(&dir, clock.clone())?;

        let old = upload(&svc, b"old", ChunkRequest::default().with_lifetime("1", "MINUTES"))?;
        clock.set(1010);
        let new = upload(&svc, b"new", ChunkRequest::default().with_lifetime("1", "FOREVER"))?;
        clock.set(1020);
        let _partial = svc.upload_chunk(&AllowAll, &ChunkRequest::range(0, 0, 2), b"x")?;

        let names: Vec<_> = svc.list(&user())?.into_iter().map(|i| i.name).collect();
        assert_eq!(names.len(), 3);
        assert_eq!(names[1], new);
        assert_eq!(names[2], old);

        clock.set(1061);
        let names: Vec<_> = svc.list(&user())?.into_iter().map(|i| i.name).collect();
        assert!(!names.contains(&old));
        assert!(!svc.storage().contains(old.as_str()));
        assert!(matches!(svc.detail(&user(), old.as_str()), Err(ItemError::NotFound)));
        Ok(())
    }

    #[test]
    fn test_list_skips_blank_and_corrupt_meta() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let svc = service(&dir, Arc::new(ManualClock::at(100)))?;
        let good = upload(&svc, b"abc", ChunkRequest::default())?;
        std::fs::write(dir.path().join("aaaaaaaa.data"), b"x")?;
        std::fs::write(dir.path().join("aaaaaaaa.meta"), b"")?;
        std::fs::write(dir.path().join("bbbbbbbb.data"), b"x")?;
        std::fs::write(dir.path().join("bbbbbbbb.meta"), b"\x80\x04garbage")?;

        let names: Vec<_> = svc.list(&user())?.into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec![good]);
        Ok(())
    }

    #[test]
    fn test_modify() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let svc = service(&dir, Arc::new(ManualClock::at(100)))?;
        let name = upload(&svc, b"abc", ChunkRequest::default().with_filename("a.bin"))?;

        let info = svc.modify(&user(), name.as_str(), Some("new/name.txt"), Some(""))?;
        assert_eq!(info.meta.filename, "newname.txt");
        assert_eq!(info.meta.content_type, "application/octet-stream");

        let info = svc.modify(&user(), name.as_str(), None, Some("text/x-rust"))?;
        assert_eq!(info.meta.filename, "newname.txt");
        assert_eq!(svc.detail(&user(), name.as_str())?.meta.content_type, "text/x-rust");
        Ok(())
    }

    #[test]
    fn test_expired_item_cannot_be_modified() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let clock = Arc::new(ManualClock::at(100));
        let svc = service(&dir, clock.clone())?;
        let name = upload(&svc, b"abc", ChunkRequest::default().with_lifetime("1", "HOURS"))?;

        clock.advance(3601);
        assert!(matches!(
            svc.modify(&user(), name.as_str(), Some("x"), None),
            Err(ItemError::NotFound)
        ));
        assert!(!svc.storage().contains(name.as_str()));
        Ok(())
    }

    #[test]
    fn test_invalid_names() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let svc = service(&dir, Arc::new(ManualClock::at(100)))?;
        assert_eq!(svc.detail(&user(), "../../etc/passwd").unwrap_err().status(), 400);
        assert_eq!(svc.detail(&user(), "zzzzzzzz").unwrap_err().status(), 404);
        Ok(())
    }

    #[test]
    fn test_limits() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let svc = service(&dir, Arc::new(ManualClock::at(100)))?;
        assert_eq!(svc.limits(), svc.config().limits());
        Ok(())
    }
}
