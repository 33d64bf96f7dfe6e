//! Resumable chunked uploads.
//!
//! The first chunk (no transaction id) allocates a name and creates an incomplete record.
//! Every later chunk presents the transaction id handed out with the first response and
//! must start exactly where the stored data ends. The chunk whose range reaches the
//! declared total completes the item.
//!
//! All validation happens before the first byte is written. A failure after that leaves
//! the record incomplete; it can be aborted or left to expire.

use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::error::{ItemError, ItemResult};
use crate::expiry::Lifetime;
use crate::hash::{ContentHash, StreamingHasher};
use crate::hashtask::{BackgroundHasher, HashTask};
use crate::meta::{Meta, OCTET_STREAM};
use crate::name::{ItemName, NameAllocator};
use crate::range::ContentRange;
use crate::record::Record;
use crate::store::Storage;

/// Copy buffer size for single-pass uploads.
pub const COPY_WINDOW: usize = 16 * 1024;

/// Longest filename kept after filtering.
pub const MAX_FILENAME_LENGTH: usize = 250;

/// Longest content type kept after filtering.
pub const MAX_TYPE_LENGTH: usize = 50;

/// Transaction id for an upload in progress: the item name, base64 encoded.
pub fn encode_token(name: &ItemName) -> String {
    STANDARD.encode(name.as_str())
}

/// Recover the item name from a transaction id.
pub fn decode_token(token: &str) -> ItemResult<ItemName> {
    let invalid = || ItemError::BadRequest("invalid transaction id".to_string());
    let bytes = STANDARD.decode(token.trim()).map_err(|_| invalid())?;
    let name = String::from_utf8(bytes).map_err(|_| invalid())?;
    ItemName::parse(&name).map_err(|_| invalid())
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Clean a client-supplied filename, or make one up from the item name and type.
pub fn filter_filename(
    filename: Option<&str>,
    storage_name: &ItemName,
    content_type: Option<&str>,
    type_hint: &str,
) -> String {
    let made_up;
    let filename = match non_empty(filename) {
        Some(f) => f,
        None => {
            let content_type = non_empty(content_type).unwrap_or(type_hint);
            let ext = if content_type.starts_with("text/") {
                ".txt"
            } else {
                ".bin"
            };
            made_up = format!("{}{}", storage_name, ext);
            &made_up
        }
    };

    filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || " *+:;.,_-".contains(*c))
        .take(MAX_FILENAME_LENGTH)
        .collect()
}

/// Clean a client-supplied content type, guessing from the filename when absent.
pub fn filter_type(content_type: Option<&str>, type_hint: &str, filename: Option<&str>) -> String {
    let content_type = non_empty(content_type).or_else(|| non_empty(filename).and_then(guess_type));
    match content_type {
        Some(ct) => ct
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || "/+.-".contains(*c))
            .take(MAX_TYPE_LENGTH)
            .collect(),
        None => type_hint.to_string(),
    }
}

/// Content type for a filename extension, if it is a common one.
pub fn guess_type(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    let guessed = match ext.to_ascii_lowercase().as_str() {
        "txt" | "log" | "text" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "text/javascript",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "c" | "h" => "text/x-c",
        "json" => "application/json",
        "xml" => "application/xml",
        "sh" => "application/x-sh",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/x-wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => return None,
    };
    Some(guessed)
}

/// Headers of one upload request, as received.
#[derive(Debug, Clone, Default)]
pub struct ChunkRequest {
    /// `Content-Range: bytes <begin>-<end>/<total>`, required on every chunk.
    pub content_range: Option<String>,
    /// Declared final size; required on the first chunk.
    pub content_length: Option<String>,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    /// Absent on the first chunk, required afterwards.
    pub transaction_id: Option<String>,
    pub maxlife_value: Option<String>,
    pub maxlife_unit: Option<String>,
}

impl ChunkRequest {
    /// A chunk covering `begin..=end` of a `total` byte upload.
    pub fn range(begin: u64, end: u64, total: u64) -> Self {
        Self {
            content_range: Some(ContentRange { begin, end, total }.to_string()),
            content_length: Some(total.to_string()),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.transaction_id = Some(token.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_lifetime(mut self, value: impl Into<String>, unit: impl Into<String>) -> Self {
        self.maxlife_value = Some(value.into());
        self.maxlife_unit = Some(unit.into());
        self
    }
}

/// Result of an accepted chunk.
#[derive(Debug)]
pub enum UploadOutcome {
    /// More chunks expected; the client continues with `token`.
    InProgress { name: ItemName, token: String },
    /// The item is complete.
    ///
    /// `hash` is set when the whole upload arrived in one chunk. Otherwise `hash_task`
    /// fills the hash in the background.
    Complete {
        name: ItemName,
        token: String,
        hash: Option<ContentHash>,
        hash_task: Option<HashTask>,
    },
}

impl UploadOutcome {
    pub fn name(&self) -> &ItemName {
        match self {
            Self::InProgress { name, .. } | Self::Complete { name, .. } => name,
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Self::InProgress { token, .. } | Self::Complete { token, .. } => token,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    /// HTTP status a front end answers with: 200 while receiving, 201 once complete.
    pub fn status(&self) -> u16 {
        if self.is_complete() {
            201
        } else {
            200
        }
    }
}

/// Runs upload transitions against one storage.
pub struct Uploader<'a> {
    storage: &'a dyn Storage,
    clock: &'a dyn Clock,
    names: &'a NameAllocator,
    hasher: &'a BackgroundHasher,
    config: &'a StoreConfig,
}

impl<'a> Uploader<'a> {
    pub fn new(
        storage: &'a dyn Storage,
        clock: &'a dyn Clock,
        names: &'a NameAllocator,
        hasher: &'a BackgroundHasher,
        config: &'a StoreConfig,
    ) -> Self {
        Self {
            storage,
            clock,
            names,
            hasher,
            config,
        }
    }

    fn check_size(&self, size: u64) -> ItemResult<()> {
        let limit = self.config.max_allowed_file_size;
        if size > limit {
            return Err(ItemError::TooLarge { size, limit });
        }
        Ok(())
    }

    fn declared_size(raw: Option<&str>) -> ItemResult<Option<u64>> {
        match non_empty(raw) {
            Some(s) => s
                .parse()
                .map(Some)
                .map_err(|_| ItemError::BadRequest("Size is incorrect".to_string())),
            None => Ok(None),
        }
    }

    /// Accept one chunk of an upload.
    #[tracing::instrument(skip_all, fields(upload.range = ?request.content_range))]
    pub fn chunk(&self, request: &ChunkRequest, body: &[u8]) -> ItemResult<UploadOutcome> {
        let range = match non_empty(request.content_range.as_deref()) {
            Some(raw) => ContentRange::parse(raw)?,
            None => {
                return Err(ItemError::BadRequest(
                    "Content-Range not specified".to_string(),
                ))
            }
        };
        self.check_size(range.total)?;

        let body_len = body.len() as u64;
        if body_len > self.config.max_body_size {
            return Err(ItemError::TooLarge {
                size: body_len,
                limit: self.config.max_body_size,
            });
        }
        if body_len != range.size() {
            return Err(ItemError::BadRequest(format!(
                "body has {} bytes but Content-Range covers {}",
                body_len,
                range.size()
            )));
        }

        let declared = Self::declared_size(request.content_length.as_deref())?;
        if let Some(size) = declared {
            self.check_size(size)?;
        }

        let (record, single_pass) = match non_empty(request.transaction_id.as_deref()) {
            None => {
                let size = declared.ok_or_else(|| {
                    ItemError::BadRequest("Content-Length not specified".to_string())
                })?;
                if range.begin != 0 {
                    return Err(ItemError::Conflict(
                        "Content-Range inconsistent. Last byte on Server: 0".to_string(),
                    ));
                }
                (self.start(request, size)?, true)
            }
            Some(token) => (self.resume(token)?, false),
        };

        let current = record.data().size()?;
        self.check_size(current)?;
        if range.begin != current {
            return Err(ItemError::Conflict(format!(
                "Content-Range inconsistent. Last byte on Server: {}",
                current
            )));
        }

        self.append(record, &range, body, single_pass)
    }

    /// `NEW -> RECEIVING`: allocate a name and create an empty, incomplete record.
    fn start(&self, request: &ChunkRequest, declared: u64) -> ItemResult<Record> {
        let lifetime = Lifetime::from_parts(
            request.maxlife_value.as_deref(),
            request.maxlife_unit.as_deref(),
        )
        .map_err(ItemError::BadRequest)?;

        let name = self.names.allocate(|n| self.storage.contains(n))?;
        let mut record = self.storage.create(&name, declared)?;
        *record.meta_mut()? = self.new_meta(
            &name,
            request.filename.as_deref(),
            request.content_type.as_deref(),
            lifetime,
        );
        tracing::info!(item.name = %name, upload.declared = declared, "Upload started");
        Ok(record)
    }

    /// Continue `RECEIVING`: reopen the record named by the token.
    fn resume(&self, token: &str) -> ItemResult<Record> {
        let name = decode_token(token)?;
        let record = self.storage.openwrite(&name).map_err(|e| {
            if e.is_not_found() {
                ItemError::BadRequest("unknown transaction id".to_string())
            } else {
                ItemError::from(e)
            }
        })?;
        if record.meta().complete {
            return Err(ItemError::Conflict("upload already complete".to_string()));
        }
        Ok(record)
    }

    fn new_meta(
        &self,
        name: &ItemName,
        filename: Option<&str>,
        content_type: Option<&str>,
        lifetime: Lifetime,
    ) -> Meta {
        let now = self.clock.now();
        Meta {
            filename: filter_filename(filename, name, content_type, OCTET_STREAM),
            content_type: filter_type(content_type, OCTET_STREAM, filename),
            size: 0,
            complete: false,
            locked: self.config.upload_locked,
            hash: String::new(),
            timestamp_upload: now,
            timestamp_download: 0,
            timestamp_max_life: lifetime.max_life_stamp(now),
            ..Meta::default()
        }
    }

    fn append(
        &self,
        mut record: Record,
        range: &ContentRange,
        body: &[u8],
        single_pass: bool,
    ) -> ItemResult<UploadOutcome> {
        record.data().write(body, range.begin)?;
        let name = record.name().clone();
        let token = encode_token(&name);
        tracing::debug!(item.name = %name, upload.offset = range.begin, upload.len = body.len(), "Chunk written");

        if !range.is_complete() {
            record.close()?;
            return Ok(UploadOutcome::InProgress { name, token });
        }

        // A first chunk that is also the last one saw every byte.
        let hash = single_pass.then(|| ContentHash::from_data(body));
        let size = record.data().size()?;
        {
            let meta = record.meta_mut()?;
            meta.size = size;
            meta.complete = true;
            meta.hash = hash.as_ref().map(ToString::to_string).unwrap_or_default();
        }
        record.close()?;
        tracing::info!(item.name = %name, item.size = size, "Upload complete");

        let hash_task = match hash {
            Some(_) => None,
            None => self.hasher.spawn(name.clone()),
        };
        Ok(UploadOutcome::Complete {
            name,
            token,
            hash,
            hash_task,
        })
    }

    /// `NEW/RECEIVING -> ABORTED`: delete an upload that has not completed.
    #[tracing::instrument(skip(self))]
    pub fn abort(&self, token: &str) -> ItemResult<ItemName> {
        let name = decode_token(token)?;
        let record = self.storage.open(&name).map_err(|e| {
            if e.is_not_found() {
                ItemError::BadRequest("unknown transaction id".to_string())
            } else {
                ItemError::from(e)
            }
        })?;
        if record.meta().complete {
            return Err(ItemError::Conflict(
                "upload already complete, cannot abort".to_string(),
            ));
        }
        drop(record);

        self.storage.remove(&name)?;
        tracing::info!(item.name = %name, "Upload aborted");
        Ok(name)
    }

    /// Store `size` bytes from `reader` as a complete item in one pass.
    #[tracing::instrument(skip(self, reader, lifetime))]
    pub fn create_item(
        &self,
        reader: &mut dyn Read,
        size: u64,
        filename: Option<&str>,
        content_type: Option<&str>,
        lifetime: Lifetime,
    ) -> ItemResult<ItemName> {
        self.check_size(size)?;

        let name = self.names.allocate(|n| self.storage.contains(n))?;
        let mut record = self.storage.create(&name, size)?;
        let mut meta = self.new_meta(&name, filename, content_type, lifetime);
        let hash = copy_into(&record, reader, size)?;

        meta.size = record.data().size()?;
        meta.complete = true;
        meta.hash = hash.to_string();
        *record.meta_mut()? = meta;
        record.close()?;

        tracing::info!(item.name = %name, item.size = size, "Item created");
        Ok(name)
    }
}

/// Copy exactly `size` bytes into the record's data, hashing as they pass.
fn copy_into(record: &Record, reader: &mut dyn Read, size: u64) -> ItemResult<ContentHash> {
    let mut hasher = StreamingHasher::new();
    let mut buf = vec![0u8; COPY_WINDOW];
    let mut remaining = size;

    while remaining > 0 {
        let want = remaining.min(COPY_WINDOW as u64) as usize;
        let n = reader
            .read(&mut buf[..want])
            .map_err(|e| ItemError::Storage(e.into()))?;
        if n == 0 {
            return Err(ItemError::BadRequest(format!(
                "body ended after {} of {} bytes",
                hasher.bytes(),
                size
            )));
        }
        record.data().write(&buf[..n], hasher.bytes())?;
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(hasher.finish())
}
