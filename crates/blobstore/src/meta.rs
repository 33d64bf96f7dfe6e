//! Item metadata: a fixed set of typed fields plus a side map for anything else.
//!
//! Stored as a JSON object next to the data file, using the wire key names
//! (`filename`, `type`, `size`, `complete`, `locked`, `hash`, `timestamp-upload`,
//! `timestamp-download`, `timestamp-max-life`). Unknown keys survive a load/save cycle
//! through [`Meta::extra`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// `timestamp-max-life` value meaning "never expires".
pub const FOREVER: i64 = -1;

/// Content type used when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Metadata of one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meta {
    pub filename: String,

    #[serde(rename = "type")]
    pub content_type: String,

    /// Final data size; only meaningful once `complete` is set.
    pub size: u64,

    pub complete: bool,

    pub locked: bool,

    /// Hex digest, empty until computed.
    pub hash: String,

    #[serde(rename = "timestamp-upload")]
    pub timestamp_upload: i64,

    /// Last time the item was read in full.
    #[serde(rename = "timestamp-download")]
    pub timestamp_download: i64,

    /// Absolute expiry (epoch seconds) or [`FOREVER`].
    #[serde(rename = "timestamp-max-life")]
    pub timestamp_max_life: i64,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for Meta {
    /// State of a freshly created, still empty record.
    fn default() -> Self {
        Self {
            filename: String::new(),
            content_type: OCTET_STREAM.to_string(),
            size: 0,
            complete: false,
            locked: false,
            hash: String::new(),
            timestamp_upload: 0,
            timestamp_download: 0,
            timestamp_max_life: FOREVER,
            extra: BTreeMap::new(),
        }
    }
}

/// The typed metadata keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKey {
    Filename,
    Type,
    Size,
    Complete,
    Locked,
    Hash,
    TimestampUpload,
    TimestampDownload,
    TimestampMaxLife,
}

impl MetaKey {
    pub const ALL: [MetaKey; 9] = [
        MetaKey::Filename,
        MetaKey::Type,
        MetaKey::Size,
        MetaKey::Complete,
        MetaKey::Locked,
        MetaKey::Hash,
        MetaKey::TimestampUpload,
        MetaKey::TimestampDownload,
        MetaKey::TimestampMaxLife,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetaKey::Filename => "filename",
            MetaKey::Type => "type",
            MetaKey::Size => "size",
            MetaKey::Complete => "complete",
            MetaKey::Locked => "locked",
            MetaKey::Hash => "hash",
            MetaKey::TimestampUpload => "timestamp-upload",
            MetaKey::TimestampDownload => "timestamp-download",
            MetaKey::TimestampMaxLife => "timestamp-max-life",
        }
    }
}

impl std::fmt::Display for MetaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk shape: every typed key may be absent in records written by older versions.
#[derive(Debug, Default, Deserialize)]
struct StoredMeta {
    filename: Option<String>,
    #[serde(rename = "type")]
    content_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: Option<u64>,
    complete: Option<bool>,
    locked: Option<bool>,
    hash: Option<String>,
    #[serde(rename = "timestamp-upload", default, deserialize_with = "lenient_i64")]
    timestamp_upload: Option<i64>,
    #[serde(rename = "timestamp-download", default, deserialize_with = "lenient_i64")]
    timestamp_download: Option<i64>,
    #[serde(rename = "timestamp-max-life", default, deserialize_with = "lenient_i64")]
    timestamp_max_life: Option<i64>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

// Older writers stored fractional epoch seconds.
fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<f64>::deserialize(d)?;
    Ok(value.map(|v| v as i64))
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<f64>::deserialize(d)?;
    Ok(value.map(|v| v.max(0.0) as u64))
}

/// Parsed metadata together with the typed keys the stored blob did not carry.
#[derive(Debug, Clone)]
pub struct LoadedMeta {
    pub meta: Meta,
    pub missing: Vec<MetaKey>,
}

impl Meta {
    /// Decode a stored blob. An empty blob yields defaults with every key missing.
    ///
    /// Missing keys are filled the way a record from an older writer is interpreted:
    /// complete, unlocked, never expiring, named `missing`.
    pub fn decode(bytes: &[u8]) -> Result<LoadedMeta, serde_json::Error> {
        let stored: StoredMeta = if bytes.iter().all(u8::is_ascii_whitespace) {
            StoredMeta::default()
        } else {
            serde_json::from_slice(bytes)?
        };

        let mut missing = Vec::new();
        let mut take = |present: bool, key: MetaKey| {
            if !present {
                missing.push(key);
            }
        };
        take(stored.filename.is_some(), MetaKey::Filename);
        take(stored.content_type.is_some(), MetaKey::Type);
        take(stored.size.is_some(), MetaKey::Size);
        take(stored.complete.is_some(), MetaKey::Complete);
        take(stored.locked.is_some(), MetaKey::Locked);
        take(stored.hash.is_some(), MetaKey::Hash);
        take(stored.timestamp_upload.is_some(), MetaKey::TimestampUpload);
        take(stored.timestamp_download.is_some(), MetaKey::TimestampDownload);
        take(stored.timestamp_max_life.is_some(), MetaKey::TimestampMaxLife);

        let meta = Meta {
            filename: stored.filename.unwrap_or_else(|| "missing".to_string()),
            content_type: stored
                .content_type
                .unwrap_or_else(|| OCTET_STREAM.to_string()),
            size: stored.size.unwrap_or(0),
            complete: stored.complete.unwrap_or(true),
            locked: stored.locked.unwrap_or(false),
            hash: stored.hash.unwrap_or_default(),
            timestamp_upload: stored.timestamp_upload.unwrap_or(0),
            timestamp_download: stored.timestamp_download.unwrap_or(0),
            timestamp_max_life: stored.timestamp_max_life.unwrap_or(FOREVER),
            extra: stored.extra,
        };

        Ok(LoadedMeta { meta, missing })
    }

    /// Serialize the whole map; records are always rewritten in full.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// True if the item has an expiry stamp (i.e. is not kept forever).
    pub fn expires(&self) -> bool {
        self.timestamp_max_life > 0
    }

    /// All keys as a JSON object, including internal ones.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Keys suitable for API responses: internal extras (prefixed with `_`) are dropped.
    pub fn public(&self) -> Map<String, Value> {
        let mut map = self.to_map();
        map.retain(|key, _| !key.starts_with('_'));
        map
    }
}
