//! Offline maintenance of a store: schema migration, purging, consistency checks.
//!
//! These run directly against a [`Storage`] without permission checks; whoever can run
//! them already owns the storage directory. Each operation handles one item so a driver
//! can keep going when a single item fails.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::hash::compute_hash;
use crate::meta::{Meta, MetaKey};
use crate::name::ItemName;
use crate::store::Storage;
use crate::StoreResult;

const DAY: i64 = 24 * 3600;
const MIB: u64 = 1024 * 1024;

/// Expand the `*` wildcard to every stored name; anything else is parsed as given.
pub fn resolve_names(storage: &dyn Storage, args: &[String]) -> StoreResult<Vec<ItemName>> {
    if let [only] = args {
        if only == "*" {
            return storage.names();
        }
    }
    args.iter().map(|a| ItemName::parse(a)).collect()
}

/// What [`migrate`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Migration {
    /// Typed keys that were absent and have been filled in.
    pub filled: Vec<&'static str>,
    /// Legacy keys that were dropped.
    pub dropped: Vec<String>,
}

impl Migration {
    pub fn is_noop(&self) -> bool {
        self.filled.is_empty() && self.dropped.is_empty()
    }
}

/// Bring an item's metadata up to the current schema.
///
/// Absent timestamps become `now`, a legacy `unlocked` flag becomes `locked`, a legacy
/// `timestamp` key is dropped and an absent size is taken from the data.
#[tracing::instrument(skip(storage), fields(item.name = %name))]
pub fn migrate(storage: &dyn Storage, name: &ItemName, now: i64) -> StoreResult<Migration> {
    let mut record = storage.openwrite(name)?;
    let missing = record.missing_keys().to_vec();
    let data_size = record.data().size()?;
    let mut migration = Migration::default();

    let meta = record.meta_mut()?;
    if meta.extra.remove("timestamp").is_some() {
        migration.dropped.push("timestamp".to_string());
    }
    for key in &missing {
        match key {
            MetaKey::TimestampUpload => meta.timestamp_upload = now,
            MetaKey::TimestampDownload => meta.timestamp_download = now,
            MetaKey::Locked => {
                if let Some(unlocked) = meta.extra.remove("unlocked") {
                    migration.dropped.push("unlocked".to_string());
                    meta.locked = !unlocked.as_bool().unwrap_or(true);
                }
            }
            MetaKey::Size => meta.size = data_size,
            // Decoding already filled the rest with their migration defaults.
            _ => {}
        }
        migration.filled.push(key.as_str());
    }

    if !migration.is_noop() {
        record.mark_dirty();
        tracing::info!(filled = ?migration.filled, dropped = ?migration.dropped, "Metadata migrated");
    }
    record.close()?;
    Ok(migration)
}

/// Conditions that must all hold for [`purge`] to remove an item.
///
/// An item only qualifies once its max-life stamp has passed; items kept forever are
/// never purged.
#[derive(Debug, Clone, Default)]
pub struct PurgeCriteria {
    /// Uploaded more than this many days ago.
    pub age_days: Option<i64>,
    /// Last downloaded more than this many days ago.
    pub inactivity_days: Option<i64>,
    /// Larger than this many MiB.
    pub size_mib: Option<u64>,
    /// Content type starts with this prefix.
    pub type_prefix: Option<String>,
    /// Only report, remove nothing.
    pub dry_run: bool,
}

impl PurgeCriteria {
    fn matches(&self, meta: &Meta, now: i64) -> bool {
        if let Some(days) = self.age_days {
            if meta.timestamp_upload >= now.saturating_sub(days.saturating_mul(DAY)) {
                return false;
            }
        }
        if let Some(days) = self.inactivity_days {
            if meta.timestamp_download >= now.saturating_sub(days.saturating_mul(DAY)) {
                return false;
            }
        }
        if let Some(mib) = self.size_mib {
            if meta.size <= mib.saturating_mul(MIB) {
                return false;
            }
        }
        if let Some(prefix) = &self.type_prefix {
            if !meta.content_type.starts_with(prefix.as_str()) {
                return false;
            }
        }
        0 < meta.timestamp_max_life && meta.timestamp_max_life < now
    }
}

/// Outcome of [`purge`] for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeDecision {
    pub name: ItemName,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    /// All criteria held.
    pub purge: bool,
    /// The item was actually removed (false on a dry run).
    pub removed: bool,
}

#[tracing::instrument(skip(storage, criteria), fields(item.name = %name))]
pub fn purge(
    storage: &dyn Storage,
    name: &ItemName,
    criteria: &PurgeCriteria,
    now: i64,
) -> StoreResult<PurgeDecision> {
    let meta = storage.open(name)?.meta().clone();
    let purge = criteria.matches(&meta, now);

    let removed = purge && !criteria.dry_run;
    if removed {
        storage.remove(name)?;
        tracing::info!(item.size = meta.size, "Item purged");
    }

    Ok(PurgeDecision {
        name: name.clone(),
        filename: meta.filename,
        size: meta.size,
        content_type: meta.content_type,
        purge,
        removed,
    })
}

/// What [`consistency`] may change.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyOptions {
    /// Fill an empty hash with the computed one.
    pub compute: bool,
    /// Overwrite size and hash with computed values.
    pub fix: bool,
    /// Remove items that are still inconsistent afterwards.
    pub remove: bool,
}

/// Outcome of [`consistency`] for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub name: ItemName,
    pub meta_size: u64,
    pub data_size: u64,
    pub meta_hash: String,
    pub data_hash: String,
    /// Consistent after any fixes were applied.
    pub size_consistent: bool,
    pub hash_consistent: bool,
    pub size_written: bool,
    pub hash_written: bool,
    pub removed: bool,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.size_consistent && self.hash_consistent
    }
}

/// Compare stored size and hash with the actual data.
#[tracing::instrument(skip(storage), fields(item.name = %name))]
pub fn consistency(
    storage: &dyn Storage,
    name: &ItemName,
    options: ConsistencyOptions,
) -> StoreResult<ConsistencyReport> {
    let mut record = storage.openwrite(name)?;
    let meta_size = record.meta().size;
    let meta_hash = record.meta().hash.clone();
    let data_size = record.data().size()?;
    let data_hash = compute_hash(record.data(), data_size)?.into_inner();

    let mut size_consistent = meta_size == data_size;
    let mut size_written = false;
    if !size_consistent {
        tracing::warn!(meta.size = meta_size, data.size = data_size, "Inconsistent size");
        if options.fix {
            record.meta_mut()?.size = data_size;
            size_consistent = true;
            size_written = true;
        }
    }

    let mut hash_consistent = meta_hash == data_hash;
    let mut hash_written = false;
    if !hash_consistent {
        if meta_hash.is_empty() {
            tracing::info!("Empty hash in metadata");
        } else {
            tracing::warn!(meta.hash = %meta_hash, data.hash = %data_hash, "Inconsistent hash");
        }
        if options.fix || (options.compute && meta_hash.is_empty()) {
            record.meta_mut()?.hash = data_hash.clone();
            hash_consistent = true;
            hash_written = true;
        }
    }
    record.close()?;

    let removed = options.remove && !(size_consistent && hash_consistent);
    if removed {
        tracing::warn!("Removing inconsistent item");
        storage.remove(name)?;
    }

    Ok(ConsistencyReport {
        name: name.clone(),
        meta_size,
        data_size,
        meta_hash,
        data_hash,
        size_consistent,
        hash_consistent,
        size_written,
        hash_written,
        removed,
    })
}

/// Every metadata key of an item, internal ones included, in key order.
pub fn info(storage: &dyn Storage, name: &ItemName) -> StoreResult<Map<String, Value>> {
    Ok(storage.open(name)?.meta().to_map())
}

/// Force the `complete` and/or `locked` flags.
#[tracing::instrument(skip(storage), fields(item.name = %name))]
pub fn set_flags(
    storage: &dyn Storage,
    name: &ItemName,
    complete: Option<bool>,
    locked: Option<bool>,
) -> StoreResult<Meta> {
    let mut record = storage.openwrite(name)?;
    let meta = record.meta_mut()?;
    if let Some(complete) = complete {
        meta.complete = complete;
    }
    if let Some(locked) = locked {
        meta.locked = locked;
    }
    let meta = meta.clone();
    record.close()?;
    Ok(meta)
}
