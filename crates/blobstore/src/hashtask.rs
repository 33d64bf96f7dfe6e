//! Background hash recomputation for uploads that arrived in several chunks.
//!
//! A chunked upload is written by independent requests, so no single pass sees every
//! byte. Once such an upload completes, a [`HashTask`] re-reads the stored data and fills
//! in `hash`. Until then readers see an empty hash.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::hash::{compute_hash, ContentHash};
use crate::name::ItemName;
use crate::store::Storage;
use crate::StoreResult;

/// How a background hash run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashOutcome {
    /// Hash computed and written to the item's metadata.
    Stored(ContentHash),
    /// The item was removed before the hash could be written back.
    Removed,
    /// Anything else; the item keeps its empty hash.
    Failed(String),
}

/// Handle to a running hash computation.
///
/// Dropping the handle detaches the task; it still runs to completion.
#[derive(Debug)]
pub struct HashTask {
    name: ItemName,
    handle: JoinHandle<HashOutcome>,
}

impl HashTask {
    pub fn name(&self) -> &ItemName {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the task is done.
    pub fn wait(self) -> HashOutcome {
        match self.handle.join() {
            Ok(outcome) => outcome,
            Err(_) => HashOutcome::Failed("hash task panicked".to_string()),
        }
    }
}

/// Spawns [`HashTask`]s against a shared storage.
#[derive(Clone)]
pub struct BackgroundHasher {
    storage: Arc<dyn Storage>,
}

impl BackgroundHasher {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Start recomputing the hash of `name`.
    ///
    /// Returns `None` if no thread could be started; the item then simply keeps an empty
    /// hash until a consistency run computes it.
    pub fn spawn(&self, name: ItemName) -> Option<HashTask> {
        let storage = Arc::clone(&self.storage);
        let task_name = name.clone();
        let spawned = thread::Builder::new()
            .name(format!("hash-{}", name))
            .spawn(move || run(storage.as_ref(), &task_name));

        match spawned {
            Ok(handle) => {
                tracing::debug!(item.name = %name, "Hash task started");
                Some(HashTask { name, handle })
            }
            Err(e) => {
                tracing::error!(item.name = %name, error = %e, "Could not start hash task");
                None
            }
        }
    }
}

fn run(storage: &dyn Storage, name: &ItemName) -> HashOutcome {
    match recompute_hash(storage, name) {
        Ok(hash) => {
            tracing::info!(item.name = %name, item.hash = %hash, "Hash computed");
            HashOutcome::Stored(hash)
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!(item.name = %name, "Item removed before its hash was stored");
            HashOutcome::Removed
        }
        Err(e) => {
            tracing::error!(item.name = %name, error = %e, "Background hash failed");
            HashOutcome::Failed(e.to_string())
        }
    }
}

/// Re-read the item's data and store its hash in the metadata.
pub fn recompute_hash(storage: &dyn Storage, name: &ItemName) -> StoreResult<ContentHash> {
    let mut record = storage.openwrite(name)?;
    let size = record.meta().size;
    let hash = compute_hash(record.data(), size)?;
    record.meta_mut()?.hash = hash.to_string();
    record.close()?;
    Ok(hash)
}
