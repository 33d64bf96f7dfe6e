//! Chunked-upload content store.
//!
//! Items are arbitrary blobs addressed by short random names. Each one is stored as a
//! data file plus a metadata file, uploaded in one or more chunks, hashed for integrity
//! and removed lazily once its lifetime is over.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use blobstore::{AllowAll, BlobService, ChunkRequest, Disposition, StoreConfig};
//! use std::io::Read;
//!
//! // Reads BLOBSTORE_DIR and friends
//! let service = BlobService::open(StoreConfig::from_env().unwrap()).unwrap();
//!
//! // First chunk: no transaction id yet
//! let first = service
//!     .upload_chunk(&AllowAll, &ChunkRequest::range(0, 4, 10), b"hello")
//!     .unwrap();
//!
//! // Later chunks present the token from the previous response
//! let request = ChunkRequest::range(5, 9, 10).with_token(first.token());
//! let done = service.upload_chunk(&AllowAll, &request, b"world").unwrap();
//!
//! let mut body = String::new();
//! service
//!     .download(&AllowAll, done.name().as_str(), None, Disposition::Attachment)
//!     .unwrap()
//!     .read_to_string(&mut body)
//!     .unwrap();
//! assert_eq!(body, "helloworld");
//! ```
//!
//! # Configuration
//!
//! See [`config`] for the environment variables and the `[storage]` TOML section.

pub mod clock;
pub mod config;
pub mod error;
pub mod expiry;
pub mod hash;
pub mod hashtask;
pub mod maintenance;
pub mod meta;
pub mod name;
pub mod permission;
pub mod range;
pub mod record;
pub mod service;
pub mod store;
pub mod upload;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Limits, StoreConfig};
pub use error::{ItemError, ItemResult, StoreError, StoreResult};
pub use expiry::{ExpiryPolicy, LifeUnit, Lifetime};
pub use hash::{ContentHash, HashError, StreamingHasher};
pub use hashtask::{BackgroundHasher, HashOutcome, HashTask};
pub use meta::{Meta, MetaKey, FOREVER};
pub use name::{ItemName, NameAllocator, NameError};
pub use permission::{AllowAll, Capability, PermissionSet, Permissions};
pub use range::{ContentRange, DownloadRange, RangeError};
pub use record::{AccessMode, Data, Record};
pub use service::{BlobService, Disposition, Download, ItemInfo};
pub use store::{FileStore, Storage};
pub use upload::{ChunkRequest, UploadOutcome};
