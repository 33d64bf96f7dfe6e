//! Error types for the storage layer and the item operations built on top of it.

use thiserror::Error;

/// Errors raised by a [`Storage`](crate::store::Storage) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("item already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid item name: {0:?}")]
    InvalidName(String),

    #[error("storage is in read-only mode")]
    ReadOnly,

    /// One half of a record was missing or could not be removed.
    ///
    /// The other half has been removed on a best-effort basis.
    #[error("partial removal of {name}: {missing} could not be removed")]
    PartialRemove { name: String, missing: &'static str },

    #[error("corrupt metadata for {name}: {message}")]
    CorruptMeta { name: String, message: String },

    #[error("record was opened read-only")]
    NotWritable,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    /// True for errors that mean "there is nothing stored under this name".
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound(_) => true,
            StoreError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of an item operation that did not succeed.
///
/// Each variant is one class of failure; [`ItemError::status`] gives its HTTP status.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("missing permissions")]
    Forbidden,

    #[error("item not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("size {size} exceeds the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("requested range not satisfiable")]
    RangeNotSatisfiable,

    #[error(transparent)]
    Name(#[from] crate::name::NameError),

    #[error(transparent)]
    Storage(StoreError),
}

impl ItemError {
    /// HTTP status code a front end should answer with.
    pub fn status(&self) -> u16 {
        match self {
            ItemError::BadRequest(_) => 400,
            ItemError::Forbidden => 403,
            ItemError::NotFound => 404,
            ItemError::Conflict(_) => 409,
            ItemError::TooLarge { .. } => 413,
            ItemError::RangeNotSatisfiable => 416,
            ItemError::Name(_) | ItemError::Storage(_) => 500,
        }
    }
}

impl From<StoreError> for ItemError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ItemError::NotFound,
            StoreError::InvalidName(name) => {
                ItemError::BadRequest(format!("invalid item name: {name:?}"))
            }
            other if other.is_not_found() => ItemError::NotFound,
            other => ItemError::Storage(other),
        }
    }
}

impl From<crate::range::RangeError> for ItemError {
    fn from(e: crate::range::RangeError) -> Self {
        ItemError::BadRequest(e.to_string())
    }
}

pub type ItemResult<T> = std::result::Result<T, ItemError>;
