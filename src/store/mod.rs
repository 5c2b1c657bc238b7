//! Object-store abstraction over the archive.
//!
//! The client only needs four primitives from wherever cycles live: whole
//! object reads (indices), byte-range reads (single field messages out of a
//! cycle's data object), existence checks (availability) and writes
//! (publishing and mirroring). [`ObjectStore`] captures exactly that.
//!
//! Two implementations ship with the crate:
//!
//! - [`LocalStore`]: a directory tree mirroring the archive's key layout.
//! - [`MemoryStore`]: an in-process map, useful for tests and embedding.
//!
//! Keys are `/`-separated relative paths. Implementations must be safe to
//! call from several worker threads at once.

pub mod local;
pub mod memory;


pub use local::LocalStore;
pub use memory::MemoryStore;

use std::io;
use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;

/// Errors returned by [`ObjectStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object exists under the key.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The requested byte range does not lie within the object.
    #[error("range {start}..{end} out of bounds for {key} ({len} bytes)")]
    RangeOutOfBounds {
        /// Object key.
        key: String,
        /// Requested start offset.
        start: u64,
        /// Requested end offset (exclusive).
        end: u64,
        /// Actual object length.
        len: u64,
    },

    /// The key is empty, absolute, or escapes the store root.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal invariant violation (poisoned lock, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Read/write access to archive objects.
pub trait ObjectStore: Send + Sync {
    /// Reads a whole object.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Reads `range` (half-open) of an object.
    fn get_range(&self, key: &str, range: Range<u64>) -> Result<Vec<u8>, StoreError>;

    /// Returns whether an object exists under `key`.
    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Stores `bytes` under `key`, replacing any previous object. Readers
    /// never observe a partially written object.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).get(key)
    }

    fn get_range(&self, key: &str, range: Range<u64>) -> Result<Vec<u8>, StoreError> {
        (**self).get_range(key, range)
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        (**self).exists(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, bytes)
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).get(key)
    }

    fn get_range(&self, key: &str, range: Range<u64>) -> Result<Vec<u8>, StoreError> {
        (**self).get_range(key, range)
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        (**self).exists(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, bytes)
    }
}

/// Validates that `range` lies within an object of `len` bytes.
pub(crate) fn check_range(key: &str, range: &Range<u64>, len: u64) -> Result<(), StoreError> {
    if range.start > range.end || range.end > len {
        return Err(StoreError::RangeOutOfBounds {
            key: key.to_string(),
            start: range.start,
            end: range.end,
            len,
        });
    }
    Ok(())
}

/// Rejects keys that are empty, absolute, or contain `.`/`..` segments.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad_segment = key
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if key.is_empty() || bad_segment || key.contains('\\') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
