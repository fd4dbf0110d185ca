//! Key-value storage providers consumed by the media store.
//!
//! # Responsibility
//! - Define the provider contract with a typed capacity signal.
//! - Provide the in-memory quota-enforcing implementation.
//!
//! # Invariants
//! - Capacity overflow is always surfaced as `StorageError::CapacityExceeded`,
//!   never as a backend-specific failure.
//! - `set_item` is atomic per key: a failed write leaves the previous value.
//! - Quota accounting counts key and value bytes.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite;

pub use sqlite::SqliteStorage;

/// Default quota used when a caller does not specify one (5 MiB, matching
/// the browser-storage ceiling the original data set was sized against).
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Result type for storage provider operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Provider-level failure.
#[derive(Debug)]
pub enum StorageError {
    /// The write would exceed the provider's byte quota.
    CapacityExceeded { requested: u64, available: u64 },
    /// Any other backend failure (I/O, corruption, SQL).
    Backend(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapacityExceeded {
                requested,
                available,
            } => write!(
                f,
                "storage capacity exceeded: requested {requested} bytes, {available} available"
            ),
            Self::Backend(message) => write!(f, "storage backend error: {message}"),
        }
    }
}

impl Error for StorageError {}

impl StorageError {
    /// Whether this failure is the typed capacity signal.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}

/// Contract every media-store backend implements.
///
/// The core assumes only a byte-quota ceiling and a typed overflow result;
/// it never depends on a specific runtime's exception taxonomy.
pub trait StorageProvider {
    /// Returns the stored value for `key`, if any.
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    /// - `StorageError::CapacityExceeded` when the write would push total
    ///   stored bytes past `quota_bytes()`. The previous value (if any)
    ///   remains intact.
    fn set_item(&mut self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is a no-op.
    fn remove_item(&mut self, key: &str) -> StorageResult<()>;

    /// Platform storage ceiling in bytes.
    fn quota_bytes(&self) -> u64;

    /// All currently stored keys, unordered guarantees beyond determinism.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// In-memory provider with quota enforcement.
///
/// Default session store and the primary test double for capacity behavior.
pub struct MemoryStorage {
    items: BTreeMap<String, String>,
    quota_bytes: u64,
}

impl MemoryStorage {
    /// Creates a provider with the default 5 MiB quota.
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }

    /// Creates a provider with an explicit quota.
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            items: BTreeMap::new(),
            quota_bytes,
        }
    }

    fn used_bytes(&self) -> u64 {
        self.items
            .iter()
            .map(|(key, value)| (key.len() + value.len()) as u64)
            .sum()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageProvider for MemoryStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> StorageResult<()> {
        let previous_len = self.items.get(key).map_or(0, |value| value.len()) as u64;
        let used = self.used_bytes();
        let incoming = (key.len() + value.len()) as u64;
        // Replacing a key frees its old value within the same write.
        let projected = used - previous_len.min(used) + incoming;
        if projected > self.quota_bytes {
            return Err(StorageError::CapacityExceeded {
                requested: incoming,
                available: self.quota_bytes.saturating_sub(used - previous_len.min(used)),
            });
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> StorageResult<()> {
        self.items.remove(key);
        Ok(())
    }

    fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.items.keys().cloned().collect())
    }
}
