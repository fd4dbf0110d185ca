//! Domain model for the NoteKeep durability core.
//!
//! # Responsibility
//! - Define canonical data structures shared by the media store and the
//!   import/restore engines.
//! - Define the Bundle wire format exchanged for export/import/backup.
//!
//! # Invariants
//! - Every entity is identified by a stable string id.
//! - Timestamps are Unix epoch milliseconds.

pub mod asset;
pub mod bundle;
pub mod entity;

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable identifier for every persisted object.
///
/// Kept as a string because imported bundles may carry ids minted by other
/// installations; fresh ids are UUIDv4.
pub type EntityId = String;

/// Mints a fresh entity id.
pub fn mint_id() -> EntityId {
    Uuid::new_v4().to_string()
}

/// Current time as Unix epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
