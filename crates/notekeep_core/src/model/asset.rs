//! Binary asset model for the media store.
//!
//! # Responsibility
//! - Define the stored shape of one binary asset plus its usage metadata.
//! - Provide lifecycle helpers for recency tracking.
//!
//! # Invariants
//! - `id` is unique within one media store.
//! - `last_used_at >= created_at` (constructors and `touch` maintain this).
//! - `size` is advisory: it drives quota arithmetic and is never
//!   cryptographically verified against `bytes`.

use crate::model::{mint_id, now_ms, EntityId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Media category of a stored asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    #[default]
    Image,
    Audio,
    Video,
    /// Camera-roll import; rendered like an image but tracked separately.
    Photo,
}

/// Stored binary blob plus metadata, addressed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: EntityId,
    #[serde(default)]
    pub kind: AssetKind,
    /// Raw payload. Callers receive an owned copy on read and must not rely
    /// on in-place mutation being visible to the store.
    #[serde(default)]
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: String,
    /// Advisory byte size used for quota arithmetic.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub last_used_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Playback length in seconds for audio/video assets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Asset {
    /// Creates an asset with a generated id; `size` is derived from the
    /// payload length.
    pub fn new(kind: AssetKind, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::with_id(mint_id(), kind, bytes, mime_type)
    }

    /// Creates an asset with a caller-provided id (import/restore paths).
    pub fn with_id(
        id: EntityId,
        kind: AssetKind,
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        let size = bytes.len() as u64;
        Self {
            id,
            kind,
            bytes,
            mime_type: mime_type.into(),
            filename: String::new(),
            size,
            created_at: now,
            last_used_at: now,
            width: None,
            height: None,
            duration: None,
            metadata: HashMap::new(),
        }
    }

    /// Records a use of this asset right now.
    pub fn touch(&mut self) {
        self.last_used_at = now_ms().max(self.created_at);
    }
}
