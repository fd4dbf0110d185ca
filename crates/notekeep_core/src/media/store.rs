//! Size-budgeted asset store with reference-aware eviction.
//!
//! # Responsibility
//! - Persist binary assets through a `StorageProvider` under a byte quota.
//! - Run proactive cleanup at the soft watermark and aggressive cleanup
//!   under capacity pressure.
//!
//! # Invariants
//! - An id present in the caller-supplied used set is never evicted,
//!   regardless of age.
//! - A failed `store` leaves the store unmodified: blob and index writes
//!   are rolled back together, no partial asset survives.
//! - Eviction only happens inside cleanup passes (cooperative); removing
//!   the last reference to an asset does not remove the asset.

use crate::media::scanner;
use crate::model::asset::Asset;
use crate::model::{now_ms, EntityId};
use crate::storage::{StorageError, StorageProvider};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

const INDEX_KEY: &str = "media.index";
const BLOB_KEY_PREFIX: &str = "media.asset.";

/// Cleanup threshold as a fraction of the provider quota (80%).
const SOFT_WATERMARK_NUM: u64 = 8;
const SOFT_WATERMARK_DEN: u64 = 10;

/// Retention window applied when a watermark breach triggers cleanup.
pub const DEFAULT_RETENTION_DAYS: u32 = 45;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Result type for media store operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Media store failure.
#[derive(Debug)]
pub enum MediaError {
    /// A write failed for capacity even after cleanup and one retry.
    StorageExhausted { id: EntityId },
    /// Non-capacity provider failure.
    Storage(StorageError),
    /// Persisted asset or index data could not be (de)serialized.
    Codec(serde_json::Error),
}

impl Display for MediaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StorageExhausted { id } => {
                write!(f, "storage exhausted while writing asset {id}")
            }
            Self::Storage(err) => write!(f, "{err}"),
            Self::Codec(err) => write!(f, "asset codec error: {err}"),
        }
    }
}

impl Error for MediaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageExhausted { .. } => None,
            Self::Storage(err) => Some(err),
            Self::Codec(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for MediaError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value)
    }
}

/// Quota usage snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaStats {
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub percentage: f64,
}

/// Per-asset index row kept small so cleanup never loads payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    created_at: i64,
    last_used_at: i64,
    entry_bytes: u64,
}

/// Budgeted binary-asset store over an injected storage provider.
pub struct MediaStore<S: StorageProvider> {
    provider: S,
    index: BTreeMap<EntityId, IndexEntry>,
    /// Used set from the most recent cleanup pass; protects referenced
    /// assets when a watermark breach forces a self-triggered pass.
    known_used: HashSet<EntityId>,
}

impl<S: StorageProvider> MediaStore<S> {
    /// Opens the store over a provider, loading any persisted index.
    pub fn new(provider: S) -> MediaResult<Self> {
        let index = match provider.get_item(INDEX_KEY).map_err(storage_error)? {
            Some(payload) => serde_json::from_str(&payload)?,
            None => BTreeMap::new(),
        };
        Ok(Self {
            provider,
            index,
            known_used: HashSet::new(),
        })
    }

    /// Inserts or overwrites one asset.
    ///
    /// If the estimated serialized total already exceeds the soft watermark
    /// the store runs a normal cleanup pass before writing. If the provider
    /// still reports a capacity overflow, one aggressive cleanup pass runs
    /// and the write is retried exactly once.
    ///
    /// # Errors
    /// - `MediaError::StorageExhausted` when the retried write still does
    ///   not fit; the store is left unmodified.
    pub fn store(&mut self, mut asset: Asset) -> MediaResult<EntityId> {
        if asset.last_used_at < asset.created_at {
            asset.last_used_at = asset.created_at;
        }
        let id = asset.id.clone();
        let payload = serde_json::to_string(&asset)?;
        let blob_key = blob_key(&id);

        if self.estimated_total_bytes() > self.watermark_bytes() {
            info!(
                "event=media_watermark module=media status=cleanup used_bytes={} watermark={}",
                self.estimated_total_bytes(),
                self.watermark_bytes()
            );
            let used = self.known_used.clone();
            self.cleanup_unused(&used, DEFAULT_RETENTION_DAYS)?;
        }

        // Kept for rollback if the index write fails after the blob landed.
        let previous_blob = self.provider.get_item(&blob_key).map_err(storage_error)?;

        match self.provider.set_item(&blob_key, &payload) {
            Ok(()) => {}
            Err(err) if err.is_capacity() => {
                let used = self.known_used.clone();
                self.aggressive_cleanup(&used, DEFAULT_RETENTION_DAYS)?;
                match self.provider.set_item(&blob_key, &payload) {
                    Ok(()) => {}
                    Err(retry_err) if retry_err.is_capacity() => {
                        warn!(
                            "event=media_store_write module=media status=exhausted id={id} size={}",
                            asset.size
                        );
                        return Err(MediaError::StorageExhausted { id });
                    }
                    Err(retry_err) => return Err(MediaError::Storage(retry_err)),
                }
            }
            Err(err) => return Err(MediaError::Storage(err)),
        }

        let mut next_index = self.index.clone();
        next_index.insert(
            id.clone(),
            IndexEntry {
                created_at: asset.created_at,
                last_used_at: asset.last_used_at,
                entry_bytes: payload.len() as u64,
            },
        );
        if let Err(err) = self.persist_index(&next_index) {
            // Undo the blob write so no partial asset survives the failure.
            // A cleanup pass may have evicted the previous entry in the
            // meantime; the current index decides restore vs remove.
            match previous_blob {
                Some(previous) if self.index.contains_key(&id) => {
                    let _ = self.provider.set_item(&blob_key, &previous);
                }
                _ => {
                    let _ = self.provider.remove_item(&blob_key);
                }
            }
            return match err {
                MediaError::Storage(inner) if inner.is_capacity() => {
                    Err(MediaError::StorageExhausted { id })
                }
                other => Err(other),
            };
        }
        self.index = next_index;

        info!(
            "event=media_store_write module=media status=ok id={id} entry_bytes={}",
            payload.len()
        );
        Ok(id)
    }

    /// Looks up one asset, payload included.
    pub fn get_asset(&self, id: &str) -> MediaResult<Option<Asset>> {
        let entry = match self.index.get(id) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let payload = match self.provider.get_item(&blob_key(id)).map_err(storage_error)? {
            Some(payload) => payload,
            None => return Ok(None),
        };
        let mut asset: Asset = serde_json::from_str(&payload)?;
        // The index is authoritative for recency: `touch` only rewrites it.
        asset.last_used_at = entry.last_used_at;
        Ok(Some(asset))
    }

    /// Returns an owned copy of the raw payload (copy-on-read).
    pub fn get_bytes(&self, id: &str) -> MediaResult<Option<Vec<u8>>> {
        Ok(self.get_asset(id)?.map(|asset| asset.bytes))
    }

    /// Records current time as the asset's `last_used_at`.
    ///
    /// Side effect only: a missing id is a silent no-op, and persistence
    /// failures are logged rather than surfaced.
    pub fn touch(&mut self, id: &str) {
        let now = now_ms();
        if let Some(entry) = self.index.get_mut(id) {
            entry.last_used_at = now.max(entry.created_at);
            let snapshot = self.index.clone();
            if let Err(err) = self.persist_index(&snapshot) {
                warn!("event=media_touch module=media status=error id={id} error={err}");
            }
        }
    }

    /// Removes one asset unconditionally.
    ///
    /// Callers are responsible for verifying it is unreferenced.
    pub fn delete(&mut self, id: &str) -> MediaResult<()> {
        if self.index.remove(id).is_none() {
            return Ok(());
        }
        self.provider
            .remove_item(&blob_key(id))
            .map_err(storage_error)?;
        let snapshot = self.index.clone();
        self.persist_index(&snapshot)
    }

    /// Removes every asset not in `used_ids` whose `last_used_at` is older
    /// than the retention window. Returns the number of removed assets.
    ///
    /// An id present in `used_ids` is never removed, regardless of age.
    pub fn cleanup_unused(
        &mut self,
        used_ids: &HashSet<EntityId>,
        retention_days: u32,
    ) -> MediaResult<usize> {
        let cutoff = now_ms() - i64::from(retention_days) * MS_PER_DAY;
        let victims: Vec<EntityId> = self
            .index
            .iter()
            .filter(|(id, entry)| !used_ids.contains(*id) && entry.last_used_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        let removed = self.remove_batch(&victims)?;
        self.known_used = used_ids.clone();
        info!(
            "event=media_cleanup module=media status=ok mode=retention removed={removed} retention_days={retention_days}"
        );
        Ok(removed)
    }

    /// Retention pass plus, while still over the soft watermark, eviction
    /// of the oldest 20% of remaining unused assets by `last_used_at`.
    ///
    /// Never removes an id in `used_ids`; if the used set alone exceeds the
    /// budget the caller's next write will fail with `StorageExhausted`.
    pub fn aggressive_cleanup(
        &mut self,
        used_ids: &HashSet<EntityId>,
        retention_days: u32,
    ) -> MediaResult<usize> {
        let mut removed = self.cleanup_unused(used_ids, retention_days)?;

        if self.estimated_total_bytes() > self.watermark_bytes() {
            let mut evictable: Vec<(EntityId, i64)> = self
                .index
                .iter()
                .filter(|(id, _)| !used_ids.contains(*id))
                .map(|(id, entry)| (id.clone(), entry.last_used_at))
                .collect();
            evictable.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            let take = evictable.len().div_ceil(5);
            let victims: Vec<EntityId> = evictable
                .into_iter()
                .take(take)
                .map(|(id, _)| id)
                .collect();
            removed += self.remove_batch(&victims)?;
        }

        info!(
            "event=media_cleanup module=media status=ok mode=aggressive removed={removed} retention_days={retention_days}"
        );
        Ok(removed)
    }

    /// Quota usage computed from serialized entry sizes versus the provider
    /// quota.
    pub fn stats(&self) -> MediaStats {
        let used_bytes = self.estimated_total_bytes();
        let quota = self.provider.quota_bytes();
        let percentage = if quota == 0 {
            100.0
        } else {
            (used_bytes as f64 / quota as f64) * 100.0
        };
        MediaStats {
            used_bytes,
            available_bytes: quota.saturating_sub(used_bytes),
            percentage,
        }
    }

    /// Bytes the caller can still expect to fit before hitting quota.
    pub fn available_bytes(&self) -> u64 {
        self.stats().available_bytes
    }

    /// Replaces the whole store verbatim. Restore path only.
    pub fn set_all(&mut self, assets: Vec<Asset>) -> MediaResult<()> {
        self.clear()?;
        let mut next_index = BTreeMap::new();
        for asset in assets {
            let payload = serde_json::to_string(&asset)?;
            self.provider
                .set_item(&blob_key(&asset.id), &payload)
                .map_err(|err| exhausted_or_storage(err, &asset.id))?;
            next_index.insert(
                asset.id.clone(),
                IndexEntry {
                    created_at: asset.created_at,
                    last_used_at: asset.last_used_at.max(asset.created_at),
                    entry_bytes: payload.len() as u64,
                },
            );
        }
        self.persist_index(&next_index)?;
        self.index = next_index;
        Ok(())
    }

    /// Removes every asset and the index.
    pub fn clear(&mut self) -> MediaResult<()> {
        let ids: Vec<EntityId> = self.index.keys().cloned().collect();
        for id in &ids {
            self.provider
                .remove_item(&blob_key(id))
                .map_err(storage_error)?;
        }
        self.provider
            .remove_item(INDEX_KEY)
            .map_err(storage_error)?;
        self.index.clear();
        Ok(())
    }

    /// Whether an asset with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Number of stored assets.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the store holds no assets.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All stored asset ids in deterministic order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.index.keys().cloned().collect()
    }

    /// All stored assets, payloads included. Export path.
    pub fn list_assets(&self) -> MediaResult<Vec<Asset>> {
        let mut assets = Vec::with_capacity(self.index.len());
        for id in self.index.keys() {
            if let Some(asset) = self.get_asset(id)? {
                assets.push(asset);
            }
        }
        Ok(assets)
    }

    /// Convenience wrapper: scan a document corpus, then run the retention
    /// cleanup against the resulting used set.
    pub fn cleanup_for_documents<'a, I>(
        &mut self,
        documents: I,
        retention_days: u32,
    ) -> MediaResult<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let used = scanner::scan_used_ids(documents);
        self.cleanup_unused(&used, retention_days)
    }

    fn estimated_total_bytes(&self) -> u64 {
        self.index.values().map(|entry| entry.entry_bytes).sum()
    }

    fn watermark_bytes(&self) -> u64 {
        self.provider.quota_bytes() / SOFT_WATERMARK_DEN * SOFT_WATERMARK_NUM
    }

    fn remove_batch(&mut self, ids: &[EntityId]) -> MediaResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        for id in ids {
            self.provider
                .remove_item(&blob_key(id))
                .map_err(storage_error)?;
            self.index.remove(id);
        }
        let snapshot = self.index.clone();
        self.persist_index(&snapshot)?;
        Ok(ids.len())
    }

    fn persist_index(&mut self, index: &BTreeMap<EntityId, IndexEntry>) -> MediaResult<()> {
        let payload = serde_json::to_string(index)?;
        self.provider
            .set_item(INDEX_KEY, &payload)
            .map_err(MediaError::Storage)
    }
}

fn blob_key(id: &str) -> String {
    format!("{BLOB_KEY_PREFIX}{id}")
}

fn storage_error(err: StorageError) -> MediaError {
    MediaError::Storage(err)
}

fn exhausted_or_storage(err: StorageError, id: &str) -> MediaError {
    if err.is_capacity() {
        MediaError::StorageExhausted { id: id.to_string() }
    } else {
        MediaError::Storage(err)
    }
}

#[cfg(test)]
mod tests {
    use super::{MediaStore, DEFAULT_RETENTION_DAYS, MS_PER_DAY};
    use crate::model::asset::{Asset, AssetKind};
    use crate::model::now_ms;
    use crate::storage::MemoryStorage;
    use std::collections::HashSet;

    fn store_with_quota(quota: u64) -> MediaStore<MemoryStorage> {
        MediaStore::new(MemoryStorage::with_quota(quota)).unwrap()
    }

    fn stale_asset(id: &str, bytes: usize) -> Asset {
        let mut asset = Asset::with_id(id.to_string(), AssetKind::Image, vec![7u8; bytes], "image/png");
        asset.created_at = now_ms() - i64::from(DEFAULT_RETENTION_DAYS + 10) * MS_PER_DAY;
        asset.last_used_at = asset.created_at;
        asset
    }

    #[test]
    fn stored_bytes_round_trip() {
        let mut media = store_with_quota(1024 * 1024);
        let asset = Asset::new(AssetKind::Image, vec![1, 2, 3, 4], "image/png");
        let id = media.store(asset.clone()).unwrap();
        assert_eq!(media.get_bytes(&id).unwrap().unwrap(), asset.bytes);
    }

    #[test]
    fn touch_updates_index_recency() {
        let mut media = store_with_quota(1024 * 1024);
        let id = media.store(stale_asset("old", 8)).unwrap();
        let before = media.get_asset(&id).unwrap().unwrap().last_used_at;
        media.touch(&id);
        let after = media.get_asset(&id).unwrap().unwrap().last_used_at;
        assert!(after > before);
    }

    #[test]
    fn touch_missing_id_is_noop() {
        let mut media = store_with_quota(1024);
        media.touch("absent");
        assert!(media.is_empty());
    }

    #[test]
    fn cleanup_never_removes_used_ids() {
        let mut media = store_with_quota(1024 * 1024);
        media.store(stale_asset("used", 8)).unwrap();
        media.store(stale_asset("unused", 8)).unwrap();

        let used: HashSet<String> = ["used".to_string()].into_iter().collect();
        let removed = media.cleanup_unused(&used, 30).unwrap();
        assert_eq!(removed, 1);
        assert!(media.contains("used"));
        assert!(!media.contains("unused"));
    }

    #[test]
    fn aggressive_cleanup_spares_used_ids_even_over_budget() {
        let mut media = store_with_quota(4096);
        for i in 0..6 {
            media.store(stale_asset(&format!("a{i}"), 40)).unwrap();
        }
        let used: HashSet<String> = (0..6).map(|i| format!("a{i}")).collect();
        media.aggressive_cleanup(&used, 1).unwrap();
        assert_eq!(media.len(), 6);
    }

    #[test]
    fn aggressive_cleanup_evicts_oldest_fifth_of_unused() {
        let mut media = store_with_quota(8000);
        // Fresh assets (inside retention) so only the 20% rule can evict.
        for i in 0..5 {
            let mut asset = Asset::with_id(
                format!("f{i}"),
                AssetKind::Image,
                vec![0u8; 600],
                "image/png",
            );
            asset.last_used_at = asset.created_at + i64::from(i);
            media.store(asset).unwrap();
        }
        let used = HashSet::new();
        media.aggressive_cleanup(&used, DEFAULT_RETENTION_DAYS).unwrap();
        // ceil(5 * 0.2) == 1: the single oldest asset goes.
        assert_eq!(media.len(), 4);
        assert!(!media.contains("f0"));
    }

    #[test]
    fn failed_write_leaves_store_unmodified() {
        let mut media = store_with_quota(600);
        let id = media
            .store(Asset::with_id(
                "keep".to_string(),
                AssetKind::Image,
                vec![1u8; 64],
                "image/png",
            ))
            .unwrap();

        let err = media
            .store(Asset::new(AssetKind::Video, vec![2u8; 4096], "video/mp4"))
            .unwrap_err();
        assert!(matches!(
            err,
            super::MediaError::StorageExhausted { .. }
        ));
        assert_eq!(media.len(), 1);
        assert!(media.get_asset(&id).unwrap().is_some());
    }

    #[test]
    fn stats_reflect_quota_arithmetic() {
        let mut media = store_with_quota(10_000);
        media
            .store(Asset::new(AssetKind::Image, vec![3u8; 100], "image/png"))
            .unwrap();
        let stats = media.stats();
        assert!(stats.used_bytes > 0);
        assert_eq!(stats.available_bytes, 10_000 - stats.used_bytes);
        assert!(stats.percentage > 0.0 && stats.percentage < 100.0);
    }

    #[test]
    fn index_survives_reopen_on_same_provider() {
        let mut media = MediaStore::new(MemoryStorage::with_quota(1024 * 1024)).unwrap();
        media
            .store(Asset::with_id(
                "persisted".to_string(),
                AssetKind::Photo,
                vec![9u8; 16],
                "image/jpeg",
            ))
            .unwrap();

        let reopened = MediaStore::new(media.provider).unwrap();
        assert!(reopened.contains("persisted"));
        assert_eq!(
            reopened.get_bytes("persisted").unwrap().unwrap(),
            vec![9u8; 16]
        );
    }
}
