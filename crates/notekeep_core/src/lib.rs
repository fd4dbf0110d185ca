//! Data-durability core for NoteKeep.
//! This crate is the single source of truth for storage budgets, bundle
//! reconciliation and eviction invariants; UI plumbing lives elsewhere.

pub mod import;
pub mod logging;
pub mod media;
pub mod model;
pub mod repo;
pub mod storage;

pub use import::{
    export_bundle, ImportCounts, ImportEngine, ImportIssue, ImportOptions, ImportReport,
    RestoreEngine, RestoreReport, RestoreWarning,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use media::scanner::{scan_text, scan_used_ids, TextSource};
pub use media::store::{MediaError, MediaResult, MediaStats, MediaStore};
pub use model::asset::{Asset, AssetKind};
pub use model::bundle::{Bundle, BundleError, BundleResult, TemplateBundle, CURRENT_SCHEMA_VERSION};
pub use model::entity::{
    Folder, HistoryEntry, Note, NoteHistory, NoteTemplate, Task, TaskStatus, TaskTemplate,
    Workspace,
};
pub use model::{mint_id, now_ms, EntityId};
pub use repo::{Entity, EntityStore, EntityStores, MemEntityStore, StoreError, StoreResult};
pub use storage::{
    MemoryStorage, SqliteStorage, StorageError, StorageProvider, StorageResult,
    DEFAULT_QUOTA_BYTES,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
