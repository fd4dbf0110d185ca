//! Bundle import/merge and full-restore engines.
//!
//! # Responsibility
//! - Reconcile an externally supplied bundle into the live stores with id
//!   remapping and ordering-dependent insertion.
//! - Provide the destructive full-replace restore path.
//!
//! # Invariants
//! - Per-item failures accumulate into the report; only a bundle that fails
//!   to parse aborts a run.
//! - Both engines are at-least-once and non-transactional: an interrupted
//!   run leaves already-committed entities in place.

use crate::media::store::{MediaResult, MediaStore};
use crate::model::bundle::Bundle;
use crate::model::EntityId;
use crate::repo::EntityStores;
use crate::storage::StorageProvider;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod engine;
pub mod restore;

/// Caller-selected merge behavior for one import run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Keep existing entities when the bundle carries the same id.
    pub skip_duplicates: bool,
    /// Merge bundle workspaces into existing ones by case-insensitive name.
    pub merge_workspaces: bool,
}

/// One non-fatal failure recorded during an import run.
#[derive(Debug)]
pub enum ImportIssue {
    /// Pre-flight skip: asset exceeds both the relative and absolute caps.
    AssetTooLarge {
        id: EntityId,
        size: u64,
        available: u64,
    },
    /// Asset write failed for capacity even after cleanup and retry.
    MediaStorageExhausted { id: EntityId },
    /// A store rejected an entity during creation or update.
    EntityCreationFailed {
        kind: &'static str,
        id: EntityId,
        message: String,
    },
}

impl Display for ImportIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AssetTooLarge {
                id,
                size,
                available,
            } => write!(
                f,
                "asset {id} too large to import: {size} bytes, {available} available"
            ),
            Self::MediaStorageExhausted { id } => {
                write!(f, "storage exhausted while importing asset {id}")
            }
            Self::EntityCreationFailed { kind, id, message } => {
                write!(f, "failed to import {kind} {id}: {message}")
            }
        }
    }
}

impl Error for ImportIssue {}

/// Per-kind commit counters for one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounts {
    pub workspaces_created: usize,
    pub workspaces_merged: usize,
    pub tasks: usize,
    pub standalone_notes: usize,
    pub folders: usize,
    pub task_templates: usize,
    pub note_templates: usize,
    pub media: usize,
    pub histories: usize,
    /// Entities left untouched because `skip_duplicates` matched their id.
    pub skipped: usize,
}

/// Outcome of one import run.
///
/// `errors` holds every per-item failure; successfully processed items stay
/// committed regardless (no rollback).
#[derive(Debug, Default)]
pub struct ImportReport {
    pub counts: ImportCounts,
    pub errors: Vec<ImportIssue>,
}

impl ImportReport {
    /// True iff the whole run completed without per-item failures.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Warning raised by the restore path; never a hard failure.
#[derive(Debug)]
pub enum RestoreWarning {
    /// A read-back count did not match the bundle after loading.
    VerificationInconclusive {
        collection: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The media store could not be fully wiped before loading.
    MediaWipeFailed { message: String },
    /// The media store could not be fully loaded from the bundle.
    MediaLoadFailed { message: String },
}

impl Display for RestoreWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VerificationInconclusive {
                collection,
                expected,
                actual,
            } => write!(
                f,
                "restore verification inconclusive for {collection}: expected {expected}, found {actual}"
            ),
            Self::MediaWipeFailed { message } => {
                write!(f, "failed to wipe media store before restore: {message}")
            }
            Self::MediaLoadFailed { message } => {
                write!(f, "failed to load media store from bundle: {message}")
            }
        }
    }
}

/// Outcome of one restore run.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub counts: ImportCounts,
    pub warnings: Vec<RestoreWarning>,
}

impl RestoreReport {
    /// True iff every collection verified cleanly.
    pub fn clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

pub use engine::ImportEngine;
pub use restore::RestoreEngine;

/// Snapshots every persisted collection into a bundle.
///
/// The inverse of the restore path: feeding the result back through
/// `RestoreEngine` reproduces the same stores.
///
/// # Errors
/// - `MediaError` when an asset payload cannot be read back for export.
pub fn export_bundle<S: StorageProvider>(
    stores: &EntityStores,
    media: &MediaStore<S>,
) -> MediaResult<Bundle> {
    let note_histories = stores
        .histories
        .list()
        .into_iter()
        .map(|history| (history.note_id.clone(), history))
        .collect();

    Ok(Bundle {
        workspaces: stores.workspaces.list(),
        tasks: stores.tasks.list(),
        standalone_notes: stores.standalone_notes.list(),
        folders: stores.folders.list(),
        templates: crate::model::bundle::TemplateBundle {
            tasks: stores.task_templates.list(),
            notes: stores.note_templates.list(),
        },
        media: media.list_assets()?,
        note_histories,
        ..Bundle::default()
    })
}
