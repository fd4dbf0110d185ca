//! Destructive full-replace restore path.
//!
//! # Responsibility
//! - Wipe every core persisted collection and bulk-load a bundle verbatim.
//! - Verify each critical collection by read-back and surface warnings.
//!
//! # Invariants
//! - No id remapping and no merge logic: the bundle is assumed internally
//!   consistent because it was produced by this same system.
//! - Verification mismatches are warnings, never hard failures.
//! - UI-only state (views, sync settings) lives outside these stores and
//!   is untouched by design.

use crate::import::{ImportCounts, RestoreReport, RestoreWarning};
use crate::media::store::MediaStore;
use crate::model::bundle::{Bundle, BundleError};
use crate::model::entity::NoteHistory;
use crate::repo::EntityStores;
use crate::storage::StorageProvider;
use log::{info, warn};

/// Replaces all persisted collections with a bundle's contents.
///
/// Like the import engine this path is non-transactional: a crash mid-run
/// can leave some collections wiped and others loaded. Callers serialize
/// restore operations externally.
pub struct RestoreEngine<'a, S: StorageProvider> {
    stores: &'a mut EntityStores,
    media: &'a mut MediaStore<S>,
}

impl<'a, S: StorageProvider> RestoreEngine<'a, S> {
    /// Creates an engine borrowing the injected stores for one run.
    pub fn new(stores: &'a mut EntityStores, media: &'a mut MediaStore<S>) -> Self {
        Self { stores, media }
    }

    /// Parses and restores a JSON bundle payload.
    ///
    /// # Errors
    /// - `BundleError` when the payload cannot be parsed; nothing is wiped
    ///   in that case.
    pub fn restore_json(&mut self, payload: &str) -> Result<RestoreReport, BundleError> {
        let bundle = Bundle::from_json(payload)?;
        Ok(self.restore(&bundle))
    }

    /// Wipes the stores, bulk-loads the bundle, then verifies by read-back.
    pub fn restore(&mut self, bundle: &Bundle) -> RestoreReport {
        let mut report = RestoreReport::default();
        info!(
            "event=restore_run module=import status=start workspaces={} tasks={} media={}",
            bundle.workspaces.len(),
            bundle.tasks.len(),
            bundle.all_media().len()
        );

        self.wipe(&mut report);
        self.load(bundle, &mut report);
        self.verify(bundle, &mut report);

        info!(
            "event=restore_run module=import status={} warnings={}",
            if report.clean() { "ok" } else { "inconclusive" },
            report.warnings.len()
        );
        report
    }

    fn wipe(&mut self, report: &mut RestoreReport) {
        self.stores.workspaces.clear();
        self.stores.tasks.clear();
        self.stores.standalone_notes.clear();
        self.stores.folders.clear();
        self.stores.task_templates.clear();
        self.stores.note_templates.clear();
        self.stores.histories.clear();
        if let Err(err) = self.media.clear() {
            warn!("event=restore_wipe module=import status=error error={err}");
            report.warnings.push(RestoreWarning::MediaWipeFailed {
                message: err.to_string(),
            });
        }
    }

    fn load(&mut self, bundle: &Bundle, report: &mut RestoreReport) {
        self.stores.workspaces.set_all(bundle.workspaces.clone());
        self.stores.tasks.set_all(bundle.tasks.clone());
        self.stores
            .standalone_notes
            .set_all(bundle.standalone_notes.clone());
        self.stores.folders.set_all(bundle.folders.clone());
        self.stores
            .task_templates
            .set_all(bundle.templates.tasks.clone());
        self.stores
            .note_templates
            .set_all(bundle.templates.notes.clone());

        let histories: Vec<NoteHistory> = bundle
            .note_histories
            .iter()
            .map(|(note_id, history)| {
                let mut entry = history.clone();
                entry.note_id = note_id.clone();
                entry
            })
            .collect();
        self.stores.histories.set_all(histories);

        if let Err(err) = self.media.set_all(bundle.all_media()) {
            warn!("event=restore_load module=import status=error error={err}");
            report.warnings.push(RestoreWarning::MediaLoadFailed {
                message: err.to_string(),
            });
        }

        report.counts = ImportCounts {
            workspaces_created: self.stores.workspaces.len(),
            workspaces_merged: 0,
            tasks: self.stores.tasks.len(),
            standalone_notes: self.stores.standalone_notes.len(),
            folders: self.stores.folders.len(),
            task_templates: self.stores.task_templates.len(),
            note_templates: self.stores.note_templates.len(),
            media: self.media.len(),
            histories: self.stores.histories.len(),
            skipped: 0,
        };
    }

    fn verify(&mut self, bundle: &Bundle, report: &mut RestoreReport) {
        let checks: [(&'static str, usize, usize); 6] = [
            (
                "workspaces",
                bundle.workspaces.len(),
                self.stores.workspaces.len(),
            ),
            ("tasks", bundle.tasks.len(), self.stores.tasks.len()),
            (
                "standalone_notes",
                bundle.standalone_notes.len(),
                self.stores.standalone_notes.len(),
            ),
            ("folders", bundle.folders.len(), self.stores.folders.len()),
            (
                "histories",
                bundle.note_histories.len(),
                self.stores.histories.len(),
            ),
            ("media", bundle.all_media().len(), self.media.len()),
        ];

        for (collection, expected, actual) in checks {
            if expected != actual {
                warn!(
                    "event=restore_verify module=import status=inconclusive collection={collection} expected={expected} actual={actual}"
                );
                report.warnings.push(RestoreWarning::VerificationInconclusive {
                    collection,
                    expected,
                    actual,
                });
            }
        }
    }
}
