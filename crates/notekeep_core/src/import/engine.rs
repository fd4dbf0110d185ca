//! Bundle import/merge pipeline.
//!
//! # Responsibility
//! - Commit bundle entities into the live stores in dependency order.
//! - Remap colliding ids and resolve foreign keys through per-run remap
//!   tables.
//!
//! # Invariants
//! - Stage order is fixed: workspaces, media, tasks, templates, standalone
//!   notes, folders, histories. Workspace-scoped entities are never
//!   committed before their workspace id is resolvable.
//! - Folders are inserted parent-first; a child never lands before its
//!   in-bundle parent has an entry in the folder remap table.
//! - Per-item failures are recorded and the pipeline continues.

use crate::import::{ImportIssue, ImportOptions, ImportReport};
use crate::media::scanner;
use crate::media::store::{MediaError, MediaStore};
use crate::model::bundle::{Bundle, BundleError};
use crate::model::entity::{Folder, Workspace};
use crate::model::{mint_id, EntityId};
use crate::repo::EntityStores;
use crate::storage::StorageProvider;
use log::{info, warn};
use std::collections::{HashMap, HashSet};

/// Absolute per-asset cap; combined with the relative cap to pre-flight
/// skip assets that could never fit.
pub const MAX_SINGLE_ASSET_BYTES: u64 = 2 * 1024 * 1024;

/// Retention window for the space-reclaiming cleanup that precedes media
/// ingestion.
pub const IMPORT_MEDIA_RETENTION_DAYS: u32 = 45;

/// Workspace name used when a task or note references a workspace id the
/// remap table cannot resolve.
pub const FALLBACK_WORKSPACE_NAME: &str = "Imported Workspace";

/// Transient old-id to new-id mapping, scoped to one entity kind and one
/// import run. Never persisted.
type RemapTable = HashMap<EntityId, EntityId>;

/// Reconciles one bundle into the live stores.
///
/// Non-transactional and at-least-once: an interrupted or partially failed
/// run leaves every already-committed entity in place. Concurrent runs
/// against the same stores are unsafe; callers serialize externally.
pub struct ImportEngine<'a, S: StorageProvider> {
    stores: &'a mut EntityStores,
    media: &'a mut MediaStore<S>,
}

impl<'a, S: StorageProvider> ImportEngine<'a, S> {
    /// Creates an engine borrowing the injected stores for one run.
    pub fn new(stores: &'a mut EntityStores, media: &'a mut MediaStore<S>) -> Self {
        Self { stores, media }
    }

    /// Parses and imports a JSON bundle payload.
    ///
    /// # Errors
    /// - `BundleError` when the payload cannot be parsed at all; this is
    ///   the only structural abort.
    pub fn import_json(
        &mut self,
        payload: &str,
        options: &ImportOptions,
    ) -> Result<ImportReport, BundleError> {
        let bundle = Bundle::from_json(payload)?;
        Ok(self.import(&bundle, options))
    }

    /// Runs the seven-stage import pipeline.
    pub fn import(&mut self, bundle: &Bundle, options: &ImportOptions) -> ImportReport {
        let mut report = ImportReport::default();
        info!(
            "event=import_run module=import status=start workspaces={} tasks={} notes={} folders={} media={}",
            bundle.workspaces.len(),
            bundle.tasks.len(),
            bundle.standalone_notes.len(),
            bundle.folders.len(),
            bundle.all_media().len()
        );

        let mut workspace_remap = self.remap_workspaces(bundle, options, &mut report);
        self.import_media(bundle, &mut report);
        self.import_tasks(bundle, options, &mut workspace_remap, &mut report);
        self.import_templates(bundle, options, &workspace_remap, &mut report);
        self.import_notes(bundle, options, &mut workspace_remap, &mut report);
        self.import_folders(bundle, options, &workspace_remap, &mut report);
        self.merge_histories(bundle, &mut report);

        info!(
            "event=import_run module=import status={} errors={} skipped={}",
            if report.success() { "ok" } else { "partial" },
            report.errors.len(),
            report.counts.skipped
        );
        report
    }

    /// Stage 1: resolve every bundle workspace to a live workspace id.
    fn remap_workspaces(
        &mut self,
        bundle: &Bundle,
        options: &ImportOptions,
        report: &mut ImportReport,
    ) -> RemapTable {
        let mut remap = RemapTable::new();
        for workspace in &bundle.workspaces {
            if options.skip_duplicates && self.stores.workspaces.contains(&workspace.id) {
                remap.insert(workspace.id.clone(), workspace.id.clone());
                report.counts.skipped += 1;
                continue;
            }

            if options.merge_workspaces {
                let existing = self
                    .stores
                    .workspaces
                    .list()
                    .into_iter()
                    .find(|candidate| candidate.name.eq_ignore_ascii_case(&workspace.name));
                if let Some(existing) = existing {
                    let mut merged = workspace.clone();
                    merged.id = existing.id.clone();
                    merged.created_at = existing.created_at;
                    match self.stores.workspaces.update(&existing.id, merged) {
                        Ok(()) => {
                            remap.insert(workspace.id.clone(), existing.id);
                            report.counts.workspaces_merged += 1;
                        }
                        Err(err) => report.errors.push(ImportIssue::EntityCreationFailed {
                            kind: "workspace",
                            id: workspace.id.clone(),
                            message: err.to_string(),
                        }),
                    }
                    continue;
                }
            }

            let mut incoming = workspace.clone();
            if self.stores.workspaces.contains(&incoming.id) {
                incoming.id = mint_id();
            }
            let new_id = incoming.id.clone();
            match self.stores.workspaces.create(incoming) {
                Ok(_) => {
                    remap.insert(workspace.id.clone(), new_id);
                    report.counts.workspaces_created += 1;
                }
                Err(err) => report.errors.push(ImportIssue::EntityCreationFailed {
                    kind: "workspace",
                    id: workspace.id.clone(),
                    message: err.to_string(),
                }),
            }
        }
        remap
    }

    /// Stage 2: reclaim space, then ingest bundle assets with one
    /// authoritative size gate.
    fn import_media(&mut self, bundle: &Bundle, report: &mut ImportReport) {
        // Protect both the live document graph and everything the bundle is
        // about to reference.
        let live_texts = scanner::document_texts(
            &self.stores.tasks.list(),
            &self.stores.standalone_notes.list(),
        );
        let bundle_texts = scanner::document_texts(&bundle.tasks, &bundle.standalone_notes);
        let mut used: HashSet<EntityId> = scanner::scan_used_ids(&live_texts);
        used.extend(scanner::scan_used_ids(&bundle_texts));

        if let Err(err) = self
            .media
            .cleanup_unused(&used, IMPORT_MEDIA_RETENTION_DAYS)
        {
            warn!("event=import_media module=import status=cleanup_failed error={err}");
        }

        for asset in bundle.all_media() {
            let asset_id = asset.id.clone();
            let available = self.media.available_bytes();
            let over_relative = asset.size.saturating_mul(10) > available.saturating_mul(9);
            if over_relative && asset.size > MAX_SINGLE_ASSET_BYTES {
                report.errors.push(ImportIssue::AssetTooLarge {
                    id: asset_id,
                    size: asset.size,
                    available,
                });
                continue;
            }

            // `store` already runs one aggressive cleanup + retry before
            // reporting exhaustion.
            match self.media.store(asset) {
                Ok(_) => report.counts.media += 1,
                Err(MediaError::StorageExhausted { id }) => {
                    report.errors.push(ImportIssue::MediaStorageExhausted { id });
                }
                Err(err) => report.errors.push(ImportIssue::EntityCreationFailed {
                    kind: "media",
                    id: asset_id,
                    message: err.to_string(),
                }),
            }
        }
    }

    /// Stage 3: commit tasks under their remapped workspaces.
    fn import_tasks(
        &mut self,
        bundle: &Bundle,
        options: &ImportOptions,
        workspace_remap: &mut RemapTable,
        report: &mut ImportReport,
    ) {
        for task in &bundle.tasks {
            if options.skip_duplicates && self.stores.tasks.contains(&task.id) {
                report.counts.skipped += 1;
                continue;
            }

            let mut incoming = task.clone();
            incoming.workspace_id =
                self.resolve_workspace(&task.workspace_id, workspace_remap, report);
            if self.stores.tasks.contains(&incoming.id) {
                incoming.id = mint_id();
            }
            match self.stores.tasks.create(incoming) {
                Ok(_) => report.counts.tasks += 1,
                Err(err) => report.errors.push(ImportIssue::EntityCreationFailed {
                    kind: "task",
                    id: task.id.clone(),
                    message: err.to_string(),
                }),
            }
        }
    }

    /// Stage 4: commit templates; workspace ids pass through the remap when
    /// resolvable and are otherwise carried as-is.
    fn import_templates(
        &mut self,
        bundle: &Bundle,
        options: &ImportOptions,
        workspace_remap: &RemapTable,
        report: &mut ImportReport,
    ) {
        for template in &bundle.templates.tasks {
            if options.skip_duplicates && self.stores.task_templates.contains(&template.id) {
                report.counts.skipped += 1;
                continue;
            }
            let mut incoming = template.clone();
            incoming.workspace_id = incoming
                .workspace_id
                .map(|id| workspace_remap.get(&id).cloned().unwrap_or(id));
            if self.stores.task_templates.contains(&incoming.id) {
                incoming.id = mint_id();
            }
            match self.stores.task_templates.create(incoming) {
                Ok(_) => report.counts.task_templates += 1,
                Err(err) => report.errors.push(ImportIssue::EntityCreationFailed {
                    kind: "task_template",
                    id: template.id.clone(),
                    message: err.to_string(),
                }),
            }
        }

        for template in &bundle.templates.notes {
            if options.skip_duplicates && self.stores.note_templates.contains(&template.id) {
                report.counts.skipped += 1;
                continue;
            }
            let mut incoming = template.clone();
            incoming.workspace_id = incoming
                .workspace_id
                .map(|id| workspace_remap.get(&id).cloned().unwrap_or(id));
            if self.stores.note_templates.contains(&incoming.id) {
                incoming.id = mint_id();
            }
            match self.stores.note_templates.create(incoming) {
                Ok(_) => report.counts.note_templates += 1,
                Err(err) => report.errors.push(ImportIssue::EntityCreationFailed {
                    kind: "note_template",
                    id: template.id.clone(),
                    message: err.to_string(),
                }),
            }
        }
    }

    /// Stage 5: commit standalone notes with the same workspace fallback
    /// rule as tasks.
    fn import_notes(
        &mut self,
        bundle: &Bundle,
        options: &ImportOptions,
        workspace_remap: &mut RemapTable,
        report: &mut ImportReport,
    ) {
        for note in &bundle.standalone_notes {
            if options.skip_duplicates && self.stores.standalone_notes.contains(&note.id) {
                report.counts.skipped += 1;
                continue;
            }

            let mut incoming = note.clone();
            incoming.workspace_id =
                self.resolve_workspace(&note.workspace_id, workspace_remap, report);
            if self.stores.standalone_notes.contains(&incoming.id) {
                incoming.id = mint_id();
            }
            match self.stores.standalone_notes.create(incoming) {
                Ok(_) => report.counts.standalone_notes += 1,
                Err(err) => report.errors.push(ImportIssue::EntityCreationFailed {
                    kind: "note",
                    id: note.id.clone(),
                    message: err.to_string(),
                }),
            }
        }
    }

    /// Stage 6: commit folders parent-first, rewriting child parents
    /// through the folder remap table.
    fn import_folders(
        &mut self,
        bundle: &Bundle,
        options: &ImportOptions,
        workspace_remap: &RemapTable,
        report: &mut ImportReport,
    ) {
        let bundle_ids: HashSet<&str> = bundle.folders.iter().map(|f| f.id.as_str()).collect();
        let ordered = order_parent_first(&bundle.folders);
        let mut folder_remap = RemapTable::new();

        for folder in ordered {
            if options.skip_duplicates && self.stores.folders.contains(&folder.id) {
                folder_remap.insert(folder.id.clone(), folder.id.clone());
                report.counts.skipped += 1;
                continue;
            }

            let mut incoming = folder.clone();
            incoming.workspace_id = incoming
                .workspace_id
                .map(|id| workspace_remap.get(&id).cloned().unwrap_or(id));
            incoming.parent_folder_id = match incoming.parent_folder_id {
                Some(parent) => match folder_remap.get(&parent) {
                    Some(mapped) => Some(mapped.clone()),
                    // A parent that was in the bundle but never got mapped
                    // (creation failure or cycle) would dangle; file the
                    // child at root instead.
                    None if bundle_ids.contains(parent.as_str())
                        && !self.stores.folders.contains(&parent) =>
                    {
                        None
                    }
                    None => Some(parent),
                },
                None => None,
            };
            if self.stores.folders.contains(&incoming.id) {
                incoming.id = mint_id();
            }
            let new_id = incoming.id.clone();
            match self.stores.folders.create(incoming) {
                Ok(_) => {
                    folder_remap.insert(folder.id.clone(), new_id);
                    report.counts.folders += 1;
                }
                Err(err) => report.errors.push(ImportIssue::EntityCreationFailed {
                    kind: "folder",
                    id: folder.id.clone(),
                    message: err.to_string(),
                }),
            }
        }
    }

    /// Stage 7: merge note histories; bundle entries overwrite on note-id
    /// collision.
    fn merge_histories(&mut self, bundle: &Bundle, report: &mut ImportReport) {
        for (note_id, history) in &bundle.note_histories {
            let mut incoming = history.clone();
            // The map key is authoritative for the note id.
            incoming.note_id = note_id.clone();
            let result = if self.stores.histories.contains(note_id) {
                self.stores.histories.update(note_id, incoming)
            } else {
                self.stores.histories.create(incoming).map(|_| ())
            };
            match result {
                Ok(()) => report.counts.histories += 1,
                Err(err) => report.errors.push(ImportIssue::EntityCreationFailed {
                    kind: "history",
                    id: note_id.clone(),
                    message: err.to_string(),
                }),
            }
        }
    }

    /// Resolves a bundle workspace id to a live one, lazily creating the
    /// fallback workspace for ids stage 1 never saw.
    fn resolve_workspace(
        &mut self,
        old_id: &str,
        workspace_remap: &mut RemapTable,
        report: &mut ImportReport,
    ) -> EntityId {
        if let Some(mapped) = workspace_remap.get(old_id) {
            return mapped.clone();
        }
        if self.stores.workspaces.contains(old_id) {
            workspace_remap.insert(old_id.to_string(), old_id.to_string());
            return old_id.to_string();
        }

        let fallback = Workspace::new(FALLBACK_WORKSPACE_NAME);
        let fallback_id = fallback.id.clone();
        match self.stores.workspaces.create(fallback) {
            Ok(_) => {
                warn!(
                    "event=import_fallback module=import status=ok old_workspace_id={old_id} new_workspace_id={fallback_id}"
                );
                workspace_remap.insert(old_id.to_string(), fallback_id.clone());
                report.counts.workspaces_created += 1;
                fallback_id
            }
            Err(err) => {
                // Creation of a freshly minted workspace failing means the
                // store itself is broken; record and keep the original id.
                report.errors.push(ImportIssue::EntityCreationFailed {
                    kind: "workspace",
                    id: old_id.to_string(),
                    message: err.to_string(),
                });
                old_id.to_string()
            }
        }
    }
}

/// Orders folders so every in-bundle parent precedes its children.
///
/// Folders whose parent is absent from the bundle count as roots. Cycles
/// (which cannot be ordered) keep bundle order at the end.
fn order_parent_first(folders: &[Folder]) -> Vec<Folder> {
    let bundle_ids: HashSet<&str> = folders.iter().map(|f| f.id.as_str()).collect();
    let mut ordered: Vec<Folder> = Vec::with_capacity(folders.len());
    let mut placed: HashSet<EntityId> = HashSet::new();
    let mut remaining: Vec<Folder> = folders.to_vec();

    loop {
        let before = remaining.len();
        remaining.retain(|folder| {
            let ready = match &folder.parent_folder_id {
                None => true,
                Some(parent) => {
                    !bundle_ids.contains(parent.as_str()) || placed.contains(parent)
                }
            };
            if ready {
                placed.insert(folder.id.clone());
                ordered.push(folder.clone());
            }
            !ready
        });
        if remaining.is_empty() || remaining.len() == before {
            break;
        }
    }

    ordered.extend(remaining);
    ordered
}

#[cfg(test)]
mod tests {
    use super::order_parent_first;
    use crate::model::entity::Folder;

    fn folder(id: &str, parent: Option<&str>) -> Folder {
        let mut folder = Folder::new(id.to_uppercase());
        folder.id = id.to_string();
        folder.parent_folder_id = parent.map(str::to_string);
        folder
    }

    #[test]
    fn child_before_parent_gets_reordered() {
        let ordered = order_parent_first(&[folder("child", Some("b")), folder("b", None)]);
        let ids: Vec<&str> = ordered.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "child"]);
    }

    #[test]
    fn parent_outside_bundle_counts_as_root() {
        let ordered = order_parent_first(&[folder("a", Some("elsewhere"))]);
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn cycles_keep_bundle_order_at_the_end() {
        let ordered = order_parent_first(&[
            folder("root", None),
            folder("x", Some("y")),
            folder("y", Some("x")),
        ]);
        let ids: Vec<&str> = ordered.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "x", "y"]);
    }

    #[test]
    fn deep_chain_orders_ancestors_first() {
        let ordered = order_parent_first(&[
            folder("leaf", Some("mid")),
            folder("mid", Some("top")),
            folder("top", None),
        ]);
        let ids: Vec<&str> = ordered.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "mid", "leaf"]);
    }
}
