//! Workspace, task, note, folder, template and history models.
//!
//! # Responsibility
//! - Define the serde shapes of every entity carried by a Bundle.
//! - Provide constructors for locally created and imported records.
//!
//! # Invariants
//! - `id` is stable and never reused for another entity.
//! - Foreign keys (`workspace_id`, `parent_folder_id`, `task_id`) are plain
//!   ids; referential integrity is the import engine's concern, not the
//!   model's.
//! - External JSON keys are camelCase.

use crate::model::{mint_id, now_ms, EntityId};
use serde::{Deserialize, Serialize};

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not started.
    #[default]
    Todo,
    /// Work is in progress.
    InProgress,
    /// Completed successfully.
    Done,
    /// No longer actionable.
    Cancelled,
}

/// Top-level grouping every task and note belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub created_at: i64,
}

impl Workspace {
    /// Creates a workspace with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(mint_id(), name)
    }

    /// Creates a workspace with a caller-provided id.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: None,
            icon: None,
            created_at: now_ms(),
        }
    }
}

/// Nested checklist row carried verbatim inside a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: EntityId,
    pub label: String,
    #[serde(default)]
    pub done: bool,
}

/// Nested subtask row carried verbatim inside a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
}

/// Note attached to a task (distinct from standalone notes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNote {
    pub id: EntityId,
    pub content: String,
    #[serde(default)]
    pub created_at: i64,
}

/// Actionable task scoped to one workspace.
///
/// Nested structures (subtasks, notes, checklists, dependencies) keep their
/// embedded ids on import; they are never independently deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub workspace_id: EntityId,
    pub title: String,
    /// Markdown body; may embed `media:<id>` reference tokens.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub notes: Vec<TaskNote>,
    #[serde(default)]
    pub checklists: Vec<ChecklistItem>,
    /// Ids of tasks this task depends on.
    #[serde(default)]
    pub dependencies: Vec<EntityId>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Task {
    /// Creates a task with a generated id in the given workspace.
    pub fn new(workspace_id: EntityId, title: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: mint_id(),
            workspace_id,
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            subtasks: Vec::new(),
            notes: Vec::new(),
            checklists: Vec::new(),
            dependencies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Standalone note, optionally filed under a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: EntityId,
    pub workspace_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<EntityId>,
    #[serde(default)]
    pub title: String,
    /// Markdown body; may embed `media:<id>` reference tokens.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Note {
    /// Creates a note with a generated id in the given workspace.
    pub fn new(workspace_id: EntityId, content: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: mint_id(),
            workspace_id,
            parent_folder_id: None,
            title: String::new(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Grouping node for standalone notes.
///
/// `parent_folder_id == None` means root-level folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<EntityId>,
    #[serde(default)]
    pub created_at: i64,
}

impl Folder {
    /// Creates a root-level folder with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: mint_id(),
            name: name.into(),
            workspace_id: None,
            parent_folder_id: None,
            created_at: now_ms(),
        }
    }
}

/// Reusable task blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<EntityId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub checklists: Vec<ChecklistItem>,
}

/// Reusable note blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTemplate {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<EntityId>,
    #[serde(default)]
    pub content: String,
}

/// One saved revision of a note body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub content: String,
    #[serde(default)]
    pub saved_at: i64,
}

/// Revision history for one note, keyed by the note id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteHistory {
    pub note_id: EntityId,
    #[serde(default)]
    pub entries: Vec<HistoryEntry>,
}
