//! Entity store contracts and the in-memory implementation.
//!
//! # Responsibility
//! - Provide the keyed-collection CRUD surface the import and restore
//!   engines operate against.
//! - Keep every store injectable: constructed once per session and passed
//!   by reference, never reached through ambient globals.
//!
//! # Invariants
//! - `create` rejects duplicate ids; `update` rejects missing ids.
//! - Listing preserves insertion order (bundle order round-trips).
//! - `set_all` replaces the whole collection atomically in memory.

use crate::model::entity::{Folder, Note, NoteHistory, NoteTemplate, Task, TaskTemplate, Workspace};
use crate::model::EntityId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for entity store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed-collection failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// `create` was called with an id that already exists.
    DuplicateId(EntityId),
    /// `update` targeted an id that does not exist.
    NotFound(EntityId),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId(id) => write!(f, "entity id already exists: {id}"),
            Self::NotFound(id) => write!(f, "entity not found: {id}"),
        }
    }
}

impl Error for StoreError {}

/// Anything addressable by a stable string id.
pub trait Entity: Clone {
    /// The stable id this entity is keyed by.
    fn entity_id(&self) -> &str;
}

impl Entity for Workspace {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl Entity for Task {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl Entity for Note {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl Entity for Folder {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl Entity for TaskTemplate {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl Entity for NoteTemplate {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl Entity for NoteHistory {
    fn entity_id(&self) -> &str {
        &self.note_id
    }
}

/// Keyed collection surface consumed by the engines.
///
/// Implementations are black boxes to the engines: how a store persists its
/// rows is out of scope here.
pub trait EntityStore<T: Entity> {
    /// All entities in insertion order.
    fn list(&self) -> Vec<T>;

    /// Looks up one entity by id.
    fn get(&self, id: &str) -> Option<T>;

    /// Whether an entity with this id exists.
    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Inserts a new entity.
    fn create(&mut self, entity: T) -> StoreResult<EntityId>;

    /// Replaces the entity stored under `id`.
    fn update(&mut self, id: &str, entity: T) -> StoreResult<()>;

    /// Replaces the whole collection. Used by the restore path.
    fn set_all(&mut self, entities: Vec<T>);

    /// Removes every entity.
    fn clear(&mut self);

    /// Number of stored entities.
    fn len(&self) -> usize;

    /// Whether the collection is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered in-memory entity store.
pub struct MemEntityStore<T> {
    items: Vec<T>,
}

impl<T> MemEntityStore<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Default for MemEntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> EntityStore<T> for MemEntityStore<T> {
    fn list(&self) -> Vec<T> {
        self.items.clone()
    }

    fn get(&self, id: &str) -> Option<T> {
        self.items
            .iter()
            .find(|item| item.entity_id() == id)
            .cloned()
    }

    fn create(&mut self, entity: T) -> StoreResult<EntityId> {
        let id = entity.entity_id().to_string();
        if self.contains(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        self.items.push(entity);
        Ok(id)
    }

    fn update(&mut self, id: &str, entity: T) -> StoreResult<()> {
        match self.items.iter_mut().find(|item| item.entity_id() == id) {
            Some(slot) => {
                *slot = entity;
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn set_all(&mut self, entities: Vec<T>) {
        self.items = entities;
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// The injected set of entity stores the engines operate on.
///
/// Constructed once at session start; the engines borrow it mutably for the
/// duration of one run. There is no internal locking: concurrent runs
/// against the same set are unsafe and must be serialized by the caller.
pub struct EntityStores {
    pub workspaces: Box<dyn EntityStore<Workspace>>,
    pub tasks: Box<dyn EntityStore<Task>>,
    pub standalone_notes: Box<dyn EntityStore<Note>>,
    pub folders: Box<dyn EntityStore<Folder>>,
    pub task_templates: Box<dyn EntityStore<TaskTemplate>>,
    pub note_templates: Box<dyn EntityStore<NoteTemplate>>,
    pub histories: Box<dyn EntityStore<NoteHistory>>,
}

impl EntityStores {
    /// Creates a fully in-memory store set.
    pub fn in_memory() -> Self {
        Self {
            workspaces: Box::new(MemEntityStore::new()),
            tasks: Box::new(MemEntityStore::new()),
            standalone_notes: Box::new(MemEntityStore::new()),
            folders: Box::new(MemEntityStore::new()),
            task_templates: Box::new(MemEntityStore::new()),
            note_templates: Box::new(MemEntityStore::new()),
            histories: Box::new(MemEntityStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityStore, MemEntityStore, StoreError};
    use crate::model::entity::Workspace;

    #[test]
    fn create_rejects_duplicate_id() {
        let mut store = MemEntityStore::new();
        let workspace = Workspace::with_id("ws-1".to_string(), "Work");
        store.create(workspace.clone()).unwrap();
        let err = store.create(workspace).unwrap_err();
        assert_eq!(err, StoreError::DuplicateId("ws-1".to_string()));
    }

    #[test]
    fn update_missing_id_is_not_found() {
        let mut store: MemEntityStore<Workspace> = MemEntityStore::new();
        let err = store
            .update("absent", Workspace::with_id("absent".to_string(), "X"))
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("absent".to_string()));
    }

    #[test]
    fn list_preserves_insertion_order() {
        let mut store = MemEntityStore::new();
        store
            .create(Workspace::with_id("b".to_string(), "Second"))
            .unwrap();
        store
            .create(Workspace::with_id("a".to_string(), "First"))
            .unwrap();
        let ids: Vec<String> = store.list().into_iter().map(|ws| ws.id).collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn set_all_replaces_collection() {
        let mut store = MemEntityStore::new();
        store
            .create(Workspace::with_id("old".to_string(), "Old"))
            .unwrap();
        store.set_all(vec![Workspace::with_id("new".to_string(), "New")]);
        assert_eq!(store.len(), 1);
        assert!(store.contains("new"));
        assert!(!store.contains("old"));
    }
}
