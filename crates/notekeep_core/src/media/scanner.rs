//! Reference-token scanner for document text.
//!
//! # Responsibility
//! - Extract the set of asset ids referenced by a corpus of documents.
//! - Stay decoupled from any one document type via `TextSource`.
//!
//! # Invariants
//! - Scanning is deterministic and single-pass per document.
//! - A token is `media:` followed by one or more `[A-Za-z0-9_-]` chars.

use crate::model::entity::{Note, Task, TaskNote};
use crate::model::EntityId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static MEDIA_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"media:([A-Za-z0-9_-]+)").expect("valid media reference regex"));

/// Anything that can surface its text body for reference scanning.
///
/// Lets the scanner work over tasks, notes or raw strings without coupling
/// to markdown or any one entity shape.
pub trait TextSource {
    fn text(&self) -> &str;
}

impl TextSource for str {
    fn text(&self) -> &str {
        self
    }
}

impl TextSource for String {
    fn text(&self) -> &str {
        self.as_str()
    }
}

impl TextSource for Note {
    fn text(&self) -> &str {
        &self.content
    }
}

impl TextSource for TaskNote {
    fn text(&self) -> &str {
        &self.content
    }
}

/// Extracts every referenced asset id from one document.
pub fn scan_text(document: &str) -> HashSet<EntityId> {
    MEDIA_REF_RE
        .captures_iter(document)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Extracts the union of referenced asset ids across a corpus.
pub fn scan_used_ids<'a, T, I>(documents: I) -> HashSet<EntityId>
where
    T: TextSource + ?Sized + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut used = HashSet::new();
    for document in documents {
        for caps in MEDIA_REF_RE.captures_iter(document.text()) {
            if let Some(id) = caps.get(1) {
                used.insert(id.as_str().to_string());
            }
        }
    }
    used
}

/// Collects the live document corpus: task descriptions, task-embedded
/// notes, and standalone note bodies.
///
/// Cleanup decisions must reflect this corpus, not the incoming bundle's.
pub fn document_texts(tasks: &[Task], notes: &[Note]) -> Vec<String> {
    let mut texts = Vec::with_capacity(tasks.len() + notes.len());
    for task in tasks {
        texts.push(task.description.clone());
        for task_note in &task.notes {
            texts.push(task_note.content.clone());
        }
    }
    for note in notes {
        texts.push(note.content.clone());
    }
    texts
}

#[cfg(test)]
mod tests {
    use super::{document_texts, scan_text, scan_used_ids};
    use crate::model::entity::{Note, Task, TaskNote};

    #[test]
    fn scan_text_finds_all_tokens_once() {
        let used = scan_text("a media:img-1 b media:img-1 c media:clip_2");
        assert_eq!(used.len(), 2);
        assert!(used.contains("img-1"));
        assert!(used.contains("clip_2"));
    }

    #[test]
    fn scan_text_ignores_malformed_tokens() {
        let used = scan_text("media: media:! nothing here");
        assert!(used.is_empty());
    }

    #[test]
    fn token_stops_at_disallowed_character() {
        let used = scan_text("see media:abc.png");
        assert!(used.contains("abc"));
        assert!(!used.contains("abc.png"));
    }

    #[test]
    fn scan_used_ids_unions_across_documents() {
        let docs = vec!["media:a".to_string(), "media:b media:a".to_string()];
        let used = scan_used_ids(&docs);
        assert_eq!(used.len(), 2);
    }

    #[test]
    fn document_texts_covers_task_notes_and_standalone_notes() {
        let mut task = Task::new("ws".to_string(), "t");
        task.description = "media:one".to_string();
        task.notes.push(TaskNote {
            id: "n1".to_string(),
            content: "media:two".to_string(),
            created_at: 0,
        });
        let note = Note::new("ws".to_string(), "media:three");

        let texts = document_texts(&[task], &[note]);
        let used = scan_used_ids(&texts);
        assert_eq!(used.len(), 3);
    }
}
