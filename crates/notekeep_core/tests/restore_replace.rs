use notekeep_core::{
    Asset, AssetKind, Bundle, EntityStores, HistoryEntry, MediaStore, MemoryStorage, Note,
    NoteHistory, RestoreEngine, RestoreWarning, Task, Workspace,
};
use std::collections::HashMap;

fn session() -> (EntityStores, MediaStore<MemoryStorage>) {
    let stores = EntityStores::in_memory();
    let media = MediaStore::new(MemoryStorage::new()).unwrap();
    (stores, media)
}

fn backup_bundle() -> Bundle {
    let workspace = Workspace::with_id("ws-backup".to_string(), "Backup");
    let mut task = Task::new("ws-backup".to_string(), "Restored task");
    task.id = "t-backup".to_string();
    let mut note = Note::new("ws-backup".to_string(), "restored body media:m-1");
    note.id = "n-backup".to_string();

    let mut note_histories = HashMap::new();
    note_histories.insert(
        "n-backup".to_string(),
        NoteHistory {
            note_id: "n-backup".to_string(),
            entries: vec![HistoryEntry {
                content: "v1".to_string(),
                saved_at: 100,
            }],
        },
    );

    Bundle {
        workspaces: vec![workspace],
        tasks: vec![task],
        standalone_notes: vec![note],
        media: vec![Asset::with_id(
            "m-1".to_string(),
            AssetKind::Image,
            vec![7, 7, 7],
            "image/png",
        )],
        note_histories,
        ..Bundle::default()
    }
}

#[test]
fn restore_replaces_everything_verbatim() {
    let (mut stores, mut media) = session();

    // Pre-existing state that must be wiped, not merged.
    stores
        .workspaces
        .create(Workspace::with_id("old-ws".to_string(), "Old"))
        .unwrap();
    stores
        .tasks
        .create(Task::new("old-ws".to_string(), "Old task"))
        .unwrap();
    media
        .store(Asset::with_id(
            "old-asset".to_string(),
            AssetKind::Photo,
            vec![1],
            "image/jpeg",
        ))
        .unwrap();

    let report = RestoreEngine::new(&mut stores, &mut media).restore(&backup_bundle());

    assert!(report.clean());
    assert_eq!(stores.workspaces.len(), 1);
    assert_eq!(stores.tasks.len(), 1);
    assert!(!stores.workspaces.contains("old-ws"));
    assert!(!media.contains("old-asset"));

    // Ids arrive verbatim: no remapping on the restore path.
    assert!(stores.workspaces.contains("ws-backup"));
    assert!(stores.tasks.contains("t-backup"));
    assert_eq!(stores.tasks.get("t-backup").unwrap().workspace_id, "ws-backup");
    assert_eq!(media.get_bytes("m-1").unwrap().unwrap(), vec![7, 7, 7]);
    assert_eq!(
        stores.histories.get("n-backup").unwrap().entries[0].content,
        "v1"
    );

    assert_eq!(report.counts.workspaces_created, 1);
    assert_eq!(report.counts.tasks, 1);
    assert_eq!(report.counts.media, 1);
    assert_eq!(report.counts.histories, 1);
}

#[test]
fn restore_into_empty_session_loads_all_collections() {
    let (mut stores, mut media) = session();
    let report = RestoreEngine::new(&mut stores, &mut media).restore(&backup_bundle());

    assert!(report.clean());
    assert_eq!(stores.standalone_notes.len(), 1);
    assert_eq!(stores.histories.len(), 1);
    assert_eq!(media.len(), 1);
}

#[test]
fn duplicate_media_ids_surface_a_verification_warning() {
    let (mut stores, mut media) = session();
    let mut bundle = backup_bundle();
    // Two bundle entries collapse onto one id in the store, so the
    // read-back count cannot match.
    bundle.media.push(Asset::with_id(
        "m-1".to_string(),
        AssetKind::Image,
        vec![9, 9],
        "image/png",
    ));

    let report = RestoreEngine::new(&mut stores, &mut media).restore(&bundle);

    assert!(!report.clean());
    assert!(report.warnings.iter().any(|warning| matches!(
        warning,
        RestoreWarning::VerificationInconclusive { collection, .. } if *collection == "media"
    )));
    // Still not a hard failure: everything else landed.
    assert!(stores.workspaces.contains("ws-backup"));
}

#[test]
fn unparseable_payload_never_wipes_live_data() {
    let (mut stores, mut media) = session();
    stores
        .workspaces
        .create(Workspace::with_id("precious".to_string(), "Precious"))
        .unwrap();

    let result = RestoreEngine::new(&mut stores, &mut media).restore_json("][");
    assert!(result.is_err());
    assert!(stores.workspaces.contains("precious"));
}

#[test]
fn export_then_restore_reproduces_the_stores() {
    let (mut stores, mut media) = session();
    RestoreEngine::new(&mut stores, &mut media).restore(&backup_bundle());

    let exported = notekeep_core::export_bundle(&stores, &media).unwrap();

    let (mut fresh_stores, mut fresh_media) = session();
    let report = RestoreEngine::new(&mut fresh_stores, &mut fresh_media).restore(&exported);

    assert!(report.clean());
    assert_eq!(fresh_stores.workspaces.len(), stores.workspaces.len());
    assert_eq!(fresh_stores.tasks.len(), stores.tasks.len());
    assert_eq!(fresh_media.len(), media.len());
    assert_eq!(
        fresh_media.get_bytes("m-1").unwrap().unwrap(),
        media.get_bytes("m-1").unwrap().unwrap()
    );
}

#[test]
fn restore_json_round_trips_an_exported_bundle() {
    let (mut stores, mut media) = session();
    let payload = backup_bundle().to_json().unwrap();

    let report = RestoreEngine::new(&mut stores, &mut media)
        .restore_json(&payload)
        .unwrap();

    assert!(report.clean());
    assert!(stores.workspaces.contains("ws-backup"));
    assert_eq!(media.get_bytes("m-1").unwrap().unwrap(), vec![7, 7, 7]);
}
