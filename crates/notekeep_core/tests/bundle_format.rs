use notekeep_core::{
    Asset, AssetKind, Bundle, BundleError, Note, Task, Workspace, CURRENT_SCHEMA_VERSION,
};

#[test]
fn export_then_import_round_trips() {
    let workspace = Workspace::with_id("ws-1".to_string(), "Work");
    let mut task = Task::new("ws-1".to_string(), "Task one");
    task.id = "t-1".to_string();
    task.description = "see media:m-1".to_string();
    let mut note = Note::new("ws-1".to_string(), "body");
    note.id = "n-1".to_string();

    let bundle = Bundle {
        workspaces: vec![workspace],
        tasks: vec![task],
        standalone_notes: vec![note],
        media: vec![Asset::with_id(
            "m-1".to_string(),
            AssetKind::Image,
            vec![1, 2, 3],
            "image/png",
        )],
        ..Bundle::default()
    };

    let payload = bundle.to_json().unwrap();
    let parsed = Bundle::from_json(&payload).unwrap();
    assert_eq!(parsed, bundle);
}

#[test]
fn exported_payload_uses_camel_case_keys() {
    let bundle = Bundle {
        standalone_notes: vec![Note::new("ws".to_string(), "x")],
        ..Bundle::default()
    };
    let payload = bundle.to_json().unwrap();
    assert!(payload.contains("\"schemaVersion\""));
    assert!(payload.contains("\"standaloneNotes\""));
    assert!(payload.contains("\"noteHistories\""));
    assert!(payload.contains("\"workspaceId\""));
}

#[test]
fn legacy_export_without_version_tag_parses() {
    let payload = r#"{
        "workspaces": [{"id": "ws", "name": "Legacy"}],
        "tasks": [],
        "images": [{"id": "i", "bytes": [0], "size": 1}]
    }"#;
    let bundle = Bundle::from_json(payload).unwrap();
    assert_eq!(bundle.schema_version, 1);
    assert_eq!(bundle.workspaces.len(), 1);
    assert_eq!(bundle.all_media().len(), 1);
}

#[test]
fn newer_schema_version_is_refused() {
    let payload = format!(
        "{{\"schemaVersion\": {}, \"workspaces\": []}}",
        CURRENT_SCHEMA_VERSION + 5
    );
    assert!(matches!(
        Bundle::from_json(&payload),
        Err(BundleError::UnsupportedSchemaVersion { .. })
    ));
}

#[test]
fn missing_entity_fields_fall_back_to_defaults() {
    let payload = r#"{
        "tasks": [{"id": "t", "workspaceId": "ws", "title": "Bare"}]
    }"#;
    let bundle = Bundle::from_json(payload).unwrap();
    let task = &bundle.tasks[0];
    assert!(task.description.is_empty());
    assert!(task.subtasks.is_empty());
    assert_eq!(task.created_at, 0);
}
