//! Integration tests for the `atelier-store` persistence layer.
//!
//! Every test opens its own in-memory `SQLite` database, so the suite runs
//! with a plain `cargo test` and needs no external services.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::items_after_statements,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing
)]

use std::sync::Arc;
use std::time::Duration;

use atelier_store::{
    LegacyCompletionFlag, LegacyStorage, MemoryLegacyStorage, MigrationService, MigrationStatus,
    PersistOptions, PersistenceManager, RecordKey, STORE_VERSION, StateContainer, StoreConfig,
    StoreError, attach,
};
use atelier_types::{
    Collection, EXPORT_FORMAT_VERSION, ImportOptions, MindMap, Palette, Priority, Ticket,
    TicketStatus, TicketType, ToolConfig, USER_PREFERENCES_KEY,
};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// =============================================================================
// Helpers
// =============================================================================

async fn open_manager() -> PersistenceManager {
    PersistenceManager::open(&StoreConfig::in_memory())
        .await
        .expect("Failed to open in-memory store")
}

fn palette(name: &str) -> Value {
    json!({
        "name": name,
        "colors": ["#112233", "#445566"],
        "createdAt": "2026-03-01T10:00:00.000Z",
        "updatedAt": "2026-03-01T10:00:00.000Z",
        "version": 1
    })
}

fn preferences(favorites: &[&str]) -> Value {
    json!({
        "key": USER_PREFERENCES_KEY,
        "theme": "dark",
        "favorites": favorites,
        "updatedAt": "2026-03-01T10:00:00.000Z"
    })
}

fn ticket(status: &str) -> Value {
    json!({
        "title": "Printer offline",
        "description": "Front desk printer drops off the network",
        "customer": "Acme",
        "priority": "high",
        "status": status,
        "type": "task",
        "createdAt": "2026-03-01T10:00:00.000Z",
        "updatedAt": "2026-03-01T10:00:00.000Z",
        "version": 1
    })
}

async fn migrate(manager: &PersistenceManager, dump: &str) {
    let legacy = MemoryLegacyStorage::from_json_dump(dump).unwrap();
    let service = MigrationService::new(
        manager.store().clone(),
        legacy.clone(),
        LegacyCompletionFlag::new(legacy),
    );
    let result = service.run().await;
    assert!(result.success, "{result:?}");
    assert!(result.errors.is_none(), "{result:?}");
}

/// Status that reads as "not yet run" and refuses to be marked complete.
struct StuckStatus;

impl MigrationStatus for StuckStatus {
    fn is_complete(&self) -> Result<bool, StoreError> {
        Ok(false)
    }

    fn mark_complete(&self) -> Result<(), StoreError> {
        Err(StoreError::Legacy("status store is read-only".to_owned()))
    }
}

// =============================================================================
// Legacy migration
// =============================================================================

#[tokio::test]
async fn migration_stamps_legacy_palettes() {
    let manager = open_manager().await;
    let legacy = MemoryLegacyStorage::new();
    legacy
        .set_item(
            "ui-tools-saved-palettes",
            r##"[
                {"id": 7, "name": "Sunset", "colors": ["#ff0000"], "timestamp": "2023-05-01T12:00:00.000Z"},
                {"id": 8, "name": "Ocean", "colors": ["#0000ff"], "timestamp": "2023-06-01T12:00:00.000Z"}
            ]"##,
        )
        .unwrap();

    let service = MigrationService::new(
        manager.store().clone(),
        legacy.clone(),
        LegacyCompletionFlag::new(legacy.clone()),
    );
    assert!(service.needs_migration().unwrap());

    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
    let result = service.run_at(now).await;
    assert!(result.success);
    assert_eq!(result.migrated_from, 0);
    assert_eq!(result.migrated_to, 1);
    assert_eq!(result.affected_items, 2);
    assert!(result.errors.is_none());

    let rows = manager.load_all("palettes").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "Sunset");
    assert_eq!(rows[0]["createdAt"], "2023-05-01T12:00:00.000Z");
    assert_eq!(rows[1]["createdAt"], "2023-06-01T12:00:00.000Z");
    assert_eq!(rows[0]["updatedAt"], "2026-03-01T09:30:00.000Z");
    assert_eq!(rows[0]["version"], 1);

    assert!(!service.needs_migration().unwrap());
    let summary = service.last_migration().await.unwrap().unwrap();
    assert_eq!(summary.collections, vec!["palettes".to_owned()]);
    assert_eq!(summary.total_items, 2);
}

#[tokio::test]
async fn migration_runs_once() {
    let manager = open_manager().await;
    let legacy = MemoryLegacyStorage::new();
    legacy
        .set_item("ui-tools-saved-palettes", &json!([palette("A")]).to_string())
        .unwrap();
    let service = MigrationService::new(
        manager.store().clone(),
        legacy.clone(),
        LegacyCompletionFlag::new(legacy.clone()),
    );

    let first = service.run().await;
    assert_eq!(first.affected_items, 1);
    let before = manager.load_all("palettes").await.unwrap();

    let second = service.run().await;
    assert!(second.success);
    assert_eq!(second.affected_items, 0);
    assert_eq!(manager.load_all("palettes").await.unwrap(), before);
}

#[tokio::test]
async fn migration_isolates_bad_sources() {
    let manager = open_manager().await;
    let legacy = MemoryLegacyStorage::new();
    legacy.set_item("ui-tools-tickets", "{not json").unwrap();
    legacy
        .set_item("ui-tools-saved-palettes", &json!([palette("Kept")]).to_string())
        .unwrap();
    legacy
        .set_item("checklistData", r#"{"pages": "not a list"}"#)
        .unwrap();

    let service = MigrationService::new(
        manager.store().clone(),
        legacy.clone(),
        LegacyCompletionFlag::new(legacy.clone()),
    );
    let result = service.run().await;

    assert!(result.success);
    assert_eq!(result.affected_items, 1);
    let errors = result.errors.unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().any(|e| e.starts_with("tickets:")));
    assert!(errors.iter().any(|e| e.starts_with("checklists:")));
    assert!(!service.needs_migration().unwrap());
    assert_eq!(manager.load_all("tickets").await.unwrap().len(), 0);
}

#[tokio::test]
async fn migration_reports_failure_when_completion_cannot_be_recorded() {
    let manager = open_manager().await;
    let legacy = MemoryLegacyStorage::new();
    legacy
        .set_item("ui-tools-saved-palettes", &json!([palette("A")]).to_string())
        .unwrap();

    let service = MigrationService::new(manager.store().clone(), legacy, StuckStatus);
    let result = service.run().await;

    assert!(!result.success);
    assert!(result.errors.unwrap()[0].contains("read-only"));
    assert!(service.last_migration().await.unwrap().is_none());
}

#[tokio::test]
async fn migration_merges_favorites_into_preferences() {
    let manager = open_manager().await;
    manager.save("preferences", &preferences(&["old"])).await.unwrap();

    let legacy = MemoryLegacyStorage::from_json_dump(
        r#"{ "favorites": ["color-picker", "gradient-generator"], "mindMapData": {"id": "root", "text": "Root"} }"#,
    )
    .unwrap();
    let service = MigrationService::new(
        manager.store().clone(),
        legacy.clone(),
        LegacyCompletionFlag::new(legacy),
    );
    let result = service.run().await;
    assert!(result.success);
    assert_eq!(result.affected_items, 2);

    let prefs = manager
        .load_by_id("preferences", USER_PREFERENCES_KEY)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(prefs["theme"], "dark");
    assert_eq!(prefs["favorites"], json!(["color-picker", "gradient-generator"]));

    let maps = manager.load_all("mindmaps").await.unwrap();
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0]["name"], "Migrated Mind Map");
    assert_eq!(maps[0]["root"]["text"], "Root");
}

#[tokio::test]
async fn migrated_tickets_load_as_entities() {
    let manager = open_manager().await;
    migrate(
        &manager,
        r#"{ "ui-tools-tickets": [
            {"id": 3, "title": "Call Bob", "status": "todo", "priority": "high", "type": "task", "timestamp": 1700000000000},
            {"title": "Ring back", "callbackTime": "2026-03-02T09:00:00.000Z", "timestamp": "not a date"}
        ] }"#,
    )
    .await;

    let tickets = manager.load_all_entities::<Ticket>().await.unwrap();
    assert_eq!(tickets.len(), 2);
    assert_eq!(tickets[0].title, "Call Bob");
    assert_eq!(tickets[0].description, "");
    assert_eq!(tickets[0].priority, Priority::High);
    assert_eq!(tickets[0].created_at, "2023-11-14T22:13:20.000Z");
    assert_eq!(tickets[1].ticket_type, TicketType::Callback);
    assert_eq!(tickets[1].status, TicketStatus::Todo);
    assert_eq!(tickets[1].priority, Priority::Medium);
    assert_eq!(
        tickets[1].callback_time.as_deref(),
        Some("2026-03-02T09:00:00.000Z")
    );
}

#[tokio::test]
async fn migrated_data_survives_export_and_import() {
    let source = open_manager().await;
    migrate(
        &source,
        r##"{
            "ui-tools-tickets": [{"title": "Call Bob", "status": "todo", "priority": "high", "type": "task", "timestamp": 1700000000000}],
            "ui-tools-saved-palettes": [{"name": "Dusk", "colors": ["#123456"], "timestamp": "2023-05-01T12:00:00.000Z"}],
            "mindMapData": {"id": "root", "text": "Root", "children": [{"text": "Leaf"}]}
        }"##,
    )
    .await;

    let export = source.export_all().await.unwrap();
    let text = serde_json::to_string(&export).unwrap();
    let target = open_manager().await;
    let result = target
        .import_data(&serde_json::from_str(&text).unwrap(), ImportOptions::default())
        .await;
    assert!(result.errors.is_empty(), "{result:?}");
    assert!(result.imported.contains(&"tickets (1)".to_owned()));
    assert!(result.imported.contains(&"palettes (1)".to_owned()));
    assert!(result.imported.contains(&"mindmaps (1)".to_owned()));

    for collection in ["tickets", "palettes", "mindmaps"] {
        assert_eq!(
            target.load_all(collection).await.unwrap(),
            source.load_all(collection).await.unwrap(),
            "{collection}"
        );
    }
    let maps = target.load_all_entities::<MindMap>().await.unwrap();
    assert_eq!(maps[0].root.children[0].text, "Leaf");
    assert_ne!(maps[0].root.id, maps[0].root.children[0].id);
}

// =============================================================================
// Export / import
// =============================================================================

#[tokio::test]
async fn export_then_replace_import_reproduces_contents() {
    let source = open_manager().await;
    source.save("palettes", &palette("First")).await.unwrap();
    source.save("palettes", &palette("Second")).await.unwrap();
    source.save("preferences", &preferences(&["qr"])).await.unwrap();

    let export = source.export_all().await.unwrap();
    assert_eq!(export.version, EXPORT_FORMAT_VERSION);
    let text = serde_json::to_string(&export).unwrap();

    let target = open_manager().await;
    target.save("palettes", &palette("Stale")).await.unwrap();

    let snapshot = serde_json::from_str(&text).unwrap();
    let result = target.import_data(&snapshot, ImportOptions::default()).await;
    assert!(result.success, "{result:?}");
    assert!(result.errors.is_empty());
    assert!(result.imported.contains(&"palettes (2)".to_owned()));
    assert!(result.imported.contains(&"preferences".to_owned()));
    assert!(result.message.starts_with("Successfully imported:"));

    let names: Vec<_> = target
        .load_all_entities::<Palette>()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["First".to_owned(), "Second".to_owned()]);
    let prefs = target
        .load_by_id("preferences", USER_PREFERENCES_KEY)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(prefs["favorites"], json!(["qr"]));
}

#[tokio::test]
async fn merge_import_appends_and_keeps_existing_rows() {
    let manager = open_manager().await;
    let RecordKey::Id(existing) = manager.save("palettes", &palette("Existing")).await.unwrap()
    else {
        panic!("palettes use numeric keys");
    };

    let mut export = manager.export_all().await.unwrap();
    export.data.palettes = Some(vec![{
        let mut row = palette("Incoming");
        row["id"] = json!(existing);
        row
    }]);

    let result = manager
        .import_data(&export, ImportOptions { merge: true })
        .await;
    assert!(result.success);

    let rows = manager.load_all("palettes").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "Existing");
    assert_eq!(rows[1]["name"], "Incoming");
    assert_ne!(rows[0]["id"], rows[1]["id"]);
}

#[tokio::test]
async fn replace_import_with_empty_collection_clears_it() {
    let manager = open_manager().await;
    manager.save("palettes", &palette("Gone")).await.unwrap();
    manager.save("palettes", &palette("Also gone")).await.unwrap();

    let mut export = manager.export_all().await.unwrap();
    export.data = atelier_types::ExportData {
        palettes: Some(Vec::new()),
        ..atelier_types::ExportData::default()
    };

    let result = manager.import_data(&export, ImportOptions::default()).await;
    assert!(result.success);
    assert_eq!(result.imported, vec!["palettes (0)".to_owned()]);
    assert_eq!(manager.load_all("palettes").await.unwrap().len(), 0);
}

#[tokio::test]
async fn import_isolates_invalid_collections() {
    let manager = open_manager().await;
    manager.save("palettes", &palette("Survivor")).await.unwrap();

    let mut export = manager.export_all().await.unwrap();
    export.data.palettes = Some(vec![json!({ "name": "" })]);
    export.data.tickets = Some(Vec::new());

    let result = manager.import_data(&export, ImportOptions::default()).await;
    assert!(result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("palettes:"));
    assert!(!result.imported.iter().any(|label| label.starts_with("palettes")));

    let rows = manager.load_all("palettes").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Survivor");
}

#[tokio::test]
async fn import_rejects_unknown_format_version() {
    let manager = open_manager().await;
    manager.save("palettes", &palette("Untouched")).await.unwrap();

    let mut export = manager.export_all().await.unwrap();
    export.version = "0.9".to_owned();
    export.data.palettes = Some(Vec::new());

    let result = manager.import_data(&export, ImportOptions::default()).await;
    assert!(!result.success);
    assert!(result.imported.is_empty());
    assert_eq!(manager.load_all("palettes").await.unwrap().len(), 1);
}

// =============================================================================
// Record round trips
// =============================================================================

#[tokio::test]
async fn ticket_completion_is_stamped_and_cleared() {
    let manager = open_manager().await;
    let key = manager.save("tickets", &ticket("completed")).await.unwrap();

    let mut row = manager.load_by_id("tickets", key.clone()).await.unwrap().unwrap();
    assert_eq!(row["title"], "Printer offline");
    assert_eq!(row["customer"], "Acme");
    assert!(row["completedAt"].is_string());
    let completed = manager.load_entity::<Ticket>(key.clone()).await.unwrap().unwrap();
    assert_eq!(completed.status, TicketStatus::Completed);

    row["status"] = json!("todo");
    assert_eq!(manager.save("tickets", &row).await.unwrap(), key);
    let reopened = manager.load_by_id("tickets", key).await.unwrap().unwrap();
    assert_eq!(reopened["status"], "todo");
    assert!(reopened.get("completedAt").is_none());
    assert_eq!(manager.load_all("tickets").await.unwrap().len(), 1);
}

#[tokio::test]
async fn callback_ticket_update_without_callback_time_is_rejected() {
    let manager = open_manager().await;
    let mut callback = ticket("todo");
    callback["type"] = json!("callback");
    callback["callbackTime"] = json!("2026-03-02T09:00:00.000Z");
    let key = manager.save("tickets", &callback).await.unwrap();
    let stored = manager.load_by_id("tickets", key.clone()).await.unwrap().unwrap();

    let mut update = stored.clone();
    update["title"] = json!("Renamed");
    update.as_object_mut().unwrap().remove("callbackTime");
    let err = manager.save("tickets", &update).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "{err:?}");

    assert_eq!(manager.load_by_id("tickets", key).await.unwrap().unwrap(), stored);
}

#[tokio::test]
async fn mind_map_round_trips() {
    let manager = open_manager().await;
    let map = json!({
        "name": "Roadmap",
        "root": {
            "id": 1, "text": "Q3", "x": 10.5, "y": -4.25, "color": "#3B82F6", "shape": "ellipse",
            "children": [
                { "id": 2, "text": "Ship", "x": 120.5, "y": 30.75, "color": "#10B981", "shape": "rect", "children": [] }
            ]
        },
        "connector": "elbow",
        "zoom": 1.5,
        "pan": { "x": -20.5, "y": 8.5 },
        "createdAt": "2026-03-01T10:00:00.000Z",
        "updatedAt": "2026-03-01T10:00:00.000Z",
        "version": 1
    });
    let key = manager.save("mindmaps", &map).await.unwrap();

    let mut row = manager.load_by_id("mindmaps", key.clone()).await.unwrap().unwrap();
    row.as_object_mut().unwrap().remove("id");
    assert_eq!(row, map);

    let loaded = manager.load_entity::<MindMap>(key).await.unwrap().unwrap();
    assert!((loaded.zoom - 1.5).abs() < f64::EPSILON);
    assert_eq!(loaded.root.children[0].text, "Ship");
}

#[tokio::test]
async fn tool_config_round_trips_by_tool_id() {
    let manager = open_manager().await;
    let config = json!({
        "toolId": "gradient",
        "config": { "angle": 45, "stops": ["#000000", "#ffffff"], "smooth": true },
        "isSession": true,
        "createdAt": "2026-03-01T10:00:00.000Z",
        "updatedAt": "2026-03-01T10:00:00.000Z",
        "version": 1
    });
    let key = manager.save("toolConfigs", &config).await.unwrap();
    assert_eq!(key, RecordKey::from("gradient"));

    let row = manager.load_by_id("toolConfigs", "gradient").await.unwrap().unwrap();
    assert_eq!(row, config);
    let typed = manager
        .load_entity::<ToolConfig>("gradient")
        .await
        .unwrap()
        .unwrap();
    assert!(typed.is_session);
    assert_eq!(typed.config["angle"], 45);
}

// =============================================================================
// Manager and statistics
// =============================================================================

#[tokio::test]
async fn unknown_collection_is_rejected_before_storage() {
    let manager = open_manager().await;
    let err = manager.save("widgets", &json!({})).await.unwrap_err();
    assert!(matches!(err, StoreError::UnknownCollection(ref name) if name == "widgets"));
}

#[tokio::test]
async fn stats_count_every_collection() {
    let manager = open_manager().await;
    manager.save("palettes", &palette("A")).await.unwrap();
    manager.save("palettes", &palette("B")).await.unwrap();
    manager.save("preferences", &preferences(&[])).await.unwrap();

    let stats = manager.storage_stats().await.unwrap();
    assert_eq!(stats.collections.len(), Collection::ALL.len());
    assert_eq!(stats.collections["palettes"], 2);
    assert_eq!(stats.collections["preferences"], 1);
    assert_eq!(stats.collections["tickets"], 0);
    assert_eq!(stats.total_items, 3);
    assert_eq!(stats.store_version, STORE_VERSION);
    assert!(stats.usage.unwrap_or_default() > 0);
    assert!(stats.quota.is_none());
    assert!(stats.percentage.is_none());
}

#[tokio::test]
async fn delete_and_clear_remove_rows() {
    let manager = open_manager().await;
    let first = manager.save("palettes", &palette("A")).await.unwrap();
    manager.save("palettes", &palette("B")).await.unwrap();

    manager.delete("palettes", first.clone()).await.unwrap();
    assert!(manager.load_by_id("palettes", first).await.unwrap().is_none());
    assert_eq!(manager.load_all("palettes").await.unwrap().len(), 1);

    manager.clear("palettes").await.unwrap();
    assert!(manager.load_all("palettes").await.unwrap().is_empty());
    assert!(
        manager
            .load_by_id("palettes", RecordKey::Id(999))
            .await
            .unwrap()
            .is_none()
    );
}

// =============================================================================
// State persistence
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct EditorState {
    zoom: u32,
    recent: Vec<String>,
}

#[tokio::test]
async fn state_survives_a_restart() {
    let manager = Arc::new(open_manager().await);
    let options = PersistOptions::default()
        .with_collection(Collection::Metadata)
        .with_debounce(Duration::from_millis(20));

    let container = StateContainer::new("editor", EditorState::default());
    let handle = attach(&container, Arc::clone(&manager), options.clone()).unwrap();
    handle.hydrated().wait().await;

    container.update(|s| s.zoom = 2);
    container.update(|s| s.recent.push("palette-1".to_owned()));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let row = manager
        .load_state(Collection::Metadata, "editor")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["zoom"], 2);
    assert_eq!(row["recent"], json!(["palette-1"]));
    assert!(row["updatedAt"].is_string());

    drop(container);
    handle.finished().await;

    let restored = StateContainer::new("editor", EditorState::default());
    let handle = attach(&restored, Arc::clone(&manager), options).unwrap();
    handle.hydrated().wait().await;
    assert_eq!(
        restored.get(),
        EditorState {
            zoom: 2,
            recent: vec!["palette-1".to_owned()],
        }
    );
    handle.abort();
}
