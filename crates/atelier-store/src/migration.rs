//! One-time migration from legacy key/value storage into the structured
//! store.
//!
//! Each legacy source is read, reshaped, and written independently. A
//! source that fails to parse or write is logged, recorded in the result's
//! error list, and skipped; the others still migrate. After every source
//! has been attempted the completion status is set, whether or not any
//! source failed, so the migration never runs twice.
//!
//! Legacy rows predate the current shape contracts, so each one is brought
//! up to its collection's shape first: missing required fields get the
//! defaults the application has always used, mind-map nodes get unique
//! numeric ids, and the result goes through the schema validator like any
//! other write. A source holding a row that still does not fit fails as a
//! whole and stays in legacy storage.

use std::collections::HashSet;

use atelier_types::{
    Collection, LastMigration, MetadataEntry, MigrationResult, USER_PREFERENCES_KEY,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::error::StoreError;
use crate::legacy::{LegacyStorage, MigrationStatus};
use crate::schema::RecordKey;
use crate::store::StructuredStore;
use crate::validation::{format_timestamp, validate_at};

/// Metadata key of the migration summary row.
pub const LAST_MIGRATION_KEY: &str = "last-migration";

/// Format version of the legacy key/value storage.
pub const LEGACY_FORMAT_VERSION: u32 = 0;

/// Format version written by the migration.
pub const MIGRATED_FORMAT_VERSION: u32 = 1;

/// Fill color for legacy mind-map nodes that carry none.
const DEFAULT_NODE_COLOR: &str = "#3B82F6";

/// One legacy dataset and where it goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacySource {
    /// List of palettes.
    Palettes,
    /// List of tickets.
    Tickets,
    /// A single mind-map root node.
    MindMap,
    /// A list of checklist pages.
    Checklist,
    /// A list of favorite tool ids.
    Favorites,
}

impl LegacySource {
    /// Every source, in migration order.
    pub const ALL: [Self; 5] = [
        Self::Palettes,
        Self::Tickets,
        Self::MindMap,
        Self::Checklist,
        Self::Favorites,
    ];

    /// The legacy storage key holding this dataset.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Palettes => "ui-tools-saved-palettes",
            Self::Tickets => "ui-tools-tickets",
            Self::MindMap => "mindMapData",
            Self::Checklist => "checklistData",
            Self::Favorites => "favorites",
        }
    }

    /// Label used in results and the summary row.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Palettes => "palettes",
            Self::Tickets => "tickets",
            Self::MindMap => "mindmaps",
            Self::Checklist => "checklists",
            Self::Favorites => "favorites",
        }
    }
}

/// Moves legacy datasets into the structured store exactly once.
#[derive(Debug)]
pub struct MigrationService<L, M> {
    store: StructuredStore,
    legacy: L,
    status: M,
}

impl<L: LegacyStorage, M: MigrationStatus> MigrationService<L, M> {
    /// Create a service reading from `legacy` and gated by `status`.
    pub const fn new(store: StructuredStore, legacy: L, status: M) -> Self {
        Self {
            store,
            legacy,
            status,
        }
    }

    /// Whether the migration still has to run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the status cannot be read.
    pub fn needs_migration(&self) -> Result<bool, StoreError> {
        Ok(!self.status.is_complete()?)
    }

    /// Summary of the last completed migration, if one was recorded.
    ///
    /// # Errors
    ///
    /// Returns a storage error, or [`StoreError::Serialization`] if the
    /// summary row is malformed.
    pub async fn last_migration(&self) -> Result<Option<LastMigration>, StoreError> {
        let row = self
            .store
            .table(Collection::Metadata)
            .get(&RecordKey::from(LAST_MIGRATION_KEY))
            .await?;
        row.map(|row| -> Result<LastMigration, StoreError> {
            let entry: MetadataEntry = serde_json::from_value(row)?;
            Ok(serde_json::from_value(entry.value)?)
        })
        .transpose()
    }

    /// Run the migration if it has not run yet.
    pub async fn run(&self) -> MigrationResult {
        self.run_at(Utc::now()).await
    }

    /// [`Self::run`] with an explicit clock.
    pub async fn run_at(&self, now: DateTime<Utc>) -> MigrationResult {
        match self.status.is_complete() {
            Ok(true) => {
                tracing::debug!("Legacy migration already complete");
                return result(true, 0, Vec::new());
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(error = %e, "Could not read migration status");
                return result(false, 0, vec![e.to_string()]);
            }
        }

        let now_text = format_timestamp(now);
        let mut migrated = Vec::new();
        let mut errors = Vec::new();
        let mut total_items: u64 = 0;

        for source in LegacySource::ALL {
            match self.migrate_source(source, now).await {
                Ok(None) => {}
                Ok(Some(count)) => {
                    tracing::info!(source = source.label(), count, "Migrated legacy data");
                    migrated.push(source.label().to_owned());
                    total_items = total_items.saturating_add(count);
                }
                Err(e) => {
                    tracing::error!(
                        source = source.label(),
                        key = source.key(),
                        error = %e,
                        "Failed to migrate legacy data"
                    );
                    errors.push(format!("{}: {e}", source.label()));
                }
            }
        }

        if let Err(e) = self.status.mark_complete() {
            tracing::error!(error = %e, "Could not mark migration complete");
            errors.push(e.to_string());
            return result(false, total_items, errors);
        }

        let summary = LastMigration {
            timestamp: now_text.clone(),
            collections: migrated,
            total_items,
        };
        if let Err(e) = self.record_summary(&summary, &now_text).await {
            tracing::warn!(error = %e, "Could not record migration summary");
            errors.push(format!("{LAST_MIGRATION_KEY}: {e}"));
        }

        tracing::info!(
            collections = summary.collections.len(),
            total_items,
            failed = errors.len(),
            "Legacy migration complete"
        );
        result(true, total_items, errors)
    }

    /// Migrate one source. `None` when the legacy key is absent or empty.
    async fn migrate_source(
        &self,
        source: LegacySource,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError> {
        let Some(raw) = self.legacy.get_item(source.key())? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        let parsed: Value = serde_json::from_str(&raw)?;
        let now_text = format_timestamp(now);

        let count = match source {
            LegacySource::Palettes | LegacySource::Tickets => {
                let collection = if source == LegacySource::Palettes {
                    Collection::Palettes
                } else {
                    Collection::Tickets
                };
                let rows = expect_list(source, parsed)?
                    .into_iter()
                    .map(|item| conform(collection, stamp_legacy_record(item, &now_text)?, now))
                    .collect::<Result<Vec<_>, _>>()?;
                self.store.table(collection).bulk_add(&rows).await?.len()
            }
            LegacySource::MindMap => {
                let document = json!({
                    "name": "Migrated Mind Map",
                    "root": parsed,
                    "connector": "curved",
                    "zoom": 1.0,
                    "pan": { "x": 0.0, "y": 0.0 },
                    "createdAt": now_text,
                    "updatedAt": now_text,
                    "version": MIGRATED_FORMAT_VERSION,
                });
                let document = conform(Collection::MindMaps, document, now)?;
                self.store
                    .table(Collection::MindMaps)
                    .bulk_add(&[document])
                    .await?
                    .len()
            }
            LegacySource::Checklist => {
                let pages = expect_list(source, parsed)?;
                let document = json!({
                    "projectName": "Default Project",
                    "pages": pages,
                    "createdAt": now_text,
                    "updatedAt": now_text,
                    "version": MIGRATED_FORMAT_VERSION,
                });
                let document = conform(Collection::Checklists, document, now)?;
                self.store
                    .table(Collection::Checklists)
                    .bulk_add(&[document])
                    .await?
                    .len()
            }
            LegacySource::Favorites => {
                let favorites = expect_list(source, parsed)?;
                self.merge_favorites(favorites, now).await?;
                1
            }
        };

        Ok(Some(u64::try_from(count).unwrap_or(u64::MAX)))
    }

    /// Write favorites into the preferences row, keeping its other fields.
    async fn merge_favorites(
        &self,
        favorites: Vec<Value>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let table = self.store.table(Collection::Preferences);
        let mut prefs = match table.get(&RecordKey::from(USER_PREFERENCES_KEY)).await? {
            Some(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        prefs.insert("key".to_owned(), Value::from(USER_PREFERENCES_KEY));
        prefs.insert("favorites".to_owned(), Value::Array(favorites));
        prefs.insert("updatedAt".to_owned(), Value::from(format_timestamp(now)));
        let prefs = validate_at(Collection::Preferences, &Value::Object(prefs), now)?;
        table.put(&prefs).await?;
        Ok(())
    }

    async fn record_summary(&self, summary: &LastMigration, now: &str) -> Result<(), StoreError> {
        let entry = MetadataEntry {
            key: LAST_MIGRATION_KEY.to_owned(),
            value: serde_json::to_value(summary)?,
            updated_at: now.to_owned(),
        };
        self.store
            .table(Collection::Metadata)
            .put(&serde_json::to_value(&entry)?)
            .await?;
        Ok(())
    }
}

fn result(success: bool, affected_items: u64, errors: Vec<String>) -> MigrationResult {
    MigrationResult {
        success,
        migrated_from: LEGACY_FORMAT_VERSION,
        migrated_to: MIGRATED_FORMAT_VERSION,
        affected_items,
        errors: (!errors.is_empty()).then_some(errors),
    }
}

fn expect_list(source: LegacySource, value: Value) -> Result<Vec<Value>, StoreError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(StoreError::Legacy(format!(
            "{} holds {}, expected a JSON array",
            source.key(),
            json_kind(&other)
        ))),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Stamp base entity fields on a legacy list item and drop its legacy id.
fn stamp_legacy_record(item: Value, now: &str) -> Result<Value, StoreError> {
    let Value::Object(mut fields) = item else {
        return Err(StoreError::Legacy(format!(
            "legacy record is {}, expected an object",
            json_kind(&item)
        )));
    };
    fields.remove("id");
    let created_at = fields
        .get("createdAt")
        .and_then(legacy_timestamp)
        .or_else(|| fields.get("timestamp").and_then(legacy_timestamp))
        .unwrap_or_else(|| now.to_owned());
    fields.insert("createdAt".to_owned(), Value::from(created_at));
    fields.insert("updatedAt".to_owned(), Value::from(now));
    fields.insert("version".to_owned(), Value::from(MIGRATED_FORMAT_VERSION));
    Ok(Value::Object(fields))
}

/// A legacy timestamp as text: RFC 3339 strings are kept, epoch
/// milliseconds are converted, anything else is ignored.
fn legacy_timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if DateTime::parse_from_rfc3339(text).is_ok() => Some(text.clone()),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(format_timestamp),
        _ => None,
    }
}

// =============================================================================
// Shape upgrades
// =============================================================================

/// Fill what a legacy row lacks, then validate it against `collection`.
fn conform(
    collection: Collection,
    mut record: Value,
    now: DateTime<Utc>,
) -> Result<Value, StoreError> {
    if let Value::Object(fields) = &mut record {
        match collection {
            Collection::Palettes => {
                fill_blank(fields, "name", json!("Untitled Palette"));
            }
            Collection::Tickets => {
                let callback = fields
                    .get("callbackTime")
                    .and_then(Value::as_str)
                    .is_some_and(|time| !time.trim().is_empty());
                fill_blank(fields, "title", json!("Untitled Ticket"));
                fill_blank(fields, "description", json!(""));
                fill_blank(fields, "priority", json!("medium"));
                fill_blank(fields, "status", json!("todo"));
                fill_blank(fields, "type", json!(if callback { "callback" } else { "task" }));
            }
            Collection::MindMaps => {
                if let Some(root) = fields.get_mut("root") {
                    conform_node_tree(root);
                }
            }
            Collection::Checklists => {
                if let Some(Value::Array(pages)) = fields.get_mut("pages") {
                    for page in pages.iter_mut().filter_map(Value::as_object_mut) {
                        fill_blank(page, "name", json!(""));
                        fill_blank(page, "checks", json!({}));
                    }
                }
            }
            Collection::Skills
            | Collection::ToolConfigs
            | Collection::Preferences
            | Collection::Metadata => {}
        }
    }
    Ok(validate_at(collection, &record, now)?)
}

/// Set `field` to `default` when it is absent, null, or an empty string.
fn fill_blank(fields: &mut Map<String, Value>, field: &str, default: Value) {
    let blank = match fields.get(field) {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(_) => false,
    };
    if blank {
        fields.insert(field.to_owned(), default);
    }
}

/// Give every node the drawing defaults it lacks and a unique integer id.
///
/// Integer ids are kept on their first occurrence; missing, non-integer and
/// repeated ids are renumbered above the largest id in the tree.
fn conform_node_tree(root: &mut Value) {
    let mut next_id: i64 = 0;
    for_each_node(root, |node| {
        if let Some(id) = node.get("id").and_then(Value::as_i64) {
            next_id = next_id.max(id.saturating_add(1));
        }
    });

    let mut seen = HashSet::new();
    for_each_node(root, |node| {
        let kept = node
            .get("id")
            .and_then(Value::as_i64)
            .filter(|id| seen.insert(*id));
        if kept.is_none() {
            node.insert("id".to_owned(), Value::from(next_id));
            seen.insert(next_id);
            next_id = next_id.saturating_add(1);
        }
        fill_blank(node, "text", json!(""));
        fill_blank(node, "x", json!(0.0));
        fill_blank(node, "y", json!(0.0));
        fill_blank(node, "color", json!(DEFAULT_NODE_COLOR));
        fill_blank(node, "shape", json!("rect"));
        if !node.get("children").is_some_and(Value::is_array) {
            node.insert("children".to_owned(), json!([]));
        }
    });
}

/// Visit every object node of a tree in pre-order, without recursion.
fn for_each_node(root: &mut Value, mut visit: impl FnMut(&mut Map<String, Value>)) {
    let mut pending = vec![root];
    while let Some(node) = pending.pop() {
        let Value::Object(fields) = node else {
            continue;
        };
        visit(fields);
        if let Some(Value::Array(children)) = fields.get_mut("children") {
            pending.extend(children.iter_mut().rev());
        }
    }
}
