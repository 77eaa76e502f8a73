//! Whole-store export and import.
//!
//! An export is a [`DataExport`] snapshot of every user collection plus the
//! preferences singleton. Import applies a snapshot collection by
//! collection: each one succeeds or fails on its own, and failures are
//! collected into the [`ImportResult`] instead of aborting the import.
//!
//! # Modes
//!
//! - **Replace** (`merge = false`): each collection present in the snapshot
//!   replaces the stored one atomically. A present but empty collection
//!   clears it.
//! - **Merge** (`merge = true`): existing rows stay. Rows of auto-increment
//!   collections are appended with fresh ids; rows of keyed collections
//!   whose key already exists are skipped. The preferences row follows the
//!   same rule.
//!
//! Imported rows are schema-validated like any other write.

use atelier_types::{
    Collection, DataExport, EXPORT_FORMAT_VERSION, ExportData, ImportOptions, ImportResult,
    USER_PREFERENCES_KEY,
};
use chrono::Utc;
use serde_json::Value;

use crate::error::StoreError;
use crate::manager::PersistenceManager;
use crate::schema::{KeyPolicy, RecordKey};
use crate::validation::{self, format_timestamp};

impl PersistenceManager {
    /// Snapshot every exported collection.
    ///
    /// # Errors
    ///
    /// Returns a storage error if any collection cannot be read.
    pub async fn export_all(&self) -> Result<DataExport, StoreError> {
        let store = self.store();
        let data = ExportData {
            palettes: Some(store.table(Collection::Palettes).get_all().await?),
            tickets: Some(store.table(Collection::Tickets).get_all().await?),
            mindmaps: Some(store.table(Collection::MindMaps).get_all().await?),
            checklists: Some(store.table(Collection::Checklists).get_all().await?),
            skills: Some(store.table(Collection::Skills).get_all().await?),
            tool_configs: Some(store.table(Collection::ToolConfigs).get_all().await?),
            preferences: store
                .table(Collection::Preferences)
                .get(&RecordKey::from(USER_PREFERENCES_KEY))
                .await?,
        };

        tracing::info!(application = %self.application(), "Exported all collections");

        Ok(DataExport {
            version: EXPORT_FORMAT_VERSION.to_owned(),
            exported_at: format_timestamp(Utc::now()),
            application: self.application().to_owned(),
            data,
            checksum: String::new(),
        })
    }

    /// Apply a snapshot.
    ///
    /// Never fails as a whole: an unsupported version yields an
    /// unsuccessful result with nothing touched, and per-collection
    /// failures are listed in [`ImportResult::errors`]. The import counts
    /// as successful when at least one collection was imported.
    pub async fn import_data(&self, snapshot: &DataExport, options: ImportOptions) -> ImportResult {
        if snapshot.version != EXPORT_FORMAT_VERSION {
            let error = format!(
                "Unsupported export version {:?}, expected {EXPORT_FORMAT_VERSION:?}",
                snapshot.version
            );
            tracing::warn!(version = %snapshot.version, "Rejected import");
            return ImportResult {
                success: false,
                imported: Vec::new(),
                message: format!("Import failed: {error}"),
                errors: vec![error],
            };
        }

        let data = &snapshot.data;
        let sections = [
            (Collection::Palettes, data.palettes.as_deref()),
            (Collection::Tickets, data.tickets.as_deref()),
            (Collection::MindMaps, data.mindmaps.as_deref()),
            (Collection::Checklists, data.checklists.as_deref()),
            (Collection::Skills, data.skills.as_deref()),
            (Collection::ToolConfigs, data.tool_configs.as_deref()),
        ];

        let mut imported = Vec::new();
        let mut errors = Vec::new();

        for (collection, rows) in sections {
            let Some(rows) = rows else {
                continue;
            };
            match self.import_collection(collection, rows, options.merge).await {
                Ok(count) => {
                    tracing::info!(%collection, count, merge = options.merge, "Imported collection");
                    imported.push(format!("{collection} ({count})"));
                }
                Err(e) => {
                    tracing::error!(%collection, error = %e, "Failed to import collection");
                    errors.push(format!("{collection}: {e}"));
                }
            }
        }

        if let Some(preferences) = &data.preferences {
            match self.import_preferences(preferences, options.merge).await {
                Ok(true) => imported.push(Collection::Preferences.to_string()),
                Ok(false) => {
                    tracing::debug!("Kept existing preferences on merge import");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to import preferences");
                    errors.push(format!("{}: {e}", Collection::Preferences));
                }
            }
        }

        let success = !imported.is_empty();
        let message = if success {
            format!("Successfully imported: {}", imported.join(", "))
        } else {
            "No data imported".to_owned()
        };

        ImportResult {
            success,
            imported,
            errors,
            message,
        }
    }

    /// Import one collection. Returns the number of rows written.
    async fn import_collection(
        &self,
        collection: Collection,
        rows: &[Value],
        merge: bool,
    ) -> Result<usize, StoreError> {
        let mut normalized = rows
            .iter()
            .map(|row| validation::validate(collection, row))
            .collect::<Result<Vec<_>, _>>()?;
        let table = self.store().table(collection);

        if !merge {
            return Ok(table.replace_all(&normalized).await?.len());
        }

        match table.spec().key {
            KeyPolicy::AutoIncrement => {
                for row in &mut normalized {
                    if let Value::Object(fields) = row {
                        fields.remove("id");
                    }
                }
            }
            KeyPolicy::Field(field) => {
                let mut fresh = Vec::with_capacity(normalized.len());
                for row in normalized {
                    let key = row.get(field).and_then(Value::as_str).unwrap_or_default();
                    if table.get(&RecordKey::from(key)).await?.is_none() {
                        fresh.push(row);
                    } else {
                        tracing::debug!(%collection, key, "Skipped existing row");
                    }
                }
                normalized = fresh;
            }
        }

        Ok(table.bulk_add(&normalized).await?.len())
    }

    /// Import the preferences row. A merge keeps an existing row, like any
    /// other keyed row. Returns whether the row was written.
    async fn import_preferences(
        &self,
        preferences: &Value,
        merge: bool,
    ) -> Result<bool, StoreError> {
        let normalized = validation::validate(Collection::Preferences, preferences)?;
        let table = self.store().table(Collection::Preferences);
        if merge && table.get(&RecordKey::from(USER_PREFERENCES_KEY)).await?.is_some() {
            return Ok(false);
        }
        table.put(&normalized).await?;
        Ok(true)
    }
}
