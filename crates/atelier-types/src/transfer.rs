//! Export snapshots and the structured results returned to the UI.
//!
//! Migration and import report partial failures as data (a success flag plus
//! an error list) rather than as errors, so calling code can render
//! partial-success messaging.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// The only export format version accepted on import.
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// A full snapshot of every exported collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct DataExport {
    /// Export format version, see [`EXPORT_FORMAT_VERSION`].
    pub version: String,
    /// When the snapshot was taken (RFC 3339).
    pub exported_at: String,
    /// Application name.
    pub application: String,
    /// The exported rows.
    pub data: ExportData,
    /// Reserved integrity field. Written empty and not verified.
    #[serde(default)]
    pub checksum: String,
}

/// Per-collection rows of a [`DataExport`].
///
/// A collection that is `None` is absent from the snapshot and untouched by
/// import. `Some(vec![])` is present and empty, which a replace import
/// treats as "clear this collection".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ExportData {
    /// Palette rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palettes: Option<Vec<serde_json::Value>>,
    /// Ticket rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tickets: Option<Vec<serde_json::Value>>,
    /// Mind-map rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mindmaps: Option<Vec<serde_json::Value>>,
    /// Checklist rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklists: Option<Vec<serde_json::Value>>,
    /// Skills profile rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<serde_json::Value>>,
    /// Tool configuration rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_configs: Option<Vec<serde_json::Value>>,
    /// The user preferences singleton.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<serde_json::Value>,
}

/// Options for an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ImportOptions {
    /// Keep existing rows and append (`true`), or clear each imported
    /// collection first (`false`).
    pub merge: bool,
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ImportResult {
    /// Whether at least one collection was imported.
    pub success: bool,
    /// Labels of the imported collections, e.g. `palettes (3)`.
    pub imported: Vec<String>,
    /// One entry per failed collection.
    pub errors: Vec<String>,
    /// Human-readable summary.
    pub message: String,
}

/// Outcome of the legacy storage migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MigrationResult {
    /// False only if the routine failed before marking itself complete.
    pub success: bool,
    /// Source format version (0 = legacy key/value storage).
    pub migrated_from: u32,
    /// Target format version.
    pub migrated_to: u32,
    /// Number of rows written.
    pub affected_items: u64,
    /// Isolated per-source failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

/// Bookkeeping row written after a legacy migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct LastMigration {
    /// When the migration ran.
    pub timestamp: String,
    /// Sources that migrated successfully.
    pub collections: Vec<String>,
    /// Number of rows written.
    pub total_items: u64,
}

/// Aggregate storage statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct StorageStats {
    /// Row count per collection name.
    pub collections: BTreeMap<String, u64>,
    /// Sum of all row counts.
    pub total_items: u64,
    /// Current structured store version.
    pub store_version: u32,
    /// Bytes used by the database, when the engine reports it.
    pub usage: Option<u64>,
    /// Configured storage quota in bytes, when one is set.
    pub quota: Option<u64>,
    /// `usage / quota` as a percentage, when both are known.
    pub percentage: Option<f64>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn export_data_distinguishes_absent_from_empty() {
        let json = serde_json::json!({ "palettes": [] });
        let data: ExportData = serde_json::from_value(json).unwrap();
        assert_eq!(data.palettes, Some(vec![]));
        assert!(data.tickets.is_none());
    }

    #[test]
    fn snapshot_uses_camel_case() {
        let export = DataExport {
            version: EXPORT_FORMAT_VERSION.to_owned(),
            exported_at: "2026-01-01T00:00:00Z".to_owned(),
            application: "UI Tools Atelier".to_owned(),
            data: ExportData {
                tool_configs: Some(vec![]),
                ..ExportData::default()
            },
            checksum: String::new(),
        };
        let json = serde_json::to_value(&export).unwrap();
        assert!(json.get("exportedAt").is_some());
        assert!(json["data"].get("toolConfigs").is_some());
        assert!(json["data"].get("palettes").is_none());
    }

    #[test]
    fn migration_result_omits_empty_errors() {
        let result = MigrationResult {
            success: true,
            migrated_from: 0,
            migrated_to: 1,
            affected_items: 0,
            errors: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("errors").is_none());
        assert_eq!(json["affectedItems"], 0);
    }
}
