//! Persisted entity structs.
//!
//! Every entity except [`UserPreferences`] and [`MetadataEntry`] carries the
//! base entity fields: an optional store-assigned `id`, `createdAt` and
//! `updatedAt` RFC 3339 timestamps, and a record-shape `version`.
//!
//! Field-level bounds (lengths, numeric ranges) are declared here with
//! `validator` attributes. Checks that span more than one field, or that
//! need a parser (timestamps, color codes, the mind-map tree), live in the
//! schema validator of `atelier-store`.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use validator::Validate;

use crate::collection::Collection;
use crate::enums::{Connector, NodeShape, Priority, Theme, TicketStatus, TicketType};

/// Fixed row key of the user preferences singleton.
pub const USER_PREFERENCES_KEY: &str = "user-preferences";

/// A persisted entity type with a home collection.
///
/// Lets typed callers save and load without naming the collection.
pub trait Entity: Serialize + DeserializeOwned {
    /// The collection this entity is stored in.
    const COLLECTION: Collection;
}

// ---------------------------------------------------------------------------
// Palettes
// ---------------------------------------------------------------------------

/// A named, ordered list of colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Palette {
    /// Store-assigned identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "number")]
    pub id: Option<i64>,
    /// Display name.
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Colors as `#RRGGBB` strings.
    #[validate(length(min = 1, max = 20))]
    pub colors: Vec<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 10))]
    pub tags: Option<Vec<String>>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last modification timestamp.
    pub updated_at: String,
    /// Record-shape version.
    pub version: u32,
}

impl Entity for Palette {
    const COLLECTION: Collection = Collection::Palettes;
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// A support ticket or callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Ticket {
    /// Store-assigned identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "number")]
    pub id: Option<i64>,
    /// Short summary.
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Long-form description.
    #[validate(length(max = 5000))]
    pub description: String,
    /// Customer the ticket is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 200))]
    pub customer: Option<String>,
    /// Urgency.
    pub priority: Priority,
    /// Workflow state.
    pub status: TicketStatus,
    /// Due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Set exactly when `status` is `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Ticket kind.
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    /// When to call the customer back. Required for callback tickets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_time: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 10))]
    pub tags: Option<Vec<String>>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last modification timestamp.
    pub updated_at: String,
    /// Record-shape version.
    pub version: u32,
}

impl Entity for Ticket {
    const COLLECTION: Collection = Collection::Tickets;
}

// ---------------------------------------------------------------------------
// Mind maps
// ---------------------------------------------------------------------------

/// One node of a mind-map tree. Owned entirely by its document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MindMapNode {
    /// Identifier, unique within the document.
    #[ts(type = "number")]
    pub id: i64,
    /// Node label.
    pub text: String,
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Fill color as `#RRGGBB`.
    pub color: String,
    /// Drawing shape.
    pub shape: NodeShape,
    /// Child nodes.
    pub children: Vec<MindMapNode>,
}

/// Canvas pan offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Pan {
    /// Horizontal offset.
    pub x: f64,
    /// Vertical offset.
    pub y: f64,
}

/// A mind-map document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MindMap {
    /// Store-assigned identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "number")]
    pub id: Option<i64>,
    /// Document name.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Root of the node tree.
    pub root: MindMapNode,
    /// Connector line style.
    pub connector: Connector,
    /// Zoom factor.
    #[validate(range(min = 0.1, max = 5.0))]
    pub zoom: f64,
    /// Canvas pan offset.
    pub pan: Pan,
    /// Creation timestamp.
    pub created_at: String,
    /// Last modification timestamp.
    pub updated_at: String,
    /// Record-shape version.
    pub version: u32,
}

impl Entity for MindMap {
    const COLLECTION: Collection = Collection::MindMaps;
}

// ---------------------------------------------------------------------------
// Checklists
// ---------------------------------------------------------------------------

/// One audited page of a checklist.
///
/// `checks` maps a rule id to its status: 0 = todo, 1 = validated,
/// 2 = problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, Validate)]
#[ts(export, export_to = "bindings/")]
pub struct ChecklistPage {
    /// Page name.
    #[validate(length(max = 200))]
    pub name: String,
    /// Rule id to status.
    pub checks: BTreeMap<String, u8>,
}

/// A checklist document for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Checklist {
    /// Store-assigned identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "number")]
    pub id: Option<i64>,
    /// Project the checklist belongs to.
    #[validate(length(min = 1, max = 200))]
    pub project_name: String,
    /// Audited pages, in order.
    #[validate(nested)]
    pub pages: Vec<ChecklistPage>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last modification timestamp.
    pub updated_at: String,
    /// Record-shape version.
    pub version: u32,
}

impl Entity for Checklist {
    const COLLECTION: Collection = Collection::Checklists;
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

/// A single skill and its self-assessed level (0 = none, 5 = expert).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, Validate)]
#[ts(export, export_to = "bindings/")]
pub struct Skill {
    /// Skill name.
    #[validate(length(max = 100))]
    pub name: String,
    /// Level from 0 to 5.
    #[validate(range(max = 5))]
    pub level: u8,
}

/// A named group of skills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, Validate)]
#[ts(export, export_to = "bindings/")]
pub struct SkillCategory {
    /// Category name.
    #[validate(length(max = 100))]
    pub name: String,
    /// Skills in this category.
    #[validate(nested)]
    pub skills: Vec<Skill>,
}

/// A skills profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SkillsProfile {
    /// Store-assigned identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "number")]
    pub id: Option<i64>,
    /// Owner, reserved for multi-user setups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Skill categories.
    #[validate(nested)]
    pub categories: Vec<SkillCategory>,
    /// Skills outside any category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub custom_skills: Option<Vec<Skill>>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last modification timestamp.
    pub updated_at: String,
    /// Record-shape version.
    pub version: u32,
}

impl Entity for SkillsProfile {
    const COLLECTION: Collection = Collection::Skills;
}

// ---------------------------------------------------------------------------
// Tool configuration
// ---------------------------------------------------------------------------

/// Saved configuration for one generator tool, keyed by `toolId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ToolConfig {
    /// Unused identity slot kept for shape compatibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "number")]
    pub id: Option<i64>,
    /// Tool identifier, e.g. `gradient-generator`.
    #[validate(length(min = 1, max = 100))]
    pub tool_id: String,
    /// Tool-specific configuration blob.
    pub config: BTreeMap<String, serde_json::Value>,
    /// Whether this config only lives for the current session.
    pub is_session: bool,
    /// Creation timestamp.
    pub created_at: String,
    /// Last modification timestamp.
    pub updated_at: String,
    /// Record-shape version.
    pub version: u32,
}

impl Entity for ToolConfig {
    const COLLECTION: Collection = Collection::ToolConfigs;
}

// ---------------------------------------------------------------------------
// Preferences and metadata
// ---------------------------------------------------------------------------

fn default_preferences_key() -> String {
    USER_PREFERENCES_KEY.to_owned()
}

/// The user preferences singleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct UserPreferences {
    /// Row key, always [`USER_PREFERENCES_KEY`].
    #[serde(default = "default_preferences_key")]
    pub key: String,
    /// Color theme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    /// UI language code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Favorite tool ids.
    pub favorites: Vec<String>,
    /// Default configuration per tool id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_tool_configs: Option<BTreeMap<String, serde_json::Value>>,
    /// Last modification timestamp.
    pub updated_at: String,
}

impl Entity for UserPreferences {
    const COLLECTION: Collection = Collection::Preferences;
}

/// An app-level key/value fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MetadataEntry {
    /// Row key.
    #[validate(length(min = 1, max = 200))]
    pub key: String,
    /// Arbitrary value.
    #[serde(default)]
    pub value: serde_json::Value,
    /// Last modification timestamp.
    pub updated_at: String,
}

impl Entity for MetadataEntry {
    const COLLECTION: Collection = Collection::Metadata;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn ticket_type_field_is_named_type() {
        let json = serde_json::json!({
            "title": "Call back",
            "description": "",
            "priority": "high",
            "status": "todo",
            "type": "callback",
            "callbackTime": "2026-01-01T10:00:00Z",
            "createdAt": "2026-01-01T09:00:00Z",
            "updatedAt": "2026-01-01T09:00:00Z",
            "version": 1
        });
        let ticket: Ticket = serde_json::from_value(json).unwrap();
        assert_eq!(ticket.ticket_type, TicketType::Callback);
        let back = serde_json::to_value(&ticket).unwrap();
        assert_eq!(back["type"], "callback");
        assert!(back.get("completedAt").is_none());
        assert!(back.get("id").is_none());
    }

    #[test]
    fn preferences_key_defaults_to_singleton() {
        let json = serde_json::json!({
            "favorites": ["gradient-generator"],
            "updatedAt": "2026-01-01T09:00:00Z"
        });
        let prefs: UserPreferences = serde_json::from_value(json).unwrap();
        assert_eq!(prefs.key, USER_PREFERENCES_KEY);
    }

    #[test]
    fn field_bounds_are_declared() {
        let palette = Palette {
            id: None,
            name: String::new(),
            colors: vec![],
            tags: None,
            description: None,
            created_at: "2026-01-01T09:00:00Z".to_owned(),
            updated_at: "2026-01-01T09:00:00Z".to_owned(),
            version: 1,
        };
        let errors = palette.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("colors"));
    }

    #[test]
    fn skill_level_above_five_fails() {
        let skill = Skill {
            name: "Rust".to_owned(),
            level: 6,
        };
        assert!(skill.validate().is_err());
    }
}
