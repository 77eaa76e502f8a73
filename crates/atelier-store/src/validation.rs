//! Schema validation for every collection.
//!
//! Validation is pure: it takes an untyped record and returns the
//! normalized record (unknown fields stripped, derived fields filled in) or
//! a [`ValidationError`] naming the first problem found. The only
//! normalization that depends on the clock is ticket completion, so
//! [`validate_at`] takes `now` explicitly.
//!
//! Field bounds declared with `validator` attributes on the entity structs
//! run first; the checks here cover what those attributes cannot express.

use std::collections::HashSet;

use atelier_types::{
    Checklist, Collection, MetadataEntry, MindMap, MindMapNode, Palette, SkillsProfile, Ticket,
    TicketType, ToolConfig, USER_PREFERENCES_KEY, UserPreferences,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::Validate;

use crate::error::{StoreError, ValidationError};

/// Deepest mind-map node nesting accepted, counting the root as level 1.
pub const MAX_NODE_DEPTH: usize = 64;

/// Longest accepted tag.
const MAX_TAG_CHARS: usize = 50;

/// Longest accepted mind-map node label.
const MAX_NODE_TEXT_CHARS: usize = 500;

/// Highest checklist status code (0 = todo, 1 = validated, 2 = problem).
const MAX_CHECK_STATUS: u8 = 2;

/// Validate `record` against the schema of `collection`.
///
/// # Errors
///
/// Returns [`ValidationError`] if the record does not fit the schema.
pub fn validate(collection: Collection, record: &Value) -> Result<Value, ValidationError> {
    validate_at(collection, record, Utc::now())
}

/// Validate `record` against the collection named `name`.
///
/// # Errors
///
/// Returns [`StoreError::UnknownCollection`] if `name` is not a collection,
/// or [`StoreError::Validation`] if the record does not fit the schema.
pub fn validate_named(name: &str, record: &Value) -> Result<Value, StoreError> {
    let collection: Collection = name.parse()?;
    Ok(validate(collection, record)?)
}

/// Validate `record` with an explicit clock for derived timestamps.
///
/// # Errors
///
/// Returns [`ValidationError`] if the record does not fit the schema.
pub fn validate_at(
    collection: Collection,
    record: &Value,
    now: DateTime<Utc>,
) -> Result<Value, ValidationError> {
    match collection {
        Collection::Palettes => {
            let palette: Palette = parse(collection, record)?;
            check_fields(collection, &palette)?;
            check_entity_timestamps(collection, &palette.created_at, &palette.updated_at)?;
            for (index, color) in palette.colors.iter().enumerate() {
                check_hex_color(collection, &format!("colors[{index}]"), color)?;
            }
            check_tags(collection, palette.tags.as_deref())?;
            emit(collection, &palette)
        }
        Collection::Tickets => {
            let mut ticket: Ticket = parse(collection, record)?;
            check_fields(collection, &ticket)?;
            check_entity_timestamps(collection, &ticket.created_at, &ticket.updated_at)?;
            check_ticket(collection, &mut ticket, now)?;
            emit(collection, &ticket)
        }
        Collection::MindMaps => {
            check_tree_depth(collection, record.get("root"))?;
            let map: MindMap = parse(collection, record)?;
            check_fields(collection, &map)?;
            check_entity_timestamps(collection, &map.created_at, &map.updated_at)?;
            check_node_tree(collection, &map.root)?;
            emit(collection, &map)
        }
        Collection::Checklists => {
            let checklist: Checklist = parse(collection, record)?;
            check_fields(collection, &checklist)?;
            check_entity_timestamps(collection, &checklist.created_at, &checklist.updated_at)?;
            for (page_index, page) in checklist.pages.iter().enumerate() {
                if let Some((rule, status)) =
                    page.checks.iter().find(|(_, status)| **status > MAX_CHECK_STATUS)
                {
                    return Err(ValidationError::new(
                        collection,
                        format!("pages[{page_index}].checks.{rule}: status {status} is not 0, 1 or 2"),
                    ));
                }
            }
            emit(collection, &checklist)
        }
        Collection::Skills => {
            let profile: SkillsProfile = parse(collection, record)?;
            check_fields(collection, &profile)?;
            check_entity_timestamps(collection, &profile.created_at, &profile.updated_at)?;
            emit(collection, &profile)
        }
        Collection::ToolConfigs => {
            let config: ToolConfig = parse(collection, record)?;
            check_fields(collection, &config)?;
            check_entity_timestamps(collection, &config.created_at, &config.updated_at)?;
            emit(collection, &config)
        }
        Collection::Preferences => {
            let prefs: UserPreferences = parse(collection, record)?;
            check_fields(collection, &prefs)?;
            if prefs.key != USER_PREFERENCES_KEY {
                return Err(ValidationError::new(
                    collection,
                    format!("key: expected {USER_PREFERENCES_KEY:?}, got {:?}", prefs.key),
                ));
            }
            check_timestamp(collection, "updatedAt", &prefs.updated_at)?;
            emit(collection, &prefs)
        }
        Collection::Metadata => {
            let entry: MetadataEntry = parse(collection, record)?;
            check_fields(collection, &entry)?;
            check_timestamp(collection, "updatedAt", &entry.updated_at)?;
            emit(collection, &entry)
        }
    }
}

/// Format `at` the way every stored timestamp is written: RFC 3339 in UTC
/// with millisecond precision and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// =============================================================================
// Sanitization
// =============================================================================

/// Escape HTML-significant characters in free text.
///
/// Replaces `<`, `>`, `"`, `'` and `/` with their entity forms. Applied by
/// callers before rendering; stored records are never sanitized implicitly.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            other => out.push(other),
        }
    }
    out
}

/// Apply [`sanitize`] to every string inside `value`, keys excluded.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, item)| (key.clone(), sanitize_value(item)))
                .collect(),
        ),
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn parse<T: DeserializeOwned>(collection: Collection, record: &Value) -> Result<T, ValidationError> {
    <T as serde::Deserialize>::deserialize(record).map_err(|e| ValidationError::new(collection, e.to_string()))
}

fn check_fields<T: Validate>(collection: Collection, entity: &T) -> Result<(), ValidationError> {
    entity
        .validate()
        .map_err(|e| ValidationError::new(collection, e.to_string()))
}

fn emit<T: Serialize>(collection: Collection, entity: &T) -> Result<Value, ValidationError> {
    serde_json::to_value(entity).map_err(|e| ValidationError::new(collection, e.to_string()))
}

fn check_timestamp(collection: Collection, field: &str, value: &str) -> Result<(), ValidationError> {
    DateTime::parse_from_rfc3339(value).map(|_| ()).map_err(|e| {
        ValidationError::new(
            collection,
            format!("{field}: {value:?} is not an RFC 3339 timestamp ({e})"),
        )
    })
}

fn check_entity_timestamps(
    collection: Collection,
    created_at: &str,
    updated_at: &str,
) -> Result<(), ValidationError> {
    check_timestamp(collection, "createdAt", created_at)?;
    check_timestamp(collection, "updatedAt", updated_at)
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value.bytes().skip(1).all(|b| b.is_ascii_hexdigit())
}

fn check_hex_color(collection: Collection, field: &str, value: &str) -> Result<(), ValidationError> {
    if is_hex_color(value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            collection,
            format!("{field}: {value:?} is not a #RRGGBB color"),
        ))
    }
}

fn check_tags(collection: Collection, tags: Option<&[String]>) -> Result<(), ValidationError> {
    for (index, tag) in tags.unwrap_or_default().iter().enumerate() {
        if tag.chars().count() > MAX_TAG_CHARS {
            return Err(ValidationError::new(
                collection,
                format!("tags[{index}]: longer than {MAX_TAG_CHARS} characters"),
            ));
        }
    }
    Ok(())
}

/// Ticket rules that span fields, plus completion-time normalization.
fn check_ticket(
    collection: Collection,
    ticket: &mut Ticket,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    check_tags(collection, ticket.tags.as_deref())?;
    if let Some(due) = &ticket.due_date {
        check_timestamp(collection, "dueDate", due)?;
    }

    if ticket.ticket_type == TicketType::Callback
        && ticket
            .callback_time
            .as_deref()
            .is_none_or(|t| t.trim().is_empty())
    {
        return Err(ValidationError::new(
            collection,
            "callbackTime: required for callback tickets",
        ));
    }

    if ticket.status.is_completed() {
        match &ticket.completed_at {
            Some(at) => check_timestamp(collection, "completedAt", at)?,
            None => ticket.completed_at = Some(format_timestamp(now)),
        }
    } else {
        ticket.completed_at = None;
    }
    Ok(())
}

/// Reject node trees nested deeper than [`MAX_NODE_DEPTH`].
///
/// Runs on the raw value before deserialization, iteratively, so a
/// pathological document cannot exhaust the stack.
fn check_tree_depth(collection: Collection, root: Option<&Value>) -> Result<(), ValidationError> {
    let Some(root) = root else {
        return Ok(());
    };
    let mut stack = vec![(root, 1_usize)];
    while let Some((node, depth)) = stack.pop() {
        if depth > MAX_NODE_DEPTH {
            return Err(ValidationError::new(
                collection,
                format!("root: nodes nested deeper than {MAX_NODE_DEPTH} levels"),
            ));
        }
        if let Some(Value::Array(children)) = node.get("children") {
            let next = depth.saturating_add(1);
            stack.extend(children.iter().map(|child| (child, next)));
        }
    }
    Ok(())
}

/// Per-node checks: label length, color, and id uniqueness.
fn check_node_tree(collection: Collection, root: &MindMapNode) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.text.chars().count() > MAX_NODE_TEXT_CHARS {
            return Err(ValidationError::new(
                collection,
                format!("node {}: text longer than {MAX_NODE_TEXT_CHARS} characters", node.id),
            ));
        }
        check_hex_color(collection, &format!("node {} color", node.id), &node.color)?;
        if !seen.insert(node.id) {
            return Err(ValidationError::new(
                collection,
                format!("node id {} appears more than once", node.id),
            ));
        }
        stack.extend(node.children.iter());
    }
    Ok(())
}
