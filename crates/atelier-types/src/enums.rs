//! Enumeration types for persisted entities.
//!
//! Every enumeration serializes to the lowercase (or kebab-case) string the
//! UI layer already uses, so stored JSON stays readable and stable.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// Urgency of a support ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Default priority.
    Medium,
    /// Should be handled soon.
    High,
    /// Drop everything.
    Urgent,
}

/// Workflow state of a support ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export, export_to = "bindings/")]
pub enum TicketStatus {
    /// Not started.
    Todo,
    /// Being worked on.
    InProgress,
    /// Blocked on the customer or a third party.
    Waiting,
    /// Done. A completed ticket always carries `completedAt`.
    Completed,
}

impl TicketStatus {
    /// Whether this status is the terminal `completed` state.
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Kind of ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum TicketType {
    /// A scheduled call back to a customer. Requires `callbackTime`.
    Callback,
    /// A plain task.
    Task,
}

// ---------------------------------------------------------------------------
// Mind maps
// ---------------------------------------------------------------------------

/// Shape used to draw a mind-map node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum NodeShape {
    /// Rounded rectangle.
    Rect,
    /// Ellipse.
    Ellipse,
}

/// Line style connecting a mind-map node to its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Connector {
    /// Bezier curves.
    Curved,
    /// Straight lines.
    Straight,
    /// Right-angle elbows.
    Elbow,
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// Color theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Theme {
    /// Light theme.
    Light,
    /// Dark theme.
    Dark,
    /// Follow the operating system.
    Auto,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn ticket_status_uses_kebab_case() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        let back: TicketStatus = serde_json::from_str("\"completed\"").unwrap();
        assert!(back.is_completed());
    }

    #[test]
    fn unknown_priority_is_rejected() {
        let result: Result<Priority, _> = serde_json::from_str("\"critical\"");
        assert!(result.is_err());
    }
}
