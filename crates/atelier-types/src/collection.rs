//! The closed set of collection names.
//!
//! Every persisted entity belongs to exactly one [`Collection`]. String names
//! coming from callers are parsed once at the boundary; everything past that
//! point dispatches on the enum, so adding a collection is a compile error
//! until every match handles it.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A named logical group of entities of one kind, mapped to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Collection {
    /// Color palettes.
    #[serde(rename = "palettes")]
    Palettes,
    /// Support tickets.
    #[serde(rename = "tickets")]
    Tickets,
    /// Mind-map documents.
    #[serde(rename = "mindmaps")]
    MindMaps,
    /// Checklist documents.
    #[serde(rename = "checklists")]
    Checklists,
    /// Skill profiles.
    #[serde(rename = "skills")]
    Skills,
    /// Per-tool configuration, keyed by tool id.
    #[serde(rename = "toolConfigs")]
    ToolConfigs,
    /// User preferences and persisted state rows, keyed by name.
    #[serde(rename = "preferences")]
    Preferences,
    /// App-level key/value facts.
    #[serde(rename = "metadata")]
    Metadata,
}

impl Collection {
    /// Every collection, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Palettes,
        Self::Tickets,
        Self::MindMaps,
        Self::Checklists,
        Self::Skills,
        Self::ToolConfigs,
        Self::Preferences,
        Self::Metadata,
    ];

    /// The wire name of this collection (also its table name).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Palettes => "palettes",
            Self::Tickets => "tickets",
            Self::MindMaps => "mindmaps",
            Self::Checklists => "checklists",
            Self::Skills => "skills",
            Self::ToolConfigs => "toolConfigs",
            Self::Preferences => "preferences",
            Self::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name one of the known collections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown collection: {0}")]
pub struct UnknownCollection(pub String);

impl FromStr for Collection {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCollection(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn names_round_trip() {
        for collection in Collection::ALL {
            let parsed: Collection = collection.as_str().parse().unwrap();
            assert_eq!(parsed, collection);
        }
    }

    #[test]
    fn serde_name_matches_as_str() {
        let json = serde_json::to_string(&Collection::ToolConfigs).unwrap();
        assert_eq!(json, "\"toolConfigs\"");
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = "widgets".parse::<Collection>().unwrap_err();
        assert_eq!(err, UnknownCollection("widgets".to_owned()));
        assert_eq!(err.to_string(), "unknown collection: widgets");
    }

    #[test]
    fn names_are_case_sensitive() {
        assert!("Palettes".parse::<Collection>().is_err());
        assert!("toolconfigs".parse::<Collection>().is_err());
    }
}
