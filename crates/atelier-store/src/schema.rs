//! Declarative table layout of the structured store.
//!
//! Each [`Collection`] maps to one table. The layout here must agree with
//! the SQL under `migrations/`: the key policy decides the primary-key
//! column, and the indexed attributes are the ones with a `json_extract`
//! expression index.

use core::fmt;

use atelier_types::Collection;
use serde::{Deserialize, Serialize};

/// Current structured store version. Equals the newest migration number.
pub const STORE_VERSION: u32 = 2;

/// How rows of a table are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Integer identity assigned by the store on insert, held in the `id`
    /// column and surfaced as the `id` field on read.
    AutoIncrement,
    /// String key taken from the named field of the record.
    Field(&'static str),
}

/// Layout of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    /// The collection stored in this table.
    pub collection: Collection,
    /// Primary key policy.
    pub key: KeyPolicy,
    /// Record attributes with a secondary index.
    pub indexes: &'static [&'static str],
}

const PALETTES: TableSpec = TableSpec {
    collection: Collection::Palettes,
    key: KeyPolicy::AutoIncrement,
    indexes: &["name", "createdAt", "updatedAt"],
};

const TICKETS: TableSpec = TableSpec {
    collection: Collection::Tickets,
    key: KeyPolicy::AutoIncrement,
    indexes: &[
        "title",
        "status",
        "priority",
        "customer",
        "dueDate",
        "callbackTime",
        "createdAt",
        "updatedAt",
    ],
};

const MINDMAPS: TableSpec = TableSpec {
    collection: Collection::MindMaps,
    key: KeyPolicy::AutoIncrement,
    indexes: &["name", "createdAt", "updatedAt"],
};

const CHECKLISTS: TableSpec = TableSpec {
    collection: Collection::Checklists,
    key: KeyPolicy::AutoIncrement,
    indexes: &["projectName", "createdAt", "updatedAt"],
};

const SKILLS: TableSpec = TableSpec {
    collection: Collection::Skills,
    key: KeyPolicy::AutoIncrement,
    indexes: &["userId", "createdAt", "updatedAt"],
};

const TOOL_CONFIGS: TableSpec = TableSpec {
    collection: Collection::ToolConfigs,
    key: KeyPolicy::Field("toolId"),
    indexes: &["isSession", "updatedAt"],
};

const PREFERENCES: TableSpec = TableSpec {
    collection: Collection::Preferences,
    key: KeyPolicy::Field("key"),
    indexes: &["updatedAt"],
};

const METADATA: TableSpec = TableSpec {
    collection: Collection::Metadata,
    key: KeyPolicy::Field("key"),
    indexes: &["updatedAt"],
};

impl TableSpec {
    /// Layout of the table backing `collection`.
    pub const fn for_collection(collection: Collection) -> &'static Self {
        match collection {
            Collection::Palettes => &PALETTES,
            Collection::Tickets => &TICKETS,
            Collection::MindMaps => &MINDMAPS,
            Collection::Checklists => &CHECKLISTS,
            Collection::Skills => &SKILLS,
            Collection::ToolConfigs => &TOOL_CONFIGS,
            Collection::Preferences => &PREFERENCES,
            Collection::Metadata => &METADATA,
        }
    }

    /// Table name, quoted for use in SQL.
    pub fn quoted_name(&self) -> String {
        format!("\"{}\"", self.collection.as_str())
    }

    /// Whether `attribute` has a secondary index.
    pub fn is_indexed(&self, attribute: &str) -> bool {
        self.indexes.contains(&attribute)
    }

    /// Whether rows get a store-assigned integer identity.
    pub const fn is_auto_increment(&self) -> bool {
        matches!(self.key, KeyPolicy::AutoIncrement)
    }
}

/// Primary key of a stored row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    /// Store-assigned integer identity.
    Id(i64),
    /// String key of a keyed table.
    Name(String),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for RecordKey {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for RecordKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for RecordKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}
