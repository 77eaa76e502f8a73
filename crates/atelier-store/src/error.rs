//! Error types for the store.
//!
//! All fallible store operations return [`StoreError`]. Validation failures
//! and unknown collection names are raised before any storage access, so a
//! caller seeing either knows nothing was written. Engine failures wrap the
//! underlying [`sqlx`] error unchanged and are never retried.

use atelier_types::{Collection, UnknownCollection};

/// A record failed its collection's shape contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{collection}: {message}")]
pub struct ValidationError {
    /// The collection whose schema rejected the record.
    pub collection: Collection,
    /// What was wrong with the record.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for `collection`.
    pub fn new(collection: Collection, message: impl Into<String>) -> Self {
        Self {
            collection,
            message: message.into(),
        }
    }
}

/// Errors that can occur in the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record does not satisfy its collection's schema. Nothing was written.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The collection name is not one of the known collections.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// A `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// A structured store version upgrade failed.
    #[error("store upgrade error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row key was missing or of the wrong kind for its table.
    #[error("invalid key for {collection}: {reason}")]
    InvalidKey {
        /// The table the key was used against.
        collection: Collection,
        /// What was wrong with the key.
        reason: String,
    },

    /// A query could not be built from the given arguments.
    #[error("invalid query: {0}")]
    Query(String),

    /// The legacy key/value storage failed or held unusable data.
    #[error("legacy storage error: {0}")]
    Legacy(String),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<UnknownCollection> for StoreError {
    fn from(err: UnknownCollection) -> Self {
        Self::UnknownCollection(err.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_names_collection() {
        let err = StoreError::from(ValidationError::new(
            Collection::Palettes,
            "colors[0]: \"red\" is not a #RRGGBB color",
        ));
        let msg = err.to_string();
        assert!(msg.starts_with("validation failed: palettes:"));
        assert!(msg.contains("red"));
    }

    #[test]
    fn unknown_collection_converts() {
        let err = StoreError::from(UnknownCollection("widgets".to_owned()));
        assert!(matches!(err, StoreError::UnknownCollection(ref name) if name == "widgets"));
    }
}
