//! Legacy key/value storage and the migration completion status.
//!
//! Before the structured store existed, the application kept each dataset
//! as one JSON string under a fixed key in a flat string-to-string store.
//! [`LegacyStorage`] abstracts that store so the migration can run against
//! any backing (a browser bridge, a dump file, or memory in tests).
//!
//! # Completion
//!
//! Whether the migration already ran is an explicit [`MigrationStatus`],
//! injected into the migration service. [`LegacyCompletionFlag`] keeps the
//! historical behavior of a `"true"` string under a fixed legacy key.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::error::StoreError;

/// Legacy key marking the migration as done.
pub const MIGRATION_COMPLETE_KEY: &str = "ui-tools-migration-complete";

/// A flat string-to-string store.
pub trait LegacyStorage: Send + Sync {
    /// The value under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Legacy`] if the backing store cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Legacy`] if the backing store cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Legacy`] if the backing store cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory [`LegacyStorage`]. Clones share the same items.
#[derive(Debug, Clone, Default)]
pub struct MemoryLegacyStorage {
    items: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryLegacyStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a storage from a JSON object dump of the legacy store.
    ///
    /// String values are taken verbatim; any other value is stored as its
    /// JSON text, which is how the legacy store held structured data.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if `dump` is not JSON, or
    /// [`StoreError::Legacy`] if it is not an object.
    pub fn from_json_dump(dump: &str) -> Result<Self, StoreError> {
        let Value::Object(entries) = serde_json::from_str::<Value>(dump)? else {
            return Err(StoreError::Legacy(
                "legacy dump must be a JSON object".to_owned(),
            ));
        };
        let items = entries
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect();
        Ok(Self {
            items: Arc::new(Mutex::new(items)),
        })
    }

    /// Number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Legacy`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    /// Whether no keys are stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Legacy`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.items
            .lock()
            .map_err(|e| StoreError::Legacy(format!("legacy storage lock poisoned: {e}")))
    }
}

impl LegacyStorage for MemoryLegacyStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Whether the one-time legacy migration has completed.
pub trait MigrationStatus: Send + Sync {
    /// `true` once [`Self::mark_complete`] has succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the status cannot be read.
    fn is_complete(&self) -> Result<bool, StoreError>;

    /// Record that the migration has run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the status cannot be written.
    fn mark_complete(&self) -> Result<(), StoreError>;
}

/// [`MigrationStatus`] kept as `"true"` under [`MIGRATION_COMPLETE_KEY`] in
/// a legacy storage.
#[derive(Debug, Clone)]
pub struct LegacyCompletionFlag<L> {
    storage: L,
}

impl<L: LegacyStorage> LegacyCompletionFlag<L> {
    /// Keep the flag in `storage`.
    pub const fn new(storage: L) -> Self {
        Self { storage }
    }

    /// Forget that the migration ran, so the next run migrates again.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Legacy`] if the flag cannot be removed.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.storage.remove_item(MIGRATION_COMPLETE_KEY)
    }
}

impl<L: LegacyStorage> MigrationStatus for LegacyCompletionFlag<L> {
    fn is_complete(&self) -> Result<bool, StoreError> {
        Ok(self.storage.get_item(MIGRATION_COMPLETE_KEY)?.as_deref() == Some("true"))
    }

    fn mark_complete(&self) -> Result<(), StoreError> {
        self.storage.set_item(MIGRATION_COMPLETE_KEY, "true")
    }
}
