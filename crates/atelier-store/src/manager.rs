//! The persistence manager: validated CRUD over named collections.
//!
//! Every entity write goes through the schema validator before it reaches
//! the structured store, so the store only ever holds records that satisfy
//! their collection's shape contract. Errors are logged with context and
//! returned to the caller; nothing is retried or swallowed here.

use std::collections::BTreeMap;

use atelier_types::{Collection, Entity, StorageStats};
use serde_json::Value;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::schema::{KeyPolicy, RecordKey, TableSpec};
use crate::store::StructuredStore;
use crate::validation;

/// Validated access to every collection of a [`StructuredStore`].
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    store: StructuredStore,
    application: String,
    quota_bytes: Option<u64>,
}

impl PersistenceManager {
    /// Create a manager over an open store, taking the application name and
    /// quota from `config`.
    pub fn new(store: StructuredStore, config: &StoreConfig) -> Self {
        Self {
            store,
            application: config.application.clone(),
            quota_bytes: config.quota_bytes,
        }
    }

    /// Open the store described by `config` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be opened or upgraded.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let store = StructuredStore::connect(config).await?;
        Ok(Self::new(store, config))
    }

    /// The underlying structured store.
    pub const fn store(&self) -> &StructuredStore {
        &self.store
    }

    /// Application name written into exports.
    pub fn application(&self) -> &str {
        &self.application
    }

    // =========================================================================
    // Collection CRUD
    // =========================================================================

    /// Validate `record` and insert or replace it in `collection`.
    ///
    /// Returns the row key, which is freshly assigned when the record
    /// carries no `id` on an auto-increment collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownCollection`] or [`StoreError::Validation`]
    /// before touching the store, or a storage error if the write fails.
    pub async fn save(&self, collection: &str, record: &Value) -> Result<RecordKey, StoreError> {
        let collection: Collection = collection.parse()?;
        self.save_in(collection, record).await
    }

    /// [`Self::save`] with an already-resolved collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the record does not fit the
    /// schema, or a storage error if the write fails.
    pub async fn save_in(
        &self,
        collection: Collection,
        record: &Value,
    ) -> Result<RecordKey, StoreError> {
        let normalized = validation::validate(collection, record).inspect_err(|e| {
            tracing::warn!(%collection, error = %e, "Rejected invalid record");
        })?;
        let key = self
            .store
            .table(collection)
            .put(&normalized)
            .await
            .inspect_err(|e| {
                tracing::error!(%collection, error = %e, "Failed to save record");
            })?;
        tracing::debug!(%collection, %key, "Saved record");
        Ok(key)
    }

    /// Every row of `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownCollection`] or a storage error.
    pub async fn load_all(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let collection: Collection = collection.parse()?;
        self.store
            .table(collection)
            .get_all()
            .await
            .inspect_err(|e| {
                tracing::error!(%collection, error = %e, "Failed to load collection");
            })
    }

    /// One row of `collection`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownCollection`], [`StoreError::InvalidKey`]
    /// if the key kind does not match the collection, or a storage error.
    pub async fn load_by_id(
        &self,
        collection: &str,
        key: impl Into<RecordKey>,
    ) -> Result<Option<Value>, StoreError> {
        let collection: Collection = collection.parse()?;
        let key = key.into();
        self.store
            .table(collection)
            .get(&key)
            .await
            .inspect_err(|e| {
                tracing::error!(%collection, %key, error = %e, "Failed to load record");
            })
    }

    /// Remove one row. Removing a missing row is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownCollection`], [`StoreError::InvalidKey`],
    /// or a storage error.
    pub async fn delete(&self, collection: &str, key: impl Into<RecordKey>) -> Result<(), StoreError> {
        let collection: Collection = collection.parse()?;
        let key = key.into();
        let removed = self
            .store
            .table(collection)
            .delete(&key)
            .await
            .inspect_err(|e| {
                tracing::error!(%collection, %key, error = %e, "Failed to delete record");
            })?;
        tracing::debug!(%collection, %key, removed, "Deleted record");
        Ok(())
    }

    /// Remove every row of `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownCollection`] or a storage error.
    pub async fn clear(&self, collection: &str) -> Result<(), StoreError> {
        let collection: Collection = collection.parse()?;
        let removed = self
            .store
            .table(collection)
            .clear()
            .await
            .inspect_err(|e| {
                tracing::error!(%collection, error = %e, "Failed to clear collection");
            })?;
        tracing::info!(%collection, removed, "Cleared collection");
        Ok(())
    }

    // =========================================================================
    // Typed access
    // =========================================================================

    /// Validate and save a typed entity in its home collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] under the same conditions as [`Self::save`].
    pub async fn save_entity<E: Entity>(&self, entity: &E) -> Result<RecordKey, StoreError> {
        let record = serde_json::to_value(entity)?;
        self.save_in(E::COLLECTION, &record).await
    }

    /// Load a typed entity by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the stored row no longer
    /// fits `E`, or a storage error.
    pub async fn load_entity<E: Entity>(
        &self,
        key: impl Into<RecordKey>,
    ) -> Result<Option<E>, StoreError> {
        let row = self.store.table(E::COLLECTION).get(&key.into()).await?;
        row.map(|row| serde_json::from_value(row).map_err(StoreError::from))
            .transpose()
    }

    /// Load every entity of a typed collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if a stored row no longer fits
    /// `E`, or a storage error.
    pub async fn load_all_entities<E: Entity>(&self) -> Result<Vec<E>, StoreError> {
        let rows = self.store.table(E::COLLECTION).get_all().await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(StoreError::from))
            .collect()
    }

    // =========================================================================
    // Opaque state rows
    // =========================================================================

    /// Write a persisted-state row without schema validation.
    ///
    /// Only keyed collections can hold state rows. The row must carry its
    /// key in the collection's key field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] for auto-increment collections or
    /// rows without a key, or a storage error.
    pub async fn put_state(&self, collection: Collection, row: &Value) -> Result<(), StoreError> {
        ensure_keyed(collection)?;
        self.store.table(collection).put(row).await?;
        Ok(())
    }

    /// Read a persisted-state row written by [`Self::put_state`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] for auto-increment collections, or
    /// a storage error.
    pub async fn load_state(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        ensure_keyed(collection)?;
        self.store
            .table(collection)
            .get(&RecordKey::from(key))
            .await
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Row counts per collection plus engine usage and quota, when known.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a count fails. An unavailable usage figure
    /// is reported as `None`, not as an error.
    pub async fn storage_stats(&self) -> Result<StorageStats, StoreError> {
        let mut collections = BTreeMap::new();
        let mut total_items: u64 = 0;
        for collection in Collection::ALL {
            let count = self.store.table(collection).count().await?;
            total_items = total_items.saturating_add(count);
            collections.insert(collection.as_str().to_owned(), count);
        }

        let usage = match self.store.usage_bytes().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "Storage usage unavailable");
                None
            }
        };
        let percentage = match (usage, self.quota_bytes) {
            (Some(used), Some(quota)) if quota > 0 => Some(percent(used, quota)),
            _ => None,
        };

        Ok(StorageStats {
            collections,
            total_items,
            store_version: self.store.version().await?,
            usage,
            quota: self.quota_bytes,
            percentage,
        })
    }
}

fn ensure_keyed(collection: Collection) -> Result<(), StoreError> {
    match TableSpec::for_collection(collection).key {
        KeyPolicy::Field(_) => Ok(()),
        KeyPolicy::AutoIncrement => Err(StoreError::InvalidKey {
            collection,
            reason: "state rows need a string-keyed collection".to_owned(),
        }),
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(used: u64, quota: u64) -> f64 {
    used as f64 / quota as f64 * 100.0
}
