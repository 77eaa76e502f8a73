//! The structured store: an embedded `SQLite` database holding one table per
//! collection.
//!
//! Opening the store brings the database up to [`STORE_VERSION`] by running
//! the embedded migrations in order. A migration that transforms existing
//! rows runs inside the same upgrade, so no caller ever observes a
//! half-upgraded database.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time checked).
//! Table names come from [`TableSpec`], never from caller input, and every
//! value is bound as a parameter.

use core::str::FromStr;

use atelier_types::Collection;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::schema::{STORE_VERSION, TableSpec};
use crate::table::Table;

/// Connection pool handle to the structured store.
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct StructuredStore {
    pool: SqlitePool,
}

impl StructuredStore {
    /// Open the store described by `config` and upgrade it to the current
    /// version.
    ///
    /// In-memory databases are pinned to a single connection that is never
    /// recycled, since each `SQLite` memory connection is its own database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed,
    /// [`StoreError::Sqlite`] if the connection fails, or
    /// [`StoreError::Migration`] if the upgrade fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| StoreError::Config(format!("Invalid database URL: {e}")))?
            .create_if_missing(true);

        let in_memory = config.is_in_memory();
        let max_connections = if in_memory {
            1
        } else {
            config.max_connections.max(1)
        };

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(config.connect_timeout());
        if in_memory {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(connect_options).await?;
        let store = Self { pool };
        store.run_migrations().await?;

        tracing::info!(
            max_connections,
            in_memory,
            version = STORE_VERSION,
            "Opened structured store"
        );

        Ok(store)
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be created.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect(&StoreConfig::in_memory()).await
    }

    /// Apply every pending version upgrade from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Migration`] if any upgrade fails.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::debug!("Structured store migrations completed");
        Ok(())
    }

    /// The version the database is currently at.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the version table cannot be read.
    pub async fn version(&self) -> Result<u32, StoreError> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
                .fetch_one(&self.pool)
                .await?;
        u32::try_from(version.unwrap_or(0))
            .map_err(|e| StoreError::Query(format!("store version out of range: {e}")))
    }

    /// Operations on the table backing `collection`.
    pub const fn table(&self, collection: Collection) -> Table<'_> {
        Table::new(&self.pool, TableSpec::for_collection(collection))
    }

    /// Delete every row of every table in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if any delete fails. Nothing is
    /// removed in that case.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for collection in Collection::ALL {
            let spec = TableSpec::for_collection(collection);
            sqlx::query(&format!("DELETE FROM {}", spec.quoted_name()))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::info!("Cleared all collections");
        Ok(())
    }

    /// Whether the store can currently be read.
    ///
    /// Failures are logged and reported as `false`.
    pub async fn check_access(&self) -> bool {
        match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM metadata")
            .fetch_one(&self.pool)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Structured store is not accessible");
                false
            }
        }
    }

    /// Bytes currently used by the database file (page count times page size).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the pragmas cannot be read.
    pub async fn usage_bytes(&self) -> Result<u64, StoreError> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        let bytes = page_count.saturating_mul(page_size);
        Ok(u64::try_from(bytes).unwrap_or(0))
    }

    /// Return a reference to the underlying [`SqlitePool`].
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Structured store closed");
    }
}
