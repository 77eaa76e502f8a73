//! Client-resident persistence for the Atelier tools (`SQLite`).
//!
//! Every dataset that must survive a restart (palettes, tickets, mind maps,
//! checklists, skill profiles, tool configuration, preferences and
//! metadata) lives in one versioned `SQLite` database. Rows are JSON
//! documents validated against their collection's shape before any write.
//!
//! # Architecture
//!
//! ```text
//! Startup
//!     |
//!     +-- MigrationService ----> legacy key/value storage -> StructuredStore (once)
//!     |
//!     +-- attach() ------------> hydrate StateContainer from PersistenceManager
//!
//! Runtime
//!     |
//!     +-- StateContainer mutation --(debounce)--> PersistenceManager
//!     |                                               |-- validation
//!     |                                               +-- StructuredStore / Table
//!     +-- export_all / import_data (on demand)
//! ```
//!
//! # Modules
//!
//! - [`config`] -- YAML store configuration with environment overrides
//! - [`error`] -- Shared error types
//! - [`schema`] -- Table definitions, key policies and the store version
//! - [`store`] -- Connection, versioned schema upgrades and storage usage
//! - [`table`] -- Per-collection CRUD over JSON rows
//! - [`validation`] -- Per-collection shape contracts and sanitization
//! - [`manager`] -- Validated CRUD facade and storage statistics
//! - [`transfer`] -- Whole-store export and import
//! - [`legacy`] -- Legacy key/value storage and migration status
//! - [`migration`] -- One-shot migration from legacy storage
//! - [`paths`] -- Dotted-path helpers for selective persistence
//! - [`persist`] -- Debounced persistence and hydration of state containers

pub mod config;
pub mod error;
pub mod legacy;
pub mod manager;
pub mod migration;
pub mod paths;
pub mod persist;
pub mod schema;
pub mod store;
pub mod table;
pub mod transfer;
pub mod validation;

// Re-export primary types for convenience.
pub use config::{ConfigError, PersistConfig, StoreConfig};
pub use error::{StoreError, ValidationError};
pub use legacy::{
    LegacyCompletionFlag, LegacyStorage, MIGRATION_COMPLETE_KEY, MemoryLegacyStorage,
    MigrationStatus,
};
pub use manager::PersistenceManager;
pub use migration::{LAST_MIGRATION_KEY, LegacySource, MigrationService};
pub use persist::{
    HydrationSignal, PersistHandle, PersistOptions, StateBackend, StateContainer, attach,
};
pub use schema::{KeyPolicy, RecordKey, STORE_VERSION, TableSpec};
pub use store::StructuredStore;
pub use table::Table;
pub use validation::{
    MAX_NODE_DEPTH, format_timestamp, sanitize, sanitize_value, validate, validate_at,
    validate_named,
};
