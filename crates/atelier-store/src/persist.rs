//! Automatic persistence of in-memory state containers.
//!
//! A [`StateContainer`] holds application state behind a `tokio` watch
//! channel. [`attach`] binds a container to one row of a string-keyed
//! collection and spawns a task that:
//!
//! 1. hydrates the container from the stored row, if there is one;
//! 2. signals completion through a [`HydrationSignal`];
//! 3. writes the state back after every burst of mutations, once the
//!    debounce interval has passed without a further change.
//!
//! ```text
//! update() ──► watch::Sender ──► task: changed() ─┬─ restart debounce timer
//!                                                  └─ timer fires ─► save_state()
//! ```
//!
//! Only the last state of a burst is written, and writes are awaited inline
//! so at most one write per container is in flight. Mutations made while
//! hydration is loading are kept where the stored row is silent; fields the
//! stored row holds take the stored value. The merged state is written
//! afterwards. Dropping every handle to the
//! container flushes a pending write before the task exits.
//!
//! Load and save failures are logged and swallowed: persistence must never
//! break the state container it serves.

use std::sync::{Arc, Weak};
use std::time::Duration;

use atelier_types::Collection;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::PersistConfig;
use crate::error::StoreError;
use crate::manager::PersistenceManager;
use crate::paths::{deep_merge, get_path, pick_paths, set_path};
use crate::schema::{KeyPolicy, TableSpec};
use crate::validation::format_timestamp;

/// Field stamped with the write time on every persisted state row.
const UPDATED_AT_FIELD: &str = "updatedAt";

// =============================================================================
// State container
// =============================================================================

/// Observable application state with a stable id.
///
/// Clones share the same state. When the last clone is dropped, attached
/// persistence flushes and stops.
#[derive(Debug)]
pub struct StateContainer<S> {
    id: Arc<str>,
    sender: Arc<watch::Sender<S>>,
}

impl<S> Clone for StateContainer<S> {
    fn clone(&self) -> Self {
        Self {
            id: Arc::clone(&self.id),
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<S> StateContainer<S> {
    /// Create a container named `id` holding `initial`.
    pub fn new(id: &str, initial: S) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            id: Arc::from(id),
            sender: Arc::new(sender),
        }
    }

    /// The container id, used as the default persistence key.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Mutate the state in place and notify observers.
    pub fn update(&self, mutate: impl FnOnce(&mut S)) {
        self.sender.send_modify(mutate);
    }

    /// Replace the whole state and notify observers.
    pub fn set(&self, state: S) {
        self.sender.send_replace(state);
    }

    /// Read the state without cloning it.
    pub fn read<R>(&self, read: impl FnOnce(&S) -> R) -> R {
        read(&self.sender.borrow())
    }

    /// A copy of the current state.
    pub fn get(&self) -> S
    where
        S: Clone,
    {
        self.sender.borrow().clone()
    }

    /// A receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.sender.subscribe()
    }

    fn downgrade(&self) -> Weak<watch::Sender<S>> {
        Arc::downgrade(&self.sender)
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Where persisted state rows are read from and written to.
pub trait StateBackend: Send + Sync + 'static {
    /// Load the row stored under `key` in `collection`.
    fn load_state(
        &self,
        collection: Collection,
        key: &str,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Insert or replace `row`, which carries its own key.
    fn save_state(
        &self,
        collection: Collection,
        row: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl StateBackend for PersistenceManager {
    fn load_state(
        &self,
        collection: Collection,
        key: &str,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send {
        Self::load_state(self, collection, key)
    }

    fn save_state(
        &self,
        collection: Collection,
        row: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move { self.put_state(collection, &row).await }
    }
}

// =============================================================================
// Options and handles
// =============================================================================

/// How a container is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOptions {
    /// String-keyed collection holding the row.
    pub collection: Collection,
    /// Row key. Defaults to the container id.
    pub key: Option<String>,
    /// Dotted paths to persist. Empty means the whole state.
    pub paths: Vec<String>,
    /// Quiet period before a burst of mutations is written.
    pub debounce: Duration,
    /// Emit per-save and per-load debug events.
    pub debug: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self::from_config(&PersistConfig::default())
    }
}

impl PersistOptions {
    /// Options using the configured debounce and debug defaults.
    pub const fn from_config(config: &PersistConfig) -> Self {
        Self {
            collection: Collection::Preferences,
            key: None,
            paths: Vec::new(),
            debounce: config.debounce(),
            debug: config.debug,
        }
    }

    /// Store the row in `collection`.
    #[must_use]
    pub const fn with_collection(mut self, collection: Collection) -> Self {
        self.collection = collection;
        self
    }

    /// Store the row under `key` instead of the container id.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Persist only the listed dotted paths.
    #[must_use]
    pub fn with_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Set the debounce interval.
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Enable or disable debug events.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Resolves once the initial load has been applied (or has failed).
#[derive(Debug, Clone)]
pub struct HydrationSignal {
    rx: watch::Receiver<bool>,
}

impl HydrationSignal {
    /// Whether hydration has finished.
    pub fn is_hydrated(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until hydration has finished. Returns early if the persistence
    /// task stopped before signalling.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|done| *done).await.is_err() {
            tracing::debug!("Persistence task ended before hydration completed");
        }
    }
}

/// Handle to a running persistence task.
#[derive(Debug)]
pub struct PersistHandle {
    hydrated: HydrationSignal,
    task: JoinHandle<()>,
}

impl PersistHandle {
    /// A signal that resolves once hydration has finished.
    pub fn hydrated(&self) -> HydrationSignal {
        self.hydrated.clone()
    }

    /// Stop the task without flushing.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the task to exit. It exits after the container is dropped
    /// and any pending write is flushed.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Persistence task failed");
            }
        }
    }
}

// =============================================================================
// Attach
// =============================================================================

/// Resolved binding between a container and its row.
#[derive(Debug)]
struct Binding {
    collection: Collection,
    key_field: &'static str,
    key: String,
    paths: Vec<String>,
    debounce: Duration,
    debug: bool,
}

/// Start persisting `container` through `backend`.
///
/// Must be called from within a `tokio` runtime.
///
/// # Errors
///
/// Returns [`StoreError::InvalidKey`] if `options.collection` is not a
/// string-keyed collection.
pub fn attach<S, B>(
    container: &StateContainer<S>,
    backend: Arc<B>,
    options: PersistOptions,
) -> Result<PersistHandle, StoreError>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    B: StateBackend,
{
    let KeyPolicy::Field(key_field) = TableSpec::for_collection(options.collection).key else {
        return Err(StoreError::InvalidKey {
            collection: options.collection,
            reason: "state rows need a string-keyed collection".to_owned(),
        });
    };

    let binding = Binding {
        collection: options.collection,
        key_field,
        key: options.key.unwrap_or_else(|| container.id().to_owned()),
        paths: options.paths,
        debounce: options.debounce,
        debug: options.debug,
    };
    tracing::debug!(
        collection = %binding.collection,
        key = %binding.key,
        debounce_ms = u64::try_from(binding.debounce.as_millis()).unwrap_or(u64::MAX),
        "Attaching state persistence"
    );

    let (hydrated_tx, hydrated_rx) = watch::channel(false);
    let rx = container.subscribe();
    let task = tokio::spawn(run(container.downgrade(), rx, backend, binding, hydrated_tx));

    Ok(PersistHandle {
        hydrated: HydrationSignal { rx: hydrated_rx },
        task,
    })
}

async fn run<S, B>(
    state: Weak<watch::Sender<S>>,
    mut rx: watch::Receiver<S>,
    backend: Arc<B>,
    binding: Binding,
    hydrated: watch::Sender<bool>,
) where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    B: StateBackend,
{
    let mut pending = hydrate(&state, &mut rx, backend.as_ref(), &binding).await;
    drop(state);
    hydrated.send_replace(true);

    loop {
        if pending {
            tokio::select! {
                () = tokio::time::sleep(binding.debounce) => {
                    save(&mut rx, backend.as_ref(), &binding).await;
                    pending = false;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        save(&mut rx, backend.as_ref(), &binding).await;
                        break;
                    }
                }
            }
        } else if rx.changed().await.is_ok() {
            pending = true;
        } else {
            break;
        }
    }

    tracing::debug!(key = %binding.key, "State persistence stopped");
}

/// Apply the stored row, if any. Returns whether the container changed
/// while the row was loading, in which case a write is owed.
///
/// The stored row is applied under the sender's lock, where the change
/// check cannot race a mutation. A mutation landing after the lock is
/// released but before the receiver marks the state seen is caught by
/// comparing the seen state with the state hydration left behind.
async fn hydrate<S, B>(
    state: &Weak<watch::Sender<S>>,
    rx: &mut watch::Receiver<S>,
    backend: &B,
    binding: &Binding,
) -> bool
where
    S: Serialize + DeserializeOwned + Send + Sync,
    B: StateBackend,
{
    let stored = match backend.load_state(binding.collection, &binding.key).await {
        Ok(Some(stored)) => {
            if binding.debug {
                tracing::debug!(key = %binding.key, "Loaded persisted state");
            }
            Some(stored)
        }
        Ok(None) => {
            if binding.debug {
                tracing::debug!(key = %binding.key, "No persisted state yet");
            }
            None
        }
        Err(e) => {
            tracing::error!(key = %binding.key, error = %e, "Failed to load persisted state");
            None
        }
    };

    let Some(sender) = state.upgrade() else {
        return false;
    };
    let mut mutated_while_loading = false;
    let mut settled = None;
    sender.send_if_modified(|current| {
        mutated_while_loading = rx.has_changed().unwrap_or(true);
        let applied = stored.is_some_and(|stored| apply_stored(current, stored, binding));
        settled = serde_json::to_value(&*current).ok();
        applied
    });
    drop(sender);

    let seen = serde_json::to_value(&*rx.borrow_and_update()).ok();
    mutated_while_loading || seen != settled
}

/// Merge a stored row into `current`. Returns whether `current` changed.
fn apply_stored<S>(current: &mut S, stored: Value, binding: &Binding) -> bool
where
    S: Serialize + DeserializeOwned,
{
    let Value::Object(mut fields) = stored else {
        tracing::warn!(key = %binding.key, "Persisted state is not an object, ignoring it");
        return false;
    };
    fields.remove(binding.key_field);
    fields.remove(UPDATED_AT_FIELD);
    let stored = Value::Object(fields);

    let mut merged = match serde_json::to_value(&*current) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(key = %binding.key, error = %e, "Failed to serialize state");
            return false;
        }
    };
    if binding.paths.is_empty() {
        deep_merge(&mut merged, stored);
    } else {
        for path in &binding.paths {
            if let Some(value) = get_path(&stored, path) {
                set_path(&mut merged, path, value.clone());
            }
        }
    }

    match serde_json::from_value(merged) {
        Ok(next) => {
            *current = next;
            true
        }
        Err(e) => {
            tracing::warn!(
                key = %binding.key,
                error = %e,
                "Persisted state does not fit the container, ignoring it"
            );
            false
        }
    }
}

/// Write the latest state.
async fn save<S, B>(rx: &mut watch::Receiver<S>, backend: &B, binding: &Binding)
where
    S: Serialize + Send + Sync,
    B: StateBackend,
{
    let snapshot = serde_json::to_value(&*rx.borrow_and_update());
    let row = match snapshot {
        Ok(state) => match build_row(state, binding) {
            Some(row) => row,
            None => {
                tracing::error!(key = %binding.key, "State must serialize to a JSON object");
                return;
            }
        },
        Err(e) => {
            tracing::error!(key = %binding.key, error = %e, "Failed to serialize state");
            return;
        }
    };

    match backend.save_state(binding.collection, row).await {
        Ok(()) => {
            if binding.debug {
                tracing::debug!(key = %binding.key, "Saved persisted state");
            }
        }
        Err(e) => {
            tracing::error!(key = %binding.key, error = %e, "Failed to save persisted state");
        }
    }
}

/// The row written for `state`: the whole state or the picked paths, plus
/// the row key and write time.
fn build_row(state: Value, binding: &Binding) -> Option<Value> {
    let picked = if binding.paths.is_empty() {
        state
    } else {
        pick_paths(&state, &binding.paths)
    };
    let Value::Object(mut fields) = picked else {
        return None;
    };
    fields.insert(binding.key_field.to_owned(), Value::from(binding.key.as_str()));
    fields.insert(
        UPDATED_AT_FIELD.to_owned(),
        Value::from(format_timestamp(Utc::now())),
    );
    Some(Value::Object(fields))
}
