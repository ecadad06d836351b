//! # Task store: concurrent map from task id to its handle.
//!
//! The store is the only state shared between callers of different tasks and is
//! therefore the single synchronization point of the driver. The lock is only held
//! for map operations, never across a launch.
//!
//! ```text
//! reserve(id) ──► [Reserved] ──launch ok──► commit(id, handle) ──► [Ready(handle)]
//!                     └───────launch err──► release(id)        ──► (absent)
//! ```
//!
//! ## Rules
//! - at most one entry per id; a reserved id rejects other starts with `AlreadyStarted`
//! - reserved ids are invisible to [`TaskStore::get`] and [`TaskStore::delete`]
//! - [`TaskStore::try_insert_with`] builds under the write lock and is only for
//!   builds that do not block
//! - no listing: callers address tasks by id only

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::DriverError;

enum Slot<T> {
    Reserved,
    Ready(T),
}

/// Concurrent id → handle map.
pub struct TaskStore<T> {
    tasks: RwLock<HashMap<String, Slot<T>>>,
}

impl<T: Clone> TaskStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the entry for `id`, if registered.
    pub async fn get(&self, id: &str) -> Option<T> {
        match self.tasks.read().await.get(id) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Inserts or replaces the entry for `id`.
    ///
    /// Starts go through [`TaskStore::reserve`]; this is the unconditional form.
    pub async fn set(&self, id: impl Into<String>, value: T) {
        self.tasks.write().await.insert(id.into(), Slot::Ready(value));
    }

    /// Removes the entry for `id`, returning it. A reservation is left alone.
    pub async fn delete(&self, id: &str) -> Option<T> {
        let mut tasks = self.tasks.write().await;
        if !matches!(tasks.get(id), Some(Slot::Ready(_))) {
            return None;
        }
        match tasks.remove(id) {
            Some(Slot::Ready(value)) => Some(value),
            _ => None,
        }
    }

    /// Claims `id` for a start in progress.
    pub async fn reserve(&self, id: &str) -> Result<(), DriverError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(id) {
            return Err(DriverError::AlreadyStarted { id: id.to_string() });
        }
        tasks.insert(id.to_string(), Slot::Reserved);
        Ok(())
    }

    /// Replaces the reservation of `id` with its entry.
    pub async fn commit(&self, id: &str, value: T) {
        self.tasks
            .write()
            .await
            .insert(id.to_string(), Slot::Ready(value));
    }

    /// Drops the reservation of `id` after a failed start.
    pub async fn release(&self, id: &str) {
        let mut tasks = self.tasks.write().await;
        if matches!(tasks.get(id), Some(Slot::Reserved)) {
            tasks.remove(id);
        }
    }

    /// Atomically checks for `id` and, when absent, registers the value produced by `make`.
    ///
    /// `make` runs under the write lock and must not block.
    pub async fn try_insert_with<F>(&self, id: &str, make: F) -> Result<T, DriverError>
    where
        F: FnOnce() -> Result<T, DriverError>,
    {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(id) {
            return Err(DriverError::AlreadyStarted { id: id.to_string() });
        }
        let value = make()?;
        tasks.insert(id.to_string(), Slot::Ready(value.clone()));
        Ok(value)
    }
}

impl<T: Clone> Default for TaskStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
