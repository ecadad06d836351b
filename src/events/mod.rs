//! Task events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by the driver, the per-task
//! exit watchers and the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`TaskEvent`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Driver`, exit watchers (`core::actor`), `SubscriberSet` workers.
//! - **Consumers**: `Driver::task_events()` streams, and the driver's subscriber
//!   listener which fans out to the `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{EventKind, TaskEvent};
