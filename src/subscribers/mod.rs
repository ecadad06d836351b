//! # In-process event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and
//! the built-in [`LogWriter`] for observing task events pushed through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Exit watcher ── publish(TaskEvent) ──► Bus ──► subscriber_listener (Driver)
//!                                                        │
//!                                                  SubscriberSet::emit
//!                                                 ┌──────┴──────┬────────┐
//!                                                 ▼             ▼        ▼
//!                                             LogWriter      Metrics   Custom
//! ```
//!
//! Pull-style consumers should use `Driver::task_events` instead; subscribers are for
//! observers that live as long as the driver.

mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
