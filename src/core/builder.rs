use std::sync::Arc;

use crate::{
    core::{DriverConfig, driver::Driver},
    events::Bus,
    runtime::Runtime,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Driver`] with optional features.
pub struct DriverBuilder<R: Runtime> {
    runtime: R,
    config: Option<DriverConfig>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<R: Runtime> DriverBuilder<R> {
    /// Creates a new builder for the given runtime.
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            config: None,
            subscribers: Vec::new(),
        }
    }

    /// Pre-applies a driver config, as if `set_config` had been called.
    ///
    /// Without it the driver fingerprints "waiting for config" until the host sends one.
    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive lifecycle events (task started, exited, killed, ...)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the driver.
    ///
    /// The bus capacity is taken from the pre-applied config (or its default).
    /// Must be called from within a tokio runtime when subscribers are set.
    pub fn build(self) -> Arc<Driver<R>> {
        let capacity = self
            .config
            .as_ref()
            .map_or_else(|| DriverConfig::default().bus_capacity, |c| c.bus_capacity);
        let bus = Bus::new(capacity);

        let subscribers = (!self.subscribers.is_empty())
            .then(|| SubscriberSet::new(self.subscribers, bus.clone()));

        Arc::new(Driver::new_internal(
            self.runtime,
            self.config,
            bus,
            subscribers,
        ))
    }
}
