use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{Config, Runtime, Watchdog};
use crate::error::RuntimeError;
use crate::events::Bus;
use crate::host::{Host, SimHost};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Runtime`].
pub struct RuntimeBuilder {
    cfg: Config,
    host: Option<Arc<dyn Host>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RuntimeBuilder {
    /// Creates a builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            host: None,
            subscribers: Vec::new(),
        }
    }

    /// Platform services. Defaults to a fresh [`SimHost`].
    pub fn with_host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets event subscribers (e.g. `LogWriter`).
    ///
    /// Each subscriber gets its own bounded queue and worker task.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Validates the configuration and assembles the runtime.
    ///
    /// Spawns the subscriber workers, so it must run inside a tokio runtime.
    pub fn build(self) -> Result<Runtime, RuntimeError> {
        self.cfg.validate()?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers));
        let host = self
            .host
            .unwrap_or_else(|| Arc::new(SimHost::new()) as Arc<dyn Host>);

        Ok(Runtime::new_internal(
            self.cfg,
            host,
            bus,
            subs,
            Arc::new(Watchdog::new()),
            CancellationToken::new(),
        ))
    }
}
