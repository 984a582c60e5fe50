//! # Supervisory context shared by every task.
//!
//! One [`Context`] exists per boot. It is created after the channel and handed to each
//! task as an `Arc` at creation time, replacing free-standing globals.
//!
//! ## Access discipline
//! - `channel`: mutated by producer (send), consumer (receive/reset); serializes itself.
//! - `heartbeats`: each slot written by its owning task (and once by the supervisor on
//!   recreation); read by supervisor and logger.
//! - `watchdog`, `bus`, `host`: shared services.
//! - Task handles are **not** here: the supervisor owns the worker handles.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::channel::{BoundedChannel, Message};
use crate::core::handle;
use crate::core::{Config, HeartbeatRegistry, RestartLatch, RestartReason, TaskHandle, Watchdog};
use crate::events::{Bus, Event, EventKind};
use crate::host::{Host, SpawnError, Tick};
use crate::tasks::{BoxTaskFuture, TaskKind, TaskRef};

/// Process-scoped state shared by the task set.
pub struct Context {
    /// Runtime configuration.
    pub cfg: Config,
    /// Platform services.
    pub host: Arc<dyn Host>,
    /// Event bus (status stream).
    pub bus: Bus,
    /// Producer → consumer queue.
    pub channel: BoundedChannel<Message>,
    /// Liveness table.
    pub heartbeats: HeartbeatRegistry,
    /// Task watchdog (outlives a boot; re-initialized by each one).
    pub watchdog: Arc<Watchdog>,
    restart: RestartLatch,
    token: CancellationToken,
}

impl Context {
    /// Assembles a context. `token` is the parent of every task token.
    pub fn new(
        cfg: Config,
        host: Arc<dyn Host>,
        bus: Bus,
        channel: BoundedChannel<Message>,
        watchdog: Arc<Watchdog>,
        token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            host,
            bus,
            channel,
            heartbeats: HeartbeatRegistry::new(),
            watchdog,
            restart: RestartLatch::new(),
            token,
        }
    }

    /// Current host tick.
    #[inline]
    pub fn now(&self) -> Tick {
        self.host.now()
    }

    /// Parent token of every task created through this context.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Restart latch observed by the runtime.
    pub fn restart_latch(&self) -> &RestartLatch {
        &self.restart
    }

    /// Creates a fresh instance of `task`.
    pub fn spawn_task(&self, task: &TaskRef) -> Result<TaskHandle, SpawnError> {
        self.spawn_with(task.kind(), |token| task.spawn(token))
    }

    /// Creates a task from a future factory, publishing `TaskCreated` or `TaskCreateFailed`.
    pub(crate) fn spawn_with(
        &self,
        kind: TaskKind,
        make: impl FnOnce(CancellationToken) -> BoxTaskFuture,
    ) -> Result<TaskHandle, SpawnError> {
        let token = self.token.child_token();
        let done = CancellationToken::new();
        let fut = Box::pin(handle::watch(make(token.clone()), done.clone()));
        match self.host.spawn(kind, fut) {
            Ok(join) => {
                self.bus.publish(
                    Event::new(EventKind::TaskCreated)
                        .with_task(kind)
                        .with_count(u32::from(kind.priority())),
                );
                Ok(TaskHandle::new(kind, join, token, done))
            }
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::TaskCreateFailed)
                        .with_task(kind)
                        .with_reason(e.to_string()),
                );
                Err(e)
            }
        }
    }

    /// Requests an irreversible device restart. Only the first request takes effect.
    pub fn restart_device(&self, reason: RestartReason) {
        if !self.restart.trip(reason.clone()) {
            return;
        }
        self.bus.publish(
            Event::new(EventKind::DeviceRestart)
                .with_reason(reason.to_string())
                .with_heap(self.host.heap()),
        );
        self.host.restart_device(&reason);
    }
}
