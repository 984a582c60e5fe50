//! Runtime core: boot, shared context and lifecycle.
//!
//! The public entry point is [`Runtime`] (built through [`RuntimeBuilder`]), which boots
//! the task set, watches for a device-restart request, and performs graceful shutdown.
//!
//! Internal modules:
//! - [`runtime`]: boot sequence, drive loop, grace handling;
//! - [`context`]: the single supervisory context shared by every task;
//! - [`heartbeat`]: lock-free liveness table;
//! - [`watchdog`]: task watchdog and its monitor loop;
//! - [`restart`]: restart reasons and the one-shot restart latch;
//! - [`handle`]: ownership of created task instances;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod config;
mod context;
mod handle;
mod heartbeat;
mod restart;
mod runtime;
mod shutdown;
mod watchdog;

pub use builder::RuntimeBuilder;
pub use config::Config;
pub use context::Context;
pub use handle::{TaskExit, TaskHandle};
pub use heartbeat::{HeartbeatRegistry, HeartbeatSnapshot};
pub use restart::{BootStage, RestartLatch, RestartReason};
pub use runtime::Runtime;
pub use watchdog::{Watchdog, WatchdogError, WatchdogGuard, WatchdogSettings};

pub(crate) use watchdog::monitor as watchdog_monitor;

#[cfg(test)]
pub(crate) use context::testing;
