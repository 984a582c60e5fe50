//! # The supervised task set.
//!
//! This module provides the task seam and the four members of the task set:
//! - [`Task`] / [`TaskKind`] - re-creatable unit and the fixed kinds with their priorities
//! - [`ProducerTask`] - periodic value generator
//! - [`ConsumerTask`] - receiver with the escalation ladder
//! - [`Supervisor`] - heartbeat watcher that recreates workers and escalates to a device restart
//! - [`LoggerTask`] - optional heartbeat report

mod consumer;
mod logger;
mod producer;
mod supervisor;
mod task;

pub use consumer::{ConsumerState, ConsumerTask};
pub use logger::LoggerTask;
pub use producer::{ProducerState, ProducerTask};
pub use supervisor::{Supervisor, SupervisorState};
pub use task::{BoxTaskFuture, Task, TaskKind, TaskRef};
