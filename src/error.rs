//! Error types used by the rtvisor runtime and its tasks.
//!
//! This module defines three enums:
//!
//! - [`RuntimeError`]: errors that leave the runtime (device restart, shutdown overrun, bad config).
//! - [`TaskError`]: reasons a supervised task instance terminated.
//! - [`ConfigError`]: rejected configuration, reported by [`Config::validate`](crate::Config::validate).
//!
//! All of them provide `as_label` for logs and event payloads.

use std::time::Duration;
use thiserror::Error;

use crate::core::{RestartReason, WatchdogError};
use crate::policies::RecoveryAction;

/// # Errors produced by the rtvisor runtime.
///
/// Only these leave [`Runtime::run`](crate::Runtime::run): every other failure is
/// contained and recovered inside the supervised task set.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration rejected before boot.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A full device restart was requested; the runtime stopped every task.
    #[error("device restart requested: {reason}")]
    DeviceRestart {
        /// Why the restart was triggered.
        reason: RestartReason,
    },

    /// Shutdown grace period was exceeded; remaining tasks were aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the tasks that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use rtvisor::{RestartReason, RuntimeError};
    ///
    /// let err = RuntimeError::DeviceRestart { reason: RestartReason::SupervisorExited };
    /// assert_eq!(err.as_label(), "runtime_device_restart");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::InvalidConfig(_) => "runtime_invalid_config",
            RuntimeError::DeviceRestart { .. } => "runtime_device_restart",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns the restart reason when this error is a device restart.
    pub fn restart_reason(&self) -> Option<&RestartReason> {
        match self {
            RuntimeError::DeviceRestart { reason } => Some(reason),
            _ => None,
        }
    }
}

/// # Reasons a task instance terminated.
///
/// A terminated worker is never restarted in place: the supervisor notices the
/// missing handle (or stale heartbeat) and creates a fresh instance.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// The instance gave up after exhausting its recovery ladder.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Unrecoverable for this instance (e.g. allocation failure under memory pressure).
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Watchdog subscription could not be established.
    #[error("watchdog: {0}")]
    Watchdog(#[from] WatchdogError),
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use rtvisor::TaskError;
    ///
    /// let err = TaskError::Fatal { error: "oom".into() };
    /// assert_eq!(err.as_label(), "task_fatal");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Watchdog(_) => "task_watchdog",
        }
    }

    /// True for errors that the instance could not have recovered from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskError::Fatal { .. } | TaskError::Watchdog(_))
    }
}

/// # Configuration rejected by [`Config::validate`](crate::Config::validate).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A period or timeout that must be positive was zero.
    #[error("`{field}` must be greater than zero")]
    ZeroDuration {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The escalation ladder has no steps.
    #[error("escalation ladder is empty")]
    EmptyLadder,

    /// Thresholds must start at 1 or above and strictly increase.
    #[error("escalation threshold {next} does not follow {prev}")]
    LadderNotAscending {
        /// Previous threshold (0 for the first step).
        prev: u32,
        /// Offending threshold.
        next: u32,
    },

    /// Only the last step may terminate, and the last step must.
    #[error("escalation ladder must end with a single terminate step (found {found:?} last)")]
    LadderTerminal {
        /// Action found in the last position.
        found: RecoveryAction,
    },

    /// A staleness multiplier of zero would mark every task stale.
    #[error("staleness multiplier for {task} must be greater than zero")]
    ZeroMultiplier {
        /// Task kind name.
        task: &'static str,
    },

    /// The absolute heap floor must sit below the restart floor.
    #[error("critical heap floor {critical} must be below restart floor {restart}")]
    FloorsInverted {
        /// Absolute floor in bytes.
        critical: usize,
        /// Restart-escalation floor in bytes.
        restart: usize,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::ZeroDuration { .. } => "config_zero_duration",
            ConfigError::EmptyLadder => "config_empty_ladder",
            ConfigError::LadderNotAscending { .. } => "config_ladder_not_ascending",
            ConfigError::LadderTerminal { .. } => "config_ladder_terminal",
            ConfigError::ZeroMultiplier { .. } => "config_zero_multiplier",
            ConfigError::FloorsInverted { .. } => "config_floors_inverted",
        }
    }
}
