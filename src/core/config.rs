//! # Global runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the task set: periods, timeouts,
//! the queue size, the watchdog, and the recovery policies.
//!
//! ## Sentinel values
//! - `logger_period = 0s` → logger task disabled
//!
//! Every other duration must be positive; [`Config::validate`] enforces it together
//! with the policy invariants and runs when the runtime is built.

use std::time::Duration;

use crate::error::ConfigError;
use crate::policies::{EscalationLadder, MemoryPolicy, StalenessPolicy};

/// Configuration of the supervised task set.
///
/// ## Field semantics
/// - `queue_capacity`: channel slots (`0` is accepted here and fails at boot, like any
///   other channel-creation failure)
/// - `producer_period`: producer loop period
/// - `consumer_timeout`: consumer receive timeout
/// - `consumer_pause`: consumer pause after each iteration
/// - `supervisor_period`: supervisor tick period; staleness windows are multiples of it
/// - `logger_period`: heartbeat report period (`0s` = no logger)
/// - `watchdog_timeout` / `watchdog_panic`: task watchdog settings
/// - `grace`: wait for tasks to stop on shutdown
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `stack_warn_words`: producer stack-headroom warning threshold
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of messages the channel can hold.
    pub queue_capacity: usize,

    /// Producer loop period.
    pub producer_period: Duration,

    /// Consumer receive timeout; each expiry climbs the escalation ladder.
    pub consumer_timeout: Duration,

    /// Consumer pause after each iteration.
    pub consumer_pause: Duration,

    /// Supervisor tick period.
    pub supervisor_period: Duration,

    /// Logger report period (`Duration::ZERO` disables the logger).
    pub logger_period: Duration,

    /// Maximum time between watchdog check-ins.
    pub watchdog_timeout: Duration,

    /// Restart the device when a watchdog subscription expires.
    pub watchdog_panic: bool,

    /// Maximum time to wait for graceful shutdown before aborting tasks.
    pub grace: Duration,

    /// Capacity of the event bus broadcast ring buffer.
    pub bus_capacity: usize,

    /// Producer stack headroom (words) under which a warning is published.
    pub stack_warn_words: usize,

    /// Listen for SIGINT/SIGTERM/Ctrl-C and shut down gracefully.
    pub handle_os_signals: bool,

    /// Consumer reaction to consecutive receive timeouts.
    pub escalation: EscalationLadder,

    /// Heartbeat staleness windows.
    pub staleness: StalenessPolicy,

    /// Heap floors and the restart-count trigger.
    pub memory: MemoryPolicy,
}

impl Config {
    /// Returns the logger period as an `Option`.
    ///
    /// - `None` → logger disabled
    /// - `Some(d)` → report every `d`
    #[inline]
    pub fn logger_period(&self) -> Option<Duration> {
        if self.logger_period == Duration::ZERO {
            None
        } else {
            Some(self.logger_period)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Checks periods and policy invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("producer_period", self.producer_period),
            ("consumer_timeout", self.consumer_timeout),
            ("supervisor_period", self.supervisor_period),
            ("watchdog_timeout", self.watchdog_timeout),
        ];
        for (field, d) in durations {
            if d.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }

        self.escalation.validate()?;

        if self.staleness.producer_periods == 0 {
            return Err(ConfigError::ZeroMultiplier { task: "producer" });
        }
        if self.staleness.consumer_periods == 0 {
            return Err(ConfigError::ZeroMultiplier { task: "consumer" });
        }

        if self.memory.critical_floor >= self.memory.restart_floor {
            return Err(ConfigError::FloorsInverted {
                critical: self.memory.critical_floor,
                restart: self.memory.restart_floor,
            });
        }
        Ok(())
    }
}

impl Default for Config {
    /// Reference configuration:
    ///
    /// - queue of 10 messages
    /// - producer every 150ms, consumer timeout 1000ms + 50ms pause, supervisor every 1500ms
    /// - logger every 1000ms
    /// - watchdog 5s with device restart on expiry
    /// - grace 5s, bus capacity 1024, stack warning under 100 words
    /// - default escalation ladder, staleness (3×/5×) and memory (20/16/8 KiB) policies
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            producer_period: Duration::from_millis(150),
            consumer_timeout: Duration::from_millis(1000),
            consumer_pause: Duration::from_millis(50),
            supervisor_period: Duration::from_millis(1500),
            logger_period: Duration::from_millis(1000),
            watchdog_timeout: Duration::from_secs(5),
            watchdog_panic: true,
            grace: Duration::from_secs(5),
            bus_capacity: 1024,
            stack_warn_words: 100,
            handle_os_signals: true,
            escalation: EscalationLadder::default(),
            staleness: StalenessPolicy::default(),
            memory: MemoryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::{EscalationStep, RecoveryAction};

    #[test]
    fn test_default_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_logger_sentinel() {
        let mut cfg = Config::default();
        assert_eq!(cfg.logger_period(), Some(Duration::from_millis(1000)));
        cfg.logger_period = Duration::ZERO;
        assert_eq!(cfg.logger_period(), None);
    }

    #[test]
    fn test_rejects_zero_periods() {
        let mut cfg = Config::default();
        cfg.supervisor_period = Duration::ZERO;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroDuration {
                field: "supervisor_period"
            })
        );
    }

    #[test]
    fn test_rejects_bad_policies() {
        let mut cfg = Config::default();
        cfg.staleness.consumer_periods = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroMultiplier { task: "consumer" })
        );

        let mut cfg = Config::default();
        cfg.memory.critical_floor = cfg.memory.restart_floor;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::FloorsInverted { .. })
        ));

        let mut cfg = Config::default();
        cfg.escalation = EscalationLadder::new(vec![EscalationStep::new(
            2,
            RecoveryAction::Warn,
        )]);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::LadderTerminal { .. })
        ));
    }

    #[test]
    fn test_zero_queue_capacity_passes_validation() {
        let mut cfg = Config::default();
        cfg.queue_capacity = 0;
        assert!(cfg.validate().is_ok());
    }
}
