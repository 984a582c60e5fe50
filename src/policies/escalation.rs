//! # Escalation ladder for consecutive receive timeouts.
//!
//! [`EscalationLadder`] is an ordered list of `(threshold, action)` steps evaluated against
//! the consumer's consecutive-timeout counter.
//!
//! ```text
//! count:   1      2      3             4              5
//!          ·    Warn  SoftRecover  ResetQueue    Terminate
//! ```
//!
//! ## Rules
//! - Non-terminal steps fire when the counter **equals** their threshold.
//! - The terminal step fires when the counter **reaches or exceeds** its threshold.
//! - The counter grows by exactly one per timeout, so an ascending pass fires every
//!   step exactly once, in order.

use crate::error::ConfigError;

/// Recovery action attached to a ladder step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecoveryAction {
    /// Emit a warning only.
    Warn,
    /// Clear task-local caches and buffers.
    SoftRecover,
    /// Discard everything buffered in the channel.
    ResetQueue,
    /// Mark unhealthy and terminate the instance so the supervisor recreates it.
    Terminate,
}

impl RecoveryAction {
    /// Returns a short stable label (kebab-case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RecoveryAction::Warn => "warn",
            RecoveryAction::SoftRecover => "soft-recover",
            RecoveryAction::ResetQueue => "reset-queue",
            RecoveryAction::Terminate => "terminate",
        }
    }
}

/// One rung of the ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EscalationStep {
    /// Consecutive-timeout count at which the step fires.
    pub threshold: u32,
    /// What to do.
    pub action: RecoveryAction,
}

impl EscalationStep {
    /// Creates a step.
    pub const fn new(threshold: u32, action: RecoveryAction) -> Self {
        Self { threshold, action }
    }
}

/// Ordered `(threshold, action)` list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscalationLadder {
    steps: Vec<EscalationStep>,
}

impl Default for EscalationLadder {
    /// Returns the reference ladder: warn at 2, soft recovery at 3,
    /// queue reset at 4, terminate at 5.
    fn default() -> Self {
        Self {
            steps: vec![
                EscalationStep::new(2, RecoveryAction::Warn),
                EscalationStep::new(3, RecoveryAction::SoftRecover),
                EscalationStep::new(4, RecoveryAction::ResetQueue),
                EscalationStep::new(5, RecoveryAction::Terminate),
            ],
        }
    }
}

impl EscalationLadder {
    /// Creates a ladder from explicit steps. Call [`validate`](Self::validate) before use.
    pub fn new(steps: Vec<EscalationStep>) -> Self {
        Self { steps }
    }

    /// Steps in evaluation order.
    pub fn steps(&self) -> &[EscalationStep] {
        &self.steps
    }

    /// Threshold of the terminal step, if any.
    pub fn terminal_threshold(&self) -> Option<u32> {
        self.steps
            .iter()
            .find(|s| s.action == RecoveryAction::Terminate)
            .map(|s| s.threshold)
    }

    /// Checks ordering and the terminal step.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let last = self.steps.last().ok_or(ConfigError::EmptyLadder)?;
        if last.action != RecoveryAction::Terminate {
            return Err(ConfigError::LadderTerminal { found: last.action });
        }

        let mut prev = 0;
        for (i, step) in self.steps.iter().enumerate() {
            if step.threshold <= prev {
                return Err(ConfigError::LadderNotAscending {
                    prev,
                    next: step.threshold,
                });
            }
            if step.action == RecoveryAction::Terminate && i + 1 != self.steps.len() {
                return Err(ConfigError::LadderTerminal { found: step.action });
            }
            prev = step.threshold;
        }
        Ok(())
    }

    /// Returns the action that fires for the given consecutive-timeout count.
    pub fn action_for(&self, count: u32) -> Option<RecoveryAction> {
        self.steps.iter().find_map(|step| {
            let hit = match step.action {
                RecoveryAction::Terminate => count >= step.threshold,
                _ => count == step.threshold,
            };
            hit.then_some(step.action)
        })
    }
}
