//! Recovery and escalation policies.
//!
//! This module groups the knobs that decide **when** a failure signal turns into a
//! recovery action.
//!
//! ## Contents
//! - [`EscalationLadder`] consumer reaction to consecutive receive timeouts
//! - [`StalenessPolicy`] how old a heartbeat may get before the supervisor recreates a task
//! - [`MemoryPolicy`] heap floors that escalate to a device restart
//!
//! ## Quick wiring
//! ```text
//! Config { escalation, staleness, memory }
//!      ├─► tasks::consumer uses escalation.action_for(count) and memory.is_low(heap)
//!      └─► tasks::supervisor uses staleness windows and memory.evaluate(restarts, heap)
//! ```

mod escalation;
mod memory;
mod staleness;

pub use escalation::{EscalationLadder, EscalationStep, RecoveryAction};
pub use memory::MemoryPolicy;
pub use staleness::{StalenessPolicy, is_stale};
