//! # Consumer: receive, transmit, and escalate on silence.
//!
//! The consumer blocks on the channel for up to `consumer_timeout`. Every expiry bumps a
//! consecutive-timeout counter and consults the [`EscalationLadder`]; any received value
//! resets the counter.
//!
//! ```text
//! recv_timeout(consumer_timeout)
//!   ├─ Ok(v)      ─► counter = 0, stamp heartbeat, healthy
//!   │                alloc scratch ─┬─ Ok  ─► store v, MessageTransmitted, free
//!   │                               └─ Err ─► unhealthy, AllocFailed, exit Fatal
//!   └─ TimedOut   ─► counter += 1, ReceiveTimeout
//!                    ladder.action_for(counter):
//!                      Warn        ─► Escalation
//!                      SoftRecover ─► clear local cache, Escalation
//!                      ResetQueue  ─► channel.reset(), Escalation
//!                      Terminate   ─► unhealthy, Escalation, exit Fail
//! free heap < low_warn ─► LowMemory
//! feed watchdog; pause(consumer_pause)
//! ```
//!
//! A terminated consumer is never restarted in place: the supervisor recreates it with a
//! fresh [`ConsumerState`].
//!
//! [`EscalationLadder`]: crate::policies::EscalationLadder

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::channel::Message;
use crate::core::Context;
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::policies::RecoveryAction;
use crate::tasks::{BoxTaskFuture, Task, TaskKind};

/// Recovery state of one consumer instance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerState {
    timeouts: u32,
    last_transmitted: Option<Message>,
}

impl ConsumerState {
    /// Fresh state: no timeouts, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive receive timeouts so far.
    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    /// Task-local cache: the last value transmitted.
    pub fn last_transmitted(&self) -> Option<Message> {
        self.last_transmitted
    }

    /// A value arrived: the timeout counter starts over.
    pub fn on_received(&mut self) {
        self.timeouts = 0;
    }

    /// Records a transmitted value in the local cache.
    pub fn on_transmitted(&mut self, value: Message) {
        self.last_transmitted = Some(value);
    }

    /// Counts one more consecutive timeout and returns the new count.
    pub fn on_timeout(&mut self) -> u32 {
        self.timeouts = self.timeouts.saturating_add(1);
        self.timeouts
    }

    /// Soft recovery: drops task-local cached data.
    pub fn clear_local(&mut self) {
        self.last_transmitted = None;
    }
}

/// Factory for consumer instances.
pub struct ConsumerTask {
    ctx: Arc<Context>,
}

impl ConsumerTask {
    /// Creates the factory.
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

impl Task for ConsumerTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Consumer
    }

    fn spawn(&self, token: CancellationToken) -> BoxTaskFuture {
        Box::pin(run(Arc::clone(&self.ctx), token))
    }
}

const KIND: TaskKind = TaskKind::Consumer;

async fn run(ctx: Arc<Context>, token: CancellationToken) -> Result<(), TaskError> {
    let watchdog = ctx.watchdog.add(KIND)?;
    let mut state = ConsumerState::new();

    loop {
        let received = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            r = ctx.channel.recv_timeout(ctx.cfg.consumer_timeout) => r,
        };

        match received {
            Ok(value) => {
                state.on_received();
                ctx.heartbeats.stamp(KIND, ctx.now());
                ctx.heartbeats.set_healthy(KIND, true);
                transmit(&ctx, &mut state, value)?;
            }
            Err(_) => {
                let count = state.on_timeout();
                ctx.bus.publish(
                    Event::new(EventKind::ReceiveTimeout)
                        .with_task(KIND)
                        .with_count(count)
                        .with_timeout(ctx.cfg.consumer_timeout),
                );
                if let Some(action) = ctx.cfg.escalation.action_for(count) {
                    escalate(&ctx, &mut state, action, count)?;
                }
            }
        }

        let heap = ctx.host.heap();
        if ctx.cfg.memory.is_low(heap) {
            ctx.bus.publish(
                Event::new(EventKind::LowMemory)
                    .with_task(KIND)
                    .with_heap(heap),
            );
        }

        watchdog.feed()?;

        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = tokio::time::sleep(ctx.cfg.consumer_pause) => {}
        }
    }
}

/// Stages `value` in a transient scratch cell and hands it on.
fn transmit(ctx: &Context, state: &mut ConsumerState, value: Message) -> Result<(), TaskError> {
    let mut cell = match ctx.host.alloc_scratch() {
        Ok(cell) => cell,
        Err(e) => {
            ctx.heartbeats.set_healthy(KIND, false);
            ctx.bus.publish(
                Event::new(EventKind::AllocFailed)
                    .with_task(KIND)
                    .with_value(value)
                    .with_heap(ctx.host.heap())
                    .with_reason(e.to_string()),
            );
            return Err(TaskError::Fatal {
                error: e.to_string(),
            });
        }
    };
    cell.store(value);
    if let Some(v) = cell.load() {
        ctx.bus
            .publish(Event::new(EventKind::MessageTransmitted).with_value(v));
        state.on_transmitted(v);
    }
    Ok(())
}

/// Applies one ladder step. `Err` ends this instance.
fn escalate(
    ctx: &Context,
    state: &mut ConsumerState,
    action: RecoveryAction,
    count: u32,
) -> Result<(), TaskError> {
    let ev = Event::new(EventKind::Escalation)
        .with_task(KIND)
        .with_action(action)
        .with_count(count)
        .with_heap(ctx.host.heap());

    match action {
        RecoveryAction::Warn => ctx.bus.publish(ev),
        RecoveryAction::SoftRecover => {
            state.clear_local();
            ctx.bus.publish(ev);
        }
        RecoveryAction::ResetQueue => {
            let discarded = ctx.channel.reset();
            ctx.bus
                .publish(ev.with_reason(format!("discarded {discarded} queued messages")));
        }
        RecoveryAction::Terminate => {
            ctx.heartbeats.set_healthy(KIND, false);
            ctx.bus.publish(ev);
            return Err(TaskError::Fail {
                error: format!("{count} consecutive receive timeouts"),
            });
        }
    }
    Ok(())
}
