//! # Producer: periodic value generator.
//!
//! Every `producer_period` the producer offers the next value of a wrapping counter to
//! the channel without blocking. A full channel drops the value; the counter advances
//! either way.
//!
//! ```text
//! loop {
//!   try_send(next) ─┬─ Ok   ─► stamp heartbeat, healthy, MessageQueued
//!                   └─ Full ─► MessageDropped
//!   next = next.wrapping_add(1)
//!   stack headroom < stack_warn_words ─► StackLow
//!   feed watchdog; sleep(producer_period) (cancellable)
//! }
//! ```
//!
//! The heartbeat is only stamped on a successful send, so a producer stuck behind a
//! full channel eventually looks stale to the supervisor.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::channel::{BoundedChannel, Message};
use crate::core::Context;
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::tasks::{BoxTaskFuture, Task, TaskKind};

/// Counter state of one producer instance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProducerState {
    next: Message,
}

impl ProducerState {
    /// Starts at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value the next step will offer.
    pub fn next(&self) -> Message {
        self.next
    }

    /// Offers the current value and advances the counter.
    ///
    /// Returns `Ok(value)` if it was queued, `Err(value)` if the channel was full.
    pub fn step(&mut self, channel: &BoundedChannel<Message>) -> Result<Message, Message> {
        let value = self.next;
        self.next = self.next.wrapping_add(1);
        channel
            .try_send(value)
            .map(|()| value)
            .map_err(|e| e.into_inner())
    }
}

/// Factory for producer instances.
pub struct ProducerTask {
    ctx: Arc<Context>,
}

impl ProducerTask {
    /// Creates the factory.
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

impl Task for ProducerTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Producer
    }

    fn spawn(&self, token: CancellationToken) -> BoxTaskFuture {
        Box::pin(run(Arc::clone(&self.ctx), token))
    }
}

async fn run(ctx: Arc<Context>, token: CancellationToken) -> Result<(), TaskError> {
    const KIND: TaskKind = TaskKind::Producer;

    let watchdog = ctx.watchdog.add(KIND)?;
    let mut state = ProducerState::new();

    loop {
        match state.step(&ctx.channel) {
            Ok(value) => {
                ctx.heartbeats.stamp(KIND, ctx.now());
                ctx.heartbeats.set_healthy(KIND, true);
                ctx.bus
                    .publish(Event::new(EventKind::MessageQueued).with_value(value));
            }
            Err(value) => {
                ctx.bus
                    .publish(Event::new(EventKind::MessageDropped).with_value(value));
            }
        }

        if let Some(words) = ctx.host.stack_headroom(KIND)
            && words < ctx.cfg.stack_warn_words
        {
            ctx.bus.publish(
                Event::new(EventKind::StackLow)
                    .with_task(KIND)
                    .with_stack_words(words),
            );
        }

        watchdog.feed()?;

        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = tokio::time::sleep(ctx.cfg.producer_period) => {}
        }
    }
}
