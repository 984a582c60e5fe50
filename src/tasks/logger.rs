//! # Logger: periodic heartbeat report.
//!
//! Lowest-priority task. Every `logger_period` it publishes a [`EventKind::HeartbeatReport`]
//! carrying the producer, consumer and supervisor heartbeats. It takes no recovery
//! action and is not registered with the watchdog.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::Context;
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::tasks::{BoxTaskFuture, Task, TaskKind};

/// Factory for the logger task.
pub struct LoggerTask {
    ctx: Arc<Context>,
    period: Duration,
}

impl LoggerTask {
    /// Creates a logger reporting every `period`.
    pub fn new(ctx: Arc<Context>, period: Duration) -> Self {
        Self { ctx, period }
    }
}

impl Task for LoggerTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Logger
    }

    fn spawn(&self, token: CancellationToken) -> BoxTaskFuture {
        Box::pin(run(Arc::clone(&self.ctx), self.period, token))
    }
}

async fn run(ctx: Arc<Context>, period: Duration, token: CancellationToken) -> Result<(), TaskError> {
    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = tokio::time::sleep(period) => {}
        }
        ctx.bus.publish(
            Event::new(EventKind::HeartbeatReport)
                .with_tick(ctx.now())
                .with_heartbeats(ctx.heartbeats.snapshot(&TaskKind::HEARTBEATS)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::core::testing::{context, drain};

    #[tokio::test(start_paused = true)]
    async fn test_reports_every_period() {
        let (ctx, _host) = context(Config::default());
        ctx.heartbeats.stamp(TaskKind::Consumer, 42);
        let mut rx = ctx.bus.subscribe();

        let token = CancellationToken::new();
        let logger = LoggerTask::new(Arc::clone(&ctx), Duration::from_millis(1000));
        let join = tokio::spawn(logger.spawn(token.clone()));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        token.cancel();
        join.await.unwrap().unwrap();

        let reports = drain(&mut rx);
        assert_eq!(reports.len(), 3);
        let last = reports.last().and_then(|e| e.heartbeats.clone()).unwrap();
        assert_eq!(last.len(), 3);
        assert_eq!(last[1].task, TaskKind::Consumer);
        assert_eq!(last[1].last_seen, 42);
        assert_eq!(reports[2].tick, Some(3000));
    }
}
