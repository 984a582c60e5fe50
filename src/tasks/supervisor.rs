//! # Supervisor: heartbeat watcher and task recreator.
//!
//! The supervisor owns the producer and consumer handles. It sleeps first, then every
//! `supervisor_period` runs one [`tick`](Supervisor::tick):
//!
//! ```text
//! tick(now):
//!   1. stamp own heartbeat
//!   2. Status { producer, consumer heartbeats }
//!   3. reap finished workers ─► TaskExited
//!   4. producer stale (> producer_window)          ─► destroy, create, stamp(now), unhealthy
//!   5. consumer absent or stale (> consumer_window) ─► destroy, create, stamp(now), unhealthy,
//!                                                      consumer restarts += 1
//!   6. HeapReport
//!   7. memory.evaluate(consumer restarts, heap) ─► Some(reason) ⇒ device restart
//! feed watchdog
//! ```
//!
//! ## Rules
//! - Restart counters are never reset during the process lifetime.
//! - A failed creation (`TaskCreateFailed`) leaves the slot empty and does not count as
//!   a restart; the next tick tries again.
//! - Once a device restart is requested the supervisor stops its workers and exits.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{Context, RestartReason, TaskHandle, WatchdogGuard};
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::host::Tick;
use crate::policies::is_stale;
use crate::tasks::{TaskKind, TaskRef};

/// Restart counters, one per task kind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SupervisorState {
    restarts: [u32; TaskKind::COUNT],
}

impl SupervisorState {
    /// Recreations of `kind` so far.
    pub fn restarts(&self, kind: TaskKind) -> u32 {
        self.restarts[kind.index()]
    }

    /// Counts one recreation of `kind`; returns the new total.
    pub fn record(&mut self, kind: TaskKind) -> u32 {
        let n = &mut self.restarts[kind.index()];
        *n = n.saturating_add(1);
        *n
    }
}

struct Slot {
    task: TaskRef,
    handle: Option<TaskHandle>,
}

/// Watches the workers and recreates them.
pub struct Supervisor {
    ctx: Arc<Context>,
    producer: Slot,
    consumer: Slot,
    state: SupervisorState,
}

impl Supervisor {
    /// Creates a supervisor for the given worker factories. Slots start empty.
    pub fn new(ctx: Arc<Context>, producer: TaskRef, consumer: TaskRef) -> Self {
        Self {
            ctx,
            producer: Slot {
                task: producer,
                handle: None,
            },
            consumer: Slot {
                task: consumer,
                handle: None,
            },
            state: SupervisorState::default(),
        }
    }

    /// Takes ownership of a worker created elsewhere (at boot).
    pub fn adopt(&mut self, handle: TaskHandle) {
        if let Some(slot) = self.slot_mut(handle.kind()) {
            slot.handle = Some(handle);
        }
    }

    /// Restart counters.
    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// True if a live handle is held for `kind`.
    pub fn has_worker(&self, kind: TaskKind) -> bool {
        match kind {
            TaskKind::Producer => self.producer.handle.is_some(),
            TaskKind::Consumer => self.consumer.handle.is_some(),
            _ => false,
        }
    }

    /// Runs until cancelled or until a device restart is requested.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), TaskError> {
        let ctx = Arc::clone(&self.ctx);
        let outcome = match ctx.watchdog.add(TaskKind::Supervisor) {
            Ok(watchdog) => self.supervise(&watchdog, &token).await,
            Err(e) => Err(e.into()),
        };
        self.stop_workers().await;
        outcome
    }

    async fn supervise(
        &mut self,
        watchdog: &WatchdogGuard<'_>,
        token: &CancellationToken,
    ) -> Result<(), TaskError> {
        let period = self.ctx.cfg.supervisor_period;
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = tokio::time::sleep(period) => {}
            }

            if let Some(reason) = self.tick().await {
                self.ctx.restart_device(reason);
                return Ok(());
            }
            watchdog.feed()?;
        }
    }

    /// One supervision pass. Returns the restart reason if the device must restart.
    pub(crate) async fn tick(&mut self) -> Option<RestartReason> {
        let ctx = Arc::clone(&self.ctx);
        let now = ctx.now();

        ctx.heartbeats.stamp(TaskKind::Supervisor, now);
        ctx.heartbeats.set_healthy(TaskKind::Supervisor, true);
        ctx.bus.publish(
            Event::new(EventKind::Status)
                .with_tick(now)
                .with_heartbeats(ctx.heartbeats.snapshot(&TaskKind::WORKERS)),
        );

        self.reap().await;

        let period = ctx.cfg.supervisor_period;
        let producer_window = ctx.cfg.staleness.producer_window(period);
        if self.check_stale(TaskKind::Producer, now, producer_window) {
            self.recreate(TaskKind::Producer).await;
        }

        let consumer_window = ctx.cfg.staleness.consumer_window(period);
        let stale = self.check_stale(TaskKind::Consumer, now, consumer_window);
        if stale || !self.has_worker(TaskKind::Consumer) {
            self.recreate(TaskKind::Consumer).await;
        }

        let heap = ctx.host.heap();
        ctx.bus
            .publish(Event::new(EventKind::HeapReport).with_heap(heap));

        ctx.cfg
            .memory
            .evaluate(self.state.restarts(TaskKind::Consumer), heap)
    }

    /// Checks a heartbeat against its window; publishes `TaskStalled` when late.
    fn check_stale(&self, kind: TaskKind, now: Tick, window: Tick) -> bool {
        let last = self.ctx.heartbeats.last_seen(kind);
        if !is_stale(now, last, window) {
            return false;
        }
        self.ctx.bus.publish(
            Event::new(EventKind::TaskStalled)
                .with_task(kind)
                .with_tick(last)
                .with_elapsed_ms(now.saturating_sub(last)),
        );
        true
    }

    /// Collects workers that ended on their own.
    async fn reap(&mut self) {
        for kind in TaskKind::WORKERS {
            let Some(slot) = self.slot_mut(kind) else {
                continue;
            };
            if !slot.handle.as_ref().is_some_and(TaskHandle::is_finished) {
                continue;
            }
            if let Some(handle) = slot.handle.take() {
                let exit = handle.join().await;
                self.ctx.bus.publish(
                    Event::new(EventKind::TaskExited)
                        .with_task(kind)
                        .with_reason(exit.describe()),
                );
            }
        }
    }

    /// Destroys whatever instance of `kind` is held and creates a fresh one.
    async fn recreate(&mut self, kind: TaskKind) {
        let ctx = Arc::clone(&self.ctx);
        let Some(slot) = self.slot_mut(kind) else {
            return;
        };
        if let Some(old) = slot.handle.take() {
            old.destroy().await;
        }

        let Ok(handle) = ctx.spawn_task(&slot.task) else {
            return;
        };
        let now = ctx.now();
        ctx.heartbeats.stamp(kind, now);
        ctx.heartbeats.set_healthy(kind, false);
        slot.handle = Some(handle);

        let restarts = self.state.record(kind);
        ctx.bus.publish(
            Event::new(EventKind::TaskRecreated)
                .with_task(kind)
                .with_tick(now)
                .with_count(restarts)
                .with_heap(ctx.host.heap()),
        );
    }

    async fn stop_workers(&mut self) {
        let grace = self.ctx.cfg.grace;
        for kind in TaskKind::WORKERS {
            if let Some(handle) = self.slot_mut(kind).and_then(|s| s.handle.take()) {
                handle.stop(grace).await;
            }
        }
    }

    fn slot_mut(&mut self, kind: TaskKind) -> Option<&mut Slot> {
        match kind {
            TaskKind::Producer => Some(&mut self.producer),
            TaskKind::Consumer => Some(&mut self.consumer),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::core::Config;
    use crate::core::testing::{context, drain};
    use crate::host::SimHost;
    use crate::tasks::{BoxTaskFuture, Task};

    /// Worker that never stamps and waits for cancellation.
    struct Silent(TaskKind);

    impl Task for Silent {
        fn kind(&self) -> TaskKind {
            self.0
        }

        fn spawn(&self, token: CancellationToken) -> BoxTaskFuture {
            Box::pin(async move {
                token.cancelled().await;
                Ok(())
            })
        }
    }

    /// Worker that fails right away.
    struct Quitter;

    impl Task for Quitter {
        fn kind(&self) -> TaskKind {
            TaskKind::Consumer
        }

        fn spawn(&self, _token: CancellationToken) -> BoxTaskFuture {
            Box::pin(async {
                Err(TaskError::Fail {
                    error: "quit".into(),
                })
            })
        }
    }

    /// Consumer that never stamps and hangs after cancellation; counts dropped instances.
    struct Wedged(Arc<AtomicUsize>);

    struct DropCount(Arc<AtomicUsize>);

    impl Drop for DropCount {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Task for Wedged {
        fn kind(&self) -> TaskKind {
            TaskKind::Consumer
        }

        fn spawn(&self, token: CancellationToken) -> BoxTaskFuture {
            let guard = DropCount(Arc::clone(&self.0));
            Box::pin(async move {
                let _guard = guard;
                token.cancelled().await;
                std::future::pending::<()>().await;
                Ok(())
            })
        }
    }

    fn supervisor(ctx: &Arc<Context>, consumer: TaskRef) -> Supervisor {
        Supervisor::new(
            Arc::clone(ctx),
            Arc::new(Silent(TaskKind::Producer)),
            consumer,
        )
    }

    fn spawn_into(sup: &mut Supervisor, ctx: &Context, kind: TaskKind) {
        let task = match kind {
            TaskKind::Producer => Arc::clone(&sup.producer.task),
            _ => Arc::clone(&sup.consumer.task),
        };
        sup.adopt(ctx.spawn_task(&task).unwrap());
    }

    fn count(events: &[Event], kind: EventKind, task: TaskKind) -> usize {
        events
            .iter()
            .filter(|e| e.kind == kind && e.task == Some(task))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_producer_is_recreated_with_fresh_heartbeat() {
        let (ctx, _host) = context(Config::default());
        let mut rx = ctx.bus.subscribe();
        let mut sup = supervisor(&ctx, Arc::new(Silent(TaskKind::Consumer)));
        spawn_into(&mut sup, &ctx, TaskKind::Producer);
        spawn_into(&mut sup, &ctx, TaskKind::Consumer);

        // Producer window is 4500 ticks; the consumer window (7500) is not exceeded yet.
        tokio::time::advance(Duration::from_millis(4000)).await;
        assert_eq!(sup.tick().await, None);
        assert_eq!(sup.state().restarts(TaskKind::Producer), 0);

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(sup.tick().await, None);

        assert_eq!(sup.state().restarts(TaskKind::Producer), 1);
        assert_eq!(sup.state().restarts(TaskKind::Consumer), 0);
        assert_eq!(ctx.heartbeats.last_seen(TaskKind::Producer), 5000);
        assert!(!ctx.heartbeats.is_healthy(TaskKind::Producer));
        assert!(sup.has_worker(TaskKind::Producer));

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::TaskStalled, TaskKind::Producer), 1);
        assert_eq!(count(&events, EventKind::TaskRecreated, TaskKind::Producer), 1);
        assert_eq!(count(&events, EventKind::TaskRecreated, TaskKind::Consumer), 0);

        // Fresh heartbeat: not stale again right away.
        tokio::time::advance(Duration::from_millis(1500)).await;
        sup.tick().await;
        assert_eq!(sup.state().restarts(TaskKind::Producer), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_consumer_is_recreated() {
        let (ctx, _host) = context(Config::default());
        let mut rx = ctx.bus.subscribe();
        let mut sup = supervisor(&ctx, Arc::new(Silent(TaskKind::Consumer)));
        spawn_into(&mut sup, &ctx, TaskKind::Producer);

        tokio::time::advance(Duration::from_millis(1500)).await;
        sup.tick().await;

        assert!(sup.has_worker(TaskKind::Consumer));
        assert_eq!(sup.state().restarts(TaskKind::Consumer), 1);
        assert_eq!(ctx.heartbeats.last_seen(TaskKind::Consumer), 1500);
        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::TaskStalled, TaskKind::Consumer), 0);
        assert_eq!(count(&events, EventKind::TaskRecreated, TaskKind::Consumer), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_consumer_is_destroyed_then_recreated() {
        let (ctx, _host) = context(Config::default());
        let mut rx = ctx.bus.subscribe();
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut sup = supervisor(&ctx, Arc::new(Wedged(Arc::clone(&dropped))));
        spawn_into(&mut sup, &ctx, TaskKind::Producer);
        spawn_into(&mut sup, &ctx, TaskKind::Consumer);

        // Consumer window is 7500 ticks.
        tokio::time::advance(Duration::from_millis(7400)).await;
        assert_eq!(sup.tick().await, None);
        assert_eq!(sup.state().restarts(TaskKind::Consumer), 0);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(sup.tick().await, None);

        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(sup.state().restarts(TaskKind::Consumer), 1);
        assert_eq!(ctx.heartbeats.last_seen(TaskKind::Consumer), 7600);
        assert!(!ctx.heartbeats.is_healthy(TaskKind::Consumer));
        assert!(sup.has_worker(TaskKind::Consumer));

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::TaskStalled, TaskKind::Consumer), 1);
        assert_eq!(count(&events, EventKind::TaskRecreated, TaskKind::Consumer), 1);
        assert_eq!(count(&events, EventKind::TaskExited, TaskKind::Consumer), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exited_consumer_is_reaped_and_recreated() {
        let (ctx, _host) = context(Config::default());
        let mut rx = ctx.bus.subscribe();
        let mut sup = supervisor(&ctx, Arc::new(Quitter));
        spawn_into(&mut sup, &ctx, TaskKind::Producer);
        spawn_into(&mut sup, &ctx, TaskKind::Consumer);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        sup.tick().await;

        let events = drain(&mut rx);
        let exited = events
            .iter()
            .find(|e| e.kind == EventKind::TaskExited)
            .expect("exit reported");
        assert_eq!(exited.task, Some(TaskKind::Consumer));
        assert_eq!(
            exited.reason.as_deref(),
            Some("task_failed: execution failed: quit")
        );
        assert_eq!(sup.state().restarts(TaskKind::Consumer), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_recreation_is_retried_next_tick() {
        let (ctx, host) = context(Config::default());
        let mut rx = ctx.bus.subscribe();
        let mut sup = supervisor(&ctx, Arc::new(Silent(TaskKind::Consumer)));
        spawn_into(&mut sup, &ctx, TaskKind::Producer);
        host.fail_spawn(TaskKind::Consumer, true);

        tokio::time::advance(Duration::from_millis(1500)).await;
        sup.tick().await;
        assert!(!sup.has_worker(TaskKind::Consumer));
        assert_eq!(sup.state().restarts(TaskKind::Consumer), 0);
        assert_eq!(
            count(&drain(&mut rx), EventKind::TaskCreateFailed, TaskKind::Consumer),
            1
        );

        host.fail_spawn(TaskKind::Consumer, false);
        tokio::time::advance(Duration::from_millis(1500)).await;
        sup.tick().await;
        assert!(sup.has_worker(TaskKind::Consumer));
        assert_eq!(sup.state().restarts(TaskKind::Consumer), 1);
    }

    async fn ticks_until_restart(free_heap: usize, ticks: usize) -> (Vec<Option<RestartReason>>, u32) {
        let host = Arc::new(SimHost::new().with_free_heap(free_heap));
        let ctx = crate::core::testing::context_on(Config::default(), host);
        let mut sup = supervisor(&ctx, Arc::new(Quitter));
        spawn_into(&mut sup, &ctx, TaskKind::Producer);

        let mut out = Vec::new();
        for _ in 0..ticks {
            // Lets the previous consumer instance fail.
            tokio::time::sleep(Duration::from_millis(1500)).await;
            out.push(sup.tick().await);
        }
        (out, sup.state().restarts(TaskKind::Consumer))
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_three_consumer_restarts_below_floor() {
        let (decisions, restarts) = ticks_until_restart(15 * 1024, 3).await;
        assert_eq!(restarts, 3);
        assert_eq!(decisions[0], None);
        assert_eq!(decisions[1], None);
        assert_eq!(
            decisions[2],
            Some(RestartReason::MemoryExhausted {
                restarts: 3,
                free_heap: 15 * 1024
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_restart_at_the_floor() {
        let (decisions, restarts) = ticks_until_restart(16 * 1024, 5).await;
        assert_eq!(restarts, 5);
        assert!(decisions.iter().all(Option::is_none));
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_floor_restarts_regardless_of_counts() {
        let (ctx, host) = context(Config::default());
        let mut sup = supervisor(&ctx, Arc::new(Silent(TaskKind::Consumer)));
        spawn_into(&mut sup, &ctx, TaskKind::Producer);
        spawn_into(&mut sup, &ctx, TaskKind::Consumer);
        host.set_free_heap(7 * 1024);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(
            sup.tick().await,
            Some(RestartReason::CriticalHeapFloor {
                min_free_heap: 7 * 1024
            })
        );
        assert_eq!(sup.state().restarts(TaskKind::Consumer), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_requests_device_restart_and_stops_workers() {
        let (ctx, host) = context(Config::default());
        let mut sup = supervisor(&ctx, Arc::new(Silent(TaskKind::Consumer)));
        spawn_into(&mut sup, &ctx, TaskKind::Producer);
        spawn_into(&mut sup, &ctx, TaskKind::Consumer);
        host.set_free_heap(4 * 1024);

        let res = sup.run(CancellationToken::new()).await;
        assert!(res.is_ok());
        assert_eq!(
            host.restart_requests(),
            vec![RestartReason::CriticalHeapFloor {
                min_free_heap: 4 * 1024
            }]
        );
        assert!(ctx.restart_latch().is_tripped());
        assert!(!ctx.watchdog.is_registered(TaskKind::Supervisor));
    }
}
