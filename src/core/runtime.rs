//! # Runtime: boot, supervision lifetime, and teardown.
//!
//! The [`Runtime`] owns the event bus, the [`SubscriberSet`], the watchdog and the host.
//! `run()` boots the task set and then waits for one of three outcomes.
//!
//! ## Boot sequence
//! ```text
//! run():
//!   subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!   BootStarted
//!   watchdog.deinit(); watchdog.init(timeout, panic)   ── Err ─► BootFailure{Watchdog}
//!   BoundedChannel::new(queue_capacity)                ── Err ─► BootFailure{Channel}
//!   Context::new(..)
//!   create Producer (6), Consumer (5), Supervisor (4)  ── Err ─► BootFailure{Task(kind)}
//!   create Logger (2) if logger_period > 0             ── Err ─► TaskCreateFailed only
//!   spawn watchdog monitor
//!   BootCompleted
//! ```
//! A boot failure cancels whatever was created, requests a device restart and returns
//! [`RuntimeError::DeviceRestart`].
//!
//! ## Drive
//! ```text
//! select (biased) {
//!   restart latch tripped   ─► stop all ─► Err(DeviceRestart{reason})
//!   supervisor task ended   ─► restart_device(SupervisorExited) ─► stop all ─► Err(DeviceRestart)
//!   shutdown requested      ─► ShutdownRequested ─► stop all within grace:
//!                                ├─ all stopped ─► AllStoppedWithin ─► Ok(())
//!                                └─ stuck tasks ─► GraceExceeded    ─► Err(GraceExceeded)
//! }
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use rtvisor::{Config, Runtime, SimHost};
//! #[cfg(feature = "logging")]
//! use rtvisor::LogWriter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = Arc::new(SimHost::new());
//!     let mut builder = Runtime::builder(Config::default()).with_host(host.clone());
//!     #[cfg(feature = "logging")]
//!     { builder = builder.with_subscribers(vec![Arc::new(LogWriter::new())]); }
//!
//!     let runtime = builder.build()?;
//!     match runtime.run().await {
//!         Ok(()) => println!("shut down"),
//!         Err(e) => eprintln!("{e}; restarts so far: {:?}", host.restart_requests()),
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    BootStage, Config, Context, RestartReason, RuntimeBuilder, TaskHandle, Watchdog, shutdown,
    watchdog_monitor,
};
use crate::channel::BoundedChannel;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::host::Host;
use crate::subscribers::SubscriberSet;
use crate::tasks::{ConsumerTask, LoggerTask, ProducerTask, Supervisor, TaskKind, TaskRef};

/// Boots and supervises the task set.
pub struct Runtime {
    cfg: Config,
    host: Arc<dyn Host>,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    watchdog: Arc<Watchdog>,
    shutdown: CancellationToken,
    listening: AtomicBool,
}

/// Everything created by a successful boot.
struct Booted {
    ctx: Arc<Context>,
    supervisor: TaskHandle,
    logger: Option<TaskHandle>,
    monitor: JoinHandle<()>,
}

enum Stop {
    Restart(RestartReason),
    SupervisorExited,
    Shutdown,
}

impl Runtime {
    /// Starts building a runtime.
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        host: Arc<dyn Host>,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        watchdog: Arc<Watchdog>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            host,
            bus,
            subs,
            watchdog,
            shutdown,
            listening: AtomicBool::new(false),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Event bus; subscribe before `run()` to observe boot.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Cancelling this token requests a graceful shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Boots the task set and supervises it until a device restart or a shutdown.
    ///
    /// Returns `Ok(())` after a graceful shutdown, [`RuntimeError::DeviceRestart`] once a
    /// restart was requested (the host's `restart_device` has already been called), or
    /// [`RuntimeError::GraceExceeded`] when tasks did not stop in time.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        self.subscriber_listener();
        let outcome = match self.boot() {
            Ok(booted) => self.drive(booted).await,
            Err(e) => Err(e),
        };
        self.watchdog.deinit();
        outcome
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    fn subscriber_listener(&self) {
        if self.listening.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(n)) => {
                        eprintln!("[rtvisor] event listener lagged, {n} events lost");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    fn boot(&self) -> Result<Booted, RuntimeError> {
        self.bus.publish(Event::new(EventKind::BootStarted));

        self.watchdog.deinit();
        if let Err(e) = self
            .watchdog
            .init(self.cfg.watchdog_timeout, self.cfg.watchdog_panic)
        {
            return Err(self.boot_failed(BootStage::Watchdog, &e.to_string()));
        }

        let channel = match BoundedChannel::new(self.cfg.queue_capacity) {
            Ok(ch) => ch,
            Err(e) => return Err(self.boot_failed(BootStage::Channel, &e.to_string())),
        };

        let ctx = Arc::new(Context::new(
            self.cfg.clone(),
            Arc::clone(&self.host),
            self.bus.clone(),
            channel,
            Arc::clone(&self.watchdog),
            CancellationToken::new(),
        ));

        let producer: TaskRef = Arc::new(ProducerTask::new(Arc::clone(&ctx)));
        let consumer: TaskRef = Arc::new(ConsumerTask::new(Arc::clone(&ctx)));
        let mut supervisor =
            Supervisor::new(Arc::clone(&ctx), Arc::clone(&producer), Arc::clone(&consumer));

        for task in [&producer, &consumer] {
            match ctx.spawn_task(task) {
                Ok(handle) => {
                    ctx.heartbeats.stamp(task.kind(), ctx.now());
                    supervisor.adopt(handle);
                }
                Err(e) => {
                    ctx.token().cancel();
                    return Err(self.boot_failed(BootStage::Task(task.kind()), &e.to_string()));
                }
            }
        }

        let supervisor =
            match ctx.spawn_with(TaskKind::Supervisor, |token| supervisor.run(token).boxed()) {
                Ok(handle) => handle,
                Err(e) => {
                    ctx.token().cancel();
                    return Err(self.boot_failed(
                        BootStage::Task(TaskKind::Supervisor),
                        &e.to_string(),
                    ));
                }
            };

        // Optional; a failure is already reported as TaskCreateFailed.
        let logger = self.cfg.logger_period().and_then(|period| {
            let task: TaskRef = Arc::new(LoggerTask::new(Arc::clone(&ctx), period));
            ctx.spawn_task(&task).ok()
        });

        let monitor = tokio::spawn(watchdog_monitor(
            Arc::clone(&ctx),
            ctx.token().child_token(),
        ));

        self.bus.publish(Event::new(EventKind::BootCompleted));
        Ok(Booted {
            ctx,
            supervisor,
            logger,
            monitor,
        })
    }

    /// Reports a boot failure and performs the device restart directly.
    fn boot_failed(&self, stage: BootStage, detail: &str) -> RuntimeError {
        let reason = RestartReason::BootFailure { stage };
        self.bus.publish(
            Event::new(EventKind::BootFailed).with_reason(format!("{stage}: {detail}")),
        );
        self.bus.publish(
            Event::new(EventKind::DeviceRestart)
                .with_reason(reason.to_string())
                .with_heap(self.host.heap()),
        );
        self.host.restart_device(&reason);
        RuntimeError::DeviceRestart { reason }
    }

    async fn drive(&self, booted: Booted) -> Result<(), RuntimeError> {
        let Booted {
            ctx,
            supervisor,
            logger,
            monitor,
        } = booted;

        let stop = tokio::select! {
            biased;
            reason = ctx.restart_latch().tripped() => Stop::Restart(reason),
            _ = supervisor.finished() => Stop::SupervisorExited,
            _ = shutdown::requested(&self.shutdown, self.cfg.handle_os_signals) => Stop::Shutdown,
        };

        match stop {
            Stop::Restart(reason) => {
                let handles = std::iter::once(supervisor).chain(logger).collect();
                self.stop_all(&ctx, handles, monitor).await;
                Err(RuntimeError::DeviceRestart { reason })
            }
            Stop::SupervisorExited => {
                let exit = supervisor.join().await;
                self.bus.publish(
                    Event::new(EventKind::TaskExited)
                        .with_task(TaskKind::Supervisor)
                        .with_reason(exit.describe()),
                );
                let reason = supervisor_exit_reason(&ctx);
                self.stop_all(&ctx, logger.into_iter().collect(), monitor)
                    .await;
                Err(RuntimeError::DeviceRestart { reason })
            }
            Stop::Shutdown => {
                self.bus.publish(Event::new(EventKind::ShutdownRequested));
                let handles = std::iter::once(supervisor).chain(logger).collect();
                let stuck = self.stop_all(&ctx, handles, monitor).await;
                if stuck.is_empty() {
                    self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                    Ok(())
                } else {
                    self.bus.publish(
                        Event::new(EventKind::GraceExceeded)
                            .with_timeout(self.cfg.grace)
                            .with_reason(stuck.join(",")),
                    );
                    Err(RuntimeError::GraceExceeded {
                        grace: self.cfg.grace,
                        stuck,
                    })
                }
            }
        }
    }

    /// Cancels every task of this boot and waits up to `grace` for each.
    ///
    /// Returns the names of the tasks that had to be aborted.
    async fn stop_all(
        &self,
        ctx: &Context,
        handles: Vec<TaskHandle>,
        monitor: JoinHandle<()>,
    ) -> Vec<String> {
        ctx.token().cancel();
        monitor.abort();

        let grace = self.cfg.grace;
        let results = join_all(handles.into_iter().map(|h| async move {
            let kind = h.kind();
            (kind, h.stop(grace).await)
        }))
        .await;

        results
            .into_iter()
            .filter(|(_, stopped)| !stopped)
            .map(|(kind, _)| kind.to_string())
            .collect()
    }
}

/// Requests a `SupervisorExited` restart unless an earlier request already won the latch;
/// returns the reason that stands.
fn supervisor_exit_reason(ctx: &Context) -> RestartReason {
    ctx.restart_device(RestartReason::SupervisorExited);
    ctx.restart_latch()
        .reason()
        .cloned()
        .unwrap_or(RestartReason::SupervisorExited)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::testing::{context, drain};
    use crate::error::TaskError;
    use crate::host::{AllocError, HeapStats, ScratchCell, SimHost, SpawnError, TaskJoin, Tick};
    use crate::tasks::BoxTaskFuture;

    fn quiet_config() -> Config {
        let mut cfg = Config::default();
        cfg.handle_os_signals = false;
        cfg
    }

    fn runtime(cfg: Config, host: &Arc<SimHost>) -> Runtime {
        Runtime::builder(cfg)
            .with_host(host.clone())
            .build()
            .expect("valid config")
    }

    /// SimHost whose supervisor dies after a delay and whose logger ignores shutdown.
    struct FaultyHost {
        sim: Arc<SimHost>,
        crash_supervisor_after: Option<Duration>,
        hang_logger: bool,
    }

    impl FaultyHost {
        fn new(sim: &Arc<SimHost>) -> Self {
            Self {
                sim: Arc::clone(sim),
                crash_supervisor_after: None,
                hang_logger: false,
            }
        }
    }

    impl Host for FaultyHost {
        fn now(&self) -> Tick {
            self.sim.now()
        }

        fn spawn(&self, kind: TaskKind, fut: BoxTaskFuture) -> Result<TaskJoin, SpawnError> {
            let fut: BoxTaskFuture = match (kind, self.crash_supervisor_after) {
                (TaskKind::Supervisor, Some(after)) => Box::pin(async move {
                    tokio::select! {
                        res = fut => res,
                        _ = tokio::time::sleep(after) => Err(TaskError::Fatal {
                            error: "crashed".into(),
                        }),
                    }
                }),
                (TaskKind::Logger, _) if self.hang_logger => Box::pin(async move {
                    let res = fut.await;
                    std::future::pending::<()>().await;
                    res
                }),
                _ => fut,
            };
            self.sim.spawn(kind, fut)
        }

        fn heap(&self) -> HeapStats {
            self.sim.heap()
        }

        fn alloc_scratch(&self) -> Result<ScratchCell, AllocError> {
            self.sim.alloc_scratch()
        }

        fn stack_headroom(&self, kind: TaskKind) -> Option<usize> {
            self.sim.stack_headroom(kind)
        }

        fn restart_device(&self, reason: &RestartReason) {
            self.sim.restart_device(reason);
        }
    }

    fn faulty_runtime(cfg: Config, host: FaultyHost) -> Runtime {
        Runtime::builder(cfg)
            .with_host(Arc::new(host))
            .build()
            .expect("valid config")
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut cfg = quiet_config();
        cfg.consumer_timeout = Duration::ZERO;
        let err = Runtime::builder(cfg).build().err().expect("rejected");
        assert_eq!(err.as_label(), "runtime_invalid_config");
    }

    #[tokio::test]
    async fn test_channel_failure_restarts_device() {
        let host = Arc::new(SimHost::new());
        let mut cfg = quiet_config();
        cfg.queue_capacity = 0;
        let rt = runtime(cfg, &host);
        let mut rx = rt.bus().subscribe();

        let err = rt.run().await.unwrap_err();
        let expected = RestartReason::BootFailure {
            stage: BootStage::Channel,
        };
        assert_eq!(err.restart_reason(), Some(&expected));
        assert_eq!(host.restart_requests(), vec![expected]);
        assert_eq!(rt.watchdog.settings(), None);

        let kinds: Vec<EventKind> = drain(&mut rx).iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::BootStarted,
                EventKind::BootFailed,
                EventKind::DeviceRestart
            ]
        );
    }

    #[tokio::test]
    async fn test_task_creation_failure_restarts_device() {
        let host = Arc::new(SimHost::new());
        host.fail_spawn(TaskKind::Consumer, true);
        let rt = runtime(quiet_config(), &host);
        let mut rx = rt.bus().subscribe();

        let err = rt.run().await.unwrap_err();
        assert_eq!(
            err.restart_reason(),
            Some(&RestartReason::BootFailure {
                stage: BootStage::Task(TaskKind::Consumer)
            })
        );
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| e.kind == EventKind::TaskCreateFailed));
        assert!(!events.iter().any(|e| e.kind == EventKind::BootCompleted));
        assert_eq!(rt.watchdog.settings(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_token_stops_within_grace() {
        let host = Arc::new(SimHost::new());
        let rt = Arc::new(runtime(quiet_config(), &host));
        let mut rx = rt.bus().subscribe();
        let token = rt.shutdown_token();

        let run = tokio::spawn({
            let rt = Arc::clone(&rt);
            async move { rt.run().await }
        });
        tokio::time::sleep(Duration::from_secs(3)).await;
        token.cancel();

        assert!(run.await.unwrap().is_ok());
        assert!(host.restart_requests().is_empty());

        let events = drain(&mut rx);
        let has = |k: EventKind| events.iter().any(|e| e.kind == k);
        assert!(has(EventKind::BootCompleted));
        assert!(has(EventKind::MessageTransmitted));
        assert!(has(EventKind::HeartbeatReport));
        assert!(has(EventKind::ShutdownRequested));
        assert!(has(EventKind::AllStoppedWithin));
        assert!(!has(EventKind::TaskRecreated));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_consumer_failure_under_low_heap_restarts_device() {
        let host = Arc::new(SimHost::new().with_free_heap(12 * 1024));
        host.fail_alloc(true);
        let mut cfg = quiet_config();
        cfg.logger_period = Duration::ZERO;
        let rt = runtime(cfg, &host);

        let err = rt.run().await.unwrap_err();
        let expected = RestartReason::MemoryExhausted {
            restarts: 3,
            free_heap: 12 * 1024,
        };
        assert_eq!(err.restart_reason(), Some(&expected));
        assert_eq!(host.restart_requests(), vec![expected]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_expiry_restarts_device() {
        let host = Arc::new(SimHost::new());
        let mut cfg = quiet_config();
        // The supervisor only checks in every 10s.
        cfg.supervisor_period = Duration::from_secs(10);
        cfg.watchdog_timeout = Duration::from_secs(5);
        let rt = runtime(cfg, &host);
        let mut rx = rt.bus().subscribe();

        let err = rt.run().await.unwrap_err();
        assert_eq!(
            err.restart_reason(),
            Some(&RestartReason::WatchdogExpired {
                task: TaskKind::Supervisor
            })
        );
        let expired: Vec<Option<TaskKind>> = drain(&mut rx)
            .iter()
            .filter(|e| e.kind == EventKind::WatchdogExpired)
            .map(|e| e.task)
            .collect();
        assert_eq!(expired, vec![Some(TaskKind::Supervisor)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_crash_restarts_device() {
        let sim = Arc::new(SimHost::new());
        let mut host = FaultyHost::new(&sim);
        host.crash_supervisor_after = Some(Duration::from_secs(2));
        let rt = faulty_runtime(quiet_config(), host);
        let mut rx = rt.bus().subscribe();

        let err = rt.run().await.unwrap_err();
        assert_eq!(err.restart_reason(), Some(&RestartReason::SupervisorExited));
        assert_eq!(sim.restart_requests(), vec![RestartReason::SupervisorExited]);

        let events = drain(&mut rx);
        let exited = events
            .iter()
            .find(|e| e.kind == EventKind::TaskExited && e.task == Some(TaskKind::Supervisor))
            .expect("supervisor exit reported");
        assert_eq!(exited.reason.as_deref(), Some("task_fatal: fatal error: crashed"));
        let restarts = events
            .iter()
            .filter(|e| e.kind == EventKind::DeviceRestart)
            .count();
        assert_eq!(restarts, 1);
    }

    #[tokio::test]
    async fn test_supervisor_exit_keeps_earlier_restart_reason() {
        let (ctx, host) = context(Config::default());
        let earlier = RestartReason::MemoryExhausted {
            restarts: 3,
            free_heap: 12 * 1024,
        };
        ctx.restart_device(earlier.clone());

        assert_eq!(supervisor_exit_reason(&ctx), earlier);
        assert_eq!(host.restart_requests(), vec![earlier]);
    }

    #[tokio::test]
    async fn test_supervisor_exit_without_earlier_request() {
        let (ctx, host) = context(Config::default());
        assert_eq!(supervisor_exit_reason(&ctx), RestartReason::SupervisorExited);
        assert_eq!(host.restart_requests(), vec![RestartReason::SupervisorExited]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_task_exceeds_grace() {
        let sim = Arc::new(SimHost::new());
        let mut host = FaultyHost::new(&sim);
        host.hang_logger = true;
        let mut cfg = quiet_config();
        cfg.grace = Duration::from_secs(1);
        let rt = Arc::new(faulty_runtime(cfg, host));
        let mut rx = rt.bus().subscribe();
        let token = rt.shutdown_token();

        let run = tokio::spawn({
            let rt = Arc::clone(&rt);
            async move { rt.run().await }
        });
        tokio::time::sleep(Duration::from_secs(2)).await;
        token.cancel();

        match run.await.unwrap() {
            Err(RuntimeError::GraceExceeded { grace, stuck }) => {
                assert_eq!(grace, Duration::from_secs(1));
                assert_eq!(stuck, vec!["logger".to_string()]);
            }
            other => panic!("expected grace overrun, got {other:?}"),
        }
        assert!(sim.restart_requests().is_empty());

        let events = drain(&mut rx);
        let overrun = events
            .iter()
            .find(|e| e.kind == EventKind::GraceExceeded)
            .expect("overrun reported");
        assert_eq!(overrun.reason.as_deref(), Some("logger"));
        assert_eq!(overrun.timeout_ms, Some(1000));
        assert!(!events.iter().any(|e| e.kind == EventKind::AllStoppedWithin));
    }
}
