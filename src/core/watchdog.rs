//! # Task watchdog.
//!
//! Registered tasks must check in (feed) within the configured timeout. A monitor loop,
//! started at boot, polls the table; an expired task either requests a device restart
//! (`trigger_panic = true`) or is reported and re-armed.
//!
//! ## Lifecycle
//! ```text
//! deinit() ─► init(timeout, trigger_panic)
//!                  │
//!   task start ─► add(kind) ─► WatchdogGuard ─► feed() each iteration
//!                                   │
//!   task exit / destroy ─► drop(guard) ─► delete(kind)
//!
//! monitor(): every timeout/4
//!   └─ expired() non-empty ─► publish WatchdogExpired
//!                          ├─ trigger_panic ─► Context::restart_device(WatchdogExpired)
//!                          └─ otherwise     ─► re-arm and keep going
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::{Context, RestartReason};
use crate::events::{Event, EventKind};
use crate::tasks::TaskKind;

const MIN_POLL: Duration = Duration::from_millis(10);

/// Watchdog misuse.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogError {
    /// `add`/`reset` before `init`.
    #[error("watchdog not initialized")]
    NotInitialized,
    /// `init` while active.
    #[error("watchdog already initialized")]
    AlreadyInitialized,
    /// The task already holds a subscription.
    #[error("task {0} already registered")]
    AlreadyRegistered(TaskKind),
    /// The task holds no subscription.
    #[error("task {0} not registered")]
    NotRegistered(TaskKind),
}

/// Active watchdog settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchdogSettings {
    /// Maximum time between check-ins.
    pub timeout: Duration,
    /// Restart the device on expiry instead of only reporting it.
    pub trigger_panic: bool,
}

#[derive(Debug, Default)]
struct State {
    settings: Option<WatchdogSettings>,
    checkins: HashMap<TaskKind, Instant>,
}

/// Check-in table for registered tasks.
#[derive(Debug, Default)]
pub struct Watchdog {
    state: Mutex<State>,
}

impl Watchdog {
    /// Creates an uninitialized watchdog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates the watchdog.
    pub fn init(&self, timeout: Duration, trigger_panic: bool) -> Result<(), WatchdogError> {
        let mut st = self.lock();
        if st.settings.is_some() {
            return Err(WatchdogError::AlreadyInitialized);
        }
        st.settings = Some(WatchdogSettings {
            timeout,
            trigger_panic,
        });
        Ok(())
    }

    /// Deactivates the watchdog and drops every subscription. Idempotent.
    pub fn deinit(&self) {
        let mut st = self.lock();
        st.settings = None;
        st.checkins.clear();
    }

    /// Current settings, if initialized.
    pub fn settings(&self) -> Option<WatchdogSettings> {
        self.lock().settings
    }

    /// Subscribes `task`; the returned guard unsubscribes on drop.
    pub fn add(&self, task: TaskKind) -> Result<WatchdogGuard<'_>, WatchdogError> {
        let mut st = self.lock();
        if st.settings.is_none() {
            return Err(WatchdogError::NotInitialized);
        }
        if st.checkins.contains_key(&task) {
            return Err(WatchdogError::AlreadyRegistered(task));
        }
        st.checkins.insert(task, Instant::now());
        Ok(WatchdogGuard { wd: self, task })
    }

    /// Records a check-in for `task`.
    pub fn reset(&self, task: TaskKind) -> Result<(), WatchdogError> {
        let mut st = self.lock();
        if st.settings.is_none() {
            return Err(WatchdogError::NotInitialized);
        }
        match st.checkins.get_mut(&task) {
            Some(at) => {
                *at = Instant::now();
                Ok(())
            }
            None => Err(WatchdogError::NotRegistered(task)),
        }
    }

    /// Unsubscribes `task`.
    pub fn delete(&self, task: TaskKind) -> Result<(), WatchdogError> {
        match self.lock().checkins.remove(&task) {
            Some(_) => Ok(()),
            None => Err(WatchdogError::NotRegistered(task)),
        }
    }

    /// True if `task` holds a subscription.
    pub fn is_registered(&self, task: TaskKind) -> bool {
        self.lock().checkins.contains_key(&task)
    }

    /// Registered tasks whose last check-in is older than the timeout, in priority order.
    pub fn expired(&self) -> Vec<TaskKind> {
        let st = self.lock();
        let Some(settings) = st.settings else {
            return Vec::new();
        };
        let mut late: Vec<TaskKind> = st
            .checkins
            .iter()
            .filter(|(_, at)| at.elapsed() > settings.timeout)
            .map(|(task, _)| *task)
            .collect();
        late.sort_unstable_by_key(|k| k.index());
        late
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Live watchdog subscription of one task.
#[derive(Debug)]
pub struct WatchdogGuard<'a> {
    wd: &'a Watchdog,
    task: TaskKind,
}

impl WatchdogGuard<'_> {
    /// Checks in.
    pub fn feed(&self) -> Result<(), WatchdogError> {
        self.wd.reset(self.task)
    }
}

impl Drop for WatchdogGuard<'_> {
    fn drop(&mut self) {
        // Already gone after deinit(); nothing left to release then.
        let _ = self.wd.delete(self.task);
    }
}

/// Polls the watchdog until cancelled or until it requests a device restart.
pub(crate) async fn monitor(ctx: Arc<Context>, token: CancellationToken) {
    let Some(settings) = ctx.watchdog.settings() else {
        return;
    };
    let poll = (settings.timeout / 4).max(MIN_POLL);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(poll) => {}
        }

        let late = ctx.watchdog.expired();
        let Some(&first) = late.first() else {
            continue;
        };
        for &task in &late {
            ctx.bus.publish(
                Event::new(EventKind::WatchdogExpired)
                    .with_task(task)
                    .with_timeout(settings.timeout),
            );
        }
        if settings.trigger_panic {
            ctx.restart_device(RestartReason::WatchdogExpired { task: first });
            return;
        }
        for task in late {
            let _ = ctx.watchdog.reset(task);
        }
    }
}
