//! Polling for properties that cannot be intercepted.
//!
//! A [`DirtyCheckProperty`] registers with the [`DirtyChecker`] while it has
//! subscribers. The checker keeps a single timer: on each tick it compares
//! every tracked property with the value it had at the previous tick and
//! flushes the ones that changed. The timer is only re-armed while something is
//! tracked, so an idle checker costs nothing.
//!
//! Timers are pluggable through the [`Timer`] trait. [`ManualTimer`] queues
//! ticks for the host to run, and [`TokioTimer`] (with the `tokio` feature)
//! sleeps on the tokio runtime.

use crate::{
    change_set::Flushable, config::DirtyCheckSettings,
    observers::DirtyCheckProperty,
};
use core::fmt::Debug;
use or_poisoned::OrPoisoned;
use std::{
    mem,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

/// A task scheduled to run once.
pub type TimerTask = Box<dyn FnOnce() + Send>;

/// Schedules a task to run after a delay.
pub trait Timer: Send + Sync {
    /// Runs `task` once, after `delay`.
    fn set_timeout(&self, delay: Duration, task: TimerTask);
}

#[derive(Default)]
struct ManualTimerInner {
    pending: Vec<(Duration, TimerTask)>,
    scheduled: usize,
}

/// A [`Timer`] that never fires by itself.
///
/// Scheduled tasks are queued until the host calls
/// [`run_pending`](ManualTimer::run_pending). It also counts every call to
/// `set_timeout`, which makes it useful for checking when a timer is armed.
#[derive(Clone, Default)]
pub struct ManualTimer(Arc<Mutex<ManualTimerInner>>);

impl ManualTimer {
    /// Creates a timer with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.0.lock().or_poisoned().pending.len()
    }

    /// The number of tasks ever scheduled.
    pub fn scheduled(&self) -> usize {
        self.0.lock().or_poisoned().scheduled
    }

    /// Runs every queued task, returning how many ran.
    ///
    /// Tasks scheduled while these run are queued for the next call.
    pub fn run_pending(&self) -> usize {
        let tasks = mem::take(&mut self.0.lock().or_poisoned().pending);
        let count = tasks.len();
        for (_, task) in tasks {
            task();
        }
        count
    }
}

impl Debug for ManualTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.0.lock().or_poisoned();
        f.debug_struct("ManualTimer")
            .field("pending", &inner.pending.len())
            .field("scheduled", &inner.scheduled)
            .finish()
    }
}

impl Timer for ManualTimer {
    fn set_timeout(&self, delay: Duration, task: TimerTask) {
        let mut inner = self.0.lock().or_poisoned();
        inner.scheduled += 1;
        inner.pending.push((delay, task));
    }
}

/// A [`Timer`] that sleeps on the tokio runtime, in a task spawned through
/// [`any_spawner::Executor`].
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[cfg(feature = "tokio")]
impl Timer for TokioTimer {
    fn set_timeout(&self, delay: Duration, task: TimerTask) {
        any_spawner::Executor::spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

#[derive(Default)]
struct CheckerState {
    tracked: Vec<DirtyCheckProperty>,
    armed: bool,
}

struct CheckerInner {
    state: Mutex<CheckerState>,
    settings: DirtyCheckSettings,
    timer: Arc<dyn Timer>,
}

/// Polls the properties that can only be observed by dirty checking.
///
/// Cloning gives another handle to the same checker.
#[derive(Clone)]
pub struct DirtyChecker(Arc<CheckerInner>);

impl Debug for DirtyChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.0.state.lock().or_poisoned();
        f.debug_struct("DirtyChecker")
            .field("tracked", &state.tracked.len())
            .field("armed", &state.armed)
            .field("settings", &self.0.settings)
            .finish_non_exhaustive()
    }
}

impl DirtyChecker {
    /// Creates a checker that schedules its ticks with `timer`.
    pub fn new(
        settings: DirtyCheckSettings,
        timer: impl Timer + 'static,
    ) -> Self {
        Self(Arc::new(CheckerInner {
            state: Default::default(),
            settings,
            timer: Arc::new(timer),
        }))
    }

    /// The settings this checker was created with.
    pub fn settings(&self) -> &DirtyCheckSettings {
        &self.0.settings
    }

    /// Starts polling a property. Adding a property twice has no effect.
    pub fn add_property(&self, property: DirtyCheckProperty) {
        {
            let mut state = self.0.state.lock().or_poisoned();
            if state.tracked.contains(&property) {
                return;
            }
            state.tracked.push(property);
        }
        self.arm();
    }

    /// Stops polling a property.
    ///
    /// A pending tick is not cancelled, but once it finds nothing to track it
    /// does not re-arm.
    pub fn remove_property(&self, property: &DirtyCheckProperty) {
        self.0
            .state
            .lock()
            .or_poisoned()
            .tracked
            .retain(|tracked| tracked != property);
    }

    /// The number of properties being polled.
    pub fn tracked_count(&self) -> usize {
        self.0.state.lock().or_poisoned().tracked.len()
    }

    /// Whether a tick is scheduled.
    pub fn is_armed(&self) -> bool {
        self.0.state.lock().or_poisoned().armed
    }

    fn arm(&self) {
        if self.0.settings.disabled {
            return;
        }
        {
            let mut state = self.0.state.lock().or_poisoned();
            if state.armed || state.tracked.is_empty() {
                return;
            }
            state.armed = true;
        }
        let checker = Arc::downgrade(&self.0);
        self.0.timer.set_timeout(
            self.0.settings.interval,
            Box::new(move || tick(&checker)),
        );
    }

    /// Compares every tracked property with the value it had at the previous
    /// check, and flushes the ones that changed. Then re-arms the timer if
    /// anything is still tracked.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn check(&self) {
        let tracked = {
            let mut state = self.0.state.lock().or_poisoned();
            state.armed = false;
            state.tracked.clone()
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(tracked = tracked.len(), "dirty checking");

        for property in tracked {
            if property.is_dirty() {
                property.flush_changes();
            }
        }
        self.arm();
    }
}

fn tick(checker: &Weak<CheckerInner>) {
    if let Some(inner) = checker.upgrade() {
        DirtyChecker(inner).check();
    }
}
