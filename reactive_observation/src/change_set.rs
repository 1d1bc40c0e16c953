//! The batching scheduler that every deferred notification goes through.
//!
//! Observers do not notify their subscribers when they are written. Instead
//! they add themselves to a [`ChangeSet`], which drains on the next tick (or
//! whenever the host asks it to), calling [`Flushable::flush_changes`] on each
//! queued item in the order it was added. Items that become dirty while the set
//! is draining are flushed in the same drain, before it completes.

use crate::{
    config::{ChangeSetConfig, FlushMode},
    error::ObservationError,
};
use core::{fmt::Debug, hash::Hash};
use futures::{
    channel::oneshot,
    future::{FutureExt, Shared},
};
use or_poisoned::OrPoisoned;
use pin_project_lite::pin_project;
use rustc_hash::FxHashSet;
use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

/// Anything that can be queued in a [`ChangeSet`].
pub trait Flushable: Send + Sync {
    /// Performs the deferred write and notification.
    fn flush_changes(&self);
}

/// Converts a [`Flushable`] to a type-erased [`AnyFlushable`].
pub trait ToAnyFlushable {
    /// Converts this type to its type-erased equivalent.
    fn to_any_flushable(&self) -> AnyFlushable;
}

/// A type-erased, owning reference to a [`Flushable`].
///
/// Two references are equal if they refer to the same underlying trackable,
/// which is how the change set deduplicates its members.
#[derive(Clone)]
pub struct AnyFlushable(pub(crate) usize, pub(crate) Arc<dyn Flushable>);

impl AnyFlushable {
    /// Wraps a flushable, identified by `id`.
    ///
    /// Handles that share state should pass the address of that shared state,
    /// so that every clone of the handle is treated as the same trackable.
    pub fn new(id: usize, flushable: impl Flushable + 'static) -> Self {
        Self(id, Arc::new(flushable))
    }
}

impl<T: Flushable + 'static> ToAnyFlushable for Arc<T> {
    fn to_any_flushable(&self) -> AnyFlushable {
        AnyFlushable(
            Arc::as_ptr(self) as *const () as usize,
            Arc::clone(self) as Arc<dyn Flushable>,
        )
    }
}

impl ToAnyFlushable for AnyFlushable {
    fn to_any_flushable(&self) -> AnyFlushable {
        self.clone()
    }
}

impl Flushable for AnyFlushable {
    fn flush_changes(&self) {
        self.1.flush_changes();
    }
}

impl Debug for AnyFlushable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyFlushable").field(&self.0).finish()
    }
}

impl Hash for AnyFlushable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialEq for AnyFlushable {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for AnyFlushable {}

type Settled = Shared<oneshot::Receiver<()>>;

#[derive(Default)]
struct ChangeSetInner {
    queue: VecDeque<AnyFlushable>,
    members: FxHashSet<usize>,
    scheduled: bool,
    flushing: bool,
    settled: Option<(oneshot::Sender<()>, Settled)>,
}

impl ChangeSetInner {
    fn settled(&mut self) -> Settled {
        self.settled
            .get_or_insert_with(|| {
                let (tx, rx) = oneshot::channel();
                (tx, rx.shared())
            })
            .1
            .clone()
    }
}

/// A deduplicated queue of dirty trackables.
///
/// Cloning a `ChangeSet` gives another handle to the same queue.
#[derive(Clone)]
pub struct ChangeSet {
    inner: Arc<Mutex<ChangeSetInner>>,
    config: ChangeSetConfig,
}

impl Debug for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSet")
            .field("pending", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for ChangeSet {
    fn default() -> Self {
        Self::new(ChangeSetConfig::default())
    }
}

impl PartialEq for ChangeSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl ChangeSet {
    /// Creates an empty change set.
    pub fn new(config: ChangeSetConfig) -> Self {
        Self {
            inner: Default::default(),
            config,
        }
    }

    /// The configuration this change set was created with.
    pub fn config(&self) -> &ChangeSetConfig {
        &self.config
    }

    /// Queues a trackable to be flushed.
    ///
    /// Adding a trackable that is already queued has no effect. If no flush is
    /// pending or running (which is the case whenever the set was empty), one
    /// is scheduled according to the [`FlushMode`]. The returned future
    /// resolves once the drain that flushes this trackable has completed.
    pub fn add(&self, item: &impl ToAnyFlushable) -> Flushed {
        let item = item.to_any_flushable();
        let mut inner = self.inner.lock().or_poisoned();
        if inner.members.insert(item.0) {
            inner.queue.push_back(item);
        }
        let settled = inner.settled();
        // a set with no flush scheduled is either empty, or was left behind by
        // a drain that failed
        let schedule = !inner.flushing && !inner.scheduled;
        if schedule {
            inner.scheduled = true;
        }
        drop(inner);

        if schedule && self.config.flush_mode == FlushMode::Microtask {
            let this = self.clone();
            any_spawner::Executor::spawn_local(async move {
                if let Err(e) = this.flush_changes() {
                    crate::log_warning(format_args!("{e}"));
                }
            });
        }

        Flushed { inner: settled }
    }

    /// Whether this trackable is currently queued.
    pub fn contains(&self, item: &impl ToAnyFlushable) -> bool {
        let id = item.to_any_flushable().0;
        self.inner.lock().or_poisoned().members.contains(&id)
    }

    /// The number of queued trackables.
    pub fn len(&self) -> usize {
        self.inner.lock().or_poisoned().queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains the set.
    ///
    /// Each pass flushes the trackables that were queued when the pass began,
    /// in the order they were added; anything added meanwhile is flushed in a
    /// later pass of the same drain. The drain ends when a pass leaves the set
    /// empty, or fails once
    /// [`max_flush_passes`](ChangeSetConfig::max_flush_passes) passes have run,
    /// leaving the remaining trackables queued.
    ///
    /// Calling this from inside a flush is a no-op: the outer drain picks up
    /// the new work.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn flush_changes(&self) -> Result<(), ObservationError> {
        {
            let mut inner = self.inner.lock().or_poisoned();
            if inner.flushing {
                return Ok(());
            }
            inner.flushing = true;
            inner.scheduled = false;
        }
        let _guard = DrainGuard(&self.inner);

        let mut passes = 0;
        loop {
            let pass_len = self.len();
            if pass_len == 0 {
                break;
            }
            if passes == self.config.max_flush_passes {
                return Err(ObservationError::FlushLimitExceeded {
                    passes,
                    pending: pass_len,
                });
            }
            passes += 1;

            #[cfg(feature = "tracing")]
            tracing::trace!(pass = passes, items = pass_len, "flushing");

            for _ in 0..pass_len {
                let next = {
                    let mut inner = self.inner.lock().or_poisoned();
                    let next = inner.queue.pop_front();
                    if let Some(item) = &next {
                        inner.members.remove(&item.0);
                    }
                    next
                };
                match next {
                    Some(item) => item.flush_changes(),
                    None => break,
                }
            }
        }

        let settled = self.inner.lock().or_poisoned().settled.take();
        if let Some((tx, _)) = settled {
            _ = tx.send(());
        }
        Ok(())
    }
}

/// Ends a drain even if a trackable panics, so the next `add` schedules a new
/// flush.
struct DrainGuard<'a>(&'a Mutex<ChangeSetInner>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.lock().or_poisoned();
        inner.flushing = false;
        inner.scheduled = false;
    }
}

pin_project! {
    /// Resolves after the drain that flushes a given trackable has completed.
    ///
    /// In [`FlushMode::Manual`], this only resolves once the host calls
    /// [`ChangeSet::flush_changes`].
    #[must_use = "futures do nothing unless polled; drop this if you do not \
                  need to wait for the flush"]
    pub struct Flushed {
        #[pin]
        inner: Settled,
    }
}

impl Future for Flushed {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // a dropped sender means the change set itself is gone; nothing left to
        // wait for
        self.project().inner.poll(cx).map(|_| ())
    }
}
