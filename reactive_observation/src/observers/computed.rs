use super::{AnyObserver, PropertyObserver};
use crate::{
    binding::{untrack, with_connectable, Connectable, DependencyTracker},
    change_set::{AnyFlushable, ChangeSet, Flushable, ToAnyFlushable},
    collections::Collection,
    error::ObservationError,
    flags::LifecycleFlags,
    locator::ObserverLocator,
    subscribers::{AnySubscriber, Subscriber, SubscriberCollection},
    value::{Accessor, Object, Value, WeakObject},
};
use core::fmt::Debug;
use or_poisoned::OrPoisoned;
use std::{
    mem,
    sync::{Arc, Mutex, RwLock, Weak},
};

struct ComputedState {
    current: Value,
    old: Value,
    subscribers: SubscriberCollection<AnySubscriber>,
}

struct ComputedInner {
    this: Weak<ComputedInner>,
    object: WeakObject,
    key: Arc<str>,
    accessor: Accessor,
    change_set: ChangeSet,
    tracker: Mutex<DependencyTracker>,
    state: RwLock<ComputedState>,
}

/// Observes an accessor by recording every property and collection its getter
/// reads.
///
/// When the observer gets its first subscriber, it evaluates the getter inside
/// its own connect scope and subscribes to everything the getter read. When any
/// of those dependencies changes, the observer queues itself in the change set;
/// its flush re-evaluates the getter and notifies subscribers if the result
/// changed.
///
/// Dependencies are collected once for ordinary accessors.
/// [Volatile](Accessor::volatile) accessors collect them again on every
/// evaluation, dropping the ones no longer read. When the last subscriber
/// leaves, all dependencies are released.
#[derive(Clone)]
pub struct ComputedObserver(Arc<ComputedInner>);

impl Debug for ComputedObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.0.state.read().or_poisoned();
        f.debug_struct("ComputedObserver")
            .field("key", &self.0.key)
            .field("current", &state.current)
            .field("old", &state.old)
            .finish_non_exhaustive()
    }
}

impl ComputedObserver {
    /// Creates an observer for the accessor `object[key]`.
    pub fn new(
        object: &Object,
        key: &str,
        accessor: Accessor,
        locator: ObserverLocator,
    ) -> Self {
        let change_set = locator.change_set().clone();
        Self(Arc::new_cyclic(|this: &Weak<ComputedInner>| ComputedInner {
            this: this.clone(),
            object: object.downgrade(),
            key: key.into(),
            accessor,
            change_set,
            tracker: Mutex::new(DependencyTracker::new(
                AnySubscriber::from_weak(this),
                locator,
            )),
            state: RwLock::new(ComputedState {
                current: Value::Null,
                old: Value::Null,
                subscribers: SubscriberCollection::new(),
            }),
        }))
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// The number of observers the getter currently depends on.
    pub fn dependency_count(&self) -> usize {
        self.0.tracker.lock().or_poisoned().observer_count()
    }

    /// Subscribes, failing if this is the first subscriber and the getter read
    /// a property that cannot be observed.
    ///
    /// The subscriber stays subscribed either way; the dependencies that could
    /// be observed are kept. [`PropertyObserver::subscribe`] logs the same
    /// failure instead of returning it.
    pub fn try_subscribe(
        &self,
        subscriber: AnySubscriber,
    ) -> Result<(), ObservationError> {
        let first = {
            let mut state = self.0.state.write().or_poisoned();
            let first = !state.subscribers.has_subscribers();
            state.subscribers.add_subscriber(subscriber);
            first
        };
        if first {
            let value = self.0.evaluate(true);
            {
                let mut state = self.0.state.write().or_poisoned();
                state.current = value.clone();
                state.old = value;
            }
            if let Some(e) = self.0.tracker.lock().or_poisoned().take_error() {
                return Err(e);
            }
        }
        Ok(())
    }
}

impl ComputedInner {
    /// Runs the getter. With `collect`, the reads are recorded as dependencies
    /// and stale ones are dropped; otherwise the getter runs untracked.
    fn evaluate(&self, collect: bool) -> Value {
        let Some(object) = self.object.upgrade() else {
            return Value::Null;
        };
        let getter = Arc::clone(&self.accessor.get);
        match self.this.upgrade() {
            Some(this) if collect => {
                self.tracker.lock().or_poisoned().next_version();
                let value = with_connectable(this, || getter(&object));
                self.tracker.lock().or_poisoned().unobserve(false);
                value
            }
            _ => untrack(|| getter(&object)),
        }
    }

    fn is_observed(&self) -> bool {
        self.state.read().or_poisoned().subscribers.has_subscribers()
    }
}

impl Connectable for ComputedInner {
    fn observe_property(&self, object: &Object, key: &str) {
        // kept by the tracker until the evaluation returns
        _ = self.tracker.lock().or_poisoned().observe_property(object, key);
    }

    fn observe_collection(&self, collection: &Collection) {
        self.tracker
            .lock()
            .or_poisoned()
            .observe_collection(collection);
    }
}

impl Subscriber for ComputedInner {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) {
        if let Some(this) = self.this.upgrade() {
            _ = self.change_set.add(&ComputedObserver(this));
        }
    }

    fn handle_collection_change(
        &self,
        _: &crate::collections::CollectionMutation,
        _: LifecycleFlags,
    ) {
        if let Some(this) = self.this.upgrade() {
            _ = self.change_set.add(&ComputedObserver(this));
        }
    }
}

impl Flushable for ComputedObserver {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "trace",
            skip_all,
            fields(key = %self.0.key)
        )
    )]
    fn flush_changes(&self) {
        if !self.0.is_observed() {
            return;
        }
        let value = self.0.evaluate(self.0.accessor.volatile);
        if let Some(e) = self.0.tracker.lock().or_poisoned().take_error() {
            crate::log_warning(format_args!("{e}"));
        }
        let (old, subscribers) = {
            let mut state = self.0.state.write().or_poisoned();
            state.current = value.clone();
            if state.old == value {
                return;
            }
            let old = mem::replace(&mut state.old, value.clone());
            (old, state.subscribers.snapshot())
        };
        for subscriber in subscribers {
            subscriber.handle_change(&value, &old, LifecycleFlags::empty());
        }
    }
}

impl ToAnyFlushable for ComputedObserver {
    fn to_any_flushable(&self) -> AnyFlushable {
        AnyFlushable::new(self.id(), self.clone())
    }
}

impl PropertyObserver for ComputedObserver {
    /// While observed, the value computed at the last flush; otherwise, a fresh
    /// evaluation.
    fn get_value(&self) -> Value {
        if self.0.is_observed() {
            self.0.state.read().or_poisoned().current.clone()
        } else {
            self.0.evaluate(false)
        }
    }

    /// Calls the accessor's setter. Accessors without a setter are read-only.
    fn set_value(&self, value: Value, _flags: LifecycleFlags) {
        let Some(object) = self.0.object.upgrade() else {
            return;
        };
        match &self.0.accessor.set {
            Some(setter) => {
                let setter = Arc::clone(setter);
                untrack(|| setter(&object, value));
            }
            None => crate::log_warning(format_args!(
                "Property `{}` is computed and has no setter; ignoring the \
                 write.",
                self.0.key
            )),
        }
    }

    fn subscribe(&self, subscriber: AnySubscriber) {
        if let Err(e) = self.try_subscribe(subscriber) {
            crate::log_warning(format_args!("{e}"));
        }
    }

    fn unsubscribe(&self, subscriber: &AnySubscriber) {
        let last = {
            let mut state = self.0.state.write().or_poisoned();
            state.subscribers.remove_subscriber(subscriber)
                && !state.subscribers.has_subscribers()
        };
        if last {
            self.0.tracker.lock().or_poisoned().unobserve(true);
        }
    }

    fn has_subscriber(&self, subscriber: &AnySubscriber) -> bool {
        self.0
            .state
            .read()
            .or_poisoned()
            .subscribers
            .has_subscriber(subscriber)
    }

    fn has_subscribers(&self) -> bool {
        self.0.is_observed()
    }

    fn dispose(&self) {
        self.0.state.write().or_poisoned().subscribers.clear();
        self.0.tracker.lock().or_poisoned().unobserve(true);
        if let Some(object) = self.0.object.upgrade() {
            object.forget_observer(
                &self.0.key,
                &AnyObserver::Computed(self.clone()),
            );
        }
    }
}
