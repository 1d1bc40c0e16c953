use super::{AnyObserver, PropertyObserver};
use crate::{
    change_set::{AnyFlushable, Flushable, ToAnyFlushable},
    dirty_checker::DirtyChecker,
    flags::LifecycleFlags,
    subscribers::{AnySubscriber, Subscriber, SubscriberCollection},
    value::{Object, Value, WeakObject},
};
use core::fmt::Debug;
use or_poisoned::OrPoisoned;
use std::{
    mem,
    sync::{Arc, RwLock},
};

struct DirtyState {
    old: Value,
    subscribers: SubscriberCollection<AnySubscriber>,
}

struct DirtyInner {
    object: WeakObject,
    key: Arc<str>,
    checker: DirtyChecker,
    state: RwLock<DirtyState>,
}

/// Observes an accessor that cannot be intercepted, by polling it.
///
/// While it has subscribers, the property is tracked by the [`DirtyChecker`],
/// which compares the live value with the one seen at the previous check and
/// flushes the property when they differ.
#[derive(Clone)]
pub struct DirtyCheckProperty(Arc<DirtyInner>);

impl Debug for DirtyCheckProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirtyCheckProperty")
            .field("key", &self.0.key)
            .field("old", &self.0.state.read().or_poisoned().old)
            .finish_non_exhaustive()
    }
}

impl PartialEq for DirtyCheckProperty {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for DirtyCheckProperty {}

impl DirtyCheckProperty {
    /// Creates an observer for `object[key]` that is polled by `checker`.
    pub fn new(object: &Object, key: &str, checker: DirtyChecker) -> Self {
        Self(Arc::new(DirtyInner {
            object: object.downgrade(),
            key: key.into(),
            checker,
            state: RwLock::new(DirtyState {
                old: object.read_raw(key),
                subscribers: SubscriberCollection::new(),
            }),
        }))
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    fn read(&self) -> Value {
        self.0
            .object
            .upgrade()
            .map(|object| object.read_raw(&self.0.key))
            .unwrap_or_default()
    }

    /// Whether the live value differs from the value seen at the previous
    /// check.
    pub fn is_dirty(&self) -> bool {
        let value = self.read();
        self.0.state.read().or_poisoned().old != value
    }
}

impl Flushable for DirtyCheckProperty {
    fn flush_changes(&self) {
        let value = self.read();
        let (old, subscribers) = {
            let mut state = self.0.state.write().or_poisoned();
            if state.old == value {
                return;
            }
            let old = mem::replace(&mut state.old, value.clone());
            (old, state.subscribers.snapshot())
        };
        for subscriber in subscribers {
            subscriber.handle_change(
                &value,
                &old,
                LifecycleFlags::FROM_DIRTY_CHECK,
            );
        }
    }
}

impl ToAnyFlushable for DirtyCheckProperty {
    fn to_any_flushable(&self) -> AnyFlushable {
        AnyFlushable::new(self.id(), self.clone())
    }
}

impl PropertyObserver for DirtyCheckProperty {
    fn get_value(&self) -> Value {
        self.read()
    }

    /// Writes through the accessor's setter. The change is picked up by the
    /// next check.
    fn set_value(&self, value: Value, _flags: LifecycleFlags) {
        if let Some(object) = self.0.object.upgrade() {
            object.write_raw(&self.0.key, value);
        }
    }

    fn subscribe(&self, subscriber: AnySubscriber) {
        let first = {
            let mut state = self.0.state.write().or_poisoned();
            let first = !state.subscribers.has_subscribers();
            state.subscribers.add_subscriber(subscriber);
            first
        };
        if first {
            let value = self.read();
            self.0.state.write().or_poisoned().old = value;
            self.0.checker.add_property(self.clone());
        }
    }

    fn unsubscribe(&self, subscriber: &AnySubscriber) {
        let last = {
            let mut state = self.0.state.write().or_poisoned();
            state.subscribers.remove_subscriber(subscriber)
                && !state.subscribers.has_subscribers()
        };
        if last {
            self.0.checker.remove_property(self);
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
        self.0.state.read().or_poisoned().subscribers.has_subscribers()
    }

    fn dispose(&self) {
        self.0.state.write().or_poisoned().subscribers.clear();
        self.0.checker.remove_property(self);
        if let Some(object) = self.0.object.upgrade() {
            object.forget_observer(
                &self.0.key,
                &AnyObserver::DirtyCheck(self.clone()),
            );
        }
    }
}
