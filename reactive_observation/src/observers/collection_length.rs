use super::PropertyObserver;
use crate::{
    change_set::{AnyFlushable, ChangeSet, Flushable, ToAnyFlushable},
    collections::{AnyCollectionObserver, CollectionKind, CollectionMutation},
    flags::LifecycleFlags,
    subscribers::{AnySubscriber, Subscriber, SubscriberCollection},
    value::Value,
};
use core::fmt::Debug;
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

struct LengthState {
    current: usize,
    old: usize,
    subscribers: SubscriberCollection<AnySubscriber>,
}

struct LengthInner {
    this: Weak<LengthInner>,
    collection: AnyCollectionObserver,
    change_set: ChangeSet,
    state: RwLock<LengthState>,
}

/// Exposes the `length` of an array, or the `size` of a set or map, as an
/// observable scalar.
///
/// The observer subscribes to its collection observer while it has subscribers
/// of its own. Every mutation that changes the length queues it in the change
/// set, and the flush reports the new length once.
///
/// The observer only refers to its collection weakly. Once the last handle to
/// the collection is dropped, it reads as empty.
#[derive(Clone)]
pub struct CollectionLengthObserver(Arc<LengthInner>);

/// A non-owning reference to a [`CollectionLengthObserver`], held by its
/// collection observer.
#[derive(Clone)]
pub(crate) struct WeakLengthObserver(Weak<LengthInner>);

impl WeakLengthObserver {
    pub(crate) fn upgrade(&self) -> Option<CollectionLengthObserver> {
        self.0.upgrade().map(CollectionLengthObserver)
    }
}

impl Debug for CollectionLengthObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.0.state.read().or_poisoned();
        f.debug_struct("CollectionLengthObserver")
            .field("kind", &self.0.collection.kind())
            .field("current", &state.current)
            .field("old", &state.old)
            .finish_non_exhaustive()
    }
}

impl CollectionLengthObserver {
    pub(crate) fn new(
        collection: AnyCollectionObserver,
        change_set: ChangeSet,
    ) -> Self {
        let len = collection.collection_len();
        Self(Arc::new_cyclic(|this| LengthInner {
            this: this.clone(),
            collection,
            change_set,
            state: RwLock::new(LengthState {
                current: len,
                old: len,
                subscribers: SubscriberCollection::new(),
            }),
        }))
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub(crate) fn downgrade(&self) -> WeakLengthObserver {
        WeakLengthObserver(Arc::downgrade(&self.0))
    }

    /// The collection observer this length belongs to.
    pub fn collection_observer(&self) -> &AnyCollectionObserver {
        &self.0.collection
    }
}

impl LengthInner {
    fn as_subscriber(&self) -> AnySubscriber {
        AnySubscriber::from_weak(&self.this)
    }

    fn flush_changes(&self) {
        let (value, old, subscribers) = {
            let mut state = self.state.write().or_poisoned();
            if state.current == state.old {
                return;
            }
            let old = state.old;
            state.old = state.current;
            (state.current, old, state.subscribers.snapshot())
        };
        let (value, old) = (Value::from(value), Value::from(old));
        for subscriber in subscribers {
            subscriber.handle_change(&value, &old, LifecycleFlags::empty());
        }
    }
}

impl Subscriber for LengthInner {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) {}

    fn handle_collection_change(
        &self,
        _mutation: &CollectionMutation,
        _flags: LifecycleFlags,
    ) {
        let len = self.collection.collection_len();
        let changed = {
            let mut state = self.state.write().or_poisoned();
            state.current = len;
            state.current != state.old
        };
        if changed {
            if let Some(this) = self.this.upgrade() {
                _ = self.change_set.add(&CollectionLengthObserver(this));
            }
        }
    }
}

impl Flushable for CollectionLengthObserver {
    fn flush_changes(&self) {
        self.0.flush_changes();
    }
}

impl ToAnyFlushable for CollectionLengthObserver {
    fn to_any_flushable(&self) -> AnyFlushable {
        AnyFlushable::new(self.id(), self.clone())
    }
}

impl PropertyObserver for CollectionLengthObserver {
    fn get_value(&self) -> Value {
        Value::from(self.0.collection.collection_len())
    }

    /// Resizes an array, truncating it or padding it with [`Value::Null`].
    ///
    /// The size of a set or map cannot be written; such writes are ignored.
    fn set_value(&self, value: Value, _flags: LifecycleFlags) {
        let len = value
            .as_number()
            .filter(|n| n.is_finite() && *n >= 0.0 && n.fract() == 0.0);
        match (self.0.collection.kind(), len) {
            (CollectionKind::Array, Some(len)) => {
                self.0.collection.set_collection_len(len as usize);
            }
            (CollectionKind::Array, None) => crate::log_warning(format_args!(
                "Ignoring write of {value} to array length: not a valid \
                 length."
            )),
            (kind, _) => crate::log_warning(format_args!(
                "Ignoring write to the size of a {kind:?}: it is read-only."
            )),
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
            let len = self.0.collection.collection_len();
            {
                let mut state = self.0.state.write().or_poisoned();
                state.current = len;
                state.old = len;
            }
            self.0.collection.subscribe(self.0.as_subscriber());
        }
    }

    fn unsubscribe(&self, subscriber: &AnySubscriber) {
        let last = {
            let mut state = self.0.state.write().or_poisoned();
            state.subscribers.remove_subscriber(subscriber)
                && !state.subscribers.has_subscribers()
        };
        if last {
            self.0.collection.unsubscribe(&self.0.as_subscriber());
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
        self.0.collection.unsubscribe(&self.0.as_subscriber());
    }
}
