use super::{AnyObserver, PropertyObserver};
use crate::{
    change_set::{AnyFlushable, ChangeSet, Flushable, ToAnyFlushable},
    flags::LifecycleFlags,
    subscribers::{AnySubscriber, Subscriber, SubscriberCollection},
    value::{ChangeCallback, Object, Value, WeakObject},
};
use core::fmt::Debug;
use or_poisoned::OrPoisoned;
use std::{
    mem,
    sync::{Arc, RwLock},
};

struct CellState {
    current: Value,
    old: Value,
    flags: LifecycleFlags,
    subscribers: SubscriberCollection<AnySubscriber>,
}

/// The state shared by setter and callback observers.
///
/// `current` is the last written value; `old` is the value subscribers last
/// saw, and only changes when a flush completes.
pub(crate) struct PropertyCell {
    object: WeakObject,
    key: Arc<str>,
    callback: Option<ChangeCallback>,
    change_set: ChangeSet,
    state: RwLock<CellState>,
}

impl PropertyCell {
    pub(crate) fn new(
        object: &Object,
        key: &str,
        callback: Option<ChangeCallback>,
        change_set: ChangeSet,
    ) -> Arc<Self> {
        let value = object.read_raw(key);
        Arc::new(Self {
            object: object.downgrade(),
            key: key.into(),
            callback,
            change_set,
            state: RwLock::new(CellState {
                current: value.clone(),
                old: value,
                flags: LifecycleFlags::empty(),
                subscribers: SubscriberCollection::new(),
            }),
        })
    }

    pub(super) fn id(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }

    pub(super) fn get_value(&self) -> Value {
        self.state.read().or_poisoned().current.clone()
    }

    pub(super) fn set_value(
        &self,
        value: Value,
        flags: LifecycleFlags,
        this: &impl ToAnyFlushable,
    ) {
        {
            let mut state = self.state.write().or_poisoned();
            if state.current == value {
                return;
            }
            state.current = value;
            state.flags = flags;
        }
        if flags.contains(LifecycleFlags::FROM_FLUSH) {
            self.flush_changes();
        } else {
            _ = self.change_set.add(this);
        }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all, fields(key = %self.key))
    )]
    pub(super) fn flush_changes(&self) {
        let (mut value, old, flags) = {
            let mut state = self.state.write().or_poisoned();
            if state.current == state.old {
                return;
            }
            (
                state.current.clone(),
                state.old.clone(),
                mem::take(&mut state.flags),
            )
        };
        let initializing = flags.contains(LifecycleFlags::FROM_BIND);

        if !initializing {
            if let Some(callback) = &self.callback {
                if let Some(coerced) = callback(&value, &old, flags) {
                    value = coerced;
                }
            }
        }
        if let Some(object) = self.object.upgrade() {
            object.write_raw(&self.key, value.clone());
        }

        let subscribers = {
            let mut state = self.state.write().or_poisoned();
            state.current = value.clone();
            state.old = value.clone();
            state.subscribers.snapshot()
        };
        if !initializing {
            for subscriber in subscribers {
                subscriber.handle_change(&value, &old, flags);
            }
        }
    }

    pub(super) fn subscribe(&self, subscriber: AnySubscriber) {
        self.state
            .write()
            .or_poisoned()
            .subscribers
            .add_subscriber(subscriber);
    }

    pub(super) fn unsubscribe(&self, subscriber: &AnySubscriber) {
        self.state
            .write()
            .or_poisoned()
            .subscribers
            .remove_subscriber(subscriber);
    }

    pub(super) fn has_subscriber(&self, subscriber: &AnySubscriber) -> bool {
        self.state
            .read()
            .or_poisoned()
            .subscribers
            .has_subscriber(subscriber)
    }

    pub(super) fn has_subscribers(&self) -> bool {
        self.state.read().or_poisoned().subscribers.has_subscribers()
    }

    pub(super) fn dispose(&self, this: &AnyObserver) {
        self.state.write().or_poisoned().subscribers.clear();
        if let Some(object) = self.object.upgrade() {
            object.forget_observer(&self.key, this);
        }
    }
}

impl Debug for PropertyCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().or_poisoned();
        f.debug_struct("PropertyCell")
            .field("key", &self.key)
            .field("current", &state.current)
            .field("old", &state.old)
            .finish_non_exhaustive()
    }
}

macro_rules! property_cell_observer {
    ($name:ident => $variant:ident) => {
        impl $name {
            pub(crate) fn id(&self) -> usize {
                self.0.id()
            }
        }

        impl Debug for $name {
            fn fmt(
                &self,
                f: &mut std::fmt::Formatter<'_>,
            ) -> std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0).finish()
            }
        }

        impl Flushable for $name {
            fn flush_changes(&self) {
                self.0.flush_changes();
            }
        }

        impl ToAnyFlushable for $name {
            fn to_any_flushable(&self) -> AnyFlushable {
                AnyFlushable::new(self.id(), self.clone())
            }
        }

        impl PropertyObserver for $name {
            fn get_value(&self) -> Value {
                self.0.get_value()
            }

            fn set_value(&self, value: Value, flags: LifecycleFlags) {
                self.0.set_value(value, flags, self);
            }

            fn subscribe(&self, subscriber: AnySubscriber) {
                self.0.subscribe(subscriber);
            }

            fn unsubscribe(&self, subscriber: &AnySubscriber) {
                self.0.unsubscribe(subscriber);
            }

            fn has_subscriber(&self, subscriber: &AnySubscriber) -> bool {
                self.0.has_subscriber(subscriber)
            }

            fn has_subscribers(&self) -> bool {
                self.0.has_subscribers()
            }

            fn dispose(&self) {
                self.0.dispose(&AnyObserver::$variant(self.clone()));
            }
        }
    };
}

pub(crate) use property_cell_observer;

/// Observes a plain data property.
///
/// Writes update the observer's current value immediately, and are stored on
/// the object and reported to subscribers when the change set flushes. Several
/// writes before a flush result in a single store and notification, and none at
/// all if the final value equals the one subscribers last saw.
#[derive(Clone)]
pub struct SetterObserver(Arc<PropertyCell>);

impl SetterObserver {
    /// Creates an observer for `object[key]`, starting from its present value.
    pub fn new(object: &Object, key: &str, change_set: ChangeSet) -> Self {
        Self(PropertyCell::new(object, key, None, change_set))
    }
}

property_cell_observer!(SetterObserver => Setter);
