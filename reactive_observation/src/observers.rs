//! Per-property observers.
//!
//! Each observer mediates reads and writes of one `(object, key)` pair, tracks
//! the value last seen by its subscribers, and notifies them when it changes.
//! Which kind of observer a property gets depends on its shape, and is decided
//! by the [`ObserverLocator`](crate::locator::ObserverLocator):
//!
//! | Observer | Used for |
//! |---|---|
//! | [`SetterObserver`] | plain data properties |
//! | [`CallbackObserver`] | data properties with a `<key>Changed` callback |
//! | [`ComputedObserver`] | accessors that can be intercepted |
//! | [`DirtyCheckProperty`] | accessors that cannot be intercepted |
//! | [`PrimitiveObserver`] | properties of primitive values |
//! | [`CollectionLengthObserver`] | `length` of arrays, `size` of sets and maps |

mod callback;
mod collection_length;
mod computed;
mod dirty_check;
mod primitive;
mod setter;

pub use callback::*;
pub use collection_length::CollectionLengthObserver;
pub(crate) use collection_length::WeakLengthObserver;
pub use computed::*;
pub use dirty_check::*;
pub use primitive::*;
pub use setter::*;

use crate::{
    change_set::{AnyFlushable, Flushable, ToAnyFlushable},
    flags::LifecycleFlags,
    subscribers::AnySubscriber,
    value::Value,
};

/// The contract shared by every property observer.
///
/// Flushing comes from the [`Flushable`] supertrait: it performs the deferred
/// write and notifies subscribers if the value differs from the one they last
/// saw.
pub trait PropertyObserver: Flushable {
    /// The current value of the property.
    fn get_value(&self) -> Value;

    /// Writes the property.
    ///
    /// Unless `flags` contains [`FROM_FLUSH`](LifecycleFlags::FROM_FLUSH), the
    /// write is deferred to the next flush of the change set, and writes in
    /// between are coalesced.
    fn set_value(&self, value: Value, flags: LifecycleFlags);

    /// Adds a subscriber.
    fn subscribe(&self, subscriber: AnySubscriber);

    /// Removes a subscriber.
    fn unsubscribe(&self, subscriber: &AnySubscriber);

    /// Whether this subscriber is registered.
    fn has_subscriber(&self, subscriber: &AnySubscriber) -> bool;

    /// Whether any subscriber is registered.
    fn has_subscribers(&self) -> bool;

    /// Drops subscribers and cached references, so the observer can be
    /// released.
    ///
    /// The property keeps its value.
    fn dispose(&self);
}

/// Any property observer.
#[derive(Debug, Clone)]
pub enum AnyObserver {
    /// Observes a plain data property.
    Setter(SetterObserver),
    /// Observes a data property with a change callback.
    Callback(CallbackObserver),
    /// Observes an accessor by tracking what its getter reads.
    Computed(ComputedObserver),
    /// Observes an accessor by polling it.
    DirtyCheck(DirtyCheckProperty),
    /// Observes a property of a primitive value.
    Primitive(PrimitiveObserver),
    /// Observes the length of a collection.
    CollectionLength(CollectionLengthObserver),
}

macro_rules! dispatch {
    ($self:ident, $observer:ident => $body:expr) => {
        match $self {
            AnyObserver::Setter($observer) => $body,
            AnyObserver::Callback($observer) => $body,
            AnyObserver::Computed($observer) => $body,
            AnyObserver::DirtyCheck($observer) => $body,
            AnyObserver::Primitive($observer) => $body,
            AnyObserver::CollectionLength($observer) => $body,
        }
    };
}

impl AnyObserver {
    /// Identifies the underlying observer. Primitive observers are not shared
    /// and have no identity.
    pub(crate) fn id(&self) -> usize {
        match self {
            AnyObserver::Setter(o) => o.id(),
            AnyObserver::Callback(o) => o.id(),
            AnyObserver::Computed(o) => o.id(),
            AnyObserver::DirtyCheck(o) => o.id(),
            AnyObserver::Primitive(_) => 0,
            AnyObserver::CollectionLength(o) => o.id(),
        }
    }

    /// Whether this observer stores the property's value itself, ahead of the
    /// object.
    ///
    /// Setter and callback observers keep the written value until their flush
    /// stores it on the object, so reads must go through them.
    pub fn owns_value(&self) -> bool {
        matches!(self, AnyObserver::Setter(_) | AnyObserver::Callback(_))
    }

    /// Whether this is a [`PrimitiveObserver`], which never notifies anyone.
    pub fn is_primitive(&self) -> bool {
        matches!(self, AnyObserver::Primitive(_))
    }
}

impl PartialEq for AnyObserver {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AnyObserver::Primitive(a), AnyObserver::Primitive(b)) => a == b,
            (AnyObserver::Setter(_), AnyObserver::Setter(_))
            | (AnyObserver::Callback(_), AnyObserver::Callback(_))
            | (AnyObserver::Computed(_), AnyObserver::Computed(_))
            | (AnyObserver::DirtyCheck(_), AnyObserver::DirtyCheck(_))
            | (
                AnyObserver::CollectionLength(_),
                AnyObserver::CollectionLength(_),
            ) => self.id() == other.id(),
            _ => false,
        }
    }
}

impl Flushable for AnyObserver {
    fn flush_changes(&self) {
        dispatch!(self, o => o.flush_changes())
    }
}

impl ToAnyFlushable for AnyObserver {
    fn to_any_flushable(&self) -> AnyFlushable {
        dispatch!(self, o => o.to_any_flushable())
    }
}

impl PropertyObserver for AnyObserver {
    fn get_value(&self) -> Value {
        dispatch!(self, o => o.get_value())
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) {
        dispatch!(self, o => o.set_value(value, flags))
    }

    fn subscribe(&self, subscriber: AnySubscriber) {
        dispatch!(self, o => o.subscribe(subscriber))
    }

    fn unsubscribe(&self, subscriber: &AnySubscriber) {
        dispatch!(self, o => o.unsubscribe(subscriber))
    }

    fn has_subscriber(&self, subscriber: &AnySubscriber) -> bool {
        dispatch!(self, o => o.has_subscriber(subscriber))
    }

    fn has_subscribers(&self) -> bool {
        dispatch!(self, o => o.has_subscribers())
    }

    fn dispose(&self) {
        dispatch!(self, o => o.dispose())
    }
}

macro_rules! into_any_observer {
    ($($ty:ident => $variant:ident),*) => {
        $(
            impl From<$ty> for AnyObserver {
                fn from(value: $ty) -> Self {
                    AnyObserver::$variant(value)
                }
            }
        )*
    };
}

into_any_observer!(
    SetterObserver => Setter,
    CallbackObserver => Callback,
    ComputedObserver => Computed,
    DirtyCheckProperty => DirtyCheck,
    PrimitiveObserver => Primitive,
    CollectionLengthObserver => CollectionLength
);
