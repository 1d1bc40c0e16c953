//! Observable collections, and the observers that track their structural
//! changes.
//!
//! [`ObservableArray`], [`ObservableSet`] and [`ObservableMap`] own their
//! storage and expose the usual mutators. Once a collection has an observer,
//! every mutator
//! 1. applies the equivalent edit to the observer's [`IndexMap`], in lockstep
//!    with the edit to the collection,
//! 2. notifies the observer's immediate subscribers with a
//!    [`CollectionMutation`], and
//! 3. queues the observer in the [`ChangeSet`](crate::change_set::ChangeSet),
//!    so that on the next flush its batched subscribers receive the accumulated
//!    [`IndexMap`] once.
//!
//! Observation can be switched off per collection with `disable_observation`,
//! in which case mutators behave like plain collection methods.

mod array;
mod index_map;
mod map;
mod observer;
mod set;
pub(crate) mod sort;

pub use array::*;
pub use index_map::*;
pub use map::*;
pub use observer::*;
pub use set::*;

use crate::{
    observers::CollectionLengthObserver,
    subscribers::{AnyBatchedSubscriber, AnySubscriber},
    value::Value,
};

/// The kind of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// An indexed sequence.
    Array,
    /// A keyed set of values.
    Set,
    /// A keyed map of values.
    Map,
}

impl CollectionKind {
    /// The name of the property that exposes this collection's length.
    pub fn length_key(self) -> &'static str {
        match self {
            CollectionKind::Array => "length",
            CollectionKind::Set | CollectionKind::Map => "size",
        }
    }
}

/// The mutator that changed a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum MutationKind {
    Push,
    Pop,
    Shift,
    Unshift,
    Splice,
    Reverse,
    Sort,
    Add,
    Set,
    Delete,
    Clear,
}

/// A single mutation, as reported to immediate collection subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionMutation {
    /// The mutator that was called.
    pub kind: MutationKind,
    /// The arguments it was called with.
    pub args: Vec<Value>,
}

impl CollectionMutation {
    pub(crate) fn new(kind: MutationKind, args: Vec<Value>) -> Self {
        Self { kind, args }
    }
}

/// A handle to any observable collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Collection {
    /// An array.
    Array(ObservableArray),
    /// A set.
    Set(ObservableSet),
    /// A map.
    Map(ObservableMap),
}

impl Collection {
    /// The collection held by a value, if any.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(a) => Some(Collection::Array(a.clone())),
            Value::Set(s) => Some(Collection::Set(s.clone())),
            Value::Map(m) => Some(Collection::Map(m.clone())),
            _ => None,
        }
    }

    /// The kind of this collection.
    pub fn kind(&self) -> CollectionKind {
        match self {
            Collection::Array(_) => CollectionKind::Array,
            Collection::Set(_) => CollectionKind::Set,
            Collection::Map(_) => CollectionKind::Map,
        }
    }
}

/// A type-erased collection observer.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyCollectionObserver {
    /// Observes an array.
    Array(ArrayObserver),
    /// Observes a set.
    Set(SetObserver),
    /// Observes a map.
    Map(MapObserver),
}

macro_rules! dispatch {
    ($self:ident, $observer:ident => $body:expr) => {
        match $self {
            AnyCollectionObserver::Array($observer) => $body,
            AnyCollectionObserver::Set($observer) => $body,
            AnyCollectionObserver::Map($observer) => $body,
        }
    };
}

impl AnyCollectionObserver {
    /// The kind of the observed collection.
    pub fn kind(&self) -> CollectionKind {
        match self {
            AnyCollectionObserver::Array(_) => CollectionKind::Array,
            AnyCollectionObserver::Set(_) => CollectionKind::Set,
            AnyCollectionObserver::Map(_) => CollectionKind::Map,
        }
    }

    /// Adds an immediate subscriber.
    pub fn subscribe(&self, subscriber: AnySubscriber) {
        dispatch!(self, o => o.subscribe(subscriber))
    }

    /// Removes an immediate subscriber.
    pub fn unsubscribe(&self, subscriber: &AnySubscriber) {
        dispatch!(self, o => o.unsubscribe(subscriber))
    }

    /// Whether this immediate subscriber is registered.
    pub fn has_subscriber(&self, subscriber: &AnySubscriber) -> bool {
        dispatch!(self, o => o.has_subscriber(subscriber))
    }

    /// Adds a batched subscriber.
    pub fn subscribe_batched(&self, subscriber: AnyBatchedSubscriber) {
        dispatch!(self, o => o.subscribe_batched(subscriber))
    }

    /// Removes a batched subscriber.
    pub fn unsubscribe_batched(&self, subscriber: &AnyBatchedSubscriber) {
        dispatch!(self, o => o.unsubscribe_batched(subscriber))
    }

    /// The number of elements in the observed collection, or `0` if it no
    /// longer exists.
    pub fn collection_len(&self) -> usize {
        dispatch!(self, o => o.collection_len())
    }

    /// The structural diff accumulated since the last flush.
    pub fn index_map(&self) -> IndexMap {
        dispatch!(self, o => o.index_map())
    }

    /// Delivers the accumulated [`IndexMap`] to batched subscribers.
    pub fn flush_changes(&self) {
        dispatch!(self, o => o.flush_changes())
    }

    /// The observer of this collection's length, created on first use.
    pub fn length_observer(&self) -> CollectionLengthObserver {
        dispatch!(self, o => o.length_observer())
    }

    /// Detaches the observer from its collection.
    pub fn dispose(&self) {
        dispatch!(self, o => o.dispose())
    }

    /// Sets the length of the observed collection. Only arrays support this.
    pub(crate) fn set_collection_len(&self, len: usize) -> bool {
        match self {
            AnyCollectionObserver::Array(o) => match o.collection() {
                Some(array) => {
                    array.set_len(len);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}
