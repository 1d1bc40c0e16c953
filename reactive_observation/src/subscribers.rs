//! Subscribers, and the compact collection every observer uses to hold them.
//!
//! Observers reference their subscribers but never own them: a subscriber is
//! stored as a type-erased [`AnySubscriber`], which wraps a [`Weak`] pointer.
//! If the subscriber is dropped without unsubscribing, notifying it is a no-op.

use crate::{
    collections::{CollectionMutation, IndexMap},
    flags::LifecycleFlags,
    value::Value,
};
use core::{fmt::Debug, hash::Hash};
use std::sync::{Arc, Weak};

/// Anything that can be notified when an observer's value changes.
pub trait Subscriber: Send + Sync {
    /// Called when a property observer flushes a new value.
    fn handle_change(
        &self,
        new_value: &Value,
        old_value: &Value,
        flags: LifecycleFlags,
    );

    /// Called synchronously every time an observed collection is mutated.
    fn handle_collection_change(
        &self,
        mutation: &CollectionMutation,
        flags: LifecycleFlags,
    ) {
        _ = (mutation, flags);
    }
}

/// Anything that wants the accumulated structural diff of a collection, once
/// per flush.
pub trait BatchedSubscriber: Send + Sync {
    /// Called with the [`IndexMap`] accumulated since the previous flush.
    fn handle_batched_change(&self, index_map: &IndexMap);
}

/// Converts a [`Subscriber`] to a type-erased [`AnySubscriber`].
pub trait ToAnySubscriber {
    /// Converts this type to its type-erased equivalent.
    fn to_any_subscriber(&self) -> AnySubscriber;
}

/// Converts a [`BatchedSubscriber`] to a type-erased [`AnyBatchedSubscriber`].
pub trait ToAnyBatchedSubscriber {
    /// Converts this type to its type-erased equivalent.
    fn to_any_batched_subscriber(&self) -> AnyBatchedSubscriber;
}

/// A type-erased, non-owning reference to a [`Subscriber`].
#[derive(Clone)]
pub struct AnySubscriber(pub(crate) usize, pub(crate) Weak<dyn Subscriber>);

impl AnySubscriber {
    /// Creates a subscriber reference from a weak pointer.
    pub fn from_weak<T: Subscriber + 'static>(weak: &Weak<T>) -> Self {
        Self(weak.as_ptr() as *const () as usize, weak.clone())
    }
}

impl<T: Subscriber + 'static> ToAnySubscriber for Arc<T> {
    fn to_any_subscriber(&self) -> AnySubscriber {
        AnySubscriber::from_weak(&Arc::downgrade(self))
    }
}

impl ToAnySubscriber for AnySubscriber {
    fn to_any_subscriber(&self) -> AnySubscriber {
        self.clone()
    }
}

impl Subscriber for AnySubscriber {
    fn handle_change(
        &self,
        new_value: &Value,
        old_value: &Value,
        flags: LifecycleFlags,
    ) {
        if let Some(inner) = self.1.upgrade() {
            inner.handle_change(new_value, old_value, flags);
        }
    }

    fn handle_collection_change(
        &self,
        mutation: &CollectionMutation,
        flags: LifecycleFlags,
    ) {
        if let Some(inner) = self.1.upgrade() {
            inner.handle_collection_change(mutation, flags);
        }
    }
}

impl Debug for AnySubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnySubscriber").field(&self.0).finish()
    }
}

impl Hash for AnySubscriber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialEq for AnySubscriber {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for AnySubscriber {}

/// A type-erased, non-owning reference to a [`BatchedSubscriber`].
#[derive(Clone)]
pub struct AnyBatchedSubscriber(
    pub(crate) usize,
    pub(crate) Weak<dyn BatchedSubscriber>,
);

impl AnyBatchedSubscriber {
    /// Creates a batched subscriber reference from a weak pointer.
    pub fn from_weak<T: BatchedSubscriber + 'static>(weak: &Weak<T>) -> Self {
        Self(weak.as_ptr() as *const () as usize, weak.clone())
    }
}

impl<T: BatchedSubscriber + 'static> ToAnyBatchedSubscriber for Arc<T> {
    fn to_any_batched_subscriber(&self) -> AnyBatchedSubscriber {
        AnyBatchedSubscriber::from_weak(&Arc::downgrade(self))
    }
}

impl BatchedSubscriber for AnyBatchedSubscriber {
    fn handle_batched_change(&self, index_map: &IndexMap) {
        if let Some(inner) = self.1.upgrade() {
            inner.handle_batched_change(index_map);
        }
    }
}

impl Debug for AnyBatchedSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyBatchedSubscriber").field(&self.0).finish()
    }
}

impl PartialEq for AnyBatchedSubscriber {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for AnyBatchedSubscriber {}

const SLOT_0: u8 = 0b0001;
const SLOT_1: u8 = 0b0010;
const SLOT_2: u8 = 0b0100;
const OVERFLOW: u8 = 0b1000;
const SLOTS: [u8; 3] = [SLOT_0, SLOT_1, SLOT_2];

/// Holds the subscribers of one observer.
///
/// The first three subscribers live in inline slots and only further
/// subscribers are pushed into an overflow `Vec`, so the common case of one to
/// three subscribers never allocates. A 4-bit mask records which slots are
/// occupied and whether the overflow is in use.
///
/// Subscribers are notified in slot order, then in overflow order. Adding fills
/// the first free slot, so a subscriber added after a removal may be notified
/// before older ones.
#[derive(Clone)]
pub struct SubscriberCollection<S> {
    mask: u8,
    slots: [Option<S>; 3],
    overflow: Vec<S>,
}

/// The subscribers that receive a collection's [`IndexMap`] once per flush.
pub type BatchedSubscriberCollection =
    SubscriberCollection<AnyBatchedSubscriber>;

impl<S> Default for SubscriberCollection<S> {
    fn default() -> Self {
        Self {
            mask: 0,
            slots: [None, None, None],
            overflow: Vec::new(),
        }
    }
}

impl<S: Debug> Debug for SubscriberCollection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberCollection")
            .field("mask", &format_args!("{:#06b}", self.mask))
            .field("slots", &self.slots)
            .field("overflow", &self.overflow)
            .finish()
    }
}

impl<S: PartialEq + Clone> SubscriberCollection<S> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber, returning `false` if it was already present.
    pub fn add_subscriber(&mut self, subscriber: S) -> bool {
        if self.has_subscriber(&subscriber) {
            return false;
        }
        for (slot, bit) in self.slots.iter_mut().zip(SLOTS) {
            if self.mask & bit == 0 {
                *slot = Some(subscriber);
                self.mask |= bit;
                return true;
            }
        }
        self.overflow.push(subscriber);
        self.mask |= OVERFLOW;
        true
    }

    /// Removes a subscriber, returning `false` if it was not present.
    pub fn remove_subscriber(&mut self, subscriber: &S) -> bool {
        for (slot, bit) in self.slots.iter_mut().zip(SLOTS) {
            if slot.as_ref() == Some(subscriber) {
                *slot = None;
                self.mask &= !bit;
                return true;
            }
        }
        if self.mask & OVERFLOW != 0 {
            if let Some(pos) =
                self.overflow.iter().position(|s| s == subscriber)
            {
                // order matters here; subscribers are notified in order
                self.overflow.remove(pos);
                if self.overflow.is_empty() {
                    self.mask &= !OVERFLOW;
                }
                return true;
            }
        }
        false
    }

    /// Whether this subscriber is currently registered.
    pub fn has_subscriber(&self, subscriber: &S) -> bool {
        self.slots.iter().any(|slot| slot.as_ref() == Some(subscriber))
            || (self.mask & OVERFLOW != 0 && self.overflow.contains(subscriber))
    }

    /// Whether any subscriber is registered.
    pub fn has_subscribers(&self) -> bool {
        self.mask != 0
    }

    /// The number of registered subscribers.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count() + self.overflow.len()
    }

    /// Whether no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        !self.has_subscribers()
    }

    /// Removes every subscriber.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Copies the current subscribers, in notification order.
    ///
    /// Observers take a snapshot while holding their lock and notify after
    /// releasing it. A subscriber added during notification is therefore not
    /// notified in that pass, and one removed during notification still is.
    pub fn snapshot(&self) -> Vec<S> {
        self.slots
            .iter()
            .flatten()
            .chain(self.overflow.iter())
            .cloned()
            .collect()
    }

    /// Calls `fun` once for every subscriber in a snapshot of this collection.
    pub fn call_subscribers(&self, mut fun: impl FnMut(&S)) {
        for subscriber in self.snapshot() {
            fun(&subscriber);
        }
    }
}
