use super::{
    AnyCollectionObserver, CollectionKind, CollectionMutation, IndexMap,
};
use crate::{
    change_set::{AnyFlushable, ChangeSet, Flushable, ToAnyFlushable},
    flags::LifecycleFlags,
    observers::{CollectionLengthObserver, WeakLengthObserver},
    subscribers::{
        AnyBatchedSubscriber, AnySubscriber, BatchedSubscriber,
        BatchedSubscriberCollection, Subscriber, SubscriberCollection,
    },
};
use core::fmt::Debug;
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

/// The storage behind an observable collection.
///
/// This is implemented by the state types of
/// [`ObservableArray`](super::ObservableArray),
/// [`ObservableSet`](super::ObservableSet) and
/// [`ObservableMap`](super::ObservableMap), and lets one [`CollectionObserver`]
/// implementation serve all three.
pub trait ObservedCollection: Send + Sync + Sized + 'static {
    /// The kind of collection.
    const KIND: CollectionKind;

    /// The public handle type of the collection.
    type Handle;

    /// The number of elements.
    fn size(&self) -> usize;

    #[doc(hidden)]
    fn observer_slot(&mut self) -> &mut Option<CollectionObserver<Self>>;

    #[doc(hidden)]
    fn erase(observer: CollectionObserver<Self>) -> AnyCollectionObserver;

    #[doc(hidden)]
    fn handle(state: Arc<RwLock<Self>>) -> Self::Handle;
}

struct ObserverState<C> {
    collection: Weak<RwLock<C>>,
    index_map: IndexMap,
    subscribers: SubscriberCollection<AnySubscriber>,
    batched: BatchedSubscriberCollection,
    change_set: ChangeSet,
    length_observer: Option<WeakLengthObserver>,
}

/// Tracks the mutations of one collection.
///
/// The collection holds its observer in a back-reference slot; the observer
/// only holds a weak reference to the collection. There are two independent
/// sets of subscribers: immediate subscribers are told about every mutation as
/// it happens, batched subscribers receive the accumulated [`IndexMap`] once
/// per flush.
pub struct CollectionObserver<C: ObservedCollection> {
    inner: Arc<RwLock<ObserverState<C>>>,
}

impl<C: ObservedCollection> Clone for CollectionObserver<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: ObservedCollection> Debug for CollectionObserver<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionObserver")
            .field("kind", &C::KIND)
            .field("id", &(self.id() as *const ()))
            .finish()
    }
}

impl<C: ObservedCollection> PartialEq for CollectionObserver<C> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<C: ObservedCollection> Eq for CollectionObserver<C> {}

/// Returns the observer of a collection, creating it if necessary.
pub(crate) fn observe<C: ObservedCollection>(
    collection: &Arc<RwLock<C>>,
    change_set: &ChangeSet,
) -> CollectionObserver<C> {
    let mut state = collection.write().or_poisoned();
    if let Some(observer) = state.observer_slot() {
        return observer.clone();
    }
    let observer = CollectionObserver {
        inner: Arc::new(RwLock::new(ObserverState {
            collection: Arc::downgrade(collection),
            index_map: IndexMap::identity(state.size()),
            subscribers: SubscriberCollection::new(),
            batched: SubscriberCollection::new(),
            change_set: change_set.clone(),
            length_observer: None,
        })),
    };
    *state.observer_slot() = Some(observer.clone());
    observer
}

impl<C: ObservedCollection> CollectionObserver<C> {
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Adds an immediate subscriber.
    pub fn subscribe(&self, subscriber: AnySubscriber) {
        self.inner
            .write()
            .or_poisoned()
            .subscribers
            .add_subscriber(subscriber);
    }

    /// Removes an immediate subscriber.
    pub fn unsubscribe(&self, subscriber: &AnySubscriber) {
        self.inner
            .write()
            .or_poisoned()
            .subscribers
            .remove_subscriber(subscriber);
    }

    /// Whether this immediate subscriber is registered.
    pub fn has_subscriber(&self, subscriber: &AnySubscriber) -> bool {
        self.inner
            .read()
            .or_poisoned()
            .subscribers
            .has_subscriber(subscriber)
    }

    /// Whether any immediate subscriber is registered.
    pub fn has_subscribers(&self) -> bool {
        self.inner.read().or_poisoned().subscribers.has_subscribers()
    }

    /// Adds a batched subscriber.
    pub fn subscribe_batched(&self, subscriber: AnyBatchedSubscriber) {
        self.inner
            .write()
            .or_poisoned()
            .batched
            .add_subscriber(subscriber);
    }

    /// Removes a batched subscriber.
    pub fn unsubscribe_batched(&self, subscriber: &AnyBatchedSubscriber) {
        self.inner
            .write()
            .or_poisoned()
            .batched
            .remove_subscriber(subscriber);
    }

    /// Whether any batched subscriber is registered.
    pub fn has_batched_subscribers(&self) -> bool {
        self.inner.read().or_poisoned().batched.has_subscribers()
    }

    /// A copy of the structural diff accumulated since the last flush.
    pub fn index_map(&self) -> IndexMap {
        self.inner.read().or_poisoned().index_map.clone()
    }

    /// The change set this observer queues itself in.
    pub fn change_set(&self) -> ChangeSet {
        self.inner.read().or_poisoned().change_set.clone()
    }

    /// The observed collection, if it still exists.
    pub fn collection(&self) -> Option<C::Handle> {
        let collection = self.inner.read().or_poisoned().collection.upgrade();
        collection.map(C::handle)
    }

    /// The number of elements in the observed collection, or `0` if it no
    /// longer exists.
    pub fn collection_len(&self) -> usize {
        let collection = self.inner.read().or_poisoned().collection.upgrade();
        collection.map_or(0, |c| c.read().or_poisoned().size())
    }

    /// Runs `fun` on the index map. Called by mutators while the collection is
    /// locked.
    pub(crate) fn with_index_map<T>(
        &self,
        fun: impl FnOnce(&mut IndexMap) -> T,
    ) -> T {
        fun(&mut self.inner.write().or_poisoned().index_map)
    }

    /// Notifies immediate subscribers of a mutation, and queues the batched
    /// notification.
    pub(crate) fn notify(&self, mutation: CollectionMutation) {
        let (subscribers, change_set) = {
            let state = self.inner.read().or_poisoned();
            (state.subscribers.snapshot(), state.change_set.clone())
        };
        for subscriber in subscribers {
            subscriber.handle_collection_change(
                &mutation,
                LifecycleFlags::IS_COLLECTION_MUTATION,
            );
        }
        _ = change_set.add(self);
    }

    /// Delivers the accumulated [`IndexMap`] to batched subscribers, and starts
    /// a new batch.
    pub fn flush_changes(&self) {
        let (index_map, subscribers) = {
            let mut state = self.inner.write().or_poisoned();
            (state.index_map.take(), state.batched.snapshot())
        };
        for subscriber in subscribers {
            subscriber.handle_batched_change(&index_map);
        }
    }

    /// The observer of the collection's length or size, created on first use.
    pub fn length_observer(&self) -> CollectionLengthObserver {
        let (existing, change_set) = {
            let state = self.inner.read().or_poisoned();
            (
                state.length_observer.as_ref().and_then(|o| o.upgrade()),
                state.change_set.clone(),
            )
        };
        if let Some(observer) = existing {
            return observer;
        }
        let observer =
            CollectionLengthObserver::new(C::erase(self.clone()), change_set);
        self.inner.write().or_poisoned().length_observer =
            Some(observer.downgrade());
        observer
    }

    /// Detaches this observer from its collection and drops its subscribers.
    ///
    /// The collection keeps its contents; it simply stops being observed until
    /// a new observer is created for it.
    pub fn dispose(&self) {
        let collection = {
            let mut state = self.inner.write().or_poisoned();
            state.subscribers.clear();
            state.batched.clear();
            state.length_observer = None;
            let len = state.index_map.len();
            state.index_map = IndexMap::identity(len);
            state.collection.upgrade()
        };
        if let Some(collection) = collection {
            let mut collection = collection.write().or_poisoned();
            let slot = collection.observer_slot();
            if slot.as_ref() == Some(self) {
                *slot = None;
            }
        }
    }
}

impl<C: ObservedCollection> Flushable for CollectionObserver<C> {
    fn flush_changes(&self) {
        CollectionObserver::flush_changes(self);
    }
}

impl<C: ObservedCollection> ToAnyFlushable for CollectionObserver<C> {
    fn to_any_flushable(&self) -> AnyFlushable {
        AnyFlushable::new(self.id(), self.clone())
    }
}
