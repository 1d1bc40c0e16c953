use super::{
    observer::{observe, CollectionObserver, ObservedCollection},
    AnyCollectionObserver, Collection, CollectionKind, CollectionMutation,
    IndexMap, MutationKind,
};
use crate::{binding::track_collection, change_set::ChangeSet, value::Value};
use core::fmt::Debug;
use indexmap::IndexSet;
use or_poisoned::OrPoisoned;
use rustc_hash::FxBuildHasher;
use std::sync::{Arc, RwLock};

/// Observes the mutations of an [`ObservableSet`].
pub type SetObserver = CollectionObserver<SetState>;

/// The storage behind an [`ObservableSet`].
pub struct SetState {
    items: IndexSet<Value, FxBuildHasher>,
    observer: Option<SetObserver>,
    observation: bool,
}

impl Default for SetState {
    fn default() -> Self {
        Self {
            items: IndexSet::default(),
            observer: None,
            observation: true,
        }
    }
}

impl ObservedCollection for SetState {
    const KIND: CollectionKind = CollectionKind::Set;
    type Handle = ObservableSet;

    fn size(&self) -> usize {
        self.items.len()
    }

    fn observer_slot(&mut self) -> &mut Option<CollectionObserver<Self>> {
        &mut self.observer
    }

    fn erase(observer: CollectionObserver<Self>) -> AnyCollectionObserver {
        AnyCollectionObserver::Set(observer)
    }

    fn handle(state: Arc<RwLock<Self>>) -> Self::Handle {
        ObservableSet(state)
    }
}

/// A shared, observable set of [`Value`]s, kept in insertion order.
///
/// Positions in the set's [`IndexMap`] are insertion-order positions.
#[derive(Clone, Default)]
pub struct ObservableSet(Arc<RwLock<SetState>>);

impl Debug for ObservableSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObservableSet")
            .field(&(self.id() as *const ()))
            .finish()
    }
}

impl PartialEq for ObservableSet {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObservableSet {}

impl<V: Into<Value>> FromIterator<V> for ObservableSet {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self(Arc::new(RwLock::new(SetState {
            items: iter.into_iter().map(Into::into).collect(),
            ..Default::default()
        })))
    }
}

impl ObservableSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether both handles refer to the same set.
    pub fn ptr_eq(&self, other: &ObservableSet) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The set's observer, if one has been created.
    pub fn observer(&self) -> Option<SetObserver> {
        self.0.read().or_poisoned().observer.clone()
    }

    pub(crate) fn get_or_create_observer(
        &self,
        change_set: &ChangeSet,
    ) -> SetObserver {
        observe(&self.0, change_set)
    }

    /// Stops reporting mutations to the observer until observation is enabled
    /// again.
    pub fn disable_observation(&self) {
        self.0.write().or_poisoned().observation = false;
    }

    /// Resumes reporting mutations, restarting the observer's [`IndexMap`] from
    /// the identity.
    pub fn enable_observation(&self) {
        let mut state = self.0.write().or_poisoned();
        state.observation = true;
        let len = state.items.len();
        if let Some(observer) = &state.observer {
            observer.with_index_map(|map| *map = IndexMap::identity(len));
        }
    }

    fn track(&self) {
        track_collection(|| Collection::Set(self.clone()));
    }

    /// The number of elements.
    pub fn len(&self) -> usize {
        self.track();
        self.0.read().or_poisoned().items.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the set contains `value`.
    pub fn has(&self, value: &Value) -> bool {
        self.track();
        self.0.read().or_poisoned().items.contains(value)
    }

    /// Copies the elements out, in insertion order.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        self.0.read().or_poisoned().items.iter().cloned().collect()
    }

    fn mutate<T>(
        &self,
        fun: impl FnOnce(
            &mut IndexSet<Value, FxBuildHasher>,
            Option<&mut IndexMap>,
        ) -> (T, Option<CollectionMutation>),
    ) -> T {
        let (result, notify) = {
            let mut state = self.0.write().or_poisoned();
            let observer =
                state.observation.then(|| state.observer.clone()).flatten();
            let items = &mut state.items;
            let (result, mutation) = match &observer {
                Some(observer) => {
                    observer.with_index_map(|map| fun(items, Some(map)))
                }
                None => fun(items, None),
            };
            (result, observer.zip(mutation))
        };
        if let Some((observer, mutation)) = notify {
            observer.notify(mutation);
        }
        result
    }

    /// Adds a value, returning `false` if it was already present.
    pub fn add(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        self.mutate(|items, map| {
            if !items.insert(value.clone()) {
                return (false, None);
            }
            if let Some(map) = map {
                map.push_new(1);
            }
            (
                true,
                Some(CollectionMutation::new(MutationKind::Add, vec![value])),
            )
        })
    }

    /// Removes a value, returning `false` if it was not present.
    pub fn delete(&self, value: &Value) -> bool {
        self.mutate(|items, map| {
            let Some((index, item)) = items.shift_remove_full(value) else {
                return (false, None);
            };
            if let Some(map) = map {
                map.remove(index, item.clone());
            }
            (
                true,
                Some(CollectionMutation::new(MutationKind::Delete, vec![item])),
            )
        })
    }

    /// Removes every value.
    pub fn clear(&self) {
        self.mutate(|items, map| {
            if items.is_empty() {
                return ((), None);
            }
            let removed: Vec<Value> = items.drain(..).collect();
            if let Some(map) = map {
                map.clear(removed);
            }
            (
                (),
                Some(CollectionMutation::new(MutationKind::Clear, Vec::new())),
            )
        })
    }
}
