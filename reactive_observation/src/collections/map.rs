use super::{
    observer::{observe, CollectionObserver, ObservedCollection},
    AnyCollectionObserver, Collection, CollectionKind, CollectionMutation,
    IndexMap, MutationKind,
};
use crate::{binding::track_collection, change_set::ChangeSet, value::Value};
use core::fmt::Debug;
use indexmap::IndexMap as OrderedMap;
use or_poisoned::OrPoisoned;
use rustc_hash::FxBuildHasher;
use std::{
    mem,
    sync::{Arc, RwLock},
};

type Entries = OrderedMap<Value, Value, FxBuildHasher>;

/// Observes the mutations of an [`ObservableMap`].
pub type MapObserver = CollectionObserver<MapState>;

/// The storage behind an [`ObservableMap`].
pub struct MapState {
    entries: Entries,
    observer: Option<MapObserver>,
    observation: bool,
}

impl Default for MapState {
    fn default() -> Self {
        Self {
            entries: Entries::default(),
            observer: None,
            observation: true,
        }
    }
}

impl ObservedCollection for MapState {
    const KIND: CollectionKind = CollectionKind::Map;
    type Handle = ObservableMap;

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn observer_slot(&mut self) -> &mut Option<CollectionObserver<Self>> {
        &mut self.observer
    }

    fn erase(observer: CollectionObserver<Self>) -> AnyCollectionObserver {
        AnyCollectionObserver::Map(observer)
    }

    fn handle(state: Arc<RwLock<Self>>) -> Self::Handle {
        ObservableMap(state)
    }
}

/// A shared, observable map from [`Value`] keys to [`Value`]s, kept in
/// insertion order.
///
/// Positions in the map's [`IndexMap`] are insertion-order positions of
/// entries. The deleted items recorded for a map are the values of the removed
/// or replaced entries.
#[derive(Clone, Default)]
pub struct ObservableMap(Arc<RwLock<MapState>>);

impl Debug for ObservableMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObservableMap")
            .field(&(self.id() as *const ()))
            .finish()
    }
}

impl PartialEq for ObservableMap {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObservableMap {}

impl<K: Into<Value>, V: Into<Value>> FromIterator<(K, V)> for ObservableMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(Arc::new(RwLock::new(MapState {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Default::default()
        })))
    }
}

impl ObservableMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether both handles refer to the same map.
    pub fn ptr_eq(&self, other: &ObservableMap) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The map's observer, if one has been created.
    pub fn observer(&self) -> Option<MapObserver> {
        self.0.read().or_poisoned().observer.clone()
    }

    pub(crate) fn get_or_create_observer(
        &self,
        change_set: &ChangeSet,
    ) -> MapObserver {
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
        let len = state.entries.len();
        if let Some(observer) = &state.observer {
            observer.with_index_map(|map| *map = IndexMap::identity(len));
        }
    }

    fn track(&self) {
        track_collection(|| Collection::Map(self.clone()));
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.track();
        self.0.read().or_poisoned().entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value stored under `key`.
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.track();
        self.0.read().or_poisoned().entries.get(key).cloned()
    }

    /// Whether an entry exists for `key`.
    pub fn has(&self, key: &Value) -> bool {
        self.track();
        self.0.read().or_poisoned().entries.contains_key(key)
    }

    /// Copies the keys out, in insertion order.
    pub fn keys(&self) -> Vec<Value> {
        self.track();
        self.0.read().or_poisoned().entries.keys().cloned().collect()
    }

    /// Copies the entries out, in insertion order.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.track();
        self.0
            .read()
            .or_poisoned()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn mutate<T>(
        &self,
        fun: impl FnOnce(
            &mut Entries,
            Option<&mut IndexMap>,
        ) -> (T, Option<CollectionMutation>),
    ) -> T {
        let (result, notify) = {
            let mut state = self.0.write().or_poisoned();
            let observer =
                state.observation.then(|| state.observer.clone()).flatten();
            let entries = &mut state.entries;
            let (result, mutation) = match &observer {
                Some(observer) => {
                    observer.with_index_map(|map| fun(entries, Some(map)))
                }
                None => fun(entries, None),
            };
            (result, observer.zip(mutation))
        };
        if let Some((observer, mutation)) = notify {
            observer.notify(mutation);
        }
        result
    }

    /// Stores `value` under `key`.
    ///
    /// Overwriting an entry with a different value counts as replacing it: its
    /// position in the [`IndexMap`] becomes new. Overwriting with the same
    /// value is not a mutation.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) {
        let (key, value) = (key.into(), value.into());
        self.mutate(|entries, map| {
            match entries.get_full_mut(&key) {
                Some((_, _, slot)) if *slot == value => return ((), None),
                Some((index, _, slot)) => {
                    let previous = mem::replace(slot, value.clone());
                    if let Some(map) = map {
                        map.replace(index, previous);
                    }
                }
                None => {
                    entries.insert(key.clone(), value.clone());
                    if let Some(map) = map {
                        map.push_new(1);
                    }
                }
            }
            (
                (),
                Some(CollectionMutation::new(
                    MutationKind::Set,
                    vec![key, value],
                )),
            )
        })
    }

    /// Removes the entry for `key`, returning `false` if there was none.
    pub fn delete(&self, key: &Value) -> bool {
        self.mutate(|entries, map| {
            let Some((index, key, value)) = entries.shift_remove_full(key)
            else {
                return (false, None);
            };
            if let Some(map) = map {
                map.remove(index, value);
            }
            (
                true,
                Some(CollectionMutation::new(MutationKind::Delete, vec![key])),
            )
        })
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.mutate(|entries, map| {
            if entries.is_empty() {
                return ((), None);
            }
            let removed: Vec<Value> =
                entries.drain(..).map(|(_, value)| value).collect();
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
