use super::{
    observer::{observe, CollectionObserver, ObservedCollection},
    sort::sort_parallel,
    AnyCollectionObserver, Collection, CollectionKind, CollectionMutation,
    IndexMap, MutationKind,
};
use crate::{binding::track_collection, change_set::ChangeSet, value::Value};
use core::fmt::Debug;
use or_poisoned::OrPoisoned;
use std::{
    cmp::Ordering,
    sync::{Arc, RwLock},
};

/// Observes the mutations of an [`ObservableArray`].
pub type ArrayObserver = CollectionObserver<ArrayState>;

/// The storage behind an [`ObservableArray`].
pub struct ArrayState {
    items: Vec<Value>,
    observer: Option<ArrayObserver>,
    observation: bool,
}

impl Default for ArrayState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            observer: None,
            observation: true,
        }
    }
}

impl ArrayState {
    fn active_observer(&self) -> Option<ArrayObserver> {
        if self.observation {
            self.observer.clone()
        } else {
            None
        }
    }
}

impl ObservedCollection for ArrayState {
    const KIND: CollectionKind = CollectionKind::Array;
    type Handle = ObservableArray;

    fn size(&self) -> usize {
        self.items.len()
    }

    fn observer_slot(&mut self) -> &mut Option<CollectionObserver<Self>> {
        &mut self.observer
    }

    fn erase(observer: CollectionObserver<Self>) -> AnyCollectionObserver {
        AnyCollectionObserver::Array(observer)
    }

    fn handle(state: Arc<RwLock<Self>>) -> Self::Handle {
        ObservableArray(state)
    }
}

/// A shared, observable, indexed sequence of [`Value`]s.
///
/// Cloning gives another handle to the same array. Reads report themselves to
/// the current connect scope, so a binding that reads `len()` or `get()`
/// re-evaluates when the array is mutated.
#[derive(Clone, Default)]
pub struct ObservableArray(Arc<RwLock<ArrayState>>);

impl Debug for ObservableArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObservableArray")
            .field(&(self.id() as *const ()))
            .finish()
    }
}

impl PartialEq for ObservableArray {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObservableArray {}

impl<V: Into<Value>> FromIterator<V> for ObservableArray {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self(Arc::new(RwLock::new(ArrayState {
            items: iter.into_iter().map(Into::into).collect(),
            ..Default::default()
        })))
    }
}

impl ObservableArray {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether both handles refer to the same array.
    pub fn ptr_eq(&self, other: &ObservableArray) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The array's observer, if one has been created.
    pub fn observer(&self) -> Option<ArrayObserver> {
        self.0.read().or_poisoned().observer.clone()
    }

    /// The array's observer, created if necessary.
    pub(crate) fn get_or_create_observer(
        &self,
        change_set: &ChangeSet,
    ) -> ArrayObserver {
        observe(&self.0, change_set)
    }

    /// Stops reporting mutations to the observer until observation is enabled
    /// again.
    pub fn disable_observation(&self) {
        self.0.write().or_poisoned().observation = false;
    }

    /// Resumes reporting mutations.
    ///
    /// The observer's [`IndexMap`] restarts from the identity, since the
    /// mutations made in between were not recorded.
    pub fn enable_observation(&self) {
        let mut state = self.0.write().or_poisoned();
        state.observation = true;
        let len = state.items.len();
        if let Some(observer) = &state.observer {
            observer.with_index_map(|map| *map = IndexMap::identity(len));
        }
    }

    /// Whether mutations are currently reported.
    pub fn is_observation_enabled(&self) -> bool {
        self.0.read().or_poisoned().observation
    }

    fn track(&self) {
        track_collection(|| Collection::Array(self.clone()));
    }

    /// The number of elements.
    pub fn len(&self) -> usize {
        self.track();
        self.0.read().or_poisoned().items.len()
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index`.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.track();
        self.0.read().or_poisoned().items.get(index).cloned()
    }

    /// Copies the elements out.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        self.0.read().or_poisoned().items.clone()
    }

    /// Runs `fun` with a view of the elements, without copying them.
    pub fn with<T>(&self, fun: impl FnOnce(&[Value]) -> T) -> T {
        self.track();
        fun(&self.0.read().or_poisoned().items)
    }

    /// Applies a mutation to the elements and, if the array is observed, to the
    /// index map, then notifies the observer after both locks are released.
    fn mutate<T>(
        &self,
        fun: impl FnOnce(
            &mut Vec<Value>,
            Option<&mut IndexMap>,
        ) -> (T, Option<CollectionMutation>),
    ) -> T {
        let (result, notify) = {
            let mut state = self.0.write().or_poisoned();
            let observer = state.active_observer();
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

    /// Appends elements, returning the new length.
    pub fn push<V: Into<Value>>(
        &self,
        values: impl IntoIterator<Item = V>,
    ) -> usize {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.mutate(|items, map| {
            if values.is_empty() {
                return (items.len(), None);
            }
            items.extend(values.iter().cloned());
            if let Some(map) = map {
                map.push_new(values.len());
            }
            (
                items.len(),
                Some(CollectionMutation::new(MutationKind::Push, values)),
            )
        })
    }

    /// Removes and returns the last element.
    pub fn pop(&self) -> Option<Value> {
        self.mutate(|items, map| {
            let Some(item) = items.pop() else {
                return (None, None);
            };
            if let Some(map) = map {
                map.remove(items.len(), item.clone());
            }
            (
                Some(item),
                Some(CollectionMutation::new(MutationKind::Pop, Vec::new())),
            )
        })
    }

    /// Removes and returns the first element.
    pub fn shift(&self) -> Option<Value> {
        self.mutate(|items, map| {
            if items.is_empty() {
                return (None, None);
            }
            let item = items.remove(0);
            if let Some(map) = map {
                map.remove(0, item.clone());
            }
            (
                Some(item),
                Some(CollectionMutation::new(MutationKind::Shift, Vec::new())),
            )
        })
    }

    /// Inserts elements at the front, returning the new length.
    pub fn unshift<V: Into<Value>>(
        &self,
        values: impl IntoIterator<Item = V>,
    ) -> usize {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.mutate(|items, map| {
            if values.is_empty() {
                return (items.len(), None);
            }
            items.splice(0..0, values.iter().cloned());
            if let Some(map) = map {
                map.insert_new(0, values.len());
            }
            (
                items.len(),
                Some(CollectionMutation::new(MutationKind::Unshift, values)),
            )
        })
    }

    /// Removes `delete_count` elements starting at `start` and inserts `values`
    /// in their place, returning the removed elements.
    ///
    /// A negative `start` counts back from the end. Both `start` and
    /// `delete_count` are clamped to the array; `None` deletes everything from
    /// `start` on.
    pub fn splice<V: Into<Value>>(
        &self,
        start: isize,
        delete_count: Option<usize>,
        values: impl IntoIterator<Item = V>,
    ) -> Vec<Value> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.mutate(|items, map| {
            let len = items.len();
            let start = if start < 0 {
                len.saturating_sub(start.unsigned_abs())
            } else {
                start.unsigned_abs().min(len)
            };
            let delete = delete_count.unwrap_or(len - start).min(len - start);
            let removed: Vec<Value> = items
                .splice(start..start + delete, values.iter().cloned())
                .collect();
            if removed.is_empty() && values.is_empty() {
                return (removed, None);
            }
            if let Some(map) = map {
                map.splice(start, removed.clone(), values.len());
            }
            let mut args = vec![Value::from(start), Value::from(delete)];
            args.extend(values);
            (
                removed,
                Some(CollectionMutation::new(MutationKind::Splice, args)),
            )
        })
    }

    /// Reverses the elements in place.
    pub fn reverse(&self) {
        self.mutate(|items, map| {
            if items.len() < 2 {
                return ((), None);
            }
            items.reverse();
            if let Some(map) = map {
                map.reverse();
            }
            (
                (),
                Some(CollectionMutation::new(
                    MutationKind::Reverse,
                    Vec::new(),
                )),
            )
        })
    }

    /// Sorts the elements with [`Value::default_compare`].
    pub fn sort(&self) {
        self.sort_by(Value::default_compare);
    }

    /// Sorts the elements with a comparator.
    ///
    /// While the array is observed, elements are sorted together with their
    /// index-map entries, so batched subscribers learn where each element came
    /// from.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        self.mutate(|items, map| {
            if items.len() < 2 {
                return ((), None);
            }
            match map {
                Some(map) => sort_parallel(items, map.indices_mut(), compare),
                None => items.sort_by(compare),
            }
            (
                (),
                Some(CollectionMutation::new(MutationKind::Sort, Vec::new())),
            )
        })
    }

    /// Truncates the array, or extends it with [`Value::Null`], to `len`
    /// elements.
    pub fn set_len(&self, len: usize) {
        let current = self.0.read().or_poisoned().items.len();
        if len < current {
            self.splice(len as isize, None, Vec::<Value>::new());
        } else if len > current {
            self.push((current..len).map(|_| Value::Null));
        }
    }
}
