use crate::value::Value;
use std::{mem, ops::Deref};

/// Marks a position whose element has no counterpart before the current batch.
pub const NEW_ITEM: isize = -2;

/// Records how a collection's positions correspond to the positions it had at
/// the last flush.
///
/// `index_map[i]` is the position that the element now at `i` occupied before
/// the batch began, or [`NEW_ITEM`] if it was added during the batch. Elements
/// that existed before the batch and were removed during it are listed in
/// [`deleted_indices`](IndexMap::deleted_indices), along with the removed
/// values in [`deleted_items`](IndexMap::deleted_items).
///
/// While a collection is observed, the map always has exactly as many entries
/// as the collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexMap {
    indices: Vec<isize>,
    deleted_indices: Vec<usize>,
    deleted_items: Vec<Value>,
}

impl Deref for IndexMap {
    type Target = [isize];

    fn deref(&self) -> &Self::Target {
        &self.indices
    }
}

impl IndexMap {
    /// A map of `len` positions that have not moved.
    pub fn identity(len: usize) -> Self {
        Self {
            indices: (0..len as isize).collect(),
            deleted_indices: Vec::new(),
            deleted_items: Vec::new(),
        }
    }

    /// The position entries, one per current element.
    pub fn as_slice(&self) -> &[isize] {
        &self.indices
    }

    /// The position the element now at `position` had before the batch, if it
    /// existed then.
    pub fn origin(&self, position: usize) -> Option<usize> {
        self.indices
            .get(position)
            .and_then(|&origin| usize::try_from(origin).ok())
    }

    /// Original positions of elements removed during the batch.
    pub fn deleted_indices(&self) -> &[usize] {
        &self.deleted_indices
    }

    /// Elements removed during the batch, parallel to
    /// [`deleted_indices`](IndexMap::deleted_indices).
    pub fn deleted_items(&self) -> &[Value] {
        &self.deleted_items
    }

    /// Whether anything moved, appeared or disappeared during the batch.
    pub fn has_changes(&self) -> bool {
        !self.deleted_indices.is_empty()
            || self
                .indices
                .iter()
                .enumerate()
                .any(|(pos, &origin)| origin != pos as isize)
    }

    fn record_deletion(&mut self, origin: isize, item: Value) {
        if let Ok(origin) = usize::try_from(origin) {
            self.deleted_indices.push(origin);
            self.deleted_items.push(item);
        }
    }

    pub(crate) fn push_new(&mut self, count: usize) {
        self.indices.extend((0..count).map(|_| NEW_ITEM));
    }

    pub(crate) fn insert_new(&mut self, at: usize, count: usize) {
        self.indices
            .splice(at..at, (0..count).map(|_| NEW_ITEM));
    }

    pub(crate) fn remove(&mut self, at: usize, item: Value) {
        if at < self.indices.len() {
            let origin = self.indices.remove(at);
            self.record_deletion(origin, item);
        }
    }

    /// Mirrors `Vec::splice(start..start + removed.len(), inserted)` on the
    /// collection.
    pub(crate) fn splice(
        &mut self,
        start: usize,
        removed: Vec<Value>,
        insert_count: usize,
    ) {
        let end = start + removed.len();
        let origins: Vec<isize> = self
            .indices
            .splice(start..end, (0..insert_count).map(|_| NEW_ITEM))
            .collect();
        for (origin, item) in origins.into_iter().zip(removed) {
            self.record_deletion(origin, item);
        }
    }

    /// Marks the element at `at` as replaced by a new one.
    pub(crate) fn replace(&mut self, at: usize, previous: Value) {
        if let Some(origin) = self.indices.get_mut(at) {
            let prev_origin = mem::replace(origin, NEW_ITEM);
            self.record_deletion(prev_origin, previous);
        }
    }

    pub(crate) fn clear(&mut self, removed: Vec<Value>) {
        let origins = mem::take(&mut self.indices);
        for (origin, item) in origins.into_iter().zip(removed) {
            self.record_deletion(origin, item);
        }
    }

    pub(crate) fn reverse(&mut self) {
        self.indices.reverse();
    }

    pub(crate) fn indices_mut(&mut self) -> &mut [isize] {
        &mut self.indices
    }

    /// Hands out the accumulated map and starts a new batch.
    pub(crate) fn take(&mut self) -> IndexMap {
        let len = self.indices.len();
        mem::replace(self, IndexMap::identity(len))
    }
}
