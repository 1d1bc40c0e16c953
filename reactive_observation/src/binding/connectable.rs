use crate::{collections::Collection, value::Object};
use std::{cell::RefCell, mem, sync::Arc};

/// Anything that records the reads made while it is connecting.
///
/// While a connectable is the current connect scope (see [`with_connectable`]),
/// every [`Object::get`] and every read of an observable collection is reported
/// to it.
pub trait Connectable: Send + Sync {
    /// Called when `object[key]` is read.
    fn observe_property(&self, object: &Object, key: &str);

    /// Called when a collection is read.
    fn observe_collection(&self, collection: &Collection);
}

thread_local! {
    static CONNECTABLE: RefCell<Option<Arc<dyn Connectable>>> =
        const { RefCell::new(None) };
}

fn current() -> Option<Arc<dyn Connectable>> {
    CONNECTABLE.with(|c| c.borrow().clone())
}

fn replace(
    connectable: Option<Arc<dyn Connectable>>,
) -> Option<Arc<dyn Connectable>> {
    CONNECTABLE.with(|c| mem::replace(&mut *c.borrow_mut(), connectable))
}

/// Runs `fun` with `connectable` as the current connect scope.
pub fn with_connectable<T>(
    connectable: Arc<dyn Connectable>,
    fun: impl FnOnce() -> T,
) -> T {
    let prev = replace(Some(connectable));
    let value = fun();
    replace(prev);
    value
}

/// Runs `fun` without a connect scope, so none of its reads are recorded.
pub fn untrack<T>(fun: impl FnOnce() -> T) -> T {
    let prev = replace(None);
    let value = fun();
    replace(prev);
    value
}

/// Reports a read of `object[key]` to the current connect scope, if there is
/// one.
pub fn observe_property(object: &Object, key: &str) {
    // clone out of the cell first; the scope may connect something else while
    // observing
    if let Some(connectable) = current() {
        connectable.observe_property(object, key);
    }
}

/// Reports a read of a collection to the current connect scope, if there is
/// one.
///
/// The collection handle is only built when someone is listening.
pub(crate) fn track_collection(collection: impl FnOnce() -> Collection) {
    if let Some(connectable) = current() {
        connectable.observe_collection(&collection());
    }
}
