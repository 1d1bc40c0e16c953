use super::{
    setter::{property_cell_observer, PropertyCell},
    AnyObserver, PropertyObserver,
};
use crate::{
    change_set::{AnyFlushable, ChangeSet, Flushable, ToAnyFlushable},
    flags::LifecycleFlags,
    subscribers::AnySubscriber,
    value::{ChangeCallback, Object, Value},
};
use core::fmt::Debug;
use std::sync::Arc;

/// Observes a data property whose object defines a `<key>Changed` callback.
///
/// Behaves like a [`SetterObserver`](super::SetterObserver), except that each
/// flush first calls the callback with the new and previous values. If the
/// callback returns `Some(value)`, that value is stored and reported instead,
/// which lets the object validate or normalize its own properties. The callback
/// is not called for the initial write of a binding.
#[derive(Clone)]
pub struct CallbackObserver(Arc<PropertyCell>);

impl CallbackObserver {
    /// Creates an observer for `object[key]` that calls `callback` on every
    /// change.
    pub fn new(
        object: &Object,
        key: &str,
        callback: ChangeCallback,
        change_set: ChangeSet,
    ) -> Self {
        Self(PropertyCell::new(object, key, Some(callback), change_set))
    }
}

property_cell_observer!(CallbackObserver => Callback);
