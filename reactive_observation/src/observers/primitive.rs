use super::PropertyObserver;
use crate::{
    change_set::{AnyFlushable, Flushable, ToAnyFlushable},
    flags::LifecycleFlags,
    subscribers::AnySubscriber,
    value::Value,
};
use std::sync::Arc;

/// Observes a property of a primitive value.
///
/// Primitives never change in place, so there is nothing to observe. The only
/// readable property is the `length` of a string, which returns its length in
/// characters; every other read returns [`Value::Null`], and writes and
/// subscriptions are ignored. Primitive observers are never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveObserver {
    value: Value,
    key: Arc<str>,
}

impl PrimitiveObserver {
    /// Creates an observer for `value[key]`.
    pub fn new(value: Value, key: &str) -> Self {
        Self {
            value,
            key: key.into(),
        }
    }
}

impl Flushable for PrimitiveObserver {
    fn flush_changes(&self) {}
}

impl ToAnyFlushable for PrimitiveObserver {
    fn to_any_flushable(&self) -> AnyFlushable {
        AnyFlushable::new(0, self.clone())
    }
}

impl PropertyObserver for PrimitiveObserver {
    fn get_value(&self) -> Value {
        match (&self.value, &*self.key) {
            (Value::String(s), "length") => Value::from(s.chars().count()),
            _ => Value::Null,
        }
    }

    fn set_value(&self, _value: Value, _flags: LifecycleFlags) {}

    fn subscribe(&self, _subscriber: AnySubscriber) {}

    fn unsubscribe(&self, _subscriber: &AnySubscriber) {}

    fn has_subscriber(&self, _subscriber: &AnySubscriber) -> bool {
        false
    }

    fn has_subscribers(&self) -> bool {
        false
    }

    fn dispose(&self) {}
}
