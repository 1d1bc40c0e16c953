//! Dynamic values and the observable objects whose properties observers watch.
//!
//! An [`Object`] is a shared handle to an ordered set of properties. A property
//! is either plain data or an [`Accessor`] with a getter and an optional
//! setter. Reading a property with [`Object::get`] reports the read to whatever
//! binding or computed property is currently connecting, which is how
//! dependencies are discovered. Writing with [`Object::set`] goes through the
//! property's observer, if one has been created, so that the write is batched
//! and notified.

use crate::{
    binding::{observe_property, untrack},
    collections::{ObservableArray, ObservableMap, ObservableSet},
    flags::LifecycleFlags,
    observers::{AnyObserver, PropertyObserver},
};
use indexmap::IndexMap as OrderedMap;
use or_poisoned::OrPoisoned;
use rustc_hash::FxHashMap;
use std::{
    cmp::Ordering,
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    sync::{Arc, RwLock, Weak},
};

/// Computes the value of an accessor property.
pub type Getter = Arc<dyn Fn(&Object) -> Value + Send + Sync>;

/// Receives writes to an accessor property.
pub type Setter = Arc<dyn Fn(&Object, Value) + Send + Sync>;

/// A `<property>Changed` callback.
///
/// It receives the new value, the previous value and the flags of the write,
/// and runs before subscribers are notified. Returning `Some(_)` replaces the
/// value being stored.
pub type ChangeCallback =
    Arc<dyn Fn(&Value, &Value, LifecycleFlags) -> Option<Value> + Send + Sync>;

/// A dynamically-typed value.
///
/// Equality is "same value": numbers compare numerically, except that `NaN`
/// equals itself, and objects and collections compare by identity. This makes
/// `Value` usable as a set element or map key.
#[derive(Clone, Default)]
pub enum Value {
    /// The absence of a value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// An immutable string.
    String(Arc<str>),
    /// A shared object.
    Object(Object),
    /// A shared, observable array.
    Array(ObservableArray),
    /// A shared, observable set.
    Set(ObservableSet),
    /// A shared, observable map.
    Map(ObservableMap),
}

impl Value {
    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The number, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The object, if this is an object.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The array, if this is an array.
    pub fn as_array(&self) -> Option<&ObservableArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Whether this value counts as `true` in a condition.
    ///
    /// `Null`, `false`, `0`, `NaN` and the empty string are falsy; everything
    /// else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Whether this is an object or a collection, rather than a primitive.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Value::Object(_) | Value::Array(_) | Value::Set(_) | Value::Map(_)
        )
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Object(_) => 3,
            Value::Array(_) => 4,
            Value::Set(_) => 5,
            Value::Map(_) => 6,
            Value::Null => 7,
        }
    }

    fn address(&self) -> usize {
        match self {
            Value::Object(o) => o.id(),
            Value::Array(a) => a.id(),
            Value::Set(s) => s.id(),
            Value::Map(m) => m.id(),
            _ => 0,
        }
    }

    /// The order used by [`ObservableArray::sort`].
    ///
    /// Values are ordered first by kind (booleans, numbers, strings, objects,
    /// arrays, sets, maps) and then naturally within their kind. `Null` sorts
    /// last. Numbers use a total order in which `NaN` sorts after every other
    /// number.
    pub fn default_compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => {
                match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => {
                        a.partial_cmp(b).unwrap_or(Ordering::Equal)
                    }
                }
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ => self
                .rank()
                .cmp(&other.rank())
                .then_with(|| self.address().cmp(&other.address())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Set(a), Value::Set(b)) => a.ptr_eq(b),
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                // -0.0 == 0.0, and every NaN is the same value
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if *n == 0.0 {
                    0
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::String(s) => s.hash(state),
            _ => self.address().hash(state),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Object(o) => o.fmt(f),
            Value::Array(a) => a.fmt(f),
            Value::Set(s) => s.fmt(f),
            Value::Map(m) => m.fmt(f),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Object(_) => f.write_str("[object]"),
            Value::Array(_) => f.write_str("[array]"),
            Value::Set(_) => f.write_str("[set]"),
            Value::Map(_) => f.write_str("[map]"),
        }
    }
}

macro_rules! value_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Number(value as f64)
                }
            }
        )*
    };
}

value_from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(value: Arc<str>) -> Self {
        Value::String(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl From<ObservableArray> for Value {
    fn from(value: ObservableArray) -> Self {
        Value::Array(value)
    }
}

impl From<ObservableSet> for Value {
    fn from(value: ObservableSet) -> Self {
        Value::Set(value)
    }
}

impl From<ObservableMap> for Value {
    fn from(value: ObservableMap) -> Self {
        Value::Map(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// A computed property: a getter, and optionally a setter.
#[derive(Clone)]
pub struct Accessor {
    pub(crate) get: Getter,
    pub(crate) set: Option<Setter>,
    pub(crate) configurable: bool,
    pub(crate) volatile: bool,
}

impl Debug for Accessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accessor")
            .field("has_setter", &self.set.is_some())
            .field("configurable", &self.configurable)
            .field("volatile", &self.volatile)
            .finish_non_exhaustive()
    }
}

impl Accessor {
    /// Creates a configurable, read-only accessor with static dependencies.
    pub fn new(get: impl Fn(&Object) -> Value + Send + Sync + 'static) -> Self {
        Self {
            get: Arc::new(get),
            set: None,
            configurable: true,
            volatile: false,
        }
    }

    /// Adds a setter.
    pub fn with_setter(
        mut self,
        set: impl Fn(&Object, Value) + Send + Sync + 'static,
    ) -> Self {
        self.set = Some(Arc::new(set));
        self
    }

    /// Marks the accessor as impossible to intercept, so it can only be
    /// observed by dirty checking.
    pub fn non_configurable(mut self) -> Self {
        self.configurable = false;
        self
    }

    /// Marks the getter's dependencies as changing between evaluations, so they
    /// are collected again every time it runs rather than once.
    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    /// Whether the accessor can be intercepted.
    pub fn is_configurable(&self) -> bool {
        self.configurable
    }

    /// Whether dependencies are collected on every evaluation.
    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    /// Whether the accessor has a setter.
    pub fn has_setter(&self) -> bool {
        self.set.is_some()
    }
}

/// The shape of one property of an [`Object`].
#[derive(Clone, Debug)]
pub enum Property {
    /// A stored value.
    Data(Value),
    /// A getter and optional setter.
    Accessor(Accessor),
}

#[derive(Default)]
pub(crate) struct ObjectInner {
    properties: OrderedMap<Arc<str>, Property>,
    callbacks: FxHashMap<Arc<str>, ChangeCallback>,
    observers: FxHashMap<Arc<str>, AnyObserver>,
}

/// A shared object with observable properties.
///
/// Cloning an `Object` gives another handle to the same object.
#[derive(Clone, Default)]
pub struct Object(Arc<RwLock<ObjectInner>>);

/// A non-owning reference to an [`Object`].
#[derive(Clone, Default)]
pub struct WeakObject(Weak<RwLock<ObjectInner>>);

impl WeakObject {
    /// Gets the object back, if it still exists.
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }
}

impl Debug for WeakObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WeakObject")
            .field(&(self.0.as_ptr() as *const ()))
            .finish()
    }
}

impl Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Object").field(&(self.id() as *const ())).finish()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl<K, V> FromIterator<(K, V)> for Object
where
    K: Into<Arc<str>>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let properties = iter
            .into_iter()
            .map(|(key, value)| (key.into(), Property::Data(value.into())))
            .collect();
        Object(Arc::new(RwLock::new(ObjectInner {
            properties,
            ..Default::default()
        })))
    }
}

impl Object {
    /// Creates an object with no properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a non-owning reference to this object.
    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Arc::downgrade(&self.0))
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Defines, or replaces, a data property.
    ///
    /// This bypasses any observer of the property; use [`Object::set`] for
    /// observed writes.
    pub fn define_property(
        &self,
        key: impl Into<Arc<str>>,
        value: impl Into<Value>,
    ) {
        self.0
            .write()
            .or_poisoned()
            .properties
            .insert(key.into(), Property::Data(value.into()));
    }

    /// Defines, or replaces, an accessor property.
    pub fn define_accessor(
        &self,
        key: impl Into<Arc<str>>,
        accessor: Accessor,
    ) {
        self.0
            .write()
            .or_poisoned()
            .properties
            .insert(key.into(), Property::Accessor(accessor));
    }

    /// Registers a named callback, such as `nameChanged`.
    ///
    /// When the `name` property is observed, the observer invokes `nameChanged`
    /// before notifying its subscribers.
    pub fn define_change_callback(
        &self,
        name: impl Into<Arc<str>>,
        callback: impl Fn(&Value, &Value, LifecycleFlags) -> Option<Value>
            + Send
            + Sync
            + 'static,
    ) {
        self.0
            .write()
            .or_poisoned()
            .callbacks
            .insert(name.into(), Arc::new(callback));
    }

    /// Looks up a named callback.
    pub fn change_callback(&self, name: &str) -> Option<ChangeCallback> {
        self.0.read().or_poisoned().callbacks.get(name).cloned()
    }

    /// The shape of a property, if it exists.
    pub fn property(&self, key: &str) -> Option<Property> {
        self.0.read().or_poisoned().properties.get(key).cloned()
    }

    /// Whether the property exists.
    pub fn has(&self, key: &str) -> bool {
        self.0.read().or_poisoned().properties.contains_key(key)
    }

    /// The keys of all properties, in definition order.
    pub fn keys(&self) -> Vec<Arc<str>> {
        self.0.read().or_poisoned().properties.keys().cloned().collect()
    }

    /// Reads a property, reporting the read to the current connect scope.
    ///
    /// Missing properties read as [`Value::Null`].
    pub fn get(&self, key: &str) -> Value {
        observe_property(self, key);
        self.get_untracked(key)
    }

    /// Reads a property without reporting the read.
    ///
    /// If the property's observer owns its value, the observer's current value
    /// is returned, even if it has not been flushed yet.
    pub fn get_untracked(&self, key: &str) -> Value {
        match self.cached_observer(key) {
            Some(observer) if observer.owns_value() => observer.get_value(),
            _ => self.read_raw(key),
        }
    }

    /// Writes a property.
    ///
    /// If the property is observed, the write goes through its observer and is
    /// flushed with the next drain of the change set. Otherwise it is applied
    /// directly.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.cached_observer(key) {
            Some(observer) => {
                observer.set_value(value, LifecycleFlags::empty())
            }
            None => self.write_raw(key, value),
        }
    }

    /// Reads the stored value, or runs the getter untracked.
    pub(crate) fn read_raw(&self, key: &str) -> Value {
        let getter = {
            let inner = self.0.read().or_poisoned();
            match inner.properties.get(key) {
                Some(Property::Data(value)) => return value.clone(),
                Some(Property::Accessor(accessor)) => {
                    Arc::clone(&accessor.get)
                }
                None => return Value::Null,
            }
        };
        // readers depend on the accessor's observer, not on what the getter
        // reads
        untrack(|| getter(self))
    }

    /// Stores a value, or calls the setter. Writes to accessors without a
    /// setter are ignored.
    pub(crate) fn write_raw(&self, key: &str, value: Value) {
        let setter = {
            let mut inner = self.0.write().or_poisoned();
            match inner.properties.get_mut(key) {
                Some(Property::Data(slot)) => {
                    *slot = value;
                    return;
                }
                Some(Property::Accessor(accessor)) => accessor.set.clone(),
                None => {
                    inner.properties.insert(key.into(), Property::Data(value));
                    return;
                }
            }
        };
        if let Some(setter) = setter {
            setter(self, value);
        }
    }

    pub(crate) fn cached_observer(&self, key: &str) -> Option<AnyObserver> {
        self.0.read().or_poisoned().observers.get(key).cloned()
    }

    /// Caches an observer for `key`, unless one is already cached, and returns
    /// the cached one.
    pub(crate) fn cache_observer(
        &self,
        key: &str,
        observer: AnyObserver,
    ) -> AnyObserver {
        self.0
            .write()
            .or_poisoned()
            .observers
            .entry(key.into())
            .or_insert(observer)
            .clone()
    }

    /// Drops the cached observer for `key`, if it is the given one.
    pub(crate) fn forget_observer(&self, key: &str, observer: &AnyObserver) {
        let mut inner = self.0.write().or_poisoned();
        if inner.observers.get(key) == Some(observer) {
            inner.observers.remove(key);
        }
    }
}
