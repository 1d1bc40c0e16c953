use super::{untrack, with_connectable, Connectable, DependencyTracker};
use crate::{
    change_set::{ChangeSet, Flushable},
    collections::{Collection, CollectionMutation},
    error::ObservationError,
    flags::LifecycleFlags,
    locator::ObserverLocator,
    observers::{AnyObserver, PropertyObserver},
    subscribers::{AnySubscriber, Subscriber},
    value::{Object, Value},
};
use core::fmt::Debug;
use or_poisoned::OrPoisoned;
use std::sync::{Arc, Mutex, RwLock, Weak};

/// The direction(s) in which a [`PropertyBinding`] propagates values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BindingMode {
    /// Write the source to the target once, when binding.
    OneTime,
    /// Keep the target in sync with the source.
    #[default]
    ToView,
    /// Write changes of the target back to the source.
    FromView,
    /// Both [`ToView`](BindingMode::ToView) and
    /// [`FromView`](BindingMode::FromView).
    TwoWay,
}

impl BindingMode {
    /// Whether the source is written to the target.
    pub fn to_view(self) -> bool {
        !matches!(self, BindingMode::FromView)
    }

    /// Whether the source follows changes of the target.
    pub fn from_view(self) -> bool {
        matches!(self, BindingMode::FromView | BindingMode::TwoWay)
    }

    fn observes_source(self) -> bool {
        matches!(self, BindingMode::ToView | BindingMode::TwoWay)
    }
}

/// The source side of a binding.
///
/// Evaluation should read through [`Object::get`] and the collection accessors,
/// so that the binding learns what it depends on.
pub trait Expression: Send + Sync {
    /// Computes the current value.
    fn evaluate(&self) -> Value;

    /// Writes a value back to wherever the expression reads from.
    fn assign(&self, value: Value) -> Result<(), ObservationError> {
        _ = value;
        Err(ObservationError::NotAssignable)
    }

    /// Whether [`assign`](Expression::assign) is supported.
    fn is_assignable(&self) -> bool {
        false
    }
}

impl<F> Expression for F
where
    F: Fn() -> Value + Send + Sync,
{
    fn evaluate(&self) -> Value {
        self()
    }
}

/// The expression `object.key`, which can be both read and assigned.
#[derive(Debug, Clone)]
pub struct AccessMember {
    object: Object,
    key: Arc<str>,
}

impl AccessMember {
    /// Creates an expression that reads and writes `object[key]`.
    pub fn new(object: Object, key: impl Into<Arc<str>>) -> Self {
        Self {
            object,
            key: key.into(),
        }
    }
}

impl Expression for AccessMember {
    fn evaluate(&self) -> Value {
        self.object.get(&self.key)
    }

    fn assign(&self, value: Value) -> Result<(), ObservationError> {
        self.object.set(&self.key, value);
        Ok(())
    }

    fn is_assignable(&self) -> bool {
        true
    }
}

struct BindingInner {
    this: Weak<BindingInner>,
    mode: BindingMode,
    source: Arc<dyn Expression>,
    target: AnyObserver,
    change_set: ChangeSet,
    tracker: Mutex<DependencyTracker>,
    target_listener: Arc<TargetListener>,
    bound: RwLock<bool>,
}

/// Listens to the target of a from-view binding.
struct TargetListener {
    binding: Weak<BindingInner>,
}

impl Subscriber for TargetListener {
    fn handle_change(
        &self,
        new_value: &Value,
        _: &Value,
        flags: LifecycleFlags,
    ) {
        // writes made by the binding itself must not flow back
        if flags.contains(LifecycleFlags::UPDATE_TARGET) {
            return;
        }
        if let Some(binding) = self.binding.upgrade() {
            binding.update_source(new_value.clone());
        }
    }
}

/// Keeps a target observer in sync with a source expression, and optionally the
/// other way round.
///
/// `bind` writes the source's value to the target immediately, and records
/// which observers the evaluation read. When any of them changes, the binding
/// queues itself in the change set; its flush evaluates the source again, drops
/// dependencies the new evaluation no longer read, and writes the target.
///
/// Observers hold their subscribers weakly, so the binding stops propagating
/// once every `PropertyBinding` handle to it is dropped. Keep one alive for as
/// long as the binding should run.
#[derive(Clone)]
pub struct PropertyBinding(Arc<BindingInner>);

impl Debug for PropertyBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyBinding")
            .field("mode", &self.0.mode)
            .field("target", &self.0.target)
            .field("bound", &self.is_bound())
            .finish_non_exhaustive()
    }
}

impl PropertyBinding {
    /// Creates an unbound binding from `source` to `target`.
    pub fn new(
        mode: BindingMode,
        source: Arc<dyn Expression>,
        target: AnyObserver,
        locator: &ObserverLocator,
    ) -> Self {
        Self(Arc::new_cyclic(|this: &Weak<BindingInner>| BindingInner {
            this: this.clone(),
            mode,
            source,
            target,
            change_set: locator.change_set().clone(),
            tracker: Mutex::new(DependencyTracker::new(
                AnySubscriber::from_weak(this),
                locator.clone(),
            )),
            target_listener: Arc::new(TargetListener {
                binding: this.clone(),
            }),
            bound: RwLock::new(false),
        }))
    }

    /// The binding's mode.
    pub fn mode(&self) -> BindingMode {
        self.0.mode
    }

    /// The observer the binding writes to.
    pub fn target(&self) -> &AnyObserver {
        &self.0.target
    }

    /// Whether the binding is bound.
    pub fn is_bound(&self) -> bool {
        *self.0.bound.read().or_poisoned()
    }

    /// The number of observers the source currently depends on.
    pub fn observer_count(&self) -> usize {
        self.0.tracker.lock().or_poisoned().observer_count()
    }

    /// Whether the source currently depends on `object[key]`.
    pub fn is_observing_property(&self, object: &Object, key: &str) -> bool {
        object.cached_observer(key).is_some_and(|observer| {
            self.0
                .tracker
                .lock()
                .or_poisoned()
                .is_observing(&super::Observed::Property(observer))
        })
    }

    /// Starts propagating values.
    ///
    /// Binding an already-bound binding does nothing. Fails with
    /// [`NotAssignable`](ObservationError::NotAssignable) if the mode writes to
    /// the source but the source cannot be assigned, and with
    /// [`DirtyCheckRequired`](ObservationError::DirtyCheckRequired) if the
    /// source reads a property that could only be dirty checked while the
    /// settings forbid it. A binding that fails is left unbound, without
    /// dependencies.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn bind(&self) -> Result<(), ObservationError> {
        let inner = &self.0;
        if inner.mode.from_view() && !inner.source.is_assignable() {
            return Err(ObservationError::NotAssignable);
        }
        {
            let mut bound = inner.bound.write().or_poisoned();
            if *bound {
                return Ok(());
            }
            *bound = true;
        }

        if inner.mode.to_view() {
            let value = if inner.mode.observes_source() {
                let value = inner.connect();
                let mut tracker = inner.tracker.lock().or_poisoned();
                if let Some(e) = tracker.take_error() {
                    tracker.unobserve(true);
                    *inner.bound.write().or_poisoned() = false;
                    return Err(e);
                }
                value
            } else {
                untrack(|| inner.source.evaluate())
            };
            inner.target.set_value(
                value,
                LifecycleFlags::FROM_BIND
                    | LifecycleFlags::UPDATE_TARGET
                    | LifecycleFlags::FROM_FLUSH,
            );
        }
        if inner.mode.from_view() {
            inner.target.subscribe(AnySubscriber::from_weak(
                &Arc::downgrade(&inner.target_listener),
            ));
        }
        Ok(())
    }

    /// Stops propagating values, and unsubscribes from every dependency and
    /// from the target.
    pub fn unbind(&self) {
        let inner = &self.0;
        {
            let mut bound = inner.bound.write().or_poisoned();
            if !*bound {
                return;
            }
            *bound = false;
        }
        inner.tracker.lock().or_poisoned().unobserve(true);
        if inner.mode.from_view() {
            inner.target.unsubscribe(&AnySubscriber::from_weak(
                &Arc::downgrade(&inner.target_listener),
            ));
        }
    }
}

impl BindingInner {
    fn is_bound(&self) -> bool {
        *self.bound.read().or_poisoned()
    }

    /// Evaluates the source as the current connect scope, then drops stale
    /// dependencies.
    ///
    /// Reads that could not be observed are left in the tracker's
    /// [`take_error`](DependencyTracker::take_error).
    fn connect(&self) -> Value {
        let Some(this) = self.this.upgrade() else {
            return untrack(|| self.source.evaluate());
        };
        self.tracker.lock().or_poisoned().next_version();
        let value = with_connectable(this, || self.source.evaluate());
        self.tracker.lock().or_poisoned().unobserve(false);
        value
    }

    fn queue(&self) {
        if !self.is_bound() || !self.mode.observes_source() {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            _ = self.change_set.add(&this);
        }
    }

    fn update_source(&self, value: Value) {
        if !self.is_bound() {
            return;
        }
        if let Err(e) = self.source.assign(value) {
            crate::log_warning(format_args!("{e}"));
        }
    }
}

impl Connectable for BindingInner {
    fn observe_property(&self, object: &Object, key: &str) {
        // kept by the tracker until connect returns
        _ = self.tracker.lock().or_poisoned().observe_property(object, key);
    }

    fn observe_collection(&self, collection: &Collection) {
        self.tracker
            .lock()
            .or_poisoned()
            .observe_collection(collection);
    }
}

impl Subscriber for BindingInner {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) {
        self.queue();
    }

    fn handle_collection_change(
        &self,
        _: &CollectionMutation,
        _: LifecycleFlags,
    ) {
        self.queue();
    }
}

impl Flushable for BindingInner {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    fn flush_changes(&self) {
        if !self.is_bound() {
            return;
        }
        let value = self.connect();
        // a flush has nobody to return the error to
        if let Some(e) = self.tracker.lock().or_poisoned().take_error() {
            crate::log_warning(format_args!("{e}"));
        }
        self.target.set_value(
            value,
            LifecycleFlags::UPDATE_TARGET | LifecycleFlags::FROM_FLUSH,
        );
    }
}
