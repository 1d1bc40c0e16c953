//! Picks the right observer for a property, and caches it.

use crate::{
    change_set::ChangeSet,
    collections::{
        AnyCollectionObserver, ArrayObserver, Collection, MapObserver,
        ObservableArray, ObservableMap, ObservableSet, SetObserver,
    },
    config::ObservationConfig,
    dirty_checker::{DirtyChecker, Timer},
    error::ObservationError,
    observers::{
        AnyObserver, CallbackObserver, ComputedObserver, DirtyCheckProperty,
        PrimitiveObserver, SetterObserver,
    },
    value::{Object, Property, Value},
};
use core::fmt::Debug;
use std::sync::Arc;

struct LocatorInner {
    config: ObservationConfig,
    change_set: ChangeSet,
    dirty_checker: DirtyChecker,
}

/// Creates observers for properties and collections, sharing one change set and
/// one dirty checker between them.
///
/// The observer for a property is chosen by the property's shape:
/// - a property of a primitive value gets a [`PrimitiveObserver`], which is
///   never cached;
/// - the `length` of an array and the `size` of a set or map get the
///   collection's
///   [`CollectionLengthObserver`](crate::observers::CollectionLengthObserver);
/// - a data property gets a [`CallbackObserver`] if the object defines a
///   `<key>Changed` callback, and a [`SetterObserver`] otherwise;
/// - an accessor gets a [`ComputedObserver`] if it can be intercepted, and a
///   [`DirtyCheckProperty`] if it cannot.
///
/// Object observers are cached on the object, so every caller gets the same
/// observer for the same property. Cloning the locator gives another handle to
/// the same change set and dirty checker.
#[derive(Clone)]
pub struct ObserverLocator(Arc<LocatorInner>);

impl Debug for ObserverLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverLocator")
            .field("config", &self.0.config)
            .field("change_set", &self.0.change_set)
            .field("dirty_checker", &self.0.dirty_checker)
            .finish()
    }
}

impl Default for ObserverLocator {
    /// A locator with the default configuration. See
    /// [`new`](ObserverLocator::new) for the executor it needs.
    fn default() -> Self {
        Self::new(ObservationConfig::default())
    }
}

impl ObserverLocator {
    /// Creates a locator.
    ///
    /// With [`FlushMode::Microtask`](crate::config::FlushMode::Microtask), the
    /// default, the first deferred write spawns its drain through
    /// [`any_spawner::Executor::spawn_local`], so an executor must be
    /// initialized before then:
    /// ```rust,ignore
    /// any_spawner::Executor::init_tokio()
    ///     .expect("executor should only be initialized once");
    /// ```
    /// Without one, the spawn panics in debug builds, and in release builds
    /// the change set is never drained. Hosts that drain it themselves use
    /// [`FlushMode::Manual`](crate::config::FlushMode::Manual).
    ///
    /// With the `tokio` feature, the dirty checker sleeps on tokio; otherwise
    /// it uses a [`ManualTimer`](crate::dirty_checker::ManualTimer) that nobody
    /// runs, so use [`with_timer`](ObserverLocator::with_timer) if dirty
    /// checking is needed.
    pub fn new(config: ObservationConfig) -> Self {
        #[cfg(feature = "tokio")]
        let timer = crate::dirty_checker::TokioTimer;
        #[cfg(not(feature = "tokio"))]
        let timer = crate::dirty_checker::ManualTimer::new();
        Self::with_timer(config, timer)
    }

    /// Creates a locator whose dirty checker schedules its ticks with `timer`.
    pub fn with_timer(
        config: ObservationConfig,
        timer: impl Timer + 'static,
    ) -> Self {
        let change_set = ChangeSet::new(config.change_set.clone());
        let dirty_checker =
            DirtyChecker::new(config.dirty_check.clone(), timer);
        Self(Arc::new(LocatorInner {
            config,
            change_set,
            dirty_checker,
        }))
    }

    /// The configuration this locator was created with.
    pub fn config(&self) -> &ObservationConfig {
        &self.0.config
    }

    /// The change set shared by every observer this locator creates.
    pub fn change_set(&self) -> &ChangeSet {
        &self.0.change_set
    }

    /// The dirty checker shared by every dirty-checked property.
    pub fn dirty_checker(&self) -> &DirtyChecker {
        &self.0.dirty_checker
    }

    /// The observer for `target[key]`.
    ///
    /// Fails only if the property can only be dirty checked and the settings
    /// forbid it.
    pub fn get_observer(
        &self,
        target: &Value,
        key: &str,
    ) -> Result<AnyObserver, ObservationError> {
        Ok(match target {
            Value::Object(object) => {
                return self.get_object_observer(object, key)
            }
            Value::Array(array) if key == "length" => {
                AnyObserver::CollectionLength(
                    self.array_observer(array).length_observer(),
                )
            }
            Value::Set(set) if key == "size" => AnyObserver::CollectionLength(
                self.set_observer(set).length_observer(),
            ),
            Value::Map(map) if key == "size" => AnyObserver::CollectionLength(
                self.map_observer(map).length_observer(),
            ),
            _ => AnyObserver::Primitive(PrimitiveObserver::new(
                target.clone(),
                key,
            )),
        })
    }

    /// The observer for `object[key]`, created and cached if necessary.
    pub fn get_object_observer(
        &self,
        object: &Object,
        key: &str,
    ) -> Result<AnyObserver, ObservationError> {
        if let Some(observer) = object.cached_observer(key) {
            return Ok(observer);
        }
        let observer = match object.property(key) {
            Some(Property::Accessor(accessor))
                if accessor.is_configurable() =>
            {
                AnyObserver::Computed(ComputedObserver::new(
                    object,
                    key,
                    accessor,
                    self.clone(),
                ))
            }
            Some(Property::Accessor(_)) => {
                self.allow_dirty_check(key)?;
                AnyObserver::DirtyCheck(DirtyCheckProperty::new(
                    object,
                    key,
                    self.0.dirty_checker.clone(),
                ))
            }
            _ => match object.change_callback(&format!("{key}Changed")) {
                Some(callback) => AnyObserver::Callback(CallbackObserver::new(
                    object,
                    key,
                    callback,
                    self.0.change_set.clone(),
                )),
                None => AnyObserver::Setter(SetterObserver::new(
                    object,
                    key,
                    self.0.change_set.clone(),
                )),
            },
        };
        Ok(object.cache_observer(key, observer))
    }

    fn allow_dirty_check(&self, key: &str) -> Result<(), ObservationError> {
        let settings = &self.0.config.dirty_check;
        if settings.throw {
            return Err(ObservationError::DirtyCheckRequired {
                key: key.to_owned(),
            });
        }
        if settings.warn {
            crate::log_warning(format_args!(
                "Property `{key}` cannot be intercepted; falling back to \
                 dirty checking."
            ));
        }
        Ok(())
    }

    /// The observer of an array.
    pub fn array_observer(&self, array: &ObservableArray) -> ArrayObserver {
        array.get_or_create_observer(&self.0.change_set)
    }

    /// The observer of a set.
    pub fn set_observer(&self, set: &ObservableSet) -> SetObserver {
        set.get_or_create_observer(&self.0.change_set)
    }

    /// The observer of a map.
    pub fn map_observer(&self, map: &ObservableMap) -> MapObserver {
        map.get_or_create_observer(&self.0.change_set)
    }

    /// The observer of any collection.
    pub fn collection_observer(
        &self,
        collection: &Collection,
    ) -> AnyCollectionObserver {
        match collection {
            Collection::Array(array) => {
                AnyCollectionObserver::Array(self.array_observer(array))
            }
            Collection::Set(set) => {
                AnyCollectionObserver::Set(self.set_observer(set))
            }
            Collection::Map(map) => {
                AnyCollectionObserver::Map(self.map_observer(map))
            }
        }
    }
}
