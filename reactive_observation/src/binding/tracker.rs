use crate::{
    collections::{AnyCollectionObserver, Collection},
    error::ObservationError,
    locator::ObserverLocator,
    observers::{AnyObserver, PropertyObserver},
    subscribers::AnySubscriber,
    value::{Object, Value},
};
use core::fmt::Debug;

/// Something a [`DependencyTracker`] can subscribe to.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    /// A property observer.
    Property(AnyObserver),
    /// A collection observer, subscribed to for immediate mutations.
    Collection(AnyCollectionObserver),
}

impl Observed {
    fn subscribe(
        &self,
        subscriber: AnySubscriber,
    ) -> Result<(), ObservationError> {
        match self {
            Observed::Property(AnyObserver::Computed(o)) => {
                o.try_subscribe(subscriber)
            }
            Observed::Property(o) => {
                o.subscribe(subscriber);
                Ok(())
            }
            Observed::Collection(o) => {
                o.subscribe(subscriber);
                Ok(())
            }
        }
    }

    fn unsubscribe(&self, subscriber: &AnySubscriber) {
        match self {
            Observed::Property(o) => o.unsubscribe(subscriber),
            Observed::Collection(o) => o.unsubscribe(subscriber),
        }
    }
}

#[derive(Debug)]
struct ObserverSlot {
    observer: Observed,
    version: u64,
}

/// Keeps one subscriber subscribed to exactly the observers its last evaluation
/// read.
///
/// Before every evaluation, the owner calls
/// [`next_version`](DependencyTracker::next_version). Each read during the
/// evaluation calls [`add_observer`](DependencyTracker::add_observer), which
/// finds the observer's slot, or subscribes and claims the first free one, and
/// stamps the slot with the current version. Afterwards,
/// [`unobserve(false)`](DependencyTracker::unobserve) unsubscribes from every
/// observer whose slot was not stamped, that is, every dependency the
/// evaluation no longer read. Maintenance is proportional to the number of
/// occupied slots; the dependency set is never rebuilt from scratch.
///
/// The slot pool grows as needed, and freed slots are reused first.
///
/// A read that cannot be observed, such as an accessor that would need dirty
/// checking when the settings forbid it, fails the call that made it. The first
/// such failure of an evaluation is also kept until
/// [`take_error`](DependencyTracker::take_error), for owners whose reads arrive
/// through a [`Connectable`](super::Connectable) and cannot return it.
pub struct DependencyTracker {
    subscriber: AnySubscriber,
    locator: ObserverLocator,
    version: u64,
    slots: Vec<Option<ObserverSlot>>,
    error: Option<ObservationError>,
}

impl Debug for DependencyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyTracker")
            .field("subscriber", &self.subscriber)
            .field("version", &self.version)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

impl DependencyTracker {
    /// Creates a tracker that subscribes `subscriber` to the observers found by
    /// `locator`.
    pub fn new(subscriber: AnySubscriber, locator: ObserverLocator) -> Self {
        Self {
            subscriber,
            locator,
            version: 0,
            slots: Vec::new(),
            error: None,
        }
    }

    /// The current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Starts a new evaluation.
    pub fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.error = None;
        self.version
    }

    /// Takes the first error raised since the last
    /// [`next_version`](DependencyTracker::next_version).
    pub fn take_error(&mut self) -> Option<ObservationError> {
        self.error.take()
    }

    fn record<T>(
        &mut self,
        result: Result<T, ObservationError>,
    ) -> Result<T, ObservationError> {
        if let Err(e) = &result {
            self.error.get_or_insert_with(|| e.clone());
        }
        result
    }

    /// Depends on `object[key]`.
    pub fn observe_property(
        &mut self,
        object: &Object,
        key: &str,
    ) -> Result<(), ObservationError> {
        let observer = self
            .locator
            .get_observer(&Value::Object(object.clone()), key);
        let observer = self.record(observer)?;
        self.add_observer(Observed::Property(observer))
    }

    /// Depends on the structure of a collection.
    pub fn observe_collection(&mut self, collection: &Collection) {
        let observer = self.locator.collection_observer(collection);
        // collection observers always subscribe
        _ = self.add_observer(Observed::Collection(observer));
    }

    /// Depends on an observer, subscribing to it if it is not yet in a slot.
    ///
    /// Primitive observers never change, so they are not given a slot. If
    /// subscribing fails, the observer still takes its slot, so that
    /// [`unobserve`](DependencyTracker::unobserve) releases it.
    pub fn add_observer(
        &mut self,
        observer: Observed,
    ) -> Result<(), ObservationError> {
        if matches!(&observer, Observed::Property(o) if o.is_primitive()) {
            return Ok(());
        }
        let version = self.version;
        if let Some(slot) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|slot| slot.observer == observer)
        {
            slot.version = version;
            return Ok(());
        }

        let subscribed = observer.subscribe(self.subscriber.clone());
        let slot = Some(ObserverSlot { observer, version });
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(free) => *free = slot,
            None => self.slots.push(slot),
        }
        self.record(subscribed)
    }

    /// Unsubscribes from stale observers, or from all of them.
    ///
    /// With `all == false`, only observers not read since the last
    /// [`next_version`](DependencyTracker::next_version) are dropped.
    pub fn unobserve(&mut self, all: bool) {
        let version = self.version;
        for slot in &mut self.slots {
            let stale = slot
                .as_ref()
                .is_some_and(|slot| all || slot.version != version);
            if stale {
                if let Some(slot) = slot.take() {
                    slot.observer.unsubscribe(&self.subscriber);
                }
            }
        }
        if all {
            self.slots.clear();
        }
    }

    /// The number of observers currently depended on.
    pub fn observer_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Whether the tracker currently depends on `observer`.
    pub fn is_observing(&self, observer: &Observed) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|slot| &slot.observer == observer)
    }
}
