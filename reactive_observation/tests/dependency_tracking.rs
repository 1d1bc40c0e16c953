use reactive_observation::{
    binding::{
        observe_property, untrack, with_connectable, Connectable,
        DependencyTracker, Observed,
    },
    collections::{AnyCollectionObserver, Collection, ObservableArray},
    config::{
        ChangeSetConfig, DirtyCheckSettings, FlushMode, ObservationConfig,
    },
    error::ObservationError,
    flags::LifecycleFlags,
    locator::ObserverLocator,
    prelude::*,
    value::{Accessor, Object, Value},
};
use std::sync::{Arc, Mutex};

fn locator() -> ObserverLocator {
    ObserverLocator::new(
        ObservationConfig::builder()
            .change_set(
                ChangeSetConfig::builder()
                    .flush_mode(FlushMode::Manual)
                    .build(),
            )
            .build(),
    )
}

struct Noop;

impl Subscriber for Noop {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) {}
}

fn property(locator: &ObserverLocator, object: &Object, key: &str) -> Observed {
    Observed::Property(
        locator
            .get_observer(&Value::Object(object.clone()), key)
            .unwrap(),
    )
}

#[test]
fn only_observers_read_in_the_latest_version_survive() {
    let locator = locator();
    let subscriber = Arc::new(Noop);
    let object = Object::from_iter([("a", 1), ("b", 2), ("c", 3)]);
    let mut tracker =
        DependencyTracker::new(subscriber.to_any_subscriber(), locator.clone());

    tracker.next_version();
    for key in ["a", "b", "c"] {
        tracker.observe_property(&object, key).unwrap();
    }
    tracker.unobserve(false);
    assert_eq!(tracker.observer_count(), 3);

    tracker.next_version();
    tracker.observe_property(&object, "b").unwrap();
    tracker.observe_property(&object, "c").unwrap();
    tracker.unobserve(false);
    assert_eq!(tracker.observer_count(), 2);

    let a = property(&locator, &object, "a");
    let b = property(&locator, &object, "b");
    assert!(!tracker.is_observing(&a));
    assert!(tracker.is_observing(&b));
    let Observed::Property(a) = a else {
        unreachable!()
    };
    assert!(!a.has_subscriber(&subscriber.to_any_subscriber()));
}

#[test]
fn reading_twice_subscribes_once() {
    let locator = locator();
    let subscriber = Arc::new(Noop);
    let object = Object::from_iter([("a", 1)]);
    let mut tracker =
        DependencyTracker::new(subscriber.to_any_subscriber(), locator.clone());

    tracker.next_version();
    tracker.observe_property(&object, "a").unwrap();
    tracker.observe_property(&object, "a").unwrap();
    assert_eq!(tracker.observer_count(), 1);

    let Observed::Property(a) = property(&locator, &object, "a") else {
        unreachable!()
    };
    a.unsubscribe(&subscriber.to_any_subscriber());
    assert!(!a.has_subscribers());
}

#[test]
fn freed_slots_are_reused() {
    let locator = locator();
    let object = Object::from_iter([("a", 1), ("b", 2), ("c", 3), ("d", 4)]);
    let subscriber = Arc::new(Noop);
    let mut tracker =
        DependencyTracker::new(subscriber.to_any_subscriber(), locator);

    tracker.next_version();
    tracker.observe_property(&object, "a").unwrap();
    tracker.observe_property(&object, "b").unwrap();
    tracker.unobserve(false);

    tracker.next_version();
    tracker.observe_property(&object, "b").unwrap();
    tracker.unobserve(false);
    assert_eq!(tracker.observer_count(), 1);

    tracker.next_version();
    tracker.observe_property(&object, "b").unwrap();
    tracker.observe_property(&object, "c").unwrap();
    tracker.observe_property(&object, "d").unwrap();
    tracker.unobserve(false);
    assert_eq!(tracker.observer_count(), 3);
    assert!(format!("{tracker:?}").contains("version: 3"));
}

#[test]
fn unobserve_all_drops_everything() {
    let locator = locator();
    let subscriber = Arc::new(Noop);
    let object = Object::from_iter([("a", 1)]);
    let array = ObservableArray::from_iter([1, 2]);
    let mut tracker =
        DependencyTracker::new(subscriber.to_any_subscriber(), locator.clone());

    tracker.next_version();
    tracker.observe_property(&object, "a").unwrap();
    tracker.observe_collection(&Collection::Array(array.clone()));
    assert_eq!(tracker.observer_count(), 2);
    let observer = locator.array_observer(&array);
    assert!(observer.has_subscriber(&subscriber.to_any_subscriber()));
    assert!(tracker.is_observing(&Observed::Collection(
        AnyCollectionObserver::Array(observer.clone())
    )));

    tracker.unobserve(true);
    assert_eq!(tracker.observer_count(), 0);
    assert!(!observer.has_subscribers());
}

#[test]
fn primitive_reads_take_no_slot() {
    let locator = locator();
    let subscriber = Arc::new(Noop);
    let mut tracker =
        DependencyTracker::new(subscriber.to_any_subscriber(), locator.clone());
    let observer = locator.get_observer(&Value::from("abc"), "length").unwrap();
    tracker.next_version();
    tracker.add_observer(Observed::Property(observer)).unwrap();
    assert_eq!(tracker.observer_count(), 0);
}

#[derive(Default)]
struct Reads(Mutex<Vec<String>>);

impl Connectable for Reads {
    fn observe_property(&self, _: &Object, key: &str) {
        self.0.lock().unwrap().push(key.to_string());
    }

    fn observe_collection(&self, collection: &Collection) {
        self.0.lock().unwrap().push(format!("{:?}", collection.kind()));
    }
}

#[test]
fn connect_scope_sees_reads_but_not_untracked_ones() {
    let reads = Arc::new(Reads::default());
    let object = Object::from_iter([("x", 1), ("y", 2)]);
    let array = ObservableArray::from_iter([1]);

    let sum = with_connectable(reads.clone(), || {
        let x = object.get("x");
        let y = untrack(|| object.get("y"));
        _ = array.len();
        x.as_number().unwrap() + y.as_number().unwrap()
    });
    assert_eq!(sum, 3.0);
    assert_eq!(*reads.0.lock().unwrap(), vec!["x", "Array"]);

    // outside any scope, reads go nowhere
    observe_property(&object, "x");
    assert_eq!(reads.0.lock().unwrap().len(), 2);
}

#[test]
fn scopes_nest() {
    let outer = Arc::new(Reads::default());
    let inner = Arc::new(Reads::default());
    let object = Object::from_iter([("a", 1), ("b", 2), ("c", 3)]);

    with_connectable(outer.clone(), || {
        object.get("a");
        with_connectable(inner.clone(), || object.get("b"));
        object.get("c");
    });
    assert_eq!(*outer.0.lock().unwrap(), vec!["a", "c"]);
    assert_eq!(*inner.0.lock().unwrap(), vec!["b"]);
}

#[test]
fn first_failed_read_is_kept_until_the_next_version() {
    let locator = ObserverLocator::new(
        ObservationConfig::builder()
            .change_set(
                ChangeSetConfig::builder()
                    .flush_mode(FlushMode::Manual)
                    .build(),
            )
            .dirty_check(DirtyCheckSettings::builder().throw(true).build())
            .build(),
    );
    let subscriber = Arc::new(Noop);
    let object = Object::from_iter([("a", 1)]);
    for key in ["b", "c"] {
        object.define_accessor(
            key,
            Accessor::new(|_| Value::from(0)).non_configurable(),
        );
    }
    let mut tracker =
        DependencyTracker::new(subscriber.to_any_subscriber(), locator);

    tracker.next_version();
    assert!(tracker.observe_property(&object, "b").is_err());
    tracker.observe_property(&object, "a").unwrap();
    assert!(tracker.observe_property(&object, "c").is_err());
    assert_eq!(tracker.observer_count(), 1);
    assert_eq!(
        tracker.take_error(),
        Some(ObservationError::DirtyCheckRequired { key: "b".into() })
    );
    assert_eq!(tracker.take_error(), None);

    assert!(tracker.observe_property(&object, "c").is_err());
    tracker.next_version();
    assert_eq!(tracker.take_error(), None);
}
