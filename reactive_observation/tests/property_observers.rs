use reactive_observation::{
    config::{ChangeSetConfig, FlushMode, ObservationConfig},
    flags::LifecycleFlags,
    locator::ObserverLocator,
    observers::AnyObserver,
    prelude::*,
    value::{Accessor, Object, Value},
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

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

#[derive(Default)]
struct Recorder(Mutex<Vec<(Value, Value, LifecycleFlags)>>);

impl Recorder {
    fn changes(&self) -> Vec<(Value, Value)> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|(new, old, _)| (new.clone(), old.clone()))
            .collect()
    }
}

impl Subscriber for Recorder {
    fn handle_change(&self, new: &Value, old: &Value, flags: LifecycleFlags) {
        self.0.lock().unwrap().push((new.clone(), old.clone(), flags));
    }
}

fn observe(
    locator: &ObserverLocator,
    object: &Object,
    key: &str,
) -> AnyObserver {
    locator
        .get_observer(&Value::Object(object.clone()), key)
        .unwrap()
}

#[test]
fn locator_picks_observer_by_property_shape() {
    let locator = locator();
    let object = Object::from_iter([("plain", 1), ("watched", 2)]);
    object.define_change_callback("watchedChanged", |_, _, _| None);
    object.define_accessor("computed", Accessor::new(|o| o.get("plain")));
    object.define_accessor(
        "sealed",
        Accessor::new(|o| o.get("plain")).non_configurable(),
    );

    assert!(matches!(
        observe(&locator, &object, "plain"),
        AnyObserver::Setter(_)
    ));
    assert!(matches!(
        observe(&locator, &object, "watched"),
        AnyObserver::Callback(_)
    ));
    assert!(matches!(
        observe(&locator, &object, "computed"),
        AnyObserver::Computed(_)
    ));
    assert!(matches!(
        observe(&locator, &object, "sealed"),
        AnyObserver::DirtyCheck(_)
    ));
    assert!(matches!(
        observe(&locator, &object, "missing"),
        AnyObserver::Setter(_)
    ));
    assert!(matches!(
        locator.get_observer(&Value::from("text"), "length").unwrap(),
        AnyObserver::Primitive(_)
    ));

    // cached per (object, key)
    assert_eq!(
        observe(&locator, &object, "plain"),
        observe(&locator, &object, "plain")
    );
}

#[test]
fn writes_are_coalesced_until_flush() {
    let locator = locator();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let object = Object::from_iter([("value", 0)]);
    object.define_change_callback("valueChanged", {
        let calls = calls.clone();
        move |new, _, _| {
            calls.lock().unwrap().push(new.clone());
            None
        }
    });
    let observer = observe(&locator, &object, "value");

    for n in [1, 2, 3] {
        object.set("value", n);
    }
    assert_eq!(observer.get_value(), Value::from(3));
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(locator.change_set().len(), 1);

    locator.change_set().flush_changes().unwrap();
    assert_eq!(*calls.lock().unwrap(), vec![Value::from(3)]);
    assert_eq!(object.get_untracked("value"), Value::from(3));

    // writes that end where they started have no effect
    object.set("value", 4);
    object.set("value", 3);
    locator.change_set().flush_changes().unwrap();
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[test]
fn setter_notifies_with_new_and_old_value() {
    let locator = locator();
    let object = Object::from_iter([("name", "Ada")]);
    let observer = observe(&locator, &object, "name");
    let recorder = Arc::new(Recorder::default());
    observer.subscribe(recorder.to_any_subscriber());
    assert!(observer.has_subscriber(&recorder.to_any_subscriber()));

    object.set("name", "Grace");
    assert!(recorder.changes().is_empty());
    locator.change_set().flush_changes().unwrap();
    assert_eq!(
        recorder.changes(),
        vec![(Value::from("Grace"), Value::from("Ada"))]
    );

    observer.unsubscribe(&recorder.to_any_subscriber());
    object.set("name", "Linus");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(recorder.changes().len(), 1);
}

#[test]
fn flush_flag_writes_synchronously() {
    let locator = locator();
    let object = Object::from_iter([("n", 1)]);
    let observer = observe(&locator, &object, "n");
    let recorder = Arc::new(Recorder::default());
    observer.subscribe(recorder.to_any_subscriber());

    observer.set_value(Value::from(2), LifecycleFlags::FROM_FLUSH);
    assert!(locator.change_set().is_empty());
    assert_eq!(recorder.changes(), vec![(Value::from(2), Value::from(1))]);
}

#[test]
fn bind_flag_suppresses_callback_and_notification() {
    let locator = locator();
    let calls = Arc::new(AtomicUsize::new(0));
    let object = Object::from_iter([("n", 1)]);
    object.define_change_callback("nChanged", {
        let calls = calls.clone();
        move |_, _, _| {
            calls.fetch_add(1, Ordering::Relaxed);
            None
        }
    });
    let observer = observe(&locator, &object, "n");
    let recorder = Arc::new(Recorder::default());
    observer.subscribe(recorder.to_any_subscriber());

    observer.set_value(
        Value::from(5),
        LifecycleFlags::FROM_BIND | LifecycleFlags::FROM_FLUSH,
    );
    assert_eq!(object.get_untracked("n"), Value::from(5));
    assert_eq!(calls.load(Ordering::Relaxed), 0);
    assert!(recorder.changes().is_empty());
}

#[test]
fn change_callback_can_coerce_the_value() {
    let locator = locator();
    let object = Object::from_iter([("age", 30)]);
    object.define_change_callback("ageChanged", |new, _, _| {
        let n = new.as_number()?;
        (n < 0.0).then(|| Value::from(0))
    });
    let observer = observe(&locator, &object, "age");
    let recorder = Arc::new(Recorder::default());
    observer.subscribe(recorder.to_any_subscriber());

    object.set("age", -5);
    locator.change_set().flush_changes().unwrap();
    assert_eq!(object.get_untracked("age"), Value::from(0));
    assert_eq!(recorder.changes(), vec![(Value::from(0), Value::from(30))]);
}

#[test]
fn primitive_observer_only_reads_string_length() {
    let locator = locator();
    let length = locator
        .get_observer(&Value::from("héllo"), "length")
        .unwrap();
    assert_eq!(length.get_value(), Value::from(5));

    let other = locator.get_observer(&Value::from(42), "length").unwrap();
    assert_eq!(other.get_value(), Value::Null);
    let recorder = Arc::new(Recorder::default());
    other.subscribe(recorder.to_any_subscriber());
    assert!(!other.has_subscribers());
}

fn person() -> Object {
    let person = Object::from_iter([("first", "Ada"), ("last", "Lovelace")]);
    person.define_accessor(
        "full",
        Accessor::new(|p| {
            Value::from(format!("{} {}", p.get("first"), p.get("last")))
        })
        .with_setter(|p, value| {
            let value = value.to_string();
            if let Some((first, last)) = value.split_once(' ') {
                p.set("first", first);
                p.set("last", last);
            }
        }),
    );
    person
}

#[test]
fn computed_collects_dependencies_on_first_subscriber() {
    let locator = locator();
    let person = person();
    let full = observe(&locator, &person, "full");
    let AnyObserver::Computed(computed) = &full else {
        panic!("expected a computed observer");
    };
    assert_eq!(full.get_value(), Value::from("Ada Lovelace"));
    assert_eq!(computed.dependency_count(), 0);

    let recorder = Arc::new(Recorder::default());
    full.subscribe(recorder.to_any_subscriber());
    assert_eq!(computed.dependency_count(), 2);

    person.set("first", "Augusta");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(
        recorder.changes(),
        vec![(
            Value::from("Augusta Lovelace"),
            Value::from("Ada Lovelace")
        )]
    );

    full.unsubscribe(&recorder.to_any_subscriber());
    assert_eq!(computed.dependency_count(), 0);
}

#[test]
fn computed_writes_through_its_setter() {
    let locator = locator();
    let person = person();
    let full = observe(&locator, &person, "full");
    let recorder = Arc::new(Recorder::default());
    full.subscribe(recorder.to_any_subscriber());

    full.set_value(Value::from("Grace Hopper"), LifecycleFlags::empty());
    locator.change_set().flush_changes().unwrap();
    assert_eq!(person.get_untracked("first"), Value::from("Grace"));
    assert_eq!(full.get_value(), Value::from("Grace Hopper"));
    // both dependencies changed, but the computed value is reported once
    assert_eq!(recorder.changes().len(), 1);
}

#[test]
fn volatile_computed_recollects_dependencies() {
    let locator = locator();
    let object = Object::from_iter([
        ("use_a", Value::from(true)),
        ("a", Value::from("a")),
        ("b", Value::from("b")),
    ]);
    object.define_accessor(
        "pick",
        Accessor::new(|o| {
            if o.get("use_a").is_truthy() {
                o.get("a")
            } else {
                o.get("b")
            }
        })
        .volatile(),
    );
    let pick = observe(&locator, &object, "pick");
    let recorder = Arc::new(Recorder::default());
    pick.subscribe(recorder.to_any_subscriber());

    let a = observe(&locator, &object, "a");
    let b = observe(&locator, &object, "b");
    assert!(a.has_subscribers());
    assert!(!b.has_subscribers());

    object.set("use_a", false);
    locator.change_set().flush_changes().unwrap();
    assert_eq!(pick.get_value(), Value::from("b"));
    assert!(!a.has_subscribers());
    assert!(b.has_subscribers());
}

#[test]
fn dispose_forgets_the_cached_observer() {
    let locator = locator();
    let object = Object::from_iter([("n", 1)]);
    let first = observe(&locator, &object, "n");
    let recorder = Arc::new(Recorder::default());
    first.subscribe(recorder.to_any_subscriber());

    first.dispose();
    assert!(!first.has_subscribers());
    let second = observe(&locator, &object, "n");
    assert_ne!(first, second);
}
