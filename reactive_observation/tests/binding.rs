use reactive_observation::{
    binding::{AccessMember, BindingMode, PropertyBinding},
    collections::ObservableArray,
    config::{
        ChangeSetConfig, DirtyCheckSettings, FlushMode, ObservationConfig,
    },
    error::ObservationError,
    locator::ObserverLocator,
    prelude::*,
    value::{Accessor, Object, Value},
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
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

fn bind(
    locator: &ObserverLocator,
    mode: BindingMode,
    source: &Object,
    key: &str,
    view: &Object,
) -> PropertyBinding {
    let binding = PropertyBinding::new(
        mode,
        Arc::new(AccessMember::new(source.clone(), key)),
        locator
            .get_observer(&Value::Object(view.clone()), "value")
            .unwrap(),
        locator,
    );
    binding.bind().unwrap();
    binding
}

#[test]
fn to_view_follows_the_source() {
    let locator = locator();
    let model = Object::from_iter([("name", "Ada")]);
    let view = Object::new();
    let binding = bind(&locator, BindingMode::ToView, &model, "name", &view);
    assert!(binding.is_bound());
    assert_eq!(view.get("value"), Value::from("Ada"));
    assert_eq!(binding.observer_count(), 1);

    model.set("name", "Grace");
    model.set("name", "Linus");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(view.get("value"), Value::from("Linus"));

    // changes in the view stay in the view
    view.set("value", "edited");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(model.get("name"), Value::from("Linus"));
}

#[test]
fn one_time_writes_once_and_observes_nothing() {
    let locator = locator();
    let model = Object::from_iter([("name", "Ada")]);
    let view = Object::new();
    let binding = bind(&locator, BindingMode::OneTime, &model, "name", &view);
    assert_eq!(view.get("value"), Value::from("Ada"));
    assert_eq!(binding.observer_count(), 0);

    model.set("name", "Grace");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(view.get("value"), Value::from("Ada"));
}

#[test]
fn from_view_writes_back_to_the_source() {
    let locator = locator();
    let model = Object::from_iter([("name", "Ada")]);
    let view = Object::from_iter([("value", "")]);
    let _binding =
        bind(&locator, BindingMode::FromView, &model, "name", &view);
    // the source is not written to the view
    assert_eq!(view.get("value"), Value::from(""));

    view.set("value", "Grace");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(model.get("name"), Value::from("Grace"));

    model.set("name", "Linus");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(view.get("value"), Value::from("Grace"));
}

#[test]
fn two_way_settles_without_echoing() {
    let locator = locator();
    let writes = Arc::new(AtomicUsize::new(0));
    let model = Object::from_iter([("name", "Ada")]);
    model.define_change_callback("nameChanged", {
        let writes = writes.clone();
        move |_, _, _| {
            writes.fetch_add(1, Ordering::Relaxed);
            None
        }
    });
    let view = Object::new();
    let _binding = bind(&locator, BindingMode::TwoWay, &model, "name", &view);
    assert_eq!(view.get("value"), Value::from("Ada"));

    view.set("value", "Grace");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(model.get("name"), Value::from("Grace"));
    assert_eq!(view.get("value"), Value::from("Grace"));
    assert_eq!(writes.load(Ordering::Relaxed), 1);
    assert!(locator.change_set().is_empty());

    model.set("name", "Linus");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(view.get("value"), Value::from("Linus"));
    assert_eq!(writes.load(Ordering::Relaxed), 2);
}

#[test]
fn from_view_needs_an_assignable_source() {
    let locator = locator();
    let model = Object::from_iter([("name", "Ada")]);
    let view = Object::new();
    let source = {
        let model = model.clone();
        move || model.get("name")
    };
    let binding = PropertyBinding::new(
        BindingMode::TwoWay,
        Arc::new(source),
        locator
            .get_observer(&Value::Object(view.clone()), "value")
            .unwrap(),
        &locator,
    );
    assert_eq!(binding.bind(), Err(ObservationError::NotAssignable));
    assert!(!binding.is_bound());
}

#[test]
fn unbind_stops_propagation() {
    let locator = locator();
    let model = Object::from_iter([("name", "Ada")]);
    let view = Object::new();
    let binding = bind(&locator, BindingMode::TwoWay, &model, "name", &view);

    binding.unbind();
    assert!(!binding.is_bound());
    assert_eq!(binding.observer_count(), 0);
    assert!(!binding.target().has_subscribers());

    model.set("name", "Grace");
    view.set("value", "Linus");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(view.get("value"), Value::from("Linus"));
    assert_eq!(model.get("name"), Value::from("Grace"));

    // bind again picks up the current source
    binding.bind().unwrap();
    assert_eq!(view.get("value"), Value::from("Grace"));
}

#[test]
fn binding_to_a_collection_follows_its_mutations() {
    let locator = locator();
    let items = ObservableArray::from_iter(["a", "b"]);
    let view = Object::new();
    let source = {
        let items = items.clone();
        move || Value::from(items.len())
    };
    let binding = PropertyBinding::new(
        BindingMode::ToView,
        Arc::new(source),
        locator
            .get_observer(&Value::Object(view.clone()), "count")
            .unwrap(),
        &locator,
    );
    binding.bind().unwrap();
    assert_eq!(view.get("count"), Value::from(2));
    assert_eq!(binding.observer_count(), 1);

    items.push(["c"]);
    items.push(["d"]);
    assert_eq!(view.get("count"), Value::from(2));
    locator.change_set().flush_changes().unwrap();
    assert_eq!(view.get("count"), Value::from(4));
}

#[test]
fn binding_through_a_computed_property() {
    let locator = locator();
    let person = Object::from_iter([("first", "Ada"), ("last", "Lovelace")]);
    person.define_accessor(
        "full",
        Accessor::new(|p| {
            Value::from(format!("{} {}", p.get("first"), p.get("last")))
        }),
    );
    let view = Object::new();
    let binding = bind(&locator, BindingMode::ToView, &person, "full", &view);
    assert_eq!(view.get("value"), Value::from("Ada Lovelace"));
    // only the computed property, not what it reads
    assert_eq!(binding.observer_count(), 1);

    person.set("last", "Byron");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(view.get("value"), Value::from("Ada Byron"));
}

#[test]
fn conditional_reads_drop_the_branch_not_taken() {
    let locator = locator();
    let model = Object::new();
    model.set("cond", true);
    let a = Object::from_iter([("x", "from a")]);
    let b = Object::from_iter([("y", "from b")]);
    let view = Object::new();
    let source = {
        let (model, a, b) = (model.clone(), a.clone(), b.clone());
        move || {
            if model.get("cond").is_truthy() {
                a.get("x")
            } else {
                b.get("y")
            }
        }
    };
    let binding = PropertyBinding::new(
        BindingMode::ToView,
        Arc::new(source),
        locator
            .get_observer(&Value::Object(view.clone()), "value")
            .unwrap(),
        &locator,
    );
    binding.bind().unwrap();
    assert_eq!(view.get("value"), Value::from("from a"));
    assert!(binding.is_observing_property(&a, "x"));
    assert!(!binding.is_observing_property(&b, "y"));

    model.set("cond", false);
    locator.change_set().flush_changes().unwrap();
    assert_eq!(view.get("value"), Value::from("from b"));
    assert!(!binding.is_observing_property(&a, "x"));
    assert!(binding.is_observing_property(&b, "y"));
    assert_eq!(binding.observer_count(), 2);

    // the dropped branch no longer reaches the view
    a.set("x", "changed");
    locator.change_set().flush_changes().unwrap();
    assert_eq!(view.get("value"), Value::from("from b"));
}

fn strict_locator() -> ObserverLocator {
    ObserverLocator::new(
        ObservationConfig::builder()
            .change_set(
                ChangeSetConfig::builder()
                    .flush_mode(FlushMode::Manual)
                    .build(),
            )
            .dirty_check(DirtyCheckSettings::builder().throw(true).build())
            .build(),
    )
}

/// An object whose `reading` accessor cannot be intercepted.
fn sensor() -> Object {
    let object = Object::new();
    object.define_accessor(
        "reading",
        Accessor::new(|_| Value::from(20.5)).non_configurable(),
    );
    object
}

#[test]
fn bind_fails_when_a_read_needs_forbidden_dirty_checking() {
    let locator = strict_locator();
    let sensor = sensor();
    let view = Object::new();
    let binding = PropertyBinding::new(
        BindingMode::ToView,
        Arc::new(AccessMember::new(sensor.clone(), "reading")),
        locator
            .get_observer(&Value::Object(view.clone()), "value")
            .unwrap(),
        &locator,
    );
    assert_eq!(
        binding.bind(),
        Err(ObservationError::DirtyCheckRequired {
            key: "reading".into()
        })
    );
    assert!(!binding.is_bound());
    assert_eq!(binding.observer_count(), 0);
    assert_eq!(view.get("value"), Value::Null);
}

#[test]
fn bind_fails_when_a_computed_dependency_needs_forbidden_dirty_checking() {
    let locator = strict_locator();
    let sensor = sensor();
    let room = Object::from_iter([("name", "lab")]);
    room.define_accessor("label", {
        let sensor = sensor.clone();
        Accessor::new(move |room| {
            let reading = sensor.get("reading");
            Value::from(format!("{}: {reading}", room.get("name")))
        })
    });
    let view = Object::new();
    let binding = PropertyBinding::new(
        BindingMode::ToView,
        Arc::new(AccessMember::new(room.clone(), "label")),
        locator
            .get_observer(&Value::Object(view.clone()), "value")
            .unwrap(),
        &locator,
    );
    assert_eq!(
        binding.bind(),
        Err(ObservationError::DirtyCheckRequired {
            key: "reading".into()
        })
    );
    assert!(!binding.is_bound());
    assert_eq!(binding.observer_count(), 0);
    let label = locator
        .get_observer(&Value::Object(room.clone()), "label")
        .unwrap();
    assert!(!label.has_subscribers());
    let name = locator
        .get_observer(&Value::Object(room), "name")
        .unwrap();
    assert!(!name.has_subscribers());
}
