use reactive_observation::{
    config::{
        ChangeSetConfig, DirtyCheckSettings, FlushMode, ObservationConfig,
    },
    dirty_checker::ManualTimer,
    error::ObservationError,
    flags::LifecycleFlags,
    locator::ObserverLocator,
    observers::AnyObserver,
    prelude::*,
    value::{Accessor, Object, Value},
};
use std::sync::{Arc, Mutex};

fn config(dirty_check: DirtyCheckSettings) -> ObservationConfig {
    ObservationConfig::builder()
        .change_set(
            ChangeSetConfig::builder()
                .flush_mode(FlushMode::Manual)
                .build(),
        )
        .dirty_check(dirty_check)
        .build()
}

/// An object whose `reading` accessor cannot be intercepted, backed by shared
/// state the test changes behind the engine's back.
fn sensor() -> (Object, Arc<Mutex<f64>>) {
    let reading = Arc::new(Mutex::new(1.0));
    let object = Object::new();
    object.define_accessor(
        "reading",
        Accessor::new({
            let reading = reading.clone();
            move |_| Value::from(*reading.lock().unwrap())
        })
        .with_setter({
            let reading = reading.clone();
            move |_, value| {
                if let Some(n) = value.as_number() {
                    *reading.lock().unwrap() = n;
                }
            }
        })
        .non_configurable(),
    );
    (object, reading)
}

#[derive(Default)]
struct Recorder(Mutex<Vec<(Value, Value, LifecycleFlags)>>);

impl Subscriber for Recorder {
    fn handle_change(&self, new: &Value, old: &Value, flags: LifecycleFlags) {
        self.0.lock().unwrap().push((new.clone(), old.clone(), flags));
    }
}

#[test]
fn polls_only_while_subscribed() {
    let timer = ManualTimer::new();
    let locator =
        ObserverLocator::with_timer(config(Default::default()), timer.clone());
    let (object, reading) = sensor();
    let observer = locator
        .get_observer(&Value::Object(object.clone()), "reading")
        .unwrap();
    assert!(matches!(observer, AnyObserver::DirtyCheck(_)));
    assert_eq!(timer.scheduled(), 0);

    let recorder = Arc::new(Recorder::default());
    observer.subscribe(recorder.to_any_subscriber());
    assert_eq!(locator.dirty_checker().tracked_count(), 1);
    assert_eq!(timer.pending(), 1);

    // unchanged: nothing reported, timer re-armed
    timer.run_pending();
    assert!(recorder.0.lock().unwrap().is_empty());
    assert_eq!(timer.pending(), 1);

    *reading.lock().unwrap() = 2.0;
    timer.run_pending();
    assert_eq!(
        *recorder.0.lock().unwrap(),
        vec![(
            Value::from(2.0),
            Value::from(1.0),
            LifecycleFlags::FROM_DIRTY_CHECK
        )]
    );

    observer.unsubscribe(&recorder.to_any_subscriber());
    assert_eq!(locator.dirty_checker().tracked_count(), 0);
    let scheduled = timer.scheduled();
    // the tick already queued finds nothing to check and goes idle
    timer.run_pending();
    assert_eq!(timer.scheduled(), scheduled);
    assert_eq!(timer.pending(), 0);
    assert!(!locator.dirty_checker().is_armed());
}

#[test]
fn writes_go_through_the_setter_and_are_picked_up_by_the_next_check() {
    let timer = ManualTimer::new();
    let locator =
        ObserverLocator::with_timer(config(Default::default()), timer.clone());
    let (object, reading) = sensor();
    let observer = locator
        .get_observer(&Value::Object(object.clone()), "reading")
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    observer.subscribe(recorder.to_any_subscriber());

    object.set("reading", 7);
    assert_eq!(*reading.lock().unwrap(), 7.0);
    assert!(recorder.0.lock().unwrap().is_empty());

    timer.run_pending();
    assert_eq!(recorder.0.lock().unwrap().len(), 1);
}

#[test]
fn disabled_checker_never_arms() {
    let timer = ManualTimer::new();
    let settings = DirtyCheckSettings::builder().disabled(true).build();
    let locator = ObserverLocator::with_timer(config(settings), timer.clone());
    let (object, reading) = sensor();
    let observer = locator
        .get_observer(&Value::Object(object.clone()), "reading")
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    observer.subscribe(recorder.to_any_subscriber());
    assert_eq!(timer.scheduled(), 0);

    // an explicit check still works
    *reading.lock().unwrap() = 3.0;
    locator.dirty_checker().check();
    assert_eq!(recorder.0.lock().unwrap().len(), 1);
    assert_eq!(timer.scheduled(), 0);
}

#[test]
fn throw_setting_refuses_the_fallback() {
    let settings = DirtyCheckSettings::builder().throw(true).build();
    let locator =
        ObserverLocator::with_timer(config(settings), ManualTimer::new());
    let (object, _) = sensor();
    let result = locator.get_observer(&Value::Object(object), "reading");
    assert_eq!(
        result,
        Err(ObservationError::DirtyCheckRequired {
            key: "reading".into()
        })
    );
}
