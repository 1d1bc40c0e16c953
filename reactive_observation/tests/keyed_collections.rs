use reactive_observation::{
    collections::{
        CollectionMutation, IndexMap, MutationKind, ObservableMap,
        ObservableSet, NEW_ITEM,
    },
    config::{ChangeSetConfig, FlushMode, ObservationConfig},
    flags::LifecycleFlags,
    locator::ObserverLocator,
    prelude::*,
    value::Value,
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

#[derive(Default)]
struct Mutations(Mutex<Vec<MutationKind>>);

impl Subscriber for Mutations {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) {}

    fn handle_collection_change(
        &self,
        mutation: &CollectionMutation,
        _: LifecycleFlags,
    ) {
        self.0.lock().unwrap().push(mutation.kind);
    }
}

#[derive(Default)]
struct Batches(Mutex<Vec<IndexMap>>);

impl BatchedSubscriber for Batches {
    fn handle_batched_change(&self, index_map: &IndexMap) {
        self.0.lock().unwrap().push(index_map.clone());
    }
}

#[test]
fn set_reports_only_real_mutations() {
    let locator = locator();
    let set = ObservableSet::from_iter(["a", "b"]);
    let observer = locator.set_observer(&set);
    let mutations = Arc::new(Mutations::default());
    observer.subscribe(mutations.to_any_subscriber());

    assert!(set.add("c"));
    assert!(!set.add("a"));
    assert!(set.delete(&Value::from("a")));
    assert!(!set.delete(&Value::from("zzz")));
    set.clear();
    set.clear();

    assert_eq!(
        *mutations.0.lock().unwrap(),
        vec![MutationKind::Add, MutationKind::Delete, MutationKind::Clear]
    );
    assert!(set.is_empty());
}

#[test]
fn set_index_map_uses_insertion_positions() {
    let locator = locator();
    let set = ObservableSet::from_iter([1, 2, 3]);
    let observer = locator.set_observer(&set);
    let batches = Arc::new(Batches::default());
    observer.subscribe_batched(batches.to_any_batched_subscriber());

    set.delete(&Value::from(2));
    set.add(4);
    assert_eq!(observer.index_map().len(), set.len());
    locator.change_set().flush_changes().unwrap();

    let batches = batches.0.lock().unwrap();
    assert_eq!(batches[0].as_slice(), &[0, 2, NEW_ITEM]);
    assert_eq!(batches[0].deleted_indices(), &[1]);
    assert_eq!(
        set.to_vec(),
        vec![Value::from(1), Value::from(3), Value::from(4)]
    );
}

#[test]
fn set_treats_nan_as_one_value() {
    let set = ObservableSet::new();
    assert!(set.add(f64::NAN));
    assert!(!set.add(f64::NAN));
    assert!(set.has(&Value::from(f64::NAN)));
    assert!(set.add(-0.0));
    assert!(!set.add(0.0));
    assert_eq!(set.len(), 2);
}

#[test]
fn map_overwrite_with_new_value_is_a_replacement() {
    let locator = locator();
    let map = ObservableMap::from_iter([("a", 1), ("b", 2)]);
    let observer = locator.map_observer(&map);
    let mutations = Arc::new(Mutations::default());
    observer.subscribe(mutations.to_any_subscriber());

    // same value: not a mutation
    map.set("a", 1);
    assert!(mutations.0.lock().unwrap().is_empty());

    map.set("b", 20);
    assert_eq!(observer.index_map().as_slice(), &[0, NEW_ITEM]);
    assert_eq!(observer.index_map().deleted_indices(), &[1]);
    assert_eq!(observer.index_map().deleted_items(), &[Value::from(2)]);

    map.set("c", 3);
    assert_eq!(observer.index_map().as_slice(), &[0, NEW_ITEM, NEW_ITEM]);
    assert_eq!(map.get(&Value::from("b")), Some(Value::from(20)));
    assert_eq!(
        *mutations.0.lock().unwrap(),
        vec![MutationKind::Set, MutationKind::Set]
    );
}

#[test]
fn map_delete_and_clear() {
    let locator = locator();
    let map = ObservableMap::from_iter([("a", 1), ("b", 2), ("c", 3)]);
    let observer = locator.map_observer(&map);

    assert!(map.delete(&Value::from("b")));
    assert!(!map.delete(&Value::from("b")));
    assert_eq!(observer.index_map().as_slice(), &[0, 2]);

    map.clear();
    let index_map = observer.index_map();
    assert!(index_map.is_empty());
    assert_eq!(index_map.deleted_indices(), &[1, 0, 2]);
    assert!(map.is_empty());
    assert_eq!(map.keys(), Vec::<Value>::new());
}

#[test]
fn size_observer_is_read_only() {
    let locator = locator();
    let set = ObservableSet::from_iter(["x"]);
    let size = locator.get_observer(&Value::Set(set.clone()), "size").unwrap();
    assert_eq!(size.get_value(), Value::from(1));

    size.set_value(Value::from(0), LifecycleFlags::empty());
    assert_eq!(set.len(), 1);

    let map = ObservableMap::from_iter([(1, "one"), (2, "two")]);
    let size = locator
        .get_observer(&Value::Map(map.clone()), "size")
        .unwrap();
    assert_eq!(size.get_value(), Value::from(2));

    // the observer does not keep its collection alive
    drop(map);
    assert_eq!(size.get_value(), Value::from(0));
}
