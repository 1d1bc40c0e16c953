//! Dependency tracking, and the property binding that consumes it.
//!
//! Reads are discovered through a thread-local connect scope. While a
//! [`Connectable`] is connecting (inside [`with_connectable`]), every
//! [`Object::get`](crate::value::Object::get) and every collection read reports
//! itself to it. Bindings and computed observers route those reports into a
//! [`DependencyTracker`], which subscribes to exactly the observers the latest
//! evaluation read.
//!
//! ```rust
//! use reactive_observation::{
//!     binding::{BindingMode, PropertyBinding},
//!     config::{ChangeSetConfig, FlushMode, ObservationConfig},
//!     locator::ObserverLocator,
//!     value::{Object, Value},
//! };
//! use std::sync::Arc;
//!
//! let locator = ObserverLocator::new(
//!     ObservationConfig::builder()
//!         .change_set(
//!             ChangeSetConfig::builder()
//!                 .flush_mode(FlushMode::Manual)
//!                 .build(),
//!         )
//!         .build(),
//! );
//! let state = Object::from_iter([
//!     ("cond", Value::from(true)),
//!     ("a", Value::from(1)),
//!     ("b", Value::from(2)),
//! ]);
//! let view = Object::new();
//!
//! let source = {
//!     let state = state.clone();
//!     move || {
//!         if state.get("cond").is_truthy() {
//!             state.get("a")
//!         } else {
//!             state.get("b")
//!         }
//!     }
//! };
//! let binding = PropertyBinding::new(
//!     BindingMode::ToView,
//!     Arc::new(source),
//!     locator.get_observer(&Value::Object(view.clone()), "out").unwrap(),
//!     &locator,
//! );
//! binding.bind().unwrap();
//! assert!(binding.is_observing_property(&state, "a"));
//! assert!(!binding.is_observing_property(&state, "b"));
//!
//! state.set("cond", false);
//! locator.change_set().flush_changes().unwrap();
//! assert_eq!(view.get("out"), Value::from(2));
//! assert!(!binding.is_observing_property(&state, "a"));
//! assert!(binding.is_observing_property(&state, "b"));
//! ```

mod connectable;
mod property_binding;
mod tracker;

pub(crate) use connectable::track_collection;
pub use connectable::{
    observe_property, untrack, with_connectable, Connectable,
};
pub use property_binding::*;
pub use tracker::*;
