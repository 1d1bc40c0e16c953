//! Change observation and propagation for object properties and collections.
//!
//! This crate is the substrate underneath a data-binding layer. It lets
//! arbitrary properties of an [`Object`](value::Object) and arbitrary
//! [collections](collections) be watched for mutation, batches the resulting
//! notifications, and keeps consumers in sync with as little redundant work as
//! possible. It is built from a handful of primitives, composed leaf to root:
//! 1. **Subscriber collections**: a compact multi-subscriber notification list
//!    used by every observer ([`subscribers`]).
//! 2. **The change set**: a scheduler that collects dirty observers and flushes
//!    them together ([`change_set`]).
//! 3. **Property observers**: per-property reactive cells, including computed
//!    properties whose dependencies are discovered automatically
//!    ([`observers`]).
//! 4. **Collection observers**: per-collection cells that track structural
//!    diffs in an [`IndexMap`](collections::IndexMap) ([`collections`]).
//! 5. **Dirty checking**: a polling fallback for properties that cannot be
//!    intercepted ([`dirty_checker`]).
//! 6. **Dependency tracking**: versioned observer slots that let a binding
//!    know, after each evaluation, exactly which observers it still depends on
//!    ([`binding`]).
//!
//! ```rust
//! use reactive_observation::{
//!     binding::{AccessMember, BindingMode, PropertyBinding},
//!     config::{ChangeSetConfig, FlushMode, ObservationConfig},
//!     locator::ObserverLocator,
//!     prelude::*,
//!     value::{Object, Value},
//! };
//! use std::sync::Arc;
//!
//! let config = ObservationConfig::builder()
//!     .change_set(
//!         ChangeSetConfig::builder()
//!             .flush_mode(FlushMode::Manual)
//!             .build(),
//!     )
//!     .build();
//! let locator = ObserverLocator::new(config);
//!
//! let person = Object::from_iter([("name", Value::from("Ada"))]);
//! let view = Object::new();
//! let target = locator
//!     .get_observer(&Value::Object(view.clone()), "text")
//!     .unwrap();
//!
//! let binding = PropertyBinding::new(
//!     BindingMode::ToView,
//!     Arc::new(AccessMember::new(person.clone(), "name")),
//!     target,
//!     &locator,
//! );
//! binding.bind().unwrap();
//! assert_eq!(view.get("text"), Value::from("Ada"));
//!
//! // writes are deferred until the change set is flushed
//! person.set("name", Value::from("Grace"));
//! assert_eq!(view.get("text"), Value::from("Ada"));
//! locator.change_set().flush_changes().unwrap();
//! assert_eq!(view.get("text"), Value::from("Grace"));
//! ```
//!
//! ## Design Principles and Assumptions
//! - **Writes are cheap, effects are not.** Writes to an observer only update
//!   its current value; the effectful part (storing the value and notifying
//!   subscribers) happens once per flush, however many times the value changed
//!   in between.
//! - **Single-threaded, cooperative scheduling.** Handles are `Send + Sync` so
//!   they can live in any async task, but the engine assumes one logical thread
//!   of mutation. Suspension happens only at the change set's flush boundary.
//! - **No isolation from misbehaving subscribers.** A panicking subscriber
//!   aborts the current notification pass and the current drain. The change set
//!   does guard against update cycles that never settle, by bounding the number
//!   of passes per drain.

#![deny(missing_docs)]
#![forbid(unsafe_code)]

use std::fmt::Arguments;

pub mod binding;
pub mod change_set;
pub mod collections;
pub mod config;
pub mod dirty_checker;
pub mod error;
pub mod flags;
pub mod locator;
pub mod observers;
pub mod subscribers;
pub mod value;

/// Reexports frequently-used traits.
pub mod prelude {
    pub use crate::{
        binding::{Connectable, Expression},
        change_set::{Flushable, ToAnyFlushable},
        observers::PropertyObserver,
        subscribers::{
            BatchedSubscriber, Subscriber, ToAnyBatchedSubscriber,
            ToAnySubscriber,
        },
    };
}

#[doc(hidden)]
pub fn log_warning(text: Arguments) {
    #[cfg(feature = "tracing")]
    {
        tracing::warn!(text);
    }
    #[cfg(not(feature = "tracing"))]
    {
        eprintln!("{}", text);
    }
}
