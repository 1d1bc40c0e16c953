//! Configuration for the change set and the dirty checker.
//!
//! All settings have defaults, so `ObservationConfig::default()` is a complete
//! configuration. With the `serde` feature enabled, every type here can be
//! deserialized, with missing fields falling back to their defaults.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;
use typed_builder::TypedBuilder;

/// The default number of drain passes after which a flush gives up.
pub const DEFAULT_MAX_FLUSH_PASSES: usize = 100;

/// The default polling interval of the dirty checker.
pub const DEFAULT_DIRTY_CHECK_INTERVAL: Duration = Duration::from_millis(120);

/// Top-level configuration, shared by everything created through an
/// [`ObserverLocator`](crate::locator::ObserverLocator).
#[derive(Debug, Clone, Default, PartialEq, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ObservationConfig {
    /// How the change set schedules and bounds its flushes.
    #[builder(default)]
    pub change_set: ChangeSetConfig,
    /// How properties that cannot be intercepted are polled.
    #[builder(default)]
    pub dirty_check: DirtyCheckSettings,
}

/// Determines who drains the [`ChangeSet`](crate::change_set::ChangeSet).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FlushMode {
    /// The first item added to an empty change set spawns a task, via
    /// [`any_spawner::Executor::spawn_local`], that drains it on the next tick.
    ///
    /// The [`Executor`](any_spawner::Executor) must have been initialized.
    #[default]
    Microtask,
    /// Nothing is scheduled; the host calls
    /// [`flush_changes`](crate::change_set::ChangeSet::flush_changes) itself.
    Manual,
}

/// Configuration for a [`ChangeSet`](crate::change_set::ChangeSet).
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChangeSetConfig {
    /// Who drains the change set.
    #[builder(default)]
    pub flush_mode: FlushMode,
    /// The maximum number of passes in one drain before it fails with
    /// [`FlushLimitExceeded`](crate::error::ObservationError::FlushLimitExceeded).
    #[builder(default = DEFAULT_MAX_FLUSH_PASSES)]
    pub max_flush_passes: usize,
}

impl Default for ChangeSetConfig {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::default(),
            max_flush_passes: DEFAULT_MAX_FLUSH_PASSES,
        }
    }
}

/// Configuration for the [`DirtyChecker`](crate::dirty_checker::DirtyChecker).
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DirtyCheckSettings {
    /// Time between two checks of the tracked properties.
    #[builder(default = DEFAULT_DIRTY_CHECK_INTERVAL)]
    pub interval: Duration,
    /// Never arm the timer. Dirty-checked properties then only change when
    /// flushed explicitly.
    #[builder(default)]
    pub disabled: bool,
    /// Log a warning whenever a property falls back to dirty checking.
    #[builder(default)]
    pub warn: bool,
    /// Refuse to fall back to dirty checking, returning
    /// [`DirtyCheckRequired`](crate::error::ObservationError::DirtyCheckRequired)
    /// instead.
    #[builder(default)]
    pub throw: bool,
}

impl Default for DirtyCheckSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_DIRTY_CHECK_INTERVAL,
            disabled: false,
            warn: false,
            throw: false,
        }
    }
}
