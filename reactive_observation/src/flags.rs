//! Flags that describe the context of a write or a change notification.

use bitflags::bitflags;

bitflags! {
    /// Describes why a value is being written, or why a change is being
    /// reported.
    ///
    /// Flags are passed along with every `set_value` and remembered by the
    /// observer until its next flush, so subscribers see the context of the
    /// write that caused the change.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LifecycleFlags: u32 {
        /// Perform the write and notify synchronously instead of deferring to
        /// the change set.
        const FROM_FLUSH = 1 << 0;
        /// The write initializes a binding; observers store the value without
        /// notifying.
        const FROM_BIND = 1 << 1;
        /// The write happens while a binding is being torn down.
        const FROM_UNBIND = 1 << 2;
        /// The write flows from a binding's source to its target.
        const UPDATE_TARGET = 1 << 3;
        /// The write flows from a binding's target back to its source.
        const UPDATE_SOURCE = 1 << 4;
        /// The change was reported by a collection mutator.
        const IS_COLLECTION_MUTATION = 1 << 5;
        /// The change was detected by the dirty checker.
        const FROM_DIRTY_CHECK = 1 << 6;
    }
}
