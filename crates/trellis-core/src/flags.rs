#![forbid(unsafe_code)]

//! Flag sets shared across the engine.

use bitflags::bitflags;

bitflags! {
    /// Context passed down through bind/attach/flush calls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct LifecycleFlags: u32 {
        const NONE = 0;
        /// Part of application start.
        const FROM_START = 1 << 0;
        /// Part of application stop; forces full unmounting.
        const FROM_STOP = 1 << 1;
        const FROM_BIND = 1 << 2;
        const FROM_UNBIND = 1 << 3;
        /// Running inside a flush-queue drain.
        const FROM_FLUSH = 1 << 4;
        /// A change travelling from source to target.
        const UPDATE_TARGET_INSTANCE = 1 << 5;
        /// A change travelling from target to source.
        const UPDATE_SOURCE_EXPRESSION = 1 << 6;
        /// Surface errors instead of propagating `undefined`.
        const MUST_EVALUATE = 1 << 7;
        /// An ancestor already queued its own unmount.
        const PARENT_UNMOUNT_QUEUED = 1 << 8;
        /// Notification originates from a collection mutation.
        const IS_COLLECTION_MUTATION = 1 << 9;
        /// The view is being returned to a cache.
        const ALLOW_CACHE = 1 << 10;
    }
}

bitflags! {
    /// Direction(s) in which a binding propagates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct BindingMode: u8 {
        const ONE_TIME = 1;
        const TO_VIEW = 1 << 1;
        const FROM_VIEW = 1 << 2;
        const TWO_WAY = Self::TO_VIEW.bits() | Self::FROM_VIEW.bits();
        /// Resolved against the target's declared default.
        const DEFAULT = 1 << 3;
    }
}

impl BindingMode {
    /// Evaluates source into target (one-time or to-view).
    #[must_use]
    pub fn updates_target(self) -> bool {
        self.intersects(Self::ONE_TIME | Self::TO_VIEW)
    }

    /// Observes the source after the initial update.
    #[must_use]
    pub fn observes_source(self) -> bool {
        self.contains(Self::TO_VIEW)
    }

    /// Observes the target and writes back to the source.
    #[must_use]
    pub fn updates_source(self) -> bool {
        self.contains(Self::FROM_VIEW)
    }

    /// Parse the attribute-command spelling (`one-time`, `two-way`, ...).
    #[must_use]
    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            "one-time" | "oneTime" => Some(Self::ONE_TIME),
            "to-view" | "toView" => Some(Self::TO_VIEW),
            "from-view" | "fromView" => Some(Self::FROM_VIEW),
            "two-way" | "twoWay" => Some(Self::TWO_WAY),
            "bind" | "default" => Some(Self::DEFAULT),
            _ => None,
        }
    }
}

impl Default for BindingMode {
    fn default() -> Self {
        Self::TO_VIEW
    }
}

bitflags! {
    /// Lifecycle state of a binding, view or component.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct State: u16 {
        const NONE = 0;
        const IS_BINDING = 1 << 0;
        const IS_BOUND = 1 << 1;
        const IS_ATTACHING = 1 << 2;
        const IS_ATTACHED = 1 << 3;
        const IS_MOUNTED = 1 << 4;
        const IS_DETACHING = 1 << 5;
        const IS_UNBINDING = 1 << 6;
        const IS_CACHED = 1 << 7;
        const IS_CONTAINERLESS = 1 << 8;
        const IS_PREPARED = 1 << 9;
        const IS_HYDRATED = 1 << 10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_way_is_both_directions() {
        assert!(BindingMode::TWO_WAY.observes_source());
        assert!(BindingMode::TWO_WAY.updates_source());
        assert!(BindingMode::TWO_WAY.updates_target());
    }

    #[test]
    fn one_time_never_observes() {
        assert!(BindingMode::ONE_TIME.updates_target());
        assert!(!BindingMode::ONE_TIME.observes_source());
        assert!(!BindingMode::ONE_TIME.updates_source());
    }

    #[test]
    fn from_view_never_updates_target() {
        assert!(!BindingMode::FROM_VIEW.updates_target());
        assert!(BindingMode::FROM_VIEW.updates_source());
    }

    #[test]
    fn command_spellings() {
        assert_eq!(BindingMode::from_command("two-way"), Some(BindingMode::TWO_WAY));
        assert_eq!(BindingMode::from_command("oneTime"), Some(BindingMode::ONE_TIME));
        assert_eq!(BindingMode::from_command("nope"), None);
    }
}
