// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-write options.

use understory_invalidation::InvalidateModes;

bitflags::bitflags! {
    /// Flags that adjust a single property write.
    ///
    /// The empty set is the normal behavior: notify before and after a real
    /// change, skip writes of equal values, and report validation changes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SetFlags: u8 {
        /// Do not raise the "changing" notification.
        const DONT_RAISE_ON_PROPERTY_CHANGING = 1 << 0;
        /// Do not raise the "changed" notification.
        const DONT_RAISE_ON_PROPERTY_CHANGED = 1 << 1;
        /// Write even if the new value equals the current one.
        const DONT_TEST_VALUES_FOR_EQUALITY = 1 << 2;
        /// Do not raise the "errors changed" notification.
        const DONT_RAISE_ON_ERRORS_CHANGED = 1 << 3;
        /// Raise "changed" even when the write is skipped as equal.
        const FORCE_RAISE_ON_PROPERTY_CHANGED = 1 << 4;
        /// Raise "errors changed" even if the messages did not change.
        const FORCE_RAISE_ON_ERRORS_CHANGED = 1 << 5;
    }
}

/// Options for one property write.
///
/// # Example
///
/// ```rust
/// use understory_invalidation::InvalidateModes;
/// use understory_property::{SetFlags, SetOptions};
///
/// let options = SetOptions::new()
///     .with_flags(SetFlags::DONT_RAISE_ON_PROPERTY_CHANGING)
///     .with_invalidate_modes(InvalidateModes::RENDER);
///
/// assert!(options.raises_changed());
/// assert!(!options.raises_changing());
/// assert_eq!(options.invalidate_modes, Some(InvalidateModes::RENDER));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Behavior flags.
    pub flags: SetFlags,
    /// Replaces the descriptor's invalidate modes for this write.
    pub invalidate_modes: Option<InvalidateModes>,
}

impl SetOptions {
    /// Default options.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            flags: SetFlags::empty(),
            invalidate_modes: None,
        }
    }

    /// Adds flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: SetFlags) -> Self {
        self.flags = self.flags.union(flags);
        self
    }

    /// Overrides the invalidate modes for this write.
    #[must_use]
    pub const fn with_invalidate_modes(mut self, modes: InvalidateModes) -> Self {
        self.invalidate_modes = Some(modes);
        self
    }

    /// Returns `true` unless the "changing" notification is suppressed.
    #[must_use]
    pub const fn raises_changing(&self) -> bool {
        !self.flags.contains(SetFlags::DONT_RAISE_ON_PROPERTY_CHANGING)
    }

    /// Returns `true` unless the "changed" notification is suppressed.
    #[must_use]
    pub const fn raises_changed(&self) -> bool {
        !self.flags.contains(SetFlags::DONT_RAISE_ON_PROPERTY_CHANGED)
    }

    /// Returns `true` if equal values should short-circuit the write.
    #[must_use]
    pub const fn tests_equality(&self) -> bool {
        !self.flags.contains(SetFlags::DONT_TEST_VALUES_FOR_EQUALITY)
    }

    /// Returns `true` if "changed" must be raised even for an equal value.
    #[must_use]
    pub const fn forces_changed(&self) -> bool {
        self.flags.contains(SetFlags::FORCE_RAISE_ON_PROPERTY_CHANGED)
    }

    /// Returns `true` if "errors changed" should be raised when the messages differ.
    #[must_use]
    pub const fn raises_errors_changed(&self) -> bool {
        !self.flags.contains(SetFlags::DONT_RAISE_ON_ERRORS_CHANGED)
    }

    /// Returns `true` if "errors changed" must be raised unconditionally.
    #[must_use]
    pub const fn forces_errors_changed(&self) -> bool {
        self.flags.contains(SetFlags::FORCE_RAISE_ON_ERRORS_CHANGED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_raise_everything_and_test_equality() {
        let options = SetOptions::default();
        assert!(options.raises_changing());
        assert!(options.raises_changed());
        assert!(options.tests_equality());
        assert!(options.raises_errors_changed());
        assert!(!options.forces_changed());
        assert!(!options.forces_errors_changed());
        assert_eq!(options.invalidate_modes, None);
    }

    #[test]
    fn flags_accumulate() {
        let options = SetOptions::new()
            .with_flags(SetFlags::DONT_TEST_VALUES_FOR_EQUALITY)
            .with_flags(SetFlags::FORCE_RAISE_ON_ERRORS_CHANGED);
        assert!(!options.tests_equality());
        assert!(options.forces_errors_changed());
    }
}
