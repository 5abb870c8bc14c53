// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stages and invalidate mode flags.

use core::fmt;

/// One of the three layout/render stages a visual goes through.
///
/// Stages are ordered from coarsest to finest: re-measuring a visual always
/// requires re-arranging it, and re-arranging always requires re-rendering.
///
/// # Example
///
/// ```
/// use understory_invalidation::{InvalidateModes, Stage};
///
/// assert_eq!(Stage::Measure.implied(), InvalidateModes::MEASURE_ALL);
/// assert_eq!(Stage::Render.implied(), InvalidateModes::RENDER);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Compute the desired size.
    Measure,
    /// Assign the final rectangle.
    Arrange,
    /// Produce composition commands.
    Render,
}

impl Stage {
    /// All stages in pass order.
    pub const ALL: [Self; 3] = [Self::Measure, Self::Arrange, Self::Render];

    /// Returns the index of this stage in [`Stage::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Measure => 0,
            Self::Arrange => 1,
            Self::Render => 2,
        }
    }

    /// Returns the local mode bit for this stage.
    #[must_use]
    pub const fn local(self) -> InvalidateModes {
        match self {
            Self::Measure => InvalidateModes::MEASURE,
            Self::Arrange => InvalidateModes::ARRANGE,
            Self::Render => InvalidateModes::RENDER,
        }
    }

    /// Returns the parent-propagation mode bit for this stage.
    #[must_use]
    pub const fn parent(self) -> InvalidateModes {
        match self {
            Self::Measure => InvalidateModes::PARENT_MEASURE,
            Self::Arrange => InvalidateModes::PARENT_ARRANGE,
            Self::Render => InvalidateModes::PARENT_RENDER,
        }
    }

    /// Returns this stage plus every finer stage it subsumes.
    #[must_use]
    pub const fn implied(self) -> InvalidateModes {
        match self {
            Self::Measure => InvalidateModes::MEASURE_ALL,
            Self::Arrange => InvalidateModes::ARRANGE.union(InvalidateModes::RENDER),
            Self::Render => InvalidateModes::RENDER,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Measure => "measure",
            Self::Arrange => "arrange",
            Self::Render => "render",
        })
    }
}

bitflags::bitflags! {
    /// Which stages must be recomputed after a change, locally and on the parent.
    ///
    /// The three low bits are *local* stages of the visual that changed. The
    /// three `PARENT_*` bits ask for the same stage on the parent (and, through
    /// upgrade propagation, further ancestors).
    ///
    /// The empty set means the change has no layout or render impact at all.
    ///
    /// # Example
    ///
    /// ```
    /// use understory_invalidation::InvalidateModes;
    ///
    /// let modes = InvalidateModes::MEASURE | InvalidateModes::PARENT_MEASURE;
    /// assert_eq!(modes.local(), InvalidateModes::MEASURE);
    /// assert_eq!(modes.parent_as_local(), InvalidateModes::MEASURE);
    /// assert_eq!(modes.local().normalized(), InvalidateModes::MEASURE_ALL);
    /// ```
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct InvalidateModes: u8 {
        /// Re-render this visual.
        const RENDER = 0b0000_0001;
        /// Re-arrange this visual.
        const ARRANGE = 0b0000_0010;
        /// Re-measure this visual.
        const MEASURE = 0b0000_0100;
        /// Re-render the parent.
        const PARENT_RENDER = 0b0000_1000;
        /// Re-arrange the parent.
        const PARENT_ARRANGE = 0b0001_0000;
        /// Re-measure the parent.
        const PARENT_MEASURE = 0b0010_0000;

        /// Every local stage.
        const MEASURE_ALL = Self::MEASURE.bits() | Self::ARRANGE.bits() | Self::RENDER.bits();
        /// Every parent stage.
        const PARENT_ALL =
            Self::PARENT_MEASURE.bits() | Self::PARENT_ARRANGE.bits() | Self::PARENT_RENDER.bits();
    }
}

impl InvalidateModes {
    /// No invalidation.
    pub const NONE: Self = Self::empty();

    /// Returns only the local stage bits.
    #[must_use]
    pub const fn local(self) -> Self {
        self.intersection(Self::MEASURE_ALL)
    }

    /// Returns only the parent-propagation bits.
    #[must_use]
    pub const fn parent(self) -> Self {
        self.intersection(Self::PARENT_ALL)
    }

    /// Converts the parent-propagation bits into the local bits the parent receives.
    #[must_use]
    pub const fn parent_as_local(self) -> Self {
        Self::from_bits_truncate(self.parent().bits() >> 3)
    }

    /// Converts local bits into the matching parent-propagation bits.
    #[must_use]
    pub const fn local_as_parent(self) -> Self {
        Self::from_bits_truncate(self.local().bits() << 3)
    }

    /// Expands the local bits so that coarser stages include the finer ones.
    ///
    /// Measure implies Arrange and Render; Arrange implies Render. Parent bits
    /// are preserved untouched.
    #[must_use]
    pub const fn normalized(self) -> Self {
        let mut out = self;
        if self.contains(Self::MEASURE) {
            out = out.union(Self::ARRANGE);
        }
        if out.contains(Self::ARRANGE) {
            out = out.union(Self::RENDER);
        }
        out
    }

    /// Returns `true` if the given stage is requested locally.
    ///
    /// This honors subsumption: a visual that needs Measure also reports
    /// needing Arrange and Render, even if those bits are individually clear.
    #[must_use]
    pub const fn needs(self, stage: Stage) -> bool {
        self.normalized().contains(stage.local())
    }

    /// Returns the local stages requested, in pass order, after normalization.
    pub fn stages(self) -> impl Iterator<Item = Stage> {
        let normalized = self.normalized();
        Stage::ALL
            .into_iter()
            .filter(move |stage| normalized.contains(stage.local()))
    }
}

impl From<Stage> for InvalidateModes {
    fn from(stage: Stage) -> Self {
        stage.local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn local_and_parent_split() {
        let modes =
            InvalidateModes::RENDER | InvalidateModes::PARENT_ARRANGE | InvalidateModes::MEASURE;
        assert_eq!(
            modes.local(),
            InvalidateModes::RENDER | InvalidateModes::MEASURE
        );
        assert_eq!(modes.parent(), InvalidateModes::PARENT_ARRANGE);
        assert_eq!(modes.parent_as_local(), InvalidateModes::ARRANGE);
    }

    #[test]
    fn local_parent_conversion_is_symmetric() {
        for stage in Stage::ALL {
            assert_eq!(stage.local().local_as_parent(), stage.parent());
            assert_eq!(stage.parent().parent_as_local(), stage.local());
        }
    }

    #[test]
    fn measure_subsumes_finer_stages() {
        let normalized = InvalidateModes::MEASURE.normalized();
        assert_eq!(normalized, InvalidateModes::MEASURE_ALL);

        assert!(InvalidateModes::MEASURE.needs(Stage::Arrange));
        assert!(InvalidateModes::MEASURE.needs(Stage::Render));
        assert!(InvalidateModes::ARRANGE.needs(Stage::Render));
        assert!(!InvalidateModes::ARRANGE.needs(Stage::Measure));
        assert!(!InvalidateModes::RENDER.needs(Stage::Arrange));
    }

    #[test]
    fn normalized_keeps_parent_bits() {
        let modes = InvalidateModes::ARRANGE | InvalidateModes::PARENT_MEASURE;
        assert_eq!(
            modes.normalized(),
            InvalidateModes::ARRANGE | InvalidateModes::RENDER | InvalidateModes::PARENT_MEASURE
        );
    }

    #[test]
    fn stages_in_pass_order() {
        let stages: Vec<_> = InvalidateModes::MEASURE.stages().collect();
        assert_eq!(stages, [Stage::Measure, Stage::Arrange, Stage::Render]);

        let none: Vec<_> = InvalidateModes::PARENT_RENDER.stages().collect();
        assert!(none.is_empty());
    }

    #[test]
    fn none_is_empty() {
        assert!(InvalidateModes::NONE.is_empty());
        assert!(InvalidateModes::NONE.normalized().is_empty());
        assert!(InvalidateModes::NONE.parent_as_local().is_empty());
    }
}
