// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Brushes as plain values.

use std::hash::{Hash, Hasher};

use kurbo::Point;
use peniko::Color;
use smallvec::SmallVec;

/// A color stop of a gradient brush.
#[derive(Clone, Copy, Debug)]
pub struct GradientStop {
    /// Position along the gradient, from `0.0` to `1.0`.
    pub offset: f32,
    /// Color at this position.
    pub color: Color,
}

impl GradientStop {
    /// Creates a stop.
    #[must_use]
    pub const fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

/// How to fill an area.
///
/// Brushes compare and hash by value, so setting a property to an identical
/// brush is skipped like any other equal write. Floating point components are
/// compared bitwise.
#[derive(Clone, Debug)]
pub enum Brush {
    /// A single color.
    Solid(Color),
    /// A gradient between two points.
    LinearGradient {
        /// Start of the gradient line.
        start: Point,
        /// End of the gradient line.
        end: Point,
        /// Color stops, ordered by offset.
        stops: SmallVec<[GradientStop; 4]>,
    },
}

impl Brush {
    /// Returns a linear gradient brush.
    #[must_use]
    pub fn linear_gradient(
        start: Point,
        end: Point,
        stops: impl IntoIterator<Item = GradientStop>,
    ) -> Self {
        Self::LinearGradient {
            start,
            end,
            stops: stops.into_iter().collect(),
        }
    }

    /// Returns `true` if nothing painted with this brush is visible.
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        match self {
            Self::Solid(color) => color.components[3] == 0.0,
            Self::LinearGradient { stops, .. } => {
                stops.iter().all(|stop| stop.color.components[3] == 0.0)
            }
        }
    }
}

impl From<Color> for Brush {
    fn from(color: Color) -> Self {
        Self::Solid(color)
    }
}

fn color_bits(color: &Color) -> [u32; 4] {
    color.components.map(f32::to_bits)
}

fn point_bits(point: Point) -> [u64; 2] {
    [point.x.to_bits(), point.y.to_bits()]
}

impl PartialEq for GradientStop {
    fn eq(&self, other: &Self) -> bool {
        self.offset.to_bits() == other.offset.to_bits()
            && color_bits(&self.color) == color_bits(&other.color)
    }
}

impl Eq for GradientStop {}

impl Hash for GradientStop {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.offset.to_bits().hash(state);
        color_bits(&self.color).hash(state);
    }
}

impl PartialEq for Brush {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Solid(a), Self::Solid(b)) => color_bits(a) == color_bits(b),
            (
                Self::LinearGradient {
                    start: s1,
                    end: e1,
                    stops: stops1,
                },
                Self::LinearGradient {
                    start: s2,
                    end: e2,
                    stops: stops2,
                },
            ) => point_bits(*s1) == point_bits(*s2) && point_bits(*e1) == point_bits(*e2) && stops1 == stops2,
            _ => false,
        }
    }
}

impl Eq for Brush {}

impl Hash for Brush {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::Solid(color) => color_bits(color).hash(state),
            Self::LinearGradient { start, end, stops } => {
                point_bits(*start).hash(state);
                point_bits(*end).hash(state);
                stops.as_slice().hash(state);
            }
        }
    }
}
