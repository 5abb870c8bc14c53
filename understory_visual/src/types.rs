// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identifiers and per-node layout state.

use core::fmt;

use kurbo::{Rect, Size};

/// Identifier for a node in the tree.
///
/// A small, copyable handle made of a slot index and a generation counter.
///
/// - On insert, a fresh slot is allocated with generation `1`.
/// - On remove, the slot is freed; any existing `NodeId` for it is now stale.
/// - On reuse of a freed slot, its generation is incremented, producing a new,
///   distinct `NodeId`.
///
/// Stale ids never alias a different live node: every tree operation given a
/// stale id fails with [`TreeError::NodeNotFound`](crate::TreeError::NodeNotFound)
/// or returns `None`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    /// Returns the generation of this id.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.1
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.0, self.1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.0, self.1)
    }
}

/// Identifier of an event subscription or property observer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Opaque handle to a resource owned by the render backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompositionHandle(pub u64);

/// Layout results of a node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutState {
    /// The size the node asked for in its last measure.
    pub desired_size: Size,
    /// The rectangle of the last successful arrange, in root coordinates.
    ///
    /// `None` until the first successful arrange; a node without one is
    /// never rendered.
    pub arranged_rect: Option<Rect>,
    /// The available size the node was last measured with.
    pub last_constraint: Option<Size>,
}

impl LayoutState {
    /// Returns `true` once the node has been arranged successfully.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.arranged_rect.is_some()
    }
}

/// Counters kept by the invalidation propagator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InvalidationStats {
    /// Number of invalidations with non-empty modes.
    pub invalidations: u64,
    /// Number of ancestors examined while propagating parent modes.
    pub ancestor_visits: u64,
}
