// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collaborators outside the tree: the composition backend and the theme.

use std::fmt;

use kurbo::Rect;

use crate::brush::Brush;
use crate::types::{CompositionHandle, NodeId};

/// The native composition layer the tree renders into.
///
/// The tree never draws pixels itself. During the render stage visuals ask
/// the backend for composition resources through
/// [`RenderCtx`](crate::RenderCtx); the tree keeps the handles per node and
/// releases them when the node re-renders, is removed, or the backend is
/// uninstalled.
pub trait RenderBackend: Send {
    /// Creates the layer visual hosting a node's content.
    fn create_layer_visual(&mut self, node: NodeId) -> CompositionHandle;

    /// Creates a rounded rectangle geometry.
    fn create_geometry(&mut self, rect: Rect, corner_radius: f64) -> CompositionHandle;

    /// Creates a brush resource.
    fn create_brush(&mut self, brush: &Brush) -> CompositionHandle;

    /// Releases a resource created by this backend.
    fn release(&mut self, handle: CompositionHandle);
}

impl fmt::Debug for dyn RenderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn RenderBackend")
    }
}

/// Source of the current DPI and named theme metrics.
pub trait ThemeDpiProvider: Send {
    /// The current DPI of the surface hosting the tree.
    fn dpi(&self) -> u32;

    /// A named theme metric, such as `"ScrollBarWidth"`.
    fn metric(&self, name: &str) -> Option<f64>;
}

impl fmt::Debug for dyn ThemeDpiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("dyn ThemeDpiProvider")
            .field("dpi", &self.dpi())
            .finish_non_exhaustive()
    }
}
