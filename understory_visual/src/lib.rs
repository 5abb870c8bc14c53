// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_visual --heading-base-level=0

//! Understory Visual: a visual tree with dependency properties and minimal
//! re-layout.
//!
//! Every node of a [`Tree`] has a type, a [`Visual`] behavior, and a sparse
//! store of property values. Each property declares which stages a change to
//! it invalidates, on the node and on its parent. Writing a property marks
//! exactly those stages dirty, climbing the ancestors only as far as needed;
//! [`Tree::run_pass`] then measures, arranges, and renders only what is
//! dirty.
//!
//! - **Properties**: registered in the tree's
//!   [`PropertyRegistry`](understory_property::PropertyRegistry), read with
//!   [`Tree::get_value`], written with [`Tree::set_value`] or
//!   [`Tree::set_value_with`]. Observers see "changing", "changed", and
//!   "errors changed" notifications.
//! - **Invalidation**: [`Tree::invalidate`] and friends; every dirty node
//!   remembers the [`InvalidateReason`](understory_invalidation::InvalidateReason)
//!   chain that reached it.
//! - **Passes**: measure, arrange, render, then [`NodeEvent::Arranged`] and
//!   [`NodeEvent::Rendered`]. Failing visuals are isolated and reported in
//!   the [`PassReport`].
//! - **Composition**: a [`RenderBackend`] receives layer, geometry, and
//!   brush requests; a [`ThemeDpiProvider`] supplies the DPI.
//! - **Threading**: a tree belongs to the thread that created it. Other
//!   threads post work through a [`DispatcherHandle`].
//!
//! ## Example
//!
//! ```rust
//! use kurbo::Size;
//! use understory_invalidation::{InvalidateModes, Stage};
//! use understory_property::PropertyMetadataBuilder;
//! use understory_visual::{MeasureCtx, Tree, TreeConfig, Visual};
//!
//! let mut tree = Tree::new(TreeConfig::default());
//! let visual = tree.types().visual;
//! let boxed = tree.registry_mut().register_type("Box", Some(visual)).unwrap();
//! let width = tree
//!     .registry_mut()
//!     .register(
//!         boxed,
//!         "Width",
//!         PropertyMetadataBuilder::new(0.0_f64)
//!             .invalidates(InvalidateModes::MEASURE)
//!             .build(),
//!     )
//!     .unwrap();
//!
//! struct BoxVisual(understory_property::Property<f64>);
//!
//! impl Visual for BoxVisual {
//!     fn measure(&mut self, ctx: &mut MeasureCtx<'_>, _available: Size) -> Size {
//!         Size::new(ctx.get(self.0).unwrap_or(0.0), 0.0)
//!     }
//! }
//!
//! let node = tree.insert(boxed, BoxVisual(width)).unwrap();
//! tree.run_pass();
//!
//! assert!(tree.set_value(node, width, 10.0).unwrap());
//! assert!(tree.needs(node, Stage::Measure));
//!
//! tree.run_pass();
//! assert!(!tree.needs(node, Stage::Measure));
//! assert_eq!(tree.desired_size(node).unwrap().width, 10.0);
//! ```
//!
//! ## Tracing
//!
//! Passes log through `tracing`. Per-node spans are off by default; set
//! `UNDERSTORY_TRACE_PASSES` (for example `measure,render` or `all`) and
//! build the tree with [`TreeConfig::from_env`] to enable them.

mod backend;
mod brush;
mod config;
mod dispatcher;
mod error;
mod events;
mod grid;
mod input;
mod passes;
mod properties;
mod propagate;
mod standard;
mod tree;
mod types;
mod util;
mod visual;

pub use backend::{RenderBackend, ThemeDpiProvider};
pub use brush::{Brush, GradientStop};
pub use config::{DEFAULT_DPI, PassTracing, TreeConfig};
pub use dispatcher::{DispatcherHandle, Job, Timer};
pub use error::{PassError, TreeError, VisualError};
pub use events::{EventHandler, EventKind, NodeEvent, PropertyNotification, PropertyObserver};
pub use grid::{DimensionId, Grid, GridAxis, GridDimension, GridLength};
pub use input::{InputEvent, Modifiers, PointerButton};
pub use passes::PassReport;
pub use standard::{StandardProperties, StandardTypes};
pub use tree::{ErrorHandler, Tree};
pub use types::{CompositionHandle, InvalidationStats, LayoutState, NodeId, SubscriptionId};
pub use visual::{ArrangeCtx, AsAny, Container, EventCtx, MeasureCtx, RenderCtx, Visual};
