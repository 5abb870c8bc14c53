// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The [`Visual`] trait and the contexts its hooks receive.

use std::any::Any;
use std::fmt;

use kurbo::{Rect, Size};
use understory_property::{Property, PropertyValue, SetOptions};

use crate::backend::RenderBackend;
use crate::brush::Brush;
use crate::error::{TreeError, VisualError};
use crate::input::InputEvent;
use crate::standard::StandardProperties;
use crate::tree::Tree;
use crate::types::{CompositionHandle, NodeId};
use crate::util::debug_panic;

/// Upcasting to [`Any`], implemented for every `'static` type.
///
/// Call these through a `&dyn Visual`, never through a `Box<dyn Visual>`:
/// the box is itself `Any`.
pub trait AsAny: Any {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// Returns `self` as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The behavior of a node.
///
/// The tree owns all state that the invalidation protocol cares about
/// (properties, dirty modes, layout results); a `Visual` only computes. While
/// one of its hooks runs, the visual is taken out of its node, and the context
/// gives access to the rest of the tree.
///
/// Every hook has a default:
///
/// - [`measure`](Visual::measure) measures every child with the available
///   size and returns the largest child size.
/// - [`arrange`](Visual::arrange) gives every child the full rectangle.
/// - [`render`](Visual::render) draws the `Background` property.
/// - [`on_input`](Visual::on_input) does not handle anything.
pub trait Visual: AsAny + Send {
    /// Computes the desired size of this node for the available size.
    ///
    /// Either dimension of `available` may be infinite.
    fn measure(&mut self, ctx: &mut MeasureCtx<'_>, available: Size) -> Size {
        let mut size = Size::ZERO;
        for child in ctx.children() {
            let child_size = ctx.measure_child(child, available);
            size.width = size.width.max(child_size.width);
            size.height = size.height.max(child_size.height);
        }
        size
    }

    /// Places the children of this node inside `rect`.
    fn arrange(&mut self, ctx: &mut ArrangeCtx<'_>, rect: Rect) -> Result<(), VisualError> {
        for child in ctx.children() {
            ctx.arrange_child(child, rect);
        }
        Ok(())
    }

    /// Produces composition resources for this node.
    fn render(&mut self, ctx: &mut RenderCtx<'_>) -> Result<(), VisualError> {
        ctx.draw_background();
        Ok(())
    }

    /// Handles an input event routed to this node.
    ///
    /// Returns `true` to stop the event from bubbling to the parent.
    fn on_input(&mut self, ctx: &mut EventCtx<'_>, event: &InputEvent) -> bool {
        let _ = (ctx, event);
        false
    }
}

/// A visual with only the default behavior.
///
/// Useful for roots, plain containers, and nodes whose look comes entirely
/// from properties.
#[derive(Clone, Copy, Debug, Default)]
pub struct Container;

impl Visual for Container {}

/// Context of [`Visual::measure`].
pub struct MeasureCtx<'a> {
    pub(crate) tree: &'a mut Tree,
    pub(crate) node: NodeId,
}

impl MeasureCtx<'_> {
    /// The node being measured.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The children of the node being measured.
    #[must_use]
    pub fn children(&self) -> Vec<NodeId> {
        self.tree.children(self.node).to_vec()
    }

    /// Measures a child and returns its desired size.
    ///
    /// A child is measured at most once per pass; later calls return the
    /// first result. A clean child offered the same size as last time
    /// returns its cached size without running its hook.
    pub fn measure_child(&mut self, child: NodeId, available: Size) -> Size {
        if self.tree.parent(child) != Some(self.node) {
            debug_panic!("{} asked to measure {child}, which is not its child", self.node);
            return Size::ZERO;
        }
        self.tree.measure_node(child, available)
    }

    /// Reads a property of the node being measured.
    pub fn get<T: PropertyValue>(&self, property: Property<T>) -> Result<T, TreeError> {
        self.tree.get_value(self.node, property)
    }

    /// Reads a property of another node, typically a child.
    pub fn get_of<T: PropertyValue>(
        &self,
        node: NodeId,
        property: Property<T>,
    ) -> Result<T, TreeError> {
        self.tree.get_value(node, property)
    }

    /// The built-in properties.
    #[must_use]
    pub fn properties(&self) -> &StandardProperties {
        self.tree.properties()
    }

    /// Current DPI of the tree.
    #[must_use]
    pub fn dpi(&self) -> u32 {
        self.tree.dpi()
    }

    /// A named metric from the theme provider.
    #[must_use]
    pub fn theme_metric(&self, name: &str) -> Option<f64> {
        self.tree.theme_metric(name)
    }
}

impl fmt::Debug for MeasureCtx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasureCtx")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

/// Context of [`Visual::arrange`].
pub struct ArrangeCtx<'a> {
    pub(crate) tree: &'a mut Tree,
    pub(crate) node: NodeId,
}

impl ArrangeCtx<'_> {
    /// The node being arranged.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The children of the node being arranged.
    #[must_use]
    pub fn children(&self) -> Vec<NodeId> {
        self.tree.children(self.node).to_vec()
    }

    /// The desired size a child reported in its last measure.
    #[must_use]
    pub fn desired_size(&self, child: NodeId) -> Size {
        self.tree.desired_size(child).unwrap_or(Size::ZERO)
    }

    /// Places a child.
    ///
    /// Failures of the child are recorded in the pass report and do not fail
    /// this node.
    pub fn arrange_child(&mut self, child: NodeId, rect: Rect) {
        if self.tree.parent(child) != Some(self.node) {
            debug_panic!("{} asked to arrange {child}, which is not its child", self.node);
            return;
        }
        self.tree.arrange_node(child, rect);
    }

    /// Reads a property of the node being arranged.
    pub fn get<T: PropertyValue>(&self, property: Property<T>) -> Result<T, TreeError> {
        self.tree.get_value(self.node, property)
    }

    /// Reads a property of another node, typically a child.
    pub fn get_of<T: PropertyValue>(
        &self,
        node: NodeId,
        property: Property<T>,
    ) -> Result<T, TreeError> {
        self.tree.get_value(node, property)
    }

    /// The built-in properties.
    #[must_use]
    pub fn properties(&self) -> &StandardProperties {
        self.tree.properties()
    }
}

impl fmt::Debug for ArrangeCtx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrangeCtx")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

/// Context of [`Visual::render`].
///
/// Resources created through the context are owned by the node: they are
/// released before the node renders again and when it is removed. The layer
/// visual is created once and kept.
pub struct RenderCtx<'a> {
    pub(crate) tree: &'a mut Tree,
    pub(crate) node: NodeId,
    pub(crate) rect: Rect,
}

impl RenderCtx<'_> {
    /// The node being rendered.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The arranged rectangle of the node.
    #[must_use]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Returns `true` if a render backend is installed.
    #[must_use]
    pub fn has_backend(&self) -> bool {
        self.tree.backend.is_some()
    }

    /// Direct access to the backend, if installed.
    ///
    /// Handles created this way are not tracked by the node.
    pub fn backend(&mut self) -> Option<&mut dyn RenderBackend> {
        self.tree
            .backend
            .as_deref_mut()
            .map(|backend| backend as &mut dyn RenderBackend)
    }

    /// Returns the layer visual of the node, creating it on first use.
    pub fn layer(&mut self) -> Option<CompositionHandle> {
        let node = self.tree.node(self.node).ok()?;
        if let Some(layer) = node.layer {
            return Some(layer);
        }
        let layer = self.tree.backend.as_deref_mut()?.create_layer_visual(self.node);
        if let Ok(node) = self.tree.node_mut(self.node) {
            node.layer = Some(layer);
        }
        Some(layer)
    }

    /// Creates a geometry owned by the node.
    pub fn create_geometry(&mut self, rect: Rect, corner_radius: f64) -> Option<CompositionHandle> {
        let handle = self
            .tree
            .backend
            .as_deref_mut()?
            .create_geometry(rect, corner_radius);
        self.track(handle);
        Some(handle)
    }

    /// Creates a brush owned by the node.
    pub fn create_brush(&mut self, brush: &Brush) -> Option<CompositionHandle> {
        let handle = self.tree.backend.as_deref_mut()?.create_brush(brush);
        self.track(handle);
        Some(handle)
    }

    /// Draws the `Background` property over the arranged rectangle.
    ///
    /// Does nothing without a backend, without a background, or when the
    /// background or the node is fully transparent.
    pub fn draw_background(&mut self) {
        let props = self.tree.properties().clone();
        let Ok(Some(background)) = self.tree.get_value(self.node, props.background) else {
            return;
        };
        let opacity = self.tree.get_value(self.node, props.opacity).unwrap_or(1.0);
        if background.is_transparent() || opacity <= 0.0 || !self.has_backend() {
            return;
        }
        let size = self.rect.size();
        self.layer();
        self.create_geometry(Rect::from_origin_size(kurbo::Point::ZERO, size), 0.0);
        self.create_brush(&background);
    }

    /// Reads a property of the node being rendered.
    pub fn get<T: PropertyValue>(&self, property: Property<T>) -> Result<T, TreeError> {
        self.tree.get_value(self.node, property)
    }

    /// The built-in properties.
    #[must_use]
    pub fn properties(&self) -> &StandardProperties {
        self.tree.properties()
    }

    fn track(&mut self, handle: CompositionHandle) {
        if let Ok(node) = self.tree.node_mut(self.node) {
            node.render_handles.push(handle);
        }
    }
}

impl fmt::Debug for RenderCtx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCtx")
            .field("node", &self.node)
            .field("rect", &self.rect)
            .finish_non_exhaustive()
    }
}

/// Context of [`Visual::on_input`].
///
/// Input handlers may change properties and the tree structure; such changes
/// are picked up by the next pass.
pub struct EventCtx<'a> {
    pub(crate) tree: &'a mut Tree,
    pub(crate) node: NodeId,
    pub(crate) target: NodeId,
}

impl EventCtx<'_> {
    /// The node handling the event.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The node the event was delivered to.
    #[must_use]
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Mutable access to the tree.
    ///
    /// The visual of the handling node is not in the tree while its handler
    /// runs, so [`Tree::visual`] returns `None` for it.
    pub fn tree(&mut self) -> &mut Tree {
        self.tree
    }

    /// Reads a property of the handling node.
    pub fn get<T: PropertyValue>(&self, property: Property<T>) -> Result<T, TreeError> {
        self.tree.get_value(self.node, property)
    }

    /// Writes a property of the handling node.
    pub fn set<T: PropertyValue>(
        &mut self,
        property: Property<T>,
        value: T,
    ) -> Result<bool, TreeError> {
        self.tree
            .set_value_with(self.node, property, value, SetOptions::default())
    }
}

impl fmt::Debug for EventCtx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCtx")
            .field("node", &self.node)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
