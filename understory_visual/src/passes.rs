// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The layout pass: measure, arrange, and render what was invalidated.
//!
//! A pass snapshots the dirty modes of every node, clears them, and runs the
//! three stages in order over the tree in pre-order. Invalidations raised
//! while the pass runs (by visuals, event handlers, or anything else) are
//! recorded for the next pass.
//!
//! Measuring a node implies arranging it, and arranging it implies rendering
//! it, within the same pass.

use std::mem;

use hashbrown::HashMap;
use kurbo::{Point, Rect, Size};
use tracing::{info_span, trace_span};
use understory_invalidation::{InvalidateModes, Stage};

use crate::error::{PassError, VisualError};
use crate::events::NodeEvent;
use crate::tree::{PassState, Tree};
use crate::types::NodeId;
use crate::util::enter_span_if;
use crate::visual::{ArrangeCtx, MeasureCtx, RenderCtx};

/// Available size offering unlimited space in both directions.
pub(crate) const UNBOUNDED: Size = Size::new(f64::INFINITY, f64::INFINITY);

/// Summary of one [`Tree::run_pass`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PassReport {
    /// Index of the pass, starting at 1.
    pub pass: u64,
    /// Number of measure hooks run.
    pub measured: usize,
    /// Number of nodes arranged successfully.
    pub arranged: usize,
    /// Number of nodes rendered successfully.
    pub rendered: usize,
    /// Per-node failures, in the order they happened.
    pub errors: Vec<PassError>,
}

impl PassReport {
    /// Returns `true` if the pass did no work at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.measured == 0 && self.arranged == 0 && self.rendered == 0 && self.errors.is_empty()
    }
}

impl Tree {
    /// Returns `true` if some node is waiting for a pass.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Runs one pass over every dirty node.
    ///
    /// Failures of individual arrange or render hooks are logged, given to
    /// the error handler, and listed in the report; the rest of the pass
    /// continues. After the stages, [`NodeEvent::Arranged`] and then
    /// [`NodeEvent::Rendered`] fire for the affected nodes in pre-order.
    pub fn run_pass(&mut self) -> PassReport {
        let index = self.pass.index + 1;
        let _span = info_span!("pass", index).entered();
        self.pass = PassState {
            index,
            ..PassState::default()
        };

        for id in self.dirty.take_all() {
            let Ok(node) = self.node_mut(id) else {
                continue;
            };
            let modes = mem::take(&mut node.dirty).local().normalized();
            self.pass.modes.insert(id, modes);
        }
        let order = self.pre_order();

        {
            let _span = info_span!("measure").entered();
            for &id in &order {
                if self.pass_modes(id).needs(Stage::Measure) {
                    let available = self.constraint_for(id);
                    self.measure_node(id, available);
                }
            }
        }
        {
            let _span = info_span!("arrange").entered();
            for &id in &order {
                if !self.pass_modes(id).needs(Stage::Arrange) {
                    continue;
                }
                if let Some(rect) = self.placement_for(id) {
                    self.arrange_node(id, rect);
                }
            }
        }
        {
            let _span = info_span!("render").entered();
            for &id in &order {
                if self.pass_modes(id).needs(Stage::Render) {
                    self.render_node(id);
                }
            }
        }

        let position: HashMap<NodeId, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let by_order = |ids: &mut Vec<NodeId>| {
            ids.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
            ids.dedup();
        };
        let mut arranged = mem::take(&mut self.pass.arranged);
        let mut rendered = mem::take(&mut self.pass.rendered);
        by_order(&mut arranged);
        by_order(&mut rendered);

        let report = PassReport {
            pass: index,
            measured: self.pass.measured,
            arranged: arranged.len(),
            rendered: rendered.len(),
            errors: mem::take(&mut self.pass.errors),
        };
        tracing::debug!(
            pass = index,
            measured = report.measured,
            arranged = report.arranged,
            rendered = report.rendered,
            errors = report.errors.len(),
            "pass complete"
        );

        for id in arranged {
            if let Some(rect) = self.arranged_rect(id) {
                self.fire(id, &NodeEvent::Arranged { rect });
            }
        }
        for id in rendered {
            self.fire(id, &NodeEvent::Rendered);
        }
        self.pass.modes.clear();
        report
    }

    fn pass_modes(&self, id: NodeId) -> InvalidateModes {
        self.pass.modes.get(&id).copied().unwrap_or_default()
    }

    fn add_pass_modes(&mut self, id: NodeId, modes: InvalidateModes) {
        *self.pass.modes.entry(id).or_default() |= modes;
    }

    /// Available size for a node measured on its own, outside its parent.
    fn constraint_for(&self, id: NodeId) -> Size {
        if self.root() == Some(id) {
            return self.viewport();
        }
        match self.layout(id) {
            Some(layout) if self.parent(id).is_some() => {
                layout.last_constraint.unwrap_or(UNBOUNDED)
            }
            _ => UNBOUNDED,
        }
    }

    /// Rectangle for a node arranged on its own, outside its parent.
    ///
    /// Non-roots that were never placed by their parent are skipped.
    fn placement_for(&self, id: NodeId) -> Option<Rect> {
        let layout = self.layout(id)?;
        if self.root() == Some(id) {
            return Some(Rect::from_origin_size(Point::ZERO, self.viewport()));
        }
        if self.parent(id).is_some() {
            return layout.arranged_rect;
        }
        let origin = layout.arranged_rect.map_or(Point::ZERO, |rect| rect.origin());
        Some(Rect::from_origin_size(origin, layout.desired_size))
    }

    fn is_effectively_visible(&self, id: NodeId) -> bool {
        let is_visible = self.properties().is_visible;
        let mut current = Some(id);
        while let Some(node) = current {
            if !self.get_value(node, is_visible).unwrap_or(true) {
                return false;
            }
            current = self.parent(node);
        }
        true
    }

    pub(crate) fn measure_node(&mut self, id: NodeId, available: Size) -> Size {
        let pass = self.pass.index;
        let trace = self.config.trace.measure;
        let dirty = self.pass_modes(id).needs(Stage::Measure);
        let visible = self
            .get_value(id, self.properties().is_visible)
            .unwrap_or(true);
        let Ok(node) = self.node_mut(id) else {
            return Size::ZERO;
        };
        if node.measured_in == pass {
            return node.layout.desired_size;
        }
        if !dirty && node.layout.last_constraint == Some(available) {
            return node.layout.desired_size;
        }
        let Some(mut visual) = node.visual.take() else {
            return node.layout.desired_size;
        };

        let _span = enter_span_if(trace, || trace_span!("measure", node = %id));
        let size = if visible {
            let mut ctx = MeasureCtx { tree: self, node: id };
            sanitize(id, visual.measure(&mut ctx, available))
        } else {
            Size::ZERO
        };

        if let Ok(node) = self.node_mut(id) {
            node.visual = Some(visual);
            node.layout.desired_size = size;
            node.layout.last_constraint = Some(available);
            node.measured_in = pass;
        }
        self.pass.measured += 1;
        self.add_pass_modes(id, InvalidateModes::ARRANGE | InvalidateModes::RENDER);
        tracing::trace!(node = %id, ?available, ?size, "measured");
        size
    }

    pub(crate) fn arrange_node(&mut self, id: NodeId, rect: Rect) {
        let pass = self.pass.index;
        let trace = self.config.trace.arrange;
        let dirty = self.pass_modes(id).needs(Stage::Arrange);
        let Ok(node) = self.node_mut(id) else {
            return;
        };
        if node.arranged_in == pass || (!dirty && node.layout.arranged_rect == Some(rect)) {
            return;
        }
        let Some(mut visual) = node.visual.take() else {
            return;
        };

        let _span = enter_span_if(trace, || trace_span!("arrange", node = %id));
        let result = {
            let mut ctx = ArrangeCtx { tree: self, node: id };
            visual.arrange(&mut ctx, rect)
        };

        let Ok(node) = self.node_mut(id) else {
            return;
        };
        node.visual = Some(visual);
        node.arranged_in = pass;
        match result {
            Ok(()) => {
                node.layout.arranged_rect = Some(rect);
                self.pass.arranged.push(id);
                self.add_pass_modes(id, InvalidateModes::RENDER);
            }
            Err(error) => self.isolate(id, Stage::Arrange, error),
        }
    }

    fn render_node(&mut self, id: NodeId) {
        let pass = self.pass.index;
        let trace = self.config.trace.render;
        let visible = self.is_effectively_visible(id);
        let Ok(node) = self.node(id) else {
            return;
        };
        if node.rendered_in == pass {
            return;
        }
        let Some(rect) = node.layout.arranged_rect else {
            tracing::warn!(node = %id, "skipping render of a node that was never arranged");
            return;
        };
        self.release_node_handles(id, false);
        if !visible {
            return;
        }
        let Ok(node) = self.node_mut(id) else {
            return;
        };
        let Some(mut visual) = node.visual.take() else {
            return;
        };

        let _span = enter_span_if(trace, || trace_span!("render", node = %id));
        let result = {
            let mut ctx = RenderCtx {
                tree: self,
                node: id,
                rect,
            };
            visual.render(&mut ctx)
        };

        let Ok(node) = self.node_mut(id) else {
            return;
        };
        node.visual = Some(visual);
        node.rendered_in = pass;
        match result {
            Ok(()) => self.pass.rendered.push(id),
            Err(error) => self.isolate(id, Stage::Render, error),
        }
    }

    fn isolate(&mut self, node: NodeId, stage: Stage, error: VisualError) {
        tracing::error!(%node, %stage, %error, "visual failed, continuing the pass");
        let error = PassError { node, stage, error };
        if let Some(handler) = self.error_handler.as_mut() {
            handler(&error);
        }
        self.pass.errors.push(error);
    }
}

fn sanitize(id: NodeId, size: Size) -> Size {
    let clean = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
    let out = Size::new(clean(size.width), clean(size.height));
    if out != size {
        tracing::warn!(node = %id, ?size, "measure returned an invalid size, clamping");
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use understory_property::PropertyMetadataBuilder;

    use crate::visual::{Container, Visual};

    use super::*;

    struct Fixed {
        size: Size,
        measures: Arc<Mutex<u32>>,
    }

    impl Visual for Fixed {
        fn measure(&mut self, _: &mut MeasureCtx<'_>, _: Size) -> Size {
            *self.measures.lock().unwrap() += 1;
            self.size
        }
    }

    #[test]
    fn clean_children_return_their_cache() {
        let mut tree = Tree::default();
        let root = tree.insert(tree.types().visual, Container).unwrap();
        tree.set_root(Some(root)).unwrap();
        let measures = Arc::new(Mutex::new(0));
        let a = tree
            .insert(
                tree.types().visual,
                Fixed {
                    size: Size::new(10.0, 20.0),
                    measures: measures.clone(),
                },
            )
            .unwrap();
        let b = tree
            .insert(
                tree.types().visual,
                Fixed {
                    size: Size::new(30.0, 5.0),
                    measures: measures.clone(),
                },
            )
            .unwrap();
        tree.add_child(root, a).unwrap();
        tree.add_child(root, b).unwrap();

        let report = tree.run_pass();
        assert_eq!(report.measured, 3);
        assert_eq!(*measures.lock().unwrap(), 2);
        assert_eq!(tree.desired_size(root), Some(Size::new(30.0, 20.0)));
        assert_eq!(
            tree.arranged_rect(a),
            Some(Rect::new(0.0, 0.0, 800.0, 600.0))
        );
        assert!(!tree.has_pending_work());

        // Only `a` is dirty; the root re-measures because of PARENT_MEASURE.
        tree.invalidate(a, InvalidateModes::MEASURE | InvalidateModes::PARENT_MEASURE)
            .unwrap();
        let report = tree.run_pass();
        assert_eq!(report.measured, 2);
        assert_eq!(*measures.lock().unwrap(), 3);
    }

    #[test]
    fn hidden_nodes_measure_to_zero_and_skip_render() {
        let mut tree = Tree::default();
        let node = tree.insert(tree.types().visual, Container).unwrap();
        let is_visible = tree.properties().is_visible;
        tree.set_value(node, is_visible, false).unwrap();
        let report = tree.run_pass();
        assert_eq!(tree.desired_size(node), Some(Size::ZERO));
        assert_eq!(report.rendered, 0);
        assert_eq!(report.arranged, 1);
    }

    #[test]
    fn render_only_changes_skip_layout() {
        let mut tree = Tree::default();
        let root = tree.insert(tree.types().visual, Container).unwrap();
        let child = tree.insert(tree.types().visual, Container).unwrap();
        tree.add_child(root, child).unwrap();
        tree.run_pass();
        assert!(tree.layout(child).unwrap().is_valid());

        // A render-only invalidation of a placed child reuses its rectangle.
        let background = tree.properties().background;
        tree.set_value(child, background, Some(peniko::Color::WHITE.into()))
            .unwrap();
        let report = tree.run_pass();
        assert_eq!(report.measured, 0);
        assert_eq!(report.arranged, 0);
        assert_eq!(report.rendered, 1);
    }

    #[test]
    fn width_property_drives_measure() {
        let mut tree = Tree::default();
        let visual = tree.types().visual;
        let width = tree
            .registry_mut()
            .register(
                visual,
                "Width",
                PropertyMetadataBuilder::new(0.0_f64)
                    .invalidates(InvalidateModes::MEASURE)
                    .build(),
            )
            .unwrap();

        struct WidthBox(understory_property::Property<f64>);
        impl Visual for WidthBox {
            fn measure(&mut self, ctx: &mut MeasureCtx<'_>, _: Size) -> Size {
                Size::new(ctx.get(self.0).unwrap_or(0.0), 1.0)
            }
        }

        let node = tree.insert(visual, WidthBox(width)).unwrap();
        tree.run_pass();
        assert_eq!(tree.desired_size(node), Some(Size::new(0.0, 1.0)));
        tree.set_value(node, width, 42.0).unwrap();
        tree.run_pass();
        assert_eq!(tree.desired_size(node), Some(Size::new(42.0, 1.0)));
    }
}
