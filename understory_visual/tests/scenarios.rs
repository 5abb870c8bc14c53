// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end behavior of the visual tree.

use std::sync::{Arc, Mutex};
use std::thread;

use kurbo::{Rect, Size};
use peniko::Color;
use understory_invalidation::{InvalidateModes, MAX_REASON_DEPTH, ReasonKind, Stage};
use understory_property::{
    Property, PropertyError, PropertyMetadataBuilder, PropertyOptions, TypeKey,
};
use understory_visual::{
    CompositionHandle, Container, EventKind, Grid, GridLength, MeasureCtx, NodeEvent, NodeId,
    PassError, RenderBackend, RenderCtx, ThemeDpiProvider, Tree, TreeConfig, TreeError, Visual,
    VisualError,
};

struct BoxVisual {
    width: Property<f64>,
}

impl Visual for BoxVisual {
    fn measure(&mut self, ctx: &mut MeasureCtx<'_>, _available: Size) -> Size {
        Size::new(ctx.get(self.width).unwrap_or(0.0), 0.0)
    }
}

fn box_tree() -> (Tree, TypeKey, Property<f64>) {
    let mut tree = Tree::new(TreeConfig::default());
    let visual = tree.types().visual;
    let boxed = tree
        .registry_mut()
        .register_type("Box", Some(visual))
        .unwrap();
    let width = tree
        .registry_mut()
        .register(
            boxed,
            "Width",
            PropertyMetadataBuilder::new(0.0_f64)
                .invalidates(InvalidateModes::MEASURE)
                .build(),
        )
        .unwrap();
    (tree, boxed, width)
}

fn chain(tree: &mut Tree, depth: usize) -> Vec<NodeId> {
    let visual = tree.types().visual;
    let mut ids = vec![tree.insert(visual, Container).unwrap()];
    for _ in 1..depth {
        let child = tree.insert(visual, Container).unwrap();
        tree.add_child(*ids.last().unwrap(), child).unwrap();
        ids.push(child);
    }
    ids
}

#[derive(Default)]
struct Composition {
    next: u64,
    live: Vec<CompositionHandle>,
    brushes: usize,
    released: usize,
}

struct RecordingBackend(Arc<Mutex<Composition>>);

impl RecordingBackend {
    fn create(&mut self) -> CompositionHandle {
        let mut state = self.0.lock().unwrap();
        state.next += 1;
        let handle = CompositionHandle(state.next);
        state.live.push(handle);
        handle
    }
}

impl RenderBackend for RecordingBackend {
    fn create_layer_visual(&mut self, _node: NodeId) -> CompositionHandle {
        self.create()
    }

    fn create_geometry(&mut self, _rect: Rect, _corner_radius: f64) -> CompositionHandle {
        self.create()
    }

    fn create_brush(&mut self, _brush: &understory_visual::Brush) -> CompositionHandle {
        self.0.lock().unwrap().brushes += 1;
        self.create()
    }

    fn release(&mut self, handle: CompositionHandle) {
        let mut state = self.0.lock().unwrap();
        state.live.retain(|h| *h != handle);
        state.released += 1;
    }
}

#[test]
fn width_change_is_measured_in_one_pass() {
    let (mut tree, boxed, width) = box_tree();
    let node = tree.insert(boxed, BoxVisual { width }).unwrap();
    tree.run_pass();
    assert!(!tree.has_pending_work());

    assert!(tree.set_value(node, width, 10.0).unwrap());
    assert!(tree.needs(node, Stage::Measure));
    assert_eq!(
        tree.last_reason(node).unwrap().to_string(),
        "PropertyChanged(Box: Box.Width)"
    );

    let report = tree.run_pass();
    assert_eq!(report.measured, 1);
    assert!(!tree.needs(node, Stage::Measure));
    assert!(!tree.needs(node, Stage::Render));
    assert_eq!(tree.desired_size(node).unwrap().width, 10.0);
}

#[test]
fn equal_writes_are_idempotent() {
    let (mut tree, boxed, width) = box_tree();
    let node = tree.insert(boxed, BoxVisual { width }).unwrap();
    tree.run_pass();

    assert!(tree.set_value(node, width, 5.0).unwrap());
    tree.run_pass();
    let stats = tree.stats();
    assert!(!tree.set_value(node, width, 5.0).unwrap());
    assert_eq!(tree.stats(), stats);
    assert!(!tree.has_pending_work());
}

#[test]
fn defaults_are_read_without_being_set() {
    let (mut tree, boxed, width) = box_tree();
    let node = tree.insert(boxed, BoxVisual { width }).unwrap();
    assert_eq!(tree.get_value(node, width).unwrap(), 0.0);
    assert!(!tree.is_value_set(node, width).unwrap());
    assert_eq!(tree.try_get_value(node, width).unwrap(), None);
}

#[test]
fn reset_round_trips_to_the_default() {
    let (mut tree, boxed, width) = box_tree();
    let node = tree.insert(boxed, BoxVisual { width }).unwrap();
    tree.run_pass();

    tree.set_value(node, width, 7.0).unwrap();
    tree.run_pass();
    assert_eq!(tree.reset_value(node, width).unwrap(), Some(7.0));
    assert_eq!(tree.get_value(node, width).unwrap(), 0.0);
    assert!(!tree.is_value_set(node, width).unwrap());
    assert!(tree.needs(node, Stage::Measure));
    assert_eq!(tree.reset_value(node, width).unwrap(), None);

    tree.run_pass();
    assert_eq!(tree.desired_size(node).unwrap().width, 0.0);
}

#[test]
fn measure_implies_arrange_and_render() {
    let mut tree = Tree::default();
    let ids = chain(&mut tree, 1);
    tree.run_pass();
    tree.invalidate(ids[0], InvalidateModes::MEASURE).unwrap();
    assert!(tree.needs(ids[0], Stage::Measure));
    assert!(tree.needs(ids[0], Stage::Arrange));
    assert!(tree.needs(ids[0], Stage::Render));

    tree.run_pass();
    tree.invalidate(ids[0], InvalidateModes::ARRANGE).unwrap();
    assert!(!tree.needs(ids[0], Stage::Measure));
    assert!(tree.needs(ids[0], Stage::Render));
}

#[test]
fn upward_walk_stops_at_the_first_dirty_ancestor() {
    let mut tree = Tree::default();
    let ids = chain(&mut tree, 10);
    tree.run_pass();
    tree.reset_stats();

    tree.invalidate(ids[9], InvalidateModes::PARENT_MEASURE)
        .unwrap();
    assert_eq!(tree.stats().ancestor_visits, 9);
    assert!(tree.needs(ids[0], Stage::Measure));

    tree.reset_stats();
    tree.invalidate(ids[8], InvalidateModes::PARENT_MEASURE)
        .unwrap();
    // ids[7] already holds Measure.
    assert_eq!(tree.stats().ancestor_visits, 1);
    assert_eq!(tree.stats().invalidations, 1);
}

#[test]
fn writes_from_another_thread_are_rejected() {
    let (mut tree, boxed, _) = box_tree();
    let guarded = tree
        .registry_mut()
        .register(
            boxed,
            "Height",
            PropertyMetadataBuilder::new(1.0_f64)
                .invalidates(InvalidateModes::MEASURE)
                .options(PropertyOptions::WRITE_REQUIRES_MAIN_THREAD)
                .build(),
        )
        .unwrap();
    let node = tree.insert(boxed, Container).unwrap();
    tree.set_value(node, guarded, 2.0).unwrap();
    let tree = Arc::new(Mutex::new(tree));

    let shared = tree.clone();
    let result = thread::spawn(move || {
        let mut tree = shared.lock().unwrap();
        tree.set_value(node, guarded, 3.0)
    })
    .join()
    .unwrap();

    assert_eq!(
        result,
        Err(TreeError::Property(
            PropertyError::ThreadAffinityViolation { property: "Height" }
        ))
    );
    let tree = tree.lock().unwrap();
    assert_eq!(tree.get_value(node, guarded).unwrap(), 2.0);
}

#[test]
fn removing_a_middle_column_reindexes_the_rest() {
    let mut tree = Tree::default();
    let grid = tree.insert(tree.types().grid, Grid::new()).unwrap();
    let columns: Vec<_> = (0..3)
        .map(|_| tree.add_column(grid, GridLength::Star(1.0)).unwrap())
        .collect();
    let column_property = tree.properties().grid_column;
    let children: Vec<_> = (0..3)
        .map(|i| {
            let child = tree.insert(tree.types().visual, Container).unwrap();
            tree.add_child(grid, child).unwrap();
            tree.set_value(child, column_property, i).unwrap();
            child
        })
        .collect();
    tree.run_pass();
    assert_eq!(columns[1].cells(&tree).collect::<Vec<_>>(), [children[1]]);

    assert!(tree.remove_column(grid, 1).unwrap());
    assert!(tree.needs(grid, Stage::Measure));
    assert!(matches!(
        tree.last_reason(grid).unwrap().kind(),
        ReasonKind::CollectionChanged { .. }
    ));

    assert_eq!(columns[0].index(&tree), Some(0));
    assert_eq!(columns[2].index(&tree), Some(1));
    assert_eq!(columns[0].next(&tree), Some(columns[2]));
    assert_eq!(columns[2].previous(&tree), Some(columns[0]));
    assert_eq!(columns[2].next(&tree), None);

    // The removed column is unattached but still answers.
    assert_eq!(columns[1].index(&tree), None);
    assert_eq!(columns[1].next(&tree), None);
    assert_eq!(columns[1].cells(&tree).count(), 0);
    assert!(!tree.remove_dimension(columns[1]).unwrap());

    // Out-of-range cells fall into the last column.
    assert_eq!(
        columns[2].cells(&tree).collect::<Vec<_>>(),
        [children[1], children[2]]
    );

    tree.remove(grid).unwrap();
    assert_eq!(columns[0].index(&tree), None);
    assert_eq!(columns[0].cells(&tree).count(), 0);
}

#[test]
fn handler_invalidations_land_in_the_next_pass() {
    let mut tree = Tree::default();
    let ids = chain(&mut tree, 2);
    let other = tree.insert(tree.types().visual, Container).unwrap();
    tree.run_pass();

    tree.subscribe(ids[1], EventKind::Arranged, Some(other), move |tree, _, _| {
        tree.invalidate(other, InvalidateModes::RENDER).unwrap();
    })
    .unwrap();

    tree.invalidate(ids[1], InvalidateModes::ARRANGE).unwrap();
    let report = tree.run_pass();
    assert_eq!(report.arranged, 1);
    assert_eq!(report.rendered, 1);
    assert!(tree.needs(other, Stage::Render));
    assert!(tree.has_pending_work());

    let report = tree.run_pass();
    assert_eq!(report.rendered, 1);
    assert!(!tree.has_pending_work());
}

struct FailingRender;

impl Visual for FailingRender {
    fn render(&mut self, _ctx: &mut RenderCtx<'_>) -> Result<(), VisualError> {
        Err(VisualError::new("out of composition memory"))
    }
}

#[test]
fn render_failures_do_not_stop_siblings() {
    let mut tree = Tree::default();
    let visual = tree.types().visual;
    let root = tree.insert(visual, Container).unwrap();
    let failing = tree.insert(visual, FailingRender).unwrap();
    let sibling = tree.insert(visual, Container).unwrap();
    tree.add_child(root, failing).unwrap();
    tree.add_child(root, sibling).unwrap();

    let handled: Arc<Mutex<Vec<PassError>>> = Arc::default();
    let sink = handled.clone();
    tree.set_error_handler(Some(Box::new(move |err: &PassError| {
        sink.lock().unwrap().push(err.clone());
    })));
    let rendered = Arc::new(Mutex::new(Vec::new()));
    let log = rendered.clone();
    tree.subscribe(sibling, EventKind::Rendered, None, move |_, node, _| {
        log.lock().unwrap().push(node);
    })
    .unwrap();

    let report = tree.run_pass();
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].node, failing);
    assert_eq!(report.errors[0].stage, Stage::Render);
    assert_eq!(report.rendered, 2);
    assert_eq!(*handled.lock().unwrap(), report.errors);
    assert_eq!(*rendered.lock().unwrap(), [sibling]);
    assert!(tree.layout(failing).unwrap().is_valid());
}

#[test]
fn reason_chains_are_capped() {
    let mut tree = Tree::default();
    let ids = chain(&mut tree, MAX_REASON_DEPTH + 4);
    tree.run_pass();

    tree.invalidate(*ids.last().unwrap(), InvalidateModes::PARENT_RENDER)
        .unwrap();
    for &id in &ids[..ids.len() - 1] {
        let reason = tree.last_reason(id).unwrap();
        assert!(reason.depth() <= MAX_REASON_DEPTH);
        assert!(reason.chain().count() <= MAX_REASON_DEPTH);
    }
    let root_reason = tree.last_reason(ids[0]).unwrap();
    assert!(root_reason.root_cause().is_truncated());
    assert!(root_reason.to_string().ends_with(" -> ..."));
}

#[test]
fn composition_resources_follow_the_backend() {
    let mut tree = Tree::default();
    let ids = chain(&mut tree, 2);
    let background = tree.properties().background;
    tree.set_value(ids[1], background, Some(Color::WHITE.into()))
        .unwrap();
    tree.run_pass();

    let attached = Arc::new(Mutex::new(Vec::new()));
    for &id in &ids {
        let log = attached.clone();
        tree.subscribe(id, EventKind::AttachedToComposition, None, move |_, node, _| {
            log.lock().unwrap().push(node);
        })
        .unwrap();
    }
    let detaching = Arc::new(Mutex::new(Vec::new()));
    let log = detaching.clone();
    tree.subscribe(ids[1], EventKind::DetachingFromComposition, None, move |_, node, event| {
        assert_eq!(*event, NodeEvent::DetachingFromComposition);
        log.lock().unwrap().push(node);
    })
    .unwrap();

    let composition = Arc::new(Mutex::new(Composition::default()));
    tree.set_backend(Some(Box::new(RecordingBackend(composition.clone()))));
    assert_eq!(*attached.lock().unwrap(), ids);
    assert!(tree.needs(ids[0], Stage::Render));

    let report = tree.run_pass();
    assert_eq!(report.rendered, 2);
    {
        let state = composition.lock().unwrap();
        assert_eq!(state.brushes, 1);
        // Layer, geometry, and brush of the node with a background.
        assert_eq!(state.live.len(), 3);
    }

    // Re-rendering releases the previous geometry and brush, keeps the layer.
    tree.invalidate(ids[1], InvalidateModes::RENDER).unwrap();
    tree.run_pass();
    {
        let state = composition.lock().unwrap();
        assert_eq!(state.brushes, 2);
        assert_eq!(state.released, 2);
        assert_eq!(state.live.len(), 3);
    }

    tree.remove(ids[1]).unwrap();
    assert_eq!(*detaching.lock().unwrap(), [ids[1]]);
    assert!(composition.lock().unwrap().live.is_empty());
}

struct DirectGeometry;

impl Visual for DirectGeometry {
    fn render(&mut self, ctx: &mut RenderCtx<'_>) -> Result<(), VisualError> {
        let rect = ctx.rect();
        if let Some(backend) = ctx.backend() {
            backend.create_geometry(rect, 0.0);
        }
        Ok(())
    }
}

#[test]
fn visuals_can_reach_the_backend_directly() {
    let mut tree = Tree::default();
    let node = tree.insert(tree.types().visual, DirectGeometry).unwrap();
    // No backend yet: nothing to draw into, and nothing fails.
    assert!(tree.run_pass().errors.is_empty());

    let composition = Arc::new(Mutex::new(Composition::default()));
    tree.set_backend(Some(Box::new(RecordingBackend(composition.clone()))));
    let report = tree.run_pass();
    assert_eq!(report.rendered, 1);
    assert_eq!(composition.lock().unwrap().live.len(), 1);

    // Untracked handles stay with the visual's owner.
    tree.remove(node).unwrap();
    assert_eq!(composition.lock().unwrap().live.len(), 1);
}

#[test]
fn posted_jobs_write_properties_on_the_owner_thread() {
    let (mut tree, boxed, width) = box_tree();
    let node = tree.insert(boxed, BoxVisual { width }).unwrap();
    tree.run_pass();

    let handle = tree.dispatcher();
    thread::spawn(move || {
        handle.post(move |tree| {
            tree.set_value(node, width, 12.0).unwrap();
        });
    })
    .join()
    .unwrap();
    assert!(!tree.has_pending_work());

    assert_eq!(tree.pump(), 1);
    assert!(tree.needs(node, Stage::Measure));
    tree.run_pass();
    assert_eq!(tree.desired_size(node).unwrap().width, 12.0);
}

struct FixedTheme(u32);

impl ThemeDpiProvider for FixedTheme {
    fn dpi(&self) -> u32 {
        self.0
    }

    fn metric(&self, name: &str) -> Option<f64> {
        (name == "ScrollBarWidth").then_some(17.0)
    }
}

#[test]
fn theme_provider_drives_dpi() {
    let mut tree = Tree::default();
    let ids = chain(&mut tree, 2);
    tree.run_pass();

    tree.set_theme_provider(Some(Box::new(FixedTheme(192))));
    assert_eq!(tree.dpi(), 192);
    assert_eq!(tree.scale_factor(), 2.0);
    assert_eq!(tree.theme_metric("ScrollBarWidth"), Some(17.0));
    assert_eq!(tree.theme_metric("Unknown"), None);
    assert!(tree.needs(ids[0], Stage::Measure));
    assert!(!tree.refresh_theme_dpi());
}

#[test]
fn designated_root_fills_the_viewport() {
    let mut tree = Tree::default();
    let ids = chain(&mut tree, 2);
    tree.set_root(Some(ids[0])).unwrap();
    tree.run_pass();
    assert_eq!(
        tree.arranged_rect(ids[1]),
        Some(Rect::new(0.0, 0.0, 800.0, 600.0))
    );

    tree.set_viewport(Size::new(400.0, 300.0));
    assert!(tree.needs(ids[0], Stage::Measure));
    tree.run_pass();
    assert_eq!(
        tree.arranged_rect(ids[1]),
        Some(Rect::new(0.0, 0.0, 400.0, 300.0))
    );
}
