// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The visual tree: node storage and structure.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use hashbrown::HashMap;
use kurbo::{Rect, Size};
use smallvec::SmallVec;
use understory_invalidation::{
    CollectionAction, DirtySet, InvalidateModes, InvalidateReason, Stage,
};
use understory_property::{PropertyRegistry, PropertyStore, TypeKey};

use crate::backend::{RenderBackend, ThemeDpiProvider};
use crate::config::TreeConfig;
use crate::dispatcher::DispatcherQueue;
use crate::error::{PassError, TreeError};
use crate::events::{EventHub, NodeEvent};
use crate::standard::{StandardProperties, StandardTypes};
use crate::types::{CompositionHandle, InvalidationStats, LayoutState, NodeId};
use crate::visual::Visual;

/// Callback receiving per-node failures isolated during a pass.
pub type ErrorHandler = Box<dyn FnMut(&PassError) + Send>;

pub(crate) struct Node {
    pub(crate) ty: TypeKey,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) store: PropertyStore<NodeId>,
    /// `None` while one of the visual's hooks runs.
    pub(crate) visual: Option<Box<dyn Visual>>,
    pub(crate) layout: LayoutState,
    /// Local and parent modes waiting for the next pass.
    pub(crate) dirty: InvalidateModes,
    pub(crate) last_reason: Option<Arc<InvalidateReason>>,
    pub(crate) layer: Option<CompositionHandle>,
    pub(crate) render_handles: SmallVec<[CompositionHandle; 2]>,
    // Index of the pass that last ran each stage on this node; 0 is never.
    pub(crate) measured_in: u64,
    pub(crate) arranged_in: u64,
    pub(crate) rendered_in: u64,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Scratch state of the pass being run.
#[derive(Default)]
pub(crate) struct PassState {
    pub(crate) index: u64,
    /// Modes each node entered the pass with, plus stages added during it.
    pub(crate) modes: HashMap<NodeId, InvalidateModes>,
    pub(crate) measured: usize,
    pub(crate) arranged: Vec<NodeId>,
    pub(crate) rendered: Vec<NodeId>,
    pub(crate) errors: Vec<PassError>,
}

/// A tree of visuals with dependency properties.
///
/// The tree owns the property registry, the nodes, and their property
/// stores. Writing a property invalidates the node (and, through parent
/// modes, its ancestors); [`Tree::run_pass`] then measures, arranges, and
/// renders exactly what was invalidated.
///
/// A tree is bound to the thread that created it. Property writes whose
/// descriptor requires it are rejected on other threads; work from other
/// threads goes through a [`DispatcherHandle`](crate::DispatcherHandle).
pub struct Tree {
    registry: PropertyRegistry,
    types: StandardTypes,
    props: StandardProperties,
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    root: Option<NodeId>,
    pub(crate) dirty: DirtySet<NodeId>,
    pub(crate) stats: InvalidationStats,
    pub(crate) owner_thread: ThreadId,
    pub(crate) config: TreeConfig,
    pub(crate) dpi: u32,
    pub(crate) backend: Option<Box<dyn RenderBackend>>,
    pub(crate) theme: Option<Box<dyn ThemeDpiProvider>>,
    pub(crate) events: EventHub,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) dispatcher: DispatcherQueue,
    pub(crate) pass: PassState,
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.len())
            .field("root", &self.root)
            .field("dpi", &self.dpi)
            .field("stats", &self.stats)
            .field("backend", &self.backend.is_some())
            .field("owner_thread", &self.owner_thread)
            .finish_non_exhaustive()
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

impl Tree {
    /// Creates an empty tree with its own property registry.
    ///
    /// The calling thread becomes the owner thread.
    #[must_use]
    pub fn new(config: TreeConfig) -> Self {
        let Ok(tree) = Self::with_registry(config, PropertyRegistry::new()) else {
            unreachable!("registering the standard types into an empty registry cannot clash");
        };
        tree
    }

    /// Creates an empty tree on top of an existing registry.
    ///
    /// Fails if the registry already declares one of the standard types.
    pub fn with_registry(
        config: TreeConfig,
        mut registry: PropertyRegistry,
    ) -> Result<Self, TreeError> {
        let types = StandardTypes::register(&mut registry)?;
        let props = StandardProperties::register(&mut registry, &types)?;
        Ok(Self {
            registry,
            types,
            props,
            slots: Vec::new(),
            free_list: Vec::new(),
            root: None,
            dirty: DirtySet::new(),
            stats: InvalidationStats::default(),
            owner_thread: thread::current().id(),
            dpi: config.dpi,
            config,
            backend: None,
            theme: None,
            events: EventHub::default(),
            error_handler: None,
            dispatcher: DispatcherQueue::new(),
            pass: PassState::default(),
        })
    }

    /// The property registry.
    #[must_use]
    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    /// Mutable access to the registry, to register types and properties.
    ///
    /// Registrations are append-only, so existing ids stay valid.
    pub fn registry_mut(&mut self) -> &mut PropertyRegistry {
        &mut self.registry
    }

    /// The standard type keys.
    #[must_use]
    pub fn types(&self) -> &StandardTypes {
        &self.types
    }

    /// The standard properties.
    #[must_use]
    pub fn properties(&self) -> &StandardProperties {
        &self.props
    }

    /// The configuration the tree was created with.
    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Invalidation counters.
    #[must_use]
    pub fn stats(&self) -> InvalidationStats {
        self.stats
    }

    /// Resets the invalidation counters.
    pub fn reset_stats(&mut self) {
        self.stats = InvalidationStats::default();
    }

    /// Sets the per-pass error handler.
    ///
    /// The handler sees every failure isolated during a pass; the failures
    /// are also listed in the [`PassReport`](crate::PassReport).
    pub fn set_error_handler(&mut self, handler: Option<ErrorHandler>) {
        self.error_handler = handler;
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Inserts a detached node of type `ty` with the given visual.
    ///
    /// The node starts dirty for every stage.
    pub fn insert(&mut self, ty: TypeKey, visual: impl Visual) -> Result<NodeId, TreeError> {
        self.insert_boxed(ty, Box::new(visual))
    }

    /// Inserts a detached node with an already boxed visual.
    pub fn insert_boxed(
        &mut self,
        ty: TypeKey,
        visual: Box<dyn Visual>,
    ) -> Result<NodeId, TreeError> {
        self.registry.type_info(ty)?;
        let (idx, generation) = match self.free_list.pop() {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                slot.generation = slot.generation.wrapping_add(1);
                (idx, slot.generation)
            }
            None => {
                let idx = u32::try_from(self.slots.len())
                    .unwrap_or_else(|_| panic!("too many nodes (max {})", u32::MAX));
                self.slots.push(Slot {
                    generation: 1,
                    node: None,
                });
                (idx, 1)
            }
        };
        let id = NodeId::new(idx, generation);
        self.slots[idx as usize].node = Some(Node {
            ty,
            parent: None,
            children: Vec::new(),
            store: PropertyStore::new(id),
            visual: Some(visual),
            layout: LayoutState::default(),
            dirty: InvalidateModes::MEASURE_ALL,
            last_reason: Some(InvalidateReason::explicit(
                self.registry.type_name(ty),
                "inserted",
            )),
            layer: None,
            render_handles: SmallVec::new(),
            measured_in: 0,
            arranged_in: 0,
            rendered_in: 0,
        });
        self.dirty.mark_modes(id, InvalidateModes::MEASURE_ALL);
        tracing::trace!(node = %id, ty = self.registry.type_name(ty), "inserted node");
        Ok(id)
    }

    /// Returns `true` if `id` refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Returns `true` if the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The type of a node.
    #[must_use]
    pub fn node_type(&self, id: NodeId) -> Option<TypeKey> {
        self.node(id).ok().map(|node| node.ty)
    }

    /// The parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|node| node.parent)
    }

    /// The children of a node, in order. Empty for a stale id.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |node| node.children.as_slice())
    }

    /// All parentless nodes, ordered by slot.
    #[must_use]
    pub fn roots(&self) -> Vec<NodeId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| {
                let node = slot.node.as_ref()?;
                #[expect(clippy::cast_possible_truncation, reason = "slot count fits in u32")]
                let id = NodeId::new(idx as u32, slot.generation);
                node.parent.is_none().then_some(id)
            })
            .collect()
    }

    /// The designated root, laid out to the viewport.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root.filter(|root| self.is_alive(*root))
    }

    /// Designates the root laid out to the viewport.
    ///
    /// Other roots are measured with infinite space and arranged at their
    /// desired size.
    pub fn set_root(&mut self, root: Option<NodeId>) -> Result<(), TreeError> {
        if let Some(root) = root {
            let node = self.node(root)?;
            if let Some(parent) = node.parent {
                return Err(TreeError::AlreadyParented {
                    child: root,
                    parent,
                });
            }
            self.propagate(
                root,
                InvalidateModes::MEASURE,
                InvalidateReason::explicit(self.type_name_of(root), "designated root"),
            );
        }
        self.root = root;
        Ok(())
    }

    /// The size offered to the designated root.
    #[must_use]
    pub fn viewport(&self) -> Size {
        self.config.viewport
    }

    /// Resizes the viewport and re-measures the designated root.
    pub fn set_viewport(&mut self, viewport: Size) {
        if self.config.viewport == viewport {
            return;
        }
        self.config.viewport = viewport;
        if let Some(root) = self.root() {
            self.propagate(
                root,
                InvalidateModes::MEASURE,
                InvalidateReason::explicit(self.type_name_of(root), "viewport resized"),
            );
        }
    }

    /// The visual of a node, if it is of type `V`.
    #[must_use]
    pub fn visual<V: Visual>(&self, id: NodeId) -> Option<&V> {
        self.node(id)
            .ok()?
            .visual
            .as_deref()?
            .as_any()
            .downcast_ref::<V>()
    }

    /// Mutable access to the visual of a node, if it is of type `V`.
    ///
    /// Changes made this way are invisible to the invalidation protocol;
    /// call [`Tree::invalidate`] afterwards if they affect layout or render.
    pub fn visual_mut<V: Visual>(&mut self, id: NodeId) -> Option<&mut V> {
        self.node_mut(id)
            .ok()?
            .visual
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<V>()
    }

    // =========================================================================
    // Layout queries
    // =========================================================================

    /// Layout results of a node.
    #[must_use]
    pub fn layout(&self, id: NodeId) -> Option<&LayoutState> {
        self.node(id).ok().map(|node| &node.layout)
    }

    /// The desired size from the node's last measure.
    #[must_use]
    pub fn desired_size(&self, id: NodeId) -> Option<Size> {
        self.layout(id).map(|layout| layout.desired_size)
    }

    /// The rectangle from the node's last successful arrange.
    #[must_use]
    pub fn arranged_rect(&self, id: NodeId) -> Option<Rect> {
        self.layout(id).and_then(|layout| layout.arranged_rect)
    }

    /// Modes waiting for the next pass, including parent modes.
    #[must_use]
    pub fn dirty_modes(&self, id: NodeId) -> InvalidateModes {
        self.node(id).map_or(InvalidateModes::NONE, |node| node.dirty)
    }

    /// Returns `true` if the next pass will run `stage` on this node.
    #[must_use]
    pub fn needs(&self, id: NodeId, stage: Stage) -> bool {
        self.dirty_modes(id).needs(stage)
    }

    /// The reason of the last invalidation that reached the node.
    #[must_use]
    pub fn last_reason(&self, id: NodeId) -> Option<&Arc<InvalidateReason>> {
        self.node(id).ok().and_then(|node| node.last_reason.as_ref())
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Appends `child` to the children of `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let index = self.node(parent)?.children.len();
        self.insert_child(parent, index, child)
    }

    /// Inserts `child` into the children of `parent` at `index`.
    ///
    /// `index` is clamped to the number of children. The parent is
    /// invalidated with the collection modes of the child's type; the child
    /// becomes dirty for every stage.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), TreeError> {
        self.node(parent)?;
        if let Some(current) = self.node(child)?.parent {
            return Err(TreeError::AlreadyParented {
                child,
                parent: current,
            });
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(TreeError::WouldCreateCycle { parent, child });
        }
        if self.root == Some(child) {
            self.root = None;
        }

        let children = &mut self.node_mut(parent)?.children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);

        self.collection_changed(parent, child, CollectionAction::Add);
        self.propagate(
            child,
            InvalidateModes::MEASURE_ALL,
            InvalidateReason::explicit(self.type_name_of(child), "attached"),
        );
        Ok(())
    }

    /// Removes `child` from the children of `parent`, keeping it alive as a
    /// detached root.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if self.node(child)?.parent != Some(parent) {
            self.node(parent)?;
            return Err(TreeError::NotAChild { parent, child });
        }
        self.detach(child)
    }

    /// Detaches a node from its parent, keeping it alive as a detached root.
    ///
    /// Subscriptions between the node and its former parent are dropped.
    /// Does nothing for a node without a parent.
    pub fn detach(&mut self, child: NodeId) -> Result<(), TreeError> {
        let Some(parent) = self.node(child)?.parent else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|c| *c != child);
        self.node_mut(child)?.parent = None;
        self.events.drop_between(parent, child);
        self.collection_changed(parent, child, CollectionAction::Remove);
        Ok(())
    }

    /// Removes a node and its whole subtree.
    ///
    /// With a backend installed, every removed node receives
    /// [`NodeEvent::DetachingFromComposition`] first. Composition resources
    /// are released, subscriptions of and to the removed nodes are dropped,
    /// and all ids of the subtree become stale.
    pub fn remove(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.detach(id)?;
        let subtree = self.subtree(id);
        if self.backend.is_some() {
            for &node in &subtree {
                self.fire(node, &NodeEvent::DetachingFromComposition);
            }
        }
        self.events.drop_nodes(&subtree);
        for &node in &subtree {
            self.release_node_handles(node, true);
            self.dirty.remove_key(node);
            // Handlers above may have removed parts of the subtree already.
            let slot = &mut self.slots[node.idx()];
            if slot.generation == node.generation() && slot.node.take().is_some() {
                #[expect(clippy::cast_possible_truncation, reason = "slot count fits in u32")]
                self.free_list.push(node.idx() as u32);
            }
        }
        if self.root == Some(id) {
            self.root = None;
        }
        tracing::trace!(node = %id, removed = subtree.len(), "removed subtree");
        Ok(())
    }

    /// The subtree rooted at `id` in pre-order, `id` first.
    #[must_use]
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.is_alive(id) {
            self.collect_pre_order(id, &mut out);
        }
        out
    }

    /// All live nodes in pre-order, root by root.
    #[must_use]
    pub fn pre_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.len());
        for root in self.roots() {
            self.collect_pre_order(root, &mut out);
        }
        out
    }

    /// Returns `true` if `ancestor` is `id` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    // =========================================================================
    // Internals
    // =========================================================================

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.slots
            .get(id.idx())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
            .ok_or(TreeError::NodeNotFound(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.slots
            .get_mut(id.idx())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
            .ok_or(TreeError::NodeNotFound(id))
    }

    /// Type name of a node, for reasons and logs.
    pub(crate) fn type_name_of(&self, id: NodeId) -> &'static str {
        self.node(id)
            .map_or("?", |node| self.registry.type_name(node.ty))
    }

    fn collect_pre_order(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
    }

    fn collection_changed(&mut self, owner: NodeId, child: NodeId, action: CollectionAction) {
        let Ok(child_ty) = self.node(child).map(|node| node.ty) else {
            return;
        };
        let modes = self.registry.collection_modes(child_ty);
        let reason = InvalidateReason::collection_changed(
            self.type_name_of(owner),
            action,
            self.registry.type_name(child_ty),
        );
        self.propagate(owner, modes, reason);
    }

    /// Releases a node's per-render resources, and its layer if `layer`.
    pub(crate) fn release_node_handles(&mut self, id: NodeId, layer: bool) {
        let Ok(node) = self.node_mut(id) else {
            return;
        };
        let mut handles = std::mem::take(&mut node.render_handles);
        if layer && let Some(handle) = node.layer.take() {
            handles.push(handle);
        }
        if let Some(backend) = self.backend.as_deref_mut() {
            for handle in handles {
                backend.release(handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visual::Container;

    fn tree_with_root() -> (Tree, NodeId) {
        let mut tree = Tree::default();
        let root = tree.insert(tree.types().visual, Container).unwrap();
        (tree, root)
    }

    #[test]
    fn new_nodes_are_fully_dirty() {
        let (tree, root) = tree_with_root();
        assert_eq!(tree.dirty_modes(root), InvalidateModes::MEASURE_ALL);
        assert!(tree.needs(root, Stage::Render));
        assert!(tree.dirty.is_dirty(root, Stage::Measure));
    }

    #[test]
    fn stale_ids_never_alias() {
        let (mut tree, root) = tree_with_root();
        tree.remove(root).unwrap();
        assert!(!tree.is_alive(root));
        let reused = tree.insert(tree.types().visual, Container).unwrap();
        assert_eq!(reused.idx(), root.idx());
        assert_ne!(reused, root);
        assert_eq!(tree.node(root).err(), Some(TreeError::NodeNotFound(root)));
    }

    #[test]
    fn cycles_and_double_parents_are_rejected() {
        let (mut tree, root) = tree_with_root();
        let a = tree.insert(tree.types().visual, Container).unwrap();
        let b = tree.insert(tree.types().visual, Container).unwrap();
        tree.add_child(root, a).unwrap();
        tree.add_child(a, b).unwrap();

        assert_eq!(
            tree.add_child(b, root),
            Err(TreeError::WouldCreateCycle {
                parent: b,
                child: root
            })
        );
        assert_eq!(
            tree.add_child(a, a),
            Err(TreeError::AlreadyParented {
                child: a,
                parent: root
            })
        );
        let c = tree.insert(tree.types().visual, Container).unwrap();
        assert_eq!(
            tree.add_child(c, c),
            Err(TreeError::WouldCreateCycle { parent: c, child: c })
        );
        assert_eq!(
            tree.add_child(root, b),
            Err(TreeError::AlreadyParented {
                child: b,
                parent: a
            })
        );
    }

    #[test]
    fn insert_child_keeps_order() {
        let (mut tree, root) = tree_with_root();
        let a = tree.insert(tree.types().visual, Container).unwrap();
        let b = tree.insert(tree.types().visual, Container).unwrap();
        let c = tree.insert(tree.types().visual, Container).unwrap();
        tree.add_child(root, a).unwrap();
        tree.add_child(root, c).unwrap();
        tree.insert_child(root, 1, b).unwrap();
        assert_eq!(tree.children(root), &[a, b, c]);
        assert_eq!(tree.pre_order(), vec![root, a, b, c]);
    }

    #[test]
    fn removing_a_subtree_frees_every_node() {
        let (mut tree, root) = tree_with_root();
        let a = tree.insert(tree.types().visual, Container).unwrap();
        let b = tree.insert(tree.types().visual, Container).unwrap();
        tree.add_child(root, a).unwrap();
        tree.add_child(a, b).unwrap();
        tree.remove(a).unwrap();
        assert!(!tree.is_alive(a));
        assert!(!tree.is_alive(b));
        assert!(tree.children(root).is_empty());
        assert_eq!(tree.len(), 1);
        assert!(!tree.dirty.is_dirty(b, Stage::Measure));
    }

    #[test]
    fn remove_child_checks_parentage() {
        let (mut tree, root) = tree_with_root();
        let a = tree.insert(tree.types().visual, Container).unwrap();
        assert_eq!(
            tree.remove_child(root, a),
            Err(TreeError::NotAChild {
                parent: root,
                child: a
            })
        );
        tree.add_child(root, a).unwrap();
        tree.remove_child(root, a).unwrap();
        assert!(tree.is_alive(a));
        assert_eq!(tree.parent(a), None);
        assert_eq!(tree.roots(), vec![root, a]);
    }

    #[test]
    fn collection_change_reason_names_the_child_type() {
        let (mut tree, root) = tree_with_root();
        tree.run_pass();
        let a = tree.insert(tree.types().visual, Container).unwrap();
        tree.add_child(root, a).unwrap();
        assert!(tree.needs(root, Stage::Measure));
        let reason = tree.last_reason(root).unwrap();
        assert_eq!(reason.to_string(), "CollectionChanged(Visual: add Visual)");
    }
}
