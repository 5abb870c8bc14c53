// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Upward invalidation.
//!
//! Local modes mark the node itself. Parent modes become local modes of the
//! parent, and keep climbing until an ancestor already holds them: a dirty
//! ancestor's own ancestors were marked when it became dirty, so the walk
//! stops there.

use std::sync::Arc;

use understory_invalidation::{InvalidateModes, InvalidateReason};

use crate::error::TreeError;
use crate::tree::Tree;
use crate::types::NodeId;

impl Tree {
    /// Invalidates a node with an explicit reason.
    ///
    /// Empty `modes` do nothing.
    pub fn invalidate(&mut self, id: NodeId, modes: InvalidateModes) -> Result<(), TreeError> {
        let reason = InvalidateReason::explicit(self.type_name_of(id), "invalidate");
        self.invalidate_with_reason(id, modes, reason)
    }

    /// Invalidates a node, recording `reason` as the cause.
    pub fn invalidate_with_reason(
        &mut self,
        id: NodeId,
        modes: InvalidateModes,
        reason: Arc<InvalidateReason>,
    ) -> Result<(), TreeError> {
        self.node(id)?;
        self.propagate(id, modes, reason);
        Ok(())
    }

    pub(crate) fn propagate(
        &mut self,
        start: NodeId,
        modes: InvalidateModes,
        reason: Arc<InvalidateReason>,
    ) {
        if modes.is_empty() {
            return;
        }
        let Ok(node) = self.node_mut(start) else {
            return;
        };
        let local = modes.local().normalized();
        node.dirty |= local;
        node.last_reason = Some(reason.clone());
        self.stats.invalidations += 1;
        if !local.is_empty() {
            self.dirty.mark_modes(start, local);
        }
        tracing::trace!(node = %start, ?modes, %reason, "invalidated");

        let upward = modes.parent_as_local().normalized();
        if upward.is_empty() {
            return;
        }
        let mut child = start;
        let mut child_modes = modes;
        let mut cause = reason;
        while let Some(parent) = self.parent(child) {
            self.stats.ancestor_visits += 1;
            let child_type = self.type_name_of(child);
            let parent_type = self.type_name_of(parent);
            let Ok(parent_node) = self.node_mut(parent) else {
                break;
            };
            if parent_node.dirty.contains(upward) {
                break;
            }
            let upgraded =
                InvalidateReason::parent_upgrade(parent_type, child_type, child_modes, upward, cause);
            parent_node.dirty |= upward;
            parent_node.last_reason = Some(upgraded.clone());
            self.dirty.mark_modes(parent, upward);

            child = parent;
            child_modes = upward;
            cause = upgraded;
        }
    }
}

#[cfg(test)]
mod tests {
    use understory_invalidation::{ReasonKind, Stage};

    use crate::tree::Tree;
    use crate::visual::Container;

    use super::*;

    fn chain(depth: usize) -> (Tree, Vec<NodeId>) {
        let mut tree = Tree::default();
        let mut ids = vec![tree.insert(tree.types().visual, Container).unwrap()];
        for _ in 1..depth {
            let child = tree.insert(tree.types().visual, Container).unwrap();
            tree.add_child(*ids.last().unwrap(), child).unwrap();
            ids.push(child);
        }
        tree.run_pass();
        tree.reset_stats();
        (tree, ids)
    }

    #[test]
    fn empty_modes_are_a_no_op() {
        let (mut tree, ids) = chain(2);
        tree.invalidate(ids[1], InvalidateModes::NONE).unwrap();
        assert_eq!(tree.stats().invalidations, 0);
        assert!(tree.dirty_modes(ids[1]).is_empty());
    }

    #[test]
    fn local_modes_do_not_climb() {
        let (mut tree, ids) = chain(3);
        tree.invalidate(ids[2], InvalidateModes::MEASURE).unwrap();
        assert!(tree.needs(ids[2], Stage::Render));
        assert!(!tree.needs(ids[1], Stage::Render));
        assert_eq!(tree.stats().ancestor_visits, 0);
    }

    #[test]
    fn parent_modes_climb_to_the_root() {
        let (mut tree, ids) = chain(4);
        tree.invalidate(ids[3], InvalidateModes::PARENT_ARRANGE)
            .unwrap();
        assert!(tree.dirty_modes(ids[3]).is_empty());
        for &ancestor in &ids[..3] {
            assert!(tree.needs(ancestor, Stage::Arrange));
            assert!(!tree.needs(ancestor, Stage::Measure));
        }
        assert_eq!(tree.stats().ancestor_visits, 3);

        let reason = tree.last_reason(ids[0]).unwrap();
        assert_eq!(reason.depth(), 4);
        assert!(matches!(reason.kind(), ReasonKind::ParentUpgrade { .. }));
        assert!(matches!(reason.root_cause().kind(), ReasonKind::Explicit("invalidate")));
    }

    #[test]
    fn parent_modes_on_a_root_leave_it_clean() {
        let (mut tree, ids) = chain(1);
        tree.invalidate(ids[0], InvalidateModes::PARENT_MEASURE)
            .unwrap();
        assert_eq!(tree.stats().invalidations, 1);
        assert!(tree.dirty_modes(ids[0]).is_empty());
        assert!(!tree.has_pending_work());
        assert!(tree.run_pass().is_empty());
        assert!(tree.dirty_modes(ids[0]).is_empty());
    }

    #[test]
    fn walk_stops_at_an_already_dirty_ancestor() {
        let (mut tree, ids) = chain(5);
        tree.invalidate(ids[2], InvalidateModes::MEASURE).unwrap();
        tree.reset_stats();
        tree.invalidate(ids[4], InvalidateModes::PARENT_MEASURE)
            .unwrap();
        // ids[3] is upgraded, ids[2] already holds Measure.
        assert_eq!(tree.stats().ancestor_visits, 2);
        assert!(!tree.needs(ids[1], Stage::Measure));
    }
}
