// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Explainability for invalidation: causal reason chains.
//!
//! Every invalidation carries an [`InvalidateReason`] answering “why is this
//! visual dirty?”. Reasons are immutable and link to the reason that caused
//! them, so a parent re-measure triggered by a child's property change reads
//! as a chain:
//!
//! ```text
//! ParentUpgrade(Border <- TextBlock) -> PropertyChanged(TextBlock.Text)
//! ```
//!
//! Chains are built bottom-up (a reason only ever links to a reason that
//! already exists), so they cannot contain cycles. Their depth is still capped
//! at [`MAX_REASON_DEPTH`]: an event storm upgrading through a deep tree
//! should not be able to build unbounded chains before a pass flushes them.

use alloc::sync::Arc;
use core::fmt;

use crate::modes::InvalidateModes;

/// The maximum number of links kept in a reason chain.
///
/// A reason built on top of a chain that is already this deep drops its inner
/// link and reports [`InvalidateReason::is_truncated`].
pub const MAX_REASON_DEPTH: usize = 16;

/// The kind of change a collection went through.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CollectionAction {
    /// An item was added.
    Add,
    /// An item was removed.
    Remove,
    /// An item was replaced by another.
    Replace,
    /// The collection was cleared or rebuilt.
    Reset,
}

impl fmt::Display for CollectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
            Self::Reset => "reset",
        })
    }
}

/// Kind-specific context of an [`InvalidateReason`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReasonKind {
    /// A property value changed.
    PropertyChanged {
        /// Name of the type that declared the property.
        declaring_type: &'static str,
        /// Name of the property.
        property: &'static str,
    },
    /// A child collection changed.
    CollectionChanged {
        /// What happened to the collection.
        action: CollectionAction,
        /// Type name of the child involved.
        child_type: &'static str,
    },
    /// A child asked its parent for a stage through `PARENT_*` modes.
    ParentUpgrade {
        /// Type name of the child that asked.
        child_type: &'static str,
        /// The modes the child was invalidated with.
        child_modes: InvalidateModes,
        /// The local modes applied to the parent.
        parent_modes: InvalidateModes,
    },
    /// The display DPI changed.
    DpiChanged {
        /// DPI before the change.
        old_dpi: u32,
        /// DPI after the change.
        new_dpi: u32,
    },
    /// Invalidation requested directly by code, with a short label.
    Explicit(&'static str),
}

/// An immutable, causally linked record of why an invalidation happened.
///
/// Reasons are cheap to share: links are reference counted, and building a
/// new reason on top of an existing one never copies the chain.
///
/// # Example
///
/// ```
/// use understory_invalidation::{InvalidateModes, InvalidateReason};
///
/// let changed = InvalidateReason::property_changed("TextBlock", "TextBlock", "Text");
/// let upgrade = InvalidateReason::parent_upgrade(
///     "Border",
///     "TextBlock",
///     InvalidateModes::PARENT_MEASURE,
///     InvalidateModes::MEASURE,
///     changed.clone(),
/// );
///
/// assert_eq!(upgrade.depth(), 2);
/// assert_eq!(upgrade.root_cause(), &*changed);
/// assert_eq!(upgrade.chain().count(), 2);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct InvalidateReason {
    trigger: &'static str,
    kind: ReasonKind,
    inner: Option<Arc<InvalidateReason>>,
    depth: usize,
    truncated: bool,
}

impl InvalidateReason {
    /// Creates a reason with an optional cause.
    ///
    /// `trigger` is the type name of the object that triggered the invalidation.
    #[must_use]
    pub fn new(
        trigger: &'static str,
        kind: ReasonKind,
        inner: Option<Arc<Self>>,
    ) -> Arc<Self> {
        let (inner, truncated) = match inner {
            Some(inner) if inner.depth >= MAX_REASON_DEPTH => (None, true),
            other => (other, false),
        };
        let depth = inner.as_ref().map_or(1, |inner| inner.depth + 1);
        Arc::new(Self {
            trigger,
            kind,
            inner,
            depth,
            truncated,
        })
    }

    /// A property declared on `declaring_type` changed on an object of type `trigger`.
    #[must_use]
    pub fn property_changed(
        trigger: &'static str,
        declaring_type: &'static str,
        property: &'static str,
    ) -> Arc<Self> {
        Self::new(
            trigger,
            ReasonKind::PropertyChanged {
                declaring_type,
                property,
            },
            None,
        )
    }

    /// A child collection owned by an object of type `trigger` changed.
    #[must_use]
    pub fn collection_changed(
        trigger: &'static str,
        action: CollectionAction,
        child_type: &'static str,
    ) -> Arc<Self> {
        Self::new(
            trigger,
            ReasonKind::CollectionChanged { action, child_type },
            None,
        )
    }

    /// A parent of type `trigger` is invalidated on behalf of its child.
    #[must_use]
    pub fn parent_upgrade(
        trigger: &'static str,
        child_type: &'static str,
        child_modes: InvalidateModes,
        parent_modes: InvalidateModes,
        cause: Arc<Self>,
    ) -> Arc<Self> {
        Self::new(
            trigger,
            ReasonKind::ParentUpgrade {
                child_type,
                child_modes,
                parent_modes,
            },
            Some(cause),
        )
    }

    /// The DPI of the window hosting an object of type `trigger` changed.
    #[must_use]
    pub fn dpi_changed(trigger: &'static str, old_dpi: u32, new_dpi: u32) -> Arc<Self> {
        Self::new(trigger, ReasonKind::DpiChanged { old_dpi, new_dpi }, None)
    }

    /// Invalidation requested directly by code.
    #[must_use]
    pub fn explicit(trigger: &'static str, label: &'static str) -> Arc<Self> {
        Self::new(trigger, ReasonKind::Explicit(label), None)
    }

    /// Returns the type name of the object that triggered this reason.
    #[must_use]
    pub fn trigger(&self) -> &'static str {
        self.trigger
    }

    /// Returns the kind-specific context.
    #[must_use]
    pub fn kind(&self) -> &ReasonKind {
        &self.kind
    }

    /// Returns the reason that caused this one, if any.
    #[must_use]
    pub fn inner(&self) -> Option<&Arc<Self>> {
        self.inner.as_ref()
    }

    /// Returns the number of links in the chain starting at this reason.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns `true` if the inner link was dropped because of the depth cap.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Iterates the chain from this reason to its root cause.
    pub fn chain(&self) -> impl Iterator<Item = &Self> {
        let mut next = Some(self);
        core::iter::from_fn(move || {
            let current = next?;
            next = current.inner.as_deref();
            Some(current)
        })
    }

    /// Returns the last reason in the chain.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        self.chain().last().unwrap_or(self)
    }
}

impl fmt::Debug for InvalidateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidateReason")
            .field("trigger", &self.trigger)
            .field("kind", &self.kind)
            .field("depth", &self.depth)
            .field("truncated", &self.truncated)
            .field("inner", &self.inner)
            .finish()
    }
}

impl fmt::Display for InvalidateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, reason) in self.chain().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            match &reason.kind {
                ReasonKind::PropertyChanged {
                    declaring_type,
                    property,
                } => write!(
                    f,
                    "PropertyChanged({}: {declaring_type}.{property})",
                    reason.trigger
                )?,
                ReasonKind::CollectionChanged { action, child_type } => write!(
                    f,
                    "CollectionChanged({}: {action} {child_type})",
                    reason.trigger
                )?,
                ReasonKind::ParentUpgrade {
                    child_type,
                    parent_modes,
                    ..
                } => write!(
                    f,
                    "ParentUpgrade({} <- {child_type}, {parent_modes:?})",
                    reason.trigger
                )?,
                ReasonKind::DpiChanged { old_dpi, new_dpi } => write!(
                    f,
                    "DpiChanged({}: {old_dpi} -> {new_dpi})",
                    reason.trigger
                )?,
                ReasonKind::Explicit(label) => write!(f, "Explicit({}: {label})", reason.trigger)?,
            }
        }
        if self.root_cause().truncated {
            f.write_str(" -> ...")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::vec::Vec;

    fn upgrade(trigger: &'static str, cause: Arc<InvalidateReason>) -> Arc<InvalidateReason> {
        InvalidateReason::parent_upgrade(
            trigger,
            "Child",
            InvalidateModes::PARENT_MEASURE,
            InvalidateModes::MEASURE,
            cause,
        )
    }

    #[test]
    fn single_reason_has_depth_one() {
        let reason = InvalidateReason::property_changed("Box", "Visual", "Width");
        assert_eq!(reason.depth(), 1);
        assert!(reason.inner().is_none());
        assert!(!reason.is_truncated());
        assert_eq!(reason.trigger(), "Box");
        assert_eq!(
            reason.kind(),
            &ReasonKind::PropertyChanged {
                declaring_type: "Visual",
                property: "Width",
            }
        );
    }

    #[test]
    fn chain_walks_to_root_cause() {
        let changed = InvalidateReason::property_changed("Text", "Text", "Content");
        let a = upgrade("Border", changed.clone());
        let b = upgrade("Window", a.clone());

        let triggers: Vec<_> = b.chain().map(InvalidateReason::trigger).collect();
        assert_eq!(triggers, ["Window", "Border", "Text"]);
        assert_eq!(b.depth(), 3);
        assert!(Arc::ptr_eq(b.inner().unwrap(), &a));
        assert_eq!(b.root_cause(), &*changed);
    }

    #[test]
    fn depth_is_capped() {
        let mut reason = InvalidateReason::explicit("Leaf", "test");
        for _ in 0..(MAX_REASON_DEPTH * 2) {
            reason = upgrade("Node", reason);
        }
        assert!(reason.depth() <= MAX_REASON_DEPTH);
        assert!(reason.chain().count() <= MAX_REASON_DEPTH);
        assert!(reason.chain().any(InvalidateReason::is_truncated));
    }

    #[test]
    fn display_renders_chain() {
        let changed = InvalidateReason::property_changed("Text", "Text", "Content");
        let up = upgrade("Border", changed);
        let text = format!("{up}");
        assert!(text.starts_with("ParentUpgrade(Border <- Child"));
        assert!(text.ends_with("PropertyChanged(Text: Text.Content)"));
    }

    #[test]
    fn collection_and_dpi_reasons() {
        let col = InvalidateReason::collection_changed("Grid", CollectionAction::Remove, "Column");
        assert_eq!(format!("{col}"), "CollectionChanged(Grid: remove Column)");

        let dpi = InvalidateReason::dpi_changed("Window", 96, 144);
        assert_eq!(format!("{dpi}"), "DpiChanged(Window: 96 -> 144)");
    }
}
