// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Input delivery.
//!
//! Hosts hit-test on their own and hand the event to the target node; the
//! event then bubbles through the ancestors until a visual handles it.

use kurbo::{Point, Vec2};

use crate::error::TreeError;
use crate::tree::Tree;
use crate::types::NodeId;
use crate::visual::EventCtx;

bitflags::bitflags! {
    /// Modifier keys held during an input event.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        /// Shift.
        const SHIFT = 1 << 0;
        /// Control.
        const CONTROL = 1 << 1;
        /// Alt or Option.
        const ALT = 1 << 2;
        /// Windows, Command, or Super.
        const META = 1 << 3;
    }
}

/// A pointer button.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerButton {
    /// The primary (usually left) button.
    Primary,
    /// The secondary (usually right) button.
    Secondary,
    /// The middle button or wheel press.
    Auxiliary,
    /// Any other button, by platform index.
    Other(u16),
}

/// An input event, in root coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    /// The pointer moved.
    PointerMove {
        /// Pointer position.
        position: Point,
        /// Held modifiers.
        modifiers: Modifiers,
    },
    /// A pointer button was pressed.
    PointerDown {
        /// Pointer position.
        position: Point,
        /// The pressed button.
        button: PointerButton,
        /// Held modifiers.
        modifiers: Modifiers,
    },
    /// A pointer button was released.
    PointerUp {
        /// Pointer position.
        position: Point,
        /// The released button.
        button: PointerButton,
        /// Held modifiers.
        modifiers: Modifiers,
    },
    /// The wheel or touchpad scrolled.
    Wheel {
        /// Pointer position.
        position: Point,
        /// Scroll amount in logical pixels.
        delta: Vec2,
        /// Held modifiers.
        modifiers: Modifiers,
    },
    /// A key was pressed.
    KeyDown {
        /// Platform key code.
        code: u32,
        /// Held modifiers.
        modifiers: Modifiers,
    },
    /// A key was released.
    KeyUp {
        /// Platform key code.
        code: u32,
        /// Held modifiers.
        modifiers: Modifiers,
    },
}

impl InputEvent {
    /// The pointer position, for pointer and wheel events.
    #[must_use]
    pub fn position(&self) -> Option<Point> {
        match self {
            Self::PointerMove { position, .. }
            | Self::PointerDown { position, .. }
            | Self::PointerUp { position, .. }
            | Self::Wheel { position, .. } => Some(*position),
            Self::KeyDown { .. } | Self::KeyUp { .. } => None,
        }
    }

    /// The modifiers held during the event.
    #[must_use]
    pub fn modifiers(&self) -> Modifiers {
        match self {
            Self::PointerMove { modifiers, .. }
            | Self::PointerDown { modifiers, .. }
            | Self::PointerUp { modifiers, .. }
            | Self::Wheel { modifiers, .. }
            | Self::KeyDown { modifiers, .. }
            | Self::KeyUp { modifiers, .. } => *modifiers,
        }
    }
}

impl Tree {
    /// Delivers `event` to `target` and bubbles it up the ancestors.
    ///
    /// Returns the node that handled the event, or `None` if it reached the
    /// root unhandled.
    pub fn deliver_input(
        &mut self,
        target: NodeId,
        event: &InputEvent,
    ) -> Result<Option<NodeId>, TreeError> {
        self.node(target)?;
        let mut current = Some(target);
        while let Some(id) = current {
            let Ok(node) = self.node_mut(id) else {
                break;
            };
            let parent = node.parent;
            let Some(mut visual) = node.visual.take() else {
                current = parent;
                continue;
            };
            let handled = {
                let mut ctx = EventCtx {
                    tree: self,
                    node: id,
                    target,
                };
                visual.on_input(&mut ctx, event)
            };
            match self.node_mut(id) {
                Ok(node) => node.visual = Some(visual),
                // The handler removed its own node.
                Err(_) => return Ok(handled.then_some(id)),
            }
            if handled {
                tracing::trace!(%target, handler = %id, "input handled");
                return Ok(Some(id));
            }
            current = self.parent(id);
        }
        Ok(None)
    }
}
