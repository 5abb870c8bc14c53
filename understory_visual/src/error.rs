// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree and pass errors.

use std::borrow::Cow;
use std::fmt;

use understory_invalidation::Stage;
use understory_property::PropertyError;

use crate::types::NodeId;

/// Errors returned by tree operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// A property registration, lookup, or write failed.
    Property(PropertyError),
    /// The id does not refer to a live node.
    NodeNotFound(NodeId),
    /// Adding `child` under `parent` would make a node its own ancestor.
    WouldCreateCycle {
        /// The prospective parent.
        parent: NodeId,
        /// The prospective child.
        child: NodeId,
    },
    /// The node already has a parent.
    AlreadyParented {
        /// The node that was to be added.
        child: NodeId,
        /// Its current parent.
        parent: NodeId,
    },
    /// The node is not a child of the given parent.
    NotAChild {
        /// The supposed parent.
        parent: NodeId,
        /// The supposed child.
        child: NodeId,
    },
    /// The node does not hold a [`Grid`](crate::Grid).
    NotAGrid(NodeId),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(err) => err.fmt(f),
            Self::NodeNotFound(id) => write!(f, "node {id} does not exist"),
            Self::WouldCreateCycle { parent, child } => {
                write!(f, "adding {child} under {parent} would create a cycle")
            }
            Self::AlreadyParented { child, parent } => {
                write!(f, "{child} already has parent {parent}")
            }
            Self::NotAChild { parent, child } => write!(f, "{child} is not a child of {parent}"),
            Self::NotAGrid(id) => write!(f, "{id} is not a grid"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Property(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PropertyError> for TreeError {
    fn from(err: PropertyError) -> Self {
        Self::Property(err)
    }
}

/// A failure reported by a visual's arrange or render hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisualError {
    message: Cow<'static, str>,
}

impl VisualError {
    /// Creates an error with a message.
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for VisualError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for VisualError {}

/// A per-node failure isolated during a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassError {
    /// The node whose hook failed.
    pub node: NodeId,
    /// The stage that failed.
    pub stage: Stage,
    /// What the hook reported.
    pub error: VisualError,
}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed on {}: {}", self.stage, self.node, self.error)
    }
}

impl std::error::Error for PassError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
