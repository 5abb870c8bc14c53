// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Invalidation: the vocabulary of layout and render invalidation.
//!
//! This crate holds the small, `no_std` building blocks shared by the property
//! system and the visual tree:
//!
//! - **Stages** ([`Stage`]): Measure, Arrange, and Render, ordered from
//!   coarsest to finest.
//! - **Invalidate modes** ([`InvalidateModes`]): which stages a change
//!   invalidates, on the changed visual itself and on its parent.
//! - **Reasons** ([`InvalidateReason`], [`ReasonKind`]): immutable causal
//!   chains that explain why a visual became dirty.
//! - **Dirty sets** ([`DirtySet`]): keys waiting for each stage, accumulated
//!   between passes.
//!
//! ## Subsumption
//!
//! A coarser stage always implies the finer ones. Use
//! [`InvalidateModes::normalized`] before storing modes, and
//! [`InvalidateModes::needs`] when asking whether a stage must run.
//!
//! ## Quick Start
//!
//! ```rust
//! use understory_invalidation::{DirtySet, InvalidateModes, InvalidateReason, Stage};
//!
//! // A `Width` change re-measures the visual and its parent.
//! let modes = InvalidateModes::MEASURE | InvalidateModes::PARENT_MEASURE;
//! let reason = InvalidateReason::property_changed("Box", "Visual", "Width");
//!
//! let mut dirty = DirtySet::<u32>::new();
//! dirty.mark_modes(2, modes);
//!
//! // Parent bits become local bits one level up.
//! let upgraded = InvalidateReason::parent_upgrade(
//!     "Panel",
//!     "Box",
//!     modes,
//!     modes.parent_as_local(),
//!     reason,
//! );
//! dirty.mark_modes(1, modes.parent_as_local());
//!
//! assert!(dirty.is_dirty(1, Stage::Render));
//! assert_eq!(upgraded.depth(), 2);
//! ```
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod modes;
mod reason;
mod set;

pub use modes::{InvalidateModes, Stage};
pub use reason::{CollectionAction, InvalidateReason, MAX_REASON_DEPTH, ReasonKind};
pub use set::DirtySet;
