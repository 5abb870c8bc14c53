// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Property: dependency property descriptors and value storage.
//!
//! This crate provides the foundation of a dependency property system:
//!
//! - [`PropertyRegistry`]: owner types (single inheritance) and the property
//!   descriptors they declare. Append-only; a property name is unique along
//!   any chain of base types.
//! - [`PropertyMetadata`]: per-descriptor default value, [`InvalidateModes`],
//!   [`PropertyOptions`], and optional converter, validator, and changed
//!   callback.
//! - [`PropertyStore`]: per-node sparse storage of explicitly set values and
//!   validation messages.
//! - [`SetOptions`]: per-write flags and an invalidate mode override.
//!
//! Notification, thread checks, and invalidation happen in the layer that
//! owns the nodes (see `understory_visual`); this crate only stores and
//! describes.
//!
//! ## Quick Start
//!
//! ```rust
//! use understory_invalidation::InvalidateModes;
//! use understory_property::{Property, PropertyMetadataBuilder, PropertyRegistry, PropertyStore};
//!
//! let mut registry = PropertyRegistry::new();
//! let visual = registry.register_type("Visual", None).unwrap();
//! let width: Property<f64> = registry
//!     .register(
//!         visual,
//!         "Width",
//!         PropertyMetadataBuilder::new(0.0)
//!             .invalidates(InvalidateModes::MEASURE)
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let mut store = PropertyStore::<u32>::new(1);
//! assert_eq!(store.get_or_default(width, &registry), Ok(&0.0));
//!
//! store.set(width, 10.0);
//! assert_eq!(store.get(width), Some(&10.0));
//! assert_eq!(registry.invalidate_modes(width.id()), InvalidateModes::MEASURE);
//! ```
//!
//! ## Memory Optimizations
//!
//! | Optimization | Description |
//! |--------------|-------------|
//! | **Sparse storage** | `PropertyStore` only allocates for explicitly set properties |
//! | **Shared defaults** | Default values stored in registry, not per-node |
//! | **Inline storage** | `SmallVec` for small property counts |
//! | **`PropertyId` as u16** | Compact property identification |
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.
//!
//! [`InvalidateModes`]: understory_invalidation::InvalidateModes

#![no_std]

extern crate alloc;

mod error;
mod id;
mod metadata;
mod options;
mod registry;
mod store;
mod value;

pub use error::PropertyError;
pub use id::{Property, PropertyId, RegistryId, TypeKey};
pub use metadata::{
    ConvertValueCallback, PropertyChangedCallback, PropertyMetadata, PropertyMetadataBuilder,
    PropertyOptions, ValidateValueCallback, ValueChange,
};
pub use options::{SetFlags, SetOptions};
pub use registry::{PropertyRegistration, PropertyRegistry, TypeRegistration};
pub use store::PropertyStore;
pub use value::{ErasedValue, PropertyValue};
