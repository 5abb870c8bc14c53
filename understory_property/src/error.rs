// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property system errors.

use alloc::string::String;
use core::fmt;

use crate::id::{PropertyId, TypeKey};

/// Errors raised by the registry and by property writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyError {
    /// A property with this name is already visible on the owner type.
    DuplicateDescriptor {
        /// The type the new property was declared on.
        owner: &'static str,
        /// The conflicting property name.
        name: &'static str,
    },
    /// A type with this name is already registered.
    DuplicateType {
        /// The conflicting type name.
        name: &'static str,
    },
    /// The type key does not belong to this registry.
    UnknownType(TypeKey),
    /// The property is not registered, or was registered with another value type.
    UnknownProperty {
        /// The property that was looked up.
        id: PropertyId,
        /// The value type the caller expected.
        expected: &'static str,
    },
    /// The value converter rejected a value.
    InvalidValue {
        /// Name of the property being written.
        property: &'static str,
        /// Message from the converter.
        message: String,
    },
    /// A property that may only be written on the owning thread was written elsewhere.
    ThreadAffinityViolation {
        /// Name of the property being written.
        property: &'static str,
    },
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateDescriptor { owner, name } => {
                write!(f, "property `{name}` is already registered on `{owner}` or a related type")
            }
            Self::DuplicateType { name } => write!(f, "type `{name}` is already registered"),
            Self::UnknownType(key) => write!(f, "type {key:?} is not registered"),
            Self::UnknownProperty { id, expected } => {
                write!(f, "property {id} is not registered with value type `{expected}`")
            }
            Self::InvalidValue { property, message } => {
                write!(f, "invalid value for `{property}`: {message}")
            }
            Self::ThreadAffinityViolation { property } => {
                write!(f, "`{property}` can only be written on the thread that owns the tree")
            }
        }
    }
}

impl core::error::Error for PropertyError {}
