// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identifiers for owner types and properties.
//!
//! [`TypeKey`] names an owner type in a [`PropertyRegistry`](crate::PropertyRegistry),
//! [`PropertyId`] names a registered descriptor, and [`Property<T>`] is the
//! typed handle callers hold on to. Type keys and typed handles carry the
//! [`RegistryId`] of the registry that issued them.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, Ordering};

/// Identifies one [`PropertyRegistry`](crate::PropertyRegistry).
///
/// Every registry gets a fresh id when created; a registry rejects type keys
/// and property handles stamped with another registry's id.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistryId(u32);

impl RegistryId {
    /// Allocates an id no other registry in this process has.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` registries are created.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        assert!(id != 0, "registry ids exhausted");
        Self(id)
    }
}

impl fmt::Debug for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegistryId").field(&self.0).finish()
    }
}

/// A compact handle for an owner type registered in a
/// [`PropertyRegistry`](crate::PropertyRegistry).
///
/// Types form a single-inheritance hierarchy; properties declared on a type
/// are visible to all of its subtypes.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeKey {
    registry: RegistryId,
    index: u16,
}

impl TypeKey {
    /// Keys are only issued by
    /// [`PropertyRegistry::register_type`](crate::PropertyRegistry::register_type).
    #[inline]
    pub(crate) const fn new(registry: RegistryId, index: u16) -> Self {
        Self { registry, index }
    }

    /// Returns the index within the issuing registry.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.index
    }

    /// Returns the registry that issued this key.
    #[must_use]
    #[inline]
    pub const fn registry(self) -> RegistryId {
        self.registry
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeKey").field(&self.index).finish()
    }
}

/// A runtime property identifier.
///
/// This is a lightweight handle (u16) that uniquely identifies a property
/// within a [`PropertyRegistry`](crate::PropertyRegistry), whichever type
/// declared it. It is a bare index: only [`Property<T>`] remembers which
/// registry it came from.
///
/// # Example
///
/// ```rust
/// use understory_property::PropertyId;
///
/// let id = PropertyId::new(42);
/// assert_eq!(id.index(), 42);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(u16);

impl PropertyId {
    /// Creates a new property ID from the given index.
    #[must_use]
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the underlying index of this property ID.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyId").field(&self.0).finish()
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A typed property key.
///
/// Wraps a [`PropertyId`] with the value type `T`, so reads and writes through
/// a `Property<T>` can only ever see values of type `T`:
///
/// ```rust
/// use understory_property::{Property, PropertyMetadataBuilder, PropertyRegistry};
///
/// let mut registry = PropertyRegistry::new();
/// let visual = registry.register_type("Visual", None).unwrap();
///
/// let width: Property<f64> = registry
///     .register(visual, "Width", PropertyMetadataBuilder::new(0.0_f64).build())
///     .unwrap();
///
/// // store.set(width, "wide"); // does not compile
/// # let _ = width;
/// ```
///
/// Handles are issued by
/// [`PropertyRegistry::register`](crate::PropertyRegistry::register) and
/// [`PropertyRegistry::typed`](crate::PropertyRegistry::typed). The registry
/// checks the value type and the issuing registry whenever a handle is used,
/// so a handle from another registry, or one built for the wrong `T`, fails
/// with [`PropertyError::UnknownProperty`](crate::PropertyError::UnknownProperty)
/// instead of reaching an unrelated descriptor.
pub struct Property<T> {
    id: PropertyId,
    registry: RegistryId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
    #[inline]
    pub(crate) const fn new(id: PropertyId, registry: RegistryId) -> Self {
        Self {
            id,
            registry,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying property ID.
    #[must_use]
    #[inline]
    pub const fn id(self) -> PropertyId {
        self.id
    }

    /// Returns the registry that issued this handle.
    #[must_use]
    #[inline]
    pub const fn registry(self) -> RegistryId {
        self.registry
    }
}

// Manual impls so that `T` needs no bounds.

impl<T> Copy for Property<T> {}

impl<T> Clone for Property<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Property<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.registry == other.registry
    }
}

impl<T> Eq for Property<T> {}

impl<T> Hash for Property<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.registry.hash(state);
    }
}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("id", &self.id)
            .field("type", &core::any::type_name::<T>())
            .finish()
    }
}

impl<T> From<Property<T>> for PropertyId {
    fn from(property: Property<T>) -> Self {
        property.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::String;

    #[test]
    fn ids_compare_by_index() {
        assert_eq!(PropertyId::new(3), PropertyId::new(3));
        assert!(PropertyId::new(2) < PropertyId::new(3));
        let registry = RegistryId::next();
        assert_eq!(TypeKey::new(registry, 1).index(), 1);
        assert_eq!(TypeKey::new(registry, 1).registry(), registry);
    }

    #[test]
    fn formatting() {
        assert_eq!(format!("{:?}", PropertyId::new(42)), "PropertyId(42)");
        assert_eq!(format!("{}", PropertyId::new(42)), "#42");
        let key = TypeKey::new(RegistryId::next(), 7);
        assert_eq!(format!("{key:?}"), "TypeKey(7)");
    }

    #[test]
    fn registry_ids_are_unique() {
        let a = RegistryId::next();
        let b = RegistryId::next();
        assert_ne!(a, b);
        assert_ne!(TypeKey::new(a, 0), TypeKey::new(b, 0));
    }

    #[test]
    fn handles_from_different_registries_differ() {
        let id = PropertyId::new(1);
        let a: Property<f64> = Property::new(id, RegistryId::next());
        let b: Property<f64> = Property::new(id, RegistryId::next());
        let as_string: Property<String> = Property::new(id, a.registry());
        assert_eq!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(as_string.id(), a.id());
        assert_eq!(PropertyId::from(a), id);
    }
}
