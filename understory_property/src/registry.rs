// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type and property descriptor registry.
//!
//! This module provides [`PropertyRegistry`] for registering owner types and
//! the properties they declare, and for looking up descriptor metadata.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use core::fmt;

use hashbrown::HashMap;
use understory_invalidation::InvalidateModes;

use crate::error::PropertyError;
use crate::id::{Property, PropertyId, RegistryId, TypeKey};
use crate::metadata::{PropertyMetadata, PropertyOptions};
use crate::value::PropertyValue;

/// A registered owner type.
#[derive(Clone, Debug)]
pub struct TypeRegistration {
    name: &'static str,
    base: Option<TypeKey>,
    collection_modes: InvalidateModes,
}

impl TypeRegistration {
    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the base type, if any.
    #[must_use]
    pub fn base(&self) -> Option<TypeKey> {
        self.base
    }

    /// Returns the modes applied to a collection's owner when a child of this
    /// type is added, removed, or replaced.
    #[must_use]
    pub fn collection_modes(&self) -> InvalidateModes {
        self.collection_modes
    }
}

/// A registration entry for a property.
///
/// Holds the identity (owner type and name), the value type, and the
/// metadata. Everything here is immutable once registered.
pub struct PropertyRegistration {
    name: &'static str,
    owner: TypeKey,
    value_type: TypeId,
    value_type_name: &'static str,
    invalidate_modes: InvalidateModes,
    options: PropertyOptions,
    metadata: Arc<dyn Any + Send + Sync>,
}

impl PropertyRegistration {
    /// Returns the property name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the type that declared the property.
    #[must_use]
    #[inline]
    pub fn owner(&self) -> TypeKey {
        self.owner
    }

    /// Returns the [`TypeId`] of the property's value type.
    #[must_use]
    #[inline]
    pub fn value_type(&self) -> TypeId {
        self.value_type
    }

    /// Returns the name of the property's value type.
    #[must_use]
    #[inline]
    pub fn value_type_name(&self) -> &'static str {
        self.value_type_name
    }

    /// Returns the modes a change of this property invalidates.
    #[must_use]
    #[inline]
    pub fn invalidate_modes(&self) -> InvalidateModes {
        self.invalidate_modes
    }

    /// Returns the static options.
    #[must_use]
    #[inline]
    pub fn options(&self) -> PropertyOptions {
        self.options
    }
}

impl fmt::Debug for PropertyRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRegistration")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("value_type", &self.value_type_name)
            .field("invalidate_modes", &self.invalidate_modes)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A registry of owner types and the properties they declare.
///
/// Types form a single-inheritance hierarchy. A property is identified by the
/// type that declares it and its name, and is visible on every subtype; a name
/// may appear only once along any chain of base types. Registrations are
/// append-only: nothing is ever removed or changed.
///
/// Type keys and property handles are stamped with the registry's
/// [`RegistryId`]; handing a registry a key or handle issued by another one
/// fails with [`PropertyError::UnknownType`] or
/// [`PropertyError::UnknownProperty`].
///
/// # Example
///
/// ```rust
/// use understory_invalidation::InvalidateModes;
/// use understory_property::{PropertyMetadataBuilder, PropertyRegistry};
///
/// let mut registry = PropertyRegistry::new();
/// let visual = registry.register_type("Visual", None).unwrap();
/// let border = registry.register_type("Border", Some(visual)).unwrap();
///
/// let width = registry
///     .register(
///         visual,
///         "Width",
///         PropertyMetadataBuilder::new(0.0_f64)
///             .invalidates(InvalidateModes::MEASURE)
///             .build(),
///     )
///     .unwrap();
///
/// // Declared on `Visual`, found through `Border`.
/// assert_eq!(registry.find(border, "Width"), Some(width.id()));
/// assert_eq!(registry.invalidate_modes(width.id()), InvalidateModes::MEASURE);
///
/// // A subtype cannot redeclare it.
/// let again = registry.register(border, "Width", PropertyMetadataBuilder::new(1.0_f64).build());
/// assert!(again.is_err());
/// ```
pub struct PropertyRegistry {
    id: RegistryId,
    types: Vec<TypeRegistration>,
    types_by_name: HashMap<&'static str, TypeKey>,
    properties: Vec<PropertyRegistration>,
    by_owner_and_name: HashMap<(TypeKey, &'static str), PropertyId>,
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        Self {
            id: RegistryId::next(),
            types: Vec::new(),
            types_by_name: HashMap::new(),
            properties: Vec::new(),
            by_owner_and_name: HashMap::new(),
        }
    }
}

impl PropertyRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id stamped on every key and handle this registry issues.
    #[must_use]
    #[inline]
    pub fn id(&self) -> RegistryId {
        self.id
    }

    // =========================================================================
    // Types
    // =========================================================================

    /// Registers an owner type whose collection changes re-measure the owner.
    pub fn register_type(
        &mut self,
        name: &'static str,
        base: Option<TypeKey>,
    ) -> Result<TypeKey, PropertyError> {
        self.register_type_with(name, base, InvalidateModes::MEASURE)
    }

    /// Registers an owner type with explicit collection modes.
    ///
    /// `collection_modes` is applied to a collection's owner when a child of
    /// this type is added to or removed from it.
    ///
    /// # Panics
    ///
    /// Panics if more than 65,535 types are registered.
    pub fn register_type_with(
        &mut self,
        name: &'static str,
        base: Option<TypeKey>,
        collection_modes: InvalidateModes,
    ) -> Result<TypeKey, PropertyError> {
        if self.types_by_name.contains_key(name) {
            return Err(PropertyError::DuplicateType { name });
        }
        if let Some(base) = base {
            self.type_info(base)?;
        }
        assert!(
            self.types.len() < u16::MAX as usize,
            "Too many types registered (max {})",
            u16::MAX
        );

        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let key = TypeKey::new(self.id, self.types.len() as u16);
        self.types.push(TypeRegistration {
            name,
            base,
            collection_modes,
        });
        self.types_by_name.insert(name, key);
        Ok(key)
    }

    /// Returns the registration of a type.
    pub fn type_info(&self, ty: TypeKey) -> Result<&TypeRegistration, PropertyError> {
        if ty.registry() != self.id {
            return Err(PropertyError::UnknownType(ty));
        }
        self.types
            .get(usize::from(ty.index()))
            .ok_or(PropertyError::UnknownType(ty))
    }

    /// Looks up a type by name.
    #[must_use]
    pub fn type_by_name(&self, name: &str) -> Option<TypeKey> {
        self.types_by_name.get(name).copied()
    }

    /// Returns the name of a type, or `"?"` for a key from another registry.
    #[must_use]
    pub fn type_name(&self, ty: TypeKey) -> &'static str {
        self.type_info(ty).map_or("?", TypeRegistration::name)
    }

    /// Returns the base type of a type.
    #[must_use]
    pub fn base_type(&self, ty: TypeKey) -> Option<TypeKey> {
        self.type_info(ty).ok().and_then(TypeRegistration::base)
    }

    /// Returns the collection modes of a type, or `NONE` for an unknown type.
    #[must_use]
    pub fn collection_modes(&self, ty: TypeKey) -> InvalidateModes {
        self.type_info(ty)
            .map_or(InvalidateModes::NONE, TypeRegistration::collection_modes)
    }

    /// Returns `true` if `ty` is `ancestor` or derives from it.
    #[must_use]
    pub fn is_subtype(&self, ty: TypeKey, ancestor: TypeKey) -> bool {
        self.ancestors(ty).any(|t| t == ancestor)
    }

    /// Iterates `ty` and then its base types, up to the root type.
    pub fn ancestors(&self, ty: TypeKey) -> impl Iterator<Item = TypeKey> + '_ {
        let start = self.type_info(ty).ok().map(|_| ty);
        core::iter::successors(start, |t| self.base_type(*t))
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Registers a property declared on `owner`.
    ///
    /// Fails with [`PropertyError::DuplicateDescriptor`] if `name` is already
    /// declared on `owner`, on one of its base types, or on one of its
    /// subtypes.
    ///
    /// # Panics
    ///
    /// Panics if more than 65,535 properties are registered.
    pub fn register<T: PropertyValue>(
        &mut self,
        owner: TypeKey,
        name: &'static str,
        metadata: PropertyMetadata<T>,
    ) -> Result<Property<T>, PropertyError> {
        let owner_name = self.type_info(owner)?.name;
        let clash = self.properties.iter().any(|r| {
            r.name == name && (self.is_subtype(owner, r.owner) || self.is_subtype(r.owner, owner))
        });
        if clash {
            return Err(PropertyError::DuplicateDescriptor {
                owner: owner_name,
                name,
            });
        }
        assert!(
            self.properties.len() < u16::MAX as usize,
            "Too many properties registered (max {})",
            u16::MAX
        );

        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let id = PropertyId::new(self.properties.len() as u16);

        self.properties.push(PropertyRegistration {
            name,
            owner,
            value_type: TypeId::of::<T>(),
            value_type_name: core::any::type_name::<T>(),
            invalidate_modes: metadata.invalidate_modes(),
            options: metadata.options(),
            metadata: Arc::new(metadata),
        });
        self.by_owner_and_name.insert((owner, name), id);

        Ok(Property::new(id, self.id))
    }

    /// Returns the number of registered properties.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns `true` if no properties are registered.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Finds the property named `name` visible on `ty`, walking base types.
    #[must_use]
    pub fn find(&self, ty: TypeKey, name: &'static str) -> Option<PropertyId> {
        self.ancestors(ty)
            .find_map(|t| self.by_owner_and_name.get(&(t, name)).copied())
    }

    /// Finds a property visible on `ty` and checks its value type.
    pub fn find_typed<T: PropertyValue>(
        &self,
        ty: TypeKey,
        name: &'static str,
    ) -> Option<Property<T>> {
        let id = self.find(ty, name)?;
        self.typed(id).ok()
    }

    /// Turns an id into a typed handle, checking the value type.
    pub fn typed<T: PropertyValue>(&self, id: PropertyId) -> Result<Property<T>, PropertyError> {
        match self.get(id) {
            Some(r) if r.value_type == TypeId::of::<T>() => Ok(Property::new(id, self.id)),
            _ => Err(PropertyError::UnknownProperty {
                id,
                expected: core::any::type_name::<T>(),
            }),
        }
    }

    /// Returns the registration for a property.
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyRegistration> {
        self.properties.get(usize::from(id.index()))
    }

    /// Returns the name of a property.
    #[must_use]
    pub fn name(&self, id: PropertyId) -> Option<&'static str> {
        self.get(id).map(PropertyRegistration::name)
    }

    /// Returns the type that declared a property.
    #[must_use]
    pub fn owner(&self, id: PropertyId) -> Option<TypeKey> {
        self.get(id).map(PropertyRegistration::owner)
    }

    /// Returns the modes a change of a property invalidates.
    #[must_use]
    pub fn invalidate_modes(&self, id: PropertyId) -> InvalidateModes {
        self.get(id)
            .map(PropertyRegistration::invalidate_modes)
            .unwrap_or_default()
    }

    /// The registration behind a typed handle, if this registry issued it.
    fn issued<T>(&self, property: Property<T>) -> Option<&PropertyRegistration> {
        if property.registry() == self.id {
            self.get(property.id())
        } else {
            None
        }
    }

    /// Returns the metadata for a typed property.
    pub fn get_metadata<T: PropertyValue>(
        &self,
        property: Property<T>,
    ) -> Result<&PropertyMetadata<T>, PropertyError> {
        self.issued(property)
            .and_then(|r| r.metadata.downcast_ref::<PropertyMetadata<T>>())
            .ok_or(PropertyError::UnknownProperty {
                id: property.id(),
                expected: core::any::type_name::<T>(),
            })
    }

    /// Returns a shared handle to the metadata for a typed property.
    ///
    /// Useful when the metadata callbacks must run while the registry's owner
    /// is mutably borrowed.
    pub fn metadata_arc<T: PropertyValue>(
        &self,
        property: Property<T>,
    ) -> Result<Arc<PropertyMetadata<T>>, PropertyError> {
        self.issued(property)
            .and_then(|r| r.metadata.clone().downcast::<PropertyMetadata<T>>().ok())
            .ok_or(PropertyError::UnknownProperty {
                id: property.id(),
                expected: core::any::type_name::<T>(),
            })
    }

    /// Returns an iterator over all registered properties.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &PropertyRegistration)> {
        self.properties.iter().enumerate().map(|(i, r)| {
            #[expect(clippy::cast_possible_truncation, reason = "index < len < u16::MAX")]
            (PropertyId::new(i as u16), r)
        })
    }

    /// Returns an iterator over the properties visible on `ty`.
    pub fn iter_visible(
        &self,
        ty: TypeKey,
    ) -> impl Iterator<Item = (PropertyId, &PropertyRegistration)> {
        self.iter().filter(move |(_, r)| self.is_subtype(ty, r.owner))
    }
}

impl fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("id", &self.id)
            .field("types", &self.types.iter().map(|t| t.name).collect::<Vec<_>>())
            .field(
                "properties",
                &self.properties.iter().map(|r| r.name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
