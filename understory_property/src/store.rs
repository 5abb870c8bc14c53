// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node sparse property storage.
//!
//! This module provides [`PropertyStore`] for storing explicitly set property
//! values on a node, using sparse storage to minimize memory for nodes with
//! few properties set.
//!
//! # Implementation
//!
//! Following the `WinUI` approach, we use a sorted vector with binary search rather
//! than a hash map. This provides:
//!
//! - Better cache locality (contiguous memory)
//! - Lower memory overhead (no hash buckets)
//! - O(log n) lookup, which is fast for typical property counts (5-20)
//! - Inline storage for small property sets via `SmallVec`

use alloc::string::String;
use alloc::vec::Vec;
use smallvec::SmallVec;

use crate::error::PropertyError;
use crate::id::{Property, PropertyId};
use crate::registry::PropertyRegistry;
use crate::value::{ErasedValue, PropertyValue};

/// Default inline capacity for property entries.
///
/// Most visuals have fewer than 8 non-default properties set,
/// so this avoids heap allocation in the common case.
const INLINE_CAPACITY: usize = 8;

/// Per-node sparse storage for property values.
///
/// The presence of an entry means the property is *explicitly set*; reading
/// an absent property yields the registry default without marking it set.
/// The store also keeps the latest validation messages per property.
///
/// The store is a plain container: it does not compare, notify, or
/// invalidate. Those steps belong to whoever owns the node.
///
/// # Example
///
/// ```rust
/// use understory_property::{PropertyMetadataBuilder, PropertyRegistry, PropertyStore};
///
/// let mut registry = PropertyRegistry::new();
/// let visual = registry.register_type("Visual", None).unwrap();
/// let width = registry
///     .register(visual, "Width", PropertyMetadataBuilder::new(0.0_f64).build())
///     .unwrap();
///
/// let mut store = PropertyStore::<u32>::new(1);
///
/// // Not set: the default is read, and the property stays unset.
/// assert_eq!(store.get_or_default(width, &registry), Ok(&0.0));
/// assert!(!store.is_set(width));
///
/// store.set(width, 100.0);
/// assert_eq!(store.get_or_default(width, &registry), Ok(&100.0));
///
/// assert_eq!(store.reset(width), Some(100.0));
/// assert!(!store.is_set(width));
/// ```
#[derive(Debug)]
pub struct PropertyStore<K> {
    /// Explicit values, sorted by [`PropertyId`] for binary search lookup.
    entries: SmallVec<[(PropertyId, ErasedValue); INLINE_CAPACITY]>,
    /// Validation messages, sorted by [`PropertyId`]; only non-empty lists are kept.
    errors: Vec<(PropertyId, Vec<String>)>,
    owner: K,
}

impl<K: Copy + Eq> PropertyStore<K> {
    /// Creates a new property store for the given owner key.
    #[must_use]
    pub fn new(owner: K) -> Self {
        Self {
            entries: SmallVec::new(),
            errors: Vec::new(),
            owner,
        }
    }

    /// Returns the owner key of this store.
    #[must_use]
    #[inline]
    pub fn owner(&self) -> K {
        self.owner
    }

    /// Returns `true` if no properties have explicit values set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of properties with explicit values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the property IDs that have values set, in ascending order.
    pub fn property_ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    #[inline]
    fn find_entry(&self, id: PropertyId) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&id, |(pid, _)| *pid)
    }

    /// Returns the erased explicit value of a property.
    #[must_use]
    pub fn get_erased(&self, id: PropertyId) -> Option<&ErasedValue> {
        self.find_entry(id).ok().map(|idx| &self.entries[idx].1)
    }

    /// Returns the explicit value, if set.
    #[must_use]
    #[inline]
    pub fn get<T: PropertyValue>(&self, property: Property<T>) -> Option<&T> {
        self.get_erased(property.id())
            .and_then(ErasedValue::downcast_ref)
    }

    /// Returns the explicit value, or the registry default when unset.
    ///
    /// The default is borrowed from the registry; reading it does not mark the
    /// property as set.
    pub fn get_or_default<'a, T: PropertyValue>(
        &'a self,
        property: Property<T>,
        registry: &'a PropertyRegistry,
    ) -> Result<&'a T, PropertyError> {
        let metadata = registry.get_metadata(property)?;
        Ok(self.get(property).unwrap_or_else(|| metadata.default_value()))
    }

    /// Stores an explicit value.
    ///
    /// Returns the previous explicit value, if there was one.
    pub fn set<T: PropertyValue>(&mut self, property: Property<T>, value: T) -> Option<T> {
        let value = ErasedValue::new(value);
        match self.find_entry(property.id()) {
            Ok(idx) => {
                let old = core::mem::replace(&mut self.entries[idx].1, value);
                old.downcast().ok()
            }
            Err(idx) => {
                self.entries.insert(idx, (property.id(), value));
                None
            }
        }
    }

    /// Removes the explicit value, reverting to the default.
    ///
    /// Returns the removed value, if there was one.
    pub fn reset<T: PropertyValue>(&mut self, property: Property<T>) -> Option<T> {
        let idx = self.find_entry(property.id()).ok()?;
        self.entries.remove(idx).1.downcast().ok()
    }

    /// Returns `true` if the property has an explicit value.
    #[must_use]
    #[inline]
    pub fn is_set<T>(&self, property: Property<T>) -> bool {
        self.find_entry(property.id()).is_ok()
    }

    /// Returns the latest validation messages for a property.
    #[must_use]
    pub fn errors(&self, id: PropertyId) -> &[String] {
        self.errors
            .binary_search_by_key(&id, |(pid, _)| *pid)
            .map_or(&[] as &[String], |idx| self.errors[idx].1.as_slice())
    }

    /// Returns `true` if any property has validation messages.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Replaces the validation messages for a property.
    ///
    /// Returns `true` if the messages differ from the previous ones.
    pub fn set_errors(&mut self, id: PropertyId, messages: Vec<String>) -> bool {
        match self.errors.binary_search_by_key(&id, |(pid, _)| *pid) {
            Ok(idx) if messages.is_empty() => {
                self.errors.remove(idx);
                true
            }
            Ok(idx) => {
                let changed = self.errors[idx].1 != messages;
                self.errors[idx].1 = messages;
                changed
            }
            Err(_) if messages.is_empty() => false,
            Err(idx) => {
                self.errors.insert(idx, (id, messages));
                true
            }
        }
    }

    /// Removes every value and validation message.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.errors.clear();
    }
}

impl<K: Copy + Eq> Clone for PropertyStore<K> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            errors: self.errors.clone(),
            owner: self.owner,
        }
    }
}
