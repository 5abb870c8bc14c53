// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property metadata definitions.
//!
//! This module provides [`PropertyMetadata`] for storing a descriptor's
//! configuration and [`PropertyMetadataBuilder`] for ergonomic construction.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;

use understory_invalidation::InvalidateModes;

use crate::id::PropertyId;

bitflags::bitflags! {
    /// Static behavior flags of a property descriptor.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct PropertyOptions: u8 {
        /// Writes are only allowed on the thread that owns the tree.
        const WRITE_REQUIRES_MAIN_THREAD = 1 << 0;
        /// Every write goes through, even if it stores an equal value.
        const DONT_TEST_VALUES_FOR_EQUALITY = 1 << 1;
    }
}

/// A committed value change, as seen by a changed callback.
#[derive(Debug)]
pub struct ValueChange<'a, T> {
    /// The object whose value changed.
    ///
    /// The concrete type depends on who owns the store; trees pass their node id.
    pub owner: &'a dyn Any,
    /// The property that changed.
    pub property: PropertyId,
    /// The effective value before the change.
    pub old_value: &'a T,
    /// The effective value after the change.
    pub new_value: &'a T,
}

/// Callback invoked after a property value changed.
pub type PropertyChangedCallback<T> = Box<dyn Fn(&ValueChange<'_, T>) + Send + Sync>;

/// Callback converting or normalizing a value before it is stored.
///
/// Returning an error rejects the write.
pub type ConvertValueCallback<T> = Box<dyn Fn(T) -> Result<T, String> + Send + Sync>;

/// Callback producing validation messages for a stored value.
///
/// Validation never rejects a write; an empty list means the value is valid.
pub type ValidateValueCallback<T> = Box<dyn Fn(&T) -> Vec<String> + Send + Sync>;

/// Metadata for a dependency property.
///
/// Holds the default value, the [`InvalidateModes`] a change applies, static
/// [`PropertyOptions`], and the optional converter, validator, and changed
/// callback.
///
/// # Example
///
/// ```rust
/// use understory_invalidation::InvalidateModes;
/// use understory_property::PropertyMetadataBuilder;
///
/// let metadata = PropertyMetadataBuilder::new(100.0_f64)
///     .invalidates(InvalidateModes::MEASURE)
///     .build();
///
/// assert_eq!(metadata.default_value(), &100.0);
/// assert_eq!(metadata.invalidate_modes(), InvalidateModes::MEASURE);
/// ```
pub struct PropertyMetadata<T> {
    default_value: T,
    invalidate_modes: InvalidateModes,
    options: PropertyOptions,
    convert_callback: Option<ConvertValueCallback<T>>,
    validate_callback: Option<ValidateValueCallback<T>>,
    changed_callback: Option<PropertyChangedCallback<T>>,
}

impl<T> PropertyMetadata<T> {
    /// Creates metadata with the given default value and nothing else.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        PropertyMetadataBuilder::new(default_value).build()
    }

    /// Returns a reference to the default value.
    #[must_use]
    #[inline]
    pub fn default_value(&self) -> &T {
        &self.default_value
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

    /// Returns `true` if writes are restricted to the owning thread.
    #[must_use]
    #[inline]
    pub fn writes_require_main_thread(&self) -> bool {
        self.options
            .contains(PropertyOptions::WRITE_REQUIRES_MAIN_THREAD)
    }

    /// Returns `true` unless equal writes must still go through.
    #[must_use]
    #[inline]
    pub fn tests_equality(&self) -> bool {
        !self
            .options
            .contains(PropertyOptions::DONT_TEST_VALUES_FOR_EQUALITY)
    }

    /// Runs the converter, if any.
    pub fn convert(&self, value: T) -> Result<T, String> {
        match &self.convert_callback {
            Some(convert) => convert(value),
            None => Ok(value),
        }
    }

    /// Returns the validation messages for a value; empty without a validator.
    #[must_use]
    pub fn validate(&self, value: &T) -> Vec<String> {
        self.validate_callback
            .as_ref()
            .map(|validate| validate(value))
            .unwrap_or_default()
    }

    /// Invokes the changed callback if one is set.
    #[inline]
    pub fn on_changed(&self, change: &ValueChange<'_, T>) {
        if let Some(callback) = &self.changed_callback {
            callback(change);
        }
    }

    /// Returns whether a converter is set.
    #[must_use]
    pub fn has_converter(&self) -> bool {
        self.convert_callback.is_some()
    }

    /// Returns whether a validator is set.
    #[must_use]
    pub fn has_validator(&self) -> bool {
        self.validate_callback.is_some()
    }

    /// Returns whether a changed callback is set.
    #[must_use]
    pub fn has_changed_callback(&self) -> bool {
        self.changed_callback.is_some()
    }
}

impl<T: fmt::Debug> fmt::Debug for PropertyMetadata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadata")
            .field("default_value", &self.default_value)
            .field("invalidate_modes", &self.invalidate_modes)
            .field("options", &self.options)
            .field("has_converter", &self.convert_callback.is_some())
            .field("has_validator", &self.validate_callback.is_some())
            .field("has_changed_callback", &self.changed_callback.is_some())
            .finish()
    }
}

/// Builder for [`PropertyMetadata`].
///
/// # Example
///
/// ```rust
/// use understory_invalidation::InvalidateModes;
/// use understory_property::{PropertyMetadataBuilder, PropertyOptions};
///
/// let opacity = PropertyMetadataBuilder::new(1.0_f64)
///     .invalidates(InvalidateModes::RENDER)
///     .options(PropertyOptions::WRITE_REQUIRES_MAIN_THREAD)
///     .convert(|v: f64| {
///         if v.is_nan() {
///             Err("opacity must be a number".into())
///         } else {
///             Ok(v.clamp(0.0, 1.0))
///         }
///     })
///     .build();
///
/// assert_eq!(opacity.convert(2.0), Ok(1.0));
/// assert!(opacity.convert(f64::NAN).is_err());
/// ```
pub struct PropertyMetadataBuilder<T> {
    metadata: PropertyMetadata<T>,
}

impl<T: fmt::Debug> fmt::Debug for PropertyMetadataBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadataBuilder")
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl<T> PropertyMetadataBuilder<T> {
    /// Creates a new builder with the given default value.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        Self {
            metadata: PropertyMetadata {
                default_value,
                invalidate_modes: InvalidateModes::NONE,
                options: PropertyOptions::empty(),
                convert_callback: None,
                validate_callback: None,
                changed_callback: None,
            },
        }
    }

    /// Sets the modes a change of this property invalidates.
    #[must_use]
    pub fn invalidates(mut self, modes: InvalidateModes) -> Self {
        self.metadata.invalidate_modes = modes;
        self
    }

    /// Adds static options.
    #[must_use]
    pub fn options(mut self, options: PropertyOptions) -> Self {
        self.metadata.options |= options;
        self
    }

    /// Sets a converter run on every written value before it is compared and stored.
    #[must_use]
    pub fn convert<F>(mut self, callback: F) -> Self
    where
        F: Fn(T) -> Result<T, String> + Send + Sync + 'static,
    {
        self.metadata.convert_callback = Some(Box::new(callback));
        self
    }

    /// Sets a validator run after every committed change.
    #[must_use]
    pub fn validate<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) -> Vec<String> + Send + Sync + 'static,
    {
        self.metadata.validate_callback = Some(Box::new(callback));
        self
    }

    /// Sets a callback invoked after every committed change.
    #[must_use]
    pub fn on_changed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ValueChange<'_, T>) + Send + Sync + 'static,
    {
        self.metadata.changed_callback = Some(Box::new(callback));
        self
    }

    /// Builds the [`PropertyMetadata`].
    #[must_use]
    pub fn build(self) -> PropertyMetadata<T> {
        self.metadata
    }
}
