// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property reads and writes on nodes.
//!
//! A write runs, in order: the thread check, the converter, the equality
//! test, the "changing" notification, the store update, the "changed"
//! notification, the descriptor's changed callback, validation, and finally
//! invalidation with the descriptor's modes (or the per-write override).

use std::sync::Arc;

use understory_invalidation::InvalidateReason;
use understory_property::{
    Property, PropertyError, PropertyId, PropertyMetadata, PropertyValue, SetOptions, ValueChange,
};

use crate::error::TreeError;
use crate::events::PropertyNotification;
use crate::tree::Tree;
use crate::types::NodeId;

impl Tree {
    /// Returns the effective value of a property: the explicit value if set,
    /// the registered default otherwise.
    pub fn get_value<T: PropertyValue>(
        &self,
        id: NodeId,
        property: Property<T>,
    ) -> Result<T, TreeError> {
        let node = self.node(id)?;
        Ok(node.store.get_or_default(property, self.registry())?.clone())
    }

    /// Returns the explicit value of a property, or `None` if it was never
    /// set or was reset.
    pub fn try_get_value<T: PropertyValue>(
        &self,
        id: NodeId,
        property: Property<T>,
    ) -> Result<Option<T>, TreeError> {
        self.registry().get_metadata(property)?;
        Ok(self.node(id)?.store.get(property).cloned())
    }

    /// Returns `true` if the property has an explicit value on the node.
    pub fn is_value_set<T: PropertyValue>(
        &self,
        id: NodeId,
        property: Property<T>,
    ) -> Result<bool, TreeError> {
        self.registry().get_metadata(property)?;
        Ok(self.node(id)?.store.is_set(property))
    }

    /// The latest validation messages of a property on a node.
    #[must_use]
    pub fn value_errors(&self, id: NodeId, property: PropertyId) -> &[String] {
        self.node(id)
            .map_or(&[] as &[String], |node| node.store.errors(property))
    }

    /// Returns `true` if any property of the node has validation messages.
    #[must_use]
    pub fn has_value_errors(&self, id: NodeId) -> bool {
        self.node(id).is_ok_and(|node| node.store.has_errors())
    }

    /// Writes a property with default options.
    ///
    /// Returns `Ok(false)` if the write was skipped because the value equals
    /// the current effective value.
    pub fn set_value<T: PropertyValue>(
        &mut self,
        id: NodeId,
        property: Property<T>,
        value: T,
    ) -> Result<bool, TreeError> {
        self.set_value_with(id, property, value, SetOptions::default())
    }

    /// Writes a property.
    ///
    /// Returns `Ok(true)` if the value was stored. Equal writes are skipped
    /// unless the options or the descriptor disable the equality test; a
    /// skipped write with [`SetFlags::FORCE_RAISE_ON_PROPERTY_CHANGED`]
    /// still raises "changed" but does not invalidate.
    ///
    /// Fails without side effects if the node or property is unknown, if the
    /// descriptor requires the owner thread and this is another thread, or if
    /// the converter rejects the value.
    ///
    /// [`SetFlags::FORCE_RAISE_ON_PROPERTY_CHANGED`]: understory_property::SetFlags::FORCE_RAISE_ON_PROPERTY_CHANGED
    pub fn set_value_with<T: PropertyValue>(
        &mut self,
        id: NodeId,
        property: Property<T>,
        value: T,
        options: SetOptions,
    ) -> Result<bool, TreeError> {
        let metadata = self.registry().metadata_arc(property)?;
        self.node(id)?;
        self.check_thread(property.id(), &metadata)?;
        let value = metadata
            .convert(value)
            .map_err(|message| PropertyError::InvalidValue {
                property: self.property_name(property.id()),
                message,
            })?;

        let old = self.get_value(id, property)?;
        let reason = self.property_reason(id, property.id());
        if options.tests_equality() && metadata.tests_equality() && old == value {
            if options.forces_changed() {
                self.notify(&PropertyNotification::Changed {
                    node: id,
                    property: property.id(),
                    reason,
                });
            }
            return Ok(false);
        }

        if options.raises_changing() {
            self.notify(&PropertyNotification::Changing {
                node: id,
                property: property.id(),
                reason: reason.clone(),
            });
        }
        self.node_mut(id)?.store.set(property, value.clone());
        if options.raises_changed() {
            self.notify(&PropertyNotification::Changed {
                node: id,
                property: property.id(),
                reason: reason.clone(),
            });
        }
        metadata.on_changed(&ValueChange {
            owner: &id,
            property: property.id(),
            old_value: &old,
            new_value: &value,
        });
        self.revalidate(id, property.id(), &metadata, &value, options);

        let modes = options
            .invalidate_modes
            .unwrap_or_else(|| metadata.invalidate_modes());
        self.propagate(id, modes, reason);
        Ok(true)
    }

    /// Removes the explicit value of a property, reverting to the default.
    ///
    /// Returns the removed value. If the effective value changes, the write
    /// is notified, validated, and invalidates like [`Tree::set_value`].
    pub fn reset_value<T: PropertyValue>(
        &mut self,
        id: NodeId,
        property: Property<T>,
    ) -> Result<Option<T>, TreeError> {
        let metadata = self.registry().metadata_arc(property)?;
        if !self.node(id)?.store.is_set(property) {
            return Ok(None);
        }
        self.check_thread(property.id(), &metadata)?;

        let old = self.get_value(id, property)?;
        let default = metadata.default_value();
        if metadata.tests_equality() && old == *default {
            return Ok(self.node_mut(id)?.store.reset(property));
        }

        let reason = self.property_reason(id, property.id());
        self.notify(&PropertyNotification::Changing {
            node: id,
            property: property.id(),
            reason: reason.clone(),
        });
        let previous = self.node_mut(id)?.store.reset(property);
        self.notify(&PropertyNotification::Changed {
            node: id,
            property: property.id(),
            reason: reason.clone(),
        });
        metadata.on_changed(&ValueChange {
            owner: &id,
            property: property.id(),
            old_value: &old,
            new_value: default,
        });
        self.revalidate(id, property.id(), &metadata, default, SetOptions::default());
        self.propagate(id, metadata.invalidate_modes(), reason);
        Ok(previous)
    }

    fn check_thread<T>(
        &self,
        property: PropertyId,
        metadata: &PropertyMetadata<T>,
    ) -> Result<(), PropertyError> {
        if metadata.writes_require_main_thread() && !self.is_owner_thread() {
            let name = self.property_name(property);
            tracing::warn!(property = name, "write from a thread that does not own the tree");
            return Err(PropertyError::ThreadAffinityViolation { property: name });
        }
        Ok(())
    }

    fn revalidate<T>(
        &mut self,
        id: NodeId,
        property: PropertyId,
        metadata: &PropertyMetadata<T>,
        value: &T,
        options: SetOptions,
    ) {
        let errors = metadata.validate(value);
        let Ok(node) = self.node_mut(id) else {
            return;
        };
        let changed = node.store.set_errors(property, errors.clone());
        if (changed && options.raises_errors_changed()) || options.forces_errors_changed() {
            self.notify(&PropertyNotification::ErrorsChanged {
                node: id,
                property,
                errors,
            });
        }
    }

    fn property_name(&self, property: PropertyId) -> &'static str {
        self.registry().name(property).unwrap_or("?")
    }

    fn property_reason(&self, id: NodeId, property: PropertyId) -> Arc<InvalidateReason> {
        let declaring = self
            .registry()
            .owner(property)
            .map_or("?", |owner| self.registry().type_name(owner));
        InvalidateReason::property_changed(
            self.type_name_of(id),
            declaring,
            self.property_name(property),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Mutex;

    use understory_invalidation::{InvalidateModes, Stage};
    use understory_property::{PropertyMetadataBuilder, SetFlags};

    use crate::visual::Container;

    use super::*;

    #[test]
    fn opacity_is_clamped_and_nan_rejected() {
        let mut tree = Tree::default();
        let node = tree.insert(tree.types().visual, Container).unwrap();
        let opacity = tree.properties().opacity;

        // Clamped to the default, so nothing changes.
        assert!(!tree.set_value(node, opacity, 3.0).unwrap());
        assert!(tree.set_value(node, opacity, -2.0).unwrap());
        assert_eq!(tree.get_value(node, opacity).unwrap(), 0.0);

        let err = tree.set_value(node, opacity, f64::NAN).unwrap_err();
        assert!(matches!(
            err,
            TreeError::Property(PropertyError::InvalidValue {
                property: "Opacity",
                ..
            })
        ));
        assert_eq!(tree.get_value(node, opacity).unwrap(), 0.0);
    }

    #[test]
    fn notifications_follow_the_write() {
        let mut tree = Tree::default();
        let node = tree.insert(tree.types().visual, Container).unwrap();
        let opacity = tree.properties().opacity;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        tree.observe(node, Some(opacity.id()), None, move |n| {
            let tag = match n {
                PropertyNotification::Changing { .. } => "changing",
                PropertyNotification::Changed { .. } => "changed",
                PropertyNotification::ErrorsChanged { .. } => "errors",
            };
            sink.lock().unwrap().push(tag);
        })
        .unwrap();

        tree.set_value(node, opacity, 0.5).unwrap();
        tree.set_value(node, opacity, 0.5).unwrap();
        let forced = SetOptions::new().with_flags(SetFlags::FORCE_RAISE_ON_PROPERTY_CHANGED);
        assert!(!tree.set_value_with(node, opacity, 0.5, forced).unwrap());
        let quiet = SetOptions::new().with_flags(
            SetFlags::DONT_RAISE_ON_PROPERTY_CHANGING | SetFlags::DONT_RAISE_ON_PROPERTY_CHANGED,
        );
        assert!(tree.set_value_with(node, opacity, 0.25, quiet).unwrap());

        assert_eq!(*seen.lock().unwrap(), ["changing", "changed", "changed"]);
    }

    #[test]
    fn validation_messages_are_tracked() {
        let mut tree = Tree::default();
        let visual = tree.types().visual;
        let width = tree
            .registry_mut()
            .register(
                visual,
                "MinWidth",
                PropertyMetadataBuilder::new(0.0_f64)
                    .invalidates(InvalidateModes::MEASURE)
                    .validate(|v: &f64| {
                        if *v < 0.0 {
                            vec!["must not be negative".into()]
                        } else {
                            Vec::new()
                        }
                    })
                    .build(),
            )
            .unwrap();
        let node = tree.insert(visual, Container).unwrap();
        let errors = Arc::new(Mutex::new(0));
        let count = errors.clone();
        tree.observe(node, None, None, move |n| {
            if matches!(n, PropertyNotification::ErrorsChanged { .. }) {
                *count.lock().unwrap() += 1;
            }
        })
        .unwrap();

        tree.set_value(node, width, -1.0).unwrap();
        assert_eq!(tree.value_errors(node, width.id()), ["must not be negative"]);
        assert!(tree.has_value_errors(node));
        tree.set_value(node, width, -2.0).unwrap();
        tree.set_value(node, width, 5.0).unwrap();
        assert!(!tree.has_value_errors(node));
        assert_eq!(*errors.lock().unwrap(), 2);
    }

    #[test]
    fn override_modes_replace_the_descriptor() {
        let mut tree = Tree::default();
        let node = tree.insert(tree.types().visual, Container).unwrap();
        tree.run_pass();
        let opacity = tree.properties().opacity;
        let options = SetOptions::new().with_invalidate_modes(InvalidateModes::MEASURE);
        tree.set_value_with(node, opacity, 0.5, options).unwrap();
        assert!(tree.needs(node, Stage::Measure));
    }

    #[test]
    fn try_get_value_sees_explicit_values_only() {
        let mut tree = Tree::default();
        let node = tree.insert(tree.types().visual, Container).unwrap();
        let opacity = tree.properties().opacity;
        assert_eq!(tree.try_get_value(node, opacity).unwrap(), None);
        tree.set_value(node, opacity, 1.0).unwrap();
        assert_eq!(tree.try_get_value(node, opacity).unwrap(), None);
        tree.set_value(node, opacity, 0.5).unwrap();
        assert_eq!(tree.try_get_value(node, opacity).unwrap(), Some(0.5));
        assert_eq!(tree.reset_value(node, opacity).unwrap(), Some(0.5));
        assert_eq!(tree.get_value(node, opacity).unwrap(), 1.0);
        assert!(!tree.is_value_set(node, opacity).unwrap());
    }

    fn record_notifications(tree: &mut Tree, node: NodeId) -> Arc<Mutex<Vec<&'static str>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        tree.observe(node, None, None, move |n| {
            let tag = match n {
                PropertyNotification::Changing { .. } => "changing",
                PropertyNotification::Changed { .. } => "changed",
                PropertyNotification::ErrorsChanged { .. } => "errors",
            };
            sink.lock().unwrap().push(tag);
        })
        .unwrap();
        seen
    }

    #[test]
    fn handles_from_another_tree_are_rejected() {
        let mut first = Tree::default();
        let mut second = Tree::default();
        let first_visual = first.types().visual;
        let second_visual = second.types().visual;
        let width = first
            .registry_mut()
            .register(first_visual, "Width", PropertyMetadataBuilder::new(0.0_f64).build())
            .unwrap();
        let height = second
            .registry_mut()
            .register(second_visual, "Height", PropertyMetadataBuilder::new(5.0_f64).build())
            .unwrap();
        assert_eq!(width.id(), height.id());
        let node = second.insert(second_visual, Container).unwrap();

        let err = second.set_value(node, width, 42.0).unwrap_err();
        assert!(matches!(
            err,
            TreeError::Property(PropertyError::UnknownProperty { .. })
        ));
        assert!(second.get_value(node, width).is_err());
        assert!(second.try_get_value(node, width).is_err());
        assert!(second.is_value_set(node, width).is_err());
        assert!(second.reset_value(node, width).is_err());
        assert_eq!(second.get_value(node, height).unwrap(), 5.0);
        assert!(!second.is_value_set(node, height).unwrap());

        assert!(second.insert(first_visual, Container).is_err());
    }

    #[test]
    fn equal_writes_run_in_full_without_the_equality_test() {
        let mut tree = Tree::default();
        let node = tree.insert(tree.types().visual, Container).unwrap();
        tree.run_pass();
        let opacity = tree.properties().opacity;
        let seen = record_notifications(&mut tree, node);

        let always = SetOptions::new().with_flags(SetFlags::DONT_TEST_VALUES_FOR_EQUALITY);
        assert!(tree.set_value_with(node, opacity, 1.0, always).unwrap());
        assert_eq!(*seen.lock().unwrap(), ["changing", "changed"]);
        assert!(tree.is_value_set(node, opacity).unwrap());
        assert!(tree.needs(node, Stage::Render));
        assert!(!tree.needs(node, Stage::Measure));
    }

    #[test]
    fn changed_callback_sees_owner_new_and_old() {
        let mut tree = Tree::default();
        let visual = tree.types().visual;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let spacing = tree
            .registry_mut()
            .register(
                visual,
                "Spacing",
                PropertyMetadataBuilder::new(2.0_f64)
                    .on_changed(move |change| {
                        let owner = *change.owner.downcast_ref::<NodeId>().unwrap();
                        sink.lock()
                            .unwrap()
                            .push((owner, *change.new_value, *change.old_value));
                    })
                    .build(),
            )
            .unwrap();
        let node = tree.insert(visual, Container).unwrap();

        tree.set_value(node, spacing, 4.0).unwrap();
        tree.set_value(node, spacing, 4.0).unwrap();
        tree.reset_value(node, spacing).unwrap();
        assert_eq!(*calls.lock().unwrap(), [(node, 4.0, 2.0), (node, 2.0, 4.0)]);
    }

    #[test]
    fn changed_callback_panic_keeps_the_committed_value() {
        let mut tree = Tree::default();
        let visual = tree.types().visual;
        let limit = tree
            .registry_mut()
            .register(
                visual,
                "Limit",
                PropertyMetadataBuilder::new(0.0_f64)
                    .on_changed(|change| {
                        assert!(*change.new_value <= 100.0, "limit out of range");
                    })
                    .build(),
            )
            .unwrap();
        let node = tree.insert(visual, Container).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| tree.set_value(node, limit, 200.0)));
        assert!(result.is_err());
        assert_eq!(tree.get_value(node, limit).unwrap(), 200.0);
        assert!(tree.is_value_set(node, limit).unwrap());
    }

    #[test]
    fn errors_changed_can_be_suppressed_or_forced() {
        let mut tree = Tree::default();
        let visual = tree.types().visual;
        let inset = tree
            .registry_mut()
            .register(
                visual,
                "Inset",
                PropertyMetadataBuilder::new(0.0_f64)
                    .validate(|v: &f64| {
                        if *v < 0.0 {
                            vec!["must not be negative".into()]
                        } else {
                            Vec::new()
                        }
                    })
                    .build(),
            )
            .unwrap();
        let node = tree.insert(visual, Container).unwrap();
        let seen = record_notifications(&mut tree, node);
        let errors_raised = || seen.lock().unwrap().iter().filter(|t| **t == "errors").count();

        let quiet = SetOptions::new().with_flags(SetFlags::DONT_RAISE_ON_ERRORS_CHANGED);
        tree.set_value_with(node, inset, -1.0, quiet).unwrap();
        assert_eq!(tree.value_errors(node, inset.id()), ["must not be negative"]);
        assert_eq!(errors_raised(), 0);

        // Same messages as before, raised anyway.
        let forced = SetOptions::new().with_flags(SetFlags::FORCE_RAISE_ON_ERRORS_CHANGED);
        tree.set_value_with(node, inset, -2.0, forced).unwrap();
        assert_eq!(errors_raised(), 1);

        tree.set_value(node, inset, -3.0).unwrap();
        assert_eq!(errors_raised(), 1);
        tree.set_value(node, inset, 3.0).unwrap();
        assert_eq!(errors_raised(), 2);
        assert!(!tree.has_value_errors(node));
    }
}
