// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lifecycle events, property notifications, and the theme/DPI surface.

use std::fmt;
use std::sync::Arc;

use kurbo::Rect;
use understory_invalidation::{InvalidateModes, InvalidateReason};
use understory_property::PropertyId;

use crate::backend::{RenderBackend, ThemeDpiProvider};
use crate::error::TreeError;
use crate::tree::Tree;
use crate::types::{NodeId, SubscriptionId};

/// An event fired for a node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    /// A backend was installed while the node was alive.
    AttachedToComposition,
    /// The backend is going away, or the node is being removed.
    DetachingFromComposition,
    /// The node was arranged in the last pass.
    Arranged {
        /// The new arranged rectangle.
        rect: Rect,
    },
    /// The node rendered in the last pass.
    Rendered,
    /// The DPI changed.
    ThemeDpi {
        /// DPI before the change.
        old_dpi: u32,
        /// DPI after the change.
        new_dpi: u32,
    },
}

impl NodeEvent {
    /// The kind of this event, used to subscribe.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::AttachedToComposition => EventKind::AttachedToComposition,
            Self::DetachingFromComposition => EventKind::DetachingFromComposition,
            Self::Arranged { .. } => EventKind::Arranged,
            Self::Rendered => EventKind::Rendered,
            Self::ThemeDpi { .. } => EventKind::ThemeDpi,
        }
    }
}

/// Discriminant of [`NodeEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`NodeEvent::AttachedToComposition`].
    AttachedToComposition,
    /// See [`NodeEvent::DetachingFromComposition`].
    DetachingFromComposition,
    /// See [`NodeEvent::Arranged`].
    Arranged,
    /// See [`NodeEvent::Rendered`].
    Rendered,
    /// See [`NodeEvent::ThemeDpi`].
    ThemeDpi,
}

/// A property notification delivered to observers.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyNotification {
    /// The value is about to change.
    Changing {
        /// The node being written.
        node: NodeId,
        /// The property being written.
        property: PropertyId,
        /// The reason the change will invalidate with.
        reason: Arc<InvalidateReason>,
    },
    /// The value changed.
    Changed {
        /// The node written.
        node: NodeId,
        /// The property written.
        property: PropertyId,
        /// The reason the change invalidates with.
        reason: Arc<InvalidateReason>,
    },
    /// The validation messages of the property changed.
    ErrorsChanged {
        /// The node written.
        node: NodeId,
        /// The property validated.
        property: PropertyId,
        /// The new messages; empty when the value became valid.
        errors: Vec<String>,
    },
}

impl PropertyNotification {
    /// The node the notification is about.
    #[must_use]
    pub fn node(&self) -> NodeId {
        match self {
            Self::Changing { node, .. }
            | Self::Changed { node, .. }
            | Self::ErrorsChanged { node, .. } => *node,
        }
    }

    /// The property the notification is about.
    #[must_use]
    pub fn property(&self) -> PropertyId {
        match self {
            Self::Changing { property, .. }
            | Self::Changed { property, .. }
            | Self::ErrorsChanged { property, .. } => *property,
        }
    }
}

/// Handler of a [`NodeEvent`] subscription.
///
/// Receives the tree, the source node, and the event. Handlers may mutate
/// the tree; invalidations they raise during a pass land in the next pass.
pub type EventHandler = Box<dyn FnMut(&mut Tree, NodeId, &NodeEvent) + Send>;

/// Callback of a property observer.
pub type PropertyObserver = Box<dyn FnMut(&PropertyNotification) + Send>;

struct Subscription {
    id: SubscriptionId,
    source: NodeId,
    kind: EventKind,
    subscriber: Option<NodeId>,
    /// `None` while the handler runs.
    handler: Option<EventHandler>,
}

struct Observer {
    id: SubscriptionId,
    node: NodeId,
    property: Option<PropertyId>,
    subscriber: Option<NodeId>,
    callback: PropertyObserver,
}

/// Subscriptions and observers of a tree.
#[derive(Default)]
pub(crate) struct EventHub {
    next_id: u64,
    subscriptions: Vec<Subscription>,
    observers: Vec<Observer>,
}

impl EventHub {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    fn take_handler(&mut self, id: SubscriptionId) -> Option<EventHandler> {
        self.subscriptions
            .iter_mut()
            .find(|s| s.id == id)?
            .handler
            .take()
    }

    fn restore_handler(&mut self, id: SubscriptionId, handler: EventHandler) {
        // Dropped if the handler unsubscribed itself.
        if let Some(subscription) = self.subscriptions.iter_mut().find(|s| s.id == id) {
            subscription.handler = Some(handler);
        }
    }

    /// Drops subscriptions linking `a` and `b` in either direction.
    pub(crate) fn drop_between(&mut self, a: NodeId, b: NodeId) {
        let linked = |source: NodeId, subscriber: Option<NodeId>| {
            (source == a && subscriber == Some(b)) || (source == b && subscriber == Some(a))
        };
        self.subscriptions
            .retain(|s| !linked(s.source, s.subscriber));
        self.observers.retain(|o| !linked(o.node, o.subscriber));
    }

    /// Drops subscriptions from or to any of `nodes`.
    pub(crate) fn drop_nodes(&mut self, nodes: &[NodeId]) {
        let involved = |source: NodeId, subscriber: Option<NodeId>| {
            nodes.contains(&source) || subscriber.is_some_and(|s| nodes.contains(&s))
        };
        self.subscriptions
            .retain(|s| !involved(s.source, s.subscriber));
        self.observers.retain(|o| !involved(o.node, o.subscriber));
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len() + self.observers.len()
    }
}

impl Tree {
    /// Subscribes to events of kind `kind` fired on `source`.
    ///
    /// `subscriber` names the node the handler belongs to, if any: the
    /// subscription is dropped when either node is removed, or when one is
    /// detached from the other.
    pub fn subscribe(
        &mut self,
        source: NodeId,
        kind: EventKind,
        subscriber: Option<NodeId>,
        handler: impl FnMut(&mut Self, NodeId, &NodeEvent) + Send + 'static,
    ) -> Result<SubscriptionId, TreeError> {
        self.node(source)?;
        if let Some(subscriber) = subscriber {
            self.node(subscriber)?;
        }
        let id = self.events.next_id();
        self.events.subscriptions.push(Subscription {
            id,
            source,
            kind,
            subscriber,
            handler: Some(Box::new(handler)),
        });
        Ok(id)
    }

    /// Observes property notifications of `node`, for one property or all.
    ///
    /// Observers only see notifications; they cannot reach the tree.
    pub fn observe(
        &mut self,
        node: NodeId,
        property: Option<PropertyId>,
        subscriber: Option<NodeId>,
        callback: impl FnMut(&PropertyNotification) + Send + 'static,
    ) -> Result<SubscriptionId, TreeError> {
        self.node(node)?;
        if let Some(subscriber) = subscriber {
            self.node(subscriber)?;
        }
        let id = self.events.next_id();
        self.events.observers.push(Observer {
            id,
            node,
            property,
            subscriber,
            callback: Box::new(callback),
        });
        Ok(id)
    }

    /// Removes a subscription or observer.
    ///
    /// Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.events.len();
        self.events.subscriptions.retain(|s| s.id != id);
        self.events.observers.retain(|o| o.id != id);
        self.events.len() != before
    }

    /// Removes every subscription and observer owned by `subscriber`.
    pub fn unsubscribe_all(&mut self, subscriber: NodeId) -> usize {
        let before = self.events.len();
        self.events
            .subscriptions
            .retain(|s| s.subscriber != Some(subscriber));
        self.events
            .observers
            .retain(|o| o.subscriber != Some(subscriber));
        before - self.events.len()
    }

    /// Fires an event on `source`.
    ///
    /// Handlers run in subscription order. A handler is not re-entered if it
    /// causes the same event to fire again.
    pub(crate) fn fire(&mut self, source: NodeId, event: &NodeEvent) {
        let kind = event.kind();
        let ids: Vec<SubscriptionId> = self
            .events
            .subscriptions
            .iter()
            .filter(|s| s.source == source && s.kind == kind)
            .map(|s| s.id)
            .collect();
        for id in ids {
            let Some(mut handler) = self.events.take_handler(id) else {
                continue;
            };
            handler(self, source, event);
            self.events.restore_handler(id, handler);
        }
    }

    pub(crate) fn notify(&mut self, notification: &PropertyNotification) {
        let node = notification.node();
        let property = notification.property();
        for observer in &mut self.events.observers {
            if observer.node == node && observer.property.is_none_or(|p| p == property) {
                (observer.callback)(notification);
            }
        }
    }

    // =========================================================================
    // Backend and theme
    // =========================================================================

    /// Returns `true` if a render backend is installed.
    #[must_use]
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Installs, replaces, or removes the render backend.
    ///
    /// The outgoing backend gets [`NodeEvent::DetachingFromComposition`] on
    /// every node and all its resources released. The incoming backend gets
    /// [`NodeEvent::AttachedToComposition`] on every node, and every node is
    /// invalidated for render.
    pub fn set_backend(&mut self, backend: Option<Box<dyn RenderBackend>>) {
        let order = self.pre_order();
        if self.backend.is_some() {
            for &id in &order {
                self.fire(id, &NodeEvent::DetachingFromComposition);
            }
            for &id in &order {
                self.release_node_handles(id, true);
            }
        }
        self.backend = backend;
        if self.backend.is_none() {
            return;
        }
        tracing::debug!(nodes = order.len(), "render backend attached");
        for &id in &order {
            if !self.is_alive(id) {
                continue;
            }
            self.fire(id, &NodeEvent::AttachedToComposition);
            let reason = InvalidateReason::explicit(self.type_name_of(id), "backend attached");
            self.propagate(id, InvalidateModes::RENDER, reason);
        }
    }

    /// Installs the theme provider and applies its DPI.
    pub fn set_theme_provider(&mut self, provider: Option<Box<dyn ThemeDpiProvider>>) {
        self.theme = provider;
        self.refresh_theme_dpi();
    }

    /// Re-reads the DPI from the theme provider.
    ///
    /// Hosts call this when the surface reports a DPI change.
    pub fn refresh_theme_dpi(&mut self) -> bool {
        match self.theme.as_deref().map(ThemeDpiProvider::dpi) {
            Some(dpi) => self.set_dpi(dpi),
            None => false,
        }
    }

    /// Current DPI.
    #[must_use]
    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Ratio of the current DPI to the default DPI.
    #[must_use]
    pub fn scale_factor(&self) -> f64 {
        f64::from(self.dpi) / f64::from(crate::config::DEFAULT_DPI)
    }

    /// A named metric from the theme provider.
    #[must_use]
    pub fn theme_metric(&self, name: &str) -> Option<f64> {
        self.theme.as_deref()?.metric(name)
    }

    /// Changes the DPI.
    ///
    /// Every root is invalidated for measure with a DPI reason, then every
    /// node receives [`NodeEvent::ThemeDpi`] in pre-order. Returns `false`
    /// if the DPI did not change.
    pub fn set_dpi(&mut self, dpi: u32) -> bool {
        let old_dpi = self.dpi;
        if old_dpi == dpi {
            return false;
        }
        self.dpi = dpi;
        tracing::debug!(old_dpi, new_dpi = dpi, "DPI changed");
        for root in self.roots() {
            let reason = InvalidateReason::dpi_changed(self.type_name_of(root), old_dpi, dpi);
            self.propagate(root, InvalidateModes::MEASURE, reason);
        }
        let event = NodeEvent::ThemeDpi {
            old_dpi,
            new_dpi: dpi,
        };
        for id in self.pre_order() {
            self.fire(id, &event);
        }
        true
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscriptions", &self.subscriptions.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}
