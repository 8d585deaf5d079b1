// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Adapter for Understory Element Tree.
//!
//! ## Feature
//!
//! Enable with `element_tree_adapter`.
//!
//! ## Notes
//!
//! - [`Tree`] is a [`HostTree`]: a node has a lifecycle if it is live and
//!   carries [`ElementFlags::LIFECYCLE`].
//! - [`NodeId`] converts into [`HostId`] through its packed bits, so stale ids
//!   never alias a live node's registrations.
//! - [`ElementRef`] is both an [`AttributeTarget`] and a [`StyleTarget`].
//! - The lifecycle helpers play the part of the owning framework: they mutate
//!   the tree and drive activation, deactivation, and repair on the
//!   [`Registry`] in the right order.

use understory_element_tree::{Element, ElementFlags, ElementRef, NodeId, Tree};

use crate::binding::{AttributeTarget, StyleTarget};
use crate::registry::Registry;
use crate::types::{HostId, HostTree};

impl From<NodeId> for HostId {
    fn from(id: NodeId) -> Self {
        Self(id.to_bits())
    }
}

/// The element tree node a host id was made from.
pub fn node_id(host: HostId) -> NodeId {
    NodeId::from_bits(host.0)
}

impl HostTree for Tree {
    fn parent_of(&self, host: HostId) -> Option<HostId> {
        self.parent(node_id(host)).map(HostId::from)
    }

    fn has_lifecycle(&self, host: HostId) -> bool {
        self.flags(node_id(host))
            .is_some_and(|f| f.contains(ElementFlags::LIFECYCLE))
    }

    fn type_name(&self, host: HostId) -> String {
        self.tag(node_id(host)).unwrap_or("<stale>").to_string()
    }
}

impl AttributeTarget for ElementRef {
    fn set_attribute(&self, name: &str, value: &str) {
        Self::set_attribute(self, name, value);
    }

    fn remove_attribute(&self, name: &str) {
        Self::remove_attribute(self, name);
    }
}

impl StyleTarget for ElementRef {
    fn set_style_property(&self, name: &str, value: &str) {
        Self::set_style_property(self, name, value);
    }

    fn remove_style_property(&self, name: &str) {
        Self::remove_style_property(self, name);
    }
}

/// Activate every registration in the subtree of `root`, parents first.
pub fn activate_subtree(registry: &Registry, tree: &Tree, root: NodeId) {
    for id in tree.subtree(root) {
        registry.activate_host(id.into(), tree);
    }
}

/// Deactivate every registration in the subtree of `root`, children first.
pub fn deactivate_subtree(registry: &Registry, tree: &Tree, root: NodeId) {
    for id in tree.subtree(root).into_iter().rev() {
        registry.deactivate_host(id.into());
    }
}

/// Connect a root to the live document and activate its subtree.
pub fn connect_root(registry: &Registry, tree: &mut Tree, root: NodeId) {
    if tree.is_connected(root) || tree.parent(root).is_some() {
        return;
    }
    tree.set_root_connected(root, true);
    activate_subtree(registry, tree, root);
}

/// Deactivate a root's subtree and disconnect it from the live document.
pub fn disconnect_root(registry: &Registry, tree: &mut Tree, root: NodeId) {
    if !tree.is_connected(root) || tree.parent(root).is_some() {
        return;
    }
    deactivate_subtree(registry, tree, root);
    tree.set_root_connected(root, false);
}

/// Insert an element; if it lands in a connected subtree, activate it.
///
/// Registrations must already exist for the new id to be activated, so callers
/// that register on insert typically insert under a disconnected parent, or
/// call [`Registry::activate_host`] themselves afterwards.
pub fn insert(
    registry: &Registry,
    tree: &mut Tree,
    parent: Option<NodeId>,
    element: Element,
) -> NodeId {
    let id = tree.insert(parent, element);
    if tree.is_connected(id) {
        registry.activate_host(id.into(), tree);
    }
    id
}

/// Remove a subtree: deactivate it children first, then release every removed
/// host's registrations.
pub fn remove(registry: &Registry, tree: &mut Tree, id: NodeId) -> Vec<NodeId> {
    if tree.is_connected(id) {
        deactivate_subtree(registry, tree, id);
    }
    let removed = tree.remove(id);
    for &gone in &removed {
        registry.release_host(gone.into());
    }
    removed
}

/// Move a subtree under a new parent and bring its registrations up to date.
///
/// Staying connected repairs every host in the subtree, so consumers pair with
/// their new nearest providers. Leaving or entering the live document
/// deactivates or activates instead. Returns false if the tree rejected the move.
pub fn reparent(registry: &Registry, tree: &mut Tree, id: NodeId, new_parent: Option<NodeId>) -> bool {
    let was_connected = tree.is_connected(id);
    if !tree.reparent(id, new_parent) {
        return false;
    }
    match (was_connected, tree.is_connected(id)) {
        (true, true) => {
            for host in tree.subtree(id) {
                registry.repair_host(host.into(), tree);
            }
        }
        (true, false) => deactivate_subtree(registry, tree, id),
        (false, true) => activate_subtree(registry, tree, id),
        (false, false) => {}
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::AttributeBindingController;
    use crate::context::create_context;
    use crate::protocol::Activatable;

    #[test]
    fn host_ids_round_trip_and_stale_ids_have_no_lifecycle() {
        let mut tree = Tree::new();
        let root = tree.insert(None, Element::new("media-controller"));
        let text = tree.insert(Some(root), Element::inert("#text"));
        let host = HostId::from(text);
        assert_eq!(node_id(host), text);
        assert_eq!(tree.parent_of(host), Some(HostId::from(root)));
        assert!(!tree.has_lifecycle(host));
        assert!(tree.has_lifecycle(root.into()));

        tree.remove(text);
        let reused = tree.insert(Some(root), Element::new("media-play-button"));
        assert_ne!(HostId::from(reused), host);
        assert_eq!(tree.type_name(host), "<stale>");
    }

    #[test]
    fn element_ref_is_an_output_target() {
        let mut tree = Tree::new();
        let root = tree.insert(None, Element::new("media-controller"));
        let el = tree.element(root).unwrap();
        AttributeTarget::set_attribute(&el, "mediamuted", "");
        StyleTarget::set_style_property(&el, "--media-range-fill", "40%");
        assert!(el.has_attribute("mediamuted"));
        assert_eq!(el.style_property("--media-range-fill").as_deref(), Some("40%"));
        AttributeTarget::remove_attribute(&el, "mediamuted");
        assert!(!el.has_attribute("mediamuted"));
    }

    #[test]
    fn remove_releases_registrations() {
        let registry = Registry::new();
        let mut tree = Tree::new();
        let root = tree.insert(None, Element::new("media-controller"));
        let bar = tree.insert(Some(root), Element::new("media-control-bar"));
        let button = tree.insert(Some(bar), Element::new("media-mute-button"));

        let ctx = create_context(false);
        let p = ctx.make_provider(&registry, &tree, root.into()).unwrap();
        let c = ctx.make_consumer(&registry, &tree, button.into()).unwrap();
        connect_root(&registry, &mut tree, root);
        p.set(true);
        assert!(c.value());

        let removed = remove(&registry, &mut tree, bar);
        assert_eq!(removed, vec![button, bar]);
        assert!(!c.value());
        assert_eq!(p.consumer_count(), 0);
        assert_eq!(registry.registration_count(button.into()), 0);
    }

    #[test]
    fn lifecycle_helpers_reach_binding_controllers() {
        let registry = Registry::new();
        let mut tree = Tree::new();
        let root = tree.insert(None, Element::new("media-controller"));
        let bar = tree.insert(Some(root), Element::new("media-control-bar"));
        let play = tree.insert(Some(bar), Element::new("media-play-button"));
        let dialog = tree.insert(None, Element::new("media-chrome-dialog"));

        let active = create_context(false);
        let main = active.make_provider(&registry, &tree, root.into()).unwrap();
        let overlay = active.make_provider(&registry, &tree, dialog.into()).unwrap();
        let el = tree.element(play).unwrap();
        let controller = AttributeBindingController::attributes(&registry, play.into(), el.clone());
        controller.bind(&tree, &active, "active").unwrap();
        connect_root(&registry, &mut tree, root);
        connect_root(&registry, &mut tree, dialog);
        overlay.set(true);
        assert!(controller.is_active());
        assert!(main.has_consumer_on(play.into()));
        assert!(!el.has_attribute("active"));

        assert!(reparent(&registry, &mut tree, bar, Some(dialog)));
        assert!(overlay.has_consumer_on(play.into()));
        assert!(!main.has_consumer_on(play.into()));
        assert_eq!(el.attribute("active").as_deref(), Some(""));

        remove(&registry, &mut tree, bar);
        assert!(!controller.is_active());
        assert_eq!(overlay.consumer_count(), 0);
        assert!(!el.has_attribute("active"));
        overlay.set(false);
        overlay.set(true);
        assert!(!el.has_attribute("active"), "a removed element is no longer written");
    }
}
