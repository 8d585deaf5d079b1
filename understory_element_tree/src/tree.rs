// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core tree implementation: structure, updates, queries.

use alloc::string::String;
use alloc::vec::Vec;

use crate::element::ElementRef;
use crate::types::{Element, ElementFlags, NodeId};

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level element tree.
pub struct Tree {
    nodes: Vec<Option<Node>>, // slots
    generations: Vec<u32>,    // last generation per slot (persists across frees)
    free_list: Vec<usize>,
}

impl core::fmt::Debug for Tree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.nodes.len();
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        let free = self.free_list.len();
        f.debug_struct("Tree")
            .field("nodes_total", &total)
            .field("nodes_alive", &alive)
            .field("free_list", &free)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
struct Node {
    generation: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    tag: String,
    flags: ElementFlags,
    element: ElementRef,
}

impl Node {
    fn new(generation: u32, element: Element) -> Self {
        Self {
            generation,
            parent: None,
            children: Vec::new(),
            element: ElementRef::new(element.tag.clone()),
            tag: element.tag,
            flags: element.flags,
        }
    }
}

impl Tree {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Insert a new node as the last child of `parent` (or as a detached root if `None`).
    ///
    /// A node inserted under a connected parent is connected as well.
    pub fn insert(&mut self, parent: Option<NodeId>, element: Element) -> NodeId {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(Node::new(generation, element));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.nodes.push(Some(Node::new(generation, element)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            ((self.nodes.len() - 1) as u32, generation)
        };
        let id = NodeId::new(idx, generation);
        // Connectivity is inherited, never declared by the caller.
        self.node_mut(id).flags.remove(ElementFlags::CONNECTED);
        if let Some(p) = parent.filter(|p| self.is_alive(*p)) {
            self.link_parent(id, p);
            let connected = self.is_connected(p);
            self.set_subtree_connected(id, connected);
        }
        id
    }

    /// Remove a node (and its subtree) from the tree.
    ///
    /// Returns the removed ids in post-order (children before parents), which is
    /// the order a lifecycle source should deactivate them in.
    pub fn remove(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut removed = Vec::new();
        if !self.is_alive(id) {
            return removed;
        }
        if let Some(parent) = self.node(id).parent {
            self.unlink_parent(id, parent);
        }
        self.remove_recursive(id, &mut removed);
        removed
    }

    fn remove_recursive(&mut self, id: NodeId, removed: &mut Vec<NodeId>) {
        let children = self.node(id).children.clone();
        for child in children {
            self.remove_recursive(child, removed);
        }
        self.nodes[id.idx()] = None;
        self.free_list.push(id.idx());
        removed.push(id);
    }

    /// Reparent `id` under `new_parent` (or detach it as a root if `None`).
    ///
    /// Reparenting a node under one of its own descendants is rejected and
    /// leaves the tree unchanged; the return value reports whether the move happened.
    pub fn reparent(&mut self, id: NodeId, new_parent: Option<NodeId>) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        if let Some(p) = new_parent {
            if !self.is_alive(p) || self.is_ancestor_or_self(id, p) {
                return false;
            }
        }
        if let Some(parent) = self.node(id).parent {
            self.unlink_parent(id, parent);
        }
        let connected = match new_parent {
            Some(p) => {
                self.link_parent(id, p);
                self.is_connected(p)
            }
            None => false,
        };
        self.set_subtree_connected(id, connected);
        true
    }

    /// Mark a root as connected (or disconnected) to the live document.
    ///
    /// Connectivity propagates to the whole subtree. Calling this on a non-root
    /// is a no-op: descendants always follow their root.
    pub fn set_root_connected(&mut self, root: NodeId, connected: bool) {
        if !self.is_alive(root) || self.node(root).parent.is_some() {
            return;
        }
        self.set_subtree_connected(root, connected);
    }

    fn set_subtree_connected(&mut self, id: NodeId, connected: bool) {
        let children = {
            let n = self.node_mut(id);
            n.flags.set(ElementFlags::CONNECTED, connected);
            n.children.clone()
        };
        for c in children {
            self.set_subtree_connected(c, connected);
        }
    }

    /// Returns true if `id` refers to a live node.
    ///
    /// A `NodeId` is considered live if its slot exists and its generation matches
    /// the current generation stored in that slot.
    /// See [`NodeId`] docs for the generational semantics.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .map(|n| n.generation == id.1)
            .unwrap_or(false)
    }

    /// Whether the node is live and part of a connected subtree.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.node_opt(id)
            .is_some_and(|n| n.flags.contains(ElementFlags::CONNECTED))
    }

    /// Parent of a live node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node_opt(id)?.parent
    }

    /// Children of a live node, in insertion order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node_opt(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Tag of a live node.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node_opt(id).map(|n| n.tag.as_str())
    }

    /// Flags of a live node.
    pub fn flags(&self, id: NodeId) -> Option<ElementFlags> {
        self.node_opt(id).map(|n| n.flags)
    }

    /// Shared output handle of a live node.
    pub fn element(&self, id: NodeId) -> Option<ElementRef> {
        self.node_opt(id).map(|n| n.element.clone())
    }

    /// Path from root to `id` (inclusive). Empty for stale ids.
    pub fn path_to_root(&self, mut id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.is_alive(id) {
            return out;
        }
        loop {
            out.push(id);
            match self.node(id).parent {
                Some(p) => id = p,
                None => break,
            }
        }
        out.reverse();
        out
    }

    /// Live subtree rooted at `id` in pre-order (parents before children).
    ///
    /// This is the order a lifecycle source should activate hosts in, so that
    /// providers are listening before their descendants announce.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.is_alive(id) {
            return out;
        }
        let mut stack = alloc::vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            for &c in self.node(n).children.iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    // --- internals ---

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.node(id).parent {
                Some(p) => id = p,
                None => return false,
            }
        }
    }

    /// Access a node; panics if `id` is stale.
    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.idx()].as_ref().expect("dangling NodeId")
    }

    /// Access a node mutably; panics if `id` is stale.
    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.idx()].as_mut().expect("dangling NodeId")
    }

    fn node_opt(&self, id: NodeId) -> Option<&Node> {
        let n = self.nodes.get(id.idx())?.as_ref()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }

    fn link_parent(&mut self, id: NodeId, parent: NodeId) {
        let parent_node = self.node_mut(parent);
        parent_node.children.push(id);
        self.node_mut(id).parent = Some(parent);
    }

    fn unlink_parent(&mut self, id: NodeId, parent: NodeId) {
        let p = self.node_mut(parent);
        p.children.retain(|c| *c != id);
        self.node_mut(id).parent = None;
    }
}
