// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core types: tokens, host identifiers, host tree lookups, and value wrappers.
//!
//! ## Overview
//!
//! These types describe what the engine needs from its surroundings.
//! The engine never owns the component tree; it consults a [`HostTree`] at the
//! moments pairing decisions are made (consumer activation and repair).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity of a context.
///
/// Two contexts are the same context iff their tokens are equal. Tokens are
/// allocated from a process-wide counter and never reused, so unrelated
/// contexts can never cross-wire even when their value types match.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Token(u64);

impl Token {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Identifier of a host (a component instance) in the surrounding tree.
///
/// The engine only compares and hashes these. Adapters map their own node
/// handles into the `u64` space (see the `element_tree_adapter` feature).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct HostId(pub u64);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

/// Structural and lifecycle facts about hosts.
///
/// The engine consults this when a consumer announces itself (to walk the
/// ancestor chain) and when a registration is created (to reject hosts that
/// cannot be activated).
pub trait HostTree {
    /// Returns the parent of `host`, or `None` for roots and detached hosts.
    fn parent_of(&self, host: HostId) -> Option<HostId>;
    /// Whether `host` receives activation/deactivation from its owner.
    fn has_lifecycle(&self, host: HostId) -> bool;
    /// Human-readable host type, used in misuse errors.
    fn type_name(&self, host: HostId) -> String;
}

/// A host tree without structure: every host is a lifecycle-capable root.
///
/// Useful for standalone registrations where no pairing is expected, or for
/// providers, which never consult the tree.
#[derive(Copy, Clone, Debug, Default)]
pub struct FlatHosts;

impl HostTree for FlatHosts {
    #[inline]
    fn parent_of(&self, _host: HostId) -> Option<HostId> {
        None
    }

    #[inline]
    fn has_lifecycle(&self, _host: HostId) -> bool {
        true
    }

    fn type_name(&self, _host: HostId) -> String {
        "host".to_string()
    }
}

/// A small `HashMap`-backed host tree.
///
/// Hosts must be inserted before use; unknown hosts have no lifecycle.
#[derive(Clone, Debug, Default)]
pub struct HostMap {
    parents: HashMap<HostId, Option<HostId>>,
    names: HashMap<HostId, String>,
    inert: HashSet<HostId>,
}

impl HostMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a lifecycle-capable host.
    pub fn insert(&mut self, host: HostId, parent: Option<HostId>, type_name: &str) {
        self.parents.insert(host, parent);
        self.names.insert(host, type_name.to_string());
        self.inert.remove(&host);
    }

    /// Insert a host that has no activation lifecycle.
    pub fn insert_inert(&mut self, host: HostId, parent: Option<HostId>, type_name: &str) {
        self.insert(host, parent, type_name);
        self.inert.insert(host);
    }

    /// Move a known host under a new parent. Unknown hosts are ignored.
    pub fn set_parent(&mut self, host: HostId, parent: Option<HostId>) {
        if let Some(p) = self.parents.get_mut(&host) {
            *p = parent;
        }
    }

    /// Forget a host.
    pub fn remove(&mut self, host: HostId) {
        self.parents.remove(&host);
        self.names.remove(&host);
        self.inert.remove(&host);
    }
}

impl HostTree for HostMap {
    fn parent_of(&self, host: HostId) -> Option<HostId> {
        self.parents.get(&host).copied().flatten()
    }

    fn has_lifecycle(&self, host: HostId) -> bool {
        self.parents.contains_key(&host) && !self.inert.contains(&host)
    }

    fn type_name(&self, host: HostId) -> String {
        self.names
            .get(&host)
            .cloned()
            .unwrap_or_else(|| "<unknown>".to_string())
    }
}

/// Values a context can carry.
///
/// Equality decides whether an assignment is a change: assigning a value equal
/// to the current one is not propagated.
pub trait ContextValue: Clone + PartialEq + 'static {}

impl<T: Clone + PartialEq + 'static> ContextValue for T {}

/// A shared value compared by identity rather than by contents.
///
/// Producers that publish snapshot objects replace the reference to force
/// propagation; two snapshots are equal only if they are the same allocation.
pub struct Snapshot<T>(Rc<T>);

impl<T> Snapshot<T> {
    /// Wrap a fresh value.
    pub fn new(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Whether both handles point at the same allocation.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> PartialEq for Snapshot<T> {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T> Eq for Snapshot<T> {}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Snapshot").field(&*self.0).finish()
    }
}
