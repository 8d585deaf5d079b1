// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the element tree: node identifiers, flags, and element descriptors.

use alloc::string::String;

/// Identifier for a node in the tree.
///
/// This is a small, copyable handle that stays stable across updates but becomes
/// invalid when the underlying slot is reused.
/// It consists of a slot index and a generation counter.
///
/// ## Semantics
///
/// - On insert, a fresh slot is allocated with generation `1`.
/// - On remove, the slot is freed; any existing `NodeId` that pointed to that slot is now stale.
/// - On reuse of a freed slot, its generation is incremented, producing a new, distinct `NodeId`.
///
/// ### Liveness
///
/// Use [`Tree::is_alive`](crate::Tree::is_alive) to check whether a `NodeId` still refers to a live node.
/// Stale `NodeId`s never alias a different live node because the generation must match.
/// This matters for context pairing: a registration keyed by a stale id can never
/// be mistaken for one belonging to the element that later reuses the slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    /// Slot index of this id.
    pub const fn slot(self) -> u32 {
        self.0
    }

    /// Generation of this id.
    pub const fn generation(self) -> u32 {
        self.1
    }

    /// Pack into a single `u64` (generation in the high half).
    ///
    /// Used by adapters that key external tables by a plain integer.
    pub const fn to_bits(self) -> u64 {
        ((self.1 as u64) << 32) | self.0 as u64
    }

    /// Inverse of [`NodeId::to_bits`]. The result may be stale; check it with
    /// [`Tree::is_alive`](crate::Tree::is_alive).
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Each half of the packed value is exactly 32 bits."
    )]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits as u32, (bits >> 32) as u32)
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}v{}", self.0, self.1)
    }
}

bitflags::bitflags! {
    /// Element flags describing lifecycle support.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ElementFlags: u8 {
        /// Element receives activation/deactivation callbacks from its owner.
        ///
        /// Plain structural nodes (text runs, un-upgraded placeholders) leave this unset
        /// and cannot host context registrations.
        const LIFECYCLE = 0b0000_0001;
        /// Element is part of the live tree (its root is connected).
        const CONNECTED = 0b0000_0010;
    }
}

impl Default for ElementFlags {
    fn default() -> Self {
        Self::LIFECYCLE
    }
}

/// Descriptor used when inserting a node.
#[derive(Clone, Debug)]
pub struct Element {
    /// Tag name, e.g. `media-controller`.
    pub tag: String,
    /// Lifecycle flags.
    pub flags: ElementFlags,
}

impl Element {
    /// A lifecycle-capable element with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            flags: ElementFlags::default(),
        }
    }

    /// A structural node without lifecycle hooks.
    pub fn inert(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            flags: ElementFlags::empty(),
        }
    }

    /// Replace the flags.
    #[must_use]
    pub fn with_flags(mut self, flags: ElementFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl Default for Element {
    fn default() -> Self {
        Self::new("div")
    }
}
