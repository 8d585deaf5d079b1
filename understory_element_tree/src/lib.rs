// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Element Tree: a generational tree of host elements.
//!
//! This crate is the structural half of a component stack: it knows which element
//! sits under which, whether an element has activation lifecycle hooks, and where
//! an element's attributes and custom style properties live. It does not know
//! anything about state sharing; the `understory_context` crate walks this tree
//! (through its `HostTree` trait) to pair providers with consumers.
//!
//! ## API overview
//!
//! - [`Tree`]: container managing nodes, parent links, and connectivity.
//! - [`Element`]: descriptor for an inserted node (tag and [`ElementFlags`]).
//! - [`ElementFlags`]: lifecycle support and connectivity.
//! - [`ElementRef`]: shared handle to an element's attributes and style properties.
//! - [`NodeId`]: generational handle of a node.
//!
//! Key operations:
//! - [`Tree::insert`] → [`NodeId`]
//! - [`Tree::reparent`] / [`Tree::remove`]
//! - [`Tree::set_root_connected`] to attach a root to the live document.
//! - [`Tree::subtree`] (pre-order) and the post-order list returned by [`Tree::remove`]
//!   give a lifecycle source the activation and deactivation orders.
//!
//! ### Minimal usage
//!
//! ```
//! use understory_element_tree::{Element, Tree};
//!
//! let mut tree = Tree::new();
//! let player = tree.insert(None, Element::new("media-controller"));
//! let button = tree.insert(Some(player), Element::new("media-play-button"));
//! tree.set_root_connected(player, true);
//!
//! assert_eq!(tree.parent(button), Some(player));
//! assert!(tree.is_connected(button));
//!
//! let el = tree.element(button).unwrap();
//! el.set_attribute("mediapaused", "");
//! assert!(el.has_attribute("mediapaused"));
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod element;
mod tree;
mod types;

pub use element::ElementRef;
pub use tree::Tree;
pub use types::{Element, ElementFlags, NodeId};
