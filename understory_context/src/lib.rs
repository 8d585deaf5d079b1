// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Context: deterministic context propagation for component trees.
//!
//! ## Overview
//!
//! A component (the *provider*) owns a piece of state; any descendant component
//! (a *consumer*) reads it and stays in sync, without the two knowing about each
//! other. The pairing is resolved through the host tree: a consumer announces
//! itself when it becomes active, and the nearest ancestor providing the same
//! context answers.
//!
//! The crate does not own the tree. It consults a [`HostTree`](crate::types::HostTree)
//! when pairing decisions are made, and it is driven by the tree's owner through
//! [`Activatable`](crate::protocol::Activatable). Registrations live in an explicit
//! [`Registry`](crate::registry::Registry).
//!
//! ## Contexts
//!
//! A [`Context`](crate::context::Context) is a typed token plus an initial value.
//! Two contexts are the same context only if their tokens match, so unrelated
//! contexts of the same value type never cross-wire.
//!
//! - [`make_provider`](crate::context::Context::make_provider) and
//!   [`make_consumer`](crate::context::Context::make_consumer) return the host's
//!   registration for that context (the same one on repeated calls).
//! - Hosts without an activation lifecycle are rejected with
//!   [`ContextError::MissingLifecycle`](crate::error::ContextError::MissingLifecycle).
//!
//! ## Pairing
//!
//! - A consumer pairs with at most one provider: the nearest ancestor with a
//!   listening provider for the same token. A provider never pairs with a
//!   consumer on its own host.
//! - On pairing the consumer immediately receives the provider's current value.
//! - Setting a provider value that differs from the current one reaches every
//!   paired consumer, in pairing order, before the setter returns. Equal values
//!   are not propagated.
//! - Deactivating a provider resets it to the initial value and returns every
//!   paired consumer to its (transformed) initial value.
//! - Announcements are not replayed: a consumer that found no provider stays
//!   unpaired until it is activated again or asked to repair.
//!
//! See [`protocol`] for the exact handshake.
//!
//! ## Derived contexts
//!
//! [`create_derived_context`](crate::derived::create_derived_context) builds a
//! context whose value is computed from other contexts. Its provider looks up its
//! sources from its own host upwards and recomputes once all of them are bound.
//!
//! ## Records and bindings
//!
//! - [`bind_record`](crate::record::bind_record) binds several named contexts on
//!   one host and exposes them through a [`RecordBag`](crate::record::RecordBag).
//! - [`BindingController`](crate::binding::BindingController) mirrors context
//!   values into element attributes or custom style properties. It attaches to
//!   its host, so the registry's host lifecycle calls drive it too.
//!
//! ## Minimal usage
//!
//! ```
//! use understory_context::context::create_context;
//! use understory_context::protocol::Activatable;
//! use understory_context::registry::Registry;
//! use understory_context::types::{HostId, HostMap};
//!
//! let mut hosts = HostMap::new();
//! hosts.insert(HostId(1), None, "media-controller");
//! hosts.insert(HostId(2), Some(HostId(1)), "media-mute-button");
//!
//! let registry = Registry::new();
//! let muted = create_context(false);
//!
//! let provider = muted.make_provider(&registry, &hosts, HostId(1)).unwrap();
//! let consumer = muted.make_consumer(&registry, &hosts, HostId(2)).unwrap();
//! registry.activate_host(HostId(1), &hosts);
//! registry.activate_host(HostId(2), &hosts);
//!
//! provider.set(true);
//! assert!(consumer.value());
//!
//! provider.deactivate();
//! assert!(!consumer.value());
//! ```
//!
//! ## Features
//!
//! - `element_tree_adapter`: implements the host and output traits for
//!   `understory_element_tree` and adds subtree lifecycle helpers.
//!
//! ## Logging
//!
//! Pairing, unpairing, activation, and repair are reported through `tracing` at
//! `debug` level; value fan-out at `trace` level. A consumer callback that panics
//! is reported at `error` level and delivery continues with the next consumer.
//!
//! This crate is single-threaded: registrations are `!Send` and `!Sync`.

pub mod adapters;
pub mod binding;
pub mod consumer;
pub mod context;
pub mod derived;
pub mod error;
pub mod protocol;
pub mod provider;
pub mod record;
pub mod registry;
pub mod types;

pub use binding::{AttrValue, AttributeBindingController, BindingController, StyleBindingController};
pub use consumer::Consumer;
pub use context::{Context, create_context};
pub use derived::{Sources, create_derived_context, derived2, derived3};
pub use error::{ContextError, Result};
pub use protocol::Activatable;
pub use provider::Provider;
pub use record::{ContextRecord, RecordBag, RecordSide, bind_record};
pub use registry::Registry;
pub use types::{HostId, HostTree, Token};
