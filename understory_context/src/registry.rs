// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-host registration storage and announcement routing.
//!
//! ## Overview
//!
//! The [`Registry`] owns, for each host, the provider and consumer
//! registrations created on it (one per token) and the set of providers that
//! are currently listening. It is the explicit replacement for a side table
//! hanging off every component: nothing here is process-wide.
//!
//! ## Routing
//!
//! An announcement is resolved by walking the host tree towards the root,
//! nearest host first. The first host with a listening provider for the token
//! wins; the walk stops there, so a provider further up never sees the
//! announcement. Plain consumers start at their host's parent (a provider never
//! pairs with a consumer on its own host); the internal consumers of a derived
//! context start at their own host, because a host commonly owns both a derived
//! context and the contexts it is computed from.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::consumer::{Consumer, ConsumerCell, Reach};
use crate::context::Context;
use crate::derived::Link;
use crate::protocol::Activatable;
use crate::provider::{Provider, ProviderCell};
use crate::types::{ContextValue, HostId, HostTree, Token};

/// Owner of all context registrations for one component tree.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Rc<RefCell<RegistryInner>>,
}

#[derive(Clone, Default)]
pub(crate) struct WeakRegistry(Weak<RefCell<RegistryInner>>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<Registry> {
        self.0.upgrade().map(|inner| Registry { inner })
    }
}

#[derive(Default)]
struct RegistryInner {
    hosts: HashMap<HostId, HostEntry>,
}

#[derive(Default)]
struct HostEntry {
    // Registration order is activation order.
    providers: Vec<Registration>,
    consumers: Vec<Registration>,
    listening: HashMap<Token, Rc<dyn Any>>,
    // Binding controllers on the host; driven after its own registrations.
    controllers: Vec<Rc<dyn Link>>,
}

#[derive(Clone)]
struct Registration {
    token: Token,
    derived: bool,
    handle: Rc<dyn Any>,
    link: Rc<dyn Link>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let providers: usize = inner.hosts.values().map(|h| h.providers.len()).sum();
        let consumers: usize = inner.hosts.values().map(|h| h.consumers.len()).sum();
        let listening: usize = inner.hosts.values().map(|h| h.listening.len()).sum();
        f.debug_struct("Registry")
            .field("hosts", &inner.hosts.len())
            .field("providers", &providers)
            .field("consumers", &consumers)
            .field("listening", &listening)
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Rc::downgrade(&self.inner))
    }

    pub(crate) fn provider<T: ContextValue>(&self, ctx: &Context<T>, host: HostId) -> Provider<T> {
        let token = ctx.token();
        let cached = self.cached(host, token, |e| &e.providers);
        if let Some(handle) = cached
            && let Some(provider) = handle.downcast_ref::<Provider<T>>()
        {
            return provider.clone();
        }
        let provider = Provider::from_cell(ProviderCell::new(ctx.clone(), host, self));
        let registration = Registration {
            token,
            derived: ctx.is_derived(),
            handle: Rc::new(provider.clone()),
            link: Rc::new(provider.clone()),
        };
        self.entry(host, |e| e.providers.push(registration));
        debug!(%token, %host, derived = ctx.is_derived(), "provider registered");
        provider
    }

    pub(crate) fn consumer<T: ContextValue>(&self, ctx: &Context<T>, host: HostId) -> Consumer<T> {
        let token = ctx.token();
        let cached = self.cached(host, token, |e| &e.consumers);
        if let Some(handle) = cached
            && let Some(consumer) = handle.downcast_ref::<Consumer<T>>()
        {
            return consumer.clone();
        }
        let consumer = Consumer::from_cell(ConsumerCell::new(
            ctx.clone(),
            host,
            self.downgrade(),
            Reach::Ancestors,
        ));
        let registration = Registration {
            token,
            derived: false,
            handle: Rc::new(consumer.clone()),
            link: Rc::new(consumer.clone()),
        };
        self.entry(host, |e| e.consumers.push(registration));
        debug!(%token, %host, "consumer registered");
        consumer
    }

    fn cached(
        &self,
        host: HostId,
        token: Token,
        list: impl Fn(&HostEntry) -> &Vec<Registration>,
    ) -> Option<Rc<dyn Any>> {
        let inner = self.inner.borrow();
        let entry = inner.hosts.get(&host)?;
        list(entry)
            .iter()
            .find(|r| r.token == token)
            .map(|r| r.handle.clone())
    }

    fn entry<R>(&self, host: HostId, f: impl FnOnce(&mut HostEntry) -> R) -> R {
        let mut inner = self.inner.borrow_mut();
        f(inner.hosts.entry(host).or_default())
    }

    pub(crate) fn listen(&self, host: HostId, token: Token, cell: Rc<dyn Any>) {
        self.entry(host, |e| {
            e.listening.insert(token, cell);
        });
    }

    pub(crate) fn unlisten(&self, host: HostId, token: Token) {
        let mut inner = self.inner.borrow_mut();
        if let Some(e) = inner.hosts.get_mut(&host) {
            e.listening.remove(&token);
        }
    }

    /// Resolve an announcement: the nearest listening provider for `token`.
    pub(crate) fn route<T: ContextValue>(
        &self,
        tree: &dyn HostTree,
        host: HostId,
        token: Token,
        reach: Reach,
    ) -> Option<Rc<ProviderCell<T>>> {
        let mut cur = match reach {
            Reach::Ancestors => tree.parent_of(host),
            Reach::HostAndAncestors => Some(host),
        };
        // Walk towards the root; the host tree guarantees acyclic ancestry.
        while let Some(h) = cur {
            let found = {
                let inner = self.inner.borrow();
                inner
                    .hosts
                    .get(&h)
                    .and_then(|e| e.listening.get(&token))
                    .cloned()
            };
            if let Some(cell) = found {
                trace!(%token, from = %host, provider = %h, "announcement resolved");
                return cell.downcast::<ProviderCell<T>>().ok();
            }
            cur = tree.parent_of(h);
        }
        trace!(%token, from = %host, "announcement unanswered");
        None
    }

    /// Whether `host` has a listening provider for `token`.
    pub fn is_listening(&self, host: HostId, token: Token) -> bool {
        self.inner
            .borrow()
            .hosts
            .get(&host)
            .is_some_and(|e| e.listening.contains_key(&token))
    }

    /// Number of registrations (providers plus consumers) owned by `host`.
    ///
    /// Attached binding controllers are not counted.
    pub fn registration_count(&self, host: HostId) -> usize {
        self.inner
            .borrow()
            .hosts
            .get(&host)
            .map(|e| e.providers.len() + e.consumers.len())
            .unwrap_or(0)
    }

    /// Attach a binding controller to `host`, so host-level lifecycle calls
    /// reach its bindings.
    pub(crate) fn attach_controller(&self, host: HostId, controller: Rc<dyn Link>) {
        self.entry(host, |e| e.controllers.push(controller));
    }

    fn registrations(&self, host: HostId) -> Vec<Rc<dyn Link>> {
        let inner = self.inner.borrow();
        let Some(e) = inner.hosts.get(&host) else {
            return Vec::new();
        };
        // Plain providers listen before derived ones look for their sources,
        // and both before any consumer announces.
        let plain = e.providers.iter().filter(|r| !r.derived);
        let derived = e.providers.iter().filter(|r| r.derived);
        plain
            .chain(derived)
            .chain(e.consumers.iter())
            .map(|r| r.link.clone())
            .chain(e.controllers.iter().cloned())
            .collect()
    }

    /// Activate every registration owned by `host`.
    ///
    /// Providers go first so that consumers on the same host can already see
    /// the providers of its ancestors, and derived providers can see plain
    /// providers on the same host.
    pub fn activate_host(&self, host: HostId, tree: &dyn HostTree) {
        for r in self.registrations(host) {
            r.activate(tree);
        }
    }

    /// Deactivate every registration owned by `host`, consumers first.
    pub fn deactivate_host(&self, host: HostId) {
        for r in self.registrations(host).iter().rev() {
            r.deactivate();
        }
    }

    /// The host moved within the tree: re-pair everything that may now have a
    /// different nearest provider.
    ///
    /// Providers on the host force their paired consumers to re-announce, and
    /// the host's own consumers re-announce as well.
    pub fn repair_host(&self, host: HostId, tree: &dyn HostTree) {
        for r in self.registrations(host) {
            r.repair(tree);
        }
    }

    /// Deactivate and drop every registration owned by a destroyed host.
    pub fn release_host(&self, host: HostId) {
        self.deactivate_host(host);
        let removed = self.inner.borrow_mut().hosts.remove(&host);
        if removed.is_some() {
            debug!(%host, "host released");
        }
    }
}

pub(crate) trait Repairable {
    fn repair(&self, tree: &dyn HostTree);
}
