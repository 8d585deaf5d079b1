// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Provider registrations: the owning side of a context.
//!
//! ## Fan-out
//!
//! Setting a value that differs from the current one pushes it to every paired
//! consumer, in pairing order, before the setter returns. Delivery iterates a
//! snapshot of the active set so consumers may pair, unpair, or set values
//! from inside their callbacks:
//!
//! - a consumer that unpaired (itself or another) after the snapshot was taken
//!   is skipped;
//! - if a callback sets a newer value, the newer push has already reached
//!   everyone, so the older push stops instead of delivering a stale value.
//!
//! A panic inside one consumer's callback is logged and does not stop delivery
//! to the others.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::context::Context;
use crate::derived::{DerivedCore, DerivedPhase, Link, SlotSink};
use crate::protocol::{
    Activatable, Announcement, Detach, Subscriber, SubscriptionId, Teardown, isolate,
};
use crate::registry::{Registry, Repairable, WeakRegistry};
use crate::types::{ContextValue, HostId, HostTree};

/// Provider registration for one context on one host.
///
/// Cloning yields another handle to the same registration.
pub struct Provider<T> {
    cell: Rc<ProviderCell<T>>,
}

impl<T> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

pub(crate) struct ProviderCell<T> {
    state: RefCell<ProviderState<T>>,
    derived: Option<DerivedRuntime<T>>,
}

struct DerivedRuntime<T> {
    core: Rc<DerivedCore<T>>,
    links: Vec<Rc<dyn Link>>,
}

struct ProviderState<T> {
    context: Context<T>,
    host: HostId,
    registry: WeakRegistry,
    value: T,
    // Bumped on every accepted change and on reset; a push in flight stops
    // once it no longer carries the latest version.
    version: u64,
    active: bool,
    next_id: u64,
    subscriptions: Vec<Subscription<T>>,
}

struct Subscription<T> {
    id: SubscriptionId,
    host: HostId,
    subscriber: Weak<dyn Subscriber<T>>,
}

impl<T: ContextValue> ProviderCell<T> {
    pub(crate) fn new(context: Context<T>, host: HostId, registry: &Registry) -> Rc<Self> {
        Rc::new_cyclic(|me: &Weak<Self>| {
            let derived = context.derivation().map(|derivation| {
                let core = Rc::new(DerivedCore::new(
                    derivation,
                    me.clone(),
                    context.initial_value().clone(),
                ));
                let sink: Weak<dyn SlotSink> = Rc::downgrade(&core) as Weak<DerivedCore<T>>;
                let links = derivation.links(registry, host, sink);
                DerivedRuntime { core, links }
            });
            Self {
                state: RefCell::new(ProviderState {
                    value: context.initial_value().clone(),
                    context,
                    host,
                    registry: registry.downgrade(),
                    version: 0,
                    active: false,
                    next_id: 0,
                    subscriptions: Vec::new(),
                }),
                derived,
            }
        })
    }

    /// Take a matching announcement. Returns false if the provider is not listening.
    pub(crate) fn accept(self: &Rc<Self>, announcement: Announcement<T>) -> bool {
        let (id, value, host) = {
            let mut st = self.state.borrow_mut();
            if !st.active {
                return false;
            }
            let id = SubscriptionId(st.next_id);
            st.next_id += 1;
            st.subscriptions.push(Subscription {
                id,
                host: announcement.host,
                subscriber: Rc::downgrade(&announcement.subscriber),
            });
            (id, st.value.clone(), st.host)
        };
        let token = announcement.token;
        debug!(%token, provider = %host, consumer = %announcement.host, "paired");
        let subscriber = &announcement.subscriber;
        isolate(token, announcement.host, || {
            subscriber.on_pair();
            subscriber.on_update(&value);
        });
        let me: Weak<dyn Detach> = Rc::downgrade(self) as Weak<Self>;
        subscriber.on_unpair(Teardown::new(me, id));
        true
    }

    /// Store `value` and push it to every paired consumer if it is a change.
    pub(crate) fn publish(&self, value: T) {
        let (snapshot, version, value, token) = {
            let mut st = self.state.borrow_mut();
            if st.value == value {
                return;
            }
            st.value = value;
            st.version = st.version.wrapping_add(1);
            let snapshot: Vec<_> = st
                .subscriptions
                .iter()
                .map(|s| (s.id, s.host, s.subscriber.clone()))
                .collect();
            (snapshot, st.version, st.value.clone(), st.context.token())
        };
        trace!(%token, consumers = snapshot.len(), "publishing");
        for (id, host, subscriber) in snapshot {
            {
                let st = self.state.borrow();
                if st.version != version {
                    // A newer value (or a reset) already went out to everyone.
                    break;
                }
                if !st.subscriptions.iter().any(|s| s.id == id) {
                    continue;
                }
            }
            match subscriber.upgrade() {
                Some(subscriber) => isolate(token, host, || subscriber.on_update(&value)),
                None => self.detach(id),
            }
        }
    }
}

impl<T: ContextValue> Detach for ProviderCell<T> {
    fn detach(&self, id: SubscriptionId) {
        let mut st = self.state.borrow_mut();
        let before = st.subscriptions.len();
        st.subscriptions.retain(|s| s.id != id);
        if st.subscriptions.len() != before {
            debug!(token = %st.context.token(), provider = %st.host, ?id, "unpaired");
        }
    }
}

impl<T: ContextValue + fmt::Debug> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.cell.state.borrow();
        f.debug_struct("Provider")
            .field("token", &st.context.token())
            .field("host", &st.host)
            .field("value", &st.value)
            .field("active", &st.active)
            .field("consumers", &st.subscriptions.len())
            .field("derived", &self.cell.derived.is_some())
            .finish()
    }
}

impl<T: ContextValue> Provider<T> {
    pub(crate) fn from_cell(cell: Rc<ProviderCell<T>>) -> Self {
        Self { cell }
    }

    #[cfg(test)]
    pub(crate) fn is_cell(&self, cell: &Rc<ProviderCell<T>>) -> bool {
        Rc::ptr_eq(&self.cell, cell)
    }

    /// Whether two handles refer to the same registration.
    pub fn same_registration(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Context this provider owns.
    pub fn context(&self) -> Context<T> {
        self.cell.state.borrow().context.clone()
    }

    /// Host owning this registration.
    pub fn host(&self) -> HostId {
        self.cell.state.borrow().host
    }

    /// Current value.
    pub fn value(&self) -> T {
        self.cell.state.borrow().value.clone()
    }

    /// Borrow the current value.
    ///
    /// `f` must not call back into this provider.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.state.borrow().value)
    }

    /// Whether the value is computed from other contexts.
    pub fn is_derived(&self) -> bool {
        self.cell.derived.is_some()
    }

    /// Assign a new value.
    ///
    /// Equal values are not propagated. Assignments to a derived context are
    /// ignored: its value only ever comes from its sources.
    pub fn set(&self, value: T) {
        if self.cell.derived.is_some() {
            debug!(token = %self.context().token(), "ignoring assignment to derived context");
            return;
        }
        self.cell.publish(value);
    }

    /// Read-modify-write through [`Provider::set`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = self.with_value(f);
        self.set(next);
    }

    /// Number of consumers currently paired with this provider.
    pub fn consumer_count(&self) -> usize {
        self.cell
            .state
            .borrow()
            .subscriptions
            .iter()
            .filter(|s| s.subscriber.strong_count() > 0)
            .count()
    }

    /// Whether a consumer on `host` is currently paired with this provider.
    pub fn has_consumer_on(&self, host: HostId) -> bool {
        self.cell
            .state
            .borrow()
            .subscriptions
            .iter()
            .any(|s| s.host == host && s.subscriber.strong_count() > 0)
    }

    /// Binding progress of a derived provider; `None` for plain contexts.
    pub fn derived_phase(&self) -> Option<DerivedPhase> {
        self.cell.derived.as_ref().map(|d| d.core.phase())
    }

    /// The host moved to a different parent.
    ///
    /// Every paired consumer re-announces, since the nearest provider for
    /// consumers inside the moved subtree may now be a different one. A derived
    /// provider also re-resolves its own sources.
    pub fn reparented(&self, tree: &dyn HostTree) {
        let (subscribers, host) = {
            let st = self.cell.state.borrow();
            let subs: Vec<_> = st
                .subscriptions
                .iter()
                .filter_map(|s| s.subscriber.upgrade())
                .collect();
            (subs, st.host)
        };
        debug!(provider = %host, consumers = subscribers.len(), "provider reparented");
        for s in subscribers {
            s.request_repair(tree);
        }
        if let Some(d) = &self.cell.derived {
            for link in &d.links {
                link.repair(tree);
            }
        }
    }
}

impl<T: ContextValue> Activatable for Provider<T> {
    /// Start listening for announcements from the host's subtree.
    fn activate(&self, tree: &dyn HostTree) {
        let (host, token, registry) = {
            let mut st = self.cell.state.borrow_mut();
            if st.active {
                return;
            }
            st.active = true;
            (st.host, st.context.token(), st.registry.upgrade())
        };
        if let Some(d) = &self.cell.derived {
            for link in &d.links {
                link.activate(tree);
            }
        }
        if let Some(registry) = registry {
            let cell: Rc<dyn Any> = self.cell.clone();
            registry.listen(host, token, cell);
        }
        debug!(%token, %host, "provider activated");
    }

    /// Stop listening, unpair every consumer, and hard-reset the value.
    fn deactivate(&self) {
        let (subscriptions, host, token, registry) = {
            let mut st = self.cell.state.borrow_mut();
            if !st.active {
                return;
            }
            st.active = false;
            st.value = st.context.initial_value().clone();
            st.version = st.version.wrapping_add(1);
            (
                core::mem::take(&mut st.subscriptions),
                st.host,
                st.context.token(),
                st.registry.upgrade(),
            )
        };
        if let Some(registry) = registry {
            registry.unlisten(host, token);
        }
        debug!(%token, %host, consumers = subscriptions.len(), "provider deactivated");
        for s in subscriptions {
            if let Some(subscriber) = s.subscriber.upgrade() {
                isolate(token, s.host, || subscriber.on_provider_lost());
            }
        }
        if let Some(d) = &self.cell.derived {
            for link in &d.links {
                link.deactivate();
            }
            d.core.reset();
        }
    }

    fn is_active(&self) -> bool {
        self.cell.state.borrow().active
    }
}

impl<T: ContextValue> Repairable for Provider<T> {
    fn repair(&self, tree: &dyn HostTree) {
        self.reparented(tree);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::create_context;
    use crate::types::HostMap;

    fn hosts() -> HostMap {
        let mut hosts = HostMap::new();
        hosts.insert(HostId(1), None, "media-controller");
        hosts.insert(HostId(2), Some(HostId(1)), "media-play-button");
        hosts.insert(HostId(3), Some(HostId(1)), "media-mute-button");
        hosts
    }

    #[test]
    fn set_is_a_no_op_for_equal_values() {
        let hosts = hosts();
        let registry = Registry::new();
        let ctx = create_context(1_u32);
        let p = ctx.make_provider(&registry, &hosts, HostId(1)).unwrap();
        p.activate(&hosts);
        let c = ctx.make_consumer(&registry, &hosts, HostId(2)).unwrap();
        c.activate(&hosts);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        c.on_change(move |v| log.borrow_mut().push(*v));

        p.set(2);
        p.set(2);
        p.set(3);
        assert_eq!(*seen.borrow(), vec![2, 3]);
        assert_eq!(c.value(), 3);
    }

    #[test]
    fn deactivate_hard_resets_and_unpairs() {
        let hosts = hosts();
        let registry = Registry::new();
        let ctx = create_context(String::from("idle"));
        let p = ctx.make_provider(&registry, &hosts, HostId(1)).unwrap();
        p.activate(&hosts);
        let a = ctx.make_consumer(&registry, &hosts, HostId(2)).unwrap();
        let b = ctx.make_consumer(&registry, &hosts, HostId(3)).unwrap();
        a.activate(&hosts);
        b.activate(&hosts);
        p.set(String::from("playing"));
        assert_eq!(p.consumer_count(), 2);

        p.deactivate();
        assert_eq!(p.value(), "idle");
        assert_eq!(p.consumer_count(), 0);
        assert_eq!(a.value(), "idle");
        assert!(!a.is_paired());
        assert!(!b.is_paired());
        assert!(!registry.is_listening(HostId(1), ctx.token()));
    }

    #[test]
    fn update_reads_then_writes() {
        let registry = Registry::new();
        let ctx = create_context(10_i64);
        let p = ctx.make_provider(&registry, &hosts(), HostId(1)).unwrap();
        p.update(|v| v + 5);
        assert_eq!(p.value(), 15);
    }

    #[test]
    fn panicking_subscriber_does_not_starve_others() {
        let hosts = hosts();
        let registry = Registry::new();
        let ctx = create_context(0_i32);
        let p = ctx.make_provider(&registry, &hosts, HostId(1)).unwrap();
        p.activate(&hosts);
        let bad = ctx.make_consumer(&registry, &hosts, HostId(2)).unwrap();
        let good = ctx.make_consumer(&registry, &hosts, HostId(3)).unwrap();
        bad.activate(&hosts);
        good.activate(&hosts);
        bad.on_change(|v| {
            if *v == 7 {
                panic!("faulty widget");
            }
        });

        p.set(7);
        assert_eq!(good.value(), 7);
        p.set(8);
        assert_eq!(bad.value(), 8);
        assert_eq!(good.value(), 8);
    }

    #[test]
    fn re_entrant_set_skips_stale_delivery() {
        let hosts = hosts();
        let registry = Registry::new();
        let ctx = create_context(0_i32);
        let p = ctx.make_provider(&registry, &hosts, HostId(1)).unwrap();
        p.activate(&hosts);
        let first = ctx.make_consumer(&registry, &hosts, HostId(2)).unwrap();
        let second = ctx.make_consumer(&registry, &hosts, HostId(3)).unwrap();
        first.activate(&hosts);
        second.activate(&hosts);

        // The first consumer clamps odd values by writing back to the provider.
        let writer = p.clone();
        first.on_change(move |v| {
            if v % 2 == 1 {
                writer.set(v + 1);
            }
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        second.on_change(move |v| log.borrow_mut().push(*v));

        p.set(5);
        assert_eq!(p.value(), 6);
        assert_eq!(first.value(), 6);
        assert_eq!(second.value(), 6);
        assert_eq!(*seen.borrow(), vec![6], "the superseded value is never delivered");
    }
}
