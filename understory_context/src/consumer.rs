// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Consumer registrations: the reading side of a context.
//!
//! A consumer holds the context's initial value until it is active and paired.
//! While paired it mirrors the provider's value (optionally mapped through a
//! transform). When it loses its provider it falls back to the transformed
//! initial value and stays unpaired until it is activated again or asked to
//! repair.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::context::Context;
use crate::protocol::{Activatable, Announcement, Subscriber, Teardown};
use crate::registry::{Repairable, WeakRegistry};
use crate::types::{ContextValue, HostId, HostTree};

/// Where an announcement starts its walk.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Reach {
    /// The host's parent, then upwards.
    Ancestors,
    /// The host itself, then upwards.
    HostAndAncestors,
}

/// Consumer registration for one context on one host.
///
/// Cloning yields another handle to the same registration.
pub struct Consumer<T> {
    cell: Rc<ConsumerCell<T>>,
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

pub(crate) struct ConsumerCell<T> {
    me: Weak<ConsumerCell<T>>,
    state: RefCell<ConsumerState<T>>,
}

type Transform<T> = Rc<dyn Fn(&T) -> T>;
type Listener<T> = Rc<dyn Fn(&T)>;

struct ConsumerState<T> {
    context: Context<T>,
    host: HostId,
    registry: WeakRegistry,
    reach: Reach,
    // Last value received, before the transform.
    raw: T,
    value: T,
    transform: Option<Transform<T>>,
    active: bool,
    paired: bool,
    // The first update after pairing is delivered even if it equals the
    // current value.
    sync_pending: bool,
    // Set while a paired consumer re-announces; its re-pairing only reports
    // an actual change.
    repairing: bool,
    teardown: Option<Teardown>,
    on_change: Option<Listener<T>>,
    link: Option<LinkHooks<T>>,
}

// Hooks used by the internal consumers that feed a derived context.
struct LinkHooks<T> {
    value: Listener<T>,
    unpaired: Rc<dyn Fn()>,
}

impl<T: ContextValue> ConsumerCell<T> {
    pub(crate) fn new(context: Context<T>, host: HostId, registry: WeakRegistry, reach: Reach) -> Rc<Self> {
        let initial = context.initial_value().clone();
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            state: RefCell::new(ConsumerState {
                context,
                host,
                registry,
                reach,
                raw: initial.clone(),
                value: initial,
                transform: None,
                active: false,
                paired: false,
                sync_pending: false,
                repairing: false,
                teardown: None,
                on_change: None,
                link: None,
            }),
        })
    }

    pub(crate) fn set_link_hooks(&self, value: impl Fn(&T) + 'static, unpaired: impl Fn() + 'static) {
        self.state.borrow_mut().link = Some(LinkHooks {
            value: Rc::new(value),
            unpaired: Rc::new(unpaired),
        });
    }

    /// Announce to the nearest listening provider. Returns whether one accepted.
    fn announce(&self, tree: &dyn HostTree) -> bool {
        let (token, host, reach, registry) = {
            let st = self.state.borrow();
            if !st.active || st.paired {
                return st.paired;
            }
            (st.context.token(), st.host, st.reach, st.registry.upgrade())
        };
        let Some(registry) = registry else {
            return false;
        };
        let Some(provider) = registry.route::<T>(tree, host, token, reach) else {
            debug!(%token, %host, "no provider in scope");
            return false;
        };
        let Some(me) = self.me.upgrade() else {
            return false;
        };
        provider.accept(Announcement {
            token,
            host,
            subscriber: me,
        })
    }

    /// Store a raw value and notify if the visible value changed.
    fn store(&self, raw: T, from_provider: bool) {
        let transform = self.state.borrow().transform.clone();
        let value = match &transform {
            Some(f) => f(&raw),
            None => raw.clone(),
        };
        let (on_change, link) = {
            let mut st = self.state.borrow_mut();
            st.raw = raw;
            let forced = from_provider && st.sync_pending;
            if from_provider {
                st.sync_pending = false;
            }
            if st.value == value && !forced {
                return;
            }
            st.value = value.clone();
            let link = if from_provider {
                st.link.as_ref().map(|l| l.value.clone())
            } else {
                None
            };
            (st.on_change.clone(), link)
        };
        if let Some(link) = link {
            link(&value);
        }
        if let Some(on_change) = on_change {
            on_change(&value);
        }
    }

    /// Report the loss of the provider and fall back to the initial value.
    fn settle_unpaired(&self) {
        let (unpaired, initial) = {
            let st = self.state.borrow();
            (
                st.link.as_ref().map(|l| l.unpaired.clone()),
                st.context.initial_value().clone(),
            )
        };
        if let Some(unpaired) = unpaired {
            unpaired();
        }
        self.store(initial, false);
    }

    /// Leave the current pairing, if any.
    fn unpair(&self) {
        let teardown = {
            let mut st = self.state.borrow_mut();
            if !st.paired {
                return;
            }
            st.paired = false;
            st.sync_pending = false;
            st.teardown.take()
        };
        if let Some(teardown) = teardown {
            teardown.run();
        }
        self.settle_unpaired();
    }

    fn activate(&self, tree: &dyn HostTree) {
        {
            let mut st = self.state.borrow_mut();
            if st.active {
                return;
            }
            st.active = true;
            debug!(token = %st.context.token(), host = %st.host, "consumer activated");
        }
        self.announce(tree);
    }

    fn deactivate(&self) {
        {
            let mut st = self.state.borrow_mut();
            if !st.active {
                return;
            }
            st.active = false;
            debug!(token = %st.context.token(), host = %st.host, "consumer deactivated");
        }
        self.unpair();
    }

    fn repair(&self, tree: &dyn HostTree) {
        let (teardown, was_paired) = {
            let mut st = self.state.borrow_mut();
            if !st.active {
                return;
            }
            let was_paired = st.paired;
            st.paired = false;
            st.sync_pending = false;
            st.repairing = was_paired;
            debug!(token = %st.context.token(), host = %st.host, was_paired, "consumer repairing");
            (st.teardown.take(), was_paired)
        };
        if let Some(teardown) = teardown {
            teardown.run();
        }
        // The value is kept while re-announcing; it only resets if nothing answers.
        let paired = self.announce(tree);
        self.state.borrow_mut().repairing = false;
        if !paired && was_paired {
            self.settle_unpaired();
        }
    }
}

impl<T: ContextValue> Subscriber<T> for ConsumerCell<T> {
    fn on_pair(&self) {
        let mut st = self.state.borrow_mut();
        st.paired = true;
        st.sync_pending = !st.repairing;
    }

    fn on_update(&self, value: &T) {
        {
            let st = self.state.borrow();
            if !st.active || !st.paired {
                return;
            }
        }
        self.store(value.clone(), true);
    }

    fn on_unpair(&self, teardown: Teardown) {
        let stale = {
            let mut st = self.state.borrow_mut();
            if st.active && st.paired {
                st.teardown = Some(teardown);
                None
            } else {
                Some(teardown)
            }
        };
        // Left while the pairing was being set up.
        if let Some(teardown) = stale {
            teardown.run();
        }
    }

    fn on_provider_lost(&self) {
        {
            let mut st = self.state.borrow_mut();
            if !st.paired {
                return;
            }
            st.paired = false;
            st.sync_pending = false;
            st.teardown = None;
            debug!(token = %st.context.token(), host = %st.host, "provider lost");
        }
        self.settle_unpaired();
    }

    fn request_repair(&self, tree: &dyn HostTree) {
        self.repair(tree);
    }
}

impl<T: ContextValue + fmt::Debug> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.cell.state.borrow();
        f.debug_struct("Consumer")
            .field("token", &st.context.token())
            .field("host", &st.host)
            .field("value", &st.value)
            .field("active", &st.active)
            .field("paired", &st.paired)
            .finish()
    }
}

impl<T: ContextValue> Consumer<T> {
    pub(crate) fn from_cell(cell: Rc<ConsumerCell<T>>) -> Self {
        Self { cell }
    }

    /// Whether two handles refer to the same registration.
    pub fn same_registration(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Context this consumer reads.
    pub fn context(&self) -> Context<T> {
        self.cell.state.borrow().context.clone()
    }

    /// Host owning this registration.
    pub fn host(&self) -> HostId {
        self.cell.state.borrow().host
    }

    /// Current value: the paired provider's value, or the initial value.
    ///
    /// Both pass through the transform, if one is installed.
    pub fn value(&self) -> T {
        self.cell.state.borrow().value.clone()
    }

    /// Borrow the current value.
    ///
    /// `f` must not call back into this consumer.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.state.borrow().value)
    }

    /// Whether a provider currently serves this consumer.
    pub fn is_paired(&self) -> bool {
        self.cell.state.borrow().paired
    }

    /// Map every incoming value (and the fallback initial value) through `f`.
    ///
    /// Replaces any earlier transform and re-applies to the last raw value.
    pub fn set_transform(&self, f: impl Fn(&T) -> T + 'static) {
        let raw = {
            let mut st = self.cell.state.borrow_mut();
            st.transform = Some(Rc::new(f));
            st.raw.clone()
        };
        self.cell.store(raw, false);
    }

    /// Call `f` after every change of the visible value.
    ///
    /// Replaces any earlier callback. The first value after each pairing is
    /// always reported; a repair that re-pairs only reports an actual change.
    pub fn on_change(&self, f: impl Fn(&T) + 'static) {
        self.cell.state.borrow_mut().on_change = Some(Rc::new(f));
    }

    /// Drop the current pairing and announce again against `tree`.
    ///
    /// The current value is kept until a provider answers; if none does the
    /// consumer falls back to the initial value.
    pub fn request_repair(&self, tree: &dyn HostTree) {
        self.cell.repair(tree);
    }
}

impl<T: ContextValue> Activatable for Consumer<T> {
    /// Announce to the nearest provider.
    fn activate(&self, tree: &dyn HostTree) {
        self.cell.activate(tree);
    }

    /// Run the teardown and fall back to the initial value.
    fn deactivate(&self) {
        self.cell.deactivate();
    }

    fn is_active(&self) -> bool {
        self.cell.state.borrow().active
    }
}

impl<T: ContextValue> Repairable for Consumer<T> {
    fn repair(&self, tree: &dyn HostTree) {
        self.cell.repair(tree);
    }
}
