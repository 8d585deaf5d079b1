// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The activation protocol between consumers and providers.
//!
//! ## Overview
//!
//! A consumer that becomes active announces itself once. The announcement is
//! resolved by walking the host tree from the consumer's parent towards the
//! root; the first host with a listening provider for the same [`Token`] takes
//! it and no provider further away ever sees it.
//!
//! The matching provider then, synchronously and in this order:
//!
//! 1. calls [`Subscriber::on_pair`],
//! 2. calls [`Subscriber::on_update`] with its current value,
//! 3. hands back exactly one [`Teardown`] through [`Subscriber::on_unpair`].
//!
//! From then on the provider pushes every change through `on_update` until
//! either side leaves. A provider that leaves calls
//! [`Subscriber::on_provider_lost`] on each consumer it still holds; a consumer
//! that leaves runs its teardown.
//!
//! Both directions of the pairing are non-owning: providers keep `Weak`
//! subscriber handles and teardowns keep a `Weak` provider handle.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use tracing::error;

use crate::types::{HostId, HostTree, Token};

/// Lifecycle hooks driven by the host's owner.
///
/// Every registration (providers, consumers, record bags, binding controllers)
/// implements this. The owner calls `activate` when the host enters the live
/// tree and `deactivate` when it leaves, once each per cycle; both are
/// idempotent.
pub trait Activatable {
    /// The host entered the live tree.
    fn activate(&self, tree: &dyn HostTree);
    /// The host left the live tree.
    fn deactivate(&self);
    /// Whether the registration is currently active.
    fn is_active(&self) -> bool;
}

/// Callbacks a consumer hands to the provider it pairs with.
pub trait Subscriber<T> {
    /// The provider accepted the announcement.
    fn on_pair(&self);
    /// The provider's value, on pairing and on every change afterwards.
    fn on_update(&self, value: &T);
    /// The provider's cleanup hook for this pairing.
    fn on_unpair(&self, teardown: Teardown);
    /// The provider left; the pairing is already gone on its side.
    fn on_provider_lost(&self);
    /// Re-announce against the current tree, e.g. after an ancestor moved.
    fn request_repair(&self, tree: &dyn HostTree);
}

/// A consumer's announcement, carried up the ancestor chain.
pub struct Announcement<T> {
    /// Token of the requested context.
    pub token: Token,
    /// Host the announcing consumer lives on.
    pub host: HostId,
    /// Callbacks for the provider that accepts.
    pub subscriber: Rc<dyn Subscriber<T>>,
}

impl<T> fmt::Debug for Announcement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Announcement")
            .field("token", &self.token)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Identifier of one pairing within its provider.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

pub(crate) trait Detach {
    fn detach(&self, id: SubscriptionId);
}

/// Provider-side cleanup for a single pairing.
///
/// Running it removes the consumer from the provider's active set. It holds
/// the provider weakly, so running it after the provider is gone is a no-op.
pub struct Teardown {
    provider: Weak<dyn Detach>,
    id: SubscriptionId,
}

impl Teardown {
    pub(crate) fn new(provider: Weak<dyn Detach>, id: SubscriptionId) -> Self {
        Self { provider, id }
    }

    /// Pairing this teardown belongs to.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the pairing from the provider.
    pub fn run(self) {
        if let Some(provider) = self.provider.upgrade() {
            provider.detach(self.id);
        }
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown")
            .field("id", &self.id)
            .field("provider_alive", &(self.provider.strong_count() > 0))
            .finish()
    }
}

/// Run one subscriber callback so that a panic inside it cannot stop delivery
/// to the remaining subscribers.
pub(crate) fn isolate(token: Token, host: HostId, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(%token, %host, "context subscriber panicked; continuing with remaining subscribers");
    }
}
