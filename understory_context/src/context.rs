// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Context definitions: tokens plus provider/consumer factories.

use std::any::{Any, type_name};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::consumer::{Consumer, ConsumerCell, Reach};
use crate::derived::{Derivation, Link, SlotSink};
use crate::error::{ContextError, Operation, Result};
use crate::protocol::Activatable;
use crate::provider::Provider;
use crate::record::{BoundField, RecordSide};
use crate::registry::Registry;
use crate::types::{ContextValue, HostId, HostTree, Token};

/// A typed, globally tokenized slot of shared state.
///
/// Cloning a `Context` clones the handle, not the context: clones share the
/// token and therefore pair with each other's registrations.
pub struct Context<T> {
    inner: Rc<ContextInner<T>>,
}

struct ContextInner<T> {
    token: Token,
    initial: T,
    derivation: Option<Derivation<T>>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for Context<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.token == other.inner.token
    }
}

impl<T> Eq for Context<T> {}

impl<T: fmt::Debug> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("token", &self.inner.token)
            .field("initial", &self.inner.initial)
            .field("derived", &self.inner.derivation.is_some())
            .finish()
    }
}

/// Create a plain context with the given initial value.
pub fn create_context<T: ContextValue>(initial: T) -> Context<T> {
    Context::new(initial)
}

impl<T: ContextValue> Context<T> {
    /// Create a plain context with the given initial value.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                token: Token::fresh(),
                initial,
                derivation: None,
            }),
        }
    }

    pub(crate) fn with_derivation(initial: T, derivation: Derivation<T>) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                token: Token::fresh(),
                initial,
                derivation: Some(derivation),
            }),
        }
    }

    /// Identity of this context.
    pub fn token(&self) -> Token {
        self.inner.token
    }

    /// Value providers start from and reset to.
    pub fn initial_value(&self) -> &T {
        &self.inner.initial
    }

    /// Whether the value is computed from other contexts.
    pub fn is_derived(&self) -> bool {
        self.inner.derivation.is_some()
    }

    pub(crate) fn derivation(&self) -> Option<&Derivation<T>> {
        self.inner.derivation.as_ref()
    }

    /// Provider registration for `host`.
    ///
    /// Repeated calls for the same host return the same registration. The
    /// registration starts inactive; the host's owner activates it.
    ///
    /// Fails if the host tree reports that `host` has no activation lifecycle.
    pub fn make_provider(
        &self,
        registry: &Registry,
        tree: &dyn HostTree,
        host: HostId,
    ) -> Result<Provider<T>> {
        check_lifecycle(tree, host, Operation::MakeProvider)?;
        Ok(registry.provider(self, host))
    }

    /// Consumer registration for `host`.
    ///
    /// Repeated calls for the same host return the same registration. The
    /// registration starts inactive and holds the initial value until paired.
    ///
    /// Fails if the host tree reports that `host` has no activation lifecycle.
    pub fn make_consumer(
        &self,
        registry: &Registry,
        tree: &dyn HostTree,
        host: HostId,
    ) -> Result<Consumer<T>> {
        check_lifecycle(tree, host, Operation::MakeConsumer)?;
        Ok(registry.consumer(self, host))
    }
}

pub(crate) fn check_lifecycle(tree: &dyn HostTree, host: HostId, operation: Operation) -> Result<()> {
    if tree.has_lifecycle(host) {
        Ok(())
    } else {
        Err(ContextError::MissingLifecycle {
            operation,
            host_type: tree.type_name(host),
            host: host.to_string(),
        })
    }
}

/// A context with its value type erased, as held by derived contexts and records.
pub(crate) trait ErasedContext {
    fn token(&self) -> Token;
    fn is_derived(&self) -> bool;
    fn value_type(&self) -> &'static str;
    fn initial_any(&self) -> Rc<dyn Any>;
    /// Unregistered consumer on `host` that feeds slot `slot` of a derivation.
    fn link(
        &self,
        registry: &Registry,
        host: HostId,
        slot: usize,
        sink: Weak<dyn SlotSink>,
    ) -> Rc<dyn Link>;
    /// Registration for one record field, already activated.
    fn bind_field(
        &self,
        registry: &Registry,
        tree: &dyn HostTree,
        host: HostId,
        side: RecordSide,
        name: &str,
    ) -> Result<BoundField>;
}

impl<U: ContextValue> ErasedContext for Context<U> {
    fn token(&self) -> Token {
        Self::token(self)
    }

    fn is_derived(&self) -> bool {
        Self::is_derived(self)
    }

    fn value_type(&self) -> &'static str {
        type_name::<U>()
    }

    fn initial_any(&self) -> Rc<dyn Any> {
        Rc::new(self.initial_value().clone())
    }

    fn link(
        &self,
        registry: &Registry,
        host: HostId,
        slot: usize,
        sink: Weak<dyn SlotSink>,
    ) -> Rc<dyn Link> {
        let cell = ConsumerCell::new(self.clone(), host, registry.downgrade(), Reach::HostAndAncestors);
        let on_value = sink.clone();
        cell.set_link_hooks(
            move |value: &U| {
                if let Some(sink) = on_value.upgrade() {
                    sink.slot_value(slot, Rc::new(value.clone()));
                }
            },
            move || {
                if let Some(sink) = sink.upgrade() {
                    sink.slot_cleared(slot);
                }
            },
        );
        Rc::new(Consumer::from_cell(cell))
    }

    fn bind_field(
        &self,
        registry: &Registry,
        tree: &dyn HostTree,
        host: HostId,
        side: RecordSide,
        name: &str,
    ) -> Result<BoundField> {
        let (handle, lifecycle): (Rc<dyn Any>, Rc<dyn Activatable>) = match side {
            RecordSide::Provide => {
                let provider = self.make_provider(registry, tree, host)?;
                (Rc::new(provider.clone()), Rc::new(provider))
            }
            RecordSide::Consume => {
                let consumer = self.make_consumer(registry, tree, host)?;
                (Rc::new(consumer.clone()), Rc::new(consumer))
            }
        };
        Ok(BoundField {
            name: name.to_string(),
            derived: self.is_derived(),
            value_type: type_name::<U>(),
            handle,
            lifecycle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlatHosts, HostMap};

    #[test]
    fn identity_is_the_token() {
        let a = create_context(1_i32);
        let b = create_context(1_i32);
        assert_ne!(a, b, "equal initial values do not make equal contexts");
        assert_eq!(a, a.clone());
        assert_ne!(a.token(), b.token());
        assert!(!a.is_derived());
        assert_eq!(*a.initial_value(), 1);
    }

    #[test]
    fn registrations_are_cached_per_host_and_token() {
        let registry = Registry::new();
        let ctx = create_context(0_u8);
        let p1 = ctx.make_provider(&registry, &FlatHosts, HostId(1)).unwrap();
        let p2 = ctx.make_provider(&registry, &FlatHosts, HostId(1)).unwrap();
        assert!(p1.same_registration(&p2));

        let other = ctx.make_provider(&registry, &FlatHosts, HostId(2)).unwrap();
        assert!(!p1.same_registration(&other));

        let c1 = ctx.make_consumer(&registry, &FlatHosts, HostId(3)).unwrap();
        let c2 = ctx.make_consumer(&registry, &FlatHosts, HostId(3)).unwrap();
        assert!(c1.same_registration(&c2));
    }

    #[test]
    fn hosts_without_lifecycle_are_rejected() {
        let registry = Registry::new();
        let mut hosts = HostMap::new();
        hosts.insert_inert(HostId(5), None, "#text");
        let ctx = create_context(false);

        let err = ctx.make_provider(&registry, &hosts, HostId(5)).unwrap_err();
        assert_eq!(
            err,
            ContextError::MissingLifecycle {
                operation: Operation::MakeProvider,
                host_type: "#text".to_string(),
                host: "host#5".to_string(),
            }
        );

        let err = ctx.make_consumer(&registry, &hosts, HostId(5)).unwrap_err();
        assert!(matches!(
            err,
            ContextError::MissingLifecycle {
                operation: Operation::MakeConsumer,
                ..
            }
        ));
    }
}
