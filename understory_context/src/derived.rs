// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Derived contexts: values computed from other contexts.
//!
//! ## Overview
//!
//! A derived context lists its sources and a derivation function. Its initial
//! value is the derivation applied to the sources' initial values.
//!
//! Providing a derived context on a host also creates one internal consumer per
//! source on that same host. Those consumers announce starting at the host
//! itself, so the sources may be provided on the host or on any ancestor. The
//! derived value is recomputed only once every source has delivered a value:
//!
//! ```text
//! Uninitialized --value--> PartiallyBound(n) --last value--> Bound
//!       ^                        |                              |
//!       +----- all cleared ------+---- one cleared (keep) ------+
//! ```
//!
//! When every source is lost the value resets to the initial value. Losing only
//! some of them keeps the last computed value.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::context::{Context, ErasedContext};
use crate::protocol::Activatable;
use crate::provider::ProviderCell;
use crate::registry::{Registry, Repairable};
use crate::types::{ContextValue, HostId};

/// Binding progress of a derived provider.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DerivedPhase {
    /// No source has delivered a value.
    Uninitialized,
    /// Some, but not all, sources have delivered a value.
    PartiallyBound(usize),
    /// Every source has delivered a value.
    Bound,
}

/// The ordered source list of a derived context.
#[derive(Clone, Default)]
pub struct Sources {
    list: Vec<Rc<dyn ErasedContext>>,
}

impl fmt::Debug for Sources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.list.iter().map(|s| s.token()))
            .finish()
    }
}

impl Sources {
    /// Create an empty source list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source. Its position is its index in [`DeriveInputs`].
    #[must_use]
    pub fn with<U: ContextValue>(mut self, source: &Context<U>) -> Self {
        self.list.push(Rc::new(source.clone()));
        self
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

/// The current value of every source, in source order.
pub struct DeriveInputs<'a> {
    values: &'a [Rc<dyn Any>],
}

impl fmt::Debug for DeriveInputs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeriveInputs")
            .field("len", &self.values.len())
            .finish()
    }
}

impl DeriveInputs<'_> {
    /// Number of inputs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no inputs.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of source `index`, if it exists and has type `U`.
    pub fn try_get<U: 'static>(&self, index: usize) -> Option<&U> {
        self.values.get(index)?.downcast_ref::<U>()
    }

    /// Value of source `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the source's value type is not `U`.
    #[track_caller]
    pub fn get<U: 'static>(&self, index: usize) -> &U {
        match self.try_get(index) {
            Some(v) => v,
            None => panic!(
                "derive input {index} is missing or is not a `{}`",
                std::any::type_name::<U>()
            ),
        }
    }
}

pub(crate) struct Derivation<T> {
    sources: Vec<Rc<dyn ErasedContext>>,
    derive: Rc<dyn Fn(&DeriveInputs<'_>) -> T>,
}

impl<T> Derivation<T> {
    /// One unregistered consumer per source, feeding `sink`.
    pub(crate) fn links(
        &self,
        registry: &Registry,
        host: HostId,
        sink: Weak<dyn SlotSink>,
    ) -> Vec<Rc<dyn Link>> {
        self.sources
            .iter()
            .enumerate()
            .map(|(slot, source)| source.link(registry, host, slot, sink.clone()))
            .collect()
    }
}

/// The lifecycle of a derived provider's internal consumers.
pub(crate) trait Link: Activatable + Repairable {}

impl<L: Activatable + Repairable> Link for L {}

/// Receiver for source values, one slot per source.
pub(crate) trait SlotSink {
    fn slot_value(&self, slot: usize, value: Rc<dyn Any>);
    fn slot_cleared(&self, slot: usize);
}

pub(crate) struct DerivedCore<T> {
    provider: Weak<ProviderCell<T>>,
    derive: Rc<dyn Fn(&DeriveInputs<'_>) -> T>,
    initial: T,
    slots: RefCell<Slots>,
}

struct Slots {
    values: Vec<Option<Rc<dyn Any>>>,
    phase: DerivedPhase,
}

impl Slots {
    fn refresh(&mut self) {
        let filled = self.values.iter().filter(|v| v.is_some()).count();
        self.phase = if filled == 0 {
            DerivedPhase::Uninitialized
        } else if filled == self.values.len() {
            DerivedPhase::Bound
        } else {
            DerivedPhase::PartiallyBound(filled)
        };
    }
}

impl<T: ContextValue> DerivedCore<T> {
    pub(crate) fn new(derivation: &Derivation<T>, provider: Weak<ProviderCell<T>>, initial: T) -> Self {
        Self {
            provider,
            derive: derivation.derive.clone(),
            initial,
            slots: RefCell::new(Slots {
                values: vec![None; derivation.sources.len()],
                phase: DerivedPhase::Uninitialized,
            }),
        }
    }

    pub(crate) fn phase(&self) -> DerivedPhase {
        self.slots.borrow().phase
    }

    /// Forget every source value.
    pub(crate) fn reset(&self) {
        let mut slots = self.slots.borrow_mut();
        slots.values.iter_mut().for_each(|v| *v = None);
        slots.phase = DerivedPhase::Uninitialized;
    }

    fn publish(&self, value: T) {
        if let Some(provider) = self.provider.upgrade() {
            provider.publish(value);
        }
    }
}

impl<T: ContextValue> SlotSink for DerivedCore<T> {
    fn slot_value(&self, slot: usize, value: Rc<dyn Any>) {
        let inputs: Vec<Rc<dyn Any>> = {
            let mut slots = self.slots.borrow_mut();
            slots.values[slot] = Some(value);
            slots.refresh();
            trace!(slot, phase = ?slots.phase, "derived source updated");
            if slots.phase != DerivedPhase::Bound {
                return;
            }
            slots.values.iter().flatten().cloned().collect()
        };
        let next = (self.derive)(&DeriveInputs { values: &inputs });
        self.publish(next);
    }

    fn slot_cleared(&self, slot: usize) {
        let reset = {
            let mut slots = self.slots.borrow_mut();
            slots.values[slot] = None;
            slots.refresh();
            trace!(slot, phase = ?slots.phase, "derived source cleared");
            slots.phase == DerivedPhase::Uninitialized
        };
        if reset {
            self.publish(self.initial.clone());
        }
    }
}

/// Create a context whose value is `derive` applied to the current values of
/// `sources`.
///
/// The initial value is `derive` applied to the sources' initial values.
/// Providers of the returned context ignore direct assignments.
pub fn create_derived_context<T: ContextValue>(
    sources: Sources,
    derive: impl Fn(&DeriveInputs<'_>) -> T + 'static,
) -> Context<T> {
    let initials: Vec<Rc<dyn Any>> = sources.list.iter().map(|s| s.initial_any()).collect();
    let initial = derive(&DeriveInputs { values: &initials });
    Context::with_derivation(
        initial,
        Derivation {
            sources: sources.list,
            derive: Rc::new(derive),
        },
    )
}

/// Derived context over two sources.
pub fn derived2<A, B, T>(a: &Context<A>, b: &Context<B>, f: impl Fn(&A, &B) -> T + 'static) -> Context<T>
where
    A: ContextValue,
    B: ContextValue,
    T: ContextValue,
{
    create_derived_context(Sources::new().with(a).with(b), move |v| {
        f(v.get::<A>(0), v.get::<B>(1))
    })
}

/// Derived context over three sources.
pub fn derived3<A, B, C, T>(
    a: &Context<A>,
    b: &Context<B>,
    c: &Context<C>,
    f: impl Fn(&A, &B, &C) -> T + 'static,
) -> Context<T>
where
    A: ContextValue,
    B: ContextValue,
    C: ContextValue,
    T: ContextValue,
{
    create_derived_context(Sources::new().with(a).with(b).with(c), move |v| {
        f(v.get::<A>(0), v.get::<B>(1), v.get::<C>(2))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::create_context;
    use crate::types::HostMap;

    fn hosts() -> HostMap {
        let mut hosts = HostMap::new();
        hosts.insert(HostId(1), None, "media-controller");
        hosts.insert(HostId(2), Some(HostId(1)), "media-control-bar");
        hosts.insert(HostId(3), Some(HostId(2)), "media-time-display");
        hosts
    }

    #[test]
    fn initial_value_derives_from_source_initials() {
        let a = create_context(10_i32);
        let b = create_context(String::from("B"));
        let d = derived2(&a, &b, |n, s| format!("{n}-{s}"));
        assert!(d.is_derived());
        assert_eq!(d.initial_value(), "10-B");
    }

    #[test]
    fn recomputes_only_when_all_sources_are_bound() {
        let hosts = hosts();
        let registry = Registry::new();
        let a = create_context(10_i32);
        let b = create_context(String::from("B"));
        let d = derived2(&a, &b, |n, s| format!("{n}-{s}"));

        let pa = a.make_provider(&registry, &hosts, HostId(1)).unwrap();
        let pb = b.make_provider(&registry, &hosts, HostId(1)).unwrap();
        let pd = d.make_provider(&registry, &hosts, HostId(1)).unwrap();
        registry.activate_host(HostId(1), &hosts);
        assert_eq!(pd.derived_phase(), Some(DerivedPhase::Bound));
        assert_eq!(pd.value(), "10-B");

        pa.set(20);
        assert_eq!(pd.value(), "20-B");
        pb.set(String::from("B2"));
        assert_eq!(pd.value(), "20-B2");

        pa.deactivate();
        assert_eq!(pd.derived_phase(), Some(DerivedPhase::PartiallyBound(1)));
        assert_eq!(pd.value(), "20-B2", "a partial loss keeps the last value");

        pb.deactivate();
        assert_eq!(pd.derived_phase(), Some(DerivedPhase::Uninitialized));
        assert_eq!(pd.value(), "10-B");
    }

    #[test]
    fn set_on_derived_provider_is_ignored() {
        let hosts = hosts();
        let registry = Registry::new();
        let a = create_context(1_u32);
        let b = create_context(2_u32);
        let d = derived2(&a, &b, |x, y| x + y);
        let pd = d.make_provider(&registry, &hosts, HostId(1)).unwrap();
        pd.activate(&hosts);
        pd.set(100);
        assert_eq!(pd.value(), 3);
        assert!(pd.is_derived());
    }

    #[test]
    fn sources_may_live_on_ancestors() {
        let hosts = hosts();
        let registry = Registry::new();
        let a = create_context(1_u32);
        let b = create_context(1_u32);
        let c = create_context(1_u32);
        let d = derived3(&a, &b, &c, |x, y, z| x * y * z);

        let pa = a.make_provider(&registry, &hosts, HostId(1)).unwrap();
        let pb = b.make_provider(&registry, &hosts, HostId(1)).unwrap();
        let pc = c.make_provider(&registry, &hosts, HostId(2)).unwrap();
        registry.activate_host(HostId(1), &hosts);
        registry.activate_host(HostId(2), &hosts);
        pa.set(2);
        pb.set(3);
        pc.set(4);

        let pd = d.make_provider(&registry, &hosts, HostId(2)).unwrap();
        pd.activate(&hosts);
        assert_eq!(pd.value(), 24);

        let reader = d.make_consumer(&registry, &hosts, HostId(3)).unwrap();
        reader.activate(&hosts);
        assert_eq!(reader.value(), 24);
        pa.set(5);
        assert_eq!(reader.value(), 60);
    }

    #[test]
    fn deactivating_derived_provider_resets_and_reactivates_cleanly() {
        let hosts = hosts();
        let registry = Registry::new();
        let a = create_context(0_i32);
        let d = create_derived_context(Sources::new().with(&a), |v| v.get::<i32>(0) * 2);
        let pa = a.make_provider(&registry, &hosts, HostId(1)).unwrap();
        pa.activate(&hosts);
        pa.set(4);

        let pd = d.make_provider(&registry, &hosts, HostId(2)).unwrap();
        pd.activate(&hosts);
        assert_eq!(pd.value(), 8);
        assert_eq!(pa.consumer_count(), 1);

        pd.deactivate();
        assert_eq!(pd.value(), 0);
        assert_eq!(pa.consumer_count(), 0);
        assert_eq!(pd.derived_phase(), Some(DerivedPhase::Uninitialized));

        pd.activate(&hosts);
        assert_eq!(pd.value(), 8);
    }

    #[test]
    fn derive_inputs_report_type_mismatches() {
        let values: Vec<Rc<dyn Any>> = vec![Rc::new(1_u8), Rc::new("x")];
        let inputs = DeriveInputs { values: &values };
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs.try_get::<u8>(0), Some(&1));
        assert_eq!(inputs.try_get::<u16>(0), None);
        assert_eq!(inputs.try_get::<u8>(5), None);
        assert_eq!(*inputs.get::<&'static str>(1), "x");
    }
}
