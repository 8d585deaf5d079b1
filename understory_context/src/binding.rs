// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binding controllers: mirror context values into element outputs.
//!
//! ## Overview
//!
//! A [`BindingController`] belongs to one host. Each [`bind`](BindingController::bind)
//! call creates a consumer for a context on that host and writes the consumer's
//! value into one named output of the host's element, now and after every
//! change. Outputs are attributes ([`Attributes`]) or custom style properties
//! ([`StyleProperties`]).
//!
//! Values become output text through [`AttrValue`]:
//!
//! | value              | output                      |
//! |--------------------|-----------------------------|
//! | `Nil`, `Bool(false)` | removed                   |
//! | `Bool(true)`       | present with an empty value |
//! | `Text(s)`          | `s`                         |
//!
//! A custom transform may map a value to `Some(AttrValue)`; `None` falls back to
//! the value's own [`ToAttrValue`] conversion.
//!
//! Bindings on one controller are independent: they may target different
//! contexts, or the same context under different output names.
//!
//! A controller is attached to its host in the [`Registry`], so
//! [`Registry::activate_host`], [`Registry::deactivate_host`],
//! [`Registry::repair_host`] and [`Registry::release_host`] drive its bindings
//! along with the host's own registrations.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::consumer::{Consumer, ConsumerCell, Reach};
use crate::context::{Context, check_lifecycle};
use crate::derived::Link;
use crate::error::{Operation, Result};
use crate::protocol::Activatable;
use crate::registry::{Registry, Repairable, WeakRegistry};
use crate::types::{ContextValue, HostId, HostTree, Snapshot, Token};

/// A value as it will be written to an output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttrValue {
    /// No value: the output is removed.
    Nil,
    /// `true` writes an empty value, `false` removes the output.
    Bool(bool),
    /// Written verbatim.
    Text(String),
}

impl AttrValue {
    /// The output text, or `None` if the output should be removed.
    pub fn render(&self) -> Option<&str> {
        match self {
            Self::Nil | Self::Bool(false) => None,
            Self::Bool(true) => Some(""),
            Self::Text(s) => Some(s),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Default conversion of a context value into an output value.
pub trait ToAttrValue {
    /// Convert `self`.
    fn to_attr_value(&self) -> AttrValue;
}

impl ToAttrValue for AttrValue {
    fn to_attr_value(&self) -> AttrValue {
        self.clone()
    }
}

impl ToAttrValue for bool {
    fn to_attr_value(&self) -> AttrValue {
        AttrValue::Bool(*self)
    }
}

impl ToAttrValue for String {
    fn to_attr_value(&self) -> AttrValue {
        AttrValue::Text(self.clone())
    }
}

impl ToAttrValue for &'static str {
    fn to_attr_value(&self) -> AttrValue {
        AttrValue::Text((*self).to_string())
    }
}

impl<T: ToAttrValue> ToAttrValue for Option<T> {
    fn to_attr_value(&self) -> AttrValue {
        match self {
            Some(v) => v.to_attr_value(),
            None => AttrValue::Nil,
        }
    }
}

impl<T: ToAttrValue> ToAttrValue for Snapshot<T> {
    fn to_attr_value(&self) -> AttrValue {
        (**self).to_attr_value()
    }
}

macro_rules! display_attr_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl ToAttrValue for $t {
                fn to_attr_value(&self) -> AttrValue {
                    AttrValue::Text(self.to_string())
                }
            }
        )*
    };
}

display_attr_value!(char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

/// An element whose attributes can be written.
pub trait AttributeTarget {
    /// Set `name` to `value`.
    fn set_attribute(&self, name: &str, value: &str);
    /// Remove `name`.
    fn remove_attribute(&self, name: &str);
}

/// An element whose custom style properties can be written.
pub trait StyleTarget {
    /// Set the property `name` (e.g. `--media-primary-color`) to `value`.
    fn set_style_property(&self, name: &str, value: &str);
    /// Remove the property `name`.
    fn remove_style_property(&self, name: &str);
}

/// One kind of named output on an element.
pub trait OutputSink {
    /// Write `value` to `name`.
    fn write(&self, name: &str, value: &str);
    /// Remove `name`.
    fn clear(&self, name: &str);
}

/// Outputs are attributes of `E`.
#[derive(Clone, Debug)]
pub struct Attributes<E>(pub E);

impl<E: AttributeTarget> OutputSink for Attributes<E> {
    fn write(&self, name: &str, value: &str) {
        self.0.set_attribute(name, value);
    }

    fn clear(&self, name: &str) {
        self.0.remove_attribute(name);
    }
}

/// Outputs are custom style properties of `E`.
#[derive(Clone, Debug)]
pub struct StyleProperties<E>(pub E);

impl<E: StyleTarget> OutputSink for StyleProperties<E> {
    fn write(&self, name: &str, value: &str) {
        self.0.set_style_property(name, value);
    }

    fn clear(&self, name: &str) {
        self.0.remove_style_property(name);
    }
}

fn write_output<S: OutputSink + ?Sized>(sink: &S, name: &str, value: &AttrValue) {
    match value.render() {
        Some(text) => sink.write(name, text),
        None => sink.clear(name),
    }
}

struct Binding {
    token: Token,
    output: String,
    link: Rc<dyn Link>,
    // Writes the consumer's current value to the output.
    refresh: Rc<dyn Fn()>,
}

/// Mirrors context values into the outputs of one host's element.
///
/// Cloning yields another handle to the same controller.
pub struct BindingController<S> {
    core: Rc<ControllerCore<S>>,
}

impl<S> Clone for BindingController<S> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

struct ControllerCore<S> {
    registry: WeakRegistry,
    host: HostId,
    sink: Rc<S>,
    active: Cell<bool>,
    bindings: RefCell<Vec<Binding>>,
}

/// Controller writing attributes.
pub type AttributeBindingController<E> = BindingController<Attributes<E>>;

/// Controller writing custom style properties.
pub type StyleBindingController<E> = BindingController<StyleProperties<E>>;

impl<S> fmt::Debug for BindingController<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = &self.core;
        let bindings = core.bindings.borrow();
        f.debug_struct("BindingController")
            .field("host", &core.host)
            .field("active", &core.active.get())
            .field(
                "outputs",
                &bindings.iter().map(|b| b.output.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<E: AttributeTarget + 'static> BindingController<Attributes<E>> {
    /// Controller writing attributes of `target`.
    pub fn attributes(registry: &Registry, host: HostId, target: E) -> Self {
        Self::new(registry, host, Attributes(target))
    }
}

impl<E: StyleTarget + 'static> BindingController<StyleProperties<E>> {
    /// Controller writing custom style properties of `target`.
    pub fn style_properties(registry: &Registry, host: HostId, target: E) -> Self {
        Self::new(registry, host, StyleProperties(target))
    }
}

impl<S: OutputSink + 'static> BindingController<S> {
    /// Create an inactive controller for `host` and attach it to the host.
    pub fn new(registry: &Registry, host: HostId, sink: S) -> Self {
        let core = Rc::new(ControllerCore {
            registry: registry.downgrade(),
            host,
            sink: Rc::new(sink),
            active: Cell::new(false),
            bindings: RefCell::new(Vec::new()),
        });
        registry.attach_controller(host, core.clone());
        Self { core }
    }

    /// Host the controller belongs to.
    pub fn host(&self) -> HostId {
        self.core.host
    }

    /// The output sink.
    pub fn sink(&self) -> &S {
        &self.core.sink
    }

    /// Number of live bindings.
    pub fn binding_count(&self) -> usize {
        self.core.bindings.borrow().len()
    }

    /// Mirror `context` into the output `output` using the default conversion.
    pub fn bind<T>(&self, tree: &dyn HostTree, context: &Context<T>, output: &str) -> Result<()>
    where
        T: ContextValue + ToAttrValue,
    {
        self.core.bind(tree, context, output, None)
    }

    /// Mirror `context` into `output`, mapping values through `transform` first.
    ///
    /// When `transform` returns `None` the default conversion is used.
    pub fn bind_with<T>(
        &self,
        tree: &dyn HostTree,
        context: &Context<T>,
        output: &str,
        transform: impl Fn(&T) -> Option<AttrValue> + 'static,
    ) -> Result<()>
    where
        T: ContextValue + ToAttrValue,
    {
        self.core.bind(tree, context, output, Some(Rc::new(transform)))
    }

    /// Drop every binding of `context`: deactivate its consumer and remove the
    /// output right away. Returns the number of bindings removed.
    pub fn unbind<T: ContextValue>(&self, context: &Context<T>) -> usize {
        self.core.unbind(context.token())
    }

    /// Re-pair every binding after the host moved.
    pub fn repair(&self, tree: &dyn HostTree) {
        self.core.repair(tree);
    }
}

impl<S: OutputSink + 'static> ControllerCore<S> {
    fn bind<T>(
        &self,
        tree: &dyn HostTree,
        context: &Context<T>,
        output: &str,
        transform: Option<Rc<dyn Fn(&T) -> Option<AttrValue>>>,
    ) -> Result<()>
    where
        T: ContextValue + ToAttrValue,
    {
        check_lifecycle(tree, self.host, Operation::MakeConsumer)?;
        let consumer = Consumer::from_cell(ConsumerCell::new(
            context.clone(),
            self.host,
            self.registry.clone(),
            Reach::Ancestors,
        ));

        let render: Rc<dyn Fn(&T)> = {
            let sink = self.sink.clone();
            let name = output.to_string();
            Rc::new(move |value: &T| {
                let out = transform
                    .as_ref()
                    .and_then(|f| f(value))
                    .unwrap_or_else(|| value.to_attr_value());
                write_output(&*sink, &name, &out);
            })
        };
        {
            let render = render.clone();
            consumer.on_change(move |value| render(value));
        }
        let refresh: Rc<dyn Fn()> = {
            let consumer = consumer.clone();
            Rc::new(move || render(&consumer.value()))
        };

        let token = context.token();
        self.bindings.borrow_mut().push(Binding {
            token,
            output: output.to_string(),
            link: Rc::new(consumer.clone()),
            refresh: refresh.clone(),
        });
        if self.active.get() {
            consumer.activate(tree);
        }
        refresh();
        debug!(%token, host = %self.host, output, "output bound");
        Ok(())
    }

    fn unbind(&self, token: Token) -> usize {
        let removed: Vec<Binding> = {
            let mut bindings = self.bindings.borrow_mut();
            let (gone, kept): (Vec<Binding>, Vec<Binding>) = core::mem::take(&mut *bindings)
                .into_iter()
                .partition(|b| b.token == token);
            *bindings = kept;
            gone
        };
        for b in &removed {
            b.link.deactivate();
            self.sink.clear(&b.output);
        }
        if !removed.is_empty() {
            debug!(%token, host = %self.host, count = removed.len(), "output unbound");
        }
        removed.len()
    }

    fn snapshot(&self) -> Vec<(Rc<dyn Link>, Rc<dyn Fn()>)> {
        self.bindings
            .borrow()
            .iter()
            .map(|b| (b.link.clone(), b.refresh.clone()))
            .collect()
    }
}

impl<S: OutputSink + 'static> Repairable for ControllerCore<S> {
    fn repair(&self, tree: &dyn HostTree) {
        if !self.active.get() {
            return;
        }
        for (link, refresh) in self.snapshot() {
            link.repair(tree);
            refresh();
        }
    }
}

impl<S: OutputSink + 'static> Activatable for ControllerCore<S> {
    fn activate(&self, tree: &dyn HostTree) {
        if self.active.replace(true) {
            return;
        }
        for (link, refresh) in self.snapshot() {
            link.activate(tree);
            refresh();
        }
    }

    /// Unpair every binding. Outputs fall back to the contexts' initial values.
    fn deactivate(&self) {
        if !self.active.replace(false) {
            return;
        }
        for (link, _) in self.snapshot().into_iter().rev() {
            link.deactivate();
        }
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl<S: OutputSink + 'static> Activatable for BindingController<S> {
    fn activate(&self, tree: &dyn HostTree) {
        self.core.activate(tree);
    }

    /// Unpair every binding. Outputs fall back to the contexts' initial values.
    fn deactivate(&self) {
        self.core.deactivate();
    }

    fn is_active(&self) -> bool {
        self.core.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::create_context;
    use crate::error::ContextError;
    use crate::types::HostMap;
    use std::collections::BTreeMap;

    #[derive(Clone, Default)]
    struct Recorder {
        attrs: Rc<RefCell<BTreeMap<String, String>>>,
        style: Rc<RefCell<BTreeMap<String, String>>>,
    }

    impl Recorder {
        fn attr(&self, name: &str) -> Option<String> {
            self.attrs.borrow().get(name).cloned()
        }

        fn prop(&self, name: &str) -> Option<String> {
            self.style.borrow().get(name).cloned()
        }
    }

    impl AttributeTarget for Recorder {
        fn set_attribute(&self, name: &str, value: &str) {
            self.attrs.borrow_mut().insert(name.to_string(), value.to_string());
        }

        fn remove_attribute(&self, name: &str) {
            self.attrs.borrow_mut().remove(name);
        }
    }

    impl StyleTarget for Recorder {
        fn set_style_property(&self, name: &str, value: &str) {
            self.style.borrow_mut().insert(name.to_string(), value.to_string());
        }

        fn remove_style_property(&self, name: &str) {
            self.style.borrow_mut().remove(name);
        }
    }

    fn hosts() -> HostMap {
        let mut hosts = HostMap::new();
        hosts.insert(HostId(1), None, "media-controller");
        hosts.insert(HostId(2), Some(HostId(1)), "media-play-button");
        hosts.insert_inert(HostId(3), Some(HostId(1)), "#text");
        hosts
    }

    #[test]
    fn render_rules() {
        assert_eq!(AttrValue::Nil.render(), None);
        assert_eq!(AttrValue::Bool(false).render(), None);
        assert_eq!(AttrValue::Bool(true).render(), Some(""));
        assert_eq!(AttrValue::from("on").render(), Some("on"));
        assert_eq!(Some(3_u8).to_attr_value(), AttrValue::Text("3".to_string()));
        assert_eq!(None::<u8>.to_attr_value(), AttrValue::Nil);
        assert_eq!(0.5_f64.to_attr_value(), AttrValue::Text("0.5".to_string()));
    }

    #[test]
    fn boolean_attribute_is_present_or_absent() {
        let hosts = hosts();
        let registry = Registry::new();
        let active = create_context(false);
        let provider = active.make_provider(&registry, &hosts, HostId(1)).unwrap();
        provider.activate(&hosts);
        provider.set(true);

        let el = Recorder::default();
        let controller = BindingController::attributes(&registry, HostId(2), el.clone());
        controller.activate(&hosts);
        controller.bind(&hosts, &active, "active").unwrap();
        assert_eq!(el.attr("active").as_deref(), Some(""));

        provider.set(false);
        assert_eq!(el.attr("active"), None, "false removes rather than writing \"false\"");
    }

    #[test]
    fn custom_transform_overrides_default() {
        let hosts = hosts();
        let registry = Registry::new();
        let muted = create_context(false);
        let provider = muted.make_provider(&registry, &hosts, HostId(1)).unwrap();
        provider.activate(&hosts);

        let el = Recorder::default();
        let controller = BindingController::attributes(&registry, HostId(2), el.clone());
        controller.activate(&hosts);
        controller
            .bind_with(&hosts, &muted, "aria-pressed", |m| {
                Some(AttrValue::from(if *m { "true" } else { "false" }))
            })
            .unwrap();
        assert_eq!(el.attr("aria-pressed").as_deref(), Some("false"));
        provider.set(true);
        assert_eq!(el.attr("aria-pressed").as_deref(), Some("true"));
    }

    #[test]
    fn transform_returning_none_uses_default() {
        let hosts = hosts();
        let registry = Registry::new();
        let volume = create_context(1.0_f64);
        let provider = volume.make_provider(&registry, &hosts, HostId(1)).unwrap();
        provider.activate(&hosts);

        let el = Recorder::default();
        let controller = BindingController::style_properties(&registry, HostId(2), el.clone());
        controller.activate(&hosts);
        controller
            .bind_with(&hosts, &volume, "--media-volume", |v| {
                (*v == 0.0).then(|| AttrValue::from("muted"))
            })
            .unwrap();
        assert_eq!(el.prop("--media-volume").as_deref(), Some("1"));
        provider.set(0.0);
        assert_eq!(el.prop("--media-volume").as_deref(), Some("muted"));
        provider.set(0.25);
        assert_eq!(el.prop("--media-volume").as_deref(), Some("0.25"));
    }

    #[test]
    fn bindings_are_independent_and_unbind_removes_output() {
        let hosts = hosts();
        let registry = Registry::new();
        let paused = create_context(true);
        let label = create_context(String::from("Play"));
        let pp = paused.make_provider(&registry, &hosts, HostId(1)).unwrap();
        let pl = label.make_provider(&registry, &hosts, HostId(1)).unwrap();
        registry.activate_host(HostId(1), &hosts);

        let el = Recorder::default();
        let controller = BindingController::attributes(&registry, HostId(2), el.clone());
        controller.bind(&hosts, &paused, "mediapaused").unwrap();
        controller.bind(&hosts, &label, "aria-label").unwrap();
        controller.bind(&hosts, &label, "title").unwrap();
        controller.activate(&hosts);
        assert_eq!(controller.binding_count(), 3);
        assert_eq!(pl.consumer_count(), 2);

        pl.set(String::from("Pause"));
        pp.set(false);
        assert_eq!(el.attr("aria-label").as_deref(), Some("Pause"));
        assert_eq!(el.attr("title").as_deref(), Some("Pause"));
        assert_eq!(el.attr("mediapaused"), None);

        assert_eq!(controller.unbind(&label), 2);
        assert_eq!(el.attr("aria-label"), None);
        assert_eq!(el.attr("title"), None);
        assert_eq!(pl.consumer_count(), 0);

        pp.set(true);
        assert_eq!(el.attr("mediapaused").as_deref(), Some(""));
        assert_eq!(controller.unbind(&label), 0);
    }

    #[test]
    fn deactivation_falls_back_to_initial_value() {
        let hosts = hosts();
        let registry = Registry::new();
        let text = create_context(String::from("--:--"));
        let provider = text.make_provider(&registry, &hosts, HostId(1)).unwrap();
        provider.activate(&hosts);
        provider.set(String::from("0:42"));

        let el = Recorder::default();
        let controller = BindingController::attributes(&registry, HostId(2), el.clone());
        controller.bind(&hosts, &text, "aria-valuetext").unwrap();
        assert_eq!(el.attr("aria-valuetext").as_deref(), Some("--:--"), "inactive: initial");

        controller.activate(&hosts);
        assert_eq!(el.attr("aria-valuetext").as_deref(), Some("0:42"));
        controller.deactivate();
        assert_eq!(el.attr("aria-valuetext").as_deref(), Some("--:--"));
        assert_eq!(provider.consumer_count(), 0);
    }

    #[test]
    fn host_lifecycle_drives_attached_controllers() {
        let hosts = hosts();
        let registry = Registry::new();
        let muted = create_context(false);
        let provider = muted.make_provider(&registry, &hosts, HostId(1)).unwrap();
        provider.set(true);

        let el = Recorder::default();
        let controller = BindingController::attributes(&registry, HostId(2), el.clone());
        controller.bind(&hosts, &muted, "mediamuted").unwrap();
        registry.activate_host(HostId(1), &hosts);
        registry.activate_host(HostId(2), &hosts);
        assert!(controller.is_active());
        assert_eq!(el.attr("mediamuted").as_deref(), Some(""));

        registry.release_host(HostId(2));
        assert!(!controller.is_active());
        assert_eq!(provider.consumer_count(), 0);
        assert_eq!(el.attr("mediamuted"), None);

        provider.set(false);
        provider.set(true);
        assert_eq!(el.attr("mediamuted"), None, "released bindings stay silent");
    }

    #[test]
    fn host_without_lifecycle_is_rejected() {
        let hosts = hosts();
        let registry = Registry::new();
        let ctx = create_context(true);
        let controller = BindingController::attributes(&registry, HostId(3), Recorder::default());
        let err = controller.bind(&hosts, &ctx, "hidden").unwrap_err();
        assert!(matches!(
            err,
            ContextError::MissingLifecycle {
                operation: Operation::MakeConsumer,
                ..
            }
        ));
        assert_eq!(controller.binding_count(), 0);
    }
}
