// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared per-element storage: tag, attributes, and custom style properties.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use core::cell::RefCell;

#[derive(Debug, Default)]
struct ElementData {
    tag: String,
    attributes: BTreeMap<String, String>,
    style: BTreeMap<String, String>,
}

/// Cheap, cloneable handle to an element's mutable output state.
///
/// The tree hands these out so that binding controllers can keep writing
/// attributes after the `&mut Tree` borrow that created them has ended.
/// Every method borrows the inner cell only for the duration of the call.
#[derive(Clone, Debug, Default)]
pub struct ElementRef {
    inner: Rc<RefCell<ElementData>>,
}

impl ElementRef {
    pub(crate) fn new(tag: String) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ElementData {
                tag,
                ..ElementData::default()
            })),
        }
    }

    /// Tag name.
    pub fn tag(&self) -> String {
        self.inner.borrow().tag.clone()
    }

    /// Attribute value, if present.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.borrow().attributes.get(name).cloned()
    }

    /// Whether the attribute is present (an empty value still counts).
    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.borrow().attributes.contains_key(name)
    }

    /// Set an attribute, replacing any previous value.
    pub fn set_attribute(&self, name: &str, value: &str) {
        self.inner
            .borrow_mut()
            .attributes
            .insert(String::from(name), String::from(value));
    }

    /// Remove an attribute. Removing an absent attribute is a no-op.
    pub fn remove_attribute(&self, name: &str) {
        self.inner.borrow_mut().attributes.remove(name);
    }

    /// Number of attributes currently set.
    pub fn attribute_count(&self) -> usize {
        self.inner.borrow().attributes.len()
    }

    /// Custom style property value (e.g. `--media-range-fill`), if present.
    pub fn style_property(&self, name: &str) -> Option<String> {
        self.inner.borrow().style.get(name).cloned()
    }

    /// Set a custom style property.
    pub fn set_style_property(&self, name: &str, value: &str) {
        self.inner
            .borrow_mut()
            .style
            .insert(String::from(name), String::from(value));
    }

    /// Remove a custom style property.
    pub fn remove_style_property(&self, name: &str) {
        self.inner.borrow_mut().style.remove(name);
    }

    /// Whether two handles refer to the same element.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
