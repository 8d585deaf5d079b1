// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Attribute and style binding.
//!
//! A mute button mirrors the controller's state into its own attributes and a
//! custom style property, then a record bag drives the same contexts by name.
//!
//! Run:
//! - `cargo run -p understory_context_demos --example attribute_binding`

use tracing_subscriber::EnvFilter;
use understory_context::adapters::element_tree::connect_root;
use understory_context::{
    Activatable, AttrValue, AttributeBindingController, ContextRecord, RecordSide,
    Registry, StyleBindingController, bind_record, create_context,
};
use understory_element_tree::{Element, ElementRef, Tree};

fn dump(el: &ElementRef) {
    for name in ["mediamuted", "aria-label"] {
        println!("  [{name}] = {:?}", el.attribute(name));
    }
    println!("  --media-volume = {:?}", el.style_property("--media-volume"));
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut tree = Tree::new();
    let controller = tree.insert(None, Element::new("media-controller"));
    let mute = tree.insert(Some(controller), Element::new("media-mute-button"));

    // Nothing is registered yet; the record and controllers activate as they bind.
    let registry = Registry::new();
    connect_root(&registry, &mut tree, controller);

    let muted = create_context(false);
    let volume = create_context(1.0_f64);
    let record = ContextRecord::new()
        .field("muted", &muted)
        .field("volume", &volume);
    let state = bind_record(&registry, &tree, controller.into(), &record, RecordSide::Provide)
        .expect("controller has a lifecycle");

    let el = tree.element(mute).expect("mute button is live");
    let attrs = AttributeBindingController::attributes(&registry, mute.into(), el.clone());
    let style = StyleBindingController::style_properties(&registry, mute.into(), el.clone());
    attrs.activate(&tree);
    style.activate(&tree);

    attrs
        .bind(&tree, &muted, "mediamuted")
        .expect("mute button has a lifecycle");
    attrs
        .bind_with(&tree, &muted, "aria-label", |m| {
            Some(AttrValue::from(if *m { "unmute" } else { "mute" }))
        })
        .expect("mute button has a lifecycle");
    style
        .bind_with(&tree, &volume, "--media-volume", |v| {
            Some(AttrValue::Text(format!("{}%", (v * 100.0).round())))
        })
        .expect("mute button has a lifecycle");

    println!("== Initial ==");
    dump(&el);

    println!("== Muted ==");
    state.set("muted", true).expect("field exists");
    state.set("volume", 0.0_f64).expect("field exists");
    dump(&el);

    println!("== Unbind aria-label and mediamuted ==");
    let removed = attrs.unbind(&muted);
    println!("  removed {removed} binding(s)");
    dump(&el);
}

