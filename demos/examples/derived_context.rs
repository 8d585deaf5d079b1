// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Derived context.
//!
//! A time display shows `current / duration`, computed from two contexts that
//! live on different hosts. The derived value only appears once both sources
//! are bound, and resets once both are gone.
//!
//! Run:
//! - `RUST_LOG=understory_context=trace cargo run -p understory_context_demos --example derived_context`

use tracing_subscriber::EnvFilter;
use understory_context::adapters::element_tree::connect_root;
use understory_context::{Activatable, Registry, create_context, derived2};
use understory_element_tree::{Element, Tree};

fn format_time(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut tree = Tree::new();
    let controller = tree.insert(None, Element::new("media-controller"));
    let bar = tree.insert(Some(controller), Element::new("media-control-bar"));
    let display = tree.insert(Some(bar), Element::new("media-time-display"));

    let current = create_context(0_u32);
    let duration = create_context(0_u32);
    let label = derived2(&current, &duration, |c, d| {
        format!("{} / {}", format_time(*c), format_time(*d))
    });
    println!("initial label: {}", label.initial_value());

    let registry = Registry::new();
    let pc = current
        .make_provider(&registry, &tree, controller.into())
        .expect("controller has a lifecycle");
    let pd = duration
        .make_provider(&registry, &tree, bar.into())
        .expect("bar has a lifecycle");
    let plabel = label
        .make_provider(&registry, &tree, bar.into())
        .expect("bar has a lifecycle");
    let shown = label
        .make_consumer(&registry, &tree, display.into())
        .expect("display has a lifecycle");
    shown.on_change(|l| println!("  display: {l}"));

    connect_root(&registry, &mut tree, controller);
    println!("phase after connect: {:?}", plabel.derived_phase());

    pd.set(245);
    for t in [1, 2, 3] {
        pc.set(t);
    }

    println!("== Writing to the derived provider is ignored ==");
    plabel.set(String::from("nope"));
    println!("  still: {}", shown.value());

    println!("== Duration provider leaves ==");
    pd.deactivate();
    println!("  phase: {:?}, label kept: {}", plabel.derived_phase(), shown.value());

    println!("== Current-time provider leaves ==");
    pc.deactivate();
    println!("  phase: {:?}, label reset: {}", plabel.derived_phase(), shown.value());
}
