// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Context basics.
//!
//! A media controller provides its paused state; buttons below it consume it.
//! The demo walks through pairing, updates, a nested override, moving a
//! subtree, and provider teardown.
//!
//! Run:
//! - `RUST_LOG=understory_context=debug cargo run -p understory_context_demos --example context_basics`

use tracing_subscriber::EnvFilter;
use understory_context::adapters::element_tree::{connect_root, disconnect_root, reparent};
use understory_context::{Registry, create_context};
use understory_element_tree::{Element, Tree};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut tree = Tree::new();
    let controller = tree.insert(None, Element::new("media-controller"));
    let bar = tree.insert(Some(controller), Element::new("media-control-bar"));
    let play = tree.insert(Some(bar), Element::new("media-play-button"));
    let dialog = tree.insert(None, Element::new("media-chrome-dialog"));
    let caption = tree.insert(Some(dialog), Element::new("media-captions-button"));

    let registry = Registry::new();
    let paused = create_context(true);

    let provider = paused
        .make_provider(&registry, &tree, controller.into())
        .expect("controller has a lifecycle");
    let button = paused
        .make_consumer(&registry, &tree, play.into())
        .expect("button has a lifecycle");
    let override_provider = paused
        .make_provider(&registry, &tree, dialog.into())
        .expect("dialog has a lifecycle");
    let captions = paused
        .make_consumer(&registry, &tree, caption.into())
        .expect("captions button has a lifecycle");
    button.on_change(|p| println!("  play button sees paused={p}"));

    println!("== Connect ==");
    connect_root(&registry, &mut tree, controller);
    connect_root(&registry, &mut tree, dialog);
    println!("  paired: {}", button.is_paired());

    println!("== Play ==");
    provider.set(false);
    provider.set(false);
    println!("  (second identical set produced no update)");

    println!("== Nested override ==");
    override_provider.set(false);
    println!("  captions button sees paused={}", captions.value());

    println!("== Move the control bar into the dialog ==");
    reparent(&registry, &mut tree, bar, Some(dialog));
    println!(
        "  controller serves {} consumer(s), dialog serves {}",
        provider.consumer_count(),
        override_provider.consumer_count()
    );

    println!("== Disconnect the dialog ==");
    disconnect_root(&registry, &mut tree, dialog);
    println!("  play button back to paused={}", button.value());
}
