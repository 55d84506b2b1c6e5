// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Context: incremental context values over an externally owned tree.
//!
//! This crate attaches typed, named properties to the nodes of a tree it does not
//! own, such as a live UI tree that is rearranged by someone else, and keeps a
//! derived value for every `(node, property)` pair up to date as inputs change
//! and as the tree is mutated.
//!
//! ## Core Concepts
//!
//! ### Properties
//!
//! A property is declared once with [`PropertySpecBuilder`] and defined in a
//! [`PropertyRegistry`] (or directly on a [`ContextTree`]), which hands back a
//! typed [`Property<T>`] handle. A declaration says whether the value is
//! inherited from the parent (`recursive`), which other properties it depends
//! on, how it is computed from its inputs, and its default.
//!
//! ### Contexts
//!
//! [`ContextTree`] keeps one [`NodeContext`] per host node. The host tells the
//! tree about structural changes by calling [`NodeContextMut::discover`]; the
//! tree then finds the closest discovered ancestor through [`HostTree`] and links
//! the two. Nothing is ever discovered automatically.
//!
//! ### Values
//!
//! Each context owns a [`ValueStore`] with owner-keyed inputs, resolved values
//! and subscribers. Writes through [`Values`] only mark work; a single
//! [`ContextTree::drain`] then runs pending discoveries, recalculates the dirty
//! pairs in topological order and notifies subscribers once per changed value.
//!
//! ### Key Operations
//!
//! - `tree.get(node).discover()` - relink a node after the host moved it
//! - `tree.get(node).values().set(property, owner, value)` - write an input
//! - `tree.get(node).values().subscribe(property, callback)` - observe a value
//! - `tree.drain(&host)` - bring everything up to date
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use understory_context::{ContextTree, PropertyRegistry, PropertySpecBuilder};
//!
//! // 0 is the document; 1 is a section below it; 2 and 3 are inside the section.
//! let parents = [None, Some(0), Some(1), Some(1)];
//! let host = |node: usize| parents[node];
//!
//! let mut registry = PropertyRegistry::<usize>::new();
//! let theme = registry.define(
//!     "Theme",
//!     PropertySpecBuilder::new()
//!         .recursive(true)
//!         .default_value("light")
//!         .build(),
//! );
//! let dense = registry.define(
//!     "Dense",
//!     PropertySpecBuilder::new().default_value(false).build(),
//! );
//! let label = registry.define(
//!     "Label",
//!     PropertySpecBuilder::new()
//!         .dep(theme)
//!         .dep(dense)
//!         .compute(move |cx| {
//!             let suffix = if *cx.dep(dense) { "/dense" } else { "" };
//!             format!("{}{suffix}", cx.dep(theme))
//!         })
//!         .build(),
//! );
//!
//! let mut tree = ContextTree::new(registry);
//! tree.get(0).set_is_root(true);
//! for node in 1..4 {
//!     tree.get(node).discover();
//! }
//!
//! let labels = Rc::new(RefCell::new(Vec::new()));
//! let sink = labels.clone();
//! tree.get(2)
//!     .values()
//!     .subscribe(label, move |l: &String| sink.borrow_mut().push(l.clone()));
//! tree.drain(&host).unwrap();
//! assert_eq!(*labels.borrow(), ["light"]);
//!
//! // Inherited from the section; node 2 also turns dense.
//! tree.get(1).values().set(theme, "user", "dark");
//! tree.get(2).values().set(dense, "layout", true);
//! let report = tree.drain(&host).unwrap();
//! assert_eq!(*labels.borrow(), ["light", "dark/dense"]);
//! assert_eq!(report.notifications, 1);
//! ```
//!
//! ## Liveness
//!
//! Only connected contexts (linked up to a root) and the tops of disconnected
//! subtrees are calculated. Work raised below a disconnected top is remembered
//! and replayed when the subtree is attached again.
//!
//! ## Logging
//!
//! Discovery transitions and drain summaries are logged at `debug` level with
//! [`tracing`], individual calculations and dirty marks at `trace`.
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. The `std` feature only enables the
//! standard library support of its dependencies.

#![no_std]

extern crate alloc;

mod error;
mod host;
mod id;
mod node;
mod registry;
pub mod scan;
mod scheduler;
mod spec;
mod store;
mod tree;
mod value;
mod values;

pub use error::{BoxError, ContextError};
pub use host::HostTree;
pub use id::{ContextId, Property, PropertyId};
pub use node::{DiscoveryState, NodeContext, NodeContextMut};
pub use registry::{PropertyRegistration, PropertyRegistry};
pub use scheduler::DrainReport;
pub use spec::{Compute, PropertySpec, PropertySpecBuilder};
pub use store::{OwnerKey, ValueStore};
pub use tree::ContextTree;
pub use value::ErasedValue;
pub use values::{Subscription, Values};
