// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared helpers for context integration tests: an in-memory host tree, a
//! small family of nodes, and a set of property declarations.

#![allow(
    missing_docs,
    dead_code,
    reason = "Integration-test helper module; each test file uses a subset."
)]

use std::cell::RefCell;
use std::rc::Rc;

use understory_context::{ContextTree, DrainReport, HostTree, Property, PropertySpecBuilder};

/// The document node; the only host root.
pub(crate) const DOCUMENT: usize = 0;

/// An in-memory host tree with parent links only.
#[derive(Debug)]
pub(crate) struct Dom {
    parents: Vec<Option<usize>>,
}

impl Dom {
    pub(crate) fn new() -> Self {
        Self {
            parents: vec![None],
        }
    }

    /// Creates a detached node.
    pub(crate) fn create(&mut self) -> usize {
        self.parents.push(None);
        self.parents.len() - 1
    }

    /// Creates a node below `parent`.
    pub(crate) fn element(&mut self, parent: usize) -> usize {
        let node = self.create();
        self.append(parent, node);
        node
    }

    pub(crate) fn append(&mut self, parent: usize, child: usize) {
        self.parents[child] = Some(parent);
    }

    pub(crate) fn remove(&mut self, node: usize) {
        self.parents[node] = None;
    }
}

impl HostTree<usize> for Dom {
    fn parent(&self, node: usize) -> Option<usize> {
        self.parents[node]
    }

    fn is_root(&self, node: usize) -> bool {
        node == DOCUMENT
    }
}

/// Host nodes of the test family:
///
/// ```text
/// top
/// └── grandparent
///     ├── parent
///     │   ├── sibling1
///     │   └── sibling2
///     └── uncle
///         └── cousin1
/// ```
///
/// `uncle` never gets a context, so `cousin1` links straight to `grandparent`.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Family {
    pub(crate) top: usize,
    pub(crate) grandparent: usize,
    pub(crate) parent: usize,
    pub(crate) sibling1: usize,
    pub(crate) sibling2: usize,
    pub(crate) uncle: usize,
    pub(crate) cousin1: usize,
}

impl Family {
    /// Builds the family detached from the document.
    pub(crate) fn build(dom: &mut Dom) -> Self {
        let top = dom.create();
        let grandparent = dom.element(top);
        let parent = dom.element(grandparent);
        let sibling1 = dom.element(parent);
        let sibling2 = dom.element(parent);
        let uncle = dom.element(grandparent);
        let cousin1 = dom.element(uncle);
        Self {
            top,
            grandparent,
            parent,
            sibling1,
            sibling2,
            uncle,
            cousin1,
        }
    }

    /// The nodes that get a context, ancestors first.
    pub(crate) fn members(&self) -> [usize; 5] {
        [
            self.grandparent,
            self.parent,
            self.sibling1,
            self.sibling2,
            self.cousin1,
        ]
    }
}

/// Property declarations shared by the value tests.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Props {
    pub(crate) non_recursive: Property<&'static str>,
    pub(crate) recursive: Property<&'static str>,
    /// Computed recursive: the parent value followed by the local inputs.
    pub(crate) concat: Property<String>,
    /// Computed from its first input and three dependencies.
    pub(crate) computed: Property<String>,
    /// Computed recursive with a dependency and a default.
    pub(crate) recursive_with_deps: Property<String>,
}

impl Props {
    pub(crate) fn define(tree: &mut ContextTree<usize>) -> Self {
        let non_recursive = tree.define("NonRecursive", PropertySpecBuilder::new().build());
        let recursive = tree.define(
            "Recursive",
            PropertySpecBuilder::new().recursive(true).build(),
        );
        let concat = tree.define(
            "Concat",
            PropertySpecBuilder::new()
                .recursive(true)
                .default_value(String::new())
                .compute(|cx| {
                    let parent = cx.parent().map_or("", String::as_str);
                    match cx.inputs() {
                        [] => parent.to_owned(),
                        [single] => format!("{parent}{single}"),
                        many => {
                            let joined: Vec<&str> = many.iter().map(|s| s.as_str()).collect();
                            format!("{parent}({})", joined.join("|"))
                        }
                    }
                })
                .build(),
        );
        let computed = tree.define(
            "Computed",
            PropertySpecBuilder::<usize, String>::new()
                .dep(non_recursive)
                .dep(recursive)
                .dep(concat)
                .compute(move |cx| {
                    let input = cx.inputs().first().map_or("no-input", |s| s.as_str());
                    format!(
                        "{input}/{}/{}/{}",
                        cx.dep(non_recursive),
                        cx.dep(recursive),
                        cx.dep(concat)
                    )
                })
                .build(),
        );
        let recursive_with_deps = tree.define(
            "RecursiveWithDeps",
            PropertySpecBuilder::new()
                .dep(recursive)
                .recursive(true)
                .default_value(String::from("DEF"))
                .compute(move |cx| {
                    let input = cx.inputs().first().map_or("no-input", |s| s.as_str());
                    let parent = cx.parent().map_or("", String::as_str);
                    format!("{input}/{parent}/{}", cx.dep(recursive))
                })
                .build(),
        );
        Self {
            non_recursive,
            recursive,
            concat,
            computed,
            recursive_with_deps,
        }
    }
}

/// Values received by one subscriber, in order.
pub(crate) type Log<T> = Rc<RefCell<Vec<T>>>;

/// A host, a tree with [`Props`] defined, and the test family.
#[derive(Debug)]
pub(crate) struct Harness {
    pub(crate) dom: Dom,
    pub(crate) tree: ContextTree<usize>,
    pub(crate) props: Props,
    pub(crate) family: Family,
}

impl Harness {
    /// The family attached to the document, every member discovered.
    pub(crate) fn connected() -> Self {
        let mut harness = Self::detached();
        harness.dom.append(DOCUMENT, harness.family.top);
        let members = harness.family.members();
        harness.discover(&members);
        harness.drain();
        harness
    }

    /// The family outside the document, every member discovered.
    pub(crate) fn disconnected() -> Self {
        let mut harness = Self::detached();
        let members = harness.family.members();
        harness.discover(&members);
        harness.drain();
        harness
    }

    /// The family outside the document, nothing discovered.
    pub(crate) fn detached() -> Self {
        let mut dom = Dom::new();
        let family = Family::build(&mut dom);
        let mut tree = ContextTree::default();
        let props = Props::define(&mut tree);
        Self {
            dom,
            tree,
            props,
            family,
        }
    }

    pub(crate) fn discover(&mut self, nodes: &[usize]) {
        for &node in nodes {
            self.tree.get(node).discover();
        }
    }

    pub(crate) fn drain(&mut self) -> DrainReport {
        self.tree.drain(&self.dom).expect("drain should succeed")
    }

    pub(crate) fn set<T: Clone + PartialEq + 'static>(
        &mut self,
        node: usize,
        property: Property<T>,
        owner: &'static str,
        value: T,
    ) {
        self.tree.get(node).values().set(property, owner, value);
    }

    pub(crate) fn subscribe<T: Clone + 'static>(
        &mut self,
        node: usize,
        property: Property<T>,
    ) -> Log<T> {
        let log: Log<T> = Rc::default();
        let sink = log.clone();
        self.tree
            .get(node)
            .values()
            .subscribe(property, move |value: &T| sink.borrow_mut().push(value.clone()));
        log
    }

    /// Subscribes every family member, in [`Family::members`] order.
    pub(crate) fn subscribe_all<T: Clone + 'static>(&mut self, property: Property<T>) -> [Log<T>; 5] {
        self.family.members().map(|node| self.subscribe(node, property))
    }

    pub(crate) fn value<T: 'static>(&self, node: usize, property: Property<T>) -> Option<&T> {
        self.tree.value(node, property)
    }
}

/// Clears every log.
pub(crate) fn clear<T>(logs: &[Log<T>]) {
    for log in logs {
        log.borrow_mut().clear();
    }
}

/// Snapshot of a log.
pub(crate) fn seen<T: Clone>(log: &Log<T>) -> Vec<T> {
    log.borrow().clone()
}
