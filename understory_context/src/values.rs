// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Value access on one node.

use alloc::boxed::Box;

use crate::id::{ContextId, Property, PropertyId};
use crate::store::OwnerKey;
use crate::tree::ContextTree;
use crate::value::ErasedValue;

/// Handle returned by [`Values::subscribe`], used to unsubscribe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub(crate) context: ContextId,
    pub(crate) property: PropertyId,
    pub(crate) id: u64,
}

impl Subscription {
    /// Returns the context the subscription was registered on.
    #[must_use]
    #[inline]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Returns the subscribed property.
    #[must_use]
    #[inline]
    pub fn property(&self) -> PropertyId {
        self.property
    }
}

/// Inputs, subscriptions and reads for the values of one node.
///
/// Writes never calculate anything: they mark the affected pair dirty and the
/// next [`ContextTree::drain`] resolves it.
///
/// # Example
///
/// ```rust
/// use core::cell::Cell;
/// use std::rc::Rc;
/// use understory_context::{ContextTree, PropertySpecBuilder};
///
/// let mut tree = ContextTree::<u32>::default();
/// let theme = tree.define(
///     "Theme",
///     PropertySpecBuilder::new().recursive(true).build(),
/// );
/// let host = |node: u32| if node == 0 { None } else { Some(0) };
///
/// let seen = Rc::new(Cell::new(""));
/// let mut root = tree.get(0);
/// root.set_is_root(true);
/// let mut values = root.values();
/// values.set(theme, "app", "dark");
/// let sink = seen.clone();
/// values.subscribe(theme, move |v| sink.set(*v));
///
/// tree.drain(&host).unwrap();
/// assert_eq!(seen.get(), "dark");
/// assert_eq!(tree.value(0, theme), Some(&"dark"));
/// ```
pub struct Values<'a, N> {
    tree: &'a mut ContextTree<N>,
    id: ContextId,
}

impl<'a, N> Values<'a, N>
where
    N: Copy + Eq + core::hash::Hash + 'static,
{
    pub(crate) fn new(tree: &'a mut ContextTree<N>, id: ContextId) -> Self {
        Self { tree, id }
    }

    /// Writes the input of `owner` for `property`.
    ///
    /// The owner keeps its position among the inputs of the property. Writing
    /// the value it already holds still schedules one calculation, but notifies
    /// nobody when the resolved value does not change.
    pub fn set<T: Clone + PartialEq + 'static>(
        &mut self,
        property: Property<T>,
        owner: impl Into<OwnerKey>,
        value: T,
    ) -> &mut Self {
        let id = property.id();
        self.tree.track(self.id, id);
        self.tree
            .context_mut(self.id)
            .store
            .upsert_input(id, owner.into(), ErasedValue::new(value));
        self.tree.mark(self.id, id);
        self
    }

    /// Removes the input of `owner` for `property`.
    ///
    /// Removing an input that does not exist does nothing.
    pub fn remove<T>(&mut self, property: Property<T>, owner: &str) -> &mut Self {
        let id = property.id();
        if self.tree.context_mut(self.id).store.remove_input(id, owner) {
            self.tree.mark(self.id, id);
        }
        self
    }

    /// Registers `callback` for the resolved value of `property`.
    ///
    /// The callback is never invoked synchronously. The next drain hands it the
    /// current value, if one is resolved, and every later drain that changes the
    /// value hands it the new one. A value becoming unresolved is not reported.
    pub fn subscribe<T, F>(&mut self, property: Property<T>, mut callback: F) -> Subscription
    where
        T: 'static,
        F: FnMut(&T) + 'static,
    {
        let id = property.id();
        self.tree.track(self.id, id);
        let subscription = self.tree.next_subscription(self.id, id);
        self.tree.context_mut(self.id).store.add_subscriber(
            id,
            subscription.id,
            Box::new(move |value: &ErasedValue| {
                if let Some(value) = value.downcast_ref::<T>() {
                    callback(value);
                }
            }),
        );
        self.tree.deliver(subscription);
        subscription
    }

    /// Returns the resolved value of `property`.
    #[must_use]
    pub fn value<T: 'static>(&self, property: Property<T>) -> Option<&T> {
        self.tree.context(self.id).store.value(property)
    }

    /// Returns the input `owner` wrote for `property`.
    #[must_use]
    pub fn input<T: 'static>(&self, property: Property<T>, owner: &str) -> Option<&T> {
        self.tree.context(self.id).store.input(property, owner)
    }
}

impl<N: core::fmt::Debug> core::fmt::Debug for Values<'_, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Values")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
