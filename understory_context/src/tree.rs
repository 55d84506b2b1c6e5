// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The context tree.
//!
//! [`ContextTree`] owns one [`NodeContext`] per host node it has seen, the
//! discovered links between them and the scheduler that keeps resolved values
//! up to date.
//!
//! ## Liveness
//!
//! A context is *connected* when its chain of links ends at a
//! [`DiscoveryState::Root`]. A [`DiscoveryState::Disconnected`] context is the
//! top of a detached subtree: it resolves its own values as if it had no
//! parent, while its linked descendants are *dormant*. Undiscovered contexts are
//! dormant too. Dirty marks raised on dormant contexts are remembered and
//! replayed once the subtree is live again.
//!
//! ## Calculation order
//!
//! A drain calculates dirty pairs ordered by depth, then property rank. Parents
//! are therefore resolved before their children and dependencies before their
//! dependents, so every pair is calculated at most once per drain.

use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::error::ContextError;
use crate::host::{self, HostTree};
use crate::id::{ContextId, Property, PropertyId};
use crate::node::{DiscoveryState, NodeContext, NodeContextMut};
use crate::registry::{PropertyRegistry, ResolveInput};
use crate::scan;
use crate::scheduler::{Delivery, DrainReport, Scheduler, WorkItem};
use crate::spec::PropertySpec;
use crate::value::ErasedValue;
use crate::values::Subscription;

/// Mirror of an externally owned tree, holding the context values of its nodes.
///
/// `N` is the host node key: a small `Copy` identity such as an index or a
/// generational handle. Contexts are created lazily by [`get`](Self::get) and
/// live as long as the tree.
///
/// # Example
///
/// ```rust
/// use understory_context::{ContextTree, PropertySpecBuilder};
///
/// // Host tree: 0 is the document, 1 and 2 are its children, 3 is below 1.
/// let parents = [None, Some(0), Some(0), Some(1)];
/// let host = |node: usize| parents[node];
///
/// let mut tree = ContextTree::<usize>::default();
/// let lang = tree.define(
///     "Lang",
///     PropertySpecBuilder::new().recursive(true).default_value("en").build(),
/// );
///
/// tree.get(0).set_is_root(true);
/// for node in 1..4 {
///     tree.get(node).discover();
///     tree.get(node).values().subscribe(lang, |_| {});
/// }
/// tree.get(1).values().set(lang, "page", "fr");
///
/// tree.drain(&host).unwrap();
/// assert_eq!(tree.value(3, lang), Some(&"fr"));
/// assert_eq!(tree.value(2, lang), Some(&"en"));
/// ```
pub struct ContextTree<N> {
    registry: PropertyRegistry<N>,
    contexts: Vec<NodeContext<N>>,
    by_node: HashMap<N, ContextId>,
    /// Contexts in the `Root` or `Disconnected` state, in link order.
    tops: SmallVec<[ContextId; 4]>,
    scheduler: Scheduler,
    next_subscription: u64,
}

impl<N> Default for ContextTree<N> {
    fn default() -> Self {
        Self {
            registry: PropertyRegistry::new(),
            contexts: Vec::new(),
            by_node: HashMap::new(),
            tops: SmallVec::new(),
            scheduler: Scheduler::default(),
            next_subscription: 0,
        }
    }
}

impl<N> ContextTree<N>
where
    N: Copy + Eq + core::hash::Hash + 'static,
{
    /// Creates a tree using the properties of `registry`.
    #[must_use]
    pub fn new(registry: PropertyRegistry<N>) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// Creates a tree with room for `capacity` contexts.
    #[must_use]
    pub fn with_capacity(registry: PropertyRegistry<N>, capacity: usize) -> Self {
        Self {
            registry,
            contexts: Vec::with_capacity(capacity),
            by_node: HashMap::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Defines a property in the registry of this tree.
    ///
    /// See [`PropertyRegistry::define`].
    pub fn define<T: Clone + PartialEq + 'static>(
        &mut self,
        name: &'static str,
        spec: PropertySpec<N, T>,
    ) -> Property<T> {
        self.registry.define(name, spec)
    }

    /// Returns the property registry.
    #[must_use]
    pub fn registry(&self) -> &PropertyRegistry<N> {
        &self.registry
    }

    /// Returns the number of contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns `true` if no context was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    // =========================================================================
    // Contexts
    // =========================================================================

    /// Returns the context of `node`, creating it on first use.
    ///
    /// A new context is [`Undiscovered`](DiscoveryState::Undiscovered) until
    /// [`NodeContextMut::discover`] runs on the next drain.
    pub fn get(&mut self, node: N) -> NodeContextMut<'_, N> {
        let id = self.ensure(node);
        NodeContextMut::new(self, id)
    }

    /// Returns the context ID of `node`, if a context exists.
    #[must_use]
    pub fn lookup(&self, node: N) -> Option<ContextId> {
        self.by_node.get(&node).copied()
    }

    /// Returns a context.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by another tree.
    #[must_use]
    pub fn context(&self, id: ContextId) -> &NodeContext<N> {
        &self.contexts[id.idx()]
    }

    /// Returns the host node of a context.
    #[must_use]
    pub fn node(&self, id: ContextId) -> N {
        self.context(id).node
    }

    /// Returns the discovered parent of a context.
    #[must_use]
    pub fn parent(&self, id: ContextId) -> Option<ContextId> {
        self.context(id).parent()
    }

    /// Returns the linked children of a context.
    #[must_use]
    pub fn children(&self, id: ContextId) -> &[ContextId] {
        self.context(id).children()
    }

    /// Returns the root context above `id`, or `None` if the chain of links does
    /// not end at a root.
    #[must_use]
    pub fn root(&self, id: ContextId) -> Option<ContextId> {
        let mut current = id;
        loop {
            match self.context(current).state {
                DiscoveryState::Root => return Some(current),
                DiscoveryState::Attached(parent) => current = parent,
                DiscoveryState::Undiscovered | DiscoveryState::Disconnected => return None,
            }
        }
    }

    /// Returns the top-level contexts: roots and disconnected subtrees.
    #[must_use]
    pub fn tops(&self) -> &[ContextId] {
        &self.tops
    }

    /// Returns an iterator over every context in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeContext<N>> {
        self.contexts.iter()
    }

    /// Returns `true` if the context is resolved on drains.
    ///
    /// Connected contexts and the tops of disconnected subtrees are live.
    #[must_use]
    pub fn is_live(&self, id: ContextId) -> bool {
        match self.context(id).state {
            DiscoveryState::Root | DiscoveryState::Disconnected => true,
            DiscoveryState::Attached(parent) => self.is_connected(parent),
            DiscoveryState::Undiscovered => false,
        }
    }

    /// Returns `true` if the chain of links from `id` ends at a root.
    #[must_use]
    pub fn is_connected(&self, id: ContextId) -> bool {
        self.root(id).is_some()
    }

    /// Returns the closest context of `node` or of one of its host ancestors.
    ///
    /// Host roots on the way get a context created for them. With
    /// `include_self` unset the search starts at the host parent of `node`.
    pub fn closest<H>(&mut self, host: &H, node: N, include_self: bool) -> Option<ContextId>
    where
        H: HostTree<N> + ?Sized,
    {
        let mut current = if include_self {
            Some(node)
        } else {
            host.parent(node)
        };
        while let Some(n) = current {
            if let Some(id) = self.lookup(n) {
                return Some(id);
            }
            if host.is_root(n) {
                return Some(self.ensure(n));
            }
            current = host.parent(n);
        }
        None
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Returns the resolved value of `property` on `node`.
    #[must_use]
    pub fn value<T: 'static>(&self, node: N, property: Property<T>) -> Option<&T> {
        self.context(self.lookup(node)?).value(property)
    }

    /// Removes a subscription. Returns `false` if it was already removed.
    ///
    /// The property stays tracked on the node.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.scheduler.forget_delivery(subscription.id);
        self.context_mut(subscription.context)
            .store
            .remove_subscriber(subscription.property, subscription.id)
    }

    /// Returns `true` if a drain has work to do.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.scheduler.has_pending()
    }

    // =========================================================================
    // Drain
    // =========================================================================

    /// Runs pending discoveries, recalculates dirty values and notifies
    /// subscribers.
    ///
    /// Discoveries run first, ancestors before descendants. Calculations follow in
    /// depth and property rank order. Once everything is resolved, each changed
    /// value is reported once to its subscribers, then new subscribers that have
    /// not seen the current value receive it.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Compute`] when a fallible compute function fails.
    /// The failing pair and the rest of the work stay queued, and subscribers of
    /// values changed so far are notified by the next successful drain.
    pub fn drain<H>(&mut self, host: &H) -> Result<DrainReport, ContextError>
    where
        H: HostTree<N> + ?Sized,
    {
        let mut report = DrainReport::default();

        let mut discoveries = self.scheduler.take_discoveries();
        discoveries.sort_by_cached_key(|id| host::depth(host, self.context(*id).node));
        for id in discoveries {
            report.discoveries += 1;
            report.reparented += self.discover(host, id);
        }
        if report.reparented > 0 {
            self.scheduler.unpark();
        }

        loop {
            self.flush();
            let Some(item) = self.scheduler.pop() else {
                break;
            };
            match self.calc(item.context, item.property) {
                Ok(changed) => {
                    report.calculations += 1;
                    report.changes += usize::from(changed);
                }
                Err(err) => {
                    self.scheduler.schedule(item);
                    self.scheduler.requeue();
                    warn!(error = %err, "drain aborted");
                    return Err(err);
                }
            }
        }

        let mut notified: HashSet<(ContextId, PropertyId)> = HashSet::new();
        for (id, property) in self.scheduler.take_changed() {
            report.notifications += self.contexts[id.idx()].store.notify(property);
            notified.insert((id, property));
        }
        for delivery in self.scheduler.take_deliveries() {
            if !self.is_live(delivery.context) {
                self.scheduler.park(delivery);
                continue;
            }
            if notified.contains(&(delivery.context, delivery.property)) {
                continue;
            }
            if self.contexts[delivery.context.idx()]
                .store
                .notify_one(delivery.property, delivery.subscription)
            {
                report.notifications += 1;
            }
        }

        debug!(
            discoveries = report.discoveries,
            reparented = report.reparented,
            calculations = report.calculations,
            changes = report.changes,
            notifications = report.notifications,
            "drain finished"
        );
        Ok(report)
    }

    /// Moves pending marks into the worklist, or defers them on dormant contexts.
    fn flush(&mut self) {
        for (id, property) in self.scheduler.take_pending() {
            if self.is_live(id) {
                self.scheduler.schedule(WorkItem {
                    depth: self.depth(id),
                    rank: self.registry.entry(property).rank(),
                    context: id,
                    property,
                });
            } else {
                trace!(context = ?id, property = ?property, "deferred on dormant context");
                self.contexts[id.idx()].store.defer(property);
            }
        }
    }

    fn depth(&self, id: ContextId) -> u32 {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent);
        }
        depth
    }

    /// Resolves one pair. Returns `true` if the resolved value changed.
    fn calc(&mut self, id: ContextId, property: PropertyId) -> Result<bool, ContextError> {
        let registration = self.registry.entry(property);
        let (value, ready) = {
            let context = &self.contexts[id.idx()];
            let mut deps: SmallVec<[(PropertyId, &ErasedValue); 4]> = SmallVec::new();
            let mut ready = true;
            for &dep in registration.deps() {
                match context.store.resolved(dep) {
                    Some(value) => deps.push((dep, value)),
                    None => {
                        ready = false;
                        break;
                    }
                }
            }
            // A local input of a plain property never reads the parent.
            let inherits = registration.recursive()
                && !(registration.is_plain() && context.store.has_inputs(property));
            let parent = if ready && inherits {
                match self.parent_value(id, property) {
                    Ok(parent) => parent,
                    Err(()) => {
                        ready = false;
                        None
                    }
                }
            } else {
                None
            };

            let value = if ready {
                let (inputs, latest) = context.store.inputs(property);
                registration
                    .spec()
                    .resolve_erased(ResolveInput {
                        node: context.node,
                        inputs: &inputs,
                        latest,
                        parent,
                        deps: &deps,
                    })
                    .map_err(|source| ContextError::Compute {
                        property: registration.name(),
                        context: id,
                        source,
                    })?
            } else {
                None
            };
            (value, ready)
        };
        trace!(
            context = ?id,
            property = registration.name(),
            ready,
            resolved = value.is_some(),
            "calculated"
        );
        let recursive = registration.recursive();

        if !self.contexts[id.idx()].store.set_resolved(property, value) {
            return Ok(false);
        }
        self.scheduler.record_change(id, property);

        let dependents: SmallVec<[PropertyId; 4]> = self
            .registry
            .entry(property)
            .dependents()
            .iter()
            .copied()
            .filter(|dep| self.contexts[id.idx()].store.is_tracked(*dep))
            .collect();
        for dependent in dependents {
            self.mark(id, dependent);
        }
        if recursive && self.is_connected(id) {
            self.cascade(id, property);
        }
        Ok(true)
    }

    /// Value inherited from the nearest ancestor tracking `property`.
    ///
    /// Contexts that do not track the property are skipped. `Err` means that
    /// ancestor has not resolved, so nothing can be inherited yet; `Ok(None)` means
    /// no ancestor tracks the property.
    fn parent_value(
        &self,
        id: ContextId,
        property: PropertyId,
    ) -> Result<Option<&ErasedValue>, ()> {
        let mut current = self.parent(id);
        while let Some(parent) = current {
            let store = &self.context(parent).store;
            if store.is_tracked(property) {
                return store.resolved(property).map(Some).ok_or(());
            }
            current = self.parent(parent);
        }
        Ok(None)
    }

    /// Marks the descendants that inherit a changed recursive value.
    ///
    /// Contexts that do not track the property are transparent. A local input of a
    /// plain property shadows the inherited value for the whole subtree below.
    fn cascade(&mut self, id: ContextId, property: PropertyId) {
        let plain = self.registry.entry(property).is_plain();
        let mut stack: SmallVec<[ContextId; 8]> =
            self.context(id).children.iter().copied().collect();
        while let Some(child) = stack.pop() {
            let store = &self.contexts[child.idx()].store;
            if store.is_tracked(property) {
                if !(plain && store.has_inputs(property)) {
                    self.mark(child, property);
                }
                continue;
            }
            stack.extend(self.contexts[child.idx()].children.iter().copied());
        }
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Re-establishes the parent link of a context. Returns the number of
    /// contexts whose state changed.
    fn discover<H>(&mut self, host: &H, id: ContextId) -> usize
    where
        H: HostTree<N> + ?Sized,
    {
        let (state, created) = self.resolve_state(host, id);
        created + self.apply_state(host, id, state)
    }

    fn resolve_state<H>(&mut self, host: &H, id: ContextId) -> (DiscoveryState, usize)
    where
        H: HostTree<N> + ?Sized,
    {
        let context = self.context(id);
        if let Some(parent) = context.assigned_parent {
            if self.would_cycle(id, parent) {
                warn!(context = ?id, parent = ?parent, "assigned parent forms a cycle");
                return (DiscoveryState::Disconnected, 0);
            }
            return (DiscoveryState::Attached(parent), 0);
        }
        let node = context.node;
        if context.is_root || host.is_root(node) {
            return (DiscoveryState::Root, 0);
        }

        let mut current = host.parent(node);
        while let Some(ancestor) = current {
            if let Some(parent) = self.lookup(ancestor) {
                let candidate = self.context(parent);
                if candidate.state != DiscoveryState::Undiscovered && !self.would_cycle(id, parent)
                {
                    return (DiscoveryState::Attached(parent), 0);
                }
                if candidate.state == DiscoveryState::Undiscovered && candidate.is_root {
                    let created = self.apply_state(host, parent, DiscoveryState::Root);
                    return (DiscoveryState::Attached(parent), created);
                }
            }
            if host.is_root(ancestor) {
                let parent = self.ensure(ancestor);
                let created = self.apply_state(host, parent, DiscoveryState::Root);
                return (DiscoveryState::Attached(parent), created);
            }
            current = host.parent(ancestor);
        }
        (DiscoveryState::Disconnected, 0)
    }

    /// Moves a context to `state`, adopts the contexts that now belong below it
    /// and invalidates the moved subtree.
    fn apply_state<H>(&mut self, host: &H, id: ContextId, state: DiscoveryState) -> usize
    where
        H: HostTree<N> + ?Sized,
    {
        let old = self.context(id).state;
        if old == state {
            return 0;
        }
        debug!(context = ?id, from = ?old, to = ?state, "discovery state changed");
        self.unlink(id, old);
        self.link(id, state);
        let adopted = self.adopt(host, id);
        self.invalidate(id);
        1 + adopted
    }

    fn unlink(&mut self, id: ContextId, state: DiscoveryState) {
        match state {
            DiscoveryState::Attached(parent) => {
                self.contexts[parent.idx()].children.retain(|c| *c != id);
            }
            DiscoveryState::Root | DiscoveryState::Disconnected => {
                self.tops.retain(|c| *c != id);
            }
            DiscoveryState::Undiscovered => {}
        }
    }

    fn link(&mut self, id: ContextId, state: DiscoveryState) {
        self.contexts[id.idx()].state = state;
        match state {
            DiscoveryState::Attached(parent) => self.contexts[parent.idx()].children.push(id),
            DiscoveryState::Root | DiscoveryState::Disconnected => self.tops.push(id),
            DiscoveryState::Undiscovered => {}
        }
    }

    /// Re-parents the siblings (or tops) of `id` whose host nodes are below it.
    fn adopt<H>(&mut self, host: &H, id: ContextId) -> usize
    where
        H: HostTree<N> + ?Sized,
    {
        let node = self.context(id).node;
        let candidates = match self.context(id).state {
            DiscoveryState::Attached(parent) => self.context(parent).children.clone(),
            _ => self.tops.clone(),
        };
        let mut adopted = 0;
        for candidate in candidates {
            let context = self.context(candidate);
            if candidate == id
                || !context.is_discoverable()
                || context.is_root
                || context.state == DiscoveryState::Root
                || !host::contains(host, node, context.node)
            {
                continue;
            }
            debug!(context = ?candidate, parent = ?id, "adopted by intermediary");
            let old = context.state;
            self.unlink(candidate, old);
            self.link(candidate, DiscoveryState::Attached(id));
            adopted += 1;
        }
        adopted
    }

    /// Marks the recursive and deferred properties of every live context in the
    /// subtree of `id`.
    fn invalidate(&mut self, id: ContextId) {
        let mut subtree = Vec::new();
        scan::deep_scan(self, id, true, |context| {
            subtree.push(context.id());
            true
        });
        for context in subtree {
            if !self.is_live(context) {
                continue;
            }
            let store = &mut self.contexts[context.idx()].store;
            let mut properties = store.take_deferred();
            for property in store.tracked() {
                if self.registry.recursive(property) && !properties.contains(&property) {
                    properties.push(property);
                }
            }
            for property in properties {
                self.mark(context, property);
            }
        }
    }

    /// Returns `true` if linking `id` below `parent` would close a loop.
    fn would_cycle(&self, id: ContextId, parent: ContextId) -> bool {
        let mut current = Some(parent);
        while let Some(ancestor) = current {
            if ancestor == id {
                return true;
            }
            current = self.parent(ancestor);
        }
        false
    }

    // =========================================================================
    // Crate-internal entry points
    // =========================================================================

    pub(crate) fn ensure(&mut self, node: N) -> ContextId {
        if let Some(id) = self.lookup(node) {
            return id;
        }
        assert!(
            self.contexts.len() < u32::MAX as usize,
            "Too many contexts (max {})",
            u32::MAX
        );
        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let id = ContextId::new(self.contexts.len() as u32);
        self.contexts.push(NodeContext::new(id, node));
        self.by_node.insert(node, id);
        trace!(context = ?id, "context created");
        id
    }

    pub(crate) fn context_mut(&mut self, id: ContextId) -> &mut NodeContext<N> {
        &mut self.contexts[id.idx()]
    }

    pub(crate) fn request_discovery(&mut self, id: ContextId) {
        self.scheduler.request_discovery(id);
    }

    pub(crate) fn assign_parent(
        &mut self,
        id: ContextId,
        parent: Option<ContextId>,
    ) -> Result<(), ContextError> {
        if let Some(parent) = parent
            && self.would_cycle(id, parent)
        {
            warn!(context = ?id, parent = ?parent, "rejected parent assignment");
            return Err(ContextError::ParentCycle {
                context: id,
                parent,
            });
        }
        let context = self.context_mut(id);
        if context.assigned_parent != parent {
            context.assigned_parent = parent;
            self.request_discovery(id);
        }
        Ok(())
    }

    /// Starts tracking `property` and its dependencies on a context.
    pub(crate) fn track(&mut self, id: ContextId, property: PropertyId) {
        let mut stack: SmallVec<[PropertyId; 4]> = SmallVec::new();
        stack.push(property);
        while let Some(property) = stack.pop() {
            if self.contexts[id.idx()].store.track(property) {
                self.mark(id, property);
                // Descendants that inherited past this context now read it.
                if self.registry.recursive(property) {
                    self.cascade(id, property);
                }
                stack.extend(self.registry.entry(property).deps().iter().copied());
            }
        }
    }

    pub(crate) fn mark(&mut self, id: ContextId, property: PropertyId) {
        if self.scheduler.mark(id, property) {
            trace!(context = ?id, property = ?property, "marked dirty");
        }
    }

    pub(crate) fn next_subscription(&mut self, id: ContextId, property: PropertyId) -> Subscription {
        let subscription = Subscription {
            context: id,
            property,
            id: self.next_subscription,
        };
        self.next_subscription += 1;
        subscription
    }

    pub(crate) fn deliver(&mut self, subscription: Subscription) {
        self.scheduler.deliver(Delivery {
            context: subscription.context,
            property: subscription.property,
            subscription: subscription.id,
        });
    }
}

impl<N: core::fmt::Debug> core::fmt::Debug for ContextTree<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContextTree")
            .field("registry", &self.registry)
            .field("contexts", &self.contexts)
            .field("tops", &self.tops)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
