// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node contexts.
//!
//! A [`NodeContext`] mirrors one host node: where it sits in the discovered
//! tree and which values it holds. Contexts are owned by a
//! [`ContextTree`](crate::ContextTree) and reached through
//! [`ContextTree::get`](crate::ContextTree::get), which returns the mutable
//! handle [`NodeContextMut`].

use smallvec::SmallVec;

use crate::error::ContextError;
use crate::host::HostTree;
use crate::id::{ContextId, Property};
use crate::store::ValueStore;
use crate::tree::ContextTree;
use crate::values::Values;

/// Where a context sits in the discovered tree.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DiscoveryState {
    /// Never discovered. The context is dormant.
    #[default]
    Undiscovered,
    /// Top of a connected tree.
    Root,
    /// Linked below another context.
    Attached(ContextId),
    /// Discovered without reaching any root.
    ///
    /// The context still resolves its own values, as if it had no parent, but
    /// its linked descendants stay dormant until the subtree is connected.
    Disconnected,
}

impl DiscoveryState {
    /// Returns the parent context, if attached.
    #[must_use]
    #[inline]
    pub fn parent(self) -> Option<ContextId> {
        match self {
            Self::Attached(parent) => Some(parent),
            _ => None,
        }
    }

    /// Returns `true` for states that sit at the top of a mirrored tree.
    #[must_use]
    #[inline]
    pub fn is_top(self) -> bool {
        matches!(self, Self::Root | Self::Disconnected)
    }
}

/// The context of one host node.
pub struct NodeContext<N> {
    pub(crate) id: ContextId,
    pub(crate) node: N,
    pub(crate) state: DiscoveryState,
    pub(crate) is_root: bool,
    pub(crate) assigned_parent: Option<ContextId>,
    pub(crate) children: SmallVec<[ContextId; 4]>,
    pub(crate) store: ValueStore,
}

impl<N: Copy> NodeContext<N> {
    pub(crate) fn new(id: ContextId, node: N) -> Self {
        Self {
            id,
            node,
            state: DiscoveryState::Undiscovered,
            is_root: false,
            assigned_parent: None,
            children: SmallVec::new(),
            store: ValueStore::new(),
        }
    }

    /// Returns the context ID.
    #[must_use]
    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the wrapped host node.
    #[must_use]
    #[inline]
    pub fn node(&self) -> N {
        self.node
    }

    /// Returns the discovery state.
    #[must_use]
    #[inline]
    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Returns the discovered parent context.
    #[must_use]
    #[inline]
    pub fn parent(&self) -> Option<ContextId> {
        self.state.parent()
    }

    /// Returns the linked children in link order.
    #[must_use]
    #[inline]
    pub fn children(&self) -> &[ContextId] {
        &self.children
    }

    /// Returns `true` if the node was explicitly marked as a root.
    #[must_use]
    #[inline]
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Returns the parent assigned with [`NodeContextMut::set_parent`].
    #[must_use]
    #[inline]
    pub fn assigned_parent(&self) -> Option<ContextId> {
        self.assigned_parent
    }

    /// Returns `true` if discovery may link this context through host ancestry,
    /// i.e. no explicit parent is assigned.
    #[must_use]
    #[inline]
    pub fn is_discoverable(&self) -> bool {
        self.assigned_parent.is_none()
    }

    /// Returns the value store.
    #[must_use]
    #[inline]
    pub fn values(&self) -> &ValueStore {
        &self.store
    }

    /// Returns the resolved value of `property`.
    ///
    /// Shorthand for `self.values().value(property)`.
    #[must_use]
    pub fn value<T: 'static>(&self, property: Property<T>) -> Option<&T> {
        self.store.value(property)
    }
}

impl<N: core::fmt::Debug> core::fmt::Debug for NodeContext<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeContext")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("state", &self.state)
            .field("is_root", &self.is_root)
            .field("assigned_parent", &self.assigned_parent)
            .field("children", &self.children)
            .field("store", &self.store)
            .finish()
    }
}

/// Mutable handle to the context of one node.
///
/// Every mutation only enqueues work; nothing is discovered or calculated until
/// the next [`ContextTree::drain`].
pub struct NodeContextMut<'a, N> {
    tree: &'a mut ContextTree<N>,
    id: ContextId,
}

impl<'a, N> NodeContextMut<'a, N>
where
    N: Copy + Eq + core::hash::Hash + 'static,
{
    pub(crate) fn new(tree: &'a mut ContextTree<N>, id: ContextId) -> Self {
        Self { tree, id }
    }

    /// Returns the context ID.
    #[must_use]
    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the context.
    #[must_use]
    pub fn context(&self) -> &NodeContext<N> {
        self.tree.context(self.id)
    }

    /// Requests discovery of this node's parent on the next drain.
    ///
    /// The host calls this after attaching, detaching or moving the node.
    /// Requests raised between two drains are coalesced.
    pub fn discover(&mut self) -> &mut Self {
        self.tree.request_discovery(self.id);
        self
    }

    /// Marks or unmarks the node as the top of a tree, and requests discovery.
    pub fn set_is_root(&mut self, is_root: bool) -> &mut Self {
        let context = self.tree.context_mut(self.id);
        if context.is_root != is_root {
            context.is_root = is_root;
            self.tree.request_discovery(self.id);
        }
        self
    }

    /// Assigns an explicit parent, bypassing host ancestry, and requests
    /// discovery. `None` clears the assignment.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::ParentCycle`] if `parent` is this node or one of
    /// its discovered descendants. The previous assignment is kept.
    pub fn set_parent(&mut self, parent: Option<N>) -> Result<&mut Self, ContextError> {
        let parent = parent.map(|node| self.tree.ensure(node));
        self.tree.assign_parent(self.id, parent)?;
        Ok(self)
    }

    /// Returns the closest context at or above this node, walking host
    /// ancestry.
    ///
    /// See [`ContextTree::closest`].
    pub fn closest<H>(&mut self, host: &H, include_self: bool) -> Option<ContextId>
    where
        H: HostTree<N> + ?Sized,
    {
        let node = self.tree.context(self.id).node;
        self.tree.closest(host, node, include_self)
    }

    /// Returns the value handle of this node.
    #[must_use]
    pub fn values(&mut self) -> Values<'_, N> {
        Values::new(self.tree, self.id)
    }
}

impl<N: core::fmt::Debug> core::fmt::Debug for NodeContextMut<'_, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeContextMut")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
