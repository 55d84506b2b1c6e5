// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host tree access.
//!
//! The engine never owns the tree it mirrors. During discovery it asks the host
//! for parent links through [`HostTree`].

/// Read access to the externally owned tree.
///
/// Any `Fn(N) -> Option<N>` closure is a host tree without root markers.
///
/// # Example
///
/// ```rust
/// use understory_context::HostTree;
///
/// let parents = [None, Some(0_usize), Some(1)];
/// let host = |node: usize| parents[node];
///
/// assert_eq!(host.parent(2), Some(1));
/// assert!(!host.is_root(0));
/// ```
pub trait HostTree<N> {
    /// Returns the current parent of `node`, or `None` at the top of the tree.
    fn parent(&self, node: N) -> Option<N>;

    /// Returns `true` if `node` is a root of the host tree, such as a document.
    ///
    /// A context reached through discovery on such a node becomes a root context.
    fn is_root(&self, node: N) -> bool {
        let _ = node;
        false
    }
}

impl<N, F> HostTree<N> for F
where
    F: Fn(N) -> Option<N>,
{
    #[inline]
    fn parent(&self, node: N) -> Option<N> {
        self(node)
    }
}

/// Returns `true` if `ancestor` is a strict ancestor of `node` in the host tree.
pub(crate) fn contains<N, H>(host: &H, ancestor: N, node: N) -> bool
where
    N: Copy + Eq,
    H: HostTree<N> + ?Sized,
{
    let mut current = host.parent(node);
    while let Some(n) = current {
        if n == ancestor {
            return true;
        }
        current = host.parent(n);
    }
    false
}

/// Returns the number of host ancestors of `node`.
pub(crate) fn depth<N, H>(host: &H, node: N) -> usize
where
    N: Copy,
    H: HostTree<N> + ?Sized,
{
    let mut depth = 0;
    let mut current = host.parent(node);
    while let Some(n) = current {
        depth += 1;
        current = host.parent(n);
    }
    depth
}
