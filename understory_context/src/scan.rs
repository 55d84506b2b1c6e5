// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scanners over the discovered tree.
//!
//! These walk the links established by discovery, not the host tree.

use smallvec::SmallVec;

use crate::id::ContextId;
use crate::node::NodeContext;
use crate::tree::ContextTree;

/// Returns the first context matching `predicate`, walking up from `start`.
///
/// With `include_self` unset the walk starts at the parent of `start`.
///
/// # Example
///
/// ```rust
/// use understory_context::{ContextTree, scan};
///
/// let host = |node: u32| node.checked_sub(1);
/// let mut tree = ContextTree::<u32>::default();
/// tree.get(0).set_is_root(true);
/// tree.get(1).discover();
/// let leaf = tree.get(2).discover().id();
/// tree.drain(&host).unwrap();
///
/// let found = scan::find_parent(&tree, leaf, true, |cx| cx.is_root());
/// assert_eq!(found, tree.lookup(0));
/// assert_eq!(scan::find_parent(&tree, leaf, false, |cx| cx.node() == 2), None);
/// ```
pub fn find_parent<N, P>(
    tree: &ContextTree<N>,
    start: ContextId,
    include_self: bool,
    mut predicate: P,
) -> Option<ContextId>
where
    N: Copy + Eq + core::hash::Hash + 'static,
    P: FnMut(&NodeContext<N>) -> bool,
{
    let mut current = if include_self {
        Some(start)
    } else {
        tree.parent(start)
    };
    while let Some(id) = current {
        let context = tree.context(id);
        if predicate(context) {
            return Some(id);
        }
        current = context.parent();
    }
    None
}

/// Visits the subtree of `start` in pre-order, children in link order.
///
/// The children of a context are only visited when `visit` returns `true` for
/// it. With `include_self` unset `start` itself is not visited.
pub fn deep_scan<N, F>(tree: &ContextTree<N>, start: ContextId, include_self: bool, mut visit: F)
where
    N: Copy + Eq + core::hash::Hash + 'static,
    F: FnMut(&NodeContext<N>) -> bool,
{
    let mut stack: SmallVec<[ContextId; 16]> = SmallVec::new();
    if include_self {
        stack.push(start);
    } else {
        stack.extend(tree.children(start).iter().rev().copied());
    }
    while let Some(id) = stack.pop() {
        let context = tree.context(id);
        if visit(context) {
            stack.extend(context.children().iter().rev().copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    // 0 -> 1 -> {2, 3}; 0 -> 4 -> 5
    const PARENTS: [Option<u32>; 6] = [None, Some(0), Some(1), Some(1), Some(0), Some(4)];

    fn discovered() -> ContextTree<u32> {
        let mut tree = ContextTree::default();
        tree.get(0).set_is_root(true);
        for node in [1, 2, 3, 5] {
            tree.get(node).discover();
        }
        tree.drain(&|node: u32| PARENTS[node as usize]).unwrap();
        tree
    }

    fn nodes(tree: &ContextTree<u32>, start: u32, include_self: bool, skip: &[u32]) -> Vec<u32> {
        let mut seen = Vec::new();
        let start = tree.lookup(start).unwrap();
        deep_scan(tree, start, include_self, |cx| {
            seen.push(cx.node());
            !skip.contains(&cx.node())
        });
        seen
    }

    #[test]
    fn deep_scan_orders() {
        let tree = discovered();
        assert_eq!(nodes(&tree, 0, true, &[]), [0, 1, 2, 3, 5]);
        assert_eq!(nodes(&tree, 0, false, &[]), [1, 2, 3, 5]);
        assert_eq!(nodes(&tree, 0, true, &[1]), [0, 1, 5]);
    }

    #[test]
    fn find_parent_walks_links() {
        let tree = discovered();
        let leaf = tree.lookup(2).unwrap();
        let mid = tree.lookup(1).unwrap();
        assert_eq!(find_parent(&tree, leaf, true, |_| true), Some(leaf));
        assert_eq!(find_parent(&tree, leaf, false, |_| true), Some(mid));
        assert_eq!(find_parent(&tree, leaf, false, |cx| cx.id() == leaf), None);
        assert_eq!(find_parent(&tree, leaf, true, |cx| cx.id() == mid), Some(mid));
    }
}
