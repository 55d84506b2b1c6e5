// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identifier types.
//!
//! This module provides [`PropertyId`] for runtime property identification,
//! [`Property<T>`] for type-safe property handles, and [`ContextId`] for the
//! per-node contexts owned by a [`ContextTree`](crate::ContextTree).

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// A runtime property identifier.
///
/// This is a lightweight handle (u16) that uniquely identifies a property
/// within a [`PropertyRegistry`](crate::PropertyRegistry).
///
/// # Example
///
/// ```rust
/// use understory_context::PropertyId;
///
/// let id = PropertyId::new(42);
/// assert_eq!(id.index(), 42);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(u16);

impl PropertyId {
    /// Creates a new property ID from the given index.
    ///
    /// This is typically called by [`PropertyRegistry::define`](crate::PropertyRegistry::define)
    /// rather than directly.
    #[must_use]
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the underlying index of this property ID.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyId").field(&self.0).finish()
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyId({})", self.0)
    }
}

/// A typed property handle.
///
/// Wraps a [`PropertyId`] with a phantom value type `T`, so that inputs,
/// subscriptions and reads are checked at compile time. Handles are returned by
/// [`PropertyRegistry::define`](crate::PropertyRegistry::define) and are the keys
/// for every value operation on a node.
///
/// `Property<T>` is the same size as `PropertyId` since `PhantomData` has zero size.
pub struct Property<T> {
    id: PropertyId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
    /// Creates a typed handle from a property ID.
    ///
    /// The caller must ensure that the ID was defined with the same type `T`;
    /// reads through a mismatched handle resolve to `None`.
    #[must_use]
    #[inline]
    pub const fn from_id(id: PropertyId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying property ID.
    #[must_use]
    #[inline]
    pub const fn id(self) -> PropertyId {
        self.id
    }
}

// Manual trait implementations to avoid requiring T: Clone, etc.

impl<T> Copy for Property<T> {}

impl<T> Clone for Property<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Property<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Property<T> {}

impl<T> Hash for Property<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("id", &self.id)
            .field("type", &core::any::type_name::<T>())
            .finish()
    }
}

/// Identifier of a [`NodeContext`](crate::NodeContext) inside a
/// [`ContextTree`](crate::ContextTree).
///
/// Contexts are never freed while their tree is alive, so a `ContextId` stays
/// valid for the lifetime of the tree that issued it.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u32);

impl ContextId {
    pub(crate) const fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    /// Returns the creation index of this context.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextId").field(&self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::String;

    #[test]
    fn property_id_basics() {
        let id = PropertyId::new(42);
        assert_eq!(id.index(), 42);
        assert_eq!(id, PropertyId::new(42));
        assert_ne!(id, PropertyId::new(43));
        assert!(PropertyId::new(1) < PropertyId::new(2));
    }

    #[test]
    fn property_id_formatting() {
        let id = PropertyId::new(7);
        assert_eq!(format!("{:?}", id), "PropertyId(7)");
        assert_eq!(format!("{}", id), "PropertyId(7)");
    }

    #[test]
    fn property_handles_share_ids_across_types() {
        let id = PropertyId::new(1);
        let as_string: Property<String> = Property::from_id(id);
        let as_u32: Property<u32> = Property::from_id(id);
        assert_eq!(as_string.id(), as_u32.id());
    }

    #[test]
    fn property_handle_is_compact() {
        use core::mem::size_of;
        assert_eq!(size_of::<Property<String>>(), size_of::<PropertyId>());
    }

    #[test]
    fn context_id_debug() {
        let id = ContextId::new(3);
        assert_eq!(id.index(), 3);
        assert_eq!(id.idx(), 3);
        assert_eq!(format!("{:?}", id), "ContextId(3)");
    }
}
