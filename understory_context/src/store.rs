// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node value storage.
//!
//! This module provides [`ValueStore`], the container every
//! [`NodeContext`](crate::NodeContext) owns: owner-keyed raw inputs, the last
//! resolved value and the subscribers of each property tracked at the node.
//!
//! # Implementation
//!
//! Slots live in a sorted `SmallVec` keyed by [`PropertyId`] and are found by
//! binary search. A node tracks only a handful of properties, so this keeps
//! lookups cache friendly and avoids heap allocation in the common case. A
//! property has a slot exactly when it is tracked at the node.

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use smallvec::SmallVec;

use crate::id::{Property, PropertyId};
use crate::value::ErasedValue;

/// Default inline capacity for property slots.
const INLINE_CAPACITY: usize = 4;

/// Identifier of an independent writer of a property input.
///
/// Several owners may contribute inputs to the same property on the same node.
/// Plain properties resolve to the most recently written input, while compute
/// functions see every input in the order the owners first wrote them.
///
/// # Example
///
/// ```rust
/// use understory_context::OwnerKey;
///
/// let from_static = OwnerKey::from("theme");
/// let from_owned = OwnerKey::from(String::from("theme"));
/// assert_eq!(from_static, from_owned);
/// assert_eq!(from_static.as_str(), "theme");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerKey(Cow<'static, str>);

impl OwnerKey {
    /// Returns the key as a string slice.
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for OwnerKey {
    fn from(key: &'static str) -> Self {
        Self(Cow::Borrowed(key))
    }
}

impl From<String> for OwnerKey {
    fn from(key: String) -> Self {
        Self(Cow::Owned(key))
    }
}

impl fmt::Debug for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnerKey").field(&self.as_str()).finish()
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) type Callback = Box<dyn FnMut(&ErasedValue)>;

struct InputEntry {
    owner: OwnerKey,
    value: ErasedValue,
    seq: u64,
}

struct Subscriber {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct Slot {
    inputs: SmallVec<[InputEntry; 1]>,
    resolved: Option<ErasedValue>,
    subscribers: Vec<Subscriber>,
}

/// Per-node storage of inputs, resolved values and subscribers.
///
/// A `ValueStore` is read through [`NodeContext::values`](crate::NodeContext::values);
/// all writes go through [`Values`](crate::Values) so that the scheduler sees
/// them.
pub struct ValueStore {
    slots: SmallVec<[(PropertyId, Slot); INLINE_CAPACITY]>,
    /// Properties marked dirty while the node was dormant.
    deferred: SmallVec<[PropertyId; 2]>,
    next_seq: u64,
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: SmallVec::new(),
            deferred: SmallVec::new(),
            next_seq: 0,
        }
    }

    #[inline]
    fn find(&self, id: PropertyId) -> Result<usize, usize> {
        self.slots.binary_search_by_key(&id, |(pid, _)| *pid)
    }

    #[inline]
    fn slot(&self, id: PropertyId) -> Option<&Slot> {
        self.find(id).ok().map(|idx| &self.slots[idx].1)
    }

    #[inline]
    fn slot_mut(&mut self, id: PropertyId) -> &mut Slot {
        let idx = match self.find(id) {
            Ok(idx) => idx,
            Err(idx) => {
                self.slots.insert(idx, (id, Slot::default()));
                idx
            }
        };
        &mut self.slots[idx].1
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Returns the resolved value of `property`, if any.
    ///
    /// Values are only up to date after [`ContextTree::drain`](crate::ContextTree::drain).
    #[must_use]
    pub fn value<T: 'static>(&self, property: Property<T>) -> Option<&T> {
        self.resolved(property.id())?.downcast_ref()
    }

    /// Returns the input written by `owner`, if any.
    #[must_use]
    pub fn input<T: 'static>(&self, property: Property<T>, owner: &str) -> Option<&T> {
        self.slot(property.id())?
            .inputs
            .iter()
            .find(|entry| entry.owner.as_str() == owner)?
            .value
            .downcast_ref()
    }

    /// Returns the owners that currently hold an input for `id`, in insertion order.
    pub fn owners(&self, id: PropertyId) -> impl Iterator<Item = &OwnerKey> + '_ {
        self.slot(id)
            .into_iter()
            .flat_map(|slot| slot.inputs.iter().map(|entry| &entry.owner))
    }

    /// Returns `true` if the property is tracked at this node.
    ///
    /// A property is tracked once it had an input or a subscriber here, or once a
    /// tracked property declared it as a dependency. Tracking is never undone.
    #[must_use]
    #[inline]
    pub fn is_tracked(&self, id: PropertyId) -> bool {
        self.find(id).is_ok()
    }

    /// Returns the tracked properties in ascending ID order.
    pub fn tracked(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.slots.iter().map(|(id, _)| *id)
    }

    /// Returns `true` if at least one owner holds an input for `id`.
    #[must_use]
    pub fn has_inputs(&self, id: PropertyId) -> bool {
        self.slot(id).is_some_and(|slot| !slot.inputs.is_empty())
    }

    /// Returns the number of subscribers of `id`.
    #[must_use]
    pub fn subscriber_count(&self, id: PropertyId) -> usize {
        self.slot(id).map_or(0, |slot| slot.subscribers.len())
    }

    pub(crate) fn resolved(&self, id: PropertyId) -> Option<&ErasedValue> {
        self.slot(id)?.resolved.as_ref()
    }

    /// Inputs in insertion order, plus the most recently written one.
    pub(crate) fn inputs(
        &self,
        id: PropertyId,
    ) -> (SmallVec<[&ErasedValue; 4]>, Option<&ErasedValue>) {
        let Some(slot) = self.slot(id) else {
            return (SmallVec::new(), None);
        };
        let latest = slot
            .inputs
            .iter()
            .max_by_key(|entry| entry.seq)
            .map(|entry| &entry.value);
        (slot.inputs.iter().map(|entry| &entry.value).collect(), latest)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Starts tracking `id`. Returns `true` if it was not tracked before.
    pub(crate) fn track(&mut self, id: PropertyId) -> bool {
        match self.find(id) {
            Ok(_) => false,
            Err(idx) => {
                self.slots.insert(idx, (id, Slot::default()));
                true
            }
        }
    }

    /// Writes the input of `owner`, keeping its position among the owners.
    pub(crate) fn upsert_input(&mut self, id: PropertyId, owner: OwnerKey, value: ErasedValue) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let slot = self.slot_mut(id);
        if let Some(entry) = slot.inputs.iter_mut().find(|entry| entry.owner == owner) {
            entry.value = value;
            entry.seq = seq;
        } else {
            slot.inputs.push(InputEntry { owner, value, seq });
        }
    }

    /// Removes the input of `owner`. Returns `false` if there was none.
    pub(crate) fn remove_input(&mut self, id: PropertyId, owner: &str) -> bool {
        let Ok(idx) = self.find(id) else {
            return false;
        };
        let inputs = &mut self.slots[idx].1.inputs;
        match inputs.iter().position(|entry| entry.owner.as_str() == owner) {
            Some(pos) => {
                inputs.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Stores a freshly calculated value. Returns `true` if it differs from the
    /// previous one.
    pub(crate) fn set_resolved(&mut self, id: PropertyId, value: Option<ErasedValue>) -> bool {
        let slot = self.slot_mut(id);
        if slot.resolved == value {
            return false;
        }
        slot.resolved = value;
        true
    }

    pub(crate) fn add_subscriber(&mut self, id: PropertyId, sub: u64, callback: Callback) {
        self.slot_mut(id).subscribers.push(Subscriber { id: sub, callback });
    }

    pub(crate) fn remove_subscriber(&mut self, id: PropertyId, sub: u64) -> bool {
        let Ok(idx) = self.find(id) else {
            return false;
        };
        let subscribers = &mut self.slots[idx].1.subscribers;
        let before = subscribers.len();
        subscribers.retain(|s| s.id != sub);
        subscribers.len() != before
    }

    /// Invokes every subscriber of `id` with the resolved value, in subscription
    /// order. Returns the number of callbacks invoked.
    pub(crate) fn notify(&mut self, id: PropertyId) -> usize {
        let Ok(idx) = self.find(id) else {
            return 0;
        };
        let Slot {
            resolved,
            subscribers,
            ..
        } = &mut self.slots[idx].1;
        let Some(value) = resolved.as_ref() else {
            return 0;
        };
        for subscriber in subscribers.iter_mut() {
            (subscriber.callback)(value);
        }
        subscribers.len()
    }

    /// Invokes a single subscriber. Returns `false` if it is gone or the value is
    /// unresolved.
    pub(crate) fn notify_one(&mut self, id: PropertyId, sub: u64) -> bool {
        let Ok(idx) = self.find(id) else {
            return false;
        };
        let Slot {
            resolved,
            subscribers,
            ..
        } = &mut self.slots[idx].1;
        let (Some(value), Some(subscriber)) =
            (resolved.as_ref(), subscribers.iter_mut().find(|s| s.id == sub))
        else {
            return false;
        };
        (subscriber.callback)(value);
        true
    }

    pub(crate) fn defer(&mut self, id: PropertyId) {
        if !self.deferred.contains(&id) {
            self.deferred.push(id);
        }
    }

    pub(crate) fn take_deferred(&mut self) -> SmallVec<[PropertyId; 2]> {
        core::mem::take(&mut self.deferred)
    }
}

impl fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for (id, slot) in &self.slots {
            list.entry(&SlotDebug { id: *id, slot });
        }
        list.finish()
    }
}

struct SlotDebug<'a> {
    id: PropertyId,
    slot: &'a Slot,
}

impl fmt::Debug for SlotDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field(
                "owners",
                &self
                    .slot
                    .inputs
                    .iter()
                    .map(|e| e.owner.as_str())
                    .collect::<SmallVec<[&str; 4]>>(),
            )
            .field("resolved", &self.slot.resolved.is_some())
            .field("subscribers", &self.slot.subscribers.len())
            .finish()
    }
}
