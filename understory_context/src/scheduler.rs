// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Coalescing work queues.
//!
//! The [`Scheduler`] collects everything raised between two drains:
//!
//! - discovery requests, deduplicated and kept in request order,
//! - dirty `(context, property)` marks, deduplicated,
//! - first deliveries owed to new subscribers.
//!
//! The drain itself lives on [`ContextTree`](crate::ContextTree), which knows
//! how to order and calculate the work. Marks are kept unordered until they are
//! flushed into the sorted worklist, since depth is only known once pending
//! discoveries have run.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use hashbrown::HashSet;

use crate::id::{ContextId, PropertyId};

/// A pending calculation, ordered ancestors first, then dependencies first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct WorkItem {
    pub(crate) depth: u32,
    pub(crate) rank: u16,
    pub(crate) context: ContextId,
    pub(crate) property: PropertyId,
}

/// A subscriber that has not yet received the current value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub(crate) context: ContextId,
    pub(crate) property: PropertyId,
    pub(crate) subscription: u64,
}

/// Counters describing one [`ContextTree::drain`](crate::ContextTree::drain).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Discovery requests executed.
    pub discoveries: usize,
    /// Contexts whose discovery state changed, including adopted children.
    pub reparented: usize,
    /// Calculations performed.
    pub calculations: usize,
    /// Calculations that produced a different value.
    pub changes: usize,
    /// Subscriber callbacks invoked.
    pub notifications: usize,
}

impl DrainReport {
    /// Returns `true` if the drain had nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    discoveries: Vec<ContextId>,
    pending: Vec<(ContextId, PropertyId)>,
    pending_set: HashSet<(ContextId, PropertyId)>,
    worklist: BTreeSet<WorkItem>,
    changed: Vec<(ContextId, PropertyId)>,
    changed_set: HashSet<(ContextId, PropertyId)>,
    deliveries: Vec<Delivery>,
    /// Deliveries owed on dormant contexts.
    parked: Vec<Delivery>,
}

impl Scheduler {
    /// Returns `true` if a drain would have anything to do.
    pub(crate) fn has_pending(&self) -> bool {
        !self.discoveries.is_empty()
            || !self.pending.is_empty()
            || !self.worklist.is_empty()
            || !self.changed.is_empty()
            || !self.deliveries.is_empty()
    }

    pub(crate) fn request_discovery(&mut self, context: ContextId) {
        if !self.discoveries.contains(&context) {
            self.discoveries.push(context);
        }
    }

    pub(crate) fn take_discoveries(&mut self) -> Vec<ContextId> {
        core::mem::take(&mut self.discoveries)
    }

    /// Records a dirty mark. Returns `false` if it was already pending.
    pub(crate) fn mark(&mut self, context: ContextId, property: PropertyId) -> bool {
        if self.pending_set.insert((context, property)) {
            self.pending.push((context, property));
            true
        } else {
            false
        }
    }

    /// Returns pending marks in the order they were raised.
    pub(crate) fn take_pending(&mut self) -> Vec<(ContextId, PropertyId)> {
        self.pending_set.clear();
        core::mem::take(&mut self.pending)
    }

    pub(crate) fn schedule(&mut self, item: WorkItem) {
        self.worklist.insert(item);
    }

    pub(crate) fn pop(&mut self) -> Option<WorkItem> {
        self.worklist.pop_first()
    }

    /// Moves every scheduled item back to the pending marks so that its depth is
    /// recomputed on the next flush.
    pub(crate) fn requeue(&mut self) {
        while let Some(item) = self.worklist.pop_first() {
            self.mark(item.context, item.property);
        }
    }

    pub(crate) fn record_change(&mut self, context: ContextId, property: PropertyId) {
        if self.changed_set.insert((context, property)) {
            self.changed.push((context, property));
        }
    }

    pub(crate) fn take_changed(&mut self) -> Vec<(ContextId, PropertyId)> {
        self.changed_set.clear();
        core::mem::take(&mut self.changed)
    }

    pub(crate) fn deliver(&mut self, delivery: Delivery) {
        self.deliveries.push(delivery);
    }

    pub(crate) fn take_deliveries(&mut self) -> Vec<Delivery> {
        core::mem::take(&mut self.deliveries)
    }

    /// Holds a delivery until the tree structure changes.
    pub(crate) fn park(&mut self, delivery: Delivery) {
        self.parked.push(delivery);
    }

    pub(crate) fn unpark(&mut self) {
        self.deliveries.append(&mut self.parked);
    }

    pub(crate) fn forget_delivery(&mut self, subscription: u64) {
        self.deliveries.retain(|d| d.subscription != subscription);
        self.parked.retain(|d| d.subscription != subscription);
    }
}
