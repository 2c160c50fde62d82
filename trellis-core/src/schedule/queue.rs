//! Pending Update Table
//!
//! The queue maps a priority (lower is more urgent) to an ordered table of
//! entity id → dirty bits. It upholds one invariant above all others: an
//! entity sits in **at most one** bucket. A request at priority `P` folds
//! the entity's bits from whatever bucket currently holds them into `P`, so
//! there is a single answer to "how much work is owed to this entity".

use std::collections::BTreeMap;
use std::ops::Bound;

use indexmap::IndexMap;

use super::Priority;
use crate::flags::{Bits, FLAG_INSERT, FLAG_REMOVE};
use crate::graph::EntityId;

/// What a call to [`UpdateQueue::schedule`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// Every requested bit was already pending. Nothing changed.
    Unchanged,

    /// The bits were merged into an existing entry.
    Merged,

    /// The entity was not pending before.
    Added,
}

/// Priority-bucketed table of pending updates.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    buckets: BTreeMap<Priority, IndexMap<EntityId, Bits>>,

    /// Entities newly dirtied since the counter was last reset. Used to
    /// report progress of a render cycle.
    count: usize,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `bits` for `id` at `priority`.
    ///
    /// A removal collapses the entry to a pure [`FLAG_REMOVE`]; an insertion
    /// cancels a pending removal.
    pub fn schedule(&mut self, id: EntityId, bits: Bits, priority: Priority) -> Scheduled {
        if bits & FLAG_REMOVE != 0 {
            return self.schedule_removal(id, priority);
        }

        let carried = self.fold_into(id, priority);
        let bucket = self.buckets.entry(priority).or_default();
        let current = bucket.get(&id).copied().unwrap_or(0);
        if current & bits == bits {
            return Scheduled::Unchanged;
        }

        let mut next = current;
        if bits & FLAG_INSERT != 0 && current & FLAG_REMOVE != 0 {
            next &= !FLAG_REMOVE;
        }
        bucket.insert(id, next | bits);

        if current == 0 && carried == 0 {
            self.count += 1;
            Scheduled::Added
        } else {
            Scheduled::Merged
        }
    }

    fn schedule_removal(&mut self, id: EntityId, priority: Priority) -> Scheduled {
        if self.get(id) == Some((priority, FLAG_REMOVE)) {
            return Scheduled::Unchanged;
        }
        let was_pending = self.take(id).is_some();
        self.buckets
            .entry(priority)
            .or_default()
            .insert(id, FLAG_REMOVE);
        if was_pending {
            Scheduled::Merged
        } else {
            self.count += 1;
            Scheduled::Added
        }
    }

    /// Union `bits` into the entry for `id` at `priority` without touching
    /// the newly-dirtied counter. Used to put back leftover work.
    pub fn store(&mut self, id: EntityId, bits: Bits, priority: Priority) {
        if bits == 0 {
            return;
        }
        self.fold_into(id, priority);
        *self
            .buckets
            .entry(priority)
            .or_default()
            .entry(id)
            .or_insert(0) |= bits;
    }

    /// Move the entity's bits from any other bucket into `priority`.
    /// Returns the bits that were moved.
    fn fold_into(&mut self, id: EntityId, priority: Priority) -> Bits {
        let mut carried = 0;
        for (_, bucket) in self
            .buckets
            .iter_mut()
            .filter(|(p, _)| **p != priority)
        {
            if let Some(bits) = bucket.swap_remove(&id) {
                carried |= bits;
            }
        }
        if carried != 0 {
            *self
                .buckets
                .entry(priority)
                .or_default()
                .entry(id)
                .or_insert(0) |= carried;
        }
        carried
    }

    /// Remove and return the entity's entry, wherever it is.
    pub fn take(&mut self, id: EntityId) -> Option<(Priority, Bits)> {
        self.buckets
            .iter_mut()
            .find_map(|(priority, bucket)| bucket.swap_remove(&id).map(|bits| (*priority, bits)))
    }

    /// Remove the entity's entry from one bucket.
    pub fn remove(&mut self, priority: Priority, id: EntityId) -> Option<Bits> {
        self.buckets.get_mut(&priority)?.swap_remove(&id)
    }

    pub fn bits_at(&self, priority: Priority, id: EntityId) -> Option<Bits> {
        self.buckets.get(&priority)?.get(&id).copied()
    }

    /// Where the entity is pending, and with which bits.
    pub fn get(&self, id: EntityId) -> Option<(Priority, Bits)> {
        self.buckets
            .iter()
            .find_map(|(priority, bucket)| bucket.get(&id).map(|bits| (*priority, *bits)))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.buckets.values().any(|bucket| bucket.contains_key(&id))
    }

    /// The ids pending at `priority`, in insertion order.
    pub fn snapshot(&self, priority: Priority) -> Vec<EntityId> {
        self.buckets
            .get(&priority)
            .map(|bucket| bucket.keys().copied().collect())
            .unwrap_or_default()
    }

    /// The first non-empty priority strictly after `after`, or the most
    /// urgent one when `after` is `None`.
    pub fn next_priority(&self, after: Option<Priority>) -> Option<Priority> {
        let lower = match after {
            Some(priority) => Bound::Excluded(priority),
            None => Bound::Unbounded,
        };
        self.buckets
            .range((lower, Bound::Unbounded))
            .find(|(_, bucket)| !bucket.is_empty())
            .map(|(priority, _)| *priority)
    }

    pub fn has_pending(&self) -> bool {
        self.buckets.values().any(|bucket| !bucket.is_empty())
    }

    /// Number of pending entities.
    pub fn len(&self) -> usize {
        self.buckets.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    /// Entities newly dirtied since the last [`reset_count`](Self::reset_count).
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset_count(&mut self) {
        self.count = 0;
    }

    /// Drop empty buckets.
    pub fn prune(&mut self) {
        self.buckets.retain(|_, bucket| !bucket.is_empty());
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.count = 0;
    }

    /// All pending entries in drain order.
    pub fn entries(&self) -> impl Iterator<Item = (Priority, EntityId, Bits)> + '_ {
        self.buckets.iter().flat_map(|(priority, bucket)| {
            bucket.iter().map(move |(id, bits)| (*priority, *id, *bits))
        })
    }
}
