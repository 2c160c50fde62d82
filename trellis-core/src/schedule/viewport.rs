//! Viewport Controller
//!
//! Views are either mounted (attached to the render surface) or unmounted.
//! Each state has a round-robin list so that a bounded visibility check
//! eventually revisits every view, however many there are.
//!
//! An unmounted view keeps a ledger of the dirty bits it was owed when it
//! was unmounted. Mounting it again hands the ledger back to the caller to
//! be scheduled, so hiding a view never loses work.

use std::collections::{HashMap, VecDeque};

use crate::flags::{Bits, FLAG_INSERT};
use crate::graph::EntityId;

/// Result of re-evaluating one view's visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed.
    Unchanged,

    /// The view was mounted. It is owed these bits.
    Mounted(Bits),

    /// The view was unmounted.
    Unmounted,
}

#[derive(Debug, Clone, Copy)]
struct Member {
    stamp: u64,
    ledger: Bits,
}

/// A queue with O(1) membership, head insertion and rotation.
///
/// Removal is lazy: the slot stays in `order` and is skipped when it
/// reaches the head, because its stamp no longer matches the member's.
#[derive(Debug, Default)]
struct RoundRobin {
    order: VecDeque<(EntityId, u64)>,
    members: HashMap<EntityId, Member>,
    stamp: u64,
}

impl RoundRobin {
    fn len(&self) -> usize {
        self.members.len()
    }

    fn contains(&self, id: EntityId) -> bool {
        self.members.contains_key(&id)
    }

    fn ledger_mut(&mut self, id: EntityId) -> Option<&mut Bits> {
        self.members.get_mut(&id).map(|member| &mut member.ledger)
    }

    fn next_stamp(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }

    fn push_tail(&mut self, id: EntityId, ledger: Bits) {
        let stamp = self.next_stamp();
        self.members.insert(id, Member { stamp, ledger });
        self.order.push_back((id, stamp));
        self.compact();
    }

    /// Move an existing member to the head.
    fn push_head(&mut self, id: EntityId) -> bool {
        let stamp = self.next_stamp();
        let Some(member) = self.members.get_mut(&id) else {
            return false;
        };
        member.stamp = stamp;
        self.order.push_front((id, stamp));
        self.compact();
        true
    }

    fn remove(&mut self, id: EntityId) -> Option<Bits> {
        self.members.remove(&id).map(|member| member.ledger)
    }

    fn is_live(&self, id: EntityId, stamp: u64) -> bool {
        self.members
            .get(&id)
            .is_some_and(|member| member.stamp == stamp)
    }

    fn peek_head(&mut self) -> Option<EntityId> {
        while let Some(&(id, stamp)) = self.order.front() {
            if self.is_live(id, stamp) {
                return Some(id);
            }
            self.order.pop_front();
        }
        None
    }

    fn pop_head(&mut self) -> Option<(EntityId, Bits)> {
        let id = self.peek_head()?;
        self.order.pop_front();
        self.remove(id).map(|ledger| (id, ledger))
    }

    /// Move the head to the tail.
    fn rotate(&mut self) {
        if self.peek_head().is_some() {
            if let Some(entry) = self.order.pop_front() {
                self.order.push_back(entry);
            }
        }
    }

    fn ids(&self) -> Vec<EntityId> {
        self.order
            .iter()
            .filter(|(id, stamp)| self.is_live(*id, *stamp))
            .map(|(id, _)| *id)
            .collect()
    }

    fn compact(&mut self) {
        if self.order.len() > 2 * self.members.len() + 32 {
            let members = &self.members;
            self.order.retain(|(id, stamp)| {
                members.get(id).is_some_and(|member| member.stamp == *stamp)
            });
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

/// Tracks which views are mounted and rotates through them for bounded
/// visibility checks.
#[derive(Debug, Default)]
pub struct ViewportController {
    mounted: RoundRobin,
    unmounted: RoundRobin,
}

impl ViewportController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounted(&self, id: EntityId) -> bool {
        self.mounted.contains(id)
    }

    pub fn is_unmounted(&self, id: EntityId) -> bool {
        self.unmounted.contains(id)
    }

    /// Put a view in the mounted list.
    ///
    /// Returns the ledger the view accumulated while unmounted, or 0 if it
    /// was already mounted.
    pub fn register_mounted(&mut self, id: EntityId) -> Bits {
        if self.mounted.contains(id) {
            return 0;
        }
        let ledger = self.unmounted.remove(id).unwrap_or(0);
        self.mounted.push_tail(id, 0);
        ledger
    }

    /// Put a view in the unmounted list with an insert owed.
    ///
    /// Returns [`FLAG_INSERT`], or 0 if the view was already unmounted.
    pub fn register_unmounted(&mut self, id: EntityId) -> Bits {
        if self.unmounted.contains(id) {
            return 0;
        }
        self.mounted.remove(id);
        self.unmounted.push_tail(id, FLAG_INSERT);
        FLAG_INSERT
    }

    /// Fold bits into an unmounted view's ledger. No-op for mounted views.
    pub fn merge_unmounted(&mut self, id: EntityId, bits: Bits) {
        if let Some(ledger) = self.unmounted.ledger_mut(id) {
            *ledger |= bits;
        }
    }

    /// The bits an unmounted view is owed.
    pub fn ledger(&self, id: EntityId) -> Option<Bits> {
        self.unmounted.members.get(&id).map(|member| member.ledger)
    }

    /// Drop a view from both lists.
    pub fn forget(&mut self, id: EntityId) {
        self.mounted.remove(id);
        self.unmounted.remove(id);
    }

    /// Check up to `batch` mounted views, unmounting the ones `visible`
    /// rejects. Returns the ids that were unmounted.
    pub fn check_mounted<F>(&mut self, batch: usize, mut visible: F) -> Vec<EntityId>
    where
        F: FnMut(EntityId, bool) -> bool,
    {
        let mut unmounted = Vec::new();
        for _ in 0..batch.min(self.mounted.len()) {
            let Some(id) = self.mounted.peek_head() else {
                break;
            };
            if visible(id, true) {
                self.mounted.rotate();
                continue;
            }
            self.mounted.pop_head();
            if self.register_unmounted(id) != 0 {
                unmounted.push(id);
            }
        }
        unmounted
    }

    /// Check up to `batch` unmounted views, mounting the ones `visible`
    /// accepts. Returns each mounted id with the bits it is owed.
    pub fn check_unmounted<F>(&mut self, batch: usize, mut visible: F) -> Vec<(EntityId, Bits)>
    where
        F: FnMut(EntityId, bool) -> bool,
    {
        let mut mounted = Vec::new();
        for _ in 0..batch.min(self.unmounted.len()) {
            let Some(id) = self.unmounted.peek_head() else {
                break;
            };
            if !visible(id, false) {
                self.unmounted.rotate();
                continue;
            }
            let ledger = self.unmounted.pop_head().map_or(0, |(_, ledger)| ledger);
            mounted.push((id, ledger | self.register_mounted(id)));
        }
        mounted
    }

    /// Move one view to the list `visible` says it belongs in.
    pub fn check_one(&mut self, id: EntityId, visible: bool) -> Transition {
        if self.mounted.contains(id) && !visible {
            self.register_unmounted(id);
            Transition::Unmounted
        } else if self.unmounted.contains(id) && visible {
            let ledger = self.unmounted.remove(id).unwrap_or(0);
            Transition::Mounted(ledger | self.register_mounted(id))
        } else {
            Transition::Unchanged
        }
    }

    /// Check this unmounted view first next time.
    pub fn prioritize_mount(&mut self, id: EntityId) -> bool {
        self.unmounted.push_head(id)
    }

    /// Check this mounted view first next time.
    pub fn prioritize_unmount(&mut self, id: EntityId) -> bool {
        self.mounted.push_head(id)
    }

    pub fn mounted_len(&self) -> usize {
        self.mounted.len()
    }

    pub fn unmounted_len(&self) -> usize {
        self.unmounted.len()
    }

    /// Mounted ids in check order.
    pub fn mounted_ids(&self) -> Vec<EntityId> {
        self.mounted.ids()
    }

    /// Unmounted ids in check order.
    pub fn unmounted_ids(&self) -> Vec<EntityId> {
        self.unmounted.ids()
    }

    pub fn clear(&mut self) {
        self.mounted.clear();
        self.unmounted.clear();
    }
}
