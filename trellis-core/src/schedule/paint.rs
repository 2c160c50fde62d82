//! Paint order of inserted views.

use crate::graph::EntityId;

use super::config::Sorting;

/// Back-to-front order in which inserted views are painted.
#[derive(Debug, Clone, Default)]
pub struct PaintOrder {
    order: Vec<(EntityId, i32)>,
}

impl PaintOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a view. With any sorting but [`Sorting::None`] it goes after
    /// every view with z less than or equal to its own.
    pub fn insert(&mut self, id: EntityId, z: i32, sorting: Sorting) {
        self.remove(id);
        let index = match sorting {
            Sorting::None => self.order.len(),
            Sorting::Approx | Sorting::Exact => self.order.partition_point(|(_, other)| *other <= z),
        };
        self.order.insert(index, (id, z));
    }

    pub fn remove(&mut self, id: EntityId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.order.remove(index);
                true
            }
            None => false,
        }
    }

    /// Record a new z without moving the view.
    pub fn set_z(&mut self, id: EntityId, z: i32) {
        if let Some(entry) = self.order.iter_mut().find(|(other, _)| *other == id) {
            entry.1 = z;
        }
    }

    /// Re-sort by z. Stable, so equal z keeps its current order.
    pub fn sort(&mut self) {
        self.order.sort_by_key(|(_, z)| *z);
    }

    pub fn is_sorted(&self) -> bool {
        self.order.windows(2).all(|pair| pair[0].1 <= pair[1].1)
    }

    pub fn position(&self, id: EntityId) -> Option<usize> {
        self.order.iter().position(|(other, _)| *other == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.order.iter().map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }
}
