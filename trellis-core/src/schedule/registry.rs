//! View Registry
//!
//! The registry owns every live view together with the scheduler's
//! bookkeeping for it: the entity snapshot, the class flag table, the
//! intrinsic priority and whether the view is currently inserted.
//!
//! A record is created when the model reports an added entity and destroyed
//! only when its removal is drained.

use std::collections::HashMap;
use std::sync::Arc;

use super::view::View;
use super::Priority;
use crate::flags::FlagMap;
use crate::graph::{Entity, EntityId};

/// A live view and what the scheduler knows about it.
pub struct ViewRecord {
    pub(crate) entity: Entity,
    pub(crate) view: Box<dyn View>,
    pub(crate) flags: Arc<FlagMap>,
    pub(crate) priority: Priority,
    pub(crate) detachable: bool,
    pub(crate) inserted: bool,
}

impl ViewRecord {
    pub(crate) fn new(entity: Entity, view: Box<dyn View>, flags: Arc<FlagMap>) -> Self {
        let priority = view.priority();
        let detachable = view.detachable();
        Self {
            entity,
            view,
            flags,
            priority,
            detachable,
            inserted: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.entity.id()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn flags(&self) -> &FlagMap {
        &self.flags
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_detachable(&self) -> bool {
        self.detachable
    }

    /// Whether the view is attached to the render surface.
    pub fn is_inserted(&self) -> bool {
        self.inserted
    }

    pub fn view(&self) -> &dyn View {
        self.view.as_ref()
    }
}

impl std::fmt::Debug for ViewRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewRecord")
            .field("entity", &self.entity)
            .field("class", &self.flags.class())
            .field("priority", &self.priority)
            .field("detachable", &self.detachable)
            .field("inserted", &self.inserted)
            .finish()
    }
}

/// All live views of one scheduler, keyed by entity id.
#[derive(Debug, Default)]
pub struct ViewRegistry {
    records: HashMap<EntityId, ViewRecord>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record, returning the one it replaced.
    pub(crate) fn register(&mut self, record: ViewRecord) -> Option<ViewRecord> {
        self.records.insert(record.id(), record)
    }

    pub(crate) fn unregister(&mut self, id: EntityId) -> Option<ViewRecord> {
        self.records.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&ViewRecord> {
        self.records.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut ViewRecord> {
        self.records.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.records.keys().copied()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = ViewRecord> + '_ {
        self.records.drain().map(|(_, record)| record)
    }
}
