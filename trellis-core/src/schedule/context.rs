//! Update Context
//!
//! A view's [`confirm_update`](super::View::confirm_update) gets a context
//! describing where it stands: its entity, its flag table, the topology and
//! which of its neighbours are mounted.
//!
//! The scheduler is busy draining while a view runs, so a view cannot call
//! back into it. Requests a view makes through the context are collected
//! and scheduled right after the view returns.

use crate::error::{Result, SchedulerError};
use crate::flags::{Bits, FlagMap};
use crate::graph::{Entity, EntityId, TopologyIndex};

use super::registry::ViewRegistry;
use super::viewport::ViewportController;
use super::Priority;

/// An update a view asked for during its own update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UpdateRequest {
    pub id: EntityId,
    pub bits: Bits,
    pub priority: Option<Priority>,
}

/// What a view can see and do while it is being updated.
pub struct UpdateContext<'a> {
    entity: &'a Entity,
    flags: &'a FlagMap,
    topology: &'a TopologyIndex,
    viewport: &'a ViewportController,
    views: &'a ViewRegistry,
    requests: Vec<UpdateRequest>,
}

impl<'a> UpdateContext<'a> {
    pub(crate) fn new(
        entity: &'a Entity,
        flags: &'a FlagMap,
        topology: &'a TopologyIndex,
        viewport: &'a ViewportController,
        views: &'a ViewRegistry,
    ) -> Self {
        Self {
            entity,
            flags,
            topology,
            viewport,
            views,
            requests: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.entity.id()
    }

    pub fn entity(&self) -> &Entity {
        self.entity
    }

    pub fn flags(&self) -> &FlagMap {
        self.flags
    }

    pub fn topology(&self) -> &TopologyIndex {
        self.topology
    }

    pub fn is_mounted(&self, id: EntityId) -> bool {
        self.viewport.is_mounted(id)
    }

    /// Whether every entity this edge is attached to is mounted. Always
    /// true for nodes and for free ends.
    pub fn endpoints_mounted(&self) -> bool {
        [self.entity.source_entity(), self.entity.target_entity()]
            .into_iter()
            .flatten()
            .all(|end| self.is_mounted(end))
    }

    /// Ask for another update once this one returns. `None` schedules at the
    /// target's intrinsic priority.
    ///
    /// Fails at once if `id` has no view.
    pub fn request_update(&mut self, id: EntityId, bits: Bits, priority: Option<Priority>) -> Result<()> {
        if id != self.id() && !self.views.contains(id) {
            return Err(SchedulerError::MissingView(id));
        }
        if bits != 0 {
            self.requests.push(UpdateRequest { id, bits, priority });
        }
        Ok(())
    }

    pub(crate) fn into_requests(self) -> Vec<UpdateRequest> {
        self.requests
    }
}
