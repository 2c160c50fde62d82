//! Graph Entities
//!
//! This module defines the entity types that live in the diagram graph:
//! nodes and the edges connecting them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier for an entity in the diagram graph. Ids are assigned
/// by the model layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One end of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Endpoint {
    /// A free-floating coordinate.
    Point { x: f64, y: f64 },

    /// Attached to another entity. The referenced entity may itself be an
    /// edge, which is how edge-to-edge chains are formed.
    Entity(EntityId),
}

impl Endpoint {
    /// The referenced entity, if the endpoint is attached to one.
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Endpoint::Entity(id) => Some(*id),
            Endpoint::Point { .. } => None,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Point { x: 0.0, y: 0.0 }
    }
}

/// Which end of an edge an endpoint describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    Source,
    Target,
}

/// Whether an entity is a node or an edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EntityKind {
    /// A node (element). Nodes can be connected by edges and can embed
    /// other entities.
    Node,

    /// An edge (link) between two endpoints.
    Edge { source: Endpoint, target: Endpoint },
}

/// A snapshot of an entity as seen by the scheduler.
///
/// The model layer owns the real entity; the scheduler only keeps the
/// parts it needs to maintain topology, embedding and paint order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,

    /// Paint order. Independent of scheduling priority.
    z: i32,

    /// Embedding parent, if any.
    parent: Option<EntityId>,
}

impl Entity {
    /// Create a new node entity.
    pub fn node(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            kind: EntityKind::Node,
            z: 0,
            parent: None,
        }
    }

    /// Create a new edge entity.
    pub fn edge(id: impl Into<EntityId>, source: Endpoint, target: Endpoint) -> Self {
        Self {
            id: id.into(),
            kind: EntityKind::Edge { source, target },
            z: 0,
            parent: None,
        }
    }

    /// Set the z-order.
    pub fn with_z(mut self, z: i32) -> Self {
        self.z = z;
        self
    }

    /// Set the embedding parent.
    pub fn with_parent(mut self, parent: impl Into<EntityId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    pub fn set_z(&mut self, z: i32) {
        self.z = z;
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn set_parent(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
    }

    pub fn is_node(&self) -> bool {
        matches!(self.kind, EntityKind::Node)
    }

    pub fn is_edge(&self) -> bool {
        matches!(self.kind, EntityKind::Edge { .. })
    }

    /// Get one endpoint of an edge. Always `None` for nodes.
    pub fn endpoint(&self, kind: EndpointKind) -> Option<Endpoint> {
        match (self.kind, kind) {
            (EntityKind::Edge { source, .. }, EndpointKind::Source) => Some(source),
            (EntityKind::Edge { target, .. }, EndpointKind::Target) => Some(target),
            (EntityKind::Node, _) => None,
        }
    }

    /// Replace one endpoint of an edge. Returns the previous endpoint, or
    /// `None` if this entity is a node.
    pub fn set_endpoint(&mut self, kind: EndpointKind, endpoint: Endpoint) -> Option<Endpoint> {
        match (&mut self.kind, kind) {
            (EntityKind::Edge { source, .. }, EndpointKind::Source) => {
                Some(std::mem::replace(source, endpoint))
            }
            (EntityKind::Edge { target, .. }, EndpointKind::Target) => {
                Some(std::mem::replace(target, endpoint))
            }
            (EntityKind::Node, _) => None,
        }
    }

    /// The entity the source end is attached to.
    pub fn source_entity(&self) -> Option<EntityId> {
        self.endpoint(EndpointKind::Source).and_then(|e| e.entity())
    }

    /// The entity the target end is attached to.
    pub fn target_entity(&self) -> Option<EntityId> {
        self.endpoint(EndpointKind::Target).and_then(|e| e.entity())
    }
}
