//! Diagram Graph
//!
//! This module holds the scheduler's view of the diagram graph: the entity
//! snapshots it receives from the model layer and the topology index it
//! maintains over them.
//!
//! # Overview
//!
//! The diagram graph is a directed multigraph where:
//!
//! - Nodes are diagram elements, optionally embedded in other nodes
//! - Edges are links whose ends are either free points or attached to
//!   another entity (a node, or another edge)
//!
//! When a node changes, the scheduler asks the topology index for the edges
//! attached to it and schedules them too, so an edge is never drawn against
//! a stale endpoint.
//!
//! # Design Decisions
//!
//! 1. The index is maintained incrementally on every structural change
//!    rather than recomputed on demand. Only a full reset rebuilds it.
//!
//! 2. Adjacency is indexed by entity id for O(1) lookups in both directions
//!    (outbound and inbound).
//!
//! 3. Edge-chain traversal uses an explicit work-list so its stack depth does
//!    not grow with the length of the chain.

mod entity;
mod topology;

pub use entity::{Endpoint, EndpointKind, Entity, EntityId, EntityKind};
pub use topology::{ConnectedOptions, EdgeEnds, TopologyIndex};
