//! Topology Index
//!
//! The topology index is an adjacency list over the diagram graph. It answers
//! "which edges touch this entity" in O(1) and is kept consistent with the
//! live entity set incrementally: every add, remove, endpoint change and
//! re-parent is applied as it happens. Only a full reset rebuilds it.
//!
//! # Layout
//!
//! - `outbound[id]`: edges whose source is attached to `id`
//! - `inbound[id]`: edges whose target is attached to `id`
//! - `nodes`, `edges`: existence sets, with the attached ends of every edge
//! - `children[id]`: entities embedded in `id`
//!
//! Adjacency keys are entity ids, not just node ids: an edge can be attached
//! to another edge, and those chains are indexed the same way.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use super::entity::{Endpoint, EndpointKind, Entity, EntityId};

type EdgeSet = IndexSet<EntityId>;

/// The entities an edge is attached to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeEnds {
    pub source: Option<EntityId>,
    pub target: Option<EntityId>,
}

impl EdgeEnds {
    fn get(&self, kind: EndpointKind) -> Option<EntityId> {
        match kind {
            EndpointKind::Source => self.source,
            EndpointKind::Target => self.target,
        }
    }

    fn slot(&mut self, kind: EndpointKind) -> &mut Option<EntityId> {
        match kind {
            EndpointKind::Source => &mut self.source,
            EndpointKind::Target => &mut self.target,
        }
    }
}

/// Options for [`TopologyIndex::connected_edges`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectedOptions {
    /// Include edges whose target is the entity.
    pub inbound: bool,

    /// Include edges whose source is the entity.
    pub outbound: bool,

    /// Follow edge-to-edge chains.
    pub indirect: bool,

    /// Also collect edges touching embedded descendants.
    pub deep: bool,

    /// With `deep`, keep edges whose both ends are embedded descendants.
    pub include_enclosed: bool,
}

impl ConnectedOptions {
    /// Both directions, direct edges only.
    pub fn all() -> Self {
        Self {
            inbound: true,
            outbound: true,
            ..Self::default()
        }
    }

    pub fn inbound() -> Self {
        Self {
            inbound: true,
            ..Self::default()
        }
    }

    pub fn outbound() -> Self {
        Self {
            outbound: true,
            ..Self::default()
        }
    }

    pub fn indirect(mut self) -> Self {
        self.indirect = true;
        self
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn include_enclosed(mut self) -> Self {
        self.include_enclosed = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Inbound,
    Outbound,
}

/// Adjacency index over the diagram graph.
#[derive(Debug, Default)]
pub struct TopologyIndex {
    outbound: HashMap<EntityId, EdgeSet>,
    inbound: HashMap<EntityId, EdgeSet>,
    nodes: IndexSet<EntityId>,
    edges: IndexMap<EntityId, EdgeEnds>,
    parents: HashMap<EntityId, EntityId>,
    children: HashMap<EntityId, IndexSet<EntityId>>,
}

impl TopologyIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a full entity set.
    pub fn from_entities<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> Self {
        let mut index = Self::new();
        index.on_reset(entities);
        index
    }

    /// Index a newly added entity.
    pub fn on_add(&mut self, entity: &Entity) {
        let id = entity.id();
        if entity.is_edge() {
            let ends = EdgeEnds {
                source: entity.source_entity(),
                target: entity.target_entity(),
            };
            if let Some(source) = ends.source {
                self.outbound.entry(source).or_default().insert(id);
            }
            if let Some(target) = ends.target {
                self.inbound.entry(target).or_default().insert(id);
            }
            self.edges.insert(id, ends);
        } else {
            self.nodes.insert(id);
        }
        if let Some(parent) = entity.parent() {
            self.attach_child(parent, id);
        }
    }

    /// Drop an entity from the index.
    ///
    /// Edges attached to the removed entity keep their recorded ends; the
    /// model layer is expected to remove or re-attach them separately.
    pub fn on_remove(&mut self, id: EntityId) {
        if let Some(ends) = self.edges.swap_remove(&id) {
            if let Some(source) = ends.source {
                Self::detach(&mut self.outbound, source, id);
            }
            if let Some(target) = ends.target {
                Self::detach(&mut self.inbound, target, id);
            }
        } else {
            self.nodes.swap_remove(&id);
        }
        if let Some(parent) = self.parents.remove(&id) {
            self.detach_child(parent, id);
        }
    }

    /// Rebuild the whole index. O(n).
    pub fn on_reset<'a>(&mut self, entities: impl IntoIterator<Item = &'a Entity>) {
        self.outbound.clear();
        self.inbound.clear();
        self.nodes.clear();
        self.edges.clear();
        self.parents.clear();
        self.children.clear();
        for entity in entities {
            self.on_add(entity);
        }
    }

    /// Move an edge from the old endpoint's adjacency set to the new one's.
    pub fn on_endpoint_changed(
        &mut self,
        edge: EntityId,
        kind: EndpointKind,
        old: &Endpoint,
        new: &Endpoint,
    ) {
        let map = match kind {
            EndpointKind::Source => &mut self.outbound,
            EndpointKind::Target => &mut self.inbound,
        };
        if let Some(previous) = old.entity() {
            Self::detach(map, previous, edge);
        }
        if let Some(next) = new.entity() {
            map.entry(next).or_default().insert(edge);
        }
        if let Some(ends) = self.edges.get_mut(&edge) {
            *ends.slot(kind) = new.entity();
        }
    }

    /// Move an entity between embedding parents.
    pub fn on_parent_changed(&mut self, id: EntityId, old: Option<EntityId>, new: Option<EntityId>) {
        if let Some(previous) = old {
            self.detach_child(previous, id);
        }
        self.parents.remove(&id);
        if let Some(next) = new {
            self.attach_child(next, id);
        }
    }

    /// Edges whose source is attached to `id`. O(1).
    pub fn outbound_edges(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.outbound.get(&id).into_iter().flatten().copied()
    }

    /// Edges whose target is attached to `id`. O(1).
    pub fn inbound_edges(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.inbound.get(&id).into_iter().flatten().copied()
    }

    /// Collect the edges touching an entity.
    ///
    /// The traversal is iterative: it keeps an explicit work-list and a
    /// visited set, so adversarial edge chains (including cycles) neither
    /// recurse nor revisit. The entity itself is never part of the result.
    pub fn connected_edges(&self, id: EntityId, opts: ConnectedOptions) -> Vec<EntityId> {
        let (inbound, outbound) = if !opts.inbound && !opts.outbound {
            (true, true)
        } else {
            (opts.inbound, opts.outbound)
        };

        let mut found: IndexSet<EntityId> = IndexSet::new();
        let mut work: Vec<(EntityId, Direction)> = Vec::new();
        // LIFO: outbound edges are discovered first.
        if inbound {
            work.push((id, Direction::Inbound));
        }
        if outbound {
            work.push((id, Direction::Outbound));
        }

        while let Some((current, direction)) = work.pop() {
            let adjacent = match direction {
                Direction::Outbound => self.outbound.get(&current),
                Direction::Inbound => self.inbound.get(&current),
            };
            for &edge in adjacent.into_iter().flatten() {
                if edge == id || !found.insert(edge) {
                    continue;
                }
                if opts.indirect {
                    if inbound {
                        work.push((edge, Direction::Inbound));
                    }
                    if outbound {
                        work.push((edge, Direction::Outbound));
                    }
                }
            }
            if !opts.indirect {
                continue;
            }
            // An edge whose own end is attached to another edge continues
            // the chain in the same direction.
            let next = self.edges.get(&current).and_then(|ends| match direction {
                Direction::Outbound => ends.get(EndpointKind::Target),
                Direction::Inbound => ends.get(EndpointKind::Source),
            });
            if let Some(next) = next.filter(|next| self.is_edge(*next)) {
                if next != id && found.insert(next) {
                    work.push((next, direction));
                }
            }
        }

        if opts.deep {
            self.collect_embedded_edges(id, inbound, outbound, opts.include_enclosed, &mut found);
        }

        found.into_iter().collect()
    }

    fn collect_embedded_edges(
        &self,
        id: EntityId,
        inbound: bool,
        outbound: bool,
        include_enclosed: bool,
        found: &mut IndexSet<EntityId>,
    ) {
        let descendants = self.descendants(id);
        let embedded: IndexSet<EntityId> = descendants
            .iter()
            .copied()
            .filter(|d| self.nodes.contains(d))
            .collect();

        for &node in &embedded {
            let mut candidates: Vec<EntityId> = Vec::new();
            if outbound {
                candidates.extend(self.outbound_edges(node));
            }
            if inbound {
                candidates.extend(self.inbound_edges(node));
            }
            for edge in candidates {
                if found.contains(&edge) {
                    continue;
                }
                let enclosed = self.edges.get(&edge).is_some_and(|ends| {
                    ends.source.is_some_and(|s| embedded.contains(&s))
                        && ends.target.is_some_and(|t| embedded.contains(&t))
                });
                if enclosed && !include_enclosed {
                    continue;
                }
                found.insert(edge);
            }
        }
    }

    /// All entities embedded in `id`, transitively, in breadth-first order.
    pub fn descendants(&self, id: EntityId) -> Vec<EntityId> {
        let mut result = Vec::new();
        let mut visited = IndexSet::new();
        visited.insert(id);
        let mut cursor = 0;
        let mut frontier = vec![id];
        while cursor < frontier.len() {
            let current = frontier[cursor];
            cursor += 1;
            for &child in self.children.get(&current).into_iter().flatten() {
                if visited.insert(child) {
                    result.push(child);
                    frontier.push(child);
                }
            }
        }
        result
    }

    /// Nodes with no inbound edges (roots). O(|V|).
    pub fn sources(&self) -> Vec<EntityId> {
        self.nodes
            .iter()
            .copied()
            .filter(|id| self.is_source(*id))
            .collect()
    }

    /// Nodes with no outbound edges (leaves). O(|V|).
    pub fn sinks(&self) -> Vec<EntityId> {
        self.nodes
            .iter()
            .copied()
            .filter(|id| self.is_sink(*id))
            .collect()
    }

    /// Whether `id` has no inbound edges. O(1).
    pub fn is_source(&self, id: EntityId) -> bool {
        self.inbound.get(&id).map_or(true, |edges| edges.is_empty())
    }

    /// Whether `id` has no outbound edges. O(1).
    pub fn is_sink(&self, id: EntityId) -> bool {
        self.outbound.get(&id).map_or(true, |edges| edges.is_empty())
    }

    pub fn is_node(&self, id: EntityId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn is_edge(&self, id: EntityId) -> bool {
        self.edges.contains_key(&id)
    }

    /// The entities an edge is attached to.
    pub fn ends(&self, edge: EntityId) -> Option<EdgeEnds> {
        self.edges.get(&edge).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn detach(map: &mut HashMap<EntityId, EdgeSet>, key: EntityId, edge: EntityId) {
        if let Some(set) = map.get_mut(&key) {
            set.swap_remove(&edge);
            if set.is_empty() {
                map.remove(&key);
            }
        }
    }

    fn attach_child(&mut self, parent: EntityId, child: EntityId) {
        self.children.entry(parent).or_default().insert(child);
        self.parents.insert(child, parent);
    }

    fn detach_child(&mut self, parent: EntityId, child: EntityId) {
        if let Some(set) = self.children.get_mut(&parent) {
            set.swap_remove(&child);
            if set.is_empty() {
                self.children.remove(&parent);
            }
        }
    }
}
