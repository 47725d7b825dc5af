use indexmap::IndexMap;

use super::ArchetypeId;
use crate::entity::Entity;

/// Cached structural-change edges of one archetype.
///
/// An add edge `id -> dst` on archetype `A` always comes with
/// the del edge `id -> A` on `dst`, so each side can unlink the other
/// when an archetype is released.
#[derive(Debug, Default)]
pub struct Graph {
    add: IndexMap<Entity, ArchetypeId>,
    del: IndexMap<Entity, ArchetypeId>,
}

impl Graph {
    /// The archetype reached by adding `id`.
    pub fn find_edge_add(&self, id: Entity) -> Option<ArchetypeId> { self.add.get(&id).copied() }

    /// The archetype reached by removing `id`.
    pub fn find_edge_del(&self, id: Entity) -> Option<ArchetypeId> { self.del.get(&id).copied() }

    pub(crate) fn add_edge_add(&mut self, id: Entity, dst: ArchetypeId) {
        let old = self.add.insert(id, dst);
        debug_assert!(old.map_or(true, |old| old == dst), "conflicting add edge for {id:?}");
    }

    pub(crate) fn add_edge_del(&mut self, id: Entity, dst: ArchetypeId) {
        let old = self.del.insert(id, dst);
        debug_assert!(old.map_or(true, |old| old == dst), "conflicting del edge for {id:?}");
    }

    pub(crate) fn remove_edge_add(&mut self, id: Entity) { self.add.swap_remove(&id); }

    pub(crate) fn remove_edge_del(&mut self, id: Entity) { self.del.swap_remove(&id); }

    /// Removes every edge labelled `id`.
    pub(crate) fn remove_edges_of(&mut self, id: Entity) {
        self.remove_edge_add(id);
        self.remove_edge_del(id);
    }

    /// Add edges in insertion order.
    pub fn add_edges(&self) -> impl Iterator<Item = (Entity, ArchetypeId)> + '_ {
        self.add.iter().map(|(&id, &dst)| (id, dst))
    }

    /// Del edges in insertion order.
    pub fn del_edges(&self) -> impl Iterator<Item = (Entity, ArchetypeId)> + '_ {
        self.del.iter().map(|(&id, &dst)| (id, dst))
    }

    /// Total number of edges.
    pub fn len(&self) -> usize { self.add.len() + self.del.len() }

    /// Whether no edge is cached.
    pub fn is_empty(&self) -> bool { self.add.is_empty() && self.del.is_empty() }
}
