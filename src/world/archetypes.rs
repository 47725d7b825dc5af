//! Archetype directory maintenance and row moves.

use xias::Xias;

use super::{Location, Record, World};
use crate::archetype::{Archetype, ArchetypeId, LookupHash};
use crate::comp::{Desc, Registry};
use crate::entity::slots::Slots;
use crate::entity::{Entity, Kind, Pair, Rules, WILDCARD};
use crate::storage::{Chunk, Relocated};
use crate::util;

/// The descriptor registered for `id`, resolving pairs to their relation.
pub(super) fn registered_desc<'t>(registry: &'t Registry, records: &Slots<Record>, id: Entity) -> Option<&'t Desc> {
    let data_id = if id.is_pair() {
        if id.is_wildcard() {
            return None;
        }
        records.get(id.rel())?.entity
    } else {
        id
    };
    registry.by_entity(data_id)
}

/// The descriptor providing the data of `id`, if it carries any.
pub(super) fn data_desc<'t>(registry: &'t Registry, records: &Slots<Record>, id: Entity) -> Option<&'t Desc> {
    registered_desc(registry, records, id).filter(|desc| desc.is_sized())
}

/// Updates the rows of entities moved inside one chunk.
pub(super) fn relocate(records: &mut Slots<Record>, archetype: ArchetypeId, chunk: u32, moves: Relocated) {
    for (entity, row) in moves.iter() {
        set_location(records, entity, Location { archetype, chunk, row });
    }
}

pub(super) fn set_location(records: &mut Slots<Record>, entity: Entity, location: Location) {
    let record = records.get_mut(entity.id()).expect("moved entities are alive");
    debug_assert_eq!(record.entity, entity);
    record.location = Some(location);
}

/// Reassigns the chunk index of every entity in a chunk that moved inside its archetype.
pub(super) fn relocate_chunk(records: &mut Slots<Record>, archetype: ArchetypeId, chunk: &Chunk) {
    for (row, &entity) in chunk.entities().iter().enumerate() {
        set_location(records, entity, Location { archetype, chunk: chunk.index(), row: row.small_int() });
    }
}

fn archetype_pair_mut(
    archetypes: &mut [Option<Archetype>],
    a: ArchetypeId,
    b: ArchetypeId,
) -> (&mut Archetype, &mut Archetype) {
    let (a, b) = util::pair_mut(archetypes, a.index(), b.index());
    (a.as_mut().expect("archetype is alive"), b.as_mut().expect("archetype is alive"))
}

/// The id itself followed by the wildcard forms that should also index it.
fn index_keys(id: Entity) -> impl Iterator<Item = Entity> {
    let wildcards = id.is_pair().then(|| {
        [
            Entity::raw_pair(id.rel(), WILDCARD.id(), id.kind()),
            Entity::raw_pair(WILDCARD.id(), id.tgt(), Kind::Generic),
            Entity::raw_pair(WILDCARD.id(), WILDCARD.id(), Kind::Generic),
        ]
    });
    std::iter::once(id).chain(wildcards.into_iter().flatten())
}

impl World {
    /// Allocates a record and a row in `archetype`.
    ///
    /// The component cells of the row are left uninitialized.
    pub(super) fn spawn(&mut self, is_entity: bool, kind: Kind, archetype: ArchetypeId) -> (Entity, Location) {
        let (index, generation) =
            self.records.alloc(Record { entity: Entity::BAD, location: None, rules: Rules::default(), name: None });
        let entity = Entity::new(index, generation, is_entity, false, kind);
        let version = self.next_version();

        let arch = self.archetypes[archetype.index()].as_mut().expect("archetype is alive");
        let chunk_index = arch.foc_free_chunk(&mut self.pool, version);
        let chunk = arch.chunk_mut(chunk_index);
        let row = chunk.add_entity(entity);
        chunk.bump_all(version);

        let location = Location { archetype, chunk: chunk_index, row };
        let record = self.records.get_mut(index).expect("just allocated");
        record.entity = entity;
        record.location = Some(location);

        self.after_row_added(archetype);
        (entity, location)
    }

    /// Finds the archetype of a sorted schema, creating it on first use.
    pub(crate) fn find_or_create_archetype(&mut self, ids: Vec<Entity>) -> ArchetypeId {
        let hash = LookupHash::of_ids(&ids);
        if let Some(bucket) = self.archetype_map.get(&hash) {
            for &candidate in bucket {
                if self.archetype(candidate).ids() == ids.as_slice() {
                    return candidate;
                }
            }
        }

        let id = ArchetypeId(self.archetype_len());
        let archetype = {
            let columns: Vec<(Entity, &Desc)> = ids
                .iter()
                .filter_map(|&column| data_desc(&self.registry, &self.records, column).map(|desc| (column, desc)))
                .collect();
            Archetype::new(id, ids, &columns)
        };

        self.archetype_map.entry(hash).or_default().push(id);
        let ids = archetype.ids().to_vec();
        self.archetypes.push(Some(archetype));
        self.index_archetype(id, &ids);
        log::debug!("registered archetype {id:?} with ids {ids:?}");
        id
    }

    /// Follows or creates the add edge of `id` from `src`.
    pub(crate) fn foc_archetype_add(&mut self, src: ArchetypeId, id: Entity) -> ArchetypeId {
        if let Some(dst) = self.archetype(src).find_edge_add(id) {
            return dst;
        }

        let mut ids = self.archetype(src).ids().to_vec();
        match ids.binary_search(&id) {
            Ok(_) => return src,
            Err(position) => ids.insert(position, id),
        }
        let dst = self.find_or_create_archetype(ids);
        self.link(src, id, dst);
        dst
    }

    /// Follows or creates the del edge of `id` from `src`.
    pub(crate) fn foc_archetype_del(&mut self, src: ArchetypeId, id: Entity) -> ArchetypeId {
        if let Some(dst) = self.archetype(src).find_edge_del(id) {
            return dst;
        }

        let mut ids = self.archetype(src).ids().to_vec();
        match ids.binary_search(&id) {
            Ok(position) => ids.remove(position),
            Err(_) => return src,
        };
        let dst = self.find_or_create_archetype(ids);
        self.link(dst, id, src);
        dst
    }

    /// Caches `left + id = right` in both directions.
    fn link(&mut self, left: ArchetypeId, id: Entity, right: ArchetypeId) {
        self.archetype_mut(left).graph_mut().add_edge_add(id, right);
        self.archetype_mut(right).graph_mut().add_edge_del(id, left);
    }

    fn index_archetype(&mut self, archetype: ArchetypeId, ids: &[Entity]) {
        for &id in ids {
            for key in index_keys(id) {
                let set = self.id_index.entry(key).or_default();
                let first = set.is_empty();
                set.insert(archetype);
                if first && key.is_pair() && !key.is_wildcard() {
                    self.on_pair_created(key);
                }
            }
        }
    }

    fn unindex_archetype(&mut self, archetype: ArchetypeId, ids: &[Entity]) {
        for &id in ids {
            for key in index_keys(id) {
                let Some(set) = self.id_index.get_mut(&key) else { continue };
                set.swap_remove(&archetype);
                if set.is_empty() {
                    self.id_index.remove(&key);
                    if key.is_pair() && !key.is_wildcard() {
                        self.on_pair_removed(key);
                    }
                }
            }
        }
    }

    fn on_pair_created(&mut self, id: Entity) {
        let pair = Pair::new(self.handle_at(id.rel()), self.handle_at(id.tgt()));
        self.pairs.insert(id, pair);
        self.rel_to_tgt.entry(pair.rel).or_default().insert(pair.tgt);
        self.tgt_to_rel.entry(pair.tgt).or_default().insert(pair.rel);
    }

    fn on_pair_removed(&mut self, id: Entity) {
        let Some(pair) = self.pairs.remove(&id) else { return };
        if let Some(targets) = self.rel_to_tgt.get_mut(&pair.rel) {
            targets.swap_remove(&pair.tgt);
            if targets.is_empty() {
                self.rel_to_tgt.remove(&pair.rel);
            }
        }
        if let Some(relations) = self.tgt_to_rel.get_mut(&pair.tgt) {
            relations.swap_remove(&pair.rel);
            if relations.is_empty() {
                self.tgt_to_rel.remove(&pair.tgt);
            }
        }
    }

    /// Archetypes holding `id`, which may be a wildcard pair.
    pub(crate) fn archetypes_with(&self, id: Entity) -> Vec<ArchetypeId> {
        self.id_index.get(&id).map(|set| set.iter().copied().collect()).unwrap_or_default()
    }

    /// Moves `entity` into `dst`, carrying over the data of every common id.
    pub(crate) fn move_entity(&mut self, entity: Entity, dst: ArchetypeId) {
        let src = self.location(entity);
        if src.archetype == dst {
            return;
        }
        let version = self.next_version();

        let (src_arch, dst_arch) = archetype_pair_mut(&mut self.archetypes, src.archetype, dst);
        let dst_chunk_index = dst_arch.foc_free_chunk(&mut self.pool, version);
        let src_chunk = src_arch.chunk_mut(src.chunk);
        let enabled = src_chunk.is_enabled(src.row);
        let dst_chunk = dst_arch.chunk_mut(dst_chunk_index);

        let dst_row = dst_chunk.add_entity(entity);
        let moves = Chunk::transfer_row(src_chunk, src.row, dst_chunk, dst_row);
        dst_chunk.bump_all(version);

        relocate(&mut self.records, src.archetype, src.chunk, moves);
        set_location(&mut self.records, entity, Location { archetype: dst, chunk: dst_chunk_index, row: dst_row });
        if !enabled {
            let moves = dst_chunk.enable_entity(dst_row, false);
            relocate(&mut self.records, dst, dst_chunk_index, moves);
        }

        self.after_row_removed(src.archetype, src.chunk);
        self.after_row_added(dst);
    }

    /// Removes the row of `entity`, dropping its data, and marks it as pending deletion.
    pub(super) fn remove_row(&mut self, entity: Entity) {
        let location = self.location(entity);
        self.next_version();

        let chunk = self.archetypes[location.archetype.index()]
            .as_mut()
            .expect("archetype is alive")
            .chunk_mut(location.chunk);
        let moves = chunk.remove_entity(location.row);
        relocate(&mut self.records, location.archetype, location.chunk, moves);
        self.records.get_mut(entity.id()).expect("entity is alive").location = None;

        self.after_row_removed(location.archetype, location.chunk);
    }

    fn after_row_removed(&mut self, archetype: ArchetypeId, chunk: u32) {
        let chunk_grace = self.config.chunk_grace_ticks;
        let archetype_grace = self.config.archetype_grace_ticks;
        let arch = self.archetypes[archetype.index()].as_mut().expect("archetype is alive");

        if arch.chunk(chunk).is_empty() {
            arch.on_chunk_emptied(chunk, chunk_grace);
            self.chunk_gc.insert(archetype);
        }
        if archetype != ArchetypeId::ROOT && arch.is_empty() && !arch.is_dying() {
            arch.start_dying(archetype_grace);
            self.dying_archetypes.insert(archetype);
        }
    }

    fn after_row_added(&mut self, archetype: ArchetypeId) {
        let arch = self.archetypes[archetype.index()].as_mut().expect("archetype is alive");
        if arch.is_dying() {
            arch.revive();
            self.dying_archetypes.swap_remove(&archetype);
        }
    }

    /// Moves every entity of `src` into `dst`.
    pub(super) fn move_all(&mut self, src: ArchetypeId, dst: ArchetypeId) {
        let entities: Vec<Entity> =
            self.archetype(src).chunks().iter().flat_map(|chunk| chunk.entities().iter().copied()).collect();
        for entity in entities {
            self.move_entity(entity, dst);
        }
    }

    /// Requests the release of `archetype` on the next update.
    pub(super) fn req_del_archetype(&mut self, archetype: ArchetypeId) {
        if archetype == ArchetypeId::ROOT {
            return;
        }
        if let Some(arch) = self.archetypes[archetype.index()].as_mut() {
            arch.req_del();
            self.archetypes_to_del.insert(archetype);
        }
    }

    /// Releases an empty archetype, unlinking it from every directory.
    pub(super) fn release_archetype(&mut self, id: ArchetypeId) {
        let mut archetype = self.archetypes[id.index()].take().expect("archetype is alive");
        assert!(archetype.is_empty(), "releasing archetype {id:?} which still has entities");
        archetype.release_chunks(&mut self.pool);

        for (edge, dst) in archetype.graph().add_edges() {
            if let Some(Some(neighbor)) = self.archetypes.get_mut(dst.index()) {
                neighbor.graph_mut().remove_edge_del(edge);
            }
        }
        for (edge, dst) in archetype.graph().del_edges() {
            if let Some(Some(neighbor)) = self.archetypes.get_mut(dst.index()) {
                neighbor.graph_mut().remove_edge_add(edge);
            }
        }

        let hash = archetype.lookup_hash();
        if let Some(bucket) = self.archetype_map.get_mut(&hash) {
            bucket.retain(|&candidate| candidate != id);
            if bucket.is_empty() {
                self.archetype_map.remove(&hash);
            }
        }

        self.unindex_archetype(id, archetype.ids());
        self.query_cache.purge_archetype(id);
        self.dying_archetypes.swap_remove(&id);
        self.archetypes_to_del.swap_remove(&id);
        self.chunk_gc.swap_remove(&id);

        log::debug!("released archetype {id:?} with ids {:?}", archetype.ids());
    }
}
