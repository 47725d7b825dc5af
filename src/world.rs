//! The world owns every entity, archetype and component registration.
//!
//! # Directories
//! - Every entity index has a [`Record`] locating its row.
//! - Archetypes are addressed by [`ArchetypeId`] and interned by their schema hash.
//! - For every id (including the wildcard forms of pairs),
//!   the world indexes the archetypes containing it,
//!   which makes "who holds X" a single lookup.
//!
//! # Structural changes
//! Adding or removing ids moves the entity along the archetype graph.
//! Several changes can be batched with [`World::bulk`] so that the row moves only once.
//!
//! # Deletion
//! [`World::del`] removes rows immediately but only invalidates handles in [`World::update`],
//! so indices are never recycled while an archetype still refers to them.

use std::collections::HashMap;

use indexmap::IndexSet;
use xias::Xias;

use crate::archetype::{Archetype, ArchetypeId, LookupHash};
use crate::comp::{Component, Desc, Registry};
use crate::entity::slots::Slots;
use crate::entity::{self, pair, Entity, Kind, Pair, Rules};
use crate::query::cache::QueryCache;
use crate::storage::Pool;

mod archetypes;
mod builder;
pub use builder::EntityBuilder;
mod deletion;
pub use deletion::DeleteError;
mod diag;
mod gc;

#[cfg(test)]
mod tests;

/// Tunables of a world.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Maximum number of rows moved by defragmentation in one [`World::update`].
    pub defrag_entities_per_tick: u32,
    /// Number of updates an empty chunk survives before its block is released.
    pub chunk_grace_ticks:        u16,
    /// Number of updates an empty archetype survives before it is released.
    pub archetype_grace_ticks:    u16,
}

impl Default for WorldConfig {
    fn default() -> Self { Self { defrag_entities_per_tick: 100, chunk_grace_ticks: 3, archetype_grace_ticks: 3 } }
}

/// The physical position of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Location {
    pub(crate) archetype: ArchetypeId,
    pub(crate) chunk:     u32,
    pub(crate) row:       u16,
}

/// The directory entry of one entity index.
#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub(crate) entity:   Entity,
    /// `None` once deletion was requested.
    pub(crate) location: Option<Location>,
    pub(crate) rules:    Rules,
    pub(crate) name:     Option<String>,
}

/// Stores entities and their components.
pub struct World {
    pub(crate) config:      WorldConfig,
    pub(crate) registry:    Registry,
    pub(crate) records:     Slots<Record>,
    /// Live concrete pairs, along with the handles they were created from.
    pairs:                  HashMap<Entity, Pair>,
    /// Indexed by `ArchetypeId`; released archetypes leave a `None`.
    pub(crate) archetypes:  Vec<Option<Archetype>>,
    archetype_map:          HashMap<LookupHash, Vec<ArchetypeId>>,
    pub(crate) id_index:    HashMap<Entity, IndexSet<ArchetypeId>>,
    rel_to_tgt:             HashMap<Entity, IndexSet<Entity>>,
    tgt_to_rel:             HashMap<Entity, IndexSet<Entity>>,
    names:                  HashMap<String, Entity>,
    pub(crate) pool:        Pool,
    /// Bumped on every structural change and every tracked write.
    pub(crate) version:     u32,
    /// Bumped whenever any entity gains or loses an `(Is, X)` pair.
    pub(crate) is_epoch:    u32,
    entities_to_del:        Vec<Entity>,
    archetypes_to_del:      IndexSet<ArchetypeId>,
    dying_archetypes:       IndexSet<ArchetypeId>,
    chunk_gc:               IndexSet<ArchetypeId>,
    defrag_cursor:          usize,
    pub(crate) query_cache: QueryCache,
}

static_assertions::assert_impl_all!(World: Send, Sync);

impl Default for World {
    fn default() -> Self { Self::new() }
}

impl World {
    /// Creates a world with the default configuration.
    pub fn new() -> Self { Self::with_config(WorldConfig::default()) }

    /// Creates a world with a custom configuration.
    pub fn with_config(config: WorldConfig) -> Self {
        let mut world = Self {
            config,
            registry: Registry::default(),
            records: Slots::default(),
            pairs: HashMap::new(),
            archetypes: Vec::new(),
            archetype_map: HashMap::new(),
            id_index: HashMap::new(),
            rel_to_tgt: HashMap::new(),
            tgt_to_rel: HashMap::new(),
            names: HashMap::new(),
            pool: Pool::default(),
            version: 0,
            is_epoch: 0,
            entities_to_del: Vec::new(),
            archetypes_to_del: IndexSet::new(),
            dying_archetypes: IndexSet::new(),
            chunk_gc: IndexSet::new(),
            defrag_cursor: 0,
            query_cache: QueryCache::default(),
        };

        let root = world.find_or_create_archetype(Vec::new());
        debug_assert_eq!(root, ArchetypeId::ROOT);

        for &(expected, name) in entity::CORE_ENTITIES {
            let entity = world.add();
            assert_eq!(entity, expected, "built-in entities must be created first");
            world.name(entity, name);
        }
        for &(entity, _) in entity::CORE_ENTITIES {
            let mut builder = world.bulk(entity);
            builder.add(entity::CORE).add(pair(entity::ON_DELETE, entity::ERROR));
            if entity == entity::CHILD_OF {
                builder.add(pair(entity::ON_DELETE_TARGET, entity::DELETE));
            }
            builder.commit();
        }

        world
    }

    /// The configuration of this world.
    pub fn config(&self) -> &WorldConfig { &self.config }

    /// The component registry of this world.
    pub fn registry(&self) -> &Registry { &self.registry }

    pub(crate) fn next_version(&mut self) -> u32 {
        self.version = self.version.wrapping_add(1);
        self.version
    }

    /// Creates a generic entity without any ids.
    pub fn add(&mut self) -> Entity { self.add_kind(Kind::Generic) }

    /// Creates an entity of the given kind without any ids.
    pub fn add_kind(&mut self, kind: Kind) -> Entity {
        let (entity, _) = self.spawn(true, kind, ArchetypeId::ROOT);
        entity
    }

    /// Creates `count` generic entities, passing each to `f`.
    pub fn add_n(&mut self, count: usize, mut f: impl FnMut(Entity)) {
        for _ in 0..count {
            let entity = self.add();
            f(entity);
        }
    }

    /// Creates an entity with the same ids as `entity` and default values.
    pub fn add_from_archetype_of(&mut self, entity: Entity) -> Entity {
        let archetype = self.location(entity).archetype;
        let (new, location) = self.spawn(true, entity.kind(), archetype);
        self.archetype_mut(archetype).chunk_mut(location.chunk).construct_row(location.row);
        self.inherit_rules(entity, new);
        new
    }

    /// Creates an entity with the same ids as `entity` and cloned values.
    pub fn copy(&mut self, entity: Entity) -> Entity {
        let src = self.location(entity);
        let (new, dst) = self.spawn(entity.is_entity(), entity.kind(), src.archetype);

        let archetype = self.archetype_mut(src.archetype);
        if src.chunk == dst.chunk {
            archetype.chunk_mut(src.chunk).clone_row_within(src.row, dst.row);
        } else {
            let (src_chunk, dst_chunk) = archetype.chunk_pair_mut(src.chunk, dst.chunk);
            crate::storage::Chunk::clone_row(src_chunk, src.row, dst_chunk, dst.row);
        }
        self.inherit_rules(entity, new);
        new
    }

    /// Creates `count` copies of `entity`.
    pub fn copy_n(&mut self, entity: Entity, count: usize) -> Vec<Entity> {
        (0..count).map(|_| self.copy(entity)).collect()
    }

    fn inherit_rules(&mut self, src: Entity, dst: Entity) {
        let rules = self.records.get(src.id()).expect("source is alive").rules;
        self.records.get_mut(dst.id()).expect("entity was just created").rules = rules;
    }

    /// Whether `entity` is alive and not requested for deletion.
    ///
    /// A pair is valid if both its relation and its target are valid.
    pub fn valid(&self, entity: Entity) -> bool {
        if entity.is_bad() {
            return false;
        }
        if entity.is_pair() {
            return self.index_valid(entity.rel()) && self.index_valid(entity.tgt());
        }
        self.records.get(entity.id()).map_or(false, |record| record.entity == entity && record.location.is_some())
    }

    fn index_valid(&self, index: u32) -> bool {
        self.records.get(index).map_or(false, |record| record.location.is_some())
    }

    /// The live handle at `index`, or [`Entity::BAD`].
    pub fn entity(&self, index: u32) -> Entity {
        match self.records.get(index) {
            Some(record) if record.location.is_some() => record.entity,
            _ => Entity::BAD,
        }
    }

    /// The handle stored at `index`, even if it is pending deletion.
    pub(crate) fn handle_at(&self, index: u32) -> Entity {
        self.records.get(index).map_or(Entity::BAD, |record| record.entity)
    }

    /// Number of valid entities, including built-in and component entities.
    pub fn size(&self) -> usize { self.records.alive() - self.entities_to_del.len() }

    pub(crate) fn assert_valid(&self, entity: Entity) {
        assert!(self.valid(entity), "{entity:?} is not a valid entity");
    }

    pub(crate) fn location(&self, entity: Entity) -> Location {
        assert!(!entity.is_pair(), "pair {entity:?} does not have a location");
        match self.records.get(entity.id()) {
            Some(Record { entity: stored, location: Some(location), .. }) if *stored == entity => *location,
            _ => panic!("{entity:?} is not a valid entity"),
        }
    }

    pub(crate) fn archetype(&self, id: ArchetypeId) -> &Archetype {
        self.archetypes[id.index()].as_ref().expect("archetype is alive")
    }

    pub(crate) fn archetype_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        self.archetypes[id.index()].as_mut().expect("archetype is alive")
    }

    /// The archetype currently storing `entity`.
    pub fn archetype_of(&self, entity: Entity) -> &Archetype { self.archetype(self.location(entity).archetype) }

    /// Iterates over all live archetypes.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> + '_ { self.archetypes.iter().flatten() }

    /// Enables or disables `entity`.
    ///
    /// Disabled entities are skipped by queries with the default constraint.
    pub fn enable(&mut self, entity: Entity, enable: bool) {
        let location = self.location(entity);
        let chunk = self.archetypes[location.archetype.index()]
            .as_mut()
            .expect("archetype is alive")
            .chunk_mut(location.chunk);
        let moves = chunk.enable_entity(location.row, enable);
        archetypes::relocate(&mut self.records, location.archetype, location.chunk, moves);
    }

    /// Whether `entity` is enabled.
    pub fn enabled(&self, entity: Entity) -> bool {
        let location = self.location(entity);
        self.archetype(location.archetype).chunk(location.chunk).is_enabled(location.row)
    }

    /// Whether `entity` holds `id`.
    ///
    /// `id` may be a wildcard pair, in which case any matching pair counts.
    pub fn has(&self, entity: Entity, id: Entity) -> bool {
        let archetype = self.archetype_of(entity);
        if id.is_wildcard() {
            archetype.ids().iter().any(|&held| id.matches(held))
        } else {
            archetype.has(id)
        }
    }

    /// Whether any archetype holds `id`, which may be a wildcard pair.
    pub fn has_id(&self, id: Entity) -> bool { self.id_index.get(&id).map_or(false, |set| !set.is_empty()) }

    /// Adds `id` to `entity`.
    pub fn add_id(&mut self, entity: Entity, id: Entity) { self.bulk(entity).add(id).commit(); }

    /// Removes `id` from `entity`.
    pub fn remove_id(&mut self, entity: Entity, id: Entity) { self.bulk(entity).del(id).commit(); }

    /// Starts batching structural changes of `entity`.
    pub fn bulk(&mut self, entity: Entity) -> EntityBuilder<'_> { EntityBuilder::new(self, entity) }

    /// Registers `T`, returning the entity standing for it.
    ///
    /// Registering the same type again returns the same entity.
    pub fn register<T: Component>(&mut self) -> Entity {
        if let Some(desc) = self.registry.by_type::<T>() {
            return desc.entity;
        }

        let (entity, _) = self.spawn(false, T::KIND, ArchetypeId::ROOT);
        self.registry.add::<T>(entity);
        self.protect_component(entity, T::name());
        entity
    }

    /// Registers an untyped plain-data component.
    ///
    /// # Panics
    /// Panics if `name` is already used.
    pub fn register_raw(&mut self, name: &str, size: u32, align: u32, kind: Kind) -> Entity {
        let (entity, _) = self.spawn(false, kind, ArchetypeId::ROOT);
        self.registry.add_raw(entity, name, size, align, kind);
        self.protect_component(entity, name);
        entity
    }

    fn protect_component(&mut self, entity: Entity, name: &str) {
        self.name(entity, name);
        self.add_id(entity, pair(entity::ON_DELETE, entity::ERROR));
    }

    /// The entity standing for `T`, if registered.
    pub fn comp_id<T: Component>(&self) -> Option<Entity> { self.registry.by_type::<T>().map(|desc| desc.entity) }

    fn expect_comp_id<T: Component>(&self) -> Entity {
        self.comp_id::<T>().unwrap_or_else(|| panic!("{} is not registered", T::name()))
    }

    /// The descriptor registered for `id`, including zero-sized tags.
    ///
    /// For pairs, this is the descriptor of the relation.
    pub fn desc(&self, id: Entity) -> Option<&Desc> {
        archetypes::registered_desc(&self.registry, &self.records, id)
    }

    /// Adds `T` to `entity` and writes `value`.
    pub fn add_value<T: Component>(&mut self, entity: Entity, value: T) {
        let id = self.register::<T>();
        if !self.has(entity, id) {
            self.add_id(entity, id);
            if !self.has(entity, id) {
                return;
            }
        }
        self.write(entity, id, value, true);
    }

    /// Overwrites the `T` of `entity`, marking it as changed.
    ///
    /// # Panics
    /// Panics if `entity` does not have `T`.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) {
        let id = self.expect_comp_id::<T>();
        self.write(entity, id, value, true);
    }

    /// Overwrites the `T` of `entity` without marking it as changed.
    pub fn set_silent<T: Component>(&mut self, entity: Entity, value: T) {
        let id = self.expect_comp_id::<T>();
        self.write(entity, id, value, false);
    }

    /// Overwrites the data stored under `id`, which may be a data-carrying pair.
    pub fn set_id<T: Component>(&mut self, entity: Entity, id: Entity, value: T) { self.write(entity, id, value, true); }

    fn write<T: Component>(&mut self, entity: Entity, id: Entity, value: T, track: bool) {
        let location = self.location(entity);
        let version = track.then(|| self.next_version());

        let archetype = self.archetype_mut(location.archetype);
        assert!(archetype.has(id), "{entity:?} does not have {} as {id:?}", T::name());
        if std::mem::size_of::<T>() == 0 {
            return;
        }
        let chunk = archetype.chunk_mut(location.chunk);
        match id.kind() {
            Kind::Unique => {
                let version =
                    version.or_else(|| chunk.column_version(id)).expect("unique column has a version");
                *chunk.unique_mut::<T>(id, version) = value;
            }
            Kind::Generic => chunk.replace(id, location.row, value, version),
        }
    }

    /// Reads the `T` of `entity`.
    ///
    /// Unique components are read from the chunk storing `entity`.
    ///
    /// # Panics
    /// Panics if `T` uses the SoA layout; use [`World::read`] instead.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> { self.get_id(entity, self.comp_id::<T>()?) }

    /// Reads the data stored under `id`, which may be a data-carrying pair.
    pub fn get_id<T: Component>(&self, entity: Entity, id: Entity) -> Option<&T> {
        let location = self.location(entity);
        let archetype = self.archetype(location.archetype);
        if !archetype.has(id) {
            return None;
        }
        let chunk = archetype.chunk(location.chunk);
        Some(match id.kind() {
            Kind::Unique => chunk.unique::<T>(id),
            Kind::Generic => &chunk.view::<T>(id, location.row..location.row + 1)[0],
        })
    }

    /// Mutably borrows the `T` of `entity`, marking it as changed.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let id = self.comp_id::<T>()?;
        let location = self.location(entity);
        if !self.archetype(location.archetype).has(id) {
            return None;
        }
        let version = self.next_version();
        let chunk = self.archetype_mut(location.archetype).chunk_mut(location.chunk);
        Some(match id.kind() {
            Kind::Unique => chunk.unique_mut::<T>(id, version),
            Kind::Generic => &mut chunk.view_mut::<T>(id, location.row..location.row + 1, version)[0],
        })
    }

    /// Copies out the `T` of `entity`, gathering it if `T` uses the SoA layout.
    pub fn read<T: Component + Copy>(&self, entity: Entity) -> Option<T> {
        let id = self.comp_id::<T>()?;
        let location = self.location(entity);
        let archetype = self.archetype(location.archetype);
        if !archetype.has(id) {
            return None;
        }
        let chunk = archetype.chunk(location.chunk);
        Some(match id.kind() {
            Kind::Unique => *chunk.unique::<T>(id),
            Kind::Generic => chunk.read::<T>(id, location.row),
        })
    }

    /// Removes `T` from `entity`.
    pub fn remove<T: Component>(&mut self, entity: Entity) {
        if let Some(id) = self.comp_id::<T>() {
            self.remove_id(entity, id);
        }
    }

    /// Adds `(Is, base)` to `entity`.
    pub fn as_(&mut self, entity: Entity, base: Entity) { self.add_id(entity, pair(entity::IS, base)); }

    /// Whether `entity` is `base` or inherits from it through `(Is, X)` pairs.
    pub fn is(&self, entity: Entity, base: Entity) -> bool {
        let mut visited = vec![entity];
        let mut stack = vec![entity];
        while let Some(current) = stack.pop() {
            if current == base {
                return true;
            }
            if !self.valid(current) {
                continue;
            }
            for next in self.targets(current, entity::IS) {
                if !visited.contains(&next) {
                    visited.push(next);
                    stack.push(next);
                }
            }
        }
        false
    }

    /// Whether `entity` inherits from `base`, excluding `base` itself.
    pub fn in_(&self, entity: Entity, base: Entity) -> bool { entity != base && self.is(entity, base) }

    /// The first target of `(rel, *)` pairs on `entity`, or [`Entity::BAD`].
    pub fn target(&self, entity: Entity, rel: Entity) -> Entity {
        self.targets(entity, rel).next().unwrap_or(Entity::BAD)
    }

    /// Targets of `(rel, *)` pairs on `entity`.
    ///
    /// `rel` may be [`entity::WILDCARD`] to list the targets of every pair.
    #[auto_enums::auto_enum(Iterator)]
    pub fn targets(&self, entity: Entity, rel: Entity) -> impl Iterator<Item = Entity> + '_ {
        let ids = self.archetype_of(entity).ids().iter().copied();
        match rel == entity::WILDCARD {
            true => ids.filter(|id| id.is_pair()).map(move |id| self.handle_at(id.tgt())),
            false => ids
                .filter(move |id| id.is_pair() && id.rel() == rel.id())
                .map(move |id| self.handle_at(id.tgt())),
        }
    }

    /// The first relation of `(*, tgt)` pairs on `entity`, or [`Entity::BAD`].
    pub fn relation(&self, entity: Entity, tgt: Entity) -> Entity {
        self.relations(entity, tgt).next().unwrap_or(Entity::BAD)
    }

    /// Relations of `(*, tgt)` pairs on `entity`.
    #[auto_enums::auto_enum(Iterator)]
    pub fn relations(&self, entity: Entity, tgt: Entity) -> impl Iterator<Item = Entity> + '_ {
        let ids = self.archetype_of(entity).ids().iter().copied();
        match tgt == entity::WILDCARD {
            true => ids.filter(|id| id.is_pair()).map(move |id| self.handle_at(id.rel())),
            false => ids
                .filter(move |id| id.is_pair() && id.tgt() == tgt.id())
                .map(move |id| self.handle_at(id.rel())),
        }
    }

    /// The live relation handle of `pair`, or [`Entity::BAD`].
    pub fn pair_rel(&self, pair: Entity) -> Entity {
        if !pair.is_pair() {
            return Entity::BAD;
        }
        self.entity(pair.rel())
    }

    /// The live target handle of `pair`, or [`Entity::BAD`].
    pub fn pair_tgt(&self, pair: Entity) -> Entity {
        if !pair.is_pair() {
            return Entity::BAD;
        }
        self.entity(pair.tgt())
    }

    /// Targets of every live `(rel, *)` pair in the world.
    pub fn relation_targets(&self, rel: Entity) -> impl Iterator<Item = Entity> + '_ {
        self.rel_to_tgt.get(&rel).into_iter().flatten().copied()
    }

    /// Relations of every live `(*, tgt)` pair in the world.
    pub fn target_relations(&self, tgt: Entity) -> impl Iterator<Item = Entity> + '_ {
        self.tgt_to_rel.get(&tgt).into_iter().flatten().copied()
    }

    /// Names `entity`, replacing its previous name.
    ///
    /// # Panics
    /// Panics if `name` already belongs to another entity.
    pub fn name(&mut self, entity: Entity, name: &str) {
        self.assert_valid(entity);
        if let Some(&owner) = self.names.get(name) {
            assert_eq!(owner, entity, "name {name:?} is already used by {owner:?}");
            return;
        }

        let record = self.records.get_mut(entity.id()).expect("entity is valid");
        if let Some(old) = record.name.replace(name.to_string()) {
            self.names.remove(&old);
        }
        self.names.insert(name.to_string(), entity);
    }

    /// The name of `entity`, if any.
    pub fn get_name(&self, entity: Entity) -> Option<&str> {
        self.assert_valid(entity);
        self.records.get(entity.id()).and_then(|record| record.name.as_deref())
    }

    /// Looks up an entity by name.
    pub fn by_name(&self, name: &str) -> Option<Entity> { self.names.get(name).copied() }

    pub(crate) fn clear_name(&mut self, entity: Entity) {
        if let Some(name) = self.records.get_mut(entity.id()).and_then(|record| record.name.take()) {
            self.names.remove(&name);
        }
    }

    /// Number of pending structural deletions, used by tests and diagnostics.
    pub fn pending_deletes(&self) -> usize { self.entities_to_del.len() }

    pub(crate) fn archetype_count(&self) -> usize { self.archetypes.iter().flatten().count() }

    pub(crate) fn archetype_len(&self) -> u32 { self.archetypes.len().small_int() }
}
