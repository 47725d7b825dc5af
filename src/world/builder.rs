use super::World;
use crate::archetype::{ArchetypeId, MAX_IDS_PER_ARCHETYPE};
use crate::entity::{self, pair, Entity, Reaction};

/// Batches structural changes of one entity into a single row move.
///
/// Every `add`/`del` walks one edge of the archetype graph;
/// the row itself only moves in [`EntityBuilder::commit`].
#[must_use = "changes are only applied on commit"]
pub struct EntityBuilder<'w> {
    world:     &'w mut World,
    entity:    Entity,
    origin:    ArchetypeId,
    archetype: ArchetypeId,
}

impl<'w> EntityBuilder<'w> {
    pub(super) fn new(world: &'w mut World, entity: Entity) -> Self {
        let origin = world.location(entity).archetype;
        Self { world, entity, origin, archetype: origin }
    }

    /// The entity being edited.
    pub fn entity(&self) -> Entity { self.entity }

    /// Adds `id`, along with everything it depends on through `(DependsOn, X)`.
    ///
    /// The id is skipped with an error log
    /// if it cannot be combined with an id the entity already has.
    ///
    /// # Panics
    /// Panics if `id` is invalid or a wildcard,
    /// or if the entity would hold more than [`MAX_IDS_PER_ARCHETYPE`] ids.
    pub fn add(&mut self, id: Entity) -> &mut Self {
        self.try_add(id);
        self
    }

    fn try_add(&mut self, id: Entity) -> bool {
        assert!(!id.is_wildcard(), "cannot add the wildcard {id:?} to {:?}", self.entity);
        assert!(self.world.valid(id), "cannot add the invalid id {id:?} to {:?}", self.entity);

        let current = self.world.archetype(self.archetype);
        if current.has(id) {
            return true;
        }
        assert!(
            current.ids().len() < MAX_IDS_PER_ARCHETYPE,
            "{:?} cannot hold more than {MAX_IDS_PER_ARCHETYPE} ids",
            self.entity
        );

        if !id.is_pair() {
            if let Some(conflict) = self.cant_combine_conflict(id) {
                log::error!("{id:?} cannot be combined with {conflict:?} on {:?}", self.entity);
                return false;
            }

            let dependencies: Vec<Entity> = self.world.targets(id, entity::DEPENDS_ON).collect();
            for dependency in dependencies {
                if !self.try_add(dependency) {
                    return false;
                }
            }
        }

        self.archetype = self.world.foc_archetype_add(self.archetype, id);
        true
    }

    /// Finds an id already on the entity that `id` cannot be combined with.
    fn cant_combine_conflict(&self, id: Entity) -> Option<Entity> {
        let world = &*self.world;
        let current = world.archetype(self.archetype);

        if let Some(target) = world.targets(id, entity::CANT_COMBINE).find(|&target| current.has(target)) {
            return Some(target);
        }
        current
            .ids()
            .iter()
            .copied()
            .filter(|held| !held.is_pair())
            .find(|&held| world.has(held, pair(entity::CANT_COMBINE, id)))
    }

    /// Removes `id`.
    ///
    /// The id is kept with a warning if another id on the entity depends on it.
    pub fn del(&mut self, id: Entity) -> &mut Self {
        let world = &*self.world;
        let current = world.archetype(self.archetype);
        if !current.has(id) {
            return self;
        }

        if !id.is_pair() {
            let dependent = current
                .ids()
                .iter()
                .copied()
                .filter(|&held| held != id && !held.is_pair())
                .find(|&held| world.has(held, pair(entity::DEPENDS_ON, id)));
            if let Some(dependent) = dependent {
                log::warn!("cannot remove {id:?} from {:?} because {dependent:?} depends on it", self.entity);
                return self;
            }
        }

        self.archetype = self.world.foc_archetype_del(self.archetype, id);
        self
    }

    /// Names the entity.
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.world.name(self.entity, name);
        self
    }

    /// Moves the entity into the resulting archetype.
    ///
    /// The builder stays usable afterwards;
    /// later changes are applied relative to the committed archetype.
    pub fn commit(&mut self) {
        let (entity, origin, archetype) = (self.entity, self.origin, self.archetype);
        if origin == archetype {
            return;
        }
        self.origin = archetype;
        let world = &mut *self.world;

        let before = world.archetype(origin).ids().to_vec();
        let after = world.archetype(archetype).ids().to_vec();
        world.move_entity(entity, archetype);

        for &id in after.iter().filter(|id| before.binary_search(id).is_err()) {
            world.on_id_changed(entity, id, true);
        }
        for &id in before.iter().filter(|id| after.binary_search(id).is_err()) {
            world.on_id_changed(entity, id, false);
        }
    }
}

impl World {
    /// Updates cached state derived from the pairs an entity holds.
    fn on_id_changed(&mut self, entity: Entity, id: Entity, added: bool) {
        if !id.is_pair() {
            return;
        }

        if id.rel() == entity::IS.id() {
            self.is_epoch = self.is_epoch.wrapping_add(1);
        }

        let on_delete = id.rel() == entity::ON_DELETE.id();
        if on_delete || id.rel() == entity::ON_DELETE_TARGET.id() {
            let reaction = if added {
                let target = self.handle_at(id.tgt());
                Reaction::from_target(target).unwrap_or_else(|| {
                    log::warn!("{target:?} is not a delete reaction, treating it as removal");
                    Reaction::Remove
                })
            } else {
                Reaction::Remove
            };

            let rules = &mut self.records.get_mut(entity.id()).expect("entity is alive").rules;
            if on_delete {
                rules.on_delete = reaction;
            } else {
                rules.on_delete_target = reaction;
            }
        }
    }
}
