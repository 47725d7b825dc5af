//! Structural changes queued while the world is borrowed, e.g. during iteration.
//!
//! Entities created by a buffer are referred to by temporary handles
//! until [`CommandBuffer::commit`] replays the queue and resolves them.
//! Temporary handles can be used as targets and ids of later commands in the same buffer.

use std::marker::PhantomData;

use xias::Xias;

use crate::comp::Component;
use crate::entity::{Entity, Kind, MAX_PAIR_INDEX};
use crate::world::World;


/// Whether `entity` is a temporary handle issued by a command buffer.
///
/// Temporary handles set both the pair and the entity bits,
/// a combination never produced by a world.
pub fn is_temp(entity: Entity) -> bool { entity.is_pair() && entity.is_entity() }

/// Temporary indices count down from the top of the pair index range,
/// so they survive being packed into either side of a pair.
fn temp(ordinal: u32, kind: Kind) -> Entity {
    assert!(ordinal <= MAX_PAIR_INDEX, "too many entities created in one command buffer");
    Entity::new(MAX_PAIR_INDEX - ordinal, 0, true, true, kind)
}

/// Real handles of the entities created so far during a commit.
struct Temps {
    issued:   u32,
    resolved: Vec<Entity>,
}

impl Temps {
    /// The real handle behind a temporary index, if `index` is one.
    fn resolve_index(&self, index: u32) -> Option<Entity> {
        let ordinal = MAX_PAIR_INDEX.checked_sub(index)?;
        if ordinal >= self.issued {
            return None;
        }
        let resolved = self.resolved.get(ordinal.small_int::<usize>()).copied();
        Some(resolved.expect("temporary handles are only used after their creation is queued"))
    }

    fn resolve(&self, entity: Entity) -> Entity {
        if is_temp(entity) {
            return self.resolve_index(entity.id()).expect("temporary handle issued by another buffer");
        }
        if !entity.is_pair() {
            return entity;
        }

        let rel = self.resolve_index(entity.rel());
        let tgt = self.resolve_index(entity.tgt());
        if rel.is_none() && tgt.is_none() {
            return entity;
        }
        Entity::raw_pair(
            rel.map_or(entity.rel(), Entity::id),
            tgt.map_or(entity.tgt(), Entity::id),
            rel.map_or(entity.kind(), Entity::kind),
        )
    }
}

/// A queued command.
trait Operation: Send {
    /// Applies the command to the world.
    fn run(self: Box<Self>, world: &mut World, temps: &mut Temps);
}

struct CreateEntity {
    kind: Kind,
}

impl Operation for CreateEntity {
    fn run(self: Box<Self>, world: &mut World, temps: &mut Temps) {
        temps.resolved.push(world.add_kind(self.kind));
    }
}

struct CreateEntityFromArchetype {
    source: Entity,
}

impl Operation for CreateEntityFromArchetype {
    fn run(self: Box<Self>, world: &mut World, temps: &mut Temps) {
        let source = temps.resolve(self.source);
        temps.resolved.push(world.add_from_archetype_of(source));
    }
}

struct CreateEntityFromEntity {
    source: Entity,
}

impl Operation for CreateEntityFromEntity {
    fn run(self: Box<Self>, world: &mut World, temps: &mut Temps) {
        let source = temps.resolve(self.source);
        temps.resolved.push(world.copy(source));
    }
}

struct DeleteEntity {
    entity: Entity,
}

impl Operation for DeleteEntity {
    fn run(self: Box<Self>, world: &mut World, temps: &mut Temps) {
        let entity = temps.resolve(self.entity);
        if !entity.is_pair() && !world.valid(entity) {
            log::warn!("skipped queued deletion of the invalid entity {entity:?}");
            return;
        }
        if world.del(entity).is_err() {
            log::warn!("queued deletion of {entity:?} was refused");
        }
    }
}

struct AddComponent {
    target: Entity,
    id:     Entity,
}

impl Operation for AddComponent {
    fn run(self: Box<Self>, world: &mut World, temps: &mut Temps) {
        world.add_id(temps.resolve(self.target), temps.resolve(self.id));
    }
}

struct AddComponentData<T> {
    target: Entity,
    value:  T,
}

impl<T: Component> Operation for AddComponentData<T> {
    fn run(self: Box<Self>, world: &mut World, temps: &mut Temps) {
        world.add_value(temps.resolve(self.target), self.value);
    }
}

struct SetComponent<T> {
    target: Entity,
    value:  T,
}

impl<T: Component> Operation for SetComponent<T> {
    fn run(self: Box<Self>, world: &mut World, temps: &mut Temps) {
        world.set(temps.resolve(self.target), self.value);
    }
}

struct RemoveComponent {
    target: Entity,
    id:     Entity,
}

impl Operation for RemoveComponent {
    fn run(self: Box<Self>, world: &mut World, temps: &mut Temps) {
        world.remove_id(temps.resolve(self.target), temps.resolve(self.id));
    }
}

struct RemoveComponentOf<T> {
    target: Entity,
    _ph:    PhantomData<fn() -> T>,
}

impl<T: Component> Operation for RemoveComponentOf<T> {
    fn run(self: Box<Self>, world: &mut World, temps: &mut Temps) { world.remove::<T>(temps.resolve(self.target)); }
}

/// Records structural changes to replay on a world later.
#[derive(Default)]
pub struct CommandBuffer {
    ops:   Vec<Box<dyn Operation>>,
    temps: u32,
}

static_assertions::assert_impl_all!(CommandBuffer: Send);

impl CommandBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self { Self::default() }

    /// Number of queued commands.
    pub fn len(&self) -> usize { self.ops.len() }

    /// Whether no command was queued.
    pub fn is_empty(&self) -> bool { self.ops.is_empty() }

    fn push(&mut self, op: impl Operation + 'static) { self.ops.push(Box::new(op)); }

    fn next_temp(&mut self, kind: Kind) -> Entity {
        let entity = temp(self.temps, kind);
        self.temps += 1;
        entity
    }

    /// Queues the creation of a generic entity, returning its temporary handle.
    pub fn add(&mut self) -> Entity { self.add_kind(Kind::Generic) }

    /// Queues the creation of an entity of `kind`.
    pub fn add_kind(&mut self, kind: Kind) -> Entity {
        self.push(CreateEntity { kind });
        self.next_temp(kind)
    }

    /// Queues the creation of an entity with the ids of `source` and default values.
    pub fn add_from_archetype_of(&mut self, source: Entity) -> Entity {
        self.push(CreateEntityFromArchetype { source });
        self.next_temp(source.kind())
    }

    /// Queues the creation of a copy of `source`.
    pub fn copy(&mut self, source: Entity) -> Entity {
        self.push(CreateEntityFromEntity { source });
        self.next_temp(source.kind())
    }

    /// Queues the deletion of `entity`, which may be a pair.
    ///
    /// A deletion refused by a delete rule is logged and skipped.
    pub fn del(&mut self, entity: Entity) { self.push(DeleteEntity { entity }); }

    /// Queues adding `id` to `target`.
    pub fn add_id(&mut self, target: Entity, id: Entity) { self.push(AddComponent { target, id }); }

    /// Queues adding `T` with `value` to `target`.
    pub fn add_value<T: Component>(&mut self, target: Entity, value: T) {
        self.push(AddComponentData { target, value });
    }

    /// Queues overwriting the `T` of `target`.
    pub fn set<T: Component>(&mut self, target: Entity, value: T) { self.push(SetComponent { target, value }); }

    /// Queues removing `id` from `target`.
    pub fn remove_id(&mut self, target: Entity, id: Entity) { self.push(RemoveComponent { target, id }); }

    /// Queues removing `T` from `target`.
    pub fn remove<T: Component>(&mut self, target: Entity) {
        self.push(RemoveComponentOf::<T> { target, _ph: PhantomData });
    }

    /// Replays every command in order.
    ///
    /// Returns the real handles of the entities created by this buffer,
    /// indexed in the order their temporary handles were issued.
    pub fn commit(self, world: &mut World) -> Vec<Entity> {
        log::trace!("replaying {} commands", self.ops.len());

        let mut temps = Temps { issued: self.temps, resolved: Vec::with_capacity(self.temps.small_int()) };
        for op in self.ops {
            op.run(world, &mut temps);
        }
        temps.resolved
    }
}
