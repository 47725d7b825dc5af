use rand::seq::SliceRandom;

use super::{DeleteError, World, WorldConfig};
use crate::archetype::ArchetypeId;
use crate::entity::{self, pair, Entity};
use crate::query::Constraint;
use crate::test_util::{self, Health, Label, Position, SoaPosition, UniqueCounter, Velocity};

#[test]
fn test_builtin_entities() {
    test_util::init();

    let world = World::new();
    for &(entity, name) in entity::CORE_ENTITIES {
        assert!(world.valid(entity));
        assert_eq!(world.by_name(name), Some(entity));
        assert!(world.has(entity, entity::CORE));
        assert!(world.has(entity, pair(entity::ON_DELETE, entity::ERROR)));
    }
    assert!(world.has(entity::CHILD_OF, pair(entity::ON_DELETE_TARGET, entity::DELETE)));
}

#[test]
fn test_generation_bumps_on_reuse() {
    test_util::init();

    let mut world = World::new();
    let before = world.size();
    let entity = world.add();
    assert!(world.valid(entity));
    assert_eq!(world.entity(entity.id()), entity);
    assert_eq!(world.size(), before + 1);

    world.del(entity).expect("plain entities are deletable");
    assert!(!world.valid(entity));
    assert_eq!(world.entity(entity.id()), Entity::BAD);
    assert_eq!(world.size(), before);
    assert_eq!(world.pending_deletes(), 1);

    world.update();
    assert_eq!(world.pending_deletes(), 0);

    let reused = world.add();
    assert_eq!(reused.id(), entity.id());
    assert!(reused.gen() > entity.gen());
    assert!(world.valid(reused));
    assert!(!world.valid(entity));
}

#[test]
#[should_panic = "is not a valid entity"]
fn test_del_stale_handle() {
    test_util::init();

    let mut world = World::new();
    let entity = world.add();
    world.del(entity).expect("plain entities are deletable");
    let _ = world.del(entity);
}

#[test]
fn test_schema_is_order_independent() {
    test_util::init();

    let mut world = World::new();
    let mut tags: Vec<Entity> = (0..6).map(|_| world.add()).collect();

    let mut archetypes = Vec::new();
    for _ in 0..8 {
        tags.shuffle(&mut rand::thread_rng());
        let entity = world.add();
        let mut builder = world.bulk(entity);
        for &tag in &tags {
            builder.add(tag);
        }
        builder.commit();
        archetypes.push(world.archetype_of(entity).id());
    }

    assert!(archetypes.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_add_remove_round_trip() {
    test_util::init();

    let mut world = World::new();
    let entity = world.add();
    assert_eq!(world.archetype_of(entity).id(), ArchetypeId::ROOT);

    world.add_value(entity, Position { x: 1.0, y: 2.0, z: 3.0 });
    world.add_value(entity, Health(4));
    let full = world.archetype_of(entity).id();

    world.remove::<Position>(entity);
    assert_eq!(world.get::<Health>(entity), Some(&Health(4)));
    assert!(world.get::<Position>(entity).is_none());

    world.add_value(entity, Position { x: 5.0, y: 6.0, z: 7.0 });
    assert_eq!(world.archetype_of(entity).id(), full);
    assert_eq!(world.get::<Position>(entity), Some(&Position { x: 5.0, y: 6.0, z: 7.0 }));

    world.remove::<Position>(entity);
    world.remove::<Health>(entity);
    assert_eq!(world.archetype_of(entity).id(), ArchetypeId::ROOT);
}

#[test]
fn test_bulk_moves_once() {
    test_util::init();

    let mut world = World::new();
    let (a, b) = (world.add(), world.add());
    let entity = world.add();
    world.bulk(entity).add(a).add(b).del(a).commit();

    assert!(!world.has(entity, a));
    assert!(world.has(entity, b));
    assert_eq!(world.archetype_of(entity).ids(), &[b]);
}

#[test]
fn test_builder_commits_repeatedly() {
    test_util::init();

    let mut world = World::new();
    let (a, b) = (world.add(), world.add());
    let entity = world.add();

    let mut builder = world.bulk(entity);
    builder.add(a).commit();
    builder.add(b).del(a).commit();
    builder.commit();

    assert!(!world.has(entity, a));
    assert!(world.has(entity, b));
    assert_eq!(world.archetype_of(entity).ids(), &[b]);

    world.add_id(entity, a);
    world.remove_id(entity, b);
    assert_eq!(world.archetype_of(entity).ids(), &[a]);
}

#[test]
#[should_panic = "cannot add the wildcard"]
fn test_add_wildcard() {
    test_util::init();

    let mut world = World::new();
    let rel = world.add();
    let entity = world.add();
    world.add_id(entity, pair(rel, entity::WILDCARD));
}

#[test]
fn test_enable_disable() {
    test_util::init();

    let mut world = World::new();
    let entities: Vec<Entity> = (0..3)
        .map(|i| {
            let entity = world.add();
            world.add_value(entity, Health(i));
            entity
        })
        .collect();

    world.enable(entities[1], false);
    assert!(world.enabled(entities[0]));
    assert!(!world.enabled(entities[1]));

    let query = world.query().all_of::<Health>().build();
    assert_eq!(world.count(&query, Constraint::EnabledOnly), 2);
    assert_eq!(world.count(&query, Constraint::DisabledOnly), 1);
    assert_eq!(world.count(&query, Constraint::AcceptAll), 3);
    assert_eq!(world.entities(&query, Constraint::DisabledOnly), vec![entities[1]]);

    for (i, &entity) in entities.iter().enumerate() {
        assert_eq!(world.get::<Health>(entity), Some(&Health(i as u32)));
    }

    // disabled entities stay disabled across moves
    world.add_value(entities[1], Velocity::default());
    assert!(!world.enabled(entities[1]));
    assert_eq!(world.get::<Health>(entities[1]), Some(&Health(1)));

    world.enable(entities[1], true);
    assert!(world.enabled(entities[1]));
    assert_eq!(world.count(&query, Constraint::EnabledOnly), 3);
}

#[test]
fn test_depends_on() {
    test_util::init();

    let mut world = World::new();
    let walker = world.add();
    let legs = world.add();
    world.add_id(walker, pair(entity::DEPENDS_ON, legs));

    let entity = world.add();
    world.add_id(entity, walker);
    assert!(world.has(entity, walker));
    assert!(world.has(entity, legs));

    world.remove_id(entity, legs);
    assert!(world.has(entity, legs), "dependencies cannot be removed while depended on");

    world.remove_id(entity, walker);
    world.remove_id(entity, legs);
    assert!(!world.has(entity, walker));
    assert!(!world.has(entity, legs));
}

#[test]
fn test_cant_combine() {
    test_util::init();

    let mut world = World::new();
    let weak = world.add();
    let strong = world.add();
    world.add_id(weak, pair(entity::CANT_COMBINE, strong));

    let first = world.add();
    world.add_id(first, weak);
    world.add_id(first, strong);
    assert!(world.has(first, weak));
    assert!(!world.has(first, strong));

    let second = world.add();
    world.add_id(second, strong);
    world.add_id(second, weak);
    assert!(world.has(second, strong));
    assert!(!world.has(second, weak));
}

#[test]
fn test_is_transitive() {
    test_util::init();

    let mut world = World::new();
    let animal = world.add();
    let mammal = world.add();
    let dog = world.add();
    world.as_(mammal, animal);
    world.as_(dog, mammal);

    assert!(world.is(dog, animal));
    assert!(world.is(dog, dog));
    assert!(world.in_(dog, animal));
    assert!(!world.in_(dog, dog));
    assert!(!world.is(animal, dog));
}

#[test]
fn test_child_of_cascades() {
    test_util::init();

    let mut world = World::new();
    let parent = world.add();
    let child = world.add();
    let grandchild = world.add();
    let bystander = world.add();
    world.add_id(child, pair(entity::CHILD_OF, parent));
    world.add_id(grandchild, pair(entity::CHILD_OF, child));
    world.add_value(bystander, Label("bystander".to_string()));

    assert_eq!(world.target(grandchild, entity::CHILD_OF), child);
    assert_eq!(world.relation(child, parent), entity::CHILD_OF);

    world.del(parent).expect("no rule refuses");
    assert!(!world.valid(parent));
    assert!(!world.valid(child));
    assert!(!world.valid(grandchild));
    assert!(world.valid(bystander));
    assert_eq!(world.get::<Label>(bystander), Some(&Label("bystander".to_string())));

    world.update();
    assert!(!world.has_id(pair(entity::CHILD_OF, entity::WILDCARD)));
    assert_eq!(world.pending_deletes(), 0);
}

#[test]
fn test_on_delete_target_delete() {
    test_util::init();

    let mut world = World::new();
    let owned_by = world.add();
    world.add_id(owned_by, pair(entity::ON_DELETE_TARGET, entity::DELETE));

    let person = world.add();
    let car = world.add();
    let boat = world.add();
    world.add_id(car, pair(owned_by, person));
    world.add_value(boat, Health(3));

    world.del(person).expect("no rule refuses");
    assert!(!world.valid(car));
    assert!(world.valid(boat));
    assert!(world.valid(owned_by));
}

#[test]
fn test_on_delete_delete_holders() {
    test_util::init();

    let mut world = World::new();
    let poison = world.add();
    world.add_id(poison, pair(entity::ON_DELETE, entity::DELETE));

    let victim = world.add();
    let survivor = world.add();
    world.add_id(victim, poison);
    world.add_value(survivor, Health(1));

    world.del(poison).expect("no rule refuses");
    assert!(!world.valid(victim));
    assert!(world.valid(survivor));
}

#[test]
fn test_error_rules_refuse() {
    test_util::init();

    let mut world = World::new();

    assert_eq!(world.del(entity::CHILD_OF), Err(DeleteError::Protected { entity: entity::CHILD_OF }));
    let position = world.register::<Position>();
    assert_eq!(world.del(position), Err(DeleteError::Protected { entity: position }));
    assert!(world.valid(position));

    // a protected entity deep in a cascade stops the whole cascade
    let parent = world.add();
    let child = world.add();
    world.add_id(child, pair(entity::CHILD_OF, parent));
    world.add_id(child, pair(entity::ON_DELETE, entity::ERROR));
    world.add_value(child, Health(9));

    assert_eq!(world.del(parent), Err(DeleteError::Protected { entity: child }));
    assert!(world.valid(parent));
    assert!(world.valid(child));
    assert!(world.has(child, pair(entity::CHILD_OF, parent)));
    assert_eq!(world.get::<Health>(child), Some(&Health(9)));
    assert_eq!(world.pending_deletes(), 0);

    let anchored_to = world.add();
    world.add_id(anchored_to, pair(entity::ON_DELETE_TARGET, entity::ERROR));
    let anchor = world.add();
    let ship = world.add();
    world.add_id(ship, pair(anchored_to, anchor));
    assert_eq!(world.del(anchor), Err(DeleteError::ProtectedTarget { entity: anchor, relation: anchored_to }));
    assert!(world.valid(anchor));
}

#[test]
fn test_removed_pairs_stop_applying_target_rules() {
    test_util::init();

    let mut world = World::new();
    let anchored_to = world.add();
    world.add_id(anchored_to, pair(entity::ON_DELETE_TARGET, entity::ERROR));
    let anchor = world.add();
    let ship = world.add();
    world.add_id(ship, pair(anchored_to, anchor));
    world.remove_id(ship, pair(anchored_to, anchor));

    // the emptied archetype is still in its grace period
    assert!(world.relation_targets(anchored_to).any(|target| target == anchor));
    world.del(anchor).expect("no entity holds the pair anymore");
    assert!(!world.valid(anchor));
    assert!(world.valid(ship));

    let docked_at = world.add();
    world.add_id(docked_at, pair(entity::ON_DELETE_TARGET, entity::DELETE));
    let dock = world.add();
    let boat = world.add();
    world.add_value(boat, Health(4));
    world.add_id(boat, pair(docked_at, dock));
    world.remove_id(boat, pair(docked_at, dock));

    world.del(dock).expect("no rule refuses");
    assert!(world.valid(boat));
    assert_eq!(world.get::<Health>(boat), Some(&Health(4)));
}

#[test]
fn test_error_rules_refuse_pair_deletion() {
    test_util::init();

    let mut world = World::new();
    let anchored_to = world.add();
    world.add_id(anchored_to, pair(entity::ON_DELETE_TARGET, entity::ERROR));
    let likes = world.add();
    let anchor = world.add();
    let ship = world.add();
    world.add_id(ship, pair(anchored_to, anchor));
    world.add_id(ship, pair(likes, anchor));

    let refused = Err(DeleteError::ProtectedPair { pair: pair(anchored_to, anchor), relation: anchored_to });
    assert_eq!(world.del(pair(anchored_to, anchor)), refused);
    assert_eq!(world.del(pair(anchored_to, entity::WILDCARD)), refused);
    assert_eq!(world.del(pair(entity::WILDCARD, entity::WILDCARD)), refused);
    assert!(world.has(ship, pair(anchored_to, anchor)));
    assert!(world.has(ship, pair(likes, anchor)));

    world.del(pair(likes, anchor)).expect("likes has no delete rules");
    assert!(!world.has(ship, pair(likes, anchor)));
    assert!(world.has(ship, pair(anchored_to, anchor)));
}

#[test]
fn test_default_rule_strips_pairs() {
    test_util::init();

    let mut world = World::new();
    let likes = world.add();
    let apple = world.add();
    let pear = world.add();
    let fan = world.add();
    world.add_id(fan, pair(likes, apple));
    world.add_id(fan, pair(likes, pear));
    world.add_value(fan, Position { x: 1.0, y: 1.0, z: 1.0 });

    world.del(apple).expect("no rule refuses");
    assert!(world.valid(fan));
    assert!(!world.has(fan, pair(likes, apple)));
    assert!(world.has(fan, pair(likes, pear)));
    assert_eq!(world.get::<Position>(fan), Some(&Position { x: 1.0, y: 1.0, z: 1.0 }));

    world.del(likes).expect("no rule refuses");
    assert!(world.valid(fan));
    assert!(!world.has(fan, pair(likes, pear)));
    assert!(world.valid(pear));

    world.update();
    assert!(world.relation_targets(likes).next().is_none());
}

#[test]
fn test_pair_deletion() {
    test_util::init();

    let mut world = World::new();
    let likes = world.add();
    let hates = world.add();
    let (a, b) = (world.add(), world.add());
    let entity = world.add();
    world.bulk(entity).add(pair(likes, a)).add(pair(likes, b)).add(pair(hates, a)).commit();

    world.del(pair(likes, entity::WILDCARD)).expect("pair deletion never fails");
    assert!(!world.has(entity, pair(likes, entity::WILDCARD)));
    assert!(world.has(entity, pair(hates, a)));
    assert!(world.valid(likes));
    assert!(world.valid(a));

    world.del(pair(hates, a)).expect("pair deletion never fails");
    assert!(!world.has(entity, pair(entity::WILDCARD, entity::WILDCARD)));
}

#[test]
fn test_relation_directories() {
    test_util::init();

    let mut world = World::new();
    let likes = world.add();
    let (a, b) = (world.add(), world.add());
    let entity = world.add();
    world.bulk(entity).add(pair(likes, a)).add(pair(likes, b)).commit();

    assert!(world.has_id(pair(likes, a)));
    assert!(world.has_id(pair(likes, entity::WILDCARD)));
    assert!(world.has_id(pair(entity::WILDCARD, b)));
    assert!(world.has(entity, pair(entity::WILDCARD, a)));

    let mut targets: Vec<Entity> = world.relation_targets(likes).collect();
    targets.sort();
    assert_eq!(targets, vec![a, b]);
    assert_eq!(world.target_relations(a).collect::<Vec<_>>(), vec![likes]);

    let mut targets: Vec<Entity> = world.targets(entity, likes).collect();
    targets.sort();
    assert_eq!(targets, vec![a, b]);
    assert_eq!(world.relations(entity, b).collect::<Vec<_>>(), vec![likes]);
    assert_eq!(world.target(entity, entity::IS), Entity::BAD);

    assert_eq!(world.pair_rel(pair(likes, b)), likes);
    assert_eq!(world.pair_tgt(pair(likes, b)), b);
    assert!(world.valid(pair(likes, b)));
    assert_eq!(world.pair_rel(likes), Entity::BAD);
}

#[test]
fn test_names() {
    test_util::init();

    let mut world = World::new();
    let hero = world.add();
    world.name(hero, "hero");
    assert_eq!(world.by_name("hero"), Some(hero));
    assert_eq!(world.get_name(hero), Some("hero"));

    world.name(hero, "legend");
    assert_eq!(world.by_name("hero"), None);
    assert_eq!(world.by_name("legend"), Some(hero));

    let position = world.register::<Position>();
    assert_eq!(world.get_name(position), Some(std::any::type_name::<Position>()));
    let health = world.register::<Health>();
    assert_eq!(world.by_name("test::Health"), Some(health));

    world.del(hero).expect("plain entities are deletable");
    assert_eq!(world.by_name("legend"), None);
}

#[test]
#[should_panic = "is already used"]
fn test_duplicate_name() {
    test_util::init();

    let mut world = World::new();
    let (a, b) = (world.add(), world.add());
    world.name(a, "twin");
    world.name(b, "twin");
}

#[test]
fn test_unique_shared_by_chunk() {
    test_util::init();

    let mut world = World::new();
    let first = world.add();
    let second = world.add();
    world.add_value(first, UniqueCounter(5));
    let counter = world.comp_id::<UniqueCounter>().expect("registered");
    assert_eq!(counter.kind(), entity::Kind::Unique);

    world.add_id(second, counter);
    assert_eq!(world.get::<UniqueCounter>(second), Some(&UniqueCounter(5)));

    world.set(second, UniqueCounter(7));
    assert_eq!(world.get::<UniqueCounter>(first), Some(&UniqueCounter(7)));
    assert_eq!(world.read::<UniqueCounter>(first), Some(UniqueCounter(7)));
}

#[test]
fn test_soa_read_set() {
    test_util::init();

    let mut world = World::new();
    let entity = world.add();
    world.add_value(entity, SoaPosition { x: 1.0, y: 2.0, z: 3.0 });
    world.add_value(entity, Health(1));
    assert_eq!(world.read::<SoaPosition>(entity), Some(SoaPosition { x: 1.0, y: 2.0, z: 3.0 }));

    world.set(entity, SoaPosition { x: 4.0, y: 5.0, z: 6.0 });
    world.remove::<Health>(entity);
    assert_eq!(world.read::<SoaPosition>(entity), Some(SoaPosition { x: 4.0, y: 5.0, z: 6.0 }));
}

#[test]
fn test_copy_and_clone_archetype() {
    test_util::init();

    let mut world = World::new();
    let source = world.add();
    world.add_value(source, Label("original".to_string()));
    world.add_value(source, Health(2));

    let copies = world.copy_n(source, 3);
    world.set(source, Label("changed".to_string()));
    for copy in copies {
        assert_eq!(world.get::<Label>(copy), Some(&Label("original".to_string())));
        assert_eq!(world.get::<Health>(copy), Some(&Health(2)));
    }

    let blank = world.add_from_archetype_of(source);
    assert_eq!(world.archetype_of(blank).id(), world.archetype_of(source).id());
    assert_eq!(world.get::<Label>(blank), Some(&Label::default()));
}

#[test]
fn test_copy_inherits_rules() {
    test_util::init();

    let mut world = World::new();
    let protected = world.add();
    world.add_id(protected, pair(entity::ON_DELETE, entity::ERROR));
    let copy = world.copy(protected);
    assert_eq!(world.del(copy), Err(DeleteError::Protected { entity: copy }));
}

#[test]
fn test_update_releases_empty_archetypes() {
    test_util::init();

    let mut world =
        World::with_config(WorldConfig { chunk_grace_ticks: 1, archetype_grace_ticks: 1, ..Default::default() });
    let entity = world.add();
    world.add_value(entity, Health(1));
    let archetype = world.archetype_of(entity).id();

    world.remove::<Health>(entity);
    assert!(world.archetypes().any(|arch| arch.id() == archetype && arch.is_dying()));

    for _ in 0..3 {
        world.update();
    }
    assert!(world.archetypes().all(|arch| arch.id() != archetype));

    // the released schema is recreated on demand
    world.add_value(entity, Health(2));
    assert_eq!(world.get::<Health>(entity), Some(&Health(2)));
}

#[test]
fn test_revived_archetype_survives() {
    test_util::init();

    let mut world =
        World::with_config(WorldConfig { chunk_grace_ticks: 1, archetype_grace_ticks: 1, ..Default::default() });
    let entity = world.add();
    world.add_value(entity, Health(1));
    let archetype = world.archetype_of(entity).id();

    world.remove::<Health>(entity);
    world.update();
    world.add_value(entity, Health(2));
    for _ in 0..3 {
        world.update();
    }
    assert_eq!(world.archetype_of(entity).id(), archetype);
    assert!(!world.archetype_of(entity).is_dying());
}

#[test]
fn test_cleanup_releases_everything() {
    test_util::init();

    let mut world = World::new();
    let mut entities = Vec::new();
    world.add_n(300, |entity| entities.push(entity));
    for &entity in &entities {
        world.add_value(entity, Position::default());
    }
    let archetype = world.archetype_of(entities[0]).id();
    for entity in entities {
        world.del(entity).expect("plain entities are deletable");
    }

    world.cleanup();
    assert_eq!(world.pending_deletes(), 0);
    assert!(world.archetypes().all(|arch| arch.id() != archetype));
    assert_eq!(world.pool.cached(), 0);
}

#[test]
fn test_defrag_compacts_rows() {
    test_util::init();

    let mut world = World::with_config(WorldConfig { defrag_entities_per_tick: 1000, ..Default::default() });
    let mut entities = Vec::new();
    for i in 0..2000 {
        let entity = world.add();
        world.add_value(entity, Health(i));
        entities.push(entity);
    }
    let archetype = world.archetype_of(entities[0]).id();
    let chunks_before = world.archetype(archetype).chunks().len();
    assert!(chunks_before > 1);

    // delete every other entity to leave holes in every chunk
    for (i, &entity) in entities.iter().enumerate() {
        if i % 2 == 0 {
            world.del(entity).expect("plain entities are deletable");
        }
    }
    for _ in 0..5 {
        world.update();
    }

    let live: Vec<Entity> = entities.iter().copied().filter(|&entity| world.valid(entity)).collect();
    assert_eq!(live.len(), 1000);
    for &entity in &live {
        let index = entities.iter().position(|&e| e == entity).expect("from this list");
        assert_eq!(world.get::<Health>(entity), Some(&Health(index as u32)));
    }
    let used = world.archetype(archetype).chunks().iter().filter(|chunk| !chunk.is_empty()).count();
    assert!(used < chunks_before);
}

#[test]
fn test_raw_components() {
    test_util::init();

    let mut world = World::new();
    let raw = world.register_raw("raw::Bytes", 8, 4, entity::Kind::Generic);
    let tag = world.register_raw("raw::Tag", 0, 1, entity::Kind::Generic);
    assert_eq!(world.by_name("raw::Bytes"), Some(raw));
    assert!(world.desc(raw).is_some_and(|desc| desc.is_sized()));
    assert!(world.desc(tag).is_some_and(|desc| !desc.is_sized()));

    let entity = world.add();
    world.bulk(entity).add(raw).add(tag).commit();
    assert!(world.desc(pair(tag, entity)).is_some_and(|desc| desc.name == "raw::Tag"));
    let location = world.location(entity);
    let chunk = world.archetype(location.archetype).chunk(location.chunk);
    assert_eq!(chunk.bytes(raw, location.row).map(<[u8]>::len), Some(8));
    assert!(chunk.bytes(tag, location.row).is_none());
}
