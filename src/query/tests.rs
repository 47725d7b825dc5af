use std::collections::{HashMap, HashSet};

use super::{Constraint, Query};
use crate::entity::{pair, Entity, WILDCARD};
use crate::test_util::{self, Health, Position, SoaPosition, UniqueCounter, Velocity};
use crate::{World, WorldConfig};

fn sorted(mut entities: Vec<Entity>) -> Vec<Entity> {
    entities.sort();
    entities
}

#[test]
fn test_canonical_hash() {
    test_util::init();

    let mut world = World::new();
    let a = world.add();
    world.add_value(a, Position::default());
    world.add_value(a, Velocity::default());
    let b = world.add();
    world.add_value(b, Position::default());

    let ab = world.query().all_of::<Position>().all_of::<Velocity>().build();
    let ba = world.query().all_of::<Velocity>().all_of::<Position>().all_of::<Velocity>().build();
    assert_eq!(ab.lookup_hash(), ba.lookup_hash());
    assert_eq!(ab.items(), ba.items());

    assert_eq!(world.entities(&ab, Constraint::default()), vec![a]);
    assert_eq!(world.entities(&ba, Constraint::default()), vec![a]);
    assert_eq!(world.query_cache().len(), 1);

    let any = world.query().any_of::<Position>().build();
    assert_ne!(any.lookup_hash(), ab.lookup_hash());
}

#[test]
fn test_positions_survive_delete() {
    test_util::init();

    let mut world = World::new();
    let mut indices = HashMap::new();
    for i in 0..1500 {
        let entity = world.add();
        let value = i as f32;
        world.add_value(entity, Position { x: value, y: value, z: value });
        indices.insert(entity, i);
    }

    let mut query = world.query().all_of::<Position>().build();
    assert_eq!(world.count(&query, Constraint::default()), 1500);

    let mut seen = 0;
    world.each_batch(&mut query, Constraint::default(), |batch| {
        for (&entity, position) in batch.entities().iter().zip(batch.view::<Position>()) {
            let value = seen as f32;
            assert_eq!(*position, Position { x: value, y: value, z: value });
            assert_eq!(indices[&entity], seen);
            seen += 1;
        }
    });
    assert_eq!(seen, 1500);

    let victim = indices.iter().find_map(|(&entity, &i)| (i == 900).then_some(entity)).expect("entity 900 exists");
    world.del(victim).expect("plain entities can be deleted");
    assert_eq!(world.count(&query, Constraint::default()), 1499);

    let mut visited = HashSet::new();
    world.each_batch(&mut query, Constraint::default(), |batch| {
        for (&entity, position) in batch.entities().iter().zip(batch.view::<Position>()) {
            let value = indices[&entity] as f32;
            assert_eq!(*position, Position { x: value, y: value, z: value });
            visited.insert(entity);
        }
    });
    assert_eq!(visited.len(), 1499);
    assert!(!visited.contains(&victim));

    world.update();
    assert_eq!(world.count(&query, Constraint::default()), 1499);
}

#[test]
fn test_any_and_not() {
    test_util::init();

    let mut world = World::new();
    let a = world.add();
    world.add_value(a, Position::default());
    let b = world.add();
    world.add_value(b, Velocity::default());
    let c = world.add();
    world.add_value(c, Position::default());
    world.add_value(c, Velocity::default());
    let d = world.add();
    world.add_value(d, Position::default());
    world.add_value(d, Health(1));

    let moving = world.query().any_of::<Position>().any_of::<Velocity>().no_of::<Health>().build();
    assert_eq!(sorted(world.entities(&moving, Constraint::default())), sorted(vec![a, b, c]));

    let still = world.query().all_of::<Position>().no_of::<Velocity>().no_of::<Health>().build();
    assert_eq!(world.entities(&still, Constraint::default()), vec![a]);

    let healthy = world.query().all_of::<Health>().build();
    assert!(!world.is_empty_query(&healthy, Constraint::default()));
    world.remove::<Health>(d);
    assert!(world.is_empty_query(&healthy, Constraint::default()));
}

#[test]
fn test_wildcard_items() {
    test_util::init();

    let mut world = World::new();
    let eats = world.add();
    let apple = world.add();
    let carrot = world.add();

    let e1 = world.add();
    world.add_id(e1, pair(eats, apple));
    let e2 = world.add();
    world.add_id(e2, pair(eats, carrot));
    let e3 = world.add();
    world.add_id(e3, pair(apple, carrot));

    let eaters = world.query().all(pair(eats, WILDCARD)).build();
    assert_eq!(sorted(world.entities(&eaters, Constraint::default())), sorted(vec![e1, e2]));

    let apple_eaters = world.query().all(pair(WILDCARD, apple)).build();
    assert_eq!(world.entities(&apple_eaters, Constraint::default()), vec![e1]);

    let to_carrot = world.query().all(pair(WILDCARD, carrot)).no(pair(eats, WILDCARD)).build();
    assert_eq!(world.entities(&to_carrot, Constraint::default()), vec![e3]);
}

#[test]
fn test_is_matches_transitively() {
    test_util::init();

    let mut world = World::new();
    let animal = world.add();
    let mammal = world.add();
    world.as_(mammal, animal);
    let dog = world.add();
    world.as_(dog, mammal);
    let fish = world.add();
    let swimmer = world.add();
    world.as_(fish, swimmer);

    let animals = world.query().all(pair(crate::entity::IS, animal)).build();
    assert_eq!(sorted(world.entities(&animals, Constraint::default())), sorted(vec![mammal, dog]));

    // fish keeps its archetype; only the inheritance graph changes
    world.as_(swimmer, animal);
    assert_eq!(sorted(world.entities(&animals, Constraint::default())), sorted(vec![mammal, dog, fish, swimmer]));
}

#[test]
fn test_constraints() {
    test_util::init();

    let mut world = World::new();
    let entities: Vec<Entity> = (0..10)
        .map(|_| {
            let entity = world.add();
            world.add_value(entity, Position::default());
            entity
        })
        .collect();
    let query = world.query().all_of::<Position>().build();

    for &entity in &entities[..3] {
        world.enable(entity, false);
    }
    assert!(!world.enabled(entities[0]));
    assert_eq!(world.count(&query, Constraint::EnabledOnly), 7);
    assert_eq!(world.count(&query, Constraint::DisabledOnly), 3);
    assert_eq!(world.count(&query, Constraint::AcceptAll), 10);
    assert_eq!(sorted(world.entities(&query, Constraint::DisabledOnly)), sorted(entities[..3].to_vec()));

    for &entity in &entities[..3] {
        world.enable(entity, true);
    }
    assert_eq!(world.count(&query, Constraint::EnabledOnly), 10);
    assert_eq!(world.count(&query, Constraint::AcceptAll), 10);
}

#[test]
fn test_change_filter() {
    test_util::init();

    let mut world = World::new();
    let entities: Vec<Entity> = (0..5)
        .map(|_| {
            let entity = world.add();
            world.add_value(entity, Position::default());
            entity
        })
        .collect();

    let mut query = world.query().all_of::<Position>().changed_of::<Position>().build();
    let visit = |world: &mut World, query: &mut super::Query| {
        let mut rows = 0;
        world.each_batch(query, Constraint::default(), |batch| rows += batch.len());
        rows
    };

    assert_eq!(visit(&mut world, &mut query), 5);
    assert_eq!(visit(&mut world, &mut query), 0);

    world.set_silent(entities[1], Position { x: 1.0, y: 0.0, z: 0.0 });
    assert_eq!(visit(&mut world, &mut query), 0);

    world.set(entities[2], Position { x: 2.0, y: 0.0, z: 0.0 });
    assert_eq!(visit(&mut world, &mut query), 5);
    assert_eq!(visit(&mut world, &mut query), 0);

    // change filters never affect counting
    assert_eq!(world.count(&query, Constraint::default()), 5);

    query.reset_changes();
    assert_eq!(visit(&mut world, &mut query), 5);
}

#[test]
fn test_colliding_hashes_keep_separate_matches() {
    test_util::init();

    let mut world = World::new();
    let a = world.add();
    world.add_value(a, Position::default());
    let b = world.add();
    world.add_value(b, Velocity::default());

    let positions = world.query().all_of::<Position>().build();
    let velocities = world.query().all_of::<Velocity>().build();
    let colliding = Query { hash: positions.lookup_hash(), ..velocities };

    assert_eq!(world.entities(&positions, Constraint::default()), vec![a]);
    assert_eq!(world.entities(&colliding, Constraint::default()), vec![b]);
    assert_eq!(world.query_cache().len(), 2);
    assert_eq!(world.query_cache().get(&colliding).expect("cached").matched().len(), 1);
}

#[test]
fn test_cache_tracks_archetypes() {
    test_util::init();

    let mut world = World::with_config(WorldConfig { archetype_grace_ticks: 0, ..WorldConfig::default() });
    let a = world.add();
    world.add_value(a, Position::default());

    let query = world.query().all_of::<Position>().build();
    assert_eq!(world.count(&query, Constraint::default()), 1);
    let matched = |world: &World| world.query_cache().get(&query).expect("cached").matched().len();
    assert_eq!(matched(&world), 1);

    let b = world.add();
    world.add_value(b, Position::default());
    world.add_value(b, Velocity::default());
    assert_eq!(world.count(&query, Constraint::default()), 2);
    assert_eq!(matched(&world), 2);

    world.del(b).expect("plain entities can be deleted");
    world.update();
    assert_eq!(matched(&world), 1);
    assert_eq!(world.count(&query, Constraint::default()), 1);
}

#[test]
fn test_batch_views() {
    test_util::init();

    let mut world = World::new();
    let e = world.add();
    world.add_value(e, Position { x: 1.0, y: 2.0, z: 3.0 });
    world.add_value(e, Velocity { x: 1.0, y: 1.0, z: 1.0 });
    world.add_value(e, UniqueCounter(0));

    let mut query = world.query().all_of::<Position>().all_of::<Velocity>().build();
    world.each_batch(&mut query, Constraint::default(), |mut batch| {
        assert!(batch.has::<UniqueCounter>());
        assert!(!batch.has::<Health>());

        let (positions, velocities) = batch.view_mut_pair::<Position, Velocity>();
        for (position, velocity) in positions.iter_mut().zip(velocities.iter()) {
            position.x += velocity.x;
            position.y += velocity.y;
            position.z += velocity.z;
        }
        batch.unique_mut::<UniqueCounter>().0 += 1;
    });

    assert_eq!(world.get::<Position>(e), Some(&Position { x: 2.0, y: 3.0, z: 4.0 }));
    assert_eq!(world.get::<UniqueCounter>(e), Some(&UniqueCounter(1)));
}

#[test]
fn test_soa_batch() {
    test_util::init();

    let mut world = World::new();
    let entities: Vec<Entity> = (0..4)
        .map(|i| {
            let entity = world.add();
            world.add_value(entity, SoaPosition { x: i as f32, y: 0.0, z: 0.0 });
            entity
        })
        .collect();

    let mut query = world.query().all_of::<SoaPosition>().build();
    world.each_batch(&mut query, Constraint::default(), |mut batch| {
        let xs: Vec<f32> = batch.soa::<SoaPosition>().field::<f32>(0).to_vec();
        let mut soa = batch.soa_mut::<SoaPosition>();
        for (i, x) in xs.into_iter().enumerate() {
            soa.set(i, SoaPosition { x, y: x * 2.0, z: 0.0 });
        }
    });

    for (i, &entity) in entities.iter().enumerate() {
        let x = i as f32;
        assert_eq!(world.read::<SoaPosition>(entity), Some(SoaPosition { x, y: x * 2.0, z: 0.0 }));
    }
}

#[test]
#[should_panic = "cannot borrow the column"]
fn test_view_mut_pair_same_column() {
    let mut world = World::new();
    let e = world.add();
    world.add_value(e, Position::default());

    let mut query = world.query().all_of::<Position>().build();
    world.each_batch(&mut query, Constraint::default(), |mut batch| {
        let _ = batch.view_mut_pair::<Position, Position>();
    });
}

#[test]
fn test_change_filter_across_version_wrap() {
    test_util::init();

    let mut world = World::new();
    world.version = u32::MAX - 20;
    let a = world.add();
    world.add_value(a, Health(1));

    let mut query = world.query().all_of::<Health>().changed_of::<Health>().build();
    let mut seen = Vec::new();
    world.each_entity(&mut query, Constraint::default(), |entity| seen.push(entity));
    assert_eq!(seen, vec![a]);

    world.version = u32::MAX;
    world.set(a, Health(2));
    seen.clear();
    world.each_entity(&mut query, Constraint::default(), |entity| seen.push(entity));
    assert_eq!(seen, vec![a]);

    seen.clear();
    world.each_entity(&mut query, Constraint::default(), |entity| seen.push(entity));
    assert!(seen.is_empty());
}
