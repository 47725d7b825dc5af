use std::time::Duration;

use criterion::*;
use rand::Rng;
use tessera::{Component, Constraint, World};

#[derive(Debug, Default, Clone, Copy, Component)]
struct Position([f64; 3]);
#[derive(Debug, Default, Clone, Copy, Component)]
struct Velocity([f64; 3]);

#[derive(Debug, Default, Clone, Copy, Component)]
#[tessera(soa)]
struct SoaPosition {
    x: f64,
    y: f64,
    z: f64,
}
#[derive(Debug, Default, Clone, Copy, Component)]
#[tessera(soa)]
struct SoaVelocity {
    x: f64,
    y: f64,
    z: f64,
}

fn random_vector(rng: &mut impl Rng) -> [f64; 3] {
    [rng.gen_range(-65536.0..=65536.0), rng.gen_range(-65536.0..=65536.0), rng.gen_range(-65536.0..=65536.0)]
}

fn populate_aos(num_entities: u64) -> World {
    let mut world = World::new();
    let mut rng = rand::thread_rng();
    for _ in 0..num_entities {
        let entity = world.add();
        world.add_value(entity, Position(random_vector(&mut rng)));
        world.add_value(entity, Velocity(random_vector(&mut rng)));
    }
    world
}

fn iter_entity_add_aos(c: &mut Criterion) {
    let mut group = c.benchmark_group("iter entity (a += b)");
    group.measurement_time(Duration::from_secs(10));

    for log_entities in (4..=16).step_by(4) {
        let num_entities = 1 << log_entities;
        group.throughput(Throughput::Elements(num_entities));
        group.bench_with_input(BenchmarkId::new("aos/serial", format!("{num_entities} entities")), &num_entities, |b, &num_entities| {
            let mut world = populate_aos(num_entities);
            let mut query = world.query().all_of::<Position>().all_of::<Velocity>().build();
            b.iter(|| {
                world.each_batch(&mut query, Constraint::default(), |mut batch| {
                    let (p, v) = batch.view_mut_pair::<Position, Velocity>();
                    for (p, v) in p.iter_mut().zip(v.iter()) {
                        for i in 0..3 {
                            p.0[i] += v.0[i];
                        }
                    }
                });
            })
        });
        group.bench_with_input(BenchmarkId::new("aos/parallel", format!("{num_entities} entities")), &num_entities, |b, &num_entities| {
            let mut world = populate_aos(num_entities);
            let mut query = world.query().all_of::<Position>().all_of::<Velocity>().build();
            b.iter(|| {
                world.par_each_batch(&mut query, Constraint::default(), 256, |mut batch| {
                    let (p, v) = batch.view_mut_pair::<Position, Velocity>();
                    for (p, v) in p.iter_mut().zip(v.iter()) {
                        for i in 0..3 {
                            p.0[i] += v.0[i];
                        }
                    }
                });
            })
        });
    }
}

fn iter_entity_add_soa(c: &mut Criterion) {
    let mut group = c.benchmark_group("iter entity (a += b)");
    group.measurement_time(Duration::from_secs(10));

    for log_entities in (4..=16).step_by(4) {
        let num_entities = 1 << log_entities;
        group.throughput(Throughput::Elements(num_entities));
        group.bench_with_input(BenchmarkId::new("soa/serial", format!("{num_entities} entities")), &num_entities, |b, &num_entities| {
            let mut world = World::new();
            let mut rng = rand::thread_rng();
            for _ in 0..num_entities {
                let entity = world.add();
                let [x, y, z] = random_vector(&mut rng);
                world.add_value(entity, SoaPosition { x, y, z });
                let [x, y, z] = random_vector(&mut rng);
                world.add_value(entity, SoaVelocity { x, y, z });
            }
            let mut query = world.query().all_of::<SoaPosition>().all_of::<SoaVelocity>().build();
            b.iter(|| {
                world.each_batch(&mut query, Constraint::default(), |mut batch| {
                    let velocity: Vec<Vec<f64>> =
                        (0..3).map(|field| batch.soa::<SoaVelocity>().field::<f64>(field).to_vec()).collect();
                    let mut position = batch.soa_mut::<SoaPosition>();
                    for (field, velocity) in velocity.iter().enumerate() {
                        for (p, v) in position.field_mut::<f64>(field).iter_mut().zip(velocity) {
                            *p += v;
                        }
                    }
                });
            })
        });
    }
}

criterion_group!(aos, iter_entity_add_aos);
criterion_group!(soa, iter_entity_add_soa);
criterion_main!(aos, soa);
