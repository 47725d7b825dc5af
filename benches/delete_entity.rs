use criterion::*;
use tessera::{test_util, World};
use xias::Xias;

fn delete_entity(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete entity");

    for num_comps in [0, 1, 2, 4, 8, 16] {
        for log_entities in (0..=8).step_by(4) {
            let entities = 1 << log_entities;
            group.throughput(Throughput::Elements(entities));
            group.bench_with_input(
                BenchmarkId::new(format!("{num_comps} components"), format!("{entities} entities")),
                &entities,
                |b, &entities| {
                    b.iter_batched(
                        || {
                            let mut world = World::new();
                            let mut vec = Vec::with_capacity(entities.small_int());
                            for _ in 0..entities {
                                vec.push(test_util::add_with_comps(&mut world, num_comps));
                            }
                            (world, vec)
                        },
                        |(mut world, vec)| {
                            for entity in vec {
                                world.del(entity).expect("plain entities are deletable");
                            }
                            world.update();
                            world
                        },
                        BatchSize::SmallInput,
                    );
                },
            );
        }
    }
}

criterion_group!(benches, delete_entity);
criterion_main!(benches);
