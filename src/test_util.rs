#![allow(missing_docs)]

//! Fixtures shared by unit tests and benches.

use parking_lot::Once;

use crate::Component;

/// Initializes the logger for tests.
pub(crate) fn init() {
    static SET_LOGGER_ONCE: Once = Once::new();
    SET_LOGGER_ONCE.call_once(env_logger::init);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Component)]
#[tessera(tessera_as(crate))]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Component)]
#[tessera(tessera_as(crate))]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Component)]
#[tessera(tessera_as(crate), name = "test::Health")]
pub struct Health(pub u32);

/// A component that owns heap memory.
#[derive(Debug, Default, Clone, PartialEq, Eq, Component)]
#[tessera(tessera_as(crate))]
pub struct Label(pub String);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Component)]
#[tessera(tessera_as(crate), unique)]
pub struct UniqueCounter(pub u32);

#[derive(Debug, Default, Clone, Copy, PartialEq, Component)]
#[tessera(tessera_as(crate), soa)]
pub struct SoaPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A family of distinct components used by benches that vary the number of columns.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Component)]
#[tessera(tessera_as(crate))]
pub struct CompN<const N: usize>(pub i32);

/// Creates an entity carrying `CompN::<1>` through `CompN::<n>`.
pub fn add_with_comps(world: &mut crate::World, n: usize) -> crate::Entity {
    let entity = world.add();
    macro_rules! add_n {
        ($($index:literal)*) => {
            $(
                if $index <= n {
                    world.add_value(entity, CompN::<$index>($index));
                }
            )*
        }
    }
    add_n!(1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16);
    entity
}
