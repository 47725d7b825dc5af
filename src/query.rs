//! Queries select entities by the ids their archetypes hold.
//!
//! A query is a canonical set of [`QueryItem`]s:
//! every [`Op::All`] item must be present,
//! at least one [`Op::Any`] item must be present if there are any,
//! and no [`Op::Not`] item may be present.
//! Items may be wildcard pairs such as `(ChildOf, *)`,
//! and `(Is, X)` also matches entities inheriting from `X` transitively.
//!
//! Building a query sorts its items,
//! so the order in which items were added never changes the result.
//! Matched archetypes are cached per world in [`cache::QueryCache`]
//! and only newly created archetypes are tested on later runs.
//!
//! ```
//! use tessera::{Component, World};
//!
//! #[derive(Debug, Default, Clone, Copy, Component)]
//! struct Speed(f32);
//!
//! let mut world = World::new();
//! let e = world.add();
//! world.add_value(e, Speed(2.0));
//!
//! let mut query = world.query().all_of::<Speed>().build();
//! assert_eq!(world.count(&query, Default::default()), 1);
//!
//! world.each_batch(&mut query, Default::default(), |mut batch| {
//!     for speed in batch.view_mut::<Speed>() {
//!         speed.0 *= 2.0;
//!     }
//! });
//! assert_eq!(world.get::<Speed>(e).map(|speed| speed.0), Some(4.0));
//! ```

use crate::archetype::LookupHash;
use crate::comp::Component;
use crate::entity::Entity;
use crate::world::World;

pub mod cache;
pub(crate) mod iter;
pub use iter::{Batch, Constraint};

#[cfg(test)]
mod tests;

/// How a query item constrains the archetypes it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Op {
    /// The id must be present.
    All,
    /// At least one of the `Any` ids must be present.
    Any,
    /// The id must be absent.
    Not,
}

/// One predicate of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryItem {
    /// The id, possibly a wildcard pair.
    pub id: Entity,
    /// The constraint on `id`.
    pub op: Op,
}

/// Collects query items before canonicalizing them into a [`Query`].
#[must_use = "call build() to create the query"]
pub struct QueryBuilder<'w> {
    world:   &'w mut World,
    items:   Vec<QueryItem>,
    changed: Vec<Entity>,
}

impl<'w> QueryBuilder<'w> {
    fn item(mut self, id: Entity, op: Op) -> Self {
        self.items.push(QueryItem { id, op });
        self
    }

    /// Requires `id`.
    pub fn all(self, id: Entity) -> Self { self.item(id, Op::All) }

    /// Requires at least one of the `any` ids.
    pub fn any(self, id: Entity) -> Self { self.item(id, Op::Any) }

    /// Rejects `id`.
    pub fn no(self, id: Entity) -> Self { self.item(id, Op::Not) }

    /// Requires `T`, registering it if necessary.
    pub fn all_of<T: Component>(self) -> Self {
        let id = self.world.register::<T>();
        self.all(id)
    }

    /// Requires at least one of the `any` ids, including `T`.
    pub fn any_of<T: Component>(self) -> Self {
        let id = self.world.register::<T>();
        self.any(id)
    }

    /// Rejects `T`.
    pub fn no_of<T: Component>(self) -> Self {
        let id = self.world.register::<T>();
        self.no(id)
    }

    /// Only visits chunks in which the column of `id` was written since the previous run.
    ///
    /// Chunks without a column for `id` never pass the filter.
    pub fn changed(mut self, id: Entity) -> Self {
        self.changed.push(id);
        self
    }

    /// Only visits chunks in which `T` was written since the previous run.
    pub fn changed_of<T: Component>(self) -> Self {
        let id = self.world.register::<T>();
        self.changed(id)
    }

    /// Canonicalizes the collected items.
    pub fn build(self) -> Query {
        let Self { mut items, mut changed, .. } = self;
        items.sort_unstable();
        items.dedup();
        changed.sort_unstable();
        changed.dedup();

        let hash = LookupHash::of((&items, &changed));
        Query { items, changed, hash, last_version: None }
    }
}

/// A canonical query.
///
/// Running a query with change filters records the version it observed,
/// so the same `Query` value should be reused across runs.
#[derive(Debug, Clone)]
pub struct Query {
    items:                   Vec<QueryItem>,
    changed:                 Vec<Entity>,
    hash:                    LookupHash,
    pub(crate) last_version: Option<u32>,
}

impl Query {
    /// The sorted, de-duplicated items.
    pub fn items(&self) -> &[QueryItem] { &self.items }

    /// The ids filtered for changes.
    pub fn changed(&self) -> &[Entity] { &self.changed }

    /// The content hash of the query, identical for equivalent queries.
    pub fn lookup_hash(&self) -> LookupHash { self.hash }

    /// Forgets the last observed version, so that every chunk passes the change filter again.
    pub fn reset_changes(&mut self) { self.last_version = None; }
}

impl World {
    /// Starts building a query.
    pub fn query(&mut self) -> QueryBuilder<'_> { QueryBuilder { world: self, items: Vec::new(), changed: Vec::new() } }
}
