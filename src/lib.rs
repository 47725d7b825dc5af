//! An archetype-based, chunked ECS storage engine.
//!
//! # Entities and ids
//! Everything in a world is an [`Entity`]:
//! plain objects, component types, tags, and relationship pairs such as `(ChildOf, parent)`.
//! An entity handle carries a generation,
//! so a stale handle never aliases an entity that later reuses its index.
//!
//! # Archetypes and chunks
//! Entities holding the same set of ids share an [`Archetype`](archetype::Archetype).
//! Their components live in fixed-size [`Chunk`](storage::Chunk)s
//! with one column per component,
//! laid out either as an array of structures or as a structure of arrays.
//! Adding or removing an id moves the row to the neighboring archetype
//! along a cached edge of the archetype graph.
//!
//! # Relationships and deletion
//! Pairs relate two entities.
//! Deleting an entity consults the `(OnDelete, X)` and `(OnDeleteTarget, X)` rules
//! of everything involved, cascading to dependents or refusing the deletion as a whole.
//! Rows are dropped immediately,
//! while indices are only recycled by [`World::update`],
//! which also returns empty chunks and archetypes to the pool after a grace period
//! and incrementally compacts sparse chunks.
//!
//! # Iteration
//! [`Query`] selects archetypes by required, optional and excluded ids,
//! including wildcard pairs and transitive `(Is, X)` matching.
//! Matched rows are visited chunk by chunk through [`Batch`](query::Batch)es,
//! or split into [`ParBatch`]es that run on the rayon thread pool.
//! Structural changes made while iterating are queued in a [`CommandBuffer`].
//!
//! ```
//! use tessera::{entity, pair, Component, World};
//!
//! #[derive(Debug, Default, Clone, Copy, PartialEq, Component)]
//! struct Hp(u32);
//!
//! let mut world = World::new();
//! let parent = world.add();
//! let child = world.add();
//! world.add_value(child, Hp(3));
//! world.add_id(child, pair(entity::CHILD_OF, parent));
//!
//! world.del(parent).expect("nothing refuses the deletion");
//! assert!(!world.valid(child));
//! world.update();
//! ```

#![cfg_attr(not(debug_assertions), deny(missing_docs))]
#![cfg_attr(doc, warn(missing_docs))]

/// Internal re-exports used in macros.
#[doc(hidden)]
pub mod _reexports {
    pub use {static_assertions, xias};
}

pub mod archetype;

pub mod cmd;
pub use cmd::CommandBuffer;

pub mod comp;
pub use comp::Component;
#[doc(inline)]
pub use tessera_codegen::Component;

pub mod entity;
pub use entity::{pair, Entity, Kind, Pair};

pub mod par;
pub use par::ParBatch;

pub mod query;
pub use query::{Constraint, Query, QueryBuilder};

pub mod storage;

#[cfg(any(test, feature = "internal-bench"))]
pub mod test_util;

pub(crate) mod util;

pub mod world;
pub use world::{DeleteError, EntityBuilder, World, WorldConfig};
