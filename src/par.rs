//! Parallel iteration over the rows matched by a query.
//!
//! [`World::par_batches`] locks every matched chunk
//! and cuts its selected rows into disjoint [`ParBatch`]es,
//! which can be processed on any thread.
//! Each batch may only write its own rows,
//! so batches of the same chunk never alias.

use std::ops::Range;

use rayon::prelude::{IntoParallelIterator, ParallelIterator};

use crate::archetype::ArchetypeId;
use crate::comp::{Component, Registry};
use crate::entity::Entity;
use crate::query::iter::passes_changed;
use crate::query::{Constraint, Query};
use crate::storage::{Chunk, SoaMut, SoaRef};
use crate::world::World;


/// The matched rows of a query, split for parallel processing.
///
/// Matched chunks stay locked until this value is dropped.
pub struct ParBatches<'w> {
    world:   &'w mut World,
    ranges:  Vec<(ArchetypeId, u32, Range<u16>)>,
    locked:  Vec<(ArchetypeId, u32)>,
    version: u32,
}

impl<'w> ParBatches<'w> {
    fn new(world: &'w mut World, query: &mut Query, constraint: Constraint, rows_per_batch: u16) -> Self {
        assert!(rows_per_batch > 0, "rows_per_batch must be positive");

        let matched = world.matched_archetypes(query);
        let last = query.last_version;
        let version = world.next_version();

        let mut ranges = Vec::new();
        let mut locked = Vec::new();
        for id in matched {
            let Some(archetype) = world.archetypes[id.index()].as_mut() else { continue };
            for chunk in archetype.chunks_mut() {
                let rows = constraint.rows(chunk);
                if rows.is_empty() || !passes_changed(chunk, query.changed(), last) {
                    continue;
                }

                chunk.lock();
                locked.push((id, chunk.index()));
                let mut start = rows.start;
                while start < rows.end {
                    let end = rows.end.min(start.saturating_add(rows_per_batch));
                    ranges.push((id, chunk.index(), start..end));
                    start = end;
                }
            }
        }

        query.last_version = Some(version);
        log::trace!("split {} chunks into {} parallel batches", locked.len(), ranges.len());
        Self { world, ranges, locked, version }
    }

    /// Number of batches.
    pub fn len(&self) -> usize { self.ranges.len() }

    /// Whether there is no batch.
    pub fn is_empty(&self) -> bool { self.ranges.is_empty() }

    /// Hands out every batch.
    pub fn batches(&mut self) -> Vec<ParBatch<'_>> {
        let world = &*self.world;
        self.ranges
            .iter()
            .map(|(archetype, chunk, rows)| ParBatch {
                chunk:    world.archetype(*archetype).chunk(*chunk),
                registry: &world.registry,
                rows:     rows.clone(),
                version:  self.version,
            })
            .collect()
    }

    /// Runs `f` on every batch in the rayon thread pool.
    pub fn for_each(mut self, f: impl Fn(ParBatch<'_>) + Sync + Send) {
        self.batches().into_par_iter().for_each(f);
    }
}

impl Drop for ParBatches<'_> {
    fn drop(&mut self) {
        for &(archetype, chunk) in &self.locked {
            self.world.archetype_mut(archetype).chunk_mut(chunk).unlock();
        }
    }
}

/// A disjoint range of rows in a shared chunk.
pub struct ParBatch<'a> {
    chunk:    &'a Chunk,
    registry: &'a Registry,
    rows:     Range<u16>,
    version:  u32,
}

static_assertions::assert_impl_all!(ParBatch<'static>: Send);

impl<'a> ParBatch<'a> {
    /// Number of rows in the batch.
    pub fn len(&self) -> usize { self.rows.len() }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// The row range inside the chunk.
    pub fn row_range(&self) -> Range<u16> { self.rows.clone() }

    /// The index of the chunk inside its archetype.
    pub fn chunk_index(&self) -> u32 { self.chunk.index() }

    /// The entities of the batch, in row order.
    pub fn entities(&self) -> &[Entity] { self.chunk.entity_view(self.rows.clone()) }

    fn id_of<T: Component>(&self) -> Entity {
        self.registry.by_type::<T>().unwrap_or_else(|| panic!("{} is not registered", T::name())).entity
    }

    /// Reads the `T` of every row.
    pub fn view<T: Component>(&self) -> &[T] { self.chunk.view(self.id_of::<T>(), self.rows.clone()) }

    /// Writes the `T` of every row, marking the column as changed.
    pub fn view_mut<T: Component>(&mut self) -> &mut [T] {
        let id = self.id_of::<T>();
        let ptr = self.chunk.aos_ptr::<T>(id, self.rows.clone());
        self.chunk.bump_shared(id, self.version);
        // Safety: no other batch covers these rows and `&mut self` is exclusive over the batch.
        unsafe { std::slice::from_raw_parts_mut(ptr, self.rows.len()) }
    }

    /// Writes two different columns at once.
    pub fn view_mut_pair<A: Component, B: Component>(&mut self) -> (&mut [A], &mut [B]) {
        let (a, b) = (self.id_of::<A>(), self.id_of::<B>());
        assert_ne!(a, b, "cannot borrow the column of {} twice", A::name());

        let a_ptr = self.chunk.aos_ptr::<A>(a, self.rows.clone());
        let b_ptr = self.chunk.aos_ptr::<B>(b, self.rows.clone());
        self.chunk.bump_shared(a, self.version);
        self.chunk.bump_shared(b, self.version);
        // Safety: the columns are disjoint and no other batch covers these rows.
        unsafe {
            (
                std::slice::from_raw_parts_mut(a_ptr, self.rows.len()),
                std::slice::from_raw_parts_mut(b_ptr, self.rows.len()),
            )
        }
    }

    /// Reads the unique component `T` of the chunk.
    ///
    /// Unique components are shared by all batches of a chunk, so they are read-only here.
    pub fn unique<T: Component>(&self) -> &T { self.chunk.unique(self.id_of::<T>()) }

    /// Reads the SoA component `T` of every row.
    pub fn soa<T: Component + Copy>(&self) -> SoaRef<'_, T> { self.chunk.soa(self.id_of::<T>(), self.rows.clone()) }

    /// Writes the SoA component `T` of every row, marking it as changed.
    pub fn soa_mut<T: Component + Copy>(&mut self) -> SoaMut<'_, T> {
        let id = self.id_of::<T>();
        let fields = self.chunk.soa_slots::<T>(id, self.rows.clone());
        self.chunk.bump_shared(id, self.version);
        // Safety: no other batch covers these rows of the field arrays.
        unsafe { SoaMut::new(self.chunk.base_ptr(), fields, self.rows.clone()) }
    }
}

impl World {
    /// Splits the rows matched by `query` into batches of at most `rows_per_batch` rows.
    ///
    /// # Panics
    /// Panics if `rows_per_batch` is zero.
    pub fn par_batches(&mut self, query: &mut Query, constraint: Constraint, rows_per_batch: u16) -> ParBatches<'_> {
        ParBatches::new(self, query, constraint, rows_per_batch)
    }

    /// Runs `f` on every batch of rows matched by `query` in the rayon thread pool.
    pub fn par_each_batch(
        &mut self,
        query: &mut Query,
        constraint: Constraint,
        rows_per_batch: u16,
        f: impl Fn(ParBatch<'_>) + Sync + Send,
    ) {
        self.par_batches(query, constraint, rows_per_batch).for_each(f);
    }
}
