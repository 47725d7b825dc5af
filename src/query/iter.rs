use std::ops::Range;

use super::Query;
use crate::comp::{Component, Registry};
use crate::entity::Entity;
use crate::storage::{Chunk, SoaMut, SoaRef};
use crate::world::World;

/// Selects rows by their enabled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Constraint {
    /// Only enabled entities.
    #[default]
    EnabledOnly,
    /// Only disabled entities.
    DisabledOnly,
    /// Every entity.
    AcceptAll,
}

impl Constraint {
    /// The rows of `chunk` selected by this constraint.
    ///
    /// Disabled rows form a prefix of every chunk, so the selection is always contiguous.
    pub fn rows(self, chunk: &Chunk) -> Range<u16> {
        match self {
            Self::EnabledOnly => chunk.enabled_range(),
            Self::DisabledOnly => chunk.disabled_range(),
            Self::AcceptAll => 0..chunk.len(),
        }
    }
}

/// Whether any filtered column of `chunk` was written after `last`.
pub(crate) fn passes_changed(chunk: &Chunk, changed: &[Entity], last: Option<u32>) -> bool {
    let Some(last) = last else { return true };
    if changed.is_empty() {
        return true;
    }
    changed.iter().any(|&id| chunk.column_version(id).map_or(false, |version| is_newer(version, last)))
}

/// Compares world versions, tolerating wrap-around of the counter.
pub(crate) fn is_newer(version: u32, last: u32) -> bool { (version.wrapping_sub(last) as i32) > 0 }

/// A contiguous range of rows in one chunk, handed to query callbacks.
///
/// The chunk is locked for as long as the batch lives,
/// so structural changes to it panic until the batch is dropped.
pub struct Batch<'a> {
    chunk:    &'a mut Chunk,
    registry: &'a Registry,
    rows:     Range<u16>,
    version:  u32,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(chunk: &'a mut Chunk, registry: &'a Registry, rows: Range<u16>, version: u32) -> Self {
        chunk.lock();
        Self { chunk, registry, rows, version }
    }

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

    /// Whether the chunk stores `T`.
    pub fn has<T: Component>(&self) -> bool {
        self.registry
            .by_type::<T>()
            .map_or(false, |desc| self.chunk.has_column(desc.entity) || self.chunk.has_unique(desc.entity))
    }

    /// Reads the `T` of every row.
    pub fn view<T: Component>(&self) -> &[T] { self.view_id(self.id_of::<T>()) }

    /// Reads the data stored under `id`, which may be a data-carrying pair.
    pub fn view_id<T: Component>(&self, id: Entity) -> &[T] { self.chunk.view(id, self.rows.clone()) }

    /// Writes the `T` of every row, marking the column as changed.
    pub fn view_mut<T: Component>(&mut self) -> &mut [T] {
        let id = self.id_of::<T>();
        self.view_mut_id(id)
    }

    /// Writes the data stored under `id`, marking the column as changed.
    pub fn view_mut_id<T: Component>(&mut self, id: Entity) -> &mut [T] {
        self.chunk.view_mut(id, self.rows.clone(), self.version)
    }

    /// Writes the `T` of every row without marking the column as changed.
    pub fn view_mut_silent<T: Component>(&mut self) -> &mut [T] {
        let id = self.id_of::<T>();
        self.chunk.view_mut_silent(id, self.rows.clone())
    }

    /// Writes two different columns at once.
    ///
    /// # Panics
    /// Panics if `A` and `B` are the same component.
    pub fn view_mut_pair<A: Component, B: Component>(&mut self) -> (&mut [A], &mut [B]) {
        let (a, b) = (self.id_of::<A>(), self.id_of::<B>());
        assert_ne!(a, b, "cannot borrow the column of {} twice", A::name());

        let rows = self.rows.clone();
        let a_ptr = self.chunk.aos_ptr::<A>(a, rows.clone());
        let b_ptr = self.chunk.aos_ptr::<B>(b, rows.clone());
        self.chunk.bump_shared(a, self.version);
        self.chunk.bump_shared(b, self.version);
        // Safety: the columns are disjoint and `&mut self` is exclusive over the chunk.
        unsafe {
            (std::slice::from_raw_parts_mut(a_ptr, rows.len()), std::slice::from_raw_parts_mut(b_ptr, rows.len()))
        }
    }

    /// Reads the unique component `T` of the chunk.
    pub fn unique<T: Component>(&self) -> &T { self.chunk.unique(self.id_of::<T>()) }

    /// Writes the unique component `T` of the chunk, marking it as changed.
    pub fn unique_mut<T: Component>(&mut self) -> &mut T {
        let id = self.id_of::<T>();
        self.chunk.unique_mut(id, self.version)
    }

    /// Reads the SoA component `T` of every row.
    pub fn soa<T: Component + Copy>(&self) -> SoaRef<'_, T> { self.chunk.soa(self.id_of::<T>(), self.rows.clone()) }

    /// Writes the SoA component `T` of every row, marking it as changed.
    pub fn soa_mut<T: Component + Copy>(&mut self) -> SoaMut<'_, T> {
        let id = self.id_of::<T>();
        self.chunk.soa_mut(id, self.rows.clone(), self.version)
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) { self.chunk.unlock(); }
}

impl World {
    /// Calls `f` with every non-empty batch of rows matched by `query`.
    ///
    /// Chunks failing the change filter of the query are skipped,
    /// and the query remembers the version of this run for the next one.
    pub fn each_batch(&mut self, query: &mut Query, constraint: Constraint, mut f: impl FnMut(Batch<'_>)) {
        let matched = self.matched_archetypes(query);
        let last = query.last_version;
        let version = self.next_version();

        let registry = &self.registry;
        for id in matched {
            let Some(archetype) = self.archetypes[id.index()].as_mut() else { continue };
            for chunk in archetype.chunks_mut() {
                let rows = constraint.rows(chunk);
                if rows.is_empty() || !passes_changed(chunk, query.changed(), last) {
                    continue;
                }
                f(Batch::new(chunk, registry, rows, version));
            }
        }

        query.last_version = Some(version);
    }

    /// Calls `f` with every entity matched by `query`, honoring change filters.
    pub fn each_entity(&mut self, query: &mut Query, constraint: Constraint, mut f: impl FnMut(Entity)) {
        self.each_batch(query, constraint, |batch| batch.entities().iter().copied().for_each(&mut f));
    }

    fn chunks_matching<'w>(
        &'w mut self,
        query: &Query,
        constraint: Constraint,
    ) -> impl Iterator<Item = (&'w Chunk, Range<u16>)> + 'w {
        let matched = self.matched_archetypes(query);
        let world = &*self;
        matched
            .into_iter()
            .filter_map(move |id| world.archetypes[id.index()].as_ref())
            .flat_map(|archetype| archetype.chunks())
            .map(move |chunk| (chunk, constraint.rows(chunk)))
    }

    /// Number of entities matched by `query`, ignoring its change filters.
    pub fn count(&mut self, query: &Query, constraint: Constraint) -> usize {
        self.chunks_matching(query, constraint).map(|(_, rows)| rows.len()).sum()
    }

    /// Entities matched by `query`, ignoring its change filters.
    pub fn entities(&mut self, query: &Query, constraint: Constraint) -> Vec<Entity> {
        self.chunks_matching(query, constraint).flat_map(|(chunk, rows)| chunk.entity_view(rows).iter().copied()).collect()
    }

    /// Whether `query` matches no entity, ignoring its change filters.
    pub fn is_empty_query(&mut self, query: &Query, constraint: Constraint) -> bool {
        self.chunks_matching(query, constraint).all(|(_, rows)| rows.is_empty())
    }
}
