//! An archetype is the set of entities sharing exactly the same ids.
//!
//! The schema of an archetype is a sorted, de-duplicated list of ids.
//! Since the kind bit sits above the index and generation bits,
//! sorting puts every generic id before every unique id.
//!
//! Archetypes are connected by a lazily built [`graph::Graph`]:
//! adding or removing one id walks a single cached edge
//! instead of hashing the whole schema again.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use xias::Xias;

use crate::comp::Desc;
use crate::entity::{Entity, Kind};
use crate::storage::{Chunk, ChunkLayout, Pool};
use crate::util;

pub mod graph;
pub use graph::Graph;


/// Maximum number of ids in one archetype schema.
pub const MAX_IDS_PER_ARCHETYPE: usize = 32;

/// The stable numeric id of an archetype within its world.
///
/// Ids are never reused, even after the archetype is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(pub u32);

impl ArchetypeId {
    /// The archetype of entities without any ids.
    pub const ROOT: Self = Self(0);

    pub(crate) fn index(self) -> usize { self.0.small_int() }
}

/// A content hash of a schema or of a canonical query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LookupHash(pub u64);

impl LookupHash {
    /// Hashes a sorted schema.
    pub fn of_ids(ids: &[Entity]) -> Self { Self::of(ids) }

    pub(crate) fn of(value: impl Hash) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        value.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// Folds `id` into a per-kind bloom mask.
pub(crate) fn matcher_bit(id: Entity) -> u64 {
    let hash = id.value().wrapping_mul(0x9E37_79B9_7F4A_7C15);
    1 << (hash >> 58)
}

/// A unique schema together with the chunks storing its entities.
pub struct Archetype {
    id:           ArchetypeId,
    ids:          Vec<Entity>,
    /// Number of generic ids, which form a prefix of `ids`.
    generic_len:  usize,
    hash:         LookupHash,
    matcher:      [u64; 2],
    layout:       Arc<ChunkLayout>,
    chunks:       Vec<Chunk>,
    graph:        Graph,
    dying_chunks: usize,
    dying:        Option<u16>,
    req_del:      bool,
}

impl Archetype {
    /// Creates an archetype for a sorted schema.
    ///
    /// `columns` pairs every sized id with the descriptor providing its data.
    ///
    /// # Panics
    /// Panics if the schema is not sorted and de-duplicated,
    /// if it has more than [`MAX_IDS_PER_ARCHETYPE`] ids,
    /// or if not even one row fits in a chunk.
    pub fn new(id: ArchetypeId, ids: Vec<Entity>, columns: &[(Entity, &Desc)]) -> Self {
        assert!(
            ids.len() <= MAX_IDS_PER_ARCHETYPE,
            "an archetype cannot have more than {MAX_IDS_PER_ARCHETYPE} ids, got {ids:?}"
        );
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]), "archetype ids {ids:?} are not canonical");

        let generic_len = ids.partition_point(|id| id.kind() == Kind::Generic);

        let (generic, unique): (Vec<_>, Vec<_>) = columns.iter().copied().partition(|(id, _)| id.kind() == Kind::Generic);
        let layout = Arc::new(ChunkLayout::new(&generic, &unique));

        let mut matcher = [0; 2];
        for &id in &ids {
            if !id.is_wildcard() {
                matcher[usize::from(id.kind() == Kind::Unique)] |= matcher_bit(id);
            }
        }

        log::trace!(
            "created archetype {id:?} with ids {ids:?}, {} rows per chunk",
            layout.capacity()
        );

        Self {
            id,
            hash: LookupHash::of_ids(&ids),
            ids,
            generic_len,
            matcher,
            layout,
            chunks: Vec::new(),
            graph: Graph::default(),
            dying_chunks: 0,
            dying: None,
            req_del: false,
        }
    }

    /// The stable id of this archetype.
    pub fn id(&self) -> ArchetypeId { self.id }

    /// The sorted schema.
    pub fn ids(&self) -> &[Entity] { &self.ids }

    /// Ids stored once per row.
    pub fn generic_ids(&self) -> &[Entity] { &self.ids[..self.generic_len] }

    /// Ids stored once per chunk.
    pub fn unique_ids(&self) -> &[Entity] { &self.ids[self.generic_len..] }

    /// The content hash of the schema.
    pub fn lookup_hash(&self) -> LookupHash { self.hash }

    /// The bloom mask of all non-wildcard ids of `kind`.
    pub fn matcher_hash(&self, kind: Kind) -> u64 { self.matcher[usize::from(kind == Kind::Unique)] }

    /// The layout shared by all chunks.
    pub fn layout(&self) -> &Arc<ChunkLayout> { &self.layout }

    /// Whether the schema contains exactly `id`.
    pub fn has(&self, id: Entity) -> bool { self.ids.binary_search(&id).is_ok() }

    /// The archetype reached by adding `id`.
    pub fn find_edge_add(&self, id: Entity) -> Option<ArchetypeId> { self.graph.find_edge_add(id) }

    /// The archetype reached by removing `id`.
    pub fn find_edge_del(&self, id: Entity) -> Option<ArchetypeId> { self.graph.find_edge_del(id) }

    /// The cached structural-change edges.
    pub fn graph(&self) -> &Graph { &self.graph }

    pub(crate) fn graph_mut(&mut self) -> &mut Graph { &mut self.graph }

    /// All chunks, including dying ones.
    pub fn chunks(&self) -> &[Chunk] { &self.chunks }

    pub(crate) fn chunks_mut(&mut self) -> &mut [Chunk] { &mut self.chunks }

    /// The chunk at `index`.
    pub fn chunk(&self, index: u32) -> &Chunk { &self.chunks[index.small_int::<usize>()] }

    pub(crate) fn chunk_mut(&mut self, index: u32) -> &mut Chunk { &mut self.chunks[index.small_int::<usize>()] }

    pub(crate) fn chunk_pair_mut(&mut self, a: u32, b: u32) -> (&mut Chunk, &mut Chunk) {
        util::pair_mut(&mut self.chunks, a.small_int(), b.small_int())
    }

    /// Number of entities in all chunks.
    pub fn entity_count(&self) -> usize { self.chunks.iter().map(|chunk| usize::from(chunk.len())).sum() }

    /// Whether no chunk holds any entity.
    pub fn is_empty(&self) -> bool { self.chunks.iter().all(Chunk::is_empty) }

    /// Finds or creates a chunk with spare capacity.
    ///
    /// The most recently allocated chunk with spare room is filled first.
    /// A dying chunk picked this way is revived.
    pub(crate) fn foc_free_chunk(&mut self, pool: &mut Pool, version: u32) -> u32 {
        if let Some(index) = self.chunks.iter().rposition(|chunk| !chunk.is_full() && !chunk.is_locked()) {
            let chunk = &mut self.chunks[index];
            if chunk.is_dying() {
                chunk.revive();
                self.dying_chunks -= 1;
            }
            return index.small_int();
        }

        let index: u32 = self.chunks.len().small_int();
        log::trace!("archetype {:?} allocates chunk {index}", self.id);
        let block = pool.alloc(self.layout.class());
        self.chunks.push(Chunk::new(block, Arc::clone(&self.layout), index, version));
        index
    }

    /// Starts the grace period of a chunk that became empty.
    pub(crate) fn on_chunk_emptied(&mut self, index: u32, grace_ticks: u16) {
        let chunk = &mut self.chunks[index.small_int::<usize>()];
        if chunk.is_empty() && !chunk.is_dying() {
            chunk.start_dying(grace_ticks);
            self.dying_chunks += 1;
        }
    }

    /// Whether any chunk is waiting to be released.
    pub fn has_dying_chunks(&self) -> bool { self.dying_chunks > 0 }

    /// Advances the grace period of dying chunks and releases the expired ones.
    ///
    /// Releasing a chunk moves the last chunk into its slot;
    /// `on_moved` is called with that chunk so that its rows can be relocated.
    pub(crate) fn gc_chunks(&mut self, pool: &mut Pool, mut on_moved: impl FnMut(&Chunk)) {
        for index in (0..self.chunks.len()).rev() {
            let chunk = &mut self.chunks[index];
            if !chunk.is_dying() || chunk.is_locked() {
                continue;
            }
            if !chunk.is_empty() {
                chunk.revive();
                self.dying_chunks -= 1;
                continue;
            }
            if chunk.progress_death() {
                continue;
            }

            self.dying_chunks -= 1;
            let chunk = self.chunks.swap_remove(index);
            log::trace!("archetype {:?} releases chunk {}", self.id, chunk.index());
            pool.release(chunk.into_block());

            if let Some(moved) = self.chunks.get_mut(index) {
                moved.set_index(index.small_int());
                on_moved(moved);
            }
        }
    }

    /// Ends the grace period of every dying chunk.
    pub(crate) fn expire_chunks(&mut self) { self.chunks.iter_mut().for_each(Chunk::expire); }

    /// Releases every chunk regardless of grace periods.
    pub(crate) fn release_chunks(&mut self, pool: &mut Pool) {
        for chunk in self.chunks.drain(..) {
            debug_assert!(chunk.is_empty(), "releasing a chunk that still has rows");
            pool.release(chunk.into_block());
        }
        self.dying_chunks = 0;
    }

    /// Moves up to `budget` rows from the back chunks into non-full front chunks.
    ///
    /// Locked chunks are never touched.
    /// `on_move(entity, chunk, row)` reports every entity whose location changed.
    pub(crate) fn defrag(
        &mut self,
        budget: &mut u32,
        grace_ticks: u16,
        mut on_move: impl FnMut(Entity, u32, u16),
    ) {
        if self.chunks.len() < 2 {
            return;
        }

        let mut front = 0;
        let mut back = self.chunks.len() - 1;

        while front < back && *budget > 0 {
            let dst = &self.chunks[front];
            if dst.is_full() || dst.is_empty() || dst.is_locked() {
                front += 1;
                continue;
            }
            let src = &self.chunks[back];
            if src.is_empty() || src.is_locked() {
                back -= 1;
                continue;
            }

            let (src, dst) = util::pair_mut(&mut self.chunks, back, front);
            let src_row = src.len() - 1;
            let entity = src.entity(src_row);
            let enabled = src.is_enabled(src_row);

            let dst_row = dst.add_entity(entity);
            for (moved, row) in Chunk::transfer_row(src, src_row, dst, dst_row).iter() {
                on_move(moved, src.index(), row);
            }
            if enabled {
                on_move(entity, dst.index(), dst_row);
            } else {
                for (moved, row) in dst.enable_entity(dst_row, false).iter() {
                    on_move(moved, dst.index(), row);
                }
            }
            *budget -= 1;

            if src.is_empty() {
                log::trace!("defrag emptied chunk {} of archetype {:?}", src.index(), self.id);
                let index = src.index();
                self.on_chunk_emptied(index, grace_ticks);
            }
        }
    }

    /// Whether the archetype is waiting to be released.
    pub fn is_dying(&self) -> bool { self.dying.is_some() }

    /// Starts the grace period of an empty archetype.
    pub(crate) fn start_dying(&mut self, ticks: u16) {
        if self.dying.is_none() {
            self.dying = Some(ticks);
        }
    }

    /// Consumes one tick of the grace period,
    /// returning `true` while the archetype still has time left.
    pub fn progress_death(&mut self) -> bool {
        match &mut self.dying {
            Some(ticks) if *ticks > 0 => {
                *ticks -= 1;
                true
            }
            _ => false,
        }
    }

    /// Cancels the grace period of a reused archetype.
    pub fn revive(&mut self) { self.dying = None; }

    /// Requests the release of this archetype on the next update, ignoring grace periods.
    pub fn req_del(&mut self) { self.req_del = true; }

    /// Whether the archetype was requested to be released.
    pub fn is_req_del(&self) -> bool { self.req_del }
}
