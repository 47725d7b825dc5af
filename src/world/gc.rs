//! Amortized maintenance run once per frame.

use xias::Xias;

use super::archetypes::{relocate_chunk, set_location};
use super::{Location, World};
use crate::archetype::ArchetypeId;
use crate::storage::Chunk;

impl World {
    /// Runs the deferred maintenance of the world.
    ///
    /// In order:
    /// 1. Archetypes requested for deletion are released
    ///    and the indices of deleted entities become reusable.
    /// 2. Chunks that stayed empty past their grace period return to the pool.
    /// 3. Up to [`WorldConfig::defrag_entities_per_tick`](super::WorldConfig::defrag_entities_per_tick)
    ///    rows are compacted into fuller chunks.
    /// 4. Archetypes that stayed empty past their grace period are released.
    pub fn update(&mut self) {
        self.finalize_deletes();
        self.gc_chunks();
        self.defrag();
        self.gc_archetypes();

        cfg_if::cfg_if! {
            if #[cfg(debug_assertions)] {
                self.validate_entities();
            }
        }
    }

    /// Releases everything that is waiting for a grace period right away,
    /// then returns cached chunk blocks to the allocator.
    pub fn cleanup(&mut self) {
        self.finalize_deletes();

        for id in std::mem::take(&mut self.chunk_gc) {
            let Some(archetype) = self.archetypes[id.index()].as_mut() else { continue };
            let records = &mut self.records;
            archetype.expire_chunks();
            archetype.gc_chunks(&mut self.pool, |chunk| relocate_chunk(records, id, chunk));
            if archetype.has_dying_chunks() {
                self.chunk_gc.insert(id);
            }
        }

        for id in self.dying_archetypes.iter().copied().collect::<Vec<_>>() {
            if self.archetype(id).is_empty() {
                self.release_archetype(id);
            }
        }

        self.pool.trim();
        log::debug!("cleanup left {} archetypes, {} blocks allocated", self.archetype_count(), self.pool.allocated());
    }

    fn gc_chunks(&mut self) {
        for id in std::mem::take(&mut self.chunk_gc) {
            let Some(archetype) = self.archetypes[id.index()].as_mut() else { continue };
            let records = &mut self.records;
            archetype.gc_chunks(&mut self.pool, |chunk| relocate_chunk(records, id, chunk));
            if archetype.has_dying_chunks() {
                self.chunk_gc.insert(id);
            }
        }
    }

    /// Visits archetypes round-robin, compacting rows until the budget runs out.
    fn defrag(&mut self) {
        let mut budget = self.config.defrag_entities_per_tick;
        let grace = self.config.chunk_grace_ticks;
        let count = self.archetypes.len();

        for _ in 0..count {
            if budget == 0 {
                break;
            }

            let id = ArchetypeId(self.defrag_cursor.small_int());
            self.defrag_cursor = (self.defrag_cursor + 1) % count;

            let Some(archetype) = self.archetypes[id.index()].as_mut() else { continue };
            let before = budget;
            let records = &mut self.records;
            archetype.defrag(&mut budget, grace, |entity, chunk, row| {
                set_location(records, entity, Location { archetype: id, chunk, row });
            });

            if budget != before {
                log::trace!("defragmented {} rows of archetype {id:?}", before - budget);
            }
            if archetype.has_dying_chunks() {
                self.chunk_gc.insert(id);
            }
        }
    }

    fn gc_archetypes(&mut self) {
        for id in self.dying_archetypes.iter().copied().collect::<Vec<_>>() {
            let archetype = self.archetype_mut(id);
            if !archetype.is_empty() {
                archetype.revive();
                self.dying_archetypes.swap_remove(&id);
                continue;
            }
            if archetype.progress_death() || archetype.chunks().iter().any(Chunk::is_locked) {
                continue;
            }
            self.release_archetype(id);
        }
    }
}
