//! Read-only dumps for tooling, plus debug-only consistency sweeps.

use itertools::Itertools;

use super::{Location, World};

impl World {
    /// Logs every archetype with its schema, chunk fill and graph edges.
    pub fn diag_archetypes(&self) {
        log::info!("{} archetypes", self.archetype_count());
        for archetype in self.archetypes() {
            log::info!(
                "archetype {:?} [{}]: {} entities in {} chunks of {} rows, {} edges{}",
                archetype.id(),
                archetype.ids().iter().map(|&id| self.describe(id)).join(", "),
                archetype.entity_count(),
                archetype.chunks().len(),
                archetype.layout().capacity(),
                archetype.graph().len(),
                if archetype.is_dying() { ", dying" } else { "" },
            );
            for chunk in archetype.chunks() {
                log::info!(
                    "  chunk {}: {}/{} rows, {} disabled, {:?}",
                    chunk.index(),
                    chunk.len(),
                    chunk.capacity(),
                    chunk.disabled_len(),
                    chunk.lifetime(),
                );
            }
        }
    }

    /// Logs every live entity with its location and name.
    pub fn diag_entities(&self) {
        log::info!("{} entities, {} pending deletion", self.size(), self.pending_deletes());
        for (_, _, record) in self.records.iter() {
            let Some(Location { archetype, chunk, row }) = record.location else { continue };
            match &record.name {
                Some(name) => log::info!("{:?} {name:?} at {archetype:?}/{chunk}/{row}", record.entity),
                None => log::info!("{:?} at {archetype:?}/{chunk}/{row}", record.entity),
            }
        }
    }

    /// Logs every registered component.
    pub fn diag_components(&self) {
        log::info!("{} components", self.registry.len());
        for desc in self.registry.iter() {
            log::info!(
                "{} as {:?}: {} bytes aligned to {}, {:?} {:?}",
                desc.name,
                desc.entity,
                desc.size,
                desc.align,
                desc.kind,
                desc.layout,
            );
        }
    }

    fn describe(&self, id: crate::entity::Entity) -> String {
        if id.is_pair() {
            let part = |index: u32| {
                let entity = self.handle_at(index);
                self.records
                    .get(index)
                    .and_then(|record| record.name.clone())
                    .unwrap_or_else(|| format!("{entity:?}"))
            };
            return format!("({}, {})", part(id.rel()), part(id.tgt()));
        }
        match self.records.get(id.id()).and_then(|record| record.name.as_deref()) {
            Some(name) => name.to_string(),
            None => format!("{id:?}"),
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(debug_assertions)] {
        impl World {
            /// Checks that every row of a chunk is located where its record says.
            pub(crate) fn validate_chunk(&self, archetype: &crate::archetype::Archetype, chunk: u32) {
                let chunk = archetype.chunk(chunk);
                assert!(chunk.disabled_len() <= chunk.len());
                for (row, &entity) in chunk.entities().iter().enumerate() {
                    let record = self.records.get(entity.id()).expect("stored entities have records");
                    assert_eq!(record.entity, entity, "chunk stores a stale handle");
                    let location = record.location.expect("stored entities have locations");
                    assert_eq!(location.archetype, archetype.id(), "{entity:?} is in the wrong archetype");
                    assert_eq!(location.chunk, chunk.index(), "{entity:?} is in the wrong chunk");
                    assert_eq!(usize::from(location.row), row, "{entity:?} is in the wrong row");
                }
            }

            /// Checks that every live record points at a row storing its entity.
            pub(crate) fn validate_entities(&self) {
                for (_, _, record) in self.records.iter() {
                    let Some(location) = record.location else { continue };
                    let chunk = self.archetype(location.archetype).chunk(location.chunk);
                    assert_eq!(
                        chunk.entity(location.row),
                        record.entity,
                        "record of {:?} points at another row",
                        record.entity
                    );
                }
                for archetype in self.archetypes() {
                    for chunk in archetype.chunks() {
                        self.validate_chunk(archetype, chunk.index());
                    }
                }
            }
        }
    }
}
