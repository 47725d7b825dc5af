//! Matched-archetype lists shared by equivalent queries.

use bitvec::prelude::BitVec;
use indexmap::IndexMap;
use xias::Xias;

use super::{Op, Query, QueryItem};
use crate::archetype::{self, Archetype, ArchetypeId, LookupHash};
use crate::entity::{self, Entity, Kind};
use crate::world::World;

/// The cached resolution of one canonical query.
#[derive(Debug, Clone)]
pub struct QueryInfo {
    items:        Vec<QueryItem>,
    changed:      Vec<Entity>,
    /// Bloom masks of the concrete `All` ids, per kind.
    all_mask:     [u64; 2],
    matched:      Vec<ArchetypeId>,
    /// Indexed by archetype id.
    matched_bits: BitVec,
    /// Archetypes with ids below this were already tested.
    last_checked: u32,
    is_epoch:     u32,
    has_is:       bool,
}

fn is_is_pair(id: Entity) -> bool { id.is_pair() && id.rel() == entity::IS.id() && !id.is_wildcard() }

impl QueryInfo {
    fn new(query: &Query) -> Self {
        let mut all_mask = [0; 2];
        for item in query.items() {
            if item.op == Op::All && !item.id.is_wildcard() && !is_is_pair(item.id) {
                all_mask[usize::from(item.id.kind() == Kind::Unique)] |= archetype::matcher_bit(item.id);
            }
        }

        Self {
            items: query.items().to_vec(),
            changed: query.changed().to_vec(),
            all_mask,
            matched: Vec::new(),
            matched_bits: BitVec::new(),
            last_checked: 0,
            is_epoch: 0,
            has_is: query.items().iter().any(|item| is_is_pair(item.id)),
        }
    }

    fn is_for(&self, query: &Query) -> bool { self.items == query.items() && self.changed == query.changed() }

    /// Archetypes matched so far, in creation order.
    pub fn matched(&self) -> &[ArchetypeId] { &self.matched }

    /// The number of archetypes already tested.
    pub fn last_checked(&self) -> u32 { self.last_checked }

    /// The `Is` epoch the matches were computed at.
    pub fn is_epoch(&self) -> u32 { self.is_epoch }

    /// Tests the archetypes created since the last refresh.
    fn refresh(&mut self, world: &World) {
        if self.has_is && self.is_epoch != world.is_epoch {
            self.matched.clear();
            self.matched_bits.clear();
            self.last_checked = 0;
        }
        self.is_epoch = world.is_epoch;

        let len = world.archetype_len();
        for index in self.last_checked..len {
            let Some(Some(archetype)) = world.archetypes.get(index.small_int::<usize>()) else { continue };
            if self.matches(world, archetype) {
                let bit = archetype.id().index();
                if self.matched_bits.len() <= bit {
                    self.matched_bits.resize(bit + 1, false);
                }
                self.matched_bits.set(bit, true);
                self.matched.push(archetype.id());
            }
        }
        self.last_checked = len;
    }

    fn matches(&self, world: &World, archetype: &Archetype) -> bool {
        for kind in [Kind::Generic, Kind::Unique] {
            let mask = self.all_mask[usize::from(kind == Kind::Unique)];
            if archetype.matcher_hash(kind) & mask != mask {
                return false;
            }
        }

        let mut any_seen = false;
        let mut any_matched = false;
        for item in &self.items {
            let present = item_present(world, archetype, item.id);
            match item.op {
                Op::All if !present => return false,
                Op::Not if present => return false,
                Op::Any => {
                    any_seen = true;
                    any_matched |= present;
                }
                _ => {}
            }
        }
        !any_seen || any_matched
    }

    fn purge(&mut self, id: ArchetypeId) {
        let bit = id.index();
        if self.matched_bits.get(bit).map_or(false, |bit| *bit) {
            self.matched_bits.set(bit, false);
            self.matched.retain(|&matched| matched != id);
        }
    }
}

/// Whether `archetype` satisfies a single query id.
fn item_present(world: &World, archetype: &Archetype, id: Entity) -> bool {
    if is_is_pair(id) {
        let base = world.handle_at(id.tgt());
        return archetype
            .ids()
            .iter()
            .filter(|held| is_is_pair(**held))
            .any(|held| world.is(world.handle_at(held.tgt()), base));
    }
    if id.is_wildcard() {
        return archetype.ids().iter().any(|&held| id.matches(held));
    }
    archetype.has(id)
}

/// Query resolutions bucketed by their canonical hash.
#[derive(Debug, Default)]
pub struct QueryCache {
    infos: IndexMap<LookupHash, Vec<QueryInfo>>,
}

impl QueryCache {
    /// Number of cached queries.
    pub fn len(&self) -> usize { self.infos.values().map(Vec::len).sum() }

    /// Whether no query was cached.
    pub fn is_empty(&self) -> bool { self.infos.is_empty() }

    /// The cached resolution of `query`.
    pub fn get(&self, query: &Query) -> Option<&QueryInfo> {
        self.infos.get(&query.lookup_hash())?.iter().find(|info| info.is_for(query))
    }

    /// Returns the up-to-date resolution of `query`.
    pub(crate) fn get_or_insert(&mut self, query: &Query, world: &World) -> &QueryInfo {
        let bucket = self.infos.entry(query.lookup_hash()).or_default();
        let index = match bucket.iter().position(|info| info.is_for(query)) {
            Some(index) => index,
            None => {
                bucket.push(QueryInfo::new(query));
                bucket.len() - 1
            }
        };
        let info = &mut bucket[index];
        info.refresh(world);
        info
    }

    /// Removes a released archetype from every cached match list.
    pub(crate) fn purge_archetype(&mut self, id: ArchetypeId) {
        for info in self.infos.values_mut().flatten() {
            info.purge(id);
        }
    }
}

impl World {
    /// The archetypes currently matched by `query`.
    pub(crate) fn matched_archetypes(&mut self, query: &Query) -> Vec<ArchetypeId> {
        let mut cache = std::mem::take(&mut self.query_cache);
        let matched = cache.get_or_insert(query, self).matched.clone();
        self.query_cache = cache;
        matched
    }

    /// The query cache of this world.
    pub fn query_cache(&self) -> &QueryCache { &self.query_cache }
}
