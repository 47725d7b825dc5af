//! Cascading deletion.
//!
//! Deleting an entity first plans the full cascade without touching anything,
//! so that an `Error` rule anywhere in the cascade leaves the world unchanged.
//! Rows are dropped immediately, while the slots are only freed in [`World::update`].

use std::fmt;

use indexmap::IndexSet;

use super::World;
use crate::archetype::ArchetypeId;
use crate::entity::{Entity, Kind, Reaction, WILDCARD};

/// A deletion refused by an `Error` delete rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteError {
    /// The entity carries `(OnDelete, Error)`.
    Protected {
        /// The protected entity.
        entity: Entity,
    },
    /// The entity is the target of a pair whose relation carries `(OnDeleteTarget, Error)`.
    ProtectedTarget {
        /// The entity being deleted.
        entity:   Entity,
        /// The relation refusing to lose its target.
        relation: Entity,
    },
    /// The pair uses a relation carrying `(OnDeleteTarget, Error)`.
    ProtectedPair {
        /// The pair being deleted.
        pair:     Entity,
        /// The relation refusing to lose its target.
        relation: Entity,
    },
}

impl fmt::Display for DeleteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protected { entity } => write!(f, "{entity:?} is protected from deletion"),
            Self::ProtectedTarget { entity, relation } => {
                write!(f, "{entity:?} is the target of {relation:?}, which refuses to lose its targets")
            }
            Self::ProtectedPair { pair, relation } => {
                write!(f, "{pair:?} uses {relation:?}, which refuses to lose its targets")
            }
        }
    }
}

impl std::error::Error for DeleteError {}

/// `(x, *)`, matching every pair using `x` as the relation.
fn as_relation(x: Entity) -> Entity { Entity::raw_pair(x.id(), WILDCARD.id(), x.kind()) }

/// `(*, x)`, matching every pair using `x` as the target.
fn as_target(x: Entity) -> Entity { Entity::raw_pair(WILDCARD.id(), x.id(), Kind::Generic) }

impl World {
    /// Deletes `entity` along with everything its delete rules cascade to.
    ///
    /// Passing a pair strips that pair from every holder instead;
    /// a wildcard pair strips every matching pair.
    /// Pairs whose relation carries `(OnDeleteTarget, Error)` refuse to be stripped.
    ///
    /// The deleted handles become invalid immediately,
    /// but their indices are only recycled by the next [`World::update`].
    ///
    /// # Errors
    /// Returns an error without changing anything
    /// if an `Error` rule forbids any deletion in the cascade.
    ///
    /// # Panics
    /// Panics if `entity` is not valid.
    pub fn del(&mut self, entity: Entity) -> Result<(), DeleteError> {
        if entity.is_pair() {
            return self.del_pair(entity).map_err(|err| {
                log::error!("cannot delete {entity:?}: {err}");
                err
            });
        }

        self.assert_valid(entity);
        let plan = match self.plan_delete(entity) {
            Ok(plan) => plan,
            Err(err) => {
                log::error!("cannot delete {entity:?}: {err}");
                return Err(err);
            }
        };

        log::debug!("deleting {entity:?}, cascading to {} entities", plan.len() - 1);
        self.apply_delete(&plan);
        Ok(())
    }

    /// Strips every pair matched by `id` from its holders.
    fn del_pair(&mut self, id: Entity) -> Result<(), DeleteError> {
        let mut strips = Vec::new();
        for holder in self.holders(id) {
            let matched: Vec<Entity> =
                self.archetype_of(holder).ids().iter().copied().filter(|&held| id.matches(held)).collect();
            for &held in &matched {
                let relation = self.handle_at(held.rel());
                let rules = self.records.get(held.rel()).expect("relations of live pairs are alive").rules;
                if rules.on_delete_target == Reaction::Error {
                    return Err(DeleteError::ProtectedPair { pair: held, relation });
                }
            }
            strips.push((holder, matched));
        }

        for (holder, matched) in strips {
            let mut builder = self.bulk(holder);
            for held in matched {
                builder.del(held);
            }
            builder.commit();
        }
        Ok(())
    }

    /// Entities stored in archetypes holding `id`.
    fn holders(&self, id: Entity) -> Vec<Entity> {
        self.archetypes_with(id)
            .into_iter()
            .flat_map(|archetype| self.archetype(archetype).chunks())
            .flat_map(|chunk| chunk.entities().iter().copied())
            .collect()
    }

    /// Collects every entity the deletion of `root` cascades to.
    fn plan_delete(&self, root: Entity) -> Result<IndexSet<Entity>, DeleteError> {
        let mut plan = IndexSet::new();
        plan.insert(root);

        let mut next = 0;
        while let Some(&x) = plan.get_index(next) {
            next += 1;

            let rules = self.records.get(x.id()).expect("planned entities are alive").rules;
            match rules.on_delete {
                Reaction::Error => return Err(DeleteError::Protected { entity: x }),
                Reaction::Delete => {
                    plan.extend(self.holders(x));
                    plan.extend(self.holders(as_relation(x)));
                }
                Reaction::Remove => {}
            }

            for &relation in self.tgt_to_rel.get(&x).into_iter().flatten() {
                // the directory keeps emptied pairs until their archetypes are released
                let holders = self.holders(Entity::raw_pair(relation.id(), x.id(), relation.kind()));
                if holders.is_empty() {
                    continue;
                }

                let rules = self.records.get(relation.id()).expect("relations of live pairs are alive").rules;
                match rules.on_delete_target {
                    Reaction::Error => return Err(DeleteError::ProtectedTarget { entity: x, relation }),
                    Reaction::Delete => {
                        log::trace!("{x:?} cascades to holders of ({relation:?}, {x:?})");
                        plan.extend(holders);
                    }
                    Reaction::Remove => {}
                }
            }
        }

        Ok(plan)
    }

    fn apply_delete(&mut self, plan: &IndexSet<Entity>) {
        for &x in plan {
            self.remove_row(x);
            self.clear_name(x);
            self.entities_to_del.push(x);
        }

        let related = |id: Entity| {
            if id.is_pair() {
                plan.iter().any(|x| id.rel() == x.id() || id.tgt() == x.id())
            } else {
                plan.contains(&id)
            }
        };

        let mut affected = IndexSet::<ArchetypeId>::new();
        for &x in plan {
            for key in [x, as_relation(x), as_target(x)] {
                affected.extend(self.archetypes_with(key));
            }
        }

        for archetype in affected {
            if archetype == ArchetypeId::ROOT || self.archetypes[archetype.index()].is_none() {
                continue;
            }
            let kept: Vec<Entity> = self.archetype(archetype).ids().iter().copied().filter(|&id| !related(id)).collect();
            if !self.archetype(archetype).is_empty() {
                let dst = self.find_or_create_archetype(kept);
                self.move_all(archetype, dst);
            }
            self.req_del_archetype(archetype);
        }

        self.is_epoch = self.is_epoch.wrapping_add(1);
    }

    /// Releases archetypes requested for deletion and frees the slots of deleted entities
    /// that no archetype refers to anymore.
    pub(super) fn finalize_deletes(&mut self) {
        for archetype in std::mem::take(&mut self.archetypes_to_del) {
            if self.archetypes[archetype.index()].as_ref().map_or(false, |arch| arch.is_empty()) {
                self.release_archetype(archetype);
            }
        }

        let mut retained = Vec::new();
        for entity in std::mem::take(&mut self.entities_to_del) {
            if [entity, as_relation(entity), as_target(entity)].into_iter().any(|key| self.has_id(key)) {
                retained.push(entity);
                continue;
            }

            self.records.free(entity.id());
            self.rel_to_tgt.remove(&entity);
            self.tgt_to_rel.remove(&entity);
            log::trace!("freed {entity:?}");
        }
        self.entities_to_del = retained;
    }
}
