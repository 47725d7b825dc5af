//! Entities are opaque handles identifying a row or a relationship.
//!
//! Everything addressable in a world is an entity:
//! plain objects, component types, tags and relationship pairs.
//! An archetype schema is therefore just a sorted list of entities.
//!
//! A handle packs a recyclable index together with a generation counter.
//! The generation is bumped every time the index is recycled,
//! so a stale handle never aliases the entity that later reuses its slot.

use std::fmt;

pub(crate) mod deletion;
pub use deletion::{Reaction, Rules};

pub(crate) mod slots;

#[cfg(test)]
mod tests;

const INDEX_BITS: u32 = 32;
const GEN_BITS: u32 = 28;
const GEN_SHIFT: u32 = INDEX_BITS;
const GEN_MASK: u64 = (1 << GEN_BITS) - 1;
const ENTITY_BIT: u64 = 1 << (INDEX_BITS + GEN_BITS);
const PAIR_BIT: u64 = 1 << (INDEX_BITS + GEN_BITS + 1);
const KIND_BIT: u64 = 1 << (INDEX_BITS + GEN_BITS + 2);

/// The largest index that can be stored in the generation field of a pair.
pub const MAX_PAIR_INDEX: u32 = GEN_MASK as u32;

/// Whether an id is stored once per row or once per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Kind {
    /// One value per entity.
    #[default]
    Generic,
    /// One value shared by every entity in the same chunk.
    Unique,
}

/// An entity handle.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Entity(u64);

static_assertions::assert_eq_size!(Entity, u64);

impl Entity {
    /// The sentinel returned by lookups that found nothing.
    pub const BAD: Self = Self(u64::MAX);

    /// Packs a handle from its parts.
    ///
    /// # Panics
    /// Panics if `generation` does not fit in the generation field.
    pub const fn new(index: u32, generation: u32, is_entity: bool, is_pair: bool, kind: Kind) -> Self {
        assert!((generation as u64) <= GEN_MASK, "generation overflows the handle");

        let mut value = index as u64 | ((generation as u64) << GEN_SHIFT);
        if is_entity {
            value |= ENTITY_BIT;
        }
        if is_pair {
            value |= PAIR_BIT;
        }
        if matches!(kind, Kind::Unique) {
            value |= KIND_BIT;
        }
        Self(value)
    }

    /// The recyclable index of this handle.
    ///
    /// For pairs this is the index of the relation.
    pub const fn id(self) -> u32 { self.0 as u32 }

    /// The generation of this handle.
    ///
    /// For pairs this is the index of the target.
    pub const fn gen(self) -> u32 { ((self.0 >> GEN_SHIFT) & GEN_MASK) as u32 }

    /// Whether this handle encodes a relationship pair.
    pub const fn is_pair(self) -> bool { self.0 != u64::MAX && self.0 & PAIR_BIT != 0 }

    /// Whether this handle refers to a plain entity rather than a component type.
    pub const fn is_entity(self) -> bool { self.0 != u64::MAX && self.0 & ENTITY_BIT != 0 }

    /// The storage kind of this id.
    pub const fn kind(self) -> Kind {
        if self.0 & KIND_BIT != 0 {
            Kind::Unique
        } else {
            Kind::Generic
        }
    }

    /// Whether this is [`Entity::BAD`].
    pub const fn is_bad(self) -> bool { self.0 == u64::MAX }

    /// The raw packed value.
    pub const fn value(self) -> u64 { self.0 }

    /// The relation index of a pair.
    pub(crate) fn rel(self) -> u32 {
        debug_assert!(self.is_pair());
        self.id()
    }

    /// The target index of a pair.
    pub(crate) fn tgt(self) -> u32 {
        debug_assert!(self.is_pair());
        self.gen()
    }

    /// Packs a pair from raw relation and target indices.
    pub(crate) const fn raw_pair(rel: u32, tgt: u32, kind: Kind) -> Self { Self::new(rel, tgt, false, true, kind) }

    /// Whether the pattern `self` matches the concrete id `id`.
    ///
    /// A wildcard side of a pair pattern matches any relation or target,
    /// and [`WILDCARD`] alone matches every id.
    pub fn matches(self, id: Entity) -> bool {
        if self == id || self == WILDCARD {
            return true;
        }
        if !self.is_pair() || !id.is_pair() {
            return false;
        }
        (self.rel() == WILDCARD.id() || self.rel() == id.rel())
            && (self.tgt() == WILDCARD.id() || self.tgt() == id.tgt())
    }

    /// Whether this is a pair with a wildcard on either side.
    pub fn is_wildcard(self) -> bool {
        self == WILDCARD
            || (self.is_pair() && (self.rel() == WILDCARD.id() || self.tgt() == WILDCARD.id()))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bad() {
            write!(f, "Entity(BAD)")
        } else if self.is_pair() {
            write!(f, "Pair({}, {})", self.rel(), self.tgt())
        } else {
            write!(f, "Entity({}.{}", self.id(), self.gen())?;
            if self.kind() == Kind::Unique {
                write!(f, " unique")?;
            }
            write!(f, ")")
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Debug::fmt(self, f) }
}

/// A relationship between a relation entity and a target entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pair {
    /// The relation, e.g. `eats`.
    pub rel: Entity,
    /// The target, e.g. `carrot`.
    pub tgt: Entity,
}

impl Pair {
    /// Creates a pair.
    pub fn new(rel: Entity, tgt: Entity) -> Self { Self { rel, tgt } }

    /// Packs the pair into a single id.
    ///
    /// # Panics
    /// Panics if the target index does not fit in the generation field.
    pub fn into_entity(self) -> Entity {
        assert!(self.tgt.id() <= MAX_PAIR_INDEX, "pair target {:?} index is too large", self.tgt);
        Entity::new(self.rel.id(), self.tgt.id(), false, true, self.rel.kind())
    }
}

impl From<Pair> for Entity {
    fn from(pair: Pair) -> Self { pair.into_entity() }
}

macro_rules! core_entities {
    ($($(#[$meta:meta])* $name:ident = $index:literal => $label:literal;)*) => {
        $(
            $(#[$meta])*
            pub const $name: Entity = Entity::new($index, 0, true, false, Kind::Generic);
        )*

        /// Built-in entities in creation order, along with their names.
        pub(crate) const CORE_ENTITIES: &[(Entity, &str)] = &[$(($name, $label)),*];
    }
}

core_entities! {
    /// Tags entities owned by the engine itself.
    CORE = 0 => "tessera::Core";
    /// The `*` side of a wildcard pair.
    WILDCARD = 1 => "tessera::Wildcard";
    /// `(Is, base)` marks an entity as inheriting from `base`.
    IS = 2 => "tessera::Is";
    /// `(ChildOf, parent)`; children are deleted with their parent.
    CHILD_OF = 3 => "tessera::ChildOf";
    /// `(DependsOn, b)` on `a` means adding `a` also adds `b`.
    DEPENDS_ON = 4 => "tessera::DependsOn";
    /// `(CantCombine, b)` on `a` forbids `a` and `b` on the same entity.
    CANT_COMBINE = 5 => "tessera::CantCombine";
    /// Relation selecting what happens to holders when the entity is deleted.
    ON_DELETE = 6 => "tessera::OnDelete";
    /// Relation selecting what happens to pair holders when a target is deleted.
    ON_DELETE_TARGET = 7 => "tessera::OnDeleteTarget";
    /// Reaction: strip the id from holders.
    REMOVE = 8 => "tessera::Remove";
    /// Reaction: delete holders.
    DELETE = 9 => "tessera::Delete";
    /// Reaction: refuse the deletion.
    ERROR = 10 => "tessera::Error";
}

/// Shorthand for `Pair::new(rel, tgt).into_entity()`.
pub fn pair(rel: Entity, tgt: Entity) -> Entity { Pair::new(rel, tgt).into_entity() }
