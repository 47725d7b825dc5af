//! Components are data types attached to entities.
//!
//! Every component type is interned once per world in a [`Registry`],
//! which hands out a [`Desc`] describing its size, alignment and lifecycle hooks.
//! The component itself is also an entity,
//! so it can be used anywhere an id is expected, e.g. in archetype schemas and queries.
//!
//! # Layouts
//! A component is stored either as an array of structures ([`LayoutTag::Aos`], the default)
//! or as a structure of arrays ([`LayoutTag::Soa`]),
//! in which case each field gets its own sub-column inside the chunk.
//! SoA components must be `Copy` because values are gathered from and scattered into
//! separate field arrays.
//!
//! # Kinds
//! A [`Kind::Generic`] component stores one value per entity.
//! A [`Kind::Unique`] component stores one value per chunk,
//! shared by all entities stored in that chunk.
//!
//! ```
//! #[derive(Debug, Default, Clone, Copy, tessera::Component)]
//! #[tessera(soa)]
//! struct Position {
//!     x: f32,
//!     y: f32,
//! }
//!
//! let mut world = tessera::World::new();
//! let e = world.add();
//! world.add_value(e, Position { x: 1.0, y: 2.0 });
//! assert_eq!(world.read::<Position>(e).map(|p| p.x), Some(1.0));
//! ```

use std::any::TypeId;
use std::hash::{Hash, Hasher};
use std::{fmt, mem, ptr};

use crate::entity::{Entity, Kind};

mod registry;
pub use registry::{CompId, Registry};

#[cfg(test)]
mod tests;

/// A data type that can be attached to entities.
///
/// Usually implemented through `#[derive(Component)]`.
pub trait Component: Default + Clone + Send + Sync + 'static {
    /// Whether the component is stored per entity or per chunk.
    const KIND: Kind = Kind::Generic;

    /// The physical layout of the component column.
    const LAYOUT: LayoutTag = LayoutTag::Aos;

    /// A human-readable name, unique within a world.
    fn name() -> &'static str { std::any::type_name::<Self>() }

    /// The fields of a SoA component, in declaration order.
    ///
    /// Only consulted when `LAYOUT` is [`LayoutTag::Soa`].
    fn soa_fields() -> Vec<SoaField> { Vec::new() }
}

/// Selects the column layout of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutTag {
    /// Array of structures.
    Aos,
    /// Structure of arrays.
    Soa,
}

/// Describes one field of a SoA component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoaField {
    /// Byte offset of the field inside the component value.
    pub offset:  u32,
    /// Byte size of the field.
    pub size:    u32,
    /// Alignment of the field.
    pub align:   u32,
    /// The type of the field, checked by typed field slices.
    pub type_id: TypeId,
}

impl SoaField {
    /// Describes a field of type `F` at `offset`.
    pub fn of<F: 'static>(offset: usize) -> Self {
        Self {
            offset:  offset.try_into().expect("field offset overflow"),
            size:    mem::size_of::<F>().try_into().expect("field size overflow"),
            align:   mem::align_of::<F>().try_into().expect("field alignment overflow"),
            type_id: TypeId::of::<F>(),
        }
    }
}

/// The resolved physical layout of a registered component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Values are stored contiguously.
    Aos,
    /// Each field is stored in its own array.
    Soa(Vec<SoaField>),
}

/// Constructs a default value at `dst`.
pub type CtorFn = unsafe fn(dst: *mut u8);
/// Drops the value at `ptr` in place.
pub type DtorFn = unsafe fn(ptr: *mut u8);
/// Clones the value at `src` into the uninitialized `dst`.
pub type CloneFn = unsafe fn(src: *const u8, dst: *mut u8);

/// Type-erased lifecycle hooks of a component.
///
/// A missing `ctor` zero-fills the value,
/// a missing `dtor` leaves the bytes as they are,
/// and a missing `clone` copies the bytes.
#[derive(Clone, Copy, Default)]
pub struct Hooks {
    /// Constructs a default value.
    pub ctor:  Option<CtorFn>,
    /// Drops a value.
    pub dtor:  Option<DtorFn>,
    /// Clones a value.
    pub clone: Option<CloneFn>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("ctor", &self.ctor.is_some())
            .field("dtor", &self.dtor.is_some())
            .field("clone", &self.clone.is_some())
            .finish()
    }
}

impl Hooks {
    /// Hooks for a typed component.
    pub fn of<T: Component>() -> Self {
        Self {
            ctor:  Some(ctor_ptr::<T>),
            dtor:  mem::needs_drop::<T>().then_some(dtor_ptr::<T> as DtorFn),
            clone: Some(clone_ptr::<T>),
        }
    }
}

unsafe fn ctor_ptr<T: Component>(dst: *mut u8) {
    // Safety: the caller provides uninitialized memory suitable for `T`.
    unsafe { ptr::write(dst.cast::<T>(), T::default()) }
}

unsafe fn dtor_ptr<T: Component>(ptr: *mut u8) {
    // Safety: the caller provides a valid `T` that is not used again.
    unsafe { ptr::drop_in_place(ptr.cast::<T>()) }
}

unsafe fn clone_ptr<T: Component>(src: *const u8, dst: *mut u8) {
    // Safety: `src` is a valid `T` and `dst` is uninitialized memory suitable for `T`.
    unsafe {
        let value = (*src.cast::<T>()).clone();
        ptr::write(dst.cast::<T>(), value);
    }
}

/// Describes a registered component.
#[derive(Debug, Clone)]
pub struct Desc {
    /// Index of the descriptor in the registry.
    pub comp_id: CompId,
    /// The entity standing for the component in schemas and queries.
    pub entity:  Entity,
    /// Byte size of one value.
    pub size:    u32,
    /// Alignment of one value.
    pub align:   u32,
    /// Unique name.
    pub name:    String,
    /// Hash of the name.
    pub hash:    u64,
    /// Per-row or per-chunk storage.
    pub kind:    Kind,
    /// Physical layout.
    pub layout:  Layout,
    /// Lifecycle hooks.
    pub hooks:   Hooks,
    /// The Rust type, if any.
    pub type_id: Option<TypeId>,
}

impl Desc {
    /// Whether values of this component occupy storage.
    pub fn is_sized(&self) -> bool { self.size > 0 }
}

pub(crate) fn hash_name(name: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}
