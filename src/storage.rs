//! Chunked column storage.
//!
//! Every archetype stores its entities in fixed-size [`Chunk`]s carved from pooled memory blocks.
//! Inside a chunk, data is column-major:
//!
//! ```text
//! | entities[cap] | comp A[cap] | comp B.x[cap] | comp B.y[cap] | unique C | unique D |
//! ```
//!
//! Column offsets and the row capacity are solved once per archetype in [`ChunkLayout::new`].

use std::any::TypeId;

use xias::Xias;

use crate::comp::{self, Desc};
use crate::entity::Entity;

pub mod pool;
pub use pool::Pool;

mod chunk;
pub use chunk::{Chunk, Lifetime, Relocated};

mod soa;
pub use soa::{SoaMut, SoaRef};


/// Upper bound of rows in a single chunk.
pub const MAX_ROWS_PER_CHUNK: u16 = 512;

/// The smallest size class is chosen when it holds at least this many rows.
const PREFERRED_ROWS: u16 = 128;

/// One field array of a SoA column.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldSlot {
    /// Byte offset of the field array inside the chunk.
    pub(crate) offset:       u32,
    /// Byte size of one field value.
    pub(crate) size:         u32,
    pub(crate) align:        u32,
    /// Byte offset of the field inside the component value.
    pub(crate) value_offset: u32,
    pub(crate) type_id:      TypeId,
}

/// A component column inside a chunk.
#[derive(Debug, Clone)]
pub(crate) struct Column {
    pub(crate) id:      Entity,
    pub(crate) size:    u32,
    pub(crate) align:   u32,
    /// Byte offset of the column inside the chunk.
    /// For SoA columns this is the offset of the first field array.
    pub(crate) offset:  u32,
    pub(crate) hooks:   comp::Hooks,
    pub(crate) type_id: Option<TypeId>,
    /// Field arrays if the component uses the SoA layout.
    pub(crate) fields:  Option<Vec<FieldSlot>>,
}

impl Column {
    fn new(id: Entity, desc: &Desc) -> Self {
        Self {
            id,
            size: desc.size,
            align: desc.align,
            offset: 0,
            hooks: desc.hooks,
            type_id: desc.type_id,
            fields: match &desc.layout {
                comp::Layout::Aos => None,
                comp::Layout::Soa(fields) => Some(
                    fields
                        .iter()
                        .map(|field| FieldSlot {
                            offset:       0,
                            size:         field.size,
                            align:        field.align,
                            value_offset: field.offset,
                            type_id:      field.type_id,
                        })
                        .collect(),
                ),
            },
        }
    }
}

/// The solved layout shared by all chunks of an archetype.
#[derive(Debug)]
pub struct ChunkLayout {
    pub(crate) class:    usize,
    pub(crate) capacity: u16,
    /// Sized generic columns, sorted by id.
    pub(crate) columns:  Vec<Column>,
    /// Sized unique columns, sorted by id.
    pub(crate) uniques:  Vec<Column>,
}

impl ChunkLayout {
    /// Solves the layout for the given sized columns.
    ///
    /// Each entry pairs the schema id with the descriptor providing its data,
    /// which differs from the id itself for data-carrying pairs.
    ///
    /// # Panics
    /// Panics if not even a single row fits in the largest chunk class.
    pub fn new(generic: &[(Entity, &Desc)], unique: &[(Entity, &Desc)]) -> Self {
        let mut columns: Vec<Column> = generic.iter().map(|&(id, desc)| Column::new(id, desc)).collect();
        let mut uniques: Vec<Column> =
            unique.iter().map(|&(id, desc)| Column { fields: None, ..Column::new(id, desc) }).collect();

        for column in columns.iter().chain(&uniques) {
            assert!(
                column.align.small_int::<usize>() <= pool::BLOCK_ALIGN,
                "component {:?} is aligned beyond {} bytes",
                column.id,
                pool::BLOCK_ALIGN
            );
        }

        let mut best: Option<(usize, u16)> = None;
        for class in 0..pool::SIZE_CLASSES.len() {
            let capacity = solve_capacity(pool::SIZE_CLASSES[class], &columns, &uniques);
            if best.map_or(true, |(_, best_capacity)| capacity > best_capacity) {
                best = Some((class, capacity));
            }
            if capacity >= PREFERRED_ROWS {
                break;
            }
        }
        let (class, capacity) = best.expect("there is at least one size class");
        assert!(
            capacity > 0,
            "archetype with columns {:?} cannot fit a single row in a chunk",
            columns.iter().map(|column| column.id).collect::<Vec<_>>()
        );

        let used = assign_offsets(capacity, &mut columns, &mut uniques);
        debug_assert!(used <= pool::SIZE_CLASSES[class]);

        Self { class, capacity, columns, uniques }
    }

    /// Row capacity of every chunk using this layout.
    pub fn capacity(&self) -> u16 { self.capacity }

    /// Index of the size class used by chunks of this layout.
    pub fn class(&self) -> usize { self.class }

    pub(crate) fn column_index(&self, id: Entity) -> Option<usize> {
        self.columns.binary_search_by_key(&id, |column| column.id).ok()
    }

    pub(crate) fn unique_index(&self, id: Entity) -> Option<usize> {
        self.uniques.binary_search_by_key(&id, |column| column.id).ok()
    }
}

fn align_up(offset: usize, align: usize) -> usize { (offset + align - 1) & !(align - 1) }

/// Lays out every column for `capacity` rows, returning the total byte size.
fn layout_bytes(
    capacity: usize,
    columns: &[Column],
    uniques: &[Column],
    mut on_offset: impl FnMut(Slot, usize),
) -> usize {
    let mut offset = capacity * std::mem::size_of::<Entity>();

    for (index, column) in columns.iter().enumerate() {
        match &column.fields {
            None => {
                offset = align_up(offset, column.align.small_int());
                on_offset(Slot::Column(index), offset);
                offset += capacity * column.size.small_int::<usize>();
            }
            Some(fields) => {
                for (field_index, field) in fields.iter().enumerate() {
                    offset = align_up(offset, field.align.small_int());
                    on_offset(Slot::Field(index, field_index), offset);
                    offset += capacity * field.size.small_int::<usize>();
                }
            }
        }
    }

    for (index, column) in uniques.iter().enumerate() {
        offset = align_up(offset, column.align.small_int());
        on_offset(Slot::Unique(index), offset);
        offset += column.size.small_int::<usize>();
    }

    offset
}

enum Slot {
    Column(usize),
    Field(usize, usize),
    Unique(usize),
}

fn solve_capacity(budget: usize, columns: &[Column], uniques: &[Column]) -> u16 {
    let per_row = std::mem::size_of::<Entity>()
        + columns.iter().map(|column| column.size.small_int::<usize>()).sum::<usize>();
    let unique_bytes: usize = uniques
        .iter()
        .map(|column| column.size.small_int::<usize>() + column.align.small_int::<usize>())
        .sum();
    if unique_bytes >= budget {
        return 0;
    }

    // the estimate ignores padding, so walk down until everything fits
    let mut capacity = ((budget - unique_bytes) / per_row).min(MAX_ROWS_PER_CHUNK.into());
    while capacity > 0 && layout_bytes(capacity, columns, uniques, |_, _| {}) > budget {
        capacity -= 1;
    }
    capacity.small_int()
}

fn assign_offsets(
    capacity: u16,
    columns: &mut [Column],
    uniques: &mut [Column],
) -> usize {
    let mut offsets = Vec::new();
    let used = layout_bytes(capacity.into(), columns, uniques, |slot, offset| {
        offsets.push((slot, offset));
    });

    for (slot, offset) in offsets {
        let offset: u32 = offset.small_int();
        match slot {
            Slot::Column(index) => columns[index].offset = offset,
            Slot::Field(index, field_index) => {
                let column = &mut columns[index];
                if field_index == 0 {
                    column.offset = offset;
                }
                column.fields.as_mut().expect("field slots only exist for SoA columns")[field_index]
                    .offset = offset;
            }
            Slot::Unique(index) => uniques[index].offset = offset,
        }
    }

    used
}
