use std::any::TypeId;
use std::mem::{self, ManuallyDrop};
use std::ops::Range;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use xias::Xias;

use super::pool::Block;
use super::{ChunkLayout, Column, FieldSlot, SoaMut, SoaRef};
use crate::comp::Component;
use crate::entity::Entity;

/// The lifecycle state of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// In use.
    Alive,
    /// Empty and waiting to be released after the remaining number of ticks.
    Dying(u16),
    /// Released to the pool; only observed in diagnostics.
    Freed,
}

/// Entities that changed rows during a chunk operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Relocated {
    moves: [Option<(Entity, u16)>; 2],
}

impl Relocated {
    fn push(&mut self, entity: Entity, row: u16) {
        let slot = self.moves.iter_mut().find(|slot| slot.is_none()).expect("at most two moves");
        *slot = Some((entity, row));
    }

    /// Iterates over `(entity, new row)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, u16)> + '_ { self.moves.iter().flatten().copied() }
}

/// A fixed-capacity storage block for rows of one archetype.
///
/// Rows `0..disabled` hold disabled entities and rows `disabled..len` hold enabled ones.
pub struct Chunk {
    block:        ManuallyDrop<Block>,
    layout:       Arc<ChunkLayout>,
    /// Position of this chunk in its archetype.
    index:        u32,
    len:          u16,
    disabled:     u16,
    lock:         u16,
    lifetime:     Lifetime,
    /// Last write version of every generic column followed by every unique column.
    versions:     Box<[AtomicU32]>,
    uniques_live: bool,
}

impl Chunk {
    /// Creates an empty chunk in `block`, constructing its unique components.
    pub(crate) fn new(block: Block, layout: Arc<ChunkLayout>, index: u32, version: u32) -> Self {
        assert_eq!(block.class(), layout.class, "block size class does not match the layout");

        let versions = (0..layout.columns.len() + layout.uniques.len()).map(|_| AtomicU32::new(version)).collect();
        let mut chunk = Self {
            block: ManuallyDrop::new(block),
            layout,
            index,
            len: 0,
            disabled: 0,
            lock: 0,
            lifetime: Lifetime::Alive,
            versions,
            uniques_live: false,
        };

        for column in &chunk.layout.uniques {
            // Safety: the unique slot is uninitialized memory reserved for this column.
            unsafe { construct(column, chunk.block.as_ptr().add(column.offset.small_int())) };
        }
        chunk.uniques_live = true;

        chunk
    }

    /// The layout shared with the owning archetype.
    pub fn layout(&self) -> &Arc<ChunkLayout> { &self.layout }

    /// Position of this chunk in its archetype.
    pub fn index(&self) -> u32 { self.index }

    pub(crate) fn set_index(&mut self, index: u32) { self.index = index; }

    /// Number of rows.
    pub fn len(&self) -> u16 { self.len }

    /// Row capacity.
    pub fn capacity(&self) -> u16 { self.layout.capacity }

    /// Whether the chunk has no rows.
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Whether no more rows can be added.
    pub fn is_full(&self) -> bool { self.len >= self.layout.capacity }

    /// Number of disabled rows, which form a prefix of the chunk.
    pub fn disabled_len(&self) -> u16 { self.disabled }

    /// Rows of disabled entities.
    pub fn disabled_range(&self) -> Range<u16> { 0..self.disabled }

    /// Rows of enabled entities.
    pub fn enabled_range(&self) -> Range<u16> { self.disabled..self.len }

    /// Whether the row holds an enabled entity.
    pub fn is_enabled(&self, row: u16) -> bool { row >= self.disabled }

    /// The lifecycle state.
    pub fn lifetime(&self) -> Lifetime { self.lifetime }

    /// Whether the chunk is waiting to be released.
    pub fn is_dying(&self) -> bool { matches!(self.lifetime, Lifetime::Dying(_)) }

    /// Starts the grace period of an empty chunk.
    pub(crate) fn start_dying(&mut self, ticks: u16) {
        debug_assert!(self.is_empty());
        self.lifetime = Lifetime::Dying(ticks);
    }

    /// Consumes one tick of the grace period,
    /// returning `true` while the chunk still has time left.
    pub(crate) fn progress_death(&mut self) -> bool {
        match &mut self.lifetime {
            Lifetime::Dying(ticks) if *ticks > 0 => {
                *ticks -= 1;
                true
            }
            _ => false,
        }
    }

    /// Cancels the grace period of a refilled chunk.
    pub(crate) fn revive(&mut self) { self.lifetime = Lifetime::Alive; }

    /// Ends the grace period of a dying chunk.
    pub(crate) fn expire(&mut self) {
        if self.is_dying() {
            self.lifetime = Lifetime::Dying(0);
        }
    }

    /// Marks the chunk as being iterated.
    pub fn lock(&mut self) { self.lock += 1; }

    /// Releases one iteration lock.
    pub fn unlock(&mut self) {
        assert!(self.lock > 0, "chunk is not locked");
        self.lock -= 1;
    }

    /// Whether structural changes are currently forbidden.
    pub fn is_locked(&self) -> bool { self.lock > 0 }

    fn assert_unlocked(&self) {
        assert!(!self.is_locked(), "structural change on a locked chunk");
    }

    fn entity_ptr(&self) -> *mut Entity { self.block.as_ptr().cast() }

    /// Entities stored in all rows.
    pub fn entities(&self) -> &[Entity] { self.entity_view(0..self.len) }

    /// Entities stored in `rows`.
    pub fn entity_view(&self, rows: Range<u16>) -> &[Entity] {
        assert!(rows.end <= self.len, "row range {rows:?} exceeds chunk length {}", self.len);
        // Safety: rows below `len` hold initialized entities.
        unsafe { std::slice::from_raw_parts(self.entity_ptr().add(rows.start.into()), rows.len()) }
    }

    /// The entity stored in `row`.
    pub fn entity(&self, row: u16) -> Entity {
        *self.entity_view(row..row + 1).first().expect("range has one element")
    }

    fn cell_ptr(&self, column: &Column, row: u16) -> *mut u8 {
        debug_assert!(column.fields.is_none());
        // Safety: the offset stays inside the block by construction of the layout.
        unsafe {
            self.block
                .as_ptr()
                .add(column.offset.small_int::<usize>() + usize::from(row) * column.size.small_int::<usize>())
        }
    }

    /// Appends an entity row after the enabled rows.
    ///
    /// The component cells of the new row are left uninitialized;
    /// the caller must construct or move into them.
    pub(crate) fn add_entity(&mut self, entity: Entity) -> u16 {
        self.assert_unlocked();
        assert!(!self.is_full(), "chunk is full");

        let row = self.len;
        // Safety: `row < capacity`, so the slot is inside the entity column.
        unsafe { self.entity_ptr().add(row.into()).write(entity) };
        self.len += 1;
        row
    }

    /// Default-constructs every generic cell of `row`.
    pub(crate) fn construct_row(&mut self, row: u16) {
        for column in &self.layout.columns {
            // Safety: the row was just added and its cells are uninitialized.
            unsafe { self.construct_cell(column, row) };
        }
    }

    unsafe fn construct_cell(&self, column: &Column, row: u16) {
        match &column.fields {
            None => unsafe { construct(column, self.cell_ptr(column, row)) },
            Some(fields) => {
                let mut scratch = Scratch::new(column.size);
                unsafe {
                    construct(column, scratch.as_mut_ptr());
                    for field in fields {
                        ptr::copy_nonoverlapping(
                            scratch.as_mut_ptr().add(field.value_offset.small_int()),
                            self.field_ptr(field, row),
                            field.size.small_int(),
                        );
                    }
                }
            }
        }
    }

    fn field_ptr(&self, field: &FieldSlot, row: u16) -> *mut u8 {
        // Safety: the offset stays inside the block by construction of the layout.
        unsafe {
            self.block
                .as_ptr()
                .add(field.offset.small_int::<usize>() + usize::from(row) * field.size.small_int::<usize>())
        }
    }

    /// Drops the generic cells of `row` whose id is not kept.
    pub(crate) fn drop_cells_except(&mut self, row: u16, keep: impl Fn(Entity) -> bool) {
        assert!(row < self.len, "row {row} out of bounds");
        for column in &self.layout.columns {
            if keep(column.id) {
                continue;
            }
            if let (Some(dtor), None) = (column.hooks.dtor, &column.fields) {
                // Safety: the cell holds a live value that is never read again.
                unsafe { dtor(self.cell_ptr(column, row)) };
            }
        }
    }

    /// Removes `row`, dropping all of its cells.
    ///
    /// Returns the entities that were moved to fill the hole.
    pub(crate) fn remove_entity(&mut self, row: u16) -> Relocated {
        self.assert_unlocked();
        self.drop_cells_except(row, |_| false);
        self.remove_moved_entity(row)
    }

    /// Removes `row` whose cells were already moved out or dropped.
    pub(crate) fn remove_moved_entity(&mut self, row: u16) -> Relocated {
        self.assert_unlocked();
        assert!(row < self.len, "row {row} out of bounds");

        let mut relocated = Relocated::default();
        let last = self.len - 1;

        if row < self.disabled {
            // fill the hole with the last disabled row, then the hole at the
            // end of the disabled prefix with the last enabled row
            let last_disabled = self.disabled - 1;
            if row != last_disabled {
                self.move_row(last_disabled, row);
                relocated.push(self.entity(row), row);
            }
            if last != last_disabled {
                self.move_row(last, last_disabled);
                relocated.push(self.entity(last_disabled), last_disabled);
            }
            self.disabled -= 1;
        } else if row != last {
            self.move_row(last, row);
            relocated.push(self.entity(row), row);
        }

        self.len -= 1;
        relocated
    }

    /// Moves or swaps `row` across the disabled boundary.
    ///
    /// Returns the new rows of the affected entities, including the toggled one.
    pub(crate) fn enable_entity(&mut self, row: u16, enable: bool) -> Relocated {
        self.assert_unlocked();
        assert!(row < self.len, "row {row} out of bounds");

        let mut relocated = Relocated::default();
        let target = if enable {
            if row >= self.disabled {
                return relocated;
            }
            self.disabled -= 1;
            self.disabled
        } else {
            if row < self.disabled {
                return relocated;
            }
            self.disabled += 1;
            self.disabled - 1
        };

        if target != row {
            self.swap_rows(row, target);
            relocated.push(self.entity(row), row);
        }
        relocated.push(self.entity(target), target);
        relocated
    }

    /// Bytewise moves `src` into the dead row `dst`.
    fn move_row(&mut self, src: u16, dst: u16) {
        // Safety: both rows are inside the chunk and distinct.
        unsafe {
            ptr::copy_nonoverlapping(self.entity_ptr().add(src.into()), self.entity_ptr().add(dst.into()), 1);
            for column in &self.layout.columns {
                match &column.fields {
                    None => ptr::copy_nonoverlapping(
                        self.cell_ptr(column, src),
                        self.cell_ptr(column, dst),
                        column.size.small_int(),
                    ),
                    Some(fields) => {
                        for field in fields {
                            ptr::copy_nonoverlapping(
                                self.field_ptr(field, src),
                                self.field_ptr(field, dst),
                                field.size.small_int(),
                            );
                        }
                    }
                }
            }
        }
    }

    /// Swaps two live rows.
    pub(crate) fn swap_rows(&mut self, a: u16, b: u16) {
        if a == b {
            return;
        }
        assert!(a < self.len && b < self.len, "rows {a} and {b} out of bounds");

        // Safety: both rows are inside the chunk and distinct.
        unsafe {
            ptr::swap_nonoverlapping(self.entity_ptr().add(a.into()), self.entity_ptr().add(b.into()), 1);
            for column in &self.layout.columns {
                match &column.fields {
                    None => ptr::swap_nonoverlapping(
                        self.cell_ptr(column, a),
                        self.cell_ptr(column, b),
                        column.size.small_int(),
                    ),
                    Some(fields) => {
                        for field in fields {
                            ptr::swap_nonoverlapping(
                                self.field_ptr(field, a),
                                self.field_ptr(field, b),
                                field.size.small_int(),
                            );
                        }
                    }
                }
            }
        }
    }

    /// Clones every generic cell of `src_row` into the uninitialized `dst_row` of the same chunk.
    pub(crate) fn clone_row_within(&mut self, src_row: u16, dst_row: u16) {
        assert_ne!(src_row, dst_row, "cloning a row onto itself");
        assert!(src_row < self.len && dst_row < self.len, "rows {src_row} and {dst_row} out of bounds");
        for column in &self.layout.columns {
            match (&column.fields, column.hooks.clone) {
                // Safety: `src_row` holds a live value and `dst_row` is uninitialized.
                (None, Some(clone)) => unsafe { clone(self.cell_ptr(column, src_row), self.cell_ptr(column, dst_row)) },
                // Safety: SoA and untyped components are plain data.
                _ => unsafe { copy_cell(self, column, src_row, self, column, dst_row) },
            }
        }
    }

    /// Moves the cells of `src_row` in `src` into `dst_row` of `dst` for every id both chunks store.
    ///
    /// Cells of ids only `dst` stores are default-constructed,
    /// cells of ids only `src` stores are dropped,
    /// and the source row is removed afterwards.
    pub(crate) fn transfer_row(src: &mut Self, src_row: u16, dst: &mut Self, dst_row: u16) -> Relocated {
        src.assert_unlocked();
        dst.assert_unlocked();

        for dst_column in &dst.layout.columns {
            match src.layout.column_index(dst_column.id) {
                Some(src_index) => {
                    let src_column = &src.layout.columns[src_index];
                    // Safety: both cells belong to the same component and `dst_row` is uninitialized.
                    unsafe { copy_cell(src, src_column, src_row, dst, dst_column, dst_row) };
                }
                // Safety: the new row is uninitialized for columns not in the source.
                None => unsafe { dst.construct_cell(dst_column, dst_row) },
            }
        }

        let dst_layout = Arc::clone(&dst.layout);
        src.drop_cells_except(src_row, |id| dst_layout.column_index(id).is_some());
        src.remove_moved_entity(src_row)
    }

    /// Clones every generic cell of `src_row` into the uninitialized `dst_row` of a chunk with the same layout.
    pub(crate) fn clone_row(src: &Self, src_row: u16, dst: &mut Self, dst_row: u16) {
        assert!(Arc::ptr_eq(&src.layout, &dst.layout), "cloning between different layouts");

        for column in &src.layout.columns {
            match (&column.fields, column.hooks.clone) {
                // Safety: `src` holds a live value and `dst` is uninitialized.
                (None, Some(clone)) => unsafe { clone(src.cell_ptr(column, src_row), dst.cell_ptr(column, dst_row)) },
                // Safety: SoA and untyped components are plain data.
                _ => unsafe { copy_cell(src, column, src_row, dst, column, dst_row) },
            }
        }
    }

    fn column(&self, id: Entity, type_id: TypeId) -> (usize, &Column) {
        let index = self.layout.column_index(id).unwrap_or_else(|| panic!("{id:?} is not stored in this chunk"));
        let column = &self.layout.columns[index];
        assert_eq!(column.type_id, Some(type_id), "{id:?} is not a column of the requested type");
        (index, column)
    }

    fn unique_column(&self, id: Entity, type_id: TypeId) -> (usize, &Column) {
        let index = self.layout.unique_index(id).unwrap_or_else(|| panic!("{id:?} is not a unique column of this chunk"));
        let column = &self.layout.uniques[index];
        assert_eq!(column.type_id, Some(type_id), "{id:?} is not a column of the requested type");
        (index, column)
    }

    /// Whether the chunk stores a generic column for `id`.
    pub fn has_column(&self, id: Entity) -> bool { self.layout.column_index(id).is_some() }

    /// Whether the chunk stores a unique column for `id`.
    pub fn has_unique(&self, id: Entity) -> bool { self.layout.unique_index(id).is_some() }

    /// Reads the AoS column of `id` over `rows`.
    ///
    /// # Panics
    /// Panics if `id` is not an AoS column of type `T`.
    pub fn view<T: Component>(&self, id: Entity, rows: Range<u16>) -> &[T] {
        assert!(rows.end <= self.len, "row range {rows:?} exceeds chunk length {}", self.len);
        let (_, column) = self.column(id, TypeId::of::<T>());
        assert!(column.fields.is_none(), "{id:?} uses the SoA layout");
        // Safety: the column holds initialized `T`s for every live row.
        unsafe { std::slice::from_raw_parts(self.cell_ptr(column, rows.start).cast::<T>(), rows.len()) }
    }

    /// Writes the AoS column of `id` over `rows`, marking it as changed at `version`.
    pub fn view_mut<T: Component>(&mut self, id: Entity, rows: Range<u16>, version: u32) -> &mut [T] {
        let index = self.column(id, TypeId::of::<T>()).0;
        self.bump(index, version);
        self.view_mut_silent(id, rows)
    }

    /// Writes the AoS column of `id` over `rows` without marking it as changed.
    pub fn view_mut_silent<T: Component>(&mut self, id: Entity, rows: Range<u16>) -> &mut [T] {
        assert!(rows.end <= self.len, "row range {rows:?} exceeds chunk length {}", self.len);
        let (_, column) = self.column(id, TypeId::of::<T>());
        assert!(column.fields.is_none(), "{id:?} uses the SoA layout");
        // Safety: the column holds initialized `T`s and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.cell_ptr(column, rows.start).cast::<T>(), rows.len()) }
    }

    /// Reads the SoA column of `id` over `rows`.
    pub fn soa<T: Component + Copy>(&self, id: Entity, rows: Range<u16>) -> SoaRef<'_, T> {
        assert!(rows.end <= self.len, "row range {rows:?} exceeds chunk length {}", self.len);
        let (_, column) = self.column(id, TypeId::of::<T>());
        let fields = column.fields.as_deref().unwrap_or_else(|| panic!("{id:?} uses the AoS layout"));
        // Safety: the field arrays hold initialized values for every live row.
        unsafe { SoaRef::new(self.block.as_ptr(), fields, rows) }
    }

    /// Writes the SoA column of `id` over `rows`, marking it as changed at `version`.
    pub fn soa_mut<T: Component + Copy>(&mut self, id: Entity, rows: Range<u16>, version: u32) -> SoaMut<'_, T> {
        assert!(rows.end <= self.len, "row range {rows:?} exceeds chunk length {}", self.len);
        let (index, _) = self.column(id, TypeId::of::<T>());
        self.bump(index, version);
        let column = &self.layout.columns[index];
        let fields = column.fields.as_deref().unwrap_or_else(|| panic!("{id:?} uses the AoS layout"));
        // Safety: `&mut self` guarantees exclusive access to the field arrays.
        unsafe { SoaMut::new(self.block.as_ptr(), fields, rows) }
    }

    /// Reads a single value of `id` in `row`, gathering it if the column uses the SoA layout.
    pub fn read<T: Component + Copy>(&self, id: Entity, row: u16) -> T {
        match self.column(id, TypeId::of::<T>()).1.fields {
            None => self.view::<T>(id, row..row + 1)[0],
            Some(_) => self.soa::<T>(id, row..row + 1).get(0),
        }
    }

    /// Moves `value` into the cell of `id` in `row`, dropping the previous value.
    ///
    /// The column is marked as changed at `version` unless it is `None`.
    pub(crate) fn replace<T: Component>(&mut self, id: Entity, row: u16, value: T, version: Option<u32>) {
        assert!(row < self.len, "row {row} out of bounds");
        let (index, column) = self.column(id, TypeId::of::<T>());
        match &column.fields {
            None => {
                // Safety: the cell holds a live `T` and `&mut self` is exclusive.
                let cell = unsafe { &mut *self.cell_ptr(column, row).cast::<T>() };
                *cell = value;
            }
            Some(fields) => {
                let value = mem::ManuallyDrop::new(value);
                let src = (&*value as *const T).cast::<u8>();
                for field in fields {
                    // Safety: SoA values are plain data and the row is live.
                    unsafe {
                        ptr::copy_nonoverlapping(
                            src.add(field.value_offset.small_int()),
                            self.field_ptr(field, row),
                            field.size.small_int(),
                        );
                    }
                }
            }
        }
        if let Some(version) = version {
            self.bump(index, version);
        }
    }

    /// Reads the unique component `id`.
    pub fn unique<T: Component>(&self, id: Entity) -> &T {
        let (_, column) = self.unique_column(id, TypeId::of::<T>());
        // Safety: unique cells are constructed with the chunk.
        unsafe { &*self.block.as_ptr().add(column.offset.small_int()).cast::<T>() }
    }

    /// Writes the unique component `id`, marking it as changed at `version`.
    pub fn unique_mut<T: Component>(&mut self, id: Entity, version: u32) -> &mut T {
        let (index, column) = self.unique_column(id, TypeId::of::<T>());
        let offset = column.offset.small_int::<usize>();
        self.bump(self.layout.columns.len() + index, version);
        // Safety: unique cells are constructed with the chunk and `&mut self` is exclusive.
        unsafe { &mut *self.block.as_ptr().add(offset).cast::<T>() }
    }

    /// The raw bytes of a generic AoS cell, used for untyped components.
    pub fn bytes(&self, id: Entity, row: u16) -> Option<&[u8]> {
        let column = &self.layout.columns[self.layout.column_index(id)?];
        if row >= self.len || column.fields.is_some() {
            return None;
        }
        // Safety: the cell is inside the block and initialized.
        Some(unsafe { std::slice::from_raw_parts(self.cell_ptr(column, row), column.size.small_int()) })
    }

    /// The raw bytes of a generic AoS cell, marking the column as changed.
    pub fn bytes_mut(&mut self, id: Entity, row: u16, version: u32) -> Option<&mut [u8]> {
        let index = self.layout.column_index(id)?;
        let column = &self.layout.columns[index];
        if row >= self.len || column.fields.is_some() || column.type_id.is_some() {
            return None;
        }
        let ptr = self.cell_ptr(column, row);
        let size = column.size.small_int();
        self.bump(index, version);
        // Safety: the cell is inside the block and only plain data lives in untyped columns.
        Some(unsafe { std::slice::from_raw_parts_mut(ptr, size) })
    }

    fn bump(&self, index: usize, version: u32) {
        self.versions[index].store(version, Ordering::Relaxed);
    }

    /// Marks every column as changed, used when rows move into the chunk.
    pub(crate) fn bump_all(&self, version: u32) {
        for slot in self.versions.iter() {
            slot.store(version, Ordering::Relaxed);
        }
    }

    /// Marks the generic column of `id` as changed from a shared reference.
    ///
    /// Used by parallel batches that each hold disjoint rows of the same chunk.
    pub(crate) fn bump_shared(&self, id: Entity, version: u32) {
        if let Some(index) = self.layout.column_index(id) {
            self.bump(index, version);
        } else if let Some(index) = self.layout.unique_index(id) {
            self.bump(self.layout.columns.len() + index, version);
        }
    }

    /// The last write version of the column of `id`.
    pub fn column_version(&self, id: Entity) -> Option<u32> {
        let index = match self.layout.column_index(id) {
            Some(index) => index,
            None => self.layout.columns.len() + self.layout.unique_index(id)?,
        };
        Some(self.versions[index].load(Ordering::Relaxed))
    }

    pub(crate) fn base_ptr(&self) -> *mut u8 { self.block.as_ptr() }

    /// The first cell of the AoS column of `id` in `rows`.
    ///
    /// Lets callers that own disjoint row ranges write through a shared chunk.
    pub(crate) fn aos_ptr<T: Component>(&self, id: Entity, rows: Range<u16>) -> *mut T {
        assert!(rows.end <= self.len, "row range {rows:?} exceeds chunk length {}", self.len);
        let (_, column) = self.column(id, TypeId::of::<T>());
        assert!(column.fields.is_none(), "{id:?} uses the SoA layout");
        self.cell_ptr(column, rows.start).cast()
    }

    /// The field arrays of the SoA column of `id`.
    pub(crate) fn soa_slots<T: Component>(&self, id: Entity, rows: Range<u16>) -> &[FieldSlot] {
        assert!(rows.end <= self.len, "row range {rows:?} exceeds chunk length {}", self.len);
        let (_, column) = self.column(id, TypeId::of::<T>());
        column.fields.as_deref().unwrap_or_else(|| panic!("{id:?} uses the AoS layout"))
    }

    fn drop_values(&mut self) {
        for row in 0..self.len {
            self.drop_cells_except(row, |_| false);
        }
        self.len = 0;
        self.disabled = 0;

        if mem::replace(&mut self.uniques_live, false) {
            for column in &self.layout.uniques {
                if let Some(dtor) = column.hooks.dtor {
                    // Safety: unique cells are live until this point.
                    unsafe { dtor(self.block.as_ptr().add(column.offset.small_int())) };
                }
            }
        }
    }

    /// Destroys all values and returns the memory block for reuse.
    pub(crate) fn into_block(self) -> Block {
        let mut this = ManuallyDrop::new(self);
        this.drop_values();
        this.lifetime = Lifetime::Freed;
        // Safety: `this` is not used again; its remaining fields are dropped exactly once here.
        unsafe {
            drop(ptr::read(&this.layout));
            drop(ptr::read(&this.versions));
            ManuallyDrop::take(&mut this.block)
        }
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        self.drop_values();
        // Safety: the block is not used after this point.
        unsafe { ManuallyDrop::drop(&mut self.block) };
    }
}

/// Constructs the value of `column` at `dst`, zero-filling untyped components.
unsafe fn construct(column: &Column, dst: *mut u8) {
    match column.hooks.ctor {
        Some(ctor) => unsafe { ctor(dst) },
        None => unsafe { ptr::write_bytes(dst, 0, column.size.small_int()) },
    }
}

/// Bytewise copies one cell between chunks.
unsafe fn copy_cell(src: &Chunk, src_column: &Column, src_row: u16, dst: &Chunk, dst_column: &Column, dst_row: u16) {
    match (&src_column.fields, &dst_column.fields) {
        (None, None) => unsafe {
            ptr::copy_nonoverlapping(
                src.cell_ptr(src_column, src_row),
                dst.cell_ptr(dst_column, dst_row),
                src_column.size.small_int(),
            )
        },
        (Some(src_fields), Some(dst_fields)) => {
            for (src_field, dst_field) in src_fields.iter().zip(dst_fields) {
                unsafe {
                    ptr::copy_nonoverlapping(
                        src.field_ptr(src_field, src_row),
                        dst.field_ptr(dst_field, dst_row),
                        src_field.size.small_int(),
                    )
                };
            }
        }
        _ => unreachable!("the same component always has the same layout"),
    }
}

/// A 16-byte aligned temporary buffer for assembling SoA values.
struct Scratch(Vec<u128>);

impl Scratch {
    fn new(size: u32) -> Self { Self(vec![0; size.small_int::<usize>().div_ceil(16).max(1)]) }

    fn as_mut_ptr(&mut self) -> *mut u8 { self.0.as_mut_ptr().cast() }
}
