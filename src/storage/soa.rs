//! Views over structure-of-arrays columns.

use std::any::{self, TypeId};
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ops::Range;
use std::ptr;

use xias::Xias;

use super::FieldSlot;

/// Gathers one value from the field arrays.
///
/// # Safety
/// `base` must point to a chunk whose field arrays described by `fields` hold initialized data at `row`.
unsafe fn gather<T: Copy>(base: *mut u8, fields: &[FieldSlot], row: usize) -> T {
    let mut value = MaybeUninit::<T>::uninit();
    for field in fields {
        let size = field.size.small_int::<usize>();
        unsafe {
            ptr::copy_nonoverlapping(
                base.add(field.offset.small_int::<usize>() + row * size),
                value.as_mut_ptr().cast::<u8>().add(field.value_offset.small_int()),
                size,
            );
        }
    }
    // Safety: every field of `T` was written; padding may stay uninitialized.
    unsafe { value.assume_init() }
}

/// The field at `index`, asserting that it is declared as `F`.
fn checked_field<F: 'static>(fields: &[FieldSlot], index: usize) -> &FieldSlot {
    let field = fields.get(index).expect("field index out of bounds");
    assert!(field.type_id == TypeId::of::<F>(), "field {index} is not of type {}", any::type_name::<F>());
    field
}

/// A read-only view over a SoA column.
pub struct SoaRef<'t, T> {
    base:   *mut u8,
    fields: &'t [FieldSlot],
    rows:   Range<u16>,
    _ph:    PhantomData<&'t T>,
}

impl<'t, T: Copy> SoaRef<'t, T> {
    /// # Safety
    /// `base` must stay valid for `'t` and the field arrays must be initialized over `rows`.
    pub(crate) unsafe fn new(base: *mut u8, fields: &'t [FieldSlot], rows: Range<u16>) -> Self {
        Self { base, fields, rows, _ph: PhantomData }
    }

    /// Number of rows in the view.
    pub fn len(&self) -> usize { self.rows.len() }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Gathers the value at index `i` of the view.
    pub fn get(&self, i: usize) -> T {
        assert!(i < self.len(), "index {i} out of bounds");
        // Safety: checked above.
        unsafe { gather(self.base, self.fields, usize::from(self.rows.start) + i) }
    }

    /// Iterates over gathered values.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ { (0..self.len()).map(|i| self.get(i)) }

    /// The contiguous array of field `index`.
    ///
    /// # Panics
    /// Panics if `F` is not the declared type of the field.
    pub fn field<F: Copy + 'static>(&self, index: usize) -> &[F] {
        let field = checked_field::<F>(self.fields, index);
        // Safety: the array is aligned for the field type and initialized over `rows`.
        unsafe {
            std::slice::from_raw_parts(
                self.base.add(field.offset.small_int::<usize>() + usize::from(self.rows.start) * mem::size_of::<F>()).cast::<F>(),
                self.len(),
            )
        }
    }
}

/// A read-write view over a SoA column.
pub struct SoaMut<'t, T> {
    inner: SoaRef<'t, T>,
    _ph:   PhantomData<&'t mut T>,
}

impl<'t, T: Copy> SoaMut<'t, T> {
    /// # Safety
    /// Same as [`SoaRef::new`], and the caller must have exclusive access to `rows` of the column.
    pub(crate) unsafe fn new(base: *mut u8, fields: &'t [FieldSlot], rows: Range<u16>) -> Self {
        Self { inner: unsafe { SoaRef::new(base, fields, rows) }, _ph: PhantomData }
    }

    /// Reborrows as a read-only view.
    pub fn as_ref(&self) -> &SoaRef<'t, T> { &self.inner }

    /// Number of rows in the view.
    pub fn len(&self) -> usize { self.inner.len() }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool { self.inner.is_empty() }

    /// Gathers the value at index `i` of the view.
    pub fn get(&self, i: usize) -> T { self.inner.get(i) }

    /// Scatters `value` into index `i` of the view.
    pub fn set(&mut self, i: usize, value: T) {
        assert!(i < self.len(), "index {i} out of bounds");
        let row = usize::from(self.inner.rows.start) + i;
        let src = (&value as *const T).cast::<u8>();
        for field in self.inner.fields {
            let size = field.size.small_int::<usize>();
            // Safety: the row is inside the view and we have exclusive access to it.
            unsafe {
                ptr::copy_nonoverlapping(
                    src.add(field.value_offset.small_int()),
                    self.inner.base.add(field.offset.small_int::<usize>() + row * size),
                    size,
                );
            }
        }
    }

    /// The contiguous mutable array of field `index`.
    ///
    /// # Panics
    /// Panics if `F` is not the declared type of the field.
    pub fn field_mut<F: Copy + 'static>(&mut self, index: usize) -> &mut [F] {
        let field = checked_field::<F>(self.inner.fields, index);
        // Safety: the array is aligned for the field type and we have exclusive access to it.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.inner
                    .base
                    .add(field.offset.small_int::<usize>() + usize::from(self.inner.rows.start) * mem::size_of::<F>())
                    .cast::<F>(),
                self.inner.len(),
            )
        }
    }
}
