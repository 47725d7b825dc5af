//! A size-classed pool of raw chunk blocks.

use std::alloc;
use std::ptr::NonNull;

/// Byte budgets of the chunk size classes, smallest first.
pub const SIZE_CLASSES: [usize; 2] = [8 * 1024, 16 * 1024];

/// Alignment of every block; column alignments cannot exceed this.
pub const BLOCK_ALIGN: usize = 64;

fn block_layout(class: usize) -> alloc::Layout {
    let size = *SIZE_CLASSES.get(class).expect("invalid size class");
    alloc::Layout::from_size_align(size, BLOCK_ALIGN).expect("size classes are valid layouts")
}

/// An uninitialized, exclusively owned memory block of one size class.
pub(crate) struct Block {
    ptr:   NonNull<u8>,
    class: usize,
}

// Safety: a block is plain memory without interior references.
unsafe impl Send for Block {}
// Safety: shared access only hands out raw pointers; synchronization is up to the chunk.
unsafe impl Sync for Block {}

impl Block {
    fn new(class: usize) -> Self {
        let layout = block_layout(class);
        // Safety: size classes are non-zero.
        let ptr = unsafe { alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else { alloc::handle_alloc_error(layout) };
        Self { ptr, class }
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 { self.ptr.as_ptr() }

    pub(crate) fn class(&self) -> usize { self.class }

    pub(crate) fn size(&self) -> usize { SIZE_CLASSES[self.class] }
}

impl Drop for Block {
    fn drop(&mut self) {
        // Safety: the pointer was allocated with the same layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), block_layout(self.class)) }
    }
}

/// Recycles blocks released by empty chunks.
#[derive(Default)]
pub struct Pool {
    free:      [Vec<Block>; SIZE_CLASSES.len()],
    /// Number of blocks ever requested from the system allocator.
    allocated: usize,
}

impl Pool {
    /// Takes a block of `class`, reusing a released one if possible.
    pub(crate) fn alloc(&mut self, class: usize) -> Block {
        let free = self.free.get_mut(class).expect("invalid size class");
        match free.pop() {
            Some(block) => block,
            None => {
                self.allocated += 1;
                log::trace!("allocating a new {} byte block", SIZE_CLASSES[class]);
                Block::new(class)
            }
        }
    }

    /// Returns a block to the pool.
    pub(crate) fn release(&mut self, block: Block) {
        self.free.get_mut(block.class()).expect("blocks carry a valid class").push(block);
    }

    /// Returns all cached blocks to the system allocator.
    pub fn trim(&mut self) {
        for free in &mut self.free {
            free.clear();
        }
    }

    /// Number of blocks waiting for reuse.
    pub fn cached(&self) -> usize { self.free.iter().map(Vec::len).sum() }

    /// Number of blocks ever requested from the system allocator.
    pub fn allocated(&self) -> usize { self.allocated }
}
