use crate::error::LifetimeError;
use crate::tracking_allocator::ALLOCATOR;
use std::alloc::{self, GlobalAlloc, Layout};
use std::fmt;
use std::mem;
use std::ptr::NonNull;
use std::slice;

/// Alignment of every block. Word alignment keeps the bucket hash spread out.
pub const BLOCK_ALIGN: usize = mem::align_of::<usize>();

/// An owned, zero-initialised chunk of raw memory.
///
/// Whoever holds the `Block` owns the memory: a pointer container while the
/// block is registered, the caller once it has been exported. Dropping the
/// block returns the memory to [`ALLOCATOR`].
pub struct Block {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Block {
    /// Allocates `size` bytes. Zero-byte requests get one byte so every block
    /// has its own address.
    ///
    /// # Panics
    ///
    /// Panics if `size` cannot be laid out; aborts through
    /// [`alloc::handle_alloc_error`] if the allocator fails.
    pub fn new(size: usize) -> Self {
        match Self::try_new(size) {
            Ok(block) => block,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_new(size: usize) -> Result<Self, LifetimeError> {
        let layout = Self::layout_for(size)?;
        let ptr = unsafe { ALLOCATOR.alloc_zeroed(layout) };

        match NonNull::new(ptr) {
            Some(ptr) => Ok(Self { ptr, layout }),
            None => alloc::handle_alloc_error(layout),
        }
    }

    /// Takes back ownership of memory previously given away by
    /// [`Block::into_raw`] or by an untracked allocation.
    ///
    /// # Safety
    ///
    /// `ptr` must come from a block of exactly `size` requested bytes that has
    /// not been released yet, and no other `Block` may own it.
    pub unsafe fn from_raw(ptr: NonNull<u8>, size: usize) -> Self {
        let layout = match Self::layout_for(size) {
            Ok(layout) => layout,
            Err(err) => panic!("{err}"),
        };
        Self { ptr, layout }
    }

    /// Gives up ownership without releasing the memory.
    pub fn into_raw(self) -> NonNull<u8> {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }

    fn layout_for(size: usize) -> Result<Layout, LifetimeError> {
        Layout::from_size_align(size.max(1), BLOCK_ALIGN)
            .map_err(|_| LifetimeError::InvalidBlockSize { size })
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        unsafe {
            ALLOCATOR.dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("ptr", &self.ptr)
            .field("len", &self.len())
            .finish()
    }
}
