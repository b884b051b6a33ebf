use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

/// Allocator every [`Block`](crate::Block) is carved from.
pub static ALLOCATOR: TrackingAllocator = TrackingAllocator::new();

thread_local! {
    static LIVE_BLOCKS: Cell<usize> = const { Cell::new(0) };
    static LIVE_BYTES: Cell<usize> = const { Cell::new(0) };
}

/// Snapshot of the blocks the calling thread currently holds.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AllocationStats {
    pub live_blocks: usize,
    pub live_bytes: usize,
}

/// Thin wrapper around [`System`] that counts live blocks per thread.
///
/// Blocks never cross threads, so a thread-local counter sees every
/// allocation and release of the blocks it owns.
#[derive(Default)]
pub struct TrackingAllocator {
    _private: (),
}

impl TrackingAllocator {
    const fn new() -> Self {
        Self { _private: () }
    }

    pub fn get_count(&self) -> usize {
        LIVE_BLOCKS.try_with(Cell::get).unwrap_or(0)
    }

    pub fn get_bytes(&self) -> usize {
        LIVE_BYTES.try_with(Cell::get).unwrap_or(0)
    }

    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            live_blocks: self.get_count(),
            live_bytes: self.get_bytes(),
        }
    }

    fn record_alloc(size: usize) {
        // Counters may already be gone while thread-local destructors run.
        let _ = LIVE_BLOCKS.try_with(|count| count.set(count.get() + 1));
        let _ = LIVE_BYTES.try_with(|bytes| bytes.set(bytes.get() + size));
    }

    fn record_dealloc(size: usize) {
        let _ = LIVE_BLOCKS.try_with(|count| count.set(count.get().saturating_sub(1)));
        let _ = LIVE_BYTES.try_with(|bytes| bytes.set(bytes.get().saturating_sub(size)));
    }
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            Self::record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            Self::record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        Self::record_dealloc(layout.size());

        unsafe { System.dealloc(ptr, layout) };
    }
}
