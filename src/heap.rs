//! Sandbox Heap
//!
//! Uses `linked_list_allocator` over a slice of the binary's free RAM.
//!
//! # Memory Layout
//! The loader reserves [`FREE_RAM_SIZE`](crate::context::FREE_RAM_SIZE)
//! bytes for the stack, the GOT copy, `.data` and `.bss`. The program picks
//! the part left over and hands it to [`SandboxHeap::init`].
//!
//! # Security Considerations
//! - Initialized at most once; later calls are refused
//! - The region is not checked against the stack: the caller owns that
//! - With feature `heap` on the device, this is the global allocator

use core::alloc::{GlobalAlloc, Layout};

use linked_list_allocator::LockedHeap;

use crate::context::MemRegion;

/// Global heap allocator instance
#[cfg(all(feature = "heap", target_os = "none"))]
#[global_allocator]
pub static HEAP: SandboxHeap = SandboxHeap::empty();

pub struct SandboxHeap {
    inner: LockedHeap,
}

impl SandboxHeap {
    pub const fn empty() -> Self {
        Self {
            inner: LockedHeap::empty(),
        }
    }

    /// Give `region` to the allocator. Returns `false` if the heap already
    /// has memory or the region is empty.
    ///
    /// # Safety
    /// `region` must be writable, unused by anything else, and stay so for
    /// the rest of the execution.
    pub unsafe fn init(&self, region: MemRegion) -> bool {
        let mut heap = self.inner.lock();
        if heap.size() != 0 || region.is_empty() {
            log::warn!("[HEAP] init refused for {:?}", region);
            return false;
        }
        // SAFETY:
        // - The region is exclusively ours for the execution (caller)
        // - The lock is held, so no allocation races the init
        // - linked_list_allocator checks bounds from here on
        // Audited: 2026-10-19
        unsafe { heap.init(region.start() as *mut u8, region.len()) };
        log::debug!("[HEAP] {} bytes at {:#010x}", heap.size(), region.start());
        true
    }

    pub fn size(&self) -> usize {
        self.inner.lock().size()
    }

    pub fn used(&self) -> usize {
        self.inner.lock().used()
    }

    pub fn free(&self) -> usize {
        self.inner.lock().free()
    }
}

impl Default for SandboxHeap {
    fn default() -> Self {
        Self::empty()
    }
}

unsafe impl GlobalAlloc for SandboxHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // SAFETY:
        // - Same contract as ours, forwarded unchanged
        // - LockedHeap returns null on exhaustion, never panics
        // Audited: 2026-10-19
        unsafe { self.inner.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: `ptr` came from `alloc` with this `layout` (caller)
        unsafe { self.inner.dealloc(ptr, layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RegionKind;

    #[repr(align(16))]
    struct Arena([u8; 1024]);

    fn region_of(arena: &mut Arena) -> MemRegion {
        let start = arena.0.as_mut_ptr() as usize;
        MemRegion::new(RegionKind::Ram, start, start + arena.0.len())
    }

    #[test]
    fn test_alloc_and_free() {
        let mut arena = Arena([0; 1024]);
        let heap = SandboxHeap::empty();
        assert_eq!(heap.size(), 0);
        assert!(unsafe { heap.init(region_of(&mut arena)) });
        assert_eq!(heap.size(), 1024);

        let layout = Layout::from_size_align(64, 8).unwrap();
        let ptr = unsafe { heap.alloc(layout) };
        assert!(!ptr.is_null());
        assert!(heap.used() >= 64);
        assert_eq!(heap.used() + heap.free(), heap.size());

        unsafe { heap.dealloc(ptr, layout) };
        assert_eq!(heap.used(), 0);
    }

    #[test]
    fn test_exhaustion_returns_null() {
        let mut arena = Arena([0; 1024]);
        let heap = SandboxHeap::empty();
        assert!(unsafe { heap.init(region_of(&mut arena)) });

        let layout = Layout::from_size_align(4096, 8).unwrap();
        assert!(unsafe { heap.alloc(layout) }.is_null());
    }

    #[test]
    fn test_init_once() {
        let mut first = Arena([0; 1024]);
        let mut second = Arena([0; 1024]);
        let heap = SandboxHeap::empty();
        assert!(unsafe { heap.init(region_of(&mut first)) });
        assert!(!unsafe { heap.init(region_of(&mut second)) });
        assert!(!unsafe { SandboxHeap::empty().init(MemRegion::new(RegionKind::Ram, 8, 8)) });
    }
}
