//! Allocator strategy for queue slot arrays
//!
//! The queue does not pick its allocator; it is handed a strategy at
//! construction and uses it exactly twice: once to allocate the slot array
//! and once to free it. No global mutable allocator state exists.
//!
//! Strategies run single-threaded only (queue construction and teardown).

use core::alloc::Layout;

/// Pluggable aligned-allocation strategy
///
/// # Contract
///
/// `allocate` returns a pointer aligned to `layout.align()` with at least
/// `layout.size()` usable bytes, or null on failure. `deallocate` frees a
/// pointer previously returned by `allocate` on the same strategy with the
/// same layout.
pub trait AllocStrategy: Send + Sync {
    /// Allocate `layout.size()` bytes aligned to `layout.align()`.
    ///
    /// Returns null on failure.
    fn allocate(&self, layout: Layout) -> *mut u8;

    /// Free a pointer previously returned by `allocate`.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this strategy with the same
    /// `layout`, and must not be freed twice.
    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout);
}

/// Default strategy backed by the system aligned allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAlloc;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        impl AllocStrategy for SystemAlloc {
            fn allocate(&self, layout: Layout) -> *mut u8 {
                // aligned_alloc requires size to be a multiple of alignment
                let size = layout.size().next_multiple_of(layout.align());
                unsafe { libc::aligned_alloc(layout.align(), size) as *mut u8 }
            }

            unsafe fn deallocate(&self, ptr: *mut u8, _layout: Layout) {
                libc::free(ptr as *mut libc::c_void);
            }
        }
    } else {
        impl AllocStrategy for SystemAlloc {
            fn allocate(&self, layout: Layout) -> *mut u8 {
                unsafe { std::alloc::alloc(layout) }
            }

            unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout) {
                std::alloc::dealloc(ptr, layout);
            }
        }
    }
}
