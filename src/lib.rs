//! A debug heap for diagnostic builds.
//!
//! Every block carries guard bytes on both sides and lives in one of two
//! address-ordered indexes (scalar or vector) until it is freed through the
//! same family. Double frees, mismatched frees, foreign pointers and guard
//! corruption are caught at free time; whatever is still live at exit is
//! listed by the leak report.
//!
//! ```no_run
//! #[global_allocator]
//! static GLOBAL: guardheap::TrackingAlloc = guardheap::TrackingAlloc;
//!
//! fn main() {
//!     guardheap::heap::install_exit_report();
//! }
//! ```

#![no_std]

#[cfg(test)]
extern crate std;

mod platform;

#[cfg(feature = "capi")]
pub mod capi;
pub mod heap;

pub use heap::error::TrackError;
pub use heap::{AllocKind, Origin, Tracker};

use core::alloc::{GlobalAlloc, Layout};

use heap::block::BLOCK_ALIGN;

/// Global allocator that routes every allocation through [`heap::global`].
///
/// Fatal tracker errors abort the process after printing a diagnostic.
/// Layouts aligned beyond [`BLOCK_ALIGN`] are served untracked. With the
/// `track` feature disabled this is a thin wrapper over the C allocator.
pub struct TrackingAlloc;

/// Alignment plain `malloc` guarantees: two machine words.
const MALLOC_ALIGN: usize = 2 * core::mem::size_of::<usize>();

unsafe fn untracked_alloc(layout: Layout) -> *mut u8 {
    // SAFETY: alignments are powers of two; anything above MALLOC_ALIGN is a
    // multiple of the pointer size, as posix_memalign requires.
    unsafe {
        if layout.align() <= MALLOC_ALIGN {
            platform::malloc(layout.size())
        } else {
            platform::memalign(layout.size(), layout.align())
        }
    }
}

unsafe impl GlobalAlloc for TrackingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        #[cfg(feature = "track")]
        {
            if layout.align() > BLOCK_ALIGN {
                // SAFETY: freed by the matching branch in dealloc.
                return unsafe { untracked_alloc(layout) };
            }
            match heap::global().allocate(layout.size(), Origin::UNKNOWN, AllocKind::Scalar) {
                Ok(ptr) => ptr.as_ptr(),
                Err(err) if err.is_fatal() => heap::diagnostic::fatal(err),
                Err(_) => core::ptr::null_mut(),
            }
        }
        #[cfg(not(feature = "track"))]
        {
            // SAFETY: freed by dealloc below.
            unsafe { untracked_alloc(layout) }
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        #[cfg(feature = "track")]
        {
            if layout.align() > BLOCK_ALIGN {
                // SAFETY: ptr came from untracked_alloc.
                unsafe { platform::free(ptr) };
                return;
            }
            if let Err(err) = heap::global().deallocate(ptr, AllocKind::Scalar) {
                heap::diagnostic::fatal(err);
            }
        }
        #[cfg(not(feature = "track"))]
        {
            let _ = layout;
            // SAFETY: ptr came from untracked_alloc.
            unsafe { platform::free(ptr) }
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // SAFETY: GlobalAlloc guarantees new_size rounded to align is valid.
        let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
        // SAFETY: forwarded contract.
        let new_ptr = unsafe { self.alloc(new_layout) };
        if new_ptr.is_null() {
            return new_ptr;
        }

        let copy_size = layout.size().min(new_size);
        // SAFETY: both blocks are valid for copy_size bytes and distinct.
        unsafe { core::ptr::copy_nonoverlapping(ptr, new_ptr, copy_size) };
        // SAFETY: ptr is still the caller's live block.
        unsafe { self.dealloc(ptr, layout) };

        new_ptr
    }
}
