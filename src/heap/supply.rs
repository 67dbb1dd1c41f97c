use core::ptr::NonNull;

use crate::heap::block::BLOCK_ALIGN;

/// The raw memory underneath the tracker.
///
/// # Safety
/// `acquire` must return blocks aligned to [`BLOCK_ALIGN`] that are valid for
/// reads and writes of `size` bytes and do not overlap any other live block.
/// `release` must accept exactly what `acquire` returned, with the same size.
pub unsafe trait RawSupply {
    fn acquire(&self, size: usize) -> Option<NonNull<u8>>;

    /// # Safety
    /// `base` must come from `acquire(size)` on this supplier and not have
    /// been released yet.
    unsafe fn release(&self, base: NonNull<u8>, size: usize);
}

/// The C runtime's `malloc`/`free`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Malloc;

// SAFETY: malloc aligns to two machine words; when that is short of
// BLOCK_ALIGN the block comes from posix_memalign instead.
unsafe impl RawSupply for Malloc {
    fn acquire(&self, size: usize) -> Option<NonNull<u8>> {
        // SAFETY: the block is only ever handed back through `release`.
        let ptr = unsafe {
            if 2 * core::mem::size_of::<usize>() >= BLOCK_ALIGN {
                crate::platform::malloc(size)
            } else {
                crate::platform::memalign(size, BLOCK_ALIGN)
            }
        };
        NonNull::new(ptr)
    }

    unsafe fn release(&self, base: NonNull<u8>, _size: usize) {
        // SAFETY: base was returned by malloc or posix_memalign.
        unsafe { crate::platform::free(base.as_ptr()) }
    }
}
