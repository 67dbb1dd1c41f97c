//! Physical layout of a tracked block.
//!
//! ```text
//! +-------------+-----------+------------------+------------+
//! | BlockHeader | pre-guard | payload (len)    | post-guard |
//! +-------------+-----------+------------------+------------+
//! ^ base                    ^ payload address
//! ```
//!
//! The header doubles as the tree node of the owning index.

use core::mem::size_of;
use core::ptr::{self, NonNull};

use crate::heap::Origin;

/// Length of each guard region.
pub const GUARD_SIZE: usize = 16;

/// Byte pattern written into both guard regions.
pub const GUARD: [u8; GUARD_SIZE] = [
    0xDE, 0xAD, 0xBE, 0xEF, 0xDE, 0xAD, 0xBE, 0xEF, 0xDE, 0xAD, 0xBE, 0xEF, 0xDE, 0xAD, 0xBE, 0xEF,
];

/// Byte pattern written over freed payloads.
pub const POISON_BYTE: u8 = 0xFE;

/// Alignment the raw supplier must provide and the payload inherits.
pub const BLOCK_ALIGN: usize = 16;

pub(crate) type Link = Option<NonNull<BlockHeader>>;

#[repr(C, align(16))]
pub(crate) struct BlockHeader {
    pub(crate) left: Link,
    pub(crate) right: Link,
    pub(crate) len: usize,
    pub(crate) origin: Origin,
}

pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

/// Distance from the start of the block to the payload.
pub const PAYLOAD_OFFSET: usize = HEADER_SIZE + GUARD_SIZE;

const _: () = assert!(PAYLOAD_OFFSET % BLOCK_ALIGN == 0);

/// Bytes to request from the supplier for a payload of `len` bytes, or `None`
/// if that does not fit in a `usize`.
pub const fn total_size(len: usize) -> Option<usize> {
    len.checked_add(PAYLOAD_OFFSET + GUARD_SIZE)
}

/// Intact flags for the two guard regions of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardState {
    pub pre: bool,
    pub post: bool,
}

impl GuardState {
    pub const fn intact(self) -> bool {
        self.pre && self.post
    }
}

/// Lay out a fresh block at `base` and return its header.
///
/// # Safety
/// `base` must be `BLOCK_ALIGN`-aligned and valid for writes of
/// `total_size(len)` bytes.
pub(crate) unsafe fn build(
    base: NonNull<u8>,
    len: usize,
    origin: Origin,
    fill: u8,
) -> NonNull<BlockHeader> {
    let header = base.cast::<BlockHeader>();
    // SAFETY: base is aligned for BlockHeader and large enough to hold it.
    unsafe {
        header.write(BlockHeader {
            left: None,
            right: None,
            len,
            origin,
        })
    };

    // SAFETY: every offset below stays within total_size(len).
    unsafe {
        let pre = base.as_ptr().add(HEADER_SIZE);
        ptr::copy_nonoverlapping(GUARD.as_ptr(), pre, GUARD_SIZE);
        let payload = pre.add(GUARD_SIZE);
        ptr::write_bytes(payload, fill, len);
        ptr::copy_nonoverlapping(GUARD.as_ptr(), payload.add(len), GUARD_SIZE);
    }
    header
}

/// Payload address of a block.
pub(crate) fn payload(header: NonNull<BlockHeader>) -> NonNull<u8> {
    // SAFETY: the payload lies inside the same block.
    unsafe { header.cast::<u8>().add(PAYLOAD_OFFSET) }
}

/// Payload address as an integer key, without touching the block.
pub(crate) fn address_of(header: NonNull<BlockHeader>) -> usize {
    header.as_ptr() as usize + PAYLOAD_OFFSET
}

/// Compare both guard regions against [`GUARD`].
///
/// # Safety
/// `header` must point at a block produced by [`build`] that is still live.
pub(crate) unsafe fn check(header: NonNull<BlockHeader>) -> GuardState {
    // SAFETY: caller guarantees a live block, so both guards are readable.
    unsafe {
        let len = (*header.as_ptr()).len;
        let payload = payload(header).as_ptr();
        let pre = core::slice::from_raw_parts(payload.sub(GUARD_SIZE), GUARD_SIZE);
        let post = core::slice::from_raw_parts(payload.add(len), GUARD_SIZE);
        GuardState {
            pre: pre == GUARD,
            post: post == GUARD,
        }
    }
}

/// Overwrite a payload with [`POISON_BYTE`].
///
/// # Safety
/// `header` must point at a live block.
pub(crate) unsafe fn poison(header: NonNull<BlockHeader>) {
    // SAFETY: the payload is len bytes long.
    unsafe {
        let len = (*header.as_ptr()).len;
        ptr::write_bytes(payload(header).as_ptr(), POISON_BYTE, len);
    }
}
