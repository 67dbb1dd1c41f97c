//! Address-ordered index of live blocks.
//!
//! An unbalanced binary search tree whose nodes are the block headers
//! themselves, keyed by payload address. Nothing here allocates.

use core::ptr::NonNull;

use crate::heap::block::{self, BlockHeader, Link};
use crate::heap::error::TrackError;
use crate::heap::Origin;

/// Read-only view of one live block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveRecord {
    pub address: usize,
    pub len: usize,
    pub origin: Origin,
}

impl LiveRecord {
    fn of(node: NonNull<BlockHeader>) -> Self {
        // SAFETY: nodes reachable from an index are live headers.
        let header = unsafe { node.as_ref() };
        Self {
            address: block::address_of(node),
            len: header.len,
            origin: header.origin,
        }
    }
}

/// The link that currently points at a located node.
pub(crate) struct Slot {
    link: NonNull<Link>,
    node: NonNull<BlockHeader>,
}

impl Slot {
    pub(crate) fn node(&self) -> NonNull<BlockHeader> {
        self.node
    }
}

pub struct AllocationIndex {
    root: Link,
    count: usize,
    bytes: usize,
}

// SAFETY: the index exclusively owns every header reachable from `root`.
unsafe impl Send for AllocationIndex {}

impl Default for AllocationIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn left(node: NonNull<BlockHeader>) -> Link {
    // SAFETY: node is a live header owned by the index.
    unsafe { (*node.as_ptr()).left }
}

fn right(node: NonNull<BlockHeader>) -> Link {
    // SAFETY: node is a live header owned by the index.
    unsafe { (*node.as_ptr()).right }
}

fn set_right(node: NonNull<BlockHeader>, link: Link) {
    // SAFETY: node is a live header owned by the index.
    unsafe { (*node.as_ptr()).right = link }
}

fn left_slot(node: NonNull<BlockHeader>) -> NonNull<Link> {
    // SAFETY: node is non-null, so is the address of its field.
    unsafe { NonNull::new_unchecked(&raw mut (*node.as_ptr()).left) }
}

fn right_slot(node: NonNull<BlockHeader>) -> NonNull<Link> {
    // SAFETY: as above.
    unsafe { NonNull::new_unchecked(&raw mut (*node.as_ptr()).right) }
}

/// One move of the threaded walk from `node`. Calls `visit` when `node` is
/// reached in order and returns the next node to move from.
fn step(node: NonNull<BlockHeader>, visit: &mut dyn FnMut(NonNull<BlockHeader>)) -> Link {
    let Some(l) = left(node) else {
        visit(node);
        return right(node);
    };
    let mut pred = l;
    loop {
        match right(pred) {
            Some(next) if next != node => pred = next,
            _ => break,
        }
    }
    if right(pred) == Some(node) {
        set_right(pred, None);
        visit(node);
        right(node)
    } else {
        set_right(pred, Some(node));
        Some(l)
    }
}

/// Position of an in-progress walk. Dropping it before the walk is done
/// runs the rest of the walk without visiting, which removes every thread
/// still in the tree.
struct ThreadedWalk {
    cur: Link,
}

impl Drop for ThreadedWalk {
    fn drop(&mut self) {
        while let Some(node) = self.cur {
            self.cur = step(node, &mut |_| {});
        }
    }
}

impl AllocationIndex {
    pub const fn new() -> Self {
        Self {
            root: None,
            count: 0,
            bytes: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Sum of live payload lengths.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Link a freshly built header into the tree.
    ///
    /// # Safety
    /// `node` must be a header from [`block::build`] that is not reachable
    /// from any index.
    pub(crate) unsafe fn insert(&mut self, node: NonNull<BlockHeader>) -> Result<(), TrackError> {
        let address = block::address_of(node);
        let mut slot = NonNull::from(&mut self.root);
        // SAFETY: slot always points at the root or at a link field of a live
        // header, and nothing else holds a reference into the tree.
        unsafe {
            while let Some(cur) = *slot.as_ptr() {
                let cur_address = block::address_of(cur);
                if cur_address == address {
                    return Err(TrackError::DuplicateAllocation { address });
                }
                slot = if address < cur_address {
                    left_slot(cur)
                } else {
                    right_slot(cur)
                };
            }
            *slot.as_ptr() = Some(node);
            self.count += 1;
            self.bytes += (*node.as_ptr()).len;
        }
        Ok(())
    }

    /// Find the link holding the node whose payload sits at `address`.
    pub(crate) fn locate(&mut self, address: usize) -> Result<Slot, TrackError> {
        if self.root.is_none() {
            return Err(TrackError::EmptyHeapDeallocation { address });
        }
        let mut slot = NonNull::from(&mut self.root);
        // SAFETY: see `insert`.
        unsafe {
            while let Some(cur) = *slot.as_ptr() {
                let cur_address = block::address_of(cur);
                if cur_address == address {
                    return Ok(Slot { link: slot, node: cur });
                }
                slot = if address < cur_address {
                    left_slot(cur)
                } else {
                    right_slot(cur)
                };
            }
        }
        Err(TrackError::UnmanagedDeallocation { address })
    }

    /// Remove a located node and hand its header back to the caller.
    ///
    /// With two children, the left subtree takes the node's place and the old
    /// right subtree hangs off the left subtree's rightmost node. Everything
    /// in the right subtree is greater than everything in the left, so order
    /// is preserved.
    pub(crate) fn unlink(&mut self, slot: Slot) -> NonNull<BlockHeader> {
        let node = slot.node;
        let replacement = match (left(node), right(node)) {
            (Some(l), Some(r)) => {
                let mut end = l;
                while let Some(next) = right(end) {
                    end = next;
                }
                set_right(end, Some(r));
                Some(l)
            }
            (Some(child), None) | (None, Some(child)) => Some(child),
            (None, None) => None,
        };
        // SAFETY: slot came from `locate` on this index with no mutation since.
        unsafe {
            *slot.link.as_ptr() = replacement;
            let header = &mut *node.as_ptr();
            header.left = None;
            header.right = None;
            self.count -= 1;
            self.bytes -= header.len;
        }
        node
    }

    /// Visit every record in ascending address order.
    ///
    /// Threaded traversal: each left subtree's rightmost node temporarily
    /// points back at its successor. No recursion and no stack, and every
    /// link is restored by the time the walk ends, including when `f`
    /// unwinds.
    pub fn for_each(&self, mut f: impl FnMut(LiveRecord)) {
        let mut walk = ThreadedWalk { cur: self.root };
        while let Some(node) = walk.cur {
            walk.cur = step(node, &mut |n| f(LiveRecord::of(n)));
        }
    }

    /// Depth of the deepest leaf; 0 when empty.
    #[cfg(test)]
    fn depth(&self) -> usize {
        fn walk(link: Link) -> usize {
            match link {
                None => 0,
                Some(n) => 1 + walk(left(n)).max(walk(right(n))),
            }
        }
        walk(self.root)
    }
}
