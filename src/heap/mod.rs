pub mod block;
pub mod diagnostic;
pub mod error;
pub mod index;
pub mod report;
pub mod spinlock;
pub mod supply;

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU8, Ordering};

use diagnostic::{Sink, Stderr};
use error::TrackError;
use index::{AllocationIndex, LiveRecord};
use report::LeakSummary;
use spinlock::SpinLock;
use supply::{Malloc, RawSupply};

/// Allocation family. Each family has its own index, so a block can only be
/// freed through the family it was allocated with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AllocKind {
    /// Single objects.
    Scalar = 0,
    /// Arrays.
    Vector = 1,
}

/// Where an allocation was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Origin {
    pub file: &'static str,
    pub line: u32,
}

impl Origin {
    pub const UNKNOWN: Self = Self::new("(unknown)", 0);

    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// The source location of the caller.
    #[track_caller]
    pub fn caller() -> Self {
        let location = core::panic::Location::caller();
        Self::new(location.file(), location.line())
    }
}

// Odd step, so the fill byte cycles through all 256 values.
const FILL_STEP: u8 = 0x3B;
const FILL_SEED: u8 = 0xA5;

/// The debug heap: two disjoint indexes over a raw supplier.
///
/// Every live block is tracked until it is freed through the matching
/// [`AllocKind`]. Blocks that are never freed are never released, so their
/// contents survive for [`Tracker::report`].
pub struct Tracker<S: RawSupply = Malloc> {
    scalar: SpinLock<AllocationIndex>,
    vector: SpinLock<AllocationIndex>,
    fill: AtomicU8,
    supply: S,
}

impl Tracker<Malloc> {
    pub const fn new() -> Self {
        Self::with_supply(Malloc)
    }
}

impl Default for Tracker<Malloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RawSupply> Tracker<S> {
    pub const fn with_supply(supply: S) -> Self {
        Self {
            scalar: SpinLock::new(AllocationIndex::new()),
            vector: SpinLock::new(AllocationIndex::new()),
            fill: AtomicU8::new(FILL_SEED),
            supply,
        }
    }

    pub fn supply(&self) -> &S {
        &self.supply
    }

    fn index(&self, kind: AllocKind) -> &SpinLock<AllocationIndex> {
        match kind {
            AllocKind::Scalar => &self.scalar,
            AllocKind::Vector => &self.vector,
        }
    }

    /// Allocate a tracked block of at least one byte.
    ///
    /// The payload is 16-byte aligned and filled with a byte that changes
    /// between calls. Supplier exhaustion is `Err(Exhausted)`; any other error
    /// is fatal.
    pub fn allocate(
        &self,
        size: usize,
        origin: Origin,
        kind: AllocKind,
    ) -> Result<NonNull<u8>, TrackError> {
        let len = size.max(1);
        let total = block::total_size(len).ok_or(TrackError::Exhausted { requested: size })?;
        let base = self
            .supply
            .acquire(total)
            .ok_or(TrackError::Exhausted { requested: size })?;
        let fill = self.fill.fetch_add(FILL_STEP, Ordering::Relaxed);

        // SAFETY: base is BLOCK_ALIGN-aligned and `total` bytes long.
        let header = unsafe { block::build(base, len, origin, fill) };
        // SAFETY: the header is brand new and in no index.
        unsafe { self.index(kind).lock().insert(header)? };
        Ok(block::payload(header))
    }

    /// Free a block previously returned by [`Tracker::allocate`] with the same
    /// `kind`. Null is ignored.
    ///
    /// The address is only compared against live blocks, never dereferenced,
    /// so any pointer value may be passed. On error nothing is freed.
    pub fn deallocate(&self, ptr: *mut u8, kind: AllocKind) -> Result<(), TrackError> {
        if ptr.is_null() {
            return Ok(());
        }
        let address = ptr as usize;

        let header = {
            let mut index = self.index(kind).lock();
            let slot = index.locate(address)?;
            // SAFETY: the node is live in this index.
            let guards = unsafe { block::check(slot.node()) };
            if !guards.intact() {
                // SAFETY: as above.
                let len = unsafe { slot.node().as_ref().len };
                return Err(TrackError::CorruptedGuard {
                    address,
                    len,
                    underrun: !guards.pre,
                    overrun: !guards.post,
                });
            }
            // SAFETY: as above.
            unsafe { block::poison(slot.node()) };
            index.unlink(slot)
        };

        // SAFETY: the header is out of the index and nothing else refers to it.
        let total = unsafe { block::PAYLOAD_OFFSET + header.as_ref().len + block::GUARD_SIZE };
        // SAFETY: the block came from `acquire(total)` in `allocate`.
        unsafe { self.supply.release(header.cast(), total) };
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.scalar.lock().is_empty() && self.vector.lock().is_empty()
    }

    pub fn live_blocks(&self, kind: AllocKind) -> usize {
        self.index(kind).lock().len()
    }

    pub fn live_bytes(&self, kind: AllocKind) -> usize {
        self.index(kind).lock().bytes()
    }

    /// Visit the live blocks of one family in ascending address order.
    ///
    /// The index stays locked for the whole walk: `f` must not allocate
    /// through this tracker.
    pub fn for_each_live(&self, kind: AllocKind, f: impl FnMut(LiveRecord)) {
        self.index(kind).lock().for_each(f);
    }

    /// Write the leak report to stderr. Prints nothing when no blocks are live.
    pub fn report(&self) -> LeakSummary {
        let summary = self.report_to(&mut Stderr);
        if !summary.is_clean() {
            log::warn!(
                "{} bytes still live in {} tracked blocks",
                summary.bytes,
                summary.blocks
            );
        }
        summary
    }

    /// Write the leak report to `sink`.
    pub fn report_to(&self, sink: &mut dyn Sink) -> LeakSummary {
        report::write(sink, &self.scalar, &self.vector)
    }
}

static GLOBAL: Tracker<Malloc> = Tracker::new();

/// The process-wide tracker behind [`crate::TrackingAlloc`] and the C entry
/// points.
pub fn global() -> &'static Tracker<Malloc> {
    &GLOBAL
}

extern "C" fn report_at_exit() {
    GLOBAL.report();
}

/// Print the global leak report when the process exits normally.
pub fn install_exit_report() -> bool {
    let installed = crate::platform::at_exit(report_at_exit);
    log::debug!("exit leak report installed: {installed}");
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_records_one_byte() {
        let tracker = Tracker::new();
        let p = tracker.allocate(0, Origin::caller(), AllocKind::Scalar).unwrap();
        assert_eq!(tracker.live_bytes(AllocKind::Scalar), 1);
        unsafe { p.as_ptr().write(7) };
        tracker.deallocate(p.as_ptr(), AllocKind::Scalar).unwrap();
        assert!(tracker.is_empty());
    }

    #[test]
    fn fill_byte_changes_between_allocations() {
        let tracker = Tracker::new();
        let a = tracker.allocate(4, Origin::UNKNOWN, AllocKind::Vector).unwrap();
        let b = tracker.allocate(4, Origin::UNKNOWN, AllocKind::Vector).unwrap();
        let (fa, fb) = unsafe { (a.as_ptr().read(), b.as_ptr().read()) };
        assert_ne!(fa, fb);
        assert_eq!(fb, fa.wrapping_add(FILL_STEP));
        tracker.deallocate(a.as_ptr(), AllocKind::Vector).unwrap();
        tracker.deallocate(b.as_ptr(), AllocKind::Vector).unwrap();
    }

    #[test]
    fn caller_origin_points_here() {
        let origin = Origin::caller();
        assert!(origin.file.ends_with("mod.rs"));
        assert!(origin.line > 0);
    }
}
