use core::fmt;

/// Everything that can go wrong inside the tracker.
///
/// Only [`TrackError::Exhausted`] is an ordinary failure. The others mean the
/// heap can no longer be trusted; see [`crate::heap::diagnostic::fatal`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackError {
    /// A payload of `requested` bytes (as asked for by the caller) could not
    /// be provided, either because the block size overflows or because the
    /// raw supplier ran out.
    Exhausted { requested: usize },
    /// A freshly built block's payload address is already in the index.
    DuplicateAllocation { address: usize },
    /// Guard bytes around a payload were overwritten before it was freed.
    CorruptedGuard {
        address: usize,
        len: usize,
        underrun: bool,
        overrun: bool,
    },
    /// The address is not live in the selected index.
    UnmanagedDeallocation { address: usize },
    /// Deallocation against an index holding no records.
    EmptyHeapDeallocation { address: usize },
}

impl TrackError {
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, TrackError::Exhausted { .. })
    }

    /// Address the error is about, if it has one.
    pub const fn address(&self) -> Option<usize> {
        match *self {
            TrackError::Exhausted { .. } => None,
            TrackError::DuplicateAllocation { address }
            | TrackError::CorruptedGuard { address, .. }
            | TrackError::UnmanagedDeallocation { address }
            | TrackError::EmptyHeapDeallocation { address } => Some(address),
        }
    }
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TrackError::Exhausted { requested } => {
                write!(f, "out of memory requesting {requested} bytes")
            }
            TrackError::DuplicateAllocation { address } => {
                write!(f, "duplicate memory allocated at {address:#018x}")
            }
            TrackError::CorruptedGuard {
                address,
                len,
                underrun,
                overrun,
            } => {
                write!(f, "corrupted memory at {address:#018x} ({len} bytes")?;
                match (underrun, overrun) {
                    (true, true) => write!(f, ", both guards overwritten)"),
                    (true, false) => write!(f, ", underrun into leading guard)"),
                    _ => write!(f, ", overrun into trailing guard)"),
                }
            }
            TrackError::UnmanagedDeallocation { address } => {
                write!(f, "delete on unallocated memory at {address:#018x}")
            }
            TrackError::EmptyHeapDeallocation { address } => {
                write!(f, "delete of {address:#018x} with empty heap")
            }
        }
    }
}

impl core::error::Error for TrackError {}
