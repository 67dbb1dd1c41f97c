//! This binary runs with `TrackingAlloc` as its global allocator, so the
//! test harness itself allocates through the global tracker. Without the
//! `track` feature the same allocator must leave the tracker untouched.

use guardheap::heap::{self, AllocKind};
use guardheap::TrackingAlloc;

#[global_allocator]
static GLOBAL: TrackingAlloc = TrackingAlloc;

/// Length of the live scalar block at `address`, if any. Must not allocate:
/// the index is locked while the closure runs.
#[cfg(feature = "track")]
fn live_len(address: usize) -> Option<usize> {
    let mut len = None;
    heap::global().for_each_live(AllocKind::Scalar, |r| {
        if r.address == address {
            len = Some(r.len);
        }
    });
    len
}

#[cfg(feature = "track")]
#[test]
fn boxes_are_tracked_until_dropped() {
    let b = Box::new([7u8; 40]);
    let address = &*b as *const [u8; 40] as usize;
    assert_eq!(live_len(address), Some(40));
    drop(b);
    assert_eq!(live_len(address), None);
}

#[cfg(feature = "track")]
#[test]
fn growing_a_vec_keeps_its_contents() {
    let mut v: Vec<u32> = Vec::with_capacity(1);
    for i in 0..1000 {
        v.push(i);
    }
    assert!(v.iter().copied().eq(0..1000));
    assert_eq!(live_len(v.as_ptr() as usize), Some(v.capacity() * 4));
}

#[cfg(feature = "track")]
#[test]
fn over_aligned_layouts_bypass_the_tracker() {
    #[repr(align(64))]
    struct Wide([u8; 64]);

    let w = Box::new(Wide([1; 64]));
    let address = &*w as *const Wide as usize;
    assert_eq!(address % 64, 0);
    assert_eq!(live_len(address), None);
    assert_eq!(w.0[63], 1);
}

#[cfg(feature = "track")]
#[test]
fn zero_sized_allocations_are_not_requested() {
    // Zero-sized types never reach the allocator, so nothing new appears.
    let b = Box::new(());
    let address = &*b as *const () as usize;
    assert_eq!(live_len(address), None);
}

#[test]
fn threads_allocate_concurrently() {
    let handles: Vec<_> = (0..4)
        .map(|t| {
            std::thread::spawn(move || {
                let mut strings = Vec::new();
                for i in 0..200 {
                    strings.push(format!("{t}-{i}"));
                }
                strings.len()
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), 200);
    }
}

#[cfg(not(feature = "track"))]
#[test]
fn release_build_allocates_untracked() {
    let b = Box::new([3u8; 32]);
    let mut v: Vec<u64> = Vec::with_capacity(2);
    v.extend(0..100);
    assert_eq!(b[31], 3);
    assert_eq!(v.iter().sum::<u64>(), 4950);
    assert!(heap::global().is_empty());
    assert_eq!(heap::global().live_blocks(AllocKind::Scalar), 0);
}
