#![allow(dead_code)]

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use guardheap::heap::diagnostic::Sink;
use guardheap::heap::supply::{Malloc, RawSupply};

/// Collects report lines without their terminators.
#[derive(Default)]
pub struct Capture {
    pub lines: Vec<String>,
}

impl Sink for Capture {
    fn write_line(&mut self, line: &[u8]) {
        let text = std::str::from_utf8(line).expect("diagnostics are utf-8");
        let text = text.strip_suffix('\n').expect("line terminator");
        self.lines.push(text.to_owned());
    }
}

/// Address at the end of a `file(line): N bytes at 0x...` record line.
pub fn record_address(line: &str) -> usize {
    let (_, hex) = line.rsplit_once(" at 0x").expect("record line");
    usize::from_str_radix(hex, 16).expect("hex address")
}

/// A supplier that never has memory.
pub struct Exhausted;

unsafe impl RawSupply for Exhausted {
    fn acquire(&self, _size: usize) -> Option<NonNull<u8>> {
        None
    }

    unsafe fn release(&self, _base: NonNull<u8>, _size: usize) {
        unreachable!("nothing was ever acquired")
    }
}

/// `Malloc`, with running totals of bytes handed out and taken back.
#[derive(Default)]
pub struct Counting {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

unsafe impl RawSupply for Counting {
    fn acquire(&self, size: usize) -> Option<NonNull<u8>> {
        let ptr = Malloc.acquire(size)?;
        self.acquired.fetch_add(size, Ordering::Relaxed);
        Some(ptr)
    }

    unsafe fn release(&self, base: NonNull<u8>, size: usize) {
        self.released.fetch_add(size, Ordering::Relaxed);
        unsafe { Malloc.release(base, size) }
    }
}

impl Counting {
    pub fn outstanding(&self) -> usize {
        self.acquired.load(Ordering::Relaxed) - self.released.load(Ordering::Relaxed)
    }
}
