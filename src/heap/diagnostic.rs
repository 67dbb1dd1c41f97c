use core::fmt::{self, Write};

use crate::heap::error::TrackError;

/// Largest line the sink will render, terminator included.
pub const LINE_CAPACITY: usize = 4096;

/// Destination for rendered diagnostic lines.
///
/// Implementations are called from inside the allocator and must not
/// allocate through it.
pub trait Sink {
    /// `line` always ends in `\n`.
    fn write_line(&mut self, line: &[u8]);
}

/// The process error stream.
pub struct Stderr;

impl Sink for Stderr {
    fn write_line(&mut self, line: &[u8]) {
        crate::platform::write_stderr(line);
    }
}

/// Fixed-size formatting buffer. Text past the bound is dropped; one byte is
/// always kept back for the line terminator.
pub struct LineBuf {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl Default for LineBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuf {
    pub const fn new() -> Self {
        Self {
            buf: [0; LINE_CAPACITY],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn terminate(&mut self) {
        self.buf[self.len] = b'\n';
        self.len += 1;
    }
}

impl Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = LINE_CAPACITY - 1 - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() { Err(fmt::Error) } else { Ok(()) }
    }
}

/// Render `args` plus `\n` and hand it to `sink`.
pub fn emit(sink: &mut dyn Sink, args: fmt::Arguments<'_>) {
    let mut line = LineBuf::new();
    // Truncation is the documented behavior for oversized lines.
    let _ = line.write_fmt(args);
    line.terminate();
    sink.write_line(line.as_bytes());
}

/// Render a fatal condition to `sink` without terminating.
pub fn fatal_to(sink: &mut dyn Sink, err: &TrackError) {
    emit(sink, format_args!("*** FATAL: {err} ***"));
    emit(sink, format_args!("aborting."));
}

/// Report a fatal condition on stderr and abort the process.
#[cold]
pub fn fatal(err: TrackError) -> ! {
    fatal_to(&mut Stderr, &err);
    crate::platform::abort()
}
