use core::ffi::c_void;

/// Request `size` bytes from the C runtime.
///
/// # Safety
/// The returned pointer must be released with [`free`] and nothing else.
pub unsafe fn malloc(size: usize) -> *mut u8 {
    // SAFETY: malloc is provided by the C runtime.
    unsafe { libc::malloc(size) as *mut u8 }
}

/// Request `size` bytes aligned to `align`. Returns null on failure.
///
/// # Safety
/// `align` must be a power of two that is a multiple of the pointer size.
pub unsafe fn memalign(size: usize, align: usize) -> *mut u8 {
    let mut out: *mut c_void = core::ptr::null_mut();
    // SAFETY: out is a valid place to store the result; caller upholds the
    // alignment contract.
    let rc = unsafe { libc::posix_memalign(&mut out, align, size) };
    if rc != 0 {
        return core::ptr::null_mut();
    }
    out as *mut u8
}

/// # Safety
/// `ptr` must come from [`malloc`] or [`memalign`] and not have been freed.
pub unsafe fn free(ptr: *mut u8) {
    // SAFETY: upheld by caller.
    unsafe { libc::free(ptr as *mut c_void) }
}

/// Outcome of one `write(2)` attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriteStep {
    Wrote(usize),
    Interrupted,
    Failed,
}

/// Feed `bytes` to `write` until all of it is accepted, retrying
/// interrupted calls. Gives up on any other failure.
fn write_all(mut bytes: &[u8], mut write: impl FnMut(&[u8]) -> WriteStep) {
    while !bytes.is_empty() {
        match write(bytes) {
            WriteStep::Wrote(0) | WriteStep::Failed => return,
            WriteStep::Wrote(n) => bytes = &bytes[n.min(bytes.len())..],
            WriteStep::Interrupted => {}
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "emscripten"))]
fn errno() -> i32 {
    // SAFETY: returns the calling thread's errno slot, always valid.
    unsafe { *libc::__errno_location() }
}

#[cfg(target_os = "android")]
fn errno() -> i32 {
    // SAFETY: as above.
    unsafe { *libc::__errno() }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn errno() -> i32 {
    // SAFETY: as above.
    unsafe { *libc::__error() }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "emscripten",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
)))]
fn errno() -> i32 {
    0
}

/// Write all of `bytes` to the process error stream. Never allocates.
pub fn write_stderr(bytes: &[u8]) {
    write_all(bytes, |rest| {
        // SAFETY: rest is a valid readable slice; fd 2 is always open or the
        // call fails harmlessly.
        let n = unsafe { libc::write(2, rest.as_ptr() as *const c_void, rest.len()) };
        if n >= 0 {
            WriteStep::Wrote(n as usize)
        } else if errno() == libc::EINTR {
            WriteStep::Interrupted
        } else {
            WriteStep::Failed
        }
    });
}

pub fn abort() -> ! {
    // SAFETY: abort is provided by the C runtime and never returns.
    unsafe { libc::abort() }
}

/// Register `f` to run when the process exits normally.
pub fn at_exit(f: extern "C" fn()) -> bool {
    // SAFETY: f is a plain function with no captured state.
    unsafe { libc::atexit(f) == 0 }
}
