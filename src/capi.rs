//! C entry points for C and C++ consumers.
//!
//! A C++ host typically routes `operator new`/`new[]` to the two allocation
//! functions (passing `__FILE__`/`__LINE__` through a placement overload) and
//! `operator delete`/`delete[]` to the matching frees.

use core::ffi::{CStr, c_char, c_uint, c_void};

use crate::heap::{self, AllocKind, Origin, diagnostic};

/// # Safety
/// `file` must be null or a NUL-terminated string that lives for the rest of
/// the process (a string literal such as `__FILE__`).
unsafe fn origin(file: *const c_char, line: c_uint) -> Origin {
    if file.is_null() {
        return Origin::UNKNOWN;
    }
    // SAFETY: upheld by caller; the 'static lifetime comes from the contract.
    let name: &'static CStr = unsafe { CStr::from_ptr(file) };
    Origin::new(name.to_str().unwrap_or("(non-utf8 file name)"), line)
}

unsafe fn alloc(size: usize, file: *const c_char, line: c_uint, kind: AllocKind) -> *mut c_void {
    // SAFETY: forwarded contract.
    let origin = unsafe { origin(file, line) };
    match heap::global().allocate(size, origin, kind) {
        Ok(ptr) => ptr.as_ptr().cast(),
        Err(err) if err.is_fatal() => diagnostic::fatal(err),
        Err(_) => core::ptr::null_mut(),
    }
}

fn free(ptr: *mut c_void, kind: AllocKind) {
    if let Err(err) = heap::global().deallocate(ptr.cast(), kind) {
        diagnostic::fatal(err);
    }
}

/// Allocate a single object. Returns null when memory is exhausted.
///
/// # Safety
/// See [`origin`] for the `file` contract.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn guardheap_alloc(
    size: usize,
    file: *const c_char,
    line: c_uint,
) -> *mut c_void {
    // SAFETY: forwarded contract.
    unsafe { alloc(size, file, line, AllocKind::Scalar) }
}

/// Allocate an array. Returns null when memory is exhausted.
///
/// # Safety
/// See [`origin`] for the `file` contract.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn guardheap_alloc_array(
    size: usize,
    file: *const c_char,
    line: c_uint,
) -> *mut c_void {
    // SAFETY: forwarded contract.
    unsafe { alloc(size, file, line, AllocKind::Vector) }
}

/// Free a single object. Null is ignored; anything else not live in the
/// scalar index aborts.
#[unsafe(no_mangle)]
pub extern "C" fn guardheap_free(ptr: *mut c_void) {
    free(ptr, AllocKind::Scalar);
}

/// Free an array. Null is ignored; anything else not live in the vector
/// index aborts.
#[unsafe(no_mangle)]
pub extern "C" fn guardheap_free_array(ptr: *mut c_void) {
    free(ptr, AllocKind::Vector);
}

/// Print the leak report to stderr. Returns the number of leaked bytes.
#[unsafe(no_mangle)]
pub extern "C" fn guardheap_report() -> usize {
    heap::global().report().bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_round_trip_records_origin() {
        let p = unsafe { guardheap_alloc_array(12, c"widget.cpp".as_ptr(), 88) };
        assert!(!p.is_null());
        let mut found = None;
        heap::global().for_each_live(AllocKind::Vector, |r| {
            if r.address == p as usize {
                found = Some(r);
            }
        });
        let record = found.unwrap();
        assert_eq!(record.origin, Origin::new("widget.cpp", 88));
        assert_eq!(record.len, 12);
        guardheap_free_array(p);
    }

    #[test]
    fn null_file_is_unknown_and_null_free_is_ignored() {
        let p = unsafe { guardheap_alloc(0, core::ptr::null(), 5) };
        assert!(!p.is_null());
        let mut origin = None;
        heap::global().for_each_live(AllocKind::Scalar, |r| {
            if r.address == p as usize {
                origin = Some(r.origin);
            }
        });
        assert_eq!(origin, Some(Origin::UNKNOWN));
        guardheap_free(p);
        guardheap_free(core::ptr::null_mut());
        guardheap_free_array(core::ptr::null_mut());
    }
}
