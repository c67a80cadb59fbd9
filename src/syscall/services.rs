//! Program-facing service wrappers
//!
//! Thin, borrow-checked front ends over [`Syscalls`]. Slices and `CStr`s
//! replace raw pointers where the contract allows it; results stay the
//! host's values.

use core::ffi::{c_char, c_int, c_long, c_void, CStr};

use super::bridge::{Syscalls, VaList};

/// Formatted print.
///
/// # Safety
/// Each conversion in `format` must match the word at the same position in
/// `args`; a `%s` word must be the address of a live C string.
#[inline]
pub unsafe fn print<S: Syscalls + ?Sized>(sys: &S, format: &CStr, args: &[usize]) -> c_int {
    // SAFETY: format is NUL-terminated; argument matching is the caller's
    unsafe { sys.vprintf(format.as_ptr(), VaList::new(args)) }
}

/// Print `line` verbatim, without interpreting `%`.
pub fn puts<S: Syscalls + ?Sized>(sys: &S, line: &CStr) -> c_int {
    let args = [line.as_ptr() as usize];
    // SAFETY: one `%s` conversion, one string address
    unsafe { print(sys, c"%s", &args) }
}

pub fn temperature<S: Syscalls + ?Sized>(sys: &S) -> c_int {
    sys.get_temp()
}

pub fn is_printable<S: Syscalls + ?Sized>(sys: &S, byte: u8) -> bool {
    sys.isprint(c_int::from(byte)) != 0
}

/// Parse an integer; returns the value and the number of bytes consumed.
pub fn parse_long<S: Syscalls + ?Sized>(sys: &S, s: &CStr, base: c_int) -> (c_long, usize) {
    let start = s.as_ptr();
    let mut end = start as *mut c_char;
    // SAFETY:
    // - `s` is NUL-terminated, so the loader stops inside it
    // - `end` is a live local the loader may overwrite
    // Audited: 2026-10-19
    let value = unsafe { sys.strtol(start, &mut end, base) };
    let consumed = (end as usize)
        .saturating_sub(start as usize)
        .min(s.to_bytes().len());
    (value, consumed)
}

pub fn led<S: Syscalls + ?Sized>(sys: &S, pos: c_int) -> c_int {
    sys.get_led(pos)
}

pub fn set_led<S: Syscalls + ?Sized>(sys: &S, pos: c_int, val: c_int) -> c_int {
    sys.set_led(pos, val)
}

/// Copy file `name` into `buf`. Bytes copied, or the host's negative code.
pub fn copy_file<S: Syscalls + ?Sized>(sys: &S, name: &CStr, buf: &mut [u8]) -> isize {
    // SAFETY:
    // - `buf` is writable for its full length
    // - `name` is NUL-terminated
    // Audited: 2026-10-19
    unsafe { sys.copy_file(name.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) }
}

/// Host status and the size it reported for `name`.
pub fn file_size<S: Syscalls + ?Sized>(sys: &S, name: &CStr) -> (c_int, usize) {
    let mut size = 0usize;
    // SAFETY: `size` is a live local
    let status = unsafe { sys.get_file_size(name.as_ptr(), &mut size) };
    (status, size)
}

/// Fill `buf` with `value`.
pub fn fill<S: Syscalls + ?Sized>(sys: &S, buf: &mut [u8], value: u8) -> *mut c_void {
    // SAFETY: `buf` is writable for its full length
    unsafe { sys.memset(buf.as_mut_ptr().cast(), c_int::from(value), buf.len()) }
}
