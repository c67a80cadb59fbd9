//! System Call Bridge
//!
//! Everything the sandboxed binary asks of the host goes through here.
//!
//! # Dispatch Model
//! - Table mode: the loader's function tables are called directly
//! - Trap mode: `svc #3` with the service number in r0, arguments in r1..r3,
//!   result read back from the context after the trap
//! - The mode is committed once, at entry, in a [`Bridge`]
//!
//! # Current Syscalls
//! - 0: printf(fmt, ...) - formatted output on the host console
//! - 1: get_temp() - sensor temperature
//! - 2: isprint(c) - character classification
//! - 3: strtol(s, end, base) - integer parsing
//! - 4: get_led(pos) / 5: set_led(pos, val) - board LEDs
//! - 6: copy_file(name, buf, n) / 7: get_file_size(name, size) - host files
//! - 8: memset(m, c, n) - memory fill
//! - 9: exit(status) - privileged, never returns
//!
//! # Security Considerations
//! Return values are the host's, untouched. Nothing in this layer inspects
//! them or the pointers passed down: the host owns validation.

mod bridge;
mod numbers;
pub mod services;
mod table;
mod trap;

use core::ffi::CStr;

pub use bridge::{Bridge, Syscalls, VaList};
pub use numbers::{PrivSyscall, UserSyscall, SYSCALL_SVC_NUMBER, USER_SYSCALL_MAX};
pub use table::{SyscallTable, TableDispatch};
pub use trap::{Gate, HandlerGate, SvcGate, TrapDispatch, TrapFrame, TrapHandler, TRAP_REGS};

/// A value passed as one word of a print argument list.
///
/// Integers narrower than a word are widened the way C's default argument
/// promotions do; strings and pointers pass their address.
pub trait IntoWord {
    fn into_word(self) -> usize;
}

macro_rules! signed_word {
    ($($ty:ty),*) => {$(
        impl IntoWord for $ty {
            #[inline]
            fn into_word(self) -> usize {
                self as isize as usize
            }
        }
    )*};
}

macro_rules! unsigned_word {
    ($($ty:ty),*) => {$(
        impl IntoWord for $ty {
            #[inline]
            fn into_word(self) -> usize {
                self as usize
            }
        }
    )*};
}

signed_word!(i8, i16, i32, isize);
unsigned_word!(u8, u16, u32, usize);

impl IntoWord for &CStr {
    #[inline]
    fn into_word(self) -> usize {
        self.as_ptr() as usize
    }
}

impl<T> IntoWord for *const T {
    #[inline]
    fn into_word(self) -> usize {
        self as usize
    }
}

impl<T> IntoWord for *mut T {
    #[inline]
    fn into_word(self) -> usize {
        self as usize
    }
}

/// Formatted print through the host's print service.
///
/// `printf!(sys, c"%d items\n", n)` builds the word list and calls
/// [`services::print`]. Must be used inside `unsafe`: the conversions in the
/// format are not checked against the arguments.
#[macro_export]
macro_rules! printf {
    ($sys:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {{
        let words: &[usize] = &[$($crate::syscall::IntoWord::into_word($arg)),*];
        $crate::syscall::services::print($sys, $fmt, words)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_widening() {
        assert_eq!((-1i32).into_word(), usize::MAX);
        assert_eq!((-2i8).into_word(), usize::MAX - 1);
        assert_eq!(42u8.into_word(), 42);
    }

    #[test]
    fn test_string_passes_address() {
        let s = c"abc";
        assert_eq!(s.into_word(), s.as_ptr() as usize);
    }
}
