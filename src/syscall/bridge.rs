//! Syscall Bridge
//!
//! [`Syscalls`] is the one interface every backend implements. [`Bridge`]
//! is the dispatch state of an execution: the backend chosen from the
//! context's safe-call flag, fixed for the rest of the run.

use core::cell::UnsafeCell;
use core::ffi::{c_char, c_int, c_long, c_void};
use core::marker::PhantomData;

use crate::context::{DispatchMode, ExecContext};

use super::table::{SyscallTable, TableDispatch};
use super::trap::{Gate, TrapDispatch};

/// Reference to the trailing arguments of a print call.
///
/// Matches the AAPCS `va_list`: one pointer to consecutive argument words.
/// Each argument occupies one machine word.
#[repr(transparent)]
#[derive(Clone, Copy, Debug)]
pub struct VaList<'a> {
    ap: *const usize,
    _args: PhantomData<&'a [usize]>,
}

impl<'a> VaList<'a> {
    /// Point at a list of argument words.
    #[inline]
    pub fn new(args: &'a [usize]) -> Self {
        Self {
            ap: args.as_ptr(),
            _args: PhantomData,
        }
    }

    /// Address of the first argument word.
    #[inline]
    pub fn as_ptr(&self) -> *const usize {
        self.ap
    }

    /// Read argument `index`.
    ///
    /// # Safety
    /// `index` must lie inside the list the `VaList` was built over.
    #[inline]
    pub unsafe fn arg(&self, index: usize) -> usize {
        // SAFETY: in bounds per the caller
        unsafe { *self.ap.add(index) }
    }
}

/// The host-service catalogue as seen from sandboxed code.
///
/// Backends are pure transports: arguments go through unchanged and the
/// host's return value comes back unchanged. Methods taking pointers are
/// `unsafe` because the host dereferences them.
pub trait Syscalls {
    /// Formatted print. Returns what the host returns (characters written).
    ///
    /// # Safety
    /// `format` must be NUL-terminated and its conversions must match the
    /// words in `ap` (a `%s` word must be the address of a C string).
    unsafe fn vprintf(&self, format: *const c_char, ap: VaList<'_>) -> c_int;

    /// Current sensor temperature.
    fn get_temp(&self) -> c_int;

    /// Non-zero when `character` is printable.
    fn isprint(&self, character: c_int) -> c_int;

    /// Parse a long in `base`; the host stores the first unparsed character
    /// in `*endptr` when `endptr` is non-null.
    ///
    /// # Safety
    /// `s` must be NUL-terminated; `endptr` null or writable.
    unsafe fn strtol(&self, s: *const c_char, endptr: *mut *mut c_char, base: c_int) -> c_long;

    /// State of LED `pos`.
    fn get_led(&self, pos: c_int) -> c_int;

    /// Drive LED `pos` to `val`.
    fn set_led(&self, pos: c_int, val: c_int) -> c_int;

    /// Copy up to `nbyte` bytes of file `name` into `buf`. Byte count, or
    /// negative on failure.
    ///
    /// # Safety
    /// `name` must be NUL-terminated; `buf` writable for `nbyte` bytes.
    unsafe fn copy_file(&self, name: *const c_char, buf: *mut c_void, nbyte: usize) -> isize;

    /// Status code; the size is stored in `*size`.
    ///
    /// # Safety
    /// `name` must be NUL-terminated; `size` writable.
    unsafe fn get_file_size(&self, name: *const c_char, size: *mut usize) -> c_int;

    /// Fill `n` bytes at `m` with `c`; returns `m` as the host reports it.
    ///
    /// # Safety
    /// `m` must be writable for `n` bytes.
    unsafe fn memset(&self, m: *mut c_void, c: c_int, n: usize) -> *mut c_void;

    /// Hand the exit status to the loader.
    ///
    /// Must not return. If it does, the loader broke its contract and the
    /// caller has to halt.
    fn exit(&self, status: c_int);
}

/// Dispatch state of one execution.
///
/// Built once, from the context, by the entry trampoline.
pub enum Bridge<G> {
    /// Loader tables, called directly.
    Table(TableDispatch),
    /// Supervisor call through `G`, result read from the context.
    Trap(TrapDispatch<G>),
}

impl<G: Gate> Bridge<G> {
    /// Read the safe-call flag and commit to a backend.
    ///
    /// Table mode copies both table pointers; trap mode records the result
    /// slot's address and keeps `gate`. Nothing is validated.
    ///
    /// # Safety
    /// `ctx` must come from the loader: in table mode both tables hold
    /// entries of the documented signatures; in trap mode `ctx` outlives the
    /// returned bridge.
    pub unsafe fn select(ctx: &ExecContext, gate: G) -> Self {
        match ctx.dispatch_mode() {
            DispatchMode::Table => {
                let privileged = SyscallTable::from_raw(ctx.privileged_table);
                let user = SyscallTable::from_raw(ctx.user_table);
                // SAFETY:
                // - Tables come straight from the loader (caller contract)
                // - Neither is validated: a null entry faults on first use
                // Audited: 2026-10-19
                Bridge::Table(unsafe { TableDispatch::new(privileged, user) })
            }
            DispatchMode::Trap => {
                // SAFETY:
                // - The context outlives the bridge (caller contract)
                // - The slot address is fixed inside the context
                // Audited: 2026-10-19
                Bridge::Trap(unsafe { TrapDispatch::new(gate, ctx.result_slot()) })
            }
        }
    }
}

impl<G> Bridge<G> {
    /// Mode committed at construction.
    pub fn mode(&self) -> DispatchMode {
        match self {
            Bridge::Table(_) => DispatchMode::Table,
            Bridge::Trap(_) => DispatchMode::Trap,
        }
    }

    /// `(privileged, user)` tables; both null in trap mode.
    pub fn tables(&self) -> (SyscallTable, SyscallTable) {
        match self {
            Bridge::Table(table) => (table.privileged(), table.user()),
            Bridge::Trap(_) => (SyscallTable::null(), SyscallTable::null()),
        }
    }

    /// Result slot address; null in table mode.
    pub fn result_slot(&self) -> *const UnsafeCell<c_int> {
        match self {
            Bridge::Table(_) => core::ptr::null(),
            Bridge::Trap(trap) => trap.result_slot(),
        }
    }
}

macro_rules! forward {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            Bridge::Table($backend) => $call,
            Bridge::Trap($backend) => $call,
        }
    };
}

impl<G: Gate> Syscalls for Bridge<G> {
    unsafe fn vprintf(&self, format: *const c_char, ap: VaList<'_>) -> c_int {
        // SAFETY: forwarded to the caller
        forward!(self, b => unsafe { b.vprintf(format, ap) })
    }

    fn get_temp(&self) -> c_int {
        forward!(self, b => b.get_temp())
    }

    fn isprint(&self, character: c_int) -> c_int {
        forward!(self, b => b.isprint(character))
    }

    unsafe fn strtol(&self, s: *const c_char, endptr: *mut *mut c_char, base: c_int) -> c_long {
        // SAFETY: forwarded to the caller
        forward!(self, b => unsafe { b.strtol(s, endptr, base) })
    }

    fn get_led(&self, pos: c_int) -> c_int {
        forward!(self, b => b.get_led(pos))
    }

    fn set_led(&self, pos: c_int, val: c_int) -> c_int {
        forward!(self, b => b.set_led(pos, val))
    }

    unsafe fn copy_file(&self, name: *const c_char, buf: *mut c_void, nbyte: usize) -> isize {
        // SAFETY: forwarded to the caller
        forward!(self, b => unsafe { b.copy_file(name, buf, nbyte) })
    }

    unsafe fn get_file_size(&self, name: *const c_char, size: *mut usize) -> c_int {
        // SAFETY: forwarded to the caller
        forward!(self, b => unsafe { b.get_file_size(name, size) })
    }

    unsafe fn memset(&self, m: *mut c_void, c: c_int, n: usize) -> *mut c_void {
        // SAFETY: forwarded to the caller
        forward!(self, b => unsafe { b.memset(m, c, n) })
    }

    fn exit(&self, status: c_int) {
        log::debug!("[EXIT] status {} via {:?}", status, self.mode());
        forward!(self, b => b.exit(status))
    }
}

impl<G> core::fmt::Debug for Bridge<G> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (privileged, user) = self.tables();
        f.debug_struct("Bridge")
            .field("mode", &self.mode())
            .field("privileged", &privileged)
            .field("user", &user)
            .field("result_slot", &self.result_slot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::{HandlerGate, TrapFrame};

    fn ignore(_frame: &TrapFrame) {}

    #[test]
    fn test_table_mode_clears_slot() {
        let user = [core::ptr::null::<c_void>(); 9];
        let privileged = [core::ptr::null::<c_void>(); 1];
        let mut ctx = ExecContext::zeroed();
        ctx.user_table = user.as_ptr();
        ctx.privileged_table = privileged.as_ptr();

        let bridge = unsafe { Bridge::select(&ctx, HandlerGate::new(ignore)) };
        assert_eq!(bridge.mode(), DispatchMode::Table);
        assert!(bridge.result_slot().is_null());
        let (p, u) = bridge.tables();
        assert_eq!(p.as_ptr(), privileged.as_ptr());
        assert_eq!(u.as_ptr(), user.as_ptr());
    }

    #[test]
    fn test_trap_mode_nulls_tables() {
        let user = [core::ptr::null::<c_void>(); 9];
        let mut ctx = ExecContext::zeroed();
        ctx.is_safe_call = 1;
        // Stale loader tables must not leak into trap mode.
        ctx.user_table = user.as_ptr();

        let bridge = unsafe { Bridge::select(&ctx, HandlerGate::new(ignore)) };
        assert_eq!(bridge.mode(), DispatchMode::Trap);
        assert_eq!(bridge.result_slot(), ctx.result_slot());
        let (p, u) = bridge.tables();
        assert!(p.is_null() && u.is_null());
    }
}
