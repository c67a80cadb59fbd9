//! Table Dispatch
//!
//! When the binary runs with the loader's own privileges the loader hands
//! over two arrays of function addresses. A service call is an index into
//! the user array followed by an ordinary call: no boundary is crossed.

use core::ffi::{c_char, c_int, c_long, c_void};
use core::mem::transmute;
use core::ptr;

use super::bridge::{Syscalls, VaList};
use super::numbers::{PrivSyscall, UserSyscall};

pub type VprintfFn = unsafe extern "C" fn(*const c_char, VaList<'_>) -> c_int;
pub type GetTempFn = unsafe extern "C" fn() -> c_int;
pub type IsPrintFn = unsafe extern "C" fn(c_int) -> c_int;
pub type StrtolFn = unsafe extern "C" fn(*const c_char, *mut *mut c_char, c_int) -> c_long;
pub type GetLedFn = unsafe extern "C" fn(c_int) -> c_int;
pub type SetLedFn = unsafe extern "C" fn(c_int, c_int) -> c_int;
pub type CopyFileFn = unsafe extern "C" fn(*const c_char, *mut c_void, usize) -> isize;
pub type GetFileSizeFn = unsafe extern "C" fn(*const c_char, *mut usize) -> c_int;
pub type MemsetFn = unsafe extern "C" fn(*mut c_void, c_int, usize) -> *mut c_void;
pub type ExitFn = unsafe extern "C" fn(c_int) -> c_int;

/// A loader-owned array of opaque function addresses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct SyscallTable(*const *const c_void);

impl SyscallTable {
    pub const fn null() -> Self {
        Self(ptr::null())
    }

    #[inline]
    pub const fn from_raw(table: *const *const c_void) -> Self {
        Self(table)
    }

    #[inline]
    pub fn as_ptr(&self) -> *const *const c_void {
        self.0
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Address stored at `index`.
    ///
    /// # Safety
    /// The table must hold at least `index + 1` entries.
    #[inline]
    unsafe fn entry(&self, index: usize) -> *const c_void {
        // SAFETY: in bounds per the caller
        unsafe { *self.0.add(index) }
    }
}

/// Direct-call backend.
#[derive(Debug, Clone, Copy)]
pub struct TableDispatch {
    privileged: SyscallTable,
    user: SyscallTable,
}

// SAFETY: the tables are read-only after entry and an execution has a single
// thread of control.
unsafe impl Send for TableDispatch {}
unsafe impl Sync for TableDispatch {}

impl TableDispatch {
    /// # Safety
    /// `user` must hold one entry per [`UserSyscall`] and `privileged` one per
    /// [`PrivSyscall`], each a function of the matching `*Fn` signature, and
    /// both must stay valid for the life of the dispatcher.
    pub unsafe fn new(privileged: SyscallTable, user: SyscallTable) -> Self {
        Self { privileged, user }
    }

    pub fn privileged(&self) -> SyscallTable {
        self.privileged
    }

    pub fn user(&self) -> SyscallTable {
        self.user
    }

    #[inline]
    fn user_entry(&self, service: UserSyscall) -> *const c_void {
        // SAFETY:
        // - The user table has one entry per service (`new` contract)
        // - `index()` is below USER_SYSCALL_MAX for every variant
        // Audited: 2026-10-19
        unsafe { self.user.entry(service.index()) }
    }
}

impl Syscalls for TableDispatch {
    unsafe fn vprintf(&self, format: *const c_char, ap: VaList<'_>) -> c_int {
        // SAFETY: entry has the vprintf signature (`new` contract); pointers
        // are the caller's responsibility
        unsafe {
            let func: VprintfFn = transmute(self.user_entry(UserSyscall::Printf));
            func(format, ap)
        }
    }

    fn get_temp(&self) -> c_int {
        // SAFETY: entry has the get_temp signature (`new` contract)
        unsafe {
            let func: GetTempFn = transmute(self.user_entry(UserSyscall::GetTemp));
            func()
        }
    }

    fn isprint(&self, character: c_int) -> c_int {
        // SAFETY: entry has the isprint signature (`new` contract)
        unsafe {
            let func: IsPrintFn = transmute(self.user_entry(UserSyscall::IsPrint));
            func(character)
        }
    }

    unsafe fn strtol(&self, s: *const c_char, endptr: *mut *mut c_char, base: c_int) -> c_long {
        // SAFETY: entry has the strtol signature (`new` contract)
        unsafe {
            let func: StrtolFn = transmute(self.user_entry(UserSyscall::Strtol));
            func(s, endptr, base)
        }
    }

    fn get_led(&self, pos: c_int) -> c_int {
        // SAFETY: entry has the get_led signature (`new` contract)
        unsafe {
            let func: GetLedFn = transmute(self.user_entry(UserSyscall::GetLed));
            func(pos)
        }
    }

    fn set_led(&self, pos: c_int, val: c_int) -> c_int {
        // SAFETY: entry has the set_led signature (`new` contract)
        unsafe {
            let func: SetLedFn = transmute(self.user_entry(UserSyscall::SetLed));
            func(pos, val)
        }
    }

    unsafe fn copy_file(&self, name: *const c_char, buf: *mut c_void, nbyte: usize) -> isize {
        // SAFETY: entry has the copy_file signature (`new` contract)
        unsafe {
            let func: CopyFileFn = transmute(self.user_entry(UserSyscall::CopyFile));
            func(name, buf, nbyte)
        }
    }

    unsafe fn get_file_size(&self, name: *const c_char, size: *mut usize) -> c_int {
        // SAFETY: entry has the get_file_size signature (`new` contract)
        unsafe {
            let func: GetFileSizeFn = transmute(self.user_entry(UserSyscall::GetFileSize));
            func(name, size)
        }
    }

    unsafe fn memset(&self, m: *mut c_void, c: c_int, n: usize) -> *mut c_void {
        // SAFETY: entry has the memset signature (`new` contract)
        unsafe {
            let func: MemsetFn = transmute(self.user_entry(UserSyscall::Memset));
            func(m, c, n)
        }
    }

    fn exit(&self, status: c_int) {
        // SAFETY:
        // - The privileged table's first entry is exit (`new` contract)
        // - Exit takes a plain status, no pointer reaches the loader
        // Audited: 2026-10-19
        unsafe {
            let func: ExitFn = transmute(self.privileged.entry(PrivSyscall::Exit.index()));
            func(status);
        }
    }
}
