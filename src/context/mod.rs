//! Execution Context
//!
//! The loader builds one [`ExecContext`] per execution and passes its address
//! to the binary's first instruction. The structure is a wire format shared
//! with the loader: field order, types and sizes are fixed by
//! [`LayoutVersion::CURRENT`].
//!
//! # Ownership
//! - The loader writes every field before entry
//! - The bridge only reads it, once, at entry
//! - In trap mode the privileged handler writes `syscall_result`
//!
//! # Trust Boundary
//! Region bounds, table pointers and the result slot are taken as given.
//! A loader that lies about them is outside this crate's responsibility.

mod layout;
mod region;

use core::cell::UnsafeCell;
use core::ffi::{c_char, c_int, c_void, CStr};
use core::ptr;

pub use layout::{
    ContextError, LayoutVersion, ARGC_MAX, EXEC_STACKSIZE_DEFAULT, FREE_RAM_SIZE, MAGIC_NUMBER,
};
pub use region::{MemRegion, RegionFlags, RegionKind};

/// Execution context handed over by the loader.
///
/// Layout of the post-safe-call format (`0xFACADE11`). On 32-bit ARM this is
/// exactly 300 bytes.
#[repr(C)]
pub struct ExecContext {
    /// Start address of the binary in NVM
    pub bin_base: *mut c_void,
    /// Start address of the free RAM reserved for the binary
    pub ram_start: *mut c_void,
    /// End address of the free RAM
    pub ram_end: *mut c_void,
    /// Start address of the free NVM reserved for the binary
    pub nvm_start: *mut c_void,
    /// End address of the free NVM
    pub nvm_end: *mut c_void,
    /// Start address of the backing file in NVM (its text segment)
    pub file_base: *mut c_void,
    /// Non-zero when the binary runs unprivileged behind the MPU
    pub is_safe_call: u8,
    /// Number of valid entries in `argv`
    pub argc: c_int,
    /// Argument strings
    pub argv: [*mut c_char; ARGC_MAX],
    /// Loader-private services (exit); null in trap mode
    pub privileged_table: *const *const c_void,
    /// User services; null in trap mode
    pub user_table: *const *const c_void,
    /// Written by the privileged handler after every trap
    pub syscall_result: UnsafeCell<c_int>,
}

impl ExecContext {
    /// A context with every address null, no arguments and table mode selected.
    pub const fn zeroed() -> Self {
        Self {
            bin_base: ptr::null_mut(),
            ram_start: ptr::null_mut(),
            ram_end: ptr::null_mut(),
            nvm_start: ptr::null_mut(),
            nvm_end: ptr::null_mut(),
            file_base: ptr::null_mut(),
            is_safe_call: 0,
            argc: 0,
            argv: [ptr::null_mut(); ARGC_MAX],
            privileged_table: ptr::null(),
            user_table: ptr::null(),
            syscall_result: UnsafeCell::new(0),
        }
    }

    /// Dispatch mode encoded by the safe-call flag.
    ///
    /// The entry trampoline calls this exactly once; later changes to the
    /// flag have no effect on an execution already in progress.
    #[inline]
    pub fn dispatch_mode(&self) -> DispatchMode {
        DispatchMode::from_flag(self.is_safe_call)
    }

    /// Free RAM handed to the binary.
    pub fn ram(&self) -> MemRegion {
        MemRegion::new(
            RegionKind::Ram,
            self.ram_start as usize,
            self.ram_end as usize,
        )
    }

    /// Free NVM handed to the binary.
    pub fn nvm(&self) -> MemRegion {
        MemRegion::new(
            RegionKind::Nvm,
            self.nvm_start as usize,
            self.nvm_end as usize,
        )
    }

    /// Both private regions, RAM first.
    pub fn regions(&self) -> [MemRegion; 2] {
        [self.ram(), self.nvm()]
    }

    /// Address of the trap-mode result slot.
    #[inline]
    pub fn result_slot(&self) -> *const UnsafeCell<c_int> {
        &self.syscall_result
    }

    /// Arguments passed to the binary.
    ///
    /// # Safety
    /// The first `argc` slots of `argv` must be null or point to
    /// NUL-terminated strings that outlive the returned view.
    pub unsafe fn args(&self) -> Args<'_> {
        // SAFETY: forwarded to the caller
        unsafe { Args::from_raw(self.argc, &self.argv) }
    }
}

impl core::fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecContext")
            .field("bin_base", &self.bin_base)
            .field("ram", &self.ram())
            .field("nvm", &self.nvm())
            .field("file_base", &self.file_base)
            .field("mode", &self.dispatch_mode())
            .field("argc", &self.argc)
            .field("privileged_table", &self.privileged_table)
            .field("user_table", &self.user_table)
            .finish_non_exhaustive()
    }
}

/// How host services are reached for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Direct calls through the loader's function-pointer tables.
    /// The binary shares the loader's privileges.
    Table,
    /// Supervisor call across the MPU boundary, result read back from the
    /// context's result slot.
    Trap,
}

impl DispatchMode {
    /// Decode the one-byte safe-call flag.
    #[inline]
    pub const fn from_flag(flag: u8) -> Self {
        if flag != 0 {
            Self::Trap
        } else {
            Self::Table
        }
    }
}

/// Read-only view of `argc`/`argv`.
///
/// Only the first `argc` slots are visible; a negative `argc` is an empty
/// list and anything above [`ARGC_MAX`] stops at the last slot.
#[derive(Clone, Copy)]
pub struct Args<'a> {
    argv: &'a [*mut c_char],
}

impl<'a> Args<'a> {
    /// An empty argument list.
    pub const fn empty() -> Self {
        Self { argv: &[] }
    }

    /// Build the view over a loader-provided argument array.
    ///
    /// # Safety
    /// The first `argc` slots must be null or point to NUL-terminated strings
    /// living at least as long as `'a`.
    pub unsafe fn from_raw(argc: c_int, argv: &'a [*mut c_char]) -> Self {
        let count = usize::try_from(argc).unwrap_or(0).min(argv.len());
        Self {
            argv: &argv[..count],
        }
    }

    /// Argument count as the C entry point sees it.
    #[inline]
    pub fn argc(&self) -> c_int {
        self.argv.len() as c_int
    }

    /// Number of arguments.
    #[inline]
    pub fn len(&self) -> usize {
        self.argv.len()
    }

    /// True when no argument was passed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// The raw argument array, `argc` entries long.
    #[inline]
    pub fn as_raw(&self) -> &'a [*mut c_char] {
        self.argv
    }

    /// Argument `index`, or `None` past the end or for a null slot.
    pub fn get(&self, index: usize) -> Option<&'a CStr> {
        let ptr = *self.argv.get(index)?;
        if ptr.is_null() {
            return None;
        }
        // SAFETY: non-null slots below argc point to NUL-terminated strings
        // for 'a (contract of `from_raw`)
        Some(unsafe { CStr::from_ptr(ptr) })
    }

    /// Iterate over the arguments; null slots are skipped.
    pub fn iter(&self) -> impl Iterator<Item = &'a CStr> + 'a {
        let args = *self;
        (0..args.len()).filter_map(move |i| args.get(i))
    }
}

impl core::fmt::Debug for Args<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
