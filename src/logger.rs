//! Logging through the host console
//!
//! Sandboxed code has no console of its own. [`SyscallLogger`] renders each
//! `log` record into a fixed stack buffer and hands it to the print service
//! as a single `"%s\n"` call. Nothing is allocated; long records are cut.

use core::ffi::CStr;
use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record};
use spin::Once;

use crate::syscall::{services, Syscalls};

/// Capacity of one rendered line, terminator included.
pub const LINE_CAPACITY: usize = 128;

/// Fixed-size, NUL-terminated line. Writes past capacity are dropped.
pub struct LineBuffer {
    buf: [u8; LINE_CAPACITY],
    pos: usize,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0; LINE_CAPACITY],
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Whether the buffer reached capacity.
    pub fn is_full(&self) -> bool {
        self.pos == LINE_CAPACITY - 1
    }

    /// The line up to the first NUL.
    pub fn as_cstr(&self) -> &CStr {
        // The last byte is never written, so a terminator always exists.
        CStr::from_bytes_until_nul(&self.buf).unwrap_or(c"")
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let space = (LINE_CAPACITY - 1).saturating_sub(self.pos);
        let len = core::cmp::min(s.len(), space);
        self.buf[self.pos..self.pos + len].copy_from_slice(&s.as_bytes()[..len]);
        self.pos += len;
        Ok(())
    }
}

/// `log` backend writing through a [`Syscalls`] implementation.
pub struct SyscallLogger {
    sink: Once<&'static (dyn Syscalls + Sync)>,
}

impl SyscallLogger {
    pub const fn new() -> Self {
        Self { sink: Once::new() }
    }

    /// Attach the print backend. Only the first call takes effect.
    pub fn attach(&self, sys: &'static (dyn Syscalls + Sync)) {
        self.sink.call_once(|| sys);
    }
}

impl Default for SyscallLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for SyscallLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        self.sink.is_completed()
    }

    fn log(&self, record: &Record<'_>) {
        let Some(sys) = self.sink.get() else {
            return;
        };
        let mut line = LineBuffer::new();
        let _ = write!(line, "[{}] {}", record.level(), record.args());
        let args = [line.as_cstr().as_ptr() as usize];
        // SAFETY: one `%s` conversion, one string address
        unsafe { services::print(*sys, c"%s\n", &args) };
    }

    fn flush(&self) {}
}

/// Process-wide logger.
pub static LOGGER: SyscallLogger = SyscallLogger::new();

/// Route `log` records through `sys`.
///
/// Returns `false` if another logger was installed first.
pub fn init(sys: &'static (dyn Syscalls + Sync), level: LevelFilter) -> bool {
    LOGGER.attach(sys);
    if log::set_logger(&LOGGER).is_err() {
        return false;
    }
    log::set_max_level(level);
    true
}
