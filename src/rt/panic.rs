//! Panic handler for the device build.
//!
//! Prints the location and message through the print service when the
//! bridge is up, then halts. Never returns to the loader: a panic is a
//! contract violation, not an exit status.

use core::fmt::Write;
use core::panic::PanicInfo;

use super::device::DISPATCH;
use super::halt::halt;
use crate::logger::LineBuffer;
use crate::syscall::services;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    if let Some(bridge) = DISPATCH.get() {
        let mut line = LineBuffer::new();
        let _ = match info.location() {
            Some(location) => write!(
                line,
                "[PANIC] {}:{}: {}",
                location.file(),
                location.line(),
                info.message()
            ),
            None => write!(line, "[PANIC] {}", info.message()),
        };
        services::puts(bridge, line.as_cstr());
        services::puts(bridge, c"\n");
    }
    halt()
}
