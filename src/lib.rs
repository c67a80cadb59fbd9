//! sandcrt - Runtime Bridge for Sandboxed Relocatable Binaries
//!
//! A relocatable binary placed in flash by the host loader cannot reach the
//! host operating system directly. It is handed one fixed-layout
//! [`ExecContext`] and everything it needs from the host goes through the
//! bridge defined here.
//!
//! # Architecture
//! - [`context`]: the loader-built execution context (wire layout `0xFACADE11`)
//! - [`syscall`]: the host-service catalogue and its two dispatch backends
//!   (function-pointer tables or supervisor trap)
//! - [`rt`]: the entry trampoline, exit path and fail-stop halt
//! - [`logger`]: `log` records routed through the print service
//! - [`heap`]: allocator over the sandbox's free RAM
//! - [`image`]: relocatable image footer
//!
//! # Trust Model
//! - The loader is trusted completely: nothing it hands over is validated
//! - The dispatch mode is committed once at entry and never re-read
//! - Contract violations end in a halt, never in recovery

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod context;
pub mod heap;
pub mod image;
pub mod logger;
pub mod rt;
pub mod syscall;

pub use context::{Args, DispatchMode, ExecContext, LayoutVersion};
pub use rt::{Stage, Trampoline};
pub use syscall::{Bridge, Gate, Syscalls, TrapFrame, VaList};
