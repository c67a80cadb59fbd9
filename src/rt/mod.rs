//! Entry Trampoline
//!
//! The loader jumps to `start(ctx)`. From there:
//!
//! ```text
//! Uninitialized -> ModeSelected -> Running -> Exiting -> Halted
//! ```
//!
//! - ModeSelected: the safe-call flag was read, the [`Bridge`] committed
//! - Running: the program's `main(argc, argv)` is executing
//! - Exiting: `main` returned; its status went to the loader's exit
//! - Halted: exit came back, which the loader must never do
//!
//! # Security Considerations
//! The dispatch state lives in a [`DispatchCell`] and is written once. A
//! second entry on the same cell keeps the first bridge: the mode of an
//! execution cannot be switched from inside it.

mod halt;
#[cfg(all(target_arch = "arm", target_os = "none"))]
mod panic;

use core::ffi::c_int;

use spin::Once;

use crate::context::{Args, ContextError, ExecContext, LayoutVersion};
use crate::syscall::{Bridge, Gate, Syscalls};

pub use halt::{fail_stop, halt, Halted, Idle, StepBudget, Wfi};

/// Slot holding the dispatch state of an execution.
pub type DispatchCell<G> = Once<Bridge<G>>;

/// Position in the entry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Uninitialized,
    ModeSelected,
    Running,
    Exiting,
    Halted,
}

/// Drives one execution from the loader's context to the halt loop.
pub struct Trampoline<'a, G> {
    ctx: &'a ExecContext,
    bridge: Option<&'a Bridge<G>>,
    stage: Stage,
}

impl<'a, G: Gate> Trampoline<'a, G> {
    /// A trampoline that has not looked at `ctx` yet.
    pub fn new(ctx: &'a ExecContext) -> Self {
        Self {
            ctx,
            bridge: None,
            stage: Stage::Uninitialized,
        }
    }

    /// Read the safe-call flag and commit the dispatch state into `cell`.
    ///
    /// # Safety
    /// `ctx` is the loader's context: its tables, argument strings and result
    /// slot follow the loader contract and outlive `'a`.
    pub unsafe fn select(&mut self, cell: &'a DispatchCell<G>, gate: G) -> &'a Bridge<G> {
        if cell.is_completed() {
            log::warn!("[ENTRY] dispatch state already set; keeping it");
        }
        let ctx = self.ctx;
        // SAFETY:
        // - The context follows the loader contract (caller)
        // - `call_once` runs the selection at most once per cell
        let bridge = cell.call_once(|| unsafe { Bridge::select(ctx, gate) });
        self.bridge = Some(bridge);
        self.stage = Stage::ModeSelected;
        log::debug!("[ENTRY] {:?} mode", bridge.mode());
        for region in ctx.regions() {
            log::debug!("[ENTRY] {:?}", region);
        }
        bridge
    }

    /// [`Trampoline::new`] followed by [`Trampoline::select`].
    ///
    /// # Safety
    /// See [`Trampoline::select`].
    pub unsafe fn enter(ctx: &'a ExecContext, cell: &'a DispatchCell<G>, gate: G) -> Self {
        let mut trampoline = Self::new(ctx);
        // SAFETY: forwarded to the caller
        unsafe { trampoline.select(cell, gate) };
        trampoline
    }

    /// Enter only when the image was built for the current layout.
    ///
    /// # Safety
    /// See [`Trampoline::select`].
    pub unsafe fn enter_checked(
        ctx: &'a ExecContext,
        magic: u32,
        cell: &'a DispatchCell<G>,
        gate: G,
    ) -> Result<Self, ContextError> {
        if let Err(err) = LayoutVersion::require_current(magic) {
            log::error!("[ENTRY] refused: {}", err);
            return Err(err);
        }
        // SAFETY: forwarded to the caller
        Ok(unsafe { Self::enter(ctx, cell, gate) })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The committed dispatch state; `None` before selection.
    pub fn bridge(&self) -> Option<&'a Bridge<G>> {
        self.bridge
    }

    /// Call `main` with the context's arguments and hand its status to exit.
    ///
    /// Returns the status when exit came back, `None` when called outside
    /// ModeSelected. Either way the caller's next step is [`Trampoline::halt`].
    pub fn run<F>(&mut self, main: F) -> Option<c_int>
    where
        F: FnOnce(&'a Bridge<G>, Args<'a>) -> c_int,
    {
        let bridge = match (self.stage, self.bridge) {
            (Stage::ModeSelected, Some(bridge)) => bridge,
            (stage, _) => {
                log::error!("[ENTRY] run from {:?}", stage);
                return None;
            }
        };

        self.stage = Stage::Running;
        // SAFETY:
        // - argv follows the loader contract (`select`)
        // - `Args` clamps argc to the 64 slots, unused slots are never read
        // Audited: 2026-10-19
        let args = unsafe { self.ctx.args() };
        let status = main(bridge, args);

        self.stage = Stage::Exiting;
        bridge.exit(status);

        // Exit came back: the loader is broken. Logging would go through its
        // print service, so nothing is reported from here on.
        Some(status)
    }

    /// Enter the fail-stop loop. Silent: the bridge is not used again.
    pub fn halt<I: Idle + ?Sized>(&mut self, idle: &mut I) -> Halted {
        self.stage = Stage::Halted;
        fail_stop(idle)
    }

    /// The whole sequence after selection: run, exit, halt.
    pub fn execute<F, I>(mut self, main: F, idle: &mut I) -> Halted
    where
        F: FnOnce(&'a Bridge<G>, Args<'a>) -> c_int,
        I: Idle + ?Sized,
    {
        let _ = self.run(main);
        self.halt(idle)
    }
}

impl<G> core::fmt::Debug for Trampoline<'_, G> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Trampoline")
            .field("stage", &self.stage)
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use device::{start, DeviceBridge, DISPATCH};

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod device {
    use super::*;
    use crate::syscall::SvcGate;

    /// Dispatch state as the device sees it.
    pub type DeviceBridge = Bridge<SvcGate>;

    /// The execution's dispatch state, set once by [`start`].
    pub static DISPATCH: DispatchCell<SvcGate> = DispatchCell::new();

    /// Program entry signature.
    pub type Main = fn(&DeviceBridge, Args<'_>) -> c_int;

    /// Body of the `start` symbol.
    ///
    /// # Safety
    /// Called once, by the loader, with its context.
    pub unsafe fn start(ctx: &'static ExecContext, main: Main) -> ! {
        // SAFETY:
        // - `ctx` is the loader's context (caller)
        // - `DISPATCH` is static, so the bridge outlives the execution
        // Audited: 2026-10-19
        let trampoline = unsafe { Trampoline::enter(ctx, &DISPATCH, SvcGate) };
        if let Some(bridge) = trampoline.bridge() {
            crate::logger::init(bridge, log::LevelFilter::Warn);
        }
        let _ = trampoline.execute(|bridge, args| main(bridge, args), &mut Wfi);
        halt()
    }
}

/// Define the `start` symbol the loader jumps to.
///
/// ```ignore
/// fn main(sys: &sandcrt::rt::DeviceBridge, args: sandcrt::Args<'_>) -> core::ffi::c_int {
///     0
/// }
/// sandcrt::entry!(main);
/// ```
#[macro_export]
macro_rules! entry {
    ($main:path) => {
        #[no_mangle]
        pub unsafe extern "C" fn start(ctx: &'static $crate::ExecContext) -> ! {
            let main: fn(&$crate::rt::DeviceBridge, $crate::Args<'_>) -> ::core::ffi::c_int =
                $main;
            // SAFETY: only the loader calls `start`, with its context
            unsafe { $crate::rt::start(ctx, main) }
        }
    };
}
