//! Trap Dispatch
//!
//! When the binary runs unprivileged behind the MPU, every service is a
//! supervisor call. The register convention is fixed:
//!
//! | register | content                                         |
//! |----------|-------------------------------------------------|
//! | r0       | service number ([`UserSyscall`] / [`PrivSyscall`]) |
//! | r1..r3   | arguments, in declaration order                 |
//!
//! The print service passes the address of its `va_list` in r2 rather than
//! the arguments themselves.
//!
//! # Result Slot
//! The handler does not return a value in a register. It writes the
//! context's `syscall_result` and returns; the bridge reads that slot once,
//! right after the trap instruction completes.

use core::cell::UnsafeCell;
use core::ffi::{c_char, c_int, c_long, c_void};
use core::ptr;

use super::bridge::{Syscalls, VaList};
use super::numbers::{PrivSyscall, UserSyscall};

/// Registers carried by one trap (r0..r3).
pub const TRAP_REGS: usize = 4;

/// Register image of a trap at the moment it is raised.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrapFrame {
    /// r0..r3
    pub gpr: [usize; TRAP_REGS],
}

impl TrapFrame {
    /// Service number in r0, `args` in r1 onwards.
    pub fn build(number: u32, args: &[usize]) -> Self {
        debug_assert!(args.len() < TRAP_REGS);
        let mut gpr = [0; TRAP_REGS];
        gpr[0] = number as usize;
        for (reg, arg) in gpr[1..].iter_mut().zip(args) {
            *reg = *arg;
        }
        Self { gpr }
    }

    /// Service number (r0).
    #[inline]
    pub fn number(&self) -> u32 {
        self.gpr[0] as u32
    }

    /// Argument `index`, counted from r1.
    #[inline]
    pub fn arg(&self, index: usize) -> usize {
        self.gpr[index + 1]
    }
}

/// A synchronous privileged call.
///
/// `raise` must not return before the handler has finished with the frame,
/// including its write to the result slot.
pub trait Gate {
    fn raise(&self, frame: &TrapFrame);
}

impl<G: Gate + ?Sized> Gate for &G {
    #[inline]
    fn raise(&self, frame: &TrapFrame) {
        (**self).raise(frame)
    }
}

/// `svc #3` on ARMv7-M.
#[derive(Debug, Default, Clone, Copy)]
pub struct SvcGate;

#[cfg(all(target_arch = "arm", target_os = "none"))]
impl Gate for SvcGate {
    #[inline(always)]
    fn raise(&self, frame: &TrapFrame) {
        // SAFETY:
        // - The SVC handler is installed by the loader before entry
        // - r0-r3 are declared clobbered, as the handler may use them
        // - No `nomem`: the handler writes the result slot behind our back
        unsafe {
            core::arch::asm!(
                "svc #{number}",
                number = const super::numbers::SYSCALL_SVC_NUMBER,
                inout("r0") frame.gpr[0] => _,
                inout("r1") frame.gpr[1] => _,
                inout("r2") frame.gpr[2] => _,
                inout("r3") frame.gpr[3] => _,
                options(nostack),
            );
        }
    }
}

/// Host-side handler invoked as a plain synchronous call.
pub type TrapHandler = fn(&TrapFrame);

/// Gate for targets without a supervisor call: the "trap" is a function
/// call into a privileged handler living in the same address space.
#[derive(Clone, Copy)]
pub struct HandlerGate {
    handler: TrapHandler,
}

impl HandlerGate {
    pub const fn new(handler: TrapHandler) -> Self {
        Self { handler }
    }
}

impl Gate for HandlerGate {
    #[inline]
    fn raise(&self, frame: &TrapFrame) {
        (self.handler)(frame)
    }
}

impl core::fmt::Debug for HandlerGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerGate").finish_non_exhaustive()
    }
}

/// Trap backend.
pub struct TrapDispatch<G> {
    gate: G,
    result: *const UnsafeCell<c_int>,
}

// SAFETY: the slot address never changes after entry and an execution has a
// single thread of control; the gate's own thread-safety is required.
unsafe impl<G: Send> Send for TrapDispatch<G> {}
unsafe impl<G: Sync> Sync for TrapDispatch<G> {}

impl<G: Gate> TrapDispatch<G> {
    /// # Safety
    /// `result` must point to the context's result slot and stay valid for
    /// the life of the dispatcher.
    pub unsafe fn new(gate: G, result: *const UnsafeCell<c_int>) -> Self {
        Self { gate, result }
    }

    /// Raise the trap, then read the slot exactly once.
    #[inline]
    fn call(&self, frame: TrapFrame) -> c_int {
        self.gate.raise(&frame);
        // SAFETY:
        // - The slot outlives the dispatcher (`new` contract)
        // - `raise` is synchronous: the handler's write is complete
        // - Volatile so the read is neither cached nor hoisted above the trap
        // Audited: 2026-10-19
        unsafe { ptr::read_volatile((*self.result).get()) }
    }

    #[inline]
    fn user(&self, service: UserSyscall, args: &[usize]) -> c_int {
        self.call(TrapFrame::build(service.number(), args))
    }
}

impl<G> TrapDispatch<G> {
    pub fn gate(&self) -> &G {
        &self.gate
    }

    pub fn result_slot(&self) -> *const UnsafeCell<c_int> {
        self.result
    }
}

impl<G: Gate> Syscalls for TrapDispatch<G> {
    unsafe fn vprintf(&self, format: *const c_char, ap: VaList<'_>) -> c_int {
        // The list must outlive the trap: the handler reads it through r2.
        let ap_ref: *const VaList<'_> = &ap;
        self.user(UserSyscall::Printf, &[format as usize, ap_ref as usize])
    }

    fn get_temp(&self) -> c_int {
        self.user(UserSyscall::GetTemp, &[])
    }

    fn isprint(&self, character: c_int) -> c_int {
        self.user(UserSyscall::IsPrint, &[character as usize])
    }

    unsafe fn strtol(&self, s: *const c_char, endptr: *mut *mut c_char, base: c_int) -> c_long {
        self.user(UserSyscall::Strtol, &[s as usize, endptr as usize, base as usize]) as c_long
    }

    fn get_led(&self, pos: c_int) -> c_int {
        self.user(UserSyscall::GetLed, &[pos as usize])
    }

    fn set_led(&self, pos: c_int, val: c_int) -> c_int {
        self.user(UserSyscall::SetLed, &[pos as usize, val as usize])
    }

    unsafe fn copy_file(&self, name: *const c_char, buf: *mut c_void, nbyte: usize) -> isize {
        self.user(UserSyscall::CopyFile, &[name as usize, buf as usize, nbyte]) as isize
    }

    unsafe fn get_file_size(&self, name: *const c_char, size: *mut usize) -> c_int {
        self.user(UserSyscall::GetFileSize, &[name as usize, size as usize])
    }

    unsafe fn memset(&self, m: *mut c_void, c: c_int, n: usize) -> *mut c_void {
        self.user(UserSyscall::Memset, &[m as usize, c as usize, n]) as usize as *mut c_void
    }

    fn exit(&self, status: c_int) {
        // Nothing to read back: the loader does not return here.
        self.gate
            .raise(&TrapFrame::build(PrivSyscall::Exit.number(), &[status as usize]));
    }
}

impl<G> core::fmt::Debug for TrapDispatch<G> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrapDispatch")
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecContext;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Privileged side of the boundary: logs frames, answers through the slot.
    struct Supervisor {
        slot: *const UnsafeCell<c_int>,
        frames: RefCell<Vec<TrapFrame>>,
        replies: RefCell<VecDeque<c_int>>,
        print_args: RefCell<Vec<usize>>,
    }

    impl Supervisor {
        fn new(ctx: &ExecContext, replies: &[c_int]) -> Self {
            Self {
                slot: ctx.result_slot(),
                frames: RefCell::new(Vec::new()),
                replies: RefCell::new(replies.iter().copied().collect()),
                print_args: RefCell::new(Vec::new()),
            }
        }
    }

    impl Gate for Supervisor {
        fn raise(&self, frame: &TrapFrame) {
            self.frames.borrow_mut().push(*frame);
            if frame.number() == UserSyscall::Printf.number() {
                // r2 holds the address of the caller's va_list.
                let ap = unsafe { *(frame.arg(1) as *const VaList<'_>) };
                let words = unsafe { [ap.arg(0), ap.arg(1)] };
                self.print_args.borrow_mut().extend(words);
            }
            if let Some(reply) = self.replies.borrow_mut().pop_front() {
                unsafe { *(*self.slot).get() = reply };
            }
        }
    }

    #[test]
    fn test_register_mapping() {
        let ctx = ExecContext::zeroed();
        let sup = Supervisor::new(&ctx, &[10, 11, 12, 13, 14, 15, 16, 17, 18]);
        let trap = unsafe { TrapDispatch::new(&sup, ctx.result_slot()) };

        let words = [42usize, 7];
        let fmt = 0x1000 as *const c_char;
        let name = 0x2000 as *const c_char;
        let end = 0x3000 as *mut *mut c_char;
        let buf = 0x4000 as *mut c_void;
        let size = 0x5000 as *mut usize;

        assert_eq!(unsafe { trap.vprintf(fmt, VaList::new(&words)) }, 10);
        assert_eq!(trap.get_temp(), 11);
        assert_eq!(trap.isprint(0x41), 12);
        assert_eq!(unsafe { trap.strtol(name, end, 10) }, 13);
        assert_eq!(trap.get_led(2), 14);
        assert_eq!(trap.set_led(2, 1), 15);
        assert_eq!(unsafe { trap.copy_file(name, buf, 32) }, 16);
        assert_eq!(unsafe { trap.get_file_size(name, size) }, 17);
        assert_eq!(unsafe { trap.memset(buf, 0, 8) }, 18 as *mut c_void);

        let frames = sup.frames.borrow();
        let gpr: Vec<[usize; 4]> = frames.iter().map(|f| f.gpr).collect();
        assert_eq!(gpr[0][..2], [0, 0x1000]);
        assert_eq!(gpr[1], [1, 0, 0, 0]);
        assert_eq!(gpr[2], [2, 0x41, 0, 0]);
        assert_eq!(gpr[3], [3, 0x2000, 0x3000, 10]);
        assert_eq!(gpr[4], [4, 2, 0, 0]);
        assert_eq!(gpr[5], [5, 2, 1, 0]);
        assert_eq!(gpr[6], [6, 0x2000, 0x4000, 32]);
        assert_eq!(gpr[7], [7, 0x2000, 0x5000, 0]);
        assert_eq!(gpr[8], [8, 0x4000, 0, 8]);

        // The print call carried a reference to its argument list.
        assert_eq!(*sup.print_args.borrow(), vec![42, 7]);
    }

    #[test]
    fn test_result_read_after_trap() {
        let ctx = ExecContext::zeroed();
        unsafe { *ctx.syscall_result.get() = 777 };
        let sup = Supervisor::new(&ctx, &[1, 2]);
        let trap = unsafe { TrapDispatch::new(&sup, ctx.result_slot()) };

        // Stale 777 must never be observed.
        assert_eq!(trap.get_temp(), 1);
        assert_eq!(trap.get_temp(), 2);
        assert_eq!(sup.frames.borrow().len(), 2);
    }

    #[test]
    fn test_exit_frame() {
        let ctx = ExecContext::zeroed();
        let sup = Supervisor::new(&ctx, &[]);
        let trap = unsafe { TrapDispatch::new(&sup, ctx.result_slot()) };

        trap.exit(3);
        assert_eq!(sup.frames.borrow()[0].gpr, [9, 3, 0, 0]);
    }

    /// Reads the accessors without requiring a gate.
    fn parts<G>(trap: &TrapDispatch<G>) -> (&G, *const UnsafeCell<c_int>) {
        (trap.gate(), trap.result_slot())
    }

    #[test]
    fn test_accessors_need_no_gate_bound() {
        let ctx = ExecContext::zeroed();
        let sup = Supervisor::new(&ctx, &[]);
        let trap = unsafe { TrapDispatch::new(&sup, ctx.result_slot()) };

        let (gate, slot) = parts(&trap);
        assert!(core::ptr::eq(*gate, &sup));
        assert_eq!(slot, ctx.result_slot());
        assert!(sup.frames.borrow().is_empty());
    }

    #[test]
    fn test_handler_gate_is_synchronous() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static SEEN: AtomicUsize = AtomicUsize::new(0);

        fn handler(frame: &TrapFrame) {
            SEEN.store(frame.arg(0), Ordering::SeqCst);
        }

        let gate = HandlerGate::new(handler);
        gate.raise(&TrapFrame::build(UserSyscall::GetLed.number(), &[5]));
        assert_eq!(SEEN.load(Ordering::SeqCst), 5);
    }
}
