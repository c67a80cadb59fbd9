//! Fail-stop halt
//!
//! Reached when the loader's exit returns, when the layout is refused, or
//! on panic. The binary stops making progress and never touches the bridge
//! again.

use core::ops::ControlFlow;

/// One iteration of the halt loop.
///
/// The device idles forever; tests stop after a fixed number of steps.
pub trait Idle {
    fn idle(&mut self) -> ControlFlow<()>;
}

/// Sleep until the next interrupt, forever.
#[derive(Debug, Default, Clone, Copy)]
pub struct Wfi;

impl Idle for Wfi {
    #[inline]
    fn idle(&mut self) -> ControlFlow<()> {
        wait_for_interrupt();
        ControlFlow::Continue(())
    }
}

/// Stop after `remaining` idle steps.
#[derive(Debug, Clone, Copy)]
pub struct StepBudget {
    remaining: usize,
}

impl StepBudget {
    pub const fn new(steps: usize) -> Self {
        Self { remaining: steps }
    }

    pub const fn remaining(&self) -> usize {
        self.remaining
    }
}

impl Idle for StepBudget {
    fn idle(&mut self) -> ControlFlow<()> {
        match self.remaining.checked_sub(1) {
            Some(left) => {
                self.remaining = left;
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(()),
        }
    }
}

/// Proof that the halt loop was entered. `steps` counts idle iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Halted {
    pub steps: usize,
}

/// Run the halt loop until `idle` breaks. With [`Wfi`] it never returns.
pub fn fail_stop<I: Idle + ?Sized>(idle: &mut I) -> Halted {
    let mut steps = 0;
    while idle.idle().is_continue() {
        steps += 1;
    }
    Halted { steps }
}

/// Halt the CPU in a low-power state.
pub fn halt() -> ! {
    loop {
        wait_for_interrupt();
    }
}

#[inline(always)]
fn wait_for_interrupt() {
    #[cfg(target_arch = "arm")]
    // SAFETY: WFI is always safe to execute
    // Audited: 2026-10-19
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack, preserves_flags));
    }

    #[cfg(not(target_arch = "arm"))]
    core::hint::spin_loop();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_bounds_loop() {
        let mut budget = StepBudget::new(5);
        assert_eq!(fail_stop(&mut budget), Halted { steps: 5 });
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_zero_budget() {
        assert_eq!(fail_stop(&mut StepBudget::new(0)).steps, 0);
    }
}
