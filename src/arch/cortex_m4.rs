//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements context switching via PendSV, SysTick timer configuration,
//! and interrupt management.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by `main`, the kernel's exception
//!   handlers and the fatal hooks
//! - **PSP** (Process Stack Pointer): Used by tasks in Thread mode
//!
//! On exception entry, the hardware stacks R0–R3, R12, LR, PC, and xPSR
//! onto the process stack. The PendSV handler saves and restores R4–R11,
//! which completes the full context save/restore.
//!
//! Targets `thumbv7em-none-eabi` (no FPU context).
//!
//! ## Interrupt Priorities
//!
//! SysTick and PendSV both run at the lowest priority (0xFF), so a context
//! switch never preempts an application interrupt handler.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::kernel;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the processor clock. Each
/// tick enters `SysTick`, which calls `kernel::on_tick()`.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set PendSV and SysTick to the lowest interrupt priority.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // SAFETY: called from `kernel::start` with interrupts masked, before any
    // priority-based critical section exists.
    unsafe {
        scb.set_priority(SystemHandler::PendSV, 0xFF);
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }
}

// ---------------------------------------------------------------------------
// Interrupt control
// ---------------------------------------------------------------------------

/// Pend a PendSV exception to perform a context switch.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
}

/// Mask all configurable interrupts (PRIMASK).
#[inline]
pub fn disable_interrupts() {
    cortex_m::interrupt::disable();
}

#[inline]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Start the first task by switching Thread mode to the PSP and branching
/// into it.
///
/// `psp` points at the initial frame built by the scheduler: eight
/// software-saved words, then the hardware frame. The software words are
/// skipped and the hardware frame is popped by hand, since this is not a
/// real exception return.
///
/// # Safety
/// Must only be called once, from `kernel::start`, with interrupts masked
/// and a pointer to a valid initial frame.
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    asm!(
        "adds r0, #32",        // Skip R4-R11 (8 x 4 bytes)
        "msr psp, r0",

        // Thread mode uses PSP from now on (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        "pop {{r0-r3, r12}}",
        "pop {{r4}}",          // LR: task_exit
        "mov lr, r4",
        "pop {{r5}}",          // PC: task entry point
        "pop {{r6}}",          // xPSR: set by the processor

        "cpsie i",
        "bx r5",
        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler. Performs the context switch.
///
/// ## Sequence
/// 1. Save R4–R11 onto the current task's stack (PSP)
/// 2. Hand the updated PSP to the kernel, which stores it, checks the stack
///    and selects the next task
/// 3. Restore R4–R11 from the next task's stack
/// 4. Return to Thread mode on the PSP; hardware restores the rest
///
/// # Safety
/// Entered only by the NVIC. R4–R11 of the outgoing task are live until
/// they are stacked, so nothing may run before the `stmdb`.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {switch}",             // r0 = next task's PSP
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "mvn lr, #2",              // EXC_RETURN 0xFFFFFFFD: Thread mode, PSP
        "bx lr",
        switch = sym pendsv_switch,
    );
}

extern "C" fn pendsv_switch(psp: *mut u32) -> *mut u32 {
    kernel::switch_context(psp)
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler: the kernel's time base.
#[no_mangle]
pub extern "C" fn SysTick() {
    kernel::on_tick();
}
