//! # Host Port
//!
//! Stand-in for the Cortex-M4 port on non-ARM targets, used by unit tests.
//! There is no context switching on the host: `trigger_pendsv` is a no-op
//! and the first task can never be launched. Each thread that masks
//! interrupts is recorded, so fail-stop behaviour can be observed per
//! thread.

extern crate std;

use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::vec::Vec;

static MASKED_BY: Mutex<Vec<ThreadId>> = Mutex::new(Vec::new());

pub fn configure_systick(_syst: &mut cortex_m::peripheral::SYST) {}

pub fn set_interrupt_priorities(_scb: &mut cortex_m::peripheral::SCB) {}

#[inline]
pub fn trigger_pendsv() {}

/// # Safety
/// Never sound to call on the host; present only to mirror the target port.
pub unsafe fn start_first_task(_psp: *const u32) -> ! {
    panic!("start_first_task is not available on the host");
}

pub fn disable_interrupts() {
    let id = thread::current().id();
    let mut masked = MASKED_BY.lock().unwrap_or_else(PoisonError::into_inner);
    if !masked.contains(&id) {
        masked.push(id);
    }
}

/// Whether `thread` has called `disable_interrupts`.
pub fn interrupts_masked_by(thread: ThreadId) -> bool {
    MASKED_BY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&thread)
}

/// Park the calling thread. Wakes spuriously at most, like `wfi`.
pub fn wait_for_interrupt() {
    thread::park();
}
