//! # Fatal-Condition Hooks
//!
//! Fail-stop handlers for unrecoverable conditions. Each one masks
//! interrupts and halts forever: no reset, no retry, no unwinding, and no
//! logging (nothing is assumed to work any more).

use crate::arch;
use crate::task::TaskHandle;

/// Mask interrupts and stop making progress.
pub fn halt() -> ! {
    arch::disable_interrupts();
    loop {
        arch::wait_for_interrupt();
    }
}

/// A `kassert!` failed.
#[inline(never)]
pub fn assert_failed(_file: &'static str, _line: u32) -> ! {
    halt()
}

/// The stack pool could not satisfy a task creation.
#[inline(never)]
pub fn out_of_memory() -> ! {
    halt()
}

/// `task` was found past the end of its stack at a context switch.
#[inline(never)]
pub fn stack_overflow(_task: TaskHandle, _name: &'static str) -> ! {
    halt()
}

/// Halt through [`assert_failed`] if the condition is false.
#[macro_export]
macro_rules! kassert {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::fatal::assert_failed(::core::file!(), ::core::line!());
        }
    };
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Run `hook` on its own thread with a progress counter around it, and
    /// check that nothing after the hook ever executes.
    fn assert_fail_stop(hook: fn()) {
        let progress = Arc::new(AtomicU32::new(0));
        let observed = Arc::clone(&progress);

        let handle = thread::spawn(move || {
            observed.store(1, Ordering::SeqCst);
            hook();
            observed.store(2, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        // Spurious unparks must not let the hook return either
        handle.thread().unpark();
        thread::sleep(Duration::from_millis(50));

        assert_eq!(progress.load(Ordering::SeqCst), 1, "Hook returned");
        assert!(!handle.is_finished(), "Halted thread must never finish");
        assert!(
            arch::interrupts_masked_by(handle.thread().id()),
            "Hook must mask interrupts"
        );
    }

    #[test]
    fn test_assert_failed_halts() {
        assert_fail_stop(|| assert_failed(file!(), line!()));
    }

    #[test]
    fn test_out_of_memory_halts() {
        assert_fail_stop(|| out_of_memory());
    }

    #[test]
    fn test_stack_overflow_halts() {
        assert_fail_stop(|| stack_overflow(TaskHandle::from_index(1), "Producer"));
    }

    #[test]
    fn test_masking_is_tracked_per_thread() {
        // Halt one thread first, then check a thread that only sleeps
        assert_fail_stop(|| halt());

        let sleeper = thread::spawn(|| loop {
            arch::wait_for_interrupt();
        });
        thread::sleep(Duration::from_millis(20));
        assert!(
            !arch::interrupts_masked_by(sleeper.thread().id()),
            "A thread that never masked must not be reported as masked"
        );
    }

    #[test]
    fn test_kassert_halts_only_on_false() {
        assert_fail_stop(|| {
            kassert!(1 + 1 == 2);
            kassert!(false);
        });
    }
}
