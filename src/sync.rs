//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstraction. All state shared between
//! tasks and interrupt handlers (scheduler, queues, tick counter) is held in
//! a [`Mutex`] and only touched inside a critical section.
//!
//! On the target the critical section is provided by `cortex-m`'s
//! single-core implementation (PRIMASK). Host test builds link the
//! `critical-section` std implementation instead.

pub use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and the previous state is restored on
/// exit, so nesting is allowed.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     let mut scheduler = SCHEDULER.borrow_ref_mut(cs);
///     // ...
/// });
/// ```
///
/// Keep critical sections short; they delay SysTick and therefore the
/// whole time base.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
