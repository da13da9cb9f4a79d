//! # Handoff Configuration
//!
//! Compile-time constants governing the kernel and the demo application.
//! All limits are fixed at compile time, no dynamic allocation.

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// Maximum number of tasks the kernel can manage, idle task included.
/// Bounds the static TCB array and every queue wait list.
pub const MAX_TASKS: usize = 8;

/// Number of priority levels. Valid priorities are `0..MAX_PRIORITIES`,
/// higher numbers are more urgent.
pub const MAX_PRIORITIES: u8 = 5;

/// Priority of the idle task. Nothing may run below it.
pub const IDLE_PRIORITY: u8 = 0;

/// SysTick frequency in Hz. One tick is the unit of every wait and delay.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (STM32F4 reset default, 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Rotate between ready tasks of equal priority on the tick.
pub const USE_TIME_SLICING: bool = true;

/// Ticks a task runs before an equal-priority peer gets the CPU.
pub const TIME_SLICE_TICKS: u32 = 1;

// ---------------------------------------------------------------------------
// Stacks
// ---------------------------------------------------------------------------

/// Size of the static pool all task stacks are carved from, in 32-bit words.
/// Plays the role of the kernel heap: exhausting it is an out-of-memory
/// condition.
pub const STACK_POOL_WORDS: usize = 1024;

/// Default stack size for application tasks, in words.
pub const MINIMAL_STACK_WORDS: usize = 128;

/// Stack size of the idle task, in words.
pub const IDLE_STACK_WORDS: usize = MINIMAL_STACK_WORDS;

/// Pattern every stack word is painted with at task creation.
pub const STACK_FILL_WORD: u32 = 0xA5A5_A5A5;

/// Number of words at the bottom of each stack that must keep the fill
/// pattern. Damage to any of them is reported as a stack overflow.
pub const STACK_CANARY_WORDS: usize = 4;

/// Smallest stack a task may be created with: the 16-word initial exception
/// frame, the canary, and a little room to run.
pub const MIN_STACK_WORDS: usize = 16 + STACK_CANARY_WORDS + 12;

/// Check the saved stack pointer and the canary on every context switch.
pub const CHECK_FOR_STACK_OVERFLOW: bool = true;

/// Call `fatal::out_of_memory` when the stack pool cannot satisfy a task
/// creation, instead of returning the error to the caller.
pub const USE_MALLOC_FAILED_HOOK: bool = true;

// ---------------------------------------------------------------------------
// Demo application
// ---------------------------------------------------------------------------

/// Capacity of the producer/consumer queue, in elements.
pub const QUEUE_LENGTH: usize = 100;

/// Producer and consumer share a priority so they are time sliced.
pub const PRODUCER_PRIORITY: u8 = 1;
pub const CONSUMER_PRIORITY: u8 = 1;
