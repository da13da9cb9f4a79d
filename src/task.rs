//! # Task Control Block
//!
//! Defines the task model for the Handoff kernel. Each task has a fixed
//! priority, a stack carved from the scheduler's static pool, and an
//! execution state. Task bodies never return: their type is
//! `extern "C" fn() -> !`.

use crate::config::TIME_SLICE_TICKS;

/// Entry point of a task. Returning from a task body is not possible.
pub type TaskEntry = extern "C" fn() -> !;

// ---------------------------------------------------------------------------
// Task handle
// ---------------------------------------------------------------------------

/// Opaque reference to a created task (its index in the TCB table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskHandle(usize);

impl TaskHandle {
    /// Never refers to a created task.
    pub(crate) const INVALID: Self = Self(usize::MAX);

    #[inline]
    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task in the scheduler's state machine.
///
/// ```text
///   ┌──────────┐     schedule()      ┌─────────┐
///   │  Ready   │ ──────────────────► │ Running │
///   └──────────┘                     └─────────┘
///        ▲                                │
///        │      preempt / yield / slice   │
///        ├────────────────────────────────┤
///        │                                │ block()
///        │   unblock() / timeout     ┌──────────┐
///        └────────────────────────── │ Blocked  │
///                                    └──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Task is ready to run and waiting for the CPU.
    Ready,
    /// Task is currently executing on the CPU.
    Running,
    /// Task is waiting on a queue or a delay.
    Blocked,
    /// Free TCB slot.
    Unused,
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB).
///
/// TCBs live in a fixed array inside the scheduler. The stack itself is a
/// window `[stack_base, stack_base + stack_words)` of the scheduler's stack
/// pool; `stack_pointer` is a word offset into that window, updated on
/// every context switch.
#[derive(Clone, Copy)]
pub struct TaskControlBlock {
    /// Human-readable name, reported by the stack overflow hook.
    pub name: &'static str,

    /// Current execution state.
    pub state: TaskState,

    /// Fixed priority (higher = more urgent).
    pub priority: u8,

    /// Saved process stack pointer, as a word offset into the stack pool.
    pub stack_pointer: usize,

    /// First pool word of this task's stack (lowest address).
    pub stack_base: usize,

    /// Stack length in words.
    pub stack_words: usize,

    /// Tick at which a blocked task times out. `None` waits forever.
    pub wake_at: Option<u64>,

    /// Remaining ticks in the current time slice.
    pub ticks_remaining: u32,

    /// Ticks this task has spent in the Running state.
    pub run_ticks: u64,
}

impl TaskControlBlock {
    /// An unallocated TCB. Used to initialise the static table.
    pub const EMPTY: Self = Self {
        name: "",
        state: TaskState::Unused,
        priority: 0,
        stack_pointer: 0,
        stack_base: 0,
        stack_words: 0,
        wake_at: None,
        ticks_remaining: 0,
        run_ticks: 0,
    };

    /// Initialise a TCB for a freshly created task.
    ///
    /// The task starts Ready with a full time slice. The stack frame is
    /// written separately by the scheduler.
    pub fn init(&mut self, name: &'static str, priority: u8, stack_base: usize, stack_words: usize) {
        *self = Self {
            name,
            state: TaskState::Ready,
            priority,
            stack_base,
            stack_words,
            ticks_remaining: TIME_SLICE_TICKS,
            ..Self::EMPTY
        };
    }

    /// Whether this slot holds a created task.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state != TaskState::Unused
    }

    /// Ready or already running.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    /// Put a blocked task back in the ready set.
    pub fn make_ready(&mut self) {
        self.state = TaskState::Ready;
        self.wake_at = None;
    }

    /// Start a fresh time slice.
    #[inline]
    pub fn reset_slice(&mut self) {
        self.ticks_remaining = TIME_SLICE_TICKS;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcb_initialization() {
        let mut tcb = TaskControlBlock::EMPTY;
        assert!(!tcb.is_active());
        assert_eq!(tcb.state, TaskState::Unused);

        tcb.init("Producer", 1, 64, 128);

        assert!(tcb.is_active());
        assert!(tcb.is_runnable());
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.name, "Producer");
        assert_eq!(tcb.priority, 1);
        assert_eq!(tcb.stack_base, 64);
        assert_eq!(tcb.stack_words, 128);
        assert_eq!(tcb.ticks_remaining, TIME_SLICE_TICKS);
        assert_eq!(tcb.wake_at, None);
    }

    #[test]
    fn test_make_ready_clears_timeout() {
        let mut tcb = TaskControlBlock::EMPTY;
        tcb.init("Consumer", 1, 0, 64);
        tcb.state = TaskState::Blocked;
        tcb.wake_at = Some(10);
        assert!(!tcb.is_runnable());

        tcb.make_ready();
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.wake_at, None);
    }

    #[test]
    fn test_handle_index() {
        let handle = TaskHandle::from_index(3);
        assert_eq!(handle.index(), 3);
        assert_ne!(handle, TaskHandle::INVALID);
    }
}
