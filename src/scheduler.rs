//! # Scheduler
//!
//! Core scheduling logic for the Handoff kernel: a preemptive, fixed-priority
//! scheduler with round-robin time slicing among tasks of equal priority.
//!
//! ## Scheduling Algorithm
//!
//! At each SysTick interrupt (`tick()`):
//! 1. **Advance time**: increment the tick counter
//! 2. **Wake timeouts**: blocked tasks whose deadline has passed become Ready;
//!    a woken task that outranks the running one requests a switch
//! 3. **Time slice**: when the running task's slice expires and an
//!    equal-priority peer is ready, request a switch
//!
//! When a switch happens (`schedule()`), the highest-priority runnable task
//! is picked. The search starts just after the current task, so equal
//! priorities rotate.
//!
//! ## Stacks
//!
//! Task stacks are carved from a [`StackPool`] in creation order and are
//! never returned. The pool is a separate `'static` object: the scheduler
//! only holds a reference to it, so a running task's stack is never covered
//! by a borrow of the scheduler. Saved stack pointers are word offsets into
//! the pool and become addresses only at the PendSV boundary.
//!
//! Every stack is painted with `STACK_FILL_WORD`; its lowest
//! `STACK_CANARY_WORDS` words act as the overflow canary.

use core::cell::UnsafeCell;

use crate::config::{
    CHECK_FOR_STACK_OVERFLOW, MAX_PRIORITIES, MAX_TASKS, MIN_STACK_WORDS, STACK_CANARY_WORDS,
    STACK_FILL_WORD, STACK_POOL_WORDS, USE_TIME_SLICING,
};
use crate::error::CreateError;
use crate::task::{TaskControlBlock, TaskEntry, TaskHandle, TaskState};

/// Words in the initial exception frame: R4–R11 (software) + R0–R3, R12,
/// LR, PC, xPSR (hardware).
const INITIAL_FRAME_WORDS: usize = 16;

/// xPSR with only the Thumb bit set.
const INITIAL_XPSR: u32 = 0x0100_0000;

/// Backing storage for every task stack. 8-byte aligned as AAPCS requires
/// of stack pointers at public interfaces.
///
/// Only touched through raw pointers: a stack is written while it is
/// painted (before its task exists) and afterwards only its paint pattern
/// is read. Everything else belongs to the task running on it.
#[repr(C, align(8))]
pub struct StackPool(UnsafeCell<[u32; STACK_POOL_WORDS]>);

// SAFETY: see the access rules above. The scheduler only reaches the pool
// inside critical sections.
unsafe impl Sync for StackPool {}

impl StackPool {
    pub const fn new() -> Self {
        Self(UnsafeCell::new([0; STACK_POOL_WORDS]))
    }

    /// Address of pool word `index`.
    #[inline]
    fn word(&self, index: usize) -> *mut u32 {
        self.0.get().cast::<u32>().wrapping_add(index)
    }

    /// Pool word index of `ptr`. Wraps for addresses below the pool.
    #[inline]
    fn index_of(&self, ptr: *const u32) -> usize {
        (ptr as usize).wrapping_sub(self.word(0) as usize) / core::mem::size_of::<u32>()
    }

    #[inline]
    fn read(&self, index: usize) -> u32 {
        debug_assert!(index < STACK_POOL_WORDS);
        // SAFETY: in bounds; a plain word read that creates no reference
        // into a live stack.
        unsafe { self.word(index).read_volatile() }
    }
}

impl Default for StackPool {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state. Stored in a critical-section mutex in
/// `kernel.rs`, next to the static [`StackPool`] it carves stacks from.
pub struct Scheduler {
    /// Fixed-size array of TCBs, filled in creation order.
    tasks: [TaskControlBlock; MAX_TASKS],

    /// Number of allocated tasks.
    task_count: usize,

    /// Index of the task owning the CPU. `None` until the first schedule.
    current: Option<usize>,

    /// Monotonic tick counter.
    tick_count: u64,

    /// Set when a context switch should happen at the next opportunity.
    needs_reschedule: bool,

    pool: &'static StackPool,

    /// Words of the pool handed out so far. Always even.
    pool_used: usize,
}

impl Scheduler {
    /// Create an empty scheduler carving stacks from `pool`. Usable in
    /// `static` initialisers.
    pub const fn new(pool: &'static StackPool) -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            task_count: 0,
            current: None,
            tick_count: 0,
            needs_reschedule: false,
            pool,
            pool_used: 0,
        }
    }

    /// Register a new task.
    ///
    /// The stack size is rounded up to an even number of words so every
    /// stack top stays 8-byte aligned.
    ///
    /// # Returns
    /// - `Ok(handle)`: the newly created task, in state Ready
    /// - `Err(CreateError)`: nothing was allocated
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        name: &'static str,
        stack_words: usize,
        priority: u8,
    ) -> Result<TaskHandle, CreateError> {
        if priority >= MAX_PRIORITIES {
            return Err(CreateError::InvalidPriority(priority));
        }
        if stack_words < MIN_STACK_WORDS {
            return Err(CreateError::StackTooSmall {
                requested: stack_words,
                minimum: MIN_STACK_WORDS,
            });
        }
        if self.task_count >= MAX_TASKS {
            return Err(CreateError::TaskTableFull);
        }

        let words = (stack_words + 1) & !1;
        let available = self.free_stack_words();
        if words > available {
            return Err(CreateError::OutOfMemory {
                requested: words,
                available,
            });
        }

        let id = self.task_count;
        let base = self.pool_used;
        self.pool_used += words;
        self.tasks[id].init(name, priority, base, words);
        self.init_task_stack(id, entry);
        self.task_count += 1;

        Ok(TaskHandle::from_index(id))
    }

    /// Called from the SysTick handler every tick.
    ///
    /// Wakes timed-out tasks and applies time slicing. Returns whether a
    /// context switch is wanted.
    pub fn tick(&mut self) -> bool {
        self.tick_count += 1;
        let now = self.tick_count;
        let running_priority = self.current.map(|c| self.tasks[c].priority);

        // --- Wake tasks whose wait has timed out ---
        for tcb in self.tasks[..self.task_count].iter_mut() {
            if tcb.state == TaskState::Blocked && tcb.wake_at.is_some_and(|at| now >= at) {
                tcb.make_ready();
                if running_priority.is_some_and(|p| tcb.priority > p) {
                    self.needs_reschedule = true;
                }
            }
        }

        // --- Time slicing ---
        if let Some(current) = self.current {
            let tcb = &mut self.tasks[current];
            tcb.run_ticks += 1;
            tcb.ticks_remaining = tcb.ticks_remaining.saturating_sub(1);

            if tcb.ticks_remaining == 0 {
                tcb.reset_slice();
                if USE_TIME_SLICING && self.has_ready_peer(current) {
                    self.needs_reschedule = true;
                }
            }
        }

        self.needs_reschedule
    }

    /// Whether a task other than `index` is Ready at the same or a higher
    /// priority.
    fn has_ready_peer(&self, index: usize) -> bool {
        let priority = self.tasks[index].priority;
        self.tasks[..self.task_count]
            .iter()
            .enumerate()
            .any(|(i, t)| i != index && t.state == TaskState::Ready && t.priority >= priority)
    }

    /// Select the next task to run and make it current.
    ///
    /// Picks the highest-priority runnable task. Ties go to the first one
    /// found scanning forward from the task after the current one, which
    /// gives round-robin order among equals. The current task keeps the
    /// CPU only if nothing of equal or higher priority is ready.
    ///
    /// # Returns
    /// The selected task, or `None` if nothing is runnable (the idle task
    /// makes that impossible once the kernel is started).
    pub fn schedule(&mut self) -> Option<TaskHandle> {
        if self.task_count == 0 {
            return None;
        }

        let start = self.current.map_or(0, |c| c + 1);
        let mut best: Option<usize> = None;

        for offset in 0..self.task_count {
            let i = (start + offset) % self.task_count;
            if !self.tasks[i].is_runnable() {
                continue;
            }
            match best {
                Some(b) if self.tasks[b].priority >= self.tasks[i].priority => {}
                _ => best = Some(i),
            }
        }

        let next = best?;

        // Previous task gives up the CPU (unless it blocked itself)
        if let Some(prev) = self.current {
            if prev != next && self.tasks[prev].state == TaskState::Running {
                self.tasks[prev].state = TaskState::Ready;
            }
        }

        if self.current != Some(next) {
            self.tasks[next].reset_slice();
        }
        self.tasks[next].state = TaskState::Running;
        self.current = Some(next);
        self.needs_reschedule = false;

        Some(TaskHandle::from_index(next))
    }

    /// Give up the rest of the current slice.
    pub fn yield_current(&mut self) {
        if let Some(current) = self.current {
            self.tasks[current].state = TaskState::Ready;
            self.tasks[current].reset_slice();
            self.needs_reschedule = true;
        }
    }

    /// Block the current task until `wake_at` (a tick count) or until
    /// someone calls [`unblock`](Self::unblock). `None` never times out.
    pub fn block_current(&mut self, wake_at: Option<u64>) -> Option<TaskHandle> {
        let current = self.current?;
        let tcb = &mut self.tasks[current];
        tcb.state = TaskState::Blocked;
        tcb.wake_at = wake_at;
        self.needs_reschedule = true;
        Some(TaskHandle::from_index(current))
    }

    /// Make a blocked task Ready again.
    ///
    /// Returns `true` if the woken task outranks the running one, i.e. the
    /// caller should trigger a context switch.
    pub fn unblock(&mut self, task: TaskHandle) -> bool {
        let index = task.index();
        if index >= self.task_count || self.tasks[index].state != TaskState::Blocked {
            return false;
        }
        self.tasks[index].make_ready();

        let preempt = self
            .current
            .is_some_and(|c| self.tasks[index].priority > self.tasks[c].priority);
        if preempt {
            self.needs_reschedule = true;
        }
        preempt
    }

    /// Store the outgoing task's stack pointer (as a pool offset). Called
    /// from PendSV.
    ///
    /// # Returns
    /// `Err(task)` if the task overflowed its stack; the pointer is not
    /// stored in that case.
    pub fn save_context(&mut self, psp: *mut u32) -> Result<(), TaskHandle> {
        let Some(current) = self.current else {
            return Ok(());
        };
        let handle = TaskHandle::from_index(current);
        if CHECK_FOR_STACK_OVERFLOW && self.stack_overflowed(handle, psp) {
            return Err(handle);
        }
        self.tasks[current].stack_pointer = self.pool.index_of(psp);
        Ok(())
    }

    /// Whether `psp` reaches into the canary region of `task`'s stack, or
    /// the canary has been overwritten.
    pub fn stack_overflowed(&self, task: TaskHandle, psp: *const u32) -> bool {
        let base = self.tasks[task.index()].stack_base;
        let limit = self.pool.word(base + STACK_CANARY_WORDS) as usize;
        (psp as usize) < limit
            || (base..base + STACK_CANARY_WORDS).any(|i| self.pool.read(i) != STACK_FILL_WORD)
    }

    /// Minimum number of words that have stayed free on `task`'s stack
    /// since it was created.
    pub fn stack_high_water_mark(&self, task: TaskHandle) -> usize {
        let tcb = &self.tasks[task.index()];
        (tcb.stack_base..tcb.stack_base + tcb.stack_words)
            .take_while(|&i| self.pool.read(i) == STACK_FILL_WORD)
            .count()
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[inline]
    pub fn now(&self) -> u64 {
        self.tick_count
    }

    #[inline]
    pub fn current(&self) -> Option<TaskHandle> {
        self.current.map(TaskHandle::from_index)
    }

    pub fn current_priority(&self) -> Option<u8> {
        self.current.map(|c| self.tasks[c].priority)
    }

    #[inline]
    pub fn needs_reschedule(&self) -> bool {
        self.needs_reschedule
    }

    #[inline]
    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn task(&self, task: TaskHandle) -> &TaskControlBlock {
        &self.tasks[task.index()]
    }

    /// Saved stack pointer of `task`, as PendSV will restore it.
    pub fn stack_pointer(&self, task: TaskHandle) -> *mut u32 {
        self.pool.word(self.tasks[task.index()].stack_pointer)
    }

    #[inline]
    pub fn free_stack_words(&self) -> usize {
        STACK_POOL_WORDS - self.pool_used
    }

    // -----------------------------------------------------------------------
    // Stack initialization
    // -----------------------------------------------------------------------

    /// Paint a task's stack and build its first exception frame.
    ///
    /// The first PendSV "return" into the task pops this frame and starts
    /// executing `entry`.
    ///
    /// ## Stack Layout (top = high address, growing down)
    ///
    /// ```text
    /// [Hardware stacked frame]
    ///   xPSR  (Thumb bit set)
    ///   PC    (task entry point)
    ///   LR    (task_exit)
    ///   R12, R3, R2, R1, R0 (0)
    /// [Software saved context]
    ///   R11 .. R4 (0)              <- stack_pointer after init
    /// [free, painted 0xA5A5A5A5]
    /// [canary]                     <- stack_base
    /// ```
    fn init_task_stack(&mut self, id: usize, entry: TaskEntry) {
        let base = self.tasks[id].stack_base;
        let words = self.tasks[id].stack_words;

        // SAFETY: `[base, base + words)` was just carved from the pool and no
        // task runs on it yet, so this is the only reference to it.
        let stack = unsafe { core::slice::from_raw_parts_mut(self.pool.word(base), words) };
        stack.fill(STACK_FILL_WORD);

        let frame = &mut stack[words - INITIAL_FRAME_WORDS..];
        frame[..13].fill(0); // R4–R11, R0–R3, R12
        frame[13] = task_exit as usize as u32; // LR: return address if a task returns
        frame[14] = entry as usize as u32; // PC: task entry point
        frame[15] = INITIAL_XPSR;

        self.tasks[id].stack_pointer = base + words - INITIAL_FRAME_WORDS;
    }
}

/// Landing pad for a task that returns. Entry points are `fn() -> !`, so
/// reaching this is a broken invariant.
extern "C" fn task_exit() -> ! {
    crate::fatal::assert_failed(file!(), line!())
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
