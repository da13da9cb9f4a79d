//! # Kernel
//!
//! Top-level kernel initialization and public API.
//!
//! The kernel owns the global scheduler instance, provides task creation
//! and lifecycle APIs, drives the time base from SysTick, and coordinates
//! system startup. Every access to the scheduler goes through a critical
//! section.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← Register application hooks
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Create the idle task
//!               ├─► Configure SysTick
//!               ├─► Set interrupt priorities
//!               └─► Start first task via arch::start_first_task()
//! ```

use core::cell::{Cell, RefCell};

use crate::arch;
use crate::config::{IDLE_PRIORITY, IDLE_STACK_WORDS, USE_MALLOC_FAILED_HOOK};
use crate::error::CreateError;
use crate::fatal;
use crate::scheduler::{Scheduler, StackPool};
use crate::sync::{self, CriticalSection, Mutex};
use crate::task::{TaskEntry, TaskHandle};

/// Wait argument meaning "fail at once instead of blocking".
pub const NO_WAIT: u32 = 0;

/// Wait argument meaning "block until the operation can complete".
pub const WAIT_FOREVER: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Global kernel state
// ---------------------------------------------------------------------------

/// Memory for every task stack, idle task included. Kept outside the
/// scheduler so that borrowing the scheduler never covers a live stack.
static STACKS: StackPool = StackPool::new();

/// Global scheduler instance. Shared with the SysTick and PendSV handlers.
static SCHEDULER: Mutex<RefCell<Scheduler>> = Mutex::new(RefCell::new(Scheduler::new(&STACKS)));

static HOOKS: Mutex<Cell<Hooks>> = Mutex::new(Cell::new(Hooks::NONE));

/// Application callbacks invoked by the kernel.
#[derive(Debug, Clone, Copy)]
pub struct Hooks {
    /// Called from the SysTick interrupt after the kernel's own tick work.
    /// Runs in interrupt context: it must not block.
    pub tick: Option<fn()>,
    /// Called on every iteration of the idle task. Must not block.
    pub idle: Option<fn()>,
}

impl Hooks {
    pub const NONE: Self = Self {
        tick: None,
        idle: None,
    };
}

/// Point in time a blocking call gives up at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Never,
    At(u64),
}

impl Deadline {
    /// Deadline `wait` ticks after `now`. `WAIT_FOREVER` never expires.
    pub fn after(now: u64, wait: u32) -> Self {
        if wait == WAIT_FOREVER {
            Self::Never
        } else {
            Self::At(now + u64::from(wait))
        }
    }

    pub fn has_passed(self, now: u64) -> bool {
        match self {
            Self::Never => false,
            Self::At(at) => now >= at,
        }
    }

    fn wake_at(self) -> Option<u64> {
        match self {
            Self::Never => None,
            Self::At(at) => Some(at),
        }
    }
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel and register the application hooks.
///
/// Must be called before any other kernel function, from `main`, before
/// starting the scheduler.
pub fn init(hooks: Hooks) {
    sync::critical_section(|cs| {
        *SCHEDULER.borrow_ref_mut(cs) = Scheduler::new(&STACKS);
        HOOKS.borrow(cs).set(hooks);
    });
    info!("kernel initialised, {=u32} Hz tick", crate::config::TICK_HZ);
}

/// Create a new task and register it with the scheduler.
///
/// # Parameters
/// - `entry`: Task entry function. Must be `extern "C" fn() -> !` (never returns).
/// - `name`: Reported by the stack overflow hook.
/// - `stack_words`: Stack size in 32-bit words, carved from the static pool.
/// - `priority`: Fixed priority, below `MAX_PRIORITIES`. Higher runs first.
///
/// # Errors
/// See [`CreateError`]. When `USE_MALLOC_FAILED_HOOK` is set, stack pool
/// exhaustion does not return: it ends in [`fatal::out_of_memory`].
///
/// # Example
/// ```ignore
/// let producer = kernel::create_task(producer_task, "Producer", MINIMAL_STACK_WORDS, 1);
/// kassert!(producer.is_ok());
/// ```
pub fn create_task(
    entry: TaskEntry,
    name: &'static str,
    stack_words: usize,
    priority: u8,
) -> Result<TaskHandle, CreateError> {
    let created = sync::critical_section(|cs| {
        SCHEDULER
            .borrow_ref_mut(cs)
            .create_task(entry, name, stack_words, priority)
    });

    match created {
        Ok(handle) => {
            debug!(
                "task {=str} created: id {=usize}, priority {=u8}, {=usize} words",
                name,
                handle.index(),
                priority,
                stack_words
            );
        }
        Err(CreateError::OutOfMemory { .. }) if USE_MALLOC_FAILED_HOOK => fatal::out_of_memory(),
        Err(err) => {
            error!("task {=str} not created: {}", name, err);
        }
    }
    created
}

/// Start the scheduler. **Does not return.**
///
/// Creates the idle task, configures the SysTick timer, sets interrupt
/// priorities, and launches the highest-priority task. After this call the
/// system is fully preemptive.
///
/// Interrupts stay masked until the first task runs, so no tick can observe
/// a half-started kernel. Failing to allocate the idle task ends in
/// [`fatal::out_of_memory`].
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    arch::disable_interrupts();

    let idle = sync::critical_section(|cs| {
        SCHEDULER
            .borrow_ref_mut(cs)
            .create_task(idle_task, "IDLE", IDLE_STACK_WORDS, IDLE_PRIORITY)
    });
    if idle.is_err() {
        fatal::out_of_memory();
    }

    arch::configure_systick(&mut core_peripherals.SYST);
    arch::set_interrupt_priorities(&mut core_peripherals.SCB);

    let first_sp = sync::critical_section(|cs| {
        let mut scheduler = SCHEDULER.borrow_ref_mut(cs);
        let first = scheduler.schedule()?;
        info!(
            "scheduler started with {=usize} tasks, running {=str}",
            scheduler.task_count(),
            scheduler.task(first).name
        );
        Some(scheduler.stack_pointer(first))
    });

    match first_sp {
        // SAFETY: the pointer addresses the initial frame built by
        // `Scheduler::create_task`, and this runs once, from main.
        Some(sp) => unsafe { arch::start_first_task(sp) },
        None => fatal::assert_failed(file!(), line!()),
    }
}

/// Voluntarily yield the CPU from the current task.
///
/// The task stays Ready; an equal-priority peer gets the CPU if one is
/// ready.
pub fn yield_task() {
    sync::critical_section(|cs| SCHEDULER.borrow_ref_mut(cs).yield_current());
    arch::trigger_pendsv();
}

/// Block the current task for `ticks` ticks. `delay(0)` is a yield.
pub fn delay(ticks: u32) {
    if ticks == 0 {
        yield_task();
        return;
    }
    sync::critical_section(|cs| {
        let mut scheduler = SCHEDULER.borrow_ref_mut(cs);
        let deadline = Deadline::after(scheduler.now(), ticks);
        scheduler.block_current(deadline.wake_at());
    });
    arch::trigger_pendsv();
}

/// Ticks elapsed since the scheduler started.
pub fn now() -> u64 {
    sync::critical_section(|cs| SCHEDULER.borrow_ref(cs).now())
}

/// The running task, or `None` before the scheduler starts.
pub fn current_task() -> Option<TaskHandle> {
    sync::critical_section(|cs| SCHEDULER.borrow_ref(cs).current())
}

/// Words of `task`'s stack that have never been used.
pub fn stack_high_water_mark(task: TaskHandle) -> usize {
    sync::critical_section(|cs| SCHEDULER.borrow_ref(cs).stack_high_water_mark(task))
}

/// SysTick entry point.
///
/// Advances the time base, runs the application tick hook, and pends a
/// context switch when the scheduler asks for one.
pub fn on_tick() {
    let (switch, hook) = sync::critical_section(|cs| {
        let switch = SCHEDULER.borrow_ref_mut(cs).tick();
        (switch, HOOKS.borrow(cs).get().tick)
    });

    if let Some(hook) = hook {
        hook();
    }
    if switch {
        arch::trigger_pendsv();
    }
}

/// Pend a context switch. It happens as soon as no other exception is
/// active and interrupts are unmasked.
#[inline]
pub fn request_switch() {
    arch::trigger_pendsv();
}

// ---------------------------------------------------------------------------
// Blocking support for kernel objects (called inside a critical section)
// ---------------------------------------------------------------------------

/// The running task and its priority. `None` when nothing can block.
pub(crate) fn current_waiter(cs: CriticalSection<'_>) -> Option<(TaskHandle, u8)> {
    let scheduler = SCHEDULER.borrow_ref(cs);
    Some((scheduler.current()?, scheduler.current_priority()?))
}

pub(crate) fn now_in(cs: CriticalSection<'_>) -> u64 {
    SCHEDULER.borrow_ref(cs).now()
}

/// Mark the running task Blocked until `deadline`. The switch itself happens
/// after the caller leaves the critical section and calls
/// [`request_switch`].
pub(crate) fn block_current(cs: CriticalSection<'_>, deadline: Deadline) {
    SCHEDULER
        .borrow_ref_mut(cs)
        .block_current(deadline.wake_at());
}

/// Wake a blocked task. Returns whether it outranks the running task.
pub(crate) fn wake(cs: CriticalSection<'_>, task: TaskHandle) -> bool {
    SCHEDULER.borrow_ref_mut(cs).unblock(task)
}

// ---------------------------------------------------------------------------
// Context switch support (called from the PendSV handler)
// ---------------------------------------------------------------------------

/// Save the outgoing task's stack pointer, then pick the next task and
/// return its stack pointer.
///
/// A stack overflow detected on the way out ends in
/// [`fatal::stack_overflow`].
pub(crate) fn switch_context(psp: *mut u32) -> *mut u32 {
    let next = sync::critical_section(|cs| {
        let mut scheduler = SCHEDULER.borrow_ref_mut(cs);
        if let Err(task) = scheduler.save_context(psp) {
            return Err((task, scheduler.task(task).name));
        }
        let next = scheduler.schedule().ok_or((TaskHandle::INVALID, ""))?;
        Ok(scheduler.stack_pointer(next))
    });

    match next {
        Ok(sp) => sp,
        Err((task, name)) if task != TaskHandle::INVALID => fatal::stack_overflow(task, name),
        Err(_) => fatal::assert_failed(file!(), line!()),
    }
}

// ---------------------------------------------------------------------------
// Idle task
// ---------------------------------------------------------------------------

/// Lowest-priority task, created by [`start`]. Runs the idle hook and
/// sleeps until the next interrupt.
extern "C" fn idle_task() -> ! {
    loop {
        let hook = sync::critical_section(|cs| HOOKS.borrow(cs).get().idle);
        if let Some(hook) = hook {
            hook();
        }
        arch::wait_for_interrupt();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

/// Helpers for host tests that drive the global kernel.
#[cfg(test)]
pub(crate) mod testing {
    extern crate std;

    use super::*;
    use std::sync::{MutexGuard, PoisonError};

    static KERNEL: std::sync::Mutex<()> = std::sync::Mutex::new(());

    /// Serialise tests that touch the global scheduler, and start each one
    /// from a freshly initialised kernel.
    pub(crate) fn exclusive() -> MutexGuard<'static, ()> {
        let guard = KERNEL.lock().unwrap_or_else(PoisonError::into_inner);
        init(Hooks::NONE);
        guard
    }

    /// Run `f` on the global scheduler.
    pub(crate) fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
        sync::critical_section(|cs| f(&mut SCHEDULER.borrow_ref_mut(cs)))
    }

    pub(crate) extern "C" fn spin() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    /// Create a task and make it the running one, as `start` would. The
    /// calling thread then plays that task.
    pub(crate) fn run_as_task(name: &'static str, priority: u8) -> TaskHandle {
        let created = create_task(spin, name, crate::config::MIN_STACK_WORDS, priority);
        let Ok(task) = created else {
            panic!("could not create {}: {:?}", name, created);
        };
        with_scheduler(|s| {
            for _ in 0..crate::config::MAX_TASKS {
                if s.current() == Some(task) {
                    break;
                }
                s.schedule();
            }
            assert_eq!(s.current(), Some(task), "{} could not be scheduled", name);
        });
        task
    }
}
