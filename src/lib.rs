//! # Handoff: bounded producer/consumer on a preemptive RTOS kernel
//!
//! A minimal firmware demonstration for ARM Cortex-M4 microcontrollers: two
//! equal-priority tasks, a producer and a consumer, exchange counters
//! through a fixed-capacity queue while a small preemptive kernel time
//! slices between them.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │         Demo Tasks (demo.rs) · Tick hook (tick.rs)      │
//! │          Producer · Consumer · TickCounter              │
//! ├────────────────────────────────────────────────────────┤
//! │              Bounded Queue (queue.rs)                   │
//! │   send() · receive() · *_from_isr() · peek() · reset() │
//! │        RingBuffer (ring.rs) · WaitList (wait.rs)        │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   init() · create_task() · start() · delay() · yield() │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Fatal hooks      │  Sync Primitives  │
//! │  scheduler.rs│   fatal.rs         │  sync.rs          │
//! │  ─ tick()    │   ─ halt()         │  ─ critical_section│
//! │  ─ schedule()│   ─ kassert!       │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │              Task Model (task.rs)                       │
//! │        TCB · TaskState · TaskHandle · TaskEntry         │
//! ├────────────────────────────────────────────────────────┤
//! │     Arch Port (arch/cortex_m4.rs, arch/host.rs)         │
//! │    PendSV · SysTick · First task launch · WFI           │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! - Fixed priorities, `0..MAX_PRIORITIES`, idle task at 0
//! - The highest-priority ready task runs; equal priorities rotate every
//!   `TIME_SLICE_TICKS` SysTick ticks
//! - Tasks block only in queue calls with a non-zero wait, or in `delay()`
//!
//! ## Failure Model
//!
//! - Queue full / empty: typed errors, expected, absorbed by the caller
//! - Task creation failure: fatal before the scheduler starts
//! - Assertion failure, stack pool exhaustion, stack overflow: interrupts
//!   masked, halt forever
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated
//! - **No `alloc`**: Pure `core` only
//! - **Fixed-size TCB array**: `[TaskControlBlock; MAX_TASKS]`
//! - **Stack pool**: `[u32; STACK_POOL_WORDS]`, carved per task, painted
//!   for overflow detection
//! - **Critical sections**: `critical_section::Mutex` for all shared state

#![no_std]

#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod sync;
pub mod ring;
pub mod wait;
pub mod task;
pub mod scheduler;
pub mod arch;
pub mod fatal;
pub mod kernel;
pub mod queue;
pub mod tick;
pub mod demo;

pub use error::{CreateError, QueueEmpty, QueueFull};
pub use kernel::{NO_WAIT, WAIT_FOREVER};
pub use queue::Queue;
pub use task::TaskHandle;
