//! # Producer/Consumer Demo
//!
//! Two equal-priority tasks share one bounded queue:
//!
//! | Task       | Each iteration                                        |
//! |------------|-------------------------------------------------------|
//! | `Producer` | bump a private counter, try to enqueue it (`NO_WAIT`) |
//! | `Consumer` | try to dequeue the oldest value (`NO_WAIT`)           |
//!
//! Neither task ever blocks; they busy-loop and are interleaved purely by
//! time-slice preemption. The channel is deliberately lossy: a value sent
//! while the queue is full is dropped, and a receive on an empty queue
//! leaves the consumer's last value as it was.

use crate::error::{QueueEmpty, QueueFull};
use crate::queue::{Queue, NO_WAIT};
use crate::tick::TickCounter;

/// Element type carried by the demo queue.
pub type Counter = i32;

/// Ticks seen by the application tick hook. Nothing reads it yet.
pub static TICKS: TickCounter = TickCounter::new();

/// Application tick hook. Runs in the SysTick interrupt.
pub fn on_tick() {
    TICKS.increment();
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// Generates 1, 2, 3, ... (wrapping) into the queue.
pub struct Producer<'q, const N: usize> {
    queue: &'q Queue<Counter, N>,
    counter: Counter,
}

impl<'q, const N: usize> Producer<'q, N> {
    pub const fn new(queue: &'q Queue<Counter, N>) -> Self {
        Self { queue, counter: 0 }
    }

    /// Last value generated.
    pub fn counter(&self) -> Counter {
        self.counter
    }

    /// One iteration: advance the counter and offer it to the queue.
    pub fn step(&mut self) -> Result<(), QueueFull<Counter>> {
        self.counter = self.counter.wrapping_add(1);
        self.queue.send(self.counter, NO_WAIT)
    }

    /// Task body. Never returns.
    pub fn run(mut self) -> ! {
        loop {
            // Full queue: the value is dropped
            let _ = self.step();
        }
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Drains the queue, remembering only the last value taken.
pub struct Consumer<'q, const N: usize> {
    queue: &'q Queue<Counter, N>,
    last: Counter,
}

impl<'q, const N: usize> Consumer<'q, N> {
    pub const fn new(queue: &'q Queue<Counter, N>) -> Self {
        Self { queue, last: 0 }
    }

    /// Last value consumed (0 before the first one).
    pub fn last(&self) -> Counter {
        self.last
    }

    /// One iteration: take the oldest value if there is one.
    pub fn step(&mut self) -> Result<Counter, QueueEmpty> {
        let value = self.queue.receive(NO_WAIT)?;
        self.last = value;
        Ok(value)
    }

    /// Task body. Never returns.
    pub fn run(mut self) -> ! {
        loop {
            // Empty queue: keep the previous value and poll again
            let _ = self.step();
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
