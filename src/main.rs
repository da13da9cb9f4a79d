//! # Handoff Firmware
//!
//! Starts a producer and a consumer task that share a 100-slot queue, then
//! hands the CPU to the kernel for good.
//!
//! | Task       | Priority | Stack (words)         | Behavior |
//! |------------|----------|-----------------------|----------|
//! | `Producer` | 1        | `MINIMAL_STACK_WORDS` | Counts up, sends without waiting, drops on full |
//! | `Consumer` | 1        | `MINIMAL_STACK_WORDS` | Receives without waiting, keeps the last value |
//! | `IDLE`     | 0        | `IDLE_STACK_WORDS`    | Created by the kernel; never runs while the two above spin |
//!
//! Nothing is observable from outside: no LED, no console. With the
//! `defmt` feature the kernel reports startup over RTT.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

#[cfg(feature = "defmt")]
use defmt_rtt as _;

use handoff::config::{CONSUMER_PRIORITY, MINIMAL_STACK_WORDS, PRODUCER_PRIORITY, QUEUE_LENGTH};
use handoff::demo::{self, Consumer, Counter, Producer};
use handoff::kernel::{self, Hooks};
use handoff::{fatal, kassert, Queue};

/// The producer/consumer channel. Tasks only ever hold a reference to it.
static QUEUE: Queue<Counter, QUEUE_LENGTH> = Queue::new();

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

extern "C" fn producer_task() -> ! {
    Producer::new(&QUEUE).run()
}

extern "C" fn consumer_task() -> ! {
    Consumer::new(&QUEUE).run()
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Creates the tasks and starts the scheduler.
/// Does not return.
#[entry]
fn main() -> ! {
    let Some(cp) = cortex_m::Peripherals::take() else {
        fatal::assert_failed(file!(), line!());
    };

    kernel::init(Hooks {
        tick: Some(demo::on_tick),
        idle: None,
    });

    let producer = kernel::create_task(producer_task, "Producer", MINIMAL_STACK_WORDS, PRODUCER_PRIORITY);
    kassert!(producer.is_ok());

    let consumer = kernel::create_task(consumer_task, "Consumer", MINIMAL_STACK_WORDS, CONSUMER_PRIORITY);
    kassert!(consumer.is_ok());

    kernel::start(cp)
}
