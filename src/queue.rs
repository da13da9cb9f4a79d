//! # Bounded Queue
//!
//! Fixed-capacity FIFO channel between tasks (and interrupt handlers).
//!
//! A [`Queue`] is statically allocated and shared by reference; it does its
//! own locking, so callers never need to. Every operation takes a `wait`
//! argument in ticks:
//!
//! | `wait`          | queue full (send) / empty (receive)                 |
//! |-----------------|-----------------------------------------------------|
//! | `NO_WAIT`       | fail immediately                                    |
//! | `n`             | block the calling task for up to `n` ticks, then fail |
//! | `WAIT_FOREVER`  | block until the operation completes                 |
//!
//! A blocked sender is woken by the next successful receive and a blocked
//! receiver by the next successful send, one waiter per operation, highest
//! priority first and first-come first-served within a priority.
//!
//! Blocking needs a running task. Called before the scheduler starts, a
//! non-zero wait behaves like `NO_WAIT`. Interrupt handlers must use the
//! `*_from_isr` variants, which never block.

use core::cell::RefCell;

use crate::error::{QueueEmpty, QueueFull};
use crate::kernel::{self, Deadline};
use crate::ring::RingBuffer;
use crate::sync::{self, CriticalSection, Mutex};
use crate::wait::WaitList;

pub use crate::kernel::{NO_WAIT, WAIT_FOREVER};

struct Inner<T, const N: usize> {
    items: RingBuffer<T, N>,
    /// Tasks blocked on a full queue.
    senders: WaitList,
    /// Tasks blocked on an empty queue.
    receivers: WaitList,
}

/// Outcome of one locked attempt at a queue operation.
enum Attempt<R, F> {
    /// Completed; the flag asks for a context switch.
    Done(R, bool),
    /// Gave up for good.
    Failed(F),
    /// The calling task is now blocked; retry once it runs again.
    Waiting(F),
}

/// A fixed-capacity, interrupt-safe FIFO queue of `N` elements of `T`.
pub struct Queue<T, const N: usize> {
    inner: Mutex<RefCell<Inner<T, N>>>,
}

impl<T, const N: usize> Queue<T, N> {
    /// Create an empty queue. Usable in `static` initialisers.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                items: RingBuffer::new(),
                senders: WaitList::new(),
                receivers: WaitList::new(),
            })),
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of messages waiting.
    pub fn len(&self) -> usize {
        sync::critical_section(|cs| self.inner.borrow_ref(cs).items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Free slots left.
    pub fn spaces_available(&self) -> usize {
        N - self.len()
    }

    /// Append `value` at the back of the queue.
    ///
    /// # Errors
    /// `QueueFull(value)` if no slot became free within `wait` ticks. The
    /// queue is unchanged and the value is handed back.
    pub fn send(&self, value: T, wait: u32) -> Result<(), QueueFull<T>> {
        let mut value = value;
        let mut deadline: Option<Deadline> = None;

        loop {
            let attempt = sync::critical_section(|cs| {
                let mut inner = self.inner.borrow_ref_mut(cs);
                let waiter = kernel::current_waiter(cs);

                match inner.items.push(value) {
                    Ok(()) => {
                        if let Some((me, _)) = waiter {
                            inner.senders.remove(me);
                        }
                        let switch = wake_one(cs, &mut inner.receivers);
                        Attempt::Done((), switch)
                    }
                    Err(rejected) => {
                        let Some((me, priority)) = waiter.filter(|_| wait != NO_WAIT) else {
                            return Attempt::Failed(rejected);
                        };
                        let now = kernel::now_in(cs);
                        let deadline = *deadline.get_or_insert(Deadline::after(now, wait));
                        if deadline.has_passed(now) {
                            inner.senders.remove(me);
                            trace!("send timed out");
                            Attempt::Failed(rejected)
                        } else {
                            inner.senders.insert(me, priority);
                            kernel::block_current(cs, deadline);
                            Attempt::Waiting(rejected)
                        }
                    }
                }
            });

            match attempt {
                Attempt::Done((), switch) => {
                    if switch {
                        kernel::request_switch();
                    }
                    return Ok(());
                }
                Attempt::Failed(rejected) => return Err(QueueFull(rejected)),
                Attempt::Waiting(rejected) => {
                    value = rejected;
                    kernel::request_switch();
                }
            }
        }
    }

    /// Remove and return the oldest value.
    ///
    /// # Errors
    /// `QueueEmpty` if nothing arrived within `wait` ticks. The queue is
    /// unchanged.
    pub fn receive(&self, wait: u32) -> Result<T, QueueEmpty> {
        let mut deadline: Option<Deadline> = None;

        loop {
            let attempt = sync::critical_section(|cs| {
                let mut inner = self.inner.borrow_ref_mut(cs);
                let waiter = kernel::current_waiter(cs);

                match inner.items.pop() {
                    Some(value) => {
                        if let Some((me, _)) = waiter {
                            inner.receivers.remove(me);
                        }
                        let switch = wake_one(cs, &mut inner.senders);
                        Attempt::Done(value, switch)
                    }
                    None => {
                        let Some((me, priority)) = waiter.filter(|_| wait != NO_WAIT) else {
                            return Attempt::Failed(());
                        };
                        let now = kernel::now_in(cs);
                        let deadline = *deadline.get_or_insert(Deadline::after(now, wait));
                        if deadline.has_passed(now) {
                            inner.receivers.remove(me);
                            trace!("receive timed out");
                            Attempt::Failed(())
                        } else {
                            inner.receivers.insert(me, priority);
                            kernel::block_current(cs, deadline);
                            Attempt::Waiting(())
                        }
                    }
                }
            });

            match attempt {
                Attempt::Done(value, switch) => {
                    if switch {
                        kernel::request_switch();
                    }
                    return Ok(value);
                }
                Attempt::Failed(()) => return Err(QueueEmpty),
                Attempt::Waiting(()) => kernel::request_switch(),
            }
        }
    }

    /// Non-blocking send for interrupt handlers.
    ///
    /// Returns whether a task that outranks the interrupted one was woken;
    /// the handler should then call [`kernel::request_switch`].
    pub fn send_from_isr(&self, value: T) -> Result<bool, QueueFull<T>> {
        sync::critical_section(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.items.push(value).map_err(QueueFull)?;
            Ok(wake_one(cs, &mut inner.receivers))
        })
    }

    /// Non-blocking receive for interrupt handlers. The flag has the same
    /// meaning as in [`send_from_isr`](Self::send_from_isr).
    pub fn receive_from_isr(&self) -> Result<(T, bool), QueueEmpty> {
        sync::critical_section(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let value = inner.items.pop().ok_or(QueueEmpty)?;
            Ok((value, wake_one(cs, &mut inner.senders)))
        })
    }

    /// Copy of the oldest value, left in the queue.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        sync::critical_section(|cs| self.inner.borrow_ref(cs).items.peek().cloned())
    }

    /// Discard every queued value. A task blocked on the full queue is
    /// woken, since there is room again.
    pub fn reset(&self) {
        let switch = sync::critical_section(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.items.clear();
            wake_one(cs, &mut inner.senders)
        });
        if switch {
            kernel::request_switch();
        }
    }
}

impl<T, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wake the first task of `list`, if any. Returns whether to switch.
fn wake_one(cs: CriticalSection<'_>, list: &mut WaitList) -> bool {
    list.pop().is_some_and(|task| kernel::wake(cs, task))
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::kernel::testing::{exclusive, run_as_task, with_scheduler};
    use crate::task::{TaskHandle, TaskState};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use std::vec::Vec;

    /// Drives `kernel::on_tick` from its own thread, standing in for SysTick.
    struct Ticker {
        stop: Arc<AtomicBool>,
        handle: Option<JoinHandle<()>>,
    }

    impl Ticker {
        fn start() -> Self {
            let stop = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&stop);
            let handle = thread::spawn(move || {
                while !flag.load(Ordering::SeqCst) {
                    kernel::on_tick();
                    thread::sleep(Duration::from_millis(1));
                }
            });
            Self {
                stop,
                handle: Some(handle),
            }
        }
    }

    impl Drop for Ticker {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    /// Park the running task on `queue`'s receive side, as a blocking
    /// `receive` does.
    fn block_on_receive<T, const N: usize>(queue: &Queue<T, N>, task: TaskHandle, priority: u8) {
        sync::critical_section(|cs| {
            kernel::block_current(cs, Deadline::Never);
            queue.inner.borrow_ref_mut(cs).receivers.insert(task, priority);
        });
    }

    fn state(task: TaskHandle) -> TaskState {
        with_scheduler(|s| s.task(task).state)
    }

    #[test]
    fn test_capacity_two_scenario() {
        let queue: Queue<i32, 2> = Queue::new();

        assert_eq!(queue.send(1, NO_WAIT), Ok(()));
        assert_eq!(queue.send(2, NO_WAIT), Ok(()));
        assert_eq!(queue.send(3, NO_WAIT), Err(QueueFull(3)));

        assert_eq!(queue.receive(NO_WAIT), Ok(1));
        assert_eq!(queue.receive(NO_WAIT), Ok(2));
        assert_eq!(queue.receive(NO_WAIT), Err(QueueEmpty));
    }

    #[test]
    fn test_send_on_full_leaves_contents() {
        let queue: Queue<i32, 3> = Queue::new();
        for v in [10, 20, 30] {
            queue.send(v, NO_WAIT).unwrap();
        }

        for attempt in 0..5 {
            assert_eq!(queue.send(99 + attempt, NO_WAIT), Err(QueueFull(99 + attempt)));
            assert_eq!(queue.len(), 3);
        }
        assert_eq!(queue.receive(NO_WAIT), Ok(10));
        assert_eq!(queue.receive(NO_WAIT), Ok(20));
        assert_eq!(queue.receive(NO_WAIT), Ok(30));
    }

    #[test]
    fn test_receive_on_empty_leaves_contents() {
        let queue: Queue<i32, 3> = Queue::new();
        for _ in 0..5 {
            assert_eq!(queue.receive(NO_WAIT), Err(QueueEmpty));
            assert!(queue.is_empty());
        }
        queue.send(5, NO_WAIT).unwrap();
        assert_eq!(queue.receive(NO_WAIT), Ok(5));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fill_then_drain_in_order() {
        let queue: Queue<i32, 100> = Queue::new();
        for v in 0..100 {
            queue.send(v * 7, NO_WAIT).unwrap();
        }
        assert!(queue.is_full());
        assert_eq!(queue.spaces_available(), 0);

        for v in 0..100 {
            assert_eq!(queue.receive(NO_WAIT), Ok(v * 7));
        }
        assert!(queue.is_empty());
        assert_eq!(queue.spaces_available(), 100);
    }

    #[test]
    fn test_occupancy_bounded_under_mixed_operations() {
        const CAP: usize = 5;
        let queue: Queue<u32, CAP> = Queue::new();
        let mut model: VecDeque<u32> = VecDeque::new();
        let mut seed: u32 = 0x1234_5678;
        let mut next = 0;

        for _ in 0..2000 {
            // xorshift32
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;

            if seed % 3 != 0 {
                let sent = queue.send(next, NO_WAIT);
                if model.len() < CAP {
                    assert_eq!(sent, Ok(()));
                    model.push_back(next);
                } else {
                    assert_eq!(sent, Err(QueueFull(next)));
                }
                next += 1;
            } else {
                assert_eq!(queue.receive(NO_WAIT).ok(), model.pop_front());
            }
            assert!(queue.len() <= CAP);
            assert_eq!(queue.len(), model.len());
        }
    }

    #[test]
    fn test_wait_without_running_task_does_not_block() {
        let _kernel = exclusive();
        let queue: Queue<i32, 1> = Queue::new();
        queue.send(1, NO_WAIT).unwrap();

        assert_eq!(queue.send(2, 10), Err(QueueFull(2)));
        assert_eq!(queue.send(3, WAIT_FOREVER), Err(QueueFull(3)));
        assert_eq!(queue.receive(WAIT_FOREVER), Ok(1));
        assert_eq!(queue.receive(10), Err(QueueEmpty));
    }

    #[test]
    fn test_isr_variants() {
        let queue: Queue<u8, 1> = Queue::new();
        assert_eq!(queue.send_from_isr(4), Ok(false));
        assert_eq!(queue.send_from_isr(5), Err(QueueFull(5)));
        assert_eq!(queue.receive_from_isr(), Ok((4, false)));
        assert_eq!(queue.receive_from_isr(), Err(QueueEmpty));
    }

    #[test]
    fn test_peek_and_reset() {
        let queue: Queue<i32, 4> = Queue::new();
        assert_eq!(queue.peek(), None);
        queue.send(8, NO_WAIT).unwrap();
        queue.send(9, NO_WAIT).unwrap();
        assert_eq!(queue.peek(), Some(8));
        assert_eq!(queue.len(), 2);

        queue.reset();
        assert!(queue.is_empty());
        assert_eq!(queue.peek(), None);
        queue.send(1, NO_WAIT).unwrap();
        assert_eq!(queue.receive(NO_WAIT), Ok(1));
    }

    #[test]
    fn test_each_operation_wakes_at_most_one_waiter() {
        let _kernel = exclusive();
        let queue: Queue<i32, 2> = Queue::new();
        sync::critical_section(|cs| {
            let mut inner = queue.inner.borrow_ref_mut(cs);
            inner.receivers.insert(TaskHandle::from_index(1), 1);
            inner.receivers.insert(TaskHandle::from_index(2), 1);
        });

        queue.send(1, NO_WAIT).unwrap();
        sync::critical_section(|cs| {
            let inner = queue.inner.borrow_ref(cs);
            assert_eq!(inner.receivers.len(), 1);
            assert!(inner.receivers.contains(TaskHandle::from_index(2)), "Waiters wake in FIFO order");
        });

        queue.send(2, NO_WAIT).unwrap();
        sync::critical_section(|cs| assert!(queue.inner.borrow_ref(cs).receivers.is_empty()));

        // A failed send wakes nobody
        sync::critical_section(|cs| {
            queue.inner.borrow_ref_mut(cs).receivers.insert(TaskHandle::from_index(3), 1);
        });
        assert!(queue.send(3, NO_WAIT).is_err());
        sync::critical_section(|cs| assert_eq!(queue.inner.borrow_ref(cs).receivers.len(), 1));
    }

    #[test]
    fn test_receive_times_out_without_side_effects() {
        let _kernel = exclusive();
        let task = run_as_task("consumer", 1);
        let queue: Queue<i32, 4> = Queue::new();
        let _ticker = Ticker::start();

        let start = kernel::now();
        assert_eq!(queue.receive(5), Err(QueueEmpty));
        assert!(kernel::now() >= start + 5, "Gave up after {} ticks", kernel::now() - start);

        assert!(queue.is_empty());
        sync::critical_section(|cs| {
            let inner = queue.inner.borrow_ref(cs);
            assert!(inner.receivers.is_empty(), "Timed-out receiver must leave the wait list");
            assert!(!inner.receivers.contains(task));
        });
    }

    #[test]
    fn test_send_times_out_without_side_effects() {
        let _kernel = exclusive();
        run_as_task("producer", 1);
        let queue: Queue<i32, 1> = Queue::new();
        queue.send(7, NO_WAIT).unwrap();
        let _ticker = Ticker::start();

        let start = kernel::now();
        assert_eq!(queue.send(8, 3), Err(QueueFull(8)));
        assert!(kernel::now() >= start + 3);

        sync::critical_section(|cs| assert!(queue.inner.borrow_ref(cs).senders.is_empty()));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.receive(NO_WAIT), Ok(7));
    }

    #[test]
    fn test_receive_forever_woken_by_send() {
        static QUEUE: Queue<i32, 4> = Queue::new();
        let _kernel = exclusive();
        let task = run_as_task("consumer", 1);

        let sender = thread::spawn(|| {
            thread::sleep(Duration::from_millis(20));
            QUEUE.send(77, NO_WAIT)
        });

        assert_eq!(QUEUE.receive(WAIT_FOREVER), Ok(77));
        assert_eq!(sender.join().unwrap(), Ok(()));
        assert_ne!(state(task), TaskState::Blocked);
        assert!(QUEUE.is_empty());
        sync::critical_section(|cs| assert!(QUEUE.inner.borrow_ref(cs).receivers.is_empty()));
    }

    #[test]
    fn test_send_forever_woken_by_receive() {
        static QUEUE: Queue<i32, 1> = Queue::new();
        let _kernel = exclusive();
        let task = run_as_task("producer", 1);
        QUEUE.send(1, NO_WAIT).unwrap();

        let receiver = thread::spawn(|| {
            thread::sleep(Duration::from_millis(20));
            QUEUE.receive(NO_WAIT)
        });

        assert_eq!(QUEUE.send(2, WAIT_FOREVER), Ok(()));
        assert_eq!(receiver.join().unwrap(), Ok(1));
        assert_ne!(state(task), TaskState::Blocked);
        assert_eq!(QUEUE.receive(NO_WAIT), Ok(2));
    }

    #[test]
    fn test_one_blocked_task_woken_per_send() {
        let _kernel = exclusive();
        let queue: Queue<i32, 4> = Queue::new();

        let first = run_as_task("first", 1);
        block_on_receive(&queue, first, 1);
        let second = run_as_task("second", 1);
        block_on_receive(&queue, second, 1);
        run_as_task("producer", 1);

        assert_eq!(queue.send(1, NO_WAIT), Ok(()));
        assert_eq!(state(first), TaskState::Ready);
        assert_eq!(state(second), TaskState::Blocked);

        assert_eq!(queue.send(2, NO_WAIT), Ok(()));
        assert_eq!(state(second), TaskState::Ready);
        sync::critical_section(|cs| assert!(queue.inner.borrow_ref(cs).receivers.is_empty()));

        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_waking_higher_priority_task_requests_switch() {
        let _kernel = exclusive();
        let queue: Queue<i32, 4> = Queue::new();

        let urgent = run_as_task("urgent", 2);
        block_on_receive(&queue, urgent, 2);
        run_as_task("background", 1);

        assert_eq!(queue.send_from_isr(5), Ok(true), "Woken task outranks the running one");
        assert_eq!(state(urgent), TaskState::Ready);
        assert_eq!(queue.send_from_isr(6), Ok(false), "Nobody left to wake");
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        const ITERATIONS: usize = 20_000;
        static QUEUE: Queue<i32, 100> = Queue::new();
        static SENT: AtomicUsize = AtomicUsize::new(0);
        static RECEIVED: AtomicUsize = AtomicUsize::new(0);
        static OVERFLOWED: AtomicBool = AtomicBool::new(false);

        let producer = thread::spawn(|| {
            let mut counter: i32 = 0;
            for _ in 0..ITERATIONS {
                counter = counter.wrapping_add(1);
                if QUEUE.send(counter, NO_WAIT).is_ok() {
                    SENT.fetch_add(1, Ordering::SeqCst);
                }
                if QUEUE.len() > 100 {
                    OVERFLOWED.store(true, Ordering::SeqCst);
                }
            }
        });

        let consumer = thread::spawn(|| {
            let mut seen = Vec::new();
            for _ in 0..ITERATIONS {
                if let Ok(v) = QUEUE.receive(NO_WAIT) {
                    RECEIVED.fetch_add(1, Ordering::SeqCst);
                    seen.push(v);
                }
            }
            seen
        });

        producer.join().unwrap();
        let seen = consumer.join().unwrap();

        let sent = SENT.load(Ordering::SeqCst);
        let received = RECEIVED.load(Ordering::SeqCst);
        assert!(received <= sent, "received {} > sent {}", received, sent);
        assert!(sent <= ITERATIONS);
        assert!(!OVERFLOWED.load(Ordering::SeqCst), "Occupancy exceeded capacity");
        assert_eq!(received + QUEUE.len(), sent, "Every accepted value is received or still queued");

        // Drops may skip values, but order is never violated
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "Values received out of order");
    }
}
