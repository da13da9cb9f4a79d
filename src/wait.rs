//! # Wait Lists
//!
//! Tasks blocked on a queue are parked in a [`WaitList`]. Waiters are kept
//! ordered by priority (highest first) and, among equal priorities, in the
//! order they started waiting, so [`WaitList::pop`] always returns the task
//! that should be woken next.

use crate::config::MAX_TASKS;
use crate::task::TaskHandle;

#[derive(Debug, Clone, Copy)]
struct Waiter {
    task: TaskHandle,
    priority: u8,
}

impl Waiter {
    const EMPTY: Self = Self {
        task: TaskHandle::INVALID,
        priority: 0,
    };
}

/// Priority-ordered list of blocked tasks. A task appears at most once.
pub struct WaitList {
    waiters: [Waiter; MAX_TASKS],
    len: usize,
}

impl WaitList {
    pub const fn new() -> Self {
        Self {
            waiters: [Waiter::EMPTY; MAX_TASKS],
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, task: TaskHandle) -> bool {
        self.waiters[..self.len].iter().any(|w| w.task == task)
    }

    /// Add `task` behind every waiter of equal or higher priority.
    ///
    /// Re-inserting a task that is already waiting keeps its original place.
    pub fn insert(&mut self, task: TaskHandle, priority: u8) {
        if self.contains(task) || self.len == MAX_TASKS {
            return;
        }
        let pos = self.waiters[..self.len]
            .iter()
            .position(|w| w.priority < priority)
            .unwrap_or(self.len);
        self.waiters.copy_within(pos..self.len, pos + 1);
        self.waiters[pos] = Waiter { task, priority };
        self.len += 1;
    }

    /// Take the next task to wake.
    pub fn pop(&mut self) -> Option<TaskHandle> {
        if self.len == 0 {
            return None;
        }
        let next = self.waiters[0].task;
        self.waiters.copy_within(1..self.len, 0);
        self.len -= 1;
        Some(next)
    }

    /// Drop `task` from the list if present. Used when a wait times out.
    pub fn remove(&mut self, task: TaskHandle) -> bool {
        match self.waiters[..self.len].iter().position(|w| w.task == task) {
            Some(pos) => {
                self.waiters.copy_within(pos + 1..self.len, pos);
                self.len -= 1;
                true
            }
            None => false,
        }
    }
}

impl Default for WaitList {
    fn default() -> Self {
        Self::new()
    }
}
