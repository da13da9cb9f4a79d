//! # Errors
//!
//! Typed failures of the kernel API. Queue errors are expected in steady
//! state and are absorbed by the tasks; creation errors are fatal at
//! startup.

use core::fmt;

/// A send found the queue full and gave up. Carries the rejected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueFull<T>(pub T);

impl<T> QueueFull<T> {
    /// Recover the value that could not be sent.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue full")
    }
}

/// A receive found the queue empty and gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueEmpty;

impl fmt::Display for QueueEmpty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue empty")
    }
}

/// Why a task could not be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CreateError {
    /// All `MAX_TASKS` control blocks are in use.
    TaskTableFull,
    /// The stack pool has fewer free words than requested.
    OutOfMemory { requested: usize, available: usize },
    /// The requested stack cannot hold the initial frame and canary.
    StackTooSmall { requested: usize, minimum: usize },
    /// Priority is not below `MAX_PRIORITIES`.
    InvalidPriority(u8),
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskTableFull => f.write_str("task table full"),
            Self::OutOfMemory { requested, available } => write!(
                f,
                "stack pool exhausted: {} words requested, {} available",
                requested, available
            ),
            Self::StackTooSmall { requested, minimum } => write!(
                f,
                "stack of {} words is below the {} word minimum",
                requested, minimum
            ),
            Self::InvalidPriority(p) => write!(f, "invalid priority {}", p),
        }
    }
}
