//! # Architecture Abstraction Layer
//!
//! Hardware boundary for the kernel. The Cortex-M4 port is used on ARM
//! targets; every other target gets a host stub with the same surface so
//! the kernel logic builds and unit-tests on the development machine.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::*;

#[cfg(not(target_arch = "arm"))]
pub mod host;

#[cfg(not(target_arch = "arm"))]
pub use host::*;
