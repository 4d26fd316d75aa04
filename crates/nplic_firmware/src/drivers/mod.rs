//! Drivers for the FE310 peripherals the demo uses.
//!
//! Each driver wraps a memory-mapped register block at a fixed base address
//! and performs every access with volatile reads and writes.

pub mod plic;
pub mod pwm;
pub mod uart;
