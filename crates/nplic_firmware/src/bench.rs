//! Interrupt overhead measurement.
//!
//! Samples `mcycle` in a tight loop while PWM1 interrupts at a fixed rate.
//! Gaps between samples longer than a loop iteration are time spent in the
//! trap path and handler.

use nplic_core::cycles::CycleSplit;
use riscv::register::mcycle;

use crate::console::println;

/// PWM1 interrupt rate while measuring.
pub const BENCH_HZ: u32 = 4000;

const SAMPLES: u32 = 1_000_000;

pub fn run() {
    let mut split = CycleSplit::new(mcycle::read() as u32);
    for _ in 0..SAMPLES {
        split.sample(mcycle::read() as u32);
    }

    println!("intr: {}", split.interrupt_cycles());
    println!("non_intr: {}", split.foreground_cycles());
    println!("share: {}.{}%", split.interrupt_permille() / 10, split.interrupt_permille() % 10);
}
