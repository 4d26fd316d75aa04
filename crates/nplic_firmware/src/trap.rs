//! Rust side of the machine trap vector.
//!
//! Machine external interrupts go to the nested dispatcher. The demo enables
//! no other interrupt, and exceptions are not expected; both are returned
//! from unchanged.

use nplic_common::csr::MCAUSE_MACHINE_EXTERNAL;
use riscv::register::mcause;

/// Called from `trap_vector` in `entry.S` with caller-saved registers
/// stacked and machine interrupts masked.
///
/// May be re-entered from inside a handler's preemption window; every
/// activation runs on the same stack below the one it interrupted.
#[allow(clippy::collapsible_if)]
#[unsafe(no_mangle)]
pub extern "C" fn rust_trap_handler() {
    let cause = mcause::read();

    if cause.is_interrupt() && cause.code() == MCAUSE_MACHINE_EXTERNAL {
        if let Some(dispatcher) = crate::dispatcher() {
            dispatcher.dispatch();
        }
    }
}
