//! Common definitions shared by the nested PLIC dispatch workspace.
//!
//! Holds the FE310 memory map, the machine-mode CSR bit layout the dispatcher
//! manipulates, and the interrupt source numbering of the on-chip peripherals.
//! Firmware uses these for MMIO access, the host-side model uses them to
//! mirror the controller geometry.

#![no_std]

// Memory-mapped I/O address space of the FE310-G002 (HiFive1 Rev B).
//
// Peripheral base addresses and register offsets used by the firmware
// drivers. These must match the SoC manual; the simulator never touches
// them.
pub mod mmio {
    /// Base address of the platform-level interrupt controller.
    pub const PLIC_BASE: usize = 0x0C00_0000;

    /// Offset of the per-source priority array (one word per source).
    pub const PLIC_PRIORITY_OFFSET: usize = 0x0;

    /// Offset of the hart 0 machine-mode enable bit array.
    pub const PLIC_ENABLE_OFFSET: usize = 0x2000;

    /// Offset of the hart 0 machine-mode priority threshold register.
    pub const PLIC_THRESHOLD_OFFSET: usize = 0x20_0000;

    /// Offset of the hart 0 machine-mode claim/complete register.
    ///
    /// Reading claims the highest-priority pending source, writing the same
    /// id back completes it. `0x0C20_0004` on this SoC.
    pub const PLIC_CLAIM_OFFSET: usize = 0x20_0004;

    /// Base address of UART0, wired to the debug USB bridge.
    pub const UART0_BASE: usize = 0x1001_3000;

    /// Base address of PWM1 (16-bit comparators).
    pub const PWM1_BASE: usize = 0x1002_5000;

    /// Base address of PWM2 (16-bit comparators).
    pub const PWM2_BASE: usize = 0x1003_5000;
}

/// Interrupt controller geometry.
pub mod plic {
    /// Number of source slots including the reserved source 0.
    ///
    /// Valid source ids are `1..SOURCE_COUNT`.
    pub const SOURCE_COUNT: usize = 53;

    /// Width mask of the priority and threshold registers (3 bits).
    pub const PRIORITY_MASK: u32 = 0x7;

    /// Highest programmable priority.
    pub const PRIORITY_MAX: u32 = PRIORITY_MASK;

    /// First PLIC source of PWM1; comparator `n` is `PWM1_SOURCE + n`.
    pub const PWM1_SOURCE: u32 = 44;

    /// First PLIC source of PWM2.
    pub const PWM2_SOURCE: u32 = 48;
}

/// Machine-mode CSR bit layout.
pub mod csr {
    /// `mstatus.MIE`: global machine interrupt enable.
    ///
    /// Cleared by the boot code with `csrci`, so it must fit the 5-bit
    /// immediate.
    pub const MSTATUS_MIE: usize = 1 << 3;

    /// `mstatus.MPIE`: interrupt enable prior to the last trap.
    pub const MSTATUS_MPIE: usize = 1 << 7;

    /// `mcause` exception code of a machine external interrupt.
    pub const MCAUSE_MACHINE_EXTERNAL: usize = 11;
}

/// Clock configuration.
pub mod clock {
    /// Peripheral bus clock feeding the PWM counters and the UART.
    ///
    /// The board boots from the internal oscillator trimmed to roughly
    /// 16 MHz; `tlclk` equals `coreclk` on this SoC.
    pub const TLCLK_HZ: u32 = 16_000_000;

    /// Console baud rate.
    pub const UART_BAUD: u32 = 115_200;
}
