//! UART console for diagnostic output.
//!
//! Output is produced both from the foreground and from interrupt handlers,
//! so the lock masks machine interrupts while it is held. On a single hart
//! a trap can then never spin on a lock its own interrupted context owns.

use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use nplic_common::clock::UART_BAUD;
use nplic_common::mmio::UART0_BASE;
use nplic_core::Hart;

use crate::drivers::uart::Uart;
use crate::hart::{MachineHart, interrupts_enabled};

/// Spinlock that also masks machine interrupts while held.
///
/// The previous interrupt enable is restored when the guard is dropped.
pub struct IrqLock<T> {
    lock: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for IrqLock<T> {}

impl<T> IrqLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            lock: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Masks interrupts, then spins until the lock is acquired.
    pub fn lock(&self) -> IrqLockGuard<'_, T> {
        let was_enabled = interrupts_enabled();
        MachineHart.set_global_enable(false);
        while self
            .lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        IrqLockGuard {
            lock: &self.lock,
            data: &self.data,
            was_enabled,
        }
    }
}

pub struct IrqLockGuard<'a, T> {
    lock: &'a AtomicBool,
    data: &'a UnsafeCell<T>,
    was_enabled: bool,
}

impl<T> core::ops::Deref for IrqLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.data.get() }
    }
}

impl<T> Drop for IrqLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.store(false, Ordering::Release);
        if self.was_enabled {
            MachineHart.set_global_enable(true);
        }
    }
}

static CONSOLE: IrqLock<Uart> = IrqLock::new(Uart::new(UART0_BASE));

struct Writer<'a>(&'a Uart);

impl fmt::Write for Writer<'_> {
    /// Writes `s`, expanding `\n` to `\r\n` for serial terminals.
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.bytes() {
            if c == b'\n' {
                self.0.write_byte(b'\r');
            }
            self.0.write_byte(c);
        }
        Ok(())
    }
}

/// Programs the UART for the console baud rate.
pub fn init() {
    CONSOLE.lock().init(UART_BAUD);
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    let uart = CONSOLE.lock();
    let _ = Writer(&uart).write_fmt(args);
}

/// Prints a line to the console. Usable from interrupt handlers.
#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => ({
        $crate::console::_print(format_args!("{}\n", format_args!($($arg)*)));
    });
}
pub use println;
