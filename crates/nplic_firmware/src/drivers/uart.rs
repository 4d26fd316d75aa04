//! Transmit side of the FE310 UART.

use nplic_common::clock::TLCLK_HZ;

const TXDATA: usize = 0x00;
const TXCTRL: usize = 0x08;
const DIV: usize = 0x18;

const TXDATA_FULL: u32 = 1 << 31;
const TXCTRL_TXEN: u32 = 1 << 0;

pub struct Uart {
    base: usize,
}

impl Uart {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    #[inline(always)]
    fn reg(&self, offset: usize) -> *mut u32 {
        (self.base + offset) as *mut u32
    }

    /// Programs the baud divisor and enables the transmitter.
    pub fn init(&self, baud: u32) {
        unsafe {
            self.reg(DIV).write_volatile(TLCLK_HZ / baud - 1);
            self.reg(TXCTRL).write_volatile(TXCTRL_TXEN);
        }
    }

    /// Blocks until the FIFO accepts `byte`.
    pub fn write_byte(&self, byte: u8) {
        unsafe {
            while self.reg(TXDATA).read_volatile() & TXDATA_FULL != 0 {
                core::hint::spin_loop();
            }
            self.reg(TXDATA).write_volatile(byte as u32);
        }
    }
}
