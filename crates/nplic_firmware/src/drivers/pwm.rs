//! FE310 PWM block used as a periodic interrupt source.
//!
//! Comparator 0 resets the counter (`pwmzerocmp`), so its interrupt fires at
//! `tlclk / (2^scale * (pwmcmp0 + 1))`. Comparators 1 to 3 are set to zero
//! duty. With `pwmsticky` the comparator pending bit stays set until software
//! clears it, so the PLIC line stays asserted until the handler acknowledges
//! the interrupt.

use core::fmt;

use nplic_common::clock::TLCLK_HZ;
use nplic_core::SourceId;

const PWMCFG: usize = 0x00;
const PWMCOUNT: usize = 0x08;
const PWMCMP0: usize = 0x20;

const CFG_SCALE_MASK: u32 = 0xF;
const CFG_STICKY: u32 = 1 << 8;
const CFG_ZEROCMP: u32 = 1 << 9;
const CFG_ENALWAYS: u32 = 1 << 12;
const CFG_CMP0_IP: u32 = 1 << 28;

const MAX_SCALE: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmError {
    /// Zero, or faster than the counter clock.
    InvalidFrequency(u32),
    /// Even the largest prescaler cannot count slowly enough.
    FrequencyTooLow(u32),
}

impl fmt::Display for PwmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PwmError::InvalidFrequency(hz) => write!(f, "invalid PWM frequency {} Hz", hz),
            PwmError::FrequencyTooLow(hz) => write!(f, "PWM frequency {} Hz out of reach", hz),
        }
    }
}

/// One PWM instance.
pub struct Pwm {
    base: usize,
    first_source: SourceId,
    cmp_bits: u32,
}

impl Pwm {
    /// `first_source` is the PLIC source of comparator 0; `cmp_bits` is the
    /// comparator width (8 for PWM0, 16 for PWM1 and PWM2).
    pub const fn new(base: usize, first_source: SourceId, cmp_bits: u32) -> Self {
        Self {
            base,
            first_source,
            cmp_bits,
        }
    }

    #[inline(always)]
    fn reg(&self, offset: usize) -> *mut u32 {
        (self.base + offset) as *mut u32
    }

    /// PLIC source raised by comparator `cmp`.
    pub const fn interrupt_source(&self, cmp: u32) -> SourceId {
        self.first_source + cmp
    }

    /// Picks the smallest prescaler whose comparator value fits.
    fn prescale(&self, hz: u32) -> Result<(u32, u32), PwmError> {
        if hz == 0 || hz > TLCLK_HZ {
            return Err(PwmError::InvalidFrequency(hz));
        }
        let ticks = TLCLK_HZ / hz;
        let limit = 1u32 << self.cmp_bits;
        (0..=MAX_SCALE)
            .map(|scale| (scale, ticks >> scale))
            .find(|&(_, count)| count <= limit)
            .map(|(scale, count)| (scale, count.max(1) - 1))
            .ok_or(PwmError::FrequencyTooLow(hz))
    }

    /// Stops the counter and programs comparator 0 for `hz` interrupts per
    /// second. Returns the prescaler chosen.
    pub fn configure(&self, hz: u32) -> Result<u32, PwmError> {
        let (scale, cmp0) = self.prescale(hz)?;
        unsafe {
            self.reg(PWMCFG).write_volatile(scale);
            self.reg(PWMCOUNT).write_volatile(0);
            self.reg(PWMCMP0).write_volatile(cmp0);
            for cmp in 1..4 {
                self.reg(PWMCMP0 + 4 * cmp).write_volatile(0);
            }
        }
        Ok(scale)
    }

    /// Runs the counter continuously with sticky comparator interrupts.
    pub fn start(&self) {
        unsafe {
            let scale = self.reg(PWMCFG).read_volatile() & CFG_SCALE_MASK;
            self.reg(PWMCFG)
                .write_volatile(scale | CFG_STICKY | CFG_ZEROCMP | CFG_ENALWAYS);
        }
    }

    /// Acknowledges comparator `cmp`, dropping its interrupt request.
    pub fn clear_interrupt(&self, cmp: u32) {
        unsafe {
            let cfg = self.reg(PWMCFG).read_volatile();
            self.reg(PWMCFG).write_volatile(cfg & !(CFG_CMP0_IP << cmp));
        }
    }
}
