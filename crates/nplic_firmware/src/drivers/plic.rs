//! PLIC register adapter for hart 0 in machine mode.

use nplic_common::mmio::{
    PLIC_CLAIM_OFFSET, PLIC_ENABLE_OFFSET, PLIC_PRIORITY_OFFSET, PLIC_THRESHOLD_OFFSET,
};
use nplic_common::plic::{PRIORITY_MASK, SOURCE_COUNT};
use nplic_core::{Controller, Priority, SourceId};

/// Memory-mapped PLIC.
///
/// Ids outside `1..SOURCE_COUNT` are ignored on writes and read as
/// priority 0, matching the reserved source 0.
pub struct Plic {
    base: usize,
}

impl Plic {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    #[inline(always)]
    fn reg(&self, offset: usize) -> *mut u32 {
        (self.base + offset) as *mut u32
    }

    #[inline(always)]
    fn valid(source: SourceId) -> bool {
        source != 0 && (source as usize) < SOURCE_COUNT
    }

    fn enable_word(&self, source: SourceId) -> (*mut u32, u32) {
        let word = PLIC_ENABLE_OFFSET + 4 * (source as usize / 32);
        (self.reg(word), 1 << (source % 32))
    }

    /// Puts the controller into a known state: every line disabled, every
    /// priority 0, threshold 0.
    pub fn reset(&self) {
        for word in 0..SOURCE_COUNT.div_ceil(32) {
            unsafe { self.reg(PLIC_ENABLE_OFFSET + 4 * word).write_volatile(0) };
        }
        for source in 1..SOURCE_COUNT as SourceId {
            self.set_priority(source, 0);
        }
        self.set_threshold(0);
    }
}

impl Controller for Plic {
    #[inline(always)]
    fn claim(&self) -> Option<SourceId> {
        match unsafe { self.reg(PLIC_CLAIM_OFFSET).read_volatile() } {
            0 => None,
            source => Some(source),
        }
    }

    #[inline(always)]
    fn complete(&self, source: SourceId) {
        unsafe { self.reg(PLIC_CLAIM_OFFSET).write_volatile(source) }
    }

    fn priority(&self, source: SourceId) -> Priority {
        if !Self::valid(source) {
            return 0;
        }
        let offset = PLIC_PRIORITY_OFFSET + 4 * source as usize;
        unsafe { self.reg(offset).read_volatile() & PRIORITY_MASK }
    }

    fn set_priority(&self, source: SourceId, priority: Priority) {
        if Self::valid(source) {
            let offset = PLIC_PRIORITY_OFFSET + 4 * source as usize;
            unsafe { self.reg(offset).write_volatile(priority & PRIORITY_MASK) }
        }
    }

    #[inline(always)]
    fn threshold(&self) -> Priority {
        unsafe { self.reg(PLIC_THRESHOLD_OFFSET).read_volatile() & PRIORITY_MASK }
    }

    #[inline(always)]
    fn set_threshold(&self, threshold: Priority) {
        unsafe {
            self.reg(PLIC_THRESHOLD_OFFSET)
                .write_volatile(threshold & PRIORITY_MASK)
        }
    }

    fn enable(&self, source: SourceId) {
        if Self::valid(source) {
            let (reg, bit) = self.enable_word(source);
            unsafe { reg.write_volatile(reg.read_volatile() | bit) }
        }
    }

    fn disable(&self, source: SourceId) {
        if Self::valid(source) {
            let (reg, bit) = self.enable_word(source);
            unsafe { reg.write_volatile(reg.read_volatile() & !bit) }
        }
    }
}
