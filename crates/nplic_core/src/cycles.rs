/// Gap in cycles above which a sample delta is attributed to interrupt code.
///
/// One iteration of the sampling loop takes well under this on an E31 core;
/// anything longer means a trap ran between two samples.
pub const DEFAULT_INTERRUPT_GAP: u32 = 50;

/// Splits elapsed cycles into interrupt and foreground time.
///
/// Fed with successive low-word `mcycle` samples from a tight loop. The
/// counter may wrap between samples; deltas use wrapping arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct CycleSplit {
    interrupt: u64,
    foreground: u64,
    samples: u64,
    last: u32,
    gap: u32,
}

impl CycleSplit {
    pub const fn new(start: u32) -> Self {
        Self::with_gap(start, DEFAULT_INTERRUPT_GAP)
    }

    pub const fn with_gap(start: u32, gap: u32) -> Self {
        Self {
            interrupt: 0,
            foreground: 0,
            samples: 0,
            last: start,
            gap,
        }
    }

    /// Accounts the cycles elapsed since the previous sample.
    #[inline(always)]
    pub fn sample(&mut self, now: u32) {
        let delta = now.wrapping_sub(self.last);
        if delta > self.gap {
            self.interrupt += delta as u64;
        } else {
            self.foreground += delta as u64;
        }
        self.samples += 1;
        self.last = now;
    }

    pub fn interrupt_cycles(&self) -> u64 {
        self.interrupt
    }

    pub fn foreground_cycles(&self) -> u64 {
        self.foreground
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Share of accounted cycles spent in interrupt code, in per-mille.
    pub fn interrupt_permille(&self) -> u64 {
        let total = self.interrupt + self.foreground;
        if total == 0 {
            0
        } else {
            self.interrupt * 1000 / total
        }
    }
}
