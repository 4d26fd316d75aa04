//! Aggregate statistics over many simulated runs.

use nplic_common::plic::PRIORITY_MAX;

use crate::runner::RunReport;

const BUCKETS: usize = PRIORITY_MAX as usize + 1;

/// Distribution of peak nesting depth across runs.
///
/// Nesting can never exceed the number of non-zero priority levels, so one
/// bucket per level plus one for runs that never trapped covers every
/// clean run. Deeper runs land in the last bucket and are also violations.
pub struct DepthHistogram {
    pub runs: u64,
    pub violations: u64,
    pub claims: u64,
    pub preemptions: u64,
    pub buckets: [u64; BUCKETS],
}

impl DepthHistogram {
    pub fn new() -> Self {
        Self {
            runs: 0,
            violations: 0,
            claims: 0,
            preemptions: 0,
            buckets: [0; BUCKETS],
        }
    }

    /// Accounts one run.
    pub fn update(&mut self, report: &RunReport) {
        self.runs += 1;
        if !report.is_clean() {
            self.violations += 1;
        }
        if let Ok(summary) = &report.audit {
            self.claims += summary.claims as u64;
            self.preemptions += summary.preemptions as u64;
        }
        self.buckets[report.peak_depth.min(BUCKETS - 1)] += 1;
    }

    /// Adds the counts of `other`, for combining per-thread partials.
    pub fn merge(mut self, other: DepthHistogram) -> Self {
        self.runs += other.runs;
        self.violations += other.violations;
        self.claims += other.claims;
        self.preemptions += other.preemptions;
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets) {
            *mine += theirs;
        }
        self
    }

    /// Prints run counts and the depth distribution.
    pub fn print_report(&self) {
        println!("\nNesting Metrics");
        println!("Runs:        {}", self.runs);
        println!("Claims:      {}", self.claims);
        println!("Preemptions: {}", self.preemptions);
        println!("Violations:  {}", self.violations);

        println!("Peak depth distribution:");
        for (depth, &count) in self.buckets.iter().enumerate() {
            if count > 0 {
                let more = if depth == BUCKETS - 1 { "+" } else { "" };
                println!("[{}{}]: {}", depth, more, count);
            }
        }
    }
}

impl Default for DepthHistogram {
    fn default() -> Self {
        Self::new()
    }
}
