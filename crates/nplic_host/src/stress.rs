//! Randomized interrupt storms.
//!
//! Each trial draws a random set of sources, priorities, handler reactions
//! and raises, runs it on a fresh model and audits the trace. Trials are
//! independent and run in parallel; every trial derives its own generator
//! state from the base seed, so a failing trial can be replayed alone.

use anyhow::{Result, bail};
use nplic_common::plic::{PRIORITY_MAX, SOURCE_COUNT};
use nplic_core::sim::REACTION_CAPACITY;
use nplic_io::parser::{Reaction, Script, SourceDecl};
use rayon::prelude::*;
use std::time::Instant;

use crate::runner::run_script;
use crate::stats::DepthHistogram;

/// Raises replayed per trial, at most.
const MAX_RAISES: u64 = 24;

/// Returns a xorshift generator yielding values in `0..bound`.
fn rng_for(seed: u64, trial: u64) -> impl FnMut(u64) -> u64 {
    let mut state = (seed ^ trial.wrapping_mul(0x9E37_79B9_7F4A_7C15)) | 1;
    move |bound| {
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        state.wrapping_mul(0x2545_F491_4F6C_DD1D) % bound
    }
}

/// Builds the random scenario of one trial.
pub fn generate_trial(seed: u64, trial: u64, max_sources: u32) -> Script {
    let mut next = rng_for(seed, trial);
    let count = 1 + next(max_sources as u64) as u32;

    let sources = (1..=count)
        .map(|id| SourceDecl {
            id,
            priority: 1 + next(PRIORITY_MAX as u64) as u32,
            handled: next(8) != 0,
        })
        .collect();

    let reactions = (0..next(REACTION_CAPACITY as u64 / 2 + 1))
        .map(|_| Reaction {
            trigger: 1 + next(count as u64) as u32,
            raise: 1 + next(count as u64) as u32,
        })
        .collect();

    let raises = (0..1 + next(MAX_RAISES))
        .map(|_| 1 + next(count as u64) as u32)
        .collect();

    Script {
        threshold: 0,
        sources,
        reactions,
        raises,
    }
}

/// Aggregate of a storm run.
#[derive(Default)]
pub struct StormTally {
    pub stats: DepthHistogram,
    /// Trial numbers that failed the audit, with the first problem found.
    pub failures: Vec<(u64, String)>,
}

impl StormTally {
    fn merge(mut self, other: StormTally) -> Self {
        self.stats = self.stats.merge(other.stats);
        self.failures.extend(other.failures);
        self
    }
}

/// Runs `trials` random storms in parallel, folding each report into a
/// per-thread tally as soon as it is produced.
///
/// Failures are sorted by trial number.
pub fn tally_storms(trials: u64, seed: u64, max_sources: u32) -> Result<StormTally> {
    let mut tally = (0..trials)
        .into_par_iter()
        .try_fold(StormTally::default, |mut tally, trial| {
            let report = run_script(&generate_trial(seed, trial, max_sources))?;
            tally.stats.update(&report);
            if let Some(problem) = report.problem() {
                tally.failures.push((trial, problem));
            }
            Ok::<_, anyhow::Error>(tally)
        })
        .try_reduce(StormTally::default, |a, b| Ok(a.merge(b)))?;
    tally.failures.sort_unstable_by_key(|&(trial, _)| trial);
    Ok(tally)
}

/// Runs `trials` random storms in parallel and prints the aggregate.
///
/// # Arguments
///
/// * `trials` - Number of independent scenarios
/// * `seed` - Base seed for the per-trial generators
/// * `max_sources` - Upper bound on sources per scenario
///
/// # Returns
///
/// An error if the parameters are out of range or any trial violated a
/// dispatch invariant.
pub fn run_stress(trials: u64, seed: u64, max_sources: u32) -> Result<()> {
    if max_sources == 0 || max_sources as usize >= SOURCE_COUNT {
        bail!("max-sources must be within 1..{}", SOURCE_COUNT);
    }

    println!(
        "Running {} storms (seed {:#x}, up to {} sources)...",
        trials, seed, max_sources
    );
    let start = Instant::now();

    let StormTally { stats, failures } = tally_storms(trials, seed, max_sources)?;
    let elapsed = start.elapsed().as_secs_f64();
    for (trial, problem) in &failures {
        println!("trial {}: {}", trial, problem);
    }

    println!("Time: {:.4} s", elapsed);
    println!("Throughput: {:.2} storms/s", trials as f64 / elapsed);
    stats.print_report();

    if stats.violations > 0 {
        bail!("{} of {} storms violated dispatch invariants", stats.violations, trials);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_reproducible() {
        assert_eq!(generate_trial(7, 3, 10), generate_trial(7, 3, 10));
        assert_ne!(generate_trial(7, 3, 10), generate_trial(7, 4, 10));
    }

    #[test]
    fn generated_scripts_respect_bounds() {
        for trial in 0..64 {
            let script = generate_trial(42, trial, 12);
            let count = script.sources.len() as u32;
            assert!((1..=12).contains(&count));
            assert!(script.sources.iter().all(|s| (1..=PRIORITY_MAX).contains(&s.priority)));
            assert!(script.reactions.len() <= REACTION_CAPACITY);
            assert!(script.raises.iter().all(|&r| (1..=count).contains(&r)));
        }
    }

    #[test]
    fn storms_run_clean() {
        for trial in 0..32 {
            let report = run_script(&generate_trial(1, trial, 20)).unwrap();
            assert_eq!(report.problem(), None, "trial {}", trial);
        }
    }

    #[test]
    fn parallel_tally_matches_sequential_runs() {
        let tally = tally_storms(48, 9, 10).unwrap();

        let mut expected = DepthHistogram::new();
        for trial in 0..48 {
            expected.update(&run_script(&generate_trial(9, trial, 10)).unwrap());
        }

        assert_eq!(tally.stats.runs, 48);
        assert_eq!(tally.stats.claims, expected.claims);
        assert_eq!(tally.stats.preemptions, expected.preemptions);
        assert_eq!(tally.stats.buckets, expected.buckets);
        assert_eq!(tally.stats.violations, 0);
        assert!(tally.failures.is_empty());
    }

    #[test]
    fn rejects_oversized_source_count() {
        assert!(run_stress(1, 0, SOURCE_COUNT as u32).is_err());
        assert!(run_stress(1, 0, 0).is_err());
    }
}
