//! Runs scenario scripts against the simulated controller and hart.
//!
//! Wires a [`SimPlic`], a [`SimHart`] and the nested dispatcher from a parsed
//! [`Script`], replays its raises, and collects the trace together with the
//! audit verdict and the final hart state.

use anyhow::{Context, Result};
use nplic_core::sim::{
    Event, MAIN_PC, SimDispatcher, SimHart, SimPlic, Stimulus, TraceSummary, Violation,
    scripted_handler,
};
use nplic_core::{Controller, NestedDispatcher, Privilege};
use nplic_io::parser::Script;

/// Outcome of one scripted run.
pub struct RunReport {
    pub events: Vec<Event>,
    pub audit: Result<TraceSummary, Violation>,
    pub peak_depth: usize,
    pub privilege: Privilege,
    pub pc: usize,
}

impl RunReport {
    /// True when the trace passed the audit and the foreground resumed
    /// where it was interrupted, in machine mode.
    pub fn is_clean(&self) -> bool {
        self.audit.is_ok() && self.privilege == Privilege::Machine && self.pc == MAIN_PC
    }

    /// Describes the first problem found, if any.
    pub fn problem(&self) -> Option<String> {
        match &self.audit {
            Err(v) => Some(v.to_string()),
            Ok(_) if self.privilege != Privilege::Machine => {
                Some(format!("foreground resumed in {} mode", self.privilege))
            }
            Ok(_) if self.pc != MAIN_PC => {
                Some(format!("foreground resumed at {:#010x}", self.pc))
            }
            Ok(_) => None,
        }
    }
}

/// Executes `script` on a fresh model.
///
/// # Arguments
///
/// * `script` - Parsed scenario
///
/// # Returns
///
/// The run report, or an error if the script does not fit the model.
pub fn run_script(script: &Script) -> Result<RunReport> {
    let plic = SimPlic::new();
    let hart = SimHart::new(&plic);

    let mut stimulus = Stimulus::new(&hart);
    for r in &script.reactions {
        stimulus
            .on(r.trigger, r.raise)
            .with_context(|| format!("reaction {} -> {}", r.trigger, r.raise))?;
    }

    let mut dispatcher: SimDispatcher<'_> = NestedDispatcher::new(&plic, &hart);
    for decl in &script.sources {
        if decl.handled {
            dispatcher
                .install(decl.id, decl.priority, scripted_handler, &stimulus)
                .with_context(|| format!("installing source {}", decl.id))?;
        } else {
            let controller = dispatcher.controller();
            controller.set_priority(decl.id, decl.priority);
            controller.enable(decl.id);
        }
    }
    plic.set_threshold(script.threshold);

    hart.install(&dispatcher);
    hart.enable_interrupts();
    for &source in &script.raises {
        hart.raise(source);
    }

    Ok(RunReport {
        events: plic.with_trace(|events| events.to_vec()),
        audit: plic.audit(script.threshold),
        peak_depth: dispatcher.peak_depth(),
        privilege: hart.privilege(),
        pc: hart.pc(),
    })
}

fn describe(event: &Event) -> String {
    match *event {
        Event::Raise(s) => format!("raise     {}", s),
        Event::Trap { pc } => format!("trap      from {:#010x}", pc),
        Event::Claim { source, priority } => format!("claim     {} (priority {})", source, priority),
        Event::Spurious => "claim     none".to_string(),
        Event::SetThreshold(t) => format!("threshold {}", t),
        Event::Handler(s) => format!("handler   {}", s),
        Event::Complete(s) => format!("complete  {}", s),
        Event::Return { pc, privilege } => format!("mret      to {:#010x} in {}", pc, privilege),
    }
}

/// Prints the trace indented by nesting depth, then the verdict.
pub fn print_report(report: &RunReport) {
    let mut depth = 0usize;
    for event in &report.events {
        if let Event::Return { .. } = event {
            depth = depth.saturating_sub(1);
        }
        println!("{:indent$}{}", "", describe(event), indent = depth * 2);
        if let Event::Trap { .. } = event {
            depth += 1;
        }
    }

    match &report.audit {
        Ok(summary) => println!(
            "Audit: ok ({} claims, {} preemptions, peak depth {})",
            summary.claims, summary.preemptions, summary.peak_depth
        ),
        Err(v) => println!("Audit: FAILED: {}", v),
    }
    println!(
        "Foreground: pc {:#010x}, {} mode",
        report.pc, report.privilege
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use nplic_io::parser::parse_script;

    #[test]
    fn nested_script_runs_clean() {
        let script = parse_script("source 44 priority 2\nsource 48 priority 5\non 44 raise 48\nraise 44")
            .unwrap();
        let report = run_script(&script).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.peak_depth, 2);
        assert_eq!(report.problem(), None);
    }

    #[test]
    fn unhandled_source_is_completed() {
        let script = parse_script("source 9 priority 3 unhandled\nraise 9").unwrap();
        let report = run_script(&script).unwrap();
        let summary = report.audit.unwrap();
        assert_eq!(summary.completions, 1);
        assert_eq!(summary.handled, 0);
    }

    #[test]
    fn sources_at_or_below_threshold_stay_pending() {
        let script = parse_script("threshold 4\nsource 2 priority 4\nraise 2").unwrap();
        let report = run_script(&script).unwrap();
        assert_eq!(report.audit.unwrap().claims, 0);
        assert_eq!(report.peak_depth, 0);
    }
}
