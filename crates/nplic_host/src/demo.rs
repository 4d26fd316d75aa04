//! Built-in scenarios mirroring the board demo.
//!
//! PWM1 comparator 0 (source 44) runs at priority 2 and PWM2 comparator 0
//! (source 48) at priority 5, as the firmware programs them.

use anyhow::{Result, bail};
use nplic_io::parser::parse_script;

use crate::runner::{print_report, run_script};

const SCENARIOS: [(&str, &str); 3] = [
    (
        "single source",
        "source 44 priority 2\nsource 48 priority 5\nraise 44\n",
    ),
    (
        "PWM2 preempts PWM1",
        "source 44 priority 2\nsource 48 priority 5\non 44 raise 48\nraise 44\n",
    ),
    (
        "PWM1 waits for PWM2",
        "source 44 priority 2\nsource 48 priority 5\non 48 raise 44\nraise 48\n",
    ),
];

/// Runs and prints every built-in scenario.
pub fn run_demo() -> Result<()> {
    let mut failed = 0;
    for (name, text) in SCENARIOS {
        println!("\n== {} ==", name);
        let report = run_script(&parse_script(text)?)?;
        print_report(&report);
        if !report.is_clean() {
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{} scenarios failed", failed);
    }
    Ok(())
}
