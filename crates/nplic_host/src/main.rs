mod demo;
mod runner;
mod stats;
mod stress;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(about = "Host-side model of the nested PLIC dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in PWM scenarios.
    Demo,
    /// Run a scenario script and print its trace.
    Run {
        #[arg(short, long)]
        script: PathBuf,
    },
    /// Audit many random interrupt storms in parallel.
    Stress {
        #[arg(short, long, default_value_t = 10_000)]
        trials: u64,
        #[arg(long, default_value_t = 0x5eed)]
        seed: u64,
        #[arg(long, default_value_t = 16)]
        max_sources: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Demo => demo::run_demo()?,
        Commands::Run { script } => {
            let script = nplic_io::loader::load_script(&script)?;
            let report = runner::run_script(&script)?;
            runner::print_report(&report);
            if let Some(problem) = report.problem() {
                anyhow::bail!("{}", problem);
            }
        }
        Commands::Stress {
            trials,
            seed,
            max_sources,
        } => {
            stress::run_stress(trials, seed, max_sources)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_takes_script_path() {
        let cli = Cli::try_parse_from(["nplic_host", "run", "--script", "scripts/nested.plic"])
            .unwrap();
        match cli.command {
            Commands::Run { script } => assert_eq!(script, PathBuf::from("scripts/nested.plic")),
            _ => panic!("expected run"),
        }
    }
}
