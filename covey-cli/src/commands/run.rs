//! Run command - synchronize every configured branch and submit its runs

use std::path::PathBuf;

use clap::Args;
use covey_core::{ExperimentPlan, ExperimentRunner, SyncOutcome};

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Experiment plan listing the branches to run
    #[arg(default_value = "experiments.yaml")]
    pub plan: PathBuf,
}

impl RunArgs {
    /// Execute the run command
    pub fn execute(&self, verbose: bool) -> anyhow::Result<()> {
        let plan = ExperimentPlan::load(&self.plan)?;

        if verbose {
            tracing::info!(
                plan = %self.plan.display(),
                repository = %plan.repository.display(),
                branches = plan.branches.len(),
                "Starting covey run"
            );
        }

        let runner = ExperimentRunner::new(plan);
        let outcomes = runner.run()?;

        print_summary(&outcomes);

        Ok(())
    }
}

fn print_summary(outcomes: &[SyncOutcome]) {
    println!();
    println!("Synchronization Summary");
    println!("=======================");
    println!();

    for outcome in outcomes {
        let status = if !outcome.success {
            "failed"
        } else if outcome.prior_revision.is_none() {
            "cloned"
        } else if outcome.is_up_to_date() {
            "up to date"
        } else {
            "updated"
        };

        println!("  {:<10} {}", status, outcome.directory.display());

        if let (Some(prior), Some(new)) = (&outcome.prior_revision, &outcome.new_revision) {
            if prior != new {
                println!("             {} -> {}", short(prior), short(new));
                for file in &outcome.changed_files {
                    println!("               {}", file);
                }
            }
        }

        if let Some(ref error) = outcome.error {
            println!("             {}", error);
        }
    }
}

fn short(revision: &str) -> &str {
    revision.get(..8).unwrap_or(revision)
}
