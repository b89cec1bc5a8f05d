//! Batch job submission for synchronized experiments
//!
//! The dispatcher hands an experiment directory to `payu run`, which owns
//! the actual PBS interaction. Queue choice, resource requests, and
//! scheduler behavior are payu's concern, not covey's.

use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::{Error, Result};

/// Submits batch runs for one experiment directory
pub trait JobDispatcher {
    /// Submit `runs` sequential batch runs for the experiment at `directory`
    fn dispatch(&self, directory: &Path, runs: u32) -> Result<()>;
}

/// Dispatches through `payu run` under PBS
#[derive(Debug, Clone)]
pub struct PbsJobManager {
    payu_path: String,
}

impl PbsJobManager {
    /// Create a job manager using the `payu` on PATH
    pub fn new() -> Self {
        Self {
            payu_path: "payu".to_string(),
        }
    }

    /// Use a custom payu executable
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.payu_path = path.into();
        self
    }
}

impl Default for PbsJobManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the argument list for `payu run`
fn run_args(runs: u32) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    if runs > 1 {
        args.push("-n".to_string());
        args.push(runs.to_string());
    }
    args
}

impl JobDispatcher for PbsJobManager {
    fn dispatch(&self, directory: &Path, runs: u32) -> Result<()> {
        info!("submitting {} run(s) for {}", runs, directory.display());

        let output = Command::new(&self.payu_path)
            .args(run_args(runs))
            .current_dir(directory)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::Dispatch(format!(
                        "payu executable not found at '{}'. Is payu installed?",
                        self.payu_path
                    ))
                } else {
                    Error::Dispatch(format!("Failed to run payu run: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Dispatch(format!(
                "payu run failed in {}: {}",
                directory.display(),
                stderr.trim()
            )));
        }

        Ok(())
    }
}
