//! payu collaborators: the clone primitive and the branch lister
//!
//! covey treats payu as an opaque external tool. `payu clone` materializes
//! a new experiment checkout and `payu branch` displays what could be run;
//! the flag mapping below is the whole contract, none of the option
//! semantics are interpreted here.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::config::CloneParams;
use crate::{Error, Result};

/// One clone invocation: source, destination, branch, and the pass-through
/// options from the experiment plan
#[derive(Debug)]
pub struct CloneRequest<'a> {
    /// Source repository to clone from
    pub repository: &'a Path,
    /// Directory the new checkout is created at
    pub directory: &'a Path,
    /// Branch to check out
    pub branch: &'a str,
    /// Options forwarded verbatim
    pub params: &'a CloneParams,
}

/// Materializes a fresh experiment checkout
///
/// Atomic from the caller's point of view: either the directory is usable
/// afterwards or the call fails.
pub trait ExperimentCloner {
    /// Clone the requested branch into the requested directory
    fn clone_experiment(&self, request: &CloneRequest<'_>) -> Result<()>;
}

/// Displays the branches available in the source repository
///
/// Side-effect display only; callers never consume a value.
pub trait BranchLister {
    /// Print the branch listing for the given experiment config file
    fn list_branches(&self, config_path: &Path) -> Result<()>;
}

/// The payu command-line tool
#[derive(Debug, Clone)]
pub struct PayuCli {
    payu_path: String,
}

impl PayuCli {
    /// Create a payu wrapper using the `payu` on PATH
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

    /// Check if payu is installed on the system
    pub fn is_available(&self) -> bool {
        Command::new(&self.payu_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}

impl Default for PayuCli {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the argument list for `payu clone`, mapping each plan option onto
/// its flag
fn clone_args(request: &CloneRequest<'_>) -> Vec<OsString> {
    let params = request.params;
    let mut args: Vec<OsString> = vec!["clone".into(), "--branch".into(), request.branch.into()];

    if params.keep_uuid {
        args.push("--keep-uuid".into());
    }
    if let Some(ref model_type) = params.model_type {
        args.push("--model-type".into());
        args.push(model_type.into());
    }
    if let Some(ref config_path) = params.config_path {
        args.push("--config".into());
        args.push(config_path.into());
    }
    if let Some(ref lab_path) = params.lab_path {
        args.push("--laboratory".into());
        args.push(lab_path.into());
    }
    if let Some(ref new_branch) = params.new_branch_name {
        args.push("--new-branch-name".into());
        args.push(new_branch.into());
    }
    if let Some(ref restart_path) = params.restart_path {
        args.push("--restart".into());
        args.push(restart_path.into());
    }
    if let Some(ref parent) = params.parent_experiment {
        args.push("--parent-experiment".into());
        args.push(parent.into());
    }
    if let Some(ref start_point) = params.start_point {
        args.push("--start-point".into());
        args.push(start_point.into());
    }

    args.push(request.repository.into());
    args.push(request.directory.into());
    args
}

impl ExperimentCloner for PayuCli {
    fn clone_experiment(&self, request: &CloneRequest<'_>) -> Result<()> {
        if let Some(parent) = request.directory.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Clone(format!(
                    "Failed to create parent directory for {}: {}",
                    request.directory.display(),
                    e
                ))
            })?;
        }

        debug!(
            branch = request.branch,
            dir = %request.directory.display(),
            "running payu clone"
        );

        let output = Command::new(&self.payu_path)
            .args(clone_args(request))
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::Clone(format!(
                        "payu executable not found at '{}'. Is payu installed?",
                        self.payu_path
                    ))
                } else {
                    Error::Clone(format!("Failed to run payu clone: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_clone_failure(request, stderr.trim()));
        }

        Ok(())
    }
}

/// Turn payu's stderr into a pointed clone error
fn classify_clone_failure(request: &CloneRequest<'_>, stderr: &str) -> Error {
    if stderr.contains("not found") || stderr.contains("does not exist") {
        return Error::Clone(format!(
            "Branch '{}' or repository {} not found: {}",
            request.branch,
            request.repository.display(),
            stderr
        ));
    }

    if stderr.contains("Permission denied") {
        return Error::Clone(format!(
            "Permission denied cloning into {}: {}",
            request.directory.display(),
            stderr
        ));
    }

    Error::Clone(format!(
        "payu clone of branch '{}' into {} failed: {}",
        request.branch,
        request.directory.display(),
        stderr
    ))
}

impl BranchLister for PayuCli {
    fn list_branches(&self, config_path: &Path) -> Result<()> {
        // Inherited stdio: the listing goes straight to the user's terminal
        let status = Command::new(&self.payu_path)
            .arg("branch")
            .arg("--config")
            .arg(config_path)
            .status()
            .map_err(|e| Error::Other(format!("Failed to run payu branch: {}", e)))?;

        if !status.success() {
            return Err(Error::Other(format!(
                "payu branch exited with {} for {}",
                status,
                config_path.display()
            )));
        }

        Ok(())
    }
}
