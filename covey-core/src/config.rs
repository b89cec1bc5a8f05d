//! Experiment plan loading and validation
//!
//! The plan is a YAML file naming the source repository, the base test
//! directory, the branches to run, and the options forwarded to the clone
//! primitive. Clone options sit at the top level of the file alongside the
//! sync settings, so a plan reads as one flat document:
//!
//! ```yaml
//! repository: /g/data/experiments/access-om3-control
//! test_path: /scratch/tmp/sync-tests
//! repository_directory: om3-checkout
//! branches:
//!   - name: ctrl
//!     runs: 2
//!   - name: perturb
//! keep_uuid: true
//! model_type: access-om3
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn default_runs() -> u32 {
    1
}

/// One branch to run and how many sequential batch runs to submit for it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BranchSpec {
    /// Branch name in the source repository
    pub name: String,

    /// Number of sequential batch runs to submit
    #[serde(default = "default_runs")]
    pub runs: u32,
}

/// Identity and provenance options forwarded to the clone primitive
///
/// covey maps these onto `payu clone` flags and never interprets them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CloneParams {
    /// Preserve the experiment UUID in the new clone
    pub keep_uuid: bool,

    /// Model type of the experiment
    pub model_type: Option<String>,

    /// Experiment config file within the checkout
    pub config_path: Option<PathBuf>,

    /// Laboratory directory
    pub lab_path: Option<PathBuf>,

    /// Name the checked-out branch differently in the clone
    pub new_branch_name: Option<String>,

    /// Restart directory to warm-start from
    pub restart_path: Option<PathBuf>,

    /// Parent experiment the clone derives from
    pub parent_experiment: Option<String>,

    /// Commit or tag to start the clone's history at
    pub start_point: Option<String>,
}

/// Root experiment plan structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExperimentPlan {
    /// Source repository all experiments derive from
    pub repository: PathBuf,

    /// Base directory the experiment directories are created under
    pub test_path: PathBuf,

    /// Directory name of the checkout inside each branch directory
    pub repository_directory: String,

    /// Branches to run, in dispatch order
    #[serde(default)]
    pub branches: Vec<BranchSpec>,

    /// Options forwarded to the clone primitive
    #[serde(flatten)]
    pub clone_params: CloneParams,
}

impl ExperimentPlan {
    /// Load an experiment plan from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Target directory for one branch: `<test_path>/<branch>/<repository_directory>`
    pub fn target_dir(&self, branch: &str) -> PathBuf {
        self.test_path.join(branch).join(&self.repository_directory)
    }

    /// Validate the plan before any directory is touched
    ///
    /// Rejects an empty branch list, empty branch names, zero run counts,
    /// and duplicate branch names. Duplicates would map two branches onto
    /// the same target directory.
    pub fn validate(&self) -> Result<()> {
        if self.branches.is_empty() {
            return Err(Error::Config(
                "No running branches configured in the experiment plan".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &self.branches {
            if spec.name.is_empty() {
                return Err(Error::Config("Branch name must not be empty".to_string()));
            }

            if spec.runs == 0 {
                return Err(Error::Config(format!(
                    "Branch '{}' has a zero run count",
                    spec.name
                )));
            }

            if !seen.insert(spec.name.as_str()) {
                return Err(Error::Config(format!(
                    "Branch '{}' is listed twice; both entries would share one target directory",
                    spec.name
                )));
            }
        }

        Ok(())
    }
}
