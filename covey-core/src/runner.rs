//! Experiment orchestration: synchronize every branch, then submit its runs
//!
//! The runner owns the experiment plan and the four collaborators it drives:
//! the version-control backend, the clone primitive, the branch lister, and
//! the job dispatcher. Everything is strictly sequential; each branch's
//! clone-or-update completes before the next begins, and no job is
//! submitted until every directory has been attempted.

use tracing::warn;

use crate::config::ExperimentPlan;
use crate::payu::{BranchLister, ExperimentCloner, PayuCli};
use crate::pbs::{JobDispatcher, PbsJobManager};
use crate::sync::{RepoSynchronizer, SyncOutcome};
use crate::vcs::{GitBackend, VcsBackend};
use crate::Result;

/// Drives one full run of the experiment plan
pub struct ExperimentRunner {
    plan: ExperimentPlan,
    vcs: Box<dyn VcsBackend>,
    cloner: Box<dyn ExperimentCloner>,
    lister: Box<dyn BranchLister>,
    dispatcher: Box<dyn JobDispatcher>,
}

impl ExperimentRunner {
    /// Create a runner wired to the real collaborators: git for updates,
    /// payu for cloning and listing, and PBS submission through payu
    pub fn new(plan: ExperimentPlan) -> Self {
        let payu = PayuCli::new();
        Self {
            plan,
            vcs: Box::new(GitBackend::new()),
            cloner: Box::new(payu.clone()),
            lister: Box::new(payu),
            dispatcher: Box::new(PbsJobManager::new()),
        }
    }

    /// Create a runner with injected collaborators
    pub fn with_collaborators(
        plan: ExperimentPlan,
        vcs: Box<dyn VcsBackend>,
        cloner: Box<dyn ExperimentCloner>,
        lister: Box<dyn BranchLister>,
        dispatcher: Box<dyn JobDispatcher>,
    ) -> Self {
        Self {
            plan,
            vcs,
            cloner,
            lister,
            dispatcher,
        }
    }

    /// The plan this runner was built from
    pub fn plan(&self) -> &ExperimentPlan {
        &self.plan
    }

    /// Run every configured branch to completion
    ///
    /// Validation failures and clone failures abort the run; update
    /// failures degrade to failed outcomes and never block job dispatch.
    /// Returns the per-directory outcomes in branch declaration order,
    /// after all jobs have been submitted.
    pub fn run(&self) -> Result<Vec<SyncOutcome>> {
        self.plan.validate()?;

        self.print_branches_available();

        let synchronizer = RepoSynchronizer::new(
            self.vcs.as_ref(),
            self.cloner.as_ref(),
            &self.plan.repository,
            &self.plan.clone_params,
            &self.plan.test_path,
        );

        let mut outcomes = Vec::with_capacity(self.plan.branches.len());
        for spec in &self.plan.branches {
            let target = self.plan.target_dir(&spec.name);
            let outcome = synchronizer.sync(&target, &spec.name)?;
            outcomes.push(outcome);
        }

        for (spec, outcome) in self.plan.branches.iter().zip(&outcomes) {
            self.dispatcher.dispatch(&outcome.directory, spec.runs)?;
        }

        Ok(outcomes)
    }

    /// Show the branches available in the source repository
    ///
    /// Informational only; a lister failure never blocks the run.
    fn print_branches_available(&self) {
        let config_path = self.plan.repository.join("config.yaml");
        if let Err(e) = self.lister.list_branches(&config_path) {
            warn!(
                "could not list branches of {}: {}",
                self.plan.repository.display(),
                e
            );
        }
    }
}
