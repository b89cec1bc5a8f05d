//! Clone-or-update synchronization for one experiment directory
//!
//! Filesystem presence of the target directory is the sole switch: missing
//! directories are cloned through the clone primitive, existing ones are
//! updated in place through the version-control adapter. An existing
//! directory is never silently replaced, and update failures degrade to a
//! failed outcome instead of aborting the run.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::CloneParams;
use crate::payu::{CloneRequest, ExperimentCloner};
use crate::vcs::VcsBackend;
use crate::{Error, Result};

/// What happened to one target directory during synchronization
///
/// Produced once per directory per run; not persisted anywhere.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The experiment directory this outcome describes
    pub directory: PathBuf,

    /// HEAD revision before the update, when the update path ran
    pub prior_revision: Option<String>,

    /// HEAD revision after the update, when the update path ran
    pub new_revision: Option<String>,

    /// Paths changed between the two revisions, in diff order
    pub changed_files: Vec<String>,

    /// Whether the directory was brought to the wanted state
    pub success: bool,

    /// The adapter's message when the update path failed
    pub error: Option<String>,
}

impl SyncOutcome {
    fn cloned(directory: &Path) -> Self {
        Self {
            directory: directory.to_path_buf(),
            prior_revision: None,
            new_revision: None,
            changed_files: Vec::new(),
            success: true,
            error: None,
        }
    }

    fn up_to_date(directory: &Path, revision: String) -> Self {
        Self {
            directory: directory.to_path_buf(),
            prior_revision: Some(revision.clone()),
            new_revision: Some(revision),
            changed_files: Vec::new(),
            success: true,
            error: None,
        }
    }

    fn updated(directory: &Path, prior: String, new: String, changed_files: Vec<String>) -> Self {
        Self {
            directory: directory.to_path_buf(),
            prior_revision: Some(prior),
            new_revision: Some(new),
            changed_files,
            success: true,
            error: None,
        }
    }

    fn failed(directory: &Path, message: String) -> Self {
        Self {
            directory: directory.to_path_buf(),
            prior_revision: None,
            new_revision: None,
            changed_files: Vec::new(),
            success: false,
            error: Some(message),
        }
    }

    /// True when the update found the directory already at the remote tip
    pub fn is_up_to_date(&self) -> bool {
        self.success && self.prior_revision.is_some() && self.prior_revision == self.new_revision
    }
}

/// Decides clone-vs-update for one target directory and performs it
pub struct RepoSynchronizer<'a> {
    vcs: &'a dyn VcsBackend,
    cloner: &'a dyn ExperimentCloner,
    /// Source repository experiments derive from
    repository: &'a Path,
    /// Options passed through to the clone primitive
    params: &'a CloneParams,
    /// Base test path, used to report directories relative to it
    base: &'a Path,
}

impl<'a> RepoSynchronizer<'a> {
    /// Create a synchronizer over one source repository
    pub fn new(
        vcs: &'a dyn VcsBackend,
        cloner: &'a dyn ExperimentCloner,
        repository: &'a Path,
        params: &'a CloneParams,
        base: &'a Path,
    ) -> Self {
        Self {
            vcs,
            cloner,
            repository,
            params,
            base,
        }
    }

    /// Synchronize `target_dir` to the tip of `branch`
    ///
    /// A missing directory is cloned; clone failures propagate and are
    /// fatal to the whole run. An existing directory is updated in place;
    /// a git failure anywhere in the update degrades to a failed outcome
    /// and leaves the directory as the failing command left it.
    pub fn sync(&self, target_dir: &Path, branch: &str) -> Result<SyncOutcome> {
        if !target_dir.exists() {
            info!("cloning branch '{}' into {}", branch, target_dir.display());
            let request = CloneRequest {
                repository: self.repository,
                directory: target_dir,
                branch,
                params: self.params,
            };
            self.cloner.clone_experiment(&request)?;
            return Ok(SyncOutcome::cloned(target_dir));
        }

        info!(
            "{} already exists, skipping cloning; updating in place",
            self.relative(target_dir).display()
        );

        match self.update_existing(target_dir, branch) {
            Ok(outcome) => Ok(outcome),
            // Only git command failures degrade to a failed outcome;
            // anything else still propagates.
            Err(Error::Git(message)) => {
                warn!(
                    "failed to update {}: {}; leaving it as it is",
                    self.relative(target_dir).display(),
                    message
                );
                Ok(SyncOutcome::failed(target_dir, message))
            }
            Err(other) => Err(other),
        }
    }

    fn update_existing(&self, target_dir: &Path, branch: &str) -> Result<SyncOutcome> {
        let workdir = self.vcs.open(target_dir)?;
        workdir.fetch(true)?;
        let prior = workdir.head_revision()?;

        if workdir.has_local_branch(branch) {
            workdir.checkout_existing(branch)?;
        } else {
            workdir.checkout_new_tracking(branch)?;
        }

        if let Err(e) = workdir.pull_rebase_autostash("origin", branch) {
            let remote_ref = format!("origin/{}", branch);
            warn!(
                "rebase pull failed for {}: {}; resetting to {}",
                self.relative(target_dir).display(),
                e,
                remote_ref
            );
            workdir.reset_keep_to(&remote_ref)?;
        }

        let new = workdir.head_revision()?;
        let relative = self.relative(target_dir);

        if prior == new {
            info!("{} is already up to date", relative.display());
            return Ok(SyncOutcome::up_to_date(target_dir, new));
        }

        let changed_files = workdir.diff_names(&prior, &new)?;
        info!(
            "updated {} from {} to {} ({} changed file(s))",
            relative.display(),
            short(&prior),
            short(&new),
            changed_files.len()
        );
        Ok(SyncOutcome::updated(target_dir, prior, new, changed_files))
    }

    fn relative<'p>(&self, dir: &'p Path) -> &'p Path {
        dir.strip_prefix(self.base).unwrap_or(dir)
    }
}

fn short(revision: &str) -> &str {
    revision.get(..8).unwrap_or(revision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;

    use tempfile::TempDir;

    use crate::vcs::Workdir;

    #[derive(Default)]
    struct FakeState {
        opens: Cell<u32>,
        fetches: RefCell<Vec<bool>>,
        checkouts: RefCell<Vec<String>>,
        tracking_checkouts: RefCell<Vec<String>>,
        pulls: RefCell<Vec<(String, String)>>,
        resets: RefCell<Vec<String>>,
        diffs: Cell<u32>,
        /// Revisions handed out by head_revision, front to back
        heads: RefCell<Vec<String>>,
        diff_files: RefCell<Vec<String>>,
        has_branch: Cell<bool>,
        fail_open: Cell<bool>,
        fail_fetch: Cell<bool>,
        fail_checkout: Cell<bool>,
        fail_pull: Cell<bool>,
        fail_reset: Cell<bool>,
        fail_diff: Cell<bool>,
    }

    impl FakeState {
        fn with_heads(heads: &[&str]) -> Rc<Self> {
            let state = Rc::new(Self::default());
            *state.heads.borrow_mut() = heads.iter().map(|h| h.to_string()).collect();
            state
        }
    }

    struct FakeVcs {
        state: Rc<FakeState>,
    }

    impl VcsBackend for FakeVcs {
        fn open(&self, _dir: &Path) -> Result<Box<dyn Workdir>> {
            self.state.opens.set(self.state.opens.get() + 1);
            if self.state.fail_open.get() {
                return Err(Error::Git("scripted open failure".to_string()));
            }
            Ok(Box::new(FakeWorkdir {
                state: Rc::clone(&self.state),
            }))
        }
    }

    struct FakeWorkdir {
        state: Rc<FakeState>,
    }

    impl Workdir for FakeWorkdir {
        fn fetch(&self, prune: bool) -> Result<()> {
            self.state.fetches.borrow_mut().push(prune);
            if self.state.fail_fetch.get() {
                return Err(Error::Git("scripted fetch failure".to_string()));
            }
            Ok(())
        }

        fn has_local_branch(&self, _name: &str) -> bool {
            self.state.has_branch.get()
        }

        fn checkout_existing(&self, name: &str) -> Result<()> {
            self.state.checkouts.borrow_mut().push(name.to_string());
            if self.state.fail_checkout.get() {
                return Err(Error::Git("scripted checkout failure".to_string()));
            }
            Ok(())
        }

        fn checkout_new_tracking(&self, name: &str) -> Result<()> {
            self.state
                .tracking_checkouts
                .borrow_mut()
                .push(name.to_string());
            if self.state.fail_checkout.get() {
                return Err(Error::Git("scripted checkout failure".to_string()));
            }
            Ok(())
        }

        fn pull_rebase_autostash(&self, remote: &str, branch: &str) -> Result<()> {
            self.state
                .pulls
                .borrow_mut()
                .push((remote.to_string(), branch.to_string()));
            if self.state.fail_pull.get() {
                return Err(Error::Git("scripted pull failure".to_string()));
            }
            Ok(())
        }

        fn reset_keep_to(&self, reference: &str) -> Result<()> {
            self.state.resets.borrow_mut().push(reference.to_string());
            if self.state.fail_reset.get() {
                return Err(Error::Git("scripted reset failure".to_string()));
            }
            Ok(())
        }

        fn head_revision(&self) -> Result<String> {
            Ok(self.state.heads.borrow_mut().remove(0))
        }

        fn diff_names(&self, _from: &str, _to: &str) -> Result<Vec<String>> {
            self.state.diffs.set(self.state.diffs.get() + 1);
            if self.state.fail_diff.get() {
                return Err(Error::Git("scripted diff failure".to_string()));
            }
            Ok(self.state.diff_files.borrow().clone())
        }
    }

    #[derive(Default)]
    struct RecordingCloner {
        calls: RefCell<Vec<(PathBuf, String)>>,
        fail: bool,
    }

    impl ExperimentCloner for RecordingCloner {
        fn clone_experiment(&self, request: &CloneRequest<'_>) -> Result<()> {
            self.calls
                .borrow_mut()
                .push((request.directory.to_path_buf(), request.branch.to_string()));
            if self.fail {
                return Err(Error::Clone("scripted clone failure".to_string()));
            }
            Ok(())
        }
    }

    fn existing_target(temp: &TempDir) -> PathBuf {
        let target = temp.path().join("perturb").join("checkout");
        fs::create_dir_all(&target).unwrap();
        target
    }

    fn synchronizer<'a>(
        vcs: &'a FakeVcs,
        cloner: &'a RecordingCloner,
        repository: &'a Path,
        params: &'a CloneParams,
        base: &'a Path,
    ) -> RepoSynchronizer<'a> {
        RepoSynchronizer::new(vcs, cloner, repository, params, base)
    }

    #[test]
    fn test_missing_directory_clones_once() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("perturb").join("checkout");
        let state = FakeState::with_heads(&[]);
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner::default();
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        let outcome = sync.sync(&target, "perturb").unwrap();

        assert!(outcome.success);
        assert!(outcome.prior_revision.is_none());
        assert!(outcome.error.is_none());
        assert_eq!(outcome.directory, target);
        assert_eq!(
            *cloner.calls.borrow(),
            vec![(target.clone(), "perturb".to_string())]
        );
        // the update path never ran
        assert_eq!(state.opens.get(), 0);
    }

    #[test]
    fn test_clone_failure_propagates() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("perturb").join("checkout");
        let state = FakeState::with_heads(&[]);
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner {
            fail: true,
            ..Default::default()
        };
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        let result = sync.sync(&target, "perturb");

        assert!(matches!(result, Err(Error::Clone(_))));
        assert_eq!(state.opens.get(), 0);
    }

    #[test]
    fn test_existing_directory_skips_clone() {
        let temp = TempDir::new().unwrap();
        let target = existing_target(&temp);
        let state = FakeState::with_heads(&["aaa111", "aaa111"]);
        state.has_branch.set(true);
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner::default();
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        let outcome = sync.sync(&target, "perturb").unwrap();

        assert!(outcome.success);
        assert!(cloner.calls.borrow().is_empty());
        assert_eq!(state.opens.get(), 1);
        assert_eq!(*state.fetches.borrow(), vec![true]);
    }

    #[test]
    fn test_checks_out_existing_local_branch() {
        let temp = TempDir::new().unwrap();
        let target = existing_target(&temp);
        let state = FakeState::with_heads(&["aaa111", "aaa111"]);
        state.has_branch.set(true);
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner::default();
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        sync.sync(&target, "perturb").unwrap();

        assert_eq!(*state.checkouts.borrow(), vec!["perturb"]);
        assert!(state.tracking_checkouts.borrow().is_empty());
    }

    #[test]
    fn test_creates_tracking_branch_when_local_missing() {
        let temp = TempDir::new().unwrap();
        let target = existing_target(&temp);
        let state = FakeState::with_heads(&["aaa111", "aaa111"]);
        state.has_branch.set(false);
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner::default();
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        let outcome = sync.sync(&target, "perturb").unwrap();

        assert!(outcome.success);
        assert_eq!(*state.tracking_checkouts.borrow(), vec!["perturb"]);
        assert!(state.checkouts.borrow().is_empty());
        assert!(cloner.calls.borrow().is_empty());
    }

    #[test]
    fn test_pull_failure_falls_back_to_keep_reset() {
        let temp = TempDir::new().unwrap();
        let target = existing_target(&temp);
        let state = FakeState::with_heads(&["aaa111", "bbb222"]);
        state.has_branch.set(true);
        state.fail_pull.set(true);
        *state.diff_files.borrow_mut() = vec!["config.yaml".to_string()];
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner::default();
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        let outcome = sync.sync(&target, "perturb").unwrap();

        assert!(outcome.success);
        assert_eq!(state.pulls.borrow().len(), 1);
        assert_eq!(*state.resets.borrow(), vec!["origin/perturb"]);
        assert_eq!(outcome.new_revision.as_deref(), Some("bbb222"));
    }

    #[test]
    fn test_reset_failure_marks_outcome_failed() {
        let temp = TempDir::new().unwrap();
        let target = existing_target(&temp);
        let state = FakeState::with_heads(&["aaa111"]);
        state.has_branch.set(true);
        state.fail_pull.set(true);
        state.fail_reset.set(true);
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner::default();
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        let outcome = sync.sync(&target, "perturb").unwrap();

        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("scripted reset failure")
        );
        assert_eq!(state.resets.borrow().len(), 1);
    }

    #[test]
    fn test_up_to_date_outcome() {
        let temp = TempDir::new().unwrap();
        let target = existing_target(&temp);
        let state = FakeState::with_heads(&["aaa111", "aaa111"]);
        state.has_branch.set(true);
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner::default();
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        let outcome = sync.sync(&target, "perturb").unwrap();

        assert!(outcome.is_up_to_date());
        assert!(outcome.changed_files.is_empty());
        // no diff is computed when nothing moved
        assert_eq!(state.diffs.get(), 0);
    }

    #[test]
    fn test_updated_outcome_includes_diff() {
        let temp = TempDir::new().unwrap();
        let target = existing_target(&temp);
        let state = FakeState::with_heads(&["aaa111", "bbb222"]);
        state.has_branch.set(true);
        *state.diff_files.borrow_mut() =
            vec!["config.yaml".to_string(), "forcing.json".to_string()];
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner::default();
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        let outcome = sync.sync(&target, "perturb").unwrap();

        assert!(outcome.success);
        assert!(!outcome.is_up_to_date());
        assert_eq!(outcome.prior_revision.as_deref(), Some("aaa111"));
        assert_eq!(outcome.new_revision.as_deref(), Some("bbb222"));
        assert_eq!(outcome.changed_files, vec!["config.yaml", "forcing.json"]);
    }

    #[test]
    fn test_open_failure_reports_failed_outcome() {
        let temp = TempDir::new().unwrap();
        let target = existing_target(&temp);
        let state = FakeState::with_heads(&[]);
        state.fail_open.set(true);
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner::default();
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        let outcome = sync.sync(&target, "perturb").unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("scripted open failure"));
        // an existing directory is never replaced by a clone
        assert!(cloner.calls.borrow().is_empty());
    }

    #[test]
    fn test_checkout_failure_reports_failed_outcome() {
        let temp = TempDir::new().unwrap();
        let target = existing_target(&temp);
        let state = FakeState::with_heads(&["aaa111"]);
        state.has_branch.set(true);
        state.fail_checkout.set(true);
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner::default();
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        let outcome = sync.sync(&target, "perturb").unwrap();

        assert!(!outcome.success);
        assert!(state.pulls.borrow().is_empty());
        assert!(cloner.calls.borrow().is_empty());
    }

    #[test]
    fn test_diff_failure_reports_failed_outcome() {
        let temp = TempDir::new().unwrap();
        let target = existing_target(&temp);
        let state = FakeState::with_heads(&["aaa111", "bbb222"]);
        state.has_branch.set(true);
        state.fail_diff.set(true);
        let vcs = FakeVcs {
            state: Rc::clone(&state),
        };
        let cloner = RecordingCloner::default();
        let params = CloneParams::default();
        let repository = PathBuf::from("/data/control");

        let sync = synchronizer(&vcs, &cloner, &repository, &params, temp.path());
        let outcome = sync.sync(&target, "perturb").unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("scripted diff failure"));
    }
}
