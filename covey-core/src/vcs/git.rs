//! Git implementation of the version-control adapter
//!
//! Opening and read-only queries go through git2. The mutating update
//! operations shell out to the `git` CLI bound to the checkout directory,
//! because `pull --rebase --autostash` and `reset --keep` have no libgit2
//! equivalent and because failures must carry the tool's own message.

use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{BranchType, Repository};
use tracing::debug;

use super::{VcsBackend, Workdir};
use crate::{Error, Result};

/// Opens git working directories
#[derive(Debug, Clone, Default)]
pub struct GitBackend;

impl GitBackend {
    /// Create a new git backend
    pub fn new() -> Self {
        Self
    }
}

impl VcsBackend for GitBackend {
    fn open(&self, dir: &Path) -> Result<Box<dyn Workdir>> {
        Ok(Box::new(GitWorkdir::open(dir)?))
    }
}

/// A git working directory bound to one experiment checkout
pub struct GitWorkdir {
    /// The underlying git2 repository
    repo: Repository,
    /// Path to the checkout root
    root: PathBuf,
}

impl std::fmt::Debug for GitWorkdir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitWorkdir")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitWorkdir {
    /// Open the repository at the given path
    ///
    /// The path must be the checkout root itself: a stray non-repository
    /// directory has to fail here rather than resolve upward to some parent
    /// repository.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::open(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::Git(format!("Not a git repository: {}", path.display()))
            } else {
                Error::Git(format!(
                    "Failed to open repository at {}: {}",
                    path.display(),
                    e.message()
                ))
            }
        })?;

        Ok(Self {
            repo,
            root: path.to_path_buf(),
        })
    }

    /// Get the checkout root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run a git subcommand in the checkout, returning captured stdout
    fn git(&self, args: &[&str]) -> Result<String> {
        debug!(dir = %self.root.display(), ?args, "running git");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::Git(format!("Failed to run git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Git(format!(
                "git {} failed in {}: {}",
                args.join(" "),
                self.root.display(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Workdir for GitWorkdir {
    fn fetch(&self, prune: bool) -> Result<()> {
        if prune {
            self.git(&["fetch", "--prune", "origin"]).map(drop)
        } else {
            self.git(&["fetch", "origin"]).map(drop)
        }
    }

    fn has_local_branch(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    fn checkout_existing(&self, name: &str) -> Result<()> {
        self.git(&["checkout", name]).map(drop)
    }

    fn checkout_new_tracking(&self, name: &str) -> Result<()> {
        let remote_ref = format!("origin/{}", name);
        self.git(&["checkout", "-b", name, "--track", &remote_ref])
            .map(drop)
    }

    fn pull_rebase_autostash(&self, remote: &str, branch: &str) -> Result<()> {
        match self.git(&["pull", "--rebase", "--autostash", remote, branch]) {
            Ok(_) => Ok(()),
            Err(e) => {
                // A conflicted rebase leaves the tree mid-rebase; unwind it
                // so the caller's fallback starts from a coherent state. If
                // no rebase was started the abort fails and is ignored.
                let _ = self.git(&["rebase", "--abort"]);
                Err(e)
            }
        }
    }

    fn reset_keep_to(&self, reference: &str) -> Result<()> {
        self.git(&["reset", "--keep", reference]).map(drop)
    }

    fn head_revision(&self) -> Result<String> {
        let head = self.repo.head().map_err(|e| {
            Error::Git(format!(
                "Failed to resolve HEAD in {}: {}",
                self.root.display(),
                e.message()
            ))
        })?;

        let commit = head.peel_to_commit().map_err(|e| {
            Error::Git(format!(
                "HEAD does not point at a commit in {}: {}",
                self.root.display(),
                e.message()
            ))
        })?;

        Ok(commit.id().to_string())
    }

    fn diff_names(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let stdout = self.git(&["diff", "--name-only", from, to])?;
        Ok(stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.to_string())
            .collect())
    }
}
