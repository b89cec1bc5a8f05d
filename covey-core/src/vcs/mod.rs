//! Version-control adapter for experiment checkouts
//!
//! The synchronizer talks to version control through the [`Workdir`] trait;
//! every handle is bound to one directory at open time, so no operation
//! depends on the process working directory. [`VcsBackend`] opens handles
//! and is the seam test doubles plug into.

mod git;

pub use git::{GitBackend, GitWorkdir};

use std::path::Path;

use crate::Result;

/// Capability set the synchronizer requires of a version-control backend
///
/// All operations are synchronous. Failures surface as `Error::Git`
/// carrying the underlying tool's message.
pub trait Workdir {
    /// Refresh remote-tracking refs, pruning stale ones when requested
    fn fetch(&self, prune: bool) -> Result<()>;

    /// Whether a local branch with this name exists
    fn has_local_branch(&self, name: &str) -> bool;

    /// Check out an existing local branch
    fn checkout_existing(&self, name: &str) -> Result<()>;

    /// Create and check out a local branch tracking `origin/<name>`
    fn checkout_new_tracking(&self, name: &str) -> Result<()>;

    /// Rebase local commits onto the fetched remote tip, autostashing
    /// uncommitted changes
    ///
    /// Fails without partially applying: a conflicted rebase is unwound
    /// before the error is reported.
    fn pull_rebase_autostash(&self, remote: &str, branch: &str) -> Result<()>;

    /// Move the current branch to `reference`, keeping uncommitted
    /// working-tree changes where possible
    fn reset_keep_to(&self, reference: &str) -> Result<()>;

    /// Revision identifier of the current HEAD
    fn head_revision(&self) -> Result<String>;

    /// Paths changed between two revisions, in diff order
    fn diff_names(&self, from: &str, to: &str) -> Result<Vec<String>>;
}

/// Opens [`Workdir`] handles on experiment directories
pub trait VcsBackend {
    /// Open the checkout at `dir`
    ///
    /// Fails with `Error::Git` when the directory is not a repository root.
    fn open(&self, dir: &Path) -> Result<Box<dyn Workdir>>;
}
