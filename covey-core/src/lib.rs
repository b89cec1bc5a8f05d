//! Covey Core - Core library for branch-experiment synchronization
//!
//! This crate keeps a set of experiment working directories, one per branch
//! of a source repository, in sync with that repository and submits a batch
//! run for each. Missing directories are cloned through payu; existing ones
//! are updated in place through git.

pub mod config;
pub mod error;
pub mod payu;
pub mod pbs;
pub mod runner;
pub mod sync;
pub mod vcs;

pub use config::{BranchSpec, CloneParams, ExperimentPlan};
pub use error::{Error, Result};
pub use runner::ExperimentRunner;
pub use sync::{RepoSynchronizer, SyncOutcome};
