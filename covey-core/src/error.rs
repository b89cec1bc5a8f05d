//! Error types for covey

use thiserror::Error;

/// Result type alias for covey operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for covey operations
///
/// The variant encodes how a failure is handled: `Config` and `Clone` are
/// fatal to the whole run, `Git` is caught at the update boundary and turned
/// into a failed outcome for that directory only.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Experiment plan parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Experiment plan is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The clone primitive failed
    #[error("Clone error: {0}")]
    Clone(String),

    /// A version-control command failed during an update
    #[error("Git error: {0}")]
    Git(String),

    /// Batch job submission failed
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
