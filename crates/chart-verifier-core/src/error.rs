//! Error taxonomy for verification runs.

use std::time::Duration;

use thiserror::Error;

use crate::chart::LoadError;
use crate::profile::ProfileError;
use crate::version::CheckVersion;

/// A `(name, version)` pair registered twice.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("duplicate check registration: {version}/{name}")]
pub struct DuplicateCheckError {
    pub name: String,
    pub version: CheckVersion,
}

/// Verification errors.
///
/// Configuration errors surface from `VerifierBuilder::build` before any
/// check runs. Individual check failures never appear here; they are
/// recorded as failed results in the report.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("no checks have been required")]
    NoChecksSelected,

    #[error("error processing profile: {0}")]
    ProfileLoad(ProfileError),

    #[error("malformed override '{0}': expected key=value")]
    MalformedOverride(String),

    #[error(transparent)]
    DuplicateCheck(#[from] DuplicateCheckError),

    #[error("failed to load chart {uri}: {source}")]
    ArtifactLoad {
        uri: String,
        #[source]
        source: LoadError,
    },

    #[error("verification timed out after {0:?}")]
    RunTimeout(Duration),

    #[error("verification cancelled")]
    Cancelled,
}

/// Result type for verification operations.
pub type Result<T> = std::result::Result<T, VerifierError>;
