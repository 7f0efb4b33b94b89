//! Chart Verifier Core - verification orchestration for chart certification
//!
//! Provides:
//! - A registry of named, versioned checks and the built-in check set
//! - Vendor profiles that select which checks apply to a submission
//! - `VerifierBuilder`, which validates run parameters and freezes them
//! - `Verifier`, which runs the selected checks in a fixed order
//! - `Report`, the ordered outcome of one run

pub mod builder;
pub mod chart;
pub mod check;
pub mod checks;
pub mod error;
pub mod profile;
pub mod registry;
pub mod report;
pub mod run;
pub mod telemetry;
pub mod verifier;
pub mod version;

// Re-export key types
pub use builder::{VerifierBuilder, DEFAULT_TIMEOUT};
pub use chart::{Chart, ChartLoader, ChartMetadata, DirectoryChartLoader, LoadError};
pub use check::{
    check_fn, AnnotationHolder, ChartValues, Check, CheckId, CheckOptions, CheckRef,
    CheckResult, CheckType, EnvSettings, VerifierConfig,
};
pub use checks::default_registry;
pub use error::{DuplicateCheckError, Result, VerifierError};
pub use profile::{
    FilterOutcome, FilteredCheck, FilteredRegistry, Profile, ProfileCatalog, ProfileError,
    ProfileInfo, ProfileLoad, ProfileWarning,
};
pub use registry::{CheckSet, RegisteredCheck, Registry};
pub use report::{Report, ReportMetadata};
pub use run::{run, run_with_registry, RunOptions};
pub use telemetry::init_tracing;
pub use verifier::Verifier;
pub use version::{CheckVersion, VersionError};

/// Crate version, reported as the tool version when none is set.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
