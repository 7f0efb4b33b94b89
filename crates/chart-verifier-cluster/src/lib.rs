//! Chart Verifier Cluster - live environment access for verification checks
//!
//! Provides:
//! - The `ClusterClient` contract consumed by checks that exercise a cluster
//! - A deadline-bounded `ConvergencePoller` waiting for deployments to settle
//! - Kubernetes-to-platform version mapping
//! - In-memory fakes for testing via the `fakes` module

pub mod client;
pub mod fakes;
pub mod poller;
pub mod versions;

// Re-export key types
pub use client::{ClusterClient, ClusterError, ClusterResult, DeploymentStatus};
pub use poller::{
    cancelled, ConvergencePoller, PollState, WaitError, DEFAULT_POLL_INTERVAL, QUERY_STALLED,
};
pub use versions::{kube_platform_version_map, platform_version_for};
