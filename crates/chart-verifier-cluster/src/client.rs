//! Cluster state source contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for cluster queries.
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Failures reported by a cluster state source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("cluster request failed: {0}")]
    Request(String),

    #[error("no cluster connection configured")]
    NotConfigured,
}

/// Observed rollout state of a single deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    /// Deployment name.
    pub name: String,

    /// Desired replica count.
    pub replicas: u32,

    /// Replicas reporting available.
    pub available_replicas: u32,

    /// Replicas still unavailable, including pods from a previous revision
    /// that are terminating just after a rollout.
    pub unavailable_replicas: u32,
}

impl DeploymentStatus {
    /// A deployment that has fully rolled out.
    pub fn available(name: impl Into<String>, replicas: u32) -> Self {
        Self {
            name: name.into(),
            replicas,
            available_replicas: replicas,
            unavailable_replicas: 0,
        }
    }

    /// A deployment with no replica available yet.
    pub fn unavailable(name: impl Into<String>, replicas: u32) -> Self {
        Self {
            name: name.into(),
            replicas,
            available_replicas: 0,
            unavailable_replicas: replicas,
        }
    }

    /// Whether every desired replica is available.
    pub fn is_available(&self) -> bool {
        self.available_replicas >= self.replicas && self.unavailable_replicas == 0
    }
}

/// Query surface of the cluster API consumed by verification checks.
///
/// Each call is independent: success or failure is reported per call and
/// callers decide whether a failure is transient.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List deployments in `namespace` matching the label `selector`.
    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &str,
    ) -> ClusterResult<Vec<DeploymentStatus>>;

    /// Kubernetes server version, e.g. `v1.27.3`.
    async fn server_version(&self) -> ClusterResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_deployment() {
        assert!(DeploymentStatus::available("web", 2).is_available());
    }

    #[test]
    fn test_unavailable_deployment() {
        assert!(!DeploymentStatus::unavailable("web", 2).is_available());
    }

    #[test]
    fn test_terminating_pods_keep_deployment_pending() {
        let status = DeploymentStatus {
            name: "web".to_string(),
            replicas: 1,
            available_replicas: 1,
            unavailable_replicas: 1,
        };
        assert!(!status.is_available());
    }

    #[test]
    fn test_scaled_to_zero_is_available() {
        assert!(DeploymentStatus::available("idle", 0).is_available());
    }
}
