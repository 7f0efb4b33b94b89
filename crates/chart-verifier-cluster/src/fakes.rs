//! In-memory fakes for the cluster contract (testing only)
//!
//! `ScriptedCluster` replays a fixed sequence of deployment listings, one per
//! call; once the script is exhausted the final response repeats.
//! `StalledCluster` accepts queries and never answers them.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{ClusterClient, ClusterError, ClusterResult, DeploymentStatus};

/// Cluster fake driven by a script of listing responses.
#[derive(Debug)]
pub struct ScriptedCluster {
    listings: Mutex<VecDeque<ClusterResult<Vec<DeploymentStatus>>>>,
    last: Mutex<ClusterResult<Vec<DeploymentStatus>>>,
    server_version: ClusterResult<String>,
    calls: Mutex<usize>,
}

impl ScriptedCluster {
    /// Replay `listings` in order.
    pub fn new(listings: Vec<ClusterResult<Vec<DeploymentStatus>>>) -> Self {
        Self {
            listings: Mutex::new(listings.into()),
            last: Mutex::new(Ok(Vec::new())),
            server_version: Err(ClusterError::Request("version not scripted".to_string())),
            calls: Mutex::new(0),
        }
    }

    /// Every listing reports the given deployments.
    pub fn steady(deployments: Vec<DeploymentStatus>) -> Self {
        Self::new(vec![Ok(deployments)])
    }

    /// Every listing fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self::new(vec![Err(ClusterError::Request(message.to_string()))])
    }

    /// Answer `server_version` with `version`.
    pub fn with_server_version(mut self, version: &str) -> Self {
        self.server_version = Ok(version.to_string());
        self
    }

    /// Number of deployment listings served so far.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ClusterClient for ScriptedCluster {
    async fn list_deployments(
        &self,
        _namespace: &str,
        _selector: &str,
    ) -> ClusterResult<Vec<DeploymentStatus>> {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;

        let next = self
            .listings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(response) = next {
            *last = response;
        }
        last.clone()
    }

    async fn server_version(&self) -> ClusterResult<String> {
        self.server_version.clone()
    }
}

/// Cluster fake whose calls never complete, like an API server that accepted
/// the connection and then went silent.
#[derive(Debug, Default)]
pub struct StalledCluster {
    server_version: Option<String>,
    calls: Mutex<usize>,
}

impl StalledCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `server_version` with `version` instead of stalling.
    pub fn with_server_version(mut self, version: &str) -> Self {
        self.server_version = Some(version.to_string());
        self
    }

    /// Number of deployment listings started so far.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ClusterClient for StalledCluster {
    async fn list_deployments(
        &self,
        _namespace: &str,
        _selector: &str,
    ) -> ClusterResult<Vec<DeploymentStatus>> {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        std::future::pending().await
    }

    async fn server_version(&self) -> ClusterResult<String> {
        match &self.server_version {
            Some(version) => Ok(version.clone()),
            None => std::future::pending().await,
        }
    }
}
