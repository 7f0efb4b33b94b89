//! The `chart-testing` check: confirm a release converges on a live cluster.
//!
//! The release is assumed installed by the surrounding pipeline; this check
//! resolves the target platform version and waits for the release's
//! deployments to become available before the run deadline.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chart_verifier_cluster::{cancelled, platform_version_for, ClusterClient, ConvergencePoller};
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::check::{AnnotationHolder, Check, CheckOptions, CheckResult};
use crate::version::CheckVersion;

pub const CHART_TESTING_SUCCESS: &str = "Chart tests have passed";
pub const NO_CLUSTER: &str = "no cluster connection configured";
pub const VERSION_QUERY_STALLED: &str = "server version query did not complete before deadline";
pub const DISCOVERY_CANCELLED: &str = "platform version discovery cancelled";

/// Config key: namespace the release lives in.
pub const NAMESPACE_KEY: &str = "namespace";
/// Config key: release name, defaults to the chart name.
pub const RELEASE_KEY: &str = "release";
/// Config key: label carrying the release name on its deployments.
pub const RELEASE_LABEL_KEY: &str = "releaseLabel";
pub const DEFAULT_RELEASE_LABEL: &str = "app.kubernetes.io/instance";

/// Work out which platform version the chart is being certified against and
/// record it through `holder`.
///
/// The cluster's own version wins. The caller's flag is the fallback and
/// must be a valid version. A version query still unanswered at `deadline`
/// counts as a discovery failure; cancellation aborts discovery outright.
pub async fn resolve_platform_version(
    holder: &dyn AnnotationHolder,
    cluster: Option<&dyn ClusterClient>,
    deadline: Instant,
    cancel: &mut watch::Receiver<bool>,
) -> Result<String> {
    let discovery_error = match cluster {
        Some(cluster) => {
            let queried = tokio::select! {
                biased;
                _ = cancelled(cancel) => bail!(DISCOVERY_CANCELLED),
                queried = timeout_at(deadline, cluster.server_version()) => queried,
            };
            match queried {
                Ok(Ok(kube_version)) => match platform_version_for(&kube_version) {
                    Some(platform) => {
                        info!(kube_version = %kube_version, platform_version = %platform, "Discovered platform version");
                        holder.set_certified_platform_version(platform);
                        return Ok(platform.to_string());
                    }
                    None => format!("unknown kubernetes version {kube_version}"),
                },
                Ok(Err(e)) => e.to_string(),
                Err(_) => VERSION_QUERY_STALLED.to_string(),
            }
        }
        None => NO_CLUSTER.to_string(),
    };

    match holder.certified_platform_version_flag() {
        Some(flag) => {
            if CheckVersion::parse(&flag).is_err() {
                bail!("platform version is not a valid semantic version: {flag}");
            }
            warn!(reason = %discovery_error, platform_version = %flag, "Using platform version flag");
            holder.set_certified_platform_version(&flag);
            Ok(flag)
        }
        None => bail!(
            "missing platform version: {discovery_error}; the 'platform-version' flag has not been set"
        ),
    }
}

/// Waits for the chart's release to converge on the configured cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChartTesting;

#[async_trait]
impl Check for ChartTesting {
    async fn run(&self, options: &CheckOptions<'_>) -> Result<CheckResult> {
        let cluster = options.settings.cluster.as_deref();
        let mut cancel = options.cancel.clone();
        let platform_version =
            resolve_platform_version(options.annotations, cluster, options.deadline, &mut cancel)
                .await?;

        let Some(cluster) = cluster else {
            return Ok(CheckResult::fail(NO_CLUSTER));
        };

        let namespace = options
            .config
            .get_str(NAMESPACE_KEY)
            .unwrap_or(&options.settings.namespace);
        let release = options
            .config
            .get_str(RELEASE_KEY)
            .unwrap_or(&options.chart.metadata.name);
        let label = options
            .config
            .get_str(RELEASE_LABEL_KEY)
            .unwrap_or(DEFAULT_RELEASE_LABEL);
        let selector = format!("{label}={release}");

        let waited = ConvergencePoller::new(cluster)
            .with_interval(options.settings.poll_interval)
            .wait_for_deployments(namespace, &selector, options.deadline, &mut cancel)
            .await;

        Ok(match waited {
            Ok(()) => CheckResult::pass(CHART_TESTING_SUCCESS)
                .with_warning(format!("certified against platform version {platform_version}")),
            Err(e) => CheckResult::fail(e.to_string()),
        })
    }
}
