//! Frozen verifier and check execution.
//!
//! Checks run one at a time in the order fixed at build time. A check that
//! errors is recorded as a failed result and the run moves on. Only a chart
//! that cannot be loaded, the run timeout, or cancellation abort the run,
//! and none of them produce a report.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::chart::{Chart, ChartLoader};
use crate::check::{AnnotationHolder, ChartValues, CheckOptions, CheckResult, EnvSettings, VerifierConfig};
use crate::error::{Result, VerifierError};
use crate::profile::{FilteredCheck, ProfileInfo};
use crate::report::{Report, ReportMetadata};

/// Upper bound on the slack kept between a check's wait deadline and the
/// run timeout.
const CHECK_DEADLINE_MARGIN: Duration = Duration::from_secs(10);

/// Immutable, runnable configuration for one verification run.
///
/// Produced by [`crate::VerifierBuilder::build`]. Verifying consumes it, so
/// each run needs a fresh build.
pub struct Verifier {
    pub(crate) checks: Vec<FilteredCheck>,
    pub(crate) config: VerifierConfig,
    pub(crate) values: ChartValues,
    pub(crate) settings: EnvSettings,
    pub(crate) loader: Arc<dyn ChartLoader>,
    pub(crate) tool_version: String,
    pub(crate) platform_version: Option<String>,
    pub(crate) provider_delivery: bool,
    pub(crate) timeout: Duration,
    pub(crate) profile: Option<ProfileInfo>,
    pub(crate) profile_warnings: Vec<String>,
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("checks", &self.check_order())
            .field("config", &self.config)
            .field("tool_version", &self.tool_version)
            .field("platform_version", &self.platform_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Verifier {
    /// Check names in execution order.
    pub fn check_order(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.id.name.as_str()).collect()
    }

    pub fn checks(&self) -> &[FilteredCheck] {
        &self.checks
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn settings(&self) -> &EnvSettings {
        &self.settings
    }

    pub fn tool_version(&self) -> &str {
        &self.tool_version
    }

    pub fn platform_version(&self) -> Option<&str> {
        self.platform_version.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run every check against the chart at `uri`.
    ///
    /// A verifier runs once:
    ///
    /// ```compile_fail
    /// # async fn twice(verifier: chart_verifier_core::Verifier) {
    /// let _ = verifier.verify("charts/a").await;
    /// let _ = verifier.verify("charts/b").await;
    /// # }
    /// ```
    pub async fn verify(self, uri: &str) -> Result<Report> {
        let (_tx, cancel) = watch::channel(false);
        self.verify_with_cancel(uri, cancel).await
    }

    /// Like [`Verifier::verify`], aborting with [`VerifierError::Cancelled`]
    /// once `cancel` turns `true`. In-flight cluster waits observe the flag
    /// immediately.
    #[instrument(skip_all, fields(uri = %uri, checks = self.checks.len()))]
    pub async fn verify_with_cancel(
        self,
        uri: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<Report> {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.execute(uri, started, cancel)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(timeout = ?self.timeout, "Verification run timed out");
                Err(VerifierError::RunTimeout(self.timeout))
            }
        }
    }

    /// Deadline handed to checks, short of the run timeout so a check's own
    /// wait fails that check rather than the whole run.
    fn check_deadline(&self, started: Instant) -> Instant {
        let margin = CHECK_DEADLINE_MARGIN.min(self.timeout / 10);
        started + self.timeout.saturating_sub(margin)
    }

    async fn execute(
        &self,
        uri: &str,
        started: Instant,
        cancel: watch::Receiver<bool>,
    ) -> Result<Report> {
        let chart = self
            .loader
            .load(uri)
            .await
            .map_err(|source| VerifierError::ArtifactLoad {
                uri: uri.to_string(),
                source,
            })?;
        info!(chart = %chart.metadata.name, version = %chart.metadata.version, "Loaded chart");

        let annotations = RunAnnotations::new(self.platform_version.clone());
        let deadline = self.check_deadline(started);
        let mut results = Vec::with_capacity(self.checks.len());

        for check in &self.checks {
            if *cancel.borrow() {
                warn!(next_check = %check.id, "Verification cancelled");
                return Err(VerifierError::Cancelled);
            }
            let result = self
                .run_check(check, uri, &chart, &annotations, deadline, cancel.clone())
                .await;
            results.push(result);
        }

        if *cancel.borrow() {
            return Err(VerifierError::Cancelled);
        }

        let report = Report {
            metadata: ReportMetadata {
                run_id: Uuid::new_v4(),
                generated_at: Utc::now(),
                tool_version: self.tool_version.clone(),
                platform_version: self.platform_version.clone(),
                certified_platform_version: annotations.discovered(),
                profile: self.profile.clone(),
                chart_uri: uri.to_string(),
                chart_name: chart.metadata.name.clone(),
                chart_version: chart.metadata.version.clone(),
                chart_digest: chart.digest.clone(),
                provider_delivery: self.provider_delivery,
                profile_warnings: self.profile_warnings.clone(),
            },
            results,
        };

        info!(
            passed = report.passed_count(),
            failed = report.failed_count(),
            elapsed = ?started.elapsed(),
            "Verification complete"
        );
        Ok(report)
    }

    async fn run_check(
        &self,
        check: &FilteredCheck,
        uri: &str,
        chart: &Chart,
        annotations: &RunAnnotations,
        deadline: Instant,
        cancel: watch::Receiver<bool>,
    ) -> CheckResult {
        let config = self.config.merged_with(&check.config);
        let options = CheckOptions {
            uri,
            chart,
            values: &self.values,
            config: &config,
            settings: &self.settings,
            annotations,
            provider_delivery: self.provider_delivery,
            deadline,
            cancel,
        };

        debug!(check = %check.id, "Running check");
        let mut result = match check.check.run(&options).await {
            Ok(result) => result,
            Err(e) => {
                warn!(check = %check.id, error = %format!("{e:#}"), "Check returned an error");
                CheckResult::fail(format!("{e:#}"))
            }
        };
        result.name = check.id.to_string();
        result.check_type = check.check_type;

        info!(check = %check.id, ok = result.ok, "Check finished");
        result
    }
}

/// Per-run annotation state: the caller's platform version flag and the
/// version a check discovered.
#[derive(Debug, Default)]
pub(crate) struct RunAnnotations {
    flag: Option<String>,
    discovered: Mutex<Option<String>>,
}

impl RunAnnotations {
    pub(crate) fn new(flag: Option<String>) -> Self {
        Self {
            flag,
            discovered: Mutex::new(None),
        }
    }

    pub(crate) fn discovered(&self) -> Option<String> {
        self.discovered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AnnotationHolder for RunAnnotations {
    fn set_certified_platform_version(&self, version: &str) {
        *self.discovered.lock().unwrap_or_else(|e| e.into_inner()) = Some(version.to_string());
    }

    fn certified_platform_version_flag(&self) -> Option<String> {
        self.flag.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotations_record_discovered_version() {
        let annotations = RunAnnotations::new(Some("4.12".to_string()));
        assert_eq!(annotations.certified_platform_version_flag().as_deref(), Some("4.12"));
        assert!(annotations.discovered().is_none());

        annotations.set_certified_platform_version("4.14");
        assert_eq!(annotations.discovered().as_deref(), Some("4.14"));
    }
}
