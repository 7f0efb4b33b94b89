//! Verification report: ordered check results plus run metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::check::{CheckResult, CheckType};
use crate::profile::ProfileInfo;

/// Run-level facts recorded alongside the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,

    /// Platform version supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_version: Option<String>,

    /// Platform version a check discovered (or validated) during the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certified_platform_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileInfo>,

    pub chart_uri: String,
    pub chart_name: String,
    pub chart_version: String,
    pub chart_digest: String,
    pub provider_delivery: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profile_warnings: Vec<String>,
}

/// Outcome of one verification run, one result per selected check in
/// execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub results: Vec<CheckResult>,
}

impl Report {
    /// True when no mandatory check failed.
    pub fn passed(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.ok || r.check_type == CheckType::Optional)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.ok).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    /// Look up a result by check identifier (`v1.0/has-readme`) or bare name.
    pub fn result(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| {
            r.name == name || r.name.rsplit_once('/').is_some_and(|(_, bare)| bare == name)
        })
    }

    /// One line per check, for terminal output.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "chart: {} {} ({})\n",
            self.metadata.chart_name, self.metadata.chart_version, self.metadata.chart_uri
        );
        if let Some(profile) = &self.metadata.profile {
            out.push_str(&format!(
                "profile: {} {} ({})\n",
                profile.name, profile.version, profile.vendor_type
            ));
        }
        for result in &self.results {
            let status = if result.ok { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "  [{status}] {} ({:?}): {}\n",
                result.name, result.check_type, result.reason
            ));
            for warning in &result.warnings {
                out.push_str(&format!("         warning: {warning}\n"));
            }
        }
        for warning in &self.metadata.profile_warnings {
            out.push_str(&format!("profile warning: {warning}\n"));
        }
        out.push_str(&format!(
            "{} passed, {} failed: {}\n",
            self.passed_count(),
            self.failed_count(),
            if self.passed() { "PASSED" } else { "FAILED" }
        ));
        out
    }
}
