//! Verifier builder.
//!
//! Setters only accumulate state. All validation happens in
//! [`VerifierBuilder::build`], which stops at the first failure in this
//! order: empty selection, profile load error, malformed override.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::chart::{ChartLoader, DirectoryChartLoader};
use crate::check::{ChartValues, EnvSettings, VerifierConfig};
use crate::error::{Result, VerifierError};
use crate::profile::{FilteredRegistry, ProfileError, ProfileInfo, ProfileWarning};
use crate::verifier::Verifier;

/// Run timeout applied when none is set.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Accumulates run parameters and freezes them into a [`Verifier`].
#[derive(Clone)]
pub struct VerifierBuilder {
    checks: FilteredRegistry,
    values: Option<ChartValues>,
    config: Option<VerifierConfig>,
    overrides: Vec<String>,
    tool_version: String,
    platform_version: Option<String>,
    provider_delivery: bool,
    timeout: Duration,
    settings: Option<EnvSettings>,
    loader: Arc<dyn ChartLoader>,
    profile: Option<ProfileInfo>,
    profile_warnings: Vec<ProfileWarning>,
    profile_error: Option<ProfileError>,
}

impl Default for VerifierBuilder {
    fn default() -> Self {
        Self {
            checks: FilteredRegistry::new(),
            values: None,
            config: None,
            overrides: Vec::new(),
            tool_version: crate::VERSION.to_string(),
            platform_version: None,
            provider_delivery: false,
            timeout: DEFAULT_TIMEOUT,
            settings: None,
            loader: Arc::new(DirectoryChartLoader),
            profile: None,
            profile_warnings: Vec::new(),
            profile_error: None,
        }
    }
}

impl VerifierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checks(mut self, checks: FilteredRegistry) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_values(mut self, values: ChartValues) -> Self {
        self.values = Some(values);
        self
    }

    pub fn with_config(mut self, config: VerifierConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// `key=value` strings, applied in order on top of the base config.
    pub fn with_overrides<I, S>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides = overrides.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = version.into();
        self
    }

    pub fn with_platform_version(mut self, version: impl Into<String>) -> Self {
        self.platform_version = Some(version.into());
        self
    }

    pub fn with_provider_delivery(mut self, provider_delivery: bool) -> Self {
        self.provider_delivery = provider_delivery;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settings(mut self, settings: EnvSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ChartLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_profile(mut self, profile: ProfileInfo) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_profile_warnings(mut self, warnings: Vec<ProfileWarning>) -> Self {
        self.profile_warnings = warnings;
        self
    }

    /// Record a failed profile load; every build from this builder fails
    /// with it.
    pub fn with_profile_error(mut self, error: ProfileError) -> Self {
        self.profile_error = Some(error);
        self
    }

    /// Validate and freeze.
    pub fn build(&self) -> Result<Verifier> {
        if self.checks.is_empty() {
            return Err(VerifierError::NoChecksSelected);
        }

        if let Some(err) = &self.profile_error {
            return Err(VerifierError::ProfileLoad(err.clone()));
        }

        let mut config = self.config.clone().unwrap_or_default();
        let values = self.values.clone().unwrap_or_default();
        let settings = self.settings.clone().unwrap_or_default();

        for (key, value) in parse_overrides(&self.overrides)? {
            config.set(key, Value::String(value));
        }

        let mut checks: Vec<_> = self.checks.checks().cloned().collect();
        checks.sort_by(|a, b| a.id.name.cmp(&b.id.name));

        debug!(
            checks = checks.len(),
            overrides = self.overrides.len(),
            timeout = ?self.timeout,
            "Built verifier"
        );

        Ok(Verifier {
            checks,
            config,
            values,
            settings,
            loader: Arc::clone(&self.loader),
            tool_version: self.tool_version.clone(),
            platform_version: self.platform_version.clone(),
            provider_delivery: self.provider_delivery,
            timeout: self.timeout,
            profile: self.profile.clone(),
            profile_warnings: self.profile_warnings.iter().map(ToString::to_string).collect(),
        })
    }
}

/// Split every override on its first `=`. Any malformed entry rejects the
/// whole list.
fn parse_overrides(overrides: &[String]) -> Result<Vec<(String, String)>> {
    overrides
        .iter()
        .map(|raw| match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(VerifierError::MalformedOverride(raw.clone())),
        })
        .collect()
}
