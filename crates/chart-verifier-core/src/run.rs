//! One-call verification entry point.
//!
//! Selects a profile, filters the registry through it, narrows the result to
//! the caller's selection, builds a verifier, and runs it.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::builder::VerifierBuilder;
use crate::check::{ChartValues, EnvSettings, VerifierConfig};
use crate::checks::default_registry;
use crate::error::Result;
use crate::profile::{
    FilteredRegistry, ProfileLoad, PROFILE_VENDOR_TYPE_KEY, PROFILE_VERSION_KEY,
};
use crate::registry::Registry;
use crate::report::Report;

/// Parameters accepted at the boundary of a verification run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub uri: String,

    /// Checks to run; empty means every check the profile allows.
    pub enabled: Vec<String>,

    /// Checks to leave out, applied after `enabled`.
    pub disabled: Vec<String>,

    pub values: ChartValues,
    pub config: VerifierConfig,

    /// `key=value` overrides. `profile.vendortype` and `profile.version`
    /// also select the profile.
    pub overrides: Vec<String>,

    pub tool_version: Option<String>,
    pub platform_version: Option<String>,
    pub provider_delivery: bool,
    pub timeout: Option<Duration>,
    pub settings: EnvSettings,

    /// Optional abort signal for the run.
    pub cancel: Option<watch::Receiver<bool>>,
}

impl RunOptions {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }
}

/// Verify `options.uri` against the default registry.
pub async fn run(options: RunOptions, profiles: &ProfileLoad) -> Result<Report> {
    run_with_registry(options, default_registry()?, profiles).await
}

/// Verify `options.uri` against `registry`.
pub async fn run_with_registry(
    options: RunOptions,
    registry: &Registry,
    profiles: &ProfileLoad,
) -> Result<Report> {
    let verifier = prepare(&options, registry, profiles).build()?;
    info!(uri = %options.uri, checks = ?verifier.check_order(), "Starting verification");
    match options.cancel {
        Some(cancel) => verifier.verify_with_cancel(&options.uri, cancel).await,
        None => verifier.verify(&options.uri).await,
    }
}

/// Assemble a builder from run options and the profile load outcome.
pub fn prepare(options: &RunOptions, registry: &Registry, profiles: &ProfileLoad) -> VerifierBuilder {
    let mut builder = VerifierBuilder::new()
        .with_values(options.values.clone())
        .with_config(options.config.clone())
        .with_overrides(options.overrides.clone())
        .with_provider_delivery(options.provider_delivery)
        .with_settings(options.settings.clone());
    if let Some(version) = &options.tool_version {
        builder = builder.with_tool_version(version.clone());
    }
    if let Some(version) = &options.platform_version {
        builder = builder.with_platform_version(version.clone());
    }
    if let Some(timeout) = options.timeout {
        builder = builder.with_timeout(timeout);
    }

    let vendor_type = override_value(&options.overrides, PROFILE_VENDOR_TYPE_KEY);
    let profile_version = override_value(&options.overrides, PROFILE_VERSION_KEY);

    let selected_profile = profiles
        .as_ref()
        .map_err(Clone::clone)
        .and_then(|catalog| catalog.select(vendor_type, profile_version));

    let available = match selected_profile {
        Ok(profile) => {
            info!(profile = %profile.name, version = %profile.version, "Using profile");
            let outcome = profile.filter_checks(&registry.all_checks(Some(&profile.version)));
            builder = builder
                .with_profile(profile.info())
                .with_profile_warnings(outcome.warnings);
            outcome.checks
        }
        Err(e) => {
            warn!(error = %e, "Profile unavailable");
            builder = builder.with_profile_error(e);
            FilteredRegistry::from_check_set(&registry.all_checks(None))
        }
    };

    builder.with_checks(select_checks(&available, &options.enabled, &options.disabled))
}

/// Narrow `available` to the caller's selection. Unknown names are logged
/// and ignored.
fn select_checks(
    available: &FilteredRegistry,
    enabled: &[String],
    disabled: &[String],
) -> FilteredRegistry {
    let wanted: Vec<String> = if enabled.is_empty() {
        available.names().map(str::to_string).collect()
    } else {
        enabled.to_vec()
    };
    let wanted: Vec<&String> = wanted.iter().filter(|n| !disabled.contains(*n)).collect();

    let (selected, unknown) = available.select(&wanted);
    for name in unknown {
        warn!(check = %name, "Ignoring unknown or out-of-profile check");
    }
    selected
}

/// Last value given for `key` among `key=value` overrides. Malformed entries
/// are skipped here and rejected by the build.
fn override_value<'a>(overrides: &'a [String], key: &str) -> Option<&'a str> {
    overrides
        .iter()
        .rev()
        .filter_map(|raw| raw.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ProfileCatalog, ProfileError};

    fn overrides(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_override_value_last_wins() {
        let items = overrides(&["profile.vendortype=redhat", "x", "profile.vendortype=community"]);
        assert_eq!(override_value(&items, PROFILE_VENDOR_TYPE_KEY), Some("community"));
        assert_eq!(override_value(&items, PROFILE_VERSION_KEY), None);
    }

    #[test]
    fn test_prepare_uses_partner_profile_by_default() {
        let registry = default_registry().unwrap();
        let verifier = prepare(&RunOptions::new("c"), registry, ProfileCatalog::embedded())
            .build()
            .unwrap();
        assert_eq!(verifier.check_order().len(), 9);
        assert_eq!(verifier.check_order()[0], "chart-testing");
    }

    #[test]
    fn test_prepare_enabled_and_disabled() {
        let registry = default_registry().unwrap();
        let options = RunOptions {
            enabled: overrides(&["has-readme", "is-helm-v3", "no-such-check"]),
            disabled: overrides(&["is-helm-v3"]),
            ..RunOptions::new("c")
        };
        let verifier = prepare(&options, registry, ProfileCatalog::embedded())
            .build()
            .unwrap();
        assert_eq!(verifier.check_order(), vec!["has-readme"]);
    }

    #[test]
    fn test_prepare_unknown_vendor_fails_build() {
        let registry = default_registry().unwrap();
        let options = RunOptions {
            overrides: overrides(&["profile.vendortype=nobody"]),
            ..RunOptions::new("c")
        };
        let err = prepare(&options, registry, ProfileCatalog::embedded())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            crate::VerifierError::ProfileLoad(ProfileError::NotFound(_))
        ));
    }

    #[test]
    fn test_prepare_failed_profile_load_is_sticky() {
        let registry = default_registry().unwrap();
        let broken: ProfileLoad = Err(ProfileError::NoProfiles);
        for _ in 0..2 {
            let err = prepare(&RunOptions::new("c"), registry, &broken)
                .build()
                .unwrap_err();
            assert!(matches!(
                err,
                crate::VerifierError::ProfileLoad(ProfileError::NoProfiles)
            ));
        }
    }

    #[test]
    fn test_prepare_profile_version_bounds_checks() {
        let registry = default_registry().unwrap();
        let options = RunOptions {
            overrides: overrides(&["profile.version=v1.0"]),
            ..RunOptions::new("c")
        };
        let verifier = prepare(&options, registry, ProfileCatalog::embedded())
            .build()
            .unwrap();
        let kube = verifier
            .checks()
            .iter()
            .find(|c| c.id.name == "has-kubeversion")
            .unwrap();
        assert_eq!(kube.id.version.to_string(), "v1.0");
    }
}
