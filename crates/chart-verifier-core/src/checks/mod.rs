//! Built-in checks and the default registry.

pub mod chart_testing;
pub mod contents;

use std::sync::{Arc, OnceLock};

use crate::check::check_fn;
use crate::error::DuplicateCheckError;
use crate::registry::Registry;
use crate::version::CheckVersion;

pub use chart_testing::{resolve_platform_version, ChartTesting};

pub const HAS_README: &str = "has-readme";
pub const IS_HELM_V3: &str = "is-helm-v3";
pub const CONTAINS_TEST: &str = "contains-test";
pub const CONTAINS_VALUES: &str = "contains-values";
pub const CONTAINS_VALUES_SCHEMA: &str = "contains-values-schema";
pub const HAS_KUBE_VERSION: &str = "has-kubeversion";
pub const NOT_CONTAINS_CRDS: &str = "not-contains-crds";
pub const NOT_CONTAIN_CSI_OBJECTS: &str = "not-contain-csi-objects";
pub const CHART_TESTING: &str = "chart-testing";

const V1_0: CheckVersion = CheckVersion::new(1, 0);
const V1_1: CheckVersion = CheckVersion::new(1, 1);

/// Register every built-in check into `registry`.
pub fn register_builtin(registry: &mut Registry) -> Result<(), DuplicateCheckError> {
    registry.add(HAS_README, V1_0, check_fn(contents::has_readme))?;
    registry.add(IS_HELM_V3, V1_0, check_fn(contents::is_helm_v3))?;
    registry.add(CONTAINS_TEST, V1_0, check_fn(contents::contains_test))?;
    registry.add(CONTAINS_VALUES, V1_0, check_fn(contents::contains_values))?;
    registry.add(
        CONTAINS_VALUES_SCHEMA,
        V1_0,
        check_fn(contents::contains_values_schema),
    )?;
    registry.add(HAS_KUBE_VERSION, V1_0, check_fn(contents::has_kube_version))?;
    registry.add(
        HAS_KUBE_VERSION,
        V1_1,
        check_fn(contents::has_kube_version_v1_1),
    )?;
    registry.add(NOT_CONTAINS_CRDS, V1_0, check_fn(contents::not_contains_crds))?;
    registry.add(
        NOT_CONTAIN_CSI_OBJECTS,
        V1_0,
        check_fn(contents::not_contain_csi_objects),
    )?;
    registry.add(CHART_TESTING, V1_0, Arc::new(ChartTesting))?;
    Ok(())
}

/// The process-wide registry of built-in checks, populated on first use and
/// read-only afterwards.
pub fn default_registry() -> Result<&'static Registry, DuplicateCheckError> {
    static REGISTRY: OnceLock<Result<Registry, DuplicateCheckError>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| {
            let mut registry = Registry::new();
            register_builtin(&mut registry).map(|()| registry)
        })
        .as_ref()
        .map_err(Clone::clone)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use chart_verifier_cluster::ClusterClient;
    use serde_json::Value;
    use tokio::sync::watch;
    use tokio::time::Instant;

    use crate::chart::Chart;
    use crate::check::{ChartValues, CheckOptions, EnvSettings, VerifierConfig};
    use crate::verifier::RunAnnotations;

    /// Owns everything a [`CheckOptions`] borrows.
    pub(crate) struct OptionsFixture {
        pub chart: Chart,
        pub values: ChartValues,
        pub config: VerifierConfig,
        pub settings: EnvSettings,
        pub annotations: RunAnnotations,
        pub deadline: Instant,
        _cancel_tx: watch::Sender<bool>,
        cancel: watch::Receiver<bool>,
    }

    impl OptionsFixture {
        pub fn new(files: &[(&str, &str)]) -> Self {
            let files: BTreeMap<String, String> = files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect();
            let (tx, rx) = watch::channel(false);
            Self {
                chart: Chart::from_files(files).unwrap(),
                values: ChartValues::new(),
                config: VerifierConfig::new(),
                settings: EnvSettings::default(),
                annotations: RunAnnotations::new(None),
                deadline: Instant::now() + Duration::from_secs(60),
                _cancel_tx: tx,
                cancel: rx,
            }
        }

        pub fn with_cluster(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
            self.settings = self.settings.with_cluster(cluster);
            self
        }

        pub fn with_config(mut self, key: &str, value: Value) -> Self {
            self.config.set(key, value);
            self
        }

        pub fn with_deadline(mut self, after: Duration) -> Self {
            self.deadline = Instant::now() + after;
            self
        }

        pub fn with_flag(mut self, platform_version: &str) -> Self {
            self.annotations = RunAnnotations::new(Some(platform_version.to_string()));
            self
        }

        pub fn options(&self) -> CheckOptions<'_> {
            CheckOptions {
                uri: "charts/demo",
                chart: &self.chart,
                values: &self.values,
                config: &self.config,
                settings: &self.settings,
                annotations: &self.annotations,
                provider_delivery: false,
                deadline: self.deadline,
                cancel: self.cancel.clone(),
            }
        }
    }
}
