//! Check contract: identifiers, options, and results.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chart_verifier_cluster::{ClusterClient, DEFAULT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::chart::Chart;
use crate::version::{CheckVersion, VersionError};

/// Chart values supplied by the caller.
pub type ChartValues = BTreeMap<String, Value>;

/// Registered identity of a check: `(name, version)`, written `v1.0/has-readme`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckId {
    pub name: String,
    pub version: CheckVersion,
}

impl CheckId {
    pub fn new(name: impl Into<String>, version: CheckVersion) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version, self.name)
    }
}

/// A reference to a check from profile data: a bare name, or a name with a
/// minimum version (`v1.1/has-kubeversion`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CheckRef {
    pub name: String,
    pub min_version: Option<CheckVersion>,
}

impl FromStr for CheckRef {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((version, name)) if !name.is_empty() => Ok(Self {
                name: name.to_string(),
                min_version: Some(CheckVersion::parse(version)?),
            }),
            Some(_) => Err(VersionError(s.to_string())),
            None => Ok(Self {
                name: s.to_string(),
                min_version: None,
            }),
        }
    }
}

impl TryFrom<String> for CheckRef {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CheckRef> for String {
    fn from(r: CheckRef) -> Self {
        r.to_string()
    }
}

impl fmt::Display for CheckRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.min_version {
            Some(v) => write!(f, "{v}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Whether a failing check blocks certification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckType {
    #[default]
    Mandatory,
    Optional,
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check identifier, stamped by the verifier.
    pub name: String,

    #[serde(rename = "type")]
    pub check_type: CheckType,

    pub ok: bool,

    pub reason: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl CheckResult {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self::new(true, reason)
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::new(false, reason)
    }

    pub fn new(ok: bool, reason: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            check_type: CheckType::default(),
            ok,
            reason: reason.into(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Resolved configuration handed to checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifierConfig {
    values: BTreeMap<String, Value>,
}

impl VerifierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Booleans may arrive as strings from `key=value` overrides.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// A copy of `self` with `overlay` applied on top.
    pub fn merged_with(&self, overlay: &BTreeMap<String, Value>) -> Self {
        let mut merged = self.clone();
        for (key, value) in overlay {
            merged.values.insert(key.clone(), value.clone());
        }
        merged
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for VerifierConfig {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}

/// Environment the checks run in.
#[derive(Clone)]
pub struct EnvSettings {
    /// Kubeconfig path, when one is set explicitly.
    pub kube_config: Option<PathBuf>,

    /// Namespace for checks that touch the cluster.
    pub namespace: String,

    /// Live cluster connection, if any.
    pub cluster: Option<Arc<dyn ClusterClient>>,

    /// Tick interval for convergence polling.
    pub poll_interval: Duration,
}

impl EnvSettings {
    /// Settings derived from the process environment (`KUBECONFIG`).
    pub fn from_env() -> Self {
        Self {
            kube_config: std::env::var_os("KUBECONFIG")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            ..Self::default()
        }
    }

    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        self.cluster = Some(cluster);
        self
    }
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            kube_config: None,
            namespace: "default".to_string(),
            cluster: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl fmt::Debug for EnvSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvSettings")
            .field("kube_config", &self.kube_config)
            .field("namespace", &self.namespace)
            .field("cluster", &self.cluster.as_ref().map(|_| "<connected>"))
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

/// Channel through which a check reports a discovered platform version back
/// onto the run.
pub trait AnnotationHolder: Send + Sync {
    fn set_certified_platform_version(&self, version: &str);

    /// Platform version supplied by the caller, used when discovery fails.
    fn certified_platform_version_flag(&self) -> Option<String>;
}

/// Everything a check receives for one invocation.
pub struct CheckOptions<'a> {
    pub uri: &'a str,
    pub chart: &'a Chart,
    pub values: &'a ChartValues,
    /// Frozen run configuration with the profile's per-check config on top.
    pub config: &'a VerifierConfig,
    pub settings: &'a EnvSettings,
    pub annotations: &'a dyn AnnotationHolder,
    pub provider_delivery: bool,
    /// Point by which long waits inside a check must give up.
    pub deadline: Instant,
    pub cancel: watch::Receiver<bool>,
}

/// A unit of verification logic.
///
/// Checks may perform I/O but must not touch the registry or the verifier.
/// Returning `Err` records a failed result with the error text as reason.
#[async_trait]
pub trait Check: Send + Sync {
    async fn run(&self, options: &CheckOptions<'_>) -> anyhow::Result<CheckResult>;
}

/// Adapter running a synchronous function as a [`Check`].
pub struct FnCheck<F>(F);

#[async_trait]
impl<F> Check for FnCheck<F>
where
    F: Fn(&CheckOptions<'_>) -> anyhow::Result<CheckResult> + Send + Sync,
{
    async fn run(&self, options: &CheckOptions<'_>) -> anyhow::Result<CheckResult> {
        (self.0)(options)
    }
}

/// Wrap a synchronous check function.
pub fn check_fn<F>(f: F) -> Arc<dyn Check>
where
    F: Fn(&CheckOptions<'_>) -> anyhow::Result<CheckResult> + Send + Sync + 'static,
{
    Arc::new(FnCheck(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_id_display() {
        let id = CheckId::new("has-readme", CheckVersion::new(1, 0));
        assert_eq!(id.to_string(), "v1.0/has-readme");
    }

    #[test]
    fn test_check_ref_parse() {
        let versioned: CheckRef = "v1.1/has-kubeversion".parse().unwrap();
        assert_eq!(versioned.name, "has-kubeversion");
        assert_eq!(versioned.min_version, Some(CheckVersion::new(1, 1)));

        let bare: CheckRef = "has-readme".parse().unwrap();
        assert_eq!(bare.name, "has-readme");
        assert!(bare.min_version.is_none());

        assert!("vX/has-readme".parse::<CheckRef>().is_err());
        assert!("v1.0/".parse::<CheckRef>().is_err());
    }

    #[test]
    fn test_config_merge_overlays() {
        let base = VerifierConfig::new()
            .with("namespace", json!("default"))
            .with("upgrade", json!(false));
        let mut overlay = BTreeMap::new();
        overlay.insert("namespace".to_string(), json!("ct"));

        let merged = base.merged_with(&overlay);
        assert_eq!(merged.get_str("namespace"), Some("ct"));
        assert_eq!(merged.get_bool("upgrade"), Some(false));
        assert_eq!(base.get_str("namespace"), Some("default"));
    }

    #[test]
    fn test_config_bool_from_string() {
        let config = VerifierConfig::new().with("upgrade", json!("true"));
        assert_eq!(config.get_bool("upgrade"), Some(true));
    }

    #[test]
    fn test_check_result_builders() {
        let result = CheckResult::fail("missing").with_warning("w1");
        assert!(!result.ok);
        assert_eq!(result.reason, "missing");
        assert_eq!(result.warnings, vec!["w1".to_string()]);
        assert_eq!(result.check_type, CheckType::Mandatory);
    }

    #[test]
    fn test_env_settings_default_namespace() {
        let settings = EnvSettings::default();
        assert_eq!(settings.namespace, "default");
        assert!(settings.cluster.is_none());
    }
}
