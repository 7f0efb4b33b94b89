//! Kubernetes to platform version mapping.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::error;

const VERSION_MAP_YAML: &str = include_str!("../data/kube_platform_versions.yaml");

#[derive(Debug, Deserialize)]
struct VersionMap {
    versions: Vec<VersionMapping>,
}

#[derive(Debug, Deserialize)]
struct VersionMapping {
    #[serde(rename = "kube-version")]
    kube_version: String,
    #[serde(rename = "platform-version")]
    platform_version: String,
}

/// The embedded `kube minor -> platform minor` table, parsed once.
///
/// A malformed table is logged and yields an empty map.
pub fn kube_platform_version_map() -> &'static BTreeMap<String, String> {
    static MAP: OnceLock<BTreeMap<String, String>> = OnceLock::new();
    MAP.get_or_init(|| match serde_yaml::from_str::<VersionMap>(VERSION_MAP_YAML) {
        Ok(parsed) => parsed
            .versions
            .into_iter()
            .map(|m| (m.kube_version, m.platform_version))
            .collect(),
        Err(e) => {
            error!(error = %e, "Error reading embedded kube/platform version map");
            BTreeMap::new()
        }
    })
}

/// Platform version for a Kubernetes server version such as `v1.27.3`.
pub fn platform_version_for(kube_version: &str) -> Option<&'static str> {
    let trimmed = kube_version.trim().trim_start_matches('v');
    let mut parts = trimmed.split('.');
    let major = parts.next()?;
    // Managed clusters report minors like "27+".
    let minor = parts.next()?.trim_end_matches('+');
    kube_platform_version_map()
        .get(&format!("{major}.{minor}"))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_map_parses() {
        assert!(!kube_platform_version_map().is_empty());
    }

    #[test]
    fn test_lookup_full_server_version() {
        assert_eq!(platform_version_for("v1.27.3"), Some("4.14"));
        assert_eq!(platform_version_for("1.20"), Some("4.7"));
    }

    #[test]
    fn test_lookup_managed_minor_suffix() {
        assert_eq!(platform_version_for("v1.25+"), Some("4.12"));
    }

    #[test]
    fn test_unknown_version() {
        assert_eq!(platform_version_for("v0.9.0"), None);
        assert_eq!(platform_version_for("garbage"), None);
    }
}
