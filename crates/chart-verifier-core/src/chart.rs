//! Chart model and artifact loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Chart metadata file at the chart root.
pub const CHART_FILE: &str = "Chart.yaml";

/// Errors loading a chart artifact.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("chart not found: {0}")]
    NotFound(String),

    #[error("unsupported chart URI scheme: {0}")]
    UnsupportedUri(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("chart has no Chart.yaml")]
    MissingChartFile,

    #[error("invalid Chart.yaml: {0}")]
    InvalidChartFile(#[from] serde_yaml::Error),

    #[error("chart loading task failed: {0}")]
    Task(String),
}

/// Parsed `Chart.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub api_version: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A loaded chart: metadata plus every file keyed by `/`-separated relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    pub metadata: ChartMetadata,
    pub files: BTreeMap<String, String>,
    /// SHA-256 over the sorted file paths and contents.
    pub digest: String,
}

impl Chart {
    /// Build a chart from its files; `Chart.yaml` must be among them.
    pub fn from_files(files: BTreeMap<String, String>) -> Result<Self, LoadError> {
        let raw = files.get(CHART_FILE).ok_or(LoadError::MissingChartFile)?;
        let metadata: ChartMetadata = serde_yaml::from_str(raw)?;
        let digest = compute_chart_digest(&files);
        Ok(Self {
            metadata,
            files,
            digest,
        })
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Files whose path starts with `prefix` (e.g. `templates/tests/`).
    pub fn files_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.files
            .range(prefix.to_string()..)
            .take_while(move |(path, _)| path.starts_with(prefix))
            .map(|(path, content)| (path.as_str(), content.as_str()))
    }
}

/// Deterministic digest of sorted `(path, content)` pairs.
fn compute_chart_digest(files: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (path, content) in files {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(content.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

/// Resolves a chart URI into a loaded [`Chart`].
///
/// Loading is atomic from the verifier's point of view and never retried.
#[async_trait]
pub trait ChartLoader: Send + Sync {
    async fn load(&self, uri: &str) -> Result<Chart, LoadError>;
}

/// Loads unpacked charts from the local filesystem (`path` or `file://path`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryChartLoader;

#[async_trait]
impl ChartLoader for DirectoryChartLoader {
    async fn load(&self, uri: &str) -> Result<Chart, LoadError> {
        let root = local_path(uri)?;
        let files = tokio::task::spawn_blocking(move || read_chart_dir(&root))
            .await
            .map_err(|e| LoadError::Task(e.to_string()))??;
        Chart::from_files(files)
    }
}

fn local_path(uri: &str) -> Result<PathBuf, LoadError> {
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if uri.contains("://") {
        return Err(LoadError::UnsupportedUri(uri.to_string()));
    }
    Ok(PathBuf::from(uri))
}

fn read_chart_dir(root: &Path) -> Result<BTreeMap<String, String>, LoadError> {
    if !root.is_dir() {
        return Err(LoadError::NotFound(root.display().to_string()));
    }
    let mut files = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|source| LoadError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| LoadError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let bytes = std::fs::read(&path).map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            })?;
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(relative, String::from_utf8_lossy(&bytes).into_owned());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    const CHART_YAML: &str = "apiVersion: v2\nname: demo\nversion: 0.1.0\nkubeVersion: '>=1.20.0'\n";

    #[test]
    fn test_from_files_parses_metadata() {
        let chart = Chart::from_files(files(&[(CHART_FILE, CHART_YAML)])).unwrap();
        assert_eq!(chart.metadata.api_version, "v2");
        assert_eq!(chart.metadata.name, "demo");
        assert_eq!(chart.metadata.kube_version.as_deref(), Some(">=1.20.0"));
        assert_eq!(chart.digest.len(), 64);
    }

    #[test]
    fn test_missing_chart_file() {
        let err = Chart::from_files(files(&[("README.md", "hi")])).unwrap_err();
        assert!(matches!(err, LoadError::MissingChartFile));
    }

    #[test]
    fn test_invalid_chart_file() {
        let err = Chart::from_files(files(&[(CHART_FILE, "name: [unterminated")])).unwrap_err();
        assert!(matches!(err, LoadError::InvalidChartFile(_)));
    }

    #[test]
    fn test_files_under_prefix() {
        let chart = Chart::from_files(files(&[
            (CHART_FILE, CHART_YAML),
            ("templates/deployment.yaml", "kind: Deployment"),
            ("templates/tests/test-connection.yaml", "kind: Pod"),
            ("values.yaml", ""),
        ]))
        .unwrap();
        let tests: Vec<&str> = chart.files_under("templates/tests/").map(|(p, _)| p).collect();
        assert_eq!(tests, vec!["templates/tests/test-connection.yaml"]);
        assert_eq!(chart.files_under("templates/").count(), 2);
        assert_eq!(chart.files_under("crds/").count(), 0);
    }

    #[test]
    fn test_digest_deterministic_and_content_sensitive() {
        let a = Chart::from_files(files(&[(CHART_FILE, CHART_YAML), ("values.yaml", "a: 1")])).unwrap();
        let b = Chart::from_files(files(&[(CHART_FILE, CHART_YAML), ("values.yaml", "a: 1")])).unwrap();
        let c = Chart::from_files(files(&[(CHART_FILE, CHART_YAML), ("values.yaml", "a: 2")])).unwrap();
        assert_eq!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
    }

    #[test]
    fn test_remote_uri_unsupported() {
        assert!(matches!(
            local_path("https://example.com/chart.tgz"),
            Err(LoadError::UnsupportedUri(_))
        ));
        assert_eq!(local_path("file:///tmp/chart").unwrap(), PathBuf::from("/tmp/chart"));
    }

    #[tokio::test]
    async fn test_directory_loader_reads_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CHART_FILE), CHART_YAML).unwrap();
        std::fs::create_dir_all(dir.path().join("templates/tests")).unwrap();
        std::fs::write(dir.path().join("templates/tests/t.yaml"), "kind: Pod").unwrap();

        let chart = DirectoryChartLoader
            .load(dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert!(chart.has_file("templates/tests/t.yaml"));
        assert!(chart.has_file(CHART_FILE));
    }

    #[tokio::test]
    async fn test_directory_loader_missing_dir() {
        let err = DirectoryChartLoader
            .load("/definitely/not/a/chart/dir")
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }
}
