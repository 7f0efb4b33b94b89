//! Checks that only inspect the chart's files.

use anyhow::Result;

use crate::chart::Chart;
use crate::check::{CheckOptions, CheckResult};

pub const README_EXISTS: &str = "Chart has a README";
pub const README_MISSING: &str = "Chart does not have a README";
pub const HELM3_REASON: &str = "API version is V2, used in Helm 3";
pub const NOT_HELM3_REASON: &str = "API version is not V2, used in Helm 3";
pub const TEST_FILES_EXIST: &str = "Chart test files exist";
pub const TEST_FILES_MISSING: &str = "Chart test files do not exist";
pub const VALUES_FILE_EXISTS: &str = "Values file exist";
pub const VALUES_FILE_MISSING: &str = "Values file does not exist";
pub const VALUES_SCHEMA_EXISTS: &str = "Values schema file exist";
pub const VALUES_SCHEMA_MISSING: &str = "Values schema file does not exist";
pub const KUBE_VERSION_DEFINED: &str = "Kubernetes version specified";
pub const KUBE_VERSION_MISSING: &str = "Kubernetes version is not specified";
pub const NO_CRDS: &str = "Chart does not contain CRDs";
pub const CONTAINS_CRDS: &str = "Chart contains CRDs";
pub const NO_CSI_OBJECTS: &str = "CSI objects do not exist";
pub const CONTAINS_CSI_OBJECTS: &str = "CSI objects exist";

const TEMPLATES_DIR: &str = "templates/";
const TESTS_DIR: &str = "templates/tests/";
const CRDS_DIR: &str = "crds/";

fn verdict(ok: bool, pass: &str, fail: &str) -> CheckResult {
    if ok {
        CheckResult::pass(pass)
    } else {
        CheckResult::fail(fail)
    }
}

/// Whether any template declares a resource of `kind`.
fn templates_declare(chart: &Chart, kind: &str) -> bool {
    let needle = format!("kind: {kind}");
    chart
        .files_under(TEMPLATES_DIR)
        .any(|(_, content)| content.lines().any(|line| line.trim() == needle))
}

pub fn has_readme(options: &CheckOptions<'_>) -> Result<CheckResult> {
    Ok(verdict(
        options.chart.has_file("README.md"),
        README_EXISTS,
        README_MISSING,
    ))
}

pub fn is_helm_v3(options: &CheckOptions<'_>) -> Result<CheckResult> {
    Ok(verdict(
        options.chart.metadata.api_version == "v2",
        HELM3_REASON,
        NOT_HELM3_REASON,
    ))
}

pub fn contains_test(options: &CheckOptions<'_>) -> Result<CheckResult> {
    let found = options.chart.files_under(TESTS_DIR).next().is_some();
    Ok(verdict(found, TEST_FILES_EXIST, TEST_FILES_MISSING))
}

pub fn contains_values(options: &CheckOptions<'_>) -> Result<CheckResult> {
    Ok(verdict(
        options.chart.has_file("values.yaml"),
        VALUES_FILE_EXISTS,
        VALUES_FILE_MISSING,
    ))
}

pub fn contains_values_schema(options: &CheckOptions<'_>) -> Result<CheckResult> {
    Ok(verdict(
        options.chart.has_file("values.schema.json"),
        VALUES_SCHEMA_EXISTS,
        VALUES_SCHEMA_MISSING,
    ))
}

pub fn has_kube_version(options: &CheckOptions<'_>) -> Result<CheckResult> {
    let defined = options
        .chart
        .metadata
        .kube_version
        .as_deref()
        .is_some_and(|v| !v.trim().is_empty());
    Ok(verdict(defined, KUBE_VERSION_DEFINED, KUBE_VERSION_MISSING))
}

/// Stricter `has-kubeversion`: the constraint must also name at least one
/// concrete Kubernetes version.
pub fn has_kube_version_v1_1(options: &CheckOptions<'_>) -> Result<CheckResult> {
    let Some(constraint) = options
        .chart
        .metadata
        .kube_version
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    else {
        return Ok(CheckResult::fail(KUBE_VERSION_MISSING));
    };

    let names_version = constraint
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .any(|token| {
            let mut parts = token.split('.');
            matches!(
                (parts.next(), parts.next()),
                (Some(major), Some(minor)) if !major.is_empty() && !minor.is_empty()
            )
        });

    if names_version {
        Ok(CheckResult::pass(KUBE_VERSION_DEFINED))
    } else {
        Ok(CheckResult::fail(format!(
            "Kubernetes version constraint does not name a version: {constraint}"
        )))
    }
}

pub fn not_contains_crds(options: &CheckOptions<'_>) -> Result<CheckResult> {
    let chart = options.chart;
    let contains = chart.files_under(CRDS_DIR).next().is_some()
        || templates_declare(chart, "CustomResourceDefinition");
    Ok(verdict(!contains, NO_CRDS, CONTAINS_CRDS))
}

pub fn not_contain_csi_objects(options: &CheckOptions<'_>) -> Result<CheckResult> {
    let contains = templates_declare(options.chart, "CSIDriver");
    Ok(verdict(!contains, NO_CSI_OBJECTS, CONTAINS_CSI_OBJECTS))
}
