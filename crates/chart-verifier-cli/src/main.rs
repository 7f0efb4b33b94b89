//! Chart Verifier CLI
//!
//! The `chart-verifier` command certifies a chart against a vendor profile.
//!
//! ## Commands
//!
//! - `verify`: Run the selected checks against a chart and print the report
//! - `list`: Show registered checks and available profiles

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn, Level};

use chart_verifier_core::{
    default_registry, run, EnvSettings, ProfileCatalog, ProfileLoad, Report,
    RunOptions, VerifierConfig,
};

#[derive(Parser)]
#[command(name = "chart-verifier")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify that a chart meets certification requirements", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Load profiles from this directory instead of the built-in set
    #[arg(long, global = true, env = "CHART_VERIFIER_PROFILES_DIR")]
    profiles_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a chart directory
    Verify {
        /// Chart location (directory path or file:// URI)
        chart_uri: String,

        /// Only run these checks (repeatable, comma-separated)
        #[arg(short = 'e', long = "enable", value_delimiter = ',')]
        enable: Vec<String>,

        /// Skip these checks (repeatable, comma-separated)
        #[arg(short = 'x', long = "disable", value_delimiter = ',')]
        disable: Vec<String>,

        /// Override a config value, e.g. `-S profile.vendortype=redhat`
        #[arg(short = 'S', long = "set")]
        set: Vec<String>,

        /// YAML file with chart values
        #[arg(long)]
        values: Option<PathBuf>,

        /// YAML file with base verifier config
        #[arg(long)]
        config: Option<PathBuf>,

        /// Platform version to certify against when the cluster cannot tell
        #[arg(long, env = "CHART_VERIFIER_PLATFORM_VERSION")]
        platform_version: Option<String>,

        /// The chart is delivered by the provider rather than published
        #[arg(long)]
        provider_delivery: bool,

        /// Overall run timeout in seconds
        #[arg(long, env = "CHART_VERIFIER_TIMEOUT", default_value_t = 1800)]
        timeout: u64,

        /// Namespace used by cluster checks
        #[arg(short, long, env = "CHART_VERIFIER_NAMESPACE")]
        namespace: Option<String>,

        /// Report output format
        #[arg(short, long, value_enum, default_value = "summary")]
        output: OutputFormat,
    },

    /// List registered checks and available profiles
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    chart_verifier_core::init_tracing(cli.json, level);

    let profiles = load_profiles(cli.profiles_dir).await?;

    match cli.command {
        Commands::Verify {
            chart_uri,
            enable,
            disable,
            set,
            values,
            config,
            platform_version,
            provider_delivery,
            timeout,
            namespace,
            output,
        } => {
            let mut settings = EnvSettings::from_env();
            if let Some(namespace) = namespace {
                settings.namespace = namespace;
            }
            let options = RunOptions {
                enabled: enable,
                disabled: disable,
                values: read_yaml_map(values.as_deref())?,
                config: VerifierConfig::from(read_yaml_map(config.as_deref())?),
                overrides: set,
                platform_version,
                provider_delivery,
                timeout: Some(Duration::from_secs(timeout)),
                settings,
                ..RunOptions::new(chart_uri)
            };
            cmd_verify(options, &profiles, output).await
        }
        Commands::List => cmd_list(&profiles),
    }
}

/// Load the profile catalog, reading a directory off the runtime threads.
async fn load_profiles(dir: Option<PathBuf>) -> Result<ProfileLoad> {
    match dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Loading profiles");
            tokio::task::spawn_blocking(move || ProfileCatalog::load_dir(&dir))
                .await
                .context("Profile loading task failed")
        }
        None => Ok(ProfileCatalog::embedded().clone()),
    }
}

/// Read an optional YAML mapping file; absent means empty.
fn read_yaml_map(path: Option<&Path>) -> Result<BTreeMap<String, Value>> {
    let Some(path) = path else {
        return Ok(BTreeMap::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_yaml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn cmd_verify(options: RunOptions, profiles: &ProfileLoad, output: OutputFormat) -> Result<()> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling verification");
            let _ = cancel_tx.send(true);
        }
    });

    let options = RunOptions {
        cancel: Some(cancel_rx),
        ..options
    };
    let report = run(options, profiles).await.context("Verification failed")?;

    print_report(&report, output)?;

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &Report, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Summary => print!("{}", report.summary()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(report)?),
    }
    Ok(())
}

fn cmd_list(profiles: &ProfileLoad) -> Result<()> {
    let registry = default_registry()?;

    println!("Checks:");
    for id in registry.ids() {
        println!("  {id}");
    }

    match profiles {
        Ok(catalog) => {
            println!("Profiles:");
            for profile in catalog.profiles() {
                println!(
                    "  {} {} (vendor type: {}, {} checks)",
                    profile.name,
                    profile.version,
                    profile.vendor_type,
                    profile.checks.len()
                );
            }
        }
        Err(e) => println!("Profiles unavailable: {e}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_verify() {
        let cli = Cli::try_parse_from([
            "chart-verifier",
            "verify",
            "charts/demo",
            "-e",
            "has-readme,is-helm-v3",
            "-x",
            "chart-testing",
            "-S",
            "profile.vendortype=redhat",
            "--timeout",
            "60",
            "--output",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Verify {
                chart_uri,
                enable,
                disable,
                set,
                timeout,
                output,
                ..
            } => {
                assert_eq!(chart_uri, "charts/demo");
                assert_eq!(enable, vec!["has-readme", "is-helm-v3"]);
                assert_eq!(disable, vec!["chart-testing"]);
                assert_eq!(set, vec!["profile.vendortype=redhat"]);
                assert_eq!(timeout, 60);
                assert!(matches!(output, OutputFormat::Json));
            }
            Commands::List => panic!("expected verify"),
        }
    }

    #[test]
    fn test_read_yaml_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "namespace: ct\nupgrade: true\n").unwrap();

        let map = read_yaml_map(Some(&path)).unwrap();
        assert_eq!(map.get("namespace"), Some(&Value::from("ct")));
        assert_eq!(map.get("upgrade"), Some(&Value::from(true)));
        assert!(read_yaml_map(None).unwrap().is_empty());
        assert!(read_yaml_map(Some(&dir.path().join("missing.yaml"))).is_err());
    }

    #[tokio::test]
    async fn test_embedded_profiles_load() {
        assert!(load_profiles(None).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_profiles_dir_loads_off_runtime() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("partner.yaml"),
            "apiversion: v1\nkind: verifier-profile\nvendorType: partner\nname: partner\nversion: v1.0\nchecks:\n  - name: v1.0/has-readme\n    type: Mandatory\n",
        )
        .unwrap();

        let catalog = load_profiles(Some(dir.path().to_path_buf()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(catalog.profiles().len(), 1);

        let missing = load_profiles(Some(dir.path().join("nope"))).await.unwrap();
        assert!(missing.is_err());
    }
}
