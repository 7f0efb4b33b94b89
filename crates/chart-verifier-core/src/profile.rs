//! Verifier profiles: per-vendor allow-lists of checks.
//!
//! A profile is a YAML document naming the checks in scope for a vendor
//! category, with an optional check type and configuration per check.
//! Profiles are validated when loaded; a malformed document fails the whole
//! load and that error is handed to every subsequent build.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::check::{Check, CheckId, CheckRef, CheckType};
use crate::registry::CheckSet;
use crate::version::CheckVersion;

pub const PROFILE_KIND: &str = "verifier-profile";
pub const DEFAULT_VENDOR_TYPE: &str = "partner";

/// Override key selecting the profile vendor type.
pub const PROFILE_VENDOR_TYPE_KEY: &str = "profile.vendortype";
/// Override key selecting the profile version.
pub const PROFILE_VERSION_KEY: &str = "profile.version";

const EMBEDDED_PROFILES: &[(&str, &str)] = &[
    (
        "profile-partner-1.0.yaml",
        include_str!("../profiles/profile-partner-1.0.yaml"),
    ),
    (
        "profile-partner-1.1.yaml",
        include_str!("../profiles/profile-partner-1.1.yaml"),
    ),
    (
        "profile-redhat-1.1.yaml",
        include_str!("../profiles/profile-redhat-1.1.yaml"),
    ),
    (
        "profile-community-1.1.yaml",
        include_str!("../profiles/profile-community-1.1.yaml"),
    ),
];

/// Profile load and selection failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("failed to parse profile {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("failed to read profile data from {path}: {message}")]
    Io { path: String, message: String },

    #[error("profile {profile} has kind '{kind}', expected 'verifier-profile'")]
    WrongKind { profile: String, kind: String },

    #[error("profile {0} lists no checks")]
    Empty(String),

    #[error("profile {profile} lists check {check} more than once")]
    DuplicateCheck { profile: String, check: String },

    #[error("no profiles loaded")]
    NoProfiles,

    #[error("no profile found for vendor type {0}")]
    NotFound(String),
}

/// One check entry in a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileCheck {
    pub name: CheckRef,

    #[serde(rename = "type", default)]
    pub check_type: CheckType,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
}

/// A named, versioned allow-list of checks for one vendor category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub apiversion: String,
    pub kind: String,
    pub name: String,
    #[serde(rename = "vendorType")]
    pub vendor_type: String,
    pub version: CheckVersion,
    pub checks: Vec<ProfileCheck>,
}

/// Profile identity recorded on reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub name: String,
    pub vendor_type: String,
    pub version: String,
}

impl Profile {
    /// Parse and validate one profile document.
    pub fn parse(source_name: &str, yaml: &str) -> Result<Self, ProfileError> {
        let profile: Profile = serde_yaml::from_str(yaml).map_err(|e| ProfileError::Parse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<(), ProfileError> {
        if self.kind != PROFILE_KIND {
            return Err(ProfileError::WrongKind {
                profile: self.name.clone(),
                kind: self.kind.clone(),
            });
        }
        if self.checks.is_empty() {
            return Err(ProfileError::Empty(self.name.clone()));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.checks {
            if !seen.insert(entry.name.name.as_str()) {
                return Err(ProfileError::DuplicateCheck {
                    profile: self.name.clone(),
                    check: entry.name.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn info(&self) -> ProfileInfo {
        ProfileInfo {
            name: self.name.clone(),
            vendor_type: self.vendor_type.clone(),
            version: self.version.to_string(),
        }
    }

    /// Intersect `all` with this profile's allow-list.
    ///
    /// Names the registry does not know are skipped with one warning each,
    /// so a profile may reference checks this build does not ship yet.
    pub fn filter_checks(&self, all: &CheckSet) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();

        for entry in &self.checks {
            let Some(registered) = all.get(&entry.name.name) else {
                outcome.warn(ProfileWarning::UnknownCheck {
                    name: entry.name.name.clone(),
                });
                continue;
            };

            if let Some(min) = &entry.name.min_version {
                if registered.id.version < *min {
                    outcome.warn(ProfileWarning::BelowMinimumVersion {
                        name: entry.name.name.clone(),
                        required: min.clone(),
                        available: registered.id.version.clone(),
                    });
                    continue;
                }
            }

            outcome.checks.insert(FilteredCheck {
                id: registered.id.clone(),
                check: Arc::clone(&registered.check),
                check_type: entry.check_type,
                config: entry.config.clone(),
            });
        }

        debug!(
            profile = %self.name,
            selected = outcome.checks.len(),
            warnings = outcome.warnings.len(),
            "Filtered checks by profile"
        );
        outcome
    }
}

/// Non-fatal findings while filtering checks through a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileWarning {
    UnknownCheck {
        name: String,
    },
    BelowMinimumVersion {
        name: String,
        required: CheckVersion,
        available: CheckVersion,
    },
}

impl fmt::Display for ProfileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCheck { name } => {
                write!(f, "profile references unknown check '{name}'")
            }
            Self::BelowMinimumVersion {
                name,
                required,
                available,
            } => write!(
                f,
                "profile requires check '{name}' at {required} or later, only {available} is available"
            ),
        }
    }
}

/// A check selected for a run, with its profile-assigned type and config.
#[derive(Clone)]
pub struct FilteredCheck {
    pub id: CheckId,
    pub check: Arc<dyn Check>,
    pub check_type: CheckType,
    pub config: BTreeMap<String, Value>,
}

impl fmt::Debug for FilteredCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredCheck")
            .field("id", &self.id)
            .field("check_type", &self.check_type)
            .field("config", &self.config)
            .finish()
    }
}

/// Per-run mapping from check name to the selected check.
///
/// Iteration order is unspecified; the builder fixes execution order.
#[derive(Debug, Clone, Default)]
pub struct FilteredRegistry {
    checks: HashMap<String, FilteredCheck>,
}

impl FilteredRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every check in `all` as mandatory with no per-check config.
    pub fn from_check_set(all: &CheckSet) -> Self {
        let mut filtered = Self::new();
        for registered in all.values() {
            filtered.insert(FilteredCheck {
                id: registered.id.clone(),
                check: Arc::clone(&registered.check),
                check_type: CheckType::Mandatory,
                config: BTreeMap::new(),
            });
        }
        filtered
    }

    pub fn insert(&mut self, check: FilteredCheck) -> Option<FilteredCheck> {
        self.checks.insert(check.id.name.clone(), check)
    }

    pub fn get(&self, name: &str) -> Option<&FilteredCheck> {
        self.checks.get(name)
    }

    /// Keep only `names`. Returns the subset and the names that matched
    /// nothing.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> (Self, Vec<String>) {
        let mut selected = Self::new();
        let mut unknown = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.checks.get(name) {
                Some(check) => {
                    selected.insert(check.clone());
                }
                None => unknown.push(name.to_string()),
            }
        }
        (selected, unknown)
    }

    pub fn checks(&self) -> impl Iterator<Item = &FilteredCheck> {
        self.checks.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

/// Result of [`Profile::filter_checks`].
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub checks: FilteredRegistry,
    pub warnings: Vec<ProfileWarning>,
}

impl FilterOutcome {
    fn warn(&mut self, warning: ProfileWarning) {
        if !self.warnings.contains(&warning) {
            warn!(warning = %warning, "Profile filter warning");
            self.warnings.push(warning);
        }
    }
}

/// Outcome of loading profile data, success or the error every build reports.
pub type ProfileLoad = Result<ProfileCatalog, ProfileError>;

/// All loaded profiles.
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    profiles: Vec<Profile>,
}

impl ProfileCatalog {
    /// Parse `(source name, yaml)` documents; the first bad one fails the load.
    pub fn from_documents<'a>(
        documents: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ProfileError> {
        let profiles = documents
            .into_iter()
            .map(|(source, yaml)| Profile::parse(source, yaml))
            .collect::<Result<Vec<_>, _>>()?;
        if profiles.is_empty() {
            return Err(ProfileError::NoProfiles);
        }
        Ok(Self { profiles })
    }

    /// Load every `*.yaml` / `*.yml` file in `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, ProfileError> {
        let io_error = |path: &Path, e: std::io::Error| ProfileError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
            let path = entry.map_err(|e| io_error(dir, e))?.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in &paths {
            let text = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
            documents.push((path.display().to_string(), text));
        }
        Self::from_documents(documents.iter().map(|(s, t)| (s.as_str(), t.as_str())))
    }

    /// Profiles compiled into the binary, parsed once per process.
    pub fn embedded() -> &'static ProfileLoad {
        static EMBEDDED: OnceLock<ProfileLoad> = OnceLock::new();
        EMBEDDED.get_or_init(|| Self::from_documents(EMBEDDED_PROFILES.iter().copied()))
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Pick the profile for `vendor_type` (default `partner`) at `version`,
    /// or the highest version for that vendor when none is requested or the
    /// requested one does not exist.
    pub fn select(
        &self,
        vendor_type: Option<&str>,
        version: Option<&str>,
    ) -> Result<&Profile, ProfileError> {
        let vendor = vendor_type
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VENDOR_TYPE);

        let candidates: Vec<&Profile> = self
            .profiles
            .iter()
            .filter(|p| p.vendor_type.eq_ignore_ascii_case(vendor))
            .collect();

        if let Some(requested) = version {
            match CheckVersion::parse(requested) {
                Ok(requested) => {
                    if let Some(exact) = candidates.iter().copied().find(|p| p.version == requested) {
                        return Ok(exact);
                    }
                    warn!(vendor_type = %vendor, version = %requested, "Profile version not found, using latest");
                }
                Err(e) => warn!(error = %e, "Ignoring unparsable profile version"),
            }
        }

        candidates
            .into_iter()
            .max_by(|a, b| a.version.cmp(&b.version))
            .ok_or_else(|| ProfileError::NotFound(vendor.to_string()))
    }
}
