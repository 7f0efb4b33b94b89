//! Registry of named, versioned checks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::check::{Check, CheckId};
use crate::error::DuplicateCheckError;
use crate::version::CheckVersion;

/// A check together with the identity it was registered under.
#[derive(Clone)]
pub struct RegisteredCheck {
    pub id: CheckId,
    pub check: Arc<dyn Check>,
}

impl fmt::Debug for RegisteredCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCheck").field("id", &self.id).finish()
    }
}

/// One entry per check name, chosen for a requested version bound.
pub type CheckSet = BTreeMap<String, RegisteredCheck>;

/// Catalog of every known check across all versions.
///
/// Populated once, then only read; lookups never mutate it.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    checks: BTreeMap<String, Vec<RegisteredCheck>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `check` as `(name, version)`.
    pub fn add(
        &mut self,
        name: &str,
        version: CheckVersion,
        check: Arc<dyn Check>,
    ) -> Result<(), DuplicateCheckError> {
        let versions = self.checks.entry(name.to_string()).or_default();
        match versions.binary_search_by(|c| c.id.version.cmp(&version)) {
            Ok(_) => Err(DuplicateCheckError {
                name: name.to_string(),
                version,
            }),
            Err(pos) => {
                versions.insert(
                    pos,
                    RegisteredCheck {
                        id: CheckId::new(name, version),
                        check,
                    },
                );
                Ok(())
            }
        }
    }

    /// Every version registered under `name`, ascending. Empty means the
    /// name is unknown.
    pub fn lookup(&self, name: &str) -> &[RegisteredCheck] {
        self.checks.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// One check per name: the highest version not exceeding `bound`, or the
    /// lowest registered version when no bound is given. Names with no
    /// version at or below `bound` are left out.
    pub fn all_checks(&self, bound: Option<&CheckVersion>) -> CheckSet {
        self.checks
            .iter()
            .filter_map(|(name, versions)| {
                let chosen = match bound {
                    Some(bound) => versions.iter().rev().find(|c| &c.id.version <= bound),
                    None => versions.first(),
                };
                chosen.map(|c| (name.clone(), c.clone()))
            })
            .collect()
    }

    /// Registered check names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.keys().map(String::as_str)
    }

    /// Every registered identifier, sorted by name then version.
    pub fn ids(&self) -> impl Iterator<Item = &CheckId> {
        self.checks.values().flatten().map(|c| &c.id)
    }

    pub fn len(&self) -> usize {
        self.checks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
