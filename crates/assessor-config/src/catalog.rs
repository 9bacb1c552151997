//! TOML task catalog.
//!
//! A `CatalogConfig` holds one `[[families]]` entry per task family: the
//! instruction sent to the agent, the expected answer, and the scoring rule.
//! `TaskCatalog` loads it and implements `ReferenceSolutionProvider`.
//!
//! Example:
//! ```toml
//! [[families]]
//! id = "task4_1"
//! prompt = "What is the most recent magnesium level for patient S2874099?"
//! expected = 2.3
//! rule = "tolerance-numeric"
//! params = { relative = 0.01 }
//! ```

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use assessor_contracts::{
    error::{AssessorError, AssessorResult},
    verdict::{default_pass_threshold, family_name, ReferenceSolution},
};
use assessor_core::traits::ReferenceSolutionProvider;

/// One task family as written in the catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyEntry {
    /// Family id, e.g. `"task2_1"`. Must be unique within the catalog.
    pub id: String,

    /// Display name. Derived from the id prefix when absent.
    #[serde(default)]
    pub name: Option<String>,

    /// Instruction text sent to the agent when the request has none.
    #[serde(default)]
    pub prompt: Option<String>,

    pub expected: Value,

    /// Registered scoring-rule name.
    pub rule: String,

    #[serde(default)]
    pub params: Value,

    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
}

impl FamilyEntry {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| family_name(&self.id))
    }

    fn solution(&self) -> ReferenceSolution {
        ReferenceSolution {
            family: self.id.clone(),
            expected: self.expected.clone(),
            rule: self.rule.clone(),
            params: self.params.clone(),
            pass_threshold: self.pass_threshold,
        }
    }
}

/// Top-level structure of a catalog file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub families: Vec<FamilyEntry>,
}

/// Immutable, in-memory reference-solution store.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    /// Declaration order, for listing.
    order: Vec<String>,
    families: HashMap<String, FamilyEntry>,
}

impl TaskCatalog {
    /// Build a catalog, rejecting duplicate ids and out-of-range thresholds.
    pub fn from_config(config: CatalogConfig) -> AssessorResult<Self> {
        let mut catalog = Self::default();
        for entry in config.families {
            if !(0.0..=1.0).contains(&entry.pass_threshold) {
                return Err(AssessorError::ConfigError {
                    reason: format!(
                        "family '{}' has pass_threshold {} outside [0, 1]",
                        entry.id, entry.pass_threshold
                    ),
                });
            }
            if entry.rule.trim().is_empty() {
                return Err(AssessorError::ConfigError {
                    reason: format!("family '{}' names no scoring rule", entry.id),
                });
            }
            if catalog.families.contains_key(&entry.id) {
                return Err(AssessorError::ConfigError {
                    reason: format!("family '{}' is declared more than once", entry.id),
                });
            }
            catalog.order.push(entry.id.clone());
            catalog.families.insert(entry.id.clone(), entry);
        }
        debug!(families = catalog.order.len(), "task catalog loaded");
        Ok(catalog)
    }

    /// Parse `s` as TOML and build a `TaskCatalog`.
    ///
    /// Returns `AssessorError::ConfigError` if the TOML is malformed or does
    /// not match `CatalogConfig`.
    pub fn from_toml_str(s: &str) -> AssessorResult<Self> {
        let config: CatalogConfig = toml::from_str(s).map_err(|e| AssessorError::ConfigError {
            reason: format!("failed to parse catalog TOML: {}", e),
        })?;
        Self::from_config(config)
    }

    pub fn from_file(path: &Path) -> AssessorResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AssessorError::ConfigError {
            reason: format!("failed to read catalog file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn get(&self, id: &str) -> Option<&FamilyEntry> {
        self.families.get(id)
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = &FamilyEntry> {
        self.order.iter().filter_map(|id| self.families.get(id))
    }

    /// Fail on the first family whose rule `is_known` rejects.
    pub fn check_rules<F>(&self, is_known: F) -> AssessorResult<()>
    where
        F: Fn(&str) -> bool,
    {
        match self.entries().find(|e| !is_known(&e.rule)) {
            Some(entry) => Err(AssessorError::ConfigError {
                reason: format!(
                    "family '{}' uses unregistered scoring rule '{}'",
                    entry.id, entry.rule
                ),
            }),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl ReferenceSolutionProvider for TaskCatalog {
    fn lookup(&self, family: &str) -> AssessorResult<ReferenceSolution> {
        self.families
            .get(family)
            .map(FamilyEntry::solution)
            .ok_or_else(|| AssessorError::SolutionMissing {
                family: family.to_string(),
            })
    }

    fn prompt_for(&self, family: &str) -> Option<String> {
        self.families.get(family).and_then(|e| e.prompt.clone())
    }
}
