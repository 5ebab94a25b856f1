//! Scenario catalog -- `[[scenario]]` tables loaded from TOML.
//!
//! A catalog path is either one TOML file or a directory whose `*.toml` files
//! are read in lexical order. Every scenario is validated on load and names
//! must be unique across the whole catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{CatalogError, GantryError};
use crate::scenario::{ConnectorKind, Scenario};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    scenario: Vec<Scenario>,
}

/// Validated set of scenarios, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    scenarios: BTreeMap<String, Scenario>,
}

impl Catalog {
    /// Load a catalog file or directory.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, GantryError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GantryError::Catalog(CatalogError::NotFound {
                    path: path.display().to_string(),
                })
            } else {
                GantryError::Io(e)
            }
        })?;

        let files = if metadata.is_dir() {
            let mut files = Vec::new();
            let mut entries = tokio::fs::read_dir(path).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file = entry.path();
                if file.extension().is_some_and(|ext| ext == "toml") {
                    files.push(file);
                }
            }
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut scenarios = Vec::new();
        for file in &files {
            let content = tokio::fs::read_to_string(file).await?;
            let mut parsed = Self::parse_file(&content, &file.display().to_string())?;
            debug!(file = %file.display(), count = parsed.len(), "catalog file loaded");
            scenarios.append(&mut parsed);
        }
        Ok(Self::from_scenarios(scenarios)?)
    }

    /// Parse one catalog document.
    pub fn parse(content: &str, source: &str) -> Result<Self, CatalogError> {
        Self::from_scenarios(Self::parse_file(content, source)?)
    }

    fn parse_file(content: &str, source: &str) -> Result<Vec<Scenario>, CatalogError> {
        let file: CatalogFile = toml::from_str(content).map_err(|e| CatalogError::ParseFailed {
            path: source.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(file.scenario)
    }

    /// Validate scenarios and index them by name.
    pub fn from_scenarios(scenarios: Vec<Scenario>) -> Result<Self, CatalogError> {
        let mut map = BTreeMap::new();
        for scenario in scenarios {
            scenario.validate()?;
            if map.contains_key(&scenario.name) {
                return Err(CatalogError::DuplicateName {
                    name: scenario.name,
                });
            }
            map.insert(scenario.name.clone(), scenario);
        }
        Ok(Self { scenarios: map })
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.get(name)
    }

    /// Look up scenarios by name, preserving the requested order.
    ///
    /// A name requested twice is selected once, at its first position.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&Scenario>, CatalogError> {
        let mut seen = BTreeSet::new();
        let mut picked = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let scenario = self.get(name).ok_or_else(|| CatalogError::UnknownScenario {
                name: name.to_owned(),
            })?;
            if seen.insert(name) {
                picked.push(scenario);
            } else {
                debug!(scenario = name, "dropping repeated scenario name");
            }
        }
        Ok(picked)
    }

    pub fn by_connector<'a>(
        &'a self,
        connector: &'a ConnectorKind,
    ) -> impl Iterator<Item = &'a Scenario> + 'a {
        self.iter().filter(move |s| &s.connector == connector)
    }

    /// Scenarios sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.values()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
