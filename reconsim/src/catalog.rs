// src/catalog.rs
//
// Scenario catalog: an immutable, validated collection of scenarios split
// into train / test sets.
//
// Persisted format is one `CatalogFile` per split, JSON or YAML by file
// extension. Scenarios are validated on load (see `Scenario::from_record`)
// and shared as `Arc<Scenario>` so episode state can hold a read-only handle
// without copying outcome tables.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::scenario::{Scenario, ScenarioRecord};

/// Persisted catalog schema version.
pub const CATALOG_SCHEMA_VERSION: u32 = 1;

/// Train / test split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Train, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            other => Err(format!("unknown split '{other}' (expected train|test)")),
        }
    }
}

/// On-disk representation of one split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub schema_version: u32,
    pub split: Split,
    pub scenarios: Vec<ScenarioRecord>,
}

/// Errors that can occur when loading or querying a catalog.
#[derive(Debug, Clone)]
pub enum CatalogError {
    Io { path: String, source: String },
    Parse { format: &'static str, source: String },
    MalformedScenario { scenario_id: String, message: String },
    EmptyCatalog { split: Split },
    UnknownScenario { id: String },
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io { path, source } => {
                write!(f, "Failed to access catalog file '{}': {}", path, source)
            }
            CatalogError::Parse { format, source } => {
                write!(f, "Failed to parse catalog {}: {}", format, source)
            }
            CatalogError::MalformedScenario {
                scenario_id,
                message,
            } => write!(f, "Malformed scenario '{}': {}", scenario_id, message),
            CatalogError::EmptyCatalog { split } => {
                write!(f, "Catalog split '{}' has no scenarios", split)
            }
            CatalogError::UnknownScenario { id } => write!(f, "Unknown scenario id '{}'", id),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Immutable scenario catalog holding both splits.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    splits: BTreeMap<Split, Vec<Arc<Scenario>>>,
    by_id: BTreeMap<String, (Split, usize)>,
}

impl ScenarioCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a parsed catalog file.
    pub fn from_file(file: CatalogFile) -> Result<Self, CatalogError> {
        if file.schema_version != CATALOG_SCHEMA_VERSION {
            return Err(CatalogError::Parse {
                format: "schema",
                source: format!(
                    "unsupported schema_version {} (supported: {})",
                    file.schema_version, CATALOG_SCHEMA_VERSION
                ),
            });
        }
        let mut catalog = Self::new();
        for record in file.scenarios {
            catalog.insert(file.split, Scenario::from_record(record)?)?;
        }
        Ok(catalog)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json).map_err(|e| CatalogError::Parse {
            format: "JSON",
            source: e.to_string(),
        })?;
        Self::from_file(file)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(yaml).map_err(|e| CatalogError::Parse {
            format: "YAML",
            source: e.to_string(),
        })?;
        Self::from_file(file)
    }

    /// Load one split file; `.json` is parsed as JSON, anything else as YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            source: e.to_string(),
        })?;
        let catalog = if is_json(path) {
            Self::from_json_str(&contents)?
        } else {
            Self::from_yaml_str(&contents)?
        };
        eprintln!(
            "[catalog] loaded={} train={} test={} path={}",
            catalog.len(),
            catalog.split_len(Split::Train),
            catalog.split_len(Split::Test),
            path.display()
        );
        Ok(catalog)
    }

    /// Load several split files into one catalog.
    pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for path in paths {
            catalog = catalog.merge(Self::load(path)?)?;
        }
        Ok(catalog)
    }

    /// Combine two catalogs; ids must stay unique across both.
    pub fn merge(mut self, other: ScenarioCatalog) -> Result<Self, CatalogError> {
        for (split, scenarios) in other.splits {
            for scenario in scenarios {
                self.insert_shared(split, scenario)?;
            }
        }
        Ok(self)
    }

    /// Add one validated scenario to a split.
    pub fn insert(&mut self, split: Split, scenario: Scenario) -> Result<(), CatalogError> {
        self.insert_shared(split, Arc::new(scenario))
    }

    fn insert_shared(&mut self, split: Split, scenario: Arc<Scenario>) -> Result<(), CatalogError> {
        if self.by_id.contains_key(scenario.id()) {
            return Err(CatalogError::MalformedScenario {
                scenario_id: scenario.id().to_string(),
                message: "duplicate scenario id".to_string(),
            });
        }
        let list = self.splits.entry(split).or_default();
        self.by_id
            .insert(scenario.id().to_string(), (split, list.len()));
        list.push(scenario);
        Ok(())
    }

    /// Uniformly sample a scenario from a split.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        split: Split,
    ) -> Result<Arc<Scenario>, CatalogError> {
        let list = self.scenarios(split);
        if list.is_empty() {
            return Err(CatalogError::EmptyCatalog { split });
        }
        let idx = rng.gen_range(0..list.len());
        Ok(Arc::clone(&list[idx]))
    }

    /// Explicit selection by id (either split).
    pub fn get(&self, id: &str) -> Result<Arc<Scenario>, CatalogError> {
        let (split, idx) = self
            .by_id
            .get(id)
            .ok_or_else(|| CatalogError::UnknownScenario { id: id.to_string() })?;
        Ok(Arc::clone(&self.splits[split][*idx]))
    }

    pub fn split_of(&self, id: &str) -> Option<Split> {
        self.by_id.get(id).map(|(split, _)| *split)
    }

    pub fn scenarios(&self, split: Split) -> &[Arc<Scenario>] {
        self.splits.get(&split).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids(&self, split: Split) -> Vec<&str> {
        self.scenarios(split).iter().map(|s| s.id()).collect()
    }

    pub fn split_len(&self, split: Split) -> usize {
        self.scenarios(split).len()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Persisted form of one split.
    pub fn to_file(&self, split: Split) -> CatalogFile {
        CatalogFile {
            schema_version: CATALOG_SCHEMA_VERSION,
            split,
            scenarios: self.scenarios(split).iter().map(|s| s.to_record()).collect(),
        }
    }

    /// Write one split; format chosen by extension like `load`.
    pub fn write_split<P: AsRef<Path>>(&self, split: Split, path: P) -> Result<(), CatalogError> {
        let path = path.as_ref();
        let file = self.to_file(split);
        let contents = if is_json(path) {
            serde_json::to_string_pretty(&file).map_err(|e| CatalogError::Parse {
                format: "JSON",
                source: e.to_string(),
            })?
        } else {
            serde_yaml::to_string(&file).map_err(|e| CatalogError::Parse {
                format: "YAML",
                source: e.to_string(),
            })?
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| CatalogError::Io {
                    path: parent.display().to_string(),
                    source: e.to_string(),
                })?;
            }
        }
        fs::write(path, contents).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            source: e.to_string(),
        })?;
        eprintln!(
            "[catalog] wrote={} split={} path={}",
            file.scenarios.len(),
            split,
            path.display()
        );
        Ok(())
    }

    /// SHA-256 over the canonical JSON of both splits (hex).
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for split in Split::ALL {
            // Serialising plain data structs cannot fail.
            let json = serde_json::to_string(&self.to_file(split)).unwrap_or_default();
            hasher.update(split.as_str().as_bytes());
            hasher.update(json.as_bytes());
        }
        hex(&hasher.finalize())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
