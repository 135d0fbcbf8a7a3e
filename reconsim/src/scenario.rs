// src/scenario.rs
//
// Scenario schema: one synthetic reconnaissance target with precomputed
// outcome tables for every (stage, mode) pair.
//
// Two representations:
// - ScenarioRecord: the persisted (serde) form, outcome tables as a list
// - Scenario: the validated form, outcome table indexed by (stage, mode),
//   classification derived from the port composition and cached
//
// All validation happens in `Scenario::from_record`; nothing downstream
// re-checks tables at simulation time.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogError;
use crate::types::{Mode, Stage, NUM_MODES, NUM_TOOL_ACTIONS};

/// Port classes used by classification, reward weighting and observation.
pub mod ports {
    /// Ports served by ordinary web front-ends.
    pub const WEB_PORTS: &[u16] = &[80, 443, 3000, 5000, 8080, 8443];
    /// Critical infrastructure ports (remote access, mail, databases, directory).
    pub const INFRA_PORTS: &[u16] = &[
        22, 25, 110, 143, 445, 587, 993, 995, 1433, 3306, 3389, 5432, 6379, 9092, 9200, 27017,
    ];
    /// Database / data-store subset of infrastructure ports.
    pub const DATABASE_PORTS: &[u16] = &[1433, 3306, 5432, 6379, 9200, 27017];
    /// Administrative / CI / monitoring consoles.
    pub const ADMIN_PORTS: &[u16] = &[8443, 9000, 9090, 10000];
    /// Ports at or above this value that are not web ports count as custom.
    pub const CUSTOM_PORT_FLOOR: u16 = 4000;

    pub fn is_web(port: u16) -> bool {
        WEB_PORTS.contains(&port)
    }

    pub fn is_infra(port: u16) -> bool {
        INFRA_PORTS.contains(&port)
    }

    pub fn is_database(port: u16) -> bool {
        DATABASE_PORTS.contains(&port)
    }

    pub fn is_admin(port: u16) -> bool {
        ADMIN_PORTS.contains(&port)
    }

    pub fn is_custom(port: u16) -> bool {
        port >= CUSTOM_PORT_FLOOR && !is_web(port)
    }
}

/// Declared complexity tier of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Complexity {
    /// Normalised tier in (0, 1].
    pub fn normalized(self) -> f32 {
        match self {
            Complexity::Low => 0.25,
            Complexity::Medium => 0.5,
            Complexity::High => 0.75,
            Complexity::VeryHigh => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
            Complexity::VeryHigh => "very_high",
        }
    }
}

/// Target classification, derived from the port composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Only ordinary web ports exposed.
    WebOnly,
    /// Two or more critical infrastructure ports exposed.
    Infrastructure,
    /// Exactly one critical infrastructure port exposed.
    Hybrid,
    /// No infrastructure ports, but non-standard / custom ports.
    Edge,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::WebOnly,
        Classification::Infrastructure,
        Classification::Hybrid,
        Classification::Edge,
    ];

    pub fn derive(port_list: &[u16]) -> Self {
        let infra = port_list.iter().filter(|p| ports::is_infra(**p)).count();
        if infra >= 2 {
            Classification::Infrastructure
        } else if infra == 1 {
            Classification::Hybrid
        } else if !port_list.is_empty() && port_list.iter().all(|p| ports::is_web(*p)) {
            Classification::WebOnly
        } else {
            Classification::Edge
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::WebOnly => "web_only",
            Classification::Infrastructure => "infrastructure",
            Classification::Hybrid => "hybrid",
            Classification::Edge => "edge",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected discoverable totals of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedTotals {
    pub subdomains: u32,
    pub live_endpoints: u32,
    pub open_ports: u32,
    pub critical_services: u32,
}

/// A discovered subdomain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainRecord {
    pub name: String,
    /// Administrative / API / data-store hostnames.
    #[serde(default)]
    pub high_value: bool,
}

/// A live HTTP endpoint found by probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub url: String,
    pub port: u16,
    /// Administrative / API-like endpoints.
    #[serde(default)]
    pub high_value: bool,
    #[serde(default)]
    pub technologies: Vec<String>,
}

/// An open port found by port analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub port: u16,
    pub service: String,
    /// Detected service version, if this mode performs version detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Persisted outcome table entry for one (stage, mode) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub stage: Stage,
    /// Generic (`fast`) or stage-specific (`passive`) mode name.
    pub mode: String,
    pub elapsed_secs: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subdomains: Vec<SubdomainRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<EndpointRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceRecord>,
}

/// Persisted scenario record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub complexity: Complexity,
    pub expected: ExpectedTotals,
    pub ports: Vec<u16>,
    pub outcomes: Vec<OutcomeRecord>,
}

/// Precomputed result payload for one (stage, mode) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub elapsed_secs: f64,
    pub subdomains: Vec<SubdomainRecord>,
    pub endpoints: Vec<EndpointRecord>,
    pub services: Vec<ServiceRecord>,
}

/// Distinct-item counts of an outcome, used for monotonicity checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub subdomains: u32,
    pub high_value_subdomains: u32,
    pub endpoints: u32,
    pub high_value_endpoints: u32,
    pub technologies: u32,
    pub ports: u32,
    pub critical_services: u32,
    pub versions: u32,
}

impl OutcomeCounts {
    /// Field-wise `self <= other`; returns the first violating field name.
    pub fn first_exceeding(&self, other: &OutcomeCounts) -> Option<&'static str> {
        let pairs = [
            ("subdomains", self.subdomains, other.subdomains),
            (
                "high_value_subdomains",
                self.high_value_subdomains,
                other.high_value_subdomains,
            ),
            ("endpoints", self.endpoints, other.endpoints),
            (
                "high_value_endpoints",
                self.high_value_endpoints,
                other.high_value_endpoints,
            ),
            ("technologies", self.technologies, other.technologies),
            ("ports", self.ports, other.ports),
            ("critical_services", self.critical_services, other.critical_services),
            ("versions", self.versions, other.versions),
        ];
        pairs
            .into_iter()
            .find(|(_, lower, higher)| lower > higher)
            .map(|(name, _, _)| name)
    }
}

impl StageOutcome {
    pub fn counts(&self) -> OutcomeCounts {
        let subdomains: BTreeSet<&str> = self.subdomains.iter().map(|s| s.name.as_str()).collect();
        let high_value_subdomains: BTreeSet<&str> = self
            .subdomains
            .iter()
            .filter(|s| s.high_value)
            .map(|s| s.name.as_str())
            .collect();
        let endpoints: BTreeSet<&str> = self.endpoints.iter().map(|e| e.url.as_str()).collect();
        let high_value_endpoints: BTreeSet<&str> = self
            .endpoints
            .iter()
            .filter(|e| e.high_value)
            .map(|e| e.url.as_str())
            .collect();
        let technologies: BTreeSet<&str> = self
            .endpoints
            .iter()
            .flat_map(|e| e.technologies.iter().map(String::as_str))
            .collect();
        let ports: BTreeSet<u16> = self
            .endpoints
            .iter()
            .map(|e| e.port)
            .chain(self.services.iter().map(|s| s.port))
            .collect();
        let critical: BTreeSet<u16> = self
            .services
            .iter()
            .filter(|s| ports::is_infra(s.port))
            .map(|s| s.port)
            .collect();
        let versions: BTreeSet<u16> = self
            .services
            .iter()
            .filter(|s| ports::is_infra(s.port) && s.version.is_some())
            .map(|s| s.port)
            .collect();

        OutcomeCounts {
            subdomains: subdomains.len() as u32,
            high_value_subdomains: high_value_subdomains.len() as u32,
            endpoints: endpoints.len() as u32,
            high_value_endpoints: high_value_endpoints.len() as u32,
            technologies: technologies.len() as u32,
            ports: ports.len() as u32,
            critical_services: critical.len() as u32,
            versions: versions.len() as u32,
        }
    }

    fn from_record(record: &OutcomeRecord) -> Self {
        Self {
            elapsed_secs: record.elapsed_secs,
            subdomains: record.subdomains.clone(),
            endpoints: record.endpoints.clone(),
            services: record.services.clone(),
        }
    }
}

/// A validated, immutable scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    id: String,
    label: String,
    description: String,
    complexity: Complexity,
    expected: ExpectedTotals,
    ports: Vec<u16>,
    classification: Classification,
    /// Indexed by `stage.index() * NUM_MODES + mode.index()`.
    outcomes: Vec<StageOutcome>,
}

fn malformed(id: &str, message: impl Into<String>) -> CatalogError {
    CatalogError::MalformedScenario {
        scenario_id: id.to_string(),
        message: message.into(),
    }
}

impl Scenario {
    /// Validate a persisted record and build the immutable scenario.
    pub fn from_record(record: ScenarioRecord) -> Result<Self, CatalogError> {
        let id = record.id.trim().to_string();
        if id.is_empty() {
            return Err(malformed("<empty>", "scenario id cannot be empty"));
        }
        if record.ports.is_empty() {
            return Err(malformed(&id, "port list cannot be empty"));
        }
        let distinct_ports: BTreeSet<u16> = record.ports.iter().copied().collect();
        if distinct_ports.len() as u32 != record.expected.open_ports {
            return Err(malformed(
                &id,
                format!(
                    "expected.open_ports={} but port list has {} distinct ports",
                    record.expected.open_ports,
                    distinct_ports.len()
                ),
            ));
        }
        let infra_ports = distinct_ports.iter().filter(|p| ports::is_infra(**p)).count() as u32;
        if record.expected.critical_services > infra_ports {
            return Err(malformed(
                &id,
                format!(
                    "expected.critical_services={} exceeds {} infrastructure ports",
                    record.expected.critical_services, infra_ports
                ),
            ));
        }

        let mut table: Vec<Option<StageOutcome>> = vec![None; NUM_TOOL_ACTIONS];
        for entry in &record.outcomes {
            let mode = entry.stage.parse_mode(&entry.mode).ok_or_else(|| {
                malformed(
                    &id,
                    format!("unknown mode '{}' for stage {}", entry.mode, entry.stage),
                )
            })?;
            let slot = &mut table[entry.stage.index() * NUM_MODES + mode.index()];
            if slot.is_some() {
                return Err(malformed(
                    &id,
                    format!(
                        "duplicate outcome for {}/{}",
                        entry.stage,
                        entry.stage.mode_name(mode)
                    ),
                ));
            }
            validate_outcome(&id, entry, mode, &record.expected, &distinct_ports)?;
            *slot = Some(StageOutcome::from_record(entry));
        }

        let mut outcomes = Vec::with_capacity(NUM_TOOL_ACTIONS);
        for (idx, slot) in table.into_iter().enumerate() {
            match slot {
                Some(outcome) => outcomes.push(outcome),
                None => {
                    let stage = Stage::from_index(idx / NUM_MODES).unwrap_or(Stage::Discovery);
                    let mode = Mode::from_index(idx % NUM_MODES).unwrap_or(Mode::Fast);
                    return Err(malformed(
                        &id,
                        format!(
                            "missing outcome for {}/{}",
                            stage,
                            stage.mode_name(mode)
                        ),
                    ));
                }
            }
        }

        validate_monotonicity(&id, &outcomes)?;

        Ok(Self {
            classification: Classification::derive(&record.ports),
            id,
            label: record.label,
            description: record.description,
            complexity: record.complexity,
            expected: record.expected,
            ports: record.ports,
            outcomes,
        })
    }

    /// Convert back to the persisted form (outcomes in id order, generic mode names).
    pub fn to_record(&self) -> ScenarioRecord {
        let outcomes = Stage::ALL
            .into_iter()
            .flat_map(|stage| Mode::ALL.into_iter().map(move |mode| (stage, mode)))
            .map(|(stage, mode)| {
                let outcome = self.outcome(stage, mode);
                OutcomeRecord {
                    stage,
                    mode: stage.mode_name(mode).to_string(),
                    elapsed_secs: outcome.elapsed_secs,
                    subdomains: outcome.subdomains.clone(),
                    endpoints: outcome.endpoints.clone(),
                    services: outcome.services.clone(),
                }
            })
            .collect();

        ScenarioRecord {
            id: self.id.clone(),
            label: self.label.clone(),
            description: self.description.clone(),
            complexity: self.complexity,
            expected: self.expected,
            ports: self.ports.clone(),
            outcomes,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn complexity(&self) -> Complexity {
        self.complexity
    }

    pub fn expected(&self) -> &ExpectedTotals {
        &self.expected
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn outcome(&self, stage: Stage, mode: Mode) -> &StageOutcome {
        &self.outcomes[stage.index() * NUM_MODES + mode.index()]
    }

    /// Number of exposed infrastructure ports.
    pub fn infra_port_count(&self) -> usize {
        self.distinct_ports().filter(|p| ports::is_infra(*p)).count()
    }

    pub fn has_port(&self, pred: impl Fn(u16) -> bool) -> bool {
        self.ports.iter().any(|p| pred(*p))
    }

    fn distinct_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports
            .iter()
            .copied()
            .collect::<BTreeSet<u16>>()
            .into_iter()
    }
}

fn validate_outcome(
    id: &str,
    entry: &OutcomeRecord,
    mode: Mode,
    expected: &ExpectedTotals,
    port_set: &BTreeSet<u16>,
) -> Result<(), CatalogError> {
    let tag = format!("{}/{}", entry.stage, entry.stage.mode_name(mode));

    if !entry.elapsed_secs.is_finite() || entry.elapsed_secs < 0.0 {
        return Err(malformed(
            id,
            format!("{tag}: elapsed_secs must be finite and >= 0"),
        ));
    }

    let foreign = match entry.stage {
        Stage::Discovery => !entry.endpoints.is_empty() || !entry.services.is_empty(),
        Stage::Probing => !entry.subdomains.is_empty() || !entry.services.is_empty(),
        Stage::PortAnalysis => !entry.subdomains.is_empty() || !entry.endpoints.is_empty(),
    };
    if foreign {
        return Err(malformed(
            id,
            format!("{tag}: payload carries items belonging to another stage"),
        ));
    }

    let referenced = entry
        .endpoints
        .iter()
        .map(|e| e.port)
        .chain(entry.services.iter().map(|s| s.port));
    for port in referenced {
        if !port_set.contains(&port) {
            return Err(malformed(
                id,
                format!("{tag}: port {port} is not in the scenario port list"),
            ));
        }
    }

    let counts = StageOutcome::from_record(entry).counts();
    let limits = [
        ("subdomains", counts.subdomains, expected.subdomains),
        ("live_endpoints", counts.endpoints, expected.live_endpoints),
        (
            "critical_services",
            counts.critical_services,
            expected.critical_services,
        ),
    ];
    for (field, found, limit) in limits {
        if found > limit {
            return Err(malformed(
                id,
                format!("{tag}: reports {found} {field}, expected total is {limit}"),
            ));
        }
    }

    Ok(())
}

fn validate_monotonicity(id: &str, outcomes: &[StageOutcome]) -> Result<(), CatalogError> {
    for stage in Stage::ALL {
        for pair in Mode::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            let lo = &outcomes[stage.index() * NUM_MODES + lower.index()];
            let hi = &outcomes[stage.index() * NUM_MODES + higher.index()];

            if hi.elapsed_secs < lo.elapsed_secs {
                return Err(malformed(
                    id,
                    format!(
                        "{stage}: elapsed time decreases from {} ({}s) to {} ({}s)",
                        stage.mode_name(lower),
                        lo.elapsed_secs,
                        stage.mode_name(higher),
                        hi.elapsed_secs
                    ),
                ));
            }

            if let Some(field) = lo.counts().first_exceeding(&hi.counts()) {
                return Err(malformed(
                    id,
                    format!(
                        "{stage}: {} discovers fewer {field} than {}",
                        stage.mode_name(higher),
                        stage.mode_name(lower)
                    ),
                ));
            }
        }
    }
    Ok(())
}
