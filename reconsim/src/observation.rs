// src/observation.rs
//
// Versioned, fixed-length observation vector for policy input.
//
// Layout (40 features, every value clipped to [0, 1]):
//   [0..8)   static scenario features
//   [8..20)  tool-usage history: 9 one-hot (stage, mode) slots + 3 stage times
//   [20..30) cumulative discovery
//   [30..40) stage-3 decision context
//
// Deterministic: features depend only on the scenario, the tracker and the
// phase; all sets involved are ordered.

use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryTracker;
use crate::scenario::{ports, Classification, Scenario};
use crate::types::{Phase, Stage, ToolChoice, NUM_MODES, NUM_STAGES};

/// Current observation schema version.
/// Increment when adding/removing/changing features.
pub const OBS_VERSION: u32 = 1;

/// Number of features in an observation.
pub const OBS_DIM: usize = 40;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; OBS_DIM] = [
    "complexity",
    "expected_subdomains",
    "expected_endpoints",
    "expected_ports",
    "expected_critical_services",
    "is_infrastructure",
    "is_web_only",
    "is_hybrid",
    "used_discovery_fast",
    "used_discovery_standard",
    "used_discovery_thorough",
    "used_probing_fast",
    "used_probing_standard",
    "used_probing_thorough",
    "used_port_analysis_fast",
    "used_port_analysis_standard",
    "used_port_analysis_thorough",
    "discovery_time",
    "probing_time",
    "port_analysis_time",
    "subdomains_found",
    "high_value_subdomains_found",
    "endpoints_found",
    "high_value_endpoints_found",
    "technologies_found",
    "ports_found",
    "critical_services_found",
    "versions_found",
    "coverage",
    "total_elapsed",
    "has_infra_ports",
    "custom_ports",
    "port_diversity",
    "stage3_value_estimate",
    "web_only_signal",
    "has_database_ports",
    "has_admin_ports",
    "undiscovered_port_fraction",
    "stage3_skipped",
    "phase_progress",
];

/// Normalisation scales.
const SUBDOMAIN_SCALE: f32 = 30.0;
const ENDPOINT_SCALE: f32 = 25.0;
const PORT_SCALE: f32 = 20.0;
const CRITICAL_SCALE: f32 = 10.0;
const HIGH_VALUE_SCALE: f32 = 10.0;
const TECH_SCALE: f32 = 20.0;
const VERSION_SCALE: f32 = 10.0;
const STAGE_TIME_SCALE: [f32; NUM_STAGES] = [60.0, 120.0, 300.0];
const TOTAL_TIME_SCALE: f32 = 600.0;

/// Observation passed to policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub obs_version: u32,
    pub phase: Phase,
    pub features: Vec<f32>,
}

impl Observation {
    /// Returns canonical JSON for byte-for-byte reproducibility.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn feature(&self, name: &str) -> Option<f32> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .and_then(|i| self.features.get(i).copied())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.features
    }
}

fn unit(x: f32) -> f32 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn flag(b: bool) -> f32 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Encode the current episode state.
pub fn encode(scenario: &Scenario, tracker: &DiscoveryTracker, phase: Phase) -> Observation {
    let mut f = Vec::with_capacity(OBS_DIM);
    let expected = scenario.expected();
    let class = scenario.classification();

    // static
    f.push(scenario.complexity().normalized());
    f.push(expected.subdomains as f32 / SUBDOMAIN_SCALE);
    f.push(expected.live_endpoints as f32 / ENDPOINT_SCALE);
    f.push(expected.open_ports as f32 / PORT_SCALE);
    f.push(expected.critical_services as f32 / CRITICAL_SCALE);
    f.push(flag(class == Classification::Infrastructure));
    f.push(flag(class == Classification::WebOnly));
    f.push(flag(class == Classification::Hybrid));

    // usage history
    for stage in Stage::ALL {
        let mode = tracker.usage(stage).and_then(|u| u.choice.mode());
        for m in 0..NUM_MODES {
            f.push(flag(mode.map(|x| x.index()) == Some(m)));
        }
    }
    for stage in Stage::ALL {
        let secs = tracker.usage(stage).map(|u| u.elapsed_secs).unwrap_or(0.0);
        f.push(secs as f32 / STAGE_TIME_SCALE[stage.index()]);
    }

    // cumulative discovery
    let c = tracker.counts();
    f.push(c.subdomains as f32 / SUBDOMAIN_SCALE);
    f.push(c.high_value_subdomains as f32 / HIGH_VALUE_SCALE);
    f.push(c.endpoints as f32 / ENDPOINT_SCALE);
    f.push(c.high_value_endpoints as f32 / HIGH_VALUE_SCALE);
    f.push(c.technologies as f32 / TECH_SCALE);
    f.push(c.ports as f32 / PORT_SCALE);
    f.push(c.critical_services as f32 / CRITICAL_SCALE);
    f.push(c.versions as f32 / VERSION_SCALE);
    f.push(tracker.coverage(expected) as f32);
    f.push(tracker.elapsed_secs() as f32 / TOTAL_TIME_SCALE);

    // stage-3 context
    let infra = scenario.infra_port_count();
    let has_web = scenario.has_port(ports::is_web);
    let has_custom = scenario.has_port(ports::is_custom);
    let has_admin = scenario.has_port(ports::is_admin);
    let custom = scenario.ports().iter().filter(|p| ports::is_custom(**p)).count();
    let diversity = [has_web, infra > 0, has_admin, has_custom]
        .iter()
        .filter(|b| **b)
        .count();
    let undiscovered = if expected.open_ports == 0 {
        0.0
    } else {
        1.0 - c.ports as f32 / expected.open_ports as f32
    };
    let skipped = tracker
        .usage(Stage::PortAnalysis)
        .map(|u| u.choice == ToolChoice::Skipped)
        .unwrap_or(false);

    f.push(flag(infra > 0));
    f.push(custom as f32 / 5.0);
    f.push(diversity as f32 / 4.0);
    f.push(infra as f32 / 5.0);
    f.push(flag(has_web && infra == 0));
    f.push(flag(scenario.has_port(ports::is_database)));
    f.push(flag(has_admin));
    f.push(undiscovered);
    f.push(flag(skipped));
    f.push(phase.ordinal() as f32 / NUM_STAGES as f32);

    debug_assert_eq!(f.len(), OBS_DIM);
    Observation {
        obs_version: OBS_VERSION,
        phase,
        features: f.into_iter().map(unit).collect(),
    }
}
