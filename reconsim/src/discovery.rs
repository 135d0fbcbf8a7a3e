// src/discovery.rs
//
// Per-episode cumulative findings.
//
// The tracker de-duplicates every item class in ordered sets so that
// iteration order (and therefore every derived count, observation and
// checksum) is deterministic. `apply` returns only items that were NEW
// to this episode; reward is computed from that delta, never from the raw
// outcome table.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::scenario::{ports, ExpectedTotals, OutcomeCounts, Scenario};
use crate::types::{Mode, Stage, ToolChoice, NUM_STAGES};

/// What was decided for one stage and how long it took.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageUsage {
    pub choice: ToolChoice,
    pub elapsed_secs: f64,
}

/// Items newly discovered by one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDelta {
    pub stage: Stage,
    pub choice: ToolChoice,
    pub elapsed_secs: f64,
    pub subdomains: Vec<String>,
    pub high_value_subdomains: u32,
    pub endpoints: Vec<String>,
    pub high_value_endpoints: u32,
    pub technologies: Vec<String>,
    /// Newly seen open ports (ports already known from probing are excluded).
    pub ports: Vec<u16>,
    /// Infrastructure-port services identified for the first time.
    pub critical_services: Vec<u16>,
    /// Infrastructure services whose version became known in this step.
    pub versions: Vec<u16>,
}

impl DiscoveryDelta {
    fn empty(stage: Stage, choice: ToolChoice) -> Self {
        Self {
            stage,
            choice,
            elapsed_secs: 0.0,
            subdomains: Vec::new(),
            high_value_subdomains: 0,
            endpoints: Vec::new(),
            high_value_endpoints: 0,
            technologies: Vec::new(),
            ports: Vec::new(),
            critical_services: Vec::new(),
            versions: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subdomains.is_empty()
            && self.endpoints.is_empty()
            && self.technologies.is_empty()
            && self.ports.is_empty()
            && self.critical_services.is_empty()
            && self.versions.is_empty()
    }

    pub fn web_ports(&self) -> usize {
        self.ports.iter().filter(|p| ports::is_web(**p)).count()
    }

    pub fn infra_ports(&self) -> usize {
        self.ports.iter().filter(|p| ports::is_infra(**p)).count()
    }

    /// Ports that are neither web nor infrastructure.
    pub fn other_ports(&self) -> usize {
        self.ports.len() - self.web_ports() - self.infra_ports()
    }
}

/// Serializable view of cumulative discovery counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySnapshot {
    #[serde(flatten)]
    pub counts: OutcomeCounts,
    pub elapsed_secs: f64,
}

/// Cumulative discovery state of one episode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryTracker {
    subdomains: BTreeMap<String, bool>,
    endpoints: BTreeMap<String, bool>,
    technologies: BTreeSet<String>,
    ports: BTreeSet<u16>,
    services: BTreeMap<u16, String>,
    versions: BTreeMap<u16, String>,
    usage: [Option<StageUsage>; NUM_STAGES],
    elapsed_secs: f64,
}

impl DiscoveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the precomputed outcome of `(stage, mode)` and return new items.
    pub fn apply(&mut self, scenario: &Scenario, stage: Stage, mode: Mode) -> DiscoveryDelta {
        let outcome = scenario.outcome(stage, mode);
        let mut delta = DiscoveryDelta::empty(stage, ToolChoice::Ran(mode));
        delta.elapsed_secs = outcome.elapsed_secs;

        for sub in &outcome.subdomains {
            if !self.subdomains.contains_key(&sub.name) {
                self.subdomains.insert(sub.name.clone(), sub.high_value);
                delta.subdomains.push(sub.name.clone());
                if sub.high_value {
                    delta.high_value_subdomains += 1;
                }
            }
        }

        for ep in &outcome.endpoints {
            if !self.endpoints.contains_key(&ep.url) {
                self.endpoints.insert(ep.url.clone(), ep.high_value);
                delta.endpoints.push(ep.url.clone());
                if ep.high_value {
                    delta.high_value_endpoints += 1;
                }
            }
            for tech in &ep.technologies {
                if self.technologies.insert(tech.clone()) {
                    delta.technologies.push(tech.clone());
                }
            }
            if self.ports.insert(ep.port) {
                delta.ports.push(ep.port);
            }
        }

        for svc in &outcome.services {
            if self.ports.insert(svc.port) {
                delta.ports.push(svc.port);
            }
            if !ports::is_infra(svc.port) {
                continue;
            }
            if !self.services.contains_key(&svc.port) {
                self.services.insert(svc.port, svc.service.clone());
                delta.critical_services.push(svc.port);
            }
            if let Some(version) = &svc.version {
                if !self.versions.contains_key(&svc.port) {
                    self.versions.insert(svc.port, version.clone());
                    delta.versions.push(svc.port);
                }
            }
        }

        self.record(stage, ToolChoice::Ran(mode), outcome.elapsed_secs);
        delta
    }

    /// Record a declined port-analysis stage. Nothing is discovered and no
    /// time passes.
    pub fn skip(&mut self) -> DiscoveryDelta {
        self.record(Stage::PortAnalysis, ToolChoice::Skipped, 0.0);
        DiscoveryDelta::empty(Stage::PortAnalysis, ToolChoice::Skipped)
    }

    fn record(&mut self, stage: Stage, choice: ToolChoice, elapsed_secs: f64) {
        self.usage[stage.index()] = Some(StageUsage {
            choice,
            elapsed_secs,
        });
        self.elapsed_secs += elapsed_secs;
    }

    pub fn counts(&self) -> OutcomeCounts {
        OutcomeCounts {
            subdomains: self.subdomains.len() as u32,
            high_value_subdomains: self.subdomains.values().filter(|hv| **hv).count() as u32,
            endpoints: self.endpoints.len() as u32,
            high_value_endpoints: self.endpoints.values().filter(|hv| **hv).count() as u32,
            technologies: self.technologies.len() as u32,
            ports: self.ports.len() as u32,
            critical_services: self.services.len() as u32,
            versions: self.versions.len() as u32,
        }
    }

    pub fn snapshot(&self) -> DiscoverySnapshot {
        DiscoverySnapshot {
            counts: self.counts(),
            elapsed_secs: self.elapsed_secs,
        }
    }

    pub fn usage(&self, stage: Stage) -> Option<StageUsage> {
        self.usage[stage.index()]
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn known_ports(&self) -> &BTreeSet<u16> {
        &self.ports
    }

    /// Mean of subdomain, endpoint and port coverage, each clamped to 1.
    /// A category with nothing expected counts as fully covered.
    pub fn coverage(&self, expected: &ExpectedTotals) -> f64 {
        fn ratio(found: u32, total: u32) -> f64 {
            if total == 0 {
                1.0
            } else {
                (found as f64 / total as f64).min(1.0)
            }
        }
        let c = self.counts();
        (ratio(c.subdomains, expected.subdomains)
            + ratio(c.endpoints, expected.live_endpoints)
            + ratio(c.ports, expected.open_ports))
            / 3.0
    }
}
