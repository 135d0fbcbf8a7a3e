// src/reward.rs
//
// Four-component, non-negative reward.
//
// - discovery:  weighted sum of NEW items in the step's delta
// - completion: tiered coverage bonus, terminal step only
// - strategic:  classification-aware stage-3 bonus, paid once at the
//               stage-3 decision
// - efficiency: tiered total-elapsed bonus, terminal step only
//
// The engine is pure: the same (config, scenario, tracker, delta) always
// yields the same breakdown.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, RewardConfig};
use crate::discovery::{DiscoveryDelta, DiscoveryTracker};
use crate::scenario::{Classification, Scenario};
use crate::types::{Stage, ToolChoice};

/// Per-component reward of one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub discovery: f64,
    pub completion: f64,
    pub strategic: f64,
    pub efficiency: f64,
}

impl RewardBreakdown {
    pub fn total(&self) -> f64 {
        self.discovery + self.completion + self.strategic + self.efficiency
    }

    /// Component-wise sum.
    pub fn accumulate(&mut self, other: &RewardBreakdown) {
        self.discovery += other.discovery;
        self.completion += other.completion;
        self.strategic += other.strategic;
        self.efficiency += other.efficiency;
    }
}

/// Scores steps against an immutable `RewardConfig`.
#[derive(Debug, Clone)]
pub struct RewardEngine {
    config: RewardConfig,
}

impl Default for RewardEngine {
    fn default() -> Self {
        Self {
            config: RewardConfig::default(),
        }
    }
}

impl RewardEngine {
    pub fn new(config: RewardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Score one step. `tracker` must already include `delta`.
    ///
    /// The port-analysis step is always the terminal step of an episode,
    /// so completion, strategic and efficiency are evaluated exactly once.
    pub fn score(
        &self,
        scenario: &Scenario,
        tracker: &DiscoveryTracker,
        delta: &DiscoveryDelta,
    ) -> RewardBreakdown {
        let mut breakdown = RewardBreakdown {
            discovery: self.discovery_reward(delta),
            ..RewardBreakdown::default()
        };
        if delta.stage == Stage::PortAnalysis {
            breakdown.completion = self.completion_bonus(tracker.coverage(scenario.expected()));
            breakdown.strategic = self.strategic_bonus(scenario.classification(), delta.choice);
            breakdown.efficiency = self.efficiency_bonus(tracker.elapsed_secs());
        }
        breakdown
    }

    pub fn discovery_reward(&self, delta: &DiscoveryDelta) -> f64 {
        let w = &self.config.discovery;
        let plain_subdomains = delta.subdomains.len() as u32 - delta.high_value_subdomains;
        let plain_endpoints = delta.endpoints.len() as u32 - delta.high_value_endpoints;

        w.subdomain * plain_subdomains as f64
            + w.high_value_subdomain * delta.high_value_subdomains as f64
            + w.endpoint * plain_endpoints as f64
            + w.high_value_endpoint * delta.high_value_endpoints as f64
            + w.technology * delta.technologies.len() as f64
            + w.web_port * delta.web_ports() as f64
            + w.infra_port * delta.infra_ports() as f64
            + w.other_port * delta.other_ports() as f64
            + w.critical_service * delta.critical_services.len() as f64
            + w.version * delta.versions.len() as f64
    }

    pub fn completion_bonus(&self, coverage: f64) -> f64 {
        self.config
            .completion_tiers
            .iter()
            .find(|t| coverage >= t.min_coverage)
            .map(|t| t.bonus)
            .unwrap_or(0.0)
    }

    pub fn strategic_bonus(&self, class: Classification, choice: ToolChoice) -> f64 {
        let s = &self.config.strategic;
        match (class, choice) {
            (Classification::Infrastructure, ToolChoice::Ran(mode)) => {
                s.infra_stage3_bonus * s.mode_scale[mode.index()]
            }
            (Classification::WebOnly, ToolChoice::Skipped) => s.web_only_skip_bonus,
            _ => 0.0,
        }
    }

    pub fn efficiency_bonus(&self, total_elapsed_secs: f64) -> f64 {
        self.config
            .efficiency_tiers
            .iter()
            .find(|t| total_elapsed_secs < t.max_elapsed_secs)
            .map(|t| t.bonus)
            .unwrap_or(0.0)
    }
}
