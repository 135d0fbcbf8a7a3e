// src/config.rs
//
// Configuration for the simulator.
//
// Layering:
// 1. Rust defaults (`Default` impls below)
// 2. optional YAML file (`EnvConfig::from_yaml_file`), missing keys keep defaults
// 3. `RECONSIM_*` environment overrides (`apply_env_overrides`)
//
// Every override is logged to stderr with a `[config]` prefix; values that
// fail to parse are reported and ignored.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::Split;
use crate::scenario::ports;
use crate::types::NUM_MODES;

/// Per-item discovery weights.
///
/// High-value classes weigh 2-5x their base class; a detected service
/// version is the most valuable single item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryWeights {
    pub subdomain: f64,
    pub high_value_subdomain: f64,
    pub endpoint: f64,
    pub high_value_endpoint: f64,
    pub technology: f64,
    pub web_port: f64,
    pub infra_port: f64,
    pub other_port: f64,
    pub critical_service: f64,
    pub version: f64,
}

impl Default for DiscoveryWeights {
    fn default() -> Self {
        Self {
            subdomain: 10.0,
            high_value_subdomain: 30.0,
            endpoint: 10.0,
            high_value_endpoint: 30.0,
            technology: 5.0,
            web_port: 10.0,
            infra_port: 30.0,
            other_port: 15.0,
            critical_service: 40.0,
            version: 50.0,
        }
    }
}

/// Completion tier: bonus when coverage >= `min_coverage`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageTier {
    pub min_coverage: f64,
    pub bonus: f64,
}

/// Efficiency tier: bonus when total elapsed < `max_elapsed_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeTier {
    pub max_elapsed_secs: f64,
    pub bonus: f64,
}

/// Stage-3 strategic bonus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategicConfig {
    /// Paid when an infrastructure target runs port analysis.
    pub infra_stage3_bonus: f64,
    /// Multiplier of `infra_stage3_bonus` per mode (fast, standard, thorough).
    pub mode_scale: [f64; NUM_MODES],
    /// Paid when a web-only target skips port analysis.
    pub web_only_skip_bonus: f64,
}

impl Default for StrategicConfig {
    fn default() -> Self {
        Self {
            infra_stage3_bonus: 1500.0,
            mode_scale: [0.5, 0.8, 1.0],
            web_only_skip_bonus: 400.0,
        }
    }
}

/// Immutable reward configuration consumed by `RewardEngine::new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub discovery: DiscoveryWeights,
    /// Ordered by descending `min_coverage`; first match wins.
    pub completion_tiers: Vec<CoverageTier>,
    pub strategic: StrategicConfig,
    /// Ordered by ascending `max_elapsed_secs`; first match wins.
    pub efficiency_tiers: Vec<TimeTier>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryWeights::default(),
            completion_tiers: vec![
                CoverageTier { min_coverage: 0.8, bonus: 300.0 },
                CoverageTier { min_coverage: 0.7, bonus: 200.0 },
                CoverageTier { min_coverage: 0.6, bonus: 150.0 },
                CoverageTier { min_coverage: 0.5, bonus: 100.0 },
            ],
            strategic: StrategicConfig::default(),
            efficiency_tiers: vec![
                TimeTier { max_elapsed_secs: 90.0, bonus: 100.0 },
                TimeTier { max_elapsed_secs: 120.0, bonus: 60.0 },
                TimeTier { max_elapsed_secs: 180.0, bonus: 30.0 },
            ],
        }
    }
}

impl RewardConfig {
    /// Reject negative or non-finite weights and ill-ordered tiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.discovery;
        let weights = [
            ("discovery.subdomain", w.subdomain),
            ("discovery.high_value_subdomain", w.high_value_subdomain),
            ("discovery.endpoint", w.endpoint),
            ("discovery.high_value_endpoint", w.high_value_endpoint),
            ("discovery.technology", w.technology),
            ("discovery.web_port", w.web_port),
            ("discovery.infra_port", w.infra_port),
            ("discovery.other_port", w.other_port),
            ("discovery.critical_service", w.critical_service),
            ("discovery.version", w.version),
            ("strategic.infra_stage3_bonus", self.strategic.infra_stage3_bonus),
            ("strategic.web_only_skip_bonus", self.strategic.web_only_skip_bonus),
        ];
        for (field, value) in weights {
            non_negative(field, value)?;
        }

        for (i, scale) in self.strategic.mode_scale.iter().enumerate() {
            non_negative("strategic.mode_scale", *scale)?;
            if i > 0 && *scale < self.strategic.mode_scale[i - 1] {
                return Err(invalid(
                    "strategic.mode_scale",
                    "must be non-decreasing in mode intensity",
                ));
            }
        }

        for (i, tier) in self.completion_tiers.iter().enumerate() {
            non_negative("completion_tiers.bonus", tier.bonus)?;
            if !(0.0..=1.0).contains(&tier.min_coverage) {
                return Err(invalid(
                    "completion_tiers.min_coverage",
                    format!("{} is outside [0, 1]", tier.min_coverage),
                ));
            }
            if let Some(prev) = i.checked_sub(1).map(|j| self.completion_tiers[j]) {
                if tier.min_coverage >= prev.min_coverage || tier.bonus > prev.bonus {
                    return Err(invalid(
                        "completion_tiers",
                        "thresholds must strictly decrease with non-increasing bonuses",
                    ));
                }
            }
        }

        for (i, tier) in self.efficiency_tiers.iter().enumerate() {
            non_negative("efficiency_tiers.bonus", tier.bonus)?;
            non_negative("efficiency_tiers.max_elapsed_secs", tier.max_elapsed_secs)?;
            if let Some(prev) = i.checked_sub(1).map(|j| self.efficiency_tiers[j]) {
                if tier.max_elapsed_secs <= prev.max_elapsed_secs || tier.bonus > prev.bonus {
                    return Err(invalid(
                        "efficiency_tiers",
                        "limits must strictly increase with non-increasing bonuses",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Check that the stage-3 decision matching the classification always
    /// scores strictly higher, whatever was found in the first two stages.
    ///
    /// - infrastructure: the lightest-mode bonus must exceed the largest
    ///   efficiency bonus that the extra time could cost
    /// - web-only: the skip bonus must exceed the top completion bonus plus
    ///   every web port being discovered for the first time
    ///
    /// Coverage, and so completion, never drops when port analysis runs,
    /// and a web-only target has no critical services or versions to find.
    pub fn check_strategic_dominance(&self) -> Result<(), ConfigError> {
        let s = &self.strategic;
        let max_efficiency = self.efficiency_tiers.first().map_or(0.0, |t| t.bonus);
        let lightest_run = s.infra_stage3_bonus * s.mode_scale[0];
        if lightest_run <= max_efficiency {
            return Err(invalid(
                "strategic.infra_stage3_bonus",
                format!(
                    "fast-mode bonus {lightest_run} does not exceed the top efficiency bonus {max_efficiency}"
                ),
            ));
        }

        let max_completion = self.completion_tiers.first().map_or(0.0, |t| t.bonus);
        let max_run_gain = max_completion + self.discovery.web_port * ports::WEB_PORTS.len() as f64;
        if s.web_only_skip_bonus <= max_run_gain {
            return Err(invalid(
                "strategic.web_only_skip_bonus",
                format!(
                    "{} does not exceed the most running port analysis can gain on a web-only target ({max_run_gain})",
                    s.web_only_skip_bonus
                ),
            ));
        }
        Ok(())
    }
}

/// Environment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Split sampled by `reset` when no scenario id is given.
    pub split: Split,
    /// Seed used when `reset` is called without one.
    pub seed: u64,
    pub reward: RewardConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            split: Split::Train,
            seed: 42,
            reward: RewardConfig::default(),
        }
    }
}

impl EnvConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let cfg: EnvConfig = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            source: e.to_string(),
        })?;
        cfg.reward.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e.to_string(),
        })?;
        let cfg = Self::from_yaml_str(&contents)?;
        eprintln!("[config] loaded {}", path.as_ref().display());
        Ok(cfg)
    }

    /// Defaults (or `RECONSIM_CONFIG` file) plus environment overrides.
    pub fn from_env_or_default() -> Result<Self, ConfigError> {
        let mut cfg = match env::var("RECONSIM_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_yaml_file(path.trim())?,
            _ => Self::default(),
        };
        cfg.apply_env_overrides();
        cfg.reward.validate()?;
        if let Err(e) = cfg.reward.check_strategic_dominance() {
            eprintln!("[config] WARN: {e}");
        }
        Ok(cfg)
    }

    /// Apply `RECONSIM_*` overrides in place.
    pub fn apply_env_overrides(&mut self) {
        override_from_env("RECONSIM_SPLIT", &mut self.split);
        override_from_env("RECONSIM_SEED", &mut self.seed);

        let r = &mut self.reward;
        override_from_env(
            "RECONSIM_INFRA_STAGE3_BONUS",
            &mut r.strategic.infra_stage3_bonus,
        );
        override_from_env(
            "RECONSIM_WEB_ONLY_SKIP_BONUS",
            &mut r.strategic.web_only_skip_bonus,
        );
        override_from_env("RECONSIM_VERSION_WEIGHT", &mut r.discovery.version);
        override_from_env(
            "RECONSIM_CRITICAL_SERVICE_WEIGHT",
            &mut r.discovery.critical_service,
        );
    }
}

fn override_from_env<T>(name: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Debug,
{
    let Ok(raw) = env::var(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => {
            eprintln!("[config] {name} = {v:?} (overrode default)");
            *slot = v;
        }
        Err(_) => {
            eprintln!(
                "[config] WARN: could not parse {name} = {:?}; using default {:?}",
                raw, slot
            );
        }
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite and >= 0, got {value}")))
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Clone)]
pub enum ConfigError {
    Io { path: String, source: String },
    Parse { source: String },
    Invalid { field: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path, source)
            }
            ConfigError::Parse { source } => write!(f, "Failed to parse config YAML: {}", source),
            ConfigError::Invalid { field, message } => {
                write!(f, "Invalid config value '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
