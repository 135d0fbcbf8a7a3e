// src/telemetry.rs
//
// JSONL telemetry for episodes: one line per episode boundary and per step.
//
// Controlled by environment variables:
// - RECONSIM_TELEMETRY_MODE: "off" (default) or "jsonl"
// - RECONSIM_TELEMETRY_PATH: path to the JSONL file (appended)
//
// A write or flush failure disables the sink (reported once on stderr);
// it never fails the episode being logged.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::discovery::DiscoverySnapshot;
use crate::env::{ResetResult, StepResult};
use crate::observation::OBS_VERSION;
use crate::reward::RewardBreakdown;
use crate::scenario::Classification;
use crate::types::Phase;

/// Telemetry line schema version.
pub const TELEMETRY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeMarkerType {
    Start,
    End,
}

/// Episode boundary marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeMarker {
    pub record: String,
    pub schema_version: u32,
    pub episode_id: u64,
    pub seed: u64,
    pub marker_type: EpisodeMarkerType,
    pub scenario_id: String,
    pub classification: Classification,
    pub policy_version: String,
    /// End markers only.
    pub total_reward: Option<f64>,
    pub total_elapsed_secs: Option<f64>,
    pub steps: Option<u32>,
}

/// Per-step record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub record: String,
    pub schema_version: u32,
    pub obs_version: u32,
    pub policy_version: String,
    pub episode_id: u64,
    pub step_index: u32,
    pub phase: Phase,
    pub action: String,
    pub action_id: usize,
    pub reward: RewardBreakdown,
    pub reward_total: f64,
    pub cumulative_reward: f64,
    pub discovery: DiscoverySnapshot,
    pub terminated: bool,
}

impl StepRecord {
    pub fn new(result: &StepResult, policy_version: &str, episode_id: u64) -> Self {
        let info = &result.info;
        Self {
            record: "step".to_string(),
            schema_version: TELEMETRY_SCHEMA_VERSION,
            obs_version: OBS_VERSION,
            policy_version: policy_version.to_string(),
            episode_id,
            step_index: info.step,
            phase: info.phase,
            action: info.action.clone(),
            action_id: info.action_id,
            reward: info.reward,
            reward_total: result.reward,
            cumulative_reward: info.cumulative_reward,
            discovery: info.discovery,
            terminated: result.terminated,
        }
    }
}

/// JSONL telemetry sink.
pub struct EpisodeTelemetry {
    enabled: bool,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    policy_version: String,
}

impl Default for EpisodeTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl EpisodeTelemetry {
    /// Create a disabled sink.
    pub fn new() -> Self {
        Self {
            enabled: false,
            path: None,
            writer: None,
            policy_version: String::new(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        let enabled = env::var("RECONSIM_TELEMETRY_MODE")
            .map(|s| s.trim().eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false);
        let path = env::var("RECONSIM_TELEMETRY_PATH").ok().map(PathBuf::from);
        if enabled && path.is_none() {
            eprintln!("[telemetry] WARN: RECONSIM_TELEMETRY_MODE=jsonl without RECONSIM_TELEMETRY_PATH; telemetry off");
        }
        Self {
            enabled: enabled && path.is_some(),
            path,
            writer: None,
            policy_version: String::new(),
        }
    }

    /// Enable telemetry with a specific path.
    pub fn enable(path: PathBuf) -> Self {
        Self {
            enabled: true,
            path: Some(path),
            writer: None,
            policy_version: String::new(),
        }
    }

    /// Tag subsequent records with a policy version.
    pub fn set_policy_version(&mut self, version: &str) {
        self.policy_version = version.to_string();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if !self.enabled {
            return None;
        }
        if self.writer.is_none() {
            let path = self.path.as_ref()?;
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(e) => {
                    eprintln!(
                        "[telemetry] WARN: cannot open {}: {e}; disabling",
                        path.display()
                    );
                    self.enabled = false;
                    return None;
                }
            }
        }
        self.writer.as_mut()
    }

    fn write_json(&mut self, value: &JsonValue) {
        let Some(writer) = self.ensure_writer() else {
            return;
        };
        let line = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(_) => return,
        };
        if let Err(e) = writeln!(writer, "{}", line) {
            eprintln!("[telemetry] WARN: write failed: {e}; disabling");
            self.enabled = false;
            self.writer = None;
        }
    }

    pub fn log_episode_start(&mut self, episode_id: u64, reset: &ResetResult) {
        let marker = EpisodeMarker {
            record: "episode".to_string(),
            schema_version: TELEMETRY_SCHEMA_VERSION,
            episode_id,
            seed: reset.info.seed,
            marker_type: EpisodeMarkerType::Start,
            scenario_id: reset.info.scenario_id.clone(),
            classification: reset.info.classification,
            policy_version: self.policy_version.clone(),
            total_reward: None,
            total_elapsed_secs: None,
            steps: None,
        };
        let value = serde_json::to_value(&marker).unwrap_or_default();
        self.write_json(&value);
    }

    pub fn log_step(&mut self, episode_id: u64, result: &StepResult) {
        let record = StepRecord::new(result, &self.policy_version, episode_id);
        let value = serde_json::to_value(&record).unwrap_or_default();
        self.write_json(&value);
    }

    pub fn log_episode_end(&mut self, episode_id: u64, reset: &ResetResult, last: &StepResult) {
        let marker = EpisodeMarker {
            record: "episode".to_string(),
            schema_version: TELEMETRY_SCHEMA_VERSION,
            episode_id,
            seed: reset.info.seed,
            marker_type: EpisodeMarkerType::End,
            scenario_id: reset.info.scenario_id.clone(),
            classification: reset.info.classification,
            policy_version: self.policy_version.clone(),
            total_reward: Some(last.info.cumulative_reward),
            total_elapsed_secs: Some(last.info.total_elapsed_secs),
            steps: Some(last.info.step),
        };
        let value = serde_json::to_value(&marker).unwrap_or_default();
        self.write_json(&value);
    }

    pub fn flush(&mut self) {
        let Some(writer) = &mut self.writer else {
            return;
        };
        if let Err(e) = writer.flush() {
            eprintln!("[telemetry] WARN: flush failed: {e}; disabling");
            self.enabled = false;
            self.writer = None;
        }
    }
}

impl Drop for EpisodeTelemetry {
    fn drop(&mut self) {
        self.flush();
    }
}
