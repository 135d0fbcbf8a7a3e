// src/eval.rs
//
// Evaluation harness: multi-episode policy runs, per-classification
// statistics, determinism checksums and exhaustive per-scenario comparison
// of every legal decision sequence.
//
// Episode i always uses seed `base_seed + i` and resets the policy with that
// seed, so results do not depend on how episodes are spread across threads.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::{hex, ScenarioCatalog, Split};
use crate::config::EnvConfig;
use crate::env::{EnvError, ReconEnv};
use crate::observation::OBS_VERSION;
use crate::policy::{all_sequences, Policy, SequencePolicy};
use crate::reward::{RewardBreakdown, RewardEngine};
use crate::scenario::Classification;
use crate::telemetry::EpisodeTelemetry;

/// Mean, sample standard deviation and range of a series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub n: u64,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Welford accumulator that keeps its `StatsSummary` current. Non-finite
/// samples are dropped.
#[derive(Debug, Clone, Copy, Default)]
struct RunningStats {
    summary: StatsSummary,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        let s = &mut self.summary;
        if s.n == 0 {
            (s.min, s.max) = (x, x);
        } else {
            s.min = s.min.min(x);
            s.max = s.max.max(x);
        }
        s.n += 1;
        let d = x - s.mean;
        s.mean += d / s.n as f64;
        self.m2 += d * (x - s.mean);
        if s.n > 1 {
            s.std = (self.m2 / (s.n - 1) as f64).sqrt();
        }
    }
}

/// Outcome of one complete episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode_id: u64,
    pub seed: u64,
    pub scenario_id: String,
    pub classification: Classification,
    pub actions: Vec<usize>,
    pub reward: RewardBreakdown,
    pub total_reward: f64,
    pub coverage: f64,
    pub total_elapsed_secs: f64,
    pub stage3_used: bool,
}

/// Play one episode to termination.
pub fn run_episode(
    env: &mut ReconEnv,
    policy: &mut dyn Policy,
    seed: u64,
    scenario_id: Option<&str>,
    episode_id: u64,
    telemetry: &mut EpisodeTelemetry,
) -> Result<EpisodeSummary, EnvError> {
    policy.reset_episode(seed, episode_id);
    telemetry.set_policy_version(policy.version());

    let reset = env.reset(Some(seed), scenario_id)?;
    telemetry.log_episode_start(episode_id, &reset);

    let mut obs = reset.observation.clone();
    let mut mask = reset.mask;
    let mut actions = Vec::with_capacity(3);
    let mut reward = RewardBreakdown::default();

    loop {
        let action = policy.act(&obs, &mask);
        let result = env.step(action)?;
        actions.push(action.id());
        reward.accumulate(&result.info.reward);
        telemetry.log_step(episode_id, &result);

        if result.terminated || result.truncated {
            telemetry.log_episode_end(episode_id, &reset, &result);
            return Ok(EpisodeSummary {
                episode_id,
                seed,
                scenario_id: reset.info.scenario_id,
                classification: reset.info.classification,
                actions,
                total_reward: reward.total(),
                reward,
                coverage: result.info.coverage,
                total_elapsed_secs: result.info.total_elapsed_secs,
                stage3_used: result.info.stage3_used,
            });
        }
        obs = result.observation;
        mask = result.mask;
    }
}

/// Evaluation run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    pub episodes: usize,
    pub base_seed: u64,
    pub split: Split,
    /// Worker threads; 1 runs inline (and is the only mode that writes telemetry).
    pub threads: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            episodes: 100,
            base_seed: 42,
            split: Split::Test,
            threads: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassStats {
    pub episodes: u64,
    pub reward: StatsSummary,
    pub coverage: StatsSummary,
    pub elapsed_secs: StatsSummary,
    pub stage3_rate: f64,
}

/// Aggregated result of an evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub policy_version: String,
    pub obs_version: u32,
    pub catalog_fingerprint: String,
    pub split: Split,
    pub base_seed: u64,
    pub episodes: u64,
    pub reward: StatsSummary,
    pub coverage: StatsSummary,
    pub elapsed_secs: StatsSummary,
    pub stage3_rate: f64,
    pub per_class: BTreeMap<Classification, ClassStats>,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub episode_log: Vec<EpisodeSummary>,
}

#[derive(Default)]
struct Accumulator {
    reward: RunningStats,
    coverage: RunningStats,
    elapsed: RunningStats,
    stage3: u64,
}

impl Accumulator {
    fn add(&mut self, ep: &EpisodeSummary) {
        self.reward.push(ep.total_reward);
        self.coverage.push(ep.coverage);
        self.elapsed.push(ep.total_elapsed_secs);
        if ep.stage3_used {
            self.stage3 += 1;
        }
    }

    fn stage3_rate(&self) -> f64 {
        let n = self.reward.summary.n;
        if n == 0 {
            0.0
        } else {
            self.stage3 as f64 / n as f64
        }
    }
}

impl EvalReport {
    fn build(
        policy_version: String,
        catalog_fingerprint: String,
        eval: &EvalConfig,
        episodes: Vec<EpisodeSummary>,
    ) -> Self {
        let mut all = Accumulator::default();
        let mut by_class: BTreeMap<Classification, Accumulator> = BTreeMap::new();
        for ep in &episodes {
            all.add(ep);
            by_class.entry(ep.classification).or_default().add(ep);
        }
        let per_class = by_class
            .into_iter()
            .map(|(class, acc)| {
                (
                    class,
                    ClassStats {
                        episodes: acc.reward.summary.n,
                        reward: acc.reward.summary,
                        coverage: acc.coverage.summary,
                        elapsed_secs: acc.elapsed.summary,
                        stage3_rate: acc.stage3_rate(),
                    },
                )
            })
            .collect();
        let checksum =
            Self::compute_checksum(&catalog_fingerprint, &policy_version, eval.base_seed, &episodes);

        Self {
            policy_version,
            obs_version: OBS_VERSION,
            catalog_fingerprint,
            split: eval.split,
            base_seed: eval.base_seed,
            episodes: episodes.len() as u64,
            reward: all.reward.summary,
            coverage: all.coverage.summary,
            elapsed_secs: all.elapsed.summary,
            stage3_rate: all.stage3_rate(),
            per_class,
            checksum,
            episode_log: episodes,
        }
    }

    /// Compute checksum from deterministic run data.
    ///
    /// Floats are rounded to 6 decimal places before hashing.
    pub fn compute_checksum(
        catalog_fingerprint: &str,
        policy_version: &str,
        base_seed: u64,
        episodes: &[EpisodeSummary],
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(catalog_fingerprint.as_bytes());
        hasher.update(policy_version.as_bytes());
        hasher.update(base_seed.to_le_bytes());
        for ep in episodes {
            hasher.update(ep.seed.to_le_bytes());
            hasher.update(ep.scenario_id.as_bytes());
            for a in &ep.actions {
                hasher.update((*a as u64).to_le_bytes());
            }
            let reward_rounded = (ep.total_reward * 1_000_000.0).round() as i64;
            let elapsed_rounded = (ep.total_elapsed_secs * 1_000_000.0).round() as i64;
            hasher.update(reward_rounded.to_le_bytes());
            hasher.update(elapsed_rounded.to_le_bytes());
        }
        hex(&hasher.finalize())
    }

    /// Drop the per-episode log (keeps the report compact).
    pub fn without_episode_log(mut self) -> Self {
        self.episode_log.clear();
        self
    }
}

/// Factory producing a fresh policy per worker.
pub type PolicyFactory<'a> = dyn Fn() -> Box<dyn Policy> + Sync + 'a;

fn run_range(
    catalog: &Arc<ScenarioCatalog>,
    config: &EnvConfig,
    eval: &EvalConfig,
    make_policy: &PolicyFactory<'_>,
    range: std::ops::Range<usize>,
    telemetry: &mut EpisodeTelemetry,
) -> Result<Vec<EpisodeSummary>, EnvError> {
    let engine = RewardEngine::new(config.reward.clone())?;
    let mut env = ReconEnv::with_engine(Arc::clone(catalog), eval.split, engine);
    let mut policy = make_policy();
    range
        .map(|i| {
            let seed = eval.base_seed.wrapping_add(i as u64);
            run_episode(&mut env, policy.as_mut(), seed, None, i as u64, telemetry)
        })
        .collect()
}

/// Evaluate a policy over `eval.episodes` seeded episodes.
pub fn evaluate(
    catalog: Arc<ScenarioCatalog>,
    config: &EnvConfig,
    make_policy: &PolicyFactory<'_>,
    eval: &EvalConfig,
    telemetry: &mut EpisodeTelemetry,
) -> Result<EvalReport, EnvError> {
    let policy_version = make_policy().version().to_string();
    let fingerprint = catalog.fingerprint();
    let threads = eval.threads.max(1).min(eval.episodes.max(1));

    eprintln!(
        "[eval] policy={} split={} episodes={} base_seed={} threads={}",
        policy_version, eval.split, eval.episodes, eval.base_seed, threads
    );

    let episodes = if threads == 1 {
        run_range(&catalog, config, eval, make_policy, 0..eval.episodes, telemetry)?
    } else {
        if telemetry.is_enabled() {
            eprintln!("[eval] WARN: telemetry is only written with threads=1; skipping");
        }
        let chunk = eval.episodes.div_ceil(threads);
        let results: Vec<Result<Vec<EpisodeSummary>, EnvError>> = thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let start = (t * chunk).min(eval.episodes);
                    let end = ((t + 1) * chunk).min(eval.episodes);
                    let catalog = &catalog;
                    s.spawn(move || {
                        let mut silent = EpisodeTelemetry::new();
                        run_range(catalog, config, eval, make_policy, start..end, &mut silent)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });
        let mut merged = Vec::with_capacity(eval.episodes);
        for r in results {
            merged.extend(r?);
        }
        merged
    };
    telemetry.flush();

    let report = EvalReport::build(policy_version, fingerprint, eval, episodes);
    eprintln!(
        "[eval] done reward_mean={:.2} coverage_mean={:.3} stage3_rate={:.2} checksum={}",
        report.reward.mean, report.coverage.mean, report.stage3_rate, report.checksum
    );
    Ok(report)
}

/// Best rewards of every decision sequence on one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub scenario_id: String,
    pub classification: Classification,
    pub best_sequence: Vec<String>,
    pub best_reward: f64,
    /// Best total over sequences that ran port analysis.
    pub best_run_reward: f64,
    /// Best total over sequences that skipped port analysis.
    pub best_skip_reward: f64,
}

impl ScenarioComparison {
    /// Whether the classification-appropriate stage-3 decision is strictly
    /// best. `None` for classifications without a preferred decision.
    pub fn appropriate_decision_wins(&self) -> Option<bool> {
        match self.classification {
            Classification::Infrastructure => Some(self.best_run_reward > self.best_skip_reward),
            Classification::WebOnly => Some(self.best_skip_reward > self.best_run_reward),
            Classification::Hybrid | Classification::Edge => None,
        }
    }
}

/// Play all 36 legal sequences on every scenario of a split.
pub fn compare_sequences(
    catalog: Arc<ScenarioCatalog>,
    config: &EnvConfig,
    split: Split,
) -> Result<Vec<ScenarioComparison>, EnvError> {
    let engine = RewardEngine::new(config.reward.clone())?;
    let mut env = ReconEnv::with_engine(Arc::clone(&catalog), split, engine);
    let mut silent = EpisodeTelemetry::new();
    let sequences = all_sequences();

    let mut out = Vec::new();
    for scenario in catalog.scenarios(split) {
        let mut best: Option<(f64, Vec<String>)> = None;
        let mut best_run = f64::NEG_INFINITY;
        let mut best_skip = f64::NEG_INFINITY;
        for (i, seq) in sequences.iter().enumerate() {
            let mut policy = SequencePolicy::new(*seq);
            let ep = run_episode(
                &mut env,
                &mut policy,
                config.seed,
                Some(scenario.id()),
                i as u64,
                &mut silent,
            )?;
            if ep.stage3_used {
                best_run = best_run.max(ep.total_reward);
            } else {
                best_skip = best_skip.max(ep.total_reward);
            }
            if best.as_ref().map(|(r, _)| ep.total_reward > *r).unwrap_or(true) {
                best = Some((ep.total_reward, seq.iter().map(|a| a.name()).collect()));
            }
        }
        let (best_reward, best_sequence) = best.unwrap_or_default();
        out.push(ScenarioComparison {
            scenario_id: scenario.id().to_string(),
            classification: scenario.classification(),
            best_sequence,
            best_reward,
            best_run_reward: best_run,
            best_skip_reward: best_skip,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut s = RunningStats::default();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            s.push(x);
        }
        s.push(f64::NAN);
        let s = s.summary;
        assert_eq!(s.n, 8);
        assert!((s.mean - 5.0).abs() < 1e-12);
        assert_eq!((s.min, s.max), (2.0, 9.0));
        assert!((s.std - 2.138089935299395).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_has_zero_std() {
        let mut s = RunningStats::default();
        s.push(-3.5);
        assert_eq!(s.summary, StatsSummary { n: 1, mean: -3.5, std: 0.0, min: -3.5, max: -3.5 });
        assert_eq!(RunningStats::default().summary, StatsSummary::default());
    }
}
