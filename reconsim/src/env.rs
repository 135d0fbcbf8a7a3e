// src/env.rs
//
// Episode controller: Gym-style reset/step over the scenario catalog.
//
// An episode is always exactly three decisions (discovery, probing, port
// analysis or skip). The phase enum drives a single match in `step`;
// an illegal action is rejected before any state is touched.
//
// Determinism: given the same catalog, config and reset seed, the sampled
// scenario, every observation, every reward and every info payload are
// identical across runs.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogError, ScenarioCatalog, Split};
use crate::config::{ConfigError, EnvConfig};
use crate::discovery::{DiscoverySnapshot, DiscoveryTracker};
use crate::mask::{legal_actions, ActionMask};
use crate::observation::{encode, Observation};
use crate::reward::{RewardBreakdown, RewardEngine};
use crate::scenario::{Classification, Scenario};
use crate::types::{Action, Mode, Phase, Stage, ToolChoice};

/// Returned by `reset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResult {
    pub observation: Observation,
    pub mask: ActionMask,
    pub info: ResetInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetInfo {
    pub scenario_id: String,
    pub classification: Classification,
    /// Split the scenario belongs to.
    pub split: Option<Split>,
    pub seed: u64,
}

/// Result of a single environment step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The observation after taking the action.
    pub observation: Observation,
    /// Total reward of this step.
    pub reward: f64,
    /// True after the port-analysis decision.
    pub terminated: bool,
    /// Always false: episodes have a fixed length.
    pub truncated: bool,
    /// Legal actions for the next step (empty once terminated).
    pub mask: ActionMask,
    pub info: StepInfo,
}

/// Additional information returned from a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInfo {
    pub scenario_id: String,
    /// Phase after the step.
    pub phase: Phase,
    /// 1-based step index.
    pub step: u32,
    pub action: String,
    pub action_id: usize,
    pub reward: RewardBreakdown,
    pub cumulative_reward: f64,
    pub discovery: DiscoverySnapshot,
    pub coverage: f64,
    pub stage3_used: bool,
    pub stage3_mode: Option<Mode>,
    pub stage3_skipped: bool,
    pub total_elapsed_secs: f64,
}

/// Errors returned by the controller.
#[derive(Debug, Clone)]
pub enum EnvError {
    IllegalAction { action_id: usize, phase: Phase },
    NoActiveEpisode,
    Catalog(CatalogError),
    Config(ConfigError),
}

impl std::fmt::Display for EnvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvError::IllegalAction { action_id, phase } => {
                write!(f, "Action {} is illegal in phase {}", action_id, phase)
            }
            EnvError::NoActiveEpisode => write!(f, "No active episode: call reset first"),
            EnvError::Catalog(e) => write!(f, "{}", e),
            EnvError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EnvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EnvError::Catalog(e) => Some(e),
            EnvError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CatalogError> for EnvError {
    fn from(e: CatalogError) -> Self {
        EnvError::Catalog(e)
    }
}

impl From<ConfigError> for EnvError {
    fn from(e: ConfigError) -> Self {
        EnvError::Config(e)
    }
}

/// Per-episode state, owned by the controller.
#[derive(Debug, Clone)]
pub struct EpisodeState {
    scenario: Arc<Scenario>,
    phase: Phase,
    step: u32,
    tracker: DiscoveryTracker,
    cumulative: RewardBreakdown,
    seed: u64,
}

impl EpisodeState {
    fn new(scenario: Arc<Scenario>, seed: u64) -> Self {
        Self {
            scenario,
            phase: Phase::Discovery,
            step: 0,
            tracker: DiscoveryTracker::new(),
            cumulative: RewardBreakdown::default(),
            seed,
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn step_index(&self) -> u32 {
        self.step
    }

    pub fn tracker(&self) -> &DiscoveryTracker {
        &self.tracker
    }

    /// Component-wise reward accumulated so far.
    pub fn cumulative(&self) -> &RewardBreakdown {
        &self.cumulative
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn observation(&self) -> Observation {
        encode(&self.scenario, &self.tracker, self.phase)
    }
}

/// Reconnaissance tool-selection environment.
pub struct ReconEnv {
    catalog: Arc<ScenarioCatalog>,
    split: Split,
    engine: RewardEngine,
    rng: ChaCha8Rng,
    episode: Option<EpisodeState>,
}

impl ReconEnv {
    pub fn new(catalog: Arc<ScenarioCatalog>, config: &EnvConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            catalog,
            split: config.split,
            engine: RewardEngine::new(config.reward.clone())?,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            episode: None,
        })
    }

    /// Construct with an already-validated engine.
    pub fn with_engine(catalog: Arc<ScenarioCatalog>, split: Split, engine: RewardEngine) -> Self {
        Self {
            catalog,
            split,
            engine,
            rng: ChaCha8Rng::seed_from_u64(0),
            episode: None,
        }
    }

    /// Start a new episode.
    ///
    /// Without a seed, one is drawn from the controller's own RNG. Without
    /// a scenario id, a scenario is sampled uniformly from the configured
    /// split using the episode seed.
    pub fn reset(
        &mut self,
        seed: Option<u64>,
        scenario_id: Option<&str>,
    ) -> Result<ResetResult, EnvError> {
        let seed = seed.unwrap_or_else(|| self.rng.gen());
        let mut episode_rng = ChaCha8Rng::seed_from_u64(seed);
        let scenario = match scenario_id {
            Some(id) => self.catalog.get(id)?,
            None => self.catalog.sample(&mut episode_rng, self.split)?,
        };

        let state = EpisodeState::new(scenario, seed);
        let result = ResetResult {
            observation: state.observation(),
            mask: legal_actions(state.phase),
            info: ResetInfo {
                scenario_id: state.scenario.id().to_string(),
                classification: state.scenario.classification(),
                split: self.catalog.split_of(state.scenario.id()),
                seed,
            },
        };
        self.episode = Some(state);
        Ok(result)
    }

    /// Apply one decision.
    pub fn step(&mut self, action: Action) -> Result<StepResult, EnvError> {
        let state = self.episode.as_mut().ok_or(EnvError::NoActiveEpisode)?;
        let phase = state.phase;
        if !legal_actions(phase).is_legal(action) {
            return Err(EnvError::IllegalAction {
                action_id: action.id(),
                phase,
            });
        }

        let delta = match (phase, action) {
            (Phase::Discovery | Phase::Probing | Phase::PortAnalysis, Action::Run { stage, mode }) => {
                state.tracker.apply(&state.scenario, stage, mode)
            }
            (Phase::PortAnalysis, Action::Skip) => state.tracker.skip(),
            (_, _) => {
                return Err(EnvError::IllegalAction {
                    action_id: action.id(),
                    phase,
                })
            }
        };

        let breakdown = self.engine.score(&state.scenario, &state.tracker, &delta);
        state.cumulative.accumulate(&breakdown);
        state.step += 1;
        state.phase = phase.next();

        let terminated = state.phase == Phase::Done;
        let stage3 = state.tracker.usage(Stage::PortAnalysis);
        let info = StepInfo {
            scenario_id: state.scenario.id().to_string(),
            phase: state.phase,
            step: state.step,
            action: action.name(),
            action_id: action.id(),
            reward: breakdown,
            cumulative_reward: state.cumulative.total(),
            discovery: state.tracker.snapshot(),
            coverage: state.tracker.coverage(state.scenario.expected()),
            stage3_used: stage3.map(|u| u.choice != ToolChoice::Skipped).unwrap_or(false),
            stage3_mode: stage3.and_then(|u| u.choice.mode()),
            stage3_skipped: stage3.map(|u| u.choice == ToolChoice::Skipped).unwrap_or(false),
            total_elapsed_secs: state.tracker.elapsed_secs(),
        };

        Ok(StepResult {
            observation: state.observation(),
            reward: breakdown.total(),
            terminated,
            truncated: false,
            mask: legal_actions(state.phase),
            info,
        })
    }

    /// Step with an integer action id (serialisation boundary).
    pub fn step_id(&mut self, action_id: usize) -> Result<StepResult, EnvError> {
        let phase = self
            .episode
            .as_ref()
            .map(|e| e.phase)
            .ok_or(EnvError::NoActiveEpisode)?;
        let action =
            Action::from_id(action_id).ok_or(EnvError::IllegalAction { action_id, phase })?;
        self.step(action)
    }

    /// Legal actions in the current phase (empty without an episode).
    pub fn action_mask(&self) -> ActionMask {
        self.episode
            .as_ref()
            .map(|e| legal_actions(e.phase))
            .unwrap_or_else(ActionMask::none)
    }

    pub fn episode(&self) -> Option<&EpisodeState> {
        self.episode.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.episode
            .as_ref()
            .map(|e| e.phase == Phase::Done)
            .unwrap_or(true)
    }

    pub fn catalog(&self) -> &Arc<ScenarioCatalog> {
        &self.catalog
    }

    pub fn engine(&self) -> &RewardEngine {
        &self.engine
    }

    pub fn split(&self) -> Split {
        self.split
    }
}

/// Vectorised environment: N independent controllers sharing one catalog.
pub struct VecEnv {
    envs: Vec<ReconEnv>,
}

impl VecEnv {
    pub fn new(
        n: usize,
        catalog: Arc<ScenarioCatalog>,
        config: &EnvConfig,
    ) -> Result<Self, ConfigError> {
        let envs = (0..n)
            .map(|i| {
                let mut cfg = config.clone();
                cfg.seed = config.seed.wrapping_add(i as u64);
                ReconEnv::new(Arc::clone(&catalog), &cfg)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { envs })
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// Reset all environments; envs without an explicit seed draw their own.
    pub fn reset_all(&mut self, seeds: Option<&[u64]>) -> Result<Vec<ResetResult>, EnvError> {
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| {
                let seed = seeds.and_then(|s| s.get(i).copied());
                env.reset(seed, None)
            })
            .collect()
    }

    /// Step all environments. `actions` must have one entry per environment.
    pub fn step(&mut self, actions: &[Action]) -> Vec<Result<StepResult, EnvError>> {
        assert_eq!(
            actions.len(),
            self.envs.len(),
            "Actions length must match number of environments"
        );
        self.envs
            .iter_mut()
            .zip(actions.iter())
            .map(|(env, action)| env.step(*action))
            .collect()
    }

    pub fn masks(&self) -> Vec<ActionMask> {
        self.envs.iter().map(|e| e.action_mask()).collect()
    }

    pub fn dones(&self) -> Vec<bool> {
        self.envs.iter().map(|e| e.is_done()).collect()
    }

    pub fn envs(&self) -> &[ReconEnv] {
        &self.envs
    }
}
