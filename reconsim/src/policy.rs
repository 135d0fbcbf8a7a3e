// src/policy.rs
//
// Baseline policies.
//
// Policies see only the observation and the action mask, never episode
// internals, so any policy here could be swapped for an external learner.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::mask::ActionMask;
use crate::observation::Observation;
use crate::types::{Action, Mode, Phase, Stage};

/// Policy trait: interface for all policy implementations.
pub trait Policy: Send {
    /// Unique version string for this policy implementation.
    fn version(&self) -> &str;

    /// Choose an action. Implementations must return a legal action whenever
    /// the mask is non-empty.
    fn act(&mut self, obs: &Observation, mask: &ActionMask) -> Action;

    /// Reset the policy for a new episode.
    fn reset_episode(&mut self, seed: u64, episode_id: u64);
}

/// `preferred` if legal, otherwise the lowest-id legal action.
fn legal_or_first(preferred: Action, mask: &ActionMask) -> Action {
    if mask.is_legal(preferred) {
        preferred
    } else {
        mask.legal().first().copied().unwrap_or(Action::Skip)
    }
}

/// Uniform over legal actions.
pub struct RandomPolicy {
    version: String,
    seed: u64,
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            version: "random-v1".to_string(),
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn version(&self) -> &str {
        &self.version
    }

    fn act(&mut self, _obs: &Observation, mask: &ActionMask) -> Action {
        let legal = mask.legal();
        if legal.is_empty() {
            return Action::Skip;
        }
        legal[self.rng.gen_range(0..legal.len())]
    }

    fn reset_episode(&mut self, seed: u64, episode_id: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed ^ seed ^ episode_id.rotate_left(32));
    }
}

/// Always the same mode, always runs port analysis.
pub struct FixedPolicy {
    version: String,
    mode: Mode,
}

impl FixedPolicy {
    pub fn new(mode: Mode) -> Self {
        Self {
            version: format!("fixed-{}-v1", mode.as_str()),
            mode,
        }
    }

    /// The "always most thorough" baseline.
    pub fn thorough() -> Self {
        Self::new(Mode::Thorough)
    }
}

impl Policy for FixedPolicy {
    fn version(&self) -> &str {
        &self.version
    }

    fn act(&mut self, obs: &Observation, mask: &ActionMask) -> Action {
        match obs.phase.stage() {
            Some(stage) => legal_or_first(Action::run(stage, self.mode), mask),
            None => legal_or_first(Action::Skip, mask),
        }
    }

    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {}
}

/// Hand-written heuristic reading the stage-3 context features.
///
/// - discovery / probing: standard mode
/// - port analysis: skip on a web-only signal, full service detection with
///   two or more infrastructure ports, a full scan when anything unusual
///   (one infra port, custom ports) is exposed
pub struct RuleBasedPolicy {
    version: String,
}

impl Default for RuleBasedPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedPolicy {
    pub fn new() -> Self {
        Self {
            version: "rule-based-v1".to_string(),
        }
    }
}

impl Policy for RuleBasedPolicy {
    fn version(&self) -> &str {
        &self.version
    }

    fn act(&mut self, obs: &Observation, mask: &ActionMask) -> Action {
        let feature = |name: &str| obs.feature(name).unwrap_or(0.0);
        let preferred = match obs.phase {
            Phase::Discovery | Phase::Probing => match obs.phase.stage() {
                Some(stage) => Action::run(stage, Mode::Standard),
                None => Action::Skip,
            },
            Phase::PortAnalysis => {
                let stage = Stage::PortAnalysis;
                if feature("web_only_signal") >= 0.5 {
                    Action::Skip
                } else if feature("stage3_value_estimate") >= 0.4 {
                    Action::run(stage, Mode::Thorough)
                } else if feature("has_infra_ports") >= 0.5 || feature("custom_ports") > 0.0 {
                    Action::run(stage, Mode::Standard)
                } else {
                    Action::Skip
                }
            }
            Phase::Done => Action::Skip,
        };
        legal_or_first(preferred, mask)
    }

    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {}
}

/// Plays a fixed three-decision sequence (used by exhaustive comparison).
pub struct SequencePolicy {
    version: String,
    actions: [Action; 3],
}

impl SequencePolicy {
    pub fn new(actions: [Action; 3]) -> Self {
        let names: Vec<String> = actions.iter().map(|a| a.name()).collect();
        Self {
            version: format!("sequence[{}]", names.join(",")),
            actions,
        }
    }

    pub fn actions(&self) -> [Action; 3] {
        self.actions
    }
}

impl Policy for SequencePolicy {
    fn version(&self) -> &str {
        &self.version
    }

    fn act(&mut self, obs: &Observation, mask: &ActionMask) -> Action {
        let idx = obs.phase.ordinal().min(2);
        legal_or_first(self.actions[idx], mask)
    }

    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {}
}

/// Every legal three-decision sequence (3 × 3 × 4 = 36).
pub fn all_sequences() -> Vec<[Action; 3]> {
    use crate::mask::legal_actions;

    let mut out = Vec::new();
    for a in legal_actions(Phase::Discovery).legal() {
        for b in legal_actions(Phase::Probing).legal() {
            for c in legal_actions(Phase::PortAnalysis).legal() {
                out.push([a, b, c]);
            }
        }
    }
    out
}
