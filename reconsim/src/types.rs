// src/types.rs
//
// Core value types shared by every layer of the simulator:
// - Stage / Mode: the three ordered tool stages and their intensity tiers
// - Phase: explicit episode phase (drives the controller's single match)
// - Action: tagged action variant (tool run or stage-3 skip)
// - ToolChoice: what was decided for a stage (ran a mode, or skipped)
//
// Integer action ids exist only at the serialisation boundary
// (`Action::id` / `Action::from_id`).

use serde::{Deserialize, Serialize};

/// Number of tool stages in the workflow.
pub const NUM_STAGES: usize = 3;
/// Number of intensity modes per stage.
pub const NUM_MODES: usize = 3;
/// Number of tool actions (stage × mode).
pub const NUM_TOOL_ACTIONS: usize = NUM_STAGES * NUM_MODES;
/// Reserved id of the stage-3 skip action.
pub const SKIP_ACTION_ID: usize = NUM_TOOL_ACTIONS;
/// Size of the learner-facing action space (tool actions + skip).
pub const ACTION_SPACE_SIZE: usize = NUM_TOOL_ACTIONS + 1;

/// One of the three ordered workflow stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Subdomain discovery.
    Discovery,
    /// Live endpoint probing.
    Probing,
    /// Port and service analysis (optional).
    PortAnalysis,
}

impl Stage {
    pub const ALL: [Stage; NUM_STAGES] = [Stage::Discovery, Stage::Probing, Stage::PortAnalysis];

    pub fn index(self) -> usize {
        match self {
            Stage::Discovery => 0,
            Stage::Probing => 1,
            Stage::PortAnalysis => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Stage::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Probing => "probing",
            Stage::PortAnalysis => "port_analysis",
        }
    }

    /// Tool-flavoured name of a mode within this stage.
    pub fn mode_name(self, mode: Mode) -> &'static str {
        match (self, mode) {
            (Stage::Discovery, Mode::Fast) => "passive",
            (Stage::Discovery, Mode::Standard) => "active",
            (Stage::Discovery, Mode::Thorough) => "comprehensive",
            (Stage::Probing, Mode::Fast) => "basic",
            (Stage::Probing, Mode::Standard) => "thorough",
            (Stage::Probing, Mode::Thorough) => "comprehensive",
            (Stage::PortAnalysis, Mode::Fast) => "quick",
            (Stage::PortAnalysis, Mode::Standard) => "full",
            (Stage::PortAnalysis, Mode::Thorough) => "service",
        }
    }

    /// Parse a mode from this stage's tool name or, failing that, its
    /// generic name. Tool names win: probing "thorough" is the standard mode.
    pub fn parse_mode(self, name: &str) -> Option<Mode> {
        let name = name.trim().to_ascii_lowercase();
        Mode::ALL
            .into_iter()
            .find(|m| self.mode_name(*m) == name)
            .or_else(|| Mode::ALL.into_iter().find(|m| m.as_str() == name))
    }

    /// The phase in which this stage is played.
    pub fn phase(self) -> Phase {
        match self {
            Stage::Discovery => Phase::Discovery,
            Stage::Probing => Phase::Probing,
            Stage::PortAnalysis => Phase::PortAnalysis,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intensity tier within a stage, ordered from cheapest to most thorough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Fast,
    Standard,
    Thorough,
}

impl Mode {
    pub const ALL: [Mode; NUM_MODES] = [Mode::Fast, Mode::Standard, Mode::Thorough];

    pub fn index(self) -> usize {
        match self {
            Mode::Fast => 0,
            Mode::Standard => 1,
            Mode::Thorough => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Mode> {
        Mode::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Fast => "fast",
            Mode::Standard => "standard",
            Mode::Thorough => "thorough",
        }
    }
}

/// Explicit episode phase. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discovery,
    Probing,
    PortAnalysis,
    Done,
}

impl Phase {
    /// The stage played in this phase, if any.
    pub fn stage(self) -> Option<Stage> {
        match self {
            Phase::Discovery => Some(Stage::Discovery),
            Phase::Probing => Some(Stage::Probing),
            Phase::PortAnalysis => Some(Stage::PortAnalysis),
            Phase::Done => None,
        }
    }

    /// Deterministic successor phase.
    pub fn next(self) -> Phase {
        match self {
            Phase::Discovery => Phase::Probing,
            Phase::Probing => Phase::PortAnalysis,
            Phase::PortAnalysis | Phase::Done => Phase::Done,
        }
    }

    /// Number of completed stages when this phase is current.
    pub fn ordinal(self) -> usize {
        match self {
            Phase::Discovery => 0,
            Phase::Probing => 1,
            Phase::PortAnalysis => 2,
            Phase::Done => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Discovery => "discovery",
            Phase::Probing => "probing",
            Phase::PortAnalysis => "port_analysis",
            Phase::Done => "done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action proposed by a learner or baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Run the stage's tool in the given mode.
    Run { stage: Stage, mode: Mode },
    /// Decline the optional port-analysis stage.
    Skip,
}

impl Action {
    pub fn run(stage: Stage, mode: Mode) -> Self {
        Action::Run { stage, mode }
    }

    /// Stable integer id: `stage * 3 + mode` for tool actions, 9 for skip.
    pub fn id(self) -> usize {
        match self {
            Action::Run { stage, mode } => stage.index() * NUM_MODES + mode.index(),
            Action::Skip => SKIP_ACTION_ID,
        }
    }

    pub fn from_id(id: usize) -> Option<Action> {
        if id == SKIP_ACTION_ID {
            return Some(Action::Skip);
        }
        let stage = Stage::from_index(id / NUM_MODES)?;
        let mode = Mode::from_index(id % NUM_MODES)?;
        Some(Action::Run { stage, mode })
    }

    /// All actions in id order.
    pub fn all() -> impl Iterator<Item = Action> {
        (0..ACTION_SPACE_SIZE).filter_map(Action::from_id)
    }

    /// Stage this action belongs to (skip belongs to port analysis).
    pub fn stage(self) -> Stage {
        match self {
            Action::Run { stage, .. } => stage,
            Action::Skip => Stage::PortAnalysis,
        }
    }

    pub fn choice(self) -> ToolChoice {
        match self {
            Action::Run { mode, .. } => ToolChoice::Ran(mode),
            Action::Skip => ToolChoice::Skipped,
        }
    }

    /// Human-readable name, e.g. `discovery_comprehensive` or `skip_port_analysis`.
    pub fn name(self) -> String {
        match self {
            Action::Run { stage, mode } => format!("{}_{}", stage.as_str(), stage.mode_name(mode)),
            Action::Skip => "skip_port_analysis".to_string(),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name(), self.id())
    }
}

/// Decision recorded for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "decision", content = "mode", rename_all = "snake_case")]
pub enum ToolChoice {
    Ran(Mode),
    Skipped,
}

impl ToolChoice {
    pub fn mode(self) -> Option<Mode> {
        match self {
            ToolChoice::Ran(mode) => Some(mode),
            ToolChoice::Skipped => None,
        }
    }
}
