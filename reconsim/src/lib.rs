//! reconsim core library.
//!
//! A deterministic, scenario-driven simulator for learning which
//! reconnaissance tool to run at each stage of a three-stage workflow
//! (subdomain discovery, HTTP probing, port analysis). No real network
//! activity happens: every tool invocation is answered from a pre-recorded
//! outcome table in the scenario catalog.
//!
//! # Layout
//!
//! - **Catalog** (`scenario`, `catalog`, `builtin`): validated scenarios in
//!   train / test splits, loadable from JSON or YAML, plus a built-in
//!   synthetic catalog.
//! - **Episode core** (`mask`, `discovery`, `reward`, `observation`, `env`):
//!   action masking, cumulative discovery tracking, reward shaping, the
//!   fixed-length observation vector, and the Gym-style `reset` / `step`
//!   controller (`ReconEnv`, `VecEnv`).
//! - **Harness** (`policy`, `eval`, `telemetry`): baseline policies, seeded
//!   evaluation with checksums, exhaustive sequence comparison and JSONL
//!   telemetry.
//!
//! The binary (`src/main.rs`) is a thin CLI around these components.

pub mod builtin;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod env;
pub mod eval;
pub mod mask;
pub mod observation;
pub mod policy;
pub mod reward;
pub mod scenario;
pub mod telemetry;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use builtin::builtin_catalog;
pub use catalog::{CatalogError, ScenarioCatalog, Split};
pub use config::{ConfigError, EnvConfig, RewardConfig};
pub use discovery::{DiscoveryDelta, DiscoveryTracker};
pub use env::{EnvError, ReconEnv, ResetResult, StepResult, VecEnv};
pub use eval::{compare_sequences, evaluate, run_episode, EvalConfig, EvalReport};
pub use mask::{legal_actions, ActionMask};
pub use observation::{encode, Observation, OBS_DIM, OBS_VERSION};
pub use policy::{FixedPolicy, Policy, RandomPolicy, RuleBasedPolicy, SequencePolicy};
pub use reward::{RewardBreakdown, RewardEngine};
pub use scenario::{Classification, Scenario, ScenarioRecord};
pub use telemetry::EpisodeTelemetry;
pub use types::{Action, Mode, Phase, Stage, ToolChoice};
