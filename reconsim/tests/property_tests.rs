//! Property tests for the episode core over the built-in catalog, and for
//! the stage-3 decision incentive over generated targets.
//!
//! Reproduce: `PROPTEST_SEED=<seed> cargo test -p reconsim --test property_tests`

use std::sync::{Arc, OnceLock};

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use reconsim::builtin::{generate_record, TargetProfile};
use reconsim::catalog::{ScenarioCatalog, Split};
use reconsim::config::EnvConfig;
use reconsim::discovery::DiscoveryTracker;
use reconsim::env::ReconEnv;
use reconsim::mask::legal_actions;
use reconsim::observation::{encode, OBS_DIM};
use reconsim::scenario::{ports, Classification, Complexity, Scenario};
use reconsim::types::{Action, Mode, Phase, Stage};

fn catalog() -> Arc<ScenarioCatalog> {
    static CATALOG: OnceLock<Arc<ScenarioCatalog>> = OnceLock::new();
    Arc::clone(CATALOG.get_or_init(|| {
        Arc::new(reconsim::builtin_catalog().expect("built-in catalog"))
    }))
}

fn action_ids(d: usize, p: usize, s: usize) -> [usize; 3] {
    [d, 3 + p, 6 + s]
}

const TECH_POOL: &[&str] = &["Nginx", "React", "MySQL", "Redis", "Docker", "Go"];
/// Ports that are neither web nor infrastructure.
const OTHER_PORTS: &[u16] = &[4000, 8081, 9000, 9090];
const COMPLEXITIES: [Complexity; 4] = [
    Complexity::Low,
    Complexity::Medium,
    Complexity::High,
    Complexity::VeryHigh,
];

fn pick(pool: &[u16], mask: u32) -> Vec<u16> {
    pool.iter()
        .enumerate()
        .filter(|(i, _)| mask >> i & 1 == 1)
        .map(|(_, p)| *p)
        .collect()
}

/// Generate a validated one-scenario catalog from a synthetic profile.
fn generated_catalog(
    id: &str,
    port_list: &[u16],
    subdomains: usize,
    techs: usize,
    complexity: usize,
) -> Arc<ScenarioCatalog> {
    let profile = TargetProfile {
        id,
        label: "Generated Target",
        description: "randomly generated target",
        domain: "gen.example.net",
        complexity: COMPLEXITIES[complexity],
        subdomains,
        ports: port_list,
        technologies: &TECH_POOL[..techs],
        split: Split::Train,
    };
    let scenario = Scenario::from_record(generate_record(&profile)).unwrap();
    let mut catalog = ScenarioCatalog::new();
    catalog.insert(Split::Train, scenario).unwrap();
    Arc::new(catalog)
}

/// For every stage-1 / stage-2 prefix, compare the skip total against
/// every port-analysis mode.
fn check_stage3_decision(
    catalog: Arc<ScenarioCatalog>,
    id: &str,
    class: Classification,
) -> Result<(), TestCaseError> {
    let mut env = ReconEnv::new(catalog, &EnvConfig::default()).unwrap();
    let mut play = |seq: [Action; 3]| {
        env.reset(Some(0), Some(id)).unwrap();
        seq.into_iter().map(|a| env.step(a).unwrap().reward).sum::<f64>()
    };
    for first in legal_actions(Phase::Discovery).legal() {
        for second in legal_actions(Phase::Probing).legal() {
            let skip = play([first, second, Action::Skip]);
            for mode in Mode::ALL {
                let run = play([first, second, Action::run(Stage::PortAnalysis, mode)]);
                match class {
                    Classification::Infrastructure => prop_assert!(
                        run > skip,
                        "{} {:?}/{:?}/{:?}: run={} skip={}", id, first, second, mode, run, skip
                    ),
                    Classification::WebOnly => prop_assert!(
                        skip > run,
                        "{} {:?}/{:?}/{:?}: run={} skip={}", id, first, second, mode, run, skip
                    ),
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Cumulative counters never decrease, observations stay in [0, 1],
    /// every reward component is non-negative, and only the third step
    /// terminates.
    #[test]
    fn test_episode_invariants(
        seed in any::<u64>(),
        test_split in any::<bool>(),
        d in 0usize..3,
        p in 0usize..3,
        s in 0usize..4,
    ) {
        let cfg = EnvConfig {
            split: if test_split { Split::Test } else { Split::Train },
            ..EnvConfig::default()
        };
        let mut env = ReconEnv::new(catalog(), &cfg).unwrap();
        let reset = env.reset(Some(seed), None).unwrap();
        prop_assert_eq!(reset.observation.features.len(), OBS_DIM);

        let mut prev = env.episode().unwrap().tracker().snapshot();
        for (i, id) in action_ids(d, p, s).into_iter().enumerate() {
            let r = env.step_id(id).unwrap();
            let now = r.info.discovery;
            prop_assert!(prev.counts.first_exceeding(&now.counts).is_none(), "{:?} -> {:?}", prev, now);
            prop_assert!(now.elapsed_secs >= prev.elapsed_secs);
            prop_assert_eq!(r.terminated, i == 2);
            prop_assert!(!r.truncated);

            prop_assert_eq!(r.observation.features.len(), OBS_DIM);
            for (k, v) in r.observation.features.iter().enumerate() {
                prop_assert!((0.0..=1.0).contains(v), "feature {} = {}", k, v);
            }
            let rw = r.info.reward;
            for v in [rw.discovery, rw.completion, rw.strategic, rw.efficiency] {
                prop_assert!(v >= 0.0);
            }
            prop_assert!((0.0..=1.0).contains(&r.info.coverage));
            prev = now;
        }
        prop_assert!(env.is_done());
    }

    /// Two episodes with the same seed and actions serialize identically.
    #[test]
    fn test_reset_determinism(
        seed in any::<u64>(),
        d in 0usize..3,
        p in 0usize..3,
        s in 0usize..4,
    ) {
        let run = || {
            let mut env = ReconEnv::new(catalog(), &EnvConfig::default()).unwrap();
            let reset = env.reset(Some(seed), None).unwrap();
            let mut out = reset.observation.to_canonical_json().unwrap();
            for id in action_ids(d, p, s) {
                let r = env.step_id(id).unwrap();
                out.extend(serde_json::to_vec(&r).unwrap());
            }
            out
        };
        prop_assert_eq!(run(), run());
    }

    /// Encoding the same state twice gives the same vector.
    #[test]
    fn test_encode_determinism(
        idx in 0usize..20,
        modes in proptest::collection::vec(0usize..3, 3),
    ) {
        let catalog = catalog();
        let scenarios = catalog.scenarios(Split::Train);
        let scenario = &scenarios[idx % scenarios.len()];

        let mut a = DiscoveryTracker::new();
        let mut b = DiscoveryTracker::new();
        for (stage, m) in Stage::ALL.into_iter().zip(&modes) {
            let mode = Mode::from_index(*m).unwrap();
            a.apply(scenario, stage, mode);
            b.apply(scenario, stage, mode);
        }
        prop_assert_eq!(
            encode(scenario, &a, Phase::Done).to_canonical_json().unwrap(),
            encode(scenario, &b, Phase::Done).to_canonical_json().unwrap()
        );
    }

    /// A heavier mode never discovers less or takes less time on a fresh
    /// tracker.
    #[test]
    fn test_mode_monotonicity(idx in 0usize..25, stage_idx in 0usize..3) {
        let catalog = catalog();
        let all: Vec<_> = Split::ALL
            .iter()
            .flat_map(|s| catalog.scenarios(*s).iter().cloned())
            .collect();
        let scenario = &all[idx % all.len()];
        let stage = Stage::from_index(stage_idx).unwrap();

        let run = |mode| {
            let mut t = DiscoveryTracker::new();
            t.apply(scenario, stage, mode);
            t.snapshot()
        };
        for pair in Mode::ALL.windows(2) {
            let lo = run(pair[0]);
            let hi = run(pair[1]);
            prop_assert!(lo.counts.first_exceeding(&hi.counts).is_none());
            prop_assert!(lo.elapsed_secs <= hi.elapsed_secs);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Skipping port analysis strictly beats running it in any mode on any
    /// web-only target, after any first two decisions.
    #[test]
    fn test_web_only_skip_dominates(
        variant in any::<u32>(),
        web_mask in 1u32..(1 << 6),
        subdomains in 1usize..26,
        techs in 1usize..=6,
        complexity in 0usize..4,
    ) {
        let port_list = pick(ports::WEB_PORTS, web_mask);
        let id = format!("gen_web_{variant}");
        let catalog = generated_catalog(&id, &port_list, subdomains, techs, complexity);
        prop_assert_eq!(catalog.get(&id).unwrap().classification(), Classification::WebOnly);
        check_stage3_decision(catalog, &id, Classification::WebOnly)?;
    }

    /// Running port analysis in any mode strictly beats skipping it on any
    /// infrastructure target, after any first two decisions.
    #[test]
    fn test_infrastructure_run_dominates(
        variant in any::<u32>(),
        infra_mask in any::<u16>(),
        web_mask in 0u32..(1 << 6),
        other_mask in 0u32..(1 << 4),
        subdomains in 1usize..26,
        techs in 1usize..=6,
        complexity in 0usize..4,
    ) {
        let infra = pick(ports::INFRA_PORTS, u32::from(infra_mask));
        prop_assume!(infra.len() >= 2);
        let mut port_list = infra;
        port_list.extend(pick(ports::WEB_PORTS, web_mask));
        port_list.extend(pick(OTHER_PORTS, other_mask));

        let id = format!("gen_infra_{variant}");
        let catalog = generated_catalog(&id, &port_list, subdomains, techs, complexity);
        prop_assert_eq!(
            catalog.get(&id).unwrap().classification(),
            Classification::Infrastructure
        );
        check_stage3_decision(catalog, &id, Classification::Infrastructure)?;
    }
}
