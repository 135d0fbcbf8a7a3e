// tests/reward_tests.rs
//
// Reward contract tests on hand-built scenarios and on the built-in
// catalog:
// - all components are non-negative on every decision sequence
// - infrastructure targets reward running port analysis, web-only targets
//   reward skipping it
// - completion and efficiency only depend on coverage and elapsed time

use std::sync::Arc;

use reconsim::catalog::{ScenarioCatalog, Split};
use reconsim::config::{EnvConfig, RewardConfig};
use reconsim::env::{ReconEnv, StepResult};
use reconsim::eval::compare_sequences;
use reconsim::policy::all_sequences;
use reconsim::reward::{RewardBreakdown, RewardEngine};
use reconsim::scenario::Classification;
use reconsim::types::{Action, Mode, Stage, ToolChoice};


use scenario_testkit::{kit_catalog, wide_web_catalog, INFRA_ID, WEB_ID, WIDE_WEB_ID};

fn play(
    env: &mut ReconEnv,
    scenario_id: &str,
    actions: [Action; 3],
) -> (RewardBreakdown, StepResult) {
    env.reset(Some(0), Some(scenario_id)).unwrap();
    let mut total = RewardBreakdown::default();
    let mut last = None;
    for action in actions {
        let r = env.step(action).unwrap();
        total.accumulate(&r.info.reward);
        last = Some(r);
    }
    (total, last.expect("three steps"))
}

fn kit_env() -> ReconEnv {
    ReconEnv::new(kit_catalog(), &EnvConfig::default()).unwrap()
}

/// Test: infrastructure target, comprehensive discovery + thorough probing.
/// Running service detection beats skipping by at least the full
/// infrastructure bonus.
#[test]
fn test_infrastructure_run_beats_skip_by_strategic_bonus() {
    let mut env = kit_env();
    let engine = RewardEngine::default();
    assert_eq!(
        env.catalog().get(INFRA_ID).unwrap().classification(),
        Classification::Infrastructure
    );

    let stage1 = Action::run(Stage::Discovery, Mode::Thorough);
    let stage2 = Action::run(Stage::Probing, Mode::Standard);
    let (run, run_last) = play(
        &mut env,
        INFRA_ID,
        [stage1, stage2, Action::run(Stage::PortAnalysis, Mode::Thorough)],
    );
    let (skip, skip_last) = play(&mut env, INFRA_ID, [stage1, stage2, Action::Skip]);

    let bonus = engine.strategic_bonus(
        Classification::Infrastructure,
        ToolChoice::Ran(Mode::Thorough),
    );
    assert!(bonus > 0.0);
    assert_eq!(run.strategic, bonus);
    assert_eq!(skip.strategic, 0.0);
    assert!(
        run.total() - skip.total() >= bonus,
        "run={} skip={} bonus={}",
        run.total(),
        skip.total(),
        bonus
    );
    assert!(run_last.info.stage3_used);
    assert!(skip_last.info.stage3_skipped);
    assert_eq!(run_last.info.cumulative_reward, run.total());
}

/// Test: web-only target, fastest mode everywhere then skip. Coverage clears
/// the top tier, so the full completion bonus is paid despite the short run,
/// and neither completion nor efficiency change when port analysis runs.
#[test]
fn test_web_only_fast_skip_gets_full_completion() {
    let mut env = kit_env();
    let cfg = RewardConfig::default();
    let top = &cfg.completion_tiers[0];

    let stage1 = Action::run(Stage::Discovery, Mode::Fast);
    let stage2 = Action::run(Stage::Probing, Mode::Fast);
    let (skip, skip_last) = play(&mut env, WEB_ID, [stage1, stage2, Action::Skip]);

    assert!(skip_last.info.coverage >= top.min_coverage);
    assert_eq!(skip.completion, top.bonus);
    assert_eq!(skip.efficiency, cfg.efficiency_tiers[0].bonus);
    assert_eq!(skip.strategic, cfg.strategic.web_only_skip_bonus);

    let (run, _) = play(
        &mut env,
        WEB_ID,
        [stage1, stage2, Action::run(Stage::PortAnalysis, Mode::Fast)],
    );
    assert_eq!(run.completion, skip.completion);
    assert_eq!(run.efficiency, skip.efficiency);
    assert_eq!(run.strategic, 0.0);
    assert!(skip.total() > run.total());
}

/// Test: web-only target where port analysis is the only way past the
/// completion threshold. Fast discovery and probing leave coverage at
/// (1 + 1/5 + 1/6) / 3; any port-analysis mode lifts it to the 0.7 tier and
/// finds five new web ports, and skipping must still win.
#[test]
fn test_web_only_skip_beats_coverage_lifting_run() {
    let mut env = ReconEnv::new(wide_web_catalog(), &EnvConfig::default()).unwrap();
    let cfg = RewardConfig::default();
    let stage1 = Action::run(Stage::Discovery, Mode::Fast);
    let stage2 = Action::run(Stage::Probing, Mode::Fast);

    let (skip, skip_last) = play(&mut env, WIDE_WEB_ID, [stage1, stage2, Action::Skip]);
    assert!(skip_last.info.coverage < cfg.completion_tiers[3].min_coverage);
    assert_eq!(skip.completion, 0.0);

    for mode in Mode::ALL {
        let (run, run_last) = play(
            &mut env,
            WIDE_WEB_ID,
            [stage1, stage2, Action::run(Stage::PortAnalysis, mode)],
        );
        assert!(run_last.info.coverage >= cfg.completion_tiers[1].min_coverage);
        assert_eq!(run.completion, cfg.completion_tiers[1].bonus);
        assert!(
            skip.total() > run.total(),
            "{mode:?}: skip={} run={}",
            skip.total(),
            run.total()
        );
    }
}

/// Test: completion, strategic and efficiency are paid only on the
/// terminal step.
#[test]
fn test_episode_level_components_only_at_end() {
    let mut env = kit_env();
    env.reset(Some(0), Some(INFRA_ID)).unwrap();
    for id in [2usize, 5] {
        let r = env.step_id(id).unwrap();
        assert_eq!(r.info.reward.completion, 0.0);
        assert_eq!(r.info.reward.strategic, 0.0);
        assert_eq!(r.info.reward.efficiency, 0.0);
        assert!(r.info.reward.discovery > 0.0);
    }
}

/// Test: every component of every step is non-negative for all 36
/// sequences on every scenario in both catalogs.
#[test]
fn test_reward_components_non_negative() {
    let builtin = Arc::new(reconsim::builtin_catalog().unwrap());
    for catalog in [kit_catalog(), builtin] {
        let mut env = ReconEnv::new(Arc::clone(&catalog), &EnvConfig::default()).unwrap();
        let ids: Vec<String> = Split::ALL
            .iter()
            .flat_map(|s| catalog.ids(*s).into_iter().map(str::to_string).collect::<Vec<_>>())
            .collect();
        for id in &ids {
            for seq in all_sequences() {
                env.reset(Some(0), Some(id.as_str())).unwrap();
                for action in seq {
                    let r = env.step(action).unwrap().info.reward;
                    for v in [r.discovery, r.completion, r.strategic, r.efficiency] {
                        assert!(v >= 0.0 && v.is_finite(), "{id} {action:?}: {r:?}");
                    }
                }
            }
        }
    }
}

/// Test: the infrastructure bonus grows with port-analysis intensity.
#[test]
fn test_strategic_ordering_by_mode() {
    let engine = RewardEngine::default();
    let bonus = |m| engine.strategic_bonus(Classification::Infrastructure, ToolChoice::Ran(m));
    assert!(bonus(Mode::Fast) < bonus(Mode::Standard));
    assert!(bonus(Mode::Standard) < bonus(Mode::Thorough));
    assert_eq!(
        engine.strategic_bonus(Classification::Infrastructure, ToolChoice::Skipped),
        0.0
    );
    assert_eq!(
        engine.strategic_bonus(Classification::WebOnly, ToolChoice::Ran(Mode::Thorough)),
        0.0
    );
    assert!(engine.strategic_bonus(Classification::WebOnly, ToolChoice::Skipped) > 0.0);
}

/// Test: on the built-in catalog, the best sequence that runs port analysis
/// beats every skip sequence on infrastructure targets, and the reverse
/// holds on web-only targets.
#[test]
fn test_builtin_catalog_decision_dominance() {
    let catalog: Arc<ScenarioCatalog> = Arc::new(reconsim::builtin_catalog().unwrap());
    let cfg = EnvConfig::default();
    let mut judged = 0;
    for split in Split::ALL {
        for cmp in compare_sequences(Arc::clone(&catalog), &cfg, split).unwrap() {
            if let Some(wins) = cmp.appropriate_decision_wins() {
                judged += 1;
                assert!(
                    wins,
                    "{} ({}) run={} skip={}",
                    cmp.scenario_id, cmp.classification, cmp.best_run_reward, cmp.best_skip_reward
                );
            }
        }
    }
    assert!(judged > 0);
}

/// Test: on every built-in infrastructure target the best episode earns more
/// from the strategic bonus than from any other component, and at least 40%
/// of its total.
#[test]
fn test_strategic_component_dominates_infrastructure_rewards() {
    let catalog = Arc::new(reconsim::builtin_catalog().unwrap());
    let mut env = ReconEnv::new(Arc::clone(&catalog), &EnvConfig::default()).unwrap();
    let mut judged = 0;
    for split in Split::ALL {
        for scenario in catalog.scenarios(split) {
            if scenario.classification() != Classification::Infrastructure {
                continue;
            }
            judged += 1;
            let id = scenario.id();
            let best = all_sequences()
                .into_iter()
                .map(|seq| play(&mut env, id, seq).0)
                .max_by(|a, b| a.total().total_cmp(&b.total()))
                .unwrap();
            for other in [best.discovery, best.completion, best.efficiency] {
                assert!(best.strategic >= other, "{id}: {best:?}");
            }
            assert!(best.strategic >= 0.4 * best.total(), "{id}: {best:?}");
        }
    }
    assert!(judged > 0);
}

/// Test: a zeroed strategic config removes the decision incentive entirely.
#[test]
fn test_reward_config_is_swappable() {
    let mut cfg = RewardConfig::default();
    cfg.strategic.infra_stage3_bonus = 0.0;
    cfg.strategic.web_only_skip_bonus = 0.0;
    let engine = RewardEngine::new(cfg).unwrap();
    let mut env = ReconEnv::with_engine(kit_catalog(), Split::Train, engine);

    let (total, _) = play(
        &mut env,
        INFRA_ID,
        [
            Action::run(Stage::Discovery, Mode::Fast),
            Action::run(Stage::Probing, Mode::Fast),
            Action::run(Stage::PortAnalysis, Mode::Thorough),
        ],
    );
    assert_eq!(total.strategic, 0.0);
}
