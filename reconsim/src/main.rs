// src/main.rs
//
// reconsim command-line harness.
//
// Subcommands:
// - generate: write the built-in catalog as one file per split
// - validate: load catalog files and report per-split classification counts
// - evaluate: run a baseline policy over seeded episodes and emit a JSON report
// - compare:  play every legal decision sequence on each scenario of a split
//
// Usage:
//   cargo run -p reconsim -- generate --out-dir catalogs/ --format yaml
//   cargo run -p reconsim -- validate catalogs/train.yaml catalogs/test.yaml
//   cargo run -p reconsim -- evaluate --policy rule-based --episodes 500 --threads 4
//   cargo run -p reconsim -- compare --split test --out compare.json

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use reconsim::catalog::{ScenarioCatalog, Split};
use reconsim::config::EnvConfig;
use reconsim::eval::{compare_sequences, evaluate, EvalConfig, PolicyFactory};
use reconsim::policy::{FixedPolicy, Policy, RandomPolicy, RuleBasedPolicy};
use reconsim::scenario::Classification;
use reconsim::telemetry::EpisodeTelemetry;
use reconsim::types::Mode;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatArg {
    Json,
    Yaml,
}

impl FormatArg {
    fn extension(self) -> &'static str {
        match self {
            FormatArg::Json => "json",
            FormatArg::Yaml => "yaml",
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SplitArg {
    Train,
    Test,
}

impl From<SplitArg> for Split {
    fn from(s: SplitArg) -> Self {
        match s {
            SplitArg::Train => Split::Train,
            SplitArg::Test => Split::Test,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyArg {
    Random,
    Fixed,
    RuleBased,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Fast,
    Standard,
    Thorough,
}

impl From<ModeArg> for Mode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Fast => Mode::Fast,
            ModeArg::Standard => Mode::Standard,
            ModeArg::Thorough => Mode::Thorough,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "reconsim",
    about = "Deterministic reconnaissance tool-selection simulator",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the built-in catalog (train + test files).
    Generate {
        /// Output directory; created if missing.
        #[arg(long, default_value = "catalogs")]
        out_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,
    },

    /// Load and validate catalog files.
    Validate {
        /// One file per split (JSON or YAML by extension).
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Evaluate a baseline policy.
    Evaluate {
        #[command(flatten)]
        source: CatalogArgs,

        #[arg(long, value_enum, default_value_t = PolicyArg::RuleBased)]
        policy: PolicyArg,

        /// Tool mode for `--policy fixed`.
        #[arg(long, value_enum, default_value_t = ModeArg::Thorough)]
        mode: ModeArg,

        #[arg(long, default_value_t = 100)]
        episodes: usize,

        /// Base seed; episode i uses base_seed + i.
        #[arg(long)]
        seed: Option<u64>,

        /// Split to sample from (defaults to the config split).
        #[arg(long, value_enum)]
        split: Option<SplitArg>,

        #[arg(long, default_value_t = 1)]
        threads: usize,

        /// Keep the per-episode log in the report.
        #[arg(long)]
        episode_log: bool,

        /// Report path; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Exhaustive decision-sequence comparison on one split.
    Compare {
        #[command(flatten)]
        source: CatalogArgs,

        #[arg(long, value_enum, default_value_t = SplitArg::Test)]
        split: SplitArg,

        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, clap::Args)]
struct CatalogArgs {
    /// Catalog files; the built-in catalog is used when none are given.
    #[arg(long = "catalog")]
    catalogs: Vec<PathBuf>,

    /// Environment config YAML (defaults, then RECONSIM_CONFIG, then env overrides).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl CatalogArgs {
    fn load(&self) -> Result<(Arc<ScenarioCatalog>, EnvConfig)> {
        let catalog = if self.catalogs.is_empty() {
            let catalog = reconsim::builtin_catalog().context("building built-in catalog")?;
            eprintln!(
                "[catalog] builtin train={} test={}",
                catalog.split_len(Split::Train),
                catalog.split_len(Split::Test)
            );
            catalog
        } else {
            ScenarioCatalog::load_all(self.catalogs.as_slice()).context("loading catalog files")?
        };

        let config = match &self.config {
            Some(path) => {
                let mut cfg = EnvConfig::from_yaml_file(path)
                    .with_context(|| format!("loading config {}", path.display()))?;
                cfg.apply_env_overrides();
                cfg.reward.validate().context("validating config overrides")?;
                cfg
            }
            None => EnvConfig::from_env_or_default().context("resolving config")?,
        };
        Ok((Arc::new(catalog), config))
    }
}

fn write_output(out: Option<&Path>, json: &str) -> Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
            }
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("[reconsim] wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_generate(out_dir: &Path, format: FormatArg) -> Result<()> {
    let catalog = reconsim::builtin_catalog().context("building built-in catalog")?;
    for split in Split::ALL {
        let path = out_dir.join(format!("{}.{}", split, format.extension()));
        catalog.write_split(split, &path)?;
    }
    println!(
        "generate | scenarios={} | fingerprint={} | out_dir={}",
        catalog.len(),
        catalog.fingerprint(),
        out_dir.display()
    );
    Ok(())
}

fn cmd_validate(paths: &[PathBuf]) -> Result<()> {
    let catalog = ScenarioCatalog::load_all(paths).context("catalog failed validation")?;
    if catalog.is_empty() {
        bail!("no scenarios found in {} file(s)", paths.len());
    }
    for split in Split::ALL {
        let mut counts: BTreeMap<Classification, usize> = BTreeMap::new();
        for scenario in catalog.scenarios(split) {
            *counts.entry(scenario.classification()).or_default() += 1;
        }
        let by_class: Vec<String> = counts
            .iter()
            .map(|(class, n)| format!("{class}={n}"))
            .collect();
        println!(
            "validate | split={} | scenarios={} | {}",
            split,
            catalog.split_len(split),
            by_class.join(" ")
        );
    }
    println!("validate | OK | fingerprint={}", catalog.fingerprint());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_evaluate(
    source: &CatalogArgs,
    policy: PolicyArg,
    mode: ModeArg,
    episodes: usize,
    seed: Option<u64>,
    split: Option<SplitArg>,
    threads: usize,
    episode_log: bool,
    out: Option<&Path>,
) -> Result<()> {
    let (catalog, config) = source.load()?;
    let eval = EvalConfig {
        episodes,
        base_seed: seed.unwrap_or(config.seed),
        split: split.map(Split::from).unwrap_or(config.split),
        threads,
    };
    if catalog.split_len(eval.split) == 0 {
        bail!("split {} has no scenarios", eval.split);
    }

    let policy_seed = eval.base_seed;
    let mode = Mode::from(mode);
    let factory: Box<PolicyFactory<'_>> = match policy {
        PolicyArg::Random => {
            Box::new(move || Box::new(RandomPolicy::new(policy_seed)) as Box<dyn Policy>)
        }
        PolicyArg::Fixed => Box::new(move || Box::new(FixedPolicy::new(mode)) as Box<dyn Policy>),
        PolicyArg::RuleBased => Box::new(|| Box::new(RuleBasedPolicy::new()) as Box<dyn Policy>),
    };

    let mut telemetry = EpisodeTelemetry::from_env();
    let report = evaluate(catalog, &config, factory.as_ref(), &eval, &mut telemetry)?;
    let report = if episode_log {
        report
    } else {
        report.without_episode_log()
    };
    let json = serde_json::to_string_pretty(&report).context("serialising report")?;
    write_output(out, &json)
}

fn cmd_compare(source: &CatalogArgs, split: SplitArg, out: Option<&Path>) -> Result<()> {
    let (catalog, config) = source.load()?;
    let split = Split::from(split);
    let results = compare_sequences(catalog, &config, split)?;

    let mut wins = 0usize;
    let mut judged = 0usize;
    for r in &results {
        if let Some(won) = r.appropriate_decision_wins() {
            judged += 1;
            if won {
                wins += 1;
            }
        }
        eprintln!(
            "[compare] scenario={} class={} best={:.1} run={:.1} skip={:.1} seq={}",
            r.scenario_id,
            r.classification,
            r.best_reward,
            r.best_run_reward,
            r.best_skip_reward,
            r.best_sequence.join(",")
        );
    }
    eprintln!("[compare] appropriate_decision_wins={wins}/{judged} split={split}");

    let json = serde_json::to_string_pretty(&results).context("serialising comparison")?;
    write_output(out, &json)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate { out_dir, format } => cmd_generate(&out_dir, format),
        Command::Validate { paths } => cmd_validate(&paths),
        Command::Evaluate {
            source,
            policy,
            mode,
            episodes,
            seed,
            split,
            threads,
            episode_log,
            out,
        } => cmd_evaluate(
            &source,
            policy,
            mode,
            episodes,
            seed,
            split,
            threads,
            episode_log,
            out.as_deref(),
        ),
        Command::Compare { source, split, out } => cmd_compare(&source, split, out.as_deref()),
    }
}
