#![deny(warnings)]

//! Headless runner for the bundled demo economy.

use anyhow::{bail, Context, Result};
use idle_ai::{PrestigePolicy, StrategyKind};
use idle_sim::demo::{cookie_definition, demo_strategy};
use idle_sim::{
    check_all, run_batch, BatchSummary, PacingBound, SimConfig, SimMode, Simulator, Terminal,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Contents of `--config <file.yaml>`. Flags override individual fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RunConfig {
    sim: SimConfig,
    /// Simulated seconds per run.
    seconds: f64,
    runs: usize,
    strategy: StrategyKind,
    prestige: PrestigePolicy,
    pacing: Vec<PacingBound>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sim: SimConfig::default(),
            seconds: 3_600.0,
            runs: 1,
            strategy: StrategyKind::default(),
            prestige: PrestigePolicy::default(),
            pacing: vec![PacingBound::NoStalls {
                severity: Default::default(),
            }],
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    mode: Option<SimMode>,
    seconds: Option<f64>,
    runs: Option<usize>,
    seed: Option<u64>,
    strategy: Option<StrategyKind>,
    prestige: Option<PrestigePolicy>,
    json: Option<PathBuf>,
}

/// Enum flags share their spelling with the YAML config.
fn parse_enum<T: DeserializeOwned>(flag: &str, value: Option<String>) -> Result<T> {
    let value = value.with_context(|| format!("{flag} needs a value"))?;
    serde_yaml::from_str(&value).with_context(|| format!("invalid value '{value}' for {flag}"))
}

fn parse_num<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T> {
    let value = value.with_context(|| format!("{flag} needs a value"))?;
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid number '{value}' for {flag}"))
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next().map(PathBuf::from),
            "--mode" => args.mode = Some(parse_enum("--mode", it.next())?),
            "--seconds" => args.seconds = Some(parse_num("--seconds", it.next())?),
            "--runs" => args.runs = Some(parse_num("--runs", it.next())?),
            "--seed" => args.seed = Some(parse_num("--seed", it.next())?),
            "--strategy" => args.strategy = Some(parse_enum("--strategy", it.next())?),
            "--prestige" => args.prestige = Some(parse_enum("--prestige", it.next())?),
            "--json" => args.json = it.next().map(PathBuf::from),
            "--version" => {
                println!("idlekit {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_SHA"));
                std::process::exit(0);
            }
            other => bail!("unknown argument '{other}'"),
        }
    }
    Ok(args)
}

fn load_config(args: &Args) -> Result<RunConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => RunConfig::default(),
    };
    if let Some(mode) = args.mode {
        cfg.sim.mode = mode;
    }
    if let Some(seconds) = args.seconds {
        cfg.seconds = seconds;
    }
    if let Some(runs) = args.runs {
        cfg.runs = runs;
    }
    if let Some(seed) = args.seed {
        cfg.sim.seed = seed;
    }
    if let Some(strategy) = args.strategy {
        cfg.strategy = strategy;
    }
    if let Some(prestige) = args.prestige {
        cfg.prestige = prestige;
    }
    cfg.sim.validate()?;
    Ok(cfg)
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args()?;
    let cfg = load_config(&args)?;
    info!(
        mode = ?cfg.sim.mode,
        seconds = cfg.seconds,
        runs = cfg.runs,
        seed = cfg.sim.seed,
        git = env!("GIT_SHA"),
        "starting CLI"
    );

    let def = Arc::new(cookie_definition()?);
    let terminal = Terminal::time(cfg.seconds);
    let make_strategy = || demo_strategy(cfg.strategy, cfg.prestige);

    if cfg.runs > 1 {
        let reports = run_batch(def, make_strategy, &terminal, &cfg.sim, cfg.runs)?;
        let summary = BatchSummary::from_reports(&reports);
        println!(
            "Batch OK | runs: {} | stalled: {} | mean time: {:.1}s",
            summary.runs, summary.stalled, summary.mean_total_time
        );
        for (id, m) in &summary.milestones {
            println!(
                "  {id}: reached {}/{} | mean {:.1}s | min {:.1}s | max {:.1}s",
                m.reached, summary.runs, m.mean, m.min, m.max
            );
        }
        if let Some(path) = &args.json {
            std::fs::write(path, serde_json::to_string_pretty(&summary)?)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        return Ok(());
    }

    let report = Simulator::new(def, make_strategy(), terminal, cfg.sim.clone())?.run()?;
    println!("{}", report.summary());
    for (id, t) in report.milestone_times() {
        println!("  milestone {id} at {t:.1}s");
    }
    let results = check_all(&cfg.pacing, &report);
    for r in &results {
        let mark = if r.passed { "ok" } else { "FAIL" };
        println!("  pacing [{mark}] {:?} {}: {}", r.severity, r.check, r.detail);
    }
    if let Some(path) = &args.json {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if results.iter().any(|r| r.is_error()) {
        bail!("pacing checks failed");
    }
    Ok(())
}
