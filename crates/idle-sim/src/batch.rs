//! Monte-Carlo batches of independent seeded runs.

use crate::config::SimConfig;
use crate::report::SimReport;
use crate::simulator::{SimError, Simulator};
use crate::terminal::Terminal;
use idle_ai::Strategy;
use idle_core::MilestoneId;
use idle_runtime::GameDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use tracing::info;

/// Distribution of one milestone's firing time across a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MilestoneStats {
    /// Runs in which it fired.
    pub reached: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub runs: usize,
    pub stalled: usize,
    pub milestones: BTreeMap<MilestoneId, MilestoneStats>,
    pub mean_total_time: f64,
}

impl BatchSummary {
    pub fn from_reports(reports: &[SimReport]) -> Self {
        let mut times: BTreeMap<MilestoneId, Vec<f64>> = BTreeMap::new();
        for r in reports {
            for (id, t) in r.milestone_times() {
                times.entry(id).or_default().push(t);
            }
        }
        let milestones = times
            .into_iter()
            .map(|(id, ts)| {
                let stats = MilestoneStats {
                    reached: ts.len(),
                    mean: ts.iter().sum::<f64>() / ts.len() as f64,
                    min: ts.iter().copied().fold(f64::INFINITY, f64::min),
                    max: ts.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                };
                (id, stats)
            })
            .collect();
        let mean_total_time = if reports.is_empty() {
            0.0
        } else {
            reports.iter().map(|r| r.total_time).sum::<f64>() / reports.len() as f64
        };
        Self {
            runs: reports.len(),
            stalled: reports.iter().filter(|r| r.stalled()).count(),
            milestones,
            mean_total_time,
        }
    }
}

/// Run `runs` independent simulations across scoped worker threads. Run `i`
/// gets a fresh runtime, a fresh strategy from `make_strategy` and seed
/// `config.seed + i`. Reports come back in run order.
pub fn run_batch<S, F>(
    def: Arc<GameDefinition>,
    make_strategy: F,
    terminal: &Terminal,
    config: &SimConfig,
    runs: usize,
) -> Result<Vec<SimReport>, SimError>
where
    S: Strategy,
    F: Fn() -> S + Sync,
{
    config.validate()?;
    if runs == 0 {
        return Ok(Vec::new());
    }
    let workers = thread::available_parallelism()
        .map_or(1, |n| n.get())
        .min(runs);
    let chunk = runs.div_ceil(workers);
    info!(runs, workers, seed = config.seed, "starting batch");

    let results: Vec<Result<SimReport, SimError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|w| {
                let def = &def;
                let make_strategy = &make_strategy;
                scope.spawn(move || {
                    let end = ((w + 1) * chunk).min(runs);
                    (w * chunk..end)
                        .map(|i| {
                            let cfg = SimConfig {
                                seed: config.seed.wrapping_add(i as u64),
                                ..config.clone()
                            };
                            Simulator::new(Arc::clone(def), make_strategy(), terminal.clone(), cfg)?
                                .run()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(reports) => reports,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });
    results.into_iter().collect()
}
