//! Result of one simulation run and the pacing metrics derived from it.

use crate::config::SimMode;
use crate::metrics::SimEvent;
use idle_core::{CurrencyId, EconomyState, MilestoneId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why the run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimOutcome {
    TerminalMet,
    /// No further progress is reachable.
    Stalled,
    IterationLimit,
    /// A balance or rate became NaN or infinite.
    NonFinite,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimReport {
    pub strategy: String,
    pub terminal: String,
    pub mode: SimMode,
    pub seed: u64,
    pub outcome: SimOutcome,
    pub total_time: f64,
    pub iterations: u64,
    pub events: Vec<SimEvent>,
    pub final_state: EconomyState,
}

impl SimReport {
    pub fn stalled(&self) -> bool {
        self.outcome == SimOutcome::Stalled
    }

    pub fn purchase_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SimEvent::Purchase { .. }))
            .count()
    }

    pub fn purchase_times(&self) -> Vec<f64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Purchase { time, .. } => Some(*time),
                _ => None,
            })
            .collect()
    }

    /// First firing time of each milestone reached during the run.
    pub fn milestone_times(&self) -> BTreeMap<MilestoneId, f64> {
        let mut out = BTreeMap::new();
        for e in &self.events {
            if let SimEvent::Milestone { time, milestone } = e {
                out.entry(milestone.clone()).or_insert(*time);
            }
        }
        out
    }

    /// `(start, length)` of every gap between purchases. The first gap of
    /// each run starts at t=0 or at the prestige that began it.
    pub fn gaps_with_start(&self) -> Vec<(f64, f64)> {
        let mut anchor = 0.0;
        let mut gaps = Vec::new();
        for e in &self.events {
            match e {
                SimEvent::Purchase { time, .. } => {
                    gaps.push((anchor, time - anchor));
                    anchor = *time;
                }
                SimEvent::Prestige { time, .. } => anchor = *time,
                _ => {}
            }
        }
        gaps
    }

    pub fn purchase_gaps(&self) -> Vec<f64> {
        self.gaps_with_start().into_iter().map(|(_, g)| g).collect()
    }

    pub fn max_gap(&self) -> f64 {
        self.purchase_gaps().into_iter().fold(0.0, f64::max)
    }

    pub fn mean_gap(&self) -> f64 {
        let gaps = self.purchase_gaps();
        if gaps.is_empty() {
            return 0.0;
        }
        gaps.iter().sum::<f64>() / gaps.len() as f64
    }

    /// Seconds spent waiting with nothing bought.
    pub fn total_wait(&self) -> f64 {
        self.events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Wait { duration, .. } => Some(*duration),
                _ => None,
            })
            .sum()
    }

    /// Share of simulated time spent waiting, in `[0, 1]`.
    pub fn dead_time_ratio(&self) -> f64 {
        if self.total_time > 0.0 {
            (self.total_wait() / self.total_time).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn purchases_per_minute(&self) -> f64 {
        if self.total_time > 0.0 {
            self.purchase_count() as f64 / (self.total_time / 60.0)
        } else {
            0.0
        }
    }

    /// `(time, balance)` pairs from the snapshots.
    pub fn currency_series(&self, currency: &str) -> Vec<(f64, f64)> {
        self.snapshot_series(|currencies, _| currencies.get(currency).copied())
    }

    /// `(time, rate)` pairs from the snapshots.
    pub fn rate_series(&self, currency: &str) -> Vec<(f64, f64)> {
        self.snapshot_series(|_, rates| rates.get(currency).copied())
    }

    fn snapshot_series<F>(&self, pick: F) -> Vec<(f64, f64)>
    where
        F: Fn(&BTreeMap<CurrencyId, f64>, &BTreeMap<CurrencyId, f64>) -> Option<f64>,
    {
        self.events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Snapshot {
                    time,
                    currencies,
                    rates,
                    ..
                } => pick(currencies, rates).map(|v| (*time, v)),
                _ => None,
            })
            .collect()
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "{:?} after {:.1}s | purchases: {} | max gap: {:.1}s | mean gap: {:.1}s | dead time: {:.1}% | strategy: {}",
            self.outcome,
            self.total_time,
            self.purchase_count(),
            self.max_gap(),
            self.mean_gap(),
            self.dead_time_ratio() * 100.0,
            self.strategy,
        )
    }
}
