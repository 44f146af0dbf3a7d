//! Mutable economy snapshot.
//!
//! The runtime is the only writer. Strategies, the simulator and any
//! presentation layer receive `&EconomyState` and read through the query
//! helpers below.

use crate::ids::{CurrencyId, ElementId, LayerId, MilestoneId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Runtime-tracked numbers for one currency.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyState {
    /// Spendable balance, kept within `[0, cap]`.
    pub current: f64,
    /// Gross amount earned during the current run (cap losses included).
    pub total_earned: f64,
    /// Gross amount earned across every run; never reset.
    pub all_time_earned: f64,
    /// Production per second from the last pipeline pass.
    pub rate: f64,
}

/// Runtime-tracked flags for one element.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    pub count: u64,
    pub available: bool,
    pub affordable: bool,
    /// Set by an unlock effect; bypasses visibility requirements.
    pub unlocked: bool,
}

/// Satisfaction state of an estimated-duration requirement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum EstimateStatus {
    /// Satisfied by external game logic.
    Satisfied,
    /// Becomes satisfied once elapsed time reaches the deadline.
    Scheduled(f64),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EconomyState {
    pub time_elapsed: f64,
    pub currencies: BTreeMap<CurrencyId, CurrencyState>,
    pub elements: BTreeMap<ElementId, ElementState>,
    /// Fired milestones and the elapsed time at which each fired.
    pub milestones_reached: BTreeMap<MilestoneId, f64>,
    pub prestige_counts: BTreeMap<LayerId, u64>,
    /// Starts at 1, incremented by every successful prestige.
    pub run_number: u64,
    pub run_started_at: f64,
    pub estimates: BTreeMap<String, EstimateStatus>,
}

impl EconomyState {
    pub fn currency_value(&self, id: &str) -> f64 {
        self.currencies.get(id).map_or(0.0, |c| c.current)
    }

    pub fn currency_rate(&self, id: &str) -> f64 {
        self.currencies.get(id).map_or(0.0, |c| c.rate)
    }

    pub fn total_earned(&self, id: &str) -> f64 {
        self.currencies.get(id).map_or(0.0, |c| c.total_earned)
    }

    pub fn all_time_earned(&self, id: &str) -> f64 {
        self.currencies.get(id).map_or(0.0, |c| c.all_time_earned)
    }

    pub fn element_count(&self, id: &str) -> u64 {
        self.elements.get(id).map_or(0, |e| e.count)
    }

    pub fn is_unlocked(&self, id: &str) -> bool {
        self.elements.get(id).is_some_and(|e| e.unlocked)
    }

    pub fn has_milestone(&self, id: &str) -> bool {
        self.milestones_reached.contains_key(id)
    }

    pub fn milestone_time(&self, id: &str) -> Option<f64> {
        self.milestones_reached.get(id).copied()
    }

    pub fn prestige_count(&self, id: &str) -> u64 {
        self.prestige_counts.get(id).copied().unwrap_or(0)
    }

    /// Seconds elapsed since the last prestige (or the start).
    pub fn run_duration(&self) -> f64 {
        self.time_elapsed - self.run_started_at
    }

    /// Whether the estimated-duration requirement keyed `key` holds now.
    /// Unknown keys are unsatisfied.
    pub fn estimate_satisfied(&self, key: &str) -> bool {
        match self.estimates.get(key) {
            Some(EstimateStatus::Satisfied) => true,
            Some(EstimateStatus::Scheduled(at)) => self.time_elapsed >= *at,
            None => false,
        }
    }

    /// Earliest scheduled estimate deadline strictly in the future.
    pub fn next_estimate_deadline(&self) -> Option<f64> {
        self.estimates
            .values()
            .filter_map(|s| match s {
                EstimateStatus::Scheduled(at) if *at > self.time_elapsed => Some(*at),
                _ => None,
            })
            .min_by(f64::total_cmp)
    }

    /// Current balances keyed by currency.
    pub fn balances(&self) -> BTreeMap<CurrencyId, f64> {
        self.currencies
            .iter()
            .map(|(id, c)| (id.clone(), c.current))
            .collect()
    }

    /// False once any balance or rate has become NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.currencies
            .values()
            .all(|c| c.current.is_finite() && c.rate.is_finite())
    }
}
