//! Click volume and prestige timing shared by every built-in strategy.

use idle_core::{CurrencyId, EconomyState, Requirement};
use idle_runtime::Runtime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Steady clicking at a fixed rate per currency, optionally stopping once a
/// requirement holds.
#[derive(Clone, Debug)]
pub struct ClickProfile {
    targets: BTreeMap<CurrencyId, f64>,
    stop_when: Option<Requirement>,
    /// Keep clicking while the simulator waits for the next purchase.
    active_during_wait: bool,
}

impl Default for ClickProfile {
    fn default() -> Self {
        Self {
            targets: BTreeMap::new(),
            stop_when: None,
            active_during_wait: true,
        }
    }
}

impl ClickProfile {
    /// Never clicks.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(currency: impl Into<CurrencyId>, clicks_per_second: f64) -> Self {
        Self::none().and(currency, clicks_per_second)
    }

    pub fn and(mut self, currency: impl Into<CurrencyId>, clicks_per_second: f64) -> Self {
        self.targets.insert(currency.into(), clicks_per_second);
        self
    }

    /// Stop clicking for good once `requirement` holds.
    pub fn until(mut self, requirement: Requirement) -> Self {
        self.stop_when = Some(requirement);
        self
    }

    pub fn idle_while_waiting(mut self) -> Self {
        self.active_during_wait = false;
        self
    }

    pub fn is_idle(&self) -> bool {
        self.targets.values().all(|cps| !(*cps > 0.0))
    }

    /// Clicks per second per currency right now.
    pub fn rates(&self, state: &EconomyState, waiting: bool) -> BTreeMap<CurrencyId, f64> {
        if waiting && !self.active_during_wait {
            return BTreeMap::new();
        }
        if self.stop_when.as_ref().is_some_and(|r| r.evaluate(state)) {
            return BTreeMap::new();
        }
        self.targets
            .iter()
            .filter(|(_, cps)| **cps > 0.0)
            .map(|(c, cps)| (c.clone(), *cps))
            .collect()
    }

    /// Click volume over `duration` seconds. Counts may be fractional.
    pub fn clicks(
        &self,
        state: &EconomyState,
        duration: f64,
        waiting: bool,
    ) -> BTreeMap<CurrencyId, f64> {
        if !(duration > 0.0) {
            return BTreeMap::new();
        }
        self.rates(state, waiting)
            .into_iter()
            .map(|(c, cps)| (c, cps * duration))
            .collect()
    }

    pub fn describe(&self) -> String {
        if self.is_idle() {
            return "no clicking".to_string();
        }
        let parts: Vec<String> = self
            .targets
            .iter()
            .map(|(c, cps)| format!("{cps}/s on {c}"))
            .collect();
        let mut out = format!("clicks {}", parts.join(", "));
        if self.stop_when.is_some() {
            out.push_str(" until condition");
        }
        out
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrestigePolicy {
    #[default]
    Never,
    /// Reset as soon as the layer would pay out.
    FirstOpportunity,
}

impl PrestigePolicy {
    pub fn decide(self, runtime: &Runtime, layer: &str) -> bool {
        match self {
            PrestigePolicy::Never => false,
            PrestigePolicy::FirstOpportunity => {
                matches!(runtime.prestige_reward(layer), Ok(Some(_)))
            }
        }
    }
}
