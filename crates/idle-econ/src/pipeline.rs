//! Production pipeline: per-currency reduction of active effects into a rate.
//!
//! Reduction order is fixed:
//! `rate = Σ base * (1 + Σ bonus_add) * Π bonus_mult * Π global`.
//! Same-phase contributions commute; moving a value to another phase does not.

use idle_core::{CurrencyId, EconomyState, EffectPhase};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A resolved effect value tagged with the phase it reduces in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contribution {
    pub phase: EffectPhase,
    pub value: f64,
}

impl Contribution {
    pub fn new(phase: EffectPhase, value: f64) -> Self {
        Self { phase, value }
    }
}

/// Replacement rate computation for a single currency.
pub type RateOverride =
    Arc<dyn Fn(&CurrencyId, &[Contribution], &EconomyState) -> f64 + Send + Sync>;

/// Running totals of the four production phases.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseTotals {
    pub flat: f64,
    pub add_pct: f64,
    pub mult: f64,
    pub global: f64,
}

impl Default for PhaseTotals {
    fn default() -> Self {
        Self {
            flat: 0.0,
            add_pct: 0.0,
            mult: 1.0,
            global: 1.0,
        }
    }
}

impl PhaseTotals {
    /// Fold one contribution in. Non-production phases are ignored.
    pub fn absorb(&mut self, c: Contribution) {
        match c.phase {
            EffectPhase::Base => self.flat += c.value,
            EffectPhase::BonusAdd => self.add_pct += c.value,
            EffectPhase::BonusMult => self.mult *= c.value,
            EffectPhase::Global => self.global *= c.value,
            _ => {}
        }
    }

    pub fn from_contributions<'a>(items: impl IntoIterator<Item = &'a Contribution>) -> Self {
        let mut totals = Self::default();
        for c in items {
            totals.absorb(*c);
        }
        totals
    }

    pub fn rate(&self) -> f64 {
        self.flat * (1.0 + self.add_pct) * self.mult * self.global
    }
}

/// Two-phase aggregation `(base + Σ flat) * Π mult`, shared by click values
/// and caps. Neither has an additive-percent or global phase.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatMult {
    pub flat: f64,
    pub mult: f64,
}

impl Default for FlatMult {
    fn default() -> Self {
        Self {
            flat: 0.0,
            mult: 1.0,
        }
    }
}

impl FlatMult {
    pub fn add_flat(&mut self, v: f64) {
        self.flat += v;
    }

    pub fn add_mult(&mut self, v: f64) {
        self.mult *= v;
    }

    pub fn apply(&self, base: f64) -> f64 {
        (base + self.flat) * self.mult
    }
}

/// Rate computation with optional per-currency overrides.
#[derive(Clone, Default)]
pub struct ProductionPipeline {
    overrides: BTreeMap<CurrencyId, RateOverride>,
}

impl ProductionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default reduction for `currency`.
    pub fn set_override(&mut self, currency: CurrencyId, f: RateOverride) {
        self.overrides.insert(currency, f);
    }

    pub fn has_override(&self, currency: &str) -> bool {
        self.overrides.contains_key(currency)
    }

    /// Production per second for `currency` from its contributions, which
    /// already include the unscoped global multipliers.
    pub fn compute_rate(
        &self,
        currency: &CurrencyId,
        contributions: &[Contribution],
        state: &EconomyState,
    ) -> f64 {
        match self.overrides.get(currency) {
            Some(f) => f(currency, contributions, state),
            None => PhaseTotals::from_contributions(contributions).rate(),
        }
    }
}

impl fmt::Debug for ProductionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductionPipeline")
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}
