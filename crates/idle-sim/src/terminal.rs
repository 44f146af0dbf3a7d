//! Conditions that end a simulation run.

use idle_core::{CompareOp, CurrencyId, EconomyState, ElementId, MilestoneId};
use idle_runtime::Runtime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Absorbs float drift when elapsed time is accumulated tick by tick.
const TIME_EPSILON: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Terminal {
    /// Elapsed simulated seconds.
    Time { seconds: f64 },
    Milestone { milestone: MilestoneId },
    Currency {
        currency: CurrencyId,
        op: CompareOp,
        threshold: f64,
    },
    /// Every listed element owned at least once.
    AllPurchased { elements: Vec<ElementId> },
    /// No purchase for `max_idle` seconds.
    Stall { max_idle: f64 },
    Any { of: Vec<Terminal> },
    All { of: Vec<Terminal> },
}

impl Terminal {
    pub fn time(seconds: f64) -> Self {
        Terminal::Time { seconds }
    }

    pub fn stall(max_idle: f64) -> Self {
        Terminal::Stall { max_idle }
    }

    pub fn all_purchased<I, E>(elements: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<ElementId>,
    {
        Terminal::AllPurchased {
            elements: elements.into_iter().map(Into::into).collect(),
        }
    }

    pub fn any(of: impl IntoIterator<Item = Terminal>) -> Self {
        Terminal::Any {
            of: of.into_iter().collect(),
        }
    }

    pub fn all(of: impl IntoIterator<Item = Terminal>) -> Self {
        Terminal::All {
            of: of.into_iter().collect(),
        }
    }

    pub fn currency(currency: impl Into<CurrencyId>, op: CompareOp, threshold: f64) -> Self {
        Terminal::Currency {
            currency: currency.into(),
            op,
            threshold,
        }
    }

    pub fn milestone(id: impl Into<MilestoneId>) -> Self {
        Terminal::Milestone {
            milestone: id.into(),
        }
    }

    /// `last_purchase` is the elapsed time of the most recent purchase, or
    /// the start of the run.
    pub fn is_met(&self, state: &EconomyState, last_purchase: f64) -> bool {
        match self {
            Terminal::Time { seconds } => state.time_elapsed + TIME_EPSILON >= *seconds,
            Terminal::Milestone { milestone } => state.has_milestone(milestone.as_str()),
            Terminal::Currency {
                currency,
                op,
                threshold,
            } => op.apply(state.currency_value(currency.as_str()), *threshold),
            Terminal::AllPurchased { elements } => elements
                .iter()
                .all(|id| state.element_count(id.as_str()) > 0),
            Terminal::Stall { max_idle } => {
                state.time_elapsed - last_purchase + TIME_EPSILON >= *max_idle
            }
            Terminal::Any { of } => of.iter().any(|t| t.is_met(state, last_purchase)),
            Terminal::All { of } => of.iter().all(|t| t.is_met(state, last_purchase)),
        }
    }

    /// Absolute time at which this condition turns true on the clock alone.
    /// Event-jump waits are clamped to it.
    pub fn deadline(&self, last_purchase: f64) -> Option<f64> {
        match self {
            Terminal::Time { seconds } => Some(*seconds),
            Terminal::Stall { max_idle } => Some(last_purchase + max_idle),
            Terminal::Any { of } | Terminal::All { of } => of
                .iter()
                .filter_map(|t| t.deadline(last_purchase))
                .min_by(f64::total_cmp),
            _ => None,
        }
    }

    /// Seconds until a currency threshold could be reached through income
    /// alone, given `extra_income` per currency on top of production.
    /// Clock-only conditions report `None`; see [`deadline`](Self::deadline).
    pub fn eta(
        &self,
        runtime: &Runtime,
        last_purchase: f64,
        extra_income: &BTreeMap<CurrencyId, f64>,
    ) -> Option<f64> {
        let state = runtime.state();
        if self.is_met(state, last_purchase) {
            return Some(0.0);
        }
        match self {
            Terminal::Currency {
                currency,
                op: CompareOp::Ge | CompareOp::Gt,
                threshold,
            } => {
                let c = currency.as_str();
                if runtime.effective_cap(c).is_some_and(|cap| cap < *threshold) {
                    return None;
                }
                let income =
                    runtime.income_rate(c) + extra_income.get(c).copied().unwrap_or(0.0);
                if !(income > 0.0) {
                    return None;
                }
                Some((threshold - state.currency_value(c)).max(0.0) / income)
            }
            Terminal::Any { of } | Terminal::All { of } => of
                .iter()
                .filter(|t| !t.is_met(state, last_purchase))
                .filter_map(|t| t.eta(runtime, last_purchase, extra_income))
                .min_by(f64::total_cmp),
            _ => None,
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |ts: &[Terminal], sep: &str| {
            ts.iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(sep)
        };
        match self {
            Terminal::Time { seconds } => write!(f, "time >= {seconds}s"),
            Terminal::Milestone { milestone } => write!(f, "milestone {milestone}"),
            Terminal::Currency {
                currency,
                op,
                threshold,
            } => write!(f, "{currency} {op} {threshold}"),
            Terminal::AllPurchased { elements } => {
                let ids: Vec<&str> = elements.iter().map(|i| i.as_str()).collect();
                write!(f, "all purchased [{}]", ids.join(", "))
            }
            Terminal::Stall { max_idle } => write!(f, "no purchase for {max_idle}s"),
            Terminal::Any { of } => write!(f, "({})", join(of, " or ")),
            Terminal::All { of } => write!(f, "({})", join(of, " and ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idle_core::{CurrencyState, Effect, EffectKind};
    use idle_runtime::{CurrencyDef, ElementDef, GameDefinition};
    use std::sync::Arc;

    fn state_at(t: f64, gold: f64) -> EconomyState {
        let mut s = EconomyState {
            time_elapsed: t,
            ..Default::default()
        };
        s.currencies.insert(
            CurrencyId::from("gold"),
            CurrencyState {
                current: gold,
                ..Default::default()
            },
        );
        s
    }

    #[test]
    fn basic_conditions() {
        let s = state_at(10.0, 50.0);
        assert!(Terminal::time(10.0).is_met(&s, 0.0));
        assert!(!Terminal::time(10.5).is_met(&s, 0.0));
        assert!(Terminal::currency("gold", CompareOp::Ge, 50.0).is_met(&s, 0.0));
        assert!(!Terminal::milestone("m").is_met(&s, 0.0));
        assert!(Terminal::stall(5.0).is_met(&s, 5.0));
        assert!(!Terminal::stall(5.0).is_met(&s, 6.0));
        assert!(!Terminal::all_purchased(["a"]).is_met(&s, 0.0));
        assert!(Terminal::all_purchased(Vec::<ElementId>::new()).is_met(&s, 0.0));
    }

    #[test]
    fn combinators_and_deadline() {
        let t = Terminal::any([
            Terminal::milestone("m"),
            Terminal::time(100.0),
            Terminal::stall(30.0),
        ]);
        assert!(!t.is_met(&state_at(20.0, 0.0), 0.0));
        assert!(t.is_met(&state_at(31.0, 0.0), 0.0));
        assert_eq!(t.deadline(0.0), Some(30.0));
        assert_eq!(t.deadline(90.0), Some(100.0));

        let both = Terminal::all([Terminal::time(5.0), Terminal::milestone("m")]);
        assert!(!both.is_met(&state_at(6.0, 0.0), 0.0));
        assert_eq!(Terminal::milestone("m").deadline(0.0), None);
    }

    #[test]
    fn currency_eta_uses_income() {
        let def = GameDefinition::builder("eta")
            .currency(CurrencyDef::new("gold", "Gold"))
            .element(
                ElementDef::new("mine", "Mine")
                    .cost("gold", 1.0)
                    .effect(Effect::per_count("mine", EffectKind::ProductionFlat, "gold", 5.0)),
            )
            .build()
            .unwrap();
        let rt = idle_runtime::Runtime::new(Arc::new(def));
        let goal = Terminal::currency("gold", CompareOp::Ge, 100.0);
        assert_eq!(goal.eta(&rt, 0.0, &BTreeMap::new()), None);

        let mut clicks = BTreeMap::new();
        clicks.insert(CurrencyId::from("gold"), 4.0);
        assert_eq!(goal.eta(&rt, 0.0, &clicks), Some(25.0));
        assert_eq!(Terminal::time(40.0).eta(&rt, 0.0, &clicks), None);
        let either = Terminal::any([Terminal::time(40.0), goal]);
        assert_eq!(either.eta(&rt, 0.0, &clicks), Some(25.0));
    }

    #[test]
    fn display_and_yaml() {
        let yaml = "\
kind: any
of:
  - { kind: time, seconds: 3600 }
  - { kind: currency, currency: gold, op: '>=', threshold: 1000 }
  - kind: all
    of:
      - { kind: milestone, milestone: castle }
      - { kind: stall, max_idle: 60 }
";
        let t: Terminal = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            t.to_string(),
            "(time >= 3600s or gold >= 1000 or (milestone castle and no purchase for 60s))"
        );
        assert_eq!(
            t,
            Terminal::any([
                Terminal::time(3600.0),
                Terminal::currency("gold", CompareOp::Ge, 1000.0),
                Terminal::all([Terminal::milestone("castle"), Terminal::stall(60.0)]),
            ])
        );

        let json = serde_json::to_value(Terminal::all_purchased(["mine"])).unwrap();
        assert_eq!(json["kind"], "all_purchased");
        assert_eq!(json["elements"][0], "mine");
    }
}
