//! Composable boolean predicates over the economy state.

use crate::compare::CompareOp;
use crate::ids::{CurrencyId, ElementId, MilestoneId};
use crate::state::EconomyState;
use rand::Rng;
use std::f64::consts::PI;
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::sync::Arc;

/// Designer-supplied predicate.
pub type Predicate = Arc<dyn Fn(&EconomyState) -> bool + Send + Sync>;

/// Simulation-only requirement that becomes true after a sampled delay.
///
/// Outside simulation nothing schedules it, so it stays false until the
/// runtime is told it has been satisfied.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatedDuration {
    /// Key under which the satisfaction state is stored.
    pub key: String,
    /// Mean delay in seconds of elapsed time.
    pub mean: f64,
    pub std_dev: f64,
    pub description: String,
}

impl EstimatedDuration {
    /// Draw a concrete delay: normal(mean, std_dev) clamped at zero, or
    /// exactly the mean when `std_dev` is zero.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.std_dev <= 0.0 {
            return self.mean.max(0.0);
        }
        // Box-Muller; 1 - u keeps the log argument in (0, 1].
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = rng.gen::<f64>();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        (self.mean + z * self.std_dev).max(0.0)
    }
}

#[derive(Clone)]
pub enum Requirement {
    Resource {
        currency: CurrencyId,
        op: CompareOp,
        threshold: f64,
    },
    TotalEarned {
        currency: CurrencyId,
        op: CompareOp,
        threshold: f64,
    },
    Rate {
        currency: CurrencyId,
        op: CompareOp,
        threshold: f64,
    },
    Owns(ElementId),
    Count {
        element: ElementId,
        op: CompareOp,
        threshold: u64,
    },
    Milestone(MilestoneId),
    Time {
        op: CompareOp,
        seconds: f64,
    },
    All(Vec<Requirement>),
    Any(Vec<Requirement>),
    Custom(Predicate),
    Estimated(EstimatedDuration),
}

impl Requirement {
    pub fn resource(currency: impl Into<CurrencyId>, op: CompareOp, threshold: f64) -> Self {
        Requirement::Resource {
            currency: currency.into(),
            op,
            threshold,
        }
    }

    pub fn total_earned(currency: impl Into<CurrencyId>, op: CompareOp, threshold: f64) -> Self {
        Requirement::TotalEarned {
            currency: currency.into(),
            op,
            threshold,
        }
    }

    pub fn rate(currency: impl Into<CurrencyId>, op: CompareOp, threshold: f64) -> Self {
        Requirement::Rate {
            currency: currency.into(),
            op,
            threshold,
        }
    }

    pub fn owns(element: impl Into<ElementId>) -> Self {
        Requirement::Owns(element.into())
    }

    pub fn count(element: impl Into<ElementId>, op: CompareOp, threshold: u64) -> Self {
        Requirement::Count {
            element: element.into(),
            op,
            threshold,
        }
    }

    pub fn milestone(id: impl Into<MilestoneId>) -> Self {
        Requirement::Milestone(id.into())
    }

    pub fn time(op: CompareOp, seconds: f64) -> Self {
        Requirement::Time { op, seconds }
    }

    pub fn all(reqs: impl IntoIterator<Item = Requirement>) -> Self {
        Requirement::All(reqs.into_iter().collect())
    }

    pub fn any(reqs: impl IntoIterator<Item = Requirement>) -> Self {
        Requirement::Any(reqs.into_iter().collect())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&EconomyState) -> bool + Send + Sync + 'static,
    {
        Requirement::Custom(Arc::new(f))
    }

    pub fn estimated(key: impl Into<String>, mean: f64, std_dev: f64) -> Self {
        Requirement::Estimated(EstimatedDuration {
            key: key.into(),
            mean,
            std_dev,
            description: String::new(),
        })
    }

    /// Attach a human-readable description to an estimated-duration
    /// requirement. Any other requirement is returned unchanged.
    pub fn described(self, description: impl Into<String>) -> Self {
        match self {
            Requirement::Estimated(est) => Requirement::Estimated(EstimatedDuration {
                description: description.into(),
                ..est
            }),
            other => other,
        }
    }

    /// Evaluate against a snapshot. `All` stops at the first false member,
    /// `Any` at the first true one.
    pub fn evaluate(&self, state: &EconomyState) -> bool {
        match self {
            Requirement::Resource {
                currency,
                op,
                threshold,
            } => op.apply(state.currency_value(currency.as_str()), *threshold),
            Requirement::TotalEarned {
                currency,
                op,
                threshold,
            } => op.apply(state.total_earned(currency.as_str()), *threshold),
            Requirement::Rate {
                currency,
                op,
                threshold,
            } => op.apply(state.currency_rate(currency.as_str()), *threshold),
            Requirement::Owns(element) => state.element_count(element.as_str()) >= 1,
            Requirement::Count {
                element,
                op,
                threshold,
            } => op.apply(
                state.element_count(element.as_str()) as f64,
                *threshold as f64,
            ),
            Requirement::Milestone(id) => state.has_milestone(id.as_str()),
            Requirement::Time { op, seconds } => op.apply(state.time_elapsed, *seconds),
            Requirement::All(reqs) => reqs.iter().all(|r| r.evaluate(state)),
            Requirement::Any(reqs) => reqs.iter().any(|r| r.evaluate(state)),
            Requirement::Custom(f) => f(state),
            Requirement::Estimated(est) => state.estimate_satisfied(&est.key),
        }
    }

    /// Visit every estimated-duration leaf, depth first.
    pub fn for_each_estimate(&self, f: &mut dyn FnMut(&EstimatedDuration)) {
        match self {
            Requirement::Estimated(est) => f(est),
            Requirement::All(reqs) | Requirement::Any(reqs) => {
                for r in reqs {
                    r.for_each_estimate(f);
                }
            }
            _ => {}
        }
    }

    /// Currency ids referenced by this requirement tree.
    pub fn referenced_currencies(&self) -> Vec<&CurrencyId> {
        let mut out = Vec::new();
        self.collect_refs(&mut out, &mut Vec::new(), &mut Vec::new());
        out
    }

    /// Element ids referenced by this requirement tree.
    pub fn referenced_elements(&self) -> Vec<&ElementId> {
        let mut out = Vec::new();
        self.collect_refs(&mut Vec::new(), &mut out, &mut Vec::new());
        out
    }

    /// Milestone ids referenced by this requirement tree.
    pub fn referenced_milestones(&self) -> Vec<&MilestoneId> {
        let mut out = Vec::new();
        self.collect_refs(&mut Vec::new(), &mut Vec::new(), &mut out);
        out
    }

    fn collect_refs<'a>(
        &'a self,
        currencies: &mut Vec<&'a CurrencyId>,
        elements: &mut Vec<&'a ElementId>,
        milestones: &mut Vec<&'a MilestoneId>,
    ) {
        match self {
            Requirement::Resource { currency, .. }
            | Requirement::TotalEarned { currency, .. }
            | Requirement::Rate { currency, .. } => currencies.push(currency),
            Requirement::Owns(element) | Requirement::Count { element, .. } => {
                elements.push(element)
            }
            Requirement::Milestone(id) => milestones.push(id),
            Requirement::All(reqs) | Requirement::Any(reqs) => {
                for r in reqs {
                    r.collect_refs(currencies, elements, milestones);
                }
            }
            Requirement::Time { .. } | Requirement::Custom(_) | Requirement::Estimated(_) => {}
        }
    }
}

impl BitAnd for Requirement {
    type Output = Requirement;

    fn bitand(self, rhs: Requirement) -> Requirement {
        match self {
            Requirement::All(mut reqs) => {
                reqs.push(rhs);
                Requirement::All(reqs)
            }
            lhs => Requirement::All(vec![lhs, rhs]),
        }
    }
}

impl BitOr for Requirement {
    type Output = Requirement;

    fn bitor(self, rhs: Requirement) -> Requirement {
        match self {
            Requirement::Any(mut reqs) => {
                reqs.push(rhs);
                Requirement::Any(reqs)
            }
            lhs => Requirement::Any(vec![lhs, rhs]),
        }
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Resource {
                currency,
                op,
                threshold,
            } => write!(f, "resource({currency} {op} {threshold})"),
            Requirement::TotalEarned {
                currency,
                op,
                threshold,
            } => write!(f, "total_earned({currency} {op} {threshold})"),
            Requirement::Rate {
                currency,
                op,
                threshold,
            } => write!(f, "rate({currency} {op} {threshold})"),
            Requirement::Owns(element) => write!(f, "owns({element})"),
            Requirement::Count {
                element,
                op,
                threshold,
            } => write!(f, "count({element} {op} {threshold})"),
            Requirement::Milestone(id) => write!(f, "milestone({id})"),
            Requirement::Time { op, seconds } => write!(f, "time({op} {seconds})"),
            Requirement::All(reqs) => f.debug_tuple("all").field(reqs).finish(),
            Requirement::Any(reqs) => f.debug_tuple("any").field(reqs).finish(),
            Requirement::Custom(_) => f.write_str("custom(<fn>)"),
            Requirement::Estimated(est) if est.description.is_empty() => {
                write!(f, "estimated({}, mean={})", est.key, est.mean)
            }
            Requirement::Estimated(est) => {
                write!(f, "estimated({}, mean={}, {:?})", est.key, est.mean, est.description)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CurrencyState, ElementState, EstimateStatus};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state() -> EconomyState {
        let mut s = EconomyState {
            time_elapsed: 50.0,
            ..Default::default()
        };
        s.currencies.insert(
            CurrencyId::from("gold"),
            CurrencyState {
                current: 100.0,
                total_earned: 250.0,
                all_time_earned: 250.0,
                rate: 4.0,
            },
        );
        s.elements.insert(
            ElementId::from("miner"),
            ElementState {
                count: 2,
                ..Default::default()
            },
        );
        s.milestones_reached.insert(MilestoneId::from("first"), 3.0);
        s
    }

    #[test]
    fn leaf_requirements() {
        let s = state();
        assert!(Requirement::resource("gold", CompareOp::Ge, 100.0).evaluate(&s));
        assert!(!Requirement::resource("gold", CompareOp::Gt, 100.0).evaluate(&s));
        assert!(Requirement::total_earned("gold", CompareOp::Eq, 250.0).evaluate(&s));
        assert!(Requirement::rate("gold", CompareOp::Lt, 5.0).evaluate(&s));
        assert!(Requirement::owns("miner").evaluate(&s));
        assert!(!Requirement::owns("farm").evaluate(&s));
        assert!(Requirement::count("miner", CompareOp::Ge, 2).evaluate(&s));
        assert!(Requirement::milestone("first").evaluate(&s));
        assert!(!Requirement::milestone("second").evaluate(&s));
        assert!(Requirement::time(CompareOp::Ge, 50.0).evaluate(&s));
    }

    #[test]
    fn operators_compose() {
        let s = state();
        let both = Requirement::owns("miner") & Requirement::time(CompareOp::Lt, 10.0);
        assert!(!both.evaluate(&s));
        let either = Requirement::owns("farm") | Requirement::owns("miner");
        assert!(either.evaluate(&s));
        let chained = Requirement::owns("miner")
            & Requirement::milestone("first")
            & Requirement::resource("gold", CompareOp::Ge, 1.0);
        match &chained {
            Requirement::All(reqs) => assert_eq!(reqs.len(), 3),
            other => panic!("expected flattened all, got {other:?}"),
        }
        assert!(chained.evaluate(&s));
    }

    #[test]
    fn composites_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = {
            let calls = Arc::clone(&calls);
            Requirement::custom(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            })
        };
        let s = state();
        let all = Requirement::all([Requirement::owns("farm"), counter.clone()]);
        assert!(!all.evaluate(&s));
        let any = Requirement::any([Requirement::owns("miner"), counter.clone()]);
        assert!(any.evaluate(&s));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(Requirement::all([Requirement::owns("miner"), counter]).evaluate(&s));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn estimated_is_false_until_scheduled_or_satisfied() {
        let mut s = state();
        let req = Requirement::estimated("boss_fight", 60.0, 0.0);
        assert!(!req.evaluate(&s));
        s.estimates
            .insert("boss_fight".into(), EstimateStatus::Scheduled(60.0));
        assert!(!req.evaluate(&s));
        s.time_elapsed = 60.0;
        assert!(req.evaluate(&s));
        s.time_elapsed = 0.0;
        s.estimates
            .insert("boss_fight".into(), EstimateStatus::Satisfied);
        assert!(req.evaluate(&s));
    }

    #[test]
    fn sampling_is_seeded_and_clamped() {
        let est = EstimatedDuration {
            key: "k".into(),
            mean: 10.0,
            std_dev: 50.0,
            description: String::new(),
        };
        let a: Vec<f64> = {
            let mut rng = ChaCha8Rng::seed_from_u64(7);
            (0..32).map(|_| est.sample(&mut rng)).collect()
        };
        let b: Vec<f64> = {
            let mut rng = ChaCha8Rng::seed_from_u64(7);
            (0..32).map(|_| est.sample(&mut rng)).collect()
        };
        assert_eq!(a, b);
        assert!(a.iter().all(|t| *t >= 0.0 && t.is_finite()));

        let fixed = EstimatedDuration {
            std_dev: 0.0,
            ..est
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(fixed.sample(&mut rng), 10.0);
    }

    #[test]
    fn estimates_carry_descriptions() {
        let req =
            Requirement::estimated("boss_fight", 120.0, 30.0).described("beat the first boss");
        let mut found = Vec::new();
        req.for_each_estimate(&mut |e| found.push(e.description.clone()));
        assert_eq!(found, vec!["beat the first boss".to_string()]);
        assert_eq!(
            format!("{req:?}"),
            "estimated(boss_fight, mean=120, \"beat the first boss\")"
        );

        let plain = Requirement::owns("miner").described("ignored");
        assert_eq!(format!("{plain:?}"), format!("{:?}", Requirement::owns("miner")));
    }

    #[test]
    fn estimates_and_refs_are_discoverable() {
        let req = Requirement::owns("miner")
            & (Requirement::estimated("a", 1.0, 0.0) | Requirement::milestone("m"))
            & Requirement::resource("gold", CompareOp::Ge, 1.0);
        let mut keys = Vec::new();
        req.for_each_estimate(&mut |e| keys.push(e.key.clone()));
        assert_eq!(keys, vec!["a".to_string()]);
        assert_eq!(req.referenced_elements(), vec![&ElementId::from("miner")]);
        assert_eq!(req.referenced_currencies(), vec![&CurrencyId::from("gold")]);
        assert_eq!(req.referenced_milestones(), vec![&MilestoneId::from("m")]);
    }
}
