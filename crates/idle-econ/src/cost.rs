//! Cost model: price of the next unit given how many are owned.

use idle_core::CostMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Designer cost function of (base cost, owned count).
pub type CostFn = Arc<dyn Fn(&CostMap, u64) -> CostMap + Send + Sync>;

/// Errors produced by malformed scaling parameters.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Exponential growth must be a finite rate >= 1.
    #[error("invalid exponential growth rate: {0}")]
    InvalidGrowth(f64),
    /// Linear increments must be finite and non-negative.
    #[error("invalid linear increment: {0}")]
    InvalidIncrement(f64),
    /// Base costs must be finite and non-negative.
    #[error("invalid base cost {amount} for currency {currency}")]
    InvalidBaseCost { currency: String, amount: f64 },
}

/// Scaling policy applied independently to every currency of a base cost.
#[derive(Clone, Default)]
pub enum CostScaling {
    /// Cost never changes.
    #[default]
    Fixed,
    /// `base * rate^count`.
    Exponential { rate: f64 },
    /// `base * (1 + increment_pct * count)`.
    Linear { increment_pct: f64 },
    /// Arbitrary function; monotonicity is not checked.
    Custom(CostFn),
}

impl CostScaling {
    pub fn exponential(rate: f64) -> Self {
        CostScaling::Exponential { rate }
    }

    pub fn linear(increment_pct: f64) -> Self {
        CostScaling::Linear { increment_pct }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&CostMap, u64) -> CostMap + Send + Sync + 'static,
    {
        CostScaling::Custom(Arc::new(f))
    }

    /// Cost of acquiring unit number `count + 1`.
    ///
    /// Example:
    /// let base = CostMap::from([(CurrencyId::from("gold"), 10.0)]);
    /// let c = CostScaling::exponential(2.0).cost(&base, 3);
    /// assert_eq!(c["gold"], 80.0);
    pub fn cost(&self, base: &CostMap, count: u64) -> CostMap {
        let factor = match self {
            CostScaling::Fixed => 1.0,
            CostScaling::Exponential { rate } => rate.powf(count as f64),
            CostScaling::Linear { increment_pct } => 1.0 + increment_pct * count as f64,
            CostScaling::Custom(f) => return f(base, count),
        };
        base.iter().map(|(k, v)| (k.clone(), v * factor)).collect()
    }

    /// Reject parameters that would break the non-decreasing contract.
    pub fn validate(&self) -> Result<(), EconError> {
        match self {
            CostScaling::Exponential { rate } if !(rate.is_finite() && *rate >= 1.0) => {
                Err(EconError::InvalidGrowth(*rate))
            }
            CostScaling::Linear { increment_pct }
                if !(increment_pct.is_finite() && *increment_pct >= 0.0) =>
            {
                Err(EconError::InvalidIncrement(*increment_pct))
            }
            _ => Ok(()),
        }
    }

    /// Built-in policy (not a designer closure).
    pub fn is_standard(&self) -> bool {
        !matches!(self, CostScaling::Custom(_))
    }
}

/// Check every base-cost amount is finite and non-negative.
pub fn validate_base_cost(base: &CostMap) -> Result<(), EconError> {
    for (currency, amount) in base {
        if !(amount.is_finite() && *amount >= 0.0) {
            return Err(EconError::InvalidBaseCost {
                currency: currency.to_string(),
                amount: *amount,
            });
        }
    }
    Ok(())
}

impl fmt::Debug for CostScaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostScaling::Fixed => f.write_str("Fixed"),
            CostScaling::Exponential { rate } => write!(f, "Exponential({rate})"),
            CostScaling::Linear { increment_pct } => write!(f, "Linear({increment_pct})"),
            CostScaling::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idle_core::CurrencyId;
    use proptest::prelude::*;

    fn base() -> CostMap {
        CostMap::from([
            (CurrencyId::from("gold"), 10.0),
            (CurrencyId::from("wood"), 4.0),
        ])
    }

    #[test]
    fn fixed_is_identity() {
        assert_eq!(CostScaling::Fixed.cost(&base(), 17), base());
    }

    #[test]
    fn exponential_and_linear() {
        let e = CostScaling::exponential(1.15).cost(&base(), 2);
        assert!((e["gold"] - 13.225).abs() < 1e-9);
        assert!((e["wood"] - 5.29).abs() < 1e-9);
        let l = CostScaling::linear(0.1).cost(&base(), 5);
        assert!((l["gold"] - 15.0).abs() < 1e-9);
        assert!((l["wood"] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn custom_sees_base_and_count() {
        let c = CostScaling::custom(|b, n| {
            b.iter()
                .map(|(k, v)| (k.clone(), v + n as f64 * 100.0))
                .collect()
        });
        assert_eq!(c.cost(&base(), 2)["gold"], 210.0);
        assert!(!c.is_standard());
    }

    #[test]
    fn validation_rejects_bad_parameters() {
        assert_eq!(
            CostScaling::exponential(0.0).validate(),
            Err(EconError::InvalidGrowth(0.0))
        );
        assert!(CostScaling::exponential(f64::NAN).validate().is_err());
        assert_eq!(
            CostScaling::linear(-0.5).validate(),
            Err(EconError::InvalidIncrement(-0.5))
        );
        assert!(CostScaling::exponential(1.07).validate().is_ok());
        let bad = CostMap::from([(CurrencyId::from("gold"), -1.0)]);
        assert!(validate_base_cost(&bad).is_err());
        assert!(validate_base_cost(&base()).is_ok());
    }

    proptest! {
        #[test]
        fn standard_policies_non_decreasing(n in 0u64..200, rate in 1.0f64..2.0, pct in 0.0f64..1.0) {
            for policy in [CostScaling::Fixed, CostScaling::exponential(rate), CostScaling::linear(pct)] {
                let a = policy.cost(&base(), n);
                let b = policy.cost(&base(), n + 1);
                for (k, v) in &a {
                    prop_assert!(b[k] >= *v);
                }
            }
        }
    }
}
