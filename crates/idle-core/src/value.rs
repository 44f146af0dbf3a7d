//! Literal-or-computed numbers.

use crate::state::EconomyState;
use std::fmt;
use std::sync::Arc;

/// Shared, thread-safe function of the economy state.
pub type StateFn<T> = Arc<dyn Fn(&EconomyState) -> T + Send + Sync>;

/// A number that is either fixed in the definition or derived from state.
///
/// Resolution never mutates the state, so resolving the same value twice
/// against the same snapshot yields the same result.
#[derive(Clone)]
pub enum Value {
    Literal(f64),
    Computed(StateFn<f64>),
}

impl Value {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&EconomyState) -> f64 + Send + Sync + 'static,
    {
        Value::Computed(Arc::new(f))
    }

    /// Resolve against the given snapshot.
    pub fn resolve(&self, state: &EconomyState) -> f64 {
        match self {
            Value::Literal(v) => *v,
            Value::Computed(f) => f(state),
        }
    }

    pub fn as_literal(&self) -> Option<f64> {
        match self {
            Value::Literal(v) => Some(*v),
            Value::Computed(_) => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Literal(v)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Literal(0.0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Value::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::CurrencyId;
    use crate::state::CurrencyState;

    #[test]
    fn literal_ignores_state() {
        let v = Value::from(2.5);
        assert_eq!(v.resolve(&EconomyState::default()), 2.5);
        assert_eq!(v.as_literal(), Some(2.5));
    }

    #[test]
    fn computed_reads_state_without_mutating_it() {
        let mut state = EconomyState::default();
        state.currencies.insert(
            CurrencyId::from("gold"),
            CurrencyState {
                current: 40.0,
                ..Default::default()
            },
        );
        let v = Value::computed(|s| s.currency_value("gold") / 4.0);
        let before = state.clone();
        assert_eq!(v.resolve(&state), 10.0);
        assert_eq!(v.resolve(&state), 10.0);
        assert_eq!(state, before);
        assert!(v.as_literal().is_none());
        assert_eq!(format!("{v:?}"), "Computed(<fn>)");
    }
}
