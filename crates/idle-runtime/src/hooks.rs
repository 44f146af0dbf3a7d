//! Side-effect hooks, subsystems and the custom-effect extension point.
//!
//! Hooks and subsystems never touch the state directly. They read a
//! snapshot and queue [`HookAction`]s; the runtime applies the queue as part
//! of the operation that invoked them.

use idle_core::{CurrencyId, EconomyState, Effect, ElementId};
use idle_econ::Contribution;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Change requested by a hook.
#[derive(Clone, Debug, PartialEq)]
pub enum HookAction {
    Grant { currency: CurrencyId, amount: f64 },
    Unlock(ElementId),
    SatisfyEstimate(String),
}

/// Read-only state plus an action queue, handed to purchase and milestone hooks.
pub struct HookContext<'a> {
    state: &'a EconomyState,
    actions: Vec<HookAction>,
}

impl<'a> HookContext<'a> {
    pub fn new(state: &'a EconomyState) -> Self {
        Self {
            state,
            actions: Vec::new(),
        }
    }

    pub fn state(&self) -> &EconomyState {
        self.state
    }

    pub fn grant(&mut self, currency: impl Into<CurrencyId>, amount: f64) {
        self.actions.push(HookAction::Grant {
            currency: currency.into(),
            amount,
        });
    }

    pub fn unlock(&mut self, element: impl Into<ElementId>) {
        self.actions.push(HookAction::Unlock(element.into()));
    }

    pub fn satisfy_estimate(&mut self, key: impl Into<String>) {
        self.actions.push(HookAction::SatisfyEstimate(key.into()));
    }

    pub fn into_actions(self) -> Vec<HookAction> {
        self.actions
    }
}

/// On-purchase or on-trigger callback.
pub type Hook = Arc<dyn Fn(&mut HookContext<'_>) + Send + Sync>;

/// Maps an active custom effect and its resolved value to a production
/// contribution. The contribution lands on the effect's target currency,
/// or on every currency when the target is empty or the phase is global.
pub type EffectHandler =
    Arc<dyn Fn(&Effect, f64, &EconomyState) -> Option<Contribution> + Send + Sync>;

/// A mechanic outside the currency and element model, ticked by the
/// runtime after production and elapsed time have been applied.
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &str;

    fn tick(&self, ctx: &mut HookContext<'_>, delta: f64);

    /// Closed-form model of this subsystem, used when time is skipped
    /// rather than ticked.
    fn proxy(&self) -> Option<&dyn SimulationProxy> {
        None
    }
}

pub trait SimulationProxy: Send + Sync {
    /// Currency produced over the next `duration` seconds from `state`.
    fn estimate_production(
        &self,
        state: &EconomyState,
        duration: f64,
    ) -> BTreeMap<CurrencyId, f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_queues_actions_in_order() {
        let state = EconomyState::default();
        let mut ctx = HookContext::new(&state);
        ctx.grant("gold", 5.0);
        ctx.unlock("mine");
        ctx.satisfy_estimate("research");
        assert_eq!(ctx.state().time_elapsed, 0.0);
        assert_eq!(
            ctx.into_actions(),
            vec![
                HookAction::Grant {
                    currency: CurrencyId::from("gold"),
                    amount: 5.0
                },
                HookAction::Unlock(ElementId::from("mine")),
                HookAction::SatisfyEstimate("research".into()),
            ]
        );
    }
}
