//! The transition engine.
//!
//! [`Runtime`] is the only writer of [`EconomyState`]. Every operation runs
//! to completion, reports refusals as values and keeps the derived caches
//! (rates, availability, affordability) current before returning.

use crate::definition::{ElementDef, GameDefinition};
use crate::hooks::{EffectHandler, Hook, HookAction, HookContext, Subsystem};
use idle_core::{
    CostMap, CurrencyId, CurrencyState, EconomyState, Effect, EffectKind, EffectPhase, ElementId,
    ElementState, EstimateStatus, LayerId, MilestoneId,
};
use idle_econ::{Contribution, FlatMult, ProductionPipeline};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Programmer misuse: an id that the definition never declared.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("unknown element '{0}'")]
    UnknownElement(String),
    #[error("unknown currency '{0}'")]
    UnknownCurrency(String),
    #[error("unknown prestige layer '{0}'")]
    UnknownLayer(String),
}

/// Why a purchase was declined. Checked in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseRefusal {
    Unavailable,
    MaxCount,
    PurchaseRequirement,
    Unaffordable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PurchaseOutcome {
    /// Bought; `count` is the owned count after the purchase.
    Purchased { cost: CostMap, count: u64 },
    Refused(PurchaseRefusal),
}

impl PurchaseOutcome {
    pub fn is_purchased(&self) -> bool {
        matches!(self, PurchaseOutcome::Purchased { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PrestigeRefusal {
    /// Debug renderings of the gating requirements that evaluated false.
    RequirementsUnmet { unmet: Vec<String> },
    BelowMinimum { reward: f64, minimum: f64 },
}

/// What a completed prestige changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrestigeSummary {
    pub layer: LayerId,
    pub currency: CurrencyId,
    pub reward: f64,
    /// Run number after the reset.
    pub run_number: u64,
    /// Length of the run that just ended.
    pub run_duration: f64,
    pub reset_currencies: Vec<CurrencyId>,
    pub reset_elements: Vec<ElementId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PrestigeOutcome {
    Completed(PrestigeSummary),
    Refused(PrestigeRefusal),
}

/// Read-only view of one element, as offered to strategies and UIs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementStatus {
    pub id: ElementId,
    pub count: u64,
    pub available: bool,
    pub affordable: bool,
    /// `try_purchase` would succeed right now.
    pub purchasable: bool,
    pub maxed: bool,
    pub cost: CostMap,
}

impl ElementStatus {
    /// Sum of all cost components, optionally weighted per currency.
    pub fn total_cost(&self, weights: &BTreeMap<CurrencyId, f64>) -> f64 {
        self.cost
            .iter()
            .map(|(c, v)| v * weights.get(c).copied().unwrap_or(1.0))
            .sum()
    }
}

#[derive(Clone)]
pub struct Runtime {
    def: Arc<GameDefinition>,
    state: EconomyState,
    pipeline: ProductionPipeline,
    handlers: BTreeMap<String, EffectHandler>,
    subsystems: Vec<Arc<dyn Subsystem>>,
}

impl Runtime {
    /// Fresh state from definition defaults, with rates and flags computed.
    pub fn new(def: Arc<GameDefinition>) -> Self {
        let mut state = EconomyState {
            run_number: 1,
            ..Default::default()
        };
        for (id, c) in &def.currencies {
            state.currencies.insert(
                id.clone(),
                CurrencyState {
                    current: c.initial,
                    ..Default::default()
                },
            );
        }
        for id in def.elements.keys() {
            state.elements.insert(id.clone(), ElementState::default());
        }
        let mut rt = Self {
            def,
            state,
            pipeline: ProductionPipeline::new(),
            handlers: BTreeMap::new(),
            subsystems: Vec::new(),
        };
        rt.refresh();
        rt
    }

    pub fn state(&self) -> &EconomyState {
        &self.state
    }

    pub fn definition(&self) -> &GameDefinition {
        &self.def
    }

    // ---- transitions -------------------------------------------------------

    /// Advance time by `delta` seconds. Rates are held constant over the
    /// interval, so one call with `2Δ` matches two calls with `Δ` when no
    /// boundary is crossed in between. Subsystems tick last, after elapsed
    /// time has advanced. Returns milestones fired by this tick.
    pub fn tick(&mut self, delta: f64) -> Vec<MilestoneId> {
        let delta = if delta.is_finite() && delta > 0.0 {
            delta
        } else {
            0.0
        };
        self.recompute_rates();

        let ids: Vec<CurrencyId> = self.state.currencies.keys().cloned().collect();
        for id in &ids {
            let produced = self.state.currency_rate(id.as_str()) * delta;
            if produced > 0.0 {
                self.credit(id.as_str(), produced);
            } else if produced < 0.0 {
                if let Some(c) = self.state.currencies.get_mut(id) {
                    c.current = (c.current + produced).max(0.0);
                }
            }
        }
        for id in &ids {
            let clicks = self.auto_click_rate(id.as_str()) * delta;
            if clicks > 0.0 {
                let value = self.click_value(id.as_str());
                self.credit(id.as_str(), clicks * value);
            }
        }

        self.state.time_elapsed += delta;
        self.tick_subsystems(delta);
        self.clamp_to_caps();
        self.update_flags();
        self.check_milestones()
    }

    /// Buy one unit. All checks happen before any mutation, so a refusal
    /// leaves the state untouched.
    pub fn try_purchase(&mut self, id: &str) -> Result<PurchaseOutcome, RuntimeError> {
        let def = Arc::clone(&self.def);
        let el = def
            .elements
            .get(id)
            .ok_or_else(|| RuntimeError::UnknownElement(id.to_string()))?;
        if let Some(refusal) = self.refusal(el) {
            return Ok(PurchaseOutcome::Refused(refusal));
        }

        let cost = self.cost_in(&self.state, el);
        for (currency, amount) in &cost {
            if let Some(c) = self.state.currencies.get_mut(currency) {
                c.current = (c.current - amount).max(0.0);
            }
        }
        let entry = self.state.elements.entry(el.id.clone()).or_default();
        entry.count += 1;
        let count = entry.count;

        for effect in &el.effects {
            if effect.phase != EffectPhase::Immediate || !effect.is_active(&self.state) {
                continue;
            }
            match effect.kind {
                EffectKind::Grant => {
                    let amount = effect.resolve(&self.state);
                    self.credit(&effect.target, amount);
                }
                EffectKind::Unlock => {
                    if let Some(s) = self.state.elements.get_mut(effect.target.as_str()) {
                        s.unlocked = true;
                    }
                }
                _ => {}
            }
        }
        if let Some(hook) = &el.on_purchase {
            self.run_hook(hook);
        }
        self.refresh();
        debug!(element = %el.id, count, t = self.state.time_elapsed, "purchased");
        Ok(PurchaseOutcome::Purchased { cost, count })
    }

    pub fn process_click(&mut self, currency: &str) -> Result<f64, RuntimeError> {
        self.process_clicks(currency, 1.0)
    }

    /// Apply `clicks` clicks at the current click value. Fractional counts
    /// are allowed. Returns the amount actually added to the balance.
    pub fn process_clicks(&mut self, currency: &str, clicks: f64) -> Result<f64, RuntimeError> {
        if !self.def.currencies.contains_key(currency) {
            return Err(RuntimeError::UnknownCurrency(currency.to_string()));
        }
        if !(clicks.is_finite() && clicks > 0.0) {
            return Ok(0.0);
        }
        let value = self.click_value(currency);
        let added = self.credit(currency, value * clicks);
        self.update_flags();
        Ok(added)
    }

    pub fn trigger_prestige(&mut self, id: &str) -> Result<PrestigeOutcome, RuntimeError> {
        let def = Arc::clone(&self.def);
        let layer = def
            .layers
            .get(id)
            .ok_or_else(|| RuntimeError::UnknownLayer(id.to_string()))?;

        let unmet: Vec<String> = layer
            .requirements
            .iter()
            .filter(|r| !r.evaluate(&self.state))
            .map(|r| format!("{r:?}"))
            .collect();
        if !unmet.is_empty() {
            return Ok(PrestigeOutcome::Refused(PrestigeRefusal::RequirementsUnmet {
                unmet,
            }));
        }
        let reward = layer.reward.resolve(&self.state);
        if !(reward.is_finite() && reward >= layer.min_reward) {
            return Ok(PrestigeOutcome::Refused(PrestigeRefusal::BelowMinimum {
                reward,
                minimum: layer.min_reward,
            }));
        }

        let run_duration = self.state.run_duration();
        let mut reset_currencies = Vec::new();
        for (cid, cdef) in &def.currencies {
            if cdef.persistent || !layer.reset_currencies.covers(cid) {
                continue;
            }
            if let Some(c) = self.state.currencies.get_mut(cid) {
                c.current = cdef.initial;
                c.total_earned = 0.0;
                c.rate = 0.0;
            }
            reset_currencies.push(cid.clone());
        }
        let mut reset_elements = Vec::new();
        for (eid, edef) in &def.elements {
            if edef.is_persistent() || !layer.reset_elements.covers(eid) {
                continue;
            }
            self.state.elements.insert(eid.clone(), ElementState::default());
            reset_elements.push(eid.clone());
        }

        *self.state.prestige_counts.entry(layer.id.clone()).or_insert(0) += 1;
        self.state.run_number += 1;
        self.state.run_started_at = self.state.time_elapsed;
        self.refresh();
        self.credit(layer.currency.as_str(), reward);
        self.refresh();

        info!(
            layer = %layer.id,
            reward,
            run = self.state.run_number,
            run_duration,
            "prestige"
        );
        Ok(PrestigeOutcome::Completed(PrestigeSummary {
            layer: layer.id.clone(),
            currency: layer.currency.clone(),
            reward,
            run_number: self.state.run_number,
            run_duration,
            reset_currencies,
            reset_elements,
        }))
    }

    /// Fire every unfired milestone whose trigger now holds, stamping the
    /// current elapsed time. Runs after every tick; callers may invoke it
    /// after purchases so ownership milestones fire without waiting.
    pub fn check_milestones(&mut self) -> Vec<MilestoneId> {
        let def = Arc::clone(&self.def);
        let mut fired = Vec::new();
        for m in def.milestones.values() {
            if self.state.has_milestone(m.id.as_str()) || !m.trigger.evaluate(&self.state) {
                continue;
            }
            let t = self.state.time_elapsed;
            self.state.milestones_reached.insert(m.id.clone(), t);
            info!(milestone = %m.id, t, "milestone reached");
            if let Some(hook) = &m.on_trigger {
                self.run_hook(hook);
            }
            fired.push(m.id.clone());
        }
        fired
    }

    // ---- estimates & extension hooks ---------------------------------------

    /// Mark an estimated-duration requirement as satisfied by game logic.
    pub fn satisfy_estimate(&mut self, key: impl Into<String>) {
        self.state
            .estimates
            .insert(key.into(), EstimateStatus::Satisfied);
        self.refresh();
    }

    /// Schedule an estimated-duration requirement to hold from elapsed time `at`.
    pub fn schedule_estimate(&mut self, key: impl Into<String>, at: f64) {
        self.state
            .estimates
            .insert(key.into(), EstimateStatus::Scheduled(at.max(0.0)));
        self.refresh();
    }

    /// Give meaning to `EffectKind::Custom(name)` effects.
    pub fn register_effect_handler<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Effect, f64, &EconomyState) -> Option<Contribution> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self.refresh();
    }

    /// Register a mechanic ticked at the end of every [`tick`](Self::tick).
    pub fn add_subsystem(&mut self, subsystem: Box<dyn Subsystem>) {
        debug!(subsystem = subsystem.name(), "subsystem added");
        self.subsystems.push(Arc::from(subsystem));
    }

    /// Per-second production reported by subsystem proxies from the
    /// current state.
    pub fn subsystem_rate(&self, currency: &str) -> f64 {
        self.subsystems
            .iter()
            .filter_map(|s| s.proxy())
            .filter_map(|p| p.estimate_production(&self.state, 1.0).get(currency).copied())
            .sum()
    }

    /// Replace the four-phase reduction for one currency.
    pub fn set_production_override<F>(&mut self, currency: &str, f: F) -> Result<(), RuntimeError>
    where
        F: Fn(&CurrencyId, &[Contribution], &EconomyState) -> f64 + Send + Sync + 'static,
    {
        let id = self
            .def
            .currencies
            .get_key_value(currency)
            .map(|(k, _)| k.clone())
            .ok_or_else(|| RuntimeError::UnknownCurrency(currency.to_string()))?;
        self.pipeline.set_override(id, Arc::new(f));
        self.refresh();
        Ok(())
    }

    // ---- queries -----------------------------------------------------------

    pub fn element_status(&self, id: &str) -> Result<ElementStatus, RuntimeError> {
        let el = self.element(id)?;
        Ok(self.status_of(el))
    }

    /// Elements whose visibility requirements hold (or that were unlocked).
    pub fn available_elements(&self) -> Vec<ElementStatus> {
        self.def
            .elements
            .values()
            .map(|el| self.status_of(el))
            .filter(|s| s.available)
            .collect()
    }

    /// Elements `try_purchase` would accept right now.
    pub fn affordable_elements(&self) -> Vec<ElementStatus> {
        self.def
            .elements
            .values()
            .map(|el| self.status_of(el))
            .filter(|s| s.purchasable)
            .collect()
    }

    /// Price of the next unit, cost multipliers included.
    pub fn current_cost(&self, id: &str) -> Result<CostMap, RuntimeError> {
        let el = self.element(id)?;
        Ok(self.cost_in(&self.state, el))
    }

    /// Seconds until the next unit is payable at current income. `None` when
    /// some shortfall has no positive income, a cost exceeds its cap, or the
    /// element is at its max count.
    pub fn time_to_afford(&self, id: &str) -> Result<Option<f64>, RuntimeError> {
        self.time_to_afford_with(id, &BTreeMap::new())
    }

    /// Like [`time_to_afford`](Self::time_to_afford) with additional
    /// per-currency income, e.g. from manual clicking.
    pub fn time_to_afford_with(
        &self,
        id: &str,
        extra_income: &BTreeMap<CurrencyId, f64>,
    ) -> Result<Option<f64>, RuntimeError> {
        let el = self.element(id)?;
        if self.is_maxed(&self.state, el) {
            return Ok(None);
        }
        let mut worst = 0.0f64;
        for (currency, amount) in &self.cost_in(&self.state, el) {
            let c = currency.as_str();
            if self.effective_cap(c).is_some_and(|cap| *amount > cap) {
                return Ok(None);
            }
            let shortfall = amount - self.state.currency_value(c);
            if shortfall <= 0.0 {
                continue;
            }
            let income = self.income_rate(c) + extra_income.get(currency).copied().unwrap_or(0.0);
            if !(income > 0.0) {
                return Ok(None);
            }
            worst = worst.max(shortfall / income);
        }
        Ok(Some(worst))
    }

    /// Per-currency rates as they would be with one more unit of `id`.
    pub fn projected_rates_after(&self, id: &str) -> Result<BTreeMap<CurrencyId, f64>, RuntimeError> {
        let el = self.element(id)?;
        let mut preview = self.state.clone();
        preview.elements.entry(el.id.clone()).or_default().count += 1;
        Ok(self.compute_rates(&preview))
    }

    /// Reward `trigger_prestige` would pay right now, or `None` if it would refuse.
    pub fn prestige_reward(&self, id: &str) -> Result<Option<f64>, RuntimeError> {
        let layer = self
            .def
            .layers
            .get(id)
            .ok_or_else(|| RuntimeError::UnknownLayer(id.to_string()))?;
        if !layer.requirements.iter().all(|r| r.evaluate(&self.state)) {
            return Ok(None);
        }
        let reward = layer.reward.resolve(&self.state);
        Ok((reward.is_finite() && reward >= layer.min_reward).then_some(reward))
    }

    /// `(base + Σ flat) × Π mult`; zero for currencies without a click target.
    pub fn click_value(&self, currency: &str) -> f64 {
        let Some(base) = self.def.click_targets.get(currency) else {
            return 0.0;
        };
        self.flat_mult(
            &self.state,
            currency,
            &EffectKind::ClickFlat,
            &EffectKind::ClickMult,
        )
        .apply(*base)
    }

    /// Cap after cap effects, or `None` when the currency is uncapped.
    pub fn effective_cap(&self, currency: &str) -> Option<f64> {
        self.cap_in(&self.state, currency)
    }

    /// Automatic clicks per second on `currency`.
    pub fn auto_click_rate(&self, currency: &str) -> f64 {
        self.active_effects(&self.state)
            .filter(|e| e.applies_as(&EffectKind::AutoClick) && e.target == currency)
            .map(|e| e.resolve(&self.state))
            .sum()
    }

    /// Production, auto-click and subsystem income per second.
    pub fn income_rate(&self, currency: &str) -> f64 {
        let auto = self.auto_click_rate(currency);
        let clicks = if auto > 0.0 {
            auto * self.click_value(currency)
        } else {
            0.0
        };
        self.state.currency_rate(currency) + clicks + self.subsystem_rate(currency)
    }

    // ---- internals ---------------------------------------------------------

    fn element(&self, id: &str) -> Result<&ElementDef, RuntimeError> {
        self.def
            .elements
            .get(id)
            .ok_or_else(|| RuntimeError::UnknownElement(id.to_string()))
    }

    fn active_effects<'a>(&'a self, state: &'a EconomyState) -> impl Iterator<Item = &'a Effect> + 'a {
        self.def
            .elements
            .values()
            .filter(move |el| state.element_count(el.id.as_str()) > 0)
            .flat_map(|el| el.effects.iter())
            .filter(move |e| e.is_active(state))
    }

    fn compute_rates(&self, state: &EconomyState) -> BTreeMap<CurrencyId, f64> {
        let mut scoped: BTreeMap<CurrencyId, Vec<Contribution>> = self
            .def
            .currencies
            .keys()
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        let mut unscoped = Vec::new();

        for effect in self.active_effects(state) {
            let contribution = match &effect.kind {
                EffectKind::Custom(name) => {
                    let Some(handler) = self.handlers.get(name) else {
                        continue;
                    };
                    match handler(effect, effect.resolve(state), state) {
                        Some(c) => c,
                        None => continue,
                    }
                }
                _ if effect.phase.is_production() => {
                    Contribution::new(effect.phase, effect.resolve(state))
                }
                _ => continue,
            };
            let global = contribution.phase == EffectPhase::Global
                || effect.kind == EffectKind::GlobalMult
                || effect.target.is_empty();
            if global {
                unscoped.push(contribution);
            } else if let Some(items) = scoped.get_mut(effect.target.as_str()) {
                items.push(contribution);
            }
        }

        scoped
            .into_iter()
            .map(|(id, mut items)| {
                items.extend_from_slice(&unscoped);
                let rate = self.pipeline.compute_rate(&id, &items, state);
                (id, rate)
            })
            .collect()
    }

    fn flat_mult(
        &self,
        state: &EconomyState,
        target: &str,
        flat: &EffectKind,
        mult: &EffectKind,
    ) -> FlatMult {
        let mut agg = FlatMult::default();
        for e in self.active_effects(state).filter(|e| e.target == target) {
            if e.applies_as(flat) {
                agg.add_flat(e.resolve(state));
            } else if e.applies_as(mult) {
                agg.add_mult(e.resolve(state));
            }
        }
        agg
    }

    fn cap_in(&self, state: &EconomyState, currency: &str) -> Option<f64> {
        let base = self.def.currencies.get(currency)?.cap.as_ref()?.resolve(state);
        let agg = self.flat_mult(state, currency, &EffectKind::CapFlat, &EffectKind::CapMult);
        Some(agg.apply(base).max(0.0))
    }

    fn cost_in(&self, state: &EconomyState, el: &ElementDef) -> CostMap {
        let mut cost = el
            .scaling
            .cost(&el.base_cost, state.element_count(el.id.as_str()));
        let mult: f64 = self
            .active_effects(state)
            .filter(|e| e.applies_as(&EffectKind::CostMult) && e.target == el.id.as_str())
            .map(|e| e.resolve(state))
            .product();
        for v in cost.values_mut() {
            *v = (*v * mult).max(0.0);
        }
        cost
    }

    fn is_available(&self, state: &EconomyState, el: &ElementDef) -> bool {
        state.is_unlocked(el.id.as_str()) || el.requirements.iter().all(|r| r.evaluate(state))
    }

    fn is_maxed(&self, state: &EconomyState, el: &ElementDef) -> bool {
        el.max_count
            .is_some_and(|max| state.element_count(el.id.as_str()) >= max)
    }

    fn can_pay(&self, state: &EconomyState, cost: &CostMap) -> bool {
        cost.iter()
            .all(|(c, amount)| state.currency_value(c.as_str()) >= *amount)
    }

    fn refusal(&self, el: &ElementDef) -> Option<PurchaseRefusal> {
        let s = &self.state;
        if !self.is_available(s, el) {
            Some(PurchaseRefusal::Unavailable)
        } else if self.is_maxed(s, el) {
            Some(PurchaseRefusal::MaxCount)
        } else if !el.purchase_requirements.iter().all(|r| r.evaluate(s)) {
            Some(PurchaseRefusal::PurchaseRequirement)
        } else if !self.can_pay(s, &self.cost_in(s, el)) {
            Some(PurchaseRefusal::Unaffordable)
        } else {
            None
        }
    }

    fn status_of(&self, el: &ElementDef) -> ElementStatus {
        let s = &self.state;
        let cost = self.cost_in(s, el);
        let available = self.is_available(s, el);
        let maxed = self.is_maxed(s, el);
        let affordable = available && !maxed && self.can_pay(s, &cost);
        let purchasable =
            affordable && el.purchase_requirements.iter().all(|r| r.evaluate(s));
        ElementStatus {
            id: el.id.clone(),
            count: s.element_count(el.id.as_str()),
            available,
            affordable,
            purchasable,
            maxed,
            cost,
        }
    }

    /// Add gross earnings; the balance is capped, the lifetime totals are not.
    fn credit(&mut self, currency: &str, amount: f64) -> f64 {
        if amount.is_nan() || amount <= 0.0 {
            return 0.0;
        }
        let cap = self.effective_cap(currency).unwrap_or(f64::INFINITY);
        let Some(c) = self.state.currencies.get_mut(currency) else {
            return 0.0;
        };
        c.total_earned += amount;
        c.all_time_earned += amount;
        let before = c.current;
        c.current = (c.current + amount).min(cap);
        (c.current - before).max(0.0)
    }

    fn recompute_rates(&mut self) {
        let rates = self.compute_rates(&self.state);
        for (id, rate) in rates {
            if let Some(c) = self.state.currencies.get_mut(&id) {
                c.rate = rate;
            }
        }
    }

    fn clamp_to_caps(&mut self) {
        let caps: Vec<(CurrencyId, f64)> = self
            .state
            .currencies
            .keys()
            .filter_map(|id| self.effective_cap(id.as_str()).map(|cap| (id.clone(), cap)))
            .collect();
        for (id, cap) in caps {
            if let Some(c) = self.state.currencies.get_mut(&id) {
                if c.current > cap {
                    c.current = cap;
                }
            }
        }
    }

    fn update_flags(&mut self) {
        let def = Arc::clone(&self.def);
        for el in def.elements.values() {
            let available = self.is_available(&self.state, el);
            let affordable = available
                && !self.is_maxed(&self.state, el)
                && self.can_pay(&self.state, &self.cost_in(&self.state, el));
            if let Some(s) = self.state.elements.get_mut(&el.id) {
                s.available = available;
                s.affordable = affordable;
            }
        }
    }

    fn refresh(&mut self) {
        self.recompute_rates();
        self.clamp_to_caps();
        self.update_flags();
    }

    fn run_hook(&mut self, hook: &Hook) {
        let actions = {
            let mut ctx = HookContext::new(&self.state);
            hook(&mut ctx);
            ctx.into_actions()
        };
        self.apply_actions(actions);
    }

    fn tick_subsystems(&mut self, delta: f64) {
        let subsystems = std::mem::take(&mut self.subsystems);
        for sub in &subsystems {
            let actions = {
                let mut ctx = HookContext::new(&self.state);
                sub.tick(&mut ctx, delta);
                ctx.into_actions()
            };
            if !actions.is_empty() {
                debug!(subsystem = sub.name(), actions = actions.len(), "subsystem tick");
            }
            self.apply_actions(actions);
        }
        self.subsystems = subsystems;
    }

    fn apply_actions(&mut self, actions: Vec<HookAction>) {
        if actions.is_empty() {
            return;
        }
        for action in actions {
            match action {
                HookAction::Grant { currency, amount } => {
                    if self.def.currencies.contains_key(&currency) {
                        self.credit(currency.as_str(), amount);
                    } else {
                        warn!(currency = %currency, "hook granted an unknown currency");
                    }
                }
                HookAction::Unlock(id) => match self.state.elements.get_mut(&id) {
                    Some(s) => s.unlocked = true,
                    None => warn!(element = %id, "hook unlocked an unknown element"),
                },
                HookAction::SatisfyEstimate(key) => {
                    self.state.estimates.insert(key, EstimateStatus::Satisfied);
                }
            }
        }
        self.refresh();
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("definition", &self.def.name)
            .field("time_elapsed", &self.state.time_elapsed)
            .field("run_number", &self.state.run_number)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field(
                "subsystems",
                &self.subsystems.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CurrencyDef, MilestoneDef, PrestigeLayer, ResetScope};
    use crate::hooks::SimulationProxy;
    use idle_core::{CompareOp, Requirement, Value};
    use idle_econ::CostScaling;
    use proptest::prelude::*;

    fn miner() -> ElementDef {
        ElementDef::new("miner", "Miner")
            .cost("gold", 10.0)
            .scaling(CostScaling::exponential(1.15))
            .effect(Effect::per_count(
                "miner",
                EffectKind::ProductionFlat,
                "gold",
                2.0,
            ))
    }

    fn game() -> GameDefinition {
        GameDefinition::builder("mine")
            .currency(CurrencyDef::new("gold", "Gold"))
            .currency(CurrencyDef::new("gems", "Gems").persistent())
            .click_target("gold", 1.0)
            .element(miner())
            .build()
            .unwrap()
    }

    fn rt(def: GameDefinition) -> Runtime {
        Runtime::new(Arc::new(def))
    }

    fn set_gold(rt: &mut Runtime, v: f64) {
        rt.state.currencies.get_mut("gold").unwrap().current = v;
        rt.refresh();
    }

    fn set_count(rt: &mut Runtime, id: &str, n: u64) {
        rt.state.elements.get_mut(id).unwrap().count = n;
        rt.refresh();
    }

    #[test]
    fn starts_from_definition_defaults() {
        let r = rt(game());
        let s = r.state();
        assert_eq!(s.run_number, 1);
        assert_eq!(s.currency_value("gold"), 0.0);
        assert_eq!(s.element_count("miner"), 0);
        assert!(s.elements["miner"].available);
        assert!(!s.elements["miner"].affordable);
        assert_eq!(r.available_elements().len(), 1);
        assert!(r.affordable_elements().is_empty());
    }

    #[test]
    fn tick_integrates_and_counts_gross_earnings() {
        let def = GameDefinition::builder("capped")
            .currency(CurrencyDef::new("gold", "Gold").initial(95.0).cap(100.0))
            .element(miner())
            .build()
            .unwrap();
        let mut r = rt(def);
        set_count(&mut r, "miner", 5);
        r.tick(1.0);
        let g = &r.state().currencies["gold"];
        assert_eq!(g.rate, 10.0);
        assert_eq!(g.current, 100.0);
        assert_eq!(g.total_earned, 10.0);
        assert_eq!(g.all_time_earned, 10.0);
        assert_eq!(r.state().time_elapsed, 1.0);
    }

    #[test]
    fn lowered_cap_clamps_the_balance() {
        let def = GameDefinition::builder("cap")
            .currency(
                CurrencyDef::new("gold", "Gold")
                    .initial(50.0)
                    .cap(Value::computed(|s| 100.0 - s.time_elapsed * 10.0)),
            )
            .build()
            .unwrap();
        let mut r = rt(def);
        r.tick(6.0);
        assert_eq!(r.state().currency_value("gold"), 40.0);
        assert_eq!(r.effective_cap("gold"), Some(40.0));
    }

    #[test]
    fn click_value_aggregates_flat_then_mult() {
        let def = GameDefinition::builder("clicks")
            .currency(CurrencyDef::new("gold", "Gold"))
            .currency(CurrencyDef::new("wood", "Wood"))
            .click_target("gold", 1.0)
            .element(
                ElementDef::new("glove", "Glove")
                    .effect(Effect::fixed(EffectKind::ClickFlat, "gold", 1.0))
                    .effect(Effect::fixed(EffectKind::ClickMult, "gold", 3.0)),
            )
            .build()
            .unwrap();
        let mut r = rt(def);
        assert_eq!(r.process_click("gold").unwrap(), 1.0);
        r.try_purchase("glove").unwrap();
        assert_eq!(r.click_value("gold"), 6.0);
        assert_eq!(r.process_clicks("gold", 2.5).unwrap(), 15.0);
        assert_eq!(r.state().total_earned("gold"), 16.0);
        assert_eq!(r.process_click("wood").unwrap(), 0.0);
        assert_eq!(
            r.process_click("mana"),
            Err(RuntimeError::UnknownCurrency("mana".into()))
        );
    }

    #[test]
    fn phase_override_moves_click_bonus_into_production() {
        let def = GameDefinition::builder("moved")
            .currency(CurrencyDef::new("gold", "Gold"))
            .click_target("gold", 1.0)
            .element(
                ElementDef::new("statue", "Statue").effect(
                    Effect::fixed(EffectKind::ClickFlat, "gold", 5.0).in_phase(EffectPhase::Base),
                ),
            )
            .build()
            .unwrap();
        let mut r = rt(def);
        r.try_purchase("statue").unwrap();
        assert_eq!(r.state().currency_rate("gold"), 5.0);
        assert_eq!(r.click_value("gold"), 1.0);
        assert_eq!(r.income_rate("gold"), 5.0);
    }

    struct Rain {
        per_second: f64,
    }

    impl Subsystem for Rain {
        fn name(&self) -> &str {
            "rain"
        }

        fn tick(&self, ctx: &mut HookContext<'_>, delta: f64) {
            ctx.grant("water", self.per_second * delta);
            if ctx.state().time_elapsed >= 10.0 {
                ctx.unlock("well");
            }
        }

        fn proxy(&self) -> Option<&dyn SimulationProxy> {
            Some(self)
        }
    }

    impl SimulationProxy for Rain {
        fn estimate_production(
            &self,
            _: &EconomyState,
            duration: f64,
        ) -> BTreeMap<CurrencyId, f64> {
            BTreeMap::from([(CurrencyId::from("water"), self.per_second * duration)])
        }
    }

    #[test]
    fn subsystems_tick_after_time_and_queue_actions() {
        let def = GameDefinition::builder("rain")
            .currency(CurrencyDef::new("water", "Water"))
            .element(
                ElementDef::new("well", "Well")
                    .cost("water", 30.0)
                    .requires(Requirement::time(CompareOp::Ge, 1e9)),
            )
            .build()
            .unwrap();
        let mut r = rt(def);
        r.add_subsystem(Box::new(Rain { per_second: 2.0 }));
        assert_eq!(r.state().currency_rate("water"), 0.0);
        assert_eq!(r.income_rate("water"), 2.0);

        r.tick(5.0);
        assert_eq!(r.state().currency_value("water"), 10.0);
        assert!(!r.element_status("well").unwrap().available);

        r.tick(5.0);
        assert_eq!(r.state().currency_value("water"), 20.0);
        assert_eq!(r.state().total_earned("water"), 20.0);
        assert!(r.element_status("well").unwrap().available);
        assert_eq!(r.time_to_afford("well").unwrap(), Some(5.0));
        assert!(format!("{r:?}").contains("rain"));
    }

    #[test]
    fn auto_clicks_pay_full_click_value() {
        let def = GameDefinition::builder("auto")
            .currency(CurrencyDef::new("gold", "Gold"))
            .click_target("gold", 2.0)
            .element(
                ElementDef::new("cursor", "Cursor")
                    .effect(Effect::per_count("cursor", EffectKind::AutoClick, "gold", 0.5)),
            )
            .build()
            .unwrap();
        let mut r = rt(def);
        r.try_purchase("cursor").unwrap();
        r.try_purchase("cursor").unwrap();
        assert_eq!(r.auto_click_rate("gold"), 1.0);
        assert_eq!(r.income_rate("gold"), 2.0);
        r.tick(3.0);
        assert_eq!(r.state().currency_value("gold"), 6.0);
    }

    #[test]
    fn purchase_deducts_scaled_cost_and_applies_one_time_effects() {
        let def = GameDefinition::builder("shop")
            .currency(CurrencyDef::new("gold", "Gold"))
            .currency(CurrencyDef::new("gems", "Gems"))
            .element(
                miner()
                    .effect(Effect::fixed(EffectKind::Grant, "gems", 3.0))
                    .effect(Effect::fixed(EffectKind::Unlock, "vault", 1.0))
                    .on_purchase(|ctx| {
                        let n = ctx.state().element_count("miner") as f64;
                        ctx.grant("gems", n);
                    }),
            )
            .element(
                ElementDef::new("vault", "Vault").requires(Requirement::time(CompareOp::Ge, 1e9)),
            )
            .build()
            .unwrap();
        let mut r = rt(def);
        set_gold(&mut r, 30.0);
        assert!(!r.state().elements["vault"].available);
        let out = r.try_purchase("miner").unwrap();
        assert_eq!(
            out,
            PurchaseOutcome::Purchased {
                cost: CostMap::from([(CurrencyId::from("gold"), 10.0)]),
                count: 1
            }
        );
        assert_eq!(r.state().currency_value("gold"), 20.0);
        assert_eq!(r.state().currency_value("gems"), 4.0);
        assert!(r.state().elements["vault"].available);
        assert_eq!(r.state().currency_rate("gold"), 2.0);
        let next = r.current_cost("miner").unwrap();
        assert!((next["gold"] - 11.5).abs() < 1e-12);
    }

    #[test]
    fn refusals_are_reported_in_order() {
        let def = GameDefinition::builder("gates")
            .currency(CurrencyDef::new("gold", "Gold").initial(100.0))
            .element(
                ElementDef::new("hidden", "Hidden")
                    .requires(Requirement::milestone("m"))
                    .cost("gold", 1.0),
            )
            .element(ElementDef::new("once", "Once").max_count(1).cost("gold", 1.0))
            .element(
                ElementDef::new("gated", "Gated")
                    .purchase_requires(Requirement::time(CompareOp::Ge, 5.0)),
            )
            .element(ElementDef::new("pricey", "Pricey").cost("gold", 1000.0))
            .milestone(MilestoneDef::new("m", "M", Requirement::time(CompareOp::Ge, 99.0)))
            .build()
            .unwrap();
        let mut r = rt(def);
        let refused = |o: PurchaseOutcome| match o {
            PurchaseOutcome::Refused(why) => Some(why),
            PurchaseOutcome::Purchased { .. } => None,
        };
        assert_eq!(
            refused(r.try_purchase("hidden").unwrap()),
            Some(PurchaseRefusal::Unavailable)
        );
        assert!(r.try_purchase("once").unwrap().is_purchased());
        assert_eq!(
            refused(r.try_purchase("once").unwrap()),
            Some(PurchaseRefusal::MaxCount)
        );
        assert_eq!(
            refused(r.try_purchase("gated").unwrap()),
            Some(PurchaseRefusal::PurchaseRequirement)
        );
        let gated = r.element_status("gated").unwrap();
        assert!(gated.affordable && !gated.purchasable);
        assert_eq!(
            refused(r.try_purchase("pricey").unwrap()),
            Some(PurchaseRefusal::Unaffordable)
        );
        assert_eq!(
            r.try_purchase("ghost"),
            Err(RuntimeError::UnknownElement("ghost".into()))
        );
    }

    #[test]
    fn cost_multipliers_apply_to_their_target() {
        let def = GameDefinition::builder("discount")
            .currency(CurrencyDef::new("gold", "Gold").initial(100.0))
            .element(miner())
            .element(
                ElementDef::new("coupon", "Coupon")
                    .max_count(1)
                    .effect(Effect::fixed(EffectKind::CostMult, "miner", 0.5)),
            )
            .build()
            .unwrap();
        let mut r = rt(def);
        r.try_purchase("coupon").unwrap();
        assert_eq!(r.current_cost("miner").unwrap()["gold"], 5.0);
    }

    #[test]
    fn milestones_fire_once_with_timestamp_and_hook() {
        let def = GameDefinition::builder("ms")
            .currency(CurrencyDef::new("gold", "Gold"))
            .currency(CurrencyDef::new("gems", "Gems"))
            .element(miner())
            .milestone(
                MilestoneDef::new("rich", "Rich", Requirement::resource("gold", CompareOp::Ge, 20.0))
                    .on_trigger(|ctx| {
                        ctx.grant("gems", 1.0);
                        ctx.unlock("miner");
                    }),
            )
            .build()
            .unwrap();
        let mut r = rt(def);
        set_count(&mut r, "miner", 5);
        assert!(r.tick(1.0).is_empty());
        assert_eq!(r.tick(1.0), vec![MilestoneId::from("rich")]);
        assert_eq!(r.state().milestone_time("rich"), Some(2.0));
        assert!(r.tick(1.0).is_empty());
        assert_eq!(r.state().milestone_time("rich"), Some(2.0));
        assert_eq!(r.state().currency_value("gems"), 1.0);
        assert!(r.state().is_unlocked("miner"));
    }

    fn prestige_game() -> GameDefinition {
        GameDefinition::builder("ascend")
            .currency(CurrencyDef::new("gold", "Gold").initial(5.0))
            .currency(CurrencyDef::new("gems", "Gems").persistent())
            .element(miner())
            .element(
                ElementDef::new("shrine", "Shrine")
                    .tag(idle_core::PERSISTENT_TAG)
                    .effect(Effect::fixed(EffectKind::ProductionMult, "gold", 2.0)),
            )
            .prestige(
                PrestigeLayer::new(
                    "ascend",
                    "Ascend",
                    "gems",
                    Value::computed(|s| (s.total_earned("gold") / 100.0).floor()),
                )
                .requires(Requirement::total_earned("gold", CompareOp::Ge, 100.0))
                .min_reward(2.0),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn prestige_refusals() {
        let mut r = rt(prestige_game());
        assert_eq!(r.prestige_reward("ascend").unwrap(), None);
        match r.trigger_prestige("ascend").unwrap() {
            PrestigeOutcome::Refused(PrestigeRefusal::RequirementsUnmet { unmet }) => {
                assert_eq!(unmet.len(), 1)
            }
            other => panic!("unexpected {other:?}"),
        }
        r.state.currencies.get_mut("gold").unwrap().total_earned = 150.0;
        assert_eq!(
            r.trigger_prestige("ascend").unwrap(),
            PrestigeOutcome::Refused(PrestigeRefusal::BelowMinimum {
                reward: 1.0,
                minimum: 2.0
            })
        );
        assert_eq!(
            r.trigger_prestige("nope"),
            Err(RuntimeError::UnknownLayer("nope".into()))
        );
        assert_eq!(r.state().run_number, 1);
    }

    #[test]
    fn prestige_resets_non_persistent_progress() {
        let mut r = rt(prestige_game());
        set_count(&mut r, "miner", 3);
        set_count(&mut r, "shrine", 1);
        r.state.currencies.get_mut("gems").unwrap().current = 7.0;
        r.tick(25.0); // 12/s
        let earned = r.state().total_earned("gold");
        assert_eq!(earned, 300.0);
        assert_eq!(r.prestige_reward("ascend").unwrap(), Some(3.0));

        let PrestigeOutcome::Completed(summary) = r.trigger_prestige("ascend").unwrap() else {
            panic!("prestige refused");
        };
        assert_eq!(summary.reward, 3.0);
        assert_eq!(summary.run_number, 2);
        assert_eq!(summary.run_duration, 25.0);
        assert_eq!(summary.reset_currencies, vec![CurrencyId::from("gold")]);
        assert_eq!(summary.reset_elements, vec![ElementId::from("miner")]);

        let s = r.state();
        assert_eq!(s.currency_value("gold"), 5.0);
        assert_eq!(s.total_earned("gold"), 0.0);
        assert_eq!(s.all_time_earned("gold"), 300.0);
        assert_eq!(s.currency_value("gems"), 10.0);
        assert_eq!(s.element_count("miner"), 0);
        assert_eq!(s.element_count("shrine"), 1);
        assert_eq!(s.prestige_count("ascend"), 1);
        assert_eq!(s.run_started_at, 25.0);
        assert_eq!(s.currency_rate("gold"), 0.0);
    }

    #[test]
    fn scoped_reset_only_touches_listed_ids() {
        let def = GameDefinition::builder("scoped")
            .currency(CurrencyDef::new("gold", "Gold"))
            .currency(CurrencyDef::new("wood", "Wood"))
            .element(miner())
            .prestige(
                PrestigeLayer::new("soft", "Soft", "wood", 1.0)
                    .resets_currencies(ResetScope::Only(vec![CurrencyId::from("gold")]))
                    .resets_elements(ResetScope::Only(vec![])),
            )
            .build()
            .unwrap();
        let mut r = rt(def);
        set_count(&mut r, "miner", 2);
        set_gold(&mut r, 50.0);
        assert!(matches!(
            r.trigger_prestige("soft").unwrap(),
            PrestigeOutcome::Completed(_)
        ));
        assert_eq!(r.state().currency_value("gold"), 0.0);
        assert_eq!(r.state().currency_value("wood"), 1.0);
        assert_eq!(r.state().element_count("miner"), 2);
    }

    #[test]
    fn time_to_afford_uses_binding_currency() {
        let def = GameDefinition::builder("tta")
            .currency(CurrencyDef::new("gold", "Gold"))
            .currency(CurrencyDef::new("wood", "Wood").cap(50.0))
            .element(miner())
            .element(
                ElementDef::new("mill", "Mill")
                    .effect(Effect::fixed(EffectKind::ProductionFlat, "wood", 1.0)),
            )
            .element(ElementDef::new("house", "House").cost("gold", 20.0).cost("wood", 30.0))
            .element(ElementDef::new("castle", "Castle").cost("wood", 60.0))
            .build()
            .unwrap();
        let mut r = rt(def);
        assert_eq!(r.time_to_afford("miner").unwrap(), None);
        let clicks = BTreeMap::from([(CurrencyId::from("gold"), 5.0)]);
        assert_eq!(r.time_to_afford_with("miner", &clicks).unwrap(), Some(2.0));

        r.try_purchase("mill").unwrap();
        set_count(&mut r, "miner", 1);
        // gold needs 10s at 2/s, wood needs 30s at 1/s.
        assert_eq!(r.time_to_afford("house").unwrap(), Some(30.0));
        assert_eq!(r.time_to_afford("castle").unwrap(), None);
        set_gold(&mut r, 100.0);
        assert_eq!(r.time_to_afford("miner").unwrap(), Some(0.0));
    }

    #[test]
    fn projected_rates_preview_does_not_mutate() {
        let mut r = rt(game());
        set_count(&mut r, "miner", 2);
        let before = r.state().clone();
        let projected = r.projected_rates_after("miner").unwrap();
        assert_eq!(projected["gold"], 6.0);
        assert_eq!(r.state(), &before);
    }

    #[test]
    fn extension_hooks_feed_the_pipeline() {
        let def = GameDefinition::builder("ext")
            .currency(CurrencyDef::new("gold", "Gold"))
            .currency(CurrencyDef::new("wood", "Wood"))
            .element(miner())
            .element(
                ElementDef::new("forge", "Forge")
                    .effect(Effect::fixed(EffectKind::Custom("heat".into()), "gold", 3.0)),
            )
            .build()
            .unwrap();
        let mut r = rt(def);
        set_count(&mut r, "miner", 1);
        set_count(&mut r, "forge", 1);
        assert_eq!(r.state().currency_rate("gold"), 2.0);
        r.register_effect_handler("heat", |_, v, _| {
            Some(Contribution::new(EffectPhase::BonusMult, v))
        });
        assert_eq!(r.state().currency_rate("gold"), 6.0);
        r.set_production_override("wood", |_, _, s| s.element_count("forge") as f64 * 7.0)
            .unwrap();
        assert_eq!(r.state().currency_rate("wood"), 7.0);
        assert!(r.set_production_override("mana", |_, _, _| 0.0).is_err());
    }

    #[test]
    fn estimates_gate_availability() {
        let def = GameDefinition::builder("est")
            .currency(CurrencyDef::new("gold", "Gold"))
            .element(ElementDef::new("lab", "Lab").requires(Requirement::estimated("research", 10.0, 0.0)))
            .build()
            .unwrap();
        let mut r = rt(def);
        assert!(r.available_elements().is_empty());
        r.schedule_estimate("research", 4.0);
        r.tick(3.0);
        assert!(!r.state().elements["lab"].available);
        r.tick(1.0);
        assert!(r.state().elements["lab"].available);

        let mut other = rt(r.definition().clone());
        other.satisfy_estimate("research");
        assert_eq!(other.affordable_elements().len(), 1);
    }

    #[test]
    fn element_status_serializes() {
        let r = rt(game());
        let json = serde_json::to_string(&r.element_status("miner").unwrap()).unwrap();
        assert!(json.contains("\"gold\":10.0"));
    }

    proptest! {
        #[test]
        fn tick_splits_are_equivalent(count in 0u64..20, initial in 0.0f64..1000.0, dt in 0.01f64..100.0) {
            let def = GameDefinition::builder("split")
                .currency(CurrencyDef::new("gold", "Gold").initial(initial))
                .element(miner())
                .build()
                .unwrap();
            let mut once = rt(def);
            set_count(&mut once, "miner", count);
            let mut twice = once.clone();
            once.tick(2.0 * dt);
            twice.tick(dt);
            twice.tick(dt);
            let a = once.state().currency_value("gold");
            let b = twice.state().currency_value("gold");
            prop_assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0));
            prop_assert!((once.state().time_elapsed - twice.state().time_elapsed).abs() < 1e-9);
        }

        #[test]
        fn purchase_is_atomic(gold in 0.0f64..25.0, owned in 0u64..4) {
            let mut r = rt(game());
            set_count(&mut r, "miner", owned);
            set_gold(&mut r, gold);
            let before = r.state().clone();
            let price = r.current_cost("miner").unwrap()["gold"];
            match r.try_purchase("miner").unwrap() {
                PurchaseOutcome::Purchased { .. } => {
                    prop_assert!(gold >= price);
                    prop_assert!((r.state().currency_value("gold") - (gold - price)).abs() < 1e-9);
                    prop_assert_eq!(r.state().element_count("miner"), owned + 1);
                }
                PurchaseOutcome::Refused(why) => {
                    prop_assert_eq!(why, PurchaseRefusal::Unaffordable);
                    prop_assert_eq!(r.state(), &before);
                }
            }
            prop_assert!(r.state().currency_value("gold") >= 0.0);
        }

        #[test]
        fn prestige_never_reduces_persistent_progress(gems in 0.0f64..1e6, shrines in 0u64..5, earned in 100.0f64..1e5) {
            let mut r = rt(prestige_game());
            set_count(&mut r, "shrine", shrines);
            r.state.currencies.get_mut("gems").unwrap().current = gems;
            r.state.currencies.get_mut("gold").unwrap().total_earned = earned;
            let _ = r.trigger_prestige("ascend").unwrap();
            prop_assert!(r.state().currency_value("gems") >= gems);
            prop_assert_eq!(r.state().element_count("shrine"), shrines);
        }
    }
}
