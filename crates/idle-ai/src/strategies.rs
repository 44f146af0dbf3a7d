//! Built-in purchase-ordering policies.

use crate::clicks::{ClickProfile, PrestigePolicy};
use crate::Strategy;
use idle_core::{CurrencyId, ElementId};
use idle_runtime::{ElementStatus, Runtime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Total rate increase across currencies if one more unit of `id` were owned.
fn rate_gain(runtime: &Runtime, id: &ElementId) -> f64 {
    let Ok(projected) = runtime.projected_rates_after(id.as_str()) else {
        return 0.0;
    };
    let state = runtime.state();
    projected
        .iter()
        .map(|(c, rate)| rate - state.currency_rate(c.as_str()))
        .sum()
}

/// Gain per unit of cost; free elements with any gain rank first.
fn roi(gain: f64, cost: f64) -> f64 {
    if cost > 0.0 {
        gain / cost
    } else if gain > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Income from the click profile while waiting, per currency.
fn click_income(runtime: &Runtime, clicks: &ClickProfile) -> BTreeMap<CurrencyId, f64> {
    clicks
        .rates(runtime.state(), true)
        .into_iter()
        .map(|(c, cps)| {
            let value = runtime.click_value(c.as_str());
            (c, cps * value)
        })
        .collect()
}

fn cheapest_first(affordable: &[ElementStatus], weights: &BTreeMap<CurrencyId, f64>) -> Vec<ElementId> {
    let mut ranked: Vec<(f64, &ElementStatus)> = affordable
        .iter()
        .map(|s| (s.total_cost(weights), s))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
    ranked.into_iter().map(|(_, s)| s.id.clone()).collect()
}

/// Buy whatever is cheapest, by optionally weighted total cost.
#[derive(Clone, Debug, Default)]
pub struct GreedyCheapest {
    pub weights: BTreeMap<CurrencyId, f64>,
    pub clicks: ClickProfile,
    pub prestige: PrestigePolicy,
}

impl GreedyCheapest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Multiply costs in `currency` by `weight` when ranking.
    pub fn with_weight(mut self, currency: impl Into<CurrencyId>, weight: f64) -> Self {
        self.weights.insert(currency.into(), weight);
        self
    }

    pub fn with_clicks(mut self, clicks: ClickProfile) -> Self {
        self.clicks = clicks;
        self
    }

    pub fn with_prestige(mut self, prestige: PrestigePolicy) -> Self {
        self.prestige = prestige;
        self
    }
}

impl Strategy for GreedyCheapest {
    fn describe(&self) -> String {
        format!("greedy-cheapest ({})", self.clicks.describe())
    }

    fn decide_purchases(&self, _runtime: &Runtime, affordable: &[ElementStatus]) -> Vec<ElementId> {
        cheapest_first(affordable, &self.weights)
    }

    fn click_profile(&self) -> &ClickProfile {
        &self.clicks
    }

    fn should_prestige(&self, runtime: &Runtime, layer: &str) -> bool {
        self.prestige.decide(runtime, layer)
    }
}

/// Buy the affordable element with the best immediate rate gain per cost.
#[derive(Clone, Debug, Default)]
pub struct GreedyRoi {
    pub clicks: ClickProfile,
    pub prestige: PrestigePolicy,
}

impl GreedyRoi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clicks(mut self, clicks: ClickProfile) -> Self {
        self.clicks = clicks;
        self
    }

    pub fn with_prestige(mut self, prestige: PrestigePolicy) -> Self {
        self.prestige = prestige;
        self
    }
}

impl Strategy for GreedyRoi {
    fn describe(&self) -> String {
        format!("greedy-roi ({})", self.clicks.describe())
    }

    fn decide_purchases(&self, runtime: &Runtime, affordable: &[ElementStatus]) -> Vec<ElementId> {
        let no_weights = BTreeMap::new();
        let mut ranked: Vec<(f64, f64, &ElementStatus)> = affordable
            .iter()
            .map(|s| {
                let cost = s.total_cost(&no_weights);
                (roi(rate_gain(runtime, &s.id), cost), cost, s)
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.total_cmp(&b.1))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });
        ranked.into_iter().map(|(_, _, s)| s.id.clone()).collect()
    }

    fn click_profile(&self) -> &ClickProfile {
        &self.clicks
    }

    fn should_prestige(&self, runtime: &Runtime, layer: &str) -> bool {
        self.prestige.decide(runtime, layer)
    }
}

/// Pick the single best-ROI element among everything reachable and wait
/// for it, even when cheaper things are affordable meanwhile. Falls back to
/// cheapest-first when no element raises any rate.
#[derive(Clone, Debug, Default)]
pub struct SaveForBest {
    pub clicks: ClickProfile,
    pub prestige: PrestigePolicy,
}

impl SaveForBest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clicks(mut self, clicks: ClickProfile) -> Self {
        self.clicks = clicks;
        self
    }

    pub fn with_prestige(mut self, prestige: PrestigePolicy) -> Self {
        self.prestige = prestige;
        self
    }

    /// The element this strategy is currently saving for.
    pub fn target(&self, runtime: &Runtime) -> Option<ElementId> {
        let income = click_income(runtime, &self.clicks);
        let no_weights = BTreeMap::new();
        runtime
            .available_elements()
            .into_iter()
            .filter(|s| !s.maxed)
            .filter(|s| {
                s.purchasable
                    || (!s.affordable
                        && matches!(
                            runtime.time_to_afford_with(s.id.as_str(), &income),
                            Ok(Some(_))
                        ))
            })
            .filter_map(|s| {
                let gain = rate_gain(runtime, &s.id);
                (gain > 0.0).then(|| (roi(gain, s.total_cost(&no_weights)), s.id))
            })
            .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
            .map(|(_, id)| id)
    }
}

impl Strategy for SaveForBest {
    fn describe(&self) -> String {
        format!("save-for-best ({})", self.clicks.describe())
    }

    fn decide_purchases(&self, runtime: &Runtime, affordable: &[ElementStatus]) -> Vec<ElementId> {
        match self.target(runtime) {
            Some(id) if affordable.iter().any(|s| s.id == id) => vec![id],
            Some(id) => {
                trace!(target_element = %id, "saving for best target");
                Vec::new()
            }
            None => cheapest_first(affordable, &BTreeMap::new()),
        }
    }

    fn click_profile(&self) -> &ClickProfile {
        &self.clicks
    }

    fn should_prestige(&self, runtime: &Runtime, layer: &str) -> bool {
        self.prestige.decide(runtime, layer)
    }
}

/// Designer-fixed build order of `(element, target count)` entries, then a
/// fallback strategy once every reachable entry is satisfied.
///
/// Entries that are hidden or can never be afforded at current income are
/// skipped rather than waited on.
#[derive(Default)]
pub struct PriorityList {
    order: Vec<(ElementId, u64)>,
    fallback: Option<Box<dyn Strategy>>,
    pub clicks: ClickProfile,
    pub prestige: PrestigePolicy,
}

impl PriorityList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, element: impl Into<ElementId>, target_count: u64) -> Self {
        self.order.push((element.into(), target_count));
        self
    }

    pub fn with_fallback(mut self, fallback: impl Strategy + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    pub fn with_clicks(mut self, clicks: ClickProfile) -> Self {
        self.clicks = clicks;
        self
    }

    pub fn with_prestige(mut self, prestige: PrestigePolicy) -> Self {
        self.prestige = prestige;
        self
    }
}

impl Strategy for PriorityList {
    fn describe(&self) -> String {
        let order: Vec<String> = self
            .order
            .iter()
            .map(|(id, n)| format!("{id}x{n}"))
            .collect();
        let fallback = self
            .fallback
            .as_ref()
            .map_or_else(|| "none".to_string(), |f| f.describe());
        format!(
            "priority [{}] then {} ({})",
            order.join(", "),
            fallback,
            self.clicks.describe()
        )
    }

    fn decide_purchases(&self, runtime: &Runtime, affordable: &[ElementStatus]) -> Vec<ElementId> {
        let income = click_income(runtime, &self.clicks);
        for (id, target) in &self.order {
            let Ok(status) = runtime.element_status(id.as_str()) else {
                continue;
            };
            if status.count >= *target || status.maxed || !status.available {
                continue;
            }
            if status.purchasable {
                return vec![id.clone()];
            }
            let reachable = matches!(
                runtime.time_to_afford_with(id.as_str(), &income),
                Ok(Some(_))
            );
            if !status.affordable && reachable {
                return Vec::new();
            }
        }
        self.fallback
            .as_ref()
            .map_or_else(Vec::new, |f| f.decide_purchases(runtime, affordable))
    }

    fn click_profile(&self) -> &ClickProfile {
        &self.clicks
    }

    fn should_prestige(&self, runtime: &Runtime, layer: &str) -> bool {
        self.prestige.decide(runtime, layer)
    }
}

pub type PurchaseFn = Arc<dyn Fn(&Runtime, &[ElementStatus]) -> Vec<ElementId> + Send + Sync>;
pub type PrestigeFn = Arc<dyn Fn(&Runtime, &str) -> bool + Send + Sync>;

/// Closure-backed strategy.
#[derive(Clone)]
pub struct CustomStrategy {
    name: String,
    purchase: PurchaseFn,
    prestige: Option<PrestigeFn>,
    clicks: ClickProfile,
}

impl CustomStrategy {
    pub fn new<F>(name: impl Into<String>, purchase: F) -> Self
    where
        F: Fn(&Runtime, &[ElementStatus]) -> Vec<ElementId> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            purchase: Arc::new(purchase),
            prestige: None,
            clicks: ClickProfile::none(),
        }
    }

    pub fn with_prestige<F>(mut self, f: F) -> Self
    where
        F: Fn(&Runtime, &str) -> bool + Send + Sync + 'static,
    {
        self.prestige = Some(Arc::new(f));
        self
    }

    pub fn with_clicks(mut self, clicks: ClickProfile) -> Self {
        self.clicks = clicks;
        self
    }
}

impl Strategy for CustomStrategy {
    fn describe(&self) -> String {
        format!("custom '{}' ({})", self.name, self.clicks.describe())
    }

    fn decide_purchases(&self, runtime: &Runtime, affordable: &[ElementStatus]) -> Vec<ElementId> {
        (self.purchase)(runtime, affordable)
    }

    fn click_profile(&self) -> &ClickProfile {
        &self.clicks
    }

    fn should_prestige(&self, runtime: &Runtime, layer: &str) -> bool {
        self.prestige.as_ref().is_some_and(|f| f(runtime, layer))
    }
}

/// Built-in strategies selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    GreedyCheapest,
    GreedyRoi,
    SaveForBest,
}

impl StrategyKind {
    pub fn build(self, clicks: ClickProfile, prestige: PrestigePolicy) -> Box<dyn Strategy> {
        match self {
            StrategyKind::GreedyCheapest => Box::new(
                GreedyCheapest::new()
                    .with_clicks(clicks)
                    .with_prestige(prestige),
            ),
            StrategyKind::GreedyRoi => {
                Box::new(GreedyRoi::new().with_clicks(clicks).with_prestige(prestige))
            }
            StrategyKind::SaveForBest => {
                Box::new(SaveForBest::new().with_clicks(clicks).with_prestige(prestige))
            }
        }
    }
}
