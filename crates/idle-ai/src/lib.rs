#![deny(warnings)]

//! Purchase, click and prestige policies consulted by the simulator.
//!
//! A [`Strategy`] never mutates state: it reads the [`Runtime`] and returns
//! decisions. Built-in policies differ only in how they order purchases and
//! share [`ClickProfile`] for click volume.

pub mod clicks;
pub mod strategies;

pub use clicks::{ClickProfile, PrestigePolicy};
pub use strategies::{
    CustomStrategy, GreedyCheapest, GreedyRoi, PriorityList, SaveForBest, StrategyKind,
};

use idle_core::{CurrencyId, EconomyState, ElementId};
use idle_runtime::{ElementStatus, Runtime};
use std::collections::BTreeMap;

/// Decision points driving a simulated player.
pub trait Strategy {
    /// Human-readable summary for reports.
    fn describe(&self) -> String;

    /// Elements to try buying, highest priority first. `affordable` holds the
    /// elements `try_purchase` would accept right now. An empty result means
    /// "wait".
    fn decide_purchases(&self, runtime: &Runtime, affordable: &[ElementStatus]) -> Vec<ElementId>;

    fn click_profile(&self) -> &ClickProfile;

    /// Clicks to issue per currency over the next `duration` seconds.
    fn clicks(&self, state: &EconomyState, duration: f64) -> BTreeMap<CurrencyId, f64> {
        self.click_profile().clicks(state, duration, false)
    }

    /// Clicks per second while waiting for something to become affordable.
    fn click_rates_while_waiting(&self, state: &EconomyState) -> BTreeMap<CurrencyId, f64> {
        self.click_profile().rates(state, true)
    }

    /// Whether to trigger `layer` now.
    fn should_prestige(&self, runtime: &Runtime, layer: &str) -> bool;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn decide_purchases(&self, runtime: &Runtime, affordable: &[ElementStatus]) -> Vec<ElementId> {
        (**self).decide_purchases(runtime, affordable)
    }

    fn click_profile(&self) -> &ClickProfile {
        (**self).click_profile()
    }

    fn clicks(&self, state: &EconomyState, duration: f64) -> BTreeMap<CurrencyId, f64> {
        (**self).clicks(state, duration)
    }

    fn click_rates_while_waiting(&self, state: &EconomyState) -> BTreeMap<CurrencyId, f64> {
        (**self).click_rates_while_waiting(state)
    }

    fn should_prestige(&self, runtime: &Runtime, layer: &str) -> bool {
        (**self).should_prestige(runtime, layer)
    }
}
