//! The simulation loop.
//!
//! Fixed mode repeats `tick(Δ)`, clicks, purchases and prestige checks at a
//! constant resolution. Event-jump mode buys whatever the strategy picks
//! without advancing time, then jumps the clock straight to the earliest
//! moment something new becomes affordable. When no such moment exists the
//! run has stalled.
//!
//! Event-jump holds rates constant over each jump, so availability changes
//! caused mid-jump (a milestone firing before the target becomes affordable,
//! an element gated on a balance) are only seen at the end of the jump.

use crate::config::{ConfigError, SimConfig, SimMode};
use crate::metrics::MetricsCollector;
use crate::report::{SimOutcome, SimReport};
use crate::terminal::Terminal;
use idle_ai::Strategy;
use idle_core::{CurrencyId, ElementId, LayerId};
use idle_runtime::{GameDefinition, PrestigeOutcome, PurchaseOutcome, Runtime, RuntimeError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Smallest event-jump advance, so float shortfalls cannot pin the clock.
const MIN_JUMP: f64 = 1e-9;
/// Guards against strategies that keep buying zero-cost elements.
const MAX_PURCHASES_PER_STEP: usize = 10_000;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

enum Step {
    Advanced,
    Stalled,
}

pub struct Simulator<S: Strategy> {
    runtime: Runtime,
    strategy: S,
    terminal: Terminal,
    config: SimConfig,
    rng: ChaCha8Rng,
    metrics: MetricsCollector,
    iterations: u64,
}

impl<S: Strategy> Simulator<S> {
    pub fn new(
        def: Arc<GameDefinition>,
        strategy: S,
        terminal: Terminal,
        config: SimConfig,
    ) -> Result<Self, SimError> {
        Self::with_runtime(Runtime::new(def), strategy, terminal, config)
    }

    /// Drive an existing runtime, e.g. one with custom effect handlers
    /// or production overrides registered.
    pub fn with_runtime(
        runtime: Runtime,
        strategy: S,
        terminal: Terminal,
        config: SimConfig,
    ) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            runtime,
            strategy,
            terminal,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            metrics: MetricsCollector::new(config.snapshot_every()),
            config,
            iterations: 0,
        })
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn run(mut self) -> Result<SimReport, SimError> {
        self.schedule_estimates();
        let fired = self.runtime.tick(0.0);
        self.metrics.record_milestones(self.runtime.state(), fired);
        self.metrics.snapshot(self.runtime.state());
        self.buy_phase()?;
        self.prestige_phase()?;

        let outcome = loop {
            let state = self.runtime.state();
            if !state.is_finite() {
                warn!(t = state.time_elapsed, "non-finite balance or rate, aborting run");
                break SimOutcome::NonFinite;
            }
            if self.terminal.is_met(state, self.metrics.last_purchase()) {
                break SimOutcome::TerminalMet;
            }
            if self.iterations >= self.config.max_iterations {
                warn!(
                    iterations = self.iterations,
                    t = state.time_elapsed,
                    "iteration limit reached"
                );
                break SimOutcome::IterationLimit;
            }
            self.iterations += 1;
            let step = match self.config.mode {
                SimMode::Fixed => self.step_fixed()?,
                SimMode::EventJump => self.step_event_jump()?,
            };
            if let Step::Stalled = step {
                break SimOutcome::Stalled;
            }
        };

        self.metrics.snapshot(self.runtime.state());
        let state = self.runtime.state().clone();
        let report = SimReport {
            strategy: self.strategy.describe(),
            terminal: self.terminal.to_string(),
            mode: self.config.mode,
            seed: self.config.seed,
            outcome,
            total_time: state.time_elapsed,
            iterations: self.iterations,
            events: self.metrics.into_events(),
            final_state: state,
        };
        info!(
            outcome = ?report.outcome,
            t = report.total_time,
            purchases = report.purchase_count(),
            iterations = report.iterations,
            "simulation finished"
        );
        Ok(report)
    }

    /// Draw a deadline for every estimated-duration requirement not already
    /// satisfied or scheduled.
    fn schedule_estimates(&mut self) {
        let now = self.runtime.state().time_elapsed;
        for est in self.runtime.definition().estimated_requirements() {
            if self.runtime.state().estimates.contains_key(est.key.as_str()) {
                continue;
            }
            let at = now + est.sample(&mut self.rng);
            debug!(key = %est.key, at, description = %est.description, "scheduled estimate");
            self.runtime.schedule_estimate(est.key, at);
        }
    }

    fn step_fixed(&mut self) -> Result<Step, SimError> {
        let dt = self.config.tick_resolution;
        let start = self.runtime.state().time_elapsed;
        let fired = self.runtime.tick(dt);
        self.metrics.record_milestones(self.runtime.state(), fired);

        let clicks = self.strategy.clicks(self.runtime.state(), dt);
        for (currency, n) in &clicks {
            self.runtime.process_clicks(currency.as_str(), *n)?;
        }
        if !clicks.is_empty() {
            let fired = self.runtime.check_milestones();
            self.metrics.record_milestones(self.runtime.state(), fired);
        }

        let bought = self.buy_phase()?;
        let prestiged = self.prestige_phase()?;
        if bought == 0 && !prestiged {
            self.metrics.record_wait(start, dt, None);
            if self.runtime.affordable_elements().is_empty()
                && !self.has_income()
                && self.next_event()?.is_none()
            {
                self.stall("no income and nothing affordable");
                return Ok(Step::Stalled);
            }
        }
        self.metrics.maybe_snapshot(self.runtime.state());
        Ok(Step::Advanced)
    }

    fn step_event_jump(&mut self) -> Result<Step, SimError> {
        let bought = self.buy_phase()?;
        let prestiged = self.prestige_phase()?;
        if bought > 0 || prestiged {
            self.metrics.maybe_snapshot(self.runtime.state());
            return Ok(Step::Advanced);
        }

        let Some((wait, target)) = self.next_event()? else {
            self.stall("no available element is reachable at current income");
            return Ok(Step::Stalled);
        };
        let now = self.runtime.state().time_elapsed;
        let mut jump = wait.max(MIN_JUMP);
        if let Some(deadline) = self.terminal.deadline(self.metrics.last_purchase()) {
            if deadline > now {
                jump = jump.min(deadline - now);
            }
        }

        let rates = self.strategy.click_rates_while_waiting(self.runtime.state());
        for (currency, cps) in &rates {
            self.runtime.process_clicks(currency.as_str(), cps * jump)?;
        }
        let fired = self.runtime.tick(jump);
        self.metrics.record_milestones(self.runtime.state(), fired);
        debug!(from = now, jump, target = ?target, "event jump");
        self.metrics.record_wait(now, jump, target);
        self.metrics.maybe_snapshot(self.runtime.state());
        Ok(Step::Advanced)
    }

    /// Let the strategy buy until it picks nothing purchasable. Returns the
    /// number of units bought.
    fn buy_phase(&mut self) -> Result<usize, SimError> {
        let mut bought = 0;
        loop {
            let affordable = self.runtime.affordable_elements();
            if affordable.is_empty() {
                break;
            }
            let picks = self.strategy.decide_purchases(&self.runtime, &affordable);
            let mut progressed = false;
            for id in picks {
                let PurchaseOutcome::Purchased { cost, count } =
                    self.runtime.try_purchase(id.as_str())?
                else {
                    continue;
                };
                self.metrics
                    .record_purchase(self.runtime.state(), id, count, cost);
                let fired = self.runtime.check_milestones();
                self.metrics.record_milestones(self.runtime.state(), fired);
                bought += 1;
                progressed = true;
                if bought >= MAX_PURCHASES_PER_STEP {
                    warn!(
                        t = self.runtime.state().time_elapsed,
                        "purchase limit per step reached"
                    );
                    return Ok(bought);
                }
            }
            if !progressed {
                break;
            }
        }
        Ok(bought)
    }

    fn prestige_phase(&mut self) -> Result<bool, SimError> {
        let layers: Vec<LayerId> = self.runtime.definition().layers.keys().cloned().collect();
        let mut any = false;
        for layer in layers {
            if !self.strategy.should_prestige(&self.runtime, layer.as_str()) {
                continue;
            }
            if let PrestigeOutcome::Completed(summary) =
                self.runtime.trigger_prestige(layer.as_str())?
            {
                let t = self.runtime.state().time_elapsed;
                self.metrics
                    .record_prestige(t, summary.layer, summary.reward, summary.run_duration);
                let fired = self.runtime.check_milestones();
                self.metrics.record_milestones(self.runtime.state(), fired);
                any = true;
            }
        }
        Ok(any)
    }

    /// Income per currency from clicking while waiting.
    fn click_income(&self) -> BTreeMap<CurrencyId, f64> {
        self.strategy
            .click_rates_while_waiting(self.runtime.state())
            .into_iter()
            .map(|(c, cps)| {
                let value = self.runtime.click_value(c.as_str());
                (c, cps * value)
            })
            .collect()
    }

    fn has_income(&self) -> bool {
        let clicks = self.click_income();
        self.runtime.state().currencies.keys().any(|c| {
            self.runtime.income_rate(c.as_str()) > 0.0
                || clicks.get(c).is_some_and(|v| *v > 0.0)
        })
    }

    /// Seconds until the earliest event that could change what the strategy
    /// can do: an available element becoming affordable, a scheduled estimate
    /// coming due, or a currency terminal threshold being reached.
    fn next_event(&self) -> Result<Option<(f64, Option<ElementId>)>, SimError> {
        let income = self.click_income();
        let state = self.runtime.state();
        let now = state.time_elapsed;
        let mut best: Option<(f64, Option<ElementId>)> = None;

        for status in self.runtime.available_elements() {
            if status.maxed || status.purchasable {
                continue;
            }
            if let Some(t) = self.runtime.time_to_afford_with(status.id.as_str(), &income)? {
                if t > 0.0 {
                    earliest(&mut best, t, Some(status.id));
                }
            }
        }
        if let Some(at) = state.next_estimate_deadline() {
            earliest(&mut best, at - now, None);
        }
        if let Some(t) = self
            .terminal
            .eta(&self.runtime, self.metrics.last_purchase(), &income)
        {
            if t > 0.0 {
                earliest(&mut best, t, None);
            }
        }
        Ok(best)
    }

    fn stall(&mut self, reason: &str) {
        let t = self.runtime.state().time_elapsed;
        info!(t, reason, "simulation stalled");
        self.metrics.record_stall(t, reason);
    }
}

fn earliest(best: &mut Option<(f64, Option<ElementId>)>, t: f64, target: Option<ElementId>) {
    if !t.is_finite() {
        return;
    }
    if best.as_ref().map_or(true, |(b, _)| t < *b) {
        *best = Some((t, target));
    }
}
