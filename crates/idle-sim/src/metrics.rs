//! Event log recorded while a simulation runs.

use idle_core::{CostMap, CurrencyId, EconomyState, ElementId, LayerId, MilestoneId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimEvent {
    Purchase {
        time: f64,
        element: ElementId,
        /// Owned count after the purchase.
        count: u64,
        cost: CostMap,
        /// Balances right after paying.
        balances: BTreeMap<CurrencyId, f64>,
    },
    Milestone {
        time: f64,
        milestone: MilestoneId,
    },
    Prestige {
        time: f64,
        layer: LayerId,
        reward: f64,
        run_duration: f64,
    },
    Stall {
        time: f64,
        reason: String,
    },
    /// Time spent without buying anything.
    Wait {
        time: f64,
        duration: f64,
        /// Element the wait was computed for, in event-jump mode.
        target: Option<ElementId>,
    },
    Snapshot {
        time: f64,
        currencies: BTreeMap<CurrencyId, f64>,
        rates: BTreeMap<CurrencyId, f64>,
        elements: BTreeMap<ElementId, u64>,
    },
}

impl SimEvent {
    pub fn time(&self) -> f64 {
        match self {
            SimEvent::Purchase { time, .. }
            | SimEvent::Milestone { time, .. }
            | SimEvent::Prestige { time, .. }
            | SimEvent::Stall { time, .. }
            | SimEvent::Wait { time, .. }
            | SimEvent::Snapshot { time, .. } => *time,
        }
    }
}

/// Append-only recorder. Consecutive waits toward the same target are
/// merged so fixed-mode runs do not log one wait per tick.
#[derive(Clone, Debug)]
pub struct MetricsCollector {
    events: Vec<SimEvent>,
    last_purchase: f64,
    snapshot_every: f64,
    next_snapshot: f64,
}

impl MetricsCollector {
    pub fn new(snapshot_every: f64) -> Self {
        Self {
            events: Vec::new(),
            last_purchase: 0.0,
            snapshot_every,
            next_snapshot: 0.0,
        }
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<SimEvent> {
        self.events
    }

    /// Time of the latest purchase, or 0 before the first one.
    pub fn last_purchase(&self) -> f64 {
        self.last_purchase
    }

    pub fn record_purchase(
        &mut self,
        state: &EconomyState,
        element: ElementId,
        count: u64,
        cost: CostMap,
    ) {
        self.last_purchase = state.time_elapsed;
        self.events.push(SimEvent::Purchase {
            time: state.time_elapsed,
            element,
            count,
            cost,
            balances: state.balances(),
        });
    }

    pub fn record_milestones(&mut self, state: &EconomyState, fired: Vec<MilestoneId>) {
        for milestone in fired {
            let time = state.milestone_time(milestone.as_str()).unwrap_or(state.time_elapsed);
            self.events.push(SimEvent::Milestone { time, milestone });
        }
    }

    pub fn record_prestige(&mut self, time: f64, layer: LayerId, reward: f64, run_duration: f64) {
        // A new run starts the purchase gap clock again.
        self.last_purchase = time;
        self.events.push(SimEvent::Prestige {
            time,
            layer,
            reward,
            run_duration,
        });
    }

    pub fn record_stall(&mut self, time: f64, reason: impl Into<String>) {
        self.events.push(SimEvent::Stall {
            time,
            reason: reason.into(),
        });
    }

    /// Wait of `duration` seconds starting at `start`.
    pub fn record_wait(&mut self, start: f64, duration: f64, target: Option<ElementId>) {
        if !(duration > 0.0) {
            return;
        }
        if let Some(SimEvent::Wait {
            time,
            duration: d,
            target: t,
        }) = self.events.last_mut()
        {
            if *t == target && ((*time + *d) - start).abs() <= 1e-9 * start.abs().max(1.0) {
                *d += duration;
                return;
            }
        }
        self.events.push(SimEvent::Wait {
            time: start,
            duration,
            target,
        });
    }

    /// Snapshot if the interval has elapsed since the previous one.
    pub fn maybe_snapshot(&mut self, state: &EconomyState) {
        if state.time_elapsed + 1e-9 >= self.next_snapshot {
            self.snapshot(state);
        }
    }

    pub fn snapshot(&mut self, state: &EconomyState) {
        let t = state.time_elapsed;
        if matches!(self.events.last(), Some(SimEvent::Snapshot { time, .. }) if *time == t) {
            return;
        }
        self.events.push(SimEvent::Snapshot {
            time: t,
            currencies: state.balances(),
            rates: state
                .currencies
                .iter()
                .map(|(id, c)| (id.clone(), c.rate))
                .collect(),
            elements: state
                .elements
                .iter()
                .map(|(id, e)| (id.clone(), e.count))
                .collect(),
        });
        // Skip whole intervals jumped over in one step.
        while self.next_snapshot <= t + 1e-9 {
            self.next_snapshot += self.snapshot_every;
        }
    }
}
