//! Typed, phased modifiers attached to elements.
//!
//! Effects are definition data. The runtime reads them during evaluation and
//! never mutates them. An effect is active only while its owning element has
//! a non-zero count and its optional condition holds.

use crate::ids::ElementId;
use crate::requirement::Requirement;
use crate::state::EconomyState;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Closed set of effect kinds plus an open `Custom` tag for registered handlers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    ProductionFlat,
    ProductionAddPct,
    ProductionMult,
    GlobalMult,
    ClickFlat,
    ClickMult,
    /// Multiplies the cost of the target element.
    CostMult,
    CapFlat,
    CapMult,
    /// Generates `value` clicks per second on the target currency.
    AutoClick,
    /// One-time grant of `value` to the target currency on purchase.
    Grant,
    /// One-time unlock of the target element on purchase.
    Unlock,
    Custom(String),
}

/// Evaluation phase. Production phases reduce in the fixed order
/// base, bonus-add, bonus-mult, global.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EffectPhase {
    Base,
    BonusAdd,
    BonusMult,
    Global,
    Click,
    Cost,
    Cap,
    Auto,
    Immediate,
    Custom,
}

impl EffectPhase {
    pub fn is_production(self) -> bool {
        matches!(
            self,
            EffectPhase::Base | EffectPhase::BonusAdd | EffectPhase::BonusMult | EffectPhase::Global
        )
    }

    pub fn is_multiplicative(self) -> bool {
        matches!(self, EffectPhase::BonusMult | EffectPhase::Global)
    }
}

impl EffectKind {
    pub fn default_phase(&self) -> EffectPhase {
        match self {
            EffectKind::ProductionFlat => EffectPhase::Base,
            EffectKind::ProductionAddPct => EffectPhase::BonusAdd,
            EffectKind::ProductionMult => EffectPhase::BonusMult,
            EffectKind::GlobalMult => EffectPhase::Global,
            EffectKind::ClickFlat | EffectKind::ClickMult => EffectPhase::Click,
            EffectKind::CostMult => EffectPhase::Cost,
            EffectKind::CapFlat | EffectKind::CapMult => EffectPhase::Cap,
            EffectKind::AutoClick => EffectPhase::Auto,
            EffectKind::Grant | EffectKind::Unlock => EffectPhase::Immediate,
            EffectKind::Custom(_) => EffectPhase::Custom,
        }
    }

    /// Kinds whose target names an element rather than a currency.
    pub fn targets_element(&self) -> bool {
        matches!(self, EffectKind::CostMult | EffectKind::Unlock)
    }

    /// Kinds whose target must name a declared currency.
    pub fn targets_currency(&self) -> bool {
        !matches!(
            self,
            EffectKind::CostMult | EffectKind::Unlock | EffectKind::GlobalMult | EffectKind::Custom(_)
        )
    }
}

/// How an effect's value was built; used to flag per-unit values attached
/// to multiplicative phases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ValueShape {
    Constant,
    PerCount { element: ElementId, per_unit: f64 },
    PerCountExponential { element: ElementId, base: f64 },
    Synergy { source: ElementId, per_unit: f64 },
    Computed,
}

impl ValueShape {
    /// Linear in some element's owned count.
    pub fn is_linear_per_count(&self) -> bool {
        matches!(self, ValueShape::PerCount { .. } | ValueShape::Synergy { .. })
    }
}

#[derive(Clone, Debug)]
pub struct Effect {
    pub kind: EffectKind,
    /// Currency or element id depending on `kind`; ignored for global multipliers.
    pub target: String,
    pub value: Value,
    pub condition: Option<Requirement>,
    pub phase: EffectPhase,
    pub shape: ValueShape,
}

impl Effect {
    pub fn new(kind: EffectKind, target: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let shape = match value {
            Value::Literal(_) => ValueShape::Constant,
            Value::Computed(_) => ValueShape::Computed,
        };
        Self {
            phase: kind.default_phase(),
            kind,
            target: target.into(),
            value,
            condition: None,
            shape,
        }
    }

    /// Constant value.
    pub fn fixed(kind: EffectKind, target: impl Into<String>, value: f64) -> Self {
        Self::new(kind, target, value)
    }

    /// `count(element) * per_unit`. Meant for flat and additive-percent
    /// kinds; on multiplicative phases it multiplies per unit owned.
    pub fn per_count(
        element: impl Into<ElementId>,
        kind: EffectKind,
        target: impl Into<String>,
        per_unit: f64,
    ) -> Self {
        let element = element.into();
        let counted = element.clone();
        let mut effect = Self::new(
            kind,
            target,
            Value::computed(move |s| s.element_count(counted.as_str()) as f64 * per_unit),
        );
        effect.shape = ValueShape::PerCount { element, per_unit };
        effect
    }

    /// `base ^ count(element)`: compounding multiplier per unit owned.
    pub fn per_count_exponential(
        element: impl Into<ElementId>,
        kind: EffectKind,
        target: impl Into<String>,
        base: f64,
    ) -> Self {
        let element = element.into();
        let counted = element.clone();
        let mut effect = Self::new(
            kind,
            target,
            Value::computed(move |s| {
                let n = s.element_count(counted.as_str()).min(i32::MAX as u64) as i32;
                base.powi(n)
            }),
        );
        effect.shape = ValueShape::PerCountExponential { element, base };
        effect
    }

    /// `count(source) * per_unit` where `source` is another element.
    pub fn synergy(
        source: impl Into<ElementId>,
        kind: EffectKind,
        target: impl Into<String>,
        per_unit: f64,
    ) -> Self {
        let source = source.into();
        let counted = source.clone();
        let mut effect = Self::new(
            kind,
            target,
            Value::computed(move |s| s.element_count(counted.as_str()) as f64 * per_unit),
        );
        effect.shape = ValueShape::Synergy { source, per_unit };
        effect
    }

    pub fn computed<F>(kind: EffectKind, target: impl Into<String>, f: F) -> Self
    where
        F: Fn(&EconomyState) -> f64 + Send + Sync + 'static,
    {
        Self::new(kind, target, Value::computed(f))
    }

    /// Only active while `condition` holds.
    pub fn when(mut self, condition: Requirement) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Override the phase derived from the kind.
    pub fn in_phase(mut self, phase: EffectPhase) -> Self {
        self.phase = phase;
        self
    }

    /// True when this effect is a `kind` effect still in that kind's phase.
    /// An effect moved with [`in_phase`](Self::in_phase) is only consumed by
    /// the phase it was moved to.
    pub fn applies_as(&self, kind: &EffectKind) -> bool {
        &self.kind == kind && self.phase == kind.default_phase()
    }

    pub fn is_active(&self, state: &EconomyState) -> bool {
        self.condition.as_ref().map_or(true, |c| c.evaluate(state))
    }

    pub fn resolve(&self, state: &EconomyState) -> f64 {
        self.value.resolve(state)
    }
}
