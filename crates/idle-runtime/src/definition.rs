//! Immutable game definition and its construction-time validation.

use crate::hooks::{Hook, HookContext};
use idle_core::{
    CostMap, CurrencyId, Effect, ElementId, EstimatedDuration, LayerId, MilestoneId,
    Requirement, Value, PERSISTENT_TAG,
};
use idle_econ::{validate_base_cost, CostScaling, EconError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// A tracked balance.
#[derive(Clone, Debug)]
pub struct CurrencyDef {
    pub id: CurrencyId,
    pub name: String,
    pub initial: f64,
    /// Upper bound on the balance, before cap effects.
    pub cap: Option<Value>,
    /// Survives every prestige reset.
    pub persistent: bool,
}

impl CurrencyDef {
    pub fn new(id: impl Into<CurrencyId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            initial: 0.0,
            cap: None,
            persistent: false,
        }
    }

    pub fn initial(mut self, value: f64) -> Self {
        self.initial = value;
        self
    }

    pub fn cap(mut self, cap: impl Into<Value>) -> Self {
        self.cap = Some(cap.into());
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// A purchasable unit.
#[derive(Clone)]
pub struct ElementDef {
    pub id: ElementId,
    pub name: String,
    pub base_cost: CostMap,
    pub scaling: CostScaling,
    pub max_count: Option<u64>,
    pub effects: Vec<Effect>,
    /// Visibility requirements; all must hold for the element to be offered.
    pub requirements: Vec<Requirement>,
    /// Checked only when buying.
    pub purchase_requirements: Vec<Requirement>,
    pub on_purchase: Option<Hook>,
    pub tags: BTreeSet<String>,
    pub category: String,
}

impl ElementDef {
    pub fn new(id: impl Into<ElementId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_cost: CostMap::new(),
            scaling: CostScaling::Fixed,
            max_count: None,
            effects: Vec::new(),
            requirements: Vec::new(),
            purchase_requirements: Vec::new(),
            on_purchase: None,
            tags: BTreeSet::new(),
            category: String::new(),
        }
    }

    pub fn cost(mut self, currency: impl Into<CurrencyId>, amount: f64) -> Self {
        self.base_cost.insert(currency.into(), amount);
        self
    }

    pub fn scaling(mut self, scaling: CostScaling) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn max_count(mut self, max: u64) -> Self {
        self.max_count = Some(max);
        self
    }

    pub fn effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn purchase_requires(mut self, requirement: Requirement) -> Self {
        self.purchase_requirements.push(requirement);
        self
    }

    pub fn on_purchase<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut HookContext<'_>) + Send + Sync + 'static,
    {
        self.on_purchase = Some(Arc::new(hook));
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.tags.contains(PERSISTENT_TAG)
    }
}

impl fmt::Debug for ElementDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementDef")
            .field("id", &self.id)
            .field("base_cost", &self.base_cost)
            .field("scaling", &self.scaling)
            .field("max_count", &self.max_count)
            .field("effects", &self.effects.len())
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct MilestoneDef {
    pub id: MilestoneId,
    pub name: String,
    pub trigger: Requirement,
    pub on_trigger: Option<Hook>,
}

impl MilestoneDef {
    pub fn new(id: impl Into<MilestoneId>, name: impl Into<String>, trigger: Requirement) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            trigger,
            on_trigger: None,
        }
    }

    pub fn on_trigger<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut HookContext<'_>) + Send + Sync + 'static,
    {
        self.on_trigger = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for MilestoneDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MilestoneDef")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("on_trigger", &self.on_trigger.is_some())
            .finish()
    }
}

/// Which ids a prestige layer resets. Persistent ids are exempt either way.
#[derive(Clone, Debug, PartialEq)]
pub enum ResetScope<T> {
    AllNonPersistent,
    Only(Vec<T>),
}

impl<T: PartialEq> ResetScope<T> {
    pub fn covers(&self, id: &T) -> bool {
        match self {
            ResetScope::AllNonPersistent => true,
            ResetScope::Only(ids) => ids.contains(id),
        }
    }
}

/// A reset mechanic exchanging run progress for a reward.
#[derive(Clone, Debug)]
pub struct PrestigeLayer {
    pub id: LayerId,
    pub name: String,
    /// Currency the reward is paid in.
    pub currency: CurrencyId,
    pub reward: Value,
    pub reset_currencies: ResetScope<CurrencyId>,
    pub reset_elements: ResetScope<ElementId>,
    pub requirements: Vec<Requirement>,
    pub min_reward: f64,
}

impl PrestigeLayer {
    pub fn new(
        id: impl Into<LayerId>,
        name: impl Into<String>,
        currency: impl Into<CurrencyId>,
        reward: impl Into<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            currency: currency.into(),
            reward: reward.into(),
            reset_currencies: ResetScope::AllNonPersistent,
            reset_elements: ResetScope::AllNonPersistent,
            requirements: Vec::new(),
            min_reward: 0.0,
        }
    }

    pub fn resets_currencies(mut self, scope: ResetScope<CurrencyId>) -> Self {
        self.reset_currencies = scope;
        self
    }

    pub fn resets_elements(mut self, scope: ResetScope<ElementId>) -> Self {
        self.reset_elements = scope;
        self
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn min_reward(mut self, min: f64) -> Self {
        self.min_reward = min;
        self
    }
}

/// A currency that can be earned by clicking, with its base value per click.
#[derive(Clone, Debug, PartialEq)]
pub struct ClickTarget {
    pub currency: CurrencyId,
    pub base_value: f64,
}

/// Configuration errors, collected in bulk by [`DefinitionBuilder::build`].
#[derive(Debug, Error, PartialEq)]
pub enum DefinitionError {
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },
    #[error("{context} references unknown currency '{id}'")]
    UnknownCurrency { context: String, id: String },
    #[error("{context} references unknown element '{id}'")]
    UnknownElement { context: String, id: String },
    #[error("{context} references unknown milestone '{id}'")]
    UnknownMilestone { context: String, id: String },
    #[error("element '{element}': {source}")]
    InvalidCost {
        element: String,
        #[source]
        source: EconError,
    },
    #[error("element '{element}' has a max count of zero")]
    ZeroMaxCount { element: String },
    #[error("currency '{currency}' has invalid initial value {value}")]
    InvalidInitial { currency: String, value: f64 },
    #[error("click target '{currency}' has invalid base value {value}")]
    InvalidClickValue { currency: String, value: f64 },
    #[error("prestige layer '{layer}' has invalid minimum reward {value}")]
    InvalidMinReward { layer: String, value: f64 },
}

/// Every configuration error found in a definition.
#[derive(Debug, Error, PartialEq)]
#[error("invalid definition ({} error(s)): {}", .errors.len(), join_errors(.errors))]
pub struct InvalidDefinition {
    pub errors: Vec<DefinitionError>,
}

fn join_errors(errors: &[DefinitionError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validated, immutable economy description.
#[derive(Clone, Debug)]
pub struct GameDefinition {
    pub name: String,
    pub currencies: BTreeMap<CurrencyId, CurrencyDef>,
    pub elements: BTreeMap<ElementId, ElementDef>,
    pub milestones: BTreeMap<MilestoneId, MilestoneDef>,
    pub layers: BTreeMap<LayerId, PrestigeLayer>,
    /// Base value per click, keyed by currency.
    pub click_targets: BTreeMap<CurrencyId, f64>,
    /// Anti-pattern notices raised during validation.
    pub warnings: Vec<String>,
}

impl GameDefinition {
    pub fn builder(name: impl Into<String>) -> DefinitionBuilder {
        DefinitionBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Every estimated-duration requirement, deduplicated by key.
    pub fn estimated_requirements(&self) -> Vec<EstimatedDuration> {
        let mut seen = BTreeMap::new();
        let mut visit = |r: &Requirement| {
            r.for_each_estimate(&mut |est: &EstimatedDuration| {
                seen.entry(est.key.clone()).or_insert_with(|| est.clone());
            })
        };
        for el in self.elements.values() {
            el.requirements
                .iter()
                .chain(&el.purchase_requirements)
                .for_each(&mut visit);
            el.effects
                .iter()
                .filter_map(|e| e.condition.as_ref())
                .for_each(&mut visit);
        }
        for m in self.milestones.values() {
            visit(&m.trigger);
        }
        for l in self.layers.values() {
            l.requirements.iter().for_each(&mut visit);
        }
        seen.into_values().collect()
    }
}

/// Collects definition parts; [`build`](Self::build) validates them.
#[derive(Default)]
pub struct DefinitionBuilder {
    name: String,
    currencies: Vec<CurrencyDef>,
    elements: Vec<ElementDef>,
    milestones: Vec<MilestoneDef>,
    layers: Vec<PrestigeLayer>,
    click_targets: Vec<ClickTarget>,
}

impl DefinitionBuilder {
    pub fn currency(mut self, def: CurrencyDef) -> Self {
        self.currencies.push(def);
        self
    }

    pub fn element(mut self, def: ElementDef) -> Self {
        self.elements.push(def);
        self
    }

    pub fn milestone(mut self, def: MilestoneDef) -> Self {
        self.milestones.push(def);
        self
    }

    pub fn prestige(mut self, layer: PrestigeLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn click_target(mut self, currency: impl Into<CurrencyId>, base_value: f64) -> Self {
        self.click_targets.push(ClickTarget {
            currency: currency.into(),
            base_value,
        });
        self
    }

    /// Validate and freeze. All errors are reported together; warnings are
    /// logged and kept on the definition.
    pub fn build(self) -> Result<GameDefinition, InvalidDefinition> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let currencies = index("currency", self.currencies, |c| &c.id, &mut errors);
        let elements = index("element", self.elements, |e| &e.id, &mut errors);
        let milestones = index("milestone", self.milestones, |m| &m.id, &mut errors);
        let layers = index("prestige layer", self.layers, |l| &l.id, &mut errors);

        let refs = Refs {
            currencies: &currencies,
            elements: &elements,
            milestones: &milestones,
        };

        for c in currencies.values() {
            if !(c.initial.is_finite() && c.initial >= 0.0) {
                errors.push(DefinitionError::InvalidInitial {
                    currency: c.id.to_string(),
                    value: c.initial,
                });
            }
        }

        for el in elements.values() {
            let ctx = format!("element '{}'", el.id);
            for currency in el.base_cost.keys() {
                refs.currency(&ctx, currency.as_str(), &mut errors);
            }
            let cost_errors = el
                .scaling
                .validate()
                .err()
                .into_iter()
                .chain(validate_base_cost(&el.base_cost).err());
            for source in cost_errors {
                errors.push(DefinitionError::InvalidCost {
                    element: el.id.to_string(),
                    source,
                });
            }
            if el.max_count == Some(0) {
                errors.push(DefinitionError::ZeroMaxCount {
                    element: el.id.to_string(),
                });
            }
            for r in el.requirements.iter().chain(&el.purchase_requirements) {
                refs.requirement(&ctx, r, &mut errors);
            }
            for effect in &el.effects {
                if effect.kind.targets_currency() {
                    refs.currency(&ctx, &effect.target, &mut errors);
                } else if effect.kind.targets_element() {
                    refs.element(&ctx, &effect.target, &mut errors);
                }
                if let Some(cond) = &effect.condition {
                    refs.requirement(&ctx, cond, &mut errors);
                }
                if effect.phase.is_multiplicative() && effect.shape.is_linear_per_count() {
                    warnings.push(format!(
                        "element '{}': per-count value on {:?} effect targeting '{}' compounds per unit; use per_count_exponential if intended",
                        el.id, effect.kind, effect.target
                    ));
                }
            }
        }

        for m in milestones.values() {
            refs.requirement(&format!("milestone '{}'", m.id), &m.trigger, &mut errors);
        }

        for l in layers.values() {
            let ctx = format!("prestige layer '{}'", l.id);
            refs.currency(&ctx, l.currency.as_str(), &mut errors);
            if let ResetScope::Only(ids) = &l.reset_currencies {
                for id in ids {
                    refs.currency(&ctx, id.as_str(), &mut errors);
                }
            }
            if let ResetScope::Only(ids) = &l.reset_elements {
                for id in ids {
                    refs.element(&ctx, id.as_str(), &mut errors);
                }
            }
            for r in &l.requirements {
                refs.requirement(&ctx, r, &mut errors);
            }
            if !(l.min_reward.is_finite() && l.min_reward >= 0.0) {
                errors.push(DefinitionError::InvalidMinReward {
                    layer: l.id.to_string(),
                    value: l.min_reward,
                });
            }
        }

        let mut click_targets = BTreeMap::new();
        for t in self.click_targets {
            refs.currency("click target", t.currency.as_str(), &mut errors);
            if !(t.base_value.is_finite() && t.base_value >= 0.0) {
                errors.push(DefinitionError::InvalidClickValue {
                    currency: t.currency.to_string(),
                    value: t.base_value,
                });
            }
            if click_targets.insert(t.currency.clone(), t.base_value).is_some() {
                errors.push(DefinitionError::DuplicateId {
                    kind: "click target",
                    id: t.currency.to_string(),
                });
            }
        }

        if !errors.is_empty() {
            return Err(InvalidDefinition { errors });
        }
        for w in &warnings {
            warn!(definition = %self.name, "{w}");
        }
        Ok(GameDefinition {
            name: self.name,
            currencies,
            elements,
            milestones,
            layers,
            click_targets,
            warnings,
        })
    }
}

fn index<K, T>(
    kind: &'static str,
    items: Vec<T>,
    key: impl Fn(&T) -> &K,
    errors: &mut Vec<DefinitionError>,
) -> BTreeMap<K, T>
where
    K: Ord + Clone + fmt::Display,
{
    let mut out = BTreeMap::new();
    for item in items {
        let id = key(&item).clone();
        if out.contains_key(&id) {
            errors.push(DefinitionError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        } else {
            out.insert(id, item);
        }
    }
    out
}

struct Refs<'a> {
    currencies: &'a BTreeMap<CurrencyId, CurrencyDef>,
    elements: &'a BTreeMap<ElementId, ElementDef>,
    milestones: &'a BTreeMap<MilestoneId, MilestoneDef>,
}

impl Refs<'_> {
    fn currency(&self, ctx: &str, id: &str, errors: &mut Vec<DefinitionError>) {
        if !self.currencies.contains_key(id) {
            errors.push(DefinitionError::UnknownCurrency {
                context: ctx.to_string(),
                id: id.to_string(),
            });
        }
    }

    fn element(&self, ctx: &str, id: &str, errors: &mut Vec<DefinitionError>) {
        if !self.elements.contains_key(id) {
            errors.push(DefinitionError::UnknownElement {
                context: ctx.to_string(),
                id: id.to_string(),
            });
        }
    }

    fn requirement(&self, ctx: &str, r: &Requirement, errors: &mut Vec<DefinitionError>) {
        for c in r.referenced_currencies() {
            self.currency(ctx, c.as_str(), errors);
        }
        for e in r.referenced_elements() {
            self.element(ctx, e.as_str(), errors);
        }
        for m in r.referenced_milestones() {
            if !self.milestones.contains_key(m.as_str()) {
                errors.push(DefinitionError::UnknownMilestone {
                    context: ctx.to_string(),
                    id: m.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idle_core::{CompareOp, EffectKind};

    fn base() -> DefinitionBuilder {
        GameDefinition::builder("test")
            .currency(CurrencyDef::new("gold", "Gold"))
            .element(
                ElementDef::new("miner", "Miner")
                    .cost("gold", 10.0)
                    .scaling(CostScaling::exponential(1.15))
                    .effect(Effect::per_count(
                        "miner",
                        EffectKind::ProductionFlat,
                        "gold",
                        2.0,
                    )),
            )
    }

    #[test]
    fn valid_definition_builds() {
        let def = base().click_target("gold", 1.0).build().unwrap();
        assert_eq!(def.currencies.len(), 1);
        assert_eq!(def.click_targets["gold"], 1.0);
        assert!(def.warnings.is_empty());
    }

    #[test]
    fn errors_are_collected_in_bulk() {
        let err = base()
            .currency(CurrencyDef::new("gold", "Again"))
            .element(
                ElementDef::new("farm", "Farm")
                    .cost("wood", 5.0)
                    .scaling(CostScaling::exponential(0.5))
                    .max_count(0)
                    .requires(Requirement::owns("castle")),
            )
            .milestone(MilestoneDef::new(
                "first",
                "First",
                Requirement::milestone("nope"),
            ))
            .click_target("silver", 1.0)
            .build()
            .unwrap_err();
        let kinds: Vec<String> = err.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(err.errors.len(), 7, "{kinds:?}");
        assert!(err
            .errors
            .contains(&DefinitionError::DuplicateId {
                kind: "currency",
                id: "gold".into()
            }));
        assert!(err.errors.contains(&DefinitionError::ZeroMaxCount {
            element: "farm".into()
        }));
        assert!(err.to_string().contains("unknown element 'castle'"));
    }

    #[test]
    fn effect_targets_are_checked_by_kind() {
        let err = base()
            .element(
                ElementDef::new("cheap", "Cheap")
                    .effect(Effect::fixed(EffectKind::CostMult, "missing", 0.5))
                    .effect(Effect::fixed(EffectKind::ClickFlat, "mana", 1.0))
                    .effect(Effect::fixed(EffectKind::GlobalMult, "", 2.0)),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err.errors,
            vec![
                DefinitionError::UnknownElement {
                    context: "element 'cheap'".into(),
                    id: "missing".into()
                },
                DefinitionError::UnknownCurrency {
                    context: "element 'cheap'".into(),
                    id: "mana".into()
                },
            ]
        );
    }

    #[test]
    fn per_count_on_multiplicative_phase_warns() {
        let def = base()
            .element(ElementDef::new("boost", "Boost").effect(Effect::per_count(
                "miner",
                EffectKind::ProductionMult,
                "gold",
                1.1,
            )))
            .build()
            .unwrap();
        assert_eq!(def.warnings.len(), 1);
        assert!(def.warnings[0].contains("per_count_exponential"));
    }

    #[test]
    fn estimated_requirements_are_deduplicated() {
        let est = Requirement::estimated("research", 60.0, 5.0);
        let def = base()
            .element(ElementDef::new("lab", "Lab").requires(est.clone()))
            .milestone(MilestoneDef::new(
                "done",
                "Done",
                est & Requirement::resource("gold", CompareOp::Ge, 1.0),
            ))
            .build()
            .unwrap();
        let found = def.estimated_requirements();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "research");
    }

    #[test]
    fn reset_scope_coverage() {
        let only = ResetScope::Only(vec![CurrencyId::from("gold")]);
        assert!(only.covers(&CurrencyId::from("gold")));
        assert!(!only.covers(&CurrencyId::from("gems")));
        assert!(ResetScope::<CurrencyId>::AllNonPersistent.covers(&CurrencyId::from("gems")));
    }
}
