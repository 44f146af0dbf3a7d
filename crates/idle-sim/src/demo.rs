//! A small cookie-style economy used by the CLI and the benchmarks.

use idle_ai::{ClickProfile, PrestigePolicy, Strategy, StrategyKind};
use idle_core::{CompareOp, Effect, EffectKind, Requirement, Value, PERSISTENT_TAG};
use idle_econ::CostScaling;
use idle_runtime::{
    CurrencyDef, ElementDef, GameDefinition, InvalidDefinition, MilestoneDef, PrestigeLayer,
};

/// `(id, name, base cost, cookies per second per unit)`, in unlock order.
const PRODUCERS: [(&str, &str, f64, f64); 5] = [
    ("cursor", "Cursor", 15.0, 0.1),
    ("grandma", "Grandma", 100.0, 1.0),
    ("farm", "Farm", 1_100.0, 8.0),
    ("mine", "Mine", 12_000.0, 47.0),
    ("factory", "Factory", 130_000.0, 260.0),
];

const PRODUCER_GROWTH: f64 = 1.15;

pub fn cookie_definition() -> Result<GameDefinition, InvalidDefinition> {
    let mut b = GameDefinition::builder("cookies")
        .currency(CurrencyDef::new("cookies", "Cookies"))
        .currency(CurrencyDef::new("heavenly_chips", "Heavenly chips").persistent())
        .click_target("cookies", 1.0);

    let mut previous: Option<&str> = None;
    for (id, name, cost, per_unit) in PRODUCERS {
        let mut el = ElementDef::new(id, name)
            .cost("cookies", cost)
            .scaling(CostScaling::exponential(PRODUCER_GROWTH))
            .category("producer")
            .effect(Effect::per_count(id, EffectKind::ProductionFlat, "cookies", per_unit));
        if let Some(prev) = previous {
            el = el.requires(Requirement::owns(prev));
        }
        b = b.element(el);
        previous = Some(id);
    }

    b.element(
        upgrade("reinforced_index_finger", "Reinforced index finger", 100.0)
            .requires(Requirement::owns("cursor"))
            .effect(Effect::fixed(EffectKind::ClickMult, "cookies", 2.0)),
    )
    .element(
        upgrade("auto_clicker", "Auto clicker", 500.0)
            .requires(Requirement::count("cursor", CompareOp::Ge, 5))
            .effect(Effect::fixed(EffectKind::AutoClick, "cookies", 2.0)),
    )
    .element(
        upgrade("forwards_from_grandma", "Forwards from grandma", 1_000.0)
            .requires(Requirement::owns("grandma"))
            .effect(Effect::fixed(EffectKind::ProductionAddPct, "cookies", 0.1)),
    )
    .element(
        upgrade("grandma_synergy", "Grandma synergy", 5_000.0)
            .requires(Requirement::count("grandma", CompareOp::Ge, 5))
            .effect(Effect::synergy("grandma", EffectKind::ProductionAddPct, "cookies", 0.01)),
    )
    .element(
        upgrade("lucky_day", "Lucky day", 20_000.0)
            .requires(Requirement::owns("farm"))
            .effect(Effect::fixed(EffectKind::GlobalMult, "", 1.5)),
    )
    .element(
        upgrade("time_machine", "Time machine", 50_000.0)
            .requires(
                Requirement::owns("mine")
                    & Requirement::estimated("research", 600.0, 120.0)
                        .described("research temporal baking"),
            )
            .effect(Effect::fixed(EffectKind::ProductionMult, "cookies", 2.0)),
    )
    .element(
        ElementDef::new("heavenly_oven", "Heavenly oven")
            .cost("heavenly_chips", 1.0)
            .max_count(1)
            .tag(PERSISTENT_TAG)
            .category("heavenly")
            .effect(Effect::computed(EffectKind::GlobalMult, "", |s| {
                1.0 + 0.02 * s.currency_value("heavenly_chips")
            })),
    )
    .milestone(MilestoneDef::new(
        "first_hundred",
        "A hundred cookies",
        Requirement::total_earned("cookies", CompareOp::Ge, 100.0),
    ))
    .milestone(MilestoneDef::new(
        "first_thousand",
        "A thousand cookies",
        Requirement::total_earned("cookies", CompareOp::Ge, 1_000.0),
    ))
    .milestone(MilestoneDef::new(
        "million",
        "A million cookies",
        Requirement::total_earned("cookies", CompareOp::Ge, 1e6),
    ))
    .milestone(MilestoneDef::new(
        "first_factory",
        "Industrial revolution",
        Requirement::owns("factory"),
    ))
    .prestige(
        PrestigeLayer::new(
            "ascend",
            "Ascend",
            "heavenly_chips",
            Value::computed(|s| (s.total_earned("cookies") / 1e6).cbrt().floor()),
        )
        .requires(Requirement::total_earned("cookies", CompareOp::Ge, 1e6))
        .min_reward(1.0),
    )
    .build()
}

fn upgrade(id: &str, name: &str, cost: f64) -> ElementDef {
    ElementDef::new(id, name)
        .cost("cookies", cost)
        .max_count(1)
        .category("upgrade")
}

/// Built-in strategy clicking 5/s until the first factory.
pub fn demo_strategy(kind: StrategyKind, prestige: PrestigePolicy) -> Box<dyn Strategy> {
    let clicks = ClickProfile::new("cookies", 5.0).until(Requirement::owns("factory"));
    kind.build(clicks, prestige)
}
