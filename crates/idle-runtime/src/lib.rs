#![deny(warnings)]

//! Authoritative transition engine for idlekit economies.
//!
//! A [`GameDefinition`] is assembled and validated once through
//! [`DefinitionBuilder`]; a [`Runtime`] then owns the only mutable
//! [`idle_core::EconomyState`] and exposes tick, purchase, click and
//! prestige operations plus read-only queries. Mechanics beyond currencies
//! and elements plug in as [`Subsystem`]s.

pub mod definition;
pub mod hooks;
pub mod runtime;

pub use definition::{
    ClickTarget, CurrencyDef, DefinitionBuilder, DefinitionError, ElementDef, GameDefinition,
    InvalidDefinition, MilestoneDef, PrestigeLayer, ResetScope,
};
pub use hooks::{EffectHandler, Hook, HookAction, HookContext, SimulationProxy, Subsystem};
pub use runtime::{
    ElementStatus, PrestigeOutcome, PrestigeRefusal, PrestigeSummary, PurchaseOutcome,
    PurchaseRefusal, Runtime, RuntimeError,
};
