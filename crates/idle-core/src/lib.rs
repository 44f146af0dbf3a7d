#![deny(warnings)]

//! Core economy model for idlekit.
//!
//! This crate holds the leaf types every other layer builds on:
//! - string identifiers for currencies, elements, milestones and prestige layers
//! - [`Value`], a literal-or-computed number resolved against the current state
//! - [`Requirement`], composable boolean predicates over the state
//! - [`Effect`], typed and phased modifiers attached to purchasable elements
//! - [`EconomyState`], the mutable snapshot owned by the runtime

pub mod compare;
pub mod effect;
pub mod ids;
pub mod requirement;
pub mod state;
pub mod value;

pub use compare::{CompareOp, ParseOpError};
pub use effect::{Effect, EffectKind, EffectPhase, ValueShape};
pub use ids::{CostMap, CurrencyId, ElementId, LayerId, MilestoneId};
pub use requirement::{EstimatedDuration, Predicate, Requirement};
pub use state::{CurrencyState, EconomyState, ElementState, EstimateStatus};
pub use value::{StateFn, Value};

/// Tag marking an element as exempt from every prestige reset.
pub const PERSISTENT_TAG: &str = "persistent";
