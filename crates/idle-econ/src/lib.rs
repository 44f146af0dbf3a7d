#![deny(warnings)]

//! Economic models: cost scaling and production aggregation for idlekit.
//!
//! This crate provides validated utilities for:
//! - Next-unit cost under fixed, exponential, linear or custom scaling
//! - The four-phase production-rate reduction (flat, additive %, multiplicative, global)
//! - Flat-then-multiplicative aggregation used for click values and caps

pub mod cost;
pub mod pipeline;

pub use cost::{validate_base_cost, CostFn, CostScaling, EconError};
pub use pipeline::{Contribution, FlatMult, PhaseTotals, ProductionPipeline, RateOverride};
