#![deny(warnings)]

//! Headless simulation of idlekit economies.
//!
//! A [`Simulator`] drives one [`idle_runtime::Runtime`] with one
//! [`idle_ai::Strategy`] until a [`Terminal`] condition holds, using either
//! fixed-resolution ticking or analytic event jumps. The resulting
//! [`SimReport`] carries the ordered event log and derived pacing metrics;
//! [`PacingBound`]s turn those metrics into pass/fail checks and
//! [`run_batch`] aggregates many seeded runs.

pub mod batch;
pub mod config;
pub mod demo;
pub mod metrics;
pub mod pacing;
pub mod report;
pub mod simulator;
pub mod terminal;

pub use batch::{run_batch, BatchSummary, MilestoneStats};
pub use config::{ConfigError, SimConfig, SimMode};
pub use metrics::{MetricsCollector, SimEvent};
pub use pacing::{
    check_all, check_with_custom, CustomBound, PacingBound, PacingResult, Severity,
};
pub use report::{SimOutcome, SimReport};
pub use simulator::{SimError, Simulator};
pub use terminal::Terminal;
