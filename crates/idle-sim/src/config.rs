//! Simulation parameters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How simulated time advances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimMode {
    /// `tick(Δ)` at a fixed resolution. Always correct, cost grows with time / Δ.
    #[default]
    Fixed,
    /// Jump straight to the next affordability event.
    EventJump,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tick resolution must be positive and finite, got {0}")]
    InvalidResolution(f64),
    #[error("snapshot interval must be positive and finite, got {0}")]
    InvalidSnapshotInterval(f64),
    #[error("max_iterations must be at least 1")]
    ZeroIterations,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub mode: SimMode,
    /// Seconds per step in fixed mode.
    pub tick_resolution: f64,
    pub seed: u64,
    /// Hard cap on loop iterations; hitting it ends the run.
    pub max_iterations: u64,
    /// Seconds between snapshots. Defaults to the tick resolution.
    pub snapshot_interval: Option<f64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mode: SimMode::Fixed,
            tick_resolution: 1.0,
            seed: 42,
            max_iterations: 10_000_000,
            snapshot_interval: None,
        }
    }
}

impl SimConfig {
    pub fn fixed(tick_resolution: f64) -> Self {
        Self {
            mode: SimMode::Fixed,
            tick_resolution,
            ..Self::default()
        }
    }

    pub fn event_jump() -> Self {
        Self {
            mode: SimMode::EventJump,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_snapshot_interval(mut self, seconds: f64) -> Self {
        self.snapshot_interval = Some(seconds);
        self
    }

    pub fn snapshot_every(&self) -> f64 {
        self.snapshot_interval.unwrap_or(self.tick_resolution)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_resolution.is_finite() && self.tick_resolution > 0.0) {
            return Err(ConfigError::InvalidResolution(self.tick_resolution));
        }
        if let Some(s) = self.snapshot_interval {
            if !(s.is_finite() && s > 0.0) {
                return Err(ConfigError::InvalidSnapshotInterval(s));
            }
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_presets() {
        let c = SimConfig::default();
        assert_eq!(c.mode, SimMode::Fixed);
        assert_eq!(c.seed, 42);
        assert_eq!(c.snapshot_every(), 1.0);
        assert!(c.validate().is_ok());

        let c = SimConfig::event_jump().with_seed(7).with_snapshot_interval(60.0);
        assert_eq!(c.mode, SimMode::EventJump);
        assert_eq!(c.seed, 7);
        assert_eq!(c.snapshot_every(), 60.0);
    }

    #[test]
    fn rejects_bad_resolution() {
        assert_eq!(
            SimConfig::fixed(0.0).validate(),
            Err(ConfigError::InvalidResolution(0.0))
        );
        let c = SimConfig::fixed(1.0).with_snapshot_interval(-1.0);
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidSnapshotInterval(_))
        ));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let c: SimConfig = serde_yaml::from_str("mode: event_jump\nseed: 9\n").unwrap();
        assert_eq!(c.mode, SimMode::EventJump);
        assert_eq!(c.seed, 9);
        assert_eq!(c.tick_resolution, 1.0);
        assert_eq!(c.max_iterations, 10_000_000);
    }
}
