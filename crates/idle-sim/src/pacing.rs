//! Pass/fail pacing checks over a finished report.

use crate::report::SimReport;
use idle_core::MilestoneId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PacingBound {
    /// The milestone must fire within `[min, max]` seconds.
    MilestoneBetween {
        milestone: MilestoneId,
        min: f64,
        max: f64,
        #[serde(default)]
        severity: Severity,
    },
    /// No gap between purchases longer than `max` seconds, ignoring gaps
    /// that start before `after`.
    MaxPurchaseGap {
        max: f64,
        #[serde(default)]
        after: f64,
        #[serde(default)]
        severity: Severity,
    },
    NoStalls {
        #[serde(default)]
        severity: Severity,
    },
    DeadTimeRatio {
        max: f64,
        #[serde(default)]
        severity: Severity,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PacingResult {
    /// What was checked, e.g. `no stalls`.
    pub check: String,
    pub passed: bool,
    pub severity: Severity,
    pub detail: String,
}

impl PacingResult {
    /// A failed check with error severity.
    pub fn is_error(&self) -> bool {
        !self.passed && self.severity == Severity::Error
    }
}

impl PacingBound {
    pub fn severity(&self) -> Severity {
        match self {
            PacingBound::MilestoneBetween { severity, .. }
            | PacingBound::MaxPurchaseGap { severity, .. }
            | PacingBound::NoStalls { severity }
            | PacingBound::DeadTimeRatio { severity, .. } => *severity,
        }
    }

    pub fn check(&self, report: &SimReport) -> PacingResult {
        let (passed, detail) = match self {
            PacingBound::MilestoneBetween {
                milestone,
                min,
                max,
                ..
            } => match report.milestone_times().get(milestone) {
                Some(t) => (
                    *t >= *min && *t <= *max,
                    format!("{milestone} reached at {t:.1}s, expected {min:.1}s..{max:.1}s"),
                ),
                None => (false, format!("{milestone} never reached")),
            },
            PacingBound::MaxPurchaseGap { max, after, .. } => {
                let worst = report
                    .gaps_with_start()
                    .into_iter()
                    .filter(|(start, _)| *start >= *after)
                    .max_by(|a, b| a.1.total_cmp(&b.1));
                match worst {
                    Some((start, gap)) => (
                        gap <= *max,
                        format!("longest gap {gap:.1}s starting at {start:.1}s, limit {max:.1}s"),
                    ),
                    None => (true, "no purchases to measure".to_string()),
                }
            }
            PacingBound::NoStalls { .. } => {
                if report.stalled() {
                    (false, format!("stalled at {:.1}s", report.total_time))
                } else {
                    (true, "no stall".to_string())
                }
            }
            PacingBound::DeadTimeRatio { max, .. } => {
                let ratio = report.dead_time_ratio();
                (
                    ratio <= *max,
                    format!("dead time {:.1}%, limit {:.1}%", ratio * 100.0, max * 100.0),
                )
            }
        };
        PacingResult {
            check: self.to_string(),
            passed,
            severity: self.severity(),
            detail,
        }
    }
}

impl fmt::Display for PacingBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacingBound::MilestoneBetween {
                milestone,
                min,
                max,
                ..
            } => write!(f, "{milestone} between {min:.1}s and {max:.1}s"),
            PacingBound::MaxPurchaseGap { max, after, .. } if *after > 0.0 => {
                write!(f, "purchase gap <= {max:.1}s after {after:.1}s")
            }
            PacingBound::MaxPurchaseGap { max, .. } => write!(f, "purchase gap <= {max:.1}s"),
            PacingBound::NoStalls { .. } => f.write_str("no stalls"),
            PacingBound::DeadTimeRatio { max, .. } => {
                write!(f, "dead time <= {:.0}%", max * 100.0)
            }
        }
    }
}

pub fn check_all(bounds: &[PacingBound], report: &SimReport) -> Vec<PacingResult> {
    bounds.iter().map(|b| b.check(report)).collect()
}

type Condition = Arc<dyn Fn(&SimReport) -> bool + Send + Sync>;

/// Closure-backed check for pacing rules the built-in bounds cannot express.
/// Lives in code only; it has no config form.
#[derive(Clone)]
pub struct CustomBound {
    description: String,
    severity: Severity,
    condition: Condition,
}

impl CustomBound {
    pub fn new<F>(description: impl Into<String>, condition: F) -> Self
    where
        F: Fn(&SimReport) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            severity: Severity::Error,
            condition: Arc::new(condition),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn check(&self, report: &SimReport) -> PacingResult {
        let passed = (self.condition)(report);
        PacingResult {
            check: self.description.clone(),
            passed,
            severity: self.severity,
            detail: if passed { "holds" } else { "violated" }.to_string(),
        }
    }
}

impl fmt::Debug for CustomBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomBound")
            .field("description", &self.description)
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

/// Built-in bounds first, then custom ones, in declaration order.
pub fn check_with_custom(
    bounds: &[PacingBound],
    custom: &[CustomBound],
    report: &SimReport,
) -> Vec<PacingResult> {
    let mut results = check_all(bounds, report);
    results.extend(custom.iter().map(|c| c.check(report)));
    results
}
