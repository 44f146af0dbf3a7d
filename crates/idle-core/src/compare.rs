//! Comparison operators used by threshold requirements and terminal conditions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Binary comparison between a state quantity and a threshold.
///
/// Equality is exact on floats. Callers that need a tolerance should
/// express it with a custom predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    /// Apply the operator as `left <op> right`.
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Ge => left >= right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Lt => left < right,
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

/// Unknown operator string.
#[derive(Debug, Error, PartialEq)]
#[error("unknown operator {0:?}, expected one of >=, <=, >, <, ==, !=")]
pub struct ParseOpError(pub String);

impl FromStr for CompareOp {
    type Err = ParseOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">=" => Ok(CompareOp::Ge),
            "<=" => Ok(CompareOp::Le),
            ">" => Ok(CompareOp::Gt),
            "<" => Ok(CompareOp::Lt),
            "==" => Ok(CompareOp::Eq),
            "!=" => Ok(CompareOp::Ne),
            other => Err(ParseOpError(other.to_string())),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
