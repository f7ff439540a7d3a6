//! services/record.rs
//!
//! The one thing this crate keeps: a named model with a score and an opaque
//! payload. The payload is whatever the client sent (`serde_json::Value`) and
//! is never looked into here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named model snapshot.
///
/// On disk and on the wire the payload lives under `data`, so a record file
/// reads `{"name": .., "score": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub name: String,
    pub score: f64,
    #[serde(rename = "data", default)]
    pub payload: Value,
}

impl Record {
    pub fn new(name: impl Into<String>, score: f64, payload: Value) -> Self {
        Self {
            name: name.into(),
            score,
            payload,
        }
    }

    /// The record a name starts from before anything was committed for it.
    pub fn unset(name: impl Into<String>) -> Self {
        Self::new(name, 0.0, Value::Null)
    }

    /// Strictly-greater policy. Equal scores never win; NaN never wins.
    pub fn is_beaten_by(&self, candidate: f64) -> bool {
        candidate.is_finite() && candidate > self.score
    }
}

/// Outcome of a submission that reached a decision.
///
/// Rejection is a normal answer, not an error: the caller learns the current
/// best from it.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Accepted(Record),
    Rejected(Record),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted(_))
    }

    /// The record now held for the submitted name.
    pub fn record(&self) -> &Record {
        match self {
            Submission::Accepted(r) | Submission::Rejected(r) => r,
        }
    }
}
