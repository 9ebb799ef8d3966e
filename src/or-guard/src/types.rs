//! Core OR guard types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Guard identifier as known to the locator
pub type GuardId = String;

/// Terminal result of one OR guard evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// At least one guard approved
    Granted,
    /// Every guard denied (or failed and was counted as a denial)
    Denied,
}

impl Outcome {
    /// Whether access is granted
    pub fn is_granted(self) -> bool {
        matches!(self, Outcome::Granted)
    }
}

impl From<Outcome> for bool {
    fn from(outcome: Outcome) -> bool {
        outcome.is_granted()
    }
}

/// Guard failure absorbed as a denial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwallowedFailure {
    /// Guard that failed
    pub guard: GuardId,

    /// Rendered error chain
    pub error: String,
}

/// Detailed report of one evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    /// Unique evaluation identifier
    pub id: String,

    /// Aggregate outcome
    pub outcome: Outcome,

    /// Guard whose approval short-circuited the evaluation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<GuardId>,

    /// Guards observed to completion
    pub settled: usize,

    /// Guards still in flight when the outcome was latched
    pub cancelled: usize,

    /// Failures counted as denials
    #[serde(default)]
    pub swallowed: Vec<SwallowedFailure>,

    /// Wall time from start to latch
    pub elapsed: Duration,
}

impl Evaluation {
    pub(crate) fn new(outcome: Outcome, granted_by: Option<GuardId>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            outcome,
            granted_by,
            settled: 0,
            cancelled: 0,
            swallowed: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}
