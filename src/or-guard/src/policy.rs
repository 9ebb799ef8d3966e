//! Error policy applied to each guard completion

use crate::error::{GuardError, Result};
use crate::types::GuardId;
use serde::{Deserialize, Serialize};

/// What a guard failure means for the aggregate evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Failure counts as a denial from that guard
    #[default]
    DenyOnError,
    /// Failure terminates the evaluation
    StopOnFirstError,
}

impl ErrorPolicy {
    /// Policy selected by the `stop_on_first_error` flag
    pub fn from_flag(stop_on_first_error: bool) -> Self {
        if stop_on_first_error {
            ErrorPolicy::StopOnFirstError
        } else {
            ErrorPolicy::DenyOnError
        }
    }

    /// Translate one guard completion into its contribution to the OR
    pub fn settle(self, guard: &GuardId, result: anyhow::Result<bool>) -> Result<GuardVerdict> {
        match result {
            Ok(true) => Ok(GuardVerdict::Allow),
            Ok(false) => Ok(GuardVerdict::Deny),
            Err(source) => match self {
                ErrorPolicy::DenyOnError => Ok(GuardVerdict::DenyOnError(format!("{:#}", source))),
                ErrorPolicy::StopOnFirstError => Err(GuardError::GuardFailed {
                    guard: guard.clone(),
                    source,
                }),
            },
        }
    }
}

/// Contribution of one guard after the policy is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Allow,
    Deny,
    /// Failure absorbed as a denial, with the rendered error
    DenyOnError(String),
}

impl GuardVerdict {
    pub fn allows(&self) -> bool {
        matches!(self, GuardVerdict::Allow)
    }
}
