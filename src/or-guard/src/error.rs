//! Error types for the OR guard combinator

use crate::types::GuardId;
use thiserror::Error;

/// OR guard errors
#[derive(Debug, Error)]
pub enum GuardError {
    /// Combinator built without any guard
    #[error("Invalid configuration: an OR guard needs at least one guard")]
    EmptyGuardSet,

    /// Guard identifier unknown to the locator
    #[error("Guard not registered: {0}")]
    NotRegistered(GuardId),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Locator failed to produce a guard instance
    #[error("Guard resolution failed for '{guard}': {reason}")]
    Resolution {
        guard: GuardId,
        reason: String,
    },

    /// Guard failure made fatal by the error policy
    #[error("Guard '{guard}' failed: {source}")]
    GuardFailed {
        guard: GuardId,
        #[source]
        source: anyhow::Error,
    },

    /// Evaluation cancelled by the caller
    #[error("Evaluation cancelled")]
    Cancelled,
}

impl GuardError {
    /// Whether this error was raised by a bad combinator setup rather than by an evaluation
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GuardError::EmptyGuardSet | GuardError::NotRegistered(_) | GuardError::InvalidConfig(_)
        )
    }

    /// Original error raised by the failing guard, if any
    pub fn guard_source(&self) -> Option<&anyhow::Error> {
        match self {
            GuardError::GuardFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for OR guard operations
pub type Result<T> = std::result::Result<T, GuardError>;
