//! OR combinator engine
//!
//! Runs every configured guard concurrently, grants on the first approval and
//! aborts whatever is still in flight at that point.

pub mod metrics;

pub use metrics::{CombinatorMetrics, MetricsCollector};

use crate::error::{GuardError, Result};
use crate::guard::{lazy_decision, Guard};
use crate::locator::GuardLocator;
use crate::policy::{ErrorPolicy, GuardVerdict};
use crate::types::{Evaluation, GuardId, Outcome, SwallowedFailure};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Environment variable read by [`OrGuardConfig::from_env`]
pub const STOP_ON_FIRST_ERROR_ENV: &str = "OR_GUARD_STOP_ON_FIRST_ERROR";

/// OR guard configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrGuardConfig {
    /// Surface the first guard failure instead of counting it as a denial
    pub stop_on_first_error: bool,
}

impl OrGuardConfig {
    /// Set `stop_on_first_error`
    pub fn stop_on_first_error(mut self, enabled: bool) -> Self {
        self.stop_on_first_error = enabled;
        self
    }

    /// Load from `OR_GUARD_STOP_ON_FIRST_ERROR`, defaulting when unset
    pub fn from_env() -> Result<Self> {
        match std::env::var(STOP_ON_FIRST_ERROR_ENV) {
            Ok(value) => Ok(Self {
                stop_on_first_error: parse_flag(&value)?,
            }),
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(e) => Err(GuardError::InvalidConfig(format!("{}: {}", STOP_ON_FIRST_ERROR_ENV, e))),
        }
    }

    /// Error policy derived from this configuration
    pub fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::from_flag(self.stop_on_first_error)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(GuardError::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            STOP_ON_FIRST_ERROR_ENV, other
        ))),
    }
}

/// Grants when any of its guards grants
///
/// # Evaluation
///
/// ```text
/// ids → Locator → [guard₀ … guardₙ] → JoinSet (all spawned at once)
///                                        ↓ completion order
///                                  ErrorPolicy.settle
///                                        ↓
///                 Allow → Granted (abort rest) │ Deny → keep waiting
///                 Fatal → Err (abort rest)     │ drained → Denied
/// ```
pub struct OrGuard<C> {
    /// Configured identifiers, in declaration order
    guard_ids: Vec<GuardId>,

    /// Source of guard instances
    locator: Arc<dyn GuardLocator<C>>,

    config: OrGuardConfig,

    /// Optional metrics sink
    metrics: Option<Arc<MetricsCollector>>,
}

impl<C> OrGuard<C>
where
    C: Send + Sync + 'static,
{
    /// Build a combinator over `guard_ids`
    ///
    /// Fails with [`GuardError::EmptyGuardSet`] when no identifier is given and
    /// with the locator's error when an identifier cannot be resolved. No guard
    /// is evaluated here.
    pub fn build<I, S>(
        guard_ids: I,
        config: OrGuardConfig,
        locator: Arc<dyn GuardLocator<C>>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<GuardId>,
    {
        let guard_ids: Vec<GuardId> = guard_ids.into_iter().map(Into::into).collect();

        if guard_ids.is_empty() {
            return Err(GuardError::EmptyGuardSet);
        }

        for id in &guard_ids {
            locator.resolve(id)?;
        }

        info!(
            "OrGuard built with guards={:?}, stop_on_first_error={}",
            guard_ids, config.stop_on_first_error
        );

        Ok(Self {
            guard_ids,
            locator,
            config,
            metrics: None,
        })
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Configured guard identifiers in declaration order
    pub fn guard_ids(&self) -> &[GuardId] {
        &self.guard_ids
    }

    pub fn config(&self) -> &OrGuardConfig {
        &self.config
    }

    /// Evaluate all guards against `context`
    pub async fn evaluate(&self, context: impl Into<Arc<C>>) -> Result<Outcome> {
        self.run(context.into(), None).await.map(|evaluation| evaluation.outcome)
    }

    /// Evaluate all guards and report how the outcome was reached
    pub async fn evaluate_detailed(&self, context: impl Into<Arc<C>>) -> Result<Evaluation> {
        self.run(context.into(), None).await
    }

    /// Evaluate until an outcome is reached or `cancel` fires
    ///
    /// Cancellation aborts every guard still running and yields [`GuardError::Cancelled`].
    pub async fn evaluate_until(
        &self,
        context: impl Into<Arc<C>>,
        cancel: CancellationToken,
    ) -> Result<Evaluation> {
        self.run(context.into(), Some(cancel)).await
    }

    async fn run(&self, context: Arc<C>, cancel: Option<CancellationToken>) -> Result<Evaluation> {
        let start = Instant::now();

        let result = self.race(context, cancel, start).await;

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(evaluation) => {
                    metrics.record_latency(evaluation.elapsed).await;
                    metrics.record_evaluation(evaluation).await;
                }
                Err(_) => {
                    metrics.record_latency(start.elapsed()).await;
                    metrics.record_fault().await;
                }
            }
        }

        result
    }

    async fn race(
        &self,
        context: Arc<C>,
        cancel: Option<CancellationToken>,
        start: Instant,
    ) -> Result<Evaluation> {
        let guards = self.resolve_all()?;
        let policy = self.config.error_policy();

        // Dropping the set aborts every task still running
        let mut tasks = JoinSet::new();
        let mut task_guards = HashMap::with_capacity(guards.len());
        for (index, guard) in guards.into_iter().enumerate() {
            let decision = lazy_decision(guard, Arc::clone(&context));
            let handle = tasks.spawn(async move {
                let result = match AssertUnwindSafe(decision).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("guard panicked")),
                };
                (index, result)
            });
            task_guards.insert(handle.id(), index);
        }

        debug!("OrGuard evaluation started with {} guards", tasks.len());

        let mut settled = 0;
        let mut swallowed = Vec::new();

        let latched: Result<(Outcome, Option<GuardId>)> = loop {
            let joined = match &cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => break Err(GuardError::Cancelled),
                    joined = tasks.join_next_with_id() => joined,
                },
                None => tasks.join_next_with_id().await,
            };

            let (index, result) = match joined {
                Some(Ok((_, completed))) => completed,
                // Task crashed outside catch_unwind (e.g. a panic payload that panics on drop)
                Some(Err(e)) => match task_guards.get(&e.id()) {
                    Some(&index) => (index, Err(anyhow::anyhow!("guard task failed: {}", e))),
                    None => {
                        warn!("Unknown guard task ended without a result: {}", e);
                        continue;
                    }
                },
                None => break Ok((Outcome::Denied, None)),
            };

            settled += 1;
            let guard_id = &self.guard_ids[index];

            match policy.settle(guard_id, result) {
                Ok(verdict) if verdict.allows() => {
                    debug!("Guard '{}' granted", guard_id);
                    break Ok((Outcome::Granted, Some(guard_id.clone())));
                }
                Ok(GuardVerdict::DenyOnError(error)) => {
                    warn!("Guard '{}' failed, counted as denial: {}", guard_id, error);
                    swallowed.push(SwallowedFailure {
                        guard: guard_id.clone(),
                        error,
                    });
                }
                Ok(_) => {
                    debug!("Guard '{}' denied", guard_id);
                }
                Err(e) => {
                    warn!("Guard '{}' failed, aborting evaluation", guard_id);
                    break Err(e);
                }
            }
        };

        let cancelled = tasks.len();
        tasks.abort_all();
        if cancelled > 0 {
            debug!("Aborted {} in-flight guards", cancelled);
        }

        let (outcome, granted_by) = latched?;

        let mut evaluation = Evaluation::new(outcome, granted_by);
        evaluation.settled = settled;
        evaluation.cancelled = cancelled;
        evaluation.swallowed = swallowed;
        evaluation.elapsed = start.elapsed();

        info!(
            "OrGuard decision: {} (settled={}, cancelled={}, swallowed={})",
            if outcome.is_granted() { "GRANTED" } else { "DENIED" },
            evaluation.settled,
            evaluation.cancelled,
            evaluation.swallowed.len()
        );

        Ok(evaluation)
    }

    fn resolve_all(&self) -> Result<Vec<Arc<dyn Guard<C>>>> {
        self.guard_ids
            .iter()
            .map(|id| self.locator.resolve(id))
            .collect()
    }
}

impl<C> fmt::Debug for OrGuard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrGuard")
            .field("guard_ids", &self.guard_ids)
            .field("config", &self.config)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::guard_fn;
    use crate::locator::GuardRegistry;

    fn registry() -> Arc<dyn GuardLocator<()>> {
        let registry = GuardRegistry::new();
        registry.register("allow", guard_fn(|_: &()| true));
        registry.register("deny", guard_fn(|_: &()| false));
        Arc::new(registry)
    }

    #[test]
    fn test_empty_guard_set_rejected() {
        let result = OrGuard::build(Vec::<String>::new(), OrGuardConfig::default(), registry());
        assert!(matches!(result, Err(GuardError::EmptyGuardSet)));
    }

    #[test]
    fn test_unknown_guard_rejected() {
        let result = OrGuard::build(["allow", "nope"], OrGuardConfig::default(), registry());
        match result {
            Err(GuardError::NotRegistered(id)) => assert_eq!(id, "nope"),
            other => panic!("expected NotRegistered, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_guard() {
        let or = OrGuard::build(["allow"], OrGuardConfig::default(), registry()).unwrap();
        assert_eq!(or.evaluate(()).await.unwrap(), Outcome::Granted);

        let or = OrGuard::build(["deny"], OrGuardConfig::default(), registry()).unwrap();
        assert_eq!(or.evaluate(()).await.unwrap(), Outcome::Denied);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true").unwrap());
        assert!(parse_flag(" YES ").unwrap());
        assert!(parse_flag("1").unwrap());
        assert!(!parse_flag("off").unwrap());
        assert!(!parse_flag("").unwrap());
        assert!(matches!(parse_flag("maybe"), Err(GuardError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: OrGuardConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.stop_on_first_error);
        assert_eq!(config.error_policy(), ErrorPolicy::DenyOnError);

        let config: OrGuardConfig =
            serde_json::from_str(r#"{"stop_on_first_error": true}"#).unwrap();
        assert_eq!(config.error_policy(), ErrorPolicy::StopOnFirstError);
    }

    #[test]
    fn test_debug_output() {
        let or = OrGuard::build(["allow", "deny"], OrGuardConfig::default(), registry()).unwrap();
        let debug = format!("{:?}", or);
        assert!(debug.contains("allow"));
        assert!(debug.contains("stop_on_first_error: false"));
    }
}
