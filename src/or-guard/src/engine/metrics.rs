//! Prometheus-style metrics for OR guard evaluations

use crate::types::Evaluation;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// OR guard counters and latency summary
#[derive(Debug, Clone, Default)]
pub struct CombinatorMetrics {
    /// Total number of evaluations
    pub total_evaluations: u64,

    /// Evaluations that granted access
    pub granted: u64,

    /// Evaluations that denied access
    pub denied: u64,

    /// Evaluations that ended in an error
    pub faulted: u64,

    /// Guard failures counted as denials
    pub swallowed_errors: u64,

    /// Guards aborted after the outcome was latched
    pub cancelled_guards: u64,

    /// Latency percentiles
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,

    pub avg_latency_ms: f64,
}

impl CombinatorMetrics {
    /// Share of completed evaluations that granted access
    pub fn grant_rate(&self) -> f64 {
        let total = self.granted + self.denied;
        if total == 0 {
            0.0
        } else {
            self.granted as f64 / total as f64
        }
    }
}

/// Metrics collector shared across combinators
pub struct MetricsCollector {
    metrics: Arc<RwLock<CombinatorMetrics>>,

    /// Sliding window of evaluation latencies, in milliseconds
    latency_samples: Arc<RwLock<VecDeque<f64>>>,

    sample_window: usize,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::with_sample_window(DEFAULT_SAMPLE_WINDOW)
    }

    /// Collector whose percentiles cover the last `sample_window` evaluations
    pub fn with_sample_window(sample_window: usize) -> Self {
        let sample_window = sample_window.max(1);
        Self {
            metrics: Arc::new(RwLock::new(CombinatorMetrics::default())),
            latency_samples: Arc::new(RwLock::new(VecDeque::with_capacity(sample_window))),
            sample_window,
        }
    }

    /// Record a completed evaluation
    pub async fn record_evaluation(&self, evaluation: &Evaluation) {
        let mut metrics = self.metrics.write().await;
        metrics.total_evaluations += 1;

        if evaluation.outcome.is_granted() {
            metrics.granted += 1;
        } else {
            metrics.denied += 1;
        }

        metrics.swallowed_errors += evaluation.swallowed.len() as u64;
        metrics.cancelled_guards += evaluation.cancelled as u64;
    }

    /// Record an evaluation that ended in an error
    pub async fn record_fault(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.total_evaluations += 1;
        metrics.faulted += 1;
    }

    /// Record how long one evaluation took (normally [`Evaluation::elapsed`])
    pub async fn record_latency(&self, latency: Duration) {
        let mut samples = self.latency_samples.write().await;
        if samples.len() == self.sample_window {
            samples.pop_front();
        }
        samples.push_back(latency.as_secs_f64() * 1000.0);

        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        drop(samples);
        sorted.sort_by(f64::total_cmp);

        let mut metrics = self.metrics.write().await;
        metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        metrics.latency_p50_ms = nearest_rank(&sorted, 0.50);
        metrics.latency_p90_ms = nearest_rank(&sorted, 0.90);
        metrics.latency_p99_ms = nearest_rank(&sorted, 0.99);
    }

    /// Current metrics snapshot
    pub async fn get_metrics(&self) -> CombinatorMetrics {
        self.metrics.read().await.clone()
    }

    /// Reset all metrics
    pub async fn reset(&self) {
        let mut metrics = self.metrics.write().await;
        *metrics = CombinatorMetrics::default();

        let mut samples = self.latency_samples.write().await;
        samples.clear();
    }

    /// Export metrics in Prometheus text format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read().await;

        format!(
            r#"# HELP or_guard_evaluations_total Total number of OR guard evaluations
# TYPE or_guard_evaluations_total counter
or_guard_evaluations_total {}

# HELP or_guard_granted_total Evaluations that granted access
# TYPE or_guard_granted_total counter
or_guard_granted_total {}

# HELP or_guard_denied_total Evaluations that denied access
# TYPE or_guard_denied_total counter
or_guard_denied_total {}

# HELP or_guard_faulted_total Evaluations that ended in an error
# TYPE or_guard_faulted_total counter
or_guard_faulted_total {}

# HELP or_guard_swallowed_errors_total Guard failures counted as denials
# TYPE or_guard_swallowed_errors_total counter
or_guard_swallowed_errors_total {}

# HELP or_guard_cancelled_guards_total Guards aborted after short-circuit
# TYPE or_guard_cancelled_guards_total counter
or_guard_cancelled_guards_total {}

# HELP or_guard_latency_seconds Evaluation latency percentiles
# TYPE or_guard_latency_seconds summary
or_guard_latency_seconds{{quantile="0.5"}} {}
or_guard_latency_seconds{{quantile="0.9"}} {}
or_guard_latency_seconds{{quantile="0.99"}} {}
"#,
            metrics.total_evaluations,
            metrics.granted,
            metrics.denied,
            metrics.faulted,
            metrics.swallowed_errors,
            metrics.cancelled_guards,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p90_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
        )
    }

}

const DEFAULT_SAMPLE_WINDOW: usize = 10_000;

/// Smallest sample with at least `p` of the window at or below it
fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Outcome, SwallowedFailure};

    #[tokio::test]
    async fn test_metrics_creation() {
        let collector = MetricsCollector::new();
        let metrics = collector.get_metrics().await;

        assert_eq!(metrics.total_evaluations, 0);
        assert_eq!(metrics.grant_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_record_evaluation() {
        let collector = MetricsCollector::new();

        let mut granted = Evaluation::new(Outcome::Granted, Some("admin".to_string()));
        granted.cancelled = 2;
        collector.record_evaluation(&granted).await;

        let mut denied = Evaluation::new(Outcome::Denied, None);
        denied.swallowed.push(SwallowedFailure {
            guard: "jwt".to_string(),
            error: "expired".to_string(),
        });
        collector.record_evaluation(&denied).await;
        collector.record_fault().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_evaluations, 3);
        assert_eq!(metrics.granted, 1);
        assert_eq!(metrics.denied, 1);
        assert_eq!(metrics.faulted, 1);
        assert_eq!(metrics.swallowed_errors, 1);
        assert_eq!(metrics.cancelled_guards, 2);
        assert!((metrics.grant_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_record_latency() {
        let collector = MetricsCollector::new();

        collector.record_latency(Duration::from_millis(5)).await;
        collector.record_latency(Duration::from_millis(10)).await;
        collector.record_latency(Duration::from_millis(15)).await;

        let metrics = collector.get_metrics().await;
        assert!((metrics.avg_latency_ms - 10.0).abs() < 1e-9);
        assert!((metrics.latency_p50_ms - 10.0).abs() < 1e-9);
        assert!((metrics.latency_p90_ms - 15.0).abs() < 1e-9);
        assert!((metrics.latency_p99_ms - 15.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_latency_window_keeps_recent_samples() {
        let collector = MetricsCollector::with_sample_window(4);

        for ms in [100, 1, 2, 3, 4] {
            collector.record_latency(Duration::from_millis(ms)).await;
        }

        let metrics = collector.get_metrics().await;
        assert!((metrics.avg_latency_ms - 2.5).abs() < 1e-9);
        assert!((metrics.latency_p50_ms - 2.0).abs() < 1e-9);
        assert!((metrics.latency_p99_ms - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_rank() {
        let sorted: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(nearest_rank(&sorted, 0.50), 50.0);
        assert_eq!(nearest_rank(&sorted, 0.99), 99.0);
        assert_eq!(nearest_rank(&sorted, 0.0), 1.0);
        assert_eq!(nearest_rank(&[], 0.5), 0.0);
    }

    #[tokio::test]
    async fn test_prometheus_export() {
        let collector = MetricsCollector::new();

        collector
            .record_evaluation(&Evaluation::new(Outcome::Granted, None))
            .await;

        let prometheus = collector.export_prometheus().await;
        assert!(prometheus.contains("or_guard_evaluations_total 1"));
        assert!(prometheus.contains("or_guard_granted_total 1"));
        assert!(prometheus.contains("or_guard_faulted_total 0"));
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();

        collector.record_fault().await;
        collector.reset().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_evaluations, 0);
        assert_eq!(metrics.faulted, 0);
    }
}
