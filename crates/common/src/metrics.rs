//! Metrics collection and reporting.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, Registry};

/// Global metrics registry, scraped by the worker daemon's optional
/// `/metrics` endpoint.
pub static METRICS_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Count of task attempts, labeled by terminal status.
pub static TASK_ATTEMPTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "orchestrator_task_attempts_total",
        "Total number of task attempts by terminal status",
        &["status"]
    )
    .unwrap()
});

/// Task execution duration, labeled by terminal status.
pub static TASK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "orchestrator_task_duration_seconds",
        "Task execution duration in seconds",
        &["status"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap()
});

/// Count of errors, labeled by kind and severity.
pub static ERROR_COUNTER: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "orchestrator_errors_total",
        "Total number of errors by kind and severity",
        &["kind", "severity"]
    )
    .unwrap()
});

/// Register all metrics with the global registry. Safe to call more than
/// once; subsequent registrations of an already-registered collector are
/// ignored.
pub fn init_metrics() {
    let _ = METRICS_REGISTRY.register(Box::new(TASK_ATTEMPTS.clone()));
    let _ = METRICS_REGISTRY.register(Box::new(TASK_DURATION.clone()));
    let _ = METRICS_REGISTRY.register(Box::new(ERROR_COUNTER.clone()));
}

/// Record a completed task attempt.
pub fn record_task_attempt(status: &str, duration_secs: f64) {
    TASK_ATTEMPTS.with_label_values(&[status]).inc();
    TASK_DURATION.with_label_values(&[status]).observe(duration_secs);
}

/// Record an error by kind/severity.
pub fn record_error(kind: &str, severity: &str) {
    ERROR_COUNTER.with_label_values(&[kind, severity]).inc();
}
