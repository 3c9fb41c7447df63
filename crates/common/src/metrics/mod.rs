//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming for the pipeline engine.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all ClipForge metrics
pub const METRICS_PREFIX: &str = "clipforge";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_jobs_submitted_total", METRICS_PREFIX),
        Unit::Count,
        "Total jobs accepted by the submission service"
    );

    describe_counter!(
        format!("{}_jobs_completed_total", METRICS_PREFIX),
        Unit::Count,
        "Total jobs reaching a terminal state, labeled by outcome"
    );

    describe_histogram!(
        format!("{}_job_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end job processing time"
    );

    describe_counter!(
        format!("{}_stage_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Stage executions, labeled by stage and outcome"
    );

    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-stage execution time"
    );

    describe_counter!(
        format!("{}_provider_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Provider invocations, labeled by provider and outcome"
    );

    describe_gauge!(
        format!("{}_queue_depth", METRICS_PREFIX),
        Unit::Count,
        "Jobs waiting in the submission queue"
    );

    describe_gauge!(
        format!("{}_workers_busy", METRICS_PREFIX),
        Unit::Count,
        "Workers currently running a job"
    );

    tracing::info!("Metrics registered");
}

/// Record a job accepted by the submission service
pub fn record_job_submitted() {
    counter!(format!("{}_jobs_submitted_total", METRICS_PREFIX)).increment(1);
}

/// Record a job reaching a terminal state
pub fn record_job_finished(outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_jobs_completed_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(format!("{}_job_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record one stage execution
pub fn record_stage(stage: &str, outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_stage_runs_total", METRICS_PREFIX),
        "stage" => stage.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        "stage" => stage.to_string()
    )
    .record(duration_secs);
}

/// Record one provider call made by the gateway
pub fn record_provider_call(provider: &str, outcome: &str) {
    counter!(
        format!("{}_provider_calls_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Update the queue depth gauge
pub fn set_queue_depth(depth: usize) {
    gauge!(format!("{}_queue_depth", METRICS_PREFIX)).set(depth as f64);
}

/// Update the busy-worker gauge
pub fn set_workers_busy(busy: usize) {
    gauge!(format!("{}_workers_busy", METRICS_PREFIX)).set(busy as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_does_not_panic_without_recorder() {
        record_job_finished("completed", 12.5);
        record_stage("transcription", "success", 3.2);
        record_provider_call("openai", "timeout");
        set_queue_depth(3);
        set_workers_busy(2);
    }
}
