//! Structured observability hooks for conversion runs.
//!
//! Every event carries an `event` field so log pipelines can filter on it.

use std::path::Path;

use tracing::{info, warn};

use crate::domain::Severity;

/// Run-scoped span. Attach it to the run future with
/// [`tracing::Instrument::instrument`] so it follows the task across awaits.
///
/// ```ignore
/// orchestrator.execute(..).instrument(run_span("1f0c...", "site/components/card")).await
/// ```
pub fn run_span(run_id: &str, component_id: &str) -> tracing::Span {
    tracing::info_span!("aemport.run", run_id = %run_id, component = %component_id)
}

pub fn emit_pipeline_started(run_id: &str, component_id: &str, max_iterations: u32) {
    info!(
        event = "pipeline.started",
        run_id = %run_id,
        component = %component_id,
        max_iterations = max_iterations,
    );
}

pub fn emit_stage_entered(stage: &str, iteration: u32) {
    info!(event = "stage.entered", stage = %stage, iteration = iteration);
}

/// Emit event: aggregated review verdict for one review pass.
pub fn emit_review_evaluated(iteration: u32, passed: bool, failing: usize, worst: Severity) {
    info!(
        event = "review.evaluated",
        iteration = iteration,
        passed = passed,
        failing_checks = failing,
        worst_severity = %worst,
    );
}

pub fn emit_repair_applied(iteration: u32, succeeded: bool) {
    info!(event = "repair.applied", iteration = iteration, succeeded = succeeded);
}

pub fn emit_pipeline_finished(run_id: &str, duration_ms: u64, iterations: u32, passed: bool) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        iterations = iterations,
        passed = passed,
    );
}

pub fn emit_registry_pruned(component_id: &str, missing_artifact: &Path) {
    info!(
        event = "registry.pruned",
        component = %component_id,
        missing_artifact = %missing_artifact.display(),
    );
}

/// Emit event: a collaborator call failed and will be retried (warning level).
pub fn emit_collaborator_retry(
    operation: &str,
    attempt: u32,
    delay_ms: u64,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "collaborator.retry",
        operation = %operation,
        attempt = attempt,
        delay_ms = delay_ms,
        error = %error,
    );
}
