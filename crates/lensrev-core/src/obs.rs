//! Structured observability hooks for the review lifecycle.
//!
//! This module provides:
//! - Review-scoped tracing spans via the `ReviewSpan` RAII guard
//! - Emission functions for lifecycle events: start, lens finished/skipped, aggregation, finish
//!
//! Events are emitted at `info!` level (configurable via the `LENSREV_LOG` env var).
//! For JSON output, set `LENSREV_LOG_FORMAT=json`.

use lensrev_domain::{LensId, ReviewError};
use tracing::{info, warn};

use crate::aggregate::AggregatedIssues;

/// RAII guard that enters a review-scoped tracing span.
///
/// ```ignore
/// let _span = ReviewSpan::enter(&trace.trace_id);
/// // every tracing call on this thread now carries trace_id
/// ```
pub struct ReviewSpan {
    _span: tracing::span::EnteredSpan,
}

impl ReviewSpan {
    pub fn enter(trace_id: &str) -> Self {
        Self {
            _span: review_span(trace_id).entered(),
        }
    }
}

/// The review span itself, for instrumenting futures that cross `.await`.
pub fn review_span(trace_id: &str) -> tracing::Span {
    tracing::info_span!("lensrev.review", trace_id = %trace_id)
}

/// Emit event: review started.
pub fn emit_review_started(trace_id: &str, lens_count: usize, concurrency: usize, files: usize) {
    info!(
        event = "review.started",
        trace_id = %trace_id,
        lens_count = lens_count,
        concurrency = concurrency,
        files = files,
    );
}

/// Emit event: one lens ran to completion, successfully or not.
pub fn emit_lens_finished(
    lens: LensId,
    duration_ms: u64,
    issue_count: usize,
    error: Option<&ReviewError>,
) {
    match error {
        None => info!(
            event = "lens.finished",
            lens = %lens,
            duration_ms = duration_ms,
            issue_count = issue_count,
            success = true,
        ),
        Some(err) => warn!(
            event = "lens.finished",
            lens = %lens,
            duration_ms = duration_ms,
            success = false,
            code = %err.code,
            error = %err.message,
        ),
    }
}

/// Emit event: a lens never started because the run was cancelled.
pub fn emit_lens_skipped(lens: LensId) {
    info!(event = "lens.skipped", lens = %lens);
}

/// Emit event: aggregation finished, with what each step removed.
///
/// `malformed_dropped` counts issues the lenses could not decode, before aggregation.
pub fn emit_aggregation(input: usize, malformed_dropped: usize, report: &AggregatedIssues) {
    info!(
        event = "review.aggregated",
        input = input,
        malformed_dropped = malformed_dropped,
        kept = report.issues.len(),
        duplicates_removed = report.duplicates_removed,
        below_threshold = report.below_threshold,
        incomplete_dropped = report.incomplete_dropped,
    );
}

/// Emit event: review finished.
pub fn emit_review_finished(
    trace_id: &str,
    duration_ms: u64,
    total_issues: usize,
    failed_lenses: usize,
    success: bool,
) {
    info!(
        event = "review.finished",
        trace_id = %trace_id,
        duration_ms = duration_ms,
        total_issues = total_issues,
        failed_lenses = failed_lenses,
        success = success,
    );
}
