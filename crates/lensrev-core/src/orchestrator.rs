//! End-to-end review runs.
//!
//! A run resolves the requested lenses, streams lifecycle events while the
//! lenses execute through [`run_bounded`], folds every settled outcome into
//! per-lens statistics, and aggregates the surviving findings. Individual
//! lens failures never abort the run; only a run with no usable output at
//! all is returned as an error.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use lensrev_domain::{
    ErrorCode, LensId, ModelClient, ParsedDiff, ReviewError, ReviewIssue, Severity, TraceContext,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn, Instrument};

use crate::aggregate::aggregate_issues;
use crate::events::{AgentRef, EventEmitter, EventKind, EventSink};
use crate::executor::{effective_concurrency, panic_message, run_bounded, Settled, TaskFailure};
use crate::lenses::{resolve_lenses, Lens, ReviewProfile};
use crate::metrics::METRICS;
use crate::obs::{self, ReviewSpan};
use crate::runner::{run_lens, AnalysisContext, FocusTarget, LensReport};

/// Concurrency used when the caller does not choose one.
pub const DEFAULT_CONCURRENCY: usize = 3;

// ============================================================================
// OPTIONS
// ============================================================================

/// What to review and how to filter the findings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewOptions {
    /// Requested lens ids in order; `None` or empty falls back to the profile, then the default lens.
    pub lenses: Option<Vec<String>>,
    /// Overrides the profile's threshold.
    pub min_severity: Option<Severity>,
    pub project_context: Option<String>,
    /// Name of a built-in [`ReviewProfile`].
    pub profile: Option<String>,
    pub focus: Option<FocusTarget>,
}

/// How to execute a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upper bound on lenses in flight; clamped to `1..=lens count`.
    pub concurrency: usize,
    /// Return `Ok` even when every lens failed.
    pub partial_on_all_failed: bool,
    /// Cancel the run as soon as any lens fails.
    pub fail_fast: bool,
    /// Caller-owned cancellation; the orchestrator creates a token when absent.
    pub cancel: Option<CancellationToken>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            partial_on_all_failed: false,
            fail_fast: false,
            cancel: None,
        }
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LensStatus {
    Success,
    Failed,
}

/// Per-lens statistics, one per requested lens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LensStat {
    pub lens_id: LensId,
    pub lens_name: String,
    pub status: LensStatus,
    pub issue_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Absent for lenses that never ran to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// A lens that produced no output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedLens {
    pub lens_id: LensId,
    pub lens_name: String,
    pub error_code: ErrorCode,
    pub error_message: String,
}

/// Terminal value of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationOutcome {
    pub summary: String,
    pub issues: Vec<ReviewIssue>,
    pub lens_stats: Vec<LensStat>,
    pub failed_lenses: Vec<FailedLens>,
    pub trace_id: String,
}

impl OrchestrationOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failed_lenses.is_empty()
    }
}

// ============================================================================
// RUN
// ============================================================================

/// One lens scheduled for a run, with its own event span.
struct LensTask {
    lens: &'static Lens,
    emitter: EventEmitter,
}

/// A lens error together with how long the lens ran.
struct LensFailure {
    error: ReviewError,
    duration_ms: u64,
}

/// State every lens in a run reads.
struct RunShared {
    client: Arc<dyn ModelClient>,
    diff: Arc<ParsedDiff>,
    context: AnalysisContext,
    cancel: CancellationToken,
    fail_fast: bool,
}

/// Coordinates review runs against one model client.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    /// Review `diff` with the requested lenses, streaming progress to `sink`.
    ///
    /// Fails with `NO_DIFF` for an empty diff and `NO_LENSES` when no requested
    /// id names a lens; neither emits any event. Otherwise the run fails only
    /// when no issue survived, no lens succeeded, and
    /// [`RunOptions::partial_on_all_failed`] is unset; the error is the last
    /// lens error observed in lens order.
    #[instrument(skip_all, fields(files = tracing::field::Empty))]
    pub async fn orchestrate(
        &self,
        diff: impl Into<Arc<ParsedDiff>>,
        options: ReviewOptions,
        sink: Arc<dyn EventSink>,
        run: RunOptions,
    ) -> Result<OrchestrationOutcome, ReviewError> {
        let diff: Arc<ParsedDiff> = diff.into();
        tracing::Span::current().record("files", diff.file_count());
        if diff.is_empty() {
            return Err(ReviewError::no_diff());
        }

        let profile = options.profile.as_deref().and_then(|name| {
            let found = ReviewProfile::find(name);
            if found.is_none() {
                warn!(profile = %name, "unknown review profile; ignoring");
            }
            found
        });
        let requested: Option<Vec<String>> = match (&options.lenses, profile) {
            (Some(ids), _) if !ids.is_empty() => Some(ids.clone()),
            (_, Some(p)) => Some(p.lens_names()),
            (ids, None) => ids.clone(),
        };
        let min_severity = options
            .min_severity
            .or_else(|| profile.and_then(|p| p.min_severity));

        let lenses = resolve_lenses(requested.as_deref());
        if lenses.is_empty() {
            return Err(ReviewError::no_lenses(requested.as_deref().unwrap_or(&[])));
        }

        let started = Instant::now();
        let trace = TraceContext::root();
        let concurrency = effective_concurrency(run.concurrency, lenses.len());
        let cancel = run.cancel.clone().unwrap_or_else(CancellationToken::new);
        let root = EventEmitter::new(sink, trace.clone());

        let tasks = {
            let _span = ReviewSpan::enter(&trace.trace_id);
            METRICS.inc_reviews_started();
            obs::emit_review_started(&trace.trace_id, lenses.len(), concurrency, diff.file_count());

            root.emit(EventKind::OrchestratorStart {
                agents: lenses.iter().map(|l| AgentRef::from(*l)).collect(),
                concurrency,
            });
            let total = lenses.len();
            lenses
                .iter()
                .enumerate()
                .map(|(i, lens)| {
                    root.emit(EventKind::AgentQueued {
                        agent: AgentRef::from(*lens),
                        position: i + 1,
                        total,
                    });
                    LensTask {
                        lens: *lens,
                        emitter: root.child(),
                    }
                })
                .collect::<Vec<_>>()
        };

        let shared = Arc::new(RunShared {
            client: Arc::clone(&self.client),
            diff: Arc::clone(&diff),
            context: AnalysisContext {
                project_context: options.project_context.clone(),
                focus: options.focus.clone(),
            },
            cancel: cancel.clone(),
            fail_fast: run.fail_fast,
        });

        let outcomes = run_bounded(tasks, concurrency, cancel, move |_, task: LensTask| {
            let shared = Arc::clone(&shared);
            let span = tracing::info_span!("lensrev.lens", lens = %task.lens.id);
            async move { execute_lens(&shared, task).await }.instrument(span)
        })
        .instrument(obs::review_span(&trace.trace_id))
        .await;

        let _span = ReviewSpan::enter(&trace.trace_id);
        let collected = collect_outcomes(&lenses, outcomes);

        let input = collected.issues.len();
        let aggregated = aggregate_issues(collected.issues, min_severity);
        METRICS.add_issues_malformed(collected.malformed_dropped as u64);
        obs::emit_aggregation(input, collected.malformed_dropped, &aggregated);

        let summary = build_summary(&collected.summaries, &collected.failed);
        root.emit(EventKind::OrchestratorComplete {
            summary: summary.clone(),
            total_issues: aggregated.issues.len(),
            lens_stats: collected.stats.clone(),
            files_analyzed: diff.file_count(),
        });

        let duration_ms = started.elapsed().as_millis() as u64;
        let all_failed = collected.successes == 0;
        if aggregated.issues.is_empty() && all_failed && !run.partial_on_all_failed {
            if let Some(error) = collected.last_error {
                obs::emit_review_finished(&trace.trace_id, duration_ms, 0, collected.failed.len(), false);
                METRICS.flush();
                return Err(error);
            }
        }

        METRICS.add_issues_reported(aggregated.issues.len() as u64);
        obs::emit_review_finished(
            &trace.trace_id,
            duration_ms,
            aggregated.issues.len(),
            collected.failed.len(),
            true,
        );
        METRICS.flush();

        Ok(OrchestrationOutcome {
            summary,
            issues: aggregated.issues,
            lens_stats: collected.stats,
            failed_lenses: collected.failed,
            trace_id: trace.trace_id,
        })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

/// Run one lens, reporting its lifecycle on the lens's own span.
///
/// A panic inside the lens is reported as `agent_error` and then resumed so
/// the executor records it as a captured failure.
async fn execute_lens(shared: &RunShared, task: LensTask) -> Result<LensReport, LensFailure> {
    let agent = AgentRef::from(task.lens);
    task.emitter.emit(EventKind::AgentStart {
        agent: agent.clone(),
    });
    let started = Instant::now();

    let attempt = AssertUnwindSafe(run_lens(
        shared.client.as_ref(),
        task.lens,
        &shared.diff,
        &shared.context,
        &task.emitter,
    ))
    .catch_unwind()
    .await;

    match attempt {
        Ok(Ok(report)) => {
            task.emitter.emit(EventKind::AgentComplete {
                agent,
                issue_count: report.issues.len(),
            });
            Ok(report)
        }
        Ok(Err(error)) => {
            task.emitter.emit(EventKind::AgentError {
                agent,
                error: error.clone(),
            });
            if shared.fail_fast {
                debug!(lens = %task.lens.id, "fail-fast: cancelling remaining lenses");
                shared.cancel.cancel();
            }
            Err(LensFailure {
                error,
                duration_ms: started.elapsed().as_millis() as u64,
            })
        }
        Err(payload) => {
            task.emitter.emit(EventKind::AgentError {
                agent,
                error: ReviewError::unknown(panic_message(payload.as_ref())),
            });
            if shared.fail_fast {
                shared.cancel.cancel();
            }
            std::panic::resume_unwind(payload)
        }
    }
}

#[derive(Default)]
struct Collected {
    issues: Vec<ReviewIssue>,
    summaries: Vec<String>,
    stats: Vec<LensStat>,
    failed: Vec<FailedLens>,
    successes: usize,
    malformed_dropped: usize,
    last_error: Option<ReviewError>,
}

/// Fold settled outcomes in lens order; every lens yields exactly one stat.
fn collect_outcomes(
    lenses: &[&'static Lens],
    outcomes: Vec<Settled<LensReport, LensFailure>>,
) -> Collected {
    let mut collected = Collected::default();

    for (lens, outcome) in lenses.iter().zip(outcomes) {
        match outcome {
            Settled::Fulfilled(report) => {
                METRICS.inc_lenses_succeeded();
                obs::emit_lens_finished(lens.id, report.duration_ms, report.issues.len(), None);
                collected.stats.push(LensStat {
                    lens_id: lens.id,
                    lens_name: lens.name.to_string(),
                    status: LensStatus::Success,
                    issue_count: report.issues.len(),
                    error_code: None,
                    error_message: None,
                    duration_ms: Some(report.duration_ms),
                });
                let summary = if report.summary.is_empty() {
                    "No summary provided."
                } else {
                    report.summary.as_str()
                };
                collected
                    .summaries
                    .push(format!("**{}**: {}", lens.name, summary));
                collected.issues.extend(report.issues);
                collected.malformed_dropped += report.malformed_dropped;
                collected.successes += 1;
            }
            Settled::Rejected(failure) => {
                let (error, duration_ms) = match failure {
                    TaskFailure::Error(f) => (f.error, Some(f.duration_ms)),
                    TaskFailure::Panicked(message) => (ReviewError::unknown(message), None),
                    TaskFailure::NotStarted => (ReviewError::not_started(), None),
                };
                if error.code == ErrorCode::NotStarted {
                    METRICS.inc_lenses_skipped();
                    obs::emit_lens_skipped(lens.id);
                } else {
                    METRICS.inc_lenses_failed();
                    obs::emit_lens_finished(lens.id, duration_ms.unwrap_or(0), 0, Some(&error));
                }
                collected.stats.push(LensStat {
                    lens_id: lens.id,
                    lens_name: lens.name.to_string(),
                    status: LensStatus::Failed,
                    issue_count: 0,
                    error_code: Some(error.code),
                    error_message: Some(error.message.clone()),
                    duration_ms,
                });
                collected.failed.push(FailedLens {
                    lens_id: lens.id,
                    lens_name: lens.name.to_string(),
                    error_code: error.code,
                    error_message: error.message.clone(),
                });
                collected.last_error = Some(error);
            }
        }
    }

    collected
}

fn build_summary(summaries: &[String], failed: &[FailedLens]) -> String {
    let mut summary = summaries.join("\n\n");
    if !failed.is_empty() {
        let list = failed
            .iter()
            .map(|f| format!("{} ({})", f.lens_name, f.error_code))
            .collect::<Vec<_>>()
            .join(", ");
        if !summary.is_empty() {
            summary.push_str("\n\n");
        }
        summary.push_str(&format!("Partial analysis: {list} failed."));
    }
    summary
}
