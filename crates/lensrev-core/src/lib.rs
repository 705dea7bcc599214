//! lensrev Core Library
//!
//! Coordinates independent review lenses over one parsed diff:
//! - [`lenses`] - lens registry and review profiles
//! - [`executor`] - generic bounded-concurrency executor with cooperative cancellation
//! - [`runner`] - one lens, one structured model call
//! - [`aggregate`] - dedupe → severity filter → completeness check → severity sort
//! - [`orchestrator`] - the end-to-end run and its event protocol
//! - [`events`] - `AgentStreamEvent` and event sinks

pub mod aggregate;
pub mod config;
pub mod events;
pub mod executor;
pub mod lenses;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod runner;
pub mod telemetry;

pub use aggregate::{aggregate_issues, AggregatedIssues};
pub use config::{ConfigError, ReviewConfig};
pub use events::{
    AgentRef, AgentStreamEvent, ChannelSink, CollectingSink, EventEmitter, EventKind, EventSink,
};
pub use executor::{run_bounded, Settled, TaskFailure};
pub use lenses::{resolve_lenses, Lens, ReviewProfile, SeverityRubric};
pub use orchestrator::{
    FailedLens, LensStat, LensStatus, OrchestrationOutcome, Orchestrator, ReviewOptions,
    RunOptions,
};
pub use runner::{run_lens, AnalysisContext, FocusTarget, LensReport};

pub use lensrev_domain::{
    DiffHunk, DiffStats, ErrorCode, Evidence, FileDiff, FileOperation, LensId, ModelClient,
    ParsedDiff, ReviewError, ReviewIssue, Severity,
};

pub use metrics::METRICS;
pub use obs::{
    emit_aggregation, emit_lens_finished, emit_lens_skipped, emit_review_finished,
    emit_review_started, ReviewSpan,
};
pub use telemetry::init_tracing;

/// lensrev version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
