//! End-to-end review runs against the scripted model client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lensrev_core::{
    AgentStreamEvent, ChannelSink, CollectingSink, ErrorCode, EventKind, FileDiff, FileOperation,
    FocusTarget, LensId, LensStatus, Orchestrator, ParsedDiff, ReviewError, ReviewIssue,
    ReviewOptions, RunOptions, Severity,
};
use lensrev_domain::fakes::ScriptedModelClient;
use lensrev_domain::{GenerateRequest, ModelClient};
use tokio_util::sync::CancellationToken;

fn diff() -> ParsedDiff {
    ParsedDiff::new(vec![
        FileDiff::from_raw(
            "src/auth.rs",
            FileOperation::Modify,
            "@@ -10,3 +10,4 @@\n fn login() {\n+    let q = format!(\"SELECT * FROM users WHERE name = '{}'\", name);\n }\n",
        ),
        FileDiff::from_raw("src/util.rs", FileOperation::Add, "+pub fn helper() {}\n"),
    ])
}

fn issue(severity: Severity, file: &str, line: u32, title: &str) -> ReviewIssue {
    ReviewIssue::new(severity, file, title)
        .with_lines(line, line)
        .with_narrative("the change introduces it", "handle it")
}

fn lenses(ids: &[&str]) -> ReviewOptions {
    ReviewOptions {
        lenses: Some(ids.iter().map(|s| s.to_string()).collect()),
        ..ReviewOptions::default()
    }
}

fn run(concurrency: usize) -> RunOptions {
    RunOptions {
        concurrency,
        ..RunOptions::default()
    }
}

fn count(sink: &CollectingSink, event_type: &str) -> usize {
    sink.event_types().iter().filter(|t| **t == event_type).count()
}

// ============================================================================
// START
// ============================================================================

#[tokio::test]
async fn empty_diff_fails_with_no_diff_and_emits_nothing() {
    let client = Arc::new(ScriptedModelClient::new());
    let sink = Arc::new(CollectingSink::new());
    let orchestrator = Orchestrator::new(client.clone());

    let err = orchestrator
        .orchestrate(ParsedDiff::default(), lenses(&["correctness"]), sink.clone(), run(3))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::NoDiff);
    assert!(sink.is_empty());
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn only_unknown_lenses_fails_with_no_lenses() {
    let client = Arc::new(ScriptedModelClient::new());
    let sink = Arc::new(CollectingSink::new());

    let err = Orchestrator::new(client.clone())
        .orchestrate(diff(), lenses(&["style", "vibes"]), sink.clone(), run(3))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::NoLenses);
    assert!(sink.is_empty());
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn no_requested_lenses_runs_the_default_lens() {
    let client = Arc::new(ScriptedModelClient::new());
    let sink = Arc::new(CollectingSink::new());

    let outcome = Orchestrator::new(client.clone())
        .orchestrate(diff(), ReviewOptions::default(), sink, run(3))
        .await
        .unwrap();

    assert_eq!(outcome.lens_stats.len(), 1);
    assert_eq!(outcome.lens_stats[0].lens_id, LensId::Correctness);
    assert_eq!(client.call_labels(), vec!["correctness".to_string()]);
}

// ============================================================================
// EVENT PROTOCOL
// ============================================================================

#[tokio::test]
async fn concurrency_clamps_to_lens_count_and_clean_run_is_ok() {
    let client = Arc::new(ScriptedModelClient::new());
    let sink = Arc::new(CollectingSink::new());

    let outcome = Orchestrator::new(client)
        .orchestrate(diff(), lenses(&["correctness", "security"]), sink.clone(), run(10))
        .await
        .unwrap();

    assert!(outcome.issues.is_empty());
    assert_eq!(outcome.lens_stats.len(), 2);
    assert!(outcome.failed_lenses.is_empty());
    assert!(!outcome.summary.contains("Partial analysis:"));

    let events = sink.events();
    match &events[0].kind {
        EventKind::OrchestratorStart { agents, concurrency } => {
            assert_eq!(*concurrency, 2);
            let ids: Vec<LensId> = agents.iter().map(|a| a.id).collect();
            assert_eq!(ids, vec![LensId::Correctness, LensId::Security]);
        }
        other => panic!("expected orchestrator_start, got {other:?}"),
    }
}

#[tokio::test]
async fn events_follow_the_run_lifecycle() {
    let client = Arc::new(ScriptedModelClient::new());
    let sink = Arc::new(CollectingSink::new());

    let outcome = Orchestrator::new(client)
        .orchestrate(diff(), lenses(&["correctness", "security"]), sink.clone(), run(1))
        .await
        .unwrap();

    let types = sink.event_types();
    assert_eq!(
        &types[..3],
        &["orchestrator_start", "agent_queued", "agent_queued"]
    );
    assert_eq!(types.last(), Some(&"orchestrator_complete"));
    assert_eq!(count(&sink, "agent_start"), 2);
    assert_eq!(count(&sink, "agent_thinking"), 2);
    assert_eq!(count(&sink, "agent_complete"), 2);

    let events = sink.events();
    for (i, event) in events[1..3].iter().enumerate() {
        match &event.kind {
            EventKind::AgentQueued { position, total, .. } => {
                assert_eq!(*position, i + 1);
                assert_eq!(*total, 2);
            }
            other => panic!("expected agent_queued, got {other:?}"),
        }
    }

    // Every event shares the run's trace; lens events hang off the root span.
    let root_span = events[0].span_id.clone();
    assert!(events.iter().all(|e| e.trace_id == outcome.trace_id));
    let agent_start = events
        .iter()
        .find(|e| e.event_type() == "agent_start")
        .unwrap();
    assert_eq!(agent_start.parent_span_id.as_deref(), Some(root_span.as_str()));

    match &events.last().unwrap().kind {
        EventKind::OrchestratorComplete {
            total_issues,
            lens_stats,
            files_analyzed,
            ..
        } => {
            assert_eq!(*total_issues, 0);
            assert_eq!(lens_stats.len(), 2);
            assert_eq!(*files_analyzed, 2);
        }
        other => panic!("expected orchestrator_complete, got {other:?}"),
    }
}

#[tokio::test]
async fn channel_sink_streams_sse_frames() {
    let client = Arc::new(ScriptedModelClient::new());
    let (sink, mut rx) = ChannelSink::new();

    Orchestrator::new(client)
        .orchestrate(diff(), lenses(&["tests"]), Arc::new(sink), run(1))
        .await
        .unwrap();

    let mut frames = Vec::new();
    while let Ok(event) = rx.try_recv() {
        frames.push(event.to_sse_frame().unwrap());
    }
    assert!(frames[0].starts_with("event: orchestrator_start\ndata: "));
    assert!(frames
        .last()
        .unwrap()
        .starts_with("event: orchestrator_complete\ndata: "));

    let data = frames[0]
        .lines()
        .nth(1)
        .and_then(|l| l.strip_prefix("data: "))
        .unwrap();
    let event: AgentStreamEvent = serde_json::from_str(data).unwrap();
    assert_eq!(event.event_type(), "orchestrator_start");
}

// ============================================================================
// PARTIAL FAILURE
// ============================================================================

#[tokio::test]
async fn failed_lens_keeps_other_lens_issues() {
    let client = Arc::new(
        ScriptedModelClient::new()
            .with_findings(
                "correctness",
                "Found an injection",
                vec![issue(Severity::High, "src/auth.rs", 11, "SQL built by string formatting")],
            )
            .with_error("security", ReviewError::model("schema mismatch")),
    );
    let sink = Arc::new(CollectingSink::new());

    let outcome = Orchestrator::new(client)
        .orchestrate(diff(), lenses(&["correctness", "security"]), sink.clone(), run(2))
        .await
        .unwrap();

    assert_eq!(outcome.issues.len(), 1);
    assert_eq!(outcome.failed_lenses.len(), 1);
    assert_eq!(outcome.failed_lenses[0].lens_id, LensId::Security);
    assert_eq!(outcome.failed_lenses[0].error_code, ErrorCode::ModelError);
    assert!(outcome.summary.contains("**Correctness**: Found an injection"));
    assert!(outcome
        .summary
        .contains("Partial analysis: Security (MODEL_ERROR) failed."));
    assert!(outcome.is_partial());

    assert_eq!(outcome.lens_stats[0].status, LensStatus::Success);
    assert_eq!(outcome.lens_stats[0].issue_count, 1);
    assert_eq!(outcome.lens_stats[1].status, LensStatus::Failed);
    assert_eq!(outcome.lens_stats[1].error_code, Some(ErrorCode::ModelError));
    assert_eq!(count(&sink, "agent_error"), 1);
}

#[tokio::test]
async fn malformed_issue_does_not_discard_the_lens() {
    let good = serde_json::to_value(issue(
        Severity::High,
        "src/auth.rs",
        11,
        "SQL built by string formatting",
    ))
    .unwrap();
    let reply = serde_json::json!({
        "summary": "One injection, one garbled entry",
        "issues": [
            good,
            {
                "severity": "critical",
                "title": "Password compared in variable time",
                "file": "src/auth.rs",
                "startLine": 12,
                "rationale": "timing leaks the hash",
                "recommendation": "use a constant-time compare"
            },
            { "severity": "high", "rationale": "no title or file" }
        ]
    });
    let client = Arc::new(ScriptedModelClient::new().with_reply("correctness", reply));
    let sink = Arc::new(CollectingSink::new());
    let options = RunOptions {
        partial_on_all_failed: true,
        ..run(1)
    };

    let outcome = Orchestrator::new(client)
        .orchestrate(diff(), lenses(&["correctness"]), sink.clone(), options)
        .await
        .unwrap();

    assert!(outcome.failed_lenses.is_empty());
    assert_eq!(outcome.lens_stats[0].status, LensStatus::Success);
    assert_eq!(outcome.lens_stats[0].issue_count, 2);
    let severities: Vec<_> = outcome.issues.iter().map(|i| i.severity).collect();
    assert_eq!(severities, vec![Severity::Blocker, Severity::High]);
    assert_eq!(count(&sink, "agent_error"), 0);
}

#[tokio::test]
async fn all_failed_returns_last_lens_error() {
    let client = Arc::new(
        ScriptedModelClient::new()
            .with_error("correctness", ReviewError::network("connection reset"))
            .with_error("security", ReviewError::rate_limited("slow down")),
    );
    let sink = Arc::new(CollectingSink::new());

    let err = Orchestrator::new(client)
        .orchestrate(diff(), lenses(&["correctness", "security"]), sink.clone(), run(2))
        .await
        .unwrap_err();

    assert_eq!(err, ReviewError::rate_limited("slow down"));
    assert_eq!(count(&sink, "agent_error"), 2);
    assert_eq!(count(&sink, "orchestrator_complete"), 1);
}

#[tokio::test]
async fn partial_on_all_failed_returns_ok() {
    let client = Arc::new(
        ScriptedModelClient::new()
            .with_error("correctness", ReviewError::invalid_api_key("bad key"))
            .with_error("security", ReviewError::invalid_api_key("bad key")),
    );
    let sink = Arc::new(CollectingSink::new());
    let options = RunOptions {
        concurrency: 2,
        partial_on_all_failed: true,
        ..RunOptions::default()
    };

    let outcome = Orchestrator::new(client)
        .orchestrate(diff(), lenses(&["correctness", "security"]), sink, options)
        .await
        .unwrap();

    assert!(outcome.issues.is_empty());
    assert_eq!(outcome.failed_lenses.len(), 2);
    assert!(outcome.summary.starts_with("Partial analysis:"));
}

#[tokio::test]
async fn panicking_lens_is_captured_as_unknown_error() {
    let client = Arc::new(
        ScriptedModelClient::new()
            .with_panic("performance", "client blew up")
            .with_findings(
                "tests",
                "Missing coverage",
                vec![issue(Severity::Medium, "src/util.rs", 1, "helper has no test")],
            ),
    );
    let sink = Arc::new(CollectingSink::new());

    let outcome = Orchestrator::new(client)
        .orchestrate(diff(), lenses(&["performance", "tests"]), sink.clone(), run(2))
        .await
        .unwrap();

    assert_eq!(outcome.issues.len(), 1);
    assert_eq!(outcome.failed_lenses.len(), 1);
    assert_eq!(outcome.failed_lenses[0].error_code, ErrorCode::Unknown);
    assert_eq!(outcome.failed_lenses[0].error_message, "client blew up");

    let errors: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::AgentError { agent, error } => Some((agent.id, error.code)),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![(LensId::Performance, ErrorCode::Unknown)]);
}

#[tokio::test]
async fn severity_filter_removing_everything_is_still_ok() {
    let client = Arc::new(ScriptedModelClient::new().with_findings(
        "correctness",
        "Only nits",
        vec![issue(Severity::Nit, "src/util.rs", 1, "trailing whitespace")],
    ));
    let options = ReviewOptions {
        min_severity: Some(Severity::High),
        ..lenses(&["correctness"])
    };

    let outcome = Orchestrator::new(client)
        .orchestrate(diff(), options, Arc::new(CollectingSink::new()), run(1))
        .await
        .unwrap();

    assert!(outcome.issues.is_empty());
    assert!(outcome.failed_lenses.is_empty());
    assert_eq!(outcome.lens_stats[0].issue_count, 1);
}

// ============================================================================
// CANCELLATION
// ============================================================================

/// Cancels the run the first time it is called.
struct CancellingClient {
    cancel: CancellationToken,
    inner: ScriptedModelClient,
}

#[async_trait]
impl ModelClient for CancellingClient {
    async fn generate(&self, request: GenerateRequest) -> lensrev_domain::Result<serde_json::Value> {
        self.cancel.cancel();
        self.inner.generate(request).await
    }
}

#[tokio::test]
async fn cancellation_mid_run_marks_unstarted_lenses_failed() {
    let cancel = CancellationToken::new();
    let client = Arc::new(CancellingClient {
        cancel: cancel.clone(),
        inner: ScriptedModelClient::new(),
    });
    let sink = Arc::new(CollectingSink::new());
    let options = RunOptions {
        concurrency: 1,
        cancel: Some(cancel),
        ..RunOptions::default()
    };

    let outcome = Orchestrator::new(client.clone())
        .orchestrate(
            diff(),
            lenses(&["correctness", "security", "performance"]),
            sink.clone(),
            options,
        )
        .await
        .unwrap();

    assert_eq!(client.inner.call_labels(), vec!["correctness".to_string()]);
    assert_eq!(outcome.lens_stats.len(), 3);
    assert_eq!(outcome.lens_stats[0].status, LensStatus::Success);

    let failed: Vec<(LensId, ErrorCode)> = outcome
        .failed_lenses
        .iter()
        .map(|f| (f.lens_id, f.error_code))
        .collect();
    assert_eq!(
        failed,
        vec![
            (LensId::Security, ErrorCode::NotStarted),
            (LensId::Performance, ErrorCode::NotStarted),
        ]
    );
    assert_eq!(count(&sink, "agent_start"), 1);
    assert_eq!(count(&sink, "agent_queued"), 3);
}

#[tokio::test]
async fn fail_fast_stops_claiming_after_first_failure() {
    let client = Arc::new(
        ScriptedModelClient::new().with_error("correctness", ReviewError::rate_limited("429")),
    );
    let options = RunOptions {
        concurrency: 1,
        fail_fast: true,
        partial_on_all_failed: true,
        cancel: None,
    };

    let outcome = Orchestrator::new(client.clone())
        .orchestrate(
            diff(),
            lenses(&["correctness", "security", "tests"]),
            Arc::new(CollectingSink::new()),
            options,
        )
        .await
        .unwrap();

    assert_eq!(client.calls().len(), 1);
    let codes: Vec<ErrorCode> = outcome.failed_lenses.iter().map(|f| f.error_code).collect();
    assert_eq!(
        codes,
        vec![ErrorCode::RateLimited, ErrorCode::NotStarted, ErrorCode::NotStarted]
    );
}

#[tokio::test]
async fn pre_cancelled_run_fails_with_not_started() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let client = Arc::new(ScriptedModelClient::new());
    let options = RunOptions {
        cancel: Some(cancel),
        ..RunOptions::default()
    };

    let err = Orchestrator::new(client.clone())
        .orchestrate(diff(), lenses(&["correctness"]), Arc::new(CollectingSink::new()), options)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::NotStarted);
    assert!(client.calls().is_empty());
}

// ============================================================================
// PROFILES, AGGREGATION, FOCUS
// ============================================================================

#[tokio::test]
async fn profile_supplies_lenses_and_threshold() {
    let client = Arc::new(ScriptedModelClient::new().with_findings(
        "correctness",
        "Two findings",
        vec![
            issue(Severity::Low, "src/util.rs", 1, "unused parameter"),
            issue(Severity::High, "src/auth.rs", 11, "query built from input"),
        ],
    ));
    let quick = ReviewOptions {
        profile: Some("quick".to_string()),
        ..ReviewOptions::default()
    };

    let outcome = Orchestrator::new(client.clone())
        .orchestrate(diff(), quick.clone(), Arc::new(CollectingSink::new()), run(3))
        .await
        .unwrap();
    assert_eq!(client.call_labels(), vec!["correctness".to_string()]);
    assert_eq!(outcome.issues.len(), 1);
    assert_eq!(outcome.issues[0].severity, Severity::High);

    let override_threshold = ReviewOptions {
        min_severity: Some(Severity::Low),
        ..quick
    };
    let outcome = Orchestrator::new(client)
        .orchestrate(diff(), override_threshold, Arc::new(CollectingSink::new()), run(3))
        .await
        .unwrap();
    assert_eq!(outcome.issues.len(), 2);
}

#[tokio::test]
async fn unknown_profile_is_ignored() {
    let client = Arc::new(ScriptedModelClient::new());
    let options = ReviewOptions {
        profile: Some("paranoid".to_string()),
        ..ReviewOptions::default()
    };

    let outcome = Orchestrator::new(client)
        .orchestrate(diff(), options, Arc::new(CollectingSink::new()), run(3))
        .await
        .unwrap();
    assert_eq!(outcome.lens_stats.len(), 1);
}

#[tokio::test]
async fn issues_across_lenses_are_deduped_and_sorted() {
    let client = Arc::new(
        ScriptedModelClient::new()
            .with_findings(
                "correctness",
                "c",
                vec![
                    issue(Severity::Low, "src/util.rs", 1, "helper is unused"),
                    issue(Severity::High, "src/auth.rs", 11, "SQL injection in login"),
                ],
            )
            .with_findings(
                "security",
                "s",
                vec![
                    issue(Severity::Blocker, "src/auth.rs", 11, "SQL injection in login"),
                    issue(Severity::Medium, "src/auth.rs", 10, "login lacks rate limiting"),
                    ReviewIssue::new(Severity::Blocker, "src/auth.rs", "no narrative"),
                ],
            ),
    );

    let outcome = Orchestrator::new(client)
        .orchestrate(
            diff(),
            lenses(&["correctness", "security"]),
            Arc::new(CollectingSink::new()),
            run(2),
        )
        .await
        .unwrap();

    let got: Vec<(Severity, &str)> = outcome
        .issues
        .iter()
        .map(|i| (i.severity, i.title.as_str()))
        .collect();
    assert_eq!(
        got,
        vec![
            (Severity::High, "SQL injection in login"),
            (Severity::Medium, "login lacks rate limiting"),
            (Severity::Low, "helper is unused"),
        ]
    );
    assert!(outcome.issues.iter().all(|i| !i.id.is_empty()));
}

#[tokio::test]
async fn focus_file_emits_tool_events_per_lens() {
    let client = Arc::new(ScriptedModelClient::new());
    let sink = Arc::new(CollectingSink::new());
    let options = ReviewOptions {
        focus: Some(FocusTarget::file("src/auth.rs").with_lines(10, 11)),
        ..lenses(&["correctness", "security"])
    };

    Orchestrator::new(client)
        .orchestrate(diff(), options, sink.clone(), run(2))
        .await
        .unwrap();

    assert_eq!(count(&sink, "tool_call"), 2);
    assert_eq!(count(&sink, "tool_result"), 2);
    let summary = sink
        .events()
        .into_iter()
        .find_map(|e| match e.kind {
            EventKind::ToolResult { summary, .. } => Some(summary),
            _ => None,
        })
        .unwrap();
    assert_eq!(summary, "Read 2 lines from src/auth.rs (lines 10-11)");
}

#[tokio::test(start_paused = true)]
async fn lens_calls_respect_concurrency_limit() {
    let mut client = ScriptedModelClient::new();
    for id in LensId::ALL {
        client = client.with_latency(id.as_str(), Duration::from_millis(50));
    }
    let client = Arc::new(client);
    let options = ReviewOptions {
        profile: Some("thorough".to_string()),
        ..ReviewOptions::default()
    };

    let outcome = Orchestrator::new(client.clone())
        .orchestrate(diff(), options, Arc::new(CollectingSink::new()), run(2))
        .await
        .unwrap();

    assert_eq!(outcome.lens_stats.len(), 5);
    assert_eq!(client.calls().len(), 5);
    assert_eq!(client.peak_in_flight(), 2);
    assert!(outcome
        .lens_stats
        .iter()
        .all(|s| s.duration_ms == Some(50)));
}
