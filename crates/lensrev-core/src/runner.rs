//! Lens analysis runner: one lens, one structured model call.
//!
//! The runner renders the lens prompt, issues exactly one `generate` call,
//! and translates the reply into a [`LensReport`]. Errors from the model
//! client are returned with their code unchanged; there is no retry here.

use lensrev_domain::{
    FileDiff, GenerateRequest, ModelClient, OutputShape, ParsedDiff, ReviewError, ReviewIssue,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::events::{AgentRef, EventEmitter, EventKind};
use crate::lenses::Lens;

/// Name of the synthetic tool reported for focus-file reads.
pub const READ_FILE_TOOL: &str = "read_file";

/// Characters of the issue fingerprint used in generated ids.
const GENERATED_ID_LEN: usize = 12;

/// The file (and optionally lines) a review is centred on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusTarget {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
}

impl FocusTarget {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            file: path.into(),
            start_line: None,
            end_line: None,
        }
    }

    pub fn with_lines(mut self, start: u32, end: u32) -> Self {
        self.start_line = Some(start.min(end));
        self.end_line = Some(start.max(end));
        self
    }
}

/// Extra inputs shared by every lens in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisContext {
    pub project_context: Option<String>,
    pub focus: Option<FocusTarget>,
}

/// A lens's successful output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LensReport {
    pub lens_id: lensrev_domain::LensId,
    pub lens_name: String,
    pub summary: String,
    pub issues: Vec<ReviewIssue>,
    pub duration_ms: u64,
    /// Issues in the reply that could not be decoded and were dropped.
    #[serde(default)]
    pub malformed_dropped: usize,
}

/// Shape of the model's reply. Issues are decoded one at a time so that a
/// single bad entry does not discard the rest.
#[derive(Debug, Deserialize)]
struct LensFindings {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    issues: Vec<serde_json::Value>,
}

/// Run one lens over the diff.
#[instrument(skip_all, fields(lens = %lens.id, span_id = %emitter.trace().span_id))]
pub async fn run_lens(
    client: &dyn ModelClient,
    lens: &Lens,
    diff: &ParsedDiff,
    context: &AnalysisContext,
    emitter: &EventEmitter,
) -> Result<LensReport, ReviewError> {
    let started = Instant::now();
    let agent = AgentRef::from(lens);

    emitter.emit(EventKind::AgentThinking {
        agent: agent.clone(),
        thought: format!(
            "Reviewing {} {} for {}",
            diff.file_count(),
            if diff.file_count() == 1 { "file" } else { "files" },
            lens.description.to_lowercase()
        ),
    });

    if let Some(focus) = &context.focus {
        if let Some(file) = diff.find_file(&focus.file) {
            emit_focus_read(emitter, &agent, focus, file);
        }
    }

    let request = GenerateRequest {
        label: lens.id.to_string(),
        prompt: build_lens_prompt(lens, diff, context.project_context.as_deref()),
        shape: findings_shape(),
        trace: emitter.trace().clone(),
    };
    let value = client.generate(request).await?;
    let findings: LensFindings = serde_json::from_value(value)?;

    let received = findings.issues.len();
    let issues: Vec<ReviewIssue> = findings
        .issues
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| decode_issue(lens, index, value))
        .collect();
    let malformed_dropped = received - issues.len();
    let duration_ms = started.elapsed().as_millis() as u64;
    debug!(issues = issues.len(), malformed_dropped, duration_ms, "lens returned findings");

    Ok(LensReport {
        lens_id: lens.id,
        lens_name: lens.name.to_string(),
        summary: findings.summary.trim().to_string(),
        issues,
        duration_ms,
        malformed_dropped,
    })
}

fn decode_issue(lens: &Lens, index: usize, value: serde_json::Value) -> Option<ReviewIssue> {
    match serde_json::from_value::<ReviewIssue>(value) {
        Ok(issue) => Some(assign_id(lens, issue.clamp_confidence())),
        Err(err) => {
            warn!(lens = %lens.id, index, error = %err, "dropping malformed issue");
            None
        }
    }
}

fn emit_focus_read(emitter: &EventEmitter, agent: &AgentRef, focus: &FocusTarget, file: &FileDiff) {
    let (lines_read, range) = match (focus.start_line, focus.end_line) {
        (Some(s), Some(e)) => {
            let (s, e) = (s.min(e), s.max(e));
            ((e - s + 1) as usize, format!("lines {s}-{e}"))
        }
        (Some(l), None) | (None, Some(l)) => (1, format!("line {l}")),
        (None, None) => (file.line_count(), "whole file".to_string()),
    };

    emitter.emit(EventKind::ToolCall {
        agent: agent.clone(),
        tool: READ_FILE_TOOL.to_string(),
        input: json!({
            "path": file.path,
            "startLine": focus.start_line,
            "endLine": focus.end_line,
        }),
    });
    emitter.emit(EventKind::ToolResult {
        agent: agent.clone(),
        tool: READ_FILE_TOOL.to_string(),
        summary: format!("Read {lines_read} lines from {} ({range})", file.path),
    });
}

fn assign_id(lens: &Lens, mut issue: ReviewIssue) -> ReviewIssue {
    if issue.id.trim().is_empty() {
        let fingerprint = issue.fingerprint();
        issue.id = format!("{}-{}", lens.id, &fingerprint[..GENERATED_ID_LEN]);
    }
    issue
}

/// Render a lens's prompt template against the diff.
pub fn build_lens_prompt(lens: &Lens, diff: &ParsedDiff, project_context: Option<&str>) -> String {
    let context = project_context
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("(none provided)");

    render_template(lens.prompt_template, |key| match key {
        "lens" => Some(lens.name.to_string()),
        "rubric" => Some(lens.rubric.render()),
        "context" => Some(context.to_string()),
        "files" => Some(render_file_list(diff)),
        "diff" => Some(render_diff(diff)),
        _ => None,
    })
}

/// Substitute `{{key}}` placeholders in a single pass.
///
/// Substituted values are never rescanned; unknown keys are left verbatim.
fn render_template(template: &str, mut value_for: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        match value_for(&after[..close]) {
            Some(value) => {
                out.push_str(&value);
                rest = &after[close + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn render_file_list(diff: &ParsedDiff) -> String {
    diff.files
        .iter()
        .map(|f| match &f.old_path {
            Some(old) => format!("- {} (renamed from {})", f.path, old),
            None => format!("- {} ({})", f.path, f.operation),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_diff(diff: &ParsedDiff) -> String {
    diff.files
        .iter()
        .map(|f| {
            let body = if f.raw.trim().is_empty() {
                f.hunks
                    .iter()
                    .map(|h| h.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                f.raw.clone()
            };
            format!(
                "### {} ({}, +{} -{})\n```diff\n{}\n```",
                f.path,
                f.operation,
                f.additions,
                f.deletions,
                body.trim_end()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// JSON schema of the `{summary, issues}` reply every lens expects.
pub fn findings_shape() -> OutputShape {
    OutputShape {
        name: "lens_findings".to_string(),
        schema: json!({
            "type": "object",
            "required": ["summary", "issues"],
            "properties": {
                "summary": { "type": "string" },
                "issues": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["severity", "title", "file", "rationale", "recommendation"],
                        "properties": {
                            "severity": { "enum": ["blocker", "high", "medium", "low", "nit"] },
                            "category": { "type": "string" },
                            "title": { "type": "string" },
                            "file": { "type": "string" },
                            "startLine": { "type": "integer" },
                            "endLine": { "type": "integer" },
                            "rationale": { "type": "string" },
                            "recommendation": { "type": "string" },
                            "suggestedPatch": { "type": "string" },
                            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                            "symptom": { "type": "string" },
                            "impact": { "type": "string" },
                            "evidence": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "kind": { "type": "string" },
                                        "title": { "type": "string" },
                                        "sourceId": { "type": "string" },
                                        "file": { "type": "string" },
                                        "excerpt": { "type": "string" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }),
    }
}
