//! Live progress events for a review run.
//!
//! Events are a side channel: the orchestrator writes them in the order
//! things happen and never reads them back. The final result always comes
//! from the returned [`OrchestrationOutcome`](crate::OrchestrationOutcome).

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use lensrev_domain::{LensId, ReviewError, TraceContext};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::lenses::Lens;
use crate::metrics::METRICS;
use crate::orchestrator::LensStat;

/// The lens an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRef {
    pub id: LensId,
    pub name: String,
}

impl From<&Lens> for AgentRef {
    fn from(lens: &Lens) -> Self {
        Self {
            id: lens.id,
            name: lens.name.to_string(),
        }
    }
}

// ============================================================================
// EVENT TYPES
// ============================================================================

/// Payload of one stream event, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    #[serde(rename_all = "camelCase")]
    OrchestratorStart {
        agents: Vec<AgentRef>,
        concurrency: usize,
    },

    #[serde(rename_all = "camelCase")]
    AgentQueued {
        agent: AgentRef,
        /// 1-based.
        position: usize,
        total: usize,
    },

    #[serde(rename_all = "camelCase")]
    AgentStart { agent: AgentRef },

    #[serde(rename_all = "camelCase")]
    AgentThinking { agent: AgentRef, thought: String },

    #[serde(rename_all = "camelCase")]
    ToolCall {
        agent: AgentRef,
        tool: String,
        input: serde_json::Value,
    },

    #[serde(rename_all = "camelCase")]
    ToolResult {
        agent: AgentRef,
        tool: String,
        summary: String,
    },

    #[serde(rename_all = "camelCase")]
    AgentError { agent: AgentRef, error: ReviewError },

    #[serde(rename_all = "camelCase")]
    AgentComplete { agent: AgentRef, issue_count: usize },

    #[serde(rename_all = "camelCase")]
    OrchestratorComplete {
        summary: String,
        total_issues: usize,
        lens_stats: Vec<LensStat>,
        files_analyzed: usize,
    },
}

impl EventKind {
    /// Wire name of the variant, as written in the `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::OrchestratorStart { .. } => "orchestrator_start",
            EventKind::AgentQueued { .. } => "agent_queued",
            EventKind::AgentStart { .. } => "agent_start",
            EventKind::AgentThinking { .. } => "agent_thinking",
            EventKind::ToolCall { .. } => "tool_call",
            EventKind::ToolResult { .. } => "tool_result",
            EventKind::AgentError { .. } => "agent_error",
            EventKind::AgentComplete { .. } => "agent_complete",
            EventKind::OrchestratorComplete { .. } => "orchestrator_complete",
        }
    }

    /// The lens the event concerns, if it concerns exactly one.
    pub fn agent(&self) -> Option<&AgentRef> {
        match self {
            EventKind::AgentQueued { agent, .. }
            | EventKind::AgentStart { agent }
            | EventKind::AgentThinking { agent, .. }
            | EventKind::ToolCall { agent, .. }
            | EventKind::ToolResult { agent, .. }
            | EventKind::AgentError { agent, .. }
            | EventKind::AgentComplete { agent, .. } => Some(agent),
            EventKind::OrchestratorStart { .. } | EventKind::OrchestratorComplete { .. } => None,
        }
    }
}

/// One moment in a review run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStreamEvent {
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl AgentStreamEvent {
    pub fn new(trace: &TraceContext, kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            trace_id: trace.trace_id.clone(),
            span_id: trace.span_id.clone(),
            parent_span_id: trace.parent_span_id.clone(),
            kind,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Server-sent-events frame: `event: <type>\ndata: <json>\n\n`.
    pub fn to_sse_frame(&self) -> serde_json::Result<String> {
        let data = serde_json::to_string(self)?;
        Ok(format!("event: {}\ndata: {}\n\n", self.event_type(), data))
    }
}

// ============================================================================
// SINKS
// ============================================================================

/// Receives events as they are emitted.
///
/// Called from concurrently running lenses, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn send(&self, event: AgentStreamEvent);
}

impl<F> EventSink for F
where
    F: Fn(AgentStreamEvent) + Send + Sync,
{
    fn send(&self, event: AgentStreamEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded tokio channel, for streaming transports.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AgentStreamEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AgentStreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: AgentStreamEvent) {
        if self.tx.send(event).is_err() {
            trace!("event receiver dropped; discarding event");
        }
    }
}

/// Buffers every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<AgentStreamEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AgentStreamEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| e.event_type())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectingSink {
    fn send(&self, event: AgentStreamEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

/// Stamps events with a span and hands them to the run's sink.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
    trace: TraceContext,
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>, trace: TraceContext) -> Self {
        Self { sink, trace }
    }

    /// Emitter for a child span in the same trace.
    pub fn child(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            trace: self.trace.child(),
        }
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn emit(&self, kind: EventKind) {
        let event = AgentStreamEvent::new(&self.trace, kind);
        debug!(
            event_type = event.event_type(),
            trace_id = %event.trace_id,
            span_id = %event.span_id,
            "stream event"
        );
        METRICS.inc_events_emitted();
        self.sink.send(event);
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}
