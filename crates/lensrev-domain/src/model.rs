//! The structured-generation capability a lens calls.
//!
//! Provider clients (HTTP, local runtimes, test doubles) implement
//! [`ModelClient`]. The orchestration engine shares one client read-only
//! across every concurrent lens call, hence the `Send + Sync` bound.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Correlation identifiers carried by a model call and by stream events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    /// Shared by every call in one review run.
    pub trace_id: String,
    /// Unique to this call.
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
}

impl TraceContext {
    /// Start a new trace with a fresh root span.
    pub fn root() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
            parent_span_id: None,
        }
    }

    /// A new span in the same trace, parented to `self`.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            parent_span_id: Some(self.span_id.clone()),
        }
    }
}

fn new_span_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..16].to_string()
}

/// Name and JSON schema of the result a caller expects back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputShape {
    pub name: String,
    pub schema: serde_json::Value,
}

/// One structured-generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Caller-chosen label (the lens id for review calls); used for logging and routing.
    pub label: String,
    pub prompt: String,
    pub shape: OutputShape,
    pub trace: TraceContext,
}

/// Structured generation backed by a language model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Generate a JSON value matching `request.shape`.
    ///
    /// Errors must already be classified (`NETWORK_ERROR`, `RATE_LIMITED`,
    /// `INVALID_API_KEY`, `MODEL_ERROR`); callers propagate the code unchanged.
    async fn generate(&self, request: GenerateRequest) -> Result<serde_json::Value>;
}
