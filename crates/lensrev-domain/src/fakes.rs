//! In-memory fakes for the model-client seam (testing only)
//!
//! Provides `ScriptedModelClient`, which answers each call according to a
//! per-label script and records what it was asked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{Result, ReviewError};
use crate::issue::ReviewIssue;
use crate::model::{GenerateRequest, ModelClient};

/// How the fake answers a call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Json(serde_json::Value),
    Error(ReviewError),
    /// Panic inside `generate`, simulating a crashing client.
    Panic(String),
}

#[derive(Debug, Clone)]
struct Script {
    reply: ScriptedReply,
    latency: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            reply: ScriptedReply::Json(ScriptedModelClient::findings("No findings.", vec![])),
            latency: Duration::ZERO,
        }
    }
}

/// Scripted model client keyed by `GenerateRequest::label`.
///
/// Unscripted labels answer with an empty findings payload.
#[derive(Debug, Default)]
pub struct ScriptedModelClient {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<GenerateRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// The findings payload shape a lens expects back.
    pub fn findings(summary: &str, issues: Vec<ReviewIssue>) -> serde_json::Value {
        json!({ "summary": summary, "issues": issues })
    }

    fn script(self, label: &str, update: impl FnOnce(&mut Script)) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            update(scripts.entry(label.to_string()).or_default());
        }
        self
    }

    pub fn with_reply(self, label: &str, value: serde_json::Value) -> Self {
        self.script(label, |s| s.reply = ScriptedReply::Json(value))
    }

    pub fn with_findings(self, label: &str, summary: &str, issues: Vec<ReviewIssue>) -> Self {
        self.with_reply(label, Self::findings(summary, issues))
    }

    pub fn with_error(self, label: &str, error: ReviewError) -> Self {
        self.script(label, |s| s.reply = ScriptedReply::Error(error))
    }

    pub fn with_panic(self, label: &str, message: &str) -> Self {
        let message = message.to_string();
        self.script(label, |s| s.reply = ScriptedReply::Panic(message))
    }

    /// Delay the reply for `label` (virtual under a paused tokio clock).
    pub fn with_latency(self, label: &str, latency: Duration) -> Self {
        self.script(label, |s| s.latency = latency)
    }

    /// Every request received, in arrival order.
    pub fn calls(&self) -> Vec<GenerateRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_labels(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.label).collect()
    }

    /// Highest number of calls that were in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn generate(&self, request: GenerateRequest) -> Result<serde_json::Value> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.label)
            .cloned()
            .unwrap_or_default();
        self.calls.lock().unwrap().push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        if !script.latency.is_zero() {
            tokio::time::sleep(script.latency).await;
        }

        match script.reply {
            ScriptedReply::Json(value) => Ok(value),
            ScriptedReply::Error(err) => Err(err),
            ScriptedReply::Panic(message) => panic!("{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OutputShape, TraceContext};
    use crate::severity::Severity;

    fn request(label: &str) -> GenerateRequest {
        GenerateRequest {
            label: label.to_string(),
            prompt: "p".to_string(),
            shape: OutputShape {
                name: "findings".to_string(),
                schema: json!({}),
            },
            trace: TraceContext::root(),
        }
    }

    #[tokio::test]
    async fn test_unscripted_label_returns_empty_findings() {
        let client = ScriptedModelClient::new();
        let value = client.generate(request("security")).await.unwrap();
        assert_eq!(value["issues"], json!([]));
        assert_eq!(client.call_labels(), vec!["security".to_string()]);
    }

    #[tokio::test]
    async fn test_scripted_error_and_findings() {
        let issue = ReviewIssue::new(Severity::High, "a.rs", "bug");
        let client = ScriptedModelClient::new()
            .with_findings("correctness", "one bug", vec![issue])
            .with_error("security", ReviewError::rate_limited("slow down"));

        let ok = client.generate(request("correctness")).await.unwrap();
        assert_eq!(ok["issues"].as_array().unwrap().len(), 1);

        let err = client.generate(request("security")).await.unwrap_err();
        assert_eq!(err, ReviewError::rate_limited("slow down"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_peak_in_flight_tracks_overlap() {
        let client = ScriptedModelClient::new()
            .with_latency("a", Duration::from_millis(50))
            .with_latency("b", Duration::from_millis(50));
        let (a, b) = tokio::join!(client.generate(request("a")), client.generate(request("b")));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(client.peak_in_flight(), 2);
    }
}
