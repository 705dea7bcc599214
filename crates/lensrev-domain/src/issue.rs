//! Review findings.

use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// A piece of supporting evidence attached to an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    /// Evidence kind, e.g. `"code"`, `"doc"`, `"test"`.
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub excerpt: String,
}

fn default_confidence() -> f32 {
    0.5
}

/// One finding reported by a lens.
///
/// Narrative fields default to empty so that malformed model output still
/// deserializes; the aggregator drops incomplete issues afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewIssue {
    #[serde(default)]
    pub id: String,
    pub severity: Severity,
    #[serde(default)]
    pub category: String,
    pub title: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_patch: Option<String>,
    /// Model confidence in `0.0..=1.0`.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub symptom: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

impl ReviewIssue {
    /// Minimal issue with no narrative; chain the `with_*` builders to fill it in.
    pub fn new(severity: Severity, file: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            severity,
            category: String::new(),
            title: title.into(),
            file: file.into(),
            start_line: None,
            end_line: None,
            rationale: String::new(),
            recommendation: String::new(),
            suggested_patch: None,
            confidence: default_confidence(),
            symptom: String::new(),
            impact: String::new(),
            evidence: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_lines(mut self, start: u32, end: u32) -> Self {
        self.start_line = Some(start);
        self.end_line = Some(end);
        self
    }

    pub fn with_narrative(
        mut self,
        rationale: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        self.rationale = rationale.into();
        self.recommendation = recommendation.into();
        self
    }

    /// Inclusive line range, normalised so that `start <= end`.
    ///
    /// A lone `start_line` or `end_line` is treated as a single-line range.
    pub fn line_range(&self) -> Option<(u32, u32)> {
        match (self.start_line, self.end_line) {
            (Some(s), Some(e)) => Some((s.min(e), s.max(e))),
            (Some(l), None) | (None, Some(l)) => Some((l, l)),
            (None, None) => None,
        }
    }

    /// Whether both issues point at overlapping lines.
    ///
    /// Two file-level issues (no lines) overlap; a file-level issue never
    /// overlaps a line-anchored one.
    pub fn overlaps(&self, other: &ReviewIssue) -> bool {
        match (self.line_range(), other.line_range()) {
            (None, None) => true,
            (Some((a0, a1)), Some((b0, b1))) => a0 <= b1 && b0 <= a1,
            _ => false,
        }
    }

    /// Clamp `confidence` into `0.0..=1.0`; a non-finite value falls back to the default.
    pub fn clamp_confidence(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            default_confidence()
        };
        self
    }

    /// `true` when both required narrative fields are present.
    pub fn is_complete(&self) -> bool {
        !self.rationale.trim().is_empty() && !self.recommendation.trim().is_empty()
    }

    /// Lowercased title with punctuation collapsed to single spaces.
    pub fn normalized_title(&self) -> String {
        normalize_text(&self.title)
    }

    /// Deterministic SHA-256 hex fingerprint over file, line range, and title.
    pub fn fingerprint(&self) -> String {
        use sha2::Digest as _;
        let range = self
            .line_range()
            .map(|(s, e)| format!("{s}-{e}"))
            .unwrap_or_default();
        let material = format!("{}\n{}\n{}", normalize_path(&self.file), range, self.normalized_title());
        hex::encode(sha2::Sha256::digest(material.as_bytes()))
    }
}

/// Normalise a repo-relative path for comparisons.
pub fn normalize_path(path: &str) -> &str {
    path.trim().trim_start_matches("./")
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_range_normalises_reversed_bounds() {
        let issue = ReviewIssue::new(Severity::Low, "a.rs", "t").with_lines(9, 3);
        assert_eq!(issue.line_range(), Some((3, 9)));
    }

    #[test]
    fn test_overlap_rules() {
        let a = ReviewIssue::new(Severity::Low, "a.rs", "t").with_lines(10, 20);
        let b = ReviewIssue::new(Severity::Low, "a.rs", "t").with_lines(20, 25);
        let c = ReviewIssue::new(Severity::Low, "a.rs", "t").with_lines(21, 25);
        let whole = ReviewIssue::new(Severity::Low, "a.rs", "t");
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&whole));
        assert!(whole.overlaps(&whole.clone()));
    }

    #[test]
    fn test_is_complete_requires_rationale_and_recommendation() {
        let bare = ReviewIssue::new(Severity::High, "a.rs", "t");
        assert!(!bare.is_complete());
        let half = bare.clone().with_narrative("why", "  ");
        assert!(!half.is_complete());
        assert!(bare.with_narrative("why", "fix").is_complete());
    }

    #[test]
    fn test_fingerprint_ignores_title_case_and_punctuation() {
        let a = ReviewIssue::new(Severity::High, "./src/a.rs", "Null deref!").with_lines(4, 4);
        let b = ReviewIssue::new(Severity::Low, "src/a.rs", "null   deref").with_lines(4, 4);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_clamp_confidence() {
        let mut issue = ReviewIssue::new(Severity::Low, "a.rs", "t");
        issue.confidence = 7.0;
        assert_eq!(issue.clone().clamp_confidence().confidence, 1.0);
        issue.confidence = -0.2;
        assert_eq!(issue.clone().clamp_confidence().confidence, 0.0);
        issue.confidence = f32::NAN;
        assert_eq!(issue.clone().clamp_confidence().confidence, 0.5);
        issue.confidence = 0.8;
        assert_eq!(issue.clamp_confidence().confidence, 0.8);
    }

    #[test]
    fn test_deserialize_sparse_model_output() {
        let json = r#"{"severity":"high","title":"Leak","file":"x.rs","startLine":3}"#;
        let issue: ReviewIssue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.start_line, Some(3));
        assert!(issue.rationale.is_empty());
        assert!((issue.confidence - 0.5).abs() < f32::EPSILON);
        assert!(!issue.is_complete());
    }
}
