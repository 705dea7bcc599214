//! Issue post-processing: dedupe → severity filter → completeness check → sort.
//!
//! Every step is a pure function over an owned list so callers can compose
//! them individually; [`aggregate_issues`] applies all four in order and
//! reports how many issues each step removed.

use std::collections::HashSet;

use lensrev_domain::issue::normalize_path;
use lensrev_domain::{ReviewIssue, Severity};

/// Title-token overlap at which two issues are the same finding.
const TITLE_SIMILARITY: f64 = 0.6;
/// Lower overlap accepted when both issues share a category.
const CATEGORY_TITLE_SIMILARITY: f64 = 0.3;

/// Output of [`aggregate_issues`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedIssues {
    pub issues: Vec<ReviewIssue>,
    pub duplicates_removed: usize,
    pub below_threshold: usize,
    pub incomplete_dropped: usize,
}

/// Run the full pipeline over the concatenated findings of every lens.
pub fn aggregate_issues(issues: Vec<ReviewIssue>, min_severity: Option<Severity>) -> AggregatedIssues {
    let input = issues.len();
    let deduped = dedupe_issues(issues);
    let duplicates_removed = input - deduped.len();

    let after_dedupe = deduped.len();
    let filtered = filter_by_severity(deduped, min_severity);
    let below_threshold = after_dedupe - filtered.len();

    let after_filter = filtered.len();
    let complete = retain_complete(filtered);
    let incomplete_dropped = after_filter - complete.len();

    AggregatedIssues {
        issues: sort_by_severity(complete),
        duplicates_removed,
        below_threshold,
        incomplete_dropped,
    }
}

/// Drop later issues that describe the same finding as an earlier kept one.
///
/// Two issues match when they share a file, their line ranges overlap, and
/// their titles are similar (identical after normalisation, or sharing enough
/// words; fewer words suffice when the categories agree).
pub fn dedupe_issues(issues: Vec<ReviewIssue>) -> Vec<ReviewIssue> {
    let mut kept: Vec<ReviewIssue> = Vec::with_capacity(issues.len());
    for issue in issues {
        if !kept.iter().any(|k| is_duplicate(k, &issue)) {
            kept.push(issue);
        }
    }
    kept
}

/// Keep issues at or above `min_severity`; `None` keeps everything.
pub fn filter_by_severity(issues: Vec<ReviewIssue>, min_severity: Option<Severity>) -> Vec<ReviewIssue> {
    match min_severity {
        None => issues,
        Some(threshold) => issues
            .into_iter()
            .filter(|i| i.severity.meets(threshold))
            .collect(),
    }
}

/// Drop issues without a rationale or recommendation.
pub fn retain_complete(issues: Vec<ReviewIssue>) -> Vec<ReviewIssue> {
    issues
        .into_iter()
        .filter(|issue| {
            let complete = issue.is_complete();
            if !complete {
                tracing::debug!(file = %issue.file, title = %issue.title, "dropping incomplete issue");
            }
            complete
        })
        .collect()
}

/// Stable sort, blocker first.
pub fn sort_by_severity(mut issues: Vec<ReviewIssue>) -> Vec<ReviewIssue> {
    issues.sort_by(|a, b| b.severity.cmp(&a.severity));
    issues
}

fn is_duplicate(kept: &ReviewIssue, candidate: &ReviewIssue) -> bool {
    if normalize_path(&kept.file) != normalize_path(&candidate.file) || !kept.overlaps(candidate) {
        return false;
    }

    let (a, b) = (kept.normalized_title(), candidate.normalized_title());
    if a == b {
        return true;
    }

    let similarity = jaccard(&a, &b);
    if similarity >= TITLE_SIMILARITY {
        return true;
    }

    let same_category = !kept.category.trim().is_empty()
        && kept.category.trim().eq_ignore_ascii_case(candidate.category.trim());
    same_category && similarity >= CATEGORY_TITLE_SIMILARITY
}

fn jaccard(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    shared / union
}
