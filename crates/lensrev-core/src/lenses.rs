//! Lens registry and review profiles.
//!
//! Lenses are static definitions: they never execute and never change after
//! process start. [`resolve_lenses`] turns a caller's requested identifiers
//! into the ordered list of definitions a run will execute.

use lensrev_domain::{LensId, Severity};

/// One short description per severity level, rendered into the lens prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityRubric {
    pub blocker: &'static str,
    pub high: &'static str,
    pub medium: &'static str,
    pub low: &'static str,
    pub nit: &'static str,
}

impl SeverityRubric {
    pub fn describe(&self, severity: Severity) -> &'static str {
        match severity {
            Severity::Blocker => self.blocker,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Nit => self.nit,
        }
    }

    /// `- blocker: ...` lines, most severe first.
    pub fn render(&self) -> String {
        Severity::ALL
            .iter()
            .map(|s| format!("- {}: {}", s, self.describe(*s)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A named analysis strategy applied to a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lens {
    pub id: LensId,
    pub name: &'static str,
    pub description: &'static str,
    /// Prompt with `{{lens}}`, `{{rubric}}`, `{{files}}`, `{{diff}}`, `{{context}}` placeholders.
    pub prompt_template: &'static str,
    pub rubric: SeverityRubric,
}

macro_rules! lens_template {
    ($focus:literal) => {
        concat!(
            "You are the {{lens}} reviewer on a code review panel.\n\n",
            "Focus:\n",
            $focus,
            "\n\nOnly report problems introduced or exposed by this diff. ",
            "Skip anything another lens would own unless it is severe.\n\n",
            "Severity rubric:\n{{rubric}}\n\n",
            "Project context:\n{{context}}\n\n",
            "Changed files:\n{{files}}\n\n",
            "Diff:\n{{diff}}\n\n",
            "Respond with a JSON object: {\"summary\": string, \"issues\": [issue]}. ",
            "Each issue needs severity, category, title, file, startLine, endLine, rationale, ",
            "recommendation, confidence (0-1), symptom, impact, and evidence. ",
            "Return an empty issues array when the diff is clean."
        )
    };
}

static LENSES: [Lens; 5] = [
    Lens {
        id: LensId::Correctness,
        name: "Correctness",
        description: "Logic errors, broken invariants, and behaviour regressions",
        prompt_template: lens_template!(
            "- wrong results, off-by-one errors, unhandled cases\n\
             - broken invariants and error handling that swallows failures\n\
             - concurrency hazards and resource leaks"
        ),
        rubric: SeverityRubric {
            blocker: "data loss, crash, or wrong result on a common path",
            high: "wrong result or crash on a realistic edge case",
            medium: "incorrect behaviour on an unusual path",
            low: "latent bug unlikely to trigger",
            nit: "questionable but harmless construct",
        },
    },
    Lens {
        id: LensId::Security,
        name: "Security",
        description: "Injection, authz gaps, secret handling, and unsafe input processing",
        prompt_template: lens_template!(
            "- injection (SQL, shell, template, path traversal)\n\
             - missing authentication or authorization checks\n\
             - secrets in code or logs, weak cryptography, unsafe deserialization"
        ),
        rubric: SeverityRubric {
            blocker: "remotely exploitable without authentication",
            high: "exploitable by an authenticated or adjacent attacker",
            medium: "defence-in-depth gap with a plausible attack path",
            low: "hardening opportunity",
            nit: "style issue with a security flavour",
        },
    },
    Lens {
        id: LensId::Performance,
        name: "Performance",
        description: "Hot-path regressions, needless allocation, and unbounded work",
        prompt_template: lens_template!(
            "- algorithmic regressions and unbounded loops or queries\n\
             - repeated I/O or allocation on hot paths\n\
             - blocking calls inside async code"
        ),
        rubric: SeverityRubric {
            blocker: "makes a core path unusable at expected scale",
            high: "measurable regression on a hot path",
            medium: "inefficiency on a warm path",
            low: "minor waste",
            nit: "micro-optimisation",
        },
    },
    Lens {
        id: LensId::Simplicity,
        name: "Simplicity",
        description: "Needless complexity, duplication, and unclear structure",
        prompt_template: lens_template!(
            "- duplicated logic and dead code\n\
             - abstractions that do not pay for themselves\n\
             - names or control flow that hide intent"
        ),
        rubric: SeverityRubric {
            blocker: "change cannot be maintained safely as written",
            high: "complexity likely to cause bugs soon",
            medium: "noticeable maintenance burden",
            low: "small clarity improvement",
            nit: "naming or formatting preference",
        },
    },
    Lens {
        id: LensId::Tests,
        name: "Tests",
        description: "Missing, weak, or misleading test coverage for the change",
        prompt_template: lens_template!(
            "- new behaviour without tests\n\
             - assertions that cannot fail or test the wrong thing\n\
             - flaky timing or ordering assumptions"
        ),
        rubric: SeverityRubric {
            blocker: "critical path changed with no coverage at all",
            high: "important branch left untested",
            medium: "weak assertions on changed behaviour",
            low: "extra case worth adding",
            nit: "test naming or layout",
        },
    },
];

/// Lenses used when the caller requests none.
pub const DEFAULT_LENSES: &[LensId] = &[LensId::Correctness];

/// Look up a lens definition.
pub fn get_lens(id: LensId) -> &'static Lens {
    match id {
        LensId::Correctness => &LENSES[0],
        LensId::Security => &LENSES[1],
        LensId::Performance => &LENSES[2],
        LensId::Simplicity => &LENSES[3],
        LensId::Tests => &LENSES[4],
    }
}

pub fn all_lenses() -> &'static [Lens] {
    &LENSES
}

/// Resolve requested identifiers into lens definitions, preserving order.
///
/// `None` or an empty list yields [`DEFAULT_LENSES`]. Unknown identifiers are
/// dropped silently; repeated identifiers keep their first position.
pub fn resolve_lenses<S: AsRef<str>>(requested: Option<&[S]>) -> Vec<&'static Lens> {
    let requested = match requested {
        Some(ids) if !ids.is_empty() => ids,
        _ => return DEFAULT_LENSES.iter().map(|id| get_lens(*id)).collect(),
    };

    let mut resolved: Vec<&'static Lens> = Vec::with_capacity(requested.len());
    for raw in requested {
        if let Some(id) = LensId::parse(raw.as_ref()) {
            if !resolved.iter().any(|l| l.id == id) {
                resolved.push(get_lens(id));
            }
        }
    }
    resolved
}

/// A named preset of lenses and severity threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewProfile {
    pub name: &'static str,
    pub description: &'static str,
    pub lenses: &'static [LensId],
    pub min_severity: Option<Severity>,
}

static PROFILES: [ReviewProfile; 4] = [
    ReviewProfile {
        name: "quick",
        description: "Correctness only, high severity and above",
        lenses: &[LensId::Correctness],
        min_severity: Some(Severity::High),
    },
    ReviewProfile {
        name: "standard",
        description: "Correctness and security, every severity",
        lenses: &[LensId::Correctness, LensId::Security],
        min_severity: None,
    },
    ReviewProfile {
        name: "thorough",
        description: "Every lens, every severity",
        lenses: &[
            LensId::Correctness,
            LensId::Security,
            LensId::Performance,
            LensId::Simplicity,
            LensId::Tests,
        ],
        min_severity: None,
    },
    ReviewProfile {
        name: "security",
        description: "Security only, medium severity and above",
        lenses: &[LensId::Security],
        min_severity: Some(Severity::Medium),
    },
];

impl ReviewProfile {
    pub fn builtin() -> &'static [ReviewProfile] {
        &PROFILES
    }

    /// Case-insensitive lookup by name.
    pub fn find(name: &str) -> Option<&'static ReviewProfile> {
        let name = name.trim();
        PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn lens_names(&self) -> Vec<String> {
        self.lenses.iter().map(|id| id.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_lens_matches_id_for_every_lens() {
        for id in LensId::ALL {
            assert_eq!(get_lens(id).id, id);
        }
        assert_eq!(all_lenses().len(), LensId::ALL.len());
    }

    #[test]
    fn test_resolve_none_returns_default_single_lens() {
        let lenses = resolve_lenses::<String>(None);
        assert_eq!(lenses.len(), 1);
        assert_eq!(lenses[0].id, LensId::Correctness);

        let empty: Vec<String> = vec![];
        assert_eq!(resolve_lenses(Some(&empty)).len(), 1);
    }

    #[test]
    fn test_resolve_preserves_order_and_drops_unknown() {
        let lenses = resolve_lenses(Some(&["performance", "style", "security"][..]));
        let ids: Vec<LensId> = lenses.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![LensId::Performance, LensId::Security]);
    }

    #[test]
    fn test_resolve_collapses_repeats() {
        let lenses = resolve_lenses(Some(&["tests", "Tests", "correctness", "tests"][..]));
        let ids: Vec<LensId> = lenses.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![LensId::Tests, LensId::Correctness]);
    }

    #[test]
    fn test_resolve_all_unknown_is_empty() {
        assert!(resolve_lenses(Some(&["style", "vibes"][..])).is_empty());
    }

    #[test]
    fn test_templates_carry_every_placeholder() {
        for lens in all_lenses() {
            for placeholder in ["{{lens}}", "{{rubric}}", "{{files}}", "{{diff}}", "{{context}}"] {
                assert!(
                    lens.prompt_template.contains(placeholder),
                    "{} template missing {placeholder}",
                    lens.name
                );
            }
        }
    }

    #[test]
    fn test_rubric_render_lists_blocker_first() {
        let rendered = get_lens(LensId::Security).rubric.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("- blocker:"));
        assert!(lines[4].starts_with("- nit:"));
    }

    #[test]
    fn test_profile_lookup_is_case_insensitive() {
        let profile = ReviewProfile::find("Security").unwrap();
        assert_eq!(profile.lenses, &[LensId::Security]);
        assert_eq!(profile.min_severity, Some(Severity::Medium));
        assert!(ReviewProfile::find("paranoid").is_none());
        assert_eq!(ReviewProfile::builtin().len(), 4);
    }
}
