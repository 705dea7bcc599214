//! Stable lens identifiers.

use serde::{Deserialize, Serialize};

/// Identifier of a review lens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LensId {
    Correctness,
    Security,
    Performance,
    Simplicity,
    Tests,
}

impl LensId {
    pub const ALL: [LensId; 5] = [
        LensId::Correctness,
        LensId::Security,
        LensId::Performance,
        LensId::Simplicity,
        LensId::Tests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LensId::Correctness => "correctness",
            LensId::Security => "security",
            LensId::Performance => "performance",
            LensId::Simplicity => "simplicity",
            LensId::Tests => "tests",
        }
    }

    /// Parse a caller-supplied identifier, returning `None` when it is unknown.
    pub fn parse(s: &str) -> Option<LensId> {
        let needle = s.trim().to_ascii_lowercase();
        LensId::ALL.into_iter().find(|id| id.as_str() == needle)
    }
}

impl std::fmt::Display for LensId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
