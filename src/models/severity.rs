use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Levels of severity for violations detected during package scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Convention or style problems, or inconsistent modes of installation.
    Minor,
    /// Likely source of component instability: importer errors, missing root
    /// paths or namespaces.
    Major,
    /// Likely source of platform instability: filter overlap, destroyed
    /// content, security problems.
    Severe,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Severe, Severity::Major, Severity::Minor];

    /// Rank used for every comparison. Higher is more severe.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Minor => 0,
            Severity::Major => 1,
            Severity::Severe => 2,
        }
    }

    pub fn is_less_severe_than(self, other: Severity) -> bool {
        self.rank() < other.rank()
    }

    /// True when this level is at or above `minimum`.
    pub fn meets_minimum(self, minimum: Severity) -> bool {
        !self.is_less_severe_than(minimum)
    }

    pub fn max(self, other: Severity) -> Severity {
        if self.is_less_severe_than(other) {
            other
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Minor => "MINOR",
            Severity::Major => "MAJOR",
            Severity::Severe => "SEVERE",
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity level: {0}")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownSeverity(s.to_string()))
    }
}
