use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod parser;

/// Maximum number of dependency paths listed before the summary is elided.
pub const MAX_PATHS_SHOWN: usize = 3;

/// Advisory severity as reported by the audit tool, ordered from least to most severe.
///
/// The same scale doubles as the audit level: a level keeps every finding whose
/// severity is greater than or equal to it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Moderate,
        Severity::High,
        Severity::Critical,
    ];

    /// Numeric rank (`info` = 0 .. `critical` = 4).
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Whether a finding of this severity is at or above `level`.
    pub fn meets(self, level: Severity) -> bool {
        self >= level
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = SeverityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str() == wanted)
            .ok_or_else(|| SeverityParseError {
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown severity `{value}` (expected one of info, low, moderate, high, critical)")]
pub struct SeverityParseError {
    pub value: String,
}

/// Advisory identifiers show up as numbers in npm output and as strings elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AdvisoryId {
    Number(u64),
    Text(String),
}

impl fmt::Display for AdvisoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvisoryId::Number(n) => write!(f, "{n}"),
            AdvisoryId::Text(s) => f.write_str(s),
        }
    }
}

/// One vulnerability reported by the audit input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub id: String,
    pub package: String,
    pub title: String,
    /// Dependency paths leading to the vulnerable package, in source order.
    pub paths: Vec<String>,
    pub severity: Severity,
    /// Advisory URL.
    pub guide: String,
    /// Set when the only exception covering this finding has expired.
    pub expired: bool,
}

impl Finding {
    pub fn new(
        id: impl Into<String>,
        package: impl Into<String>,
        title: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            package: package.into(),
            title: title.into(),
            paths: Vec::new(),
            severity,
            guide: String::new(),
            expired: false,
        }
    }

    pub fn with_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_guide(mut self, guide: impl Into<String>) -> Self {
        self.guide = guide.into();
        self
    }

    pub(crate) fn into_expired(mut self) -> Self {
        self.expired = true;
        self
    }

    /// Short, single-line summary of the dependency paths.
    pub fn path_summary(&self) -> String {
        let shown = self
            .paths
            .iter()
            .take(MAX_PATHS_SHOWN)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        match self.paths.len().checked_sub(MAX_PATHS_SHOWN) {
            Some(hidden) if hidden > 0 => format!("{shown} ...and {hidden} more"),
            _ => shown,
        }
    }

    /// Fold another occurrence of the same advisory into this finding.
    pub(crate) fn absorb(&mut self, other: Finding) {
        for path in other.paths {
            if !self.paths.contains(&path) {
                self.paths.push(path);
            }
        }
    }
}
