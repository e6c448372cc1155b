use tracing::debug;

use crate::advisory::{Finding, Severity};

/// Keep only findings at or above `level`. Anything below never reaches exception matching.
pub fn retain_at_or_above(findings: Vec<Finding>, level: Severity) -> Vec<Finding> {
    let total = findings.len();
    let kept: Vec<_> = findings
        .into_iter()
        .filter(|finding| finding.severity.meets(level))
        .collect();
    debug!(%level, total, kept = kept.len(), "applied audit level");
    kept
}
