use std::time::SystemTime;

use tracing::{debug, instrument};

use crate::{
    advisory::{parser::parse_audit_json, parser::AuditParseError, Severity},
    exceptions::{partition, ExceptionList},
    filter::retain_at_or_above,
    report::ReportRow,
};

/// Outcome of running one audit payload through the decision pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    /// Ids of findings at or above the level that no exception covers.
    pub unhandled_ids: Vec<String>,
    /// One row per unhandled finding, in source order.
    pub rows: Vec<ReportRow>,
    pub unused_exception_ids: Vec<String>,
    pub unused_exception_modules: Vec<String>,
    /// Findings silenced by an exception.
    pub excepted: usize,
    /// Findings dropped for being below the level.
    pub below_level: usize,
}

impl ProcessResult {
    /// Tabular view of [`Self::rows`], one vector of plain cells per finding.
    pub fn report(&self) -> Vec<Vec<String>> {
        self.rows.iter().map(ReportRow::cells).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.unhandled_ids.is_empty()
    }
}

/// Parse, filter by `level`, and match against `exceptions`.
///
/// `now` decides which exception expiries have passed.
#[instrument(skip(raw, exceptions), fields(input_len = raw.len()))]
pub fn process_audit_json(
    raw: &str,
    level: Severity,
    exceptions: &ExceptionList,
    now: SystemTime,
) -> Result<ProcessResult, AuditParseError> {
    let findings = parse_audit_json(raw)?;
    let parsed = findings.len();

    let filtered = retain_at_or_above(findings, level);
    let below_level = parsed - filtered.len();

    let outcome = partition(filtered, exceptions, now);
    let result = ProcessResult {
        unhandled_ids: outcome.unhandled_ids(),
        rows: outcome.unhandled.iter().map(ReportRow::from).collect(),
        unused_exception_ids: outcome.unused_ids,
        unused_exception_modules: outcome.unused_modules,
        excepted: outcome.excepted.len(),
        below_level,
    };
    debug!(
        parsed,
        below_level,
        excepted = result.excepted,
        unhandled = result.unhandled_ids.len(),
        "processed audit report"
    );
    Ok(result)
}
