pub mod advisory;
pub mod exceptions;
pub mod filter;
pub mod finish;
pub mod process;
pub mod report;
pub mod settings;

pub use advisory::{
    parser::{parse_audit_json, AuditParseError},
    Finding, Severity, SeverityParseError,
};
pub use exceptions::{partition, Exception, ExceptionList, ExceptionTarget, MatchOutcome};
pub use finish::{report_path, save_json_report, Orchestrator, Verdict, REPORT_DIR, REPORT_FILE};
pub use process::{process_audit_json, ProcessResult};
pub use report::{render_json, render_report, OutputFormat, ReportRow};
pub use settings::{ExceptionEntry, GateSettings, SettingsOverrides, SettingsSource};
