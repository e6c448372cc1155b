use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{debug, instrument, warn};

use crate::{
    process::{process_audit_json, ProcessResult},
    report::{render_report, OutputFormat},
    settings::GateSettings,
};

/// Directory, relative to the run root, that receives the audit artifact.
pub const REPORT_DIR: &str = ".sast";
/// File name of the audit artifact inside [`REPORT_DIR`].
pub const REPORT_FILE: &str = "audit_report.json";

/// Final decision for one run. Only the binary turns this into a process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No unhandled findings at or above the level.
    Pass,
    /// Unhandled findings remain.
    Fail { unhandled_ids: Vec<String> },
    /// The audit payload could not be parsed.
    InvalidInput,
}

impl Verdict {
    pub fn exit_code(&self) -> u8 {
        match self {
            Verdict::Pass => 0,
            Verdict::Fail { .. } | Verdict::InvalidInput => 1,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Location of the artifact under `root`.
pub fn report_path(root: &Path) -> PathBuf {
    root.join(REPORT_DIR).join(REPORT_FILE)
}

/// Write the artifact under `root`, creating the report directory when missing.
pub fn save_json_report(root: &Path, contents: &str) -> Result<PathBuf> {
    let dir = root.join(REPORT_DIR);
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create report directory {}", dir.display()))?;
    let path = dir.join(REPORT_FILE);
    fs::write(&path, contents)
        .with_context(|| format!("failed to write audit report to {}", path.display()))?;
    Ok(path)
}

/// Runs the pipeline end to end: console output, artifact persistence, verdict.
pub struct Orchestrator {
    root: PathBuf,
    now: SystemTime,
}

impl Orchestrator {
    /// Orchestrator writing its artifact under `root`, judging expiries against the current time.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            now: SystemTime::now(),
        }
    }

    /// Pin the clock used for exception expiry.
    pub fn with_now(mut self, now: SystemTime) -> Self {
        self.now = now;
        self
    }

    /// Process `raw` and report on `out`/`err`.
    ///
    /// The returned error only covers failures to write to the console streams.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn run(
        &self,
        raw: &str,
        settings: &GateSettings,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> io::Result<Verdict> {
        let result =
            match process_audit_json(raw, settings.level, &settings.exceptions, self.now) {
                Ok(result) => result,
                Err(parse_err) => {
                    debug!(error = %parse_err, "audit input rejected");
                    writeln!(err, "Unable to process the audit JSON: {parse_err}")?;
                    return Ok(Verdict::InvalidInput);
                }
            };

        if !result.rows.is_empty() {
            match render_report(&result.rows, OutputFormat::Table) {
                Ok(table) => write!(out, "{table}")?,
                Err(render_err) => warn!(error = %render_err, "failed to render report table"),
            }
        }

        if let Err(save_err) = self.persist(&result) {
            writeln!(err, "Failed to export the audit report: {save_err:#}")?;
        }

        report_unused(&result, err)?;

        if result.is_clean() {
            writeln!(out, "{}", "All good!".green().bold())?;
            return Ok(Verdict::Pass);
        }

        writeln!(
            err,
            "{} vulnerabilities found. Security advisories: {}",
            result.unhandled_ids.len(),
            result.unhandled_ids.join(", ")
        )?;
        Ok(Verdict::Fail {
            unhandled_ids: result.unhandled_ids,
        })
    }

    fn persist(&self, result: &ProcessResult) -> Result<PathBuf> {
        let json = render_report(&result.rows, OutputFormat::Json)?;
        let path = save_json_report(&self.root, &json)?;
        debug!(path = %path.display(), rows = result.rows.len(), "saved audit report");
        Ok(path)
    }
}

/// Warn about exceptions that no longer match anything so the list can be pruned.
fn report_unused(result: &ProcessResult, err: &mut dyn Write) -> io::Result<()> {
    if !result.unused_exception_ids.is_empty() {
        let message = format!(
            "{} of the excluded vulnerabilities did not match any of the found vulnerabilities: {}. They can be removed from the exclude list.",
            result.unused_exception_ids.len(),
            result.unused_exception_ids.join(", ")
        );
        writeln!(err, "{}", message.yellow())?;
    }
    if !result.unused_exception_modules.is_empty() {
        let message = format!(
            "{} of the ignored modules did not match any of the found vulnerabilities: {}. They can be removed from the module ignore list.",
            result.unused_exception_modules.len(),
            result.unused_exception_modules.join(", ")
        );
        writeln!(err, "{}", message.yellow())?;
    }
    Ok(())
}
