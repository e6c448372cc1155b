use std::fmt::Write;

use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::advisory::{Finding, Severity};

const HEADERS: [&str; 7] = ["ID", "Module", "Title", "Paths", "Sev.", "URL", "Ex."];
const MAX_CELL_CHARS: usize = 48;

/// Format styles supported by the default reporter.
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Colorized table for a terminal.
    Table,
    /// Plain JSON array persisted as the audit artifact.
    Json,
}

/// Structured row for one surviving finding. Both output views derive from this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub id: String,
    pub package: String,
    pub title: String,
    pub path: String,
    pub severity: Severity,
    pub guide: String,
    pub expired: bool,
}

impl From<&Finding> for ReportRow {
    fn from(finding: &Finding) -> Self {
        Self {
            id: finding.id.clone(),
            package: finding.package.clone(),
            title: finding.title.clone(),
            path: finding.path_summary(),
            severity: finding.severity,
            guide: finding.guide.clone(),
            expired: finding.expired,
        }
    }
}

impl ReportRow {
    fn expired_marker(&self) -> &'static str {
        if self.expired {
            "y"
        } else {
            "n"
        }
    }

    /// Plain cells in column order `[id, package, title, path, severity, guide, expired]`.
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.package.clone(),
            self.title.clone(),
            self.path.clone(),
            self.severity.to_string(),
            self.guide.clone(),
            self.expired_marker().to_string(),
        ]
    }
}

/// Produce a report string for `rows` using the desired format.
pub fn render_report(rows: &[ReportRow], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Table => render_table(rows),
        OutputFormat::Json => render_json(rows),
    }
}

/// Render the persisted artifact: a pretty-printed JSON array, `[]` when empty.
pub fn render_json(rows: &[ReportRow]) -> anyhow::Result<String> {
    let entries: Vec<_> = rows.iter().map(ArtifactEntry::from).collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}

fn render_table(rows: &[ReportRow]) -> anyhow::Result<String> {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.cells().into_iter().map(|c| truncate(&c)).collect())
        .collect();

    let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header: Vec<ColoredString> = HEADERS
        .iter()
        .zip(&widths)
        .map(|(h, w)| pad(h, *w).bold())
        .collect();
    writeln!(out, "{}", join_line(&header))?;
    let rule_len = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    writeln!(out, "{}", "-".repeat(rule_len))?;

    for (row, plain) in rows.iter().zip(&cells) {
        let styled: Vec<ColoredString> = plain
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(col, (cell, width))| style_cell(row, col, pad(cell, *width)))
            .collect();
        writeln!(out, "{}", join_line(&styled).trim_end())?;
    }
    Ok(out)
}

fn style_cell(row: &ReportRow, col: usize, padded: String) -> ColoredString {
    match col {
        0 => padded.bold(),
        4 => severity_color(row.severity, padded),
        5 => padded.underline(),
        6 if row.expired => padded.yellow().bold(),
        _ => padded.normal(),
    }
}

fn severity_color(severity: Severity, label: String) -> ColoredString {
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Moderate => label.yellow(),
        Severity::Low => label.cyan(),
        Severity::Info => label.dimmed(),
    }
}

fn join_line(cells: &[ColoredString]) -> String {
    cells
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("  ")
}

fn pad(cell: &str, width: usize) -> String {
    format!("{cell:<width$}")
}

fn truncate(cell: &str) -> String {
    let flat: String = cell
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            _ => c,
        })
        .collect();
    if flat.chars().count() <= MAX_CELL_CHARS {
        return flat;
    }
    let mut clipped: String = flat.chars().take(MAX_CELL_CHARS - 1).collect();
    clipped.push('…');
    clipped
}

#[derive(Debug, Serialize)]
struct ArtifactEntry<'a> {
    id: &'a str,
    package: &'a str,
    title: &'a str,
    path: &'a str,
    severity: &'static str,
    guide: &'a str,
    expired: &'static str,
}

impl<'a> From<&'a ReportRow> for ArtifactEntry<'a> {
    fn from(row: &'a ReportRow) -> Self {
        Self {
            id: &row.id,
            package: &row.package,
            title: &row.title,
            path: &row.path,
            severity: row.severity.as_str(),
            guide: &row.guide,
            expired: row.expired_marker(),
        }
    }
}
