use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument, trace};

use super::{AdvisoryId, Finding, Severity};

const SCHEMA_V6: &str = "npm v6";
const SCHEMA_V7: &str = "npm v7";
const SCHEMA_FLAT: &str = "flat";

/// Reasons an audit payload could not be turned into findings.
#[derive(Debug, Error)]
pub enum AuditParseError {
    #[error("audit input is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("audit tool reported an error ({code}): {summary}")]
    AuditTool { code: String, summary: String },
    #[error(
        "unrecognised audit report shape: expected an `advisories` object, a `vulnerabilities` object, or an array of entries"
    )]
    UnknownShape,
    #[error("malformed {schema} entry `{key}`: {source}")]
    MalformedEntry {
        schema: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse a raw audit payload into findings, in source order.
///
/// Occurrences of the same advisory id are merged into the first one.
#[instrument(skip_all, fields(input_len = raw.len()))]
pub fn parse_audit_json(raw: &str) -> Result<Vec<Finding>, AuditParseError> {
    let value: Value = serde_json::from_str(raw).map_err(AuditParseError::InvalidJson)?;

    let findings = match value {
        Value::Object(mut root) => {
            if let Some(error) = root.remove("error") {
                return Err(audit_tool_error(error));
            }
            if let Some(advisories) = root.remove("advisories") {
                parse_v6(advisories)?
            } else if let Some(vulnerabilities) = root.remove("vulnerabilities") {
                parse_v7(vulnerabilities)?
            } else {
                return Err(AuditParseError::UnknownShape);
            }
        }
        Value::Array(entries) => parse_flat(entries)?,
        _ => return Err(AuditParseError::UnknownShape),
    };

    let merged = merge_duplicates(findings);
    debug!(findings = merged.len(), "parsed audit report");
    Ok(merged)
}

#[derive(Deserialize)]
struct ToolError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

fn audit_tool_error(value: Value) -> AuditParseError {
    let (code, summary) = match serde_json::from_value::<ToolError>(value.clone()) {
        Ok(err) => (err.code, err.summary),
        Err(_) => (None, value.as_str().map(str::to_string)),
    };
    AuditParseError::AuditTool {
        code: code.unwrap_or_else(|| "unknown".to_string()),
        summary: summary.unwrap_or_else(|| "no summary provided".to_string()),
    }
}

fn decode<T: DeserializeOwned>(
    schema: &'static str,
    key: &str,
    value: Value,
) -> Result<T, AuditParseError> {
    serde_json::from_value(value).map_err(|source| AuditParseError::MalformedEntry {
        schema,
        key: key.to_string(),
        source,
    })
}

#[derive(Deserialize)]
struct V6Advisory {
    id: AdvisoryId,
    module_name: String,
    title: String,
    #[serde(default)]
    url: String,
    severity: Severity,
    #[serde(default)]
    findings: Vec<V6Occurrence>,
}

#[derive(Deserialize)]
struct V6Occurrence {
    #[serde(default)]
    paths: Vec<String>,
}

fn parse_v6(advisories: Value) -> Result<Vec<Finding>, AuditParseError> {
    let advisories: Map<String, Value> = decode(SCHEMA_V6, "advisories", advisories)?;
    let mut findings = Vec::with_capacity(advisories.len());
    for (key, raw) in advisories {
        let advisory: V6Advisory = decode(SCHEMA_V6, &key, raw)?;
        let paths = advisory
            .findings
            .into_iter()
            .flat_map(|occurrence| occurrence.paths);
        findings.push(
            Finding::new(
                advisory.id.to_string(),
                advisory.module_name,
                advisory.title,
                advisory.severity,
            )
            .with_paths(paths)
            .with_guide(advisory.url),
        );
    }
    trace!(count = findings.len(), "decoded npm v6 advisories");
    Ok(findings)
}

#[derive(Deserialize)]
struct V7Vulnerability {
    #[serde(default)]
    via: Vec<V7Via>,
    #[serde(default)]
    nodes: Vec<String>,
}

/// `via` lists either full advisories or the names of packages that pull one in.
#[derive(Deserialize)]
#[serde(untagged)]
enum V7Via {
    Advisory(V7Advisory),
    Reference(String),
}

#[derive(Deserialize)]
struct V7Advisory {
    source: AdvisoryId,
    name: String,
    title: String,
    #[serde(default)]
    url: String,
    severity: Severity,
}

fn parse_v7(vulnerabilities: Value) -> Result<Vec<Finding>, AuditParseError> {
    let vulnerabilities: Map<String, Value> =
        decode(SCHEMA_V7, "vulnerabilities", vulnerabilities)?;
    let mut findings = Vec::new();
    for (key, raw) in vulnerabilities {
        let vulnerability: V7Vulnerability = decode(SCHEMA_V7, &key, raw)?;
        for via in vulnerability.via {
            match via {
                V7Via::Advisory(advisory) => findings.push(
                    Finding::new(
                        advisory.source.to_string(),
                        advisory.name,
                        advisory.title,
                        advisory.severity,
                    )
                    .with_paths(vulnerability.nodes.iter().cloned())
                    .with_guide(advisory.url),
                ),
                V7Via::Reference(name) => {
                    trace!(package = %key, via = %name, "skipping transitive reference");
                }
            }
        }
    }
    trace!(count = findings.len(), "decoded npm v7 vulnerabilities");
    Ok(findings)
}

#[derive(Deserialize)]
struct FlatEntry {
    id: AdvisoryId,
    #[serde(alias = "module", alias = "module_name")]
    package: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    paths: Vec<String>,
    severity: Severity,
    #[serde(default, alias = "url", alias = "reference")]
    guide: String,
}

fn parse_flat(entries: Vec<Value>) -> Result<Vec<Finding>, AuditParseError> {
    entries
        .into_iter()
        .enumerate()
        .map(|(idx, raw)| {
            let entry: FlatEntry = decode(SCHEMA_FLAT, &idx.to_string(), raw)?;
            let paths = entry.path.into_iter().chain(entry.paths);
            Ok(
                Finding::new(entry.id.to_string(), entry.package, entry.title, entry.severity)
                    .with_paths(paths)
                    .with_guide(entry.guide),
            )
        })
        .collect()
}

fn merge_duplicates(findings: Vec<Finding>) -> Vec<Finding> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Finding> = Vec::with_capacity(findings.len());
    for finding in findings {
        match index.get(&finding.id) {
            Some(&pos) => merged[pos].absorb(finding),
            None => {
                index.insert(finding.id.clone(), merged.len());
                merged.push(finding);
            }
        }
    }
    merged
}
