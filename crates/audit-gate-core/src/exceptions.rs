use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, trace};

use crate::advisory::Finding;

/// What an exception silences.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExceptionTarget {
    /// A single advisory id.
    Advisory(String),
    /// Every advisory raised against a package, present and future.
    Module(String),
}

impl ExceptionTarget {
    pub fn value(&self) -> &str {
        match self {
            ExceptionTarget::Advisory(id) => id,
            ExceptionTarget::Module(name) => name,
        }
    }
}

/// A pre-approved advisory id or module name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    pub target: ExceptionTarget,
    pub active: bool,
    pub expiry: Option<SystemTime>,
    pub notes: Option<String>,
}

impl Exception {
    pub fn advisory(id: impl Into<String>) -> Self {
        Self::from_target(ExceptionTarget::Advisory(id.into()))
    }

    pub fn module(name: impl Into<String>) -> Self {
        Self::from_target(ExceptionTarget::Module(name.into()))
    }

    fn from_target(target: ExceptionTarget) -> Self {
        Self {
            target,
            active: true,
            expiry: None,
            notes: None,
        }
    }

    pub fn with_expiry(mut self, expiry: SystemTime) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    fn covers(&self, finding: &Finding) -> bool {
        match &self.target {
            ExceptionTarget::Advisory(id) => *id == finding.id,
            ExceptionTarget::Module(name) => *name == finding.package,
        }
    }
}

/// Errors raised while turning configured exception entries into [`Exception`]s.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExceptionValidationError {
    #[error("exception entry must set exactly one of `id` or `module`")]
    AmbiguousTarget,
    #[error("exception `{target}` has blank value")]
    Blank { target: &'static str },
    #[error("exception `{value}` has invalid expiry `{expiry}` (expected YYYY-MM-DD or an RFC 3339 timestamp)")]
    InvalidExpiry { value: String, expiry: String },
}

/// Parse an expiry given either as a date (`2026-01-31`, midnight UTC) or an RFC 3339 timestamp.
pub fn parse_expiry(value: &str, expiry: &str) -> Result<SystemTime, ExceptionValidationError> {
    let trimmed = expiry.trim();
    let candidate = if trimmed.len() == 10 {
        format!("{trimmed}T00:00:00")
    } else {
        trimmed.to_string()
    };
    humantime::parse_rfc3339_weak(&candidate).map_err(|_| {
        ExceptionValidationError::InvalidExpiry {
            value: value.to_string(),
            expiry: expiry.to_string(),
        }
    })
}

/// Ordered, de-duplicated allow-list of advisory ids and module names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionList {
    ids: Vec<Exception>,
    modules: Vec<Exception>,
}

impl ExceptionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from plain id and module lists, as supplied on a command line.
    pub fn from_lists<I, M>(ids: I, modules: M) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        let mut list = Self::new();
        list.extend(ids.into_iter().map(Exception::advisory));
        list.extend(modules.into_iter().map(Exception::module));
        list
    }

    /// Add an exception unless one with the same target is already present.
    pub fn push(&mut self, exception: Exception) {
        let bucket = match exception.target {
            ExceptionTarget::Advisory(_) => &mut self.ids,
            ExceptionTarget::Module(_) => &mut self.modules,
        };
        if bucket.iter().any(|held| held.target == exception.target) {
            trace!(exception = exception.target.value(), "ignoring duplicate exception");
            return;
        }
        bucket.push(exception);
    }

    pub fn ids(&self) -> &[Exception] {
        &self.ids
    }

    pub fn modules(&self) -> &[Exception] {
        &self.modules
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.modules.is_empty()
    }
}

impl Extend<Exception> for ExceptionList {
    fn extend<T: IntoIterator<Item = Exception>>(&mut self, iter: T) {
        for exception in iter {
            self.push(exception);
        }
    }
}

/// Result of splitting findings against the allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub excepted: Vec<Finding>,
    pub unhandled: Vec<Finding>,
    /// Active advisory-id exceptions that matched no finding, in configured order.
    pub unused_ids: Vec<String>,
    /// Active module exceptions that matched no finding, in configured order.
    pub unused_modules: Vec<String>,
}

impl MatchOutcome {
    pub fn unhandled_ids(&self) -> Vec<String> {
        self.unhandled.iter().map(|f| f.id.clone()).collect()
    }
}

/// Split `findings` into excepted and unhandled and work out which exceptions went unused.
///
/// A finding is excepted when an active, unexpired exception covers its id or its package.
/// When every covering exception has expired the finding stays unhandled and is marked
/// expired; those exceptions still count as used. Inactive exceptions are ignored.
pub fn partition(
    findings: Vec<Finding>,
    exceptions: &ExceptionList,
    now: SystemTime,
) -> MatchOutcome {
    let mut id_hits = vec![false; exceptions.ids.len()];
    let mut module_hits = vec![false; exceptions.modules.len()];
    let mut outcome = MatchOutcome::default();

    for finding in findings {
        let mut covered = false;
        let mut live = false;
        for (exception, hit) in exceptions
            .ids
            .iter()
            .zip(id_hits.iter_mut())
            .chain(exceptions.modules.iter().zip(module_hits.iter_mut()))
        {
            if !exception.active || !exception.covers(&finding) {
                continue;
            }
            *hit = true;
            covered = true;
            live |= !exception.is_expired_at(now);
        }

        match (covered, live) {
            (_, true) => outcome.excepted.push(finding),
            (true, false) => {
                debug!(id = %finding.id, "exception expired; finding is unhandled");
                outcome.unhandled.push(finding.into_expired());
            }
            (false, false) => outcome.unhandled.push(finding),
        }
    }

    outcome.unused_ids = unused(&exceptions.ids, &id_hits);
    outcome.unused_modules = unused(&exceptions.modules, &module_hits);
    outcome
}

fn unused(exceptions: &[Exception], hits: &[bool]) -> Vec<String> {
    exceptions
        .iter()
        .zip(hits)
        .filter(|(exception, hit)| exception.active && !**hit)
        .map(|(exception, _)| exception.target.value().to_string())
        .collect()
}
