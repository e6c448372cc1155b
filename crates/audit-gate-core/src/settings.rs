use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    advisory::{AdvisoryId, Severity},
    exceptions::{parse_expiry, Exception, ExceptionList, ExceptionValidationError},
};

/// Raw, layered settings as read from a config file and `AUDIT_GATE_*` variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSource {
    /// Audit level name (`info`, `low`, `moderate`, `high`, `critical`).
    pub level: Option<String>,
    /// Advisory ids to except. A single string may hold comma separated ids.
    #[serde(deserialize_with = "one_or_many")]
    pub exclude: Vec<String>,
    /// Module names whose advisories are all excepted.
    #[serde(deserialize_with = "one_or_many")]
    pub module_ignore: Vec<String>,
    /// Detailed exception entries with optional expiry and notes.
    pub exceptions: Vec<ExceptionEntry>,
}

/// One detailed exception entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_active() -> bool {
    true
}

/// Environment variables arrive as one string, config files as lists of strings or numbers.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(AdvisoryId),
        Many(Vec<AdvisoryId>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value.to_string()],
        OneOrMany::Many(values) => values.iter().map(ToString::to_string).collect(),
    })
}

impl ExceptionEntry {
    pub fn to_exception(&self) -> Result<Exception, ExceptionValidationError> {
        let mut exception = match (&self.id, &self.module) {
            (Some(id), None) => Exception::advisory(non_blank(id, "id")?),
            (None, Some(module)) => Exception::module(non_blank(module, "module")?),
            _ => return Err(ExceptionValidationError::AmbiguousTarget),
        };
        if let Some(expiry) = &self.expiry {
            let parsed = parse_expiry(exception.target.value(), expiry)?;
            exception = exception.with_expiry(parsed);
        }
        if let Some(notes) = &self.notes {
            exception = exception.with_notes(notes.clone());
        }
        if !self.active {
            exception = exception.inactive();
        }
        Ok(exception)
    }
}

fn non_blank<'a>(value: &'a str, target: &'static str) -> Result<&'a str, ExceptionValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ExceptionValidationError::Blank { target });
    }
    Ok(trimmed)
}

/// Values given directly on the command line; they take precedence over [`SettingsSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub level: Option<Severity>,
    pub exclude: Vec<String>,
    pub module_ignore: Vec<String>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateSettings {
    pub level: Severity,
    pub exceptions: ExceptionList,
}

impl GateSettings {
    /// Merge layered sources with command-line overrides.
    ///
    /// The level comes from the overrides, then the source, then defaults to `info`.
    /// Exceptions are the union of detailed entries, source lists and override lists,
    /// in that order; the first entry for a given id or module wins.
    pub fn resolve(source: SettingsSource, overrides: SettingsOverrides) -> Result<Self> {
        let level = match (overrides.level, source.level.as_deref()) {
            (Some(level), _) => level,
            (None, Some(name)) => name
                .parse::<Severity>()
                .with_context(|| format!("invalid audit level `{name}` in settings"))?,
            (None, None) => Severity::default(),
        };

        let mut exceptions = ExceptionList::new();
        for (idx, entry) in source.exceptions.iter().enumerate() {
            let exception = entry
                .to_exception()
                .with_context(|| format!("invalid exception entry #{}", idx + 1))?;
            exceptions.push(exception);
        }
        let ids = source.exclude.into_iter().chain(overrides.exclude);
        let modules = source.module_ignore.into_iter().chain(overrides.module_ignore);
        exceptions.extend(split_list(ids).map(Exception::advisory));
        exceptions.extend(split_list(modules).map(Exception::module));

        Ok(Self { level, exceptions })
    }
}

/// Flatten comma separated values and drop blanks.
fn split_list(values: impl Iterator<Item = String>) -> impl Iterator<Item = String> {
    values.flat_map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exceptions::ExceptionTarget;

    fn entry(id: Option<&str>, module: Option<&str>) -> ExceptionEntry {
        ExceptionEntry {
            id: id.map(str::to_string),
            module: module.map(str::to_string),
            active: true,
            expiry: None,
            notes: None,
        }
    }

    #[test]
    fn defaults_to_info_level_without_exceptions() {
        let settings =
            GateSettings::resolve(SettingsSource::default(), SettingsOverrides::default()).unwrap();
        assert_eq!(settings.level, Severity::Info);
        assert!(settings.exceptions.is_empty());
    }

    #[test]
    fn override_level_beats_source_level() {
        let source = SettingsSource {
            level: Some("low".into()),
            ..Default::default()
        };
        let overrides = SettingsOverrides {
            level: Some(Severity::Critical),
            ..Default::default()
        };
        let settings = GateSettings::resolve(source, overrides).unwrap();
        assert_eq!(settings.level, Severity::Critical);
    }

    #[test]
    fn rejects_unknown_source_level() {
        let source = SettingsSource {
            level: Some("urgent".into()),
            ..Default::default()
        };
        let err = GateSettings::resolve(source, SettingsOverrides::default()).unwrap_err();
        assert!(format!("{err:#}").contains("unknown severity `urgent`"));
    }

    #[test]
    fn merges_lists_in_order_and_splits_commas() {
        let source = SettingsSource {
            exclude: vec!["1001, 1002".into()],
            module_ignore: vec!["lodash".into()],
            exceptions: vec![entry(Some("900"), None)],
            ..Default::default()
        };
        let overrides = SettingsOverrides {
            exclude: vec!["1002".into(), "1003".into()],
            module_ignore: vec!["minimist,".into()],
            ..Default::default()
        };
        let settings = GateSettings::resolve(source, overrides).unwrap();
        let ids: Vec<_> = settings
            .exceptions
            .ids()
            .iter()
            .map(|e| e.target.value())
            .collect();
        let modules: Vec<_> = settings
            .exceptions
            .modules()
            .iter()
            .map(|e| e.target.value())
            .collect();
        assert_eq!(ids, vec!["900", "1001", "1002", "1003"]);
        assert_eq!(modules, vec!["lodash", "minimist"]);
    }

    #[test]
    fn detailed_entries_carry_expiry_and_activity() {
        let mut detailed = entry(None, Some("minimist"));
        detailed.expiry = Some("2030-06-01".into());
        detailed.notes = Some("waiting on upstream".into());
        detailed.active = false;

        let exception = detailed.to_exception().unwrap();
        assert_eq!(exception.target, ExceptionTarget::Module("minimist".into()));
        assert!(exception.expiry.is_some());
        assert_eq!(exception.notes.as_deref(), Some("waiting on upstream"));
        assert!(!exception.active);
    }

    #[test]
    fn entry_needs_exactly_one_target() {
        assert_eq!(
            entry(None, None).to_exception().unwrap_err(),
            ExceptionValidationError::AmbiguousTarget
        );
        assert_eq!(
            entry(Some("1"), Some("m")).to_exception().unwrap_err(),
            ExceptionValidationError::AmbiguousTarget
        );
        assert_eq!(
            entry(Some("  "), None).to_exception().unwrap_err(),
            ExceptionValidationError::Blank { target: "id" }
        );
    }

    #[test]
    fn lists_accept_strings_numbers_and_single_values() {
        let source: SettingsSource = serde_json::from_value(serde_json::json!({
            "level": "high",
            "exclude": [1001, "GHSA-abcd"],
            "module_ignore": "lodash, minimist"
        }))
        .unwrap();
        assert_eq!(source.exclude, vec!["1001", "GHSA-abcd"]);
        assert_eq!(source.module_ignore, vec!["lodash, minimist"]);

        let settings = GateSettings::resolve(source, SettingsOverrides::default()).unwrap();
        assert_eq!(settings.exceptions.modules().len(), 2);
        assert_eq!(settings.level, Severity::High);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let source: SettingsSource = serde_json::from_str("{}").unwrap();
        assert_eq!(source, SettingsSource::default());
    }

    #[test]
    fn bad_expiry_names_the_entry() {
        let mut detailed = entry(Some("1001"), None);
        detailed.expiry = Some("soon".into());
        let source = SettingsSource {
            exceptions: vec![detailed],
            ..Default::default()
        };
        let err = GateSettings::resolve(source, SettingsOverrides::default()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("invalid exception entry #1"));
        assert!(message.contains("invalid expiry `soon`"));
    }
}
