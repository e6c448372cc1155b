use std::path::Path;

use anyhow::{Context, Result};
use audit_gate_core::{GateSettings, SettingsOverrides, SettingsSource};
use config::{Config, Environment, File};

/// Prefix for environment overrides, e.g. `AUDIT_GATE_LEVEL=high`.
pub const ENV_PREFIX: &str = "AUDIT_GATE";

/// Layer the optional config file under `AUDIT_GATE_*` variables.
pub fn load_source(config_path: Option<&Path>) -> Result<SettingsSource> {
    let mut builder = Config::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    }
    // Values stay strings; comma separated lists are split during resolution.
    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));

    let layered = builder.build().with_context(|| match config_path {
        Some(path) => format!("failed to load configuration from {}", path.display()),
        None => "failed to load configuration from environment".to_string(),
    })?;
    layered
        .try_deserialize()
        .context("configuration does not match the expected settings shape")
}

/// Resolve the run settings from config, environment, and command-line overrides.
pub fn resolve(config_path: Option<&Path>, overrides: SettingsOverrides) -> Result<GateSettings> {
    let source = load_source(config_path)?;
    GateSettings::resolve(source, overrides)
}
