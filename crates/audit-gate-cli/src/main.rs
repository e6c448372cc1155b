use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use audit_gate_core::{Orchestrator, Severity, SettingsOverrides, Verdict};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod settings;

#[derive(Parser, Debug)]
#[command(
    name = "audit-gate",
    author,
    version,
    about = "Pass or fail a build from a dependency audit report"
)]
struct Cli {
    /// Settings file (TOML, YAML, or JSON) with level and exception lists
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Disable colored terminal output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check an audit report (e.g. `npm audit --json`) against the level and exceptions
    Check(CheckArgs),
}

#[derive(clap::Args, Debug, Default)]
struct CheckArgs {
    /// Audit JSON to read; `-` or omitted reads stdin
    #[arg(long, short = 'i', value_name = "FILE")]
    input: Option<PathBuf>,

    /// Minimum severity that fails the build (info, low, moderate, high, critical)
    #[arg(long, short = 'l', value_name = "LEVEL")]
    level: Option<Severity>,

    /// Advisory ids to except, comma separated
    #[arg(long, short = 'x', value_name = "IDS", value_delimiter = ',')]
    exclude: Vec<String>,

    /// Module names to except, comma separated. Silences every advisory for the module,
    /// including ones published later.
    #[arg(long, short = 'm', value_name = "MODULES", value_delimiter = ',')]
    module_ignore: Vec<String>,

    /// Directory that receives `.sast/audit_report.json`
    #[arg(long, value_name = "DIR", default_value = ".")]
    root: PathBuf,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }
    let args = match cli.command {
        Some(Commands::Check(args)) => args,
        None => CheckArgs {
            root: PathBuf::from("."),
            ..CheckArgs::default()
        },
    };

    match check(cli.config.as_deref(), args) {
        Ok(verdict) => ExitCode::from(verdict.exit_code()),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn check(config_path: Option<&Path>, args: CheckArgs) -> Result<Verdict> {
    let overrides = SettingsOverrides {
        level: args.level,
        exclude: args.exclude,
        module_ignore: args.module_ignore,
    };
    let settings = settings::resolve(config_path, overrides)?;
    debug!(
        level = %settings.level,
        exception_ids = settings.exceptions.ids().len(),
        exception_modules = settings.exceptions.modules().len(),
        "resolved settings"
    );

    let raw = read_input(args.input.as_deref())?;
    let stdout = io::stdout();
    let stderr = io::stderr();
    let verdict = Orchestrator::new(&args.root)
        .run(&raw, &settings, &mut stdout.lock(), &mut stderr.lock())
        .context("failed to write audit output")?;
    Ok(verdict)
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("failed to read audit input from {}", path.display())),
        _ => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read audit input from stdin")?;
            Ok(buffer)
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();
}
