use std::process::ExitCode;

use {
    anyhow::{Context, Result},
    tracing::{error, info, warn},
    wabridge_config::{LoadedConfig, Severity, validate},
};

use crate::EXIT_CONFIG;

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// `wabridge check`: print every diagnostic, exit 2 on errors.
pub fn check(loaded: &LoadedConfig) -> ExitCode {
    if let Some(ref path) = loaded.path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let result = validate(&loaded.config);
    for d in &result.diagnostics {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
    }

    let errors = result.errors().count();
    let warnings = result.warnings().count();
    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        ExitCode::from(EXIT_CONFIG)
    } else {
        ExitCode::SUCCESS
    }
}

/// Log diagnostics before startup. Returns `false` when any is an error.
pub fn report(loaded: &LoadedConfig) -> bool {
    match loaded.path {
        Some(ref path) => info!(path = %path.display(), "using config file"),
        None => info!("no config file found, using defaults"),
    }

    let result = validate(&loaded.config);
    for d in result.warnings() {
        warn!(path = d.path, "{}", d.message);
    }
    for d in result.errors() {
        error!(path = d.path, "{}", d.message);
    }
    !result.has_errors()
}

/// `wabridge init`: write the commented template to the user config dir.
pub fn init(force: bool) -> Result<()> {
    let dir = wabridge_config::config_dir().context("could not determine the config directory")?;
    let path = wabridge_config::write_default_config(&dir, force)?;
    eprintln!("Wrote {}", path.display());
    eprintln!("Set TOGETHER_API_KEY (or add it to .env) and run `wabridge` to pair.");
    Ok(())
}
