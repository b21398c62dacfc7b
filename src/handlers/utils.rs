use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::analyzer::audit::Checker;
use crate::analyzer::checks;
use crate::analyzer::formatter::{self, OutputFormat, Reporter};
use crate::analyzer::manifest;
use crate::analyzer::types::Severity;
use crate::error::{KubeguardError, Result};

/// Exit status when at least one Error occurrence was produced.
pub const EXIT_FINDINGS: i32 = 2;
/// Exit status when an input could not be processed.
pub const EXIT_INPUT_ERROR: i32 = 1;

/// What a command run amounted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// An Error-severity occurrence was produced, printed or not.
    pub errors: bool,
    /// Inputs that were skipped after a read, parse or write failure.
    pub failed_inputs: usize,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        if self.errors {
            EXIT_FINDINGS
        } else if self.failed_inputs > 0 {
            EXIT_INPUT_ERROR
        } else {
            0
        }
    }
}

/// The named checker, or every registered checker.
pub fn select_checkers(name: Option<&str>) -> Result<Vec<&'static dyn Checker>> {
    match name {
        None => Ok(checks::all()),
        Some(name) => checks::get_checker(name).map(|c| vec![c]).ok_or_else(|| {
            KubeguardError::Usage(format!(
                "unknown checker '{name}', expected one of: {}",
                checks::names().join(", ")
            ))
        }),
    }
}

/// Manifest files to work on: the command-line paths, or the configured ones.
pub fn manifest_files(cli_paths: &[PathBuf], configured: &[PathBuf]) -> Vec<PathBuf> {
    let paths = if cli_paths.is_empty() {
        configured
    } else {
        cli_paths
    };
    manifest::discover(paths)
}

pub fn read_manifest(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read manifest {}", path.display()))
}

/// Reporter writing to stdout. Colors are disabled when stdout is not a terminal.
pub fn stdout_reporter(format: OutputFormat, min_severity: Severity) -> Box<dyn Reporter> {
    let stdout = io::stdout();
    if !stdout.is_terminal() {
        colored::control::set_override(false);
    }
    formatter::reporter(format, min_severity, Box::new(stdout))
}
