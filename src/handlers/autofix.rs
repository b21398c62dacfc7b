//! Handler for the `autofix` command.

use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::Colorize;
use log::{error, info};
use similar::{ChangeTag, TextDiff};
use tempfile::NamedTempFile;

use crate::analyzer::audit::Checker;
use crate::analyzer::formatter::OutputFormat;
use crate::analyzer::manifest::{audit_text, autofix_text};
use crate::analyzer::types::Severity;
use crate::config::AuditConfig;
use crate::error::{KubeguardError, Result};
use crate::handlers::utils::{
    Outcome, manifest_files, read_manifest, select_checkers, stdout_reporter,
};

/// Configuration for the autofix command
#[derive(Debug, Clone)]
pub struct AutofixOptions {
    pub manifests: Vec<PathBuf>,
    /// Destination for the fixed manifest; only valid with a single input
    pub outfile: Option<PathBuf>,
    /// Print a diff instead of writing
    pub diff: bool,
    pub format: OutputFormat,
    pub min_severity: Severity,
}

pub fn handle_autofix(options: AutofixOptions, config: AuditConfig) -> Result<Outcome> {
    if options.manifests.is_empty() && config.manifests.is_empty() {
        return Err(KubeguardError::Usage(
            "autofix only works on manifest files, pass them with -f/--manifest".to_string(),
        ));
    }
    let files = manifest_files(&options.manifests, &config.manifests);
    if options.outfile.is_some() && files.len() != 1 {
        return Err(KubeguardError::Usage(format!(
            "--outfile needs exactly one input manifest, got {}",
            files.len()
        )));
    }

    let checkers = select_checkers(None)?;
    let mut reporter = stdout_reporter(options.format, options.min_severity);
    let mut outcome = Outcome::default();
    let mut stdout = std::io::stdout();

    for path in &files {
        let fixed = match fix_file(path, &checkers, &config) {
            Ok(fixed) => fixed,
            Err(err) => {
                error!("{err:#}");
                outcome.failed_inputs += 1;
                continue;
            }
        };

        if options.diff {
            stdout.write_all(render_diff(path, &fixed.original, &fixed.text).as_bytes())?;
            continue;
        }

        let target = options.outfile.as_deref().unwrap_or(path);
        if fixed.changed > 0 || target != path.as_path() {
            if let Err(err) = write_atomically(target, &fixed.text) {
                error!("{err:#}");
                outcome.failed_inputs += 1;
                continue;
            }
            info!(
                "Fixed {} document(s) of {}, written to {}",
                fixed.changed,
                path.display(),
                target.display()
            );
        }

        // Whatever the fixes could not reach is still reported.
        for result in audit_text(&fixed.text, &checkers, &config) {
            outcome.errors |= result.has_errors();
            reporter.report(&result)?;
        }
    }

    if !options.diff {
        reporter.finish()?;
    }
    Ok(outcome)
}

struct FixedFile {
    original: String,
    text: String,
    changed: usize,
}

fn fix_file(
    path: &Path,
    checkers: &[&dyn Checker],
    config: &AuditConfig,
) -> anyhow::Result<FixedFile> {
    let original = read_manifest(path)?;
    let fixed = autofix_text(&original, checkers, config)
        .with_context(|| format!("failed to fix {}", path.display()))?;
    Ok(FixedFile {
        original,
        text: fixed.text,
        changed: fixed.changed,
    })
}

fn write_atomically(target: &Path, text: &str) -> anyhow::Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create a temporary file in {}", dir.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("failed to write {}", target.display()))?;
    if let Ok(metadata) = fs::metadata(target) {
        file.as_file()
            .set_permissions(metadata.permissions())
            .with_context(|| format!("failed to copy permissions of {}", target.display()))?;
    }
    file.persist(target)
        .with_context(|| format!("failed to replace {}", target.display()))?;
    Ok(())
}

/// Colored unified diff between the original and fixed manifest. Empty when
/// nothing changed.
pub fn render_diff(path: &Path, original: &str, fixed: &str) -> String {
    let diff = TextDiff::from_lines(original, fixed);
    let mut out = String::new();
    let mut unified = diff.unified_diff();
    unified.context_radius(3);
    let hunks: Vec<_> = unified.iter_hunks().collect();
    if hunks.is_empty() {
        return out;
    }

    let name = path.display();
    let _ = writeln!(out, "{}", format!("--- {name}").bold());
    let _ = writeln!(out, "{}", format!("+++ {name}").bold());
    for hunk in hunks {
        let _ = writeln!(out, "{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = change.value().trim_end_matches('\n');
            let rendered = match change.tag() {
                ChangeTag::Delete => format!("-{line}").red(),
                ChangeTag::Insert => format!("+{line}").green(),
                ChangeTag::Equal => format!(" {line}").normal(),
            };
            let _ = writeln!(out, "{rendered}");
            if change.missing_newline() {
                let _ = writeln!(out, "\\ No newline at end of file");
            }
        }
    }
    out
}
