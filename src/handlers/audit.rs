//! Handler for the checker commands.
//!
//! Audits manifest files when any are given (on the command line or in the
//! configuration) and the live cluster otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};

use crate::analyzer::cluster::ClusterSource;
use crate::analyzer::formatter::{OutputFormat, Reporter};
use crate::analyzer::manifest::audit_text;
use crate::analyzer::types::{AuditResult, Severity};
use crate::config::AuditConfig;
use crate::error::Result;
use crate::handlers::utils::{
    Outcome, manifest_files, read_manifest, select_checkers, stdout_reporter,
};

/// Configuration for a checker command
#[derive(Debug, Clone)]
pub struct AuditOptions {
    /// Registry name of the checker to run, or every checker
    pub checker: Option<&'static str>,
    /// Manifest files or directories from the command line
    pub manifests: Vec<PathBuf>,
    /// Namespace scope in cluster mode
    pub namespace: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub format: OutputFormat,
    pub min_severity: Severity,
}

pub async fn handle_audit(options: AuditOptions, config: AuditConfig) -> Result<Outcome> {
    let mut reporter = stdout_reporter(options.format, options.min_severity);
    let outcome = run_audit(&options, config, reporter.as_mut()).await?;
    reporter.finish()?;
    Ok(outcome)
}

/// Audit and feed every result to `reporter`.
pub async fn run_audit(
    options: &AuditOptions,
    config: AuditConfig,
    reporter: &mut dyn Reporter,
) -> Result<Outcome> {
    let checkers = select_checkers(options.checker)?;
    let mut outcome = Outcome::default();

    if options.manifests.is_empty() && config.manifests.is_empty() {
        let source =
            ClusterSource::connect(options.kubeconfig.as_deref(), options.namespace.clone())
                .await?;
        let results = source.audit(checkers, Arc::new(config)).await;
        report_all(&results, reporter, &mut outcome)?;
        return Ok(outcome);
    }

    for path in &manifest_files(&options.manifests, &config.manifests) {
        info!("Auditing {}", path.display());
        let text = match read_manifest(path) {
            Ok(text) => text,
            Err(err) => {
                error!("{err:#}");
                outcome.failed_inputs += 1;
                continue;
            }
        };
        let results = audit_text(&text, &checkers, &config);
        report_all(&results, reporter, &mut outcome)?;
    }
    Ok(outcome)
}

fn report_all(
    results: &[AuditResult],
    reporter: &mut dyn Reporter,
    outcome: &mut Outcome,
) -> Result<()> {
    for result in results {
        outcome.errors |= result.has_errors();
        reporter.report(result)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;

    #[derive(Default)]
    struct Collect(Vec<AuditResult>);

    impl Reporter for Collect {
        fn report(&mut self, result: &AuditResult) -> io::Result<()> {
            self.0.push(result.clone());
            Ok(())
        }

        fn finish(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn options(checker: &'static str, manifests: Vec<PathBuf>) -> AuditOptions {
        AuditOptions {
            checker: Some(checker),
            manifests,
            namespace: None,
            kubeconfig: None,
            format: OutputFormat::Plain,
            min_severity: Severity::Error,
        }
    }

    #[tokio::test]
    async fn test_errors_decide_outcome_regardless_of_min_severity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pod.yaml");
        fs::write(
            &path,
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: web\nspec:\n  containers:\n  - name: app\n    image: nginx:1.25\n",
        )
        .unwrap();

        let mut collect = Collect::default();
        let outcome = run_audit(&options("rootfs", vec![path]), AuditConfig::default(), &mut collect)
            .await
            .unwrap();
        assert!(outcome.errors);
        assert_eq!(collect.0.len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.yaml");
        fs::write(&good, "apiVersion: v1\nkind: Service\nmetadata:\n  name: s\n").unwrap();
        let missing = dir.path().join("missing.yaml");

        let mut collect = Collect::default();
        let outcome = run_audit(
            &options("image", vec![missing, good]),
            AuditConfig::default(),
            &mut collect,
        )
        .await
        .unwrap();
        assert_eq!(outcome.failed_inputs, 1);
        assert!(!outcome.errors);
        assert_eq!(collect.0.len(), 1);
    }
}
