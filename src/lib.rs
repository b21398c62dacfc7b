//! # kubeguard
//!
//! Audits Kubernetes workload manifests, or the workloads of a live cluster,
//! for insecure security settings and fixes manifests in place without
//! losing their comments or layout.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kubeguard::analyzer::{checks, manifest};
//! use kubeguard::config::AuditConfig;
//!
//! let text = std::fs::read_to_string("deploy.yaml").unwrap();
//! let fixed = manifest::autofix_text(&text, &checks::all(), &AuditConfig::default()).unwrap();
//! println!("{}", fixed.text);
//! ```

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;

pub use error::{KubeguardError, Result};
use cli::{Cli, Commands};
use config::AuditConfig;

/// The current version of the CLI tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the parsed command line and return the process exit status.
pub async fn run_command(cli: Cli, config: AuditConfig) -> Result<i32> {
    let outcome = match cli.command {
        Commands::Autofix { outfile, diff } => handlers::handle_autofix(
            handlers::AutofixOptions {
                manifests: cli.manifests,
                outfile,
                diff,
                format: cli.format.into(),
                min_severity: cli.min_severity.into(),
            },
            config,
        )?,
        ref command => {
            handlers::handle_audit(
                handlers::AuditOptions {
                    checker: command.checker_name(),
                    manifests: cli.manifests,
                    namespace: cli.namespace,
                    kubeconfig: cli.kubeconfig,
                    format: cli.format.into(),
                    min_severity: cli.min_severity.into(),
                },
                config,
            )
            .await?
        }
    };
    Ok(outcome.exit_code())
}
