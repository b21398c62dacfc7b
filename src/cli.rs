use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::analyzer::formatter;
use crate::analyzer::types::Severity;

#[derive(Parser)]
#[command(name = "kubeguard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Audit Kubernetes workloads for insecure configuration")]
#[command(long_about = "Audits Kubernetes workload manifests or a live cluster for insecure security settings, honours reasoned overrides declared in labels or configuration, and fixes manifests in place while keeping their comments and layout.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Manifest file or directory to audit (repeatable). Without it the live cluster is audited
    #[arg(short = 'f', long = "manifest", global = true, value_name = "PATH")]
    pub manifests: Vec<PathBuf>,

    /// Only audit this namespace in cluster mode
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    /// Path to a kubeconfig file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub kubeconfig: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Lowest severity to print
    #[arg(short, long, global = true, value_enum, default_value = "warning")]
    pub min_severity: SeverityThreshold,

    /// Output format for findings
    #[arg(long, global = true, value_enum, default_value = "plain")]
    pub format: OutputFormat,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run every checker
    All,

    /// Containers that allow privilege escalation
    Privesc,

    /// Privileged containers
    Privileged,

    /// Containers with a writable root filesystem
    Rootfs,

    /// Containers that may run as root
    Nonroot,

    /// Capabilities that are added or not dropped
    Capabilities,

    /// Default service account tokens mounted into pods
    Sat,

    /// Pods sharing the host network, PID or IPC namespace
    Hostns,

    /// Containers without an AppArmor profile
    Apparmor,

    /// Pods and containers without a seccomp profile
    Seccomp,

    /// Images without a pinned tag
    Image,

    /// Containers without resource limits
    Limits,

    /// Network policies that allow all traffic
    Netpols,

    /// Fix manifests in place, keeping comments and layout
    Autofix {
        /// Write the fixed manifest here instead of over the input
        #[arg(short, long, value_name = "FILE")]
        outfile: Option<PathBuf>,

        /// Print a unified diff instead of writing
        #[arg(long)]
        diff: bool,
    },
}

impl Commands {
    /// Registry name of the single checker this command runs, if any.
    pub fn checker_name(&self) -> Option<&'static str> {
        match self {
            Commands::Privesc => Some("privesc"),
            Commands::Privileged => Some("privileged"),
            Commands::Rootfs => Some("rootfs"),
            Commands::Nonroot => Some("nonroot"),
            Commands::Capabilities => Some("capabilities"),
            Commands::Sat => Some("sat"),
            Commands::Hostns => Some("hostns"),
            Commands::Apparmor => Some("apparmor"),
            Commands::Seccomp => Some("seccomp"),
            Commands::Image => Some("image"),
            Commands::Limits => Some("limits"),
            Commands::Netpols => Some("netpols"),
            Commands::All | Commands::Autofix { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

impl From<OutputFormat> for formatter::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Plain => formatter::OutputFormat::Plain,
            OutputFormat::Json => formatter::OutputFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeverityThreshold {
    Error,
    Warning,
    Info,
    Debug,
}

impl From<SeverityThreshold> for Severity {
    fn from(threshold: SeverityThreshold) -> Self {
        match threshold {
            SeverityThreshold::Error => Severity::Error,
            SeverityThreshold::Warning => Severity::Warning,
            SeverityThreshold::Info => Severity::Info,
            SeverityThreshold::Debug => Severity::Debug,
        }
    }
}

impl Cli {
    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        let level = if self.quiet {
            log::LevelFilter::Error
        } else {
            match self.verbose {
                0 => log::LevelFilter::Warn,
                1 => log::LevelFilter::Info,
                2 => log::LevelFilter::Debug,
                _ => log::LevelFilter::Trace,
            }
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .init();
    }
}
