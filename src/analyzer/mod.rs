//! # Analyzer Module
//!
//! The audit, override, fix and merge engines:
//! - `document` - comment-preserving YAML document model
//! - `resource` - typed views over supported workload kinds
//! - `audit` / `checks` - the checker contract and the built-in checkers
//! - `overrides` - label and configuration driven exceptions
//! - `fix` - remediation of findings
//! - `merge` - reconciles remediated objects with the authored text
//! - `manifest` / `cluster` - the two sources of resources

pub mod audit;
pub mod capset;
pub mod checks;
pub mod cluster;
pub mod document;
pub mod fix;
pub mod formatter;
pub mod manifest;
pub mod merge;
pub mod overrides;
pub mod resource;
pub mod types;

pub use audit::{AuditContext, Checker, audit_all, run_checks};
pub use fix::fix;
pub use manifest::{Manifest, audit_text, autofix_text};
pub use merge::merge_yaml;
pub use resource::Resource;
pub use types::{AuditResult, Code, Occurrence, ResourceId, Severity};
