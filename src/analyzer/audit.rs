//! Runs checkers over resources.

use log::debug;
use rayon::prelude::*;

use crate::analyzer::overrides::{NamespaceLabels, OverrideResolver};
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence};
use crate::config::AuditConfig;

/// Shared read-only state every checker sees.
#[derive(Debug, Clone, Copy)]
pub struct AuditContext<'a> {
    pub config: &'a AuditConfig,
    pub namespace_labels: &'a NamespaceLabels,
}

impl<'a> AuditContext<'a> {
    pub fn new(config: &'a AuditConfig, namespace_labels: &'a NamespaceLabels) -> Self {
        Self {
            config,
            namespace_labels,
        }
    }

    pub fn overrides(&self) -> OverrideResolver<'a> {
        OverrideResolver::new(self.config, self.namespace_labels)
    }
}

/// A single security rule.
///
/// Implementations append zero or more occurrences to `result` and never
/// fail; conditions they cannot reason about become `InternalError`
/// occurrences.
pub trait Checker: Send + Sync {
    /// Name used on the command line.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn audit(&self, resource: &Resource, ctx: &AuditContext<'_>, result: &mut AuditResult);
}

/// Run every checker against one resource.
pub fn run_checks(
    resource: &Resource,
    checkers: &[&dyn Checker],
    ctx: &AuditContext<'_>,
) -> AuditResult {
    let mut result = AuditResult::new(resource.id());
    if !resource.is_supported() {
        result.push(Occurrence::new(
            Code::UnsupportedResource,
            format!("Resource kind {} is not audited", resource.kind()),
        ));
        return result;
    }
    for checker in checkers {
        checker.audit(resource, ctx, &mut result);
    }
    debug!(
        "Audited {} with {} checker(s): {} occurrence(s)",
        result.resource,
        checkers.len(),
        result.occurrences.len()
    );
    result
}

/// Audit many resources in parallel, keeping their input order.
pub fn audit_all(
    resources: &[Resource],
    checkers: &[&dyn Checker],
    ctx: &AuditContext<'_>,
) -> Vec<AuditResult> {
    resources
        .par_iter()
        .map(|resource| run_checks(resource, checkers, ctx))
        .collect()
}
