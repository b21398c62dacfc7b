//! Label and configuration driven exceptions to checker findings.
//!
//! A check can be overridden at four scopes, narrowest first:
//!
//! - container label `container.audit.kubeguard.io/<container>.<check>`
//! - pod label `audit.kubeguard.io/<check>` (pod template, then the object)
//! - namespace label `audit.kubeguard.io/<check>`
//! - the `overrides` table of the configuration document
//!
//! The value of the label or entry is the reason, and an empty reason does
//! not count as an override.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence, meta};
use crate::config::AuditConfig;

pub const LABEL_PREFIX: &str = "audit.kubeguard.io/";
pub const CONTAINER_LABEL_PREFIX: &str = "container.audit.kubeguard.io/";

/// Labels of every known namespace, keyed by namespace name.
pub type NamespaceLabels = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideSource {
    ContainerLabel,
    PodLabel,
    NamespaceLabel,
    Config,
}

impl OverrideSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContainerLabel => "container-label",
            Self::PodLabel => "pod-label",
            Self::NamespaceLabel => "namespace-label",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for OverrideSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved exception for one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub check: String,
    pub reason: String,
    pub source: OverrideSource,
}

/// The codes a checker reports through the override policy.
#[derive(Debug, Clone, Copy)]
pub struct OverridePolicy<'a> {
    pub check: &'a str,
    pub allowed: Code,
    pub misconfigured: Code,
}

/// Override check id for a single capability, e.g. `allow-capability-net-raw`.
pub fn capability_check(capability: &str) -> String {
    format!(
        "allow-capability-{}",
        capability.to_lowercase().replace('_', "-")
    )
}

fn non_empty<'m>(labels: Option<&'m BTreeMap<String, String>>, key: &str) -> Option<&'m str> {
    labels
        .and_then(|l| l.get(key))
        .map(String::as_str)
        .filter(|reason| !reason.trim().is_empty())
}

pub struct OverrideResolver<'a> {
    config: &'a AuditConfig,
    namespace_labels: &'a NamespaceLabels,
}

impl<'a> OverrideResolver<'a> {
    pub fn new(config: &'a AuditConfig, namespace_labels: &'a NamespaceLabels) -> Self {
        Self {
            config,
            namespace_labels,
        }
    }

    fn label_scopes<'r>(resource: &'r Resource) -> [Option<&'r BTreeMap<String, String>>; 2] {
        [
            resource.workload().and_then(|w| w.pod_labels()),
            resource.labels(),
        ]
    }

    fn namespace_scope(&self, resource: &Resource) -> Option<&'a BTreeMap<String, String>> {
        let namespace = resource.namespace().unwrap_or("default");
        self.namespace_labels.get(namespace)
    }

    /// Find the override for `check`, searching the narrowest scope first.
    pub fn resolve(
        &self,
        resource: &Resource,
        container: Option<&str>,
        check: &str,
    ) -> Option<Override> {
        let found = |reason: &str, source| Override {
            check: check.to_string(),
            reason: reason.to_string(),
            source,
        };
        let scopes = Self::label_scopes(resource);

        if let Some(container) = container {
            let key = format!("{CONTAINER_LABEL_PREFIX}{container}.{check}");
            if let Some(reason) = scopes.iter().find_map(|labels| non_empty(*labels, &key)) {
                return Some(found(reason, OverrideSource::ContainerLabel));
            }
        }

        let key = format!("{LABEL_PREFIX}{check}");
        if let Some(reason) = scopes.iter().find_map(|labels| non_empty(*labels, &key)) {
            return Some(found(reason, OverrideSource::PodLabel));
        }
        if let Some(reason) = non_empty(self.namespace_scope(resource), &key) {
            return Some(found(reason, OverrideSource::NamespaceLabel));
        }
        self.config
            .override_reason(check)
            .map(|reason| found(reason, OverrideSource::Config))
    }

    /// Every check id starting with `prefix` that has an override visible to
    /// `container`, whatever the scope.
    pub fn declared(
        &self,
        resource: &Resource,
        container: Option<&str>,
        prefix: &str,
    ) -> BTreeSet<String> {
        let mut checks = BTreeSet::new();
        let scoped = container.map(|c| format!("{CONTAINER_LABEL_PREFIX}{c}."));
        let scopes = Self::label_scopes(resource);
        let label_maps = scopes
            .into_iter()
            .chain(std::iter::once(self.namespace_scope(resource)))
            .flatten();

        for labels in label_maps {
            for key in labels.keys() {
                let check = key
                    .strip_prefix(LABEL_PREFIX)
                    .or_else(|| scoped.as_deref().and_then(|s| key.strip_prefix(s)));
                if let Some(check) = check.filter(|c| c.starts_with(prefix)) {
                    checks.insert(check.to_string());
                }
            }
        }
        checks.extend(
            self.config
                .overrides
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned(),
        );
        checks
    }

    /// Resolve `policy.check` and record the outcome.
    pub fn apply(
        &self,
        result: &mut AuditResult,
        policy: &OverridePolicy<'_>,
        resource: &Resource,
        container: Option<&str>,
        violation: Option<Occurrence>,
    ) {
        let resolved = self.resolve(resource, container, policy.check);
        report(result, policy, container, violation, resolved);
    }
}

/// Record a finding given its override, if any.
///
/// An overridden violation becomes the policy's `allowed` Warning. An override
/// with nothing to override becomes the `misconfigured` Warning, whatever the
/// source of the override.
pub fn report(
    result: &mut AuditResult,
    policy: &OverridePolicy<'_>,
    subject: Option<&str>,
    violation: Option<Occurrence>,
    resolved: Option<Override>,
) {
    match (violation, resolved) {
        (Some(occurrence), None) => result.push(occurrence),
        (Some(occurrence), Some(ov)) => {
            let mut allowed = Occurrence::new(
                policy.allowed,
                format!("{} Allowed by override: {}", occurrence.message, ov.reason),
            );
            allowed.subject = occurrence.subject.clone();
            allowed.metadata = occurrence.metadata;
            result.push(
                allowed
                    .with_metadata(meta::OVERRIDE, ov.check)
                    .with_metadata(meta::OVERRIDE_REASON, ov.reason)
                    .with_metadata(meta::OVERRIDE_SOURCE, ov.source.as_str())
                    .with_metadata(meta::OVERRIDDEN_CODE, occurrence.code.as_str()),
            );
        }
        (None, Some(ov)) => {
            let mut misconfigured = Occurrence::new(
                policy.misconfigured,
                format!(
                    "Override '{}' is set but the resource already complies; remove the override",
                    ov.check
                ),
            );
            if let Some(subject) = subject {
                misconfigured = misconfigured.with_subject(subject);
            }
            result.push(
                misconfigured
                    .with_metadata(meta::OVERRIDE, ov.check)
                    .with_metadata(meta::OVERRIDE_REASON, ov.reason)
                    .with_metadata(meta::OVERRIDE_SOURCE, ov.source.as_str()),
            );
        }
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::types::Severity;

    const POD: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: web
  namespace: prod
  labels:
    audit.kubeguard.io/allow-privileged: "pod reason"
    container.audit.kubeguard.io/app.allow-privilege-escalation: "container reason"
    container.audit.kubeguard.io/app.allow-capability-net-admin: "needs tc"
spec:
  containers:
  - name: app
    image: nginx
  - name: sidecar
    image: envoy
"#;

    fn pod() -> Resource {
        Resource::from_yaml(POD).unwrap()
    }

    fn namespaces() -> NamespaceLabels {
        let mut labels = BTreeMap::new();
        labels.insert(
            "prod".to_string(),
            BTreeMap::from([
                (
                    "audit.kubeguard.io/allow-privilege-escalation".to_string(),
                    "namespace reason".to_string(),
                ),
                (
                    "audit.kubeguard.io/allow-run-as-root".to_string(),
                    "namespace root".to_string(),
                ),
            ]),
        );
        labels
    }

    fn config() -> AuditConfig {
        AuditConfig::load_from_str(
            "overrides:\n  allow-privilege-escalation: config reason\n  allow-read-only-root-filesystem-false: config rootfs\n  allow-capability-sys-time: clock\n",
        )
        .unwrap()
    }

    #[test]
    fn test_container_label_beats_namespace_and_config() {
        let (config, ns) = (config(), namespaces());
        let resolver = OverrideResolver::new(&config, &ns);
        let resolved = resolver
            .resolve(&pod(), Some("app"), "allow-privilege-escalation")
            .unwrap();
        assert_eq!(resolved.reason, "container reason");
        assert_eq!(resolved.source, OverrideSource::ContainerLabel);

        let sidecar = resolver
            .resolve(&pod(), Some("sidecar"), "allow-privilege-escalation")
            .unwrap();
        assert_eq!(sidecar.reason, "namespace reason");
        assert_eq!(sidecar.source, OverrideSource::NamespaceLabel);
    }

    #[test]
    fn test_scopes_fall_back_in_order() {
        let (config, ns) = (config(), namespaces());
        let resolver = OverrideResolver::new(&config, &ns);
        let resource = pod();

        let pod_level = resolver.resolve(&resource, Some("app"), "allow-privileged").unwrap();
        assert_eq!(pod_level.source, OverrideSource::PodLabel);

        let ns_level = resolver.resolve(&resource, Some("app"), "allow-run-as-root").unwrap();
        assert_eq!(ns_level.reason, "namespace root");

        let from_config = resolver
            .resolve(&resource, Some("app"), "allow-read-only-root-filesystem-false")
            .unwrap();
        assert_eq!(from_config.source, OverrideSource::Config);

        assert!(resolver.resolve(&resource, Some("app"), "allow-automount-service-account-token").is_none());
    }

    #[test]
    fn test_empty_reason_is_not_an_override() {
        let resource = Resource::from_yaml(
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\n  labels:\n    audit.kubeguard.io/allow-privileged: \"\"\nspec:\n  containers: []\n",
        )
        .unwrap();
        let config = AuditConfig::default();
        let ns = NamespaceLabels::new();
        let resolver = OverrideResolver::new(&config, &ns);
        assert!(resolver.resolve(&resource, None, "allow-privileged").is_none());
    }

    #[test]
    fn test_declared_capability_overrides() {
        let (config, ns) = (config(), namespaces());
        let resolver = OverrideResolver::new(&config, &ns);
        let declared = resolver.declared(&pod(), Some("app"), "allow-capability-");
        assert_eq!(
            declared.into_iter().collect::<Vec<_>>(),
            vec!["allow-capability-net-admin", "allow-capability-sys-time"]
        );
        let sidecar = resolver.declared(&pod(), Some("sidecar"), "allow-capability-");
        assert_eq!(sidecar.len(), 1);
        assert_eq!(capability_check("NET_ADMIN"), "allow-capability-net-admin");
    }

    const PRIVILEGED: OverridePolicy<'static> = OverridePolicy {
        check: "allow-privileged",
        allowed: Code::PrivilegedAllowed,
        misconfigured: Code::PrivilegedMisconfiguredAllow,
    };

    fn overridden() -> Override {
        Override {
            check: "allow-privileged".to_string(),
            reason: "device plugin".to_string(),
            source: OverrideSource::PodLabel,
        }
    }

    fn result() -> AuditResult {
        AuditResult::new(pod().id())
    }

    #[test]
    fn test_overridden_violation_becomes_allowed_warning() {
        let mut result = result();
        let violation = Occurrence::new(Code::PrivilegedTrue, "privileged is true").with_subject("app");
        report(&mut result, &PRIVILEGED, Some("app"), Some(violation), Some(overridden()));

        let occ = &result.occurrences[0];
        assert_eq!(occ.code, Code::PrivilegedAllowed);
        assert_eq!(occ.severity, Severity::Warning);
        assert_eq!(occ.subject.as_deref(), Some("app"));
        assert_eq!(occ.metadata(meta::OVERRIDE_REASON), Some("device plugin"));
        assert_eq!(occ.metadata(meta::OVERRIDDEN_CODE), Some("PrivilegedTrue"));
    }

    #[test]
    fn test_override_without_violation_is_misconfigured() {
        let mut result = result();
        report(&mut result, &PRIVILEGED, Some("app"), None, Some(overridden()));
        let occ = &result.occurrences[0];
        assert_eq!(occ.code, Code::PrivilegedMisconfiguredAllow);
        assert_eq!(occ.severity, Severity::Warning);
        assert_eq!(occ.metadata(meta::OVERRIDE_SOURCE), Some("pod-label"));
        assert_eq!(occ.metadata(meta::OVERRIDDEN_CODE), None);
    }

    #[test]
    fn test_no_violation_no_override_is_silent() {
        let mut result = result();
        report(&mut result, &PRIVILEGED, None, None, None);
        assert!(result.is_empty());
    }
}
