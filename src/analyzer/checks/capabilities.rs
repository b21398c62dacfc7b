//! Capability checks.
//!
//! Every container must drop the recommended capabilities (the configured
//! policy, or the built-in list) and must not add any. Each capability is
//! overridable on its own through `allow-capability-<name>`.

use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::capset::CapSet;
use crate::analyzer::overrides::{OverridePolicy, capability_check, report};
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence, meta};

fn policy(check: &str) -> OverridePolicy<'_> {
    OverridePolicy {
        check,
        allowed: Code::CapabilityAllowed,
        misconfigured: Code::CapabilityMisconfiguredAllow,
    }
}

pub struct Capabilities;

impl Checker for Capabilities {
    fn name(&self) -> &'static str {
        "capabilities"
    }

    fn description(&self) -> &'static str {
        "Containers that add capabilities or do not drop the recommended ones"
    }

    fn audit(&self, resource: &Resource, ctx: &AuditContext<'_>, result: &mut AuditResult) {
        let Some(workload) = resource.workload() else {
            return;
        };
        let recommended = match ctx.config.recommended_drops() {
            Ok(drops) => drops,
            Err(message) => {
                result.push(
                    Occurrence::new(Code::InternalError, "Capability policy could not be read")
                        .with_metadata(meta::ERROR, message),
                );
                return;
            }
        };
        let overrides = ctx.overrides();

        for container in workload.containers() {
            let name = container.name.as_str();
            let capabilities = container
                .security_context
                .as_ref()
                .and_then(|sc| sc.capabilities.as_ref());
            let mut violated = CapSet::new();

            match capabilities {
                None => {
                    let mut unexcused = CapSet::new();
                    for cap in recommended.iter() {
                        violated.insert(cap);
                        let check = capability_check(cap);
                        match overrides.resolve(resource, Some(name), &check) {
                            Some(ov) => {
                                let occurrence = Occurrence::new(
                                    Code::CapabilityOrSecurityContextMissing,
                                    format!("Capability {cap} not dropped: capabilities not set"),
                                )
                                .with_subject(name)
                                .with_metadata(meta::CAPABILITY, cap);
                                report(result, &policy(&check), Some(name), Some(occurrence), Some(ov));
                            }
                            None => {
                                unexcused.insert(cap);
                            }
                        }
                    }
                    if !unexcused.is_empty() {
                        result.push(
                            Occurrence::new(
                                Code::CapabilityOrSecurityContextMissing,
                                format!(
                                    "securityContext.capabilities not set; recommended drops: {unexcused}"
                                ),
                            )
                            .with_subject(name)
                            .with_metadata(meta::CAPABILITIES, unexcused.to_string()),
                        );
                    }
                }
                Some(caps) => {
                    let dropped: CapSet = caps.drop.iter().flatten().collect();
                    let added: CapSet = caps.add.iter().flatten().collect();
                    let not_dropped = if dropped.contains("ALL") {
                        CapSet::new()
                    } else {
                        recommended.difference(&dropped)
                    };
                    for cap in not_dropped.iter() {
                        violated.insert(cap);
                        let occurrence = Occurrence::new(
                            Code::CapabilityNotDropped,
                            format!("Capability {cap} should be dropped"),
                        )
                        .with_subject(name)
                        .with_metadata(meta::CAPABILITY, cap);
                        overrides.apply(result, &policy(&capability_check(cap)), resource, Some(name), Some(occurrence));
                    }
                    for cap in added.iter() {
                        violated.insert(cap);
                        let occurrence = Occurrence::new(
                            Code::CapabilityAdded,
                            format!("Capability {cap} added"),
                        )
                        .with_subject(name)
                        .with_metadata(meta::CAPABILITY, cap);
                        overrides.apply(result, &policy(&capability_check(cap)), resource, Some(name), Some(occurrence));
                    }
                }
            }

            for check in overrides.declared(resource, Some(name), "allow-capability-") {
                if !violated.iter().any(|cap| capability_check(cap) == check) {
                    overrides.apply(result, &policy(&check), resource, Some(name), None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::checks::testing::{audit_with, audit_yaml, pod_with_container};
    use crate::analyzer::overrides::NamespaceLabels;
    use crate::config::AuditConfig;

    fn restricted_config() -> AuditConfig {
        AuditConfig::load_from_str("capabilities:\n  NET_RAW: drop\n  SYS_ADMIN: drop\n  CHOWN: keep\n")
            .unwrap()
    }

    #[test]
    fn test_missing_capabilities_reports_once() {
        let result = audit_yaml(&Capabilities, &pod_with_container(""));
        assert_eq!(result.codes(), vec![Code::CapabilityOrSecurityContextMissing]);
        let listed = result.occurrences[0].metadata(meta::CAPABILITIES).unwrap();
        assert!(listed.contains("NET_RAW"));
        assert!(listed.contains("SYS_CHROOT"));
    }

    #[test]
    fn test_drop_all_passes() {
        let result = audit_yaml(
            &Capabilities,
            &pod_with_container("securityContext:\n      capabilities:\n        drop: [\"ALL\"]"),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_not_dropped_and_added() {
        let config = restricted_config();
        let ns = NamespaceLabels::new();
        let result = audit_with(
            &Capabilities,
            &pod_with_container(
                "securityContext:\n      capabilities:\n        drop: [\"cap_net_raw\"]\n        add: [\"NET_ADMIN\"]",
            ),
            &config,
            &ns,
        );
        assert_eq!(result.codes(), vec![Code::CapabilityNotDropped, Code::CapabilityAdded]);
        assert_eq!(result.occurrences[0].metadata(meta::CAPABILITY), Some("SYS_ADMIN"));
        assert_eq!(result.occurrences[1].metadata(meta::CAPABILITY), Some("NET_ADMIN"));
    }

    #[test]
    fn test_capability_overrides() {
        let config = restricted_config();
        let ns = NamespaceLabels::new();
        let yaml = pod_with_container(
            "securityContext:\n      capabilities:\n        drop: [\"NET_RAW\", \"SYS_ADMIN\"]\n        add: [\"NET_ADMIN\"]",
        )
        .replace(
            "  name: web\n",
            "  name: web\n  labels:\n    container.audit.kubeguard.io/app.allow-capability-net-admin: \"traffic shaping\"\n    container.audit.kubeguard.io/app.allow-capability-sys-time: \"ntp\"\n",
        );
        let result = audit_with(&Capabilities, &yaml, &config, &ns);
        assert_eq!(
            result.codes(),
            vec![Code::CapabilityAllowed, Code::CapabilityMisconfiguredAllow]
        );
        assert_eq!(
            result.occurrences[1].metadata(meta::OVERRIDE),
            Some("allow-capability-sys-time")
        );
    }

    #[test]
    fn test_invalid_policy_is_internal_error() {
        let config = AuditConfig::load_from_str("capabilities:\n  CHOWN: sometimes\n").unwrap();
        let ns = NamespaceLabels::new();
        let result = audit_with(&Capabilities, &pod_with_container(""), &config, &ns);
        assert_eq!(result.codes(), vec![Code::InternalError]);
    }
}
