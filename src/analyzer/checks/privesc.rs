use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::overrides::OverridePolicy;
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence};

pub const OVERRIDE: OverridePolicy<'static> = OverridePolicy {
    check: "allow-privilege-escalation",
    allowed: Code::AllowPrivilegeEscalationAllowed,
    misconfigured: Code::AllowPrivilegeEscalationMisconfiguredAllow,
};

/// Containers must set `allowPrivilegeEscalation: false`.
pub struct PrivilegeEscalation;

impl Checker for PrivilegeEscalation {
    fn name(&self) -> &'static str {
        "privesc"
    }

    fn description(&self) -> &'static str {
        "Containers that allow privilege escalation"
    }

    fn audit(&self, resource: &Resource, ctx: &AuditContext<'_>, result: &mut AuditResult) {
        let Some(workload) = resource.workload() else {
            return;
        };
        let overrides = ctx.overrides();
        for container in workload.containers() {
            let setting = container
                .security_context
                .as_ref()
                .and_then(|sc| sc.allow_privilege_escalation);
            let violation = match setting {
                None => Some(Occurrence::new(
                    Code::AllowPrivilegeEscalationNil,
                    "allowPrivilegeEscalation not set, which defaults to true",
                )),
                Some(true) => Some(Occurrence::new(
                    Code::AllowPrivilegeEscalationTrue,
                    "allowPrivilegeEscalation set to true",
                )),
                Some(false) => None,
            }
            .map(|occ| occ.with_subject(&container.name));
            overrides.apply(result, &OVERRIDE, resource, Some(&container.name), violation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::checks::testing::{audit_yaml, pod_with_container};
    use crate::analyzer::types::{Severity, meta};

    #[test]
    fn test_unset_and_true_are_errors() {
        let nil = audit_yaml(&PrivilegeEscalation, &pod_with_container(""));
        assert_eq!(nil.codes(), vec![Code::AllowPrivilegeEscalationNil]);
        assert_eq!(nil.occurrences[0].subject.as_deref(), Some("app"));

        let yes = audit_yaml(
            &PrivilegeEscalation,
            &pod_with_container("securityContext:\n      allowPrivilegeEscalation: true"),
        );
        assert_eq!(yes.codes(), vec![Code::AllowPrivilegeEscalationTrue]);
        assert_eq!(yes.occurrences[0].severity, Severity::Error);
    }

    #[test]
    fn test_false_passes() {
        let result = audit_yaml(
            &PrivilegeEscalation,
            &pod_with_container("securityContext:\n      allowPrivilegeEscalation: false"),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_container_label_allows() {
        let yaml = pod_with_container("securityContext:\n      allowPrivilegeEscalation: true").replace(
            "  name: web\n",
            "  name: web\n  labels:\n    container.audit.kubeguard.io/app.allow-privilege-escalation: \"setuid binary\"\n",
        );
        let result = audit_yaml(&PrivilegeEscalation, &yaml);
        assert_eq!(result.codes(), vec![Code::AllowPrivilegeEscalationAllowed]);
        assert_eq!(result.occurrences[0].metadata(meta::OVERRIDE_REASON), Some("setuid binary"));
    }
}
