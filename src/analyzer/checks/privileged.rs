use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::overrides::{OverridePolicy, report};
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence};

pub const OVERRIDE: OverridePolicy<'static> = OverridePolicy {
    check: "allow-privileged",
    allowed: Code::PrivilegedAllowed,
    misconfigured: Code::PrivilegedMisconfiguredAllow,
};

/// Containers must not run privileged. An unset flag is only a warning since
/// it defaults to false.
pub struct Privileged;

impl Checker for Privileged {
    fn name(&self) -> &'static str {
        "privileged"
    }

    fn description(&self) -> &'static str {
        "Containers running in privileged mode"
    }

    fn audit(&self, resource: &Resource, ctx: &AuditContext<'_>, result: &mut AuditResult) {
        let Some(workload) = resource.workload() else {
            return;
        };
        let overrides = ctx.overrides();
        for container in workload.containers() {
            let setting = container.security_context.as_ref().and_then(|sc| sc.privileged);
            let resolved = overrides.resolve(resource, Some(&container.name), OVERRIDE.check);
            let violation = match setting {
                Some(true) => Some(
                    Occurrence::new(Code::PrivilegedTrue, "privileged set to true")
                        .with_subject(&container.name),
                ),
                None if resolved.is_none() => {
                    result.push(
                        Occurrence::new(
                            Code::PrivilegedNil,
                            "privileged not set, which defaults to false",
                        )
                        .with_subject(&container.name),
                    );
                    continue;
                }
                _ => None,
            };
            report(
                result,
                &OVERRIDE,
                Some(&container.name),
                violation,
                resolved,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::checks::testing::{audit_yaml, pod_with_container};
    use crate::analyzer::types::Severity;

    #[test]
    fn test_unset_is_a_warning() {
        let result = audit_yaml(&Privileged, &pod_with_container(""));
        assert_eq!(result.codes(), vec![Code::PrivilegedNil]);
        assert_eq!(result.occurrences[0].severity, Severity::Warning);
    }

    #[test]
    fn test_true_is_an_error() {
        let result = audit_yaml(
            &Privileged,
            &pod_with_container("securityContext:\n      privileged: true"),
        );
        assert_eq!(result.codes(), vec![Code::PrivilegedTrue]);
    }

    #[test]
    fn test_label_on_compliant_container_is_misconfigured() {
        let yaml = pod_with_container("securityContext:\n      privileged: false").replace(
            "  name: web\n",
            "  name: web\n  labels:\n    audit.kubeguard.io/allow-privileged: \"gpu driver\"\n",
        );
        let result = audit_yaml(&Privileged, &yaml);
        assert_eq!(result.codes(), vec![Code::PrivilegedMisconfiguredAllow]);
        assert_eq!(result.occurrences[0].severity, Severity::Warning);
    }

    #[test]
    fn test_label_on_privileged_container_is_allowed() {
        let yaml = pod_with_container("securityContext:\n      privileged: true").replace(
            "  name: web\n",
            "  name: web\n  labels:\n    audit.kubeguard.io/allow-privileged: \"gpu driver\"\n",
        );
        let result = audit_yaml(&Privileged, &yaml);
        assert_eq!(result.codes(), vec![Code::PrivilegedAllowed]);
    }
}
