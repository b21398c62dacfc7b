use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::overrides::OverridePolicy;
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence};

pub const OVERRIDE: OverridePolicy<'static> = OverridePolicy {
    check: "allow-run-as-root",
    allowed: Code::RunAsNonRootFalseAllowed,
    misconfigured: Code::RunAsNonRootMisconfiguredAllow,
};

/// Containers must run as a non-root user.
///
/// A container-level `runAsNonRoot` wins; the pod-level setting is only
/// consulted when the container leaves it unset.
pub struct RunAsNonRoot;

impl Checker for RunAsNonRoot {
    fn name(&self) -> &'static str {
        "nonroot"
    }

    fn description(&self) -> &'static str {
        "Containers allowed to run as root"
    }

    fn audit(&self, resource: &Resource, ctx: &AuditContext<'_>, result: &mut AuditResult) {
        let Some(workload) = resource.workload() else {
            return;
        };
        let pod_setting = workload
            .pod_spec()
            .and_then(|spec| spec.security_context.as_ref())
            .and_then(|psc| psc.run_as_non_root);
        let overrides = ctx.overrides();

        for container in workload.containers() {
            let container_setting = container
                .security_context
                .as_ref()
                .and_then(|sc| sc.run_as_non_root);
            let violation = match (container_setting, pod_setting) {
                (Some(false), _) => Some(Occurrence::new(
                    Code::RunAsNonRootCscFalse,
                    "runAsNonRoot set to false in the container securityContext",
                )),
                (None, None) => Some(Occurrence::new(
                    Code::RunAsNonRootPscNilCscNil,
                    "runAsNonRoot not set in the container or pod securityContext",
                )),
                (None, Some(false)) => Some(Occurrence::new(
                    Code::RunAsNonRootPscFalseCscNil,
                    "runAsNonRoot set to false in the pod securityContext and not set in the container",
                )),
                (Some(true), _) | (None, Some(true)) => None,
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

    fn with_pod_context(container: &str, pod: &str) -> String {
        pod_with_container(container).replace("spec:\n", &format!("spec:\n  securityContext:\n    {pod}\n"))
    }

    #[test]
    fn test_container_setting_wins() {
        let result = audit_yaml(
            &RunAsNonRoot,
            &with_pod_context("securityContext:\n      runAsNonRoot: false", "runAsNonRoot: true"),
        );
        assert_eq!(result.codes(), vec![Code::RunAsNonRootCscFalse]);

        let result = audit_yaml(
            &RunAsNonRoot,
            &with_pod_context("securityContext:\n      runAsNonRoot: true", "runAsNonRoot: false"),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_pod_setting_applies_when_container_unset() {
        let inherited = audit_yaml(&RunAsNonRoot, &with_pod_context("", "runAsNonRoot: true"));
        assert!(inherited.is_empty());

        let pod_false = audit_yaml(&RunAsNonRoot, &with_pod_context("", "runAsNonRoot: false"));
        assert_eq!(pod_false.codes(), vec![Code::RunAsNonRootPscFalseCscNil]);

        let neither = audit_yaml(&RunAsNonRoot, &pod_with_container(""));
        assert_eq!(neither.codes(), vec![Code::RunAsNonRootPscNilCscNil]);
    }
}
