use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence};

/// Containers should declare CPU and memory limits.
pub struct Limits;

impl Checker for Limits {
    fn name(&self) -> &'static str {
        "limits"
    }

    fn description(&self) -> &'static str {
        "Containers without CPU or memory limits"
    }

    fn audit(&self, resource: &Resource, _ctx: &AuditContext<'_>, result: &mut AuditResult) {
        let Some(workload) = resource.workload() else {
            return;
        };
        for container in workload.containers() {
            let limits = container
                .resources
                .as_ref()
                .and_then(|r| r.limits.as_ref())
                .filter(|l| !l.is_empty());
            let Some(limits) = limits else {
                result.push(
                    Occurrence::new(Code::LimitsNotSet, "Resource limits not set")
                        .with_subject(&container.name),
                );
                continue;
            };
            if !limits.contains_key("cpu") {
                result.push(
                    Occurrence::new(Code::LimitsCpuNotSet, "CPU limit not set")
                        .with_subject(&container.name),
                );
            }
            if !limits.contains_key("memory") {
                result.push(
                    Occurrence::new(Code::LimitsMemoryNotSet, "Memory limit not set")
                        .with_subject(&container.name),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::checks::testing::{audit_yaml, pod_with_container};

    #[test]
    fn test_limits() {
        let none = audit_yaml(&Limits, &pod_with_container(""));
        assert_eq!(none.codes(), vec![Code::LimitsNotSet]);

        let cpu_only = audit_yaml(&Limits, &pod_with_container("resources:\n      limits:\n        cpu: 500m"));
        assert_eq!(cpu_only.codes(), vec![Code::LimitsMemoryNotSet]);

        let both = audit_yaml(
            &Limits,
            &pod_with_container("resources:\n      limits:\n        cpu: 1\n        memory: 256Mi"),
        );
        assert!(both.is_empty());
    }
}
