use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::overrides::OverridePolicy;
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence};

pub const OVERRIDE: OverridePolicy<'static> = OverridePolicy {
    check: "allow-read-only-root-filesystem-false",
    allowed: Code::ReadOnlyRootFilesystemFalseAllowed,
    misconfigured: Code::ReadOnlyRootFilesystemMisconfiguredAllow,
};

/// Containers must mount their root filesystem read-only.
pub struct ReadOnlyRootFilesystem;

impl Checker for ReadOnlyRootFilesystem {
    fn name(&self) -> &'static str {
        "rootfs"
    }

    fn description(&self) -> &'static str {
        "Containers with a writable root filesystem"
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
                .and_then(|sc| sc.read_only_root_filesystem);
            let violation = match setting {
                None => Some(Occurrence::new(
                    Code::ReadOnlyRootFilesystemNil,
                    "readOnlyRootFilesystem not set, which defaults to false",
                )),
                Some(false) => Some(Occurrence::new(
                    Code::ReadOnlyRootFilesystemFalse,
                    "readOnlyRootFilesystem set to false",
                )),
                Some(true) => None,
            }
            .map(|occ| occ.with_subject(&container.name));
            overrides.apply(result, &OVERRIDE, resource, Some(&container.name), violation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::checks::testing::{audit_with, audit_yaml, pod_with_container};
    use crate::analyzer::overrides::NamespaceLabels;
    use crate::config::AuditConfig;

    #[test]
    fn test_settings() {
        let nil = audit_yaml(&ReadOnlyRootFilesystem, &pod_with_container(""));
        assert_eq!(nil.codes(), vec![Code::ReadOnlyRootFilesystemNil]);

        let off = audit_yaml(
            &ReadOnlyRootFilesystem,
            &pod_with_container("securityContext:\n      readOnlyRootFilesystem: false"),
        );
        assert_eq!(off.codes(), vec![Code::ReadOnlyRootFilesystemFalse]);

        let on = audit_yaml(
            &ReadOnlyRootFilesystem,
            &pod_with_container("securityContext:\n      readOnlyRootFilesystem: true"),
        );
        assert!(on.is_empty());
    }

    #[test]
    fn test_config_override() {
        let config = AuditConfig::load_from_str(
            "overrides:\n  allow-read-only-root-filesystem-false: writes to /tmp\n",
        )
        .unwrap();
        let ns = NamespaceLabels::new();
        let result = audit_with(&ReadOnlyRootFilesystem, &pod_with_container(""), &config, &ns);
        assert_eq!(result.codes(), vec![Code::ReadOnlyRootFilesystemFalseAllowed]);
        assert_eq!(
            result.occurrences[0].metadata(crate::analyzer::types::meta::OVERRIDDEN_CODE),
            Some("ReadOnlyRootFilesystemNil")
        );
    }
}
