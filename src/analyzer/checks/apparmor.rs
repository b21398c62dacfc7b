use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence, meta};

pub const ANNOTATION_PREFIX: &str = "container.apparmor.security.beta.kubernetes.io/";
pub const PROFILE_RUNTIME_DEFAULT: &str = "runtime/default";
const PROFILE_LOCALHOST_PREFIX: &str = "localhost/";

pub fn annotation_key(container: &str) -> String {
    format!("{ANNOTATION_PREFIX}{container}")
}

pub fn is_valid_profile(value: &str) -> bool {
    value == PROFILE_RUNTIME_DEFAULT
        || value
            .strip_prefix(PROFILE_LOCALHOST_PREFIX)
            .is_some_and(|profile| !profile.is_empty())
}

/// Every container needs an AppArmor profile annotation on the pod.
pub struct AppArmor;

impl Checker for AppArmor {
    fn name(&self) -> &'static str {
        "apparmor"
    }

    fn description(&self) -> &'static str {
        "Containers without an AppArmor profile"
    }

    fn audit(&self, resource: &Resource, _ctx: &AuditContext<'_>, result: &mut AuditResult) {
        let Some(workload) = resource.workload() else {
            return;
        };
        let annotations = workload.pod_annotations();
        let containers = workload.containers();

        for container in &containers {
            let key = annotation_key(&container.name);
            match annotations.and_then(|a| a.get(&key)) {
                None => result.push(
                    Occurrence::new(
                        Code::AppArmorAnnotationMissing,
                        format!("AppArmor annotation missing; set {key}: {PROFILE_RUNTIME_DEFAULT}"),
                    )
                    .with_subject(&container.name)
                    .with_metadata(meta::ANNOTATION, key),
                ),
                Some(value) if !is_valid_profile(value) => result.push(
                    Occurrence::new(
                        Code::AppArmorBadValue,
                        format!("AppArmor annotation has an unsafe value: {value}"),
                    )
                    .with_subject(&container.name)
                    .with_metadata(meta::ANNOTATION, key),
                ),
                Some(_) => {}
            }
        }

        for key in annotations.into_iter().flat_map(|a| a.keys()) {
            let Some(target) = key.strip_prefix(ANNOTATION_PREFIX) else {
                continue;
            };
            if !containers.iter().any(|c| c.name == target) {
                result.push(
                    Occurrence::new(
                        Code::AppArmorInvalidAnnotation,
                        format!("AppArmor annotation names container {target}, which does not exist"),
                    )
                    .with_metadata(meta::ANNOTATION, key.as_str()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::checks::testing::{audit_yaml, pod_with_container};

    fn annotated(annotations: &str) -> String {
        pod_with_container("").replace(
            "  name: web\n",
            &format!("  name: web\n  annotations:\n{annotations}"),
        )
    }

    #[test]
    fn test_missing_annotation() {
        let result = audit_yaml(&AppArmor, &pod_with_container(""));
        assert_eq!(result.codes(), vec![Code::AppArmorAnnotationMissing]);
        assert_eq!(
            result.occurrences[0].metadata(meta::ANNOTATION),
            Some("container.apparmor.security.beta.kubernetes.io/app")
        );
    }

    #[test]
    fn test_profile_values() {
        let good = annotated("    container.apparmor.security.beta.kubernetes.io/app: localhost/custom\n");
        assert!(audit_yaml(&AppArmor, &good).is_empty());

        let bad = annotated("    container.apparmor.security.beta.kubernetes.io/app: unconfined\n");
        assert_eq!(audit_yaml(&AppArmor, &bad).codes(), vec![Code::AppArmorBadValue]);
    }

    #[test]
    fn test_annotation_for_unknown_container() {
        let yaml = annotated(
            "    container.apparmor.security.beta.kubernetes.io/app: runtime/default\n    container.apparmor.security.beta.kubernetes.io/ghost: runtime/default\n",
        );
        let result = audit_yaml(&AppArmor, &yaml);
        assert_eq!(result.codes(), vec![Code::AppArmorInvalidAnnotation]);
    }
}
