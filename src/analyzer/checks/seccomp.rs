use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence, meta};

pub const POD_ANNOTATION: &str = "seccomp.security.alpha.kubernetes.io/pod";
pub const CONTAINER_ANNOTATION_PREFIX: &str = "container.seccomp.security.alpha.kubernetes.io/";
pub const PROFILE_RUNTIME_DEFAULT: &str = "runtime/default";
const PROFILE_DOCKER_DEFAULT: &str = "docker/default";
const PROFILE_UNCONFINED: &str = "unconfined";

pub fn container_annotation_key(container: &str) -> String {
    format!("{CONTAINER_ANNOTATION_PREFIX}{container}")
}

/// Pods must run under a seccomp profile, set for the pod or per container.
pub struct Seccomp;

impl Checker for Seccomp {
    fn name(&self) -> &'static str {
        "seccomp"
    }

    fn description(&self) -> &'static str {
        "Pods and containers without a seccomp profile"
    }

    fn audit(&self, resource: &Resource, _ctx: &AuditContext<'_>, result: &mut AuditResult) {
        let Some(workload) = resource.workload() else {
            return;
        };
        let annotations = workload.pod_annotations();
        let pod_profile = annotations.and_then(|a| a.get(POD_ANNOTATION));

        match pod_profile.map(String::as_str) {
            Some(PROFILE_DOCKER_DEFAULT) => result.push(
                Occurrence::new(
                    Code::SeccompDeprecatedPod,
                    format!("Pod seccomp profile {PROFILE_DOCKER_DEFAULT} is deprecated; use {PROFILE_RUNTIME_DEFAULT}"),
                )
                .with_metadata(meta::ANNOTATION, POD_ANNOTATION),
            ),
            Some(PROFILE_UNCONFINED) => result.push(
                Occurrence::new(Code::SeccompDisabledPod, "Pod seccomp profile is unconfined")
                    .with_metadata(meta::ANNOTATION, POD_ANNOTATION),
            ),
            _ => {}
        }

        for container in workload.containers() {
            let key = container_annotation_key(&container.name);
            let profile = annotations.and_then(|a| a.get(&key)).map(String::as_str);
            let occurrence = match profile {
                None if pod_profile.is_none() => Occurrence::new(
                    Code::SeccompAnnotationMissing,
                    format!("Seccomp annotation missing; set {POD_ANNOTATION}: {PROFILE_RUNTIME_DEFAULT}"),
                ),
                Some(PROFILE_DOCKER_DEFAULT) => Occurrence::new(
                    Code::SeccompDeprecatedContainer,
                    format!("Container seccomp profile {PROFILE_DOCKER_DEFAULT} is deprecated; use {PROFILE_RUNTIME_DEFAULT}"),
                )
                .with_metadata(meta::ANNOTATION, key),
                Some(PROFILE_UNCONFINED) => {
                    Occurrence::new(Code::SeccompDisabledContainer, "Container seccomp profile is unconfined")
                        .with_metadata(meta::ANNOTATION, key)
                }
                _ => continue,
            };
            result.push(occurrence.with_subject(&container.name));
        }
    }
}
