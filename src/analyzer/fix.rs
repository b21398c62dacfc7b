//! Remediation of audit findings.
//!
//! Fixing is two-phase. `Prepared::normalize` first creates the substructures
//! the findings need (a container `securityContext`, a `capabilities.drop`
//! list); remedies then patch fields through the `Prepared` handle, which is
//! the only way to reach the workload, so no remedy can run before
//! normalization.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Capabilities, PodSpec, SecurityContext};
use log::debug;

use crate::analyzer::capset::normalize;
use crate::analyzer::checks::{apparmor, seccomp};
use crate::analyzer::resource::{Resource, Workload};
use crate::analyzer::types::{AuditResult, Code, Occurrence, meta};

/// A remediation for one occurrence.
pub type Remedy = fn(&mut Prepared<'_>, &Occurrence);

/// A workload whose substructures have been created for a set of findings.
pub struct Prepared<'a> {
    workload: &'a mut dyn Workload,
}

fn needs_security_context(code: Code) -> bool {
    matches!(
        code,
        Code::AllowPrivilegeEscalationNil
            | Code::AllowPrivilegeEscalationTrue
            | Code::PrivilegedNil
            | Code::PrivilegedTrue
            | Code::ReadOnlyRootFilesystemNil
            | Code::ReadOnlyRootFilesystemFalse
            | Code::RunAsNonRootPscNilCscNil
            | Code::RunAsNonRootPscFalseCscNil
            | Code::RunAsNonRootCscFalse
            | Code::CapabilityOrSecurityContextMissing
            | Code::CapabilityNotDropped
            | Code::CapabilityAdded
    )
}

fn needs_drop_list(code: Code) -> bool {
    matches!(
        code,
        Code::CapabilityOrSecurityContextMissing | Code::CapabilityNotDropped
    )
}

impl<'a> Prepared<'a> {
    /// Create the substructures `occurrences` will patch, and nothing else.
    fn normalize(workload: &'a mut dyn Workload, occurrences: &[&Occurrence]) -> Self {
        for occurrence in occurrences {
            if !needs_security_context(occurrence.code) {
                continue;
            }
            let Some(container) = occurrence
                .subject
                .as_deref()
                .and_then(|name| workload.container_mut(name))
            else {
                continue;
            };
            let context = container
                .security_context
                .get_or_insert_with(SecurityContext::default);
            if needs_drop_list(occurrence.code) {
                context
                    .capabilities
                    .get_or_insert_with(Capabilities::default)
                    .drop
                    .get_or_insert_with(Vec::new);
            }
        }
        Self { workload }
    }

    fn security_context(&mut self, container: &str) -> Option<&mut SecurityContext> {
        self.workload
            .container_mut(container)?
            .security_context
            .as_mut()
    }

    fn capabilities(&mut self, container: &str) -> Option<&mut Capabilities> {
        self.security_context(container)?.capabilities.as_mut()
    }

    fn annotations(&mut self) -> Option<&mut BTreeMap<String, String>> {
        self.workload.pod_annotations_mut()
    }

    fn pod_spec(&mut self) -> Option<&mut PodSpec> {
        self.workload.pod_spec_mut()
    }
}

fn with_context(prepared: &mut Prepared<'_>, occurrence: &Occurrence, patch: fn(&mut SecurityContext)) {
    if let Some(context) = occurrence
        .subject
        .as_deref()
        .and_then(|name| prepared.security_context(name))
    {
        patch(context);
    }
}

fn disallow_privilege_escalation(prepared: &mut Prepared<'_>, occurrence: &Occurrence) {
    with_context(prepared, occurrence, |sc| sc.allow_privilege_escalation = Some(false));
}

fn disable_privileged(prepared: &mut Prepared<'_>, occurrence: &Occurrence) {
    with_context(prepared, occurrence, |sc| sc.privileged = Some(false));
}

fn read_only_root_filesystem(prepared: &mut Prepared<'_>, occurrence: &Occurrence) {
    with_context(prepared, occurrence, |sc| sc.read_only_root_filesystem = Some(true));
}

fn run_as_non_root(prepared: &mut Prepared<'_>, occurrence: &Occurrence) {
    with_context(prepared, occurrence, |sc| sc.run_as_non_root = Some(true));
}

fn push_drops<'n>(prepared: &mut Prepared<'_>, occurrence: &Occurrence, names: impl Iterator<Item = &'n str>) {
    let Some(drops) = occurrence
        .subject
        .as_deref()
        .and_then(|name| prepared.capabilities(name))
        .and_then(|caps| caps.drop.as_mut())
    else {
        return;
    };
    for name in names.map(normalize).filter(|n| !n.is_empty()) {
        if !drops.iter().any(|existing| normalize(existing) == name) {
            drops.push(name);
        }
    }
}

fn drop_capability(prepared: &mut Prepared<'_>, occurrence: &Occurrence) {
    if let Some(name) = occurrence.metadata(meta::CAPABILITY) {
        push_drops(prepared, occurrence, std::iter::once(name));
    }
}

fn drop_recommended(prepared: &mut Prepared<'_>, occurrence: &Occurrence) {
    if let Some(names) = occurrence.metadata(meta::CAPABILITIES) {
        push_drops(prepared, occurrence, names.split(','));
    }
}

fn remove_added_capability(prepared: &mut Prepared<'_>, occurrence: &Occurrence) {
    let Some(target) = occurrence.metadata(meta::CAPABILITY).map(normalize) else {
        return;
    };
    let Some(caps) = occurrence
        .subject
        .as_deref()
        .and_then(|name| prepared.capabilities(name))
    else {
        return;
    };
    if let Some(add) = caps.add.as_mut() {
        add.retain(|name| normalize(name) != target);
        if add.is_empty() {
            caps.add = None;
        }
    }
}

fn disable_token_automount(prepared: &mut Prepared<'_>, _occurrence: &Occurrence) {
    if let Some(spec) = prepared.pod_spec() {
        spec.automount_service_account_token = Some(false);
    }
}

fn rename_deprecated_service_account(prepared: &mut Prepared<'_>, _occurrence: &Occurrence) {
    if let Some(spec) = prepared.pod_spec()
        && let Some(account) = spec.service_account.take()
    {
        if spec.service_account_name.is_none() {
            spec.service_account_name = Some(account);
        }
    }
}

fn set_annotation(prepared: &mut Prepared<'_>, key: &str, value: &str) {
    if let Some(annotations) = prepared.annotations() {
        annotations.insert(key.to_string(), value.to_string());
    }
}

fn apparmor_runtime_default(prepared: &mut Prepared<'_>, occurrence: &Occurrence) {
    let key = match occurrence.metadata(meta::ANNOTATION) {
        Some(key) => key.to_string(),
        None => match occurrence.subject.as_deref() {
            Some(container) => apparmor::annotation_key(container),
            None => return,
        },
    };
    set_annotation(prepared, &key, apparmor::PROFILE_RUNTIME_DEFAULT);
}

fn remove_apparmor_annotation(prepared: &mut Prepared<'_>, occurrence: &Occurrence) {
    if let Some(key) = occurrence.metadata(meta::ANNOTATION)
        && let Some(annotations) = prepared.annotations()
    {
        annotations.remove(key);
    }
}

fn seccomp_pod_runtime_default(prepared: &mut Prepared<'_>, _occurrence: &Occurrence) {
    set_annotation(prepared, seccomp::POD_ANNOTATION, seccomp::PROFILE_RUNTIME_DEFAULT);
}

fn seccomp_container_runtime_default(prepared: &mut Prepared<'_>, occurrence: &Occurrence) {
    if let Some(key) = occurrence.metadata(meta::ANNOTATION) {
        set_annotation(prepared, key, seccomp::PROFILE_RUNTIME_DEFAULT);
    }
}

/// The remediation for `code`, if it has one.
pub fn remedy_for(code: Code) -> Option<Remedy> {
    let remedy: Remedy = match code {
        Code::AllowPrivilegeEscalationNil | Code::AllowPrivilegeEscalationTrue => {
            disallow_privilege_escalation
        }
        Code::PrivilegedNil | Code::PrivilegedTrue => disable_privileged,
        Code::ReadOnlyRootFilesystemNil | Code::ReadOnlyRootFilesystemFalse => {
            read_only_root_filesystem
        }
        Code::RunAsNonRootPscNilCscNil
        | Code::RunAsNonRootPscFalseCscNil
        | Code::RunAsNonRootCscFalse => run_as_non_root,
        Code::CapabilityOrSecurityContextMissing => drop_recommended,
        Code::CapabilityNotDropped => drop_capability,
        Code::CapabilityAdded => remove_added_capability,
        Code::AutomountServiceAccountTokenTrueAndDefaultSa => disable_token_automount,
        Code::AutomountServiceAccountTokenDeprecated => rename_deprecated_service_account,
        Code::AppArmorAnnotationMissing | Code::AppArmorBadValue => apparmor_runtime_default,
        Code::AppArmorInvalidAnnotation => remove_apparmor_annotation,
        Code::SeccompAnnotationMissing | Code::SeccompDeprecatedPod | Code::SeccompDisabledPod => {
            seccomp_pod_runtime_default
        }
        Code::SeccompDeprecatedContainer | Code::SeccompDisabledContainer => {
            seccomp_container_runtime_default
        }
        _ => return None,
    };
    Some(remedy)
}

/// Occurrences of `result` that have a remediation, in recorded order.
pub fn remediable(result: &AuditResult) -> Vec<&Occurrence> {
    result
        .occurrences
        .iter()
        .filter(|o| remedy_for(o.code).is_some())
        .collect()
}

/// Apply every remediation for `result` to a copy of `resource`.
///
/// Unsupported kinds and resources without remediable findings come back
/// unchanged.
pub fn fix(resource: &Resource, result: &AuditResult) -> Resource {
    let mut fixed = resource.clone();
    let occurrences = remediable(result);
    if occurrences.is_empty() {
        return fixed;
    }
    if let Some(workload) = fixed.workload_mut() {
        let mut prepared = Prepared::normalize(workload, &occurrences);
        for occurrence in &occurrences {
            if let Some(remedy) = remedy_for(occurrence.code) {
                remedy(&mut prepared, occurrence);
            }
        }
        debug!(
            "Applied {} remediation(s) to {}",
            occurrences.len(),
            result.resource
        );
    }
    fixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::audit::{AuditContext, run_checks};
    use crate::analyzer::checks;
    use crate::analyzer::overrides::NamespaceLabels;
    use crate::config::AuditConfig;
    use k8s_openapi::api::core::v1::{Container, Pod};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use proptest::prelude::*;

    fn audit(resource: &Resource) -> AuditResult {
        let config = AuditConfig::default();
        let ns = NamespaceLabels::new();
        let ctx = AuditContext::new(&config, &ns);
        run_checks(resource, &checks::all(), &ctx)
    }

    fn audit_and_fix(resource: &Resource) -> Resource {
        fix(resource, &audit(resource))
    }

    fn container(resource: &Resource, name: &str) -> Container {
        resource
            .workload()
            .unwrap()
            .containers()
            .into_iter()
            .find(|c| c.name == name)
            .unwrap()
            .clone()
    }

    const POD: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: web
spec:
  containers:
  - name: app
    image: nginx:1.25
    securityContext:
      capabilities:
        add: ["NET_ADMIN", "SYS_TIME"]
  - name: sidecar
    image: envoy:1.30
    securityContext:
      runAsNonRoot: true
      allowPrivilegeEscalation: false
      privileged: false
      readOnlyRootFilesystem: true
      capabilities:
        drop: ["ALL"]
"#;

    #[test]
    fn test_fix_remediates_container_settings() {
        let original = Resource::from_yaml(POD).unwrap();
        let fixed = audit_and_fix(&original);

        let app = container(&fixed, "app");
        let sc = app.security_context.unwrap();
        assert_eq!(sc.allow_privilege_escalation, Some(false));
        assert_eq!(sc.privileged, Some(false));
        assert_eq!(sc.read_only_root_filesystem, Some(true));
        assert_eq!(sc.run_as_non_root, Some(true));
        let caps = sc.capabilities.unwrap();
        assert_eq!(caps.add, None);
        assert!(caps.drop.unwrap().contains(&"NET_RAW".to_string()));

        // The compliant sidecar is untouched.
        assert_eq!(container(&fixed, "sidecar"), container(&original, "sidecar"));
    }

    #[test]
    fn test_fix_sets_pod_level_fields() {
        let fixed = audit_and_fix(&Resource::from_yaml(POD).unwrap());
        let workload = fixed.workload().unwrap();
        let annotations = workload.pod_annotations().unwrap();
        assert_eq!(annotations[seccomp::POD_ANNOTATION], "runtime/default");
        assert_eq!(annotations[&apparmor::annotation_key("app")], "runtime/default");
        assert_eq!(workload.service_account().automount_token, Some(false));
    }

    #[test]
    fn test_fix_does_not_mutate_input() {
        let original = Resource::from_yaml(POD).unwrap();
        let snapshot = original.clone();
        let _ = audit_and_fix(&original);
        assert_eq!(original, snapshot);
    }

    #[test]
    fn test_normalization_is_scoped_to_findings() {
        let original = Resource::from_yaml(POD).unwrap();
        let mut result = AuditResult::new(original.id());
        result.push(Occurrence::new(Code::ReadOnlyRootFilesystemNil, "rootfs").with_subject("app"));
        let fixed = fix(&original, &result);
        let sc = container(&fixed, "app").security_context.unwrap();
        assert_eq!(sc.read_only_root_filesystem, Some(true));
        assert_eq!(sc.privileged, None);
        // No drop list is created for a finding that does not need one.
        assert_eq!(sc.capabilities.unwrap().drop, None);
    }

    #[test]
    fn test_unsupported_and_clean_pass_through() {
        let service = Resource::from_yaml("apiVersion: v1\nkind: Service\nmetadata:\n  name: s\n").unwrap();
        assert_eq!(audit_and_fix(&service), service);

        let original = Resource::from_yaml(POD).unwrap();
        let empty = AuditResult::new(original.id());
        assert_eq!(fix(&original, &empty), original);
    }

    #[test]
    fn test_deprecated_service_account_is_renamed() {
        let original = Resource::from_yaml(
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\nspec:\n  serviceAccount: app\n  containers: []\n",
        )
        .unwrap();
        let fixed = audit_and_fix(&original);
        let fields = fixed.workload().unwrap().service_account();
        assert_eq!(fields.service_account, None);
        assert_eq!(fields.service_account_name, Some("app"));
    }

    fn arb_context() -> impl Strategy<Value = Option<SecurityContext>> {
        let flag = || proptest::option::of(any::<bool>());
        let caps = proptest::option::of((
            proptest::option::of(proptest::sample::subsequence(vec!["NET_RAW", "CHOWN", "ALL", "SYS_TIME"], 0..3)),
            proptest::option::of(proptest::sample::subsequence(vec!["NET_ADMIN", "NET_RAW", "SYS_PTRACE"], 0..3)),
        ));
        proptest::option::of((flag(), flag(), flag(), flag(), caps)).prop_map(|fields| {
            fields.map(|(escalation, privileged, rootfs, nonroot, caps)| SecurityContext {
                allow_privilege_escalation: escalation,
                privileged,
                read_only_root_filesystem: rootfs,
                run_as_non_root: nonroot,
                capabilities: caps.map(|(drop, add)| Capabilities {
                    drop: drop.map(|d| d.into_iter().map(String::from).collect()),
                    add: add.map(|a| a.into_iter().map(String::from).collect()),
                }),
                ..Default::default()
            })
        })
    }

    fn arb_pod() -> impl Strategy<Value = Resource> {
        (
            arb_context(),
            arb_context(),
            proptest::option::of(any::<bool>()),
            proptest::option::of(proptest::sample::select(vec!["default", "app"])),
            any::<bool>(),
        )
            .prop_map(|(first, second, automount, account, deprecated)| {
                let containers = vec![
                    Container {
                        name: "app".to_string(),
                        image: Some("nginx:1.25".to_string()),
                        security_context: first,
                        ..Default::default()
                    },
                    Container {
                        name: "sidecar".to_string(),
                        image: Some("envoy:latest".to_string()),
                        security_context: second,
                        ..Default::default()
                    },
                ];
                let account = account.map(String::from);
                Resource::from(Pod {
                    metadata: ObjectMeta {
                        name: Some("generated".to_string()),
                        ..Default::default()
                    },
                    spec: Some(PodSpec {
                        containers,
                        automount_service_account_token: automount,
                        service_account: if deprecated { account.clone() } else { None },
                        service_account_name: if deprecated { None } else { account },
                        ..Default::default()
                    }),
                    ..Default::default()
                })
            })
    }

    proptest! {
        #[test]
        fn prop_fix_is_idempotent(pod in arb_pod()) {
            let once = audit_and_fix(&pod);
            let twice = audit_and_fix(&once);
            prop_assert_eq!(&once, &twice);
            prop_assert!(remediable(&audit(&once)).is_empty());
        }
    }
}
