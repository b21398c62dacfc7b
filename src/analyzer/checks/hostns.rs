use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::overrides::OverridePolicy;
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence};

struct HostNamespace {
    field: &'static str,
    violation: Code,
    policy: OverridePolicy<'static>,
}

const NAMESPACES: [HostNamespace; 3] = [
    HostNamespace {
        field: "hostNetwork",
        violation: Code::NamespaceHostNetworkTrue,
        policy: OverridePolicy {
            check: "allow-namespace-host-network",
            allowed: Code::NamespaceHostNetworkTrueAllowed,
            misconfigured: Code::NamespaceMisconfiguredAllow,
        },
    },
    HostNamespace {
        field: "hostPID",
        violation: Code::NamespaceHostPidTrue,
        policy: OverridePolicy {
            check: "allow-namespace-host-pid",
            allowed: Code::NamespaceHostPidTrueAllowed,
            misconfigured: Code::NamespaceMisconfiguredAllow,
        },
    },
    HostNamespace {
        field: "hostIPC",
        violation: Code::NamespaceHostIpcTrue,
        policy: OverridePolicy {
            check: "allow-namespace-host-ipc",
            allowed: Code::NamespaceHostIpcTrueAllowed,
            misconfigured: Code::NamespaceMisconfiguredAllow,
        },
    },
];

/// Pods must not share the host's network, PID or IPC namespace.
pub struct HostNamespaces;

impl Checker for HostNamespaces {
    fn name(&self) -> &'static str {
        "hostns"
    }

    fn description(&self) -> &'static str {
        "Pods sharing host namespaces"
    }

    fn audit(&self, resource: &Resource, ctx: &AuditContext<'_>, result: &mut AuditResult) {
        let Some(spec) = resource.workload().and_then(|w| w.pod_spec()) else {
            return;
        };
        let overrides = ctx.overrides();
        let host = spec.hostname.as_deref();
        let settings = [spec.host_network, spec.host_pid, spec.host_ipc];

        for (namespace, enabled) in NAMESPACES.iter().zip(settings) {
            let violation = (enabled == Some(true)).then(|| {
                let occurrence = Occurrence::new(
                    namespace.violation,
                    format!("{} set to true", namespace.field),
                );
                match host {
                    Some(host) => occurrence.with_subject(host),
                    None => occurrence,
                }
            });
            overrides.apply(result, &namespace.policy, resource, None, violation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::checks::testing::{audit_yaml, pod_with_container};

    #[test]
    fn test_host_namespaces() {
        let yaml = pod_with_container("").replace(
            "spec:\n",
            "spec:\n  hostNetwork: true\n  hostIPC: true\n  hostPID: false\n",
        );
        let result = audit_yaml(&HostNamespaces, &yaml);
        assert_eq!(
            result.codes(),
            vec![Code::NamespaceHostNetworkTrue, Code::NamespaceHostIpcTrue]
        );
    }

    #[test]
    fn test_namespace_override() {
        let yaml = pod_with_container("").replace(
            "  name: web\n",
            "  name: web\n  labels:\n    audit.kubeguard.io/allow-namespace-host-pid: \"debugger\"\n",
        ).replace("spec:\n", "spec:\n  hostname: box\n");
        let result = audit_yaml(&HostNamespaces, &yaml);
        assert_eq!(result.codes(), vec![Code::NamespaceMisconfiguredAllow]);
    }

    #[test]
    fn test_clean_pod_is_silent() {
        assert!(audit_yaml(&HostNamespaces, &pod_with_container("")).is_empty());
    }
}
