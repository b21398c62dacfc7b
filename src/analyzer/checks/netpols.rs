//! Network policies that open all traffic.
//!
//! A policy selecting every pod (`podSelector: {}`) with an empty rule for
//! ingress or egress admits everything in that direction.

use k8s_openapi::api::networking::v1::NetworkPolicySpec;

use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence};

/// An absent or empty selector matches every pod.
fn selects_all_pods(spec: &NetworkPolicySpec) -> bool {
    let Ok(selector) = serde_json::to_value(&spec.pod_selector) else {
        return false;
    };
    ["matchLabels", "matchExpressions"].iter().all(|field| {
        selector.get(field).is_none_or(|v| {
            v.is_null()
                || v.as_object().is_some_and(|o| o.is_empty())
                || v.as_array().is_some_and(|a| a.is_empty())
        })
    })
}

fn has_policy_type(spec: &NetworkPolicySpec, kind: &str, default: bool) -> bool {
    match &spec.policy_types {
        Some(types) => types.iter().any(|t| t == kind),
        None => default,
    }
}

fn allows_all_ingress(spec: &NetworkPolicySpec) -> bool {
    has_policy_type(spec, "Ingress", true)
        && spec.ingress.iter().flatten().any(|rule| {
            rule.from.as_ref().is_none_or(|f| f.is_empty())
                && rule.ports.as_ref().is_none_or(|p| p.is_empty())
        })
}

fn allows_all_egress(spec: &NetworkPolicySpec) -> bool {
    has_policy_type(spec, "Egress", spec.egress.is_some())
        && spec.egress.iter().flatten().any(|rule| {
            rule.to.as_ref().is_none_or(|t| t.is_empty())
                && rule.ports.as_ref().is_none_or(|p| p.is_empty())
        })
}

pub struct NetworkPolicies;

impl Checker for NetworkPolicies {
    fn name(&self) -> &'static str {
        "netpols"
    }

    fn description(&self) -> &'static str {
        "Network policies that allow all ingress or egress traffic"
    }

    fn audit(&self, resource: &Resource, _ctx: &AuditContext<'_>, result: &mut AuditResult) {
        let Resource::NetworkPolicy(policy) = resource else {
            return;
        };
        let Some(spec) = policy.spec.as_ref() else {
            return;
        };
        if !selects_all_pods(spec) {
            return;
        }
        if allows_all_ingress(spec) {
            result.push(Occurrence::new(
                Code::AllowAllIngressNetworkPolicyExists,
                "Network policy allows all ingress traffic to every pod in the namespace",
            ));
        }
        if allows_all_egress(spec) {
            result.push(Occurrence::new(
                Code::AllowAllEgressNetworkPolicyExists,
                "Network policy allows all egress traffic from every pod in the namespace",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::checks::testing::audit_yaml;

    fn policy(spec: &str) -> String {
        format!(
            "apiVersion: networking.k8s.io/v1\nkind: NetworkPolicy\nmetadata:\n  name: open\n  namespace: prod\nspec:\n  podSelector: {{}}\n{spec}"
        )
    }

    #[test]
    fn test_allow_all_both_directions() {
        let yaml = policy("  policyTypes: [Ingress, Egress]\n  ingress:\n  - {}\n  egress:\n  - {}\n");
        let result = audit_yaml(&NetworkPolicies, &yaml);
        assert_eq!(
            result.codes(),
            vec![Code::AllowAllIngressNetworkPolicyExists, Code::AllowAllEgressNetworkPolicyExists]
        );
    }

    #[test]
    fn test_default_deny_is_silent() {
        let yaml = policy("  policyTypes: [Ingress, Egress]\n");
        assert!(audit_yaml(&NetworkPolicies, &yaml).is_empty());
    }

    #[test]
    fn test_restricted_rule_is_silent() {
        let yaml = policy("  ingress:\n  - from:\n    - podSelector:\n        matchLabels:\n          app: web\n");
        assert!(audit_yaml(&NetworkPolicies, &yaml).is_empty());
    }
}
