use crate::analyzer::audit::{AuditContext, Checker};
use crate::analyzer::overrides::OverridePolicy;
use crate::analyzer::resource::Resource;
use crate::analyzer::types::{AuditResult, Code, Occurrence};

pub const OVERRIDE: OverridePolicy<'static> = OverridePolicy {
    check: "allow-automount-service-account-token",
    allowed: Code::AutomountServiceAccountTokenAllowed,
    misconfigured: Code::AutomountServiceAccountTokenMisconfiguredAllow,
};

/// Pods using the default service account must not mount its token.
pub struct ServiceAccountToken;

impl Checker for ServiceAccountToken {
    fn name(&self) -> &'static str {
        "sat"
    }

    fn description(&self) -> &'static str {
        "Pods that automount the default service account token"
    }

    fn audit(&self, resource: &Resource, ctx: &AuditContext<'_>, result: &mut AuditResult) {
        let Some(workload) = resource.workload() else {
            return;
        };
        if workload.pod_spec().is_none() {
            return;
        }
        let fields = workload.service_account();

        if let Some(deprecated) = fields.service_account.filter(|sa| !sa.is_empty())
            && fields.service_account_name.is_none_or(str::is_empty)
        {
            result.push(Occurrence::new(
                Code::AutomountServiceAccountTokenDeprecated,
                format!("serviceAccount is deprecated; use serviceAccountName: {deprecated}"),
            ));
        }

        let account = fields
            .service_account_name
            .or(fields.service_account)
            .filter(|sa| !sa.is_empty())
            .unwrap_or("default");
        let violation = (account == "default" && fields.automount_token != Some(false)).then(|| {
            Occurrence::new(
                Code::AutomountServiceAccountTokenTrueAndDefaultSa,
                "automountServiceAccountToken is not false and the default service account is used",
            )
        });
        ctx.overrides().apply(result, &OVERRIDE, resource, None, violation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::checks::testing::{audit_yaml, pod_with_container};

    fn with_spec(fields: &str) -> String {
        pod_with_container("").replace("spec:\n", &format!("spec:\n  {fields}\n"))
    }

    #[test]
    fn test_default_account_mounts_token() {
        let result = audit_yaml(&ServiceAccountToken, &pod_with_container(""));
        assert_eq!(result.codes(), vec![Code::AutomountServiceAccountTokenTrueAndDefaultSa]);
        assert!(result.occurrences[0].subject.is_none());
    }

    #[test]
    fn test_disabled_or_named_account_passes() {
        let off = audit_yaml(&ServiceAccountToken, &with_spec("automountServiceAccountToken: false"));
        assert!(off.is_empty());
        let named = audit_yaml(&ServiceAccountToken, &with_spec("serviceAccountName: app"));
        assert!(named.is_empty());
    }

    #[test]
    fn test_deprecated_field() {
        let result = audit_yaml(&ServiceAccountToken, &with_spec("serviceAccount: app"));
        assert_eq!(result.codes(), vec![Code::AutomountServiceAccountTokenDeprecated]);
    }
}
