//! Core types shared by the audit, override and fix engines.
//!
//! - `Severity` - how bad a finding is
//! - `Code` - the enumerated finding identifier, each with one canonical severity
//! - `Occurrence` - a single finding produced by a checker
//! - `AuditResult` - every occurrence recorded against one resource

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Severity levels for findings.
///
/// Ordered from most severe to least severe:
/// `Error > Warning > Info > Debug`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Insecure configuration that must be fixed
    Error,
    /// Accepted exceptions and weaker recommendations
    #[default]
    Warning,
    Info,
    Debug,
}

impl Severity {
    /// Parse a severity from a string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warning" | "warn" => Some(Self::Warning),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Error => 3,
            Self::Warning => 2,
            Self::Info => 1,
            Self::Debug => 0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

macro_rules! codes {
    ($($variant:ident => $name:literal, $severity:ident;)+) => {
        /// Finding identifiers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Code {
            $($variant,)+
        }

        impl Code {
            pub const ALL: &'static [Code] = &[$(Code::$variant,)+];

            /// The stable external name of the code.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }

            /// The one severity every occurrence of this code carries.
            pub fn severity(&self) -> Severity {
                match self {
                    $(Self::$variant => Severity::$severity,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

codes! {
    AllowPrivilegeEscalationNil => "AllowPrivilegeEscalationNil", Error;
    AllowPrivilegeEscalationTrue => "AllowPrivilegeEscalationTrue", Error;
    AllowPrivilegeEscalationAllowed => "AllowPrivilegeEscalationAllowed", Warning;
    AllowPrivilegeEscalationMisconfiguredAllow => "AllowPrivilegeEscalationMisconfiguredAllow", Warning;

    PrivilegedNil => "PrivilegedNil", Warning;
    PrivilegedTrue => "PrivilegedTrue", Error;
    PrivilegedAllowed => "PrivilegedAllowed", Warning;
    PrivilegedMisconfiguredAllow => "PrivilegedMisconfiguredAllow", Warning;

    ReadOnlyRootFilesystemNil => "ReadOnlyRootFilesystemNil", Error;
    ReadOnlyRootFilesystemFalse => "ReadOnlyRootFilesystemFalse", Error;
    ReadOnlyRootFilesystemFalseAllowed => "ReadOnlyRootFilesystemFalseAllowed", Warning;
    ReadOnlyRootFilesystemMisconfiguredAllow => "ReadOnlyRootFilesystemMisconfiguredAllow", Warning;

    RunAsNonRootPscNilCscNil => "RunAsNonRootPSCNilCSCNil", Error;
    RunAsNonRootPscFalseCscNil => "RunAsNonRootPSCFalseCSCNil", Error;
    RunAsNonRootCscFalse => "RunAsNonRootCSCFalse", Error;
    RunAsNonRootFalseAllowed => "RunAsNonRootFalseAllowed", Warning;
    RunAsNonRootMisconfiguredAllow => "RunAsNonRootMisconfiguredAllow", Warning;

    CapabilityOrSecurityContextMissing => "CapabilityOrSecurityContextMissing", Error;
    CapabilityNotDropped => "CapabilityNotDropped", Error;
    CapabilityAdded => "CapabilityAdded", Error;
    CapabilityAllowed => "CapabilityAllowed", Warning;
    CapabilityMisconfiguredAllow => "CapabilityMisconfiguredAllow", Warning;

    AutomountServiceAccountTokenDeprecated => "AutomountServiceAccountTokenDeprecated", Warning;
    AutomountServiceAccountTokenTrueAndDefaultSa => "AutomountServiceAccountTokenTrueAndDefaultSA", Error;
    AutomountServiceAccountTokenAllowed => "AutomountServiceAccountTokenAllowed", Warning;
    AutomountServiceAccountTokenMisconfiguredAllow => "AutomountServiceAccountTokenMisconfiguredAllow", Warning;

    NamespaceHostNetworkTrue => "NamespaceHostNetworkTrue", Error;
    NamespaceHostNetworkTrueAllowed => "NamespaceHostNetworkTrueAllowed", Warning;
    NamespaceHostPidTrue => "NamespaceHostPIDTrue", Error;
    NamespaceHostPidTrueAllowed => "NamespaceHostPIDTrueAllowed", Warning;
    NamespaceHostIpcTrue => "NamespaceHostIPCTrue", Error;
    NamespaceHostIpcTrueAllowed => "NamespaceHostIPCTrueAllowed", Warning;
    NamespaceMisconfiguredAllow => "NamespaceMisconfiguredAllow", Warning;

    AppArmorAnnotationMissing => "AppArmorAnnotationMissing", Error;
    AppArmorBadValue => "AppArmorBadValue", Error;
    AppArmorInvalidAnnotation => "AppArmorInvalidAnnotation", Error;

    SeccompAnnotationMissing => "SeccompAnnotationMissing", Error;
    SeccompDeprecatedPod => "SeccompDeprecatedPod", Warning;
    SeccompDisabledPod => "SeccompDisabledPod", Error;
    SeccompDeprecatedContainer => "SeccompDeprecatedContainer", Warning;
    SeccompDisabledContainer => "SeccompDisabledContainer", Error;

    ImageTagMissing => "ImageTagMissing", Warning;
    ImageTagLatest => "ImageTagLatest", Warning;

    LimitsNotSet => "LimitsNotSet", Warning;
    LimitsCpuNotSet => "LimitsCPUNotSet", Warning;
    LimitsMemoryNotSet => "LimitsMemoryNotSet", Warning;

    AllowAllIngressNetworkPolicyExists => "AllowAllIngressNetworkPolicyExists", Warning;
    AllowAllEgressNetworkPolicyExists => "AllowAllEgressNetworkPolicyExists", Warning;

    UnsupportedResource => "UnsupportedResource", Warning;
    InternalError => "InternalError", Error;
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Code {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Code::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown code: {s}")))
    }
}

/// Metadata keys attached to occurrences.
pub mod meta {
    pub const CAPABILITY: &str = "Capability";
    pub const CAPABILITIES: &str = "Capabilities";
    pub const OVERRIDE: &str = "Override";
    pub const OVERRIDE_REASON: &str = "OverrideReason";
    pub const OVERRIDE_SOURCE: &str = "OverrideSource";
    pub const OVERRIDDEN_CODE: &str = "OverriddenCode";
    pub const ANNOTATION: &str = "Annotation";
    pub const IMAGE: &str = "Image";
    pub const ERROR: &str = "Error";
}

/// A single finding recorded by a checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub severity: Severity,
    pub code: Code,
    /// Container name, or the pod host when the finding is pod-wide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Occurrence {
    /// Create an occurrence carrying the canonical severity of `code`.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            severity: code.severity(),
            code,
            subject: None,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Identity of an audited resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Every occurrence recorded against one resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    pub resource: ResourceId,
    pub occurrences: Vec<Occurrence>,
}

impl AuditResult {
    pub fn new(resource: ResourceId) -> Self {
        Self {
            resource,
            occurrences: Vec::new(),
        }
    }

    pub fn push(&mut self, occurrence: Occurrence) {
        self.occurrences.push(occurrence);
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.occurrences
            .iter()
            .any(|o| o.severity == Severity::Error)
    }

    pub fn codes(&self) -> Vec<Code> {
        self.occurrences.iter().map(|o| o.code).collect()
    }

    /// Occurrences at or above `min`.
    pub fn at_least(&self, min: Severity) -> impl Iterator<Item = &Occurrence> {
        self.occurrences.iter().filter(move |o| o.severity >= min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Debug);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("ERROR"), Some(Severity::Error));
        assert_eq!(Severity::parse("warn"), Some(Severity::Warning));
        assert_eq!(Severity::parse("debug"), Some(Severity::Debug));
        assert_eq!(Severity::parse("fatal"), None);
    }

    #[test]
    fn test_code_names_round_trip() {
        for code in Code::ALL {
            assert_eq!(Code::parse(code.as_str()), Some(*code));
        }
        assert_eq!(Code::RunAsNonRootPscNilCscNil.as_str(), "RunAsNonRootPSCNilCSCNil");
    }

    #[test]
    fn test_allowed_codes_are_warnings() {
        for code in Code::ALL {
            let name = code.as_str();
            if name.ends_with("Allowed") || name.ends_with("MisconfiguredAllow") {
                assert_eq!(code.severity(), Severity::Warning, "{name}");
            }
        }
    }

    #[test]
    fn test_occurrence_carries_canonical_severity() {
        let occ = Occurrence::new(Code::PrivilegedTrue, "privileged")
            .with_subject("app")
            .with_metadata(meta::OVERRIDE_REASON, "needed");
        assert_eq!(occ.severity, Severity::Error);
        assert_eq!(occ.subject.as_deref(), Some("app"));
        assert_eq!(occ.metadata(meta::OVERRIDE_REASON), Some("needed"));
    }

    #[test]
    fn test_result_filters_by_severity() {
        let mut result = AuditResult::new(ResourceId {
            kind: "Pod".to_string(),
            namespace: None,
            name: "web".to_string(),
        });
        result.push(Occurrence::new(Code::ImageTagLatest, "latest"));
        assert!(!result.has_errors());
        result.push(Occurrence::new(Code::PrivilegedTrue, "privileged"));
        assert!(result.has_errors());
        assert_eq!(result.at_least(Severity::Error).count(), 1);
        assert_eq!(result.resource.to_string(), "Pod/web");
    }
}
