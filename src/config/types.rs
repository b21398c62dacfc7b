use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::analyzer::capset::CapSet;
use crate::error::ConfigError;

/// Capabilities recommended for dropping when no policy is configured.
pub const DEFAULT_DROP: &[&str] = &[
    "AUDIT_WRITE",
    "CHOWN",
    "DAC_OVERRIDE",
    "FOWNER",
    "FSETID",
    "KILL",
    "MKNOD",
    "NET_BIND_SERVICE",
    "NET_RAW",
    "SETFCAP",
    "SETGID",
    "SETPCAP",
    "SETUID",
    "SYS_CHROOT",
];

/// Override configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    /// Manifests to audit when none are given on the command line.
    #[serde(default)]
    pub manifests: Vec<PathBuf>,

    /// Per-capability policy; `None` means the built-in drop list applies.
    #[serde(default)]
    pub capabilities: Option<CapabilityPolicy>,

    /// Override reasons keyed by check name.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl AuditConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_str(&content)
    }

    /// Load configuration from a YAML string. An empty document is the default.
    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Non-empty override reason configured for `check`.
    pub fn override_reason(&self, check: &str) -> Option<&str> {
        self.overrides
            .get(check)
            .map(String::as_str)
            .filter(|r| !r.trim().is_empty())
    }

    /// Capabilities every container should drop.
    pub fn recommended_drops(&self) -> Result<CapSet, String> {
        let Some(policy) = &self.capabilities else {
            return Ok(DEFAULT_DROP.iter().collect());
        };
        let mut drops = CapSet::new();
        for (name, value) in policy.entries() {
            match value.trim().to_lowercase().as_str() {
                "drop" => {
                    drops.insert(name);
                }
                "keep" | "allow" => {}
                other => {
                    return Err(format!(
                        "invalid policy '{other}' for capability {name}: expected 'drop' or 'keep'"
                    ));
                }
            }
        }
        Ok(drops)
    }
}

macro_rules! capability_policy {
    ($($field:ident => $name:literal),+ $(,)?) => {
        /// Policy value per Linux capability: `drop`, or `keep`/`allow`.
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct CapabilityPolicy {
            $(
                #[serde(rename = $name, default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<String>,
            )+
        }

        impl CapabilityPolicy {
            /// Configured entries in capability-name order.
            pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
                [$(($name, self.$field.as_deref())),+]
                    .into_iter()
                    .filter_map(|(name, value)| value.map(|v| (name, v)))
            }
        }
    };
}

capability_policy! {
    audit_control => "AUDIT_CONTROL",
    audit_read => "AUDIT_READ",
    audit_write => "AUDIT_WRITE",
    block_suspend => "BLOCK_SUSPEND",
    bpf => "BPF",
    checkpoint_restore => "CHECKPOINT_RESTORE",
    chown => "CHOWN",
    dac_override => "DAC_OVERRIDE",
    dac_read_search => "DAC_READ_SEARCH",
    fowner => "FOWNER",
    fsetid => "FSETID",
    ipc_lock => "IPC_LOCK",
    ipc_owner => "IPC_OWNER",
    kill => "KILL",
    lease => "LEASE",
    linux_immutable => "LINUX_IMMUTABLE",
    mac_admin => "MAC_ADMIN",
    mac_override => "MAC_OVERRIDE",
    mknod => "MKNOD",
    net_admin => "NET_ADMIN",
    net_bind_service => "NET_BIND_SERVICE",
    net_broadcast => "NET_BROADCAST",
    net_raw => "NET_RAW",
    perfmon => "PERFMON",
    setgid => "SETGID",
    setfcap => "SETFCAP",
    setpcap => "SETPCAP",
    setuid => "SETUID",
    sys_admin => "SYS_ADMIN",
    sys_boot => "SYS_BOOT",
    sys_chroot => "SYS_CHROOT",
    sys_module => "SYS_MODULE",
    sys_nice => "SYS_NICE",
    sys_pacct => "SYS_PACCT",
    sys_ptrace => "SYS_PTRACE",
    sys_rawio => "SYS_RAWIO",
    sys_resource => "SYS_RESOURCE",
    sys_time => "SYS_TIME",
    sys_tty_config => "SYS_TTY_CONFIG",
    syslog => "SYSLOG",
    wake_alarm => "WAKE_ALARM",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_builtin_drop_list() {
        let config = AuditConfig::default();
        let drops = config.recommended_drops().unwrap();
        assert_eq!(drops.len(), DEFAULT_DROP.len());
        assert!(drops.contains("NET_RAW"));
    }

    #[test]
    fn test_load_full_document() {
        let config = AuditConfig::load_from_str(
            r#"
manifests:
  - deploy/app.yaml
capabilities:
  NET_ADMIN: drop
  CHOWN: keep
  SYS_TIME: drop
overrides:
  allow-privilege-escalation: "legacy init system"
  allow-privileged: ""
"#,
        )
        .unwrap();
        assert_eq!(config.manifests, vec![PathBuf::from("deploy/app.yaml")]);
        let drops = config.recommended_drops().unwrap();
        assert_eq!(drops, ["NET_ADMIN", "SYS_TIME"].into_iter().collect::<CapSet>());
        assert_eq!(
            config.override_reason("allow-privilege-escalation"),
            Some("legacy init system")
        );
        assert_eq!(config.override_reason("allow-privileged"), None);
    }

    #[test]
    fn test_capability_table_lookup() {
        let config =
            AuditConfig::load_from_str("capabilities:\n  NET_RAW: drop\n  CHOWN: keep\n").unwrap();
        let policy = config.capabilities.unwrap();
        assert_eq!(policy.net_raw.as_deref(), Some("drop"));
        let entries: Vec<_> = policy.entries().collect();
        assert_eq!(entries, vec![("CHOWN", "keep"), ("NET_RAW", "drop")]);
    }

    #[test]
    fn test_unknown_capability_is_rejected() {
        let err = AuditConfig::load_from_str("capabilities:\n  NOT_A_CAP: drop\n");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_policy_value() {
        let config = AuditConfig::load_from_str("capabilities:\n  CHOWN: maybe\n").unwrap();
        assert!(config.recommended_drops().unwrap_err().contains("CHOWN"));
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(AuditConfig::load_from_str("  \n").unwrap(), AuditConfig::default());
    }
}
