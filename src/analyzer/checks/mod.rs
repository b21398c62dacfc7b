//! Built-in checkers.
//!
//! Each checker is a stateless rule registered once in a process-wide,
//! read-only registry and looked up by its command-line name.

pub mod apparmor;
pub mod capabilities;
pub mod hostns;
pub mod image;
pub mod limits;
pub mod netpols;
pub mod nonroot;
pub mod privesc;
pub mod privileged;
pub mod rootfs;
pub mod sat;
pub mod seccomp;

use std::sync::OnceLock;

use crate::analyzer::audit::Checker;

static REGISTRY: OnceLock<Vec<Box<dyn Checker>>> = OnceLock::new();

/// All registered checkers, in reporting order.
pub fn registry() -> &'static [Box<dyn Checker>] {
    REGISTRY.get_or_init(|| {
        vec![
            Box::new(apparmor::AppArmor),
            Box::new(privesc::PrivilegeEscalation),
            Box::new(sat::ServiceAccountToken),
            Box::new(capabilities::Capabilities),
            Box::new(hostns::HostNamespaces),
            Box::new(image::ImageTag),
            Box::new(limits::Limits),
            Box::new(netpols::NetworkPolicies),
            Box::new(nonroot::RunAsNonRoot),
            Box::new(privileged::Privileged),
            Box::new(rootfs::ReadOnlyRootFilesystem),
            Box::new(seccomp::Seccomp),
        ]
    })
}

pub fn all() -> Vec<&'static dyn Checker> {
    registry().iter().map(Box::as_ref).collect()
}

pub fn get_checker(name: &str) -> Option<&'static dyn Checker> {
    registry()
        .iter()
        .find(|c| c.name() == name)
        .map(Box::as_ref)
}

pub fn names() -> Vec<&'static str> {
    registry().iter().map(|c| c.name()).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names_are_unique() {
        let mut names = names();
        let count = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), count);
        assert_eq!(count, 12);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(get_checker("rootfs").unwrap().name(), "rootfs");
        assert!(get_checker("nope").is_none());
    }
}
