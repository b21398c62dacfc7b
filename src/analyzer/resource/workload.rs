//! Pod-template access shared by every workload kind.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, ReplicationController};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Service-account related pod fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceAccountFields<'a> {
    /// Deprecated alias of `service_account_name`.
    pub service_account: Option<&'a str>,
    pub service_account_name: Option<&'a str>,
    pub automount_token: Option<bool>,
}

/// A resource that carries a pod template.
///
/// Implementors only locate the pod metadata and spec; everything else is
/// derived from those.
pub trait Workload {
    fn pod_metadata(&self) -> Option<&ObjectMeta>;

    /// Pod metadata, created if the template has none. `None` when the
    /// resource has no pod template at all.
    fn pod_metadata_mut(&mut self) -> Option<&mut ObjectMeta>;

    fn pod_spec(&self) -> Option<&PodSpec>;

    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec>;

    /// Regular and init containers.
    fn containers(&self) -> Vec<&Container> {
        match self.pod_spec() {
            Some(spec) => spec
                .containers
                .iter()
                .chain(spec.init_containers.iter().flatten())
                .collect(),
            None => Vec::new(),
        }
    }

    fn container_mut(&mut self, name: &str) -> Option<&mut Container> {
        let spec = self.pod_spec_mut()?;
        spec.containers
            .iter_mut()
            .chain(spec.init_containers.iter_mut().flatten())
            .find(|c| c.name == name)
    }

    fn pod_annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.pod_metadata().and_then(|m| m.annotations.as_ref())
    }

    fn pod_annotations_mut(&mut self) -> Option<&mut BTreeMap<String, String>> {
        self.pod_metadata_mut()
            .map(|m| m.annotations.get_or_insert_with(BTreeMap::new))
    }

    fn pod_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.pod_metadata().and_then(|m| m.labels.as_ref())
    }

    fn service_account(&self) -> ServiceAccountFields<'_> {
        match self.pod_spec() {
            Some(spec) => ServiceAccountFields {
                service_account: spec.service_account.as_deref(),
                service_account_name: spec.service_account_name.as_deref(),
                automount_token: spec.automount_service_account_token,
            },
            None => ServiceAccountFields::default(),
        }
    }
}

impl Workload for Pod {
    fn pod_metadata(&self) -> Option<&ObjectMeta> {
        Some(&self.metadata)
    }

    fn pod_metadata_mut(&mut self) -> Option<&mut ObjectMeta> {
        Some(&mut self.metadata)
    }

    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec.as_ref()
    }

    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.spec.as_mut()
    }
}

/// Kinds whose spec holds a required `template: PodTemplateSpec`.
macro_rules! templated_workload {
    ($($kind:ty),+) => {
        $(
            impl Workload for $kind {
                fn pod_metadata(&self) -> Option<&ObjectMeta> {
                    self.spec.as_ref().and_then(|s| s.template.metadata.as_ref())
                }

                fn pod_metadata_mut(&mut self) -> Option<&mut ObjectMeta> {
                    self.spec
                        .as_mut()
                        .map(|s| s.template.metadata.get_or_insert_with(ObjectMeta::default))
                }

                fn pod_spec(&self) -> Option<&PodSpec> {
                    self.spec.as_ref().and_then(|s| s.template.spec.as_ref())
                }

                fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
                    self.spec.as_mut().and_then(|s| s.template.spec.as_mut())
                }
            }
        )+
    };
}

templated_workload!(Deployment, DaemonSet, StatefulSet);

impl Workload for ReplicationController {
    fn pod_metadata(&self) -> Option<&ObjectMeta> {
        self.spec
            .as_ref()
            .and_then(|s| s.template.as_ref())
            .and_then(|t| t.metadata.as_ref())
    }

    fn pod_metadata_mut(&mut self) -> Option<&mut ObjectMeta> {
        self.spec
            .as_mut()
            .and_then(|s| s.template.as_mut())
            .map(|t| t.metadata.get_or_insert_with(ObjectMeta::default))
    }

    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec
            .as_ref()
            .and_then(|s| s.template.as_ref())
            .and_then(|t| t.spec.as_ref())
    }

    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.spec
            .as_mut()
            .and_then(|s| s.template.as_mut())
            .and_then(|t| t.spec.as_mut())
    }
}

impl Workload for CronJob {
    fn pod_metadata(&self) -> Option<&ObjectMeta> {
        self.spec
            .as_ref()
            .and_then(|s| s.job_template.spec.as_ref())
            .and_then(|j| j.template.metadata.as_ref())
    }

    fn pod_metadata_mut(&mut self) -> Option<&mut ObjectMeta> {
        self.spec
            .as_mut()
            .and_then(|s| s.job_template.spec.as_mut())
            .map(|j| j.template.metadata.get_or_insert_with(ObjectMeta::default))
    }

    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec
            .as_ref()
            .and_then(|s| s.job_template.spec.as_ref())
            .and_then(|j| j.template.spec.as_ref())
    }

    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.spec
            .as_mut()
            .and_then(|s| s.job_template.spec.as_mut())
            .and_then(|j| j.template.spec.as_mut())
    }
}
