//! Typed views over parsed manifest documents.

mod workload;

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{Pod, ReplicationController};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_yaml::Value;
use thiserror::Error;

use crate::analyzer::types::ResourceId;

pub use workload::{ServiceAccountFields, Workload};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("document is not a mapping")]
    NotAMapping,

    #[error("document has no '{0}' field")]
    MissingField(&'static str),

    #[error("invalid {kind}: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{0} is not a supported kind")]
    Unsupported(String),

    #[error("failed to serialize {kind}: {source}")]
    Encode {
        kind: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A document of a kind that is not audited.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnsupportedObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Pod(Box<Pod>),
    Deployment(Box<Deployment>),
    DaemonSet(Box<DaemonSet>),
    StatefulSet(Box<StatefulSet>),
    ReplicationController(Box<ReplicationController>),
    CronJob(Box<CronJob>),
    NetworkPolicy(Box<NetworkPolicy>),
    Unsupported(UnsupportedObject),
}

/// Fields holding resource quantities; YAML numbers there become strings so
/// they decode as `Quantity`.
const QUANTITY_FIELDS: &[&str] = &["limits", "requests", "overhead", "capacity", "hard"];

/// Integer file-mode fields commonly written as leading-zero octal.
const MODE_FIELDS: &[&str] = &["defaultMode", "mode"];

/// Value of a YAML 1.1 octal literal such as `0644`.
fn octal_mode(text: &str) -> Option<i64> {
    let digits = text.strip_prefix('0')?;
    if digits.is_empty() || !digits.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        return None;
    }
    i64::from_str_radix(digits, 8).ok()
}

/// Rewrite scalars the Kubernetes YAML reader accepts but serde_yaml does
/// not decode into the typed field: numeric quantities and octal modes.
fn normalize_scalars(value: &mut Value) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map.iter_mut() {
                let key = key.as_str();
                let is_quantity_map = key.is_some_and(|k| QUANTITY_FIELDS.contains(&k));
                let is_mode = key.is_some_and(|k| MODE_FIELDS.contains(&k));
                if is_mode && let Some(mode) = child.as_str().and_then(octal_mode) {
                    *child = Value::Number(mode.into());
                    continue;
                }
                match child {
                    Value::Mapping(quantities) if is_quantity_map => {
                        for (_, q) in quantities.iter_mut() {
                            if let Value::Number(n) = q {
                                *q = Value::String(n.to_string());
                            }
                        }
                    }
                    other => normalize_scalars(other),
                }
            }
        }
        Value::Sequence(items) => items.iter_mut().for_each(normalize_scalars),
        _ => {}
    }
}

fn decode<T: serde::de::DeserializeOwned>(kind: &str, value: Value) -> Result<Box<T>, ResourceError> {
    serde_yaml::from_value(value)
        .map(Box::new)
        .map_err(|source| ResourceError::Decode {
            kind: kind.to_string(),
            source,
        })
}

fn string_field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

impl Resource {
    pub fn from_yaml(text: &str) -> Result<Self, ResourceError> {
        let value: Value = serde_yaml::from_str(text).map_err(|source| ResourceError::Decode {
            kind: "document".to_string(),
            source,
        })?;
        Self::from_value(value)
    }

    /// Decode a generic YAML value into the typed resource for its kind.
    pub fn from_value(mut value: Value) -> Result<Self, ResourceError> {
        if !value.is_mapping() {
            return Err(ResourceError::NotAMapping);
        }
        let api_version = string_field(&value, &["apiVersion"])
            .ok_or(ResourceError::MissingField("apiVersion"))?
            .to_string();
        let kind = string_field(&value, &["kind"])
            .ok_or(ResourceError::MissingField("kind"))?
            .to_string();
        normalize_scalars(&mut value);

        let resource = match (api_version.as_str(), kind.as_str()) {
            ("v1", "Pod") => Resource::Pod(decode(&kind, value)?),
            ("apps/v1", "Deployment") => Resource::Deployment(decode(&kind, value)?),
            ("apps/v1", "DaemonSet") => Resource::DaemonSet(decode(&kind, value)?),
            ("apps/v1", "StatefulSet") => Resource::StatefulSet(decode(&kind, value)?),
            ("v1", "ReplicationController") => {
                Resource::ReplicationController(decode(&kind, value)?)
            }
            ("batch/v1", "CronJob") => Resource::CronJob(decode(&kind, value)?),
            ("networking.k8s.io/v1", "NetworkPolicy") => {
                Resource::NetworkPolicy(decode(&kind, value)?)
            }
            _ => {
                let labels = value
                    .get("metadata")
                    .and_then(|m| m.get("labels"))
                    .and_then(|l| serde_yaml::from_value(l.clone()).ok())
                    .unwrap_or_default();
                Resource::Unsupported(UnsupportedObject {
                    name: string_field(&value, &["metadata", "name"])
                        .unwrap_or_default()
                        .to_string(),
                    namespace: string_field(&value, &["metadata", "namespace"]).map(str::to_string),
                    api_version: api_version.clone(),
                    kind: kind.clone(),
                    labels,
                })
            }
        };
        Ok(resource)
    }

    pub fn kind(&self) -> &str {
        match self {
            Resource::Pod(_) => "Pod",
            Resource::Deployment(_) => "Deployment",
            Resource::DaemonSet(_) => "DaemonSet",
            Resource::StatefulSet(_) => "StatefulSet",
            Resource::ReplicationController(_) => "ReplicationController",
            Resource::CronJob(_) => "CronJob",
            Resource::NetworkPolicy(_) => "NetworkPolicy",
            Resource::Unsupported(u) => &u.kind,
        }
    }

    pub fn metadata(&self) -> Option<&ObjectMeta> {
        match self {
            Resource::Pod(r) => Some(&r.metadata),
            Resource::Deployment(r) => Some(&r.metadata),
            Resource::DaemonSet(r) => Some(&r.metadata),
            Resource::StatefulSet(r) => Some(&r.metadata),
            Resource::ReplicationController(r) => Some(&r.metadata),
            Resource::CronJob(r) => Some(&r.metadata),
            Resource::NetworkPolicy(r) => Some(&r.metadata),
            Resource::Unsupported(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Unsupported(u) => &u.name,
            _ => self
                .metadata()
                .and_then(|m| m.name.as_deref())
                .unwrap_or_default(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Resource::Unsupported(u) => u.namespace.as_deref(),
            _ => self.metadata().and_then(|m| m.namespace.as_deref()),
        }
    }

    /// Labels on the object itself (not its pod template).
    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Resource::Unsupported(u) => Some(&u.labels),
            _ => self.metadata().and_then(|m| m.labels.as_ref()),
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId {
            kind: self.kind().to_string(),
            namespace: self.namespace().map(str::to_string),
            name: self.name().to_string(),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Resource::Unsupported(_))
    }

    /// The pod-template view, for kinds that run containers.
    pub fn workload(&self) -> Option<&dyn Workload> {
        match self {
            Resource::Pod(r) => Some(r.as_ref()),
            Resource::Deployment(r) => Some(r.as_ref()),
            Resource::DaemonSet(r) => Some(r.as_ref()),
            Resource::StatefulSet(r) => Some(r.as_ref()),
            Resource::ReplicationController(r) => Some(r.as_ref()),
            Resource::CronJob(r) => Some(r.as_ref()),
            Resource::NetworkPolicy(_) | Resource::Unsupported(_) => None,
        }
    }

    pub fn workload_mut(&mut self) -> Option<&mut dyn Workload> {
        match self {
            Resource::Pod(r) => Some(r.as_mut()),
            Resource::Deployment(r) => Some(r.as_mut()),
            Resource::DaemonSet(r) => Some(r.as_mut()),
            Resource::StatefulSet(r) => Some(r.as_mut()),
            Resource::ReplicationController(r) => Some(r.as_mut()),
            Resource::CronJob(r) => Some(r.as_mut()),
            Resource::NetworkPolicy(_) | Resource::Unsupported(_) => None,
        }
    }

    /// Serialize a supported resource back to YAML.
    pub fn to_yaml(&self) -> Result<String, ResourceError> {
        let result = match self {
            Resource::Pod(r) => serde_yaml::to_string(r),
            Resource::Deployment(r) => serde_yaml::to_string(r),
            Resource::DaemonSet(r) => serde_yaml::to_string(r),
            Resource::StatefulSet(r) => serde_yaml::to_string(r),
            Resource::ReplicationController(r) => serde_yaml::to_string(r),
            Resource::CronJob(r) => serde_yaml::to_string(r),
            Resource::NetworkPolicy(r) => serde_yaml::to_string(r),
            Resource::Unsupported(u) => return Err(ResourceError::Unsupported(u.kind.clone())),
        };
        result.map_err(|source| ResourceError::Encode {
            kind: self.kind().to_string(),
            source,
        })
    }
}

macro_rules! impl_from {
    ($($variant:ident),+) => {
        $(
            impl From<$variant> for Resource {
                fn from(object: $variant) -> Self {
                    Resource::$variant(Box::new(object))
                }
            }
        )+
    };
}

impl_from!(Pod, Deployment, DaemonSet, StatefulSet, ReplicationController, CronJob, NetworkPolicy);
