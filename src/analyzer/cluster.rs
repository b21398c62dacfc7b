//! Live cluster source.
//!
//! Lists every supported workload kind concurrently, one task per kind, and
//! audits each list as it arrives. A list that fails is logged and skipped;
//! the other kinds still complete.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{Namespace, Pod, ReplicationController};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::{
    Client, Config,
    api::{Api, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use tokio::task::{self, JoinError, JoinSet};

use crate::analyzer::audit::{AuditContext, Checker, audit_all};
use crate::analyzer::overrides::NamespaceLabels;
use crate::analyzer::resource::Resource;
use crate::analyzer::types::AuditResult;
use crate::config::AuditConfig;

/// Error type for cluster operations.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Failed to create Kubernetes client: {0}")]
    Client(#[from] kube::Error),

    #[error("Failed to infer Kubernetes config: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    #[error("Failed to read kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),
}

/// A connected cluster, optionally scoped to one namespace.
#[derive(Clone)]
pub struct ClusterSource {
    client: Client,
    namespace: Option<String>,
}

fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

async fn list<K>(client: Client, namespace: Option<String>) -> Result<Vec<K>, kube::Error>
where
    K: kube::Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    let objects = api::<K>(client, namespace.as_deref())
        .list(&ListParams::default())
        .await?;
    Ok(objects.items)
}

/// Pods created by a controller are audited through that controller.
fn is_owned(pod: &Pod) -> bool {
    pod.metadata
        .owner_references
        .as_ref()
        .is_some_and(|refs| !refs.is_empty())
}

/// Why one kind contributed nothing.
#[derive(Debug, thiserror::Error)]
enum KindError {
    #[error("list failed: {0}")]
    List(#[from] kube::Error),

    #[error("audit failed: {0}")]
    Audit(#[from] JoinError),
}

/// One list-and-audit task per workload kind.
type KindTask = (&'static str, Result<Vec<AuditResult>, KindError>);

/// Audit on the blocking pool; the rayon fan-out must not occupy an async worker.
async fn audit_off_runtime(
    resources: Vec<Resource>,
    checkers: Arc<Vec<&'static dyn Checker>>,
    config: Arc<AuditConfig>,
    namespaces: Arc<NamespaceLabels>,
) -> Result<Vec<AuditResult>, KindError> {
    let audited = task::spawn_blocking(move || {
        let ctx = AuditContext::new(&config, &namespaces);
        audit_all(&resources, &checkers, &ctx)
    })
    .await?;
    Ok(audited)
}

impl ClusterSource {
    /// Connect using an explicit kubeconfig, or the inferred configuration
    /// (kubeconfig from the environment, or in-cluster credentials).
    pub async fn connect(
        kubeconfig: Option<&Path>,
        namespace: Option<String>,
    ) -> Result<Self, ClusterError> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let config = match kubeconfig {
            Some(path) => {
                debug!("Using kubeconfig {}", path.display());
                let kubeconfig = Kubeconfig::read_from(path)?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
            }
            None => Config::infer().await?,
        };
        let client = Client::try_from(config)?;
        info!(
            "Connected to cluster, namespace scope: {}",
            namespace.as_deref().unwrap_or("all")
        );
        Ok(Self { client, namespace })
    }

    /// Labels of the namespaces in scope. Failing to read them only disables
    /// namespace-level overrides.
    pub async fn namespace_labels(&self) -> NamespaceLabels {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces: Result<Vec<Namespace>, kube::Error> = match &self.namespace {
            Some(name) => api.get_opt(name).await.map(|ns| ns.into_iter().collect()),
            None => api.list(&ListParams::default()).await.map(|list| list.items),
        };
        match namespaces {
            Ok(namespaces) => namespaces
                .into_iter()
                .filter_map(|ns| {
                    let name = ns.metadata.name?;
                    Some((name, ns.metadata.labels.unwrap_or_default()))
                })
                .collect(),
            Err(err) => {
                warn!("Cannot read namespace labels, namespace overrides are disabled: {err}");
                NamespaceLabels::new()
            }
        }
    }

    fn spawn_kind<K>(
        &self,
        tasks: &mut JoinSet<KindTask>,
        kind: &'static str,
        checkers: Arc<Vec<&'static dyn Checker>>,
        config: Arc<AuditConfig>,
        namespaces: Arc<NamespaceLabels>,
        keep: fn(&K) -> bool,
    ) where
        K: kube::Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug
            + Send
            + 'static,
        K::DynamicType: Default,
        Resource: From<K>,
    {
        let client = self.client.clone();
        let namespace = self.namespace.clone();
        tasks.spawn(async move {
            let objects = match list::<K>(client, namespace).await {
                Ok(objects) => objects,
                Err(err) => return (kind, Err(err.into())),
            };
            let resources: Vec<Resource> = objects
                .into_iter()
                .filter(keep)
                .map(Resource::from)
                .collect();
            debug!("Fetched {} {kind}(s)", resources.len());
            (kind, audit_off_runtime(resources, checkers, config, namespaces).await)
        });
    }

    /// List and audit every supported kind, waiting for all kinds to finish.
    pub async fn audit(
        &self,
        checkers: Vec<&'static dyn Checker>,
        config: Arc<AuditConfig>,
    ) -> Vec<AuditResult> {
        let namespaces = Arc::new(self.namespace_labels().await);
        let checkers = Arc::new(checkers);
        let mut tasks = JoinSet::new();
        let source = self;

        macro_rules! spawn {
            ($kind:ty, $name:literal) => {
                spawn!($kind, $name, |_| true)
            };
            ($kind:ty, $name:literal, $keep:expr) => {
                source.spawn_kind::<$kind>(
                    &mut tasks,
                    $name,
                    Arc::clone(&checkers),
                    Arc::clone(&config),
                    Arc::clone(&namespaces),
                    $keep,
                )
            };
        }
        spawn!(Pod, "Pod", |pod| !is_owned(pod));
        spawn!(Deployment, "Deployment");
        spawn!(DaemonSet, "DaemonSet");
        spawn!(StatefulSet, "StatefulSet");
        spawn!(ReplicationController, "ReplicationController");
        spawn!(CronJob, "CronJob");
        spawn!(NetworkPolicy, "NetworkPolicy");

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(mut audited))) => results.append(&mut audited),
                Ok((kind, Err(err))) => warn!("Skipping {kind} objects, {err}"),
                Err(err) => warn!("Audit task failed: {err}"),
            }
        }
        results.sort_by(|a, b| a.resource.cmp(&b.resource));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    #[test]
    fn test_owned_pods_are_skipped() {
        let mut pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-abc".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!is_owned(&pod));
        pod.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "ReplicaSet".to_string(),
            name: "web".to_string(),
            uid: "1234".to_string(),
            ..Default::default()
        }]);
        assert!(is_owned(&pod));
    }

    #[tokio::test]
    async fn test_audit_runs_on_the_blocking_pool() {
        let pod = Resource::from_yaml(
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: web\nspec:\n  containers:\n  - name: app\n    image: nginx:1.25\n",
        )
        .unwrap();
        let rootfs = crate::analyzer::checks::get_checker("rootfs").unwrap();
        let results = audit_off_runtime(
            vec![pod],
            Arc::new(vec![rootfs]),
            Arc::new(AuditConfig::default()),
            Arc::new(NamespaceLabels::new()),
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].resource.name, "web");
        assert!(results[0].has_errors());
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_is_an_error() {
        let result = ClusterSource::connect(Some(Path::new("/nonexistent/kubeconfig")), None).await;
        assert!(matches!(result, Err(ClusterError::Kubeconfig(_))));
    }
}
