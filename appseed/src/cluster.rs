use crate::errors::Result;
use appseed_api as api;

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Namespace as KubeNamespace;
use k8s_openapi::api::core::v1::PersistentVolumeClaim as KubePvc;
use k8s_openapi::api::core::v1::Secret as KubeSecret;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::api::ObjectMeta;
use kube::api::Patch as KubePatch;
use kube::api::PatchParams as KubePatchParams;
use serde_json::json;
use std::collections::BTreeMap;

pub const FIELD_MANAGER: &str = "appseed";

/*
 * The part of the Kubernetes API the engine writes to. KubeCluster is the
 * real thing, tests record calls instead.
 */
#[async_trait]
pub trait Cluster: Send + Sync {
    async fn ensure_namespace(&self, name: &str) -> Result<()>;

    async fn secret_data(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>>;

    async fn apply_secret(&self, namespace: &str, name: &str, data: &BTreeMap<String, String>) -> Result<()>;

    async fn apply_pvc(&self, namespace: &str, pvc: &KubePvc) -> Result<()>;

    async fn label_pvc(&self, namespace: &str, name: &str, labels: &BTreeMap<String, String>) -> Result<()>;

    async fn apply_restore(&self, namespace: &str, restore: &api::Restore) -> Result<()>;

    async fn restore_status(&self, namespace: &str, name: &str) -> Result<Option<api::RestoreStatus>>;

    async fn apply_database_cluster(&self, namespace: &str, cluster: &api::PostgresCluster) -> Result<()>;

    async fn apply_external_secret(&self, namespace: &str, secret: &api::ExternalSecret) -> Result<()>;
}

pub fn managed_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(String::from("app.kubernetes.io/managed-by"), String::from(FIELD_MANAGER));
    labels
}

/* build an Opaque secret with the default labels */
pub fn secret(namespace: &str, name: &str, data: &BTreeMap<String, String>) -> KubeSecret {
    let mut metadata = ObjectMeta::default();
    metadata.name = Some(name.to_string());
    metadata.namespace = Some(namespace.to_string());
    metadata.labels = Some(managed_labels());

    KubeSecret{
	metadata,
	type_: Some(String::from("Opaque")),
	string_data: Some(data.clone()),
	..Default::default()
    }
}

fn decode(data: BTreeMap<String, ByteString>) -> BTreeMap<String, String> {
    data.into_iter()
	.map(|(key, value)| (key, String::from_utf8_lossy(&value.0).to_string()))
	.collect()
}

#[derive(Clone)]
pub struct KubeCluster {
    kube_client: KubeClient,
}

impl KubeCluster {

    pub fn new(kube_client: KubeClient) -> Self {
	Self{ kube_client }
    }

    fn apply_params() -> KubePatchParams {
	KubePatchParams::apply(FIELD_MANAGER).force()
    }
}

#[async_trait]
impl Cluster for KubeCluster {

    async fn ensure_namespace(&self, name: &str) -> Result<()> {
	let namespaces: KubeApi<KubeNamespace> = KubeApi::all(self.kube_client.clone());
	if namespaces.get_opt(name).await?.is_some() {
	    return Ok(());
	}

	log::info!("Creating namespace {}", name);
	let mut metadata = ObjectMeta::default();
	metadata.name = Some(name.to_string());
	let namespace = KubeNamespace{ metadata, ..Default::default() };
	namespaces.patch(name, &Self::apply_params(), &KubePatch::Apply(&namespace)).await?;
	Ok(())
    }

    async fn secret_data(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>> {
	let secrets: KubeApi<KubeSecret> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	let data = secrets.get_opt(name).await?
	    .map(|secret| decode(secret.data.unwrap_or_default()));
	Ok(data)
    }

    async fn apply_secret(&self, namespace: &str, name: &str, data: &BTreeMap<String, String>) -> Result<()> {
	let secrets: KubeApi<KubeSecret> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	let secret = secret(namespace, name, data);
	secrets.patch(name, &Self::apply_params(), &KubePatch::Apply(&secret)).await?;
	Ok(())
    }

    async fn apply_pvc(&self, namespace: &str, pvc: &KubePvc) -> Result<()> {
	let pvcs: KubeApi<KubePvc> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	let name = pvc.metadata.name.clone().unwrap_or_default();
	pvcs.patch(&name, &Self::apply_params(), &KubePatch::Apply(pvc)).await?;
	Ok(())
    }

    async fn label_pvc(&self, namespace: &str, name: &str, labels: &BTreeMap<String, String>) -> Result<()> {
	let pvcs: KubeApi<KubePvc> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	let patch = json!({ "metadata": { "labels": labels } });
	pvcs.patch(name, &KubePatchParams::default(), &KubePatch::Merge(&patch)).await?;
	Ok(())
    }

    async fn apply_restore(&self, namespace: &str, restore: &api::Restore) -> Result<()> {
	let restores: KubeApi<api::Restore> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	let name = restore.metadata.name.clone().unwrap_or_default();
	restores.patch(&name, &Self::apply_params(), &KubePatch::Apply(restore)).await?;
	Ok(())
    }

    async fn restore_status(&self, namespace: &str, name: &str) -> Result<Option<api::RestoreStatus>> {
	let restores: KubeApi<api::Restore> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	let status = restores.get_opt(name).await?.and_then(|r| r.status);
	Ok(status)
    }

    async fn apply_database_cluster(&self, namespace: &str, cluster: &api::PostgresCluster) -> Result<()> {
	let clusters: KubeApi<api::PostgresCluster> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	let name = cluster.metadata.name.clone().unwrap_or_default();
	clusters.patch(&name, &Self::apply_params(), &KubePatch::Apply(cluster)).await?;
	Ok(())
    }

    async fn apply_external_secret(&self, namespace: &str, secret: &api::ExternalSecret) -> Result<()> {
	let secrets: KubeApi<api::ExternalSecret> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	let name = secret.metadata.name.clone().unwrap_or_default();
	secrets.patch(&name, &Self::apply_params(), &KubePatch::Apply(secret)).await?;
	Ok(())
    }
}
