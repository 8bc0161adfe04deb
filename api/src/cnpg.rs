use crate::k8up::SecretKeyRef;
use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct StorageConfiguration {
    pub size: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RecoverySource {
    pub source: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct Bootstrap {
    pub recovery: RecoverySource,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Credentials {
    pub access_key_id: SecretKeyRef,
    pub secret_access_key: SecretKeyRef,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalBackup {
    pub max_parallel: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BarmanObjectStore {
    pub destination_path: String,

    #[serde(rename = "endpointURL")]
    pub endpoint_url: String,

    // name of the cluster that wrote the backup
    pub server_name: Option<String>,

    pub s3_credentials: S3Credentials,

    pub wal: Option<WalBackup>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCluster {
    pub name: String,
    pub barman_object_store: BarmanObjectStore,
}

/*
 * CloudNativePG cluster. Only the fields needed to bootstrap a cluster out
 * of an object-store backup are modelled.
 */
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(group = "postgresql.cnpg.io", version = "v1", kind = "Cluster", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct PostgresClusterSpec {
    pub instances: u32,

    pub storage: StorageConfiguration,

    pub bootstrap: Bootstrap,

    pub external_clusters: Vec<ExternalCluster>,
}

pub type PostgresCluster = Cluster;
