use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

impl SecretKeyRef {
    pub fn new(name: &str, key: &str) -> Self {
	Self{
	    name: name.to_string(),
	    key: key.to_string(),
	}
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Backend {
    pub endpoint: String,

    pub bucket: String,

    #[serde(rename = "accessKeyIDSecretRef")]
    pub access_key_id_secret_ref: SecretKeyRef,

    pub secret_access_key_secret_ref: SecretKeyRef,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub repo_password_secret_ref: SecretKeyRef,
    pub s3: S3Backend,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FolderRestore {
    pub claim_name: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RestoreMethod {
    pub folder: FolderRestore,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityContext {
    pub run_as_user: i64,
}

/*
 * k8up restore job: repopulates one PVC from a restic snapshot kept in an
 * S3 bucket.
 */
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(group = "k8up.io", version = "v1", kind = "Restore", namespaced)]
#[kube(status = "RestoreStatus")]
#[serde(rename_all = "camelCase")]
pub struct RestoreSpec {
    pub snapshot: String,

    pub restore_method: RestoreMethod,

    pub backend: Backend,

    pub pod_security_context: Option<PodSecurityContext>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RestoreCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RestoreStatus {
    pub started: Option<bool>,
    pub finished: Option<bool>,
    pub conditions: Option<Vec<RestoreCondition>>,
}

impl RestoreStatus {

    pub fn is_finished(&self) -> bool {
	self.finished.unwrap_or(false)
    }

    /* Some(message) when k8up marked the job as failed */
    pub fn failure(&self) -> Option<String> {
	let conditions = self.conditions.as_ref()?;
	conditions.iter()
	    .find(|c| c.type_ == "Completed" && c.reason.as_deref() == Some("Failed"))
	    .map(|c| c.message.clone().unwrap_or_else(|| String::from("restore failed")))
    }
}
