use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/* ClusterSecretStores backed by the vault item login and its custom fields */
pub const LOGIN_STORE: &str = "bitwarden-login";
pub const FIELDS_STORE: &str = "bitwarden-fields";

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct StoreRef {
    pub kind: String,
    pub name: String,
}

impl StoreRef {
    pub fn cluster(name: &str) -> Self {
	Self{
	    kind: String::from("ClusterSecretStore"),
	    name: name.to_string(),
	}
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub store_ref: StoreRef,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RemoteRef {
    pub key: String,
    pub property: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretData {
    pub secret_key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<SourceRef>,

    pub remote_ref: RemoteRef,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretTarget {
    pub name: String,
    pub deletion_policy: Option<String>,
}

/*
 * external-secrets.io object that materialises a vault item as a native
 * Secret in the app namespace.
 */
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(group = "external-secrets.io", version = "v1beta1", kind = "ExternalSecret", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretSpec {
    pub target: ExternalSecretTarget,

    pub secret_store_ref: StoreRef,

    pub data: Vec<ExternalSecretData>,
}
