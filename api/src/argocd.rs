use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/* label Argo CD puts on everything it owns */
pub const INSTANCE_LABEL: &str = "argocd.argoproj.io/instance";

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSource {
    #[serde(rename = "repoURL")]
    pub repo_url: String,

    pub path: String,

    pub target_revision: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDestination {
    pub server: String,
    pub namespace: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutomatedSync {
    pub prune: bool,
    pub self_heal: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    pub automated: Option<AutomatedSync>,
    pub sync_options: Option<Vec<String>>,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(group = "argoproj.io", version = "v1alpha1", kind = "Application", namespaced)]
#[kube(status = "ApplicationStatus")]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub project: String,

    pub source: ApplicationSource,

    pub destination: ApplicationDestination,

    pub sync_policy: Option<SyncPolicy>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct HealthStatus {
    // Healthy, Progressing, Degraded, Suspended, Missing, Unknown
    pub status: Option<String>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SyncStatus {
    // Synced, OutOfSync, Unknown
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ApplicationCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ApplicationStatus {
    pub health: Option<HealthStatus>,
    pub sync: Option<SyncStatus>,
    pub conditions: Option<Vec<ApplicationCondition>>,
}

impl ApplicationStatus {

    pub fn is_ready(&self) -> bool {
	let healthy = self.health.as_ref()
	    .and_then(|h| h.status.as_deref())
	    .map_or(false, |s| s == "Healthy");
	let synced = self.sync.as_ref()
	    .and_then(|s| s.status.as_deref())
	    .map_or(false, |s| s == "Synced");

	healthy && synced
    }

    /*
     * Argo CD reports ComparisonError, SyncError, InvalidSpecError, ...
     * as conditions; any of them means the deployment is broken.
     */
    pub fn errors(&self) -> Vec<String> {
	let mut errors = vec![];

	if let Some(conditions) = &self.conditions {
	    for condition in conditions {
		if condition.type_.ends_with("Error") {
		    let message = condition.message.clone().unwrap_or_default();
		    errors.push(format!("{}: {}", condition.type_, message));
		}
	    }
	}
	errors
    }
}
