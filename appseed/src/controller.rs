use crate::config::{ArgoConfig, PollConfig};
use crate::errors::{Error, Result};
use crate::poll;
use appseed_api as api;

use async_trait::async_trait;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::api::Patch as KubePatch;
use kube::api::PatchParams as KubePatchParams;
use serde_json::json;

/*
 * The system turning an application descriptor into running workloads.
 * install is idempotent: calling it for an installed app just re-applies
 * the definition.
 */
#[async_trait]
pub trait DeploymentController: Send + Sync {
    async fn exists(&self, name: &str) -> Result<bool>;

    /* Ok(true) once applied, and healthy when `wait` is set */
    async fn install(&self, name: &str, namespace: &str, source: &api::AppSource, wait: bool) -> Result<bool>;

    async fn sync(&self, name: &str) -> Result<()>;

    /* `retry` polls until ready, otherwise the current state is checked once */
    async fn wait_for_app(&self, name: &str, retry: bool) -> Result<()>;
}

/*
 * Argo CD, driven through its Application objects.
 */
pub struct ArgoApplications {
    app_api: KubeApi<api::Application>,
    config: ArgoConfig,
    poll: PollConfig,
}

pub fn application(name: &str, namespace: &str, source: &api::AppSource, config: &ArgoConfig) -> api::Application {
    let spec = api::ApplicationSpec{
	project: config.project.clone(),
	source: api::argocd::ApplicationSource{
	    repo_url: source.repo.clone(),
	    path: source.path.clone(),
	    target_revision: source.revision.clone(),
	},
	destination: api::argocd::ApplicationDestination{
	    server: config.server.clone(),
	    namespace: namespace.to_string(),
	},
	sync_policy: Some(api::argocd::SyncPolicy{
	    automated: Some(api::argocd::AutomatedSync{ prune: true, self_heal: true }),
	    sync_options: Some(vec![String::from("CreateNamespace=true"), String::from("ApplyOutOfSyncOnly=true")]),
	}),
    };

    let mut app = api::Application::new(name, spec);
    app.metadata.namespace = Some(config.namespace.clone());
    app
}

impl ArgoApplications {

    pub fn new(kube_client: KubeClient, config: ArgoConfig, poll: PollConfig) -> Self {
	Self{
	    app_api: KubeApi::namespaced(kube_client, &config.namespace),
	    config,
	    poll,
	}
    }

    /* Ok(true) when healthy and synced, Err when Argo CD reports errors */
    async fn ready(&self, name: &str) -> Result<bool> {
	let Some(app) = self.app_api.get_opt(name).await? else {
	    return Ok(false);
	};
	let status = app.status.unwrap_or_default();

	let errors = status.errors();
	if !errors.is_empty() {
	    return Err(Error::Deployment(format!("{}: {}", name, errors.join("; "))));
	}
	Ok(status.is_ready())
    }
}

#[async_trait]
impl DeploymentController for ArgoApplications {

    async fn exists(&self, name: &str) -> Result<bool> {
	Ok(self.app_api.get_opt(name).await?.is_some())
    }

    async fn install(&self, name: &str, namespace: &str, source: &api::AppSource, wait: bool) -> Result<bool> {
	log::info!("Installing {} from {} ({})", name, source.repo, source.path);

	let app = application(name, namespace, source, &self.config);
	let params = KubePatchParams::apply(crate::cluster::FIELD_MANAGER).force();
	self.app_api.patch(name, &params, &KubePatch::Apply(&app)).await?;

	if wait {
	    self.wait_for_app(name, true).await?;
	}
	Ok(true)
    }

    async fn sync(&self, name: &str) -> Result<()> {
	log::info!("Syncing {}", name);

	let patch = json!({
	    "operation": {
		"initiatedBy": { "username": crate::cluster::FIELD_MANAGER },
		"sync": { "syncStrategy": { "hook": {} } },
	    }
	});
	self.app_api.patch(name, &KubePatchParams::default(), &KubePatch::Merge(&patch)).await?;
	Ok(())
    }

    async fn wait_for_app(&self, name: &str, retry: bool) -> Result<()> {
	if !retry {
	    return match self.ready(name).await? {
		true => Ok(()),
		false => Err(Error::Unavailable(format!("application {}", name))),
	    };
	}

	log::info!("Waiting for {} to become healthy ...", name);
	poll::until_ready(&format!("application {}", name), &self.poll, || self.ready(name)).await
    }
}
