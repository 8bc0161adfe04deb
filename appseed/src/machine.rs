/*
 * Per-application orchestration.
 *
 * One run looks at whether the deployment controller already knows the
 * application and picks a branch:
 *
 *  - first time setup: create credentials (and the OIDC client), publish
 *    them, restore backups if asked to, install, bootstrap;
 *  - refresh: the app is installed, only look credentials up again and
 *    re-publish them. Nothing is ever created on this branch;
 *  - install only: init is disabled, just install/sync.
 */
use crate::bridge::{self, AppSetSecretBridge};
use crate::cluster::Cluster;
use crate::config::{ArgoConfig, PollConfig};
use crate::controller::DeploymentController;
use crate::errors::{Error, Result};
use crate::identity::IdentityProvider;
use crate::restore::{self, ObjectStore, RestorePipeline, RestoreRequest};
use crate::secrets::{self, Secrets};
use appseed_api as api;
use api::{AppDescriptor, SecretSpec};
use api::descriptor::OidcSpec;

use async_trait::async_trait;
use std::collections::BTreeMap;

pub const BACKUPS_PURPOSE: &str = "backups";
pub const OIDC_PURPOSE: &str = "oidc";

const S3_ACCESS_ID_VALUE: &str = "s3_backup_access_id";
const S3_SECRET_KEY_VALUE: &str = "s3_backup_secret_key";
const RESTIC_PASSWORD_VALUE: &str = "restic_repo_password";

/*
 * The few things that differ between applications. The defaults read
 * everything off the descriptor.
 */
#[async_trait]
pub trait AppHooks: Send + Sync {

    fn secrets(&self, app: &AppDescriptor) -> Vec<SecretSpec> {
	app.init.secrets.clone()
    }

    fn oidc(&self, app: &AppDescriptor) -> Option<OidcSpec> {
	app.init.oidc.clone()
    }

    fn needs_bootstrap(&self, _app: &AppDescriptor) -> bool {
	false
    }

    /*
     * One-time setup once the workload is up (admin account, ...). A
     * returned spec is stored like any other credential.
     */
    async fn bootstrap(&self, _app: &AppDescriptor) -> Result<Option<SecretSpec>> {
	Ok(None)
    }

    /* purposes `bootstrap` stores, looked up again on refresh */
    fn bootstrap_purposes(&self, _app: &AppDescriptor) -> Vec<String> {
	Vec::new()
    }
}

pub struct DescriptorHooks;

impl AppHooks for DescriptorHooks {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    FirstTimeSetup,
    Refresh,
    InstallOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub branch: Branch,

    // purpose -> credential identifier, as published
    pub credentials: BTreeMap<String, String>,

    pub restored: bool,
    pub bootstrapped: bool,
}

/*
 * The extra credential restore jobs and backup schedules read. A restore
 * needs it even when the location comes from an earlier run.
 */
pub fn backups_secret(app: &AppDescriptor) -> Option<SecretSpec> {
    if app.backups.is_none() && !app.restore_requested() {
	return None;
    }
    let values = &app.init.values;

    let mut spec = SecretSpec{
	purpose: String::from(BACKUPS_PURPOSE),
	username: values.get(S3_ACCESS_ID_VALUE).cloned().unwrap_or_default(),
	password: values.get(S3_SECRET_KEY_VALUE).cloned(),
	..Default::default()
    };
    match values.get(RESTIC_PASSWORD_VALUE) {
	Some(password) => {
	    spec.fields.insert(String::from(restore::RESTIC_PASSWORD_KEY), password.clone());
	},
	None => spec.generate.push(String::from(restore::RESTIC_PASSWORD_KEY)),
    }
    Some(spec)
}

/* everything an app publishes into the shared appset secret */
pub fn bridge_entries(app: &AppDescriptor, credentials: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();

    for (purpose, id) in credentials {
	entries.insert(bridge::key(&[app.name.as_str(), purpose.as_str(), "id"]), id.clone());
    }
    for (key, value) in &app.secret_keys {
	entries.insert(bridge::key(&[app.name.as_str(), key.as_str()]), value.clone());
    }
    if let Some(backups) = &app.backups {
	entries.insert(bridge::key(&[app.name.as_str(), "s3_backup_endpoint"]), backups.endpoint.clone());
	entries.insert(bridge::key(&[app.name.as_str(), "s3_backup_bucket"]), backups.bucket.clone());
	if let Some(region) = &backups.region {
	    entries.insert(bridge::key(&[app.name.as_str(), "s3_backup_region"]), region.clone());
	}
    }
    entries
}

pub struct InstallStateMachine<'a> {
    cluster: &'a dyn Cluster,
    controller: &'a dyn DeploymentController,
    identity: Option<&'a dyn IdentityProvider>,
    bridge: AppSetSecretBridge<'a>,
    restore: RestorePipeline<'a>,
}

impl<'a> InstallStateMachine<'a> {

    pub fn new(cluster: &'a dyn Cluster, controller: &'a dyn DeploymentController, argo: &ArgoConfig, poll: PollConfig) -> Self {
	Self{
	    cluster,
	    controller,
	    identity: None,
	    bridge: AppSetSecretBridge::new(cluster, &argo.namespace, &argo.appset_secret),
	    restore: RestorePipeline::new(cluster, poll),
	}
    }

    pub fn with_identity(mut self, identity: &'a dyn IdentityProvider) -> Self {
	self.identity = Some(identity);
	self
    }

    /* declared secrets plus the backups one, each purpose once */
    fn declared(app: &AppDescriptor, hooks: &dyn AppHooks) -> Vec<SecretSpec> {
	let mut specs = hooks.secrets(app);
	if let Some(backups) = backups_secret(app) {
	    if !specs.iter().any(|s| s.purpose == backups.purpose) {
		specs.push(backups);
	    }
	}
	specs
    }

    async fn register_oidc(&self, identity: &dyn IdentityProvider, app: &AppDescriptor, oidc: &OidcSpec) -> Result<SecretSpec> {
	log::info!("Registering {} with the identity provider", app.name);
	let client = identity.create_application(&app.name, &oidc.redirect_uris, &oidc.logout_uris).await?;
	if client.client_id.is_empty() || client.client_secret.is_empty() {
	    return Err(Error::Identity(format!("no client credentials returned for {}", app.name)));
	}
	for role in &oidc.roles {
	    identity.create_role(&role.key, &role.display_name, &role.group).await?;
	}

	Ok(SecretSpec{
	    purpose: String::from(OIDC_PURPOSE),
	    username: client.client_id,
	    password: Some(client.client_secret),
	    ..Default::default()
	})
    }

    async fn setup(&self, app: &AppDescriptor, hooks: &dyn AppHooks, secrets: &mut Secrets<'_>, specs: &mut [SecretSpec]) -> Result<BTreeMap<String, String>> {
	self.cluster.ensure_namespace(&app.namespace).await?;

	let mut credentials = BTreeMap::new();
	for spec in specs.iter_mut() {
	    if spec.purpose == BACKUPS_PURPOSE && spec.username.is_empty() {
		spec.username = secrets.generate(false).await?;
	    }
	    let id = secrets.create(self.cluster, app, spec).await?;
	    credentials.insert(spec.purpose.clone(), id);
	}

	match (self.identity, hooks.oidc(app)) {
	    (Some(identity), Some(oidc)) => {
		let spec = self.register_oidc(identity, app, &oidc).await?;
		let id = secrets.create(self.cluster, app, &spec).await?;
		credentials.insert(spec.purpose, id);
	    },
	    (None, Some(_)) => log::warn!("{} wants an OIDC client but no identity provider is configured", app.name),
	    _ => {},
	}
	Ok(credentials)
    }

    async fn refresh(&self, app: &AppDescriptor, hooks: &dyn AppHooks, secrets: &mut Secrets<'_>, specs: &[SecretSpec]) -> Result<BTreeMap<String, String>> {
	let mut expected: Vec<SecretSpec> = specs.to_vec();
	let mut extra = hooks.bootstrap_purposes(app);
	if hooks.oidc(app).is_some() {
	    extra.push(String::from(OIDC_PURPOSE));
	}
	for purpose in extra {
	    if !expected.iter().any(|s| s.purpose == purpose) {
		expected.push(SecretSpec{ purpose, ..Default::default() });
	    }
	}

	let mut credentials = BTreeMap::new();
	for spec in &expected {
	    match secrets.existing(self.cluster, app, spec).await? {
		Some(id) => {
		    credentials.insert(spec.purpose.clone(), id);
		},
		None => log::warn!("{} is installed but has no {} credentials", app.name, spec.purpose),
	    }
	}
	Ok(credentials)
    }

    /* backup location from the descriptor, else from what an earlier run published */
    async fn object_store(&self, app: &AppDescriptor) -> Result<ObjectStore> {
	let credentials_secret = restore::credentials_secret(&app.name);
	if let Some(backups) = &app.backups {
	    return Ok(ObjectStore{
		endpoint: backups.endpoint.clone(),
		bucket: backups.bucket.clone(),
		region: backups.region.clone(),
		credentials_secret,
	    });
	}

	let mut values = self.bridge.values().await?;
	let mut take = |name: &str| values.remove(&bridge::key(&[app.name.as_str(), name]));
	match (take("s3_backup_endpoint"), take("s3_backup_bucket"), take("s3_backup_region")) {
	    (Some(endpoint), Some(bucket), region) => Ok(ObjectStore{ endpoint, bucket, region, credentials_secret }),
	    _ => Err(Error::RestoreFailed(format!("no backup location known for {}", app.name))),
	}
    }

    async fn restore_request(&self, app: &AppDescriptor, specs: &[SecretSpec], credentials: &BTreeMap<String, String>, vault: bool) -> Result<RestoreRequest> {
	let store = self.object_store(app).await?;
	let capacity = app.backups.as_ref()
	    .map(|b| b.pvc_capacity.clone())
	    .unwrap_or_else(|| String::from("10Gi"));

	// in vault mode the app's secrets only exist once external-secrets
	// has materialised them
	let templated_secrets: Vec<api::ExternalSecret> = match vault {
	    true => credentials.iter()
		.map(|(purpose, id)| {
		    let spec = specs.iter()
			.find(|s| &s.purpose == purpose)
			.cloned()
			.unwrap_or_else(|| SecretSpec{ purpose: purpose.clone(), ..Default::default() });
		    secrets::external_secret(app, &spec, id)
		})
		.collect(),
	    false => vec![],
	};

	Ok(RestoreRequest{
	    app: app.name.clone(),
	    namespace: app.namespace.clone(),
	    store,
	    volumes: restore::volumes(app, &capacity),
	    database: app.init.restore.database.clone(),
	    templated_secrets,
	})
    }

    pub async fn run(&self, app: &AppDescriptor, hooks: &dyn AppHooks, secrets: &mut Secrets<'_>) -> Result<Outcome> {
	let installed = self.controller.exists(&app.name).await?;
	let branch = match (installed, app.init.enabled) {
	    (false, true) => Branch::FirstTimeSetup,
	    (true, true) => Branch::Refresh,
	    (_, false) => Branch::InstallOnly,
	};
	log::info!("{}: installed={}, init={} -> {:?}", app.name, installed, app.init.enabled, branch);

	let mut specs = Self::declared(app, hooks);
	let credentials = match branch {
	    Branch::FirstTimeSetup => self.setup(app, hooks, secrets, &mut specs).await?,
	    Branch::Refresh => self.refresh(app, hooks, secrets, &specs).await?,
	    Branch::InstallOnly => BTreeMap::new(),
	};
	self.bridge.update(&bridge_entries(app, &credentials)).await?;

	let mut outcome = Outcome{ branch, credentials, restored: false, bootstrapped: false };

	if !installed && app.restore_requested() {
	    let request = self.restore_request(app, &specs, &outcome.credentials, secrets.is_vault()).await?;
	    self.restore.run(&request).await?;
	    outcome.restored = true;
	}

	self.controller.install(&app.name, &app.namespace, &app.source, false).await?;
	if installed {
	    self.controller.sync(&app.name).await?;
	}

	// restored apps come back with their accounts
	if branch == Branch::FirstTimeSetup && !outcome.restored && hooks.needs_bootstrap(app) {
	    self.controller.wait_for_app(&app.name, true).await?;
	    log::info!("Bootstrapping {}", app.name);

	    if let Some(spec) = hooks.bootstrap(app).await? {
		let id = secrets.create(self.cluster, app, &spec).await?;
		let mut published = BTreeMap::new();
		published.insert(spec.purpose.clone(), id.clone());
		self.bridge.update(&bridge_entries(app, &published)).await?;
		outcome.credentials.insert(spec.purpose, id);
	    }
	    outcome.bootstrapped = true;
	}

	log::info!("{} done", app.name);
	Ok(outcome)
    }
}
