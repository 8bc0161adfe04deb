/*
 * In-memory stand-ins for every external boundary the engine talks to.
 * They record what was asked of them so tests can assert on it.
 */
use crate::cluster::Cluster;
use crate::controller::DeploymentController;
use crate::errors::{Error, Result};
use crate::identity::{IdentityProvider, OidcClient};
use crate::vault::{Choice, DisambiguationPolicy, Lookup, Release, VaultClient};
use appseed_api as api;
use api::{CredentialRecord, VaultStatus};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolumeClaim as KubePvc;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct VaultState {
    items: Vec<CredentialRecord>,
    next_id: usize,
    generated: usize,
    unlocked: bool,
    logins: usize,
    unlocks: usize,
    locks: usize,
    creates: usize,
    edits: usize,
}

/* starts logged out, like a fresh `bw` install */
#[derive(Clone, Default)]
pub struct MemoryVault {
    state: Arc<Mutex<VaultState>>,
    releases: Arc<AtomicUsize>,
}

impl MemoryVault {

    pub fn insert(&self, name: &str, user: &str, password: &str) -> String {
	let mut state = self.state.lock().unwrap();
	state.next_id += 1;
	let id = format!("item-{}", state.next_id);
	state.items.push(CredentialRecord{
	    id: id.clone(),
	    name: name.to_string(),
	    user: user.to_string(),
	    password: password.to_string(),
	    ..Default::default()
	});
	id
    }

    pub fn record(&self, id: &str) -> Option<CredentialRecord> {
	self.state.lock().unwrap().items.iter().find(|r| r.id == id).cloned()
    }

    pub fn count_named(&self, name: &str) -> usize {
	self.state.lock().unwrap().items.iter().filter(|r| r.name == name).count()
    }

    pub fn logins(&self) -> usize { self.state.lock().unwrap().logins }
    pub fn unlocks(&self) -> usize { self.state.lock().unwrap().unlocks }
    pub fn locks(&self) -> usize { self.state.lock().unwrap().locks }
    pub fn creates(&self) -> usize { self.state.lock().unwrap().creates }
    pub fn edits(&self) -> usize { self.state.lock().unwrap().edits }
    pub fn releases(&self) -> usize { self.releases.load(Ordering::SeqCst) }
}

#[async_trait]
impl VaultClient for MemoryVault {

    async fn status(&self) -> Result<VaultStatus> {
	let state = self.state.lock().unwrap();
	Ok(match (state.logins, state.unlocked) {
	    (0, _) => VaultStatus::Unauthenticated,
	    (_, true) => VaultStatus::Unlocked,
	    (_, false) => VaultStatus::Locked,
	})
    }

    async fn login(&self) -> Result<()> {
	self.state.lock().unwrap().logins += 1;
	Ok(())
    }

    async fn unlock(&self) -> Result<String> {
	let mut state = self.state.lock().unwrap();
	state.unlocks += 1;
	state.unlocked = true;
	Ok(format!("session-{}", state.unlocks))
    }

    async fn lock(&self, _token: &str) -> Result<()> {
	let mut state = self.state.lock().unwrap();
	state.locks += 1;
	state.unlocked = false;
	Ok(())
    }

    fn release(&self, _token: &str) -> Option<Release> {
	let releases = self.releases.clone();
	Some(Box::new(move || {
	    releases.fetch_add(1, Ordering::SeqCst);
	}))
    }

    async fn generate(&self, _token: &str, special_characters: bool) -> Result<String> {
	let mut state = self.state.lock().unwrap();
	state.generated += 1;
	Ok(match special_characters {
	    true => format!("generated-{}!", state.generated),
	    false => format!("generated-{}", state.generated),
	})
    }

    async fn find(&self, _token: &str, name: &str) -> Result<Lookup> {
	let state = self.state.lock().unwrap();
	let mut found: Vec<&CredentialRecord> = state.items.iter().filter(|r| r.name == name).collect();
	Ok(match found.len() {
	    0 => Lookup::NotFound,
	    1 => Lookup::Single(found.remove(0).clone()),
	    _ => Lookup::Multiple(found.iter().map(|r| r.id.clone()).collect()),
	})
    }

    async fn get(&self, _token: &str, id: &str) -> Result<CredentialRecord> {
	self.record(id).ok_or_else(|| Error::Vault(format!("no item {}", id)))
    }

    async fn create(&self, _token: &str, record: &CredentialRecord) -> Result<CredentialRecord> {
	let mut state = self.state.lock().unwrap();
	state.next_id += 1;
	state.creates += 1;

	let mut created = record.clone();
	created.id = format!("item-{}", state.next_id);
	state.items.push(created.clone());
	Ok(created)
    }

    async fn edit(&self, _token: &str, id: &str, record: &CredentialRecord) -> Result<CredentialRecord> {
	let mut state = self.state.lock().unwrap();
	state.edits += 1;

	let Some(existing) = state.items.iter_mut().find(|r| r.id == id) else {
	    return Err(Error::Vault(format!("no item {}", id)));
	};
	*existing = record.clone();
	existing.id = id.to_string();
	Ok(existing.clone())
    }
}

/* answers disambiguation questions from a script, errors once it runs dry */
#[derive(Clone, Default)]
pub struct ScriptedPolicy {
    answers: Arc<Mutex<VecDeque<Choice>>>,
    offered: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedPolicy {

    pub fn answering(answers: Vec<Choice>) -> Self {
	Self{
	    answers: Arc::new(Mutex::new(answers.into())),
	    offered: Arc::default(),
	}
    }

    pub fn calls(&self) -> usize {
	self.offered.lock().unwrap().len()
    }

    /* ids of the candidates of every question asked so far */
    pub fn offered(&self) -> Vec<Vec<String>> {
	self.offered.lock().unwrap().clone()
    }
}

impl DisambiguationPolicy for ScriptedPolicy {
    fn disambiguate(&self, name: &str, candidates: &[CredentialRecord]) -> Result<Choice> {
	self.offered.lock().unwrap().push(candidates.iter().map(|c| c.id.clone()).collect());
	self.answers.lock().unwrap().pop_front()
	    .ok_or_else(|| Error::Other(format!("unexpected question about '{}'", name)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Namespace(String),
    Secret(String),
    Pvc(String),
    LabelPvc(String),
    Restore(String),
    DatabaseCluster(String),
    ExternalSecret(String),
}

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Default)]
struct ClusterState {
    events: Vec<Event>,
    secrets: BTreeMap<Key, BTreeMap<String, String>>,
    secret_writes: BTreeMap<Key, usize>,
    pvc_labels: BTreeMap<Key, BTreeMap<String, String>>,
    restores: Vec<api::Restore>,
    restore_failure: Option<String>,
    hold_restores: bool,
}

/*
 * Remembers every write. Reads (secret_data, restore_status) are answered
 * from that memory and are not recorded as events. Restore jobs finish as
 * soon as they are applied unless told otherwise.
 */
#[derive(Clone, Default)]
pub struct RecordingCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl RecordingCluster {

    pub fn events(&self) -> Vec<Event> {
	self.state.lock().unwrap().events.clone()
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<BTreeMap<String, String>> {
	self.state.lock().unwrap().secrets.get(&key(namespace, name)).cloned()
    }

    /* pre-existing secret, no event */
    pub fn seed_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
	let data = data.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
	self.state.lock().unwrap().secrets.insert(key(namespace, name), data);
    }

    pub fn secret_writes(&self, namespace: &str, name: &str) -> usize {
	self.state.lock().unwrap().secret_writes.get(&key(namespace, name)).copied().unwrap_or(0)
    }

    pub fn pvc_labels(&self, namespace: &str, name: &str) -> BTreeMap<String, String> {
	self.state.lock().unwrap().pvc_labels.get(&key(namespace, name)).cloned().unwrap_or_default()
    }

    pub fn restore_jobs(&self) -> Vec<api::Restore> {
	self.state.lock().unwrap().restores.clone()
    }

    pub fn fail_restores(&self, message: &str) {
	self.state.lock().unwrap().restore_failure = Some(message.to_string());
    }

    pub fn hold_restores(&self) {
	self.state.lock().unwrap().hold_restores = true;
    }

    fn record(&self, event: Event) {
	self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl Cluster for RecordingCluster {

    async fn ensure_namespace(&self, name: &str) -> Result<()> {
	self.record(Event::Namespace(name.to_string()));
	Ok(())
    }

    async fn secret_data(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>> {
	Ok(self.secret(namespace, name))
    }

    async fn apply_secret(&self, namespace: &str, name: &str, data: &BTreeMap<String, String>) -> Result<()> {
	let mut state = self.state.lock().unwrap();
	state.events.push(Event::Secret(name.to_string()));
	state.secrets.insert(key(namespace, name), data.clone());
	*state.secret_writes.entry(key(namespace, name)).or_default() += 1;
	Ok(())
    }

    async fn apply_pvc(&self, _namespace: &str, pvc: &KubePvc) -> Result<()> {
	self.record(Event::Pvc(pvc.metadata.name.clone().unwrap_or_default()));
	Ok(())
    }

    async fn label_pvc(&self, namespace: &str, name: &str, labels: &BTreeMap<String, String>) -> Result<()> {
	let mut state = self.state.lock().unwrap();
	state.events.push(Event::LabelPvc(name.to_string()));
	state.pvc_labels.entry(key(namespace, name)).or_default().extend(labels.clone());
	Ok(())
    }

    async fn apply_restore(&self, _namespace: &str, restore: &api::Restore) -> Result<()> {
	let mut state = self.state.lock().unwrap();
	state.events.push(Event::Restore(restore.metadata.name.clone().unwrap_or_default()));
	state.restores.push(restore.clone());
	Ok(())
    }

    async fn restore_status(&self, namespace: &str, name: &str) -> Result<Option<api::RestoreStatus>> {
	let state = self.state.lock().unwrap();
	let applied = state.restores.iter().any(|r| {
	    r.metadata.name.as_deref() == Some(name) && r.metadata.namespace.as_deref() == Some(namespace)
	});
	if !applied {
	    return Ok(None);
	}

	let status = match (&state.restore_failure, state.hold_restores) {
	    (Some(message), _) => api::RestoreStatus{
		started: Some(true),
		finished: Some(true),
		conditions: Some(vec![api::k8up::RestoreCondition{
		    type_: String::from("Completed"),
		    status: Some(String::from("True")),
		    reason: Some(String::from("Failed")),
		    message: Some(message.clone()),
		}]),
	    },
	    (None, true) => api::RestoreStatus{ started: Some(true), finished: Some(false), conditions: None },
	    (None, false) => api::RestoreStatus{ started: Some(true), finished: Some(true), conditions: None },
	};
	Ok(Some(status))
    }

    async fn apply_database_cluster(&self, _namespace: &str, cluster: &api::PostgresCluster) -> Result<()> {
	self.record(Event::DatabaseCluster(cluster.metadata.name.clone().unwrap_or_default()));
	Ok(())
    }

    async fn apply_external_secret(&self, _namespace: &str, secret: &api::ExternalSecret) -> Result<()> {
	self.record(Event::ExternalSecret(secret.metadata.name.clone().unwrap_or_default()));
	Ok(())
    }
}

#[derive(Default)]
struct ControllerState {
    installed: BTreeSet<String>,
    failing: BTreeSet<String>,
    calls: Vec<String>,
}

/* calls are recorded as "<operation> <app>" */
#[derive(Clone, Default)]
pub struct FakeController {
    state: Arc<Mutex<ControllerState>>,
}

impl FakeController {

    pub fn installed(names: &[&str]) -> Self {
	let controller = Self::default();
	controller.state.lock().unwrap().installed = names.iter().map(|n| n.to_string()).collect();
	controller
    }

    /* install of `name` reports a deployment failure */
    pub fn fail(&self, name: &str) {
	self.state.lock().unwrap().failing.insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
	self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
	self.calls().iter().filter(|c| *c == call).count()
    }
}

#[async_trait]
impl DeploymentController for FakeController {

    async fn exists(&self, name: &str) -> Result<bool> {
	let mut state = self.state.lock().unwrap();
	state.calls.push(format!("exists {}", name));
	Ok(state.installed.contains(name))
    }

    async fn install(&self, name: &str, _namespace: &str, _source: &api::AppSource, wait: bool) -> Result<bool> {
	let mut state = self.state.lock().unwrap();
	state.calls.push(format!("install {}", name));
	if state.failing.contains(name) {
	    return Err(Error::Deployment(format!("{}: ComparisonError", name)));
	}
	if wait {
	    state.calls.push(format!("wait {}", name));
	}
	state.installed.insert(name.to_string());
	Ok(true)
    }

    async fn sync(&self, name: &str) -> Result<()> {
	self.state.lock().unwrap().calls.push(format!("sync {}", name));
	Ok(())
    }

    async fn wait_for_app(&self, name: &str, _retry: bool) -> Result<()> {
	self.state.lock().unwrap().calls.push(format!("wait {}", name));
	Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeIdentity {
    applications: Arc<Mutex<Vec<String>>>,
    roles: Arc<Mutex<Vec<String>>>,
    blank: bool,
}

impl FakeIdentity {

    /* hands out clients without a secret */
    pub fn blank() -> Self {
	Self{ blank: true, ..Default::default() }
    }

    pub fn applications(&self) -> Vec<String> {
	self.applications.lock().unwrap().clone()
    }

    pub fn roles(&self) -> Vec<String> {
	self.roles.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {

    async fn create_application(&self, name: &str, _redirect_uris: &[String], _logout_uris: &[String]) -> Result<OidcClient> {
	self.applications.lock().unwrap().push(name.to_string());
	Ok(OidcClient{
	    client_id: format!("{}-client", name),
	    client_secret: match self.blank {
		true => String::new(),
		false => format!("{}-secret", name),
	    },
	})
    }

    async fn create_role(&self, key: &str, _display_name: &str, group: &str) -> Result<()> {
	self.roles.lock().unwrap().push(format!("{}:{}", key, group));
	Ok(())
    }
}
