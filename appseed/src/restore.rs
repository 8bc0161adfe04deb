use crate::cluster::{self, Cluster};
use crate::config::PollConfig;
use crate::errors::{Error, Result};
use crate::poll;
use appseed_api as api;
use api::VolumeRole;
use api::argocd::INSTANCE_LABEL;
use api::k8up::SecretKeyRef;

use k8s_openapi::api::core::v1::PersistentVolumeClaim as KubePvc;
use k8s_openapi::api::core::v1::PersistentVolumeClaimSpec as KubePvcSpec;
use k8s_openapi::api::core::v1::VolumeResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/* keys of the "{app}-backups-credentials" secret */
pub const ACCESS_KEY_ID_KEY: &str = "username";
pub const SECRET_ACCESS_KEY_KEY: &str = "password";
pub const RESTIC_PASSWORD_KEY: &str = "resticRepoPassword";

pub const LATEST_SNAPSHOT: &str = "latest";
const AUXILIARY_CAPACITY: &str = "2Gi";
const BACKUP_SOURCE: &str = "backup";

pub fn credentials_secret(app: &str) -> String {
    format!("{}-backups-credentials", app)
}

/* Where the backups of an application live */
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStore {
    pub endpoint: String,
    pub bucket: String,
    pub region: Option<String>,
    pub credentials_secret: String,
}

impl ObjectStore {

    pub fn endpoint_url(&self) -> String {
	match self.endpoint.contains("://") {
	    true => self.endpoint.clone(),
	    false => format!("https://{}", self.endpoint),
	}
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRestore {
    pub logical: String,
    pub pvc_name: String,
    pub role: VolumeRole,
    pub capacity: String,
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub app: String,
    pub namespace: String,
    pub store: ObjectStore,
    pub volumes: Vec<VolumeRestore>,
    pub database: Option<api::descriptor::DatabaseRestore>,

    // manifests whose secrets the next steps need, the backup
    // credentials one included
    pub templated_secrets: Vec<api::ExternalSecret>,
}

/*
 * Volumes a restore should recreate: everything with a snapshot id plus
 * everything explicitly declared, in name order.
 */
pub fn volumes(app: &api::AppDescriptor, primary_capacity: &str) -> Vec<VolumeRestore> {
    let restore = &app.init.restore;
    let mut logical: Vec<&String> = restore.volumes.keys().chain(restore.snapshot_ids.keys()).collect();
    logical.sort();
    logical.dedup();

    logical.into_iter()
	.map(|name| {
	    let spec = restore.volumes.get(name).cloned().unwrap_or_default();
	    let capacity = match (spec.capacity, spec.role) {
		(Some(capacity), _) => capacity,
		(None, VolumeRole::Primary) => primary_capacity.to_string(),
		(None, _) => AUXILIARY_CAPACITY.to_string(),
	    };

	    VolumeRestore{
		logical: name.clone(),
		pvc_name: spec.pvc.unwrap_or_else(|| format!("{}-{}", app.name, name)),
		role: spec.role,
		capacity,
		snapshot_id: restore.snapshot_ids.get(name).cloned(),
	    }
	})
	.collect()
}

fn ownership_labels(app: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(String::from(INSTANCE_LABEL), app.to_string());
    labels
}

pub fn pvc(namespace: &str, volume: &VolumeRestore) -> KubePvc {
    let mut metadata = ObjectMeta::default();
    metadata.name = Some(volume.pvc_name.clone());
    metadata.namespace = Some(namespace.to_string());
    metadata.labels = Some(cluster::managed_labels());

    let mut requests = BTreeMap::new();
    requests.insert(String::from("storage"), Quantity(volume.capacity.clone()));

    KubePvc{
	metadata,
	spec: Some(KubePvcSpec{
	    access_modes: Some(vec![String::from("ReadWriteOnce")]),
	    resources: Some(VolumeResourceRequirements{
		requests: Some(requests),
		..Default::default()
	    }),
	    ..Default::default()
	}),
	..Default::default()
    }
}

pub fn restore_job(namespace: &str, store: &ObjectStore, volume: &VolumeRestore) -> api::Restore {
    let snapshot = volume.snapshot_id.clone()
	.filter(|id| !id.is_empty())
	.unwrap_or_else(|| String::from(LATEST_SNAPSHOT));
    let secret = store.credentials_secret.as_str();

    let spec = api::k8up::RestoreSpec{
	snapshot,
	restore_method: api::k8up::RestoreMethod{
	    folder: api::k8up::FolderRestore{ claim_name: volume.pvc_name.clone() },
	},
	backend: api::k8up::Backend{
	    repo_password_secret_ref: SecretKeyRef::new(secret, RESTIC_PASSWORD_KEY),
	    s3: api::k8up::S3Backend{
		endpoint: store.endpoint_url(),
		bucket: store.bucket.clone(),
		access_key_id_secret_ref: SecretKeyRef::new(secret, ACCESS_KEY_ID_KEY),
		secret_access_key_secret_ref: SecretKeyRef::new(secret, SECRET_ACCESS_KEY_KEY),
	    },
	},
	pod_security_context: Some(api::k8up::PodSecurityContext{ run_as_user: 0 }),
    };

    let mut restore = api::Restore::new(&format!("{}-restore", volume.pvc_name), spec);
    restore.metadata.namespace = Some(namespace.to_string());
    restore
}

pub fn database_cluster(request: &RestoreRequest, database: &api::descriptor::DatabaseRestore) -> api::PostgresCluster {
    let store = &request.store;
    let bucket = database.bucket.clone().unwrap_or_else(|| store.bucket.clone());
    let destination = match database.path.as_deref().map(|p| p.trim_matches('/')) {
	Some(path) if !path.is_empty() => format!("s3://{}/{}", bucket, path),
	_ => format!("s3://{}", bucket),
    };
    let secret = store.credentials_secret.as_str();

    let spec = api::PostgresClusterSpec{
	instances: database.instances,
	storage: api::cnpg::StorageConfiguration{ size: database.storage_size.clone() },
	bootstrap: api::cnpg::Bootstrap{
	    recovery: api::cnpg::RecoverySource{ source: String::from(BACKUP_SOURCE) },
	},
	external_clusters: vec![api::cnpg::ExternalCluster{
	    name: String::from(BACKUP_SOURCE),
	    barman_object_store: api::cnpg::BarmanObjectStore{
		destination_path: destination,
		endpoint_url: store.endpoint_url(),
		server_name: Some(database.server_name.clone().unwrap_or_else(|| database.cluster_name.clone())),
		s3_credentials: api::cnpg::S3Credentials{
		    access_key_id: SecretKeyRef::new(secret, ACCESS_KEY_ID_KEY),
		    secret_access_key: SecretKeyRef::new(secret, SECRET_ACCESS_KEY_KEY),
		},
		wal: Some(api::cnpg::WalBackup{ max_parallel: 8 }),
	    },
	}],
    };

    let mut cluster = api::PostgresCluster::new(&database.cluster_name, spec);
    cluster.metadata.namespace = Some(request.namespace.clone());
    cluster.metadata.labels = Some(ownership_labels(&request.app));
    cluster
}

/*
 * Recreates an application's volumes and database out of its backups.
 * Volumes always come first: the database bootstrap reads from the same
 * bucket and expects the volumes to be adopted already.
 */
pub struct RestorePipeline<'a> {
    cluster: &'a dyn Cluster,
    poll: PollConfig,
}

impl<'a> RestorePipeline<'a> {

    pub fn new(cluster: &'a dyn Cluster, poll: PollConfig) -> Self {
	Self{ cluster, poll }
    }

    async fn wait_for_restore(&self, namespace: &str, name: &str) -> Result<()> {
	let probe = || async move {
	    match self.cluster.restore_status(namespace, name).await? {
		None => Ok(false),
		Some(status) => match status.failure() {
		    Some(reason) => Err(Error::RestoreFailed(format!("{}/{}: {}", namespace, name, reason))),
		    None => Ok(status.is_finished()),
		},
	    }
	};

	poll::until_ready(&format!("restore {}/{}", namespace, name), &self.poll, probe).await
    }

    pub async fn run(&self, request: &RestoreRequest) -> Result<()> {
	let namespace = request.namespace.as_str();
	log::info!("Restoring {} ({} volume(s), database: {})", request.app, request.volumes.len(), request.database.is_some());

	// restore jobs can't reach the bucket without their credentials
	let (credentials, templated): (Vec<_>, Vec<_>) = request.templated_secrets.iter()
	    .partition(|es| es.spec.target.name == request.store.credentials_secret);
	for secret in credentials {
	    self.cluster.apply_external_secret(namespace, secret).await?;
	}

	for volume in &request.volumes {
	    log::info!("Recreating PVC {}/{} ({})", namespace, volume.pvc_name, volume.capacity);
	    self.cluster.apply_pvc(namespace, &pvc(namespace, volume)).await?;
	    self.cluster.label_pvc(namespace, &volume.pvc_name, &ownership_labels(&request.app)).await?;
	}

	for volume in &request.volumes {
	    let job = restore_job(namespace, &request.store, volume);
	    let name = job.metadata.name.clone().unwrap_or_default();
	    log::info!("Restoring {}/{} from snapshot {}", namespace, volume.pvc_name, job.spec.snapshot);

	    self.cluster.apply_restore(namespace, &job).await?;
	    self.wait_for_restore(namespace, &name).await?;
	}

	if let Some(database) = &request.database {
	    log::info!("Recovering database cluster {}/{}", namespace, database.cluster_name);
	    let cluster = database_cluster(request, database);
	    self.cluster.apply_database_cluster(namespace, &cluster).await?;
	}

	for secret in templated {
	    self.cluster.apply_external_secret(namespace, secret).await?;
	}

	log::info!("Restore of {} done", request.app);
	Ok(())
    }
}
