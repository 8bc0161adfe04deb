use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/*
 * Application descriptors are read from the configuration file and are
 * never mutated by the engine.
 *
 * for example:
 *
 *   [[apps]]
 *   name = "nextcloud"
 *   namespace = "nextcloud"
 *   secret_keys = { hostname = "cloud.example.com" }
 *
 *   [apps.source]
 *   repo = "https://github.com/example/argocd-apps"
 *   path = "nextcloud/"
 *   revision = "main"
 *
 *   [apps.init]
 *   enabled = true
 *
 *   [[apps.init.secrets]]
 *   purpose = "admin"
 *   username = "admin"
 */
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub name: String,

    pub namespace: String,

    pub source: AppSource,

    #[serde(default)]
    pub init: InitConfig,

    // template values the appset generator needs (hostname, ...)
    #[serde(default)]
    pub secret_keys: BTreeMap<String, String>,

    #[serde(default)]
    pub backups: Option<BackupConfig>,
}

impl AppDescriptor {

    /* restore only ever happens as part of an init run */
    pub fn restore_requested(&self) -> bool {
	self.init.enabled && self.init.restore.enabled
    }

    pub fn hostname(&self) -> Option<&str> {
	self.secret_keys.get("hostname").map(|h| h.as_str())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppSource {
    pub repo: String,

    pub path: String,

    #[serde(default = "default_revision")]
    pub revision: String,
}

fn default_revision() -> String {
    String::from("HEAD")
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InitConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub values: BTreeMap<String, String>,

    #[serde(default)]
    pub restore: RestoreConfig,

    #[serde(default)]
    pub secrets: Vec<SecretSpec>,

    #[serde(default)]
    pub oidc: Option<OidcSpec>,
}

/*
 * Shape of one credential an application needs. Anything left empty is
 * generated.
 */
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretSpec {
    // admin, smtp, s3, ... ends up in "{app}-{purpose}-credentials"
    pub purpose: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub special_characters: bool,

    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    // custom fields whose value should be generated
    #[serde(default)]
    pub generate: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub key: String,
    pub display_name: String,
    pub group: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OidcSpec {
    pub redirect_uris: Vec<String>,

    #[serde(default)]
    pub logout_uris: Vec<String>,

    #[serde(default)]
    pub roles: Vec<RoleSpec>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BackupConfig {
    pub endpoint: String,

    pub bucket: String,

    #[serde(default)]
    pub region: Option<String>,

    // capacity of the primary data volume when it is recreated
    #[serde(default = "default_capacity")]
    pub pvc_capacity: String,
}

fn default_capacity() -> String {
    String::from("10Gi")
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RestoreConfig {
    #[serde(default)]
    pub enabled: bool,

    // logical volume -> restic snapshot id
    #[serde(default)]
    pub snapshot_ids: BTreeMap<String, String>,

    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeSpec>,

    #[serde(default)]
    pub database: Option<DatabaseRestore>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeRole {
    #[default]
    Primary,
    Metadata,
    Filer,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VolumeSpec {
    #[serde(default)]
    pub pvc: Option<String>,

    #[serde(default)]
    pub role: VolumeRole,

    #[serde(default)]
    pub capacity: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatabaseRestore {
    pub cluster_name: String,

    #[serde(default = "default_instances")]
    pub instances: u32,

    #[serde(default = "default_db_size")]
    pub storage_size: String,

    // defaults to the backup bucket
    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    // cluster name that wrote the backup, when it differs from cluster_name
    #[serde(default)]
    pub server_name: Option<String>,
}

fn default_instances() -> u32 {
    1
}

fn default_db_size() -> String {
    String::from("10Gi")
}
