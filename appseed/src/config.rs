use crate::errors::Result;
use appseed_api as api;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/*
 * appseed configuration. Read from a TOML file, every key can be overridden
 * from the environment, e.g. APPSEED_VAULT__STRATEGY=edit.
 */
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vault: VaultConfig,

    #[serde(default)]
    pub argocd: ArgoConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub apps: Vec<api::AppDescriptor>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_vault_binary")]
    pub binary: String,

    #[serde(default)]
    pub strategy: api::DuplicateStrategy,

    #[serde(default = "default_true")]
    pub interactive: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
	Self{
	    enabled: false,
	    binary: default_vault_binary(),
	    strategy: api::DuplicateStrategy::default(),
	    interactive: true,
	}
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ArgoConfig {
    #[serde(default = "default_argo_namespace")]
    pub namespace: String,

    #[serde(default = "default_project")]
    pub project: String,

    #[serde(default = "default_server")]
    pub server: String,

    // the secret the ApplicationSet generator reads its variables from
    #[serde(default = "default_appset_secret")]
    pub appset_secret: String,
}

impl Default for ArgoConfig {
    fn default() -> Self {
	Self{
	    namespace: default_argo_namespace(),
	    project: default_project(),
	    server: default_server(),
	    appset_secret: default_appset_secret(),
	}
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_attempts")]
    pub attempts: usize,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
	Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
	Self{
	    interval_secs: default_interval(),
	    attempts: default_attempts(),
	}
    }
}

fn default_true() -> bool { true }
fn default_vault_binary() -> String { String::from("bw") }
fn default_argo_namespace() -> String { String::from("argocd") }
fn default_project() -> String { String::from("default") }
fn default_server() -> String { String::from("https://kubernetes.default.svc") }
fn default_appset_secret() -> String { String::from("appset-secret-vars") }
fn default_interval() -> u64 { 10 }
fn default_attempts() -> usize { 60 }

impl Config {

    pub fn load(path: &Path) -> Result<Self> {
	let figment = Figment::new()
	    .merge(Toml::file(path))
	    .merge(Env::prefixed("APPSEED_").split("__"));

	Self::extract(figment)
    }

    pub fn extract(figment: Figment) -> Result<Self> {
	let config: Config = figment.extract()?;
	Ok(config)
    }

    /* apps to process, in configuration order, optionally narrowed by name */
    pub fn selected_apps(&self, only: &[String]) -> Vec<api::AppDescriptor> {
	self.apps.iter()
	    .filter(|app| only.is_empty() || only.contains(&app.name))
	    .cloned()
	    .collect()
    }
}
