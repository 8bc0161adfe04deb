use crate::cluster::Cluster;
use crate::errors::Result;

use std::collections::BTreeMap;

/*
 * The single secret the ApplicationSet generator reads its variables from.
 * Many applications write into it, so every update is read-merge-write and
 * nothing is ever removed.
 */
pub struct AppSetSecretBridge<'a> {
    cluster: &'a dyn Cluster,
    namespace: String,
    name: String,
}

/* bridge keys are flat, lower case and use `_` as the only separator */
pub fn key(parts: &[&str]) -> String {
    parts.join("_").replace('-', "_")
}

impl<'a> AppSetSecretBridge<'a> {

    pub fn new(cluster: &'a dyn Cluster, namespace: &str, name: &str) -> Self {
	Self{
	    cluster,
	    namespace: namespace.to_string(),
	    name: name.to_string(),
	}
    }

    pub async fn values(&self) -> Result<BTreeMap<String, String>> {
	let data = self.cluster.secret_data(&self.namespace, &self.name).await?;
	Ok(data.unwrap_or_default())
    }

    /*
     * Merge `partial` into the shared secret: keys in `partial` win, every
     * other key is kept as is.
     */
    pub async fn update(&self, partial: &BTreeMap<String, String>) -> Result<()> {
	if partial.is_empty() {
	    return Ok(());
	}

	let mut merged = self.values().await?;
	let mut changed = false;
	for (key, value) in partial {
	    if merged.get(key) != Some(value) {
		changed = true;
		merged.insert(key.clone(), value.clone());
	    }
	}

	if !changed {
	    log::debug!("{}/{} already up to date", self.namespace, self.name);
	    return Ok(());
	}

	log::info!("Updating {}/{} with {:?}", self.namespace, self.name, partial.keys().collect::<Vec<_>>());
	self.cluster.apply_secret(&self.namespace, &self.name, &merged).await
    }
}
