/*
 * The two mutually exclusive places application credentials can go: the
 * vault (through SecretStore) or plain Kubernetes secrets.
 */
use crate::cluster::Cluster;
use crate::errors::Result;
use crate::vault::{self, Login, SecretStore, Session};
use appseed_api as api;
use api::CustomField;
use api::external_secrets::{ExternalSecretData, ExternalSecretTarget, RemoteRef, SourceRef, StoreRef};

use rand::Rng;
use rand::distributions::{Alphanumeric, DistString};
use std::collections::BTreeMap;

const PASSWORD_LENGTH: usize = 32;
const SPECIAL_CHARACTERS: &[u8] = b"!#$%&()*+,-.:;<=>?@[]^_{|}~";

pub fn credential_name(app: &str, purpose: &str) -> String {
    format!("{}-{}-credentials", app, purpose)
}

/* random password for the native path, where no vault generator exists */
pub fn generate_password(special_characters: bool) -> String {
    let mut rng = rand::thread_rng();
    if !special_characters {
	return Alphanumeric.sample_string(&mut rng, PASSWORD_LENGTH);
    }

    let mut charset: Vec<u8> = (b'a'..=b'z').chain(b'A'..=b'Z').chain(b'0'..=b'9').collect();
    charset.extend_from_slice(SPECIAL_CHARACTERS);
    (0..PASSWORD_LENGTH)
	.map(|_| charset[rng.gen_range(0..charset.len())] as char)
	.collect()
}

pub enum Secrets<'a> {
    Vault { store: &'a SecretStore, session: &'a mut Session },
    Native,
}

impl Secrets<'_> {

    pub fn is_vault(&self) -> bool {
	matches!(self, Secrets::Vault{ .. })
    }

    pub async fn generate(&self, special_characters: bool) -> Result<String> {
	match self {
	    Secrets::Vault{ store, session } => store.generate(session, special_characters).await,
	    Secrets::Native => Ok(generate_password(special_characters)),
	}
    }

    /* spec.fields plus a generated value for every name in spec.generate */
    async fn fields(&self, spec: &api::SecretSpec) -> Result<Vec<CustomField>> {
	let mut fields: Vec<CustomField> = spec.fields.iter()
	    .map(|(name, value)| CustomField::new(name, value))
	    .collect();

	for name in &spec.generate {
	    if spec.fields.contains_key(name) {
		continue;
	    }
	    let value = self.generate(spec.special_characters).await?;
	    fields.push(CustomField::new(name, &value));
	}
	Ok(fields)
    }

    /*
     * Store a new credential and return its identifier: the vault item id,
     * or the Kubernetes secret name on the native path.
     */
    pub async fn create(&mut self, cluster: &dyn Cluster, app: &api::AppDescriptor, spec: &api::SecretSpec) -> Result<String> {
	let name = credential_name(&app.name, &spec.purpose);
	let password = match &spec.password {
	    Some(password) if !password.is_empty() => password.clone(),
	    _ => self.generate(spec.special_characters).await?,
	};
	let fields = self.fields(spec).await?;

	match self {
	    Secrets::Vault{ store, session } => {
		let login = Login{
		    name,
		    item_url: app.hostname().map(String::from),
		    user: spec.username.clone(),
		    password,
		    fields,
		    ..Default::default()
		};
		store.create_login(session, &login, None).await
	    },
	    Secrets::Native => {
		let mut data = BTreeMap::new();
		data.insert(String::from("username"), spec.username.clone());
		data.insert(String::from("password"), password);
		for field in fields {
		    data.insert(field.name, field.value);
		}

		log::info!("Creating secret {}/{}", app.namespace, name);
		cluster.apply_secret(&app.namespace, &name, &data).await?;
		Ok(name)
	    },
	}
    }

    /* identifier of an already stored credential, never writes anything */
    pub async fn existing(&mut self, cluster: &dyn Cluster, app: &api::AppDescriptor, spec: &api::SecretSpec) -> Result<Option<String>> {
	let name = credential_name(&app.name, &spec.purpose);

	match self {
	    Secrets::Vault{ store, session } => {
		let display = vault::display_name(&name, app.hostname());
		let resolution = store.get_item(session, &display).await?;
		session.remember(&resolution);
		Ok(resolution.record.map(|r| r.id))
	    },
	    Secrets::Native => {
		let found = cluster.secret_data(&app.namespace, &name).await?;
		Ok(found.map(|_| name))
	    },
	}
    }
}

/*
 * ExternalSecret materialising a vault item as "{app}-{purpose}-credentials"
 * in the app namespace.
 */
pub fn external_secret(app: &api::AppDescriptor, spec: &api::SecretSpec, item_id: &str) -> api::ExternalSecret {
    let name = credential_name(&app.name, &spec.purpose);
    let entry = |secret_key: &str, store: Option<&str>, property: &str| ExternalSecretData{
	secret_key: secret_key.to_string(),
	source_ref: store.map(|s| SourceRef{ store_ref: StoreRef::cluster(s) }),
	remote_ref: RemoteRef{ key: item_id.to_string(), property: property.to_string() },
    };

    let mut data = vec![
	entry("username", None, "username"),
	entry("password", None, "password"),
    ];
    let mut field_names: Vec<&String> = spec.fields.keys().chain(spec.generate.iter()).collect();
    field_names.sort();
    field_names.dedup();
    for field in field_names {
	data.push(entry(field.as_str(), Some(api::external_secrets::FIELDS_STORE), field.as_str()));
    }

    let mut secret = api::ExternalSecret::new(&name, api::external_secrets::ExternalSecretSpec{
	target: ExternalSecretTarget{ name: name.clone(), deletion_policy: Some(String::from("Delete")) },
	secret_store_ref: StoreRef::cluster(api::external_secrets::LOGIN_STORE),
	data,
    });
    secret.metadata.namespace = Some(app.namespace.clone());
    secret
}
