/*
 * Credential reconciliation on top of a password vault.
 *
 * SecretStore owns no mutable state: everything that changes during a run
 * (the session token, whether we own it, the remembered duplicate
 * strategy) lives in the Session value callers pass in.
 */
pub mod bitwarden;
pub mod resolver;

pub use bitwarden::BitwardenCli;
pub use resolver::{Action, Choice, DisambiguationPolicy, HeadlessPolicy, PromptPolicy};

use crate::errors::{Error, Result};
use appseed_api as api;
use api::{CredentialRecord, CustomField, DuplicateStrategy, VaultStatus};

use async_trait::async_trait;

/* Result of a lookup by name on the vault boundary */
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    NotFound,
    Single(CredentialRecord),
    Multiple(Vec<String>),
}

/* Releases a session synchronously, used when lock() is never reached */
pub type Release = Box<dyn FnOnce() + Send>;

/*
 * Low level vault operations. One implementation shells out to the
 * Bitwarden CLI, tests use an in-memory one.
 */
#[async_trait]
pub trait VaultClient: Send + Sync {
    async fn status(&self) -> Result<VaultStatus>;

    async fn login(&self) -> Result<()>;

    /* unlocks the vault and returns a fresh session token */
    async fn unlock(&self) -> Result<String>;

    async fn lock(&self, token: &str) -> Result<()>;

    fn release(&self, _token: &str) -> Option<Release> {
	None
    }

    async fn generate(&self, token: &str, special_characters: bool) -> Result<String>;

    async fn find(&self, token: &str, name: &str) -> Result<Lookup>;

    async fn get(&self, token: &str, id: &str) -> Result<CredentialRecord>;

    async fn create(&self, token: &str, record: &CredentialRecord) -> Result<CredentialRecord>;

    async fn edit(&self, token: &str, id: &str, record: &CredentialRecord) -> Result<CredentialRecord>;
}

/*
 * Session context threaded through every vault operation of a run.
 */
pub struct Session {
    token: String,

    // false when the token came from the environment: someone else owns it
    lock_on_close: bool,

    // default duplicate strategy, updated by "always do this" answers
    pub strategy: DuplicateStrategy,

    release: Option<Release>,
}

impl Session {

    pub fn new(token: &str, lock_on_close: bool, strategy: DuplicateStrategy) -> Self {
	Self{
	    token: token.to_string(),
	    lock_on_close,
	    strategy,
	    release: None,
	}
    }

    pub fn token(&self) -> &str {
	&self.token
    }

    pub fn lock_on_close(&self) -> bool {
	self.lock_on_close
    }

    /* apply the "always do this" part of a lookup */
    pub fn remember(&mut self, resolution: &Resolution) {
	if resolution.remember {
	    log::info!("Using '{}' for existing vault items from now on", resolution.strategy);
	    self.strategy = resolution.strategy;
	}
    }
}

impl Drop for Session {
    fn drop(&mut self) {
	if let Some(release) = self.release.take() {
	    log::warn!("vault session was not locked explicitly, locking it now");
	    release();
	}
    }
}

/* What get_item found and which strategy applies to it */
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: Option<CredentialRecord>,

    pub strategy: DuplicateStrategy,

    // the strategy came with an "always do this"
    pub remember: bool,

    // the strategy was picked while choosing between several records
    pub disambiguated: bool,
}

/* A login create_login should make sure exists */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Login {
    pub name: String,
    pub item_url: Option<String>,
    pub user: String,
    pub password: String,
    pub fields: Vec<CustomField>,
    pub org: Option<String>,
    pub collection: Option<String>,
}

/*
 * Vault items are called "<name> <url>" when both are known, which is how
 * apps sharing a name prefix are told apart.
 */
pub fn display_name(name: &str, item_url: Option<&str>) -> String {
    match item_url {
	Some(url) if !name.is_empty() && !url.is_empty() => format!("{} {}", name, url),
	_ => name.to_string(),
    }
}

pub struct SecretStore {
    client: Box<dyn VaultClient>,
    policy: Box<dyn DisambiguationPolicy>,
}

impl SecretStore {

    pub fn new(client: Box<dyn VaultClient>, policy: Box<dyn DisambiguationPolicy>) -> Self {
	Self{ client, policy }
    }

    pub async fn status(&self) -> Result<VaultStatus> {
	self.client.status().await
    }

    /*
     * Reuse a session handed to us through the environment, otherwise log
     * in/unlock and own the resulting session.
     */
    pub async fn unlock(&self, existing: Option<String>, strategy: DuplicateStrategy) -> Result<Session> {
	if let Some(token) = existing.filter(|t| !t.is_empty()) {
	    log::info!("Reusing the vault session from the environment");
	    return Ok(Session::new(&token, false, strategy));
	}

	if self.client.status().await? == VaultStatus::Unauthenticated {
	    log::info!("Logging in to the vault ...");
	    self.client.login().await?;
	}

	log::info!("Unlocking the vault ...");
	let token = self.client.unlock().await?;
	let mut session = Session::new(&token, true, strategy);
	session.release = self.client.release(&token);

	Ok(session)
    }

    /* only locks sessions this run opened */
    pub async fn lock(&self, mut session: Session) -> Result<()> {
	if !session.lock_on_close {
	    log::debug!("Leaving the vault session open, it is not ours");
	    return Ok(());
	}

	self.client.lock(&session.token).await?;
	session.release = None;
	log::info!("Vault locked");
	Ok(())
    }

    pub async fn generate(&self, session: &Session, special_characters: bool) -> Result<String> {
	self.client.generate(&session.token, special_characters).await
    }

    /*
     * Look a credential up by name. Several matches always go through the
     * disambiguation policy, whatever default the session remembers: the
     * remembered strategy only ever answers for a single match.
     */
    pub async fn get_item(&self, session: &Session, name: &str) -> Result<Resolution> {
	let found = self.client.find(&session.token, name).await?;

	let resolution = match found {
	    Lookup::NotFound => {
		log::debug!("No vault item named '{}'", name);
		Resolution{ record: None, strategy: session.strategy, remember: false, disambiguated: false }
	    },
	    Lookup::Single(record) => {
		log::debug!("Found vault item '{}' ({})", name, record.id);
		Resolution{ record: Some(record), strategy: session.strategy, remember: false, disambiguated: false }
	    },
	    Lookup::Multiple(ids) => {
		log::warn!("{} vault items are named '{}'", ids.len(), name);

		let mut candidates = Vec::with_capacity(ids.len());
		for id in &ids {
		    candidates.push(self.client.get(&session.token, id).await?);
		}

		let choice = self.policy.disambiguate(name, &candidates)?;
		let record = candidates.into_iter().nth(choice.selected)
		    .ok_or_else(|| Error::Other(format!("invalid choice {} for '{}'", choice.selected, name)))?;

		Resolution{ record: Some(record), strategy: choice.strategy, remember: choice.always, disambiguated: true }
	    },
	};

	Ok(resolution)
    }

    /*
     * Make sure a login exists and return the id of the vault item holding
     * it. An explicit strategy wins over the session default.
     */
    pub async fn create_login(&self, session: &mut Session, login: &Login, strategy: Option<DuplicateStrategy>) -> Result<String> {
	let name = display_name(&login.name, login.item_url.as_deref());
	let resolution = self.get_item(session, &name).await?;
	session.remember(&resolution);

	let strategy = match (resolution.disambiguated, strategy) {
	    (true, _) => resolution.strategy,
	    (false, Some(explicit)) => explicit,
	    (false, None) => resolution.strategy,
	};

	let mut action = resolver::decide(resolution.record.as_ref(), strategy);
	if action == Action::Ask {
	    let existing: Vec<CredentialRecord> = resolution.record.iter().cloned().collect();
	    let choice = self.policy.disambiguate(&name, &existing)?;
	    if choice.always {
		log::info!("Using '{}' for existing vault items from now on", choice.strategy);
		session.strategy = choice.strategy;
	    }
	    action = resolver::decide(resolution.record.as_ref(), choice.strategy);
	}

	match action {
	    Action::Create | Action::Duplicate => {
		if action == Action::Duplicate {
		    log::warn!("Creating a second vault item named '{}'", name);
		}
		let created = self.client.create(&session.token, &new_record(&name, login)).await?;
		log::info!("Created vault item '{}' ({})", name, created.id);
		Ok(created.id)
	    },
	    Action::Edit(id) => {
		let Some(mut record) = resolution.record else {
		    return Err(Error::Other(format!("nothing to edit for '{}'", name)));
		};
		record.user = login.user.clone();
		record.password = login.password.clone();
		record.custom_fields = login.fields.clone();

		let edited = self.client.edit(&session.token, &id, &record).await?;
		log::info!("Updated vault item '{}' ({})", name, edited.id);
		Ok(edited.id)
	    },
	    Action::Skip(id) => {
		log::info!("Vault item '{}' already exists ({}), leaving it alone", name, id);
		Ok(id)
	    },
	    Action::Ask => Err(Error::Other(format!("no strategy decided for '{}'", name))),
	}
    }
}

fn new_record(name: &str, login: &Login) -> CredentialRecord {
    CredentialRecord{
	id: String::new(),
	name: name.to_string(),
	item_url: login.item_url.clone(),
	user: login.user.clone(),
	password: login.password.clone(),
	custom_fields: login.fields.clone(),
	org: login.org.clone(),
	collection: login.collection.clone(),
    }
}
