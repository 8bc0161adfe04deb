use crate::errors::{Error, Result};
use crate::machine::{AppHooks, DescriptorHooks, InstallStateMachine, Outcome};
use crate::secrets::Secrets;
use crate::vault::{SecretStore, Session};
use appseed_api as api;

use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct Report {
    pub outcomes: Vec<(String, Outcome)>,
    pub failures: Vec<(String, Error)>,
}

impl Report {
    pub fn is_success(&self) -> bool {
	self.failures.is_empty()
    }
}

/*
 * Runs the state machine over a list of applications, one at a time. A
 * failing application is recorded and the next one is started anyway.
 */
pub struct Driver<'a> {
    machine: InstallStateMachine<'a>,
    hooks: BTreeMap<String, Box<dyn AppHooks>>,
}

impl<'a> Driver<'a> {

    pub fn new(machine: InstallStateMachine<'a>) -> Self {
	Self{
	    machine,
	    hooks: BTreeMap::new(),
	}
    }

    pub fn with_hooks(mut self, app: &str, hooks: Box<dyn AppHooks>) -> Self {
	self.hooks.insert(app.to_string(), hooks);
	self
    }

    async fn run_all(&self, apps: &[api::AppDescriptor], secrets: &mut Secrets<'_>, report: &mut Report) {
	for app in apps {
	    let hooks: &dyn AppHooks = match self.hooks.get(&app.name) {
		Some(hooks) => hooks.as_ref(),
		None => &DescriptorHooks,
	    };

	    match self.machine.run(app, hooks, secrets).await {
		Ok(outcome) => report.outcomes.push((app.name.clone(), outcome)),
		Err(err) => {
		    log::error!("{} failed: {}", app.name, err);
		    report.failures.push((app.name.clone(), err));
		},
	    }
	}
    }

    /*
     * With a vault, `session` is locked once every application went
     * through, failures included. Without one, credentials go to native
     * secrets.
     */
    pub async fn run(&self, apps: &[api::AppDescriptor], vault: Option<(&SecretStore, Session)>) -> Result<Report> {
	let mut report = Report::default();

	match vault {
	    Some((store, mut session)) => {
		let mut secrets = Secrets::Vault{ store, session: &mut session };
		self.run_all(apps, &mut secrets, &mut report).await;
		store.lock(session).await?;
	    },
	    None => self.run_all(apps, &mut Secrets::Native, &mut report).await,
	}

	log::info!("{} application(s) done, {} failed", report.outcomes.len(), report.failures.len());
	Ok(report)
    }
}
