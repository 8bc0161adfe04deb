use appseed::cluster::KubeCluster;
use appseed::config::Config;
use appseed::controller::ArgoApplications;
use appseed::driver::Driver;
use appseed::machine::InstallStateMachine;
use appseed::vault::{BitwardenCli, DisambiguationPolicy, HeadlessPolicy, PromptPolicy, SecretStore};
use appseed::{Error, Result};
use appseed_api::DuplicateStrategy;

use clap::Parser;
use kube::Client as KubeClient;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "appseed", about = "Install applications and reconcile their credentials", version)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "appseed.toml")]
    config: PathBuf,

    /// Only handle this application (repeatable)
    #[arg(long = "app")]
    apps: Vec<String>,

    /// Never prompt, ambiguous vault items become errors
    #[arg(long)]
    non_interactive: bool,

    /// What to do with existing vault items: edit, ask, duplicate, no_action
    #[arg(long)]
    strategy: Option<DuplicateStrategy>,
}

async fn run(args: Args) -> Result<bool> {
    let config = Config::load(&args.config)?;
    let apps = config.selected_apps(&args.apps);
    let strategy = args.strategy.unwrap_or(config.vault.strategy);
    log::info!("starting appseed for {} application(s)", apps.len());

    let kube_client = KubeClient::try_default().await?;
    let cluster = KubeCluster::new(kube_client.clone());
    let controller = ArgoApplications::new(kube_client, config.argocd.clone(), config.poll.clone());
    let machine = InstallStateMachine::new(&cluster, &controller, &config.argocd, config.poll.clone());
    let driver = Driver::new(machine);

    let report = match config.vault.enabled {
	false => driver.run(&apps, None).await?,
	true => {
	    let client = BitwardenCli::locate(&config.vault.binary).await?;
	    let policy: Box<dyn DisambiguationPolicy> = match args.non_interactive || !config.vault.interactive {
		true => Box::new(HeadlessPolicy::new(strategy)),
		false => Box::new(PromptPolicy),
	    };

	    let store = SecretStore::new(Box::new(client), policy);
	    let session = store.unlock(std::env::var("BW_SESSION").ok(), strategy).await?;
	    driver.run(&apps, Some((&store, session))).await?
	},
    };

    for (name, err) in &report.failures {
	log::error!("{}: {}", name, err);
    }
    Ok(report.is_success())
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    match run(args).await {
	Ok(true) => {},
	Ok(false) => std::process::exit(1),
	Err(Error::ToolMissing(binary)) => {
	    log::error!("`{}` is required when the vault is enabled, install it or set vault.binary", binary);
	    std::process::exit(1);
	},
	Err(err) => {
	    log::error!("{}", err);
	    std::process::exit(1);
	},
    }
}
