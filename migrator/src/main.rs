use avail_migration_core::{
	migration::{self, MigrationConfig},
	network::rpc,
	types::Identity,
	utils::{default_subscriber, install_panic_hooks, json_subscriber, user_signal},
};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use config::RuntimeConfig;
use tracing::{info, span, warn, Level};

mod config;

#[tokio::main]
pub async fn main() -> Result<()> {
	let opts = config::CliOpts::parse();
	let config = config::load(&opts)?;

	if config.log_format_json {
		tracing::subscriber::set_global_default(json_subscriber(config.log_level))?;
	} else {
		tracing::subscriber::set_global_default(default_subscriber(config.log_level))?;
	}

	install_panic_hooks()?;

	let span = span!(Level::INFO, "run", dry = config.dry);
	let _enter = config.log_format_json.then(|| span.enter());

	let identity = Identity::from_suri(&config.suri, opts.password.clone())?;

	tokio::select! {
		result = run(config, identity) => result,
		_ = user_signal() => {
			warn!("User signaled shutdown, pending transactions are not tracked");
			Err(eyre!("Migration interrupted"))
		},
	}
}

async fn run(config: RuntimeConfig, identity: Identity) -> Result<()> {
	let version = clap::crate_version!();
	info!("Running Avail Migration v{version}");
	info!(
		db_path = %config.db_path,
		full_node_ws = %config.rpc.full_node_ws,
		dry = config.dry,
		ensure_complete = config.ensure_complete,
		trickle = config.trickle,
		"Using configuration"
	);

	let client = rpc::Client::connect(&config.rpc).await?;

	let report = migration::run(
		&client,
		MigrationConfig::from(&config),
		identity,
		&config.db_path,
	)
	.await?;

	info!(
		blocks = report.blocks,
		signed = report.signed,
		unsigned = report.unsigned,
		ignored = report.ignored,
		skipped = report.skipped,
		finalized = report.finalized,
		failed = report.failed,
		pending = report.pending,
		"Migration finished"
	);
	info!("Report: {}", serde_json::to_string(&report)?);

	if report.failed > 0 || report.pending > 0 {
		warn!(
			failed = report.failed,
			pending = report.pending,
			"Some transactions were not finalized"
		);
	}
	Ok(())
}
