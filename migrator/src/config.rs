use std::{fs, time::Duration};

use avail_migration_core::{
	migration::MigrationConfig,
	network::rpc::configuration::RPCConfig,
	types::{duration_seconds_format, tracing_level_format},
};
use clap::{command, Parser};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::Level;

#[derive(Parser)]
#[command(version)]
pub struct CliOpts {
	/// Sets path to the toml configuration file.
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<String>,
	/// Sets verbosity level.
	#[arg(long)]
	pub verbosity: Option<Level>,
	/// Sets logs format to JSON.
	#[arg(long)]
	pub logs_json: bool,
	/// Path to the transaction log to replay.
	#[arg(long, value_name = "FILE")]
	pub db_path: Option<String>,
	/// WebSocket endpoint of the target chain.
	#[arg(long)]
	pub full_node_ws: Option<String>,
	/// Secret URI of the sudo key holder.
	#[arg(long)]
	pub suri: Option<String>,
	/// Password of the secret URI.
	#[arg(long)]
	pub password: Option<String>,
	/// Builds every call, submits nothing.
	#[arg(long)]
	pub dry: bool,
	/// Requires the transaction log to contain every block from 1.
	#[arg(long)]
	pub ensure_complete: bool,
	/// Waits one block time after every block with submissions.
	#[arg(long)]
	pub trickle: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
	/// Log level.
	#[serde(with = "tracing_level_format")]
	pub log_level: Level,
	/// Log format: JSON for `true`, plain text for `false`.
	pub log_format_json: bool,
	/// Transaction log file path, one block per line.
	pub db_path: String,
	#[serde(flatten)]
	pub rpc: RPCConfig,
	/// Secret URI of the sudo key holder (default: //Alice).
	pub suri: String,
	/// Dry run, nothing is submitted. (default: false)
	pub dry: bool,
	/// Fail on gaps or duplicates in block numbers. (default: false)
	pub ensure_complete: bool,
	/// Pause for one block time after each block with submissions. (default: false)
	pub trickle: bool,
	/// Target chain block time in seconds. (default: 20)
	#[serde(with = "duration_seconds_format")]
	pub block_time: Duration,
	/// Methods which are not replayed, in `section.method` form.
	pub ignore: Vec<String>,
	/// Unsigned method which is replayed as is. (default: claims.claim)
	pub unsigned_method: String,
	/// Seconds to wait for submissions to finalize after the last block. (default: 600)
	#[serde(with = "duration_seconds_format")]
	pub finalization_timeout: Duration,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			log_level: Level::INFO,
			log_format_json: false,
			db_path: "transactions.jsonl".to_string(),
			rpc: Default::default(),
			suri: "//Alice".to_string(),
			dry: false,
			ensure_complete: false,
			trickle: false,
			block_time: Duration::from_secs(20),
			ignore: [
				"timestamp.set",
				"parachainSystem.setValidationData",
				"authorship.setUncles",
				"finalityTracker.finalHint",
				"imOnline.heartbeat",
			]
			.map(String::from)
			.to_vec(),
			unsigned_method: "claims.claim".to_string(),
			finalization_timeout: Duration::from_secs(600),
		}
	}
}

impl From<&RuntimeConfig> for MigrationConfig {
	fn from(config: &RuntimeConfig) -> Self {
		MigrationConfig {
			dry: config.dry,
			ensure_complete: config.ensure_complete,
			trickle: config.trickle,
			block_time: config.block_time,
			ignore: config.ignore.clone(),
			unsigned_method: config.unsigned_method.clone(),
			finalization_timeout: config.finalization_timeout,
		}
	}
}

pub fn load(opts: &CliOpts) -> Result<RuntimeConfig> {
	let mut config = match &opts.config {
		Some(path) => {
			fs::metadata(path)?;
			confy::load_path(path)?
		},
		None => RuntimeConfig::default(),
	};

	config.log_level = opts.verbosity.unwrap_or(config.log_level);
	config.log_format_json = opts.logs_json || config.log_format_json;
	config.dry = opts.dry || config.dry;
	config.ensure_complete = opts.ensure_complete || config.ensure_complete;
	config.trickle = opts.trickle || config.trickle;

	if let Some(db_path) = &opts.db_path {
		config.db_path = db_path.clone();
	}
	if let Some(full_node_ws) = &opts.full_node_ws {
		config.rpc.full_node_ws = full_node_ws.clone();
	}
	if let Some(suri) = &opts.suri {
		config.suri = suri.clone();
	}

	if config.suri.is_empty() {
		return Err(eyre!("Secret URI of the sudo key holder is not set"));
	}

	Ok(config)
}

#[cfg(test)]
mod tests {
	use super::{load, CliOpts, RuntimeConfig};
	use avail_migration_core::migration::MigrationConfig;
	use clap::Parser;
	use std::{io::Write, time::Duration};
	use tracing::Level;

	#[test]
	fn cli_flags_override_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
log_level = "DEBUG"
db_path = "from_file.jsonl"
full_node_ws = "ws://file:9944"
block_time = 6
finalization_timeout = 120
ignore = ["timestamp.set"]
"#
		)
		.unwrap();
		let path = file.path().to_str().unwrap().to_string();

		let opts = CliOpts::parse_from([
			"avail-migration",
			"--config",
			&path,
			"--db-path",
			"from_cli.jsonl",
			"--dry",
		]);
		let config = load(&opts).unwrap();

		assert_eq!(config.log_level, Level::DEBUG);
		assert_eq!(config.db_path, "from_cli.jsonl");
		assert_eq!(config.rpc.full_node_ws, "ws://file:9944");
		assert_eq!(config.block_time, Duration::from_secs(6));
		assert_eq!(config.finalization_timeout, Duration::from_secs(120));
		assert!(config.dry);
		assert!(!config.trickle);
		assert_eq!(config.unsigned_method, "claims.claim");
	}

	#[test]
	fn missing_config_file_fails() {
		let opts = CliOpts::parse_from(["avail-migration", "--config", "/nonexistent/config.toml"]);
		assert!(load(&opts).is_err());
	}

	#[test]
	fn migration_config_from_runtime_config() {
		let config = RuntimeConfig {
			trickle: true,
			..Default::default()
		};

		let migration = MigrationConfig::from(&config);

		assert!(migration.trickle);
		assert_eq!(migration.block_time, Duration::from_secs(20));
		assert_eq!(migration.finalization_timeout, Duration::from_secs(600));
		assert!(migration.ignore.contains(&"timestamp.set".to_string()));
	}
}
