//! Migration sequencer, replays the transaction log block by block under the sudo key.
use std::{path::Path, time::Duration};

use color_eyre::Result;
use derive_more::derive::Display;
use serde::Serialize;
use tokio::{
	task::JoinHandle,
	time::{timeout_at, Instant},
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
	call::{Call, Resolver},
	error::Error,
	history,
	network::{Chain, Subscription},
	rewrap::{rewrap, Rewrapped},
	tracker::{self, Outcome},
	types::{BlockRecord, CallName, Identity, TransactionRecord},
	utils::spawn_in_span,
};

#[derive(Clone, Debug)]
pub struct MigrationConfig {
	/// Builds every call but submits nothing, authorization mismatch is only reported.
	pub dry: bool,
	/// Requires block numbers to form the contiguous run `1..=N`.
	pub ensure_complete: bool,
	/// Waits one block time after every block with submissions.
	pub trickle: bool,
	pub block_time: Duration,
	/// Methods in `section.method` form which are never replayed.
	pub ignore: Vec<String>,
	/// The only unsigned method which is replayed, submitted as is.
	pub unsigned_method: String,
	/// Upper bound on waiting for submissions to finalize once every block is replayed.
	pub finalization_timeout: Duration,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Stage {
	Loading,
	Validating,
	Authorizing,
	#[display("Iterating (block {block}, extrinsic {extrinsic})")]
	Iterating {
		block: u32,
		extrinsic: usize,
	},
	Draining,
	Done,
}

/// Migration summary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Report {
	pub blocks: usize,
	pub signed: u64,
	pub unsigned: u64,
	pub ignored: u64,
	pub skipped: u64,
	pub finalized: u64,
	pub failed: u64,
	/// Still not finalized when the finalization timeout expired.
	pub pending: u64,
}

/// Loads the transaction log from `path` and replays it on the chain.
pub async fn run<C: Chain>(
	chain: &C,
	config: MigrationConfig,
	identity: Identity,
	path: impl AsRef<Path>,
) -> Result<Report> {
	info!(stage = %Stage::Loading, "Loading transaction log");
	let blocks = history::load(path)?;
	replay(chain, config, identity, blocks).await
}

/// Replays blocks, expected in ascending order, on the chain.
pub async fn replay<C: Chain>(
	chain: &C,
	config: MigrationConfig,
	identity: Identity,
	blocks: Vec<BlockRecord>,
) -> Result<Report> {
	if config.ensure_complete {
		info!(stage = %Stage::Validating, "Checking transaction log completeness");
		history::ensure_complete(&blocks)?;
	}

	let mut migration = Migration::authorize(chain, config, identity).await?;

	for block in &blocks {
		let span = info_span!("block", number = block.number);
		let result = migration.replay_block(block).instrument(span).await;
		if let Err(error) = result {
			error!(stage = %migration.stage, "Migration aborted: {error:#}");
			return Err(error);
		}
	}

	Ok(migration.finish().await)
}

struct Migration<'a, C: Chain> {
	chain: &'a C,
	config: MigrationConfig,
	identity: Identity,
	stage: Stage,
	starting_nonce: u64,
	/// Number of signed transactions, never decremented.
	signed: u64,
	trackers: Vec<JoinHandle<Outcome>>,
	report: Report,
}

impl<'a, C: Chain> Migration<'a, C> {
	async fn authorize(chain: &'a C, config: MigrationConfig, identity: Identity) -> Result<Self> {
		info!(stage = %Stage::Authorizing, signer = %identity.account_id, "Checking sudo key");

		let sudo_key = chain.sudo_key().await?;
		if sudo_key.as_ref() != Some(&identity.account_id) {
			let signer = identity.account_id.to_string();
			let sudo_key = sudo_key.map_or_else(|| "not set".to_string(), |key| key.to_string());
			if !config.dry {
				return Err(Error::Authorization { signer, sudo_key }.into());
			}
			warn!(%signer, %sudo_key, "Signer is not the sudo key holder, continuing dry run");
		}

		let starting_nonce = chain.account_nonce(&identity.account_id).await?;
		info!(starting_nonce, dry = config.dry, "Signer authorized");

		Ok(Migration {
			chain,
			config,
			identity,
			stage: Stage::Authorizing,
			starting_nonce,
			signed: 0,
			trackers: vec![],
			report: Report::default(),
		})
	}

	fn next_nonce(&self) -> u64 {
		self.starting_nonce + self.signed
	}

	async fn replay_block(&mut self, block: &BlockRecord) -> Result<()> {
		let mut wait = false;
		for (extrinsic, record) in block.extrinsics.iter().enumerate() {
			self.stage = Stage::Iterating {
				block: block.number,
				extrinsic,
			};
			let submitted = self.replay_extrinsic(record).await?;
			wait |= self.config.trickle && submitted;
		}
		self.report.blocks += 1;

		if wait {
			self.stage = Stage::Draining;
			debug!(block_time = ?self.config.block_time, "Waiting for the next block");
			tokio::time::sleep(self.config.block_time).await;
		}
		Ok(())
	}

	/// Returns `true` if the extrinsic was submitted.
	async fn replay_extrinsic(&mut self, record: &TransactionRecord) -> Result<bool> {
		let (hash, method) = (record.hash.as_str(), record.method.as_str());

		if self.config.ignore.iter().any(|ignored| ignored == method) {
			debug!(hash, method, "Ignoring extrinsic");
			self.report.ignored += 1;
			return Ok(false);
		}

		let name = CallName::parse(method).ok_or_else(|| Error::UnknownCall(method.to_string()))?;

		if method == self.config.unsigned_method {
			return self.replay_unsigned(record, name).await;
		}

		let resolver = Resolver::new(self.chain);
		let call = match rewrap(&resolver, &name, &record.args)? {
			Rewrapped::Call(call) => call,
			Rewrapped::Skip(reason) => {
				info!(hash, method, %reason, "Skipping extrinsic");
				self.report.skipped += 1;
				return Ok(false);
			},
		};

		let signer = record.signer().ok_or_else(|| Error::MissingSigner {
			hash: hash.to_string(),
			method: method.to_string(),
		})?;
		let call = Call::sudo_as(signer, call);
		let nonce = self.next_nonce();

		if self.config.dry {
			self.chain.validate(&call)?;
			info!(hash, method, signer, nonce, "Dry run, extrinsic not submitted");
			self.signed += 1;
			self.report.signed += 1;
			return Ok(false);
		}

		let subscription = self
			.chain
			.submit_signed(&call, &self.identity.keypair, nonce)
			.await
			.map_err(|error| submission_error(record, error))?;
		self.signed += 1;
		self.report.signed += 1;
		info!(hash, method, signer, nonce, "Extrinsic submitted");

		self.watch(record, subscription);
		Ok(true)
	}

	async fn replay_unsigned(&mut self, record: &TransactionRecord, name: CallName) -> Result<bool> {
		let hash = record.hash.as_str();

		if self.config.dry {
			info!(hash, method = %name, "Dry run, unsigned extrinsic not submitted");
			self.report.unsigned += 1;
			return Ok(false);
		}

		let call = Call::from_raw(name, &record.args);
		let subscription = self
			.chain
			.submit_unsigned(&call)
			.await
			.map_err(|error| submission_error(record, error))?;
		self.report.unsigned += 1;
		info!(hash, method = %call.name, "Unsigned extrinsic submitted");

		self.watch(record, subscription);
		Ok(true)
	}

	fn watch(&mut self, record: &TransactionRecord, subscription: Subscription) {
		let tracker = tracker::track(record.hash.clone(), subscription);
		self.trackers.push(spawn_in_span(tracker));
	}

	/// Waits for tracked submissions to reach a terminal status, until the finalization timeout.
	async fn finish(mut self) -> Report {
		self.stage = Stage::Draining;
		info!(
			stage = %self.stage,
			pending = self.trackers.len(),
			timeout = ?self.config.finalization_timeout,
			"All blocks replayed, waiting for submissions"
		);
		let deadline = Instant::now() + self.config.finalization_timeout;
		for mut tracker in self.trackers.drain(..) {
			match timeout_at(deadline, &mut tracker).await {
				Ok(Ok(outcome)) if outcome.is_finalized() => self.report.finalized += 1,
				Ok(Ok(_)) => self.report.failed += 1,
				Ok(Err(error)) => {
					warn!("Status tracker failed: {error}");
					self.report.failed += 1;
				},
				Err(_) => {
					// aborting drops the tracker and its subscription
					tracker.abort();
					self.report.pending += 1;
				},
			}
		}
		if self.report.pending > 0 {
			warn!(
				pending = self.report.pending,
				"Finalization timeout reached, pending transactions are no longer tracked"
			);
		}
		self.stage = Stage::Done;
		info!(stage = %self.stage, report = ?self.report, "Migration finished");
		self.report
	}
}

fn submission_error(record: &TransactionRecord, error: color_eyre::Report) -> Error {
	Error::Submission {
		hash: record.hash.clone(),
		method: record.method.clone(),
		reason: format!("{error:#}"),
	}
}
