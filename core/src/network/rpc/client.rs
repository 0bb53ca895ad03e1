use async_trait::async_trait;
use avail_rust::{
	subxt::{
		self,
		client::{OnlineClientT, RuntimeVersion},
		tx::{DynamicPayload, TxStatus as SubxtStatus},
		utils::AccountId32,
	},
	AvailExtrinsicParamsBuilder, Keypair, SDK,
};
use color_eyre::{eyre::eyre, Result};
use convert_case::{Case, Casing};
use futures::StreamExt;
use sp_core::{bytes::from_hex, H256};
use std::sync::Arc;
use tokio_retry::Retry;
use tracing::{debug, info, warn};

use super::{
	configuration::{RPCConfig, DEV_FLAG_GENHASH},
	encoder::CallEncoder,
};
use crate::{
	call::Call,
	network::{Chain, Registry, Subscription, TxStatus},
	types::{CallIndex, CallName},
};

#[derive(Clone)]
pub struct Client {
	sdk: Arc<SDK>,
}

impl Client {
	/// Connects to the configured node, retrying with the configured strategy.
	pub async fn connect(config: &RPCConfig) -> Result<Self> {
		let host = config.full_node_ws.as_str();
		let genesis_hash = config.genesis_hash.as_str();

		let sdk = Retry::spawn(config.retry.clone(), || async move {
			Self::create_sdk(host, genesis_hash)
				.await
				.inspect_err(|error| warn!(host, "Connection failed: {error:#}"))
		})
		.await?;

		info!("Connected to RPC: {host}");
		Ok(Client { sdk: Arc::new(sdk) })
	}

	async fn create_sdk(host: &str, expected_genesis_hash: &str) -> Result<SDK> {
		let client = SDK::new_insecure(host)
			.await
			.map_err(|error| eyre!("{error}"))?;

		// check genesis hash
		let genesis_hash = client.api.genesis_hash();
		info!("Genesis hash: {:?}", genesis_hash);
		if let Some(cfg_genhash) = from_hex(expected_genesis_hash)
			.ok()
			.and_then(|e| TryInto::<[u8; 32]>::try_into(e).ok().map(H256::from))
		{
			if !genesis_hash.eq(&cfg_genhash) {
				Err(eyre!(
					"Genesis hash doesn't match the configured one! Change the config or the node url ({}).", host
				))?
			}
		} else if expected_genesis_hash.starts_with(DEV_FLAG_GENHASH) {
			warn!("Genesis hash configured for development ({}), skipping the genesis hash check entirely.", expected_genesis_hash);
		} else {
			Err(eyre!(
				"Genesis hash invalid, badly configured or missing (\"{}\").",
				expected_genesis_hash
			))?
		};

		let runtime_version: RuntimeVersion = client.api.runtime_version();
		info!(
			spec_version = runtime_version.spec_version,
			transaction_version = runtime_version.transaction_version,
			"Target runtime"
		);

		Ok(client)
	}

	fn payload(&self, call: &Call) -> Result<DynamicPayload> {
		let metadata = self.sdk.api.metadata();
		CallEncoder::new(&metadata).payload(call)
	}
}

fn status<T, C>(status: SubxtStatus<T, C>) -> TxStatus
where
	T: subxt::Config,
	T::Hash: Into<H256>,
	C: OnlineClientT<T>,
{
	match status {
		SubxtStatus::Validated { .. } => TxStatus::Validated,
		SubxtStatus::Broadcasted { .. } => TxStatus::Broadcast,
		SubxtStatus::NoLongerInBestBlock { .. } => TxStatus::Retracted,
		SubxtStatus::InBestBlock(tx) => TxStatus::InBestBlock(tx.block_hash().into()),
		SubxtStatus::InFinalizedBlock(tx) => TxStatus::Finalized(tx.block_hash().into()),
		SubxtStatus::Error { message } => TxStatus::Error(message),
		SubxtStatus::Invalid { message } => TxStatus::Invalid(message),
		SubxtStatus::Dropped { message } => TxStatus::Dropped(message),
	}
}

impl Registry for Client {
	fn call_name(&self, index: &CallIndex) -> Option<CallName> {
		let metadata = self.sdk.api.metadata();
		let pallet = metadata.pallet_by_index(index.pallet)?;
		let call = pallet.call_variant_by_index(index.call)?;

		Some(CallName::new(
			pallet.name().to_case(Case::Camel),
			call.name.to_case(Case::Camel),
		))
	}
}

#[async_trait]
impl Chain for Client {
	fn validate(&self, call: &Call) -> Result<()> {
		let payload = self.payload(call)?;
		let call_data = self.sdk.api.tx().call_data(&payload)?;
		debug!(call = %call.name, encoded = %hex::encode(call_data), "Call encoded");
		Ok(())
	}

	async fn sudo_key(&self) -> Result<Option<AccountId32>> {
		let address = subxt::dynamic::storage("Sudo", "Key", ());
		let key = self
			.sdk
			.api
			.storage()
			.at_latest()
			.await?
			.fetch(&address)
			.await?;

		Ok(key.map(|key| key.as_type::<AccountId32>()).transpose()?)
	}

	async fn account_nonce(&self, account_id: &AccountId32) -> Result<u64> {
		Ok(self.sdk.api.tx().account_nonce(account_id).await?)
	}

	async fn submit_signed(
		&self,
		call: &Call,
		signer: &Keypair,
		nonce: u64,
	) -> Result<Subscription> {
		let payload = self.payload(call)?;
		let params = AvailExtrinsicParamsBuilder::new().nonce(nonce).build();
		let progress = self
			.sdk
			.api
			.tx()
			.create_signed_offline(&payload, signer, params)?
			.submit_and_watch()
			.await?;

		Ok(progress
			.map(|event| event.map(status).map_err(Into::into))
			.boxed())
	}

	async fn submit_unsigned(&self, call: &Call) -> Result<Subscription> {
		let payload = self.payload(call)?;
		let progress = self
			.sdk
			.api
			.tx()
			.create_unsigned(&payload)?
			.submit_and_watch()
			.await?;

		Ok(progress
			.map(|event| event.map(status).map_err(Into::into))
			.boxed())
	}
}
