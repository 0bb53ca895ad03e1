use async_trait::async_trait;
use avail_rust::{subxt::utils::AccountId32, Keypair, H256};
use color_eyre::Result;
use derive_more::derive::Display;
use futures::stream::BoxStream;
use mockall::automock;

use crate::{
	call::Call,
	types::{CallIndex, CallName},
};

pub mod rpc;

/// Known call shapes of the target chain.
#[automock]
pub trait Registry {
	/// Section and method names (camelCase) of the call with the given index.
	fn call_name(&self, index: &CallIndex) -> Option<CallName>;
}

/// Lifecycle event of a submitted transaction.
#[derive(Clone, Debug, PartialEq, Display)]
pub enum TxStatus {
	Validated,
	Broadcast,
	#[display("InBestBlock({_0:?})")]
	InBestBlock(H256),
	Retracted,
	#[display("Finalized({_0:?})")]
	Finalized(H256),
	#[display("Dropped: {_0}")]
	Dropped(String),
	#[display("Invalid: {_0}")]
	Invalid(String),
	#[display("Error: {_0}")]
	Error(String),
}

/// Status events of a single submission. Dropping it unsubscribes.
pub type Subscription = BoxStream<'static, Result<TxStatus>>;

/// Network client of the target chain.
#[async_trait]
pub trait Chain: Registry + Send + Sync {
	/// Builds and encodes the call without submitting it.
	fn validate(&self, call: &Call) -> Result<()>;

	/// Current holder of the sudo key, if any.
	async fn sudo_key(&self) -> Result<Option<AccountId32>>;

	async fn account_nonce(&self, account_id: &AccountId32) -> Result<u64>;

	/// Signs the call with an explicit nonce and submits it.
	/// Returns once the node accepted the transaction.
	async fn submit_signed(&self, call: &Call, signer: &Keypair, nonce: u64)
		-> Result<Subscription>;

	async fn submit_unsigned(&self, call: &Call) -> Result<Subscription>;
}
