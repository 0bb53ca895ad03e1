//! Submission status tracking.
use avail_rust::H256;
use color_eyre::Result;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::network::TxStatus;

/// Terminal state of a tracked submission.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
	Finalized(H256),
	Failed(String),
	/// Subscription ended without a terminal status.
	Closed,
}

impl Outcome {
	pub fn is_finalized(&self) -> bool {
		matches!(self, Outcome::Finalized(_))
	}
}

/// Follows status events of a submitted transaction until it is finalized or fails.
///
/// The subscription is owned by the tracker and released as soon as a terminal status arrives,
/// events after it are never polled.
pub async fn track<S>(hash: String, mut subscription: S) -> Outcome
where
	S: Stream<Item = Result<TxStatus>> + Unpin,
{
	while let Some(status) = subscription.next().await {
		match status {
			Ok(TxStatus::Finalized(block_hash)) => {
				drop(subscription);
				info!(hash, ?block_hash, "Transaction finalized");
				return Outcome::Finalized(block_hash);
			},
			Ok(status @ (TxStatus::Dropped(_) | TxStatus::Invalid(_) | TxStatus::Error(_))) => {
				drop(subscription);
				warn!(hash, %status, "Transaction failed");
				return Outcome::Failed(status.to_string());
			},
			Ok(status) => debug!(hash, %status, "Transaction status changed"),
			Err(error) => {
				drop(subscription);
				warn!(hash, "Transaction status subscription failed: {error:#}");
				return Outcome::Failed(format!("{error:#}"));
			},
		}
	}

	warn!(hash, "Transaction status subscription closed before finalization");
	Outcome::Closed
}

#[cfg(test)]
pub(crate) mod tests {
	use super::{track, Outcome};
	use crate::network::TxStatus;
	use avail_rust::H256;
	use color_eyre::{eyre::eyre, Result};
	use futures::{stream, Stream, StreamExt};
	use std::{
		pin::Pin,
		sync::{
			atomic::{AtomicUsize, Ordering},
			Arc,
		},
		task::{Context, Poll},
	};

	/// Stream wrapper counting how many times it was released.
	pub struct Counted<S> {
		inner: S,
		drops: Arc<AtomicUsize>,
	}

	impl<S> Counted<S> {
		pub fn new(inner: S, drops: Arc<AtomicUsize>) -> Self {
			Counted { inner, drops }
		}
	}

	impl<S> Drop for Counted<S> {
		fn drop(&mut self) {
			self.drops.fetch_add(1, Ordering::SeqCst);
		}
	}

	impl<S: Stream + Unpin> Stream for Counted<S> {
		type Item = S::Item;

		fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
			self.inner.poll_next_unpin(cx)
		}
	}

	fn events(statuses: Vec<Result<TxStatus>>) -> impl Stream<Item = Result<TxStatus>> + Unpin {
		// never ends, trackers must return on terminal statuses
		stream::iter(statuses).chain(stream::pending())
	}

	#[tokio::test]
	async fn finalized_releases_subscription_once() {
		let drops = Arc::new(AtomicUsize::new(0));
		let block_hash = H256::repeat_byte(7);
		let subscription = Counted::new(
			events(vec![
				Ok(TxStatus::Validated),
				Ok(TxStatus::Broadcast),
				Ok(TxStatus::InBestBlock(H256::repeat_byte(6))),
				Ok(TxStatus::Finalized(block_hash)),
				Ok(TxStatus::Retracted),
			]),
			drops.clone(),
		);

		let outcome = track("0x01".to_string(), subscription).await;

		assert_eq!(outcome, Outcome::Finalized(block_hash));
		assert_eq!(drops.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn invalid_releases_subscription() {
		let drops = Arc::new(AtomicUsize::new(0));
		let subscription = Counted::new(
			events(vec![
				Ok(TxStatus::Validated),
				Ok(TxStatus::Invalid("bad proof".to_string())),
			]),
			drops.clone(),
		);

		let outcome = track("0x02".to_string(), subscription).await;

		assert_eq!(outcome, Outcome::Failed("Invalid: bad proof".to_string()));
		assert_eq!(drops.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn stream_error_releases_subscription() {
		let drops = Arc::new(AtomicUsize::new(0));
		let subscription = Counted::new(
			events(vec![Ok(TxStatus::Validated), Err(eyre!("connection lost"))]),
			drops.clone(),
		);

		let outcome = track("0x03".to_string(), subscription).await;

		assert_eq!(outcome, Outcome::Failed("connection lost".to_string()));
		assert_eq!(drops.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn closed_stream_releases_subscription() {
		let drops = Arc::new(AtomicUsize::new(0));
		let subscription = Counted::new(stream::iter(vec![Ok(TxStatus::Validated)]), drops.clone());

		let outcome = track("0x04".to_string(), subscription).await;

		assert_eq!(outcome, Outcome::Closed);
		assert!(!outcome.is_finalized());
		assert_eq!(drops.load(Ordering::SeqCst), 1);
	}
}
