use crate::types::duration_millis_format;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff, FibonacciBackoff};

pub const LOCAL_WS_ENDPOINT: &str = "ws://127.0.0.1:9944";

/// Genesis hash prefix which disables the genesis hash check.
pub const DEV_FLAG_GENHASH: &str = "DEV";

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct RPCConfig {
	/// WebSocket endpoint of the target chain full node (default: ws://127.0.0.1:9944).
	pub full_node_ws: String,
	/// Expected genesis hash of the target chain, hex encoded (default: DEV, check is skipped).
	pub genesis_hash: String,
	/// Backoff for connecting to the full node, submissions are never retried.
	/// (default: fibonacci, base 1, max_delay 10000 ms, 8 retries)
	pub retry: RetryConfig,
}

impl Default for RPCConfig {
	fn default() -> Self {
		Self {
			full_node_ws: LOCAL_WS_ENDPOINT.into(),
			genesis_hash: DEV_FLAG_GENHASH.into(),
			retry: RetryConfig::Fibonacci(FibonacciConfig {
				base: 1,
				max_delay: Duration::from_millis(10000),
				retries: 8,
			}),
		}
	}
}

/// Delays between connection attempts, in seconds scaled from `base`, capped by `max_delay`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum RetryConfig {
	#[serde(rename = "exponential")]
	Exponential(ExponentialConfig),

	#[serde(rename = "fibonacci")]
	Fibonacci(FibonacciConfig),
}

impl IntoIterator for RetryConfig {
	type Item = Duration;
	type IntoIter = std::vec::IntoIter<Self::Item>;

	fn into_iter(self) -> Self::IntoIter {
		match self {
			RetryConfig::Exponential(config) => ExponentialBackoff::from_millis(config.base)
				.factor(1000)
				.max_delay(config.max_delay)
				.map(jitter)
				.take(config.retries)
				.collect::<Vec<Duration>>()
				.into_iter(),
			RetryConfig::Fibonacci(config) => FibonacciBackoff::from_millis(config.base)
				.factor(1000)
				.max_delay(config.max_delay)
				.map(jitter)
				.take(config.retries)
				.collect::<Vec<Duration>>()
				.into_iter(),
		}
	}
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExponentialConfig {
	pub base: u64,
	#[serde(with = "duration_millis_format")]
	pub max_delay: Duration,
	pub retries: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FibonacciConfig {
	pub base: u64,
	#[serde(with = "duration_millis_format")]
	pub max_delay: Duration,
	pub retries: usize,
}
