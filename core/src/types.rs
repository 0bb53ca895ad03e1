//! Shared migration structs and enums.
use avail_rust::{
	subxt::utils::AccountId32,
	subxt_signer::{SecretString, SecretUri},
	Keypair,
};
use color_eyre::{eyre::eyre, Result};
use derive_more::derive::Display;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

/// Block as exported from the source chain, one per line of the transaction log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BlockRecord {
	pub number: u32,
	pub extrinsics: Vec<TransactionRecord>,
}

/// Signed or unsigned extrinsic recorded on the source chain.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
	/// Call name in `section.method` form.
	pub method: String,
	/// Positional call arguments.
	pub args: Vec<Value>,
	pub hash: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signature: Option<Signature>,
}

impl TransactionRecord {
	pub fn signer(&self) -> Option<&str> {
		self.signature
			.as_ref()
			.map(|signature| signature.signer.as_str())
	}
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Signature {
	pub signer: String,
}

/// Pallet and call index pair, as encoded in the first two bytes of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallIndex {
	pub pallet: u8,
	pub call: u8,
}

impl fmt::Display for CallIndex {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{:02x}{:02x}", self.pallet, self.call)
	}
}

impl FromStr for CallIndex {
	type Err = String;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		let bytes = hex::decode(value.trim_start_matches("0x"))
			.map_err(|error| format!("Invalid call index {value}: {error}"))?;
		let [pallet, call] = bytes.as_slice() else {
			return Err(format!("Call index {value} must be two bytes long"));
		};
		Ok(CallIndex {
			pallet: *pallet,
			call: *call,
		})
	}
}

impl<'de> Deserialize<'de> for CallIndex {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		CallIndex::from_str(&value).map_err(de::Error::custom)
	}
}

/// Call section (pallet) and method, both in camelCase.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash)]
#[display("{section}.{method}")]
pub struct CallName {
	pub section: String,
	pub method: String,
}

impl CallName {
	pub fn new(section: impl Into<String>, method: impl Into<String>) -> Self {
		CallName {
			section: section.into(),
			method: method.into(),
		}
	}

	/// Parses `section.method` form.
	pub fn parse(name: &str) -> Option<Self> {
		let (section, method) = name.split_once('.')?;
		(!section.is_empty() && !method.is_empty()).then(|| CallName::new(section, method))
	}
}

/// Opaque call representation, as recorded in the source chain history.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallDescriptor {
	pub call_index: CallIndex,
	#[serde(default)]
	pub args: Map<String, Value>,
}

impl CallDescriptor {
	/// Looks up a named argument, ignoring case and underscores.
	pub fn arg(&self, name: &str) -> Option<&Value> {
		let name = normalize(name);
		self.args
			.iter()
			.find(|(key, _)| normalize(key) == name)
			.map(|(_, value)| value)
	}

	/// Runtime upgrades carry the new runtime blob in the `code` argument.
	pub fn is_runtime_upgrade(&self) -> bool {
		self.arg("code").is_some()
	}
}

/// Normalizes names so that `force_proxy_type`, `forceProxyType` and `ForceProxyType` are equal.
pub fn normalize(name: &str) -> String {
	name.chars()
		.filter(|c| *c != '_')
		.flat_map(char::to_lowercase)
		.collect()
}

/// Migration signer, expected to hold the sudo key on the target chain.
#[derive(Clone)]
pub struct Identity {
	pub keypair: Keypair,
	pub account_id: AccountId32,
}

impl Identity {
	pub fn from_suri(suri: &str, password: Option<String>) -> Result<Self> {
		let mut suri = SecretUri::from_str(suri).map_err(|error| eyre!("Invalid secret URI: {error}"))?;

		if let Some(password) = password {
			suri.password = Some(SecretString::from(password));
		}

		let keypair = Keypair::from_uri(&suri)?;
		let account_id = keypair.public_key().to_account_id();

		Ok(Identity {
			keypair,
			account_id,
		})
	}
}

pub mod tracing_level_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::str::FromStr;
	use tracing::Level;

	pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&level.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		Level::from_str(&value).map_err(serde::de::Error::custom)
	}
}

/// Block time and finalization timeout, as whole seconds.
pub mod duration_seconds_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_secs())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let seconds = u64::deserialize(deserializer)?;
		Ok(Duration::from_secs(seconds))
	}
}

/// Connection retry delays, as milliseconds.
pub mod duration_millis_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let millis = u64::try_from(duration.as_millis()).map_err(serde::ser::Error::custom)?;
		serializer.serialize_u64(millis)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let millis = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(millis))
	}
}
