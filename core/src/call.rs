//! Reconstruction of executable calls from recorded call descriptors.
use serde_json::Value;
use tracing::trace;

use crate::{
	error::Error,
	network::Registry,
	types::{CallDescriptor, CallName},
};

/// Legitimate call graphs are two or three levels deep.
pub const MAX_CALL_DEPTH: usize = 8;

/// Positional call argument.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
	/// Value passed as recorded, converted by the network client.
	Value(Value),
	Call(Call),
	Calls(Vec<Call>),
}

/// Call bound to a section and method, ready to be turned into a transaction by the network client.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
	pub name: CallName,
	pub args: Vec<Arg>,
}

impl Call {
	pub fn new(name: CallName, args: Vec<Arg>) -> Self {
		Call { name, args }
	}

	/// Builds a call from recorded positional arguments, without any reconstruction.
	pub fn from_raw(name: CallName, args: &[Value]) -> Self {
		let args = args.iter().cloned().map(Arg::Value).collect();
		Call { name, args }
	}

	/// Wraps the call so it is dispatched with `signer` as the origin.
	pub fn sudo_as(signer: &str, call: Call) -> Self {
		Call::new(
			CallName::new("sudo", "sudoAs"),
			vec![Arg::Value(Value::String(signer.to_string())), Arg::Call(call)],
		)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Param {
	Value(&'static str),
	Call(&'static str),
	Calls(&'static str),
}

use Param::{Call as NestedCall, Calls as NestedCalls, Value as Field};

/// Known call shapes. Every supported `(section, method)` pair has exactly one rule,
/// anything else is [`CallRule::Unsupported`] and can not be reconstructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallRule {
	Transfer,
	TransferKeepAlive,
	TransferAllowDeath,
	ForceTransfer,
	TransferAll,
	SetBalance,
	ForceSetBalance,
	Remark,
	RemarkWithEvent,
	SetCode,
	SetCodeWithoutChecks,
	Sudo,
	SudoAs,
	SudoUncheckedWeight,
	SetKey,
	Batch,
	BatchAll,
	ForceBatch,
	AsDerivative,
	Proxy,
	AddProxy,
	RemoveProxy,
	AsMulti,
	AsMultiThreshold1,
	ApproveAsMulti,
	CancelAsMulti,
	Bond,
	BondExtra,
	Unbond,
	Nominate,
	Chill,
	Validate,
	SetKeys,
	SubmitData,
	CreateApplicationKey,
	Unsupported,
}

impl CallRule {
	pub fn of(name: &CallName) -> Self {
		match (name.section.as_str(), name.method.as_str()) {
			("balances", "transfer") => CallRule::Transfer,
			("balances", "transferKeepAlive") => CallRule::TransferKeepAlive,
			("balances", "transferAllowDeath") => CallRule::TransferAllowDeath,
			("balances", "forceTransfer") => CallRule::ForceTransfer,
			("balances", "transferAll") => CallRule::TransferAll,
			("balances", "setBalance") => CallRule::SetBalance,
			("balances", "forceSetBalance") => CallRule::ForceSetBalance,
			("system", "remark") => CallRule::Remark,
			("system", "remarkWithEvent") => CallRule::RemarkWithEvent,
			("system", "setCode") => CallRule::SetCode,
			("system", "setCodeWithoutChecks") => CallRule::SetCodeWithoutChecks,
			("sudo", "sudo") => CallRule::Sudo,
			("sudo", "sudoAs") => CallRule::SudoAs,
			("sudo", "sudoUncheckedWeight") => CallRule::SudoUncheckedWeight,
			("sudo", "setKey") => CallRule::SetKey,
			("utility", "batch") => CallRule::Batch,
			("utility", "batchAll") => CallRule::BatchAll,
			("utility", "forceBatch") => CallRule::ForceBatch,
			("utility", "asDerivative") => CallRule::AsDerivative,
			("proxy", "proxy") => CallRule::Proxy,
			("proxy", "addProxy") => CallRule::AddProxy,
			("proxy", "removeProxy") => CallRule::RemoveProxy,
			("multisig", "asMulti") => CallRule::AsMulti,
			("multisig", "asMultiThreshold1") => CallRule::AsMultiThreshold1,
			("multisig", "approveAsMulti") => CallRule::ApproveAsMulti,
			("multisig", "cancelAsMulti") => CallRule::CancelAsMulti,
			("staking", "bond") => CallRule::Bond,
			("staking", "bondExtra") => CallRule::BondExtra,
			("staking", "unbond") => CallRule::Unbond,
			("staking", "nominate") => CallRule::Nominate,
			("staking", "chill") => CallRule::Chill,
			("staking", "validate") => CallRule::Validate,
			("session", "setKeys") => CallRule::SetKeys,
			("dataAvailability", "submitData") => CallRule::SubmitData,
			("dataAvailability", "createApplicationKey") => CallRule::CreateApplicationKey,
			_ => CallRule::Unsupported,
		}
	}

	/// Named descriptor fields, in the positional order of the call parameters.
	fn params(self) -> &'static [Param] {
		match self {
			CallRule::Transfer | CallRule::TransferKeepAlive | CallRule::TransferAllowDeath => {
				&[Field("dest"), Field("value")]
			},
			CallRule::ForceTransfer => &[Field("source"), Field("dest"), Field("value")],
			CallRule::TransferAll => &[Field("dest"), Field("keep_alive")],
			CallRule::SetBalance => &[Field("who"), Field("new_free"), Field("new_reserved")],
			CallRule::ForceSetBalance => &[Field("who"), Field("new_free")],
			CallRule::Remark | CallRule::RemarkWithEvent => &[Field("remark")],
			CallRule::SetCode | CallRule::SetCodeWithoutChecks => &[Field("code")],
			CallRule::Sudo => &[NestedCall("call")],
			CallRule::SudoAs => &[Field("who"), NestedCall("call")],
			CallRule::SudoUncheckedWeight => &[NestedCall("call"), Field("weight")],
			CallRule::SetKey => &[Field("new")],
			CallRule::Batch | CallRule::BatchAll | CallRule::ForceBatch => &[NestedCalls("calls")],
			CallRule::AsDerivative => &[Field("index"), NestedCall("call")],
			CallRule::Proxy => &[Field("real"), Field("force_proxy_type"), NestedCall("call")],
			CallRule::AddProxy | CallRule::RemoveProxy => {
				&[Field("delegate"), Field("proxy_type"), Field("delay")]
			},
			CallRule::AsMulti => &[
				Field("threshold"),
				Field("other_signatories"),
				Field("maybe_timepoint"),
				NestedCall("call"),
				Field("max_weight"),
			],
			CallRule::AsMultiThreshold1 => &[Field("other_signatories"), NestedCall("call")],
			CallRule::ApproveAsMulti => &[
				Field("threshold"),
				Field("other_signatories"),
				Field("maybe_timepoint"),
				Field("call_hash"),
				Field("max_weight"),
			],
			CallRule::CancelAsMulti => &[
				Field("threshold"),
				Field("other_signatories"),
				Field("timepoint"),
				Field("call_hash"),
			],
			CallRule::Bond => &[Field("value"), Field("payee")],
			CallRule::BondExtra => &[Field("max_additional")],
			CallRule::Unbond => &[Field("value")],
			CallRule::Nominate => &[Field("targets")],
			CallRule::Chill => &[],
			CallRule::Validate => &[Field("prefs")],
			CallRule::SetKeys => &[Field("keys"), Field("proof")],
			CallRule::SubmitData => &[Field("data")],
			CallRule::CreateApplicationKey => &[Field("key")],
			CallRule::Unsupported => &[],
		}
	}
}

/// Resolves call descriptors against the call registry of the target chain.
pub struct Resolver<'a, R: ?Sized> {
	registry: &'a R,
}

impl<'a, R: Registry + ?Sized> Resolver<'a, R> {
	pub fn new(registry: &'a R) -> Self {
		Resolver { registry }
	}

	pub fn resolve(&self, descriptor: &CallDescriptor) -> Result<Call, Error> {
		self.resolve_at(descriptor, 0)
	}

	/// Resolves a descriptor still in its recorded JSON form.
	pub fn resolve_value(&self, value: &Value) -> Result<Call, Error> {
		self.resolve_value_at(value, 0)
	}

	/// Resolves a JSON array of descriptors, preserving their order.
	pub fn resolve_all(&self, value: &Value) -> Result<Vec<Call>, Error> {
		self.resolve_all_at(value, 0)
	}

	fn resolve_value_at(&self, value: &Value, depth: usize) -> Result<Call, Error> {
		let descriptor = descriptor(value)?;
		self.resolve_at(&descriptor, depth)
	}

	fn resolve_all_at(&self, value: &Value, depth: usize) -> Result<Vec<Call>, Error> {
		let Value::Array(values) = value else {
			return Err(Error::MalformedDescriptor(format!(
				"Expected a list of calls, found {value}"
			)));
		};
		values
			.iter()
			.map(|value| self.resolve_value_at(value, depth))
			.collect()
	}

	fn resolve_at(&self, descriptor: &CallDescriptor, depth: usize) -> Result<Call, Error> {
		if depth >= MAX_CALL_DEPTH {
			return Err(Error::CallTooDeep(MAX_CALL_DEPTH));
		}

		let name = self
			.registry
			.call_name(&descriptor.call_index)
			.ok_or_else(|| Error::UnknownCallIndex(descriptor.call_index.to_string()))?;

		let rule = CallRule::of(&name);
		if rule == CallRule::Unsupported {
			return Err(Error::UnknownCall(name.to_string()));
		}
		trace!(call = %name, ?rule, depth, "Resolving call");

		let field = |param: &'static str| {
			descriptor.arg(param).ok_or_else(|| Error::MissingArgument {
				call: name.to_string(),
				field: param.to_string(),
			})
		};

		let args = rule
			.params()
			.iter()
			.map(|param| match *param {
				Field(param) => field(param).cloned().map(Arg::Value),
				NestedCall(param) => self
					.resolve_value_at(field(param)?, depth + 1)
					.map(Arg::Call),
				NestedCalls(param) => self
					.resolve_all_at(field(param)?, depth + 1)
					.map(Arg::Calls),
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Call::new(name, args))
	}
}

/// Reads a call descriptor from its recorded JSON form.
pub fn descriptor(value: &Value) -> Result<CallDescriptor, Error> {
	serde_json::from_value(value.clone())
		.map_err(|error| Error::MalformedDescriptor(format!("{error}: {value}")))
}

#[cfg(test)]
pub(crate) mod tests {
	use super::{Arg, Call, CallRule, Resolver, MAX_CALL_DEPTH};
	use crate::{
		error::Error,
		network::MockRegistry,
		types::{CallIndex, CallName},
	};
	use serde_json::{json, Value};
	use test_case::test_case;

	/// Registry with a handful of pallets, indexed like a typical runtime.
	pub fn registry() -> MockRegistry {
		let mut registry = MockRegistry::new();
		registry
			.expect_call_name()
			.returning(|index: &CallIndex| {
				let (section, method) = match (index.pallet, index.call) {
					(0, 0) => ("system", "remark"),
					(0, 2) => ("system", "setCode"),
					(1, 0) => ("utility", "batch"),
					(1, 1) => ("utility", "asDerivative"),
					(1, 2) => ("utility", "batchAll"),
					(6, 0) => ("balances", "transfer"),
					(6, 3) => ("balances", "transferKeepAlive"),
					(19, 0) => ("sudo", "sudo"),
					(19, 1) => ("sudo", "sudoUncheckedWeight"),
					(19, 3) => ("sudo", "sudoAs"),
					(30, 0) => ("proxy", "proxy"),
					(31, 1) => ("multisig", "asMulti"),
					(40, 0) => ("democracy", "propose"),
					_ => return None,
				};
				Some(CallName::new(section, method))
			});
		registry
	}

	pub fn transfer(dest: &str, value: u64) -> Value {
		json!({ "callIndex": "0x0600", "args": { "dest": { "id": dest }, "value": value } })
	}

	pub fn remark(remark: &str) -> Value {
		json!({ "callIndex": "0x0000", "args": { "remark": remark } })
	}

	pub fn sudo(call: Value) -> Value {
		json!({ "callIndex": "0x1300", "args": { "call": call } })
	}

	fn call(section: &str, method: &str, args: Vec<Arg>) -> Call {
		Call::new(CallName::new(section, method), args)
	}

	#[test_case("balances", "transferKeepAlive" => CallRule::TransferKeepAlive)]
	#[test_case("sudo", "sudoUncheckedWeight" => CallRule::SudoUncheckedWeight)]
	#[test_case("dataAvailability", "submitData" => CallRule::SubmitData)]
	#[test_case("assets", "transfer" => CallRule::Unsupported; "same method in another pallet")]
	#[test_case("democracy", "propose" => CallRule::Unsupported)]
	fn rule_of(section: &str, method: &str) -> CallRule {
		CallRule::of(&CallName::new(section, method))
	}

	#[test]
	fn resolve_plain_call() {
		let registry = registry();
		let resolver = Resolver::new(&registry);

		let resolved = resolver.resolve_value(&transfer("5Grw", 10)).unwrap();
		assert_eq!(
			resolved,
			call(
				"balances",
				"transfer",
				vec![Arg::Value(json!({ "id": "5Grw" })), Arg::Value(json!(10))]
			)
		);
	}

	#[test]
	fn resolve_is_idempotent() {
		let registry = registry();
		let resolver = Resolver::new(&registry);
		let descriptor = sudo(transfer("5Grw", 10));

		assert_eq!(
			resolver.resolve_value(&descriptor).unwrap(),
			resolver.resolve_value(&descriptor).unwrap()
		);
	}

	#[test]
	fn resolve_nested_batch() {
		let registry = registry();
		let resolver = Resolver::new(&registry);
		let batch = json!({
			"callIndex": "0x0100",
			"args": { "calls": [transfer("5Grw", 1), sudo(remark("0x01")), remark("0x02")] }
		});

		let resolved = resolver.resolve_value(&batch).unwrap();
		let expected = call(
			"utility",
			"batch",
			vec![Arg::Calls(vec![
				call(
					"balances",
					"transfer",
					vec![Arg::Value(json!({ "id": "5Grw" })), Arg::Value(json!(1))],
				),
				call(
					"sudo",
					"sudo",
					vec![Arg::Call(call(
						"system",
						"remark",
						vec![Arg::Value(json!("0x01"))],
					))],
				),
				call("system", "remark", vec![Arg::Value(json!("0x02"))]),
			])],
		);
		assert_eq!(resolved, expected);
	}

	#[test]
	fn resolve_proxy_with_camel_case_fields() {
		let registry = registry();
		let resolver = Resolver::new(&registry);
		let proxy = json!({
			"callIndex": "0x1e00",
			"args": { "real": "5Grw", "forceProxyType": null, "call": remark("0x03") }
		});

		let resolved = resolver.resolve_value(&proxy).unwrap();
		assert_eq!(resolved.args.len(), 3);
		assert_eq!(resolved.args[1], Arg::Value(Value::Null));
		assert!(matches!(&resolved.args[2], Arg::Call(inner) if inner.name.method == "remark"));
	}

	#[test]
	fn resolve_unknown_index_fails() {
		let registry = registry();
		let resolver = Resolver::new(&registry);
		let unknown = json!({ "callIndex": "0x6363", "args": {} });

		let error = resolver.resolve_value(&unknown).unwrap_err();
		assert!(matches!(error, Error::UnknownCallIndex(index) if index == "0x6363"));
	}

	#[test]
	fn resolve_unsupported_call_fails() {
		let registry = registry();
		let resolver = Resolver::new(&registry);
		let propose = json!({ "callIndex": "0x2800", "args": { "proposal": "0x00", "value": 1 } });

		let error = resolver.resolve_value(&propose).unwrap_err();
		assert!(matches!(error, Error::UnknownCall(name) if name == "democracy.propose"));
	}

	#[test]
	fn resolve_unsupported_nested_call_fails() {
		let registry = registry();
		let resolver = Resolver::new(&registry);
		let nested = sudo(json!({ "callIndex": "0x2800", "args": {} }));

		assert!(matches!(
			resolver.resolve_value(&nested),
			Err(Error::UnknownCall(_))
		));
	}

	#[test]
	fn resolve_missing_argument_fails() {
		let registry = registry();
		let resolver = Resolver::new(&registry);
		let transfer = json!({ "callIndex": "0x0600", "args": { "dest": "5Grw" } });

		let error = resolver.resolve_value(&transfer).unwrap_err();
		assert!(matches!(
			error,
			Error::MissingArgument { call, field } if call == "balances.transfer" && field == "value"
		));
	}

	#[test]
	fn resolve_malformed_descriptor_fails() {
		let registry = registry();
		let resolver = Resolver::new(&registry);

		assert!(matches!(
			resolver.resolve_value(&json!("0x0600")),
			Err(Error::MalformedDescriptor(_))
		));
		assert!(matches!(
			resolver.resolve_all(&json!({ "callIndex": "0x0000" })),
			Err(Error::MalformedDescriptor(_))
		));
	}

	#[test]
	fn resolve_too_deep_fails() {
		let registry = registry();
		let resolver = Resolver::new(&registry);
		let nested = (0..MAX_CALL_DEPTH).fold(remark("0x00"), |call, _| sudo(call));

		assert!(matches!(
			resolver.resolve_value(&nested),
			Err(Error::CallTooDeep(MAX_CALL_DEPTH))
		));
	}

	#[test]
	fn sudo_as_wraps_call() {
		let inner = call("system", "remark", vec![Arg::Value(json!("0x00"))]);
		let wrapped = Call::sudo_as("5Grw", inner.clone());

		assert_eq!(wrapped.name, CallName::new("sudo", "sudoAs"));
		assert_eq!(wrapped.args, vec![Arg::Value(json!("5Grw")), Arg::Call(inner)]);
	}
}
