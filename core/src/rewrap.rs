//! Per transaction type rewrapping of recorded calls before they are replayed.
use derive_more::derive::Display;
use serde_json::Value;

use crate::{
	call::{descriptor, Arg, Call, Resolver},
	error::Error,
	network::Registry,
	types::CallName,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum SkipReason {
	#[display("runtime upgrades are never replayed")]
	RuntimeUpgrade,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Rewrapped {
	Call(Call),
	Skip(SkipReason),
}

/// Rebuilds the recorded call, resolving the call descriptors embedded in its arguments.
///
/// Calls without embedded descriptors are built from the recorded arguments as they are.
pub fn rewrap<R: Registry + ?Sized>(
	resolver: &Resolver<R>,
	name: &CallName,
	raw_args: &[Value],
) -> Result<Rewrapped, Error> {
	let call = match name.method.as_str() {
		"batch" | "batchAll" | "forceBatch" => {
			let calls = resolver.resolve_all(raw_arg(name, raw_args, 0)?)?;
			Call::new(name.clone(), vec![Arg::Calls(calls)])
		},
		"sudo" => nested(resolver, name, raw_args, 0)?,
		"sudoUncheckedWeight" => {
			let inner = descriptor(raw_arg(name, raw_args, 0)?)?;
			if inner.is_runtime_upgrade() {
				return Ok(Rewrapped::Skip(SkipReason::RuntimeUpgrade));
			}
			let weight = raw_arg(name, raw_args, 1)?.clone();
			Call::new(
				name.clone(),
				vec![Arg::Call(resolver.resolve(&inner)?), Arg::Value(weight)],
			)
		},
		"asMulti" => nested(resolver, name, raw_args, 3)?,
		"sudoAs" | "asDerivative" | "asMultiThreshold1" => nested(resolver, name, raw_args, 1)?,
		"proxy" => nested(resolver, name, raw_args, 2)?,
		_ => Call::from_raw(name.clone(), raw_args),
	};
	Ok(Rewrapped::Call(call))
}

/// Keeps recorded arguments, except the one at `index` which holds a call descriptor.
fn nested<R: Registry + ?Sized>(
	resolver: &Resolver<R>,
	name: &CallName,
	raw_args: &[Value],
	index: usize,
) -> Result<Call, Error> {
	let call = resolver.resolve_value(raw_arg(name, raw_args, index)?)?;
	let mut args = raw_args
		.iter()
		.cloned()
		.map(Arg::Value)
		.collect::<Vec<_>>();
	args[index] = Arg::Call(call);
	Ok(Call::new(name.clone(), args))
}

fn raw_arg<'a>(name: &CallName, raw_args: &'a [Value], index: usize) -> Result<&'a Value, Error> {
	raw_args.get(index).ok_or_else(|| Error::MissingArgument {
		call: name.to_string(),
		field: format!("#{index}"),
	})
}
