use avail_rust::subxt::{
	self,
	dynamic::Value,
	ext::scale_value::{Composite, ValueDef},
	tx::DynamicPayload,
	utils::AccountId32,
	Metadata,
};
use color_eyre::{
	eyre::{bail, eyre},
	Result,
};
use scale_info::{form::PortableForm, Field, PortableRegistry, Type, TypeDef, TypeDefPrimitive, Variant};
use serde_json::Value as Json;
use std::str::FromStr;

use crate::{
	call::{Arg, Call, MAX_CALL_DEPTH},
	types::normalize,
};

/// Turns resolved calls into dynamic transaction payloads, following the call shapes in the chain metadata.
pub struct CallEncoder<'a> {
	metadata: &'a Metadata,
	values: ValueBuilder<'a>,
}

impl<'a> CallEncoder<'a> {
	pub fn new(metadata: &'a Metadata) -> Self {
		CallEncoder {
			metadata,
			values: ValueBuilder::new(metadata.types()),
		}
	}

	pub fn payload(&self, call: &Call) -> Result<DynamicPayload> {
		let (pallet, method, fields) = self.call_fields(call, 0)?;
		Ok(subxt::dynamic::tx(pallet, method, fields))
	}

	fn call_fields(&self, call: &Call, depth: usize) -> Result<(String, String, Composite<()>)> {
		if depth >= MAX_CALL_DEPTH {
			bail!("Call nesting exceeds {MAX_CALL_DEPTH} levels");
		}

		let section = normalize(&call.name.section);
		let pallet = self
			.metadata
			.pallets()
			.find(|pallet| normalize(pallet.name()) == section)
			.ok_or_else(|| eyre!("Pallet of {} not found in metadata", call.name))?;

		let method = normalize(&call.name.method);
		let variant = pallet
			.call_variants()
			.unwrap_or_default()
			.iter()
			.find(|variant| normalize(&variant.name) == method)
			.ok_or_else(|| eyre!("Call {} not found in metadata", call.name))?;

		if variant.fields.len() != call.args.len() {
			bail!(
				"Call {} expects {} arguments, found {}",
				call.name,
				variant.fields.len(),
				call.args.len()
			);
		}

		let fields = variant
			.fields
			.iter()
			.zip(&call.args)
			.map(|(field, arg)| {
				let value = self
					.arg(arg, field.ty.id, depth)
					.map_err(|error| eyre!("{}: argument {:?}: {error}", call.name, field.name))?;
				Ok((field.name.clone(), value))
			})
			.collect::<Result<Vec<_>>>()?;

		Ok((pallet.name().to_string(), variant.name.clone(), composite(fields)))
	}

	fn arg(&self, arg: &Arg, type_id: u32, depth: usize) -> Result<Value> {
		match arg {
			Arg::Value(json) => self.values.value(json, type_id),
			Arg::Call(call) => self.runtime_call(call, depth + 1),
			Arg::Calls(calls) => calls
				.iter()
				.map(|call| self.runtime_call(call, depth + 1))
				.collect::<Result<Vec<_>>>()
				.map(Value::unnamed_composite),
		}
	}

	/// Outer runtime call value, variant of the pallet wrapping the variant of the call.
	fn runtime_call(&self, call: &Call, depth: usize) -> Result<Value> {
		let (pallet, method, fields) = self.call_fields(call, depth)?;
		Ok(Value::unnamed_variant(
			pallet,
			[Value::variant(method, fields)],
		))
	}
}

/// Builds SCALE values from recorded JSON values, guided by the type registry.
pub struct ValueBuilder<'a> {
	types: &'a PortableRegistry,
}

impl<'a> ValueBuilder<'a> {
	pub fn new(types: &'a PortableRegistry) -> Self {
		ValueBuilder { types }
	}

	pub fn value(&self, json: &Json, type_id: u32) -> Result<Value> {
		let ty = self
			.types
			.resolve(type_id)
			.ok_or_else(|| eyre!("Type {type_id} not found in metadata"))?;

		match &ty.type_def {
			TypeDef::Composite(def) => self.fields(json, &def.fields).map(composite_value),
			TypeDef::Variant(def) if is_option(ty) => self.option(json, &def.variants),
			TypeDef::Variant(def) => self.variant(json, &def.variants),
			TypeDef::Sequence(def) => self.sequence(json, def.type_param.id, None),
			TypeDef::Array(def) => self.sequence(json, def.type_param.id, Some(def.len as usize)),
			TypeDef::Tuple(def) => {
				let ids = def.fields.iter().map(|field| field.id).collect::<Vec<_>>();
				match (json, ids.as_slice()) {
					(_, []) => Ok(Value::unnamed_composite([])),
					(Json::Array(items), _) if items.len() == ids.len() => items
						.iter()
						.zip(ids.iter().copied())
						.map(|(item, id)| self.value(item, id))
						.collect::<Result<Vec<_>>>()
						.map(Value::unnamed_composite),
					(json, [id]) => Ok(Value::unnamed_composite([self.value(json, *id)?])),
					_ => bail!("Expected a tuple of {} values, found {json}", ids.len()),
				}
			},
			TypeDef::Primitive(def) => primitive(json, def),
			TypeDef::Compact(def) => self.value(json, def.type_param.id),
			TypeDef::BitSequence(_) => bail!("Bit sequences are not supported"),
		}
	}

	fn fields(&self, json: &Json, fields: &[Field<PortableForm>]) -> Result<Composite<()>> {
		let named = !fields.is_empty() && fields.iter().all(|field| field.name.is_some());

		match json {
			_ if fields.is_empty() => Ok(Composite::Unnamed(vec![])),
			Json::Object(map) if named && fields.iter().all(|field| object_field(map, field).is_some()) => {
				let values = fields
					.iter()
					.map(|field| {
						let name = field.name.clone().unwrap_or_default();
						let value = object_field(map, field).unwrap_or(&Json::Null);
						Ok((name, self.value(value, field.ty.id)?))
					})
					.collect::<Result<Vec<_>>>()?;
				Ok(Composite::Named(values))
			},
			// newtypes are recorded as their inner value
			json if fields.len() == 1 => {
				let field = &fields[0];
				let value = self.value(json, field.ty.id)?;
				Ok(composite(vec![(field.name.clone(), value)]))
			},
			Json::Array(items) if items.len() == fields.len() => {
				let values = fields
					.iter()
					.zip(items)
					.map(|(field, item)| Ok((field.name.clone(), self.value(item, field.ty.id)?)))
					.collect::<Result<Vec<_>>>()?;
				Ok(composite(values))
			},
			_ => bail!("Expected a composite of {} fields, found {json}", fields.len()),
		}
	}

	fn option(&self, json: &Json, variants: &[Variant<PortableForm>]) -> Result<Value> {
		if json.is_null() {
			return Ok(Value::unnamed_variant("None", []));
		}
		let some = variants
			.iter()
			.find(|variant| variant.name == "Some")
			.and_then(|variant| variant.fields.first())
			.ok_or_else(|| eyre!("Option type without `Some` variant"))?;
		Ok(Value::unnamed_variant("Some", [self.value(json, some.ty.id)?]))
	}

	fn variant(&self, json: &Json, variants: &[Variant<PortableForm>]) -> Result<Value> {
		let find = |name: &str| {
			let name = normalize(name);
			variants
				.iter()
				.find(|variant| normalize(&variant.name) == name)
		};

		match json {
			Json::String(name) => {
				if let Some(variant) = find(name).filter(|variant| variant.fields.is_empty()) {
					return Ok(Value::unnamed_variant(variant.name.clone(), []));
				}
				self.address(json, variants)
			},
			Json::Null => match find("None") {
				Some(variant) => Ok(Value::unnamed_variant(variant.name.clone(), [])),
				None => bail!("Unexpected null value"),
			},
			Json::Object(map) if map.len() == 1 => {
				let Some((name, inner)) = map.iter().next() else {
					bail!("Empty variant");
				};
				let variant = find(name).ok_or_else(|| eyre!("Unknown variant {name}"))?;
				let fields = self.fields(inner, &variant.fields)?;
				Ok(Value::variant(variant.name.clone(), fields))
			},
			_ => self.address(json, variants),
		}
	}

	/// Bare account ids are accepted where a `MultiAddress` is expected.
	fn address(&self, json: &Json, variants: &[Variant<PortableForm>]) -> Result<Value> {
		let id = variants
			.iter()
			.find(|variant| variant.name == "Id" && variant.fields.len() == 1)
			.ok_or_else(|| eyre!("No variant matches {json}"))?;
		let fields = self.fields(json, &id.fields)?;
		Ok(Value::variant(id.name.clone(), fields))
	}

	fn sequence(&self, json: &Json, item_id: u32, len: Option<usize>) -> Result<Value> {
		let items = match json {
			Json::String(value) if self.is_byte(item_id) => {
				let bytes = bytes(value, len)?;
				check_len(bytes.len(), len)?;
				return Ok(Value::from_bytes(bytes));
			},
			Json::Array(items) => items,
			_ => bail!("Expected a sequence, found {json}"),
		};
		check_len(items.len(), len)?;
		items
			.iter()
			.map(|item| self.value(item, item_id))
			.collect::<Result<Vec<_>>>()
			.map(Value::unnamed_composite)
	}

	fn is_byte(&self, type_id: u32) -> bool {
		self.types
			.resolve(type_id)
			.is_some_and(|ty| matches!(ty.type_def, TypeDef::Primitive(TypeDefPrimitive::U8)))
	}
}

fn is_option(ty: &Type<PortableForm>) -> bool {
	ty.path.segments.last().is_some_and(|segment| segment == "Option")
}

fn object_field<'a>(
	map: &'a serde_json::Map<String, Json>,
	field: &Field<PortableForm>,
) -> Option<&'a Json> {
	let name = normalize(field.name.as_deref()?);
	map.iter()
		.find(|(key, _)| normalize(key) == name)
		.map(|(_, value)| value)
}

fn composite(values: Vec<(Option<String>, Value)>) -> Composite<()> {
	if !values.is_empty() && values.iter().all(|(name, _)| name.is_some()) {
		let values = values
			.into_iter()
			.map(|(name, value)| (name.unwrap_or_default(), value))
			.collect();
		return Composite::Named(values);
	}
	Composite::Unnamed(values.into_iter().map(|(_, value)| value).collect())
}

fn composite_value(composite: Composite<()>) -> Value {
	Value {
		value: ValueDef::Composite(composite),
		context: (),
	}
}

fn check_len(actual: usize, expected: Option<usize>) -> Result<()> {
	match expected {
		Some(expected) if expected != actual => {
			bail!("Expected {expected} items, found {actual}")
		},
		_ => Ok(()),
	}
}

/// Bytes from hex, from an SS58 address for 32 byte arrays, or the UTF-8 encoding otherwise.
pub(crate) fn bytes(value: &str, len: Option<usize>) -> Result<Vec<u8>> {
	if let Some(hex) = value.strip_prefix("0x") {
		return Ok(hex::decode(hex)?);
	}
	if len == Some(32) {
		if let Ok(account_id) = AccountId32::from_str(value) {
			return Ok(account_id.0.to_vec());
		}
	}
	Ok(value.as_bytes().to_vec())
}

/// Unsigned integer from a JSON number, a decimal string or a hex string.
pub(crate) fn parse_u128(json: &Json) -> Result<u128> {
	match json {
		Json::Number(number) => number
			.as_u64()
			.map(u128::from)
			.ok_or_else(|| eyre!("Expected an unsigned integer, found {number}")),
		Json::String(value) => match value.strip_prefix("0x") {
			Some(hex) => Ok(u128::from_str_radix(hex, 16)?),
			None => Ok(value.replace(',', "").parse()?),
		},
		_ => bail!("Expected an unsigned integer, found {json}"),
	}
}

pub(crate) fn parse_i128(json: &Json) -> Result<i128> {
	match json {
		Json::Number(number) => number
			.as_i64()
			.map(i128::from)
			.ok_or_else(|| eyre!("Expected an integer, found {number}")),
		Json::String(value) => match value.strip_prefix("0x") {
			Some(hex) => Ok(i128::from_str_radix(hex, 16)?),
			None => Ok(value.replace(',', "").parse()?),
		},
		_ => bail!("Expected an integer, found {json}"),
	}
}

fn primitive(json: &Json, primitive: &TypeDefPrimitive) -> Result<Value> {
	use TypeDefPrimitive::*;

	match primitive {
		Bool => json
			.as_bool()
			.map(Value::bool)
			.ok_or_else(|| eyre!("Expected a boolean, found {json}")),
		Char => json
			.as_str()
			.and_then(|value| value.chars().next())
			.map(Value::char)
			.ok_or_else(|| eyre!("Expected a character, found {json}")),
		Str => match json {
			Json::String(value) => Ok(Value::string(value.clone())),
			json => Ok(Value::string(json.to_string())),
		},
		U8 | U16 | U32 | U64 | U128 => parse_u128(json).map(Value::u128),
		I8 | I16 | I32 | I64 | I128 => parse_i128(json).map(Value::i128),
		U256 | I256 => bail!("256 bit integers are not supported"),
	}
}
