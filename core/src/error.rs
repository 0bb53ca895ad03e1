use std::path::PathBuf;

use thiserror::Error;

/// Fatal migration errors. Every one of them stops the run before anything else is submitted.
#[derive(Debug, Error)]
pub enum Error {
	#[error("Cannot read transaction log {path:?}: {source}")]
	Io {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("Malformed block record on line {line}: {source}")]
	Parse {
		line: usize,
		source: serde_json::Error,
	},
	#[error("Transaction log is incomplete, block {missing} is missing")]
	Gap { missing: u32 },
	#[error("Transaction log is inconsistent, block {number} appears more than once")]
	DuplicateBlock { number: u32 },
	#[error("Signer {signer} is not the sudo key holder ({sudo_key})")]
	Authorization { signer: String, sudo_key: String },
	#[error("Call index {0} is not known to the target chain")]
	UnknownCallIndex(String),
	#[error("No argument mapping for call {0}")]
	UnknownCall(String),
	#[error("Call {call} is missing argument `{field}`")]
	MissingArgument { call: String, field: String },
	#[error("Malformed call descriptor: {0}")]
	MalformedDescriptor(String),
	#[error("Call nesting exceeds {0} levels")]
	CallTooDeep(usize),
	#[error("Extrinsic {hash} ({method}) has no signer")]
	MissingSigner { hash: String, method: String },
	#[error("Submission of extrinsic {hash} ({method}) failed: {reason}")]
	Submission {
		hash: String,
		method: String,
		reason: String,
	},
}
