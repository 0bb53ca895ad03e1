//! Transaction log loading and validation.
use std::{
	fs,
	path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{error::Error, types::BlockRecord};

/// Parses newline-delimited block records and sorts them by block number.
///
/// Empty lines are ignored, any malformed line fails the whole load.
pub fn parse(contents: &str) -> Result<Vec<BlockRecord>, Error> {
	let mut blocks = contents
		.lines()
		.enumerate()
		.filter(|(_, line)| !line.trim().is_empty())
		.map(|(index, line)| {
			serde_json::from_str::<BlockRecord>(line).map_err(|source| Error::Parse {
				line: index + 1,
				source,
			})
		})
		.collect::<Result<Vec<_>, _>>()?;

	// stable, records of the same block keep their file order
	blocks.sort_by_key(|block| block.number);
	Ok(blocks)
}

pub fn load(path: impl AsRef<Path>) -> Result<Vec<BlockRecord>, Error> {
	let path = path.as_ref();
	let contents = fs::read_to_string(path).map_err(|source| Error::Io {
		path: PathBuf::from(path),
		source,
	})?;

	let blocks = parse(&contents)?;
	info!(path = %path.display(), blocks = blocks.len(), "Transaction log loaded");
	Ok(blocks)
}

/// Checks that sorted block numbers form the contiguous run `1..=N`.
pub fn ensure_complete(blocks: &[BlockRecord]) -> Result<(), Error> {
	let mut expected = 1;
	for block in blocks {
		if block.number < expected {
			return Err(Error::DuplicateBlock {
				number: block.number,
			});
		}
		if block.number > expected {
			return Err(Error::Gap { missing: expected });
		}
		expected += 1;
	}
	debug!(last = expected - 1, "Transaction log is complete");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::{ensure_complete, load, parse};
	use crate::{error::Error, types::BlockRecord};
	use std::io::Write;
	use test_case::test_case;

	fn blocks(numbers: &[u32]) -> Vec<BlockRecord> {
		numbers
			.iter()
			.map(|&number| BlockRecord {
				number,
				extrinsics: vec![],
			})
			.collect()
	}

	#[test]
	fn parse_sorts_by_number() {
		let contents = r#"{"number":3,"extrinsics":[]}

{"number":1,"extrinsics":[]}
{"number":2,"extrinsics":[{"method":"system.remark","args":["0x00"],"hash":"0x01","signature":{"signer":"5Grw"}}]}
"#;
		let blocks = parse(contents).unwrap();
		let numbers = blocks.iter().map(|block| block.number).collect::<Vec<_>>();

		assert_eq!(numbers, vec![1, 2, 3]);
		assert_eq!(blocks[1].extrinsics[0].signer(), Some("5Grw"));
	}

	#[test]
	fn parse_reports_malformed_line() {
		let contents = "{\"number\":1,\"extrinsics\":[]}\n\n{\"number\":2}\n";
		let error = parse(contents).unwrap_err();

		assert!(matches!(error, Error::Parse { line: 3, .. }));
	}

	#[test]
	fn load_reads_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, r#"{{"number":2,"extrinsics":[]}}"#).unwrap();
		writeln!(file, r#"{{"number":1,"extrinsics":[]}}"#).unwrap();

		let blocks = load(file.path()).unwrap();
		assert_eq!(blocks[0].number, 1);
		assert_eq!(blocks[1].number, 2);
	}

	#[test]
	fn load_missing_file_fails() {
		let error = load("/nonexistent/transactions.db").unwrap_err();
		assert!(matches!(error, Error::Io { .. }));
	}

	#[test_case(&[] => None; "empty log")]
	#[test_case(&[1, 2, 3] => None; "contiguous")]
	#[test_case(&[1, 2, 4] => Some(3); "gap in the middle")]
	#[test_case(&[2, 3] => Some(1); "first block missing")]
	fn completeness(numbers: &[u32]) -> Option<u32> {
		match ensure_complete(&blocks(numbers)) {
			Ok(()) => None,
			Err(Error::Gap { missing }) => Some(missing),
			Err(error) => panic!("Unexpected error: {error}"),
		}
	}

	#[test]
	fn duplicate_block_is_rejected() {
		let error = ensure_complete(&blocks(&[1, 2, 2, 3])).unwrap_err();
		assert!(matches!(error, Error::DuplicateBlock { number: 2 }));
	}
}
