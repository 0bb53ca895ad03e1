//! Replays extrinsics recorded on one chain onto another, under the sudo key of the target chain.
pub mod call;
pub mod error;
pub mod history;
pub mod migration;
pub mod network;
pub mod rewrap;
pub mod tracker;
pub mod types;
pub mod utils;
