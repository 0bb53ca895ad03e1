//! Target chain client over the node JSON-RPC interface.
mod client;
pub mod configuration;
mod encoder;

pub use client::Client;
pub use encoder::{CallEncoder, ValueBuilder};
