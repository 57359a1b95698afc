//! Network configuration types for multi-chain client operations.
//!
//! This module defines the configuration structures for network-specific
//! settings: RPC URLs, multicall aggregator overrides, wrapped-native
//! contracts and supported tokens across different chains.

use crate::Address;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Configuration for a token on a specific network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TokenConfig {
	pub address: Address,
	pub symbol: String,
	pub decimals: u8,
}

/// Configuration for a single blockchain network.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// The HTTP(S) RPC endpoint for the chain.
	pub rpc_url: String,
	/// Multicall aggregator address; defaults to the canonical Multicall3
	/// deployment when absent.
	#[serde(default)]
	pub multicall_address: Option<Address>,
	/// Wrapped-native token contract (WETH, WFTM, ...), if deployed.
	#[serde(default)]
	pub wrapped_native: Option<Address>,
	/// Tokens the client knows about on this network.
	#[serde(default)]
	pub tokens: Vec<TokenConfig>,
}

/// Networks configuration mapping chain IDs to their configurations.
pub type NetworksConfig = HashMap<u64, NetworkConfig>;

/// Helper function to deserialize network configurations from TOML.
///
/// Chain IDs arrive as string keys (TOML tables have no numeric keys) and
/// are converted to `u64` for internal use.
pub fn deserialize_networks<'de, D>(deserializer: D) -> Result<NetworksConfig, D::Error>
where
	D: Deserializer<'de>,
{
	let string_map: HashMap<String, NetworkConfig> = HashMap::deserialize(deserializer)?;
	let mut result = HashMap::new();

	for (key, value) in string_map {
		let chain_id = key
			.parse::<u64>()
			.map_err(|e| serde::de::Error::custom(format!("Invalid chain_id '{}': {}", key, e)))?;
		result.insert(chain_id, value);
	}

	Ok(result)
}
