//! Currency representation for native and ERC-20 assets.
//!
//! Native currencies and tokens are one tagged type rather than a class
//! hierarchy; wrapping behavior is a pure function over the network
//! configuration instead of a virtual override.

use crate::{Address, NetworksConfig};
use serde::{Deserialize, Serialize};

/// An asset the client can hold, approve or swap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
	/// The chain's native currency (ETH, FTM, ...).
	Native {
		chain_id: u64,
	},
	/// An ERC-20 token contract.
	Erc20 {
		chain_id: u64,
		address: Address,
		decimals: u8,
		symbol: String,
	},
}

impl Currency {
	/// Chain this currency lives on.
	pub fn chain_id(&self) -> u64 {
		match self {
			Currency::Native { chain_id } => *chain_id,
			Currency::Erc20 { chain_id, .. } => *chain_id,
		}
	}

	pub fn is_native(&self) -> bool {
		matches!(self, Currency::Native { .. })
	}

	/// Decimal places; native currencies are 18 on every supported chain.
	pub fn decimals(&self) -> u8 {
		match self {
			Currency::Native { .. } => 18,
			Currency::Erc20 { decimals, .. } => *decimals,
		}
	}
}

/// Resolves the on-chain address a currency is addressed by in contract calls.
///
/// ERC-20 tokens are their own address; the native currency resolves to the
/// configured wrapped-native contract for its chain, or `None` if the chain
/// has no wrapper configured.
pub fn wrapped_address_of(currency: &Currency, networks: &NetworksConfig) -> Option<Address> {
	match currency {
		Currency::Erc20 { address, .. } => Some(*address),
		Currency::Native { chain_id } => {
			networks.get(chain_id).and_then(|network| network.wrapped_native)
		},
	}
}
