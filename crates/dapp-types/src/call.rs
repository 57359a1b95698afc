//! Contract call descriptors and batched read requests.
//!
//! A [`CallDescriptor`] is the immutable output of call construction, produced
//! fresh per submission attempt. A [`PendingRead`] is a single view call
//! waiting inside a multicall aggregation window; its identity is the
//! deduplication key that lets identical reads share one aggregated leg.

use crate::{Address, Bytes, Transaction, U256};
use serde::{Deserialize, Serialize};

/// A fully constructed contract call ready for estimation and submission.
///
/// Construction failures are expressed through `Result` at the construction
/// seam rather than a variant inside the descriptor, so a descriptor that
/// exists is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDescriptor {
	/// Target contract address.
	pub to: Address,
	/// ABI-encoded calldata.
	pub data: Bytes,
	/// Native value attached to the call.
	pub value: U256,
}

impl CallDescriptor {
	/// Creates a descriptor with no attached value.
	pub fn new(to: Address, data: Bytes) -> Self {
		Self { to, data, value: U256::ZERO }
	}

	/// Creates a descriptor carrying native value.
	pub fn with_value(to: Address, data: Bytes, value: U256) -> Self {
		Self { to, data, value }
	}

	/// Converts the descriptor into a transaction envelope for submission.
	pub fn into_transaction(
		self,
		from: Address,
		gas_limit: Option<u64>,
		chain_id: u64,
	) -> Transaction {
		Transaction {
			from: Some(from),
			to: self.to,
			data: self.data,
			value: self.value,
			gas_limit,
			chain_id,
		}
	}
}

/// A single view call awaiting aggregation.
///
/// Lives only within one aggregation window; never persisted. The method
/// name is carried for diagnostics, its selector is already part of
/// `call_data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRead {
	/// Chain the read targets.
	pub chain_id: u64,
	/// Target contract address.
	pub target: Address,
	/// Method name, for logging only.
	pub method: String,
	/// Selector-prefixed encoded call.
	pub call_data: Bytes,
}

impl PendingRead {
	pub fn new(chain_id: u64, target: Address, method: impl Into<String>, call_data: Bytes) -> Self {
		Self { chain_id, target, method: method.into(), call_data }
	}

	/// Deduplication key: identical keys within one window share one leg.
	pub fn dedup_key(&self) -> ReadKey {
		ReadKey {
			chain_id: self.chain_id,
			target: self.target,
			call_data: self.call_data.to_vec(),
		}
	}
}

/// Identity of a read within an aggregation window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadKey {
	pub chain_id: u64,
	pub target: Address,
	pub call_data: Vec<u8>,
}
