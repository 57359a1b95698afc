//! Transaction types for the dapp client core.
//!
//! This module defines the transaction envelope handed to wallet providers,
//! transaction hashes and receipts, and the pending-transaction record that
//! the receipt poller drives from submission to confirmation.

use crate::{current_timestamp, truncate_id, with_0x_prefix, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Blockchain transaction hash.
///
/// Wraps the raw 32-byte hash; `Display` renders the canonical 0x-prefixed
/// hex form used as the store key for pending records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub B256);

impl TransactionHash {
	/// Truncated display form for noisy log lines.
	pub fn short(&self) -> String {
		truncate_id(&self.to_string())
	}
}

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", with_0x_prefix(&hex::encode(self.0.as_slice())))
	}
}

/// Transaction receipt containing execution details.
///
/// Provides information about a transaction after it has been included in a
/// block, including its success status and block number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub hash: TransactionHash,
	/// The block number where the transaction was included.
	pub block_number: u64,
	/// Whether the transaction executed successfully.
	pub success: bool,
}

/// Unsigned transaction envelope submitted through a wallet provider.
///
/// This is the chain-agnostic shape produced by the pipeline; the provider
/// implementation converts it into its native request type at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	/// Sender address, when known before signing.
	pub from: Option<Address>,
	/// Target contract address.
	pub to: Address,
	/// ABI-encoded calldata.
	pub data: Bytes,
	/// Native value attached to the call.
	pub value: U256,
	/// Gas limit, populated by the estimator before submission.
	pub gas_limit: Option<u64>,
	/// Chain the transaction is bound to.
	pub chain_id: u64,
}

/// Lifecycle status derived from a pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
	/// Submitted, no receipt yet.
	Pending,
	/// Receipt attached with on-chain success status.
	Confirmed,
	/// Receipt attached with on-chain failure status.
	Failed,
}

/// Record of a submitted transaction tracked by the pending-transaction store.
///
/// Created the instant a wallet returns a hash. The receipt poller advances
/// `last_checked_block` while the record is pending; once a receipt is
/// attached the record is terminal and never mutated again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
	/// Transaction hash, the record's identity.
	pub hash: TransactionHash,
	/// Chain the transaction was submitted on.
	pub chain_id: u64,
	/// Submitting account.
	pub from: Address,
	/// Human-readable description for UI rendering.
	pub summary: String,
	/// Unix timestamp of submission.
	pub added_time: u64,
	/// Latest block against which the poller checked this record.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_checked_block: Option<u64>,
	/// On-chain receipt once found. Terminal.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub receipt: Option<TransactionReceipt>,
}

impl TransactionRecord {
	/// Creates a fresh pending record stamped with the current time.
	pub fn new(hash: TransactionHash, chain_id: u64, from: Address, summary: String) -> Self {
		Self {
			hash,
			chain_id,
			from,
			summary,
			added_time: current_timestamp(),
			last_checked_block: None,
			receipt: None,
		}
	}

	/// Whether the record is still awaiting a receipt.
	pub fn is_pending(&self) -> bool {
		self.receipt.is_none()
	}

	/// How long the record has been pending as of `now_secs`.
	pub fn pending_for(&self, now_secs: u64) -> Duration {
		Duration::from_secs(now_secs.saturating_sub(self.added_time))
	}

	/// Current lifecycle status.
	pub fn status(&self) -> TransactionStatus {
		match &self.receipt {
			None => TransactionStatus::Pending,
			Some(receipt) if receipt.success => TransactionStatus::Confirmed,
			Some(_) => TransactionStatus::Failed,
		}
	}
}
