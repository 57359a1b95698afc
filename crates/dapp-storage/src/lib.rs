//! Storage module for the dapp client core.
//!
//! This module provides the pending-transaction store and the key-value
//! abstractions underneath it, supporting different backend implementations
//! such as in-memory or file-based storage. The core does not expire or
//! evict records: a pending transaction stays tracked until a receipt is
//! attached or the host explicitly removes it.

use async_trait::async_trait;
use dapp_types::{ImplementationRegistry, TransactionHash, TransactionReceipt, TransactionRecord};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// This trait must be implemented by any storage backend that wants to hold
/// the pending-transaction store. It provides basic key-value operations
/// plus prefix enumeration, which the receipt poller relies on to walk the
/// pending set each cycle.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes under the given key, overwriting any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists all keys starting with the given prefix.
	async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Type alias for storage factory functions.
///
/// This is the function signature that all storage implementations must
/// provide to create instances of their storage interface.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage
/// backends, used by the client builder to resolve the configured backend.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Namespace prefix for transaction record keys.
const TX_NAMESPACE: &str = "transactions";

/// The pending-transaction store.
///
/// Wraps a key-value backend and provides typed operations over
/// [`TransactionRecord`]s keyed by transaction hash. This is the only
/// cross-component mutable shared state in the core: the pipeline adds
/// records on submission and the receipt poller advances them, with writes
/// keyed by hash so different records never conflict.
pub struct TransactionStore {
	backend: Box<dyn StorageInterface>,
}

impl TransactionStore {
	/// Creates a new store over the given backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(hash: &TransactionHash) -> String {
		format!("{}:{}", TX_NAMESPACE, hash)
	}

	fn encode(record: &TransactionRecord) -> Result<Vec<u8>, StorageError> {
		serde_json::to_vec(record).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	fn decode(bytes: &[u8]) -> Result<TransactionRecord, StorageError> {
		serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Adds a freshly submitted record.
	pub async fn add(&self, record: TransactionRecord) -> Result<(), StorageError> {
		let key = Self::key(&record.hash);
		self.backend.set_bytes(&key, Self::encode(&record)?).await
	}

	/// Retrieves a record by hash.
	pub async fn get(&self, hash: &TransactionHash) -> Result<TransactionRecord, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(hash)).await?;
		Self::decode(&bytes)
	}

	/// Whether a record exists for the hash.
	pub async fn contains(&self, hash: &TransactionHash) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(hash)).await
	}

	/// Removes a record. Any in-flight receipt check for it is expected to
	/// observe the removal and discard its result.
	pub async fn remove(&self, hash: &TransactionHash) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(hash)).await
	}

	/// Snapshot of every tracked record.
	pub async fn all(&self) -> Result<Vec<TransactionRecord>, StorageError> {
		let mut records = Vec::new();
		for key in self.backend.keys(TX_NAMESPACE).await? {
			match self.backend.get_bytes(&key).await {
				Ok(bytes) => records.push(Self::decode(&bytes)?),
				// Removed between enumeration and read; skip.
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(records)
	}

	/// Snapshot of records still awaiting a receipt.
	pub async fn pending(&self) -> Result<Vec<TransactionRecord>, StorageError> {
		Ok(self.all().await?.into_iter().filter(|r| r.is_pending()).collect())
	}

	/// Snapshot of pending records on one chain.
	pub async fn pending_on_chain(
		&self,
		chain_id: u64,
	) -> Result<Vec<TransactionRecord>, StorageError> {
		Ok(self
			.pending()
			.await?
			.into_iter()
			.filter(|r| r.chain_id == chain_id)
			.collect())
	}

	/// Advances `last_checked_block` for a pending record.
	///
	/// The value is monotone: an older block number than the one already
	/// recorded is ignored. Records with a receipt are terminal and never
	/// mutated.
	pub async fn mark_checked(
		&self,
		hash: &TransactionHash,
		block_number: u64,
	) -> Result<(), StorageError> {
		let mut record = self.get(hash).await?;
		if record.receipt.is_some() {
			return Ok(());
		}

		let advanced = record
			.last_checked_block
			.map_or(block_number, |last| last.max(block_number));
		record.last_checked_block = Some(advanced);
		self.backend
			.set_bytes(&Self::key(hash), Self::encode(&record)?)
			.await
	}

	/// Attaches a receipt, making the record terminal.
	///
	/// Returns `false` when the record already carried a receipt, in which
	/// case nothing is written.
	pub async fn attach_receipt(
		&self,
		hash: &TransactionHash,
		receipt: TransactionReceipt,
	) -> Result<bool, StorageError> {
		let mut record = self.get(hash).await?;
		if record.receipt.is_some() {
			return Ok(false);
		}

		let checked = record
			.last_checked_block
			.map_or(receipt.block_number, |last| last.max(receipt.block_number));
		record.last_checked_block = Some(checked);
		record.receipt = Some(receipt);
		self.backend
			.set_bytes(&Self::key(hash), Self::encode(&record)?)
			.await?;
		Ok(true)
	}
}
