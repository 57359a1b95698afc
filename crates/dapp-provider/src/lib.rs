//! Wallet provider module for the dapp client core.
//!
//! This module defines the capability surface the core consumes from a
//! wallet: gas estimation, read-only calls, transaction submission and
//! receipt retrieval. Concrete connections (an injected browser wallet, a
//! plain RPC node, a locally signed HTTP provider) live behind the
//! [`WalletInterface`] trait and are selected through the
//! [`ConnectionRegistry`] instead of ambient globals. The [`BlockTicker`]
//! carries the latest observed block number to every component that reacts
//! to new blocks.

use async_trait::async_trait;
use dapp_types::{Bytes, Transaction, TransactionHash, TransactionReceipt};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

/// EIP-1193 error code emitted when the user declines a wallet prompt.
pub const USER_REJECTED_CODE: i64 = 4001;

/// Errors that can occur during wallet provider operations.
#[derive(Debug, Error)]
pub enum WalletError {
	/// The user declined the request in their wallet. Load-bearing: the
	/// pipeline treats this as a normal outcome, never a system error.
	#[error("User rejected the request")]
	Rejected,
	/// A JSON-RPC level error, with the revert payload when the node
	/// supplied one.
	#[error("RPC error: {message}")]
	Rpc {
		code: Option<i64>,
		message: String,
		data: Option<String>,
	},
	/// Transport or connectivity failure.
	#[error("Network error: {0}")]
	Network(String),
	/// No provider configured for the requested chain.
	#[error("No wallet configured for chain {0}")]
	UnknownChain(u64),
	/// No connection registered under the requested connector kind.
	#[error("No connection registered for connector {0:?}")]
	UnknownConnector(ConnectorKind),
}

impl WalletError {
	/// Builds a wallet error from JSON-RPC error parts, classifying user
	/// rejection by its well-known code or message markers.
	pub fn from_rpc_parts(code: Option<i64>, message: String, data: Option<String>) -> Self {
		let rejected = code == Some(USER_REJECTED_CODE)
			|| message.contains("ACTION_REJECTED")
			|| message.contains("User denied");
		if rejected {
			WalletError::Rejected
		} else {
			WalletError::Rpc { code, message, data }
		}
	}

	pub fn is_user_rejection(&self) -> bool {
		matches!(self, WalletError::Rejected)
	}

	/// The raw revert payload attached by the node, when present.
	pub fn revert_data(&self) -> Option<&str> {
		match self {
			WalletError::Rpc { data, .. } => data.as_deref(),
			_ => None,
		}
	}
}

/// Trait defining the wallet capability consumed by the core.
///
/// All operations are asynchronous and may fail with provider-specific
/// errors; implementations must map user rejection onto
/// [`WalletError::Rejected`].
#[async_trait]
pub trait WalletInterface: Send + Sync {
	/// Estimates gas for the given transaction.
	async fn estimate_gas(&self, tx: &Transaction) -> Result<u64, WalletError>;

	/// Executes the transaction read-only against latest state.
	async fn call(&self, tx: &Transaction) -> Result<Bytes, WalletError>;

	/// Signs and submits the transaction, returning its hash.
	async fn send_transaction(&self, tx: &Transaction) -> Result<TransactionHash, WalletError>;

	/// Fetches the receipt for a transaction, `None` while unmined.
	async fn get_transaction_receipt(
		&self,
		hash: &TransactionHash,
		chain_id: u64,
	) -> Result<Option<TransactionReceipt>, WalletError>;

	/// Latest block number on the given chain.
	async fn get_block_number(&self, chain_id: u64) -> Result<u64, WalletError>;
}

/// Kinds of wallet connections the client can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ConnectorKind {
	/// Browser-injected wallet (MetaMask and friends).
	Injected,
	/// WalletConnect session.
	WalletConnect,
	/// Read/write connection to a plain RPC node with a local signer.
	Network,
}

/// Registry mapping connector kinds to wallet capabilities.
///
/// Constructed once at startup and passed by reference; replaces
/// module-level provider singletons. One connector is active at a time and
/// serves all signing traffic, while read paths may address any registered
/// connection directly.
pub struct ConnectionRegistry {
	connections: HashMap<ConnectorKind, Arc<dyn WalletInterface>>,
	active: RwLock<ConnectorKind>,
}

impl ConnectionRegistry {
	/// Creates a registry with its initial (and active) connection.
	pub fn new(kind: ConnectorKind, wallet: Arc<dyn WalletInterface>) -> Self {
		let mut connections = HashMap::new();
		connections.insert(kind, wallet);
		Self {
			connections,
			active: RwLock::new(kind),
		}
	}

	/// Registers an additional connection.
	pub fn register(&mut self, kind: ConnectorKind, wallet: Arc<dyn WalletInterface>) {
		self.connections.insert(kind, wallet);
	}

	/// Looks up a connection by kind.
	pub fn get(&self, kind: ConnectorKind) -> Option<Arc<dyn WalletInterface>> {
		self.connections.get(&kind).cloned()
	}

	/// The currently active connection.
	pub fn active(&self) -> Arc<dyn WalletInterface> {
		let kind = *self.active.read().expect("registry lock poisoned");
		self.connections
			.get(&kind)
			.cloned()
			.expect("active connector always registered")
	}

	/// The currently active connector kind.
	pub fn active_kind(&self) -> ConnectorKind {
		*self.active.read().expect("registry lock poisoned")
	}

	/// Switches the active connection.
	pub fn set_active(&self, kind: ConnectorKind) -> Result<(), WalletError> {
		if !self.connections.contains_key(&kind) {
			return Err(WalletError::UnknownConnector(kind));
		}
		*self.active.write().expect("registry lock poisoned") = kind;
		Ok(())
	}
}

/// Block-number ticker for one chain.
///
/// A forward-only watch channel: `advance` publishes a block number only
/// when it exceeds the last observed one, so subscribers see each increase
/// exactly once and missed intermediate numbers are irrelevant.
#[derive(Debug)]
pub struct BlockTicker {
	sender: watch::Sender<u64>,
}

impl BlockTicker {
	pub fn new() -> Self {
		let (sender, _) = watch::channel(0);
		Self { sender }
	}

	/// Subscribes to block advances.
	pub fn subscribe(&self) -> watch::Receiver<u64> {
		self.sender.subscribe()
	}

	/// Latest observed block number.
	pub fn latest(&self) -> u64 {
		*self.sender.borrow()
	}

	/// Publishes a new block number if it advances the ticker. Returns
	/// whether subscribers were notified.
	pub fn advance(&self, block_number: u64) -> bool {
		self.sender.send_if_modified(|current| {
			if block_number > *current {
				*current = block_number;
				true
			} else {
				false
			}
		})
	}
}

impl Default for BlockTicker {
	fn default() -> Self {
		Self::new()
	}
}

/// Spawns a task polling the chain head and feeding the ticker.
///
/// Hosts that already receive block events (e.g. from an injected provider)
/// can skip this and call [`BlockTicker::advance`] directly.
pub fn spawn_block_watcher(
	wallet: Arc<dyn WalletInterface>,
	chain_id: u64,
	ticker: Arc<BlockTicker>,
	interval: Duration,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			match wallet.get_block_number(chain_id).await {
				Ok(block_number) => {
					if ticker.advance(block_number) {
						tracing::trace!(chain_id, block_number, "Observed new block");
					}
				},
				Err(e) => {
					tracing::debug!(chain_id, error = %e, "Block number poll failed");
				},
			}
			tokio::time::sleep(interval).await;
		}
	})
}
