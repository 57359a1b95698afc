//! The dapp client core.
//!
//! Assembles the read batcher, transaction pipeline and receipt poller into
//! one client built from configuration. A host holding its own wallet
//! connection (e.g. a browser-injected provider adapted to
//! [`WalletInterface`]) uses [`DappClient::with_connection`] and feeds block
//! numbers through [`DappClient::advance_block`]; headless hosts use
//! [`DappClient::from_config`], which signs locally and watches chain heads
//! itself.

use dapp_abi::{AbiError, ContractInterface, DynSolValue};
use dapp_config::{Config, ConfigError};
use dapp_multicall::{Multicall3Caller, MulticallBatcher, MulticallError};
use dapp_pipeline::{GasEstimator, PipelineError, ReceiptPoller, TransactionPipeline};
use dapp_provider::{
	implementations::evm::alloy::create_http_wallet, spawn_block_watcher, BlockTicker,
	ConnectionRegistry, ConnectorKind, WalletError, WalletInterface,
};
use dapp_storage::{get_all_implementations, StorageError, TransactionStore};
use dapp_types::{
	Address, CallDescriptor, ClientEvent, EventBus, PendingRead, TransactionHash,
	TransactionRecord,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Errors surfaced by the client facade.
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Wallet error: {0}")]
	Wallet(#[from] WalletError),
	#[error("ABI error: {0}")]
	Abi(#[from] AbiError),
	#[error("Multicall error: {0}")]
	Multicall(#[from] MulticallError),
	#[error(transparent)]
	Pipeline(#[from] PipelineError),
}

/// The assembled client core.
pub struct DappClient {
	config: Config,
	registry: Arc<ConnectionRegistry>,
	store: Arc<TransactionStore>,
	events: EventBus,
	batcher: MulticallBatcher,
	pipeline: TransactionPipeline,
	tickers: HashMap<u64, Arc<BlockTicker>>,
	tasks: Vec<JoinHandle<()>>,
}

impl DappClient {
	/// Builds a client with a locally signed HTTP connection and a block
	/// watcher per configured chain.
	pub fn from_config(config: Config, private_key: &str) -> Result<Self, ClientError> {
		let wallet = create_http_wallet(&config.networks, private_key)?;
		let mut client = Self::with_connection(config, ConnectorKind::Network, wallet.clone())?;

		let interval = Duration::from_secs(client.config.poller.block_watch_interval_secs);
		for (chain_id, ticker) in &client.tickers {
			client.tasks.push(spawn_block_watcher(
				wallet.clone(),
				*chain_id,
				ticker.clone(),
				interval,
			));
		}
		Ok(client)
	}

	/// Builds a client around a host-supplied wallet connection.
	///
	/// No block watcher is spawned: the host is expected to feed observed
	/// block numbers through [`Self::advance_block`].
	pub fn with_connection(
		config: Config,
		kind: ConnectorKind,
		wallet: Arc<dyn WalletInterface>,
	) -> Result<Self, ClientError> {
		config.validate()?;

		let factory = get_all_implementations()
			.into_iter()
			.find(|(name, _)| *name == config.storage.backend)
			.map(|(_, factory)| factory)
			.ok_or_else(|| {
				ConfigError::Validation(format!(
					"Unknown storage backend: {}",
					config.storage.backend
				))
			})?;
		let store = Arc::new(TransactionStore::new(factory(&config.storage.config)?));

		let events = EventBus::default();
		let registry = Arc::new(ConnectionRegistry::new(kind, wallet.clone()));

		let tickers: HashMap<u64, Arc<BlockTicker>> = config
			.networks
			.keys()
			.map(|chain_id| (*chain_id, Arc::new(BlockTicker::new())))
			.collect();

		let aggregator = Arc::new(Multicall3Caller::new(wallet, &config.networks));
		let batcher = MulticallBatcher::new(
			aggregator,
			tickers
				.iter()
				.map(|(chain_id, ticker)| (*chain_id, ticker.subscribe()))
				.collect(),
			Duration::from_millis(config.multicall.quiescence_ms),
		);
		let mut tasks = batcher.spawn_block_flush();

		let pipeline = TransactionPipeline::new(
			registry.clone(),
			GasEstimator::new(&config.gas),
			store.clone(),
			events.clone(),
			config.client.expert_mode,
		);

		let poller = ReceiptPoller::new(
			registry.clone(),
			store.clone(),
			events.clone(),
			tickers.clone(),
			&config.poller,
		);
		tasks.extend(poller.spawn());

		tracing::info!(
			chains = config.networks.len(),
			backend = %config.storage.backend,
			"Client core started"
		);

		Ok(Self {
			config,
			registry,
			store,
			events,
			batcher,
			pipeline,
			tickers,
			tasks,
		})
	}

	/// Feeds a host-observed block number into the chain's ticker.
	///
	/// Returns whether the ticker advanced; stale numbers are ignored.
	pub fn advance_block(&self, chain_id: u64, block_number: u64) -> bool {
		self.tickers
			.get(&chain_id)
			.map(|ticker| ticker.advance(block_number))
			.unwrap_or(false)
	}

	/// Encodes, batches and decodes one contract read.
	///
	/// Resolves `Ok(None)` when the call reverted on-chain.
	pub async fn read(
		&self,
		chain_id: u64,
		target: Address,
		interface: &ContractInterface,
		method: &str,
		args: &[DynSolValue],
	) -> Result<Option<Vec<DynSolValue>>, ClientError> {
		let call_data = interface.encode(method, args)?;
		let read = PendingRead::new(chain_id, target, method, call_data);
		match self.batcher.schedule(read).await? {
			Some(bytes) => Ok(Some(interface.decode(method, &bytes)?)),
			None => Ok(None),
		}
	}

	/// Schedules an already-encoded read on the batcher.
	pub async fn read_raw(
		&self,
		read: PendingRead,
	) -> Result<Option<dapp_types::Bytes>, ClientError> {
		Ok(self.batcher.schedule(read).await?)
	}

	/// Submits a transaction using the configured permissive-mode default.
	pub async fn submit<F>(
		&self,
		summary: &str,
		chain_id: u64,
		from: Address,
		construct: F,
	) -> Result<TransactionHash, ClientError>
	where
		F: FnOnce() -> Result<CallDescriptor, AbiError>,
	{
		Ok(self.pipeline.submit(summary, chain_id, from, construct).await?)
	}

	/// Submits a transaction with an explicit permissive-mode override.
	pub async fn submit_with_mode<F>(
		&self,
		summary: &str,
		chain_id: u64,
		from: Address,
		permissive: bool,
		construct: F,
	) -> Result<TransactionHash, ClientError>
	where
		F: FnOnce() -> Result<CallDescriptor, AbiError>,
	{
		Ok(self
			.pipeline
			.submit_with_mode(summary, chain_id, from, permissive, construct)
			.await?)
	}

	/// Snapshot of transactions still awaiting a receipt.
	pub async fn pending(&self) -> Result<Vec<TransactionRecord>, ClientError> {
		Ok(self.store.pending().await?)
	}

	/// Snapshot of every tracked transaction.
	pub async fn transactions(&self) -> Result<Vec<TransactionRecord>, ClientError> {
		Ok(self.store.all().await?)
	}

	/// Looks up one tracked transaction.
	pub async fn transaction(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionRecord, ClientError> {
		Ok(self.store.get(hash).await?)
	}

	/// Stops tracking a transaction. An in-flight receipt check observes the
	/// removal and discards its result.
	pub async fn remove_transaction(&self, hash: &TransactionHash) -> Result<(), ClientError> {
		Ok(self.store.remove(hash).await?)
	}

	/// Subscribes to lifecycle events.
	pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
		self.events.subscribe()
	}

	/// Switches the active wallet connection.
	pub fn set_active_connector(&self, kind: ConnectorKind) -> Result<(), ClientError> {
		Ok(self.registry.set_active(kind)?)
	}

	/// The currently active connector kind.
	pub fn active_connector(&self) -> ConnectorKind {
		self.registry.active_kind()
	}

	/// Stops all background tasks.
	pub fn shutdown(self) {
		for task in &self.tasks {
			task.abort();
		}
		tracing::info!("Client core stopped");
	}
}
