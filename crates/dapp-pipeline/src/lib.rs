//! Transaction pipeline for the dapp client core.
//!
//! Carries a write from call construction through gas estimation, wallet
//! submission and pending-record tracking. Construction happens inside the
//! pipeline via a closure so a malformed call fails before any wallet
//! prompt, and a user declining the wallet prompt is a first-class outcome
//! rather than an error buried in provider strings. The companion
//! [`poller::ReceiptPoller`] drives submitted transactions to their
//! terminal receipt.

use dapp_abi::AbiError;
use dapp_provider::{ConnectionRegistry, WalletError};
use dapp_storage::{StorageError, TransactionStore};
use dapp_types::{
	Address, CallDescriptor, ClientEvent, EventBus, TransactionEvent, TransactionHash,
	TransactionRecord,
};
use std::sync::Arc;
use thiserror::Error;

pub mod estimator;
pub mod poller;

pub use estimator::{GasError, GasEstimator};
pub use poller::{should_check, ReceiptPoller};

/// Errors that can occur in the submission pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
	/// Call construction failed; nothing was sent anywhere.
	#[error("Call construction failed: {0}")]
	Construction(#[from] AbiError),
	/// Gas estimation refused the transaction.
	#[error(transparent)]
	Gas(GasError),
	/// The user declined the request in their wallet. Hosts surface this
	/// quietly; it is not a system fault.
	#[error("User rejected the request")]
	UserRejected,
	/// The wallet accepted the prompt but submission failed.
	#[error("Submission failed: {0}")]
	Submission(String),
	/// The pending-transaction store failed after submission.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// The write path: construct, estimate, submit, track.
pub struct TransactionPipeline {
	registry: Arc<ConnectionRegistry>,
	estimator: GasEstimator,
	store: Arc<TransactionStore>,
	events: EventBus,
	/// Default permissive-mode flag, overridable per submission.
	permissive: bool,
}

impl TransactionPipeline {
	pub fn new(
		registry: Arc<ConnectionRegistry>,
		estimator: GasEstimator,
		store: Arc<TransactionStore>,
		events: EventBus,
		permissive: bool,
	) -> Self {
		Self { registry, estimator, store, events, permissive }
	}

	/// Submits a transaction using the pipeline's default mode.
	pub async fn submit<F>(
		&self,
		summary: &str,
		chain_id: u64,
		from: Address,
		construct: F,
	) -> Result<TransactionHash, PipelineError>
	where
		F: FnOnce() -> Result<CallDescriptor, AbiError>,
	{
		self.submit_with_mode(summary, chain_id, from, self.permissive, construct)
			.await
	}

	/// Submits a transaction with an explicit permissive-mode override.
	///
	/// Returns the hash once the wallet has accepted the transaction and the
	/// pending record is tracked. A rejection or estimation failure leaves
	/// the store untouched.
	pub async fn submit_with_mode<F>(
		&self,
		summary: &str,
		chain_id: u64,
		from: Address,
		permissive: bool,
		construct: F,
	) -> Result<TransactionHash, PipelineError>
	where
		F: FnOnce() -> Result<CallDescriptor, AbiError>,
	{
		let descriptor = construct()?;
		let wallet = self.registry.active();

		let probe = descriptor.clone().into_transaction(from, None, chain_id);
		let gas_limit = self
			.estimator
			.estimate(wallet.as_ref(), &probe, permissive)
			.await
			.map_err(|e| match e {
				GasError::Rejected => PipelineError::UserRejected,
				other => PipelineError::Gas(other),
			})?;

		let tx = descriptor.into_transaction(from, Some(gas_limit), chain_id);
		let hash = match wallet.send_transaction(&tx).await {
			Ok(hash) => hash,
			Err(WalletError::Rejected) => return Err(PipelineError::UserRejected),
			Err(e) => return Err(PipelineError::Submission(e.to_string())),
		};

		let record = TransactionRecord::new(hash, chain_id, from, summary.to_string());
		self.store.add(record).await?;

		tracing::info!(tx_hash = %hash, chain_id, summary, gas_limit, "Transaction submitted");
		let _ = self
			.events
			.publish(ClientEvent::Transaction(TransactionEvent::Submitted {
				hash,
				chain_id,
				summary: summary.to_string(),
			}));

		Ok(hash)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use dapp_config::{GasConfig, PollerConfig};
	use dapp_provider::{BlockTicker, ConnectorKind, WalletInterface};
	use dapp_storage::implementations::memory::MemoryStorage;
	use dapp_types::{Bytes, Transaction, TransactionReceipt, B256};
	use std::collections::{HashMap, VecDeque};
	use std::sync::Mutex;
	use std::time::Duration;
	use tokio::sync::Notify;

	/// Wallet answering each operation from a scripted queue; an empty queue
	/// means the operation was not expected.
	#[derive(Default)]
	struct ScriptedWallet {
		estimates: Mutex<VecDeque<Result<u64, WalletError>>>,
		calls: Mutex<VecDeque<Result<Bytes, WalletError>>>,
		sends: Mutex<VecDeque<Result<TransactionHash, WalletError>>>,
		receipts: Mutex<VecDeque<Result<Option<TransactionReceipt>, WalletError>>>,
		sent: Mutex<Vec<Transaction>>,
	}

	#[async_trait]
	impl WalletInterface for ScriptedWallet {
		async fn estimate_gas(&self, _tx: &Transaction) -> Result<u64, WalletError> {
			self.estimates.lock().unwrap().pop_front().expect("unexpected estimate_gas")
		}

		async fn call(&self, _tx: &Transaction) -> Result<Bytes, WalletError> {
			self.calls.lock().unwrap().pop_front().expect("unexpected call")
		}

		async fn send_transaction(&self, tx: &Transaction) -> Result<TransactionHash, WalletError> {
			self.sent.lock().unwrap().push(tx.clone());
			self.sends.lock().unwrap().pop_front().expect("unexpected send_transaction")
		}

		async fn get_transaction_receipt(
			&self,
			_hash: &TransactionHash,
			_chain_id: u64,
		) -> Result<Option<TransactionReceipt>, WalletError> {
			self.receipts.lock().unwrap().pop_front().expect("unexpected receipt fetch")
		}

		async fn get_block_number(&self, _chain_id: u64) -> Result<u64, WalletError> {
			Ok(0)
		}
	}

	fn harness(wallet: ScriptedWallet) -> (TransactionPipeline, Arc<TransactionStore>, EventBus) {
		let registry = Arc::new(ConnectionRegistry::new(
			ConnectorKind::Network,
			Arc::new(wallet),
		));
		let store = Arc::new(TransactionStore::new(Box::new(MemoryStorage::new())));
		let events = EventBus::default();
		let pipeline = TransactionPipeline::new(
			registry,
			GasEstimator::new(&GasConfig::default()),
			store.clone(),
			events.clone(),
			false,
		);
		(pipeline, store, events)
	}

	fn from_address() -> Address {
		dapp_types::Address::repeat_byte(0xaa)
	}

	fn descriptor() -> CallDescriptor {
		CallDescriptor::new(
			dapp_types::Address::repeat_byte(0xbb),
			Bytes::from(vec![0xde, 0xad]),
		)
	}

	fn hash(byte: u8) -> TransactionHash {
		TransactionHash(B256::repeat_byte(byte))
	}

	#[tokio::test]
	async fn successful_submission_tracks_and_announces() {
		let wallet = ScriptedWallet::default();
		wallet.estimates.lock().unwrap().push_back(Ok(100_000));
		wallet.sends.lock().unwrap().push_back(Ok(hash(1)));
		let (pipeline, store, events) = harness(wallet);
		let mut subscription = events.subscribe();

		let submitted = pipeline
			.submit("Approve DEI", 250, from_address(), || Ok(descriptor()))
			.await
			.unwrap();

		assert_eq!(submitted, hash(1));
		let record = store.get(&submitted).await.unwrap();
		assert!(record.is_pending());
		assert_eq!(record.summary, "Approve DEI");
		assert!(matches!(
			subscription.recv().await.unwrap(),
			ClientEvent::Transaction(TransactionEvent::Submitted { chain_id: 250, .. })
		));
	}

	#[tokio::test]
	async fn gas_limit_carries_the_safety_margin() {
		let wallet = Arc::new(ScriptedWallet::default());
		wallet.estimates.lock().unwrap().push_back(Ok(100_000));
		wallet.sends.lock().unwrap().push_back(Ok(hash(2)));
		let registry = Arc::new(ConnectionRegistry::new(
			ConnectorKind::Network,
			wallet.clone(),
		));
		let store = Arc::new(TransactionStore::new(Box::new(MemoryStorage::new())));
		let pipeline = TransactionPipeline::new(
			registry,
			GasEstimator::new(&GasConfig::default()),
			store,
			EventBus::default(),
			false,
		);

		pipeline
			.submit("Swap", 250, from_address(), || Ok(descriptor()))
			.await
			.unwrap();

		// 100_000 estimate padded by the default 20% margin.
		let sent = wallet.sent.lock().unwrap();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].gas_limit, Some(120_000));
		assert_eq!(sent[0].from, Some(from_address()));
	}

	#[tokio::test]
	async fn construction_failure_never_reaches_the_wallet() {
		// Empty scripts: any wallet interaction would panic.
		let (pipeline, store, _events) = harness(ScriptedWallet::default());

		let result = pipeline
			.submit("Broken", 250, from_address(), || {
				Err(AbiError::UnknownMethod("mint".to_string()))
			})
			.await;

		assert!(matches!(result, Err(PipelineError::Construction(_))));
		assert!(store.pending().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn user_rejection_is_quiet_and_leaves_no_record() {
		let wallet = ScriptedWallet::default();
		wallet.estimates.lock().unwrap().push_back(Ok(80_000));
		wallet
			.sends
			.lock()
			.unwrap()
			.push_back(Err(WalletError::from_rpc_parts(
				Some(4001),
				"User rejected the request.".to_string(),
				None,
			)));
		let (pipeline, store, _events) = harness(wallet);

		let result = pipeline
			.submit("Swap", 250, from_address(), || Ok(descriptor()))
			.await;

		assert!(matches!(result, Err(PipelineError::UserRejected)));
		assert!(store.pending().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn estimation_revert_surfaces_the_reason() {
		let revert = WalletError::Rpc {
			code: Some(-32000),
			message: "execution reverted: DEIPool: COLLATERAL_COLLECTION_DELAY".to_string(),
			data: None,
		};
		let simulated = WalletError::Rpc {
			code: Some(-32000),
			message: "execution reverted: DEIPool: COLLATERAL_COLLECTION_DELAY".to_string(),
			data: None,
		};
		let wallet = ScriptedWallet::default();
		wallet.estimates.lock().unwrap().push_back(Err(revert));
		wallet.calls.lock().unwrap().push_back(Err(simulated));
		let (pipeline, store, _events) = harness(wallet);

		let result = pipeline
			.submit("Redeem", 250, from_address(), || Ok(descriptor()))
			.await;

		match result {
			Err(PipelineError::Gas(GasError::Estimation { reason })) => {
				assert_eq!(reason.as_deref(), Some("DEIPool: COLLATERAL_COLLECTION_DELAY"));
			},
			other => panic!("unexpected outcome: {:?}", other),
		}
		assert!(store.pending().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn estimation_anomaly_is_distinguished_from_reverts() {
		let wallet = ScriptedWallet::default();
		wallet.estimates.lock().unwrap().push_back(Err(WalletError::Rpc {
			code: Some(-32000),
			message: "gas required exceeds allowance".to_string(),
			data: None,
		}));
		wallet.calls.lock().unwrap().push_back(Ok(Bytes::new()));
		let (pipeline, _store, _events) = harness(wallet);

		let result = pipeline
			.submit("Swap", 250, from_address(), || Ok(descriptor()))
			.await;
		assert!(matches!(result, Err(PipelineError::Gas(GasError::Anomaly))));
	}

	#[tokio::test]
	async fn permissive_mode_submits_with_the_fallback_ceiling() {
		let wallet = ScriptedWallet::default();
		wallet.estimates.lock().unwrap().push_back(Err(WalletError::Rpc {
			code: Some(-32000),
			message: "execution reverted".to_string(),
			data: None,
		}));
		wallet.calls.lock().unwrap().push_back(Err(WalletError::Rpc {
			code: Some(-32000),
			message: "execution reverted".to_string(),
			data: None,
		}));
		wallet.sends.lock().unwrap().push_back(Ok(hash(3)));

		let registry = Arc::new(ConnectionRegistry::new(
			ConnectorKind::Network,
			Arc::new(wallet),
		));
		let store = Arc::new(TransactionStore::new(Box::new(MemoryStorage::new())));
		let pipeline = TransactionPipeline::new(
			registry,
			GasEstimator::new(&GasConfig::default()),
			store.clone(),
			EventBus::default(),
			false,
		);

		let submitted = pipeline
			.submit_with_mode("Swap", 250, from_address(), true, || Ok(descriptor()))
			.await
			.unwrap();
		assert_eq!(submitted, hash(3));
		assert_eq!(store.pending().await.unwrap().len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn poller_confirms_and_fast_forwards_the_ticker() {
		let wallet = ScriptedWallet::default();
		wallet.estimates.lock().unwrap().push_back(Ok(100_000));
		wallet.sends.lock().unwrap().push_back(Ok(hash(4)));
		// First fetch fails transiently, second finds the receipt.
		wallet.receipts.lock().unwrap().push_back(Err(WalletError::Network(
			"connection reset".to_string(),
		)));
		wallet.receipts.lock().unwrap().push_back(Ok(Some(TransactionReceipt {
			hash: hash(4),
			block_number: 130,
			success: true,
		})));

		let registry = Arc::new(ConnectionRegistry::new(
			ConnectorKind::Network,
			Arc::new(wallet),
		));
		let store = Arc::new(TransactionStore::new(Box::new(MemoryStorage::new())));
		let events = EventBus::default();
		let pipeline = TransactionPipeline::new(
			registry.clone(),
			GasEstimator::new(&GasConfig::default()),
			store.clone(),
			events.clone(),
			false,
		);
		pipeline
			.submit("Swap", 250, from_address(), || Ok(descriptor()))
			.await
			.unwrap();

		let ticker = Arc::new(BlockTicker::new());
		ticker.advance(100);
		let mut tickers = HashMap::new();
		tickers.insert(250u64, ticker.clone());
		let poller = ReceiptPoller::new(
			registry,
			store.clone(),
			events.clone(),
			tickers,
			&PollerConfig::default(),
		);
		let mut subscription = events.subscribe();

		poller.poll_cycle(250, 100).await;
		// The check runs in a spawned task; paused time lets the retry sleep
		// resolve immediately.
		let event = subscription.recv().await.unwrap();
		assert!(matches!(
			event,
			ClientEvent::Transaction(TransactionEvent::Confirmed { .. })
		));

		let record = store.get(&hash(4)).await.unwrap();
		assert!(!record.is_pending());
		assert_eq!(record.receipt.as_ref().unwrap().block_number, 130);
		// The receipt's block fast-forwards the ticker past the polled head.
		assert_eq!(ticker.latest(), 130);
	}

	#[tokio::test]
	async fn poller_marks_unmined_records_checked() {
		let wallet = ScriptedWallet::default();
		wallet.estimates.lock().unwrap().push_back(Ok(100_000));
		wallet.sends.lock().unwrap().push_back(Ok(hash(5)));
		wallet.receipts.lock().unwrap().push_back(Ok(None));

		let registry = Arc::new(ConnectionRegistry::new(
			ConnectorKind::Network,
			Arc::new(wallet),
		));
		let store = Arc::new(TransactionStore::new(Box::new(MemoryStorage::new())));
		let events = EventBus::default();
		let pipeline = TransactionPipeline::new(
			registry.clone(),
			GasEstimator::new(&GasConfig::default()),
			store.clone(),
			events.clone(),
			false,
		);
		pipeline
			.submit("Swap", 250, from_address(), || Ok(descriptor()))
			.await
			.unwrap();

		let poller = ReceiptPoller::new(
			registry,
			store.clone(),
			events,
			HashMap::new(),
			&PollerConfig::default(),
		);
		poller.poll_cycle(250, 120).await;

		// Wait for the spawned check to land its watermark.
		let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
		loop {
			let record = store.get(&hash(5)).await.unwrap();
			if record.last_checked_block == Some(120) {
				assert!(record.is_pending());
				break;
			}
			assert!(tokio::time::Instant::now() < deadline, "watermark never advanced");
			tokio::task::yield_now().await;
		}
	}

	#[tokio::test]
	async fn transport_failures_fall_back_in_permissive_mode() {
		let wallet = Arc::new(ScriptedWallet::default());
		wallet.estimates.lock().unwrap().push_back(Err(WalletError::Network(
			"connection refused".to_string(),
		)));
		wallet.calls.lock().unwrap().push_back(Err(WalletError::Network(
			"connection refused".to_string(),
		)));
		wallet.sends.lock().unwrap().push_back(Ok(hash(7)));
		let registry = Arc::new(ConnectionRegistry::new(
			ConnectorKind::Network,
			wallet.clone(),
		));
		let store = Arc::new(TransactionStore::new(Box::new(MemoryStorage::new())));
		let pipeline = TransactionPipeline::new(
			registry,
			GasEstimator::new(&GasConfig::default()),
			store,
			EventBus::default(),
			false,
		);

		pipeline
			.submit_with_mode("Swap", 250, from_address(), true, || Ok(descriptor()))
			.await
			.unwrap();

		let sent = wallet.sent.lock().unwrap();
		assert_eq!(sent[0].gas_limit, Some(500_000));
	}

	#[tokio::test]
	async fn transport_failures_stay_wallet_errors_in_strict_mode() {
		let wallet = ScriptedWallet::default();
		wallet.estimates.lock().unwrap().push_back(Err(WalletError::Network(
			"connection refused".to_string(),
		)));
		wallet.calls.lock().unwrap().push_back(Err(WalletError::Network(
			"connection refused".to_string(),
		)));
		let (pipeline, store, _events) = harness(wallet);

		let result = pipeline
			.submit("Swap", 250, from_address(), || Ok(descriptor()))
			.await;
		assert!(matches!(
			result,
			Err(PipelineError::Gas(GasError::Wallet(WalletError::Network(_))))
		));
		assert!(store.pending().await.unwrap().is_empty());
	}

	/// Blocks the receipt fetch until released, so the test can remove the
	/// record while the check is in flight.
	struct GatedWallet {
		started: Arc<Notify>,
		release: Arc<Notify>,
		receipt: TransactionReceipt,
	}

	#[async_trait]
	impl WalletInterface for GatedWallet {
		async fn estimate_gas(&self, _tx: &Transaction) -> Result<u64, WalletError> {
			unimplemented!("not used")
		}

		async fn call(&self, _tx: &Transaction) -> Result<Bytes, WalletError> {
			unimplemented!("not used")
		}

		async fn send_transaction(&self, _tx: &Transaction) -> Result<TransactionHash, WalletError> {
			unimplemented!("not used")
		}

		async fn get_transaction_receipt(
			&self,
			_hash: &TransactionHash,
			_chain_id: u64,
		) -> Result<Option<TransactionReceipt>, WalletError> {
			self.started.notify_one();
			self.release.notified().await;
			Ok(Some(self.receipt.clone()))
		}

		async fn get_block_number(&self, _chain_id: u64) -> Result<u64, WalletError> {
			Ok(0)
		}
	}

	#[tokio::test]
	async fn removed_record_discards_its_inflight_receipt() {
		let started = Arc::new(Notify::new());
		let release = Arc::new(Notify::new());
		let wallet = Arc::new(GatedWallet {
			started: started.clone(),
			release: release.clone(),
			receipt: TransactionReceipt {
				hash: hash(8),
				block_number: 140,
				success: true,
			},
		});
		let registry = Arc::new(ConnectionRegistry::new(ConnectorKind::Network, wallet));
		let store = Arc::new(TransactionStore::new(Box::new(MemoryStorage::new())));
		let events = EventBus::default();
		store
			.add(TransactionRecord::new(
				hash(8),
				250,
				from_address(),
				"Swap".to_string(),
			))
			.await
			.unwrap();

		let poller = ReceiptPoller::new(
			registry,
			store.clone(),
			events.clone(),
			HashMap::new(),
			&PollerConfig::default(),
		);
		let mut subscription = events.subscribe();

		poller.poll_cycle(250, 100).await;
		started.notified().await;

		// The host stops tracking the record while the fetch is in flight;
		// the next cycle cancels the check.
		store.remove(&hash(8)).await.unwrap();
		poller.poll_cycle(250, 101).await;

		release.notify_one();

		// The late receipt is discarded: no record comes back, no terminal
		// event fires.
		assert!(
			tokio::time::timeout(Duration::from_millis(100), subscription.recv())
				.await
				.is_err()
		);
		assert!(!store.contains(&hash(8)).await.unwrap());
		assert!(store.all().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn poller_skips_records_checked_at_the_current_block() {
		// Empty receipt script: a fetch would panic.
		let wallet = ScriptedWallet::default();
		let registry = Arc::new(ConnectionRegistry::new(
			ConnectorKind::Network,
			Arc::new(wallet),
		));
		let store = Arc::new(TransactionStore::new(Box::new(MemoryStorage::new())));
		let mut record = TransactionRecord::new(
			hash(6),
			250,
			from_address(),
			"Swap".to_string(),
		);
		record.last_checked_block = Some(120);
		store.add(record).await.unwrap();

		let poller = ReceiptPoller::new(
			registry,
			store,
			EventBus::default(),
			HashMap::new(),
			&PollerConfig::default(),
		);
		poller.poll_cycle(250, 120).await;
		tokio::task::yield_now().await;
	}
}
