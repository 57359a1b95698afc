//! Adaptive receipt polling.
//!
//! One task per chain wakes on every block tick and walks the pending set.
//! Each record carries the block against which it was last checked; the
//! cadence slows as a transaction stays pending, so a record stuck for an
//! hour is checked roughly every tenth block instead of every block. Receipt
//! fetches retry transient failures a bounded number of times, and checks in
//! flight for records the host removed are cancelled before they can write.

use dapp_config::PollerConfig;
use dapp_provider::{BlockTicker, ConnectionRegistry};
use dapp_storage::{StorageError, TransactionStore};
use dapp_types::{
	current_timestamp, ClientEvent, EventBus, TransactionEvent, TransactionHash,
	TransactionReceipt, TransactionRecord,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Pending longer than this slows the cadence to every third block.
const SLOW_AFTER: Duration = Duration::from_secs(5 * 60);
/// Pending longer than this slows the cadence to every tenth block.
const SLOWEST_AFTER: Duration = Duration::from_secs(60 * 60);

/// Whether a pending record is due for a receipt check at `latest_block`.
///
/// Terminal records are never checked. A record never checked before is
/// always due; afterwards the required block gap grows with how long the
/// record has been pending.
pub fn should_check(record: &TransactionRecord, latest_block: u64, now_secs: u64) -> bool {
	if record.receipt.is_some() {
		return false;
	}
	let Some(last_checked) = record.last_checked_block else {
		return true;
	};

	let blocks_since = latest_block.saturating_sub(last_checked);
	let pending_for = record.pending_for(now_secs);
	if pending_for > SLOWEST_AFTER {
		blocks_since > 9
	} else if pending_for > SLOW_AFTER {
		blocks_since > 2
	} else {
		blocks_since >= 1
	}
}

struct PollerInner {
	registry: Arc<ConnectionRegistry>,
	store: Arc<TransactionStore>,
	events: EventBus,
	tickers: HashMap<u64, Arc<BlockTicker>>,
	retry_attempts: u32,
	retry_min_wait: Duration,
	retry_max_wait: Duration,
	/// Receipt checks currently in flight, with their cancellation flags.
	inflight: Mutex<HashMap<TransactionHash, Inflight>>,
}

struct Inflight {
	chain_id: u64,
	cancelled: Arc<AtomicBool>,
}

/// Drives pending transactions from submission to a terminal receipt.
#[derive(Clone)]
pub struct ReceiptPoller {
	inner: Arc<PollerInner>,
}

impl ReceiptPoller {
	pub fn new(
		registry: Arc<ConnectionRegistry>,
		store: Arc<TransactionStore>,
		events: EventBus,
		tickers: HashMap<u64, Arc<BlockTicker>>,
		config: &PollerConfig,
	) -> Self {
		Self {
			inner: Arc::new(PollerInner {
				registry,
				store,
				events,
				tickers,
				retry_attempts: config.receipt_retry_attempts.max(1),
				retry_min_wait: Duration::from_millis(config.retry_min_wait_ms),
				retry_max_wait: Duration::from_millis(config.retry_max_wait_ms),
				inflight: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// Spawns one polling task per chain, waking on each block tick.
	pub fn spawn(&self) -> Vec<JoinHandle<()>> {
		self.inner
			.tickers
			.iter()
			.map(|(chain_id, ticker)| {
				let chain_id = *chain_id;
				let mut receiver = ticker.subscribe();
				let poller = self.clone();
				tokio::spawn(async move {
					while receiver.changed().await.is_ok() {
						let latest_block = *receiver.borrow_and_update();
						poller.poll_cycle(chain_id, latest_block).await;
					}
				})
			})
			.collect()
	}

	/// Runs one polling cycle over the chain's pending set.
	pub async fn poll_cycle(&self, chain_id: u64, latest_block: u64) {
		let pending = match self.inner.store.pending_on_chain(chain_id).await {
			Ok(pending) => pending,
			Err(e) => {
				tracing::warn!(chain_id, error = %e, "Failed to enumerate pending transactions");
				return;
			},
		};

		self.cancel_removed(chain_id, &pending);

		let now = current_timestamp();
		for record in pending {
			if !should_check(&record, latest_block, now) {
				continue;
			}
			let cancelled = {
				let mut inflight = self.inner.inflight.lock().expect("inflight lock poisoned");
				if inflight.contains_key(&record.hash) {
					// Still fetching from an earlier cycle.
					continue;
				}
				let cancelled = Arc::new(AtomicBool::new(false));
				inflight.insert(
					record.hash,
					Inflight { chain_id, cancelled: cancelled.clone() },
				);
				cancelled
			};

			let poller = self.clone();
			tokio::spawn(async move {
				poller
					.check_record(record.hash, chain_id, latest_block, cancelled)
					.await;
			});
		}
	}

	/// Cancels in-flight checks for records no longer in the pending set.
	fn cancel_removed(&self, chain_id: u64, pending: &[TransactionRecord]) {
		let mut inflight = self.inner.inflight.lock().expect("inflight lock poisoned");
		inflight.retain(|hash, entry| {
			if entry.chain_id != chain_id {
				return true;
			}
			let still_pending = pending.iter().any(|record| record.hash == *hash);
			if !still_pending {
				entry.cancelled.store(true, Ordering::SeqCst);
			}
			still_pending
		});
	}

	async fn check_record(
		&self,
		hash: TransactionHash,
		chain_id: u64,
		latest_block: u64,
		cancelled: Arc<AtomicBool>,
	) {
		let receipt = self.fetch_with_retry(&hash, chain_id, &cancelled).await;
		self.inner
			.inflight
			.lock()
			.expect("inflight lock poisoned")
			.remove(&hash);

		if cancelled.load(Ordering::SeqCst) {
			tracing::debug!(tx_hash = %hash.short(), "Discarding receipt check for removed record");
			return;
		}

		match receipt {
			Some(receipt) => self.finalize(hash, chain_id, receipt).await,
			None => {
				// Unmined (or retries exhausted): record the block we checked
				// against and leave the record for a later cycle.
				if let Err(e) = self.inner.store.mark_checked(&hash, latest_block).await {
					tracing::debug!(tx_hash = %hash.short(), error = %e, "Failed to advance check watermark");
				}
			},
		}
	}

	/// Attaches the receipt and publishes the terminal lifecycle event.
	async fn finalize(&self, hash: TransactionHash, chain_id: u64, receipt: TransactionReceipt) {
		match self.inner.store.attach_receipt(&hash, receipt.clone()).await {
			Ok(true) => {},
			// Already terminal.
			Ok(false) => return,
			// Removed while we were fetching; the result is discarded.
			Err(StorageError::NotFound) => return,
			Err(e) => {
				tracing::warn!(tx_hash = %hash, error = %e, "Failed to attach receipt");
				return;
			},
		}

		// The receipt's block proves the chain has advanced at least this
		// far; fast-forward the ticker so other components see it.
		if let Some(ticker) = self.inner.tickers.get(&chain_id) {
			ticker.advance(receipt.block_number);
		}

		let event = if receipt.success {
			tracing::info!(tx_hash = %hash, chain_id, block_number = receipt.block_number, "Transaction confirmed");
			TransactionEvent::Confirmed { hash, receipt }
		} else {
			tracing::info!(tx_hash = %hash, chain_id, block_number = receipt.block_number, "Transaction reverted");
			TransactionEvent::Failed { hash, receipt }
		};
		let _ = self.inner.events.publish(ClientEvent::Transaction(event));
	}

	/// Fetches a receipt with bounded retries and exponential backoff.
	///
	/// `None` covers both "not mined yet" and "retries exhausted"; either way
	/// the record stays pending and the next eligible cycle tries again.
	async fn fetch_with_retry(
		&self,
		hash: &TransactionHash,
		chain_id: u64,
		cancelled: &AtomicBool,
	) -> Option<TransactionReceipt> {
		let mut wait = self.inner.retry_min_wait;
		for attempt in 1..=self.inner.retry_attempts {
			if cancelled.load(Ordering::SeqCst) {
				return None;
			}
			let wallet = self.inner.registry.active();
			match wallet.get_transaction_receipt(hash, chain_id).await {
				Ok(receipt) => return receipt,
				Err(e) => {
					tracing::debug!(
						tx_hash = %hash.short(),
						chain_id,
						attempt,
						error = %e,
						"Receipt fetch failed"
					);
					if attempt < self.inner.retry_attempts {
						tokio::time::sleep(wait).await;
						wait = (wait * 2).min(self.inner.retry_max_wait);
					}
				},
			}
		}
		None
	}
}
