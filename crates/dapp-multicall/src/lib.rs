//! Multicall read batching for the dapp client core.
//!
//! Replaces N separate view-call round trips with one aggregated on-chain
//! call per distinct `(chain_id, block_number)` window. Reads scheduled
//! while a window is open are deduplicated; identical reads share one leg
//! and every requester receives the same resolved bytes. A window executes
//! when the chain's block ticker advances, or after a short quiescence delay
//! when no tick arrives, bounding staleness while still coalescing bursts
//! issued during one render pass.

use dapp_types::{Address, Bytes, PendingRead, ReadKey};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

pub mod multicall3;

pub use multicall3::{Multicall3Caller, MULTICALL3_ADDRESS};

/// Errors that can occur during batched read operations.
#[derive(Debug, Error)]
pub enum MulticallError {
	/// The aggregated call itself failed; every waiting leg receives this.
	/// The batcher does not retry; that is the caller's decision.
	#[error("Aggregate call failed: {0}")]
	BatchCall(String),
	/// The aggregator response did not decode to one result per leg.
	#[error("Failed to decode aggregate response: {0}")]
	Decode(String),
	/// No block ticker registered for the requested chain.
	#[error("No block ticker registered for chain {0}")]
	UnknownChain(u64),
	/// The batch was dropped before execution (batcher shut down).
	#[error("Batch was dropped before execution")]
	Dropped,
}

/// One leg of an aggregated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCall {
	pub target: Address,
	pub calldata: Bytes,
}

/// Positional result of one leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateResult {
	pub success: bool,
	pub data: Bytes,
}

/// Seam for issuing one aggregated call on a chain.
///
/// Results must be positional: `results[i]` answers `calls[i]`.
#[async_trait::async_trait]
pub trait AggregateCaller: Send + Sync {
	async fn aggregate(
		&self,
		chain_id: u64,
		calls: Vec<AggregateCall>,
	) -> Result<Vec<AggregateResult>, MulticallError>;
}

type LegResult = Result<Option<Bytes>, MulticallError>;

/// Aggregation window identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchKey {
	chain_id: u64,
	block_number: u64,
}

/// One unique read inside a window with all its waiters.
struct Leg {
	read: PendingRead,
	waiters: Vec<oneshot::Sender<LegResult>>,
}

/// Reads collected for one window, legs kept in first-schedule order
/// because aggregator results are positional.
#[derive(Default)]
struct Batch {
	legs: Vec<Leg>,
	index: HashMap<ReadKey, usize>,
}

impl Batch {
	fn add(&mut self, read: PendingRead, waiter: oneshot::Sender<LegResult>) {
		match self.index.entry(read.dedup_key()) {
			Entry::Occupied(entry) => {
				self.legs[*entry.get()].waiters.push(waiter);
			},
			Entry::Vacant(entry) => {
				entry.insert(self.legs.len());
				self.legs.push(Leg { read, waiters: vec![waiter] });
			},
		}
	}
}

struct BatcherInner {
	aggregator: Arc<dyn AggregateCaller>,
	quiescence: Duration,
	tickers: HashMap<u64, watch::Receiver<u64>>,
	batches: Mutex<HashMap<BatchKey, Batch>>,
}

/// Batches view calls into aggregated reads per `(chain, block)` window.
///
/// Cloning shares the underlying state; the window map is discarded after
/// each execution, so there is no cross-window shared mutable state.
#[derive(Clone)]
pub struct MulticallBatcher {
	inner: Arc<BatcherInner>,
}

impl MulticallBatcher {
	/// Creates a batcher over the given aggregator and per-chain block
	/// tickers.
	pub fn new(
		aggregator: Arc<dyn AggregateCaller>,
		tickers: HashMap<u64, watch::Receiver<u64>>,
		quiescence: Duration,
	) -> Self {
		Self {
			inner: Arc::new(BatcherInner {
				aggregator,
				quiescence,
				tickers,
				batches: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// Registers interest in a read and resolves once the enclosing window
	/// executes.
	///
	/// Resolves `Ok(Some(bytes))` for a successful leg, `Ok(None)` when the
	/// leg itself reverted (leg failures never fail the whole batch), and
	/// `Err(BatchCall)` when the aggregated call failed.
	pub async fn schedule(&self, read: PendingRead) -> Result<Option<Bytes>, MulticallError> {
		let receiver = self.register(read)?;
		receiver.await.map_err(|_| MulticallError::Dropped)?
	}

	/// Spawns one flush task per chain, closing windows as blocks advance.
	pub fn spawn_block_flush(&self) -> Vec<JoinHandle<()>> {
		self.inner
			.tickers
			.iter()
			.map(|(chain_id, receiver)| {
				let chain_id = *chain_id;
				let mut receiver = receiver.clone();
				let batcher = self.clone();
				tokio::spawn(async move {
					while receiver.changed().await.is_ok() {
						let latest = *receiver.borrow_and_update();
						batcher.flush_stale(chain_id, latest).await;
					}
				})
			})
			.collect()
	}

	fn current_block(&self, chain_id: u64) -> Result<u64, MulticallError> {
		self.inner
			.tickers
			.get(&chain_id)
			.map(|receiver| *receiver.borrow())
			.ok_or(MulticallError::UnknownChain(chain_id))
	}

	fn register(&self, read: PendingRead) -> Result<oneshot::Receiver<LegResult>, MulticallError> {
		let key = BatchKey {
			chain_id: read.chain_id,
			block_number: self.current_block(read.chain_id)?,
		};
		let (sender, receiver) = oneshot::channel();

		let mut batches = self.inner.batches.lock().expect("batch map lock poisoned");
		let batch = match batches.entry(key.clone()) {
			Entry::Occupied(entry) => entry.into_mut(),
			Entry::Vacant(entry) => {
				// First read of the window arms the quiescence timer.
				let batcher = self.clone();
				tokio::spawn(async move {
					tokio::time::sleep(batcher.inner.quiescence).await;
					batcher.flush(key).await;
				});
				entry.insert(Batch::default())
			},
		};
		batch.add(read, sender);
		Ok(receiver)
	}

	/// Closes every window for `chain_id` older than the new block.
	async fn flush_stale(&self, chain_id: u64, latest_block: u64) {
		let stale: Vec<BatchKey> = {
			let batches = self.inner.batches.lock().expect("batch map lock poisoned");
			batches
				.keys()
				.filter(|key| key.chain_id == chain_id && key.block_number < latest_block)
				.cloned()
				.collect()
		};
		for key in stale {
			self.flush(key).await;
		}
	}

	/// Executes and disposes one window. A window already taken by a
	/// concurrent trigger is simply gone; both triggers racing is expected.
	async fn flush(&self, key: BatchKey) {
		let batch = {
			let mut batches = self.inner.batches.lock().expect("batch map lock poisoned");
			batches.remove(&key)
		};
		let Some(batch) = batch else { return };

		let calls: Vec<AggregateCall> = batch
			.legs
			.iter()
			.map(|leg| AggregateCall {
				target: leg.read.target,
				calldata: leg.read.call_data.clone(),
			})
			.collect();

		tracing::debug!(
			chain_id = key.chain_id,
			block_number = key.block_number,
			legs = calls.len(),
			"Executing aggregated call"
		);

		match self.inner.aggregator.aggregate(key.chain_id, calls).await {
			Ok(results) if results.len() == batch.legs.len() => {
				for (leg, result) in batch.legs.into_iter().zip(results) {
					let value = if result.success { Some(result.data) } else { None };
					for waiter in leg.waiters {
						let _ = waiter.send(Ok(value.clone()));
					}
				}
			},
			Ok(results) => {
				let message = format!(
					"Aggregator returned {} results for {} legs",
					results.len(),
					batch.legs.len()
				);
				tracing::warn!(chain_id = key.chain_id, "{}", message);
				Self::fail_all(batch, &message);
			},
			Err(e) => {
				tracing::warn!(
					chain_id = key.chain_id,
					block_number = key.block_number,
					error = %e,
					"Aggregated call failed"
				);
				Self::fail_all(batch, &e.to_string());
			},
		}
	}

	fn fail_all(batch: Batch, message: &str) {
		for leg in batch.legs {
			for waiter in leg.waiters {
				let _ = waiter.send(Err(MulticallError::BatchCall(message.to_string())));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;
	use std::sync::Mutex as StdMutex;

	/// Echoes each leg's calldata back as its result; a `[0xff]` leg
	/// simulates an individual revert, and `fail_batch` simulates the
	/// aggregator itself failing.
	struct EchoAggregator {
		invocations: StdMutex<Vec<Vec<AggregateCall>>>,
		fail_batch: bool,
	}

	impl EchoAggregator {
		fn new(fail_batch: bool) -> Arc<Self> {
			Arc::new(Self {
				invocations: StdMutex::new(Vec::new()),
				fail_batch,
			})
		}

		fn invocations(&self) -> Vec<Vec<AggregateCall>> {
			self.invocations.lock().unwrap().clone()
		}
	}

	#[async_trait::async_trait]
	impl AggregateCaller for EchoAggregator {
		async fn aggregate(
			&self,
			_chain_id: u64,
			calls: Vec<AggregateCall>,
		) -> Result<Vec<AggregateResult>, MulticallError> {
			self.invocations.lock().unwrap().push(calls.clone());
			if self.fail_batch {
				return Err(MulticallError::BatchCall("aggregator reverted".to_string()));
			}
			Ok(calls
				.into_iter()
				.map(|call| AggregateResult {
					success: call.calldata.as_ref() != [0xff],
					data: call.calldata,
				})
				.collect())
		}
	}

	fn batcher(aggregator: Arc<EchoAggregator>, chain_id: u64) -> (MulticallBatcher, watch::Sender<u64>) {
		let (sender, receiver) = watch::channel(100);
		let mut tickers = HashMap::new();
		tickers.insert(chain_id, receiver);
		(
			MulticallBatcher::new(aggregator, tickers, Duration::from_millis(50)),
			sender,
		)
	}

	fn read(chain_id: u64, last_byte: u8) -> PendingRead {
		PendingRead::new(
			chain_id,
			address!("00000000000000000000000000000000000000aa"),
			"balanceOf",
			Bytes::from(vec![0x70, 0xa0, 0x82, 0x31, last_byte]),
		)
	}

	#[tokio::test(start_paused = true)]
	async fn identical_reads_share_one_leg() {
		let aggregator = EchoAggregator::new(false);
		let (batcher, _sender) = batcher(aggregator.clone(), 42161);

		let (a, b) = tokio::join!(
			batcher.schedule(read(42161, 1)),
			batcher.schedule(read(42161, 1))
		);

		let invocations = aggregator.invocations();
		assert_eq!(invocations.len(), 1, "exactly one aggregated call");
		assert_eq!(invocations[0].len(), 1, "identical reads share one leg");
		assert_eq!(a.unwrap(), b.unwrap());
	}

	#[tokio::test(start_paused = true)]
	async fn legs_preserve_first_schedule_order() {
		let aggregator = EchoAggregator::new(false);
		let (batcher, _sender) = batcher(aggregator.clone(), 1);

		let (_r3, _r1, _r2) = tokio::join!(
			batcher.schedule(read(1, 3)),
			batcher.schedule(read(1, 1)),
			batcher.schedule(read(1, 2))
		);

		let invocations = aggregator.invocations();
		assert_eq!(invocations.len(), 1);
		let order: Vec<u8> = invocations[0]
			.iter()
			.map(|call| *call.calldata.last().unwrap())
			.collect();
		assert_eq!(order, vec![3, 1, 2]);
	}

	#[tokio::test(start_paused = true)]
	async fn reverted_leg_resolves_to_none_without_failing_the_batch() {
		let aggregator = EchoAggregator::new(false);
		let (batcher, _sender) = batcher(aggregator.clone(), 1);

		let reverting = PendingRead::new(
			1,
			address!("00000000000000000000000000000000000000bb"),
			"failing",
			Bytes::from(vec![0xff]),
		);
		let (ok, reverted) = tokio::join!(batcher.schedule(read(1, 1)), batcher.schedule(reverting));

		assert!(ok.unwrap().is_some());
		assert_eq!(reverted.unwrap(), None);
	}

	#[tokio::test(start_paused = true)]
	async fn batch_failure_rejects_every_waiter() {
		let aggregator = EchoAggregator::new(true);
		let (batcher, _sender) = batcher(aggregator.clone(), 1);

		let (a, b) = tokio::join!(batcher.schedule(read(1, 1)), batcher.schedule(read(1, 2)));
		assert!(matches!(a, Err(MulticallError::BatchCall(_))));
		assert!(matches!(b, Err(MulticallError::BatchCall(_))));
	}

	#[tokio::test(start_paused = true)]
	async fn block_advance_closes_the_window() {
		let aggregator = EchoAggregator::new(false);
		let (sender, receiver) = watch::channel(100);
		let mut tickers = HashMap::new();
		tickers.insert(1u64, receiver);
		// Quiescence far longer than the test: only the tick can flush.
		let batcher = MulticallBatcher::new(aggregator.clone(), tickers, Duration::from_secs(3600));
		let _flush_tasks = batcher.spawn_block_flush();

		let pending = tokio::spawn({
			let batcher = batcher.clone();
			async move { batcher.schedule(read(1, 1)).await }
		});
		tokio::task::yield_now().await;

		sender.send(101).unwrap();
		let result = pending.await.unwrap().unwrap();
		assert!(result.is_some());
		assert_eq!(aggregator.invocations().len(), 1);
	}

	#[tokio::test]
	async fn unknown_chain_is_rejected_synchronously() {
		let aggregator = EchoAggregator::new(false);
		let (batcher, _sender) = batcher(aggregator, 1);
		assert!(matches!(
			batcher.schedule(read(999, 1)).await,
			Err(MulticallError::UnknownChain(999))
		));
	}
}
