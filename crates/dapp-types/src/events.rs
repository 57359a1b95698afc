//! Event types and the broadcast bus for lifecycle notifications.
//!
//! Components publish lifecycle transitions onto a broadcast bus; UI layers
//! and tests subscribe to observe submissions and confirmations without
//! polling the store.

use crate::{TransactionHash, TransactionReceipt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default buffer size for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Main event type encompassing all client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientEvent {
	/// Events from the transaction pipeline and receipt poller.
	Transaction(TransactionEvent),
}

/// Events related to transaction lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransactionEvent {
	/// A transaction has been submitted and is pending confirmation.
	Submitted {
		hash: TransactionHash,
		chain_id: u64,
		summary: String,
	},
	/// A transaction has been confirmed on-chain.
	Confirmed {
		hash: TransactionHash,
		receipt: TransactionReceipt,
	},
	/// A transaction was included on-chain but reverted.
	Failed {
		hash: TransactionHash,
		receipt: TransactionReceipt,
	},
}

/// Broadcast bus for client events.
///
/// Cloning shares the underlying channel. Publishing never blocks; slow
/// subscribers observe lag rather than applying backpressure to the
/// pipeline.
#[derive(Debug, Clone)]
pub struct EventBus {
	sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event to all current subscribers.
	///
	/// Returns an error only when there are no subscribers, which callers
	/// are free to ignore.
	pub fn publish(
		&self,
		event: ClientEvent,
	) -> Result<usize, broadcast::error::SendError<ClientEvent>> {
		self.sender.send(event)
	}

	/// Creates a new subscription receiving events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
		self.sender.subscribe()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}
