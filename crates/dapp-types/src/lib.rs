//! Common types module for the dapp client core.
//!
//! This module defines the core data types and structures shared by all
//! client components. It provides a centralized location for the data model
//! to ensure consistency between the encoder, batcher, estimator and
//! transaction pipeline.

/// Contract call descriptors and batched read requests.
pub mod call;
/// Currency representation for native and ERC-20 assets.
pub mod currency;
/// Event types and the broadcast bus for lifecycle notifications.
pub mod events;
/// Network and token configuration types.
pub mod networks;
/// Registry trait for self-registering backend implementations.
pub mod registry;
/// Transaction envelopes, hashes, receipts and pending records.
pub mod transaction;
/// Utility functions for formatting and timestamps.
pub mod utils;

// Re-export all types for convenient access
pub use call::*;
pub use currency::*;
pub use events::*;
pub use networks::{deserialize_networks, NetworkConfig, NetworksConfig, TokenConfig};
pub use registry::*;
pub use transaction::*;
pub use utils::{current_timestamp, truncate_id, with_0x_prefix};

pub use alloy_primitives::{Address, Bytes, B256, U256};
