//! Multicall3-based aggregate caller.
//!
//! Executes one batch as a single `aggregate3` view call against the
//! Multicall3 contract, deployed at the same address on effectively every
//! EVM chain. Legs are issued with `allowFailure = true` so one reverting
//! read never poisons its neighbours.

use crate::{AggregateCall, AggregateCaller, AggregateResult, MulticallError};
use alloy_primitives::{address, Address, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use dapp_provider::WalletInterface;
use dapp_types::{NetworksConfig, Transaction};
use std::collections::HashMap;
use std::sync::Arc;

sol! {
	interface IMulticall3 {
		struct Call3 {
			address target;
			bool allowFailure;
			bytes callData;
		}

		struct Result {
			bool success;
			bytes returnData;
		}

		function aggregate3(Call3[] calldata calls) external payable returns (Result[] memory returnData);
	}
}

/// Canonical Multicall3 deployment address.
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Issues aggregated reads through the wallet's `eth_call` path.
pub struct Multicall3Caller {
	wallet: Arc<dyn WalletInterface>,
	/// Per-chain overrides for chains whose deployment differs from the
	/// canonical address.
	overrides: HashMap<u64, Address>,
}

impl Multicall3Caller {
	pub fn new(wallet: Arc<dyn WalletInterface>, networks: &NetworksConfig) -> Self {
		let overrides = networks
			.iter()
			.filter_map(|(chain_id, network)| {
				network.multicall_address.map(|address| (*chain_id, address))
			})
			.collect();
		Self { wallet, overrides }
	}

	fn address_for(&self, chain_id: u64) -> Address {
		self.overrides
			.get(&chain_id)
			.copied()
			.unwrap_or(MULTICALL3_ADDRESS)
	}
}

#[async_trait]
impl AggregateCaller for Multicall3Caller {
	async fn aggregate(
		&self,
		chain_id: u64,
		calls: Vec<AggregateCall>,
	) -> Result<Vec<AggregateResult>, MulticallError> {
		let legs: Vec<IMulticall3::Call3> = calls
			.into_iter()
			.map(|call| IMulticall3::Call3 {
				target: call.target,
				allowFailure: true,
				callData: call.calldata,
			})
			.collect();

		let payload = IMulticall3::aggregate3Call { calls: legs }.abi_encode();
		let tx = Transaction {
			from: None,
			to: self.address_for(chain_id),
			data: payload.into(),
			value: U256::ZERO,
			gas_limit: None,
			chain_id,
		};

		let response = self
			.wallet
			.call(&tx)
			.await
			.map_err(|e| MulticallError::BatchCall(e.to_string()))?;

		let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&response, true)
			.map_err(|e| MulticallError::Decode(e.to_string()))?;

		Ok(decoded
			.returnData
			.into_iter()
			.map(|result| AggregateResult {
				success: result.success,
				data: result.returnData,
			})
			.collect())
	}
}
