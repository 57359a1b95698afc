//! Staged gas estimation.
//!
//! A submission never reaches the wallet without a gas limit. Estimation is
//! staged: ask the node for an estimate, and when that fails, simulate the
//! same call to distinguish "the call reverts" (with the decoded revert
//! reason when available) from "the node estimated wrong". In permissive
//! mode both failures fall back to a fixed gas ceiling instead, which is the
//! expert-mode escape hatch for calls that revert against latest state but
//! succeed in the submitted block.

use alloy_sol_types::{Revert, SolError};
use dapp_config::GasConfig;
use dapp_provider::{WalletError, WalletInterface};
use dapp_types::Transaction;
use thiserror::Error;

/// Errors that can occur during gas estimation.
#[derive(Debug, Error)]
pub enum GasError {
	/// Estimation failed and the simulation confirmed the call reverts.
	#[error("Gas estimation failed: {}", reason.as_deref().unwrap_or("the transaction would revert"))]
	Estimation { reason: Option<String> },
	/// Estimation failed while a simulation of the same call succeeded.
	/// Indicates the node and the call disagree; surfaced distinctly so the
	/// host can suggest retrying or enabling permissive mode.
	#[error("Gas estimation failed but the call simulates successfully")]
	Anomaly,
	/// The user declined the request in their wallet.
	#[error("User rejected the request")]
	Rejected,
	/// Provider-level failure unrelated to the call itself.
	#[error(transparent)]
	Wallet(WalletError),
}

/// Computes the gas limit attached to every submission.
#[derive(Debug, Clone)]
pub struct GasEstimator {
	safety_margin_percent: u64,
	fallback_gas_limit: u64,
}

impl GasEstimator {
	pub fn new(config: &GasConfig) -> Self {
		Self {
			safety_margin_percent: config.safety_margin_percent,
			fallback_gas_limit: config.fallback_gas_limit,
		}
	}

	/// Produces the gas limit for `tx`, running the staged pipeline.
	pub async fn estimate(
		&self,
		wallet: &dyn WalletInterface,
		tx: &Transaction,
		permissive: bool,
	) -> Result<u64, GasError> {
		let estimate_error = match wallet.estimate_gas(tx).await {
			Ok(estimate) => return Ok(self.apply_margin(estimate)),
			Err(WalletError::Rejected) => return Err(GasError::Rejected),
			Err(error @ (WalletError::UnknownChain(_) | WalletError::UnknownConnector(_))) => {
				return Err(GasError::Wallet(error))
			},
			Err(error) => error,
		};

		// The estimate failed; simulate the same call to find out whether
		// the call itself is at fault. Transport failures take this path
		// too, so permissive mode can bypass a flaky estimator.
		match wallet.call(tx).await {
			Ok(_) => {
				tracing::warn!(
					to = %tx.to,
					chain_id = tx.chain_id,
					error = %estimate_error,
					"Gas estimate failed while simulation succeeded"
				);
				if permissive {
					Ok(self.fallback_gas_limit)
				} else {
					Err(GasError::Anomaly)
				}
			},
			Err(call_error) => {
				let reason =
					revert_reason(&call_error).or_else(|| revert_reason(&estimate_error));
				if permissive {
					tracing::warn!(
						to = %tx.to,
						chain_id = tx.chain_id,
						reason = reason.as_deref().unwrap_or("unknown"),
						"Estimation failed; using fallback gas limit"
					);
					Ok(self.fallback_gas_limit)
				} else if reason.is_none() && matches!(estimate_error, WalletError::Network(_)) {
					// No revert evidence anywhere and the estimate died in
					// transport: surface the connectivity failure, not a
					// bogus "would revert".
					Err(GasError::Wallet(estimate_error))
				} else {
					Err(GasError::Estimation { reason })
				}
			},
		}
	}

	/// Pads an estimate with the configured safety margin.
	fn apply_margin(&self, estimate: u64) -> u64 {
		estimate.saturating_mul(100 + self.safety_margin_percent) / 100
	}
}

/// Extracts a human-readable revert reason from a wallet error.
///
/// Prefers the structured `Error(string)` payload when the node attached
/// one, falling back to the conventional "execution reverted: ..." message
/// suffix.
pub fn revert_reason(error: &WalletError) -> Option<String> {
	if let Some(data) = error.revert_data() {
		let trimmed = data.trim().trim_matches('"');
		let hex_data = trimmed.strip_prefix("0x").unwrap_or(trimmed);
		if let Ok(bytes) = hex::decode(hex_data) {
			if let Ok(revert) = Revert::abi_decode(&bytes, true) {
				return Some(revert.reason);
			}
		}
	}

	if let WalletError::Rpc { message, .. } = error {
		if let Some((_, reason)) = message.split_once("execution reverted: ") {
			let reason = reason.trim();
			if !reason.is_empty() {
				return Some(reason.to_string());
			}
		}
	}

	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn margin_is_applied_to_successful_estimates() {
		let estimator = GasEstimator::new(&GasConfig::default());
		assert_eq!(estimator.apply_margin(100_000), 120_000);
		assert_eq!(estimator.apply_margin(0), 0);
	}

	#[test]
	fn reason_is_decoded_from_structured_revert_data() {
		let revert = Revert::from("DEIPool: COLLATERAL_COLLECTION_DELAY");
		let data = format!("\"0x{}\"", hex::encode(revert.abi_encode()));
		let error = WalletError::Rpc {
			code: Some(3),
			message: "execution reverted".to_string(),
			data: Some(data),
		};

		assert_eq!(
			revert_reason(&error).as_deref(),
			Some("DEIPool: COLLATERAL_COLLECTION_DELAY")
		);
	}

	#[test]
	fn reason_falls_back_to_the_message_suffix() {
		let error = WalletError::Rpc {
			code: Some(-32000),
			message: "execution reverted: ERC20: transfer amount exceeds balance".to_string(),
			data: None,
		};
		assert_eq!(
			revert_reason(&error).as_deref(),
			Some("ERC20: transfer amount exceeds balance")
		);

		let bare = WalletError::Rpc {
			code: Some(-32000),
			message: "execution reverted".to_string(),
			data: None,
		};
		assert_eq!(revert_reason(&bare), None);
	}
}
