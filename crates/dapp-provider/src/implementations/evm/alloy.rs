//! Alloy-based EVM wallet implementation.
//!
//! This implementation uses the Alloy library to serve the wallet capability
//! against EVM chains over HTTP, with a local signer wired through the
//! provider's wallet filler. It supports multiple networks with a single
//! instance; a browser host would instead adapt its injected provider to the
//! same trait.

use crate::{WalletError, WalletInterface};
use alloy_network::EthereumWallet;
use alloy_primitives::FixedBytes;
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::{RpcError, TransportErrorKind};
use alloy_transport_http::Http;
use async_trait::async_trait;
use dapp_types::{
	Bytes, NetworksConfig, Transaction, TransactionHash, TransactionReceipt,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Alloy-backed EVM wallet.
///
/// Holds one provider per configured network; the signer is applied through
/// the provider's wallet filler so `send_transaction` submits fully signed
/// payloads.
pub struct AlloyWallet {
	providers: HashMap<u64, Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>>,
}

impl AlloyWallet {
	/// Creates a wallet with a provider for every configured network.
	pub fn new(networks: &NetworksConfig, signer: PrivateKeySigner) -> Result<Self, WalletError> {
		if networks.is_empty() {
			return Err(WalletError::Network(
				"At least one network must be configured".to_string(),
			));
		}

		let mut providers = HashMap::new();

		for (chain_id, network) in networks {
			let url = network.rpc_url.parse().map_err(|e| {
				WalletError::Network(format!("Invalid RPC URL for chain {}: {}", chain_id, e))
			})?;

			let chain_signer = signer.clone().with_chain_id(Some(*chain_id));
			let wallet = EthereumWallet::from(chain_signer);

			let provider = ProviderBuilder::new()
				.with_recommended_fillers()
				.wallet(wallet)
				.on_http(url);

			provider
				.client()
				.set_poll_interval(std::time::Duration::from_secs(7));

			providers.insert(
				*chain_id,
				Arc::new(provider) as Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
			);
		}

		Ok(Self { providers })
	}

	fn provider(
		&self,
		chain_id: u64,
	) -> Result<&Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>, WalletError> {
		self.providers
			.get(&chain_id)
			.ok_or(WalletError::UnknownChain(chain_id))
	}

	fn to_request(tx: &Transaction) -> TransactionRequest {
		let mut request = TransactionRequest::default()
			.to(tx.to)
			.input(tx.data.clone().into())
			.value(tx.value);
		if let Some(from) = tx.from {
			request = request.from(from);
		}
		if let Some(gas) = tx.gas_limit {
			request = request.gas_limit(gas);
		}
		request
	}
}

/// Maps an alloy transport error into the wallet error taxonomy, preserving
/// the JSON-RPC code and revert payload the estimator needs.
fn map_rpc_error(error: RpcError<TransportErrorKind>) -> WalletError {
	match error {
		RpcError::ErrorResp(payload) => WalletError::from_rpc_parts(
			Some(payload.code),
			payload.message.to_string(),
			payload.data.as_ref().map(|data| data.get().to_string()),
		),
		other => WalletError::Network(other.to_string()),
	}
}

#[async_trait]
impl WalletInterface for AlloyWallet {
	async fn estimate_gas(&self, tx: &Transaction) -> Result<u64, WalletError> {
		let provider = self.provider(tx.chain_id)?;
		let request = Self::to_request(tx);
		provider.estimate_gas(&request).await.map_err(map_rpc_error)
	}

	async fn call(&self, tx: &Transaction) -> Result<Bytes, WalletError> {
		let provider = self.provider(tx.chain_id)?;
		let request = Self::to_request(tx);
		provider.call(&request).await.map_err(map_rpc_error)
	}

	async fn send_transaction(&self, tx: &Transaction) -> Result<TransactionHash, WalletError> {
		let chain_id = tx.chain_id;
		let provider = self.provider(chain_id)?;
		let request = Self::to_request(tx);

		let pending_tx = provider
			.send_transaction(request)
			.await
			.map_err(map_rpc_error)?;

		let tx_hash = *pending_tx.tx_hash();
		let hash = TransactionHash(tx_hash);
		tracing::info!(tx_hash = %hash, chain_id, "Submitted transaction");
		Ok(hash)
	}

	async fn get_transaction_receipt(
		&self,
		hash: &TransactionHash,
		chain_id: u64,
	) -> Result<Option<TransactionReceipt>, WalletError> {
		let provider = self.provider(chain_id)?;
		let tx_hash: FixedBytes<32> = hash.0;

		match provider.get_transaction_receipt(tx_hash).await {
			Ok(Some(receipt)) => Ok(Some(TransactionReceipt {
				hash: TransactionHash(receipt.transaction_hash),
				block_number: receipt.block_number.unwrap_or(0),
				success: receipt.status(),
			})),
			Ok(None) => Ok(None),
			Err(e) => Err(map_rpc_error(e)),
		}
	}

	async fn get_block_number(&self, chain_id: u64) -> Result<u64, WalletError> {
		let provider = self.provider(chain_id)?;
		provider.get_block_number().await.map_err(map_rpc_error)
	}
}

/// Factory function to create an HTTP wallet connection from configuration.
///
/// Parses the signing key and builds an [`AlloyWallet`] over every network
/// in the configuration, returned behind the capability trait for the
/// [`crate::ConnectionRegistry`].
pub fn create_http_wallet(
	networks: &NetworksConfig,
	private_key: &str,
) -> Result<Arc<dyn WalletInterface>, WalletError> {
	let signer: PrivateKeySigner = private_key
		.parse()
		.map_err(|_| WalletError::Network("Invalid private key format".to_string()))?;

	Ok(Arc::new(AlloyWallet::new(networks, signer)?))
}
