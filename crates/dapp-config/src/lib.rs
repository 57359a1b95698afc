//! Configuration module for the dapp client core.
//!
//! This module provides structures and utilities for managing client
//! configuration. It supports loading configuration from TOML files with
//! `${ENV_VAR}` and `${ENV_VAR:-default}` placeholders and validates that
//! all required values are properly set before any component is built.

use dapp_types::{deserialize_networks, NetworksConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the dapp client.
///
/// Contains all sections required for the client core to operate: client
/// behavior flags, per-chain network settings, the pending-transaction
/// storage backend, multicall batching, gas estimation and receipt polling.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Client-level behavior flags.
	#[serde(default)]
	pub client: ClientConfig,
	/// Network and token configurations keyed by chain ID.
	#[serde(deserialize_with = "deserialize_networks")]
	pub networks: NetworksConfig,
	/// Configuration for the pending-transaction storage backend.
	pub storage: StorageConfig,
	/// Configuration for the multicall read batcher.
	#[serde(default)]
	pub multicall: MulticallConfig,
	/// Configuration for gas estimation.
	#[serde(default)]
	pub gas: GasConfig,
	/// Configuration for the receipt poller.
	#[serde(default)]
	pub poller: PollerConfig,
}

/// Client-level behavior flags.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClientConfig {
	/// Permissive ("expert") mode default: accept the fallback gas ceiling
	/// instead of failing when estimation fails. Callers can override per
	/// submission.
	#[serde(default)]
	pub expert_mode: bool,
}

/// Storage backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Backend name, e.g. "memory" or "file".
	pub backend: String,
	/// Backend-specific configuration table.
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

fn empty_table() -> toml::Value {
	toml::Value::Table(Default::default())
}

/// Multicall batcher tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MulticallConfig {
	/// Quiescence delay in milliseconds before a batch executes when no
	/// block tick arrives. Bounds staleness while still coalescing bursts
	/// issued during one render pass.
	#[serde(default = "default_quiescence_ms")]
	pub quiescence_ms: u64,
}

fn default_quiescence_ms() -> u64 {
	300
}

impl Default for MulticallConfig {
	fn default() -> Self {
		Self { quiescence_ms: default_quiescence_ms() }
	}
}

/// Gas estimation tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GasConfig {
	/// Safety margin applied on top of successful estimates, in percent.
	#[serde(default = "default_safety_margin")]
	pub safety_margin_percent: u64,
	/// Fixed gas ceiling used in permissive mode when estimation fails.
	#[serde(default = "default_fallback_gas_limit")]
	pub fallback_gas_limit: u64,
}

fn default_safety_margin() -> u64 {
	20
}

fn default_fallback_gas_limit() -> u64 {
	500_000
}

impl Default for GasConfig {
	fn default() -> Self {
		Self {
			safety_margin_percent: default_safety_margin(),
			fallback_gas_limit: default_fallback_gas_limit(),
		}
	}
}

/// Receipt poller tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollerConfig {
	/// Attempts per receipt fetch before leaving the record for the next
	/// eligible cycle.
	#[serde(default = "default_retry_attempts")]
	pub receipt_retry_attempts: u32,
	/// Initial wait between receipt fetch attempts, in milliseconds.
	#[serde(default = "default_retry_min_wait_ms")]
	pub retry_min_wait_ms: u64,
	/// Wait ceiling between receipt fetch attempts, in milliseconds.
	#[serde(default = "default_retry_max_wait_ms")]
	pub retry_max_wait_ms: u64,
	/// Interval of the block watcher task feeding the block ticker, in
	/// seconds. Hosts with their own block signal can ignore this.
	#[serde(default = "default_block_watch_interval_secs")]
	pub block_watch_interval_secs: u64,
}

fn default_retry_attempts() -> u32 {
	3
}

fn default_retry_min_wait_ms() -> u64 {
	250
}

fn default_retry_max_wait_ms() -> u64 {
	1_000
}

fn default_block_watch_interval_secs() -> u64 {
	7
}

impl Default for PollerConfig {
	fn default() -> Self {
		Self {
			receipt_retry_attempts: default_retry_attempts(),
			retry_min_wait_ms: default_retry_min_wait_ms(),
			retry_max_wait_ms: default_retry_max_wait_ms(),
			block_watch_interval_secs: default_block_watch_interval_secs(),
		}
	}
}

impl Config {
	/// Loads configuration from a TOML file, resolving environment variable
	/// placeholders before parsing.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		let resolved = resolve_env_vars(&content)?;
		resolved.parse()
	}

	/// Validates the configuration beyond what the type system enforces.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.networks.is_empty() {
			return Err(ConfigError::Validation(
				"At least one network must be configured".to_string(),
			));
		}

		for (chain_id, network) in &self.networks {
			if network.rpc_url.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Network {} has an empty rpc_url",
					chain_id
				)));
			}
		}

		if self.gas.safety_margin_percent > 100 {
			return Err(ConfigError::Validation(format!(
				"gas.safety_margin_percent {} exceeds 100",
				self.gas.safety_margin_percent
			)));
		}

		if self.gas.fallback_gas_limit == 0 {
			return Err(ConfigError::Validation(
				"gas.fallback_gas_limit must be non-zero".to_string(),
			));
		}

		if self.poller.receipt_retry_attempts == 0 {
			return Err(ConfigError::Validation(
				"poller.receipt_retry_attempts must be at least 1".to_string(),
			));
		}

		if self.poller.retry_min_wait_ms > self.poller.retry_max_wait_ms {
			return Err(ConfigError::Validation(
				"poller.retry_min_wait_ms exceeds retry_max_wait_ms".to_string(),
			));
		}

		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let config: Config = toml::from_str(s)?;
		config.validate()?;
		Ok(config)
	}
}

/// Resolves `${VAR}` and `${VAR:-default}` placeholders against the process
/// environment.
///
/// A placeholder without a default for an unset variable is an error rather
/// than an empty substitution, so misconfigured deployments fail at load
/// time.
pub fn resolve_env_vars(content: &str) -> Result<String, ConfigError> {
	let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
		.expect("static regex must compile");

	let mut result = String::with_capacity(content.len());
	let mut last_end = 0;

	for captures in pattern.captures_iter(content) {
		let whole = captures.get(0).expect("capture 0 always present");
		let name = &captures[1];
		let default = captures.get(3).map(|m| m.as_str());

		let value = match std::env::var(name) {
			Ok(value) => value,
			Err(_) => default
				.map(str::to_string)
				.ok_or_else(|| {
					ConfigError::Validation(format!(
						"Environment variable '{}' is not set and has no default",
						name
					))
				})?,
		};

		result.push_str(&content[last_end..whole.start()]);
		result.push_str(&value);
		last_end = whole.end();
	}

	result.push_str(&content[last_end..]);
	Ok(result)
}
