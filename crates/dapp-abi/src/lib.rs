//! Contract call encoding for the dapp client core.
//!
//! Pure functions turning a (contract interface, method name, typed
//! arguments) triple into selector-prefixed calldata, and raw returned words
//! back into typed values. No I/O happens here; malformed construction fails
//! before any network call is made.
//!
//! Numeric values travel as ABI words (`U256`/`I256` inside
//! [`DynSolValue`]), never as native floats, so on-chain amounts round-trip
//! exactly.

use alloy_json_abi::Function;
use alloy_primitives::Bytes;
use std::collections::HashMap;
use thiserror::Error;

pub use alloy_dyn_abi::DynSolValue;
use alloy_dyn_abi::{FunctionExt, JsonAbiExt};

/// Errors that can occur during call encoding and decoding.
#[derive(Debug, Error)]
pub enum AbiError {
	/// A human-readable signature failed to parse.
	#[error("Invalid function signature '{signature}': {message}")]
	InvalidSignature { signature: String, message: String },
	/// The method is not part of the interface.
	#[error("Unknown method: {0}")]
	UnknownMethod(String),
	/// Argument arity or types mismatch the method's signature.
	#[error("Encoding error: {0}")]
	Encoding(String),
	/// Returned bytes are shorter than the expected tuple layout. Callers
	/// treat this as "call reverted/empty" and map it to an absent result.
	#[error("Decoding error: {0}")]
	Decoding(String),
}

/// A contract interface built from human-readable function signatures.
///
/// Methods are keyed by name; overloads are not supported, matching how the
/// client addresses contracts (one well-known method per name).
#[derive(Debug, Clone)]
pub struct ContractInterface {
	functions: HashMap<String, Function>,
}

impl ContractInterface {
	/// Parses an interface from human-readable signatures, e.g.
	/// `"function balanceOf(address owner) returns (uint256)"`.
	pub fn parse<S: AsRef<str>>(signatures: &[S]) -> Result<Self, AbiError> {
		let mut functions = HashMap::new();
		for signature in signatures {
			let signature = signature.as_ref();
			let function =
				Function::parse(signature).map_err(|e| AbiError::InvalidSignature {
					signature: signature.to_string(),
					message: e.to_string(),
				})?;
			functions.insert(function.name.clone(), function);
		}
		Ok(Self { functions })
	}

	/// Looks up a method by name.
	pub fn function(&self, method: &str) -> Result<&Function, AbiError> {
		self.functions
			.get(method)
			.ok_or_else(|| AbiError::UnknownMethod(method.to_string()))
	}

	/// Encodes a call to `method` with the given arguments into
	/// selector-prefixed calldata.
	pub fn encode(&self, method: &str, args: &[DynSolValue]) -> Result<Bytes, AbiError> {
		let function = self.function(method)?;
		function
			.abi_encode_input(args)
			.map(Bytes::from)
			.map_err(|e| AbiError::Encoding(e.to_string()))
	}

	/// Decodes returned words from a call to `method` into typed values.
	pub fn decode(&self, method: &str, data: &[u8]) -> Result<Vec<DynSolValue>, AbiError> {
		let function = self.function(method)?;
		function
			.abi_decode_output(data, true)
			.map_err(|e| AbiError::Decoding(e.to_string()))
	}
}

/// The ERC-20 interface every approval, swap and migration flow starts from.
pub fn erc20() -> ContractInterface {
	ContractInterface::parse(&[
		"function approve(address spender, uint256 amount) returns (bool)",
		"function transfer(address to, uint256 amount) returns (bool)",
		"function transferFrom(address from, address to, uint256 amount) returns (bool)",
		"function balanceOf(address owner) returns (uint256)",
		"function allowance(address owner, address spender) returns (uint256)",
		"function totalSupply() returns (uint256)",
		"function decimals() returns (uint8)",
	])
	.expect("static signatures must parse")
}
