//! Registry trait for self-registering backend implementations.
//!
//! This module provides the base trait that swappable backends (storage
//! backends, wallet providers) implement to register themselves with their
//! configuration name and factory function.

/// Base trait for implementation registries.
///
/// Each backend module must provide a Registry struct that implements this
/// trait, declaring the name used to select it from configuration and a
/// factory function to construct it.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// This should match the key used in the TOML configuration, for example
	/// "memory" for `storage.backend = "memory"`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
