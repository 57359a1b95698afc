//! File-based storage backend implementation.
//!
//! This module provides a file-per-key implementation of the
//! StorageInterface trait for hosts that want pending transactions to
//! survive restarts. Keys are hex-encoded into file names so arbitrary key
//! characters never reach the filesystem.

use crate::{StorageError, StorageFactory, StorageInterface};
use async_trait::async_trait;
use dapp_types::ImplementationRegistry;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File extension for stored entries.
const ENTRY_EXT: &str = "json";

/// File-based storage implementation.
///
/// Each key maps to one file under the base directory; values are written
/// whole, so a write is at worst torn into a missing entry rather than a
/// corrupt one on crash.
pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
		let base_path = base_path.as_ref().to_path_buf();
		std::fs::create_dir_all(&base_path)
			.map_err(|e| StorageError::Backend(format!("Cannot create storage dir: {}", e)))?;
		Ok(Self { base_path })
	}

	fn path_for(&self, key: &str) -> PathBuf {
		self.base_path
			.join(format!("{}.{}", hex::encode(key.as_bytes()), ENTRY_EXT))
	}

	fn key_from_file_name(name: &str) -> Option<String> {
		let stem = name.strip_suffix(&format!(".{}", ENTRY_EXT))?;
		let bytes = hex::decode(stem).ok()?;
		String::from_utf8(bytes).ok()
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match fs::read(self.path_for(key)).await {
			Ok(bytes) => Ok(bytes),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.path_for(key);
		let tmp = path.with_extension("tmp");
		fs::write(&tmp, &value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&tmp, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.path_for(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(fs::try_exists(self.path_for(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?)
	}

	async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut entries = fs::read_dir(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let name = entry.file_name();
			let Some(name) = name.to_str() else { continue };
			if let Some(key) = Self::key_from_file_name(name) {
				if key.starts_with(prefix) {
					keys.push(key);
				}
			}
		}
		Ok(keys)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path` (required): directory holding the entry files.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.ok_or_else(|| {
			StorageError::Configuration("file storage requires a 'storage_path' string".to_string())
		})?;

	Ok(Box::new(FileStorage::new(storage_path)?))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
