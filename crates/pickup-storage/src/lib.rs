//! Storage module for the pickup lifecycle service.
//!
//! This module provides the record store the lifecycle core reads from and
//! writes to. Backends expose raw key/value operations plus a compare-and-swap
//! primitive; [`StorageService`] layers typed JSON access and optimistic
//! read-modify-write transactions on top.

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use pickup_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// A transaction kept losing races against other writers until its retry budget ran out.
	#[error("Transaction conflict on {0}")]
	Conflict(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Implementations provide basic key-value operations with optional TTL
/// support, and an atomic compare-and-swap used to build transactions.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Atomically replaces the value at `key` with `new` if it currently equals `expected`.
	///
	/// Returns `Ok(false)` when another writer changed the value first, and
	/// `Err(StorageError::NotFound)` when the key does not exist.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		new: Vec<u8>,
	) -> Result<bool, StorageError>;

	/// Lists the live keys that start with `prefix`, in no particular order.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries from storage, returning how many were removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Result of a [`StorageService::transact`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Transaction<T> {
	/// The closure produced a new value and it was written atomically.
	Committed { previous: T, current: T },
	/// The closure declined to write; `T` is the value it saw.
	Unchanged(T),
}

/// High-level storage service that provides typed operations.
///
/// Values are stored as JSON under `namespace:id` keys.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
	/// How long a contended transaction keeps retrying.
	transaction_timeout: Duration,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			backend,
			transaction_timeout: Duration::from_secs(2),
		}
	}

	/// Sets the retry budget for contended transactions.
	pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
		self.transaction_timeout = timeout;
		self
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value with optional time-to-live.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Overwrites an existing value; fails with `NotFound` if there is none.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = Self::key(namespace, id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}

		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes, None).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	/// Loads every record in a namespace.
	///
	/// # Arguments
	///
	/// * `namespace` - The namespace to scan, e.g. `orders`
	///
	/// # Returns
	///
	/// The decoded records. Records that vanish between listing and reading
	/// are skipped; records that fail to decode abort the scan.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<T>, StorageError> {
		let prefix = Self::key(namespace, "");
		let mut records = Vec::new();
		for key in self.backend.list_keys(&prefix).await? {
			match self.backend.get_bytes(&key).await {
				Ok(bytes) => records.push(
					serde_json::from_slice(&bytes)
						.map_err(|e| StorageError::Serialization(e.to_string()))?,
				),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(records)
	}

	/// Removes expired entries from storage.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}

	/// Runs an atomic read-modify-write against one record.
	///
	/// `apply` sees the current value and returns the value to write, or
	/// `None` to leave the record alone. The write only lands if the record
	/// is still byte-for-byte what `apply` saw; otherwise the whole
	/// read-apply-write is retried with exponential backoff until the
	/// transaction timeout, after which `StorageError::Conflict` is returned.
	/// `apply` may therefore run more than once and must not have side effects.
	///
	/// # Errors
	/// * `StorageError::NotFound` if the record does not exist
	/// * `StorageError::Conflict` if the record kept changing until the timeout
	/// * `StorageError::Serialization` if the stored value is not a `T`
	pub async fn transact<T, F>(
		&self,
		namespace: &str,
		id: &str,
		apply: F,
	) -> Result<Transaction<T>, StorageError>
	where
		T: Serialize + DeserializeOwned,
		F: Fn(&T) -> Option<T>,
	{
		let key = Self::key(namespace, id);
		let policy = ExponentialBackoff {
			initial_interval: Duration::from_millis(5),
			max_interval: Duration::from_millis(200),
			max_elapsed_time: Some(self.transaction_timeout),
			..ExponentialBackoff::default()
		};

		let key = key.as_str();
		let apply = &apply;
		let backend = &self.backend;

		backoff::future::retry(policy, move || async move {
			let snapshot = backend.get_bytes(key).await.map_err(permanent)?;
			let current: T = serde_json::from_slice(&snapshot)
				.map_err(|e| permanent(StorageError::Serialization(e.to_string())))?;

			let Some(next) = apply(&current) else {
				return Ok(Transaction::Unchanged(current));
			};

			let bytes = serde_json::to_vec(&next)
				.map_err(|e| permanent(StorageError::Serialization(e.to_string())))?;
			if backend
				.compare_and_swap(key, &snapshot, bytes)
				.await
				.map_err(permanent)?
			{
				Ok(Transaction::Committed {
					previous: current,
					current: next,
				})
			} else {
				tracing::debug!(key, "Transaction lost a race, retrying");
				Err(backoff::Error::transient(StorageError::Conflict(
					key.to_string(),
				)))
			}
		})
		.await
	}
}

fn permanent(err: StorageError) -> backoff::Error<StorageError> {
	backoff::Error::permanent(err)
}
