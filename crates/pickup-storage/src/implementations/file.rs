//! File-based storage backend.
//!
//! Each record is one file under the configured directory. Files start with a
//! small header carrying an optional expiry, followed by the raw value. Writes
//! go through a temp file and a rename, and every mutation of a key holds an
//! exclusive advisory lock on a sidecar `.lock` file so that compare-and-swap
//! is atomic across tasks and processes sharing the directory.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use fs2::FileExt;
use pickup_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey, ValidationError,
};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Record header.
///
/// Layout (16 bytes):
/// - [0-3]: magic "PKUP"
/// - [4-5]: version (u16, little-endian)
/// - [6-7]: reserved
/// - [8-15]: expiry (u64, little-endian, Unix seconds, 0 = never)
#[derive(Debug, Clone, Copy, PartialEq)]
struct RecordHeader {
	expires_at: u64,
}

impl RecordHeader {
	const MAGIC: &'static [u8; 4] = b"PKUP";
	const VERSION: u16 = 1;
	const SIZE: usize = 16;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			unix_now().saturating_add(ttl.as_secs())
		};
		Self { expires_at }
	}

	fn encode(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&Self::VERSION.to_le_bytes());
		bytes[8..16].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE || &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Missing record header".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported record version: {}",
				version
			)));
		}

		let mut expires = [0u8; 8];
		expires.copy_from_slice(&bytes[8..16]);
		Ok(Self {
			expires_at: u64::from_le_bytes(expires),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && unix_now() >= self.expires_at
	}
}

fn unix_now() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

fn backend_err(e: io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

/// Namespaces that may carry a default TTL.
///
/// Orders, items and businesses are the system of record and never expire;
/// only delivered alert messages do.
const EXPIRING_NAMESPACES: [StorageKey; 1] = [StorageKey::Messages];

/// Per-namespace default TTLs, configured as `ttl_<namespace>` in seconds.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	fn from_config(config: &toml::Value) -> Self {
		let ttls = EXPIRING_NAMESPACES
			.into_iter()
			.filter_map(|key| {
				config
					.get(format!("ttl_{}", key.as_str()))
					.and_then(|v| v.as_integer())
					.map(|secs| (key, Duration::from_secs(secs.max(0) as u64)))
			})
			.collect();
		Self { ttls }
	}

	/// TTL for a full storage key such as `orders:123`; zero means never.
	fn for_key(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|ns| ns.parse::<StorageKey>().ok())
			.and_then(|sk| self.ttls.get(&sk).copied())
			.unwrap_or(Duration::ZERO)
	}
}

/// A record file plus the lock file guarding it.
#[derive(Debug, Clone)]
struct RecordPaths {
	data: PathBuf,
	lock: PathBuf,
	temp: PathBuf,
}

impl RecordPaths {
	/// Runs `f` while holding the exclusive lock for this record.
	fn with_lock<R>(&self, f: impl FnOnce(&Self) -> io::Result<R>) -> io::Result<R> {
		if let Some(parent) = self.data.parent() {
			fs::create_dir_all(parent)?;
		}
		let lock_file = OpenOptions::new()
			.create(true)
			.truncate(false)
			.write(true)
			.open(&self.lock)?;
		lock_file.lock_exclusive()?;
		let result = f(self);
		let _ = FileExt::unlock(&lock_file);
		result
	}

	/// Reads the live value, or `None` if the record is missing or expired.
	fn read_live(&self) -> io::Result<Option<Vec<u8>>> {
		let data = match fs::read(&self.data) {
			Ok(data) => data,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e),
		};
		match RecordHeader::decode(&data) {
			Ok(header) if header.is_expired() => Ok(None),
			Ok(_) => Ok(Some(data[RecordHeader::SIZE..].to_vec())),
			Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
		}
	}

	fn write(&self, value: &[u8], header: RecordHeader) -> io::Result<()> {
		let mut contents = Vec::with_capacity(RecordHeader::SIZE + value.len());
		contents.extend_from_slice(&header.encode());
		contents.extend_from_slice(value);
		fs::write(&self.temp, contents)?;
		fs::rename(&self.temp, &self.data)
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	fn file_stem(key: &str) -> String {
		key.replace(['/', ':', '\\'], "_")
	}

	fn paths(&self, key: &str) -> RecordPaths {
		let safe_key = Self::file_stem(key);
		RecordPaths {
			data: self.base_path.join(format!("{}.bin", safe_key)),
			lock: self.base_path.join(format!("{}.lock", safe_key)),
			temp: self.base_path.join(format!("{}.tmp", safe_key)),
		}
	}

	/// Runs blocking file work off the async runtime.
	async fn blocking<R, F>(&self, f: F) -> Result<R, StorageError>
	where
		R: Send + 'static,
		F: FnOnce() -> Result<R, StorageError> + Send + 'static,
	{
		tokio::task::spawn_blocking(f)
			.await
			.map_err(|e| StorageError::Backend(format!("Storage task failed: {}", e)))?
	}
}

fn remove_if_expired(path: &Path) -> bool {
	let Ok(data) = fs::read(path) else {
		return false;
	};
	match RecordHeader::decode(&data) {
		Ok(header) if header.is_expired() => match fs::remove_file(path) {
			Ok(()) => true,
			Err(e) => {
				tracing::warn!(path = %path.display(), error = %e, "Failed to remove expired record");
				false
			},
		},
		Ok(_) => false,
		Err(_) => {
			tracing::debug!(path = %path.display(), "Skipping file without record header");
			false
		},
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let paths = self.paths(key);
		self.blocking(move || paths.read_live().map_err(backend_err)?.ok_or(StorageError::NotFound))
			.await
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let paths = self.paths(key);
		let header = RecordHeader::new(ttl.unwrap_or_else(|| self.ttl_config.for_key(key)));
		self.blocking(move || {
			paths
				.with_lock(|p| p.write(&value, header))
				.map_err(backend_err)
		})
		.await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let paths = self.paths(key);
		self.blocking(move || {
			paths
				.with_lock(|p| match fs::remove_file(&p.data) {
					Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
					_ => Ok(()),
				})
				.map_err(backend_err)
		})
		.await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let paths = self.paths(key);
		self.blocking(move || Ok(paths.read_live().map_err(backend_err)?.is_some()))
			.await
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		new: Vec<u8>,
	) -> Result<bool, StorageError> {
		let paths = self.paths(key);
		let expected = expected.to_vec();
		let header = RecordHeader::new(self.ttl_config.for_key(key));
		self.blocking(move || {
			paths
				.with_lock(|p| match p.read_live()? {
					None => Ok(None),
					Some(current) if current == expected => p.write(&new, header).map(|_| Some(true)),
					Some(_) => Ok(Some(false)),
				})
				.map_err(backend_err)?
				.ok_or(StorageError::NotFound)
		})
		.await
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let base_path = self.base_path.clone();
		let prefix = prefix.to_string();
		let stem_prefix = Self::file_stem(&prefix);
		self.blocking(move || {
			let entries = match fs::read_dir(&base_path) {
				Ok(entries) => entries,
				Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
				Err(e) => return Err(backend_err(e)),
			};
			let keys = entries
				.filter_map(Result::ok)
				.map(|entry| entry.path())
				.filter(|path| path.extension().is_some_and(|ext| ext == "bin"))
				.filter_map(|path| {
					let stem = path.file_stem()?.to_str()?;
					let rest = stem.strip_prefix(stem_prefix.as_str())?;
					let header = RecordHeader::decode(&fs::read(&path).ok()?).ok()?;
					(!header.is_expired()).then(|| format!("{}{}", prefix, rest))
				})
				.collect();
			Ok(keys)
		})
		.await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let base_path = self.base_path.clone();
		self.blocking(move || {
			let entries = match fs::read_dir(&base_path) {
				Ok(entries) => entries,
				Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
				Err(e) => return Err(backend_err(e)),
			};
			let removed = entries
				.filter_map(Result::ok)
				.map(|entry| entry.path())
				.filter(|path| path.extension().is_some_and(|ext| ext == "bin"))
				.filter(|path| remove_if_expired(path))
				.count();
			Ok(removed)
		})
		.await
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional = vec![Field::new("storage_path", FieldType::String)];
		optional.extend(EXPIRING_NAMESPACES.iter().map(|key| {
			Field::new(
				format!("ttl_{}", key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			)
		}));
		Schema::new(vec![], optional).validate(config)?;

		let fixed = config
			.as_table()
			.into_iter()
			.flat_map(|table| table.keys())
			.find(|name| {
				name.strip_prefix("ttl_").is_some_and(|ns| {
					!EXPIRING_NAMESPACES.iter().any(|key| key.as_str() == ns)
				})
			});
		match fixed {
			Some(name) => Err(ValidationError::InvalidValue {
				field: name.clone(),
				message: "only messages may expire".into(),
			}),
			None => Ok(()),
		}
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/storage")
/// - `ttl_messages`: default TTL in seconds for stored alert messages
///   (default: 0, never expires)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
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

impl StorageRegistry for Registry {}
