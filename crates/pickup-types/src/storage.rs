//! Storage-related types for the pickup system.

use std::str::FromStr;

/// Storage keys for different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order records
	Orders,
	/// Item reference data
	Items,
	/// Business reference data
	Businesses,
	/// Outbound business messages awaiting external delivery
	Messages,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Items => "items",
			StorageKey::Businesses => "businesses",
			StorageKey::Messages => "messages",
		}
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"items" => Ok(Self::Items),
			"businesses" => Ok(Self::Businesses),
			"messages" => Ok(Self::Messages),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
