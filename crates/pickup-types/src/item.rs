//! Reference data read by the lifecycle core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a collection window ends before it starts.
#[derive(Debug, Error, PartialEq)]
#[error("Collection window ends ({to}) before it starts ({from})")]
pub struct InvalidWindow {
	pub from: DateTime<Utc>,
	pub to: DateTime<Utc>,
}

/// The interval during which an item can be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionWindow {
	pub from: DateTime<Utc>,
	pub to: DateTime<Utc>,
}

impl CollectionWindow {
	/// Creates a window, rejecting `from > to`.
	pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, InvalidWindow> {
		let window = Self { from, to };
		window.validate()?;
		Ok(window)
	}

	/// Checks the `from <= to` invariant on a deserialized window.
	pub fn validate(&self) -> Result<(), InvalidWindow> {
		if self.from > self.to {
			return Err(InvalidWindow {
				from: self.from,
				to: self.to,
			});
		}
		Ok(())
	}
}

/// An item an order is placed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
	pub id: String,
	pub name: String,
	/// When the item can be picked up.
	pub collection: CollectionWindow,
}

/// The business selling an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
	pub id: String,
	pub name: String,
	/// Where new-order alerts are sent.
	pub contact_address: String,
}
