//! Order types for the pickup lifecycle.
//!
//! An order references one item and one business. Its status is stored as a
//! short wire code ("O", "OO", ...) so records written by other actors stay
//! readable; codes this crate does not know are preserved verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A perishable, time-windowed collection order.
///
/// Only `status` is ever mutated by the lifecycle core. Every other field is
/// written once by the placement flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Current status of the order.
	pub status: OrderStatus,
	/// The item being collected.
	pub item_id: String,
	/// The business that sells the item.
	pub business_id: String,
	/// Opaque destination for push notifications to the customer.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notification_token: Option<String>,
	/// Time the order was placed.
	pub created_at: DateTime<Utc>,
}

impl Order {
	/// Creates a freshly placed order.
	pub fn placed(
		id: impl Into<String>,
		item_id: impl Into<String>,
		business_id: impl Into<String>,
		notification_token: Option<String>,
		created_at: DateTime<Utc>,
	) -> Self {
		Self {
			id: id.into(),
			status: OrderStatus::Placed,
			item_id: item_id.into(),
			business_id: business_id.into(),
			notification_token,
			created_at,
		}
	}
}

/// Status of an order.
///
/// Serialized as the stored status code. `Other` carries any code written by
/// an actor outside the lifecycle core, such as a courier recording a
/// completed pickup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
	/// Placed by the customer, waiting for the business ("O").
	Placed,
	/// Confirmed by the business ("OO").
	Confirmed,
	/// Cancelled before confirmation ("OX").
	Cancelled,
	/// Collection window has opened ("OOO").
	AwaitingPickup,
	/// Collection window closed without a pickup ("OOX").
	PickupFailed,
	/// A status code owned by an external actor.
	Other(String),
}

impl OrderStatus {
	/// Returns the stored status code.
	pub fn code(&self) -> &str {
		match self {
			OrderStatus::Placed => "O",
			OrderStatus::Confirmed => "OO",
			OrderStatus::Cancelled => "OX",
			OrderStatus::AwaitingPickup => "OOO",
			OrderStatus::PickupFailed => "OOX",
			OrderStatus::Other(code) => code,
		}
	}
}

impl From<String> for OrderStatus {
	fn from(code: String) -> Self {
		match code.as_str() {
			"O" => OrderStatus::Placed,
			"OO" => OrderStatus::Confirmed,
			"OX" => OrderStatus::Cancelled,
			"OOO" => OrderStatus::AwaitingPickup,
			"OOX" => OrderStatus::PickupFailed,
			_ => OrderStatus::Other(code),
		}
	}
}

impl From<&str> for OrderStatus {
	fn from(code: &str) -> Self {
		OrderStatus::from(code.to_string())
	}
}

impl From<OrderStatus> for String {
	fn from(status: OrderStatus) -> Self {
		match status {
			OrderStatus::Other(code) => code,
			known => known.code().to_string(),
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			OrderStatus::Placed => "PLACED",
			OrderStatus::Confirmed => "CONFIRMED",
			OrderStatus::Cancelled => "CANCELLED",
			OrderStatus::AwaitingPickup => "AWAITING_PICKUP",
			OrderStatus::PickupFailed => "PICKUP_FAILED",
			OrderStatus::Other(code) => return write!(f, "EXTERNAL({})", code),
		};
		write!(f, "{}", name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_wire_codes() {
		let order = Order::placed("o-1", "i-1", "b-1", None, Utc::now());
		let json = serde_json::to_value(&order).unwrap();
		assert_eq!(json["status"], "O");
		assert_eq!(json["itemId"], "i-1");
		assert!(json.get("notificationToken").is_none());

		let status: OrderStatus = serde_json::from_str("\"OOO\"").unwrap();
		assert_eq!(status, OrderStatus::AwaitingPickup);
	}

	#[test]
	fn test_external_status_preserved() {
		let status: OrderStatus = serde_json::from_str("\"OOOO\"").unwrap();
		assert_eq!(status, OrderStatus::Other("OOOO".into()));
		assert_eq!(serde_json::to_string(&status).unwrap(), "\"OOOO\"");
	}
}
