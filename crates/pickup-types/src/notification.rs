//! Outbound notification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A push notification for the customer's device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
	pub destination_token: String,
	pub title: String,
	pub body: String,
}

/// A free-form message queued for a business, picked up by an external
/// delivery worker from the messages collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
	pub to: String,
	pub body: String,
	pub created_at: DateTime<Utc>,
}
