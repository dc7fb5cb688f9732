//! Outbound notifications for the pickup lifecycle service.
//!
//! Customers get a push notification when their order is confirmed,
//! cancelled or becomes ready for collection. Delivery goes through a
//! pluggable [`NotifierInterface`] backend and is fire-and-forget: failures
//! are reported to the caller for logging and never affect order state.

use async_trait::async_trait;
use pickup_types::{truncate_id, ConfigSchema, ImplementationRegistry, PushNotification};
use thiserror::Error;

pub mod compose;

pub use compose::{compose_business_alert, compose_status_notification, NotificationContent};

/// Re-export implementations
pub mod implementations {
	pub mod log;
	pub mod webhook;
}

/// Errors that can occur while delivering notifications.
#[derive(Debug, Error)]
pub enum NotifyError {
	/// Error that occurs when the push channel cannot be reached.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when the push channel rejects a notification.
	#[error("Delivery rejected: {0}")]
	Rejected(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for push notification channels.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NotifierInterface: Send + Sync {
	/// Returns the configuration schema for this notifier implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Sends one push notification.
	async fn send_push(&self, notification: PushNotification) -> Result<(), NotifyError>;
}

/// Type alias for notifier factory functions.
pub type NotifierFactory = fn(&toml::Value) -> Result<Box<dyn NotifierInterface>, NotifyError>;

/// Registry trait for notifier implementations.
pub trait NotifierRegistry: ImplementationRegistry<Factory = NotifierFactory> {}

/// Get all registered notifier implementations.
pub fn get_all_implementations() -> Vec<(&'static str, NotifierFactory)> {
	use implementations::{log, webhook};

	vec![
		(log::Registry::NAME, log::Registry::factory()),
		(webhook::Registry::NAME, webhook::Registry::factory()),
	]
}

/// Service wrapping the configured push channel.
pub struct NotifierService {
	backend: Box<dyn NotifierInterface>,
}

impl NotifierService {
	pub fn new(backend: Box<dyn NotifierInterface>) -> Self {
		Self { backend }
	}

	/// Sends `content` to `destination_token`.
	pub async fn send(
		&self,
		destination_token: &str,
		content: NotificationContent,
	) -> Result<(), NotifyError> {
		let notification = content.into_push(destination_token);
		tracing::debug!(
			token = %truncate_id(destination_token),
			title = %notification.title,
			"Sending push notification"
		);
		self.backend.send_push(notification).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_send_addresses_token() {
		let mut backend = MockNotifierInterface::new();
		backend
			.expect_send_push()
			.withf(|n| n.destination_token == "device-1" && n.title == "Order Cancelled")
			.times(1)
			.returning(|_| Ok(()));

		let service = NotifierService::new(Box::new(backend));
		let content = NotificationContent {
			title: "Order Cancelled".into(),
			body: "body".into(),
		};
		service.send("device-1", content).await.unwrap();
	}

	#[test]
	fn test_all_implementations_registered() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["log", "webhook"]);
	}
}
