//! Notifier that only records notifications in the service log.

use crate::{NotifierFactory, NotifierInterface, NotifierRegistry, NotifyError};
use async_trait::async_trait;
use pickup_types::{
	truncate_id, ConfigSchema, Field, FieldType, ImplementationRegistry, PushNotification, Schema,
	ValidationError,
};

/// Log-only notifier for development.
pub struct LogNotifier {
	/// Prefix added to every log line.
	prefix: String,
}

impl LogNotifier {
	pub fn new(prefix: impl Into<String>) -> Self {
		Self {
			prefix: prefix.into(),
		}
	}
}

#[async_trait]
impl NotifierInterface for LogNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogNotifierSchema)
	}

	async fn send_push(&self, notification: PushNotification) -> Result<(), NotifyError> {
		tracing::info!(
			token = %truncate_id(&notification.destination_token),
			title = %notification.title,
			body = %notification.body,
			"{}", self.prefix
		);
		Ok(())
	}
}

/// Configuration schema for LogNotifier.
pub struct LogNotifierSchema;

impl ConfigSchema for LogNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("prefix", FieldType::String)]).validate(config)
	}
}

/// Factory function to create a log notifier from configuration.
///
/// Configuration parameters:
/// - `prefix`: log message (default: "Push notification")
pub fn create_notifier(config: &toml::Value) -> Result<Box<dyn NotifierInterface>, NotifyError> {
	LogNotifierSchema
		.validate(config)
		.map_err(|e| NotifyError::Configuration(e.to_string()))?;

	let prefix = config
		.get("prefix")
		.and_then(|v| v.as_str())
		.unwrap_or("Push notification");
	Ok(Box::new(LogNotifier::new(prefix)))
}

/// Registry for the log notifier implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = NotifierFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl NotifierRegistry for Registry {}
