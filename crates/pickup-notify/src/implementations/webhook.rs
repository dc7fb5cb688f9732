//! Notifier that posts each push notification to an HTTP endpoint.
//!
//! The body is the JSON form of [`PushNotification`]:
//! `{"destinationToken": ..., "title": ..., "body": ...}`. Any non-2xx
//! response counts as a rejected delivery.

use crate::{NotifierFactory, NotifierInterface, NotifierRegistry, NotifyError};
use async_trait::async_trait;
use pickup_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, PushNotification, Schema,
	ValidationError,
};
use std::time::Duration;

/// Webhook-based push notifier.
pub struct WebhookNotifier {
	client: reqwest::Client,
	url: String,
	auth_token: Option<String>,
}

impl WebhookNotifier {
	pub fn new(
		url: impl Into<String>,
		timeout: Duration,
		auth_token: Option<String>,
	) -> Result<Self, NotifyError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| NotifyError::Configuration(format!("Failed to build client: {}", e)))?;
		Ok(Self {
			client,
			url: url.into(),
			auth_token,
		})
	}
}

#[async_trait]
impl NotifierInterface for WebhookNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(WebhookNotifierSchema)
	}

	async fn send_push(&self, notification: PushNotification) -> Result<(), NotifyError> {
		let mut request = self.client.post(&self.url).json(&notification);
		if let Some(token) = &self.auth_token {
			request = request.bearer_auth(token);
		}

		let response = request
			.send()
			.await
			.map_err(|e| NotifyError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(NotifyError::Rejected(format!("HTTP {}: {}", status, body)));
		}
		Ok(())
	}
}

/// Configuration schema for WebhookNotifier.
pub struct WebhookNotifierSchema;

impl ConfigSchema for WebhookNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
						Ok(())
					},
					_ => Err("url must start with http:// or https://".to_string()),
				}
			})],
			vec![
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
				Field::new("auth_token", FieldType::String),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a webhook notifier from configuration.
///
/// Configuration parameters:
/// - `url`: endpoint receiving the JSON POST (required)
/// - `timeout_seconds`: request timeout (default: 10)
/// - `auth_token`: sent as a bearer token when present
pub fn create_notifier(config: &toml::Value) -> Result<Box<dyn NotifierInterface>, NotifyError> {
	WebhookNotifierSchema
		.validate(config)
		.map_err(|e| NotifyError::Configuration(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| NotifyError::Configuration("url is required".into()))?;
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map_or(10, |v| v as u64);
	let auth_token = config
		.get("auth_token")
		.and_then(|v| v.as_str())
		.map(String::from);

	Ok(Box::new(WebhookNotifier::new(
		url,
		Duration::from_secs(timeout),
		auth_token,
	)?))
}

/// Registry for the webhook notifier implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "webhook";
	type Factory = NotifierFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl NotifierRegistry for Registry {}
