//! Configuration builder for tests and local development.
//!
//! Produces a valid in-process setup (memory storage, timer dispatch, log
//! notifier) unless told otherwise, so callers only spell out what they care
//! about.

use crate::{
	ApiConfig, Config, DispatchConfig, EngineConfig, LifecycleConfig, NotifierConfig,
	ServiceConfig, StorageConfig,
};
use chrono_tz::Tz;
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	auto_cancel_minutes: u64,
	timezone: Tz,
	max_concurrent_handlers: usize,
	storage_primary: String,
	storage_cleanup_interval_seconds: u64,
	transaction_timeout_ms: u64,
	dispatch_primary: String,
	max_attempts: u32,
	retry_delay_seconds: u64,
	notifier_primary: String,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			service_id: "pickup-test".to_string(),
			auto_cancel_minutes: 30,
			timezone: chrono_tz::UTC,
			max_concurrent_handlers: 100,
			storage_primary: "memory".to_string(),
			storage_cleanup_interval_seconds: 60,
			transaction_timeout_ms: 2000,
			dispatch_primary: "timer".to_string(),
			max_attempts: 3,
			retry_delay_seconds: 1,
			notifier_primary: "log".to_string(),
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Sets the grace period before an unconfirmed order is cancelled.
	pub fn auto_cancel_minutes(mut self, minutes: u64) -> Self {
		self.auto_cancel_minutes = minutes;
		self
	}

	pub fn timezone(mut self, timezone: Tz) -> Self {
		self.timezone = timezone;
		self
	}

	pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
		self.max_concurrent_handlers = limit;
		self
	}

	/// Sets the primary storage implementation.
	pub fn storage_primary(mut self, primary: impl Into<String>) -> Self {
		self.storage_primary = primary.into();
		self
	}

	pub fn storage_cleanup_interval_seconds(mut self, interval: u64) -> Self {
		self.storage_cleanup_interval_seconds = interval;
		self
	}

	pub fn transaction_timeout_ms(mut self, timeout: u64) -> Self {
		self.transaction_timeout_ms = timeout;
		self
	}

	/// Sets the primary dispatch implementation.
	pub fn dispatch_primary(mut self, primary: impl Into<String>) -> Self {
		self.dispatch_primary = primary.into();
		self
	}

	/// Sets the redelivery policy for failed tasks.
	pub fn retry_policy(mut self, max_attempts: u32, retry_delay_seconds: u64) -> Self {
		self.max_attempts = max_attempts;
		self.retry_delay_seconds = retry_delay_seconds;
		self
	}

	/// Sets the primary notifier implementation.
	pub fn notifier_primary(mut self, primary: impl Into<String>) -> Self {
		self.notifier_primary = primary.into();
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config`, giving each primary an empty implementation table.
	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			lifecycle: LifecycleConfig {
				auto_cancel_minutes: self.auto_cancel_minutes,
				timezone: self.timezone,
			},
			engine: EngineConfig {
				max_concurrent_handlers: self.max_concurrent_handlers,
			},
			storage: StorageConfig {
				implementations: empty_table(&self.storage_primary),
				primary: self.storage_primary,
				cleanup_interval_seconds: self.storage_cleanup_interval_seconds,
				transaction_timeout_ms: self.transaction_timeout_ms,
			},
			dispatch: DispatchConfig {
				implementations: empty_table(&self.dispatch_primary),
				primary: self.dispatch_primary,
				max_attempts: self.max_attempts,
				retry_delay_seconds: self.retry_delay_seconds,
			},
			notifier: NotifierConfig {
				implementations: empty_table(&self.notifier_primary),
				primary: self.notifier_primary,
			},
			api: self.api,
		}
	}
}

fn empty_table(name: &str) -> HashMap<String, toml::Value> {
	HashMap::from([(name.to_string(), toml::Value::Table(toml::map::Map::new()))])
}
