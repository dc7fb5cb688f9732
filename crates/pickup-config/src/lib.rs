//! Configuration module for the pickup lifecycle service.
//!
//! This module provides structures and utilities for managing service
//! configuration. It supports loading configuration from TOML files and
//! validates that every referenced implementation is actually configured.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

#[cfg(any(test, feature = "testing"))]
pub mod builders;
mod loader;

#[cfg(any(test, feature = "testing"))]
pub use builders::ConfigBuilder;

use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, not the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the pickup service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Order lifecycle constants.
	#[serde(default)]
	pub lifecycle: LifecycleConfig,
	/// Event loop tuning.
	#[serde(default)]
	pub engine: EngineConfig,
	/// Configuration for the record store.
	pub storage: StorageConfig,
	/// Configuration for deferred task dispatch.
	pub dispatch: DispatchConfig,
	/// Configuration for push notifications.
	pub notifier: NotifierConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Identity of this service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	pub id: String,
}

/// Static constants of the order lifecycle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleConfig {
	/// Grace period before an unconfirmed order is cancelled.
	#[serde(default = "default_auto_cancel_minutes")]
	pub auto_cancel_minutes: u64,
	/// Reference timezone for times shown in notifications.
	#[serde(default = "default_timezone")]
	pub timezone: Tz,
}

impl Default for LifecycleConfig {
	fn default() -> Self {
		Self {
			auto_cancel_minutes: default_auto_cancel_minutes(),
			timezone: default_timezone(),
		}
	}
}

fn default_auto_cancel_minutes() -> u64 {
	30
}

fn default_timezone() -> Tz {
	Tz::UTC
}

/// Event loop tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Upper bound on handlers running at once.
	#[serde(default = "default_max_concurrent_handlers")]
	pub max_concurrent_handlers: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			max_concurrent_handlers: default_max_concurrent_handlers(),
		}
	}
}

fn default_max_concurrent_handlers() -> usize {
	100
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	#[serde(default = "default_cleanup_interval_seconds")]
	pub cleanup_interval_seconds: u64,
	/// How long a contended transaction keeps retrying before giving up.
	#[serde(default = "default_transaction_timeout_ms")]
	pub transaction_timeout_ms: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
	3600
}

fn default_transaction_timeout_ms() -> u64 {
	2000
}

/// Configuration for deferred task dispatch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of dispatch implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Deliveries of one task before it is dropped.
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	/// Base delay before a failed task is redelivered; grows linearly per attempt.
	#[serde(default = "default_retry_delay_seconds")]
	pub retry_delay_seconds: u64,
}

fn default_max_attempts() -> u32 {
	5
}

fn default_retry_delay_seconds() -> u64 {
	10
}

/// Configuration for push notification delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of notifier implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(var_name.as_str()), cap.get(2)) {
			(Ok(v), _) => v,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name.as_str()
				)));
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Auto-cancel grace period as a std duration.
	pub fn auto_cancel_window(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.lifecycle.auto_cancel_minutes * 60)
	}

	/// Validates the configuration.
	///
	/// - service id is not empty
	/// - auto-cancel grace period is positive
	/// - each primary implementation is present in its implementations map
	/// - dispatch allows at least one attempt
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.lifecycle.auto_cancel_minutes == 0 {
			return Err(ConfigError::Validation(
				"lifecycle.auto_cancel_minutes must be greater than 0".into(),
			));
		}

		if self.engine.max_concurrent_handlers == 0 {
			return Err(ConfigError::Validation(
				"engine.max_concurrent_handlers must be greater than 0".into(),
			));
		}

		for (section, primary, implementations) in [
			(
				"storage",
				&self.storage.primary,
				&self.storage.implementations,
			),
			(
				"dispatch",
				&self.dispatch.primary,
				&self.dispatch.implementations,
			),
			(
				"notifier",
				&self.notifier.primary,
				&self.notifier.implementations,
			),
		] {
			if primary.is_empty() {
				return Err(ConfigError::Validation(format!(
					"{}.primary cannot be empty",
					section
				)));
			}
			if !implementations.contains_key(primary) {
				return Err(ConfigError::Validation(format!(
					"Primary {} '{}' is not configured in [{}.implementations]",
					section, primary, section
				)));
			}
		}

		if self.dispatch.max_attempts == 0 {
			return Err(ConfigError::Validation(
				"dispatch.max_attempts must be at least 1".into(),
			));
		}

		Ok(())
	}
}

/// Parses a TOML string, resolving environment variables and validating.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[service]
id = "pickup-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[dispatch]
primary = "timer"
[dispatch.implementations.timer]

[notifier]
primary = "log"
[notifier.implementations.log]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("PICKUP_TEST_HOST", "localhost");
		std::env::set_var("PICKUP_TEST_PORT", "5432");

		let input = "host = \"${PICKUP_TEST_HOST}:${PICKUP_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("PICKUP_TEST_HOST");
		std::env::remove_var("PICKUP_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${PICKUP_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${PICKUP_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.unwrap_err().to_string().contains("PICKUP_MISSING_VAR"));
	}

	#[test]
	fn test_defaults_applied() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.service.id, "pickup-test");
		assert_eq!(config.lifecycle.auto_cancel_minutes, 30);
		assert_eq!(config.lifecycle.timezone, Tz::UTC);
		assert_eq!(config.engine.max_concurrent_handlers, 100);
		assert_eq!(config.dispatch.max_attempts, 5);
		assert_eq!(config.storage.transaction_timeout_ms, 2000);
		assert_eq!(config.auto_cancel_window().as_secs(), 1800);
		assert!(config.api.is_none());
	}

	#[test]
	fn test_lifecycle_section() {
		let config_str = format!(
			"{}\n[lifecycle]\nauto_cancel_minutes = 15\ntimezone = \"Asia/Singapore\"\n",
			MINIMAL
		);
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.lifecycle.auto_cancel_minutes, 15);
		assert_eq!(config.lifecycle.timezone, chrono_tz::Asia::Singapore);
	}

	#[test]
	fn test_unknown_timezone_rejected() {
		let config_str = format!("{}\n[lifecycle]\ntimezone = \"Mars/Olympus\"\n", MINIMAL);
		assert!(matches!(
			config_str.parse::<Config>(),
			Err(ConfigError::Parse(_))
		));
	}

	#[test]
	fn test_missing_primary_implementation_rejected() {
		let config_str = MINIMAL.replace("primary = \"timer\"", "primary = \"cloud\"");
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Primary dispatch 'cloud'"));
	}

	#[test]
	fn test_zero_grace_period_rejected() {
		let config_str = format!("{}\n[lifecycle]\nauto_cancel_minutes = 0\n", MINIMAL);
		assert!(matches!(
			config_str.parse::<Config>(),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("PICKUP_TEST_SERVICE_ID", "from-env");
		let config_str = MINIMAL.replace("pickup-test", "${PICKUP_TEST_SERVICE_ID}");
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.service.id, "from-env");
		std::env::remove_var("PICKUP_TEST_SERVICE_ID");
	}
}
