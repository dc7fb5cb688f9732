//! Builder pattern for constructing pickup engines.
//!
//! Storage, dispatch and notifier backends are created from their
//! `[<component>.implementations.<name>]` tables through factory functions
//! keyed by implementation name. Only the primary implementation of each
//! component is used by the engine, but every configured one is built so
//! configuration errors surface at startup.

use crate::engine::{event_bus::EventBus, PickupEngine};
use pickup_config::Config;
use pickup_dispatch::{DispatchError, DispatchInterface, DispatchService};
use pickup_notify::{NotifierInterface, NotifierService, NotifyError};
use pickup_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation name.
pub struct PickupFactories<SF, DF, NF> {
	pub storage_factories: HashMap<String, SF>,
	pub dispatch_factories: HashMap<String, DF>,
	pub notifier_factories: HashMap<String, NF>,
}

/// Builder for constructing a PickupEngine with pluggable implementations.
pub struct PickupBuilder {
	config: Config,
}

impl PickupBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the PickupEngine using factories for each component type.
	pub fn build<SF, DF, NF>(
		self,
		factories: PickupFactories<SF, DF, NF>,
	) -> Result<PickupEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		DF: Fn(&toml::Value) -> Result<Box<dyn DispatchInterface>, DispatchError>,
		NF: Fn(&toml::Value) -> Result<Box<dyn NotifierInterface>, NotifyError>,
	{
		let storage_backend = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(
			StorageService::new(storage_backend).with_transaction_timeout(Duration::from_millis(
				self.config.storage.transaction_timeout_ms,
			)),
		);

		let dispatch_backend = load_primary(
			"dispatch",
			&self.config.dispatch.primary,
			&self.config.dispatch.implementations,
			&factories.dispatch_factories,
		)?;
		let dispatch = Arc::new(DispatchService::new(
			dispatch_backend,
			self.config.dispatch.max_attempts,
			Duration::from_secs(self.config.dispatch.retry_delay_seconds),
		));

		let notifier_backend = load_primary(
			"notifier",
			&self.config.notifier.primary,
			&self.config.notifier.implementations,
			&factories.notifier_factories,
		)?;
		let notifier = Arc::new(NotifierService::new(notifier_backend));

		Ok(PickupEngine::new(
			self.config,
			storage,
			dispatch,
			notifier,
			EventBus::new(1000),
		))
	}
}

/// Builds every configured implementation of one component and returns the primary.
fn load_primary<T, E, F>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	T: ?Sized,
	E: Display,
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "Unknown implementation, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}
