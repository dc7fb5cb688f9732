//! Dynamic factory registry for pickup implementations.
//!
//! Every backend crate exposes `get_all_implementations()`. The registry
//! collects them once and hands the builder only the factories the
//! configuration actually names.

use pickup_config::Config;
use pickup_core::{PickupBuilder, PickupEngine, PickupFactories};
use pickup_dispatch::DispatchFactory;
use pickup_notify::NotifierFactory;
use pickup_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub dispatch: HashMap<String, DispatchFactory>,
	pub notifier: HashMap<String, NotifierFactory>,
}

impl FactoryRegistry {
	fn new() -> Self {
		Self {
			storage: HashMap::new(),
			dispatch: HashMap::new(),
			notifier: HashMap::new(),
		}
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the global registry, populating it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in pickup_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.storage.insert(name.to_string(), factory);
		}

		for (name, factory) in pickup_dispatch::get_all_implementations() {
			tracing::debug!("Registering dispatch implementation: {}", name);
			registry.dispatch.insert(name.to_string(), factory);
		}

		for (name, factory) in pickup_notify::get_all_implementations() {
			tracing::debug!("Registering notifier implementation: {}", name);
			registry.notifier.insert(name.to_string(), factory);
		}

		registry
	})
}

/// Picks the factories named in a config section, failing on unknown names.
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Builds the pickup engine from configuration using the registered implementations.
pub fn build_engine_from_config(
	config: Config,
) -> Result<PickupEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let dispatch_factories = build_factories!(
		registry,
		config.dispatch.implementations,
		dispatch,
		"dispatch"
	);
	let notifier_factories = build_factories!(
		registry,
		config.notifier.implementations,
		notifier,
		"notifier"
	);

	let factories = PickupFactories {
		storage_factories,
		dispatch_factories,
		notifier_factories,
	};

	Ok(PickupBuilder::new(config).build(factories)?)
}
