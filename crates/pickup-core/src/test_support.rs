//! Fixtures shared by the unit tests in this crate.

use chrono::{DateTime, Duration, Utc};
use pickup_config::{Config, ConfigBuilder};
use pickup_storage::{implementations::memory::MemoryStorage, StorageService};
use pickup_types::{Business, CollectionWindow, Item, Order};
use std::sync::Arc;

pub fn memory_storage() -> Arc<StorageService> {
	Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
}

pub fn placed_order_at(id: &str, created_at: DateTime<Utc>) -> Order {
	Order::placed(id, "item-1", "biz-1", Some("device-1".into()), created_at)
}

pub fn placed_order(id: &str) -> Order {
	placed_order_at(id, Utc::now())
}

/// An item collectable between `t + from_min` and `t + to_min` minutes.
pub fn item_with_window(id: &str, t: DateTime<Utc>, from_min: i64, to_min: i64) -> Item {
	Item {
		id: id.to_string(),
		name: "Surprise Bag".into(),
		collection: CollectionWindow::new(
			t + Duration::minutes(from_min),
			t + Duration::minutes(to_min),
		)
		.expect("valid window"),
	}
}

pub fn business(id: &str) -> Business {
	Business {
		id: id.to_string(),
		name: "Corner Bakery".into(),
		contact_address: "+6512345678".into(),
	}
}

/// In-process backends, three delivery attempts one second apart.
pub fn test_config() -> Config {
	ConfigBuilder::new().build()
}
