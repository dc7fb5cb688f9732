//! Reference data endpoints.
//!
//! Items and businesses are owned by the marketplace. The lifecycle core only
//! reads them, so these endpoints simply store whatever the owner sends.

use super::{engine_error, require_id};
use pickup_core::PickupEngine;
use pickup_types::{APIError, Business, Item, PutBusinessRequest, PutItemRequest};

/// Handles PUT /api/items/{id} requests.
pub async fn put_item(
	id: &str,
	request: PutItemRequest,
	engine: &PickupEngine,
) -> Result<Item, APIError> {
	require_id("id", id)?;
	let item = Item {
		id: id.to_string(),
		name: request.name,
		collection: request.collection,
	};
	engine.register_item(&item).await.map_err(engine_error)?;
	tracing::debug!(item_id = %id, "Item registered");
	Ok(item)
}

/// Handles PUT /api/businesses/{id} requests.
pub async fn put_business(
	id: &str,
	request: PutBusinessRequest,
	engine: &PickupEngine,
) -> Result<Business, APIError> {
	require_id("id", id)?;
	require_id("contactAddress", &request.contact_address)?;
	let business = Business {
		id: id.to_string(),
		name: request.name,
		contact_address: request.contact_address,
	};
	engine
		.register_business(&business)
		.await
		.map_err(engine_error)?;
	tracing::debug!(business_id = %id, "Business registered");
	Ok(business)
}
