//! Order endpoints.
//!
//! Placement creates the order in its initial status and lets the engine
//! take over from the change event. Status writes come from actors outside
//! the lifecycle core: the business confirming or cancelling, and the
//! courier recording the outcome of a collection.

use super::{engine_error, require_id};
use pickup_core::PickupEngine;
use pickup_types::{APIError, OrderResponse, PlaceOrderRequest, UpdateStatusRequest};
use tracing::info;

/// Handles POST /api/orders requests.
pub async fn place_order(
	request: PlaceOrderRequest,
	engine: &PickupEngine,
) -> Result<OrderResponse, APIError> {
	require_id("itemId", &request.item_id)?;
	require_id("businessId", &request.business_id)?;

	let token = request
		.notification_token
		.filter(|token| !token.trim().is_empty());
	let order = engine
		.place_order(&request.item_id, &request.business_id, token)
		.await
		.map_err(engine_error)?;

	Ok(order.into())
}

/// Handles GET /api/orders/{id} requests.
pub async fn get_order_by_id(id: &str, engine: &PickupEngine) -> Result<OrderResponse, APIError> {
	require_id("id", id)?;
	let order = engine.get_order(id).await.map_err(engine_error)?;
	Ok(order.into())
}

/// Handles PUT /api/orders/{id}/status requests.
pub async fn update_order_status(
	id: &str,
	request: UpdateStatusRequest,
	engine: &PickupEngine,
) -> Result<OrderResponse, APIError> {
	require_id("id", id)?;
	require_id("status", request.status.code())?;

	info!(order_id = %id, status = %request.status, "External status write");
	let order = engine
		.update_status(id, request.status)
		.await
		.map_err(engine_error)?;

	Ok(order.into())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{engine_with_catalog, test_engine};
	use pickup_types::OrderStatus;

	fn request(item_id: &str, business_id: &str) -> PlaceOrderRequest {
		PlaceOrderRequest {
			item_id: item_id.into(),
			business_id: business_id.into(),
			notification_token: Some("device-1".into()),
		}
	}

	#[tokio::test]
	async fn test_place_and_read_order() {
		let engine = engine_with_catalog().await;

		let placed = place_order(request("item-1", "biz-1"), &engine)
			.await
			.unwrap();
		assert_eq!(placed.status, OrderStatus::Placed);
		assert_eq!(placed.status_name, "PLACED");

		let fetched = get_order_by_id(&placed.id, &engine).await.unwrap();
		assert_eq!(fetched.id, placed.id);
		assert_eq!(fetched.item_id, "item-1");
	}

	#[tokio::test]
	async fn test_place_order_with_unknown_item() {
		let engine = test_engine();
		let err = place_order(request("missing", "biz-1"), &engine)
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), 404);
		assert_eq!(err.to_error_response().error, "ITEM_NOT_FOUND");
	}

	#[tokio::test]
	async fn test_place_order_rejects_blank_ids() {
		let engine = test_engine();
		let err = place_order(request("", "biz-1"), &engine).await.unwrap_err();
		assert_eq!(err.status_code(), 400);
	}

	#[tokio::test]
	async fn test_get_unknown_order() {
		let engine = test_engine();
		let err = get_order_by_id("nope", &engine).await.unwrap_err();
		assert_eq!(err.status_code(), 404);
		assert_eq!(err.to_error_response().error, "ORDER_NOT_FOUND");
	}

	#[tokio::test]
	async fn test_external_writes() {
		let engine = engine_with_catalog().await;
		let placed = place_order(request("item-1", "biz-1"), &engine)
			.await
			.unwrap();

		let confirmed = update_order_status(
			&placed.id,
			UpdateStatusRequest {
				status: OrderStatus::Confirmed,
			},
			&engine,
		)
		.await
		.unwrap();
		assert_eq!(confirmed.status, OrderStatus::Confirmed);

		let collected = update_order_status(
			&placed.id,
			UpdateStatusRequest {
				status: OrderStatus::from("OOOO"),
			},
			&engine,
		)
		.await
		.unwrap();
		assert_eq!(collected.status.code(), "OOOO");
	}

	#[tokio::test]
	async fn test_write_after_cancellation_conflicts() {
		let engine = engine_with_catalog().await;
		let placed = place_order(request("item-1", "biz-1"), &engine)
			.await
			.unwrap();

		update_order_status(
			&placed.id,
			UpdateStatusRequest {
				status: OrderStatus::Cancelled,
			},
			&engine,
		)
		.await
		.unwrap();

		let err = update_order_status(
			&placed.id,
			UpdateStatusRequest {
				status: OrderStatus::Confirmed,
			},
			&engine,
		)
		.await
		.unwrap_err();
		assert_eq!(err.status_code(), 409);
	}

	#[tokio::test]
	async fn test_pickup_outcome_before_confirmation_conflicts() {
		let engine = engine_with_catalog().await;
		let placed = place_order(request("item-1", "biz-1"), &engine)
			.await
			.unwrap();

		for status in [OrderStatus::from("OOOO"), OrderStatus::AwaitingPickup] {
			let err = update_order_status(&placed.id, UpdateStatusRequest { status }, &engine)
				.await
				.unwrap_err();
			assert_eq!(err.status_code(), 409);
			assert_eq!(err.to_error_response().error, "INVALID_TRANSITION");
		}

		let order = get_order_by_id(&placed.id, &engine).await.unwrap();
		assert_eq!(order.status, OrderStatus::Placed);
	}

	#[tokio::test]
	async fn test_blank_status_rejected() {
		let engine = engine_with_catalog().await;
		let placed = place_order(request("item-1", "biz-1"), &engine)
			.await
			.unwrap();

		let err = update_order_status(
			&placed.id,
			UpdateStatusRequest {
				status: OrderStatus::from(""),
			},
			&engine,
		)
		.await
		.unwrap_err();
		assert_eq!(err.status_code(), 400);
	}
}
