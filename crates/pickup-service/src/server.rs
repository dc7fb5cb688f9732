//! HTTP server for the pickup API.
//!
//! Exposes the writes that actors outside the lifecycle core perform:
//! registering reference data, placing orders and recording status changes.

use axum::{
	extract::{Path, State},
	response::Json,
	routing::{get, post, put},
	Router,
};
use pickup_config::ApiConfig;
use pickup_core::PickupEngine;
use pickup_types::{
	APIError, Business, Item, OrderResponse, PlaceOrderRequest, PutBusinessRequest,
	PutItemRequest, TaskStatsResponse, UpdateStatusRequest,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the engine for processing requests.
	pub engine: Arc<PickupEngine>,
}

/// Builds the router with every route nested under `/api`.
pub fn router(engine: Arc<PickupEngine>) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/items/{id}", put(handle_put_item))
				.route("/businesses/{id}", put(handle_put_business))
				.route("/orders", post(handle_place_order))
				.route("/orders/{id}", get(handle_get_order_by_id))
				.route("/orders/{id}/status", put(handle_update_status))
				.route("/stats", get(handle_stats)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive()),
		)
		.with_state(AppState { engine })
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<PickupEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Pickup API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles PUT /api/items/{id} requests.
async fn handle_put_item(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<PutItemRequest>,
) -> Result<Json<Item>, APIError> {
	match crate::apis::catalog::put_item(&id, request, &state.engine).await {
		Ok(item) => Ok(Json(item)),
		Err(e) => {
			tracing::warn!("Item registration failed: {}", e);
			Err(e)
		},
	}
}

/// Handles PUT /api/businesses/{id} requests.
async fn handle_put_business(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<PutBusinessRequest>,
) -> Result<Json<Business>, APIError> {
	match crate::apis::catalog::put_business(&id, request, &state.engine).await {
		Ok(business) => Ok(Json(business)),
		Err(e) => {
			tracing::warn!("Business registration failed: {}", e);
			Err(e)
		},
	}
}

/// Handles POST /api/orders requests.
async fn handle_place_order(
	State(state): State<AppState>,
	Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<OrderResponse>, APIError> {
	match crate::apis::order::place_order(request, &state.engine).await {
		Ok(order) => Ok(Json(order)),
		Err(e) => {
			tracing::warn!("Order placement failed: {}", e);
			Err(e)
		},
	}
}

/// Handles GET /api/orders/{id} requests.
async fn handle_get_order_by_id(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, APIError> {
	match crate::apis::order::get_order_by_id(&id, &state.engine).await {
		Ok(order) => Ok(Json(order)),
		Err(e) => {
			tracing::warn!("Order retrieval failed: {}", e);
			Err(e)
		},
	}
}

/// Handles PUT /api/orders/{id}/status requests.
async fn handle_update_status(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, APIError> {
	match crate::apis::order::update_order_status(&id, request, &state.engine).await {
		Ok(order) => Ok(Json(order)),
		Err(e) => {
			tracing::warn!("Status update failed: {}", e);
			Err(e)
		},
	}
}

/// Handles GET /api/stats requests.
async fn handle_stats(State(state): State<AppState>) -> Json<TaskStatsResponse> {
	Json(crate::apis::stats::get_stats(&state.engine).await)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::test_engine;
	use axum::{
		body::{to_bytes, Body},
		http::{Request, StatusCode},
	};
	use chrono::{Duration, Utc};
	use pickup_types::ErrorResponse;
	use serde_json::{json, Value};
	use tower::ServiceExt;

	async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
		let request = Request::builder()
			.method(method)
			.uri(uri)
			.header("content-type", "application/json")
			.body(match body {
				Some(body) => Body::from(body.to_string()),
				None => Body::empty(),
			})
			.unwrap();

		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let value = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap()
		};
		(status, value)
	}

	#[tokio::test]
	async fn test_order_flow_over_http() {
		let app = router(Arc::new(test_engine()));
		let now = Utc::now();

		let (status, _) = call(
			&app,
			"PUT",
			"/api/items/item-1",
			Some(json!({
				"name": "Surprise Bag",
				"collection": { "from": now + Duration::hours(1), "to": now + Duration::hours(2) }
			})),
		)
		.await;
		assert_eq!(status, StatusCode::OK);

		let (status, _) = call(
			&app,
			"PUT",
			"/api/businesses/biz-1",
			Some(json!({ "name": "Corner Bakery", "contactAddress": "+6512345678" })),
		)
		.await;
		assert_eq!(status, StatusCode::OK);

		let (status, order) = call(
			&app,
			"POST",
			"/api/orders",
			Some(json!({ "itemId": "item-1", "businessId": "biz-1", "notificationToken": "device-1" })),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(order["status"], "O");
		let id = order["id"].as_str().unwrap().to_string();

		let (status, order) = call(
			&app,
			"PUT",
			&format!("/api/orders/{}/status", id),
			Some(json!({ "status": "OO" })),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(order["statusName"], "CONFIRMED");

		let (status, order) = call(&app, "GET", &format!("/api/orders/{}", id), None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(order["status"], "OO");

		let (status, stats) = call(&app, "GET", "/api/stats", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(stats["applied"], 0);
	}

	#[tokio::test]
	async fn test_errors_use_error_response_body() {
		let app = router(Arc::new(test_engine()));

		let (status, body) = call(&app, "GET", "/api/orders/unknown", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let error: ErrorResponse = serde_json::from_value(body).unwrap();
		assert_eq!(error.error, "ORDER_NOT_FOUND");

		let (status, body) = call(
			&app,
			"POST",
			"/api/orders",
			Some(json!({ "itemId": "item-x", "businessId": "biz-x" })),
		)
		.await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "ITEM_NOT_FOUND");
	}
}
