//! API types for the pickup HTTP API.
//!
//! Request and response bodies for placing orders, recording external status
//! changes and registering the reference data orders point at.

use crate::{CollectionWindow, Order, OrderStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request body for `POST /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
	pub item_id: String,
	pub business_id: String,
	#[serde(default)]
	pub notification_token: Option<String>,
}

/// Request body for `PUT /api/orders/{id}/status`.
///
/// Written by actors outside the lifecycle core: the business confirming or
/// cancelling, or the courier recording a completed pickup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
	pub status: OrderStatus,
}

/// Request body for `PUT /api/items/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutItemRequest {
	pub name: String,
	pub collection: CollectionWindow,
}

/// Request body for `PUT /api/businesses/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutBusinessRequest {
	pub name: String,
	pub contact_address: String,
}

/// Response body for order endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
	pub id: String,
	/// Stored status code.
	pub status: OrderStatus,
	/// Human-readable status name.
	pub status_name: String,
	pub item_id: String,
	pub business_id: String,
	pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
	fn from(order: Order) -> Self {
		Self {
			status_name: order.status.to_string(),
			id: order.id,
			status: order.status,
			item_id: order.item_id,
			business_id: order.business_id,
			created_at: order.created_at,
		}
	}
}

/// Counters describing what happened to delivered tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatsResponse {
	pub scheduled: u64,
	pub applied: u64,
	pub stale: u64,
	pub unknown: u64,
	pub failed: u64,
	pub pending: u64,
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Bad request with validation errors (400)
	BadRequest { error_type: String, message: String },
	/// Referenced record does not exist (404)
	NotFound { error_type: String, message: String },
	/// The write conflicts with the record's current state (409)
	Conflict { error_type: String, message: String },
	/// Service unavailable with optional retry information (503)
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message, retry_after) = match self {
			APIError::BadRequest {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::Conflict {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message, None),
			APIError::ServiceUnavailable {
				error_type,
				message,
				retry_after,
			} => (error_type, message, *retry_after),
		};
		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
			details: None,
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let response = self.to_error_response();
		write!(f, "{} ({})", response.message, response.error)
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_response_mapping() {
		let err = APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".into(),
			message: "Order not found: abc".into(),
		};
		assert_eq!(err.status_code(), 404);
		let body = err.to_error_response();
		assert_eq!(body.error, "ORDER_NOT_FOUND");
		assert!(body.retry_after.is_none());
	}

	#[test]
	fn test_update_status_request_accepts_codes() {
		let req: UpdateStatusRequest = serde_json::from_str(r#"{"status":"OO"}"#).unwrap();
		assert_eq!(req.status, OrderStatus::Confirmed);
	}
}
