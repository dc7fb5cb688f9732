//! Request handling behind the HTTP routes.
//!
//! Each submodule validates its request, calls the engine and converts the
//! result into API types. Engine failures are mapped onto [`APIError`] here
//! so every endpoint reports them the same way.

pub mod catalog;
pub mod order;
pub mod stats;

use pickup_core::EngineError;
use pickup_types::APIError;

/// Maps an engine failure onto the HTTP error it should produce.
pub fn engine_error(err: EngineError) -> APIError {
	match err {
		EngineError::NotFound { kind, id } => APIError::NotFound {
			error_type: format!("{}_NOT_FOUND", kind.to_uppercase()),
			message: format!("{} not found: {}", kind, id),
		},
		EngineError::Validation(message) => APIError::BadRequest {
			error_type: "INVALID_REQUEST".into(),
			message,
		},
		e @ EngineError::InvalidTransition { .. } => APIError::Conflict {
			error_type: "INVALID_TRANSITION".into(),
			message: e.to_string(),
		},
		e @ EngineError::Busy(_) => APIError::ServiceUnavailable {
			error_type: "ORDER_BUSY".into(),
			message: e.to_string(),
			retry_after: Some(1),
		},
		e => APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".into(),
			message: e.to_string(),
		},
	}
}

/// Rejects blank identifiers before they reach storage.
pub(crate) fn require_id(field: &str, value: &str) -> Result<(), APIError> {
	if value.trim().is_empty() {
		return Err(APIError::BadRequest {
			error_type: "INVALID_REQUEST".into(),
			message: format!("{} must not be empty", field),
		});
	}
	Ok(())
}
