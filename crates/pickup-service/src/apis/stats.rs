//! Task statistics endpoint.

use pickup_core::PickupEngine;
use pickup_types::TaskStatsResponse;

/// Handles GET /api/stats requests.
pub async fn get_stats(engine: &PickupEngine) -> TaskStatsResponse {
	let counts = engine.stats();
	TaskStatsResponse {
		scheduled: counts.scheduled,
		applied: counts.applied,
		stale: counts.stale,
		unknown: counts.unknown,
		failed: counts.failed,
		pending: engine.pending_tasks().await as u64,
	}
}
