//! Recovery module for restoring pending timeouts after a restart.
//!
//! Order records are durable but the tasks waiting in the dispatch backend
//! may not be. On startup every order still waiting on a timeout gets that
//! timeout scheduled again. Tasks that survived in a durable backend end up
//! delivered twice, which the transition guard already tolerates.

use crate::handlers::SchedulingHandler;
use pickup_storage::StorageService;
use pickup_types::{truncate_id, Order, StorageKey, TaskKind};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during recovery operations.
#[derive(Debug, Error)]
pub enum RecoveryError {
	/// The order namespace could not be scanned.
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Report of the recovery operation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecoveryReport {
	/// Orders found in storage.
	pub total_orders: usize,
	/// Orders in a status some timeout task leaves.
	pub active_orders: usize,
	/// Timeouts scheduled again.
	pub rescheduled: usize,
	/// Active orders whose timeout could not be scheduled.
	pub failed: usize,
}

/// Service that re-schedules the timeouts of stored orders.
pub struct RecoveryService {
	storage: Arc<StorageService>,
	scheduling: Arc<SchedulingHandler>,
}

impl RecoveryService {
	/// Creates a new RecoveryService instance.
	///
	/// # Arguments
	///
	/// * `storage` - Storage service holding the order records
	/// * `scheduling` - Handler that computes deadlines and enqueues tasks
	pub fn new(storage: Arc<StorageService>, scheduling: Arc<SchedulingHandler>) -> Self {
		Self {
			storage,
			scheduling,
		}
	}

	/// Scans stored orders and schedules the timeout each active one is owed.
	///
	/// A failure for one order is logged and counted; it does not stop the
	/// scan.
	#[instrument(skip_all)]
	pub async fn recover_state(&self) -> Result<RecoveryReport, RecoveryError> {
		tracing::info!("Starting timeout recovery from storage");

		let orders: Vec<Order> = self
			.storage
			.retrieve_all(StorageKey::Orders.as_str())
			.await
			.map_err(|e| RecoveryError::Storage(e.to_string()))?;

		let mut report = RecoveryReport {
			total_orders: orders.len(),
			..RecoveryReport::default()
		};

		for order in orders.iter().filter(|order| awaits_timeout(order)) {
			report.active_orders += 1;
			match self.scheduling.reschedule(order).await {
				Ok(Some(_)) => report.rescheduled += 1,
				Ok(None) => {},
				Err(e) => {
					report.failed += 1;
					tracing::warn!(
						order_id = %truncate_id(&order.id),
						status = %order.status,
						"Failed to reschedule timeout: {}",
						e
					);
				},
			}
		}

		tracing::info!(
			total = report.total_orders,
			active = report.active_orders,
			rescheduled = report.rescheduled,
			failed = report.failed,
			"Timeout recovery finished"
		);
		Ok(report)
	}
}

/// Whether some timeout task still has this order's status as precondition.
fn awaits_timeout(order: &Order) -> bool {
	TaskKind::all().any(|kind| kind.precondition() == order.status)
}
