//! Scheduling handler.
//!
//! Translates order changes into deferred tasks. Creation schedules the
//! auto-cancel; confirmation schedules the start of the pickup window; the
//! start of the pickup window schedules its end. Tasks are never cancelled
//! when the order moves on by another path, the transition guard discards
//! them when they fire.

use crate::deadline;
use crate::engine::event_bus::EventBus;
use crate::handlers::TaskStats;
use pickup_dispatch::DispatchService;
use pickup_storage::{StorageError, StorageService};
use pickup_types::{
	truncate_id, Item, Order, OrderStatus, PickupEvent, ScheduleAt, ScheduledTask, StorageKey,
	TaskEvent, TaskKind,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while scheduling lifecycle tasks.
#[derive(Debug, Error)]
pub enum SchedulingError {
	/// The order's item is gone, so no deadline can be computed.
	#[error("Item {0} referenced by the order does not exist")]
	ReferenceNotFound(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Dispatch error: {0}")]
	Dispatch(String),
}

pub struct SchedulingHandler {
	storage: Arc<StorageService>,
	dispatch: Arc<DispatchService>,
	event_bus: EventBus,
	stats: Arc<TaskStats>,
	/// Grace period before an unconfirmed order is cancelled.
	auto_cancel: Duration,
}

impl SchedulingHandler {
	pub fn new(
		storage: Arc<StorageService>,
		dispatch: Arc<DispatchService>,
		event_bus: EventBus,
		stats: Arc<TaskStats>,
		auto_cancel: Duration,
	) -> Self {
		Self {
			storage,
			dispatch,
			event_bus,
			stats,
			auto_cancel,
		}
	}

	/// Schedules the auto-cancel for a newly placed order.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id)))]
	pub async fn handle_created(&self, order: &Order) -> Result<ScheduledTask, SchedulingError> {
		let item = self.load_item(&order.item_id).await?;
		let fire_at = deadline::cancel_deadline(order.created_at, &item.collection, self.auto_cancel);
		self.schedule(TaskKind::CancelOrder, order, ScheduleAt::At(fire_at))
			.await
	}

	/// Schedules the follow-up task for a status change, if the new status has one.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id), status = %order.status))]
	pub async fn handle_status_changed(
		&self,
		order: &Order,
	) -> Result<Option<ScheduledTask>, SchedulingError> {
		let kind = match order.status {
			OrderStatus::Confirmed => TaskKind::AwaitPickup,
			OrderStatus::AwaitingPickup => TaskKind::FailPickup,
			_ => return Ok(None),
		};

		let item = self.load_item(&order.item_id).await?;
		let fire_at = match kind {
			TaskKind::AwaitPickup => deadline::pickup_start(&item.collection),
			_ => deadline::pickup_end(&item.collection),
		};
		self.schedule(kind, order, ScheduleAt::At(fire_at))
			.await
			.map(Some)
	}

	/// Schedules the timeout still owed to an order loaded from storage.
	///
	/// Used after a restart, when tasks held by a non-durable dispatch
	/// backend are gone. Returns `None` for statuses no timeout leaves.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id), status = %order.status))]
	pub async fn reschedule(&self, order: &Order) -> Result<Option<ScheduledTask>, SchedulingError> {
		match order.status {
			OrderStatus::Placed => self.handle_created(order).await.map(Some),
			_ => self.handle_status_changed(order).await,
		}
	}

	async fn load_item(&self, item_id: &str) -> Result<Item, SchedulingError> {
		self.storage
			.retrieve(StorageKey::Items.as_str(), item_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => SchedulingError::ReferenceNotFound(item_id.to_string()),
				other => SchedulingError::Storage(other.to_string()),
			})
	}

	async fn schedule(
		&self,
		kind: TaskKind,
		order: &Order,
		at: ScheduleAt,
	) -> Result<ScheduledTask, SchedulingError> {
		let task = self
			.dispatch
			.schedule(kind, &order.id, at)
			.await
			.map_err(|e| SchedulingError::Dispatch(e.to_string()))?;

		self.stats.record_scheduled();
		tracing::info!(task = %kind, fire_at = %task.fire_at, "Scheduled task");
		self.event_bus
			.publish(PickupEvent::Task(TaskEvent::Scheduled {
				payload: task.payload.clone(),
				fire_at: task.fire_at,
			}))
			.ok();

		Ok(task)
	}
}
