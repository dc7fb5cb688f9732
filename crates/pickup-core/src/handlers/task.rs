//! Task handler: the transition guard.
//!
//! Runs each delivered task through [`OrderStateMachine::apply_task`]. Stale
//! tasks and unknown task kinds are logged and discarded; storage failures
//! fail the invocation so the dispatch substrate redelivers it.

use crate::engine::event_bus::EventBus;
use crate::handlers::TaskStats;
use crate::state::{OrderStateError, OrderStateMachine, TransitionOutcome};
use pickup_types::{
	truncate_id, DiscardReason, OrderEvent, OrderStatus, PickupEvent, ScheduledTask, TaskEvent,
	TaskKind,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that fail a task invocation.
#[derive(Debug, Error)]
pub enum TaskError {
	#[error("State error: {0}")]
	State(#[from] OrderStateError),
}

/// What a delivered task did.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
	Applied {
		kind: TaskKind,
		from: OrderStatus,
		to: OrderStatus,
	},
	/// The order was no longer in the task's precondition status.
	Stale { kind: TaskKind, current: OrderStatus },
	/// The payload named a task kind outside the transition table.
	Ignored { task: String },
}

pub struct TaskHandler {
	state_machine: Arc<OrderStateMachine>,
	event_bus: EventBus,
	stats: Arc<TaskStats>,
}

impl TaskHandler {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		event_bus: EventBus,
		stats: Arc<TaskStats>,
	) -> Self {
		Self {
			state_machine,
			event_bus,
			stats,
		}
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(&task.payload.order_id), task = %task.payload.task, attempt = task.attempt))]
	pub async fn handle(&self, task: &ScheduledTask) -> Result<TaskOutcome, TaskError> {
		let order_id = &task.payload.order_id;

		let kind = match task.payload.kind() {
			Ok(kind) => kind,
			Err(unknown) => {
				tracing::warn!("Ignoring task of unknown kind");
				self.stats.record_unknown();
				self.publish_discarded(order_id, &unknown, DiscardReason::UnknownKind);
				return Ok(TaskOutcome::Ignored { task: unknown });
			},
		};

		let outcome = match self.state_machine.apply_task(order_id, kind).await {
			Ok(outcome) => outcome,
			Err(e) => {
				tracing::error!(error = %e, "Task invocation failed");
				self.stats.record_failed();
				self.event_bus
					.publish(PickupEvent::Task(TaskEvent::Failed {
						payload: task.payload.clone(),
						error: e.to_string(),
					}))
					.ok();
				return Err(e.into());
			},
		};

		match outcome {
			TransitionOutcome::Applied { previous, order } => {
				tracing::info!(from = %previous, to = %order.status, "Applied transition");
				self.stats.record_applied();

				let to = order.status.clone();
				self.event_bus
					.publish(PickupEvent::Task(TaskEvent::Applied {
						order_id: order_id.clone(),
						kind,
						from: previous.clone(),
						to: to.clone(),
					}))
					.ok();
				self.event_bus
					.publish(PickupEvent::Order(OrderEvent::StatusChanged {
						order,
						previous: previous.clone(),
					}))
					.ok();

				Ok(TaskOutcome::Applied {
					kind,
					from: previous,
					to,
				})
			},
			TransitionOutcome::Stale { current } => {
				tracing::info!(
					expected = %kind.precondition(),
					current = %current,
					"Discarding stale task"
				);
				self.stats.record_stale();
				self.publish_discarded(
					order_id,
					kind.as_str(),
					DiscardReason::Stale {
						current: current.clone(),
					},
				);
				Ok(TaskOutcome::Stale { kind, current })
			},
		}
	}

	fn publish_discarded(&self, order_id: &str, task: &str, reason: DiscardReason) {
		self.event_bus
			.publish(PickupEvent::Task(TaskEvent::Discarded {
				order_id: order_id.to_string(),
				task: task.to_string(),
				reason,
			}))
			.ok();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{memory_storage, placed_order};
	use chrono::Utc;
	use pickup_types::TaskPayload;

	struct Fixture {
		handler: TaskHandler,
		machine: Arc<OrderStateMachine>,
		stats: Arc<TaskStats>,
		bus: EventBus,
	}

	async fn fixture() -> Fixture {
		let machine = Arc::new(OrderStateMachine::new(memory_storage()));
		machine.store_order(&placed_order("order-1")).await.unwrap();
		let stats = Arc::new(TaskStats::default());
		let bus = EventBus::new(64);
		Fixture {
			handler: TaskHandler::new(machine.clone(), bus.clone(), stats.clone()),
			machine,
			stats,
			bus,
		}
	}

	fn delivered(task: &str, order_id: &str) -> ScheduledTask {
		ScheduledTask {
			id: "t1".into(),
			payload: TaskPayload {
				task: task.into(),
				order_id: order_id.into(),
			},
			fire_at: Utc::now(),
			attempt: 1,
		}
	}

	#[tokio::test]
	async fn test_applied_task_publishes_status_change() {
		let f = fixture().await;
		let mut events = f.bus.subscribe();

		let outcome = f
			.handler
			.handle(&delivered("CANCEL_ORDER", "order-1"))
			.await
			.unwrap();
		assert_eq!(
			outcome,
			TaskOutcome::Applied {
				kind: TaskKind::CancelOrder,
				from: OrderStatus::Placed,
				to: OrderStatus::Cancelled,
			}
		);

		assert!(matches!(
			events.recv().await.unwrap(),
			PickupEvent::Task(TaskEvent::Applied { .. })
		));
		assert!(matches!(
			events.recv().await.unwrap(),
			PickupEvent::Order(OrderEvent::StatusChanged { order, previous: OrderStatus::Placed })
				if order.status == OrderStatus::Cancelled
		));
		assert_eq!(f.stats.snapshot().applied, 1);
	}

	#[tokio::test]
	async fn test_redelivery_is_one_stale_discard_without_mutation() {
		let f = fixture().await;
		let task = delivered("CANCEL_ORDER", "order-1");
		f.handler.handle(&task).await.unwrap();
		let after_first = f.machine.get_order("order-1").await.unwrap();

		let mut events = f.bus.subscribe();
		let outcome = f.handler.handle(&task).await.unwrap();
		assert_eq!(
			outcome,
			TaskOutcome::Stale {
				kind: TaskKind::CancelOrder,
				current: OrderStatus::Cancelled,
			}
		);
		assert!(matches!(
			events.recv().await.unwrap(),
			PickupEvent::Task(TaskEvent::Discarded { reason: DiscardReason::Stale { .. }, .. })
		));
		assert!(events.try_recv().is_err());
		assert_eq!(f.machine.get_order("order-1").await.unwrap(), after_first);

		let counts = f.stats.snapshot();
		assert_eq!((counts.applied, counts.stale), (1, 1));
	}

	#[tokio::test]
	async fn test_unknown_kind_is_ignored() {
		let f = fixture().await;
		let outcome = f
			.handler
			.handle(&delivered("REFUND_ORDER", "order-1"))
			.await
			.unwrap();
		assert_eq!(
			outcome,
			TaskOutcome::Ignored {
				task: "REFUND_ORDER".into()
			}
		);
		assert_eq!(
			f.machine.get_order("order-1").await.unwrap().status,
			OrderStatus::Placed
		);
		assert_eq!(f.stats.snapshot().unknown, 1);
	}

	#[tokio::test]
	async fn test_missing_order_fails_invocation() {
		let f = fixture().await;
		let result = f.handler.handle(&delivered("FAIL_PICKUP", "ghost")).await;
		assert!(matches!(
			result,
			Err(TaskError::State(OrderStateError::OrderNotFound(_)))
		));
		assert_eq!(f.stats.snapshot().failed, 1);
	}
}
