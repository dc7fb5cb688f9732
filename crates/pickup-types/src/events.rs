//! Event types for inter-service communication.
//!
//! Events flow through the engine's event bus. Order events are the change
//! feed ("on create", "on update") the scheduler and notifier react to; task
//! events report what happened to each delivered deferred task.

use crate::{Order, OrderStatus, TaskKind, TaskPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PickupEvent {
	/// Committed changes to order records.
	Order(OrderEvent),
	/// Outcomes of deferred tasks.
	Task(TaskEvent),
}

/// Committed changes to an order record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A new order was stored with status PLACED.
	Created { order: Order },
	/// The status of an order changed; `order` is the state after the write.
	StatusChanged {
		order: Order,
		previous: OrderStatus,
	},
}

/// What happened to a deferred task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
	/// A task was handed to the dispatch substrate.
	Scheduled {
		payload: TaskPayload,
		fire_at: DateTime<Utc>,
	},
	/// The task's precondition held and its target status was written.
	Applied {
		order_id: String,
		kind: TaskKind,
		from: OrderStatus,
		to: OrderStatus,
	},
	/// The task was dropped without touching the order.
	Discarded {
		order_id: String,
		task: String,
		reason: DiscardReason,
	},
	/// The invocation failed and is left to the substrate's redelivery.
	Failed { payload: TaskPayload, error: String },
}

/// Why a delivered task was discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiscardReason {
	/// The order had already moved on from the task's precondition.
	Stale { current: OrderStatus },
	/// The payload named a task kind outside the transition table.
	UnknownKind,
}
