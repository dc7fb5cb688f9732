//! Order state machine implementation.
//!
//! Core transitions are driven by deferred tasks:
//! PLACED -> CANCELLED, CONFIRMED -> AWAITING_PICKUP and
//! AWAITING_PICKUP -> PICKUP_FAILED. A task only applies when the order is
//! still in the task's precondition status at the moment of the write.
//!
//! External actors own the remaining edges: the business confirms or
//! cancels a PLACED order, and the courier records the outcome of a
//! collection on a CONFIRMED or AWAITING_PICKUP order under a status code of
//! its own. Any other external write is an invalid transition.

use pickup_storage::{StorageError, StorageService, Transaction};
use pickup_types::{Order, OrderStatus, StorageKey, TaskKind};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	/// Other writers kept winning the race for the record.
	#[error("Transaction conflict: {0}")]
	Conflict(String),
	/// An external write with no edge from the current status.
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
}

impl OrderStateError {
	fn from_storage(order_id: &str, err: StorageError) -> Self {
		match err {
			StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
			StorageError::Conflict(key) => OrderStateError::Conflict(key),
			other => OrderStateError::Storage(other.to_string()),
		}
	}
}

/// Result of delivering a task to the transition guard.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
	/// The precondition held; `order` carries the new status.
	Applied { previous: OrderStatus, order: Order },
	/// The order had moved on; nothing was written.
	Stale { current: OrderStatus },
}

/// Result of an external status write.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
	Changed { previous: OrderStatus, order: Order },
	/// The order already had the requested status.
	Unchanged(Order),
}

/// Whether an external actor may move an order from `from` to `to`.
pub fn is_external_edge(from: &OrderStatus, to: &OrderStatus) -> bool {
	matches!(
		(from, to),
		(OrderStatus::Placed, OrderStatus::Confirmed)
			| (OrderStatus::Placed, OrderStatus::Cancelled)
			| (
				OrderStatus::Confirmed | OrderStatus::AwaitingPickup,
				OrderStatus::Other(_)
			)
	)
}

/// Manages order state transitions and persistence
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Stores a new order record.
	pub async fn store_order(&self, order: &Order) -> Result<(), OrderStateError> {
		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(|e| OrderStateError::from_storage(&order.id, e))
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| OrderStateError::from_storage(order_id, e))
	}

	/// Applies a task's transition if the order is in its precondition status.
	///
	/// The status check and the write happen in one atomic transaction, so a
	/// concurrent writer can never slip in between them. Delivering the same
	/// task again after it applied yields `Stale`.
	///
	/// # Errors
	/// * `OrderStateError::OrderNotFound` if there is no such order
	/// * `OrderStateError::Conflict` if the transaction ran out of retries
	pub async fn apply_task(
		&self,
		order_id: &str,
		kind: TaskKind,
	) -> Result<TransitionOutcome, OrderStateError> {
		let precondition = kind.precondition();
		let target = kind.target();

		let result = self
			.storage
			.transact(StorageKey::Orders.as_str(), order_id, |order: &Order| {
				(order.status == precondition).then(|| Order {
					status: target.clone(),
					..order.clone()
				})
			})
			.await
			.map_err(|e| OrderStateError::from_storage(order_id, e))?;

		Ok(match result {
			Transaction::Committed { previous, current } => TransitionOutcome::Applied {
				previous: previous.status,
				order: current,
			},
			Transaction::Unchanged(order) => TransitionOutcome::Stale {
				current: order.status,
			},
		})
	}

	/// Writes a status on behalf of an external actor.
	///
	/// # Arguments
	///
	/// * `order_id` - The order to update
	/// * `status` - The status the actor wants to record
	///
	/// # Returns
	///
	/// `Changed` when the write landed, `Unchanged` when the order already
	/// had `status`, and `InvalidTransition` when the current status has no
	/// external edge to `status`. The check and the write are one atomic
	/// transaction, like [`OrderStateMachine::apply_task`].
	pub async fn set_status(
		&self,
		order_id: &str,
		status: OrderStatus,
	) -> Result<StatusUpdate, OrderStateError> {
		let result = self
			.storage
			.transact(StorageKey::Orders.as_str(), order_id, |order: &Order| {
				is_external_edge(&order.status, &status).then(|| Order {
					status: status.clone(),
					..order.clone()
				})
			})
			.await
			.map_err(|e| OrderStateError::from_storage(order_id, e))?;

		match result {
			Transaction::Committed { previous, current } => Ok(StatusUpdate::Changed {
				previous: previous.status,
				order: current,
			}),
			Transaction::Unchanged(order) if order.status == status => {
				Ok(StatusUpdate::Unchanged(order))
			},
			Transaction::Unchanged(order) => Err(OrderStateError::InvalidTransition {
				from: order.status,
				to: status,
			}),
		}
	}
}
