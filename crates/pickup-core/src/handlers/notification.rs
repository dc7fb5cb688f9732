//! Notification handler.
//!
//! Sends the customer a push notification for each committed status change
//! that has one, and queues a new-order alert for the business when an order
//! is placed. Delivery failures are logged and never touch order state.

use chrono::Utc;
use chrono_tz::Tz;
use pickup_notify::{compose_business_alert, compose_status_notification, NotifierService};
use pickup_storage::{StorageError, StorageService};
use pickup_types::{truncate_id, Business, Item, Order, OrderStatus, OutboundMessage, StorageKey};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while notifying about an order.
#[derive(Debug, Error)]
pub enum NotificationError {
	#[error("{kind} {id} referenced by the order does not exist")]
	ReferenceNotFound { kind: &'static str, id: String },
	#[error("Storage error: {0}")]
	Storage(String),
}

pub struct NotificationHandler {
	storage: Arc<StorageService>,
	notifier: Arc<NotifierService>,
	/// Zone customer-facing times are rendered in.
	timezone: Tz,
	/// Minutes the business has to reply to a new order.
	reply_minutes: u64,
}

impl NotificationHandler {
	pub fn new(
		storage: Arc<StorageService>,
		notifier: Arc<NotifierService>,
		timezone: Tz,
		reply_minutes: u64,
	) -> Self {
		Self {
			storage,
			notifier,
			timezone,
			reply_minutes,
		}
	}

	/// Queues the new-order alert in the messages collection.
	///
	/// The alert is keyed by order id, so a repeated creation event rewrites
	/// the same message instead of queueing a second one.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id)))]
	pub async fn handle_created(&self, order: &Order) -> Result<OutboundMessage, NotificationError> {
		let item: Item = self.load("Item", StorageKey::Items, &order.item_id).await?;
		let business: Business = self
			.load("Business", StorageKey::Businesses, &order.business_id)
			.await?;

		let message = compose_business_alert(order, &item, &business, self.reply_minutes, Utc::now());
		self.storage
			.store(StorageKey::Messages.as_str(), &order.id, &message)
			.await
			.map_err(|e| NotificationError::Storage(e.to_string()))?;

		tracing::info!(to = %message.to, "Queued business alert");
		Ok(message)
	}

	/// Sends the customer notification for the order's new status.
	///
	/// Returns whether a notification was delivered.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id), status = %order.status))]
	pub async fn handle_status_changed(&self, order: &Order) -> Result<bool, NotificationError> {
		if !matches!(
			order.status,
			OrderStatus::Confirmed | OrderStatus::Cancelled | OrderStatus::AwaitingPickup
		) {
			return Ok(false);
		}
		let Some(token) = order.notification_token.as_deref() else {
			tracing::debug!("Order has no notification token");
			return Ok(false);
		};

		let item: Item = self.load("Item", StorageKey::Items, &order.item_id).await?;
		let Some(content) =
			compose_status_notification(order, &item, &order.status, &self.timezone)
		else {
			return Ok(false);
		};

		match self.notifier.send(token, content).await {
			Ok(()) => Ok(true),
			Err(e) => {
				tracing::warn!(error = %e, "Failed to deliver push notification");
				Ok(false)
			},
		}
	}

	async fn load<T: DeserializeOwned>(
		&self,
		kind: &'static str,
		namespace: StorageKey,
		id: &str,
	) -> Result<T, NotificationError> {
		self.storage
			.retrieve(namespace.as_str(), id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => NotificationError::ReferenceNotFound {
					kind,
					id: id.to_string(),
				},
				other => NotificationError::Storage(other.to_string()),
			})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{business, item_with_window, memory_storage, placed_order_at};
	use pickup_notify::{MockNotifierInterface, NotifyError};

	async fn seeded_storage(t: chrono::DateTime<Utc>) -> Arc<StorageService> {
		let storage = memory_storage();
		let item = item_with_window("item-1", t, 10, 40);
		storage
			.store(StorageKey::Items.as_str(), &item.id, &item)
			.await
			.unwrap();
		let business = business("biz-1");
		storage
			.store(StorageKey::Businesses.as_str(), &business.id, &business)
			.await
			.unwrap();
		storage
	}

	fn handler(storage: Arc<StorageService>, backend: MockNotifierInterface) -> NotificationHandler {
		NotificationHandler::new(
			storage,
			Arc::new(NotifierService::new(Box::new(backend))),
			chrono_tz::UTC,
			30,
		)
	}

	#[tokio::test]
	async fn test_creation_queues_business_alert() {
		let t = Utc::now();
		let storage = seeded_storage(t).await;
		let handler = handler(storage.clone(), MockNotifierInterface::new());

		let order = placed_order_at("order-1", t);
		handler.handle_created(&order).await.unwrap();

		let queued: OutboundMessage = storage
			.retrieve(StorageKey::Messages.as_str(), "order-1")
			.await
			.unwrap();
		assert_eq!(queued.to, business("biz-1").contact_address);
		assert!(queued.body.starts_with("New Order order-1."));
		assert!(queued.body.ends_with("within 30 minutes."));
	}

	#[tokio::test]
	async fn test_missing_business_fails() {
		let t = Utc::now();
		let storage = seeded_storage(t).await;
		let handler = handler(storage.clone(), MockNotifierInterface::new());

		let mut order = placed_order_at("order-1", t);
		order.business_id = "ghost".into();
		assert!(matches!(
			handler.handle_created(&order).await,
			Err(NotificationError::ReferenceNotFound { kind: "Business", .. })
		));
		assert!(!storage
			.exists(StorageKey::Messages.as_str(), "order-1")
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_status_change_sends_push() {
		let t = Utc::now();
		let mut backend = MockNotifierInterface::new();
		backend
			.expect_send_push()
			.withf(|n| n.title == "Order Ready For Collection" && n.destination_token == "device-1")
			.times(1)
			.returning(|_| Ok(()));
		let handler = handler(seeded_storage(t).await, backend);

		let mut order = placed_order_at("order-1", t);
		order.status = OrderStatus::AwaitingPickup;
		assert!(handler.handle_status_changed(&order).await.unwrap());
	}

	#[tokio::test]
	async fn test_silent_statuses_and_missing_token() {
		let t = Utc::now();
		let mut backend = MockNotifierInterface::new();
		backend.expect_send_push().times(0);
		let handler = handler(seeded_storage(t).await, backend);

		let mut order = placed_order_at("order-1", t);
		order.status = OrderStatus::PickupFailed;
		assert!(!handler.handle_status_changed(&order).await.unwrap());

		order.status = OrderStatus::Confirmed;
		order.notification_token = None;
		assert!(!handler.handle_status_changed(&order).await.unwrap());
	}

	#[tokio::test]
	async fn test_push_failure_is_swallowed() {
		let t = Utc::now();
		let mut backend = MockNotifierInterface::new();
		backend
			.expect_send_push()
			.returning(|_| Err(NotifyError::Network("unreachable".into())));
		let handler = handler(seeded_storage(t).await, backend);

		let mut order = placed_order_at("order-1", t);
		order.status = OrderStatus::Confirmed;
		assert!(!handler.handle_status_changed(&order).await.unwrap());
	}
}
