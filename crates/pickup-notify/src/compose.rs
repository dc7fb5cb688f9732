//! Notification text for order status changes and new-order alerts.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use pickup_types::{
	format_time_of_day, Business, Item, Order, OrderStatus, OutboundMessage, PushNotification,
};

/// Title and body of a customer notification, before it is addressed.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContent {
	pub title: String,
	pub body: String,
}

impl NotificationContent {
	pub fn into_push(self, destination_token: &str) -> PushNotification {
		PushNotification {
			destination_token: destination_token.to_string(),
			title: self.title,
			body: self.body,
		}
	}
}

/// Composes the customer notification for `status`, if that status has one.
///
/// Times are rendered in `tz`. Statuses other than CONFIRMED, CANCELLED and
/// AWAITING_PICKUP produce nothing.
pub fn compose_status_notification(
	order: &Order,
	item: &Item,
	status: &OrderStatus,
	tz: &Tz,
) -> Option<NotificationContent> {
	let (title, body) = match status {
		OrderStatus::Confirmed => (
			"Order Confirmed",
			format!(
				"Your order {} for {} has been confirmed. Collection starts at {}.",
				order.id,
				item.name,
				format_time_of_day(item.collection.from, tz)
			),
		),
		OrderStatus::Cancelled => (
			"Order Cancelled",
			format!(
				"Your order {} for {} has been cancelled.",
				order.id, item.name
			),
		),
		OrderStatus::AwaitingPickup => (
			"Order Ready For Collection",
			format!(
				"Your {} is ready for collection. Please collect it before {}.",
				item.name,
				format_time_of_day(item.collection.to, tz)
			),
		),
		_ => return None,
	};

	Some(NotificationContent {
		title: title.to_string(),
		body,
	})
}

/// Composes the new-order alert queued for the business.
pub fn compose_business_alert(
	order: &Order,
	item: &Item,
	business: &Business,
	reply_minutes: u64,
	now: DateTime<Utc>,
) -> OutboundMessage {
	OutboundMessage {
		to: business.contact_address.clone(),
		body: format!(
			"New Order {}. Please CONFIRM/CANCEL the order for {} within {} minutes.",
			order.id, item.name, reply_minutes
		),
		created_at: now,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	fn fixtures() -> (Order, Item, Business) {
		let tz = chrono_tz::Asia::Singapore;
		let at = |h, m| {
			tz.with_ymd_and_hms(2024, 3, 15, h, m, 0)
				.single()
				.unwrap()
				.with_timezone(&Utc)
		};
		let item = Item {
			id: "item-1".into(),
			name: "Surprise Bag".into(),
			collection: pickup_types::CollectionWindow::new(at(18, 0), at(20, 30)).unwrap(),
		};
		let business = Business {
			id: "biz-1".into(),
			name: "Corner Bakery".into(),
			contact_address: "+6512345678".into(),
		};
		let order = Order::placed(
			"order-1",
			"item-1",
			"biz-1",
			Some("device-1".into()),
			at(17, 0),
		);
		(order, item, business)
	}

	#[test]
	fn test_confirmed_mentions_collection_start() {
		let (order, item, _) = fixtures();
		let tz = chrono_tz::Asia::Singapore;
		let content =
			compose_status_notification(&order, &item, &OrderStatus::Confirmed, &tz).unwrap();
		assert_eq!(content.title, "Order Confirmed");
		assert!(content.body.contains("Collection starts at 06:00PM"));
	}

	#[test]
	fn test_awaiting_pickup_mentions_collection_end() {
		let (order, item, _) = fixtures();
		let tz = chrono_tz::Asia::Singapore;
		let content =
			compose_status_notification(&order, &item, &OrderStatus::AwaitingPickup, &tz)
				.unwrap();
		assert_eq!(content.title, "Order Ready For Collection");
		assert!(content.body.contains("before 08:30PM"));
	}

	#[test]
	fn test_other_statuses_are_silent() {
		let (order, item, _) = fixtures();
		let tz = chrono_tz::UTC;
		for status in [
			OrderStatus::Placed,
			OrderStatus::PickupFailed,
			OrderStatus::Other("OOOO".into()),
		] {
			assert!(compose_status_notification(&order, &item, &status, &tz).is_none());
		}
		let cancelled =
			compose_status_notification(&order, &item, &OrderStatus::Cancelled, &tz).unwrap();
		assert_eq!(cancelled.title, "Order Cancelled");
	}

	#[test]
	fn test_business_alert() {
		let (order, item, business) = fixtures();
		let now = Utc::now();
		let alert = compose_business_alert(&order, &item, &business, 30, now);
		assert_eq!(alert.to, "+6512345678");
		assert_eq!(
			alert.body,
			"New Order order-1. Please CONFIRM/CANCEL the order for Surprise Bag within 30 minutes."
		);
		assert_eq!(alert.created_at, now);
	}
}
