//! Deadline calculator.
//!
//! Pure functions turning an order's creation time and its item's collection
//! window into the instants at which timeout tasks fire.

use chrono::{DateTime, Utc};
use pickup_types::CollectionWindow;
use std::time::Duration;

/// When an unconfirmed order is cancelled.
///
/// The grace period after creation, capped at the end of the collection
/// window so an order never stays unconfirmed past its own window.
///
/// # Arguments
/// * `created_at` - When the order was placed
/// * `window` - Collection window of the ordered item
/// * `grace` - Configured auto-cancel period
pub fn cancel_deadline(
	created_at: DateTime<Utc>,
	window: &CollectionWindow,
	grace: Duration,
) -> DateTime<Utc> {
	let grace_end = chrono::Duration::from_std(grace)
		.ok()
		.and_then(|grace| created_at.checked_add_signed(grace))
		.unwrap_or(DateTime::<Utc>::MAX_UTC);
	grace_end.min(window.to)
}

/// When a confirmed order starts awaiting pickup.
pub fn pickup_start(window: &CollectionWindow) -> DateTime<Utc> {
	window.from
}

/// When an uncollected order is marked as failed.
pub fn pickup_end(window: &CollectionWindow) -> DateTime<Utc> {
	window.to
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration as ChronoDuration;

	const GRACE: Duration = Duration::from_secs(30 * 60);

	fn window(t: DateTime<Utc>, from_min: i64, to_min: i64) -> CollectionWindow {
		CollectionWindow::new(
			t + ChronoDuration::minutes(from_min),
			t + ChronoDuration::minutes(to_min),
		)
		.unwrap()
	}

	#[test]
	fn test_window_end_wins_when_earlier() {
		let t = Utc::now();
		assert_eq!(
			cancel_deadline(t, &window(t, 10, 20), GRACE),
			t + ChronoDuration::minutes(20)
		);
	}

	#[test]
	fn test_grace_wins_when_earlier() {
		let t = Utc::now();
		assert_eq!(
			cancel_deadline(t, &window(t, 40, 60), GRACE),
			t + ChronoDuration::minutes(30)
		);
		assert_eq!(
			cancel_deadline(t, &window(t, 10, 40), GRACE),
			t + ChronoDuration::minutes(30)
		);
	}

	#[test]
	fn test_window_already_closed() {
		let t = Utc::now();
		let past = window(t, -60, -10);
		assert_eq!(cancel_deadline(t, &past, GRACE), past.to);
	}

	#[test]
	fn test_pickup_bounds() {
		let t = Utc::now();
		let w = window(t, 10, 40);
		assert_eq!(pickup_start(&w), t + ChronoDuration::minutes(10));
		assert_eq!(pickup_end(&w), t + ChronoDuration::minutes(40));
	}
}
