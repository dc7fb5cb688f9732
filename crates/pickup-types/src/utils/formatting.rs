//! String formatting utilities.
//!
//! Provides identifier truncation for logs and the wall-clock rendering used
//! in customer-facing notifications.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Utility function to truncate an identifier for display purposes.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Renders an instant as a 12-hour wall-clock time in `tz`, e.g. "01:00PM".
///
/// The hour is zero-padded to two digits; midnight renders as "12" AM and
/// noon as "12" PM.
pub fn format_time_of_day(instant: DateTime<Utc>, tz: &Tz) -> String {
	let local = instant.with_timezone(tz);
	let (hour, suffix) = match local.hour() {
		0 => (12, "AM"),
		h @ 1..=11 => (h, "AM"),
		12 => (12, "PM"),
		h => (h - 12, "PM"),
	};
	format!("{:02}:{:02}{}", hour, local.minute(), suffix)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	fn local(tz: Tz, hour: u32, minute: u32) -> DateTime<Utc> {
		tz.with_ymd_and_hms(2024, 3, 15, hour, minute, 0)
			.single()
			.unwrap()
			.with_timezone(&Utc)
	}

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("abc"), "abc");
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(truncate_id("123456789"), "12345678..");
	}

	#[test]
	fn test_format_time_of_day() {
		let tz = chrono_tz::Asia::Singapore;
		assert_eq!(format_time_of_day(local(tz, 0, 5), &tz), "12:05AM");
		assert_eq!(format_time_of_day(local(tz, 9, 30), &tz), "09:30AM");
		assert_eq!(format_time_of_day(local(tz, 12, 0), &tz), "12:00PM");
		assert_eq!(format_time_of_day(local(tz, 13, 0), &tz), "01:00PM");
		assert_eq!(format_time_of_day(local(tz, 23, 59), &tz), "11:59PM");
	}

	#[test]
	fn test_format_converts_into_timezone() {
		// 16:05 UTC is 00:05 the next day in Singapore (UTC+8).
		let instant = Utc.with_ymd_and_hms(2024, 3, 15, 16, 5, 0).unwrap();
		assert_eq!(format_time_of_day(instant, &chrono_tz::UTC), "04:05PM");
		assert_eq!(
			format_time_of_day(instant, &chrono_tz::Asia::Singapore),
			"12:05AM"
		);
	}
}
