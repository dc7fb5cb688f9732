//! Deferred task types.
//!
//! A scheduled task is an advisory timeout: "if nothing else has moved this
//! order on by `fire_at`, force the transition". Each task kind carries the
//! status it expects to find and the status it writes.

use crate::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The kinds of deferred task understood by the transition guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
	/// PLACED -> CANCELLED when the business never confirmed.
	CancelOrder,
	/// CONFIRMED -> AWAITING_PICKUP when the collection window opens.
	AwaitPickup,
	/// AWAITING_PICKUP -> PICKUP_FAILED when the collection window closes.
	FailPickup,
}

impl TaskKind {
	/// Wire name of the task kind.
	pub fn as_str(&self) -> &'static str {
		match self {
			TaskKind::CancelOrder => "CANCEL_ORDER",
			TaskKind::AwaitPickup => "AWAIT_PICKUP",
			TaskKind::FailPickup => "FAIL_PICKUP",
		}
	}

	/// The status an order must be in for this task to apply.
	pub fn precondition(&self) -> OrderStatus {
		match self {
			TaskKind::CancelOrder => OrderStatus::Placed,
			TaskKind::AwaitPickup => OrderStatus::Confirmed,
			TaskKind::FailPickup => OrderStatus::AwaitingPickup,
		}
	}

	/// The status written when the task applies.
	pub fn target(&self) -> OrderStatus {
		match self {
			TaskKind::CancelOrder => OrderStatus::Cancelled,
			TaskKind::AwaitPickup => OrderStatus::AwaitingPickup,
			TaskKind::FailPickup => OrderStatus::PickupFailed,
		}
	}

	/// Returns an iterator over all task kinds.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::CancelOrder, Self::AwaitPickup, Self::FailPickup].into_iter()
	}
}

impl FromStr for TaskKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"CANCEL_ORDER" => Ok(Self::CancelOrder),
			"AWAIT_PICKUP" => Ok(Self::AwaitPickup),
			"FAIL_PICKUP" => Ok(Self::FailPickup),
			other => Err(other.to_string()),
		}
	}
}

impl fmt::Display for TaskKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Payload handed to the dispatch substrate: `{"task": ..., "orderId": ...}`.
///
/// `task` stays a raw string so payloads naming an unknown kind still decode
/// and can be logged and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
	pub task: String,
	pub order_id: String,
}

impl TaskPayload {
	pub fn new(kind: TaskKind, order_id: impl Into<String>) -> Self {
		Self {
			task: kind.as_str().to_string(),
			order_id: order_id.into(),
		}
	}

	/// Parses the task kind, returning the raw name when it is unknown.
	pub fn kind(&self) -> Result<TaskKind, String> {
		self.task.parse()
	}
}

/// When a task should fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAt {
	/// Relative to the moment of enqueueing.
	Delay(Duration),
	/// An absolute instant.
	At(DateTime<Utc>),
}

impl ScheduleAt {
	/// Resolves the schedule to an absolute instant.
	pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
		match self {
			ScheduleAt::Delay(delay) => chrono::Duration::from_std(*delay)
				.ok()
				.and_then(|delay| now.checked_add_signed(delay))
				.unwrap_or(DateTime::<Utc>::MAX_UTC),
			ScheduleAt::At(at) => *at,
		}
	}
}

/// A task held by the dispatch substrate until `fire_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
	/// Unique identifier of this enqueued copy.
	pub id: String,
	pub payload: TaskPayload,
	pub fire_at: DateTime<Utc>,
	/// Delivery attempt, starting at 1.
	pub attempt: u32,
}
