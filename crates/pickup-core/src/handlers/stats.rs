//! Counters for deferred task outcomes.
//!
//! Superseded tasks are never cancelled, they fire and get discarded, so the
//! stale count shows how much scheduling work is wasted.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TaskStats {
	scheduled: AtomicU64,
	applied: AtomicU64,
	stale: AtomicU64,
	unknown: AtomicU64,
	failed: AtomicU64,
}

/// Point-in-time copy of [`TaskStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
	pub scheduled: u64,
	pub applied: u64,
	pub stale: u64,
	pub unknown: u64,
	pub failed: u64,
}

impl TaskStats {
	pub fn record_scheduled(&self) {
		self.scheduled.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_applied(&self) {
		self.applied.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_stale(&self) {
		self.stale.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_unknown(&self) {
		self.unknown.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_failed(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> TaskCounts {
		TaskCounts {
			scheduled: self.scheduled.load(Ordering::Relaxed),
			applied: self.applied.load(Ordering::Relaxed),
			stale: self.stale.load(Ordering::Relaxed),
			unknown: self.unknown.load(Ordering::Relaxed),
			failed: self.failed.load(Ordering::Relaxed),
		}
	}
}
