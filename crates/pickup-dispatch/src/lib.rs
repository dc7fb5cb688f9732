//! Deferred task dispatch for the pickup lifecycle service.
//!
//! Tasks are handed to a dispatch backend together with the instant they
//! should fire at. The backend holds them and, once started, delivers each
//! task over a channel no earlier than its `fire_at`. Delivery is
//! at-least-once: a consumer that fails to handle a task hands it back
//! through [`DispatchService::redeliver`].

use async_trait::async_trait;
use chrono::Utc;
use pickup_types::{
	truncate_id, ConfigSchema, ImplementationRegistry, ScheduleAt, ScheduledTask, TaskKind,
	TaskPayload,
};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Re-export implementations
pub mod implementations {
	pub mod timer;
}

/// Errors that can occur during dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
	/// Error that occurs when starting a backend that is already delivering.
	#[error("Dispatcher already running")]
	AlreadyRunning,
	/// Error that occurs inside the dispatch backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for deferred task dispatch backends.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DispatchInterface: Send + Sync {
	/// Returns the configuration schema for this dispatch implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Holds a task until its `fire_at`.
	async fn enqueue(&self, task: ScheduledTask) -> Result<(), DispatchError>;

	/// Starts delivering due tasks through `sender`.
	async fn start(
		&self,
		sender: mpsc::UnboundedSender<ScheduledTask>,
	) -> Result<(), DispatchError>;

	/// Stops delivery. Tasks not yet due stay queued.
	async fn stop(&self) -> Result<(), DispatchError>;

	/// Number of tasks waiting for their fire time.
	async fn pending(&self) -> usize;
}

/// Type alias for dispatch factory functions.
pub type DispatchFactory = fn(&toml::Value) -> Result<Box<dyn DispatchInterface>, DispatchError>;

/// Registry trait for dispatch implementations.
pub trait DispatchRegistry: ImplementationRegistry<Factory = DispatchFactory> {}

/// Get all registered dispatch implementations.
pub fn get_all_implementations() -> Vec<(&'static str, DispatchFactory)> {
	use implementations::timer;

	vec![(timer::Registry::NAME, timer::Registry::factory())]
}

/// Service that schedules lifecycle tasks and applies the redelivery policy.
pub struct DispatchService {
	backend: Box<dyn DispatchInterface>,
	/// Delivery attempts per task, the first included.
	max_attempts: u32,
	/// Base delay between attempts, multiplied by the attempt number.
	retry_delay: Duration,
}

impl DispatchService {
	/// Creates a new DispatchService.
	///
	/// # Arguments
	/// * `backend` - Dispatch implementation that holds and delivers tasks
	/// * `max_attempts` - Deliveries per task, the first included; at least 1
	/// * `retry_delay` - Base delay between deliveries, multiplied by the attempt number
	pub fn new(backend: Box<dyn DispatchInterface>, max_attempts: u32, retry_delay: Duration) -> Self {
		Self {
			backend,
			max_attempts: max_attempts.max(1),
			retry_delay,
		}
	}

	/// Enqueues a task of `kind` for `order_id`.
	///
	/// # Arguments
	/// * `kind` - Which timeout to deliver
	/// * `order_id` - Order the task applies to
	/// * `at` - Absolute fire time or delay from now
	///
	/// # Returns
	/// * The enqueued task, first attempt
	///
	/// # Errors
	/// * `DispatchError` from the backend when the task could not be held
	///
	/// Enqueueing is fire-and-forget: the caller never learns whether the task
	/// applied. Scheduling the same task twice is harmless because delivery
	/// re-checks the order status.
	pub async fn schedule(
		&self,
		kind: TaskKind,
		order_id: &str,
		at: ScheduleAt,
	) -> Result<ScheduledTask, DispatchError> {
		let task = ScheduledTask {
			id: uuid::Uuid::new_v4().to_string(),
			payload: TaskPayload::new(kind, order_id),
			fire_at: at.resolve(Utc::now()),
			attempt: 1,
		};
		self.backend.enqueue(task.clone()).await?;

		tracing::debug!(
			order_id = %truncate_id(order_id),
			task = %kind,
			fire_at = %task.fire_at,
			"Task enqueued"
		);
		Ok(task)
	}

	/// Hands a failed task back for another attempt.
	///
	/// Returns the re-enqueued copy, or `None` once `max_attempts` is reached.
	pub async fn redeliver(
		&self,
		task: ScheduledTask,
	) -> Result<Option<ScheduledTask>, DispatchError> {
		if task.attempt >= self.max_attempts {
			tracing::error!(
				order_id = %truncate_id(&task.payload.order_id),
				task = %task.payload.task,
				attempts = task.attempt,
				"Task dropped after exhausting delivery attempts"
			);
			return Ok(None);
		}

		let delay = self.retry_delay.saturating_mul(task.attempt);
		let retry = ScheduledTask {
			fire_at: ScheduleAt::Delay(delay).resolve(Utc::now()),
			attempt: task.attempt + 1,
			..task
		};
		self.backend.enqueue(retry.clone()).await?;

		tracing::warn!(
			order_id = %truncate_id(&retry.payload.order_id),
			task = %retry.payload.task,
			attempt = retry.attempt,
			delay_secs = delay.as_secs(),
			"Task scheduled for redelivery"
		);
		Ok(Some(retry))
	}

	/// Starts delivering due tasks through `sender`.
	pub async fn start(
		&self,
		sender: mpsc::UnboundedSender<ScheduledTask>,
	) -> Result<(), DispatchError> {
		self.backend.start(sender).await
	}

	/// Stops delivery.
	pub async fn stop(&self) -> Result<(), DispatchError> {
		self.backend.stop().await
	}

	/// Number of tasks waiting for their fire time.
	pub async fn pending(&self) -> usize {
		self.backend.pending().await
	}
}
