//! In-process timer dispatch backend.
//!
//! Keeps tasks in a priority queue ordered by fire time and enqueue order.
//! A single worker sleeps until the earliest task is due and delivers it over
//! the channel passed to `start`. Enqueueing an earlier task wakes the worker
//! so it can shorten its sleep. Queued tasks are lost on restart; the engine
//! schedules them again from the stored orders when it starts.

use crate::{DispatchError, DispatchFactory, DispatchInterface, DispatchRegistry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pickup_types::{
	truncate_id, ConfigSchema, Field, FieldType, ImplementationRegistry, ScheduledTask, Schema,
	ValidationError,
};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};

/// Due tasks ordered earliest first; ties go to the task enqueued first.
#[derive(Default)]
struct DelayQueue {
	order: PriorityQueue<u64, Reverse<(DateTime<Utc>, u64)>>,
	tasks: HashMap<u64, ScheduledTask>,
	next_seq: u64,
}

impl DelayQueue {
	fn push(&mut self, task: ScheduledTask) {
		let seq = self.next_seq;
		self.next_seq += 1;
		self.order.push(seq, Reverse((task.fire_at, seq)));
		self.tasks.insert(seq, task);
	}

	fn next_fire_at(&self) -> Option<DateTime<Utc>> {
		self.order.peek().map(|(_, Reverse((at, _)))| *at)
	}

	/// Removes and returns the earliest task if it is due at `now`.
	fn pop_due(&mut self, now: DateTime<Utc>) -> Option<ScheduledTask> {
		if self.next_fire_at()? > now {
			return None;
		}
		let (seq, _) = self.order.pop()?;
		self.tasks.remove(&seq)
	}

	fn len(&self) -> usize {
		self.tasks.len()
	}
}

/// Timer-based dispatch implementation.
pub struct TimerDispatch {
	queue: Arc<Mutex<DelayQueue>>,
	wake: Arc<Notify>,
	is_running: Arc<AtomicBool>,
	stop_signal: Arc<Mutex<Option<mpsc::Sender<()>>>>,
	/// Longest the worker sleeps with an empty queue.
	idle_interval: Duration,
}

impl TimerDispatch {
	pub fn new(idle_interval: Duration) -> Self {
		Self {
			queue: Arc::new(Mutex::new(DelayQueue::default())),
			wake: Arc::new(Notify::new()),
			is_running: Arc::new(AtomicBool::new(false)),
			stop_signal: Arc::new(Mutex::new(None)),
			idle_interval,
		}
	}

	async fn delivery_loop(
		queue: Arc<Mutex<DelayQueue>>,
		wake: Arc<Notify>,
		sender: mpsc::UnboundedSender<ScheduledTask>,
		mut stop_rx: mpsc::Receiver<()>,
		idle_interval: Duration,
	) {
		loop {
			let next_fire_at = {
				let mut queue = queue.lock().await;
				while let Some(task) = queue.pop_due(Utc::now()) {
					tracing::debug!(
						order_id = %truncate_id(&task.payload.order_id),
						task = %task.payload.task,
						attempt = task.attempt,
						"Delivering task"
					);
					if let Err(mpsc::error::SendError(task)) = sender.send(task) {
						tracing::warn!("Task receiver dropped, stopping delivery");
						queue.push(task);
						return;
					}
				}
				queue.next_fire_at()
			};

			let sleep_for = next_fire_at
				.map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
				.map_or(idle_interval, |until| until.min(idle_interval));

			tokio::select! {
				_ = stop_rx.recv() => break,
				_ = wake.notified() => {},
				_ = tokio::time::sleep(sleep_for) => {},
			}
		}
	}
}

#[async_trait]
impl DispatchInterface for TimerDispatch {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(TimerDispatchSchema)
	}

	async fn enqueue(&self, task: ScheduledTask) -> Result<(), DispatchError> {
		self.queue.lock().await.push(task);
		self.wake.notify_one();
		Ok(())
	}

	async fn start(
		&self,
		sender: mpsc::UnboundedSender<ScheduledTask>,
	) -> Result<(), DispatchError> {
		if self.is_running.swap(true, Ordering::SeqCst) {
			return Err(DispatchError::AlreadyRunning);
		}

		let (stop_tx, stop_rx) = mpsc::channel(1);
		*self.stop_signal.lock().await = Some(stop_tx);

		let queue = self.queue.clone();
		let wake = self.wake.clone();
		let is_running = self.is_running.clone();
		let idle_interval = self.idle_interval;
		tokio::spawn(async move {
			Self::delivery_loop(queue, wake, sender, stop_rx, idle_interval).await;
			is_running.store(false, Ordering::SeqCst);
		});

		Ok(())
	}

	async fn stop(&self) -> Result<(), DispatchError> {
		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(()).await;
		}
		Ok(())
	}

	async fn pending(&self) -> usize {
		self.queue.lock().await.len()
	}
}

/// Configuration schema for TimerDispatch.
pub struct TimerDispatchSchema;

impl ConfigSchema for TimerDispatchSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new(
				"idle_interval_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(3600),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create a timer dispatch backend from configuration.
///
/// Configuration parameters:
/// - `idle_interval_seconds`: longest sleep with nothing queued (default: 60)
pub fn create_dispatch(config: &toml::Value) -> Result<Box<dyn DispatchInterface>, DispatchError> {
	TimerDispatchSchema
		.validate(config)
		.map_err(|e| DispatchError::Configuration(e.to_string()))?;

	let idle_interval = config
		.get("idle_interval_seconds")
		.and_then(|v| v.as_integer())
		.map_or(60, |v| v as u64);

	Ok(Box::new(TimerDispatch::new(Duration::from_secs(
		idle_interval,
	))))
}

/// Registry for the timer dispatch implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "timer";
	type Factory = DispatchFactory;

	fn factory() -> Self::Factory {
		create_dispatch
	}
}

impl DispatchRegistry for Registry {}
