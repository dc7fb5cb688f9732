//! Pickup engine that drives the order lifecycle.
//!
//! The engine owns the services and handlers and runs the main loop: tasks
//! delivered by the dispatch backend go to the transition guard, and order
//! events from the bus go to the scheduling and notification handlers. Every
//! trigger runs on its own task, bounded by a semaphore. A failed order-change
//! trigger is retried with the same linear backoff as task redelivery, and a
//! lagging event receiver falls back to a full recovery scan.

pub mod event_bus;
pub mod lifecycle;

use crate::handlers::{
	NotificationHandler, SchedulingHandler, TaskCounts, TaskHandler, TaskStats,
};
use crate::recovery::RecoveryService;
use crate::state::{OrderStateError, OrderStateMachine, StatusUpdate};
use chrono::Utc;
use pickup_config::Config;
use pickup_dispatch::DispatchService;
use pickup_notify::NotifierService;
use pickup_storage::{StorageError, StorageService};
use pickup_types::{
	truncate_id, Business, Item, Order, OrderEvent, OrderStatus, PickupEvent, StorageKey,
};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex, Notify, Semaphore};

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	/// A dispatch backend failed to start or stop.
	#[error("Service error: {0}")]
	Service(String),
	/// A trigger or task handler gave up.
	#[error("Handler error: {0}")]
	Handler(String),
	/// `kind` is one of `Order`, `Item` or `Business`.
	#[error("{kind} not found: {id}")]
	NotFound { kind: &'static str, id: String },
	#[error("Invalid request: {0}")]
	Validation(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	/// Retrying may succeed.
	#[error("Order {0} is being updated concurrently")]
	Busy(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<OrderStateError> for EngineError {
	fn from(err: OrderStateError) -> Self {
		match err {
			OrderStateError::OrderNotFound(id) => EngineError::NotFound { kind: "Order", id },
			OrderStateError::InvalidTransition { from, to } => {
				EngineError::InvalidTransition { from, to }
			},
			OrderStateError::Conflict(key) => EngineError::Busy(key),
			OrderStateError::Storage(e) => EngineError::Storage(e),
		}
	}
}

/// Main engine that orchestrates the order lifecycle.
#[derive(Clone)]
pub struct PickupEngine {
	pub(crate) config: Config,
	pub(crate) storage: Arc<StorageService>,
	pub(crate) dispatch: Arc<DispatchService>,
	pub(crate) event_bus: event_bus::EventBus,
	pub(crate) state_machine: Arc<OrderStateMachine>,
	pub(crate) scheduling_handler: Arc<SchedulingHandler>,
	pub(crate) task_handler: Arc<TaskHandler>,
	pub(crate) notification_handler: Arc<NotificationHandler>,
	pub(crate) recovery: Arc<RecoveryService>,
	pub(crate) stats: Arc<TaskStats>,
	/// Subscribed at construction so events published before `run` are kept.
	events: Arc<Mutex<Option<broadcast::Receiver<PickupEvent>>>>,
	pub(crate) shutdown: Arc<Notify>,
}

impl PickupEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		dispatch: Arc<DispatchService>,
		notifier: Arc<NotifierService>,
		event_bus: event_bus::EventBus,
	) -> Self {
		let stats = Arc::new(TaskStats::default());
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone()));

		let scheduling_handler = Arc::new(SchedulingHandler::new(
			storage.clone(),
			dispatch.clone(),
			event_bus.clone(),
			stats.clone(),
			config.auto_cancel_window(),
		));

		let task_handler = Arc::new(TaskHandler::new(
			state_machine.clone(),
			event_bus.clone(),
			stats.clone(),
		));

		let notification_handler = Arc::new(NotificationHandler::new(
			storage.clone(),
			notifier,
			config.lifecycle.timezone,
			config.lifecycle.auto_cancel_minutes,
		));

		let recovery = Arc::new(RecoveryService::new(
			storage.clone(),
			scheduling_handler.clone(),
		));

		let events = Arc::new(Mutex::new(Some(event_bus.subscribe())));

		Self {
			config,
			storage,
			dispatch,
			event_bus,
			state_machine,
			scheduling_handler,
			task_handler,
			notification_handler,
			recovery,
			stats,
			events,
			shutdown: Arc::new(Notify::new()),
		}
	}

	/// Main execution loop. Returns on Ctrl+C or [`PickupEngine::shutdown`].
	pub async fn run(&self) -> Result<(), EngineError> {
		self.initialize().await?;

		let (task_tx, mut task_rx) = mpsc::unbounded_channel();
		self.dispatch
			.start(task_tx)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;

		let mut event_receiver = match self.events.lock().await.take() {
			Some(receiver) => receiver,
			None => self.event_bus.subscribe(),
		};

		let storage = self.storage.clone();
		let mut cleanup_interval = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds.max(1),
		));
		let cleanup_handle = tokio::spawn(async move {
			loop {
				cleanup_interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired entries", count);
					},
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					},
					_ => {},
				}
			}
		});

		let semaphore = Arc::new(Semaphore::new(self.config.engine.max_concurrent_handlers));

		loop {
			tokio::select! {
				Some(task) = task_rx.recv() => {
					self.spawn_handler(&semaphore, move |engine| async move {
						if let Err(e) = engine.task_handler.handle(&task).await {
							engine
								.dispatch
								.redeliver(task)
								.await
								.map_err(|e| EngineError::Service(format!("Failed to redeliver task: {}", e)))?;
							return Err(EngineError::Handler(format!("Failed to handle task: {}", e)));
						}
						Ok(())
					})
					.await;
				}

				received = event_receiver.recv() => {
					match received {
						Ok(PickupEvent::Order(OrderEvent::Created { order })) => {
							self.dispatch_order_change(&semaphore, order, true).await;
						}
						Ok(PickupEvent::Order(OrderEvent::StatusChanged { order, .. })) => {
							self.dispatch_order_change(&semaphore, order, false).await;
						}
						Ok(PickupEvent::Task(_)) => {}
						Err(broadcast::error::RecvError::Lagged(skipped)) => {
							tracing::warn!(skipped, "Event receiver lagged, rescanning stored orders");
							self.spawn_handler(&semaphore, |engine| async move {
								engine
									.recovery
									.recover_state()
									.await
									.map(|_| ())
									.map_err(|e| EngineError::Handler(format!("Failed to recover: {}", e)))
							})
							.await;
						}
						Err(broadcast::error::RecvError::Closed) => break,
					}
				}

				_ = self.shutdown.notified() => {
					break;
				}

				_ = tokio::signal::ctrl_c() => {
					break;
				}
			}
		}

		cleanup_handle.abort();

		self.dispatch
			.stop()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;

		Ok(())
	}

	/// Fans an order change out to the scheduling and notification handlers.
	async fn dispatch_order_change(&self, semaphore: &Arc<Semaphore>, order: Order, created: bool) {
		let for_notification = order.clone();
		self.spawn_handler(semaphore, move |engine| async move {
			let (handler, order) = (&engine.scheduling_handler, &order);
			engine
				.retry_trigger("schedule task", &order.id, move || async move {
					if created {
						handler.handle_created(order).await.map(Some)
					} else {
						handler.handle_status_changed(order).await
					}
				})
				.await
				.map(|_| ())
		})
		.await;

		self.spawn_handler(semaphore, move |engine| async move {
			let (handler, order) = (&engine.notification_handler, &for_notification);
			engine
				.retry_trigger("notify", &order.id, move || async move {
					if created {
						handler.handle_created(order).await.map(|_| ())
					} else {
						handler.handle_status_changed(order).await.map(|_| ())
					}
				})
				.await
		})
		.await;
	}

	/// Runs an order-change trigger until it succeeds or the attempts run out.
	///
	/// Attempt `n` is followed by a pause of `n * retry_delay_seconds`, the
	/// same policy the dispatch service applies to failed tasks.
	async fn retry_trigger<F, Fut, T, E>(
		&self,
		action: &'static str,
		order_id: &str,
		trigger: F,
	) -> Result<T, EngineError>
	where
		F: Fn() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: Display,
	{
		let max_attempts = self.config.dispatch.max_attempts.max(1);
		let retry_delay = Duration::from_secs(self.config.dispatch.retry_delay_seconds);

		let mut attempt = 1;
		loop {
			let error = match trigger().await {
				Ok(value) => return Ok(value),
				Err(e) => e.to_string(),
			};
			if attempt >= max_attempts {
				return Err(EngineError::Handler(format!(
					"Failed to {} after {} attempts: {}",
					action, attempt, error
				)));
			}
			tracing::warn!(
				order_id = %truncate_id(order_id),
				attempt,
				"Failed to {}, retrying: {}",
				action,
				error
			);
			tokio::time::sleep(retry_delay.saturating_mul(attempt)).await;
			attempt += 1;
		}
	}

	/// Places a new order for an existing item and business.
	pub async fn place_order(
		&self,
		item_id: &str,
		business_id: &str,
		notification_token: Option<String>,
	) -> Result<Order, EngineError> {
		self.require(StorageKey::Items, "Item", item_id).await?;
		self.require(StorageKey::Businesses, "Business", business_id)
			.await?;

		let order = Order::placed(
			uuid::Uuid::new_v4().to_string(),
			item_id,
			business_id,
			notification_token,
			Utc::now(),
		);
		self.state_machine.store_order(&order).await?;

		tracing::info!(order_id = %truncate_id(&order.id), "Order placed");
		self.event_bus
			.publish(PickupEvent::Order(OrderEvent::Created {
				order: order.clone(),
			}))
			.ok();

		Ok(order)
	}

	/// Writes a status on behalf of an external actor.
	///
	/// # Arguments
	/// * `order_id` - Order to update
	/// * `status` - Status the actor records
	///
	/// # Returns
	/// * The order as stored after the call
	///
	/// # Errors
	/// * `EngineError::InvalidTransition` if no external edge leads from the current status
	/// * `EngineError::NotFound` if the order does not exist
	///
	/// A committed change is published so its follow-up timeout gets scheduled.
	pub async fn update_status(
		&self,
		order_id: &str,
		status: OrderStatus,
	) -> Result<Order, EngineError> {
		match self.state_machine.set_status(order_id, status).await? {
			StatusUpdate::Changed { previous, order } => {
				tracing::info!(
					order_id = %truncate_id(order_id),
					from = %previous,
					to = %order.status,
					"Order status updated"
				);
				self.event_bus
					.publish(PickupEvent::Order(OrderEvent::StatusChanged {
						order: order.clone(),
						previous,
					}))
					.ok();
				Ok(order)
			},
			StatusUpdate::Unchanged(order) => Ok(order),
		}
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, EngineError> {
		Ok(self.state_machine.get_order(order_id).await?)
	}

	/// Stores or replaces an item.
	pub async fn register_item(&self, item: &Item) -> Result<(), EngineError> {
		item.collection
			.validate()
			.map_err(|e| EngineError::Validation(e.to_string()))?;
		self.storage
			.store(StorageKey::Items.as_str(), &item.id, item)
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))
	}

	/// Stores or replaces a business.
	pub async fn register_business(&self, business: &Business) -> Result<(), EngineError> {
		self.storage
			.store(StorageKey::Businesses.as_str(), &business.id, business)
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))
	}

	pub fn stats(&self) -> TaskCounts {
		self.stats.snapshot()
	}

	/// Number of tasks waiting in the dispatch backend.
	pub async fn pending_tasks(&self) -> usize {
		self.dispatch.pending().await
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	async fn require(
		&self,
		namespace: StorageKey,
		kind: &'static str,
		id: &str,
	) -> Result<(), EngineError> {
		match self.storage.exists(namespace.as_str(), id).await {
			Ok(true) => Ok(()),
			Ok(false) | Err(StorageError::NotFound) => Err(EngineError::NotFound {
				kind,
				id: id.to_string(),
			}),
			Err(e) => Err(EngineError::Storage(e.to_string())),
		}
	}

	/// Spawns a handler task once a semaphore permit is available.
	async fn spawn_handler<F, Fut>(&self, semaphore: &Arc<Semaphore>, handler: F)
	where
		F: FnOnce(PickupEngine) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
	{
		let engine = self.clone();
		match semaphore.clone().acquire_owned().await {
			Ok(permit) => {
				tokio::spawn(async move {
					let _permit = permit;
					if let Err(e) = handler(engine).await {
						tracing::error!("Handler error: {}", e);
					}
				});
			},
			Err(e) => {
				tracing::error!("Failed to acquire semaphore permit: {}", e);
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use super::event_bus::EventBus;
	use crate::builder::{PickupBuilder, PickupFactories};
	use crate::test_support::{business, memory_storage, test_config};
	use chrono::Duration as ChronoDuration;
	use pickup_dispatch::implementations::timer::TimerDispatch;
	use pickup_dispatch::{DispatchError, DispatchInterface, MockDispatchInterface};
	use pickup_notify::implementations::log::LogNotifier;
	use pickup_types::{CollectionWindow, TaskEvent, TaskKind, TaskPayload};
	use std::sync::atomic::{AtomicUsize, Ordering};
	use tempfile::TempDir;

	fn build_engine() -> PickupEngine {
		build_engine_with(test_config())
	}

	fn build_engine_with(config: Config) -> PickupEngine {
		let factories = PickupFactories {
			storage_factories: pickup_storage::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
			dispatch_factories: pickup_dispatch::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
			notifier_factories: pickup_notify::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
		};
		PickupBuilder::new(config).build(factories).unwrap()
	}

	/// An engine on file storage under `dir`, as a restarted process would see it.
	fn file_engine(dir: &TempDir) -> PickupEngine {
		let mut config = test_config();
		config.storage.primary = "file".into();
		config.storage.implementations = [(
			"file".to_string(),
			toml::Value::Table(
				[(
					"storage_path".to_string(),
					toml::Value::String(dir.path().display().to_string()),
				)]
				.into_iter()
				.collect(),
			),
		)]
		.into_iter()
		.collect();
		build_engine_with(config)
	}

	/// An engine on memory storage with a hand-picked dispatch backend and bus.
	fn engine_with(backend: Box<dyn DispatchInterface>, event_bus: EventBus) -> PickupEngine {
		let config = test_config();
		let dispatch = Arc::new(DispatchService::new(
			backend,
			config.dispatch.max_attempts,
			Duration::from_secs(config.dispatch.retry_delay_seconds),
		));
		let notifier = Arc::new(NotifierService::new(Box::new(LogNotifier::new("test"))));
		PickupEngine::new(config, memory_storage(), dispatch, notifier, event_bus)
	}

	/// Registers an item collectable from `from_ms` to `to_ms` milliseconds from now.
	async fn seed(engine: &PickupEngine, from_ms: i64, to_ms: i64) {
		let now = Utc::now();
		engine
			.register_item(&Item {
				id: "item-1".into(),
				name: "Surprise Bag".into(),
				collection: CollectionWindow::new(
					now + ChronoDuration::milliseconds(from_ms),
					now + ChronoDuration::milliseconds(to_ms),
				)
				.unwrap(),
			})
			.await
			.unwrap();
		engine.register_business(&business("biz-1")).await.unwrap();
	}

	async fn wait_for_status(engine: &PickupEngine, order_id: &str, expected: OrderStatus) {
		let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
		loop {
			let status = engine.get_order(order_id).await.unwrap().status;
			if status == expected {
				return;
			}
			assert!(
				tokio::time::Instant::now() < deadline,
				"order stuck in {} waiting for {}",
				status,
				expected
			);
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
	}

	async fn wait_for_stats(engine: &PickupEngine, check: impl Fn(&TaskCounts) -> bool) {
		let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
		while !check(&engine.stats()) {
			assert!(
				tokio::time::Instant::now() < deadline,
				"stats never matched: {:?}",
				engine.stats()
			);
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
	}

	/// Spawns the run loop and waits until startup recovery is done.
	async fn start(engine: &PickupEngine) -> tokio::task::JoinHandle<Result<(), EngineError>> {
		let handle = {
			let engine = engine.clone();
			tokio::spawn(async move { engine.run().await })
		};
		// The loop takes the event receiver once `initialize` has returned.
		let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
		while engine.events.lock().await.is_some() {
			assert!(tokio::time::Instant::now() < deadline, "engine never started");
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		handle
	}

	#[tokio::test]
	async fn test_unconfirmed_order_is_cancelled_at_window_end() {
		let engine = build_engine();
		seed(&engine, 100, 300).await;
		let handle = start(&engine).await;

		let order = engine
			.place_order("item-1", "biz-1", Some("device-1".into()))
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::Placed);

		wait_for_status(&engine, &order.id, OrderStatus::Cancelled).await;
		wait_for_stats(&engine, |s| s.applied == 1).await;
		assert_eq!(engine.stats().scheduled, 1);

		engine.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_confirmed_order_walks_the_pickup_window() {
		let engine = build_engine();
		seed(&engine, 200, 500).await;
		let handle = start(&engine).await;

		let order = engine.place_order("item-1", "biz-1", None).await.unwrap();
		engine
			.update_status(&order.id, OrderStatus::Confirmed)
			.await
			.unwrap();

		wait_for_status(&engine, &order.id, OrderStatus::AwaitingPickup).await;
		wait_for_status(&engine, &order.id, OrderStatus::PickupFailed).await;

		// The cancel task fires at the window end too and finds the order confirmed long ago.
		wait_for_stats(&engine, |s| s.applied == 2 && s.stale == 1).await;
		assert_eq!(engine.stats().scheduled, 3);

		engine.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_external_pickup_beats_stale_timeouts() {
		let engine = build_engine();
		seed(&engine, 200, 400).await;
		let handle = start(&engine).await;

		let order = engine.place_order("item-1", "biz-1", None).await.unwrap();
		engine
			.update_status(&order.id, OrderStatus::Confirmed)
			.await
			.unwrap();
		let picked_up = OrderStatus::Other("OOOO".into());
		engine
			.update_status(&order.id, picked_up.clone())
			.await
			.unwrap();

		wait_for_stats(&engine, |s| s.stale == 2).await;
		let counts = engine.stats();
		assert_eq!(counts.applied, 0);
		assert_eq!(engine.get_order(&order.id).await.unwrap().status, picked_up);

		engine.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_missing_references_reject_placement() {
		let engine = build_engine();
		assert!(matches!(
			engine.place_order("item-1", "biz-1", None).await,
			Err(EngineError::NotFound { kind: "Item", .. })
		));

		seed(&engine, 100, 200).await;
		assert!(matches!(
			engine.place_order("item-1", "biz-2", None).await,
			Err(EngineError::NotFound { kind: "Business", .. })
		));
		assert_eq!(engine.pending_tasks().await, 0);
	}

	#[tokio::test]
	async fn test_dangling_item_reference_schedules_nothing() {
		let engine = build_engine();
		engine.register_business(&business("biz-1")).await.unwrap();
		let handle = start(&engine).await;

		// An order written by the placement flow for an item that is gone.
		let order = Order::placed("order-1", "item-gone", "biz-1", None, Utc::now());
		engine.state_machine.store_order(&order).await.unwrap();
		engine
			.event_bus()
			.publish(PickupEvent::Order(OrderEvent::Created {
				order: order.clone(),
			}))
			.unwrap();

		tokio::time::sleep(Duration::from_millis(200)).await;
		assert_eq!(engine.stats().scheduled, 0);
		assert_eq!(engine.pending_tasks().await, 0);
		assert_eq!(
			engine.get_order("order-1").await.unwrap().status,
			OrderStatus::Placed
		);
		assert!(!engine
			.storage
			.exists(StorageKey::Messages.as_str(), "order-1")
			.await
			.unwrap());

		engine.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_external_write_after_cancellation_is_rejected() {
		let engine = build_engine();
		seed(&engine, 50, 100).await;
		let handle = start(&engine).await;

		let order = engine.place_order("item-1", "biz-1", None).await.unwrap();
		wait_for_status(&engine, &order.id, OrderStatus::Cancelled).await;

		assert!(matches!(
			engine.update_status(&order.id, OrderStatus::Confirmed).await,
			Err(EngineError::InvalidTransition { .. })
		));
		assert!(matches!(
			engine.update_status("missing", OrderStatus::Confirmed).await,
			Err(EngineError::NotFound { kind: "Order", .. })
		));

		engine.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_failed_task_is_redelivered() {
		let engine = build_engine();
		let handle = start(&engine).await;

		engine
			.dispatch
			.schedule(
				pickup_types::TaskKind::CancelOrder,
				"ghost",
				pickup_types::ScheduleAt::Delay(Duration::ZERO),
			)
			.await
			.unwrap();

		// First attempt fails at once, the retry follows after retry_delay_seconds.
		wait_for_stats(&engine, |s| s.failed >= 2).await;
		assert_eq!(engine.stats().applied, 0);

		engine.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_restart_restores_lost_timeouts() {
		let dir = TempDir::new().unwrap();

		let first = file_engine(&dir);
		seed(&first, 1000, 1500).await;
		let handle = start(&first).await;
		let unconfirmed = first.place_order("item-1", "biz-1", None).await.unwrap();
		let confirmed = first.place_order("item-1", "biz-1", None).await.unwrap();
		first
			.update_status(&confirmed.id, OrderStatus::Confirmed)
			.await
			.unwrap();
		wait_for_stats(&first, |s| s.scheduled == 3).await;
		first.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
		drop(first);

		// The timer queue died with the first process; only the records remain.
		let second = file_engine(&dir);
		assert_eq!(second.pending_tasks().await, 0);
		let handle = start(&second).await;
		assert_eq!(second.stats().scheduled, 2);

		wait_for_status(&second, &unconfirmed.id, OrderStatus::Cancelled).await;
		wait_for_status(&second, &confirmed.id, OrderStatus::PickupFailed).await;

		second.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_failed_schedule_trigger_is_retried() {
		let attempts = Arc::new(AtomicUsize::new(0));
		let counter = attempts.clone();
		let mut backend = MockDispatchInterface::new();
		backend.expect_enqueue().returning(move |_| {
			if counter.fetch_add(1, Ordering::SeqCst) == 0 {
				Err(DispatchError::Backend("queue unavailable".into()))
			} else {
				Ok(())
			}
		});
		backend.expect_start().returning(|_| Ok(()));
		backend.expect_stop().returning(|| Ok(()));
		backend.expect_pending().returning(|| 0);

		let engine = engine_with(Box::new(backend), EventBus::new(64));
		seed(&engine, 60_000, 120_000).await;
		let handle = start(&engine).await;

		engine.place_order("item-1", "biz-1", None).await.unwrap();
		wait_for_stats(&engine, |s| s.scheduled == 1).await;
		assert_eq!(attempts.load(Ordering::SeqCst), 2);

		engine.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_lagged_events_fall_back_to_recovery() {
		let engine = engine_with(
			Box::new(TimerDispatch::new(Duration::from_millis(50))),
			EventBus::new(4),
		);
		seed(&engine, 100, 300).await;
		let handle = start(&engine).await;

		// Stored without its creation event, then the bus overflows before the
		// loop can read it.
		let order = Order::placed("order-1", "item-1", "biz-1", None, Utc::now());
		engine.state_machine.store_order(&order).await.unwrap();
		for _ in 0..16 {
			engine
				.event_bus()
				.publish(PickupEvent::Task(TaskEvent::Scheduled {
					payload: TaskPayload::new(TaskKind::CancelOrder, "elsewhere"),
					fire_at: Utc::now(),
				}))
				.unwrap();
		}

		wait_for_status(&engine, "order-1", OrderStatus::Cancelled).await;

		engine.shutdown().await.unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_register_item_rejects_inverted_window() {
		let engine = build_engine();
		let now = Utc::now();
		let item = Item {
			id: "item-1".into(),
			name: "Bag".into(),
			collection: CollectionWindow {
				from: now,
				to: now - ChronoDuration::minutes(1),
			},
		};
		assert!(matches!(
			engine.register_item(&item).await,
			Err(EngineError::Validation(_))
		));
	}
}
