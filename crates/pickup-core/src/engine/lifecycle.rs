//! Startup and shutdown of the pickup engine.

use super::{EngineError, PickupEngine};

impl PickupEngine {
	/// Logs the effective lifecycle settings and restores pending timeouts.
	///
	/// Every stored order still waiting on a timeout gets it scheduled again,
	/// so tasks lost with a non-durable dispatch backend are not lost for good.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		let pending_tasks = self.dispatch.pending().await;
		tracing::info!(
			service_id = %self.config.service.id,
			auto_cancel_minutes = self.config.lifecycle.auto_cancel_minutes,
			timezone = %self.config.lifecycle.timezone,
			pending_tasks,
			"Initializing pickup engine"
		);

		let report = self
			.recovery
			.recover_state()
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))?;
		if report.rescheduled > 0 {
			tracing::info!(
				rescheduled = report.rescheduled,
				"Restored timeouts for stored orders"
			);
		}
		Ok(())
	}

	/// Asks a running [`PickupEngine::run`] loop to return.
	///
	/// Tasks not yet due stay in the dispatch backend.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down pickup engine");
		self.shutdown.notify_one();
		Ok(())
	}
}
