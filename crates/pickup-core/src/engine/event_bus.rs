//! Event bus for the order lifecycle.
//!
//! A broadcast channel carrying committed order changes and task outcomes.
//! It is the change feed the scheduling and notification handlers subscribe
//! to. Publishing never blocks; slow subscribers lose the oldest events and
//! have to fall back to reading storage.

use pickup_types::PickupEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<PickupEvent>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<PickupEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event, returning how many subscribers received it.
	///
	/// Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: PickupEvent,
	) -> Result<usize, broadcast::error::SendError<PickupEvent>> {
		self.sender.send(event)
	}
}
