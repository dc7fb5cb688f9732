//! Order lifecycle core for the pickup service.
//!
//! Orders move through a small state machine driven by two kinds of writer:
//! external actors (the business confirming, a courier recording a pickup)
//! and deferred timeout tasks computed from each item's collection window.
//! Every timeout is advisory. When it fires, the transition guard applies it
//! only if the order is still in the status the task expects, inside one
//! atomic read-modify-write, so stale and duplicate deliveries are harmless.

pub mod builder;
pub mod deadline;
pub mod engine;
pub mod handlers;
pub mod recovery;
pub mod state;

pub use builder::{BuilderError, PickupBuilder, PickupFactories};
pub use engine::{event_bus::EventBus, EngineError, PickupEngine};
pub use handlers::{TaskCounts, TaskOutcome, TaskStats};
pub use recovery::{RecoveryError, RecoveryReport, RecoveryService};
pub use state::{OrderStateError, OrderStateMachine, StatusUpdate, TransitionOutcome};

#[cfg(test)]
pub(crate) mod test_support;
